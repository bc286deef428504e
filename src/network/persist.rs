//! Model persistence.
//!
//! Binary layout, all little-endian:
//!
//! ```text
//! i32            layer count L (>= 2)
//! i32 * L        layer widths
//! f64 * ...      every weight matrix, row-major, layer by layer
//! f64 * ...      every bias row, layer by layer
//! ```
//!
//! The format stores no activation tags; readers choose the hidden
//! activation. The JSON export keeps the tags.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{NnError, Result};
use crate::layers::dense::Layer;
use crate::math::matrix::Matrix;
use crate::network::network::Network;
use crate::network::spec::NetworkSpec;

/// Upper bound on speculative allocation while reading declared sizes.
const MAX_PREALLOC: usize = 1 << 16;

impl Network {
    /// Writes the binary model to `writer`.
    pub fn write_model<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_i32(writer, self.layer_sizes().len())?;
        for &size in self.layer_sizes() {
            write_i32(writer, size)?;
        }
        for matrix in self.weights().chain(self.biases()) {
            for &value in matrix.as_slice() {
                writer.write_all(&value.to_le_bytes())?;
            }
        }
        Ok(())
    }

    /// Reads a binary model, tagging hidden layers with `hidden`.
    pub fn read_model<R: Read>(reader: &mut R, hidden: ActivationFunction) -> Result<Network> {
        let count = read_i32(reader, "layer count")?;
        if count < 2 {
            return Err(NnError::CorruptOrTruncated(format!("declared layer count {}", count)));
        }
        let count = count as usize;

        let mut sizes = Vec::with_capacity(count.min(MAX_PREALLOC));
        for i in 0..count {
            let size = read_i32(reader, "layer width")?;
            if size <= 0 {
                return Err(NnError::CorruptOrTruncated(format!("layer {} declares width {}", i, size)));
            }
            sizes.push(size as usize);
        }

        let mut weights = Vec::with_capacity(count - 1);
        for pair in sizes.windows(2) {
            let (rows, cols) = (pair[0], pair[1]);
            let len = rows.checked_mul(cols).ok_or_else(|| {
                NnError::CorruptOrTruncated(format!("{}x{} weight matrix is too large", rows, cols))
            })?;
            weights.push(Matrix::from_vec(rows, cols, read_f64s(reader, len, "weights")?)?);
        }
        let mut biases = Vec::with_capacity(count - 1);
        for &cols in &sizes[1..] {
            biases.push(Matrix::from_vec(1, cols, read_f64s(reader, cols, "biases")?)?);
        }

        if reader.read(&mut [0u8; 1])? > 0 {
            warn!("ignoring trailing bytes after model parameters");
        }
        debug!("read model with layer sizes {:?}", sizes);
        Network::from_parts(&sizes, weights, biases, hidden)
    }

    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        self.write_model(&mut writer)?;
        writer.flush()?;
        info!("saved model {:?} to {}", self.layer_sizes(), path.as_ref().display());
        Ok(())
    }

    /// Loads a binary model with ReLU hidden layers.
    pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Network> {
        Network::load_model_with(path, ActivationFunction::ReLU)
    }

    pub fn load_model_with<P: AsRef<Path>>(path: P, hidden: ActivationFunction) -> Result<Network> {
        let mut reader = BufReader::new(File::open(path.as_ref())?);
        let network = Network::read_model(&mut reader, hidden)?;
        info!("loaded model {:?} from {}", network.layer_sizes(), path.as_ref().display());
        Ok(network)
    }

    /// Pretty-printed JSON export including the architecture and per-layer
    /// activation tags.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        let model = JsonModelRef { spec: self.spec(), layers: self.layers() };
        serde_json::to_writer_pretty(writer, &model)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Network> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let model: JsonModel = serde_json::from_reader(reader)?;
        model.spec.validate()?;
        let hidden = model.layers.len().saturating_sub(1);
        if let Some(pos) = model.layers[..hidden]
            .iter()
            .position(|layer| layer.activation() != model.spec.hidden_activation)
        {
            return Err(NnError::InvalidArchitecture(format!(
                "layer {} is tagged {} but the model declares {} hidden layers",
                pos,
                model.layers[pos].activation(),
                model.spec.hidden_activation
            )));
        }
        Network::from_layers(model.spec.layer_sizes, model.layers)
    }
}

#[derive(Serialize)]
struct JsonModelRef<'a> {
    spec: NetworkSpec,
    layers: &'a [Layer],
}

#[derive(Deserialize)]
struct JsonModel {
    spec: NetworkSpec,
    layers: Vec<Layer>,
}

fn write_i32<W: Write>(writer: &mut W, value: usize) -> Result<()> {
    let value = i32::try_from(value).map_err(|_| {
        NnError::InvalidArchitecture(format!("{} does not fit the model's 32-bit header", value))
    })?;
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn truncated(what: &str) -> impl FnOnce(io::Error) -> NnError + '_ {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            NnError::CorruptOrTruncated(format!("stream ended while reading {}", what))
        } else {
            NnError::Io(e)
        }
    }
}

fn read_i32<R: Read>(reader: &mut R, what: &str) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(truncated(what))?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f64s<R: Read>(reader: &mut R, len: usize, what: &str) -> Result<Vec<f64>> {
    let mut values = Vec::with_capacity(len.min(MAX_PREALLOC));
    let mut buf = [0u8; 8];
    for _ in 0..len {
        reader.read_exact(&mut buf).map_err(truncated(what))?;
        values.push(f64::from_le_bytes(buf));
    }
    Ok(values)
}
