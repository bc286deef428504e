//! Readers for the IDX binary files used by MNIST and its derivatives
//! (Fashion-MNIST, EMNIST, …).
//!
//! # IDX3 image file layout
//! ```text
//! bytes  0-3:   0x00 0x00 0x08 0x03   (magic: uint8, 3 dimensions)
//! bytes  4-7:   N           (number of images, big-endian u32)
//! bytes  8-11:  rows        (image height in pixels, big-endian u32)
//! bytes 12-15:  cols        (image width in pixels, big-endian u32)
//! bytes 16..:   N * rows * cols bytes, row-major, uint8
//! ```
//!
//! # IDX1 label file layout
//! ```text
//! bytes  0-3:   0x00 0x00 0x08 0x01   (magic: uint8, 1 dimension)
//! bytes  4-7:   N           (number of labels, big-endian u32)
//! bytes  8..:   N bytes, each a class index
//! ```
use std::path::Path;

use log::debug;

use crate::error::{NnError, Result};
use crate::math::matrix::{Axis, Matrix};

pub const IMAGE_MAGIC: u32 = 0x0000_0803;
pub const LABEL_MAGIC: u32 = 0x0000_0801;

fn be_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Parses an IDX3 image file into one `(rows, cols)` matrix per image, with
/// pixels scaled from `[0, 255]` to `[0.0, 1.0]`.
pub fn parse_images(bytes: &[u8]) -> Result<Vec<Matrix>> {
    if bytes.len() < 16 {
        return Err(NnError::InvalidDataset(format!(
            "IDX image file too short: expected at least 16 header bytes, got {}",
            bytes.len()
        )));
    }
    let magic = be_u32(bytes, 0);
    if magic != IMAGE_MAGIC {
        return Err(NnError::InvalidDataset(format!(
            "IDX image file: magic number must be {:#010x}, got {:#010x}",
            IMAGE_MAGIC, magic
        )));
    }

    let n_items = be_u32(bytes, 4) as usize;
    let rows = be_u32(bytes, 8) as usize;
    let cols = be_u32(bytes, 12) as usize;

    let n_pixels = rows.checked_mul(cols).ok_or_else(|| {
        NnError::InvalidDataset(format!("IDX image file: {}x{} pixels overflow", rows, cols))
    })?;
    let data_len = n_items.checked_mul(n_pixels).ok_or_else(|| {
        NnError::InvalidDataset(format!("IDX image file: {} images of {} pixels overflow", n_items, n_pixels))
    })?;
    if bytes.len() - 16 < data_len {
        return Err(NnError::InvalidDataset(format!(
            "IDX image file too short: header declares {} images of {}x{} pixels \
             ({} data bytes), but only {} bytes follow the header",
            n_items, rows, cols, data_len, bytes.len() - 16
        )));
    }
    if n_pixels == 0 {
        return Ok(Vec::new());
    }

    let images = bytes[16..16 + data_len]
        .chunks_exact(n_pixels)
        .map(|chunk| {
            let pixels = chunk.iter().map(|&px| px as f64 / 255.0).collect();
            Matrix::from_vec(rows, cols, pixels)
        })
        .collect::<Result<Vec<_>>>()?;
    debug!("parsed {} images of {}x{}", images.len(), rows, cols);
    Ok(images)
}

/// Parses an IDX1 label file.
pub fn parse_labels(bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.len() < 8 {
        return Err(NnError::InvalidDataset(format!(
            "IDX label file too short: expected at least 8 header bytes, got {}",
            bytes.len()
        )));
    }
    let magic = be_u32(bytes, 0);
    if magic != LABEL_MAGIC {
        return Err(NnError::InvalidDataset(format!(
            "IDX label file: magic number must be {:#010x}, got {:#010x}",
            LABEL_MAGIC, magic
        )));
    }
    let n_items = be_u32(bytes, 4) as usize;
    if bytes.len() - 8 < n_items {
        return Err(NnError::InvalidDataset(format!(
            "IDX label file too short: header declares {} labels but only {} bytes follow",
            n_items,
            bytes.len() - 8
        )));
    }
    Ok(bytes[8..8 + n_items].to_vec())
}

pub fn read_images<P: AsRef<Path>>(path: P) -> Result<Vec<Matrix>> {
    parse_images(&std::fs::read(path)?)
}

pub fn read_labels<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    parse_labels(&std::fs::read(path)?)
}

/// `(1, n_classes)` row with a single 1.0 at `label`.
pub fn one_hot(label: u8, n_classes: usize) -> Result<Matrix> {
    let class = label as usize;
    if class >= n_classes {
        return Err(NnError::InvalidDataset(format!(
            "class index {} is out of range for {} classes",
            class, n_classes
        )));
    }
    let mut target = Matrix::zeros(1, n_classes);
    target.set(0, class, 1.0)?;
    Ok(target)
}

/// Images flattened to network-ready rows plus their class labels.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub inputs: Vec<Matrix>,
    pub labels: Vec<u8>,
}

impl Dataset {
    /// Pairs already-parsed images and labels, flattening each image to a row.
    pub fn from_parts(images: Vec<Matrix>, labels: Vec<u8>) -> Result<Dataset> {
        if images.len() != labels.len() {
            return Err(NnError::InvalidDataset(format!(
                "{} images but {} labels",
                images.len(),
                labels.len()
            )));
        }
        let inputs = images.iter().map(|img| img.flatten(Axis::Row)).collect();
        Ok(Dataset { inputs, labels })
    }

    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(images: P, labels: Q) -> Result<Dataset> {
        Dataset::from_parts(read_images(images)?, read_labels(labels)?)
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Width of every input row (0 for an empty set).
    pub fn input_size(&self) -> usize {
        self.inputs.first().map_or(0, Matrix::cols)
    }

    /// One-hot targets for every label.
    pub fn targets(&self, n_classes: usize) -> Result<Vec<Matrix>> {
        self.labels.iter().map(|&l| one_hot(l, n_classes)).collect()
    }
}
