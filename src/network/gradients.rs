use crate::error::{NnError, Result};
use crate::math::matrix::Matrix;
use crate::network::network::Network;

/// Per-layer parameter gradients for one sample, or the running sum over
/// several samples.
///
/// Sums are plain element-wise additions, so partial sums built on different
/// threads can be merged in any order.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    weights: Vec<Matrix>,
    biases: Vec<Matrix>,
    loss: f64,
    samples: usize,
}

impl Gradients {
    pub(crate) fn new(weights: Vec<Matrix>, biases: Vec<Matrix>, loss: f64) -> Gradients {
        Gradients { weights, biases, loss, samples: 1 }
    }

    /// An empty accumulator shaped like `network`'s parameters.
    pub fn zeros_like(network: &Network) -> Gradients {
        let (weights, biases) = network
            .layers()
            .iter()
            .map(|layer| {
                (
                    Matrix::zeros(layer.weights().rows(), layer.weights().cols()),
                    Matrix::zeros(1, layer.size()),
                )
            })
            .unzip();
        Gradients { weights, biases, loss: 0.0, samples: 0 }
    }

    pub fn weights(&self) -> &[Matrix] {
        &self.weights
    }

    pub fn biases(&self) -> &[Matrix] {
        &self.biases
    }

    /// Summed cross-entropy loss of the accumulated samples.
    pub fn loss(&self) -> f64 {
        self.loss
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Adds `other` into `self`, layer by layer.
    pub fn accumulate(&mut self, other: &Gradients) -> Result<()> {
        if self.weights.len() != other.weights.len() {
            return Err(NnError::InvalidArchitecture(format!(
                "cannot merge gradients of {} and {} layers",
                self.weights.len(),
                other.weights.len()
            )));
        }
        for (acc, g) in self.weights.iter_mut().zip(&other.weights) {
            acc.add_in_place(g)?;
        }
        for (acc, g) in self.biases.iter_mut().zip(&other.biases) {
            acc.add_in_place(g)?;
        }
        self.loss += other.loss;
        self.samples += other.samples;
        Ok(())
    }
}
