use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::{activation::activation::ActivationFunction, error::{NnError, Result}, math::matrix::Matrix};

/// One fully-connected transition between two layers of widths
/// `input_size -> size`.
///
/// `weights` is `(input_size, size)` and `biases` is `(1, size)`; inputs are
/// row vectors, so the affine step is `input * weights + biases`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    weights: Matrix,
    biases: Matrix,
    activator: ActivationFunction,
}

impl Layer {
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Layer {
        Layer {
            weights: Matrix::random(input_size, size, rng),
            biases: Matrix::random(1, size, rng),
            activator: activation,
        }
    }

    pub fn from_parts(weights: Matrix, biases: Matrix, activation: ActivationFunction) -> Result<Layer> {
        if biases.shape() != (1, weights.cols()) {
            return Err(NnError::DimensionMismatch {
                op: "layer biases",
                left: weights.shape(),
                right: biases.shape(),
            });
        }
        Ok(Layer { weights, biases, activator: activation })
    }

    pub fn input_size(&self) -> usize {
        self.weights.rows()
    }

    pub fn size(&self) -> usize {
        self.weights.cols()
    }

    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    pub fn biases(&self) -> &Matrix {
        &self.biases
    }

    pub fn activation(&self) -> ActivationFunction {
        self.activator
    }

    /// `activation(input * W + b)` for a single-row input.
    pub fn feed_from(&self, input: &Matrix) -> Result<Matrix> {
        let mut z = input.matmul(&self.weights)?.add(&self.biases)?;
        self.activator.apply(&mut z);
        Ok(z)
    }

    /// Returns `(weights_grad, biases_grad)` for this layer.
    ///
    /// `inputs` is the cached activation that fed this layer and `delta` is
    /// the error signal w.r.t. this layer's pre-activation output.
    pub fn compute_gradients(&self, inputs: &Matrix, delta: &Matrix) -> Result<(Matrix, Matrix)> {
        let weights_adjustment = inputs.transpose().matmul(delta)?;
        Ok((weights_adjustment, delta.clone()))
    }

    /// Pushes `delta` back through the weights: `delta * W^T`.
    pub fn back_through(&self, delta: &Matrix) -> Result<Matrix> {
        delta.matmul(&self.weights.transpose())
    }

    pub(crate) fn check_gradients(&self, weights_grad: &Matrix, biases_grad: &Matrix) -> Result<()> {
        for (param, grad, op) in [
            (&self.weights, weights_grad, "weight update"),
            (&self.biases, biases_grad, "bias update"),
        ] {
            if param.shape() != grad.shape() {
                return Err(NnError::DimensionMismatch {
                    op,
                    left: param.shape(),
                    right: grad.shape(),
                });
            }
        }
        Ok(())
    }

    /// `W -= scale * weights_grad`, `b -= scale * biases_grad`.
    pub fn apply_gradients(&mut self, weights_grad: &Matrix, biases_grad: &Matrix, scale: f64) -> Result<()> {
        self.check_gradients(weights_grad, biases_grad)?;
        self.weights.add_in_place(&weights_grad.scalar_mul(-scale))?;
        self.biases.add_in_place(&biases_grad.scalar_mul(-scale))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bias_of_wrong_width() {
        let res = Layer::from_parts(Matrix::zeros(3, 2), Matrix::zeros(1, 3), ActivationFunction::ReLU);
        assert!(matches!(res, Err(NnError::DimensionMismatch { op: "layer biases", .. })));
    }

    #[test]
    fn feed_from_is_affine_then_activated() {
        let w = Matrix::from_vec(2, 2, vec![1.0, -1.0, 2.0, 0.5]).unwrap();
        let b = Matrix::row_vector(vec![0.5, -3.0]);
        let layer = Layer::from_parts(w, b, ActivationFunction::ReLU).unwrap();
        let out = layer.feed_from(&Matrix::row_vector(vec![1.0, 1.0])).unwrap();
        assert_eq!(out.as_slice(), &[3.5, 0.0]);
    }

    #[test]
    fn apply_gradients_is_all_or_nothing() {
        let mut layer = Layer::from_parts(Matrix::zeros(2, 2), Matrix::zeros(1, 2), ActivationFunction::ReLU).unwrap();
        let before = layer.clone();
        let mut wg = Matrix::zeros(2, 2);
        wg.fill(1.0);
        assert!(layer.apply_gradients(&wg, &Matrix::zeros(1, 3), 0.1).is_err());
        assert_eq!(layer, before);

        layer.apply_gradients(&wg, &Matrix::row_vector(vec![2.0, 2.0]), 0.5).unwrap();
        assert!(layer.weights().as_slice().iter().all(|&x| x == -0.5));
        assert!(layer.biases().as_slice().iter().all(|&x| x == -1.0));
    }
}
