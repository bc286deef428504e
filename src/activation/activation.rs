use serde::{Serialize, Deserialize};

use crate::math::matrix::Matrix;

/// Activation applied after a layer's affine transform.
///
/// Every weight layer of a [`Network`](crate::Network) carries one of these
/// as an explicit tag, so the backward pass always pairs a cached tensor with
/// the derivative of the function that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ActivationFunction {
    Sigmoid,
    #[default]
    ReLU,
    /// Output-layer only. Applied over the whole row, not element-wise.
    Softmax,
}

impl ActivationFunction {
    /// Activates `z` in place.
    pub fn apply(&self, z: &mut Matrix) {
        match self {
            ActivationFunction::Sigmoid => z.apply_sigmoid(),
            ActivationFunction::ReLU => z.apply_relu(),
            ActivationFunction::Softmax => z.apply_softmax(),
        }
    }

    /// Derivative evaluated on the *activated* values this function produced.
    ///
    /// For `Softmax` the layer is paired with cross-entropy, whose combined
    /// gradient `predicted - expected` is already the output delta. Returning
    /// ones keeps that delta from being multiplied by a Jacobian a second time.
    pub fn derivative(&self, activated: &Matrix) -> Matrix {
        let mut d = activated.clone();
        match self {
            ActivationFunction::Sigmoid => d.apply_sigmoid_derivative(),
            ActivationFunction::ReLU => d.apply_relu_derivative(),
            ActivationFunction::Softmax => d.fill(1.0),
        }
        d
    }

    /// Whether this function may be used between hidden layers.
    pub fn is_hidden(&self) -> bool {
        !matches!(self, ActivationFunction::Softmax)
    }
}

impl std::fmt::Display for ActivationFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ActivationFunction::Sigmoid => "sigmoid",
            ActivationFunction::ReLU => "relu",
            ActivationFunction::Softmax => "softmax",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivative_uses_activated_values() {
        let mut z = Matrix::row_vector(vec![-2.0, 0.0, 3.0]);
        ActivationFunction::ReLU.apply(&mut z);
        let d = ActivationFunction::ReLU.derivative(&z);
        assert_eq!(d.as_slice(), &[0.0, 0.0, 1.0]);

        let mut s = Matrix::row_vector(vec![0.0]);
        ActivationFunction::Sigmoid.apply(&mut s);
        assert_eq!(ActivationFunction::Sigmoid.derivative(&s).as_slice(), &[0.25]);
    }

    #[test]
    fn softmax_derivative_passes_delta_through() {
        let mut z = Matrix::row_vector(vec![1.0, 2.0]);
        ActivationFunction::Softmax.apply(&mut z);
        assert_eq!(ActivationFunction::Softmax.derivative(&z).as_slice(), &[1.0, 1.0]);
        assert!(!ActivationFunction::Softmax.is_hidden());
        assert!(ActivationFunction::ReLU.is_hidden());
    }
}
