use crate::error::{NnError, Result};
use crate::math::matrix::Matrix;

/// Categorical cross-entropy loss for use with a Softmax output layer.
pub struct CrossEntropyLoss;

/// Small epsilon added inside log() to prevent log(0) = -inf.
const EPS: f64 = 1e-12;

impl CrossEntropyLoss {
    /// Computes the scalar cross-entropy loss:
    ///   L = -sum(expected[i] * log(predicted[i] + eps))
    ///
    /// `predicted` holds softmax probabilities, `expected` a one-hot (or soft)
    /// target of the same shape.
    pub fn loss(predicted: &Matrix, expected: &Matrix) -> Result<f64> {
        ensure_same_shape(predicted, expected)?;
        Ok(predicted.as_slice().iter().zip(expected.as_slice())
            .map(|(p, e)| -e * (p + EPS).ln())
            .sum())
    }

    /// Gradient of the combined Softmax + cross-entropy w.r.t. the pre-softmax
    /// logits:
    ///   ∂L/∂z_i = predicted[i] - expected[i]
    ///
    /// This shortcut only holds for this exact pairing, which is why the
    /// network's output layer is fixed to Softmax.
    pub fn derivative(predicted: &Matrix, expected: &Matrix) -> Result<Matrix> {
        predicted.sub(expected)
    }
}

fn ensure_same_shape(predicted: &Matrix, expected: &Matrix) -> Result<()> {
    if predicted.shape() != expected.shape() {
        return Err(NnError::DimensionMismatch {
            op: "cross_entropy",
            left: predicted.shape(),
            right: expected.shape(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn loss_is_negative_log_of_target_probability() {
        let p = Matrix::row_vector(vec![0.25, 0.75]);
        let t = Matrix::row_vector(vec![0.0, 1.0]);
        assert_abs_diff_eq!(CrossEntropyLoss::loss(&p, &t).unwrap(), -(0.75f64).ln(), epsilon = 1e-9);
        assert_eq!(CrossEntropyLoss::derivative(&p, &t).unwrap().as_slice(), &[0.25, -0.25]);
    }

    #[test]
    fn zero_probability_stays_finite() {
        let p = Matrix::row_vector(vec![1.0, 0.0]);
        let t = Matrix::row_vector(vec![0.0, 1.0]);
        assert!(CrossEntropyLoss::loss(&p, &t).unwrap().is_finite());
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let p = Matrix::row_vector(vec![0.5, 0.5]);
        let t = Matrix::row_vector(vec![1.0, 0.0, 0.0]);
        assert!(CrossEntropyLoss::loss(&p, &t).is_err());
        assert!(CrossEntropyLoss::derivative(&p, &t).is_err());
    }
}
