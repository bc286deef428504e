use serde::{Serialize, Deserialize};
use crate::activation::activation::ActivationFunction;
use crate::error::{NnError, Result};

/// Serializable description of a network architecture.
///
/// - `layer_sizes`: widths from input to output, at least two entries
/// - `hidden_activation`: activation between hidden layers (ReLU or Sigmoid);
///   the output layer is always Softmax
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSpec {
    pub layer_sizes: Vec<usize>,
    pub hidden_activation: ActivationFunction,
}

impl Default for NetworkSpec {
    /// 28×28 digits, two hidden layers, ten classes.
    fn default() -> Self {
        NetworkSpec {
            layer_sizes: vec![784, 128, 64, 10],
            hidden_activation: ActivationFunction::ReLU,
        }
    }
}

impl NetworkSpec {
    pub fn new(layer_sizes: Vec<usize>, hidden_activation: ActivationFunction) -> Self {
        NetworkSpec { layer_sizes, hidden_activation }
    }

    pub fn validate(&self) -> Result<()> {
        if self.layer_sizes.len() < 2 {
            return Err(NnError::InvalidArchitecture(format!(
                "need at least an input and an output layer, got {} layer(s)",
                self.layer_sizes.len()
            )));
        }
        if let Some(pos) = self.layer_sizes.iter().position(|&s| s == 0) {
            return Err(NnError::InvalidArchitecture(format!("layer {} has zero width", pos)));
        }
        if !self.hidden_activation.is_hidden() {
            return Err(NnError::InvalidArchitecture(format!(
                "{} cannot be used as a hidden activation",
                self.hidden_activation
            )));
        }
        Ok(())
    }

    /// Activation tag for weight layer `index` of a network with this spec.
    pub fn activation_for(&self, index: usize) -> ActivationFunction {
        if index + 2 == self.layer_sizes.len() {
            ActivationFunction::Softmax
        } else {
            self.hidden_activation
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation() {
        assert!(NetworkSpec::default().validate().is_ok());
        assert!(NetworkSpec::new(vec![4], ActivationFunction::ReLU).validate().is_err());
        assert!(NetworkSpec::new(vec![4, 0, 2], ActivationFunction::ReLU).validate().is_err());
        assert!(NetworkSpec::new(vec![4, 2], ActivationFunction::Softmax).validate().is_err());
    }

    #[test]
    fn last_layer_is_softmax() {
        let spec = NetworkSpec::new(vec![4, 3, 2], ActivationFunction::Sigmoid);
        assert_eq!(spec.activation_for(0), ActivationFunction::Sigmoid);
        assert_eq!(spec.activation_for(1), ActivationFunction::Softmax);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let spec: NetworkSpec = serde_json::from_str(r#"{"layer_sizes":[2,2]}"#).unwrap();
        assert_eq!(spec.hidden_activation, ActivationFunction::ReLU);
        assert_eq!(spec.layer_sizes, vec![2, 2]);
    }
}
