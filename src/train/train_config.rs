use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::error::{NnError, Result};
use crate::network::spec::NetworkSpec;

/// Hyperparameters for a `train_loop` run.
///
/// # Fields
/// - `network`: architecture (flattened into the JSON object)
/// - `learning_rate`: SGD step size; batches step by `learning_rate` times
///   the mean gradient
/// - `epochs`: total number of full passes over the training data
/// - `batch_size`: samples per mini-batch; use `1` for online SGD
/// - `seed`: seeds weight init and shuffling; `None` draws from
///   system entropy
///
/// Every field is optional in JSON and falls back to [`Default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    #[serde(flatten)]
    pub network: NetworkSpec,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            network: NetworkSpec::default(),
            learning_rate: 0.01,
            epochs: 15,
            batch_size: 64,
            seed: None,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;
        if self.batch_size == 0 {
            return Err(NnError::InvalidConfig("batch size must be at least 1".to_string()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(NnError::InvalidConfig(format!(
                "learning rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }

    /// Serializes the config to a pretty-printed JSON file.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Reads a config from JSON; missing fields take their defaults.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<TrainConfig> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let config: TrainConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::activation::ActivationFunction;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: TrainConfig =
            serde_json::from_str(r#"{"layer_sizes":[784,32,10],"epochs":3,"hidden_activation":"Sigmoid"}"#).unwrap();
        assert_eq!(config.network.layer_sizes, vec![784, 32, 10]);
        assert_eq!(config.network.hidden_activation, ActivationFunction::Sigmoid);
        assert_eq!(config.epochs, 3);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn file_round_trip() {
        let config = TrainConfig { seed: Some(5), batch_size: 8, ..TrainConfig::default() };
        let path = std::env::temp_dir().join(format!("digitnet-config-{}.json", std::process::id()));
        config.save_json(&path).unwrap();
        let back = TrainConfig::load_json(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(back, config);
    }

    #[test]
    fn rejects_zero_batch_and_bad_rate() {
        let zero_batch = TrainConfig { batch_size: 0, ..TrainConfig::default() };
        assert!(matches!(zero_batch.validate(), Err(NnError::InvalidConfig(_))));
        let negative_rate = TrainConfig { learning_rate: -1.0, ..TrainConfig::default() };
        assert!(matches!(negative_rate.validate(), Err(NnError::InvalidConfig(_))));
        let nan_rate = TrainConfig { learning_rate: f64::NAN, ..TrainConfig::default() };
        assert!(matches!(nan_rate.validate(), Err(NnError::InvalidConfig(_))));
        let bad_layers = TrainConfig { network: NetworkSpec::new(vec![3], ActivationFunction::ReLU), ..TrainConfig::default() };
        assert!(matches!(bad_layers.validate(), Err(NnError::InvalidArchitecture(_))));
    }
}
