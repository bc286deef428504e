use std::time::Instant;

use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::data::idx::one_hot;
use crate::error::{NnError, Result};
use crate::math::matrix::Matrix;
use crate::network::network::Network;
use crate::train::epoch_stats::EpochStats;
use crate::train::train_config::TrainConfig;

/// Batches between progress lines at debug level.
const LOG_EVERY: usize = 100;

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Trains `network` for `config.epochs` epochs and returns the statistics of
/// every completed epoch.
///
/// # Arguments
/// - `network`: modified in place
/// - `inputs`: training rows, each `(1, network.input_size())`
/// - `labels`: class index per input, each below `network.output_size()`
/// - `config`: learning rate, epoch count and batch size; its
///   `network` and `seed` fields are not consulted here
/// - `rng`: drives the per-epoch shuffle
///
/// # Errors
/// `SizeMismatch` if the slices differ in length, `EmptyBatch` for an empty
/// training set or a zero batch size, `InvalidDataset` for an out-of-range
/// label, plus any shape error from the network.
pub fn train_loop<R: Rng + ?Sized>(
    network: &mut Network,
    inputs: &[Matrix],
    labels: &[u8],
    config: &TrainConfig,
    rng: &mut R,
) -> Result<Vec<EpochStats>> {
    if inputs.len() != labels.len() {
        return Err(NnError::SizeMismatch { inputs: inputs.len(), targets: labels.len() });
    }
    if inputs.is_empty() || config.batch_size == 0 {
        return Err(NnError::EmptyBatch);
    }
    let targets = labels
        .iter()
        .map(|&l| one_hot(l, network.output_size()))
        .collect::<Result<Vec<_>>>()?;

    if inputs.len() % config.batch_size != 0 {
        warn!(
            "{} samples do not divide into batches of {}; the last batch of each epoch is short",
            inputs.len(),
            config.batch_size
        );
    }

    let mut history = Vec::with_capacity(config.epochs);
    for epoch in 1..=config.epochs {
        let t_start = Instant::now();

        let train_loss = run_one_epoch(network, inputs, &targets, config, rng)?;
        let train_accuracy = network.evaluate(inputs, labels)?.accuracy();
        let elapsed_ms = t_start.elapsed().as_millis() as u64;

        info!(
            "epoch {:02}/{}: loss {:.4}, accuracy {:.2}%, {} ms",
            epoch,
            config.epochs,
            train_loss,
            train_accuracy * 100.0,
            elapsed_ms
        );
        history.push(EpochStats {
            epoch,
            total_epochs: config.epochs,
            train_loss,
            train_accuracy,
            elapsed_ms,
        });
    }

    Ok(history)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// One shuffled pass of mini-batch SGD. Returns the mean per-sample loss.
fn run_one_epoch<R: Rng + ?Sized>(
    network: &mut Network,
    inputs: &[Matrix],
    targets: &[Matrix],
    config: &TrainConfig,
    rng: &mut R,
) -> Result<f64> {
    let n = inputs.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);

    let n_batches = (n + config.batch_size - 1) / config.batch_size;
    let mut total_loss = 0.0;

    for (b, batch) in order.chunks(config.batch_size).enumerate() {
        let batch_loss = if let [idx] = batch {
            network.back_propagate(&inputs[*idx], &targets[*idx], config.learning_rate)?
        } else {
            let batch_inputs: Vec<Matrix> = batch.iter().map(|&i| inputs[i].clone()).collect();
            let batch_targets: Vec<Matrix> = batch.iter().map(|&i| targets[i].clone()).collect();
            network.back_propagate_batch(&batch_inputs, &batch_targets, config.learning_rate)?
        };
        total_loss += batch_loss * batch.len() as f64;

        if (b + 1) % LOG_EVERY == 0 {
            debug!("batch {}/{}, loss {:.4}", b + 1, n_batches, batch_loss);
        }
    }

    Ok(total_loss / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::activation::ActivationFunction;
    use rand::{rngs::StdRng, SeedableRng};

    /// Two well-separated clusters in the plane.
    fn clusters(rng: &mut StdRng, n: usize) -> (Vec<Matrix>, Vec<u8>) {
        (0..n)
            .map(|i| {
                let label = (i % 2) as u8;
                let centre = if label == 0 { -1.0 } else { 1.0 };
                let x = centre + rng.gen_range(-0.3..0.3);
                let y = -centre + rng.gen_range(-0.3..0.3);
                (Matrix::row_vector(vec![x, y]), label)
            })
            .unzip()
    }

    #[test]
    fn learns_separable_clusters() {
        let mut rng = StdRng::seed_from_u64(42);
        let (inputs, labels) = clusters(&mut rng, 64);
        let mut net = Network::new(&[2, 8, 2], ActivationFunction::ReLU, &mut rng).unwrap();
        let config = TrainConfig { learning_rate: 0.2, epochs: 50, batch_size: 8, ..TrainConfig::default() };

        let history = train_loop(&mut net, &inputs, &labels, &config, &mut rng).unwrap();
        assert_eq!(history.len(), 50);
        assert_eq!(history[49].epoch, 50);
        assert!(history[49].train_loss < history[0].train_loss);
        assert!(history[49].train_accuracy > 0.95);
    }

    #[test]
    fn online_mode_and_short_last_batch() {
        let mut rng = StdRng::seed_from_u64(5);
        let (inputs, labels) = clusters(&mut rng, 10);
        let mut net = Network::new(&[2, 4, 2], ActivationFunction::Sigmoid, &mut rng).unwrap();
        for batch_size in [1, 3] {
            let config = TrainConfig { learning_rate: 0.1, epochs: 2, batch_size, ..TrainConfig::default() };
            let history = train_loop(&mut net, &inputs, &labels, &config, &mut rng).unwrap();
            assert!(history.iter().all(|s| s.train_loss.is_finite()));
        }
    }

    #[test]
    fn rejects_inconsistent_inputs() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut net = Network::new(&[2, 2], ActivationFunction::ReLU, &mut rng).unwrap();
        let config = TrainConfig::default();
        let x = vec![Matrix::row_vector(vec![0.0, 1.0])];
        assert!(matches!(
            train_loop(&mut net, &x, &[0, 1], &config, &mut rng),
            Err(NnError::SizeMismatch { .. })
        ));
        assert!(matches!(train_loop(&mut net, &[], &[], &config, &mut rng), Err(NnError::EmptyBatch)));
        assert!(matches!(
            train_loop(&mut net, &x, &[7], &config, &mut rng),
            Err(NnError::InvalidDataset(_))
        ));
        let zero = TrainConfig { batch_size: 0, ..TrainConfig::default() };
        assert!(train_loop(&mut net, &x, &[0], &zero, &mut rng).is_err());
    }
}
