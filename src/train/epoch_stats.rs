use serde::{Serialize, Deserialize};

/// Per-epoch training statistics returned by `train_loop`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    pub total_epochs: usize,
    /// Mean cross-entropy over all samples, each measured just before the
    /// update of the batch it belonged to.
    pub train_loss: f64,
    /// Training accuracy after the epoch, as a fraction in [0, 1].
    pub train_accuracy: f64,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}
