use thiserror::Error;

/// Errors produced by the matrix engine, the network and its I/O helpers.
#[derive(Debug, Error)]
pub enum NnError {
    /// Two operands have incompatible shapes for `op`.
    #[error("dimension mismatch in {op}: {left:?} vs {right:?}")]
    DimensionMismatch {
        op: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },

    /// A flat value sequence does not fill a `rows × cols` matrix exactly.
    #[error("cannot build a {rows}x{cols} matrix from {len} values")]
    DataLength { rows: usize, cols: usize, len: usize },

    /// Batch inputs and targets have different lengths.
    #[error("batch size mismatch: {inputs} inputs but {targets} targets")]
    SizeMismatch { inputs: usize, targets: usize },

    #[error("batch is empty")]
    EmptyBatch,

    #[error("index ({row}, {col}) out of bounds for a {rows}x{cols} matrix")]
    InvalidIndex {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    /// The model stream ended early or declared an impossible layout.
    #[error("corrupt or truncated model: {0}")]
    CorruptOrTruncated(String),

    #[error("invalid architecture: {0}")]
    InvalidArchitecture(String),

    /// A training hyperparameter is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, NnError>;
