pub mod error;
pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod data;
pub mod train;

// Convenience re-exports
pub use error::{NnError, Result};
pub use math::matrix::{Axis, Matrix};
pub use activation::activation::ActivationFunction;
pub use layers::dense::Layer;
pub use network::network::{Evaluation, ForwardPass, Network};
pub use network::gradients::Gradients;
pub use network::spec::NetworkSpec;
pub use loss::cross_entropy::CrossEntropyLoss;
pub use data::idx::Dataset;
pub use train::{train_loop, EpochStats, TrainConfig};
