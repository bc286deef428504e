pub mod gradients;
pub mod network;
pub mod persist;
pub mod spec;

pub use gradients::Gradients;
pub use network::{Evaluation, ForwardPass, Network};
pub use spec::NetworkSpec;
