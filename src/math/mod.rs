pub mod kernels;
pub mod matrix;

pub use matrix::{Axis, Matrix};
