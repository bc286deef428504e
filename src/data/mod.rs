pub mod idx;
pub mod image;

pub use idx::{one_hot, read_images, read_labels, Dataset};
pub use self::image::image_to_input;
