//! Model module
//!
//! MobileNetV3-Small backbone and the spoof classification head built on it.

pub mod backbone;
pub mod classifier;

pub use backbone::{MobileNetV3Small, MobileNetV3SmallConfig};
pub use classifier::{build_model, SpoofClassifier, SpoofClassifierConfig};
