//! # Spoof Detection
//!
//! Fine-tunes a binary spoof-vs-real face image classifier on top of an
//! ImageNet-pretrained MobileNetV3-Small backbone using the Burn framework,
//! then exports the trained model for native and browser deployment.
//!
//! ## Modules
//!
//! - `dataset`: Download, manifest, split, label encoding, class weights and the data pipeline
//! - `model`: MobileNetV3-Small backbone and classification head
//! - `training`: Training loop, weighted loss, early stopping, callbacks and evaluation
//! - `export`: Saved-model and web-model directories plus tar archives
//! - `utils`: Errors, logging, charts and formatting helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spoof_detection::config::PipelineConfig;
//! use spoof_detection::run::run_training;
//!
//! let config = PipelineConfig::default();
//! let report = run_training(&config)?;
//! println!("Accuracy: {:.2}%", report.evaluation.accuracy * 100.0);
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod export;
pub mod model;
pub mod run;
pub mod training;
pub mod utils;

pub use config::PipelineConfig;
pub use dataset::{ClassWeights, DataPipeline, LabelEncoder, Sample};
pub use model::{MobileNetV3Small, SpoofClassifier, SpoofClassifierConfig};
pub use training::{EarlyStopping, Trainer, TrainingHistory};
pub use utils::error::{Result, SpoofError};

/// Number of output classes (real, spoof)
pub const NUM_CLASSES: usize = 2;

/// Square input size expected by the model
pub const IMAGE_SIZE: usize = 224;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
