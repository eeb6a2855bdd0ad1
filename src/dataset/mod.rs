//! Dataset module
//!
//! Everything between the remote archive and a batch of tensors:
//! - Downloading and extracting the dataset archive
//! - Building the (path, label) manifest and the seeded 90/10 split
//! - Label encoding and inverse-frequency class weights
//! - Per-image preprocessing, batch augmentation and the prefetching pipeline

pub mod augmentation;
pub mod burn_dataset;
pub mod class_weights;
pub mod download;
pub mod labels;
pub mod manifest;
pub mod pipeline;
pub mod preprocess;
pub mod preview;
pub mod split;

pub use augmentation::{AugmentationConfig, BatchAugmenter};
pub use burn_dataset::{EncodedSample, SpoofBatch, SpoofBatcher, SpoofDataset, SpoofItem};
pub use class_weights::ClassWeights;
pub use download::{acquire_dataset, download_archive, extract_archive};
pub use labels::LabelEncoder;
pub use manifest::{build_manifest, ManifestStats, Sample};
pub use pipeline::{DataPipeline, PipelineMode, PreparedBatch};
pub use preprocess::{preprocess_eval, preprocess_train, ImageTensor};
pub use split::{split_manifest, DatasetSplit};
