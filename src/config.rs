//! Pipeline configuration
//!
//! One serde document covering every stage of the run. `Default` reproduces the
//! reference training run: 90/10 split with seed 42, 260px resize with 224px
//! crops, batches of 256, up to 100 epochs of Adam at 1e-3 with early stopping
//! on validation accuracy.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::augmentation::AugmentationConfig;
use crate::model::SpoofClassifierConfig;
use crate::utils::error::{Result, SpoofError};

pub const DATASET_URL: &str =
    "https://github.com/Codebugged-Research/ExamOnlineFinal/releases/download/1.0.0.0/spoof-dataset-final.zip";

/// Complete configuration for a training run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dataset: DatasetConfig,
    pub preprocessing: PreprocessingConfig,
    pub augmentation: AugmentationConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub export: ExportConfig,
}

/// Where the data comes from and how it is split
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Archive URL
    pub url: String,
    /// Local path of the downloaded archive
    pub archive_path: PathBuf,
    /// Directory the archive extracts into (the manifest root)
    pub data_dir: PathBuf,
    /// Fraction of samples assigned to training
    pub train_split: f64,
    /// Seed for the global shuffle before splitting
    pub seed: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            url: DATASET_URL.to_string(),
            archive_path: PathBuf::from("spoof-dataset-final.zip"),
            data_dir: PathBuf::from("spoof-dataset-final"),
            train_split: 0.9,
            seed: 42,
        }
    }
}

/// Decoding, resizing and batching
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    /// Final square input size fed to the model
    pub image_size: usize,
    /// Intermediate square size before random cropping (training only)
    pub resize_to: usize,
    pub batch_size: usize,
    /// Decode workers; `None` uses all available cores
    pub num_workers: Option<usize>,
    /// Batches buffered ahead of the consumer
    pub prefetch: usize,
    /// Reshuffle the training order each epoch
    pub shuffle: bool,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            image_size: 224,
            resize_to: 260,
            batch_size: 256,
            num_workers: None,
            prefetch: 2,
            shuffle: true,
        }
    }
}

impl PreprocessingConfig {
    pub fn workers(&self) -> usize {
        self.num_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// Classifier head and backbone options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub num_classes: usize,
    pub dense_units: usize,
    pub dropout: f64,
    /// Fine-tune the backbone instead of keeping it frozen
    pub trainable_backbone: bool,
    /// Burn record holding the ImageNet-pretrained backbone
    pub pretrained_weights: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            num_classes: 2,
            dense_units: 512,
            dropout: 0.5,
            trainable_backbone: false,
            pretrained_weights: Some(PathBuf::from("weights/mobilenet_v3_small_imagenet.mpk")),
        }
    }
}

impl ModelConfig {
    pub fn classifier_config(&self) -> SpoofClassifierConfig {
        SpoofClassifierConfig::new(self.num_classes)
            .with_dense_units(self.dense_units)
            .with_dropout(self.dropout)
            .with_trainable_backbone(self.trainable_backbone)
    }
}

/// Optimizer, epochs and callbacks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub beta_1: f32,
    pub beta_2: f32,
    pub epsilon: f32,
    /// Epochs without val_accuracy improvement before stopping
    pub patience: usize,
    pub min_delta: f64,
    /// Weight the training loss by inverse class frequency
    pub use_class_weights: bool,
    /// Record weight histograms every N epochs (0 disables)
    pub histogram_freq: usize,
    /// Base seed for crops and augmentation
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            learning_rate: 1e-3,
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-7,
            patience: 2,
            min_delta: 0.0,
            use_class_weights: true,
            histogram_freq: 1,
            seed: 42,
        }
    }
}

/// Output locations, all relative to `output_dir`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub csv_log: String,
    pub log_dir: String,
    pub history: String,
    pub plot: String,
    pub preview: Option<String>,
    pub saved_model_dir: String,
    pub web_model_dir: String,
    pub saved_model_archive: String,
    pub web_model_archive: String,
    /// External program invoked as `<converter> <saved_model_dir> <web_model_dir>`
    pub converter: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            csv_log: "train-logs.csv".to_string(),
            log_dir: "logs".to_string(),
            history: "history.json".to_string(),
            plot: "training-progress.svg".to_string(),
            preview: Some("training-preview.png".to_string()),
            saved_model_dir: "saved-model".to_string(),
            web_model_dir: "web_model".to_string(),
            saved_model_archive: "saved-model.tar".to_string(),
            web_model_archive: "web_model.tar".to_string(),
            converter: None,
        }
    }
}

impl ExportConfig {
    /// Resolve an output name against `output_dir`
    pub fn path(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }
}

impl PipelineConfig {
    /// Load a configuration from JSON; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SpoofError::PathNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(SpoofError::Config(msg.to_string()));

        let split = self.dataset.train_split;
        if !(split > 0.0 && split < 1.0) {
            return invalid("dataset.train_split must be in (0, 1)");
        }
        let pre = &self.preprocessing;
        if pre.image_size == 0 || pre.batch_size == 0 {
            return invalid("preprocessing.image_size and batch_size must be positive");
        }
        if pre.resize_to < pre.image_size {
            return invalid("preprocessing.resize_to must be >= image_size");
        }
        if pre.prefetch == 0 || pre.num_workers == Some(0) {
            return invalid("preprocessing.prefetch and num_workers must be positive");
        }
        if self.model.num_classes < 2 {
            return invalid("model.num_classes must be at least 2");
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            return invalid("model.dropout must be in [0, 1)");
        }
        if self.training.epochs == 0 {
            return invalid("training.epochs must be positive");
        }
        if self.training.learning_rate <= 0.0 {
            return invalid("training.learning_rate must be positive");
        }
        self.augmentation.validate()?;
        Ok(())
    }
}
