//! Native saved-model directory
//!
//! Layout:
//! - `model.mpk`: full classifier record, full-precision named MessagePack
//! - `metadata.json`: classes, input shape and the architecture config needed
//!   to rebuild the module before loading the record

use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::Backend,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ModelConfig;
use crate::dataset::LabelEncoder;
use crate::model::SpoofClassifier;
use crate::utils::error::{Result, SpoofError};

/// Record stem; the recorder appends `.mpk`
pub const WEIGHTS_STEM: &str = "model";
pub const METADATA_FILE: &str = "metadata.json";

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// Everything needed to rebuild and interpret an exported model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Class names in index order
    pub classes: Vec<String>,
    /// `[height, width, channels]`
    pub input_shape: [usize; 3],
    pub model: ModelConfig,
    pub backend: String,
    pub created_at: String,
    pub version: String,
}

impl ModelMetadata {
    pub fn new(encoder: &LabelEncoder, image_size: usize, model: &ModelConfig) -> Self {
        Self {
            classes: encoder.classes().to_vec(),
            input_shape: [image_size, image_size, 3],
            model: model.clone(),
            backend: crate::backend::backend_name().to_string(),
            created_at: Utc::now().to_rfc3339(),
            version: crate::VERSION.to_string(),
        }
    }

    pub fn encoder(&self) -> LabelEncoder {
        LabelEncoder::from_classes(self.classes.clone())
    }

    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(METADATA_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(METADATA_FILE);
        if !path.exists() {
            return Err(SpoofError::PathNotFound(path));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Write `model.mpk` and `metadata.json` into `dir`, creating it if needed
pub fn export_saved_model<B: Backend>(
    model: &SpoofClassifier<B>,
    dir: &Path,
    metadata: &ModelMetadata,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    model
        .clone()
        .save_file(dir.join(WEIGHTS_STEM), &recorder())
        .map_err(|e| SpoofError::Export(format!("Failed to save model record: {:?}", e)))?;
    metadata.save(dir)?;

    info!("Saved model to {:?}", dir);
    Ok(dir.to_path_buf())
}

/// Rebuild the classifier described by `metadata.json` and load its record
pub fn load_saved_model<B: Backend>(
    dir: &Path,
    device: &B::Device,
) -> Result<(SpoofClassifier<B>, ModelMetadata)> {
    let metadata = ModelMetadata::load(dir)?;
    let record_path = dir.join(format!("{}.mpk", WEIGHTS_STEM));
    if !record_path.exists() {
        return Err(SpoofError::PathNotFound(record_path));
    }

    let model = metadata
        .model
        .classifier_config()
        .init::<B>(device)
        .load_file(dir.join(WEIGHTS_STEM), &recorder(), device)
        .map_err(|e| SpoofError::Model(format!("Failed to load model record: {:?}", e)))?;

    info!("Loaded model from {:?} ({} classes)", dir, metadata.classes.len());
    Ok((model, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;
    use tempfile::tempdir;

    type TestBackend = NdArray;

    fn small_config() -> ModelConfig {
        ModelConfig {
            dense_units: 8,
            pretrained_weights: None,
            ..Default::default()
        }
    }

    #[test]
    fn test_saved_model_reloads_identically() {
        let dir = tempdir().unwrap();
        let export_dir = dir.path().join("saved-model");
        let device = Default::default();
        let config = small_config();
        let model = config.classifier_config().init::<TestBackend>(&device);
        let encoder = LabelEncoder::from_classes(vec!["real".to_string(), "spoof".to_string()]);
        let metadata = ModelMetadata::new(&encoder, 32, &config);

        export_saved_model(&model, &export_dir, &metadata).unwrap();
        assert!(export_dir.join("model.mpk").exists());
        assert!(export_dir.join(METADATA_FILE).exists());

        let (loaded, loaded_meta) = load_saved_model::<TestBackend>(&export_dir, &device).unwrap();
        assert_eq!(loaded_meta.classes, vec!["real", "spoof"]);
        assert_eq!(loaded_meta.input_shape, [32, 32, 3]);
        assert_eq!(loaded_meta.encoder().encode("spoof").unwrap(), 1);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device).mul_scalar(50.0);
        let before = model.forward(input.clone()).into_data().to_vec::<f32>().unwrap();
        let after = loaded.forward(input).into_data().to_vec::<f32>().unwrap();
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_load_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let result = load_saved_model::<TestBackend>(&dir.path().join("nope"), &Default::default());
        assert!(matches!(result, Err(SpoofError::PathNotFound(_))));
    }
}
