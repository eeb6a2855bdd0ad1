//! Browser-loadable model directory
//!
//! `weights.json` holds the full-precision record as plain JSON so it can be
//! fetched and parsed without a binary decoder; `model.json` describes the
//! input contract and points at the weights file.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use burn::{
    module::Module,
    record::{FullPrecisionSettings, PrettyJsonFileRecorder},
    tensor::backend::Backend,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::export::saved_model::ModelMetadata;
use crate::model::SpoofClassifier;
use crate::utils::error::{Result, SpoofError};

pub const MANIFEST_FILE: &str = "model.json";
/// Record stem; the recorder appends `.json`
pub const WEIGHTS_STEM: &str = "weights";

pub const FORMAT: &str = "burn-json";
/// Tensor layout `SpoofClassifier::forward` accepts
pub const INPUT_LAYOUT: &str = "NCHW";

/// Input normalisation the backbone applies internally
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputRescaling {
    pub scale: f64,
    pub offset: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebModelManifest {
    pub format: String,
    pub weights: String,
    pub weights_bytes: u64,
    /// Pixel layout the caller feeds, `[batch, 3, height, width]`
    pub input_layout: String,
    pub rescaling: InputRescaling,
    pub output: String,
    #[serde(flatten)]
    pub metadata: ModelMetadata,
}

impl WebModelManifest {
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Err(SpoofError::PathNotFound(path));
        }
        Ok(serde_json::from_str(&fs::read_to_string(&path)?)?)
    }
}

/// Write `weights.json` and `model.json` into `dir`
pub fn export_web_model<B: Backend>(
    model: &SpoofClassifier<B>,
    dir: &Path,
    metadata: &ModelMetadata,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let recorder = PrettyJsonFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(dir.join(WEIGHTS_STEM), &recorder)
        .map_err(|e| SpoofError::Export(format!("Failed to write web weights: {:?}", e)))?;

    let weights_name = format!("{}.json", WEIGHTS_STEM);
    let weights_bytes = fs::metadata(dir.join(&weights_name))?.len();

    let manifest = WebModelManifest {
        format: FORMAT.to_string(),
        weights: weights_name,
        weights_bytes,
        input_layout: INPUT_LAYOUT.to_string(),
        rescaling: InputRescaling {
            scale: 1.0 / 127.5,
            offset: -1.0,
        },
        output: "softmax".to_string(),
        metadata: metadata.clone(),
    };
    fs::write(dir.join(MANIFEST_FILE), serde_json::to_string_pretty(&manifest)?)?;

    info!("Saved web model to {:?} ({} bytes of weights)", dir, weights_bytes);
    Ok(dir.to_path_buf())
}

/// Run `<program> <saved_model_dir> <web_model_dir>`; any failure is fatal
pub fn run_external_converter(program: &str, saved_model_dir: &Path, web_model_dir: &Path) -> Result<()> {
    info!("Running converter {:?} on {:?}", program, saved_model_dir);
    fs::create_dir_all(web_model_dir)?;

    let status = Command::new(program)
        .arg(saved_model_dir)
        .arg(web_model_dir)
        .status()
        .map_err(|e| SpoofError::Export(format!("Failed to launch converter {:?}: {}", program, e)))?;

    if !status.success() {
        return Err(SpoofError::Export(format!(
            "Converter {:?} exited with {}",
            program, status
        )));
    }
    Ok(())
}
