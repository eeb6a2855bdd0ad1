//! Manifest builder
//!
//! Enumerates every image under the dataset root and labels it with the name of
//! its immediate parent directory:
//!
//! ```text
//! spoof-dataset-final/
//! ├── real/
//! │   ├── 0001.jpg
//! │   └── ...
//! └── spoof/
//!     └── ...
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::utils::error::{Result, ResultExt, SpoofError};
use crate::utils::{format_number, format_progress_bar};

/// File extensions recognised as images
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

/// One image file and its string label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub path: PathBuf,
    pub label: String,
}

/// Whether a path has one of the recognised image extensions
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Walk `root` recursively and collect every image with its parent-directory label.
///
/// Entries are visited in file-name order so the enumeration, and therefore the
/// seeded split built on top of it, is identical across runs and platforms.
pub fn build_manifest<P: AsRef<Path>>(root: P) -> Result<Vec<Sample>> {
    let root = root.as_ref();
    info!("Building manifest from: {:?}", root);

    if !root.is_dir() {
        return Err(SpoofError::PathNotFound(root.to_path_buf()));
    }

    let mut samples = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {:?}", root))?;
        if !entry.file_type().is_file() || !is_image_file(entry.path()) {
            continue;
        }

        let label = entry
            .path()
            .parent()
            .filter(|parent| *parent != root)
            .and_then(|parent| parent.file_name())
            .map(|name| name.to_string_lossy().to_string());

        match label {
            Some(label) => samples.push(Sample {
                path: entry.path().to_path_buf(),
                label,
            }),
            None => debug!("Skipping unlabeled image at dataset root: {:?}", entry.path()),
        }
    }

    if samples.is_empty() {
        return Err(SpoofError::Dataset(format!("No images found under {:?}", root)));
    }

    info!("Found {} images", format_number(samples.len()));
    Ok(samples)
}

/// Per-label image counts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestStats {
    pub total: usize,
    pub per_label: BTreeMap<String, usize>,
}

impl ManifestStats {
    pub fn from_samples(samples: &[Sample]) -> Self {
        let mut per_label = BTreeMap::new();
        for sample in samples {
            *per_label.entry(sample.label.clone()).or_insert(0) += 1;
        }
        Self {
            total: samples.len(),
            per_label,
        }
    }

    pub fn num_labels(&self) -> usize {
        self.per_label.len()
    }

    /// Print a per-label bar chart
    pub fn print(&self) {
        println!("\n{}", "Dataset Statistics".cyan().bold());
        println!("  Total images: {}", format_number(self.total));
        println!("  Labels:       {}", self.per_label.len());

        let total = self.total.max(1) as f64;
        for (label, count) in &self.per_label {
            println!(
                "  {:<16} {:>8} {}",
                label,
                format_number(*count),
                format_progress_bar(*count as f64 / total, 30).green()
            );
        }
        println!();
    }
}
