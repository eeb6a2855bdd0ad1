//! Dataset acquisition
//!
//! Fetches the dataset archive over HTTP and unpacks it. Both steps are skipped
//! when their output already exists, so re-running the pipeline is cheap.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::config::DatasetConfig;
use crate::utils::error::{Result, SpoofError};

/// Download `url` to `dest`, streaming the body to disk
pub fn download_archive(url: &str, dest: &Path) -> Result<PathBuf> {
    if dest.exists() {
        info!("Archive already present at {:?}, skipping download", dest);
        return Ok(dest.to_path_buf());
    }

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    info!("Downloading {}", url);
    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| SpoofError::Download(format!("GET {} failed: {}", url, e)))?;

    let pb = match response.content_length() {
        Some(len) => ProgressBar::new(len),
        None => ProgressBar::new_spinner(),
    };
    if let Ok(style) = ProgressStyle::default_bar()
        .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }

    // Write to a temporary name so an interrupted download is never mistaken
    // for a complete archive on the next run
    let partial = dest.with_extension("part");
    {
        let file = File::create(&partial)?;
        let mut writer = pb.wrap_write(BufWriter::new(file));
        response
            .copy_to(&mut writer)
            .map_err(|e| SpoofError::Download(format!("Reading {} failed: {}", url, e)))?;
        writer.flush()?;
    }
    fs::rename(&partial, dest)?;
    pb.finish_and_clear();

    info!("Saved archive to {:?}", dest);
    Ok(dest.to_path_buf())
}

/// Unpack a `.zip`, `.tar` or `.tar.gz`/`.tgz` archive into `dest_dir`
pub fn extract_archive(archive: &Path, dest_dir: &Path) -> Result<()> {
    if !archive.exists() {
        return Err(SpoofError::PathNotFound(archive.to_path_buf()));
    }
    fs::create_dir_all(dest_dir)?;

    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let reader = BufReader::new(File::open(archive)?);

    info!("Extracting {:?} into {:?}", archive, dest_dir);
    if name.ends_with(".zip") {
        let mut zip = zip::ZipArchive::new(reader)
            .map_err(|e| SpoofError::Dataset(format!("Corrupt zip {:?}: {}", archive, e)))?;
        zip.extract(dest_dir)
            .map_err(|e| SpoofError::Dataset(format!("Failed to extract {:?}: {}", archive, e)))?;
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        tar::Archive::new(GzDecoder::new(reader))
            .unpack(dest_dir)
            .map_err(|e| SpoofError::Dataset(format!("Failed to extract {:?}: {}", archive, e)))?;
    } else if name.ends_with(".tar") {
        tar::Archive::new(reader)
            .unpack(dest_dir)
            .map_err(|e| SpoofError::Dataset(format!("Failed to extract {:?}: {}", archive, e)))?;
    } else {
        return Err(SpoofError::Dataset(format!("Unsupported archive format: {:?}", archive)));
    }
    Ok(())
}

/// Download and unpack the dataset, returning the manifest root
pub fn acquire_dataset(config: &DatasetConfig) -> Result<PathBuf> {
    if config.data_dir.is_dir() {
        info!("Dataset already extracted at {:?}", config.data_dir);
        return Ok(config.data_dir.clone());
    }

    let archive = download_archive(&config.url, &config.archive_path)?;

    // Archives carry their top-level directory, so unpack next to data_dir
    let extract_to = config
        .data_dir
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    extract_archive(&archive, &extract_to)?;

    if !config.data_dir.is_dir() {
        return Err(SpoofError::Dataset(format!(
            "Archive {:?} did not contain {:?}",
            archive, config.data_dir
        )));
    }
    Ok(config.data_dir.clone())
}
