//! Plain tar archives of export directories

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::utils::error::{Result, SpoofError};

/// Pack `dir` into an uncompressed tar at `tar_path`.
///
/// Entries are rooted at the directory's own name, so `saved-model/` packs
/// as `saved-model/model.mpk`, `saved-model/metadata.json` and so on.
pub fn archive_directory(dir: &Path, tar_path: &Path) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(SpoofError::PathNotFound(dir.to_path_buf()));
    }
    let root = dir
        .file_name()
        .ok_or_else(|| SpoofError::Export(format!("Cannot archive {:?}: no directory name", dir)))?;

    if let Some(parent) = tar_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(tar_path)?;
    let mut builder = tar::Builder::new(file);
    builder.follow_symlinks(false);
    builder.append_dir_all(root, dir)?;
    builder.into_inner()?.sync_all()?;

    info!("Archived {:?} -> {:?}", dir, tar_path);
    Ok(tar_path.to_path_buf())
}
