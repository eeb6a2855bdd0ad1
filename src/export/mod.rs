//! Export module
//!
//! Native and browser model directories, the optional external converter,
//! and tar packaging of both directories.

pub mod archive;
pub mod saved_model;
pub mod web_model;

pub use archive::archive_directory;
pub use saved_model::{export_saved_model, load_saved_model, ModelMetadata};
pub use web_model::{export_web_model, run_external_converter, WebModelManifest};
