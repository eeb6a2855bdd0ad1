//! Training module
//!
//! Supervised fine-tuning of the spoof classifier:
//! - Class-weighted cross-entropy with Adam
//! - Early stopping on validation accuracy with best-weight restore
//! - CSV and JSON-lines epoch callbacks
//! - Deterministic evaluation on the inner (non-autodiff) backend

pub mod callbacks;
pub mod early_stopping;
pub mod evaluator;
pub mod history;
pub mod loss;
pub mod trainer;

pub use callbacks::{CsvLogger, EpochCallback, Histogram, MetricsRecorder};
pub use early_stopping::{EarlyStopping, Monitor, StoppingDecision};
pub use evaluator::{evaluate, EvalMetrics};
pub use history::{plot_history, EpochMetrics, TrainingHistory};
pub use loss::{correct_count, cross_entropy, weighted_cross_entropy};
pub use trainer::{Trainer, TrainingOutcome, TrainingResult};
