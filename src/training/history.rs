//! Per-epoch training history

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::charts::{generate_line_chart, DataSeries, COLOR_BLUE, COLOR_GREEN, COLOR_ORANGE, COLOR_RED};
use crate::utils::error::Result;

/// Metrics for one epoch (0-indexed)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

/// Keras-style history: one list per metric, indexed by epoch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub accuracy: Vec<f64>,
    pub loss: Vec<f64>,
    pub val_accuracy: Vec<f64>,
    pub val_loss: Vec<f64>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metrics: &EpochMetrics) {
        self.accuracy.push(metrics.accuracy);
        self.loss.push(metrics.loss);
        self.val_accuracy.push(metrics.val_accuracy);
        self.val_loss.push(metrics.val_loss);
    }

    pub fn len(&self) -> usize {
        self.loss.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loss.is_empty()
    }

    pub fn epoch(&self, epoch: usize) -> Option<EpochMetrics> {
        Some(EpochMetrics {
            epoch,
            loss: *self.loss.get(epoch)?,
            accuracy: *self.accuracy.get(epoch)?,
            val_loss: *self.val_loss.get(epoch)?,
            val_accuracy: *self.val_accuracy.get(epoch)?,
        })
    }

    /// Epoch index and value of the highest validation accuracy
    pub fn best_val_accuracy(&self) -> Option<(usize, f64)> {
        self.val_accuracy
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (i, v)| match best {
                Some((_, b)) if b >= v => best,
                _ => Some((i, v)),
            })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// The four curves in plotting order
    pub fn series(&self) -> Vec<DataSeries> {
        vec![
            DataSeries::from_values("train_acc", &self.accuracy, COLOR_BLUE),
            DataSeries::from_values("val_acc", &self.val_accuracy, COLOR_GREEN),
            DataSeries::from_values("train_loss", &self.loss, COLOR_ORANGE),
            DataSeries::from_values("val_loss", &self.val_loss, COLOR_RED),
        ]
    }
}

/// Write the training progress chart (accuracy and loss vs epoch) as SVG
pub fn plot_history(history: &TrainingHistory, path: &Path) -> Result<()> {
    generate_line_chart(
        "Training Progress",
        "Epochs",
        "Accuracy/Loss",
        &history.series(),
        path,
    )?;
    Ok(())
}
