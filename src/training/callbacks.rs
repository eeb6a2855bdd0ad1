//! Epoch-end callbacks: CSV log and metrics recorder

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use burn::tensor::{backend::Backend, Tensor};
use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use crate::model::SpoofClassifier;
use crate::training::history::EpochMetrics;
use crate::utils::error::{Result, SpoofError};

/// Hook invoked by the trainer around the epoch loop
pub trait EpochCallback<B: Backend> {
    fn on_train_begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_epoch_end(&mut self, metrics: &EpochMetrics, model: &SpoofClassifier<B>) -> Result<()>;

    fn on_train_end(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct CsvRow {
    epoch: usize,
    accuracy: f64,
    loss: f64,
    val_accuracy: f64,
    val_loss: f64,
}

/// Streams one row per epoch to a CSV file, overwriting any previous log
pub struct CsvLogger {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
}

impl CsvLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> Result<&mut csv::Writer<File>> {
        if self.writer.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            self.writer = Some(csv::Writer::from_path(&self.path)?);
        }
        self.writer
            .as_mut()
            .ok_or_else(|| SpoofError::Training("CSV writer unavailable".to_string()))
    }
}

impl<B: Backend> EpochCallback<B> for CsvLogger {
    fn on_train_begin(&mut self) -> Result<()> {
        self.writer = None;
        self.writer()?;
        Ok(())
    }

    fn on_epoch_end(&mut self, metrics: &EpochMetrics, _model: &SpoofClassifier<B>) -> Result<()> {
        let writer = self.writer()?;
        writer.serialize(CsvRow {
            epoch: metrics.epoch,
            accuracy: metrics.accuracy,
            loss: metrics.loss,
            val_accuracy: metrics.val_accuracy,
            val_loss: metrics.val_loss,
        })?;
        writer.flush()?;
        Ok(())
    }

    fn on_train_end(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Fixed-bin histogram of a weight tensor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub counts: Vec<usize>,
}

impl Histogram {
    pub fn from_values(values: &[f32], bins: usize) -> Self {
        let bins = bins.max(1);
        if values.is_empty() {
            return Self {
                min: 0.0,
                max: 0.0,
                mean: 0.0,
                counts: vec![0; bins],
            };
        }

        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        let width = (max - min) / bins as f32;

        let mut counts = vec![0; bins];
        for v in values {
            let bin = if width > 0.0 {
                (((v - min) / width) as usize).min(bins - 1)
            } else {
                0
            };
            counts[bin] += 1;
        }

        Self { min, max, mean, counts }
    }
}

#[derive(Serialize)]
struct MetricsEvent<'a> {
    timestamp: String,
    #[serde(flatten)]
    metrics: &'a EpochMetrics,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    histograms: Vec<(String, Histogram)>,
}

/// Appends scalar metrics, and periodically head weight histograms, to
/// `<log_dir>/metrics.jsonl`
pub struct MetricsRecorder {
    log_dir: PathBuf,
    histogram_freq: usize,
    bins: usize,
    writer: Option<BufWriter<File>>,
}

impl MetricsRecorder {
    pub const FILE_NAME: &'static str = "metrics.jsonl";

    pub fn new(log_dir: impl Into<PathBuf>, histogram_freq: usize) -> Self {
        Self {
            log_dir: log_dir.into(),
            histogram_freq,
            bins: 30,
            writer: None,
        }
    }

    pub fn file_path(&self) -> PathBuf {
        self.log_dir.join(Self::FILE_NAME)
    }

    fn wants_histograms(&self, epoch: usize) -> bool {
        self.histogram_freq > 0 && epoch % self.histogram_freq == 0
    }

    fn histograms<B: Backend>(&self, model: &SpoofClassifier<B>) -> Result<Vec<(String, Histogram)>> {
        let mut out = vec![
            ("dense/weight".to_string(), self.histogram_of(model.dense.weight.val())?),
            ("output/weight".to_string(), self.histogram_of(model.output.weight.val())?),
        ];
        if let Some(bias) = &model.dense.bias {
            out.push(("dense/bias".to_string(), self.histogram_of(bias.val())?));
        }
        if let Some(bias) = &model.output.bias {
            out.push(("output/bias".to_string(), self.histogram_of(bias.val())?));
        }
        Ok(out)
    }

    fn histogram_of<B: Backend, const D: usize>(&self, tensor: Tensor<B, D>) -> Result<Histogram> {
        let values = tensor
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| SpoofError::Training(format!("Failed to read weights: {:?}", e)))?;
        Ok(Histogram::from_values(&values, self.bins))
    }
}

impl<B: Backend> EpochCallback<B> for MetricsRecorder {
    fn on_train_begin(&mut self) -> Result<()> {
        fs::create_dir_all(&self.log_dir)?;
        let file = File::create(self.file_path())?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn on_epoch_end(&mut self, metrics: &EpochMetrics, model: &SpoofClassifier<B>) -> Result<()> {
        let histograms = if self.wants_histograms(metrics.epoch) {
            self.histograms(model)?
        } else {
            Vec::new()
        };
        debug!("Recording metrics for epoch {} ({} histograms)", metrics.epoch + 1, histograms.len());

        let event = MetricsEvent {
            timestamp: Utc::now().to_rfc3339(),
            metrics,
            histograms,
        };
        let line = serde_json::to_string(&event)?;

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| SpoofError::Training("MetricsRecorder used before on_train_begin".to_string()))?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }

    fn on_train_end(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SpoofClassifierConfig;
    use burn_ndarray::NdArray;
    use tempfile::tempdir;

    type TestBackend = NdArray;

    fn metrics(epoch: usize) -> EpochMetrics {
        EpochMetrics {
            epoch,
            loss: 0.5,
            accuracy: 0.75,
            val_loss: 0.6,
            val_accuracy: 0.7,
        }
    }

    fn model() -> SpoofClassifier<TestBackend> {
        SpoofClassifierConfig::new(2)
            .with_dense_units(8)
            .init::<TestBackend>(&Default::default())
    }

    #[test]
    fn test_csv_logger_overwrites_and_writes_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("train-logs.csv");
        fs::write(&path, "stale contents\n").unwrap();
        let model = model();

        let mut logger = CsvLogger::new(&path);
        EpochCallback::<TestBackend>::on_train_begin(&mut logger).unwrap();
        logger.on_epoch_end(&metrics(0), &model).unwrap();
        logger.on_epoch_end(&metrics(1), &model).unwrap();
        EpochCallback::<TestBackend>::on_train_end(&mut logger).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "epoch,accuracy,loss,val_accuracy,val_loss");
        assert_eq!(lines[1], "0,0.75,0.5,0.7,0.6");
        assert_eq!(lines.len(), 3);
        assert!(!content.contains("stale"));
    }

    #[test]
    fn test_histogram_bins() {
        let hist = Histogram::from_values(&[0.0, 0.1, 0.5, 0.9, 1.0], 2);
        assert_eq!(hist.counts, vec![2, 3]);
        assert_eq!(hist.min, 0.0);
        assert_eq!(hist.max, 1.0);

        let flat = Histogram::from_values(&[2.0, 2.0], 4);
        assert_eq!(flat.counts, vec![2, 0, 0, 0]);
    }

    #[test]
    fn test_metrics_recorder_histogram_frequency() {
        let dir = tempdir().unwrap();
        let model = model();
        let mut recorder = MetricsRecorder::new(dir.path().join("logs"), 2);

        EpochCallback::<TestBackend>::on_train_begin(&mut recorder).unwrap();
        for epoch in 0..3 {
            recorder.on_epoch_end(&metrics(epoch), &model).unwrap();
        }
        EpochCallback::<TestBackend>::on_train_end(&mut recorder).unwrap();

        let content = fs::read_to_string(recorder.file_path()).unwrap();
        let events: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(events.len(), 3);
        assert_eq!(events[1]["epoch"], 1);
        assert!(events[0].get("histograms").is_some());
        assert!(events[1].get("histograms").is_none());
        assert!(events[2].get("histograms").is_some());

        let dense = &events[0]["histograms"][0];
        assert_eq!(dense[0], "dense/weight");
        let total: u64 = dense[1]["counts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c.as_u64().unwrap())
            .sum();
        assert_eq!(total, 576 * 8);
    }
}
