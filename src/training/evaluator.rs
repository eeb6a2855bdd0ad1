//! Full-pass evaluation on a non-autodiff backend

use burn::data::dataloader::batcher::Batcher;
use burn::module::Module;
use burn::tensor::{backend::Backend, ElementConversion};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::{DataPipeline, SpoofBatch, SpoofBatcher};
use crate::model::SpoofClassifier;
use crate::training::loss::{correct_count, cross_entropy};
use crate::utils::error::{Result, SpoofError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    /// Mean unweighted cross-entropy over all samples
    pub loss: f64,
    pub accuracy: f64,
    pub samples: usize,
}

impl EvalMetrics {
    pub fn accuracy_percent(&self) -> f64 {
        self.accuracy * 100.0
    }
}

/// One pass over `pipeline`, batch by batch.
///
/// Run this on a model without autodiff (`model.valid()`): dropout is then
/// inactive and batch norm uses running statistics, so repeated calls on the
/// same model and data give identical results.
pub fn evaluate<B: Backend>(model: &SpoofClassifier<B>, pipeline: &DataPipeline) -> Result<EvalMetrics> {
    let device = model.devices().into_iter().next().unwrap_or_default();
    let batcher = SpoofBatcher::new();

    let mut total_loss = 0.0f64;
    let mut total_correct = 0usize;
    let mut total_samples = 0usize;

    for prepared in pipeline.epoch(0) {
        let prepared = prepared?;
        if prepared.is_empty() {
            continue;
        }
        let batch: SpoofBatch<B> = batcher.batch(prepared.items, &device);
        let batch_size = batch.len();

        let logits = model.forward(batch.images);
        let loss = cross_entropy(logits.clone(), batch.targets.clone())
            .into_scalar()
            .elem::<f64>();

        total_loss += loss * batch_size as f64;
        total_correct += correct_count(logits, batch.targets);
        total_samples += batch_size;
    }

    if total_samples == 0 {
        return Err(SpoofError::Dataset("Cannot evaluate on an empty dataset".to_string()));
    }

    let metrics = EvalMetrics {
        loss: total_loss / total_samples as f64,
        accuracy: total_correct as f64 / total_samples as f64,
        samples: total_samples,
    };
    debug!(
        "Evaluated {} samples: loss {:.4}, accuracy {:.4}",
        metrics.samples, metrics.loss, metrics.accuracy
    );
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreprocessingConfig;
    use crate::dataset::preprocess::tests::write_test_image;
    use crate::dataset::{EncodedSample, SpoofDataset};
    use crate::model::SpoofClassifierConfig;
    use burn_ndarray::NdArray;
    use tempfile::tempdir;

    type TestBackend = NdArray;

    fn small_pipeline(dir: &std::path::Path, n: usize) -> DataPipeline {
        let samples = (0..n)
            .map(|i| {
                let path = dir.join(format!("img_{}.png", i));
                write_test_image(&path, 40, 40);
                EncodedSample { path, label: i % 2 }
            })
            .collect();
        let config = PreprocessingConfig {
            image_size: 32,
            resize_to: 36,
            batch_size: 3,
            num_workers: Some(2),
            ..Default::default()
        };
        DataPipeline::eval(SpoofDataset::new(samples), &config).unwrap()
    }

    #[test]
    fn test_evaluate_counts_every_sample() {
        let dir = tempdir().unwrap();
        let pipeline = small_pipeline(dir.path(), 5);
        let model = SpoofClassifierConfig::new(2)
            .with_dense_units(8)
            .init::<TestBackend>(&Default::default());

        let metrics = evaluate(&model, &pipeline).unwrap();
        assert_eq!(metrics.samples, 5);
        assert!((0.0..=1.0).contains(&metrics.accuracy));
        assert!(metrics.loss.is_finite() && metrics.loss > 0.0);
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let dir = tempdir().unwrap();
        let pipeline = small_pipeline(dir.path(), 4);
        let model = SpoofClassifierConfig::new(2)
            .with_dense_units(8)
            .init::<TestBackend>(&Default::default());

        let first = evaluate(&model, &pipeline).unwrap();
        let second = evaluate(&model, &pipeline).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_evaluate_empty_dataset_fails() {
        let pipeline =
            DataPipeline::eval(SpoofDataset::new(Vec::new()), &PreprocessingConfig::default()).unwrap();
        let model = SpoofClassifierConfig::new(2)
            .with_dense_units(8)
            .init::<TestBackend>(&Default::default());

        assert!(evaluate(&model, &pipeline).is_err());
    }
}
