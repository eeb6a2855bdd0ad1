//! Burn Dataset and Batcher integration
//!
//! `SpoofDataset` exposes encoded samples through Burn's `Dataset` trait and
//! `SpoofBatcher` stacks prepared HWC images into NCHW tensors.

use std::path::PathBuf;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dataset::labels::LabelEncoder;
use crate::dataset::manifest::Sample;
use crate::dataset::preprocess::ImageTensor;
use crate::utils::error::Result;

/// A sample with its label already encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedSample {
    pub path: PathBuf,
    pub label: usize,
}

/// A preprocessed image with its class index
#[derive(Debug, Clone)]
pub struct SpoofItem {
    pub image: ImageTensor,
    pub label: usize,
    pub path: PathBuf,
}

/// Lazily-loaded view over encoded samples
#[derive(Debug, Clone)]
pub struct SpoofDataset {
    samples: Vec<EncodedSample>,
}

impl SpoofDataset {
    pub fn new(samples: Vec<EncodedSample>) -> Self {
        Self { samples }
    }

    /// Encode `samples` with `encoder`, failing on any unseen label
    pub fn from_samples(samples: &[Sample], encoder: &LabelEncoder) -> Result<Self> {
        let encoded = samples
            .iter()
            .map(|s| {
                Ok(EncodedSample {
                    path: s.path.clone(),
                    label: encoder.encode(&s.label)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(encoded))
    }

    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.label).collect()
    }

    pub fn samples(&self) -> &[EncodedSample] {
        &self.samples
    }
}

impl Dataset<EncodedSample> for SpoofDataset {
    fn get(&self, index: usize) -> Option<EncodedSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of images and their targets
#[derive(Clone, Debug)]
pub struct SpoofBatch<B: Backend> {
    /// Images with shape `[batch, 3, height, width]`, values in `[0, 255]`
    pub images: Tensor<B, 4>,
    /// Class indices with shape `[batch]`
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> SpoofBatch<B> {
    pub fn len(&self) -> usize {
        self.targets.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, Default)]
pub struct SpoofBatcher;

impl SpoofBatcher {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Batcher<B, SpoofItem, SpoofBatch<B>> for SpoofBatcher {
    fn batch(&self, items: Vec<SpoofItem>, device: &B::Device) -> SpoofBatch<B> {
        let batch_size = items.len();
        let (height, width) = items
            .first()
            .map(|item| (item.image.height, item.image.width))
            .unwrap_or((0, 0));

        let images_data: Vec<f32> = items
            .iter()
            .flat_map(|item| item.image.data.iter().copied())
            .collect();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, height, width, ImageTensor::CHANNELS]),
            device,
        )
        .permute([0, 3, 1, 2]);

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        SpoofBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn item(label: usize, fill: f32) -> SpoofItem {
        let mut image = ImageTensor::zeros(4, 5);
        image.data.iter_mut().for_each(|v| *v = fill);
        // Mark channel 2 of the first pixel
        image.data[2] = 200.0;
        SpoofItem {
            image,
            label,
            path: PathBuf::from(format!("{}.jpg", label)),
        }
    }

    #[test]
    fn test_batcher_produces_nchw() {
        let device = Default::default();
        let batch: SpoofBatch<TestBackend> =
            SpoofBatcher::new().batch(vec![item(0, 1.0), item(1, 2.0)], &device);

        assert_eq!(batch.images.dims(), [2, 3, 4, 5]);
        assert_eq!(batch.len(), 2);

        let values = batch.images.into_data().to_vec::<f32>().unwrap();
        // [0, 2, 0, 0] in NCHW is the marked value
        assert_eq!(values[2 * 4 * 5], 200.0);
        assert_eq!(values[0], 1.0);

        let targets = batch.targets.into_data().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![0, 1]);
    }

    #[test]
    fn test_dataset_encodes_labels() {
        let samples = vec![
            Sample { path: "a.jpg".into(), label: "spoof".into() },
            Sample { path: "b.jpg".into(), label: "real".into() },
        ];
        let encoder = LabelEncoder::fit(&["real", "spoof"]);
        let dataset = SpoofDataset::from_samples(&samples, &encoder).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.labels(), vec![1, 0]);
        assert_eq!(dataset.get(1).unwrap().path, PathBuf::from("b.jpg"));
        assert!(dataset.get(2).is_none());
    }

    #[test]
    fn test_dataset_rejects_unseen_label() {
        let samples = vec![Sample { path: "a.jpg".into(), label: "mask".into() }];
        let encoder = LabelEncoder::fit(&["real", "spoof"]);
        assert!(SpoofDataset::from_samples(&samples, &encoder).is_err());
    }
}
