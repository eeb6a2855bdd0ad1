//! Producer/consumer data pipeline
//!
//! For each epoch a producer thread walks the sample order in batches, decodes
//! and preprocesses every batch on a fixed-size rayon pool, augments training
//! batches, and pushes the result into a bounded channel. The consumer (the
//! training loop) pulls prepared batches and hands them to the `SpoofBatcher`.
//!
//! The channel capacity bounds how far the producer can run ahead. Dropping
//! the iterator closes the channel and the producer stops at its next send.

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use burn::data::dataset::Dataset;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, warn};

use crate::config::PreprocessingConfig;
use crate::dataset::augmentation::BatchAugmenter;
use crate::dataset::burn_dataset::{EncodedSample, SpoofDataset, SpoofItem};
use crate::dataset::preprocess::{preprocess_eval, preprocess_train};
use crate::utils::error::{Result, SpoofError};

/// Which transform chain the pipeline applies
#[derive(Debug, Clone)]
pub enum PipelineMode {
    /// Resize, random crop, then batch augmentation
    Train {
        resize_to: usize,
        augmenter: BatchAugmenter,
    },
    /// Resize only
    Eval,
}

/// A batch of preprocessed items ready for the batcher
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub items: Vec<SpoofItem>,
}

impl PreparedBatch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

struct PipelineInner {
    dataset: SpoofDataset,
    mode: PipelineMode,
    image_size: usize,
    batch_size: usize,
    shuffle: bool,
    seed: u64,
    pool: ThreadPool,
}

/// Reusable, epoch-aware batch source
#[derive(Clone)]
pub struct DataPipeline {
    inner: Arc<PipelineInner>,
    prefetch: usize,
}

impl std::fmt::Debug for DataPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataPipeline")
            .field("samples", &self.inner.dataset.len())
            .field("mode", &self.inner.mode)
            .field("batch_size", &self.inner.batch_size)
            .field("workers", &self.inner.pool.current_num_threads())
            .field("prefetch", &self.prefetch)
            .finish()
    }
}

impl DataPipeline {
    pub fn new(
        dataset: SpoofDataset,
        mode: PipelineMode,
        config: &PreprocessingConfig,
        seed: u64,
    ) -> Result<Self> {
        let workers = config.workers();
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("preprocess-{}", i))
            .build()
            .map_err(|e| SpoofError::Dataset(format!("Failed to build worker pool: {}", e)))?;

        let shuffle = config.shuffle && matches!(mode, PipelineMode::Train { .. });

        Ok(Self {
            inner: Arc::new(PipelineInner {
                dataset,
                mode,
                image_size: config.image_size,
                batch_size: config.batch_size.max(1),
                shuffle,
                seed,
                pool,
            }),
            prefetch: config.prefetch.max(1),
        })
    }

    /// Training pipeline with random crops and augmentation
    pub fn train(
        dataset: SpoofDataset,
        augmenter: BatchAugmenter,
        config: &PreprocessingConfig,
        seed: u64,
    ) -> Result<Self> {
        let mode = PipelineMode::Train {
            resize_to: config.resize_to,
            augmenter,
        };
        Self::new(dataset, mode, config, seed)
    }

    /// Deterministic evaluation pipeline
    pub fn eval(dataset: SpoofDataset, config: &PreprocessingConfig) -> Result<Self> {
        Self::new(dataset, PipelineMode::Eval, config, 0)
    }

    pub fn len(&self) -> usize {
        self.inner.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_batches(&self) -> usize {
        self.len().div_ceil(self.inner.batch_size)
    }

    pub fn dataset(&self) -> &SpoofDataset {
        &self.inner.dataset
    }

    /// Sample order for `epoch`; reshuffled per epoch in training mode
    pub fn epoch_order(&self, epoch: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        if self.inner.shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.inner.seed.wrapping_add(epoch as u64));
            order.shuffle(&mut rng);
        }
        order
    }

    /// Start the producer for one pass over the data
    pub fn epoch(&self, epoch: usize) -> BatchIter {
        let (sender, receiver) = mpsc::sync_channel(self.prefetch);
        let inner = Arc::clone(&self.inner);
        let order = self.epoch_order(epoch);

        let handle = thread::spawn(move || {
            for chunk in order.chunks(inner.batch_size) {
                let batch = inner.prepare_batch(chunk, epoch);
                let failed = batch.is_err();
                if sender.send(batch).is_err() {
                    debug!("Consumer dropped, stopping producer for epoch {}", epoch);
                    return;
                }
                if failed {
                    return;
                }
            }
        });

        BatchIter {
            receiver: Some(receiver),
            handle: Some(handle),
        }
    }

    /// Prepare the first batch of `epoch` without spawning a producer
    pub fn first_batch(&self, epoch: usize) -> Result<PreparedBatch> {
        let order = self.epoch_order(epoch);
        let end = order.len().min(self.inner.batch_size);
        self.inner.prepare_batch(&order[..end], epoch)
    }
}

impl PipelineInner {
    fn prepare_batch(&self, indices: &[usize], epoch: usize) -> Result<PreparedBatch> {
        let items = self.pool.install(|| {
            indices
                .par_iter()
                .map(|&index| self.prepare_item(index, epoch))
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(PreparedBatch { items })
    }

    fn prepare_item(&self, index: usize, epoch: usize) -> Result<SpoofItem> {
        let EncodedSample { path, label } = self
            .dataset
            .get(index)
            .ok_or_else(|| SpoofError::Dataset(format!("Sample index {} out of range", index)))?;

        let image = match &self.mode {
            PipelineMode::Train { resize_to, augmenter } => {
                let mut rng = ChaCha8Rng::seed_from_u64(sample_seed(self.seed, epoch, index));
                let cropped = preprocess_train(&path, *resize_to, self.image_size, &mut rng)?;
                augmenter.augment(cropped, &mut rng)
            }
            PipelineMode::Eval => preprocess_eval(&path, self.image_size)?,
        };

        Ok(SpoofItem { image, label, path })
    }
}

/// Independent RNG stream per (seed, epoch, sample)
fn sample_seed(seed: u64, epoch: usize, index: usize) -> u64 {
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (epoch as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9)
        ^ (index as u64).wrapping_mul(0x94D0_49BB_1331_11EB)
}

/// Consumer side of one epoch
pub struct BatchIter {
    receiver: Option<Receiver<Result<PreparedBatch>>>,
    handle: Option<JoinHandle<()>>,
}

impl Iterator for BatchIter {
    type Item = Result<PreparedBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.as_ref()?.recv().ok()
    }
}

impl Drop for BatchIter {
    fn drop(&mut self) {
        // Closing the channel first unblocks a producer waiting on a full buffer
        self.receiver.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Data pipeline producer panicked");
            }
        }
    }
}
