//! Epoch loop: weighted-loss training, validation, callbacks, early stopping

use burn::data::dataloader::batcher::Batcher;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::{backend::AutodiffBackend, ElementConversion, Tensor, TensorData};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::config::TrainingConfig;
use crate::dataset::{ClassWeights, DataPipeline, SpoofBatch, SpoofBatcher};
use crate::model::SpoofClassifier;
use crate::training::callbacks::EpochCallback;
use crate::training::early_stopping::{EarlyStopping, Monitor, StoppingDecision};
use crate::training::evaluator::evaluate;
use crate::training::history::{EpochMetrics, TrainingHistory};
use crate::training::loss::{correct_count, weighted_cross_entropy};
use crate::utils::error::{Result, SpoofError};
use crate::utils::logging::TrainingLogger;

/// How the epoch loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingOutcome {
    /// Ran every configured epoch
    Completed,
    /// Stopped after `epoch` (0-indexed); weights restored from `best_epoch`
    EarlyStopped { epoch: usize, best_epoch: usize },
}

impl TrainingOutcome {
    pub fn is_early_stop(&self) -> bool {
        matches!(self, TrainingOutcome::EarlyStopped { .. })
    }
}

/// Fitted model (best weights restored) plus what happened along the way
pub struct TrainingResult<B: AutodiffBackend> {
    pub model: SpoofClassifier<B>,
    pub history: TrainingHistory,
    pub outcome: TrainingOutcome,
    pub best_epoch: Option<usize>,
    pub best_val_accuracy: f64,
}

impl<B: AutodiffBackend> TrainingResult<B> {
    pub fn epochs_run(&self) -> usize {
        self.history.len()
    }
}

pub struct Trainer<B: AutodiffBackend> {
    config: TrainingConfig,
    class_weights: ClassWeights,
    device: B::Device,
    callbacks: Vec<Box<dyn EpochCallback<B>>>,
    show_progress: bool,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// `class_weights` are replaced by uniform weights when
    /// `config.use_class_weights` is off
    pub fn new(config: &TrainingConfig, class_weights: ClassWeights, device: B::Device) -> Self {
        let class_weights = if config.use_class_weights {
            class_weights
        } else {
            ClassWeights::uniform(class_weights.len())
        };

        Self {
            config: config.clone(),
            class_weights,
            device,
            callbacks: Vec::new(),
            show_progress: true,
        }
    }

    pub fn with_callback(mut self, callback: Box<dyn EpochCallback<B>>) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Toggle the per-epoch progress bar
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn class_weights(&self) -> &ClassWeights {
        &self.class_weights
    }

    fn progress_bar(&self, num_batches: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(num_batches as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }

    pub fn fit(
        &mut self,
        mut model: SpoofClassifier<B>,
        train: &DataPipeline,
        validation: &DataPipeline,
    ) -> Result<TrainingResult<B>> {
        if train.is_empty() {
            return Err(SpoofError::Training("Training set is empty".to_string()));
        }
        if validation.is_empty() {
            return Err(SpoofError::Training("Validation set is empty".to_string()));
        }
        if self.class_weights.len() != model.num_classes() {
            return Err(SpoofError::Training(format!(
                "Got {} class weights for a {}-class model",
                self.class_weights.len(),
                model.num_classes()
            )));
        }

        let epochs = self.config.epochs;
        let mut optimizer = AdamConfig::new()
            .with_beta_1(self.config.beta_1)
            .with_beta_2(self.config.beta_2)
            .with_epsilon(self.config.epsilon)
            .init::<B, SpoofClassifier<B>>();
        let weights = Tensor::<B, 1>::from_floats(
            TensorData::new(self.class_weights.as_slice().to_vec(), [self.class_weights.len()]),
            &self.device,
        );
        let batcher = SpoofBatcher::new();

        let mut stopper = EarlyStopping::<SpoofClassifier<B>>::new(
            Monitor::ValAccuracy,
            self.config.patience,
            self.config.min_delta,
        );
        let mut history = TrainingHistory::new();
        let mut logger = TrainingLogger::new(epochs);
        let mut outcome = TrainingOutcome::Completed;

        info!(
            "Training on {} samples, validating on {} ({} epochs max, class weights {})",
            train.len(),
            validation.len(),
            epochs,
            self.class_weights
        );
        for callback in self.callbacks.iter_mut() {
            callback.on_train_begin()?;
        }

        for epoch in 0..epochs {
            logger.start_epoch(epoch);
            let pb = self.progress_bar(train.num_batches());

            let mut loss_sum = 0.0f64;
            let mut correct = 0usize;
            let mut seen = 0usize;

            for prepared in train.epoch(epoch) {
                let prepared = prepared?;
                if prepared.is_empty() {
                    continue;
                }
                let batch: SpoofBatch<B> = batcher.batch(prepared.items, &self.device);
                let batch_size = batch.len();

                let logits = model.forward_train(batch.images);
                let loss = weighted_cross_entropy(logits.clone(), batch.targets.clone(), weights.clone());

                let loss_value = loss.clone().into_scalar().elem::<f64>();
                if !loss_value.is_finite() {
                    pb.abandon();
                    return Err(SpoofError::Training(format!(
                        "Loss diverged to {} in epoch {}",
                        loss_value,
                        epoch + 1
                    )));
                }
                correct += correct_count(logits, batch.targets);
                loss_sum += loss_value * batch_size as f64;
                seen += batch_size;

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optimizer.step(self.config.learning_rate, model, grads);

                pb.inc(1);
                pb.set_message(format!(
                    "loss: {:.4} accuracy: {:.4}",
                    loss_sum / seen as f64,
                    correct as f64 / seen as f64
                ));
            }
            pb.finish_and_clear();

            let val = evaluate(&model.valid(), validation)?;
            let metrics = EpochMetrics {
                epoch,
                loss: loss_sum / seen.max(1) as f64,
                accuracy: correct as f64 / seen.max(1) as f64,
                val_loss: val.loss,
                val_accuracy: val.accuracy,
            };
            logger.end_epoch(metrics.loss, metrics.accuracy, metrics.val_loss, metrics.val_accuracy);
            history.push(&metrics);

            for callback in self.callbacks.iter_mut() {
                callback.on_epoch_end(&metrics, &model)?;
            }

            match stopper.update_metrics(&metrics, &model) {
                StoppingDecision::Improved => {
                    logger.log_new_best(metrics.val_accuracy);
                    if self.show_progress {
                        println!("  {} val_accuracy improved to {:.4}", "→".cyan(), metrics.val_accuracy);
                    }
                }
                StoppingDecision::NoImprovement { wait } => {
                    debug!("No improvement for {}/{} epochs", wait, self.config.patience);
                }
                StoppingDecision::Stop => {
                    let best_epoch = stopper.best_epoch().unwrap_or(epoch);
                    logger.log_early_stop(best_epoch, self.config.patience);
                    outcome = TrainingOutcome::EarlyStopped { epoch, best_epoch };
                    break;
                }
            }
        }

        for callback in self.callbacks.iter_mut() {
            callback.on_train_end()?;
        }

        let best_epoch = stopper.best_epoch();
        let best_val_accuracy = stopper.best().unwrap_or(0.0);
        if let Some(best) = stopper.take_best_state() {
            debug!("Restoring weights from epoch {}", best_epoch.map(|e| e + 1).unwrap_or(0));
            model = best;
        }
        logger.log_complete(history.len(), best_val_accuracy);

        Ok(TrainingResult {
            model,
            history,
            outcome,
            best_epoch,
            best_val_accuracy,
        })
    }
}
