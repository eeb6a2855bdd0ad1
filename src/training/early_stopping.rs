//! Early stopping on a monitored epoch metric
//!
//! Tracks the best value seen so far together with a snapshot of whatever
//! state should be restored (the model, in training). An epoch improves only
//! when it beats the best by more than `min_delta`; ties count as no
//! improvement. Training stops once `patience` consecutive epochs fail to
//! improve.

use serde::{Deserialize, Serialize};

use crate::training::history::EpochMetrics;

/// Which epoch metric to watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Monitor {
    Loss,
    Accuracy,
    ValLoss,
    ValAccuracy,
}

impl Monitor {
    pub fn value(&self, metrics: &EpochMetrics) -> f64 {
        match self {
            Monitor::Loss => metrics.loss,
            Monitor::Accuracy => metrics.accuracy,
            Monitor::ValLoss => metrics.val_loss,
            Monitor::ValAccuracy => metrics.val_accuracy,
        }
    }

    /// Losses are minimised, accuracies maximised
    pub fn mode(&self) -> Mode {
        match self {
            Monitor::Loss | Monitor::ValLoss => Mode::Min,
            Monitor::Accuracy | Monitor::ValAccuracy => Mode::Max,
        }
    }
}

impl std::fmt::Display for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Monitor::Loss => "loss",
            Monitor::Accuracy => "accuracy",
            Monitor::ValLoss => "val_loss",
            Monitor::ValAccuracy => "val_accuracy",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Min,
    Max,
}

/// Outcome of feeding one epoch to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoppingDecision {
    Improved,
    NoImprovement { wait: usize },
    Stop,
}

#[derive(Debug, Clone)]
pub struct EarlyStopping<S> {
    monitor: Monitor,
    patience: usize,
    min_delta: f64,
    best: Option<f64>,
    best_epoch: Option<usize>,
    best_state: Option<S>,
    wait: usize,
}

impl<S: Clone> EarlyStopping<S> {
    pub fn new(monitor: Monitor, patience: usize, min_delta: f64) -> Self {
        Self {
            monitor,
            patience,
            min_delta: min_delta.abs(),
            best: None,
            best_epoch: None,
            best_state: None,
            wait: 0,
        }
    }

    /// val_accuracy, maximised
    pub fn on_val_accuracy(patience: usize) -> Self {
        Self::new(Monitor::ValAccuracy, patience, 0.0)
    }

    pub fn monitor(&self) -> Monitor {
        self.monitor
    }

    fn is_improvement(&self, value: f64) -> bool {
        match self.best {
            None => !value.is_nan(),
            Some(best) => match self.monitor.mode() {
                Mode::Max => value - self.min_delta > best,
                Mode::Min => value + self.min_delta < best,
            },
        }
    }

    /// Record the value for `epoch`, snapshotting `state` on improvement
    pub fn update(&mut self, epoch: usize, value: f64, state: &S) -> StoppingDecision {
        if self.is_improvement(value) {
            self.best = Some(value);
            self.best_epoch = Some(epoch);
            self.best_state = Some(state.clone());
            self.wait = 0;
            return StoppingDecision::Improved;
        }

        self.wait += 1;
        if self.wait >= self.patience {
            StoppingDecision::Stop
        } else {
            StoppingDecision::NoImprovement { wait: self.wait }
        }
    }

    /// Feed a full epoch record
    pub fn update_metrics(&mut self, metrics: &EpochMetrics, state: &S) -> StoppingDecision {
        self.update(metrics.epoch, self.monitor.value(metrics), state)
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn epochs_without_improvement(&self) -> usize {
        self.wait
    }

    /// Take the snapshot from the best epoch
    pub fn take_best_state(&mut self) -> Option<S> {
        self.best_state.take()
    }
}
