//! Inverse-frequency class weights
//!
//! `weight[c] = max(count) / count[c]`, so the majority class weighs exactly 1.0
//! and rarer classes weigh proportionally more.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, SpoofError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassWeights {
    counts: Vec<usize>,
    weights: Vec<f32>,
}

impl ClassWeights {
    /// Compute weights from encoded training labels
    pub fn from_labels(labels: &[usize], num_classes: usize) -> Result<Self> {
        let mut counts = vec![0usize; num_classes];
        for &label in labels {
            let slot = counts.get_mut(label).ok_or_else(|| {
                SpoofError::Dataset(format!("Label {} out of range for {} classes", label, num_classes))
            })?;
            *slot += 1;
        }
        Self::from_counts(counts)
    }

    pub fn from_counts(counts: Vec<usize>) -> Result<Self> {
        if let Some(empty) = counts.iter().position(|&c| c == 0) {
            return Err(SpoofError::Dataset(format!(
                "Class {} has no training samples, cannot compute its weight",
                empty
            )));
        }

        let max = counts.iter().copied().max().unwrap_or(0) as f32;
        let weights = counts.iter().map(|&c| max / c as f32).collect();
        Ok(Self { counts, weights })
    }

    /// Unit weights, used when class weighting is disabled
    pub fn uniform(num_classes: usize) -> Self {
        Self {
            counts: vec![0; num_classes],
            weights: vec![1.0; num_classes],
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.weights
    }

    pub fn get(&self, class: usize) -> Option<f32> {
        self.weights.get(class).copied()
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

impl fmt::Display for ClassWeights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .weights
            .iter()
            .enumerate()
            .map(|(i, w)| format!("{}: {:.4}", i, w))
            .collect();
        write!(f, "{{{}}}", entries.join(", "))
    }
}
