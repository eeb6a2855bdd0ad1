//! Train/validation split
//!
//! A single seeded global shuffle followed by a cut at `floor(len * fraction)`.
//! The split is not stratified; class proportions follow whatever the shuffle
//! produces.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::manifest::Sample;
use crate::utils::error::{Result, SpoofError};

/// Disjoint training and validation partitions of the manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSplit {
    pub train: Vec<Sample>,
    pub validation: Vec<Sample>,
}

impl DatasetSplit {
    pub fn len(&self) -> usize {
        self.train.len() + self.validation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn train_labels(&self) -> Vec<String> {
        self.train.iter().map(|s| s.label.clone()).collect()
    }

    pub fn validation_labels(&self) -> Vec<String> {
        self.validation.iter().map(|s| s.label.clone()).collect()
    }
}

/// Shuffle `samples` with `seed` and cut at `floor(len * train_fraction)`
pub fn split_manifest(mut samples: Vec<Sample>, train_fraction: f64, seed: u64) -> Result<DatasetSplit> {
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(SpoofError::Config(format!(
            "Train fraction must be in (0, 1), got {}",
            train_fraction
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let cut = (samples.len() as f64 * train_fraction).floor() as usize;
    let validation = samples.split_off(cut);

    info!("Split: {} train / {} validation", samples.len(), validation.len());

    Ok(DatasetSplit {
        train: samples,
        validation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::PathBuf;

    fn create_samples(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample {
                path: PathBuf::from(format!("img_{:04}.jpg", i)),
                label: if i % 3 == 0 { "spoof" } else { "real" }.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_thousand_samples_split_900_100() {
        let split = split_manifest(create_samples(1000), 0.9, 42).unwrap();
        assert_eq!(split.train.len(), 900);
        assert_eq!(split.validation.len(), 100);
    }

    #[test]
    fn test_split_uses_floor() {
        let split = split_manifest(create_samples(15), 0.9, 42).unwrap();
        assert_eq!(split.train.len(), 13);
        assert_eq!(split.validation.len(), 2);
    }

    #[test]
    fn test_same_seed_same_split() {
        let a = split_manifest(create_samples(200), 0.9, 42).unwrap();
        let b = split_manifest(create_samples(200), 0.9, 42).unwrap();
        assert_eq!(a.train, b.train);
        assert_eq!(a.validation, b.validation);
    }

    #[test]
    fn test_different_seed_different_order() {
        let a = split_manifest(create_samples(200), 0.9, 42).unwrap();
        let b = split_manifest(create_samples(200), 0.9, 7).unwrap();
        assert_ne!(a.train, b.train);
    }

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        let split = split_manifest(create_samples(321), 0.9, 42).unwrap();
        let train: HashSet<_> = split.train.iter().map(|s| s.path.clone()).collect();
        let val: HashSet<_> = split.validation.iter().map(|s| s.path.clone()).collect();

        assert!(train.is_disjoint(&val));
        assert_eq!(train.len() + val.len(), 321);
        assert_eq!(split.len(), 321);
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        assert!(split_manifest(create_samples(10), 0.0, 42).is_err());
        assert!(split_manifest(create_samples(10), 1.0, 42).is_err());
    }
}
