//! Label encoding
//!
//! Maps string labels to contiguous class indices. Indices follow the sorted
//! order of the distinct labels seen at fit time, so `real` < `spoof` gives
//! `real = 0, spoof = 1`.

use std::collections::{BTreeSet, HashMap};

use crate::utils::error::{Result, SpoofError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelEncoder {
    classes: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelEncoder {
    /// Fit on the distinct values of `labels`
    pub fn fit<S: AsRef<str>>(labels: &[S]) -> Self {
        let classes: Vec<String> = labels
            .iter()
            .map(|l| l.as_ref().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Self::from_classes(classes)
    }

    /// Rebuild an encoder from an already sorted class list
    pub fn from_classes(classes: Vec<String>) -> Self {
        let index = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Self { classes, index }
    }

    /// Fit on `labels` and encode them in one step
    pub fn fit_transform<S: AsRef<str>>(labels: &[S]) -> (Self, Vec<usize>) {
        let encoder = Self::fit(labels);
        let encoded = labels
            .iter()
            .map(|l| encoder.index[l.as_ref()])
            .collect();
        (encoder, encoded)
    }

    /// Encode one label
    pub fn encode(&self, label: &str) -> Result<usize> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| SpoofError::UnseenLabel(label.to_string(), self.classes.clone()))
    }

    /// Encode every label, failing on the first one not seen at fit time
    pub fn transform<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>> {
        labels.iter().map(|l| self.encode(l.as_ref())).collect()
    }

    /// Class name for an index
    pub fn inverse_transform(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Require exactly `expected` classes
    pub fn ensure_num_classes(&self, expected: usize) -> Result<()> {
        if self.classes.len() != expected {
            return Err(SpoofError::Config(format!(
                "Expected {} classes in the training split, found {}: {:?}",
                expected,
                self.classes.len(),
                self.classes
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_follow_sorted_order() {
        let encoder = LabelEncoder::fit(&["spoof", "real", "spoof"]);
        assert_eq!(encoder.classes(), &["real".to_string(), "spoof".to_string()]);
        assert_eq!(encoder.encode("real").unwrap(), 0);
        assert_eq!(encoder.encode("spoof").unwrap(), 1);
    }

    #[test]
    fn test_fit_transform() {
        let (encoder, encoded) = LabelEncoder::fit_transform(&["spoof", "real", "real"]);
        assert_eq!(encoded, vec![1, 0, 0]);
        assert_eq!(encoder.len(), 2);
    }

    #[test]
    fn test_unseen_label_fails() {
        let encoder = LabelEncoder::fit(&["real", "spoof"]);
        let result = encoder.transform(&["real", "replay"]);
        assert!(matches!(result, Err(SpoofError::UnseenLabel(label, _)) if label == "replay"));
    }

    #[test]
    fn test_inverse_transform_round_trips() {
        let labels = ["spoof", "real"];
        let encoder = LabelEncoder::fit(&labels);
        for label in labels {
            let index = encoder.encode(label).unwrap();
            assert_eq!(encoder.inverse_transform(index), Some(label));
        }
        assert_eq!(encoder.inverse_transform(5), None);
    }

    #[test]
    fn test_class_count_check() {
        let encoder = LabelEncoder::fit(&["real"]);
        assert!(encoder.ensure_num_classes(2).is_err());
        let encoder = LabelEncoder::fit(&["real", "spoof"]);
        assert!(encoder.ensure_num_classes(2).is_ok());
    }

    #[test]
    fn test_from_classes_restores_lookup() {
        let encoder = LabelEncoder::from_classes(vec!["real".into(), "spoof".into()]);
        assert_eq!(encoder.encode("spoof").unwrap(), 1);
    }
}
