//! Loss and accuracy helpers

use burn::tensor::{activation::log_softmax, backend::Backend, ElementConversion, Int, Tensor};

/// Per-sample negative log-likelihood of the target class, shape `[batch]`
fn nll<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    let [batch_size, _] = logits.dims();
    let log_probs = log_softmax(logits, 1);
    log_probs
        .gather(1, targets.reshape([batch_size, 1]))
        .reshape([batch_size])
        .neg()
}

/// Class-weighted sparse categorical cross-entropy.
///
/// Each sample's loss is scaled by the weight of its true class, then summed
/// and divided by the batch size (not by the sum of weights), so a batch made
/// only of the minority class produces a proportionally larger loss.
pub fn weighted_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
    class_weights: Tensor<B, 1>,
) -> Tensor<B, 1> {
    let [batch_size, _] = logits.dims();
    let sample_weights = class_weights.select(0, targets.clone());
    (nll(logits, targets) * sample_weights)
        .sum()
        .div_scalar(batch_size as f32)
}

/// Unweighted mean cross-entropy
pub fn cross_entropy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    nll(logits, targets).mean()
}

/// Number of rows whose argmax equals the target
pub fn correct_count<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let [batch_size, _] = logits.dims();
    let predictions = logits.argmax(1).reshape([batch_size]);
    predictions
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn fixtures() -> (Tensor<TestBackend, 2>, Tensor<TestBackend, 1, Int>) {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[2.0, 0.0], [0.0, 1.0], [3.0, 1.0]], &device);
        let targets =
            Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![0i64, 1, 1], [3]), &device);
        (logits, targets)
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar().elem::<f32>()
    }

    fn ln_softmax(a: f32, b: f32) -> f32 {
        a - (a.exp() + b.exp()).ln()
    }

    #[test]
    fn test_unit_weights_match_plain_cross_entropy() {
        let device = Default::default();
        let (logits, targets) = fixtures();
        let ones = Tensor::<TestBackend, 1>::ones([2], &device);

        let weighted = scalar(weighted_cross_entropy(logits.clone(), targets.clone(), ones));
        let plain = scalar(cross_entropy(logits, targets));
        assert!((weighted - plain).abs() < 1e-6);
    }

    #[test]
    fn test_weights_scale_by_true_class() {
        let device = Default::default();
        let (logits, targets) = fixtures();
        let weights = Tensor::<TestBackend, 1>::from_floats([1.0, 3.0], &device);

        let expected = -(ln_softmax(2.0, 0.0) + 3.0 * ln_softmax(1.0, 0.0) + 3.0 * ln_softmax(1.0, 3.0)) / 3.0;
        let loss = scalar(weighted_cross_entropy(logits, targets, weights));
        assert!((loss - expected).abs() < 1e-5, "{} vs {}", loss, expected);
    }

    #[test]
    fn test_correct_count() {
        let (logits, targets) = fixtures();
        // Row 0 -> 0 (correct), row 1 -> 1 (correct), row 2 -> 0 (wrong)
        assert_eq!(correct_count(logits, targets), 2);
    }
}
