use crate::error::ClassifyError;
use core::{cmp::Ordering, fmt};
use serde::Serialize;
use std::collections::BinaryHeap;

/// Logits whose absolute values sum below this are considered a failed run.
pub const DEGENERATE_THRESHOLD: f32 = 1e-6;

const MIN_SOFTMAX_SUM: f32 = 1e-10;

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|logit| (logit - max).exp()).collect();
    let sum = exps.iter().sum::<f32>().max(MIN_SOFTMAX_SUM);

    exps.into_iter().map(|exp| exp / sum).collect()
}

/// Reject outputs that are all zeros.
pub fn check_logits(logits: &[f32]) -> Result<(), ClassifyError> {
    let magnitude: f32 = logits.iter().map(|logit| logit.abs()).sum();

    if magnitude < DEGENERATE_THRESHOLD {
        return Err(ClassifyError::DegenerateOutput(
            logits.iter().take(10).copied().collect(),
        ));
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub class: usize,
    pub probability: f32,
}

impl Eq for Prediction {}

impl Ord for Prediction {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so that the heap root is the least probable prediction.
        other
            .probability
            .total_cmp(&self.probability)
            .then_with(|| self.class.cmp(&other.class))
    }
}

impl PartialOrd for Prediction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The `k` most probable classes, most probable first.
pub fn top_k(probabilities: &[f32], k: usize) -> Vec<Prediction> {
    if k == 0 {
        return Vec::new();
    }

    let mut heap = BinaryHeap::with_capacity(k + 1);

    for (class, &probability) in probabilities.iter().enumerate() {
        let candidate = Prediction { class, probability };

        if heap.len() < k {
            heap.push(candidate);
        } else if let Some(least) = heap.peek() {
            if probability > least.probability {
                heap.pop();
                heap.push(candidate);
            }
        }
    }

    // Ascending order under the reversed `Ord` is descending probability.
    heap.into_sorted_vec()
}

/// Sum of the probabilities of the `k` best predictions.
pub fn confidence(predictions: &[Prediction], k: usize) -> f32 {
    predictions.iter().take(k).map(|p| p.probability).sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceTier {
    High,
    Moderate,
    Low,
}

impl ConfidenceTier {
    pub fn from_probability(probability: f32) -> Self {
        if probability > 0.5 {
            ConfidenceTier::High
        } else if probability > 0.2 {
            ConfidenceTier::Moderate
        } else {
            ConfidenceTier::Low
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceTier::High => f.write_str("High confidence"),
            ConfidenceTier::Moderate => f.write_str("Moderate confidence"),
            ConfidenceTier::Low => f.write_str("Low confidence"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_sums_to_one() {
        let probabilities = softmax(&[1.0, 2.0, 3.0]);

        let sum: f32 = probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!((probabilities[2] - 0.665_240_94).abs() < 1e-6);
        assert!(probabilities[0] < probabilities[1]);
    }

    #[test]
    fn softmax_is_stable_for_large_logits() {
        let probabilities = softmax(&[1000.0, 1000.0]);

        assert_eq!(probabilities, vec![0.5, 0.5]);
    }

    #[test]
    fn top_k_returns_descending_probabilities() {
        let probabilities = [0.05, 0.4, 0.1, 0.3, 0.15];

        let best = top_k(&probabilities, 3);

        let classes = best.iter().map(|p| p.class).collect::<Vec<_>>();
        assert_eq!(classes, vec![1, 3, 4]);
        assert_eq!(best[0].probability, 0.4);
    }

    #[test]
    fn top_k_larger_than_the_input() {
        let best = top_k(&[0.2, 0.8], 5);

        assert_eq!(best.len(), 2);
        assert_eq!(best[0].class, 1);
        assert!(top_k(&[0.2, 0.8], 0).is_empty());
    }

    #[test]
    fn confidence_sums_the_best_predictions() {
        let best = top_k(&[0.1, 0.6, 0.3], 3);

        assert!((confidence(&best, 1) - 0.6).abs() < 1e-6);
        assert!((confidence(&best, 5) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn tiers() {
        assert_eq!(ConfidenceTier::from_probability(0.51), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_probability(0.5), ConfidenceTier::Moderate);
        assert_eq!(ConfidenceTier::from_probability(0.2), ConfidenceTier::Low);
    }

    #[test]
    fn all_zero_logits_are_degenerate() {
        let logits = vec![0.0; 1000];

        match check_logits(&logits) {
            Err(ClassifyError::DegenerateOutput(first)) => assert_eq!(first, vec![0.0; 10]),
            other => panic!("expected a degenerate output, got {other:?}"),
        }
        assert!(check_logits(&[0.0, 0.1]).is_ok());
    }
}
