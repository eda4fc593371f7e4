//! Paired comparison between a policy's current and candidate sample costs.

/// Result of comparing two aligned sample-cost vectors for one agent.
#[derive(Debug, Clone)]
pub struct ComparisonResult {
    pub deltas: Vec<i64>,
    pub mean_delta: f64,
    pub std_delta: f64,
    pub accepted: bool,
}

pub struct PairedComparator;

impl PairedComparator {
    /// Compare `old_costs` against `new_costs` (same length, same sample
    /// index order). Accepts iff `mean_delta > 0` and the relative
    /// improvement over `mean_old` clears `improvement_threshold`.
    ///
    /// # Panics
    /// Panics if the two vectors differ in length — callers must have
    /// evaluated both policies against the identical sample set.
    pub fn compare(old_costs: &[i64], new_costs: &[i64], improvement_threshold: f64) -> ComparisonResult {
        assert_eq!(
            old_costs.len(),
            new_costs.len(),
            "paired comparison requires equal-length, aligned sample sets"
        );

        let deltas: Vec<i64> = old_costs
            .iter()
            .zip(new_costs.iter())
            .map(|(old, new)| old - new)
            .collect();

        let mean_delta = mean(&deltas);
        let std_delta = std_dev(&deltas, mean_delta);
        let mean_old = mean(old_costs);

        let accepted =
            Self::should_accept(mean_delta, mean_old, improvement_threshold);

        ComparisonResult {
            deltas,
            mean_delta,
            std_delta,
            accepted,
        }
    }

    /// The acceptance rule in isolation, for callers that already have
    /// aggregate means rather than full sample vectors.
    pub fn should_accept(mean_delta: f64, mean_old: f64, improvement_threshold: f64) -> bool {
        if mean_delta <= 0.0 {
            return false;
        }
        mean_delta / mean_old.abs().max(1.0) >= improvement_threshold
    }
}

fn mean(values: &[i64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[i64], mean_value: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values
        .iter()
        .map(|&v| {
            let delta = v as f64 - mean_value;
            delta * delta
        })
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_when_improvement_clears_threshold() {
        let old = vec![1000, 1000, 1000];
        let new = vec![800, 800, 800];
        let result = PairedComparator::compare(&old, &new, 0.05);
        assert!(result.accepted);
        assert_eq!(result.mean_delta, 200.0);
    }

    #[test]
    fn rejects_when_improvement_too_small() {
        let old = vec![1000, 1000, 1000];
        let new = vec![995, 995, 995];
        let result = PairedComparator::compare(&old, &new, 0.05);
        assert!(!result.accepted);
    }

    #[test]
    fn rejects_zero_delta() {
        let old = vec![1000, 1000];
        let new = vec![1000, 1000];
        let result = PairedComparator::compare(&old, &new, 0.0);
        assert!(!result.accepted);
    }

    #[test]
    fn rejects_negative_delta() {
        let old = vec![1000, 1000];
        let new = vec![1200, 1200];
        let result = PairedComparator::compare(&old, &new, 0.01);
        assert!(!result.accepted);
    }

    #[test]
    #[should_panic(expected = "aligned sample sets")]
    fn panics_on_mismatched_lengths() {
        PairedComparator::compare(&[1, 2, 3], &[1, 2], 0.0);
    }
}
