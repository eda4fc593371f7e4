//! Convergence detection over the joint mean-cost history of a run.

use crate::config::ConvergenceCriteria;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceReason {
    MaxIterations,
    Stable,
}

impl ConvergenceReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConvergenceReason::MaxIterations => "max_iterations",
            ConvergenceReason::Stable => "stable",
        }
    }
}

/// Tracks the joint-mean-cost metric across iterations and the best value
/// seen so far.
pub struct ConvergenceDetector {
    criteria: ConvergenceCriteria,
    history: Vec<f64>,
    best_cost: Option<f64>,
}

impl ConvergenceDetector {
    pub fn new(criteria: ConvergenceCriteria) -> Self {
        Self {
            criteria,
            history: Vec::new(),
            best_cost: None,
        }
    }

    pub fn best_cost(&self) -> Option<f64> {
        self.best_cost
    }

    pub fn iterations_recorded(&self) -> usize {
        self.history.len()
    }

    /// Record this iteration's joint mean cost and check for convergence.
    /// Returns `Some(reason)` once converged; the detector keeps recording
    /// after that point if the caller continues to call it (it does not
    /// enforce early termination itself).
    pub fn record(&mut self, metric_value: f64) -> Option<ConvergenceReason> {
        self.history.push(metric_value);
        self.best_cost = Some(match self.best_cost {
            Some(best) => best.min(metric_value),
            None => metric_value,
        });

        if self.history.len() >= self.criteria.max_iterations {
            return Some(ConvergenceReason::MaxIterations);
        }

        if self.history.len() >= self.criteria.stability_window {
            let window = &self.history[self.history.len() - self.criteria.stability_window..];
            let max = window.iter().cloned().fold(f64::MIN, f64::max);
            let min = window.iter().cloned().fold(f64::MAX, f64::min);
            let spread = (max - min) / min.abs().max(1.0);
            if spread <= self.criteria.stability_threshold {
                return Some(ConvergenceReason::Stable);
            }
        }

        None
    }
}
