//! Parallel Monte Carlo evaluation of a policy set.
//!
//! `PolicyEvaluator::evaluate` runs `num_samples` independent episodes
//! through `SimulationRunner`, each on its own seeded resample of the
//! historical transaction set, and aggregates them into an
//! `EvaluationResult`. The simulator itself is synchronous CPU-bound work,
//! so samples are dispatched as `tokio::task::spawn_blocking` tasks bounded
//! by a semaphore sized to `parallel_workers`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::{HistoricalTransaction, MonteCarloConfig, Policy};
use crate::error::{CoreError, CoreResult};
use crate::sampler::TransactionSampler;
use crate::scenario::ScenarioConfig;
use crate::simulation_runner::SimulationRunner;

/// Aggregated outcome of a batch of Monte Carlo samples, in sample-index
/// order — callers doing paired comparison rely on that ordering.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub mean_cost: i64,
    pub std_cost: i64,
    pub sample_costs: Vec<i64>,
    pub settlement_rate: f64,
    pub cost_breakdown: HashMap<String, i64>,
}

pub struct PolicyEvaluator;

impl PolicyEvaluator {
    /// Evaluate `policies_by_agent` against the subset of `history` relevant
    /// to `agent_id` (sender or receiver), using a sample set seeded from
    /// `sampling(iteration, agent_id)`. Samples that error are logged and
    /// excluded; if fewer than half succeed, the whole evaluation fails.
    pub async fn evaluate(
        scenario: Arc<ScenarioConfig>,
        policies_by_agent: Arc<HashMap<String, Policy>>,
        history: Arc<Vec<HistoricalTransaction>>,
        monte_carlo: &MonteCarloConfig,
        master_seed: u64,
        iteration: usize,
        agent_id: &str,
    ) -> CoreResult<EvaluationResult> {
        let semaphore = Arc::new(Semaphore::new(monte_carlo.parallel_workers.max(1)));

        let seed = crate::seed::SeedManager::new(master_seed).sampling(iteration, agent_id);
        let sample_sets = TransactionSampler::new(&history).create_samples(
            agent_id,
            monte_carlo.num_samples,
            None,
            monte_carlo.sample_method,
            monte_carlo.evaluation_ticks,
            seed,
        );

        let mut tasks = Vec::with_capacity(monte_carlo.num_samples);

        for sampled in sample_sets {
            let scenario = Arc::clone(&scenario);
            let policies_by_agent = Arc::clone(&policies_by_agent);
            let semaphore = Arc::clone(&semaphore);
            let evaluation_ticks = monte_carlo.evaluation_ticks;

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");

                tokio::task::spawn_blocking(move || {
                    SimulationRunner::run(
                        &scenario,
                        &policies_by_agent,
                        &sampled,
                        evaluation_ticks,
                        seed,
                    )
                })
                .await
            }));
        }

        let mut sample_costs = Vec::with_capacity(monte_carlo.num_samples);
        let mut settlement_rates = Vec::with_capacity(monte_carlo.num_samples);
        let mut cost_breakdown: HashMap<String, i64> = HashMap::new();
        let mut succeeded = 0usize;

        for (sample_idx, task) in tasks.into_iter().enumerate() {
            match task.await {
                Ok(Ok(outcome)) => {
                    debug!(iteration, sample_idx, cost = outcome.total_cost, "sample evaluated");
                    sample_costs.push(outcome.total_cost);
                    settlement_rates.push(outcome.settlement_rate);
                    for (name, value) in outcome.cost_breakdown {
                        *cost_breakdown.entry(name).or_insert(0) += value;
                    }
                    succeeded += 1;
                }
                Ok(Err(err)) => {
                    warn!(iteration, sample_idx, error = %err, "sample evaluation failed");
                }
                Err(join_err) => {
                    warn!(iteration, sample_idx, error = %join_err, "sample task panicked");
                }
            }
        }

        let required = monte_carlo.num_samples.div_ceil(2);
        if succeeded < required {
            return Err(CoreError::Evaluation(format!(
                "only {succeeded}/{} samples succeeded, required at least {required}",
                monte_carlo.num_samples
            )));
        }

        let mean_cost = mean(&sample_costs);
        let std_cost = std_dev(&sample_costs, mean_cost);
        let settlement_rate = if settlement_rates.is_empty() {
            1.0
        } else {
            settlement_rates.iter().sum::<f64>() / settlement_rates.len() as f64
        };
        for value in cost_breakdown.values_mut() {
            *value /= succeeded as i64;
        }

        Ok(EvaluationResult {
            mean_cost,
            std_cost,
            sample_costs,
            settlement_rate,
            cost_breakdown,
        })
    }
}

fn mean(values: &[i64]) -> i64 {
    if values.is_empty() {
        return 0;
    }
    let sum: i128 = values.iter().map(|&v| v as i128).sum();
    (sum / values.len() as i128) as i64
}

fn std_dev(values: &[i64], mean_value: i64) -> i64 {
    if values.len() < 2 {
        return 0;
    }
    let variance: f64 = values
        .iter()
        .map(|&v| {
            let delta = v - mean_value;
            (delta as f64) * (delta as f64)
        })
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt().round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(mean(&[]), 0);
    }

    #[test]
    fn mean_is_correct() {
        assert_eq!(mean(&[10, 20, 30]), 20);
    }

    #[test]
    fn std_dev_of_single_sample_is_zero() {
        assert_eq!(std_dev(&[10], 10), 0);
    }

    #[test]
    fn std_dev_of_identical_samples_is_zero() {
        assert_eq!(std_dev(&[10, 10, 10], 10), 0);
    }

    #[tokio::test]
    async fn evaluates_in_parallel_and_aggregates() {
        use crate::scenario::{BaselinePolicy, ScenarioAgent};

        let scenario = Arc::new(ScenarioConfig {
            ticks_per_day: 20,
            agents: vec![
                ScenarioAgent {
                    id: "BANK_A".to_string(),
                    opening_balance: 1_000_000,
                    credit_limit: 500_000,
                    baseline_policy: BaselinePolicy::Fifo,
                },
                ScenarioAgent {
                    id: "BANK_B".to_string(),
                    opening_balance: 1_000_000,
                    credit_limit: 500_000,
                    baseline_policy: BaselinePolicy::Fifo,
                },
            ],
            cost_rates: Default::default(),
            lsm: Default::default(),
            historical_transactions: vec![],
        });
        let policies = Arc::new(HashMap::new());
        let history = Arc::new(vec![HistoricalTransaction {
            sender_id: "BANK_A".to_string(),
            receiver_id: "BANK_B".to_string(),
            amount: 50_000,
            arrival_tick: 0,
            deadline_tick: 5,
            priority: 5,
            divisible: false,
        }]);
        let monte_carlo = MonteCarloConfig {
            num_samples: 4,
            sample_method: crate::config::SampleMethod::Bootstrap,
            evaluation_ticks: 10,
            parallel_workers: 2,
        };

        let result = PolicyEvaluator::evaluate(
            scenario,
            policies,
            history,
            &monte_carlo,
            42,
            0,
            "BANK_A",
        )
        .await
        .unwrap();
        assert_eq!(result.sample_costs.len(), 4);
    }
}
