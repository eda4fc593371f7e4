//! `GameOrchestrator`: drives the full propose/evaluate/decide loop across
//! iterations until convergence, persisting every iteration as it goes.
//!
//! One iteration evaluates the *iteration-start* joint policy set once per
//! optimized agent (agent-filtered Monte Carlo sampling), then fans out one
//! concurrent task per agent to call the LLM and paired-compare its
//! candidate against that fixed baseline. Agents do not see each other's
//! accepted changes until the next iteration — the isolation invariant now
//! extends to the joint policy set itself, not just the optimizer's prompt,
//! because concurrent tasks share no mutable state. Tasks are staggered by
//! `llm_config.fanout_stagger_seconds` to respect provider rate limits, and
//! return fully-resolved outcomes rather than writing to the database
//! themselves: `GameSessionRepository` owns a single `duckdb::Connection`
//! that isn't safely shared across tasks, so every persistence call happens
//! back on this orchestrator task, sequentially, in `optimized_agents` order
//! after the fan-out's `join_all` completes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::comparator::PairedComparator;
use crate::config::{GameConfig, GameMode, HistoricalTransaction, MonteCarloConfig, Policy, PolicyConstraints};
use crate::convergence::ConvergenceDetector;
use crate::error::{CoreError, CoreResult};
use crate::evaluator::PolicyEvaluator;
use crate::llm::{HttpLlmClient, LlmClient};
use crate::optimizer::{AgentHistoryEntry, LlmAttempt, PolicyOptimizer};
use crate::persistence::GameSessionRepository;
use crate::records::{
    content_hash, GameEvent, GameSession, LlmInteraction, PolicyDiff, PolicyIterationRecord,
    SessionStatus,
};
use crate::scenario::ScenarioConfig;
use crate::state_provider::LiveStateProvider;

/// Outcome of a completed run, returned by `GameOrchestrator::run`.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub iterations_run: usize,
    pub converged: bool,
    pub convergence_reason: Option<String>,
    pub best_cost: Option<f64>,
    pub final_policies: HashMap<String, Policy>,
}

/// Everything one agent's fan-out task resolves, for the orchestrator task
/// to persist and apply once every agent in the iteration has finished.
struct AgentIterationOutcome {
    agent_id: String,
    interactions: Vec<LlmAttempt>,
    old_policy_json: String,
    old_policy_hash: String,
    old_mean_cost: i64,
    old_sample_costs: Vec<i64>,
    new_policy: Option<Policy>,
    new_policy_json: Option<String>,
    new_policy_hash: Option<String>,
    new_cost: Option<i64>,
    sample_costs_new: Vec<i64>,
    was_accepted: bool,
    acceptance_reason: String,
    validation_errors: Vec<String>,
}

pub struct GameOrchestrator {
    config: GameConfig,
    scenario: Arc<ScenarioConfig>,
    repository: GameSessionRepository,
    llm: Arc<dyn LlmClient>,
    policies_by_agent: HashMap<String, Policy>,
    agent_history: HashMap<String, Vec<AgentHistoryEntry>>,
    best_known_cost: HashMap<String, i64>,
    convergence: ConvergenceDetector,
    session: GameSession,
    iteration: usize,
    live_state: Arc<LiveStateProvider>,
    event_sink: Option<UnboundedSender<GameEvent>>,
}

impl GameOrchestrator {
    /// Build an orchestrator using the HTTP-backed LLM client and either a
    /// file-backed or in-memory repository, per `output_config.db_path`.
    pub fn new(config: GameConfig) -> CoreResult<Self> {
        let llm: Box<dyn LlmClient> = Box::new(HttpLlmClient::new(
            config.llm_config.model.clone(),
            config.llm_config.temperature,
            config.llm_config.timeout_seconds,
        ));
        Self::with_llm_client(config, llm)
    }

    /// Build an orchestrator with a caller-supplied `LlmClient` — the
    /// `--offline` CLI path and integration tests use this with a
    /// `RecordingLlmClient`.
    pub fn with_llm_client(config: GameConfig, llm: Box<dyn LlmClient>) -> CoreResult<Self> {
        let scenario = Arc::new(ScenarioConfig::load(Path::new(&config.scenario_path))?);

        let repository = match &config.output_config.db_path {
            Some(path) => GameSessionRepository::open(Path::new(path))?,
            None => GameSessionRepository::open_in_memory()?,
        };

        let full_config_json = serde_json::to_string(&config)?;
        let scenario_config_hash = content_hash(&serde_json::to_string(scenario.as_ref())?);
        let session = GameSession::new(
            config.game_id.clone(),
            config.mode,
            config.master_seed,
            scenario_config_hash,
            full_config_json,
        );
        repository.create_session(&session)?;

        let policies_by_agent = config.seed_policies.clone();
        let convergence = ConvergenceDetector::new(config.convergence_criteria.clone());
        let live_state = Arc::new(LiveStateProvider::new(session.clone()));

        Ok(Self {
            config,
            scenario,
            repository,
            llm: Arc::from(llm),
            policies_by_agent,
            agent_history: HashMap::new(),
            best_known_cost: HashMap::new(),
            convergence,
            session,
            iteration: 0,
            live_state,
            event_sink: None,
        })
    }

    /// Route every emitted `GameEvent` through `sink` in addition to
    /// persisting it, so a caller (the CLI's verbose renderer) can observe
    /// the run live without polling the database.
    pub fn with_event_sink(mut self, sink: UnboundedSender<GameEvent>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn current_iteration(&self) -> usize {
        self.iteration
    }

    pub fn best_cost(&self) -> Option<f64> {
        self.convergence.best_cost()
    }

    pub fn best_policies(&self) -> &HashMap<String, Policy> {
        &self.policies_by_agent
    }

    /// The in-memory view a live renderer or test can read from while (or
    /// after) `run` executes, without touching the database.
    pub fn live_state(&self) -> Arc<LiveStateProvider> {
        Arc::clone(&self.live_state)
    }

    /// Run until convergence or `max_iterations`, persisting every
    /// iteration's outcome as it completes.
    pub async fn run(&mut self) -> CoreResult<RunOutcome> {
        let mut convergence_reason = None;

        self.emit_event(
            "experiment_start",
            None,
            serde_json::json!({
                "game_id": self.config.game_id,
                "optimized_agents": self.config.optimized_agents,
                "master_seed": self.config.master_seed,
            }),
        )?;

        loop {
            let history = Arc::new(self.history_window());
            let constraints = Arc::new(self.config.policy_constraints.clone().unwrap_or_default());
            let monte_carlo = Arc::new(self.config.monte_carlo_config.clone());
            let policies_snapshot = Arc::new(self.policies_by_agent.clone());

            self.emit_event(
                "iteration_start",
                Some(self.iteration),
                serde_json::json!({ "agent_count": self.config.optimized_agents.len() }),
            )?;

            let current_evals = self
                .bootstrap_evaluate(&history, &monte_carlo, &policies_snapshot)
                .await?;

            let iteration_mean_cost = mean_of(
                current_evals
                    .values()
                    .map(|eval| eval.mean_cost as f64)
                    .collect::<Vec<_>>()
                    .as_slice(),
            );

            info!(
                iteration = self.iteration,
                mean_cost = iteration_mean_cost,
                "iteration starting"
            );

            let results = self
                .fan_out_agents(
                    &history,
                    &constraints,
                    &monte_carlo,
                    &policies_snapshot,
                    &current_evals,
                )
                .await?;

            let mut accepted_count = 0usize;
            let mut rejected_count = 0usize;
            for outcome in results {
                if outcome.was_accepted {
                    accepted_count += 1;
                } else {
                    rejected_count += 1;
                }
                self.apply_outcome(outcome)?;
            }

            self.session.total_iterations = self.iteration + 1;
            self.session.accepted_count += accepted_count;
            self.session.rejected_count += rejected_count;
            self.live_state.update_session(self.session.clone());

            let reason = self.convergence.record(iteration_mean_cost);

            self.repository.update_session_status(
                self.session.game_session_id,
                SessionStatus::Running,
                self.session.total_iterations,
                self.session.accepted_count,
                self.session.rejected_count,
                None,
            )?;

            if let Some(r) = reason {
                convergence_reason = Some(r);
                self.iteration += 1;
                break;
            }

            self.iteration += 1;
            if self.iteration >= self.config.convergence_criteria.max_iterations {
                warn!(iteration = self.iteration, "reached max_iterations without detected stability");
                convergence_reason = Some(crate::convergence::ConvergenceReason::MaxIterations);
                break;
            }
        }

        // Stability is the only reason that counts as "converged" (B3):
        // hitting max_iterations without the stability window closing is a
        // completed, not converged, run.
        let final_status = match convergence_reason {
            Some(crate::convergence::ConvergenceReason::Stable) => SessionStatus::Converged,
            _ => SessionStatus::Completed,
        };
        let converged = final_status == SessionStatus::Converged;
        let convergence_reason = convergence_reason.map(|r| r.as_str().to_string());
        self.repository.update_session_status(
            self.session.game_session_id,
            final_status,
            self.session.total_iterations,
            self.session.accepted_count,
            self.session.rejected_count,
            convergence_reason.as_deref(),
        )?;
        self.session.status = final_status;
        self.session.final_convergence_reason = convergence_reason.clone();
        self.live_state.update_session(self.session.clone());

        self.emit_event(
            "experiment_end",
            None,
            serde_json::json!({
                "iterations_run": self.iteration,
                "converged": converged,
                "convergence_reason": convergence_reason,
                "best_cost": self.convergence.best_cost(),
            }),
        )?;

        Ok(RunOutcome {
            iterations_run: self.iteration,
            converged,
            convergence_reason,
            best_cost: self.convergence.best_cost(),
            final_policies: self.policies_by_agent.clone(),
        })
    }

    /// Evaluate the iteration-start joint policy set once per optimized
    /// agent, each against its own agent-filtered sample set, emitting a
    /// `bootstrap_evaluation` event per agent as results come in.
    async fn bootstrap_evaluate(
        &self,
        history: &Arc<Vec<HistoricalTransaction>>,
        monte_carlo: &Arc<MonteCarloConfig>,
        policies_snapshot: &Arc<HashMap<String, Policy>>,
    ) -> CoreResult<HashMap<String, crate::evaluator::EvaluationResult>> {
        let futures = self.config.optimized_agents.iter().map(|agent_id| {
            PolicyEvaluator::evaluate(
                Arc::clone(&self.scenario),
                Arc::clone(policies_snapshot),
                Arc::clone(history),
                monte_carlo,
                self.config.master_seed,
                self.iteration,
                agent_id,
            )
        });
        let results = futures::future::join_all(futures).await;

        let mut evals = HashMap::with_capacity(self.config.optimized_agents.len());
        for (agent_id, result) in self.config.optimized_agents.iter().zip(results) {
            let eval = result?;
            self.emit_event(
                "bootstrap_evaluation",
                Some(self.iteration),
                serde_json::json!({ "agent_id": agent_id, "mean_cost": eval.mean_cost }),
            )?;
            evals.insert(agent_id.clone(), eval);
        }
        Ok(evals)
    }

    /// Spawn one concurrent task per optimized agent — propose, then
    /// paired-compare against the iteration-start baseline — staggered by
    /// `llm_config.fanout_stagger_seconds` between successive spawns.
    async fn fan_out_agents(
        &self,
        history: &Arc<Vec<HistoricalTransaction>>,
        constraints: &Arc<PolicyConstraints>,
        monte_carlo: &Arc<MonteCarloConfig>,
        policies_snapshot: &Arc<HashMap<String, Policy>>,
        current_evals: &HashMap<String, crate::evaluator::EvaluationResult>,
    ) -> CoreResult<Vec<AgentIterationOutcome>> {
        let stagger = Duration::from_secs_f64(self.config.llm_config.fanout_stagger_seconds.max(0.0));
        let mut handles = Vec::with_capacity(self.config.optimized_agents.len());

        for (idx, agent_id) in self.config.optimized_agents.iter().enumerate() {
            if idx > 0 && !stagger.is_zero() {
                tokio::time::sleep(stagger).await;
            }

            let agent_id = agent_id.clone();
            let current_policy = self
                .policies_by_agent
                .get(&agent_id)
                .cloned()
                .expect("every optimized agent has a policy loaded at construction");
            let history_window = self.agent_history.get(&agent_id).cloned().unwrap_or_default();
            let best_known = self.best_known_cost.get(&agent_id).copied();
            let current_eval = current_evals
                .get(&agent_id)
                .cloned()
                .expect("bootstrap_evaluate ran for every optimized agent");

            let scenario = Arc::clone(&self.scenario);
            let policies_snapshot = Arc::clone(policies_snapshot);
            let history = Arc::clone(history);
            let constraints = Arc::clone(constraints);
            let monte_carlo = Arc::clone(monte_carlo);
            let llm = Arc::clone(&self.llm);
            let master_seed = self.config.master_seed;
            let iteration = self.iteration;
            let max_retries = self.config.llm_config.max_retries;
            let improvement_threshold = self.config.convergence_criteria.improvement_threshold;

            handles.push(tokio::spawn(async move {
                run_agent_iteration(
                    agent_id,
                    current_policy,
                    current_eval,
                    history_window,
                    best_known,
                    scenario,
                    policies_snapshot,
                    history,
                    constraints,
                    monte_carlo,
                    llm,
                    master_seed,
                    iteration,
                    max_retries,
                    improvement_threshold,
                )
                .await
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            let outcome = handle
                .await
                .map_err(|err| CoreError::Evaluation(format!("agent optimization task panicked: {err}")))??;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Persist and apply one agent's already-decided outcome. Runs on the
    /// orchestrator task only, since `GameSessionRepository` owns the one
    /// `duckdb::Connection` for this run.
    fn apply_outcome(&mut self, outcome: AgentIterationOutcome) -> CoreResult<()> {
        for attempt in &outcome.interactions {
            let raw_response_text = attempt
                .raw_response
                .as_ref()
                .map(|v| serde_json::to_string(v).unwrap_or_default())
                .unwrap_or_default();
            self.repository.append_llm_interaction(&LlmInteraction {
                game_session_id: self.session.game_session_id,
                iteration_number: self.iteration,
                agent_id: outcome.agent_id.clone(),
                system_prompt: None,
                user_prompt: attempt.instruction.clone(),
                raw_response: raw_response_text,
                parsed_policy_json: attempt
                    .raw_response
                    .as_ref()
                    .filter(|_| attempt.parsing_error.is_none())
                    .map(|v| serde_json::to_string(v).unwrap_or_default()),
                parsing_error: attempt.parsing_error.clone(),
                prompt_tokens: None,
                completion_tokens: None,
                latency_seconds: 0.0,
                created_at: chrono::Utc::now(),
            })?;
            self.emit_event(
                "llm_call",
                Some(self.iteration),
                serde_json::json!({
                    "agent_id": outcome.agent_id,
                    "had_error": attempt.parsing_error.is_some(),
                }),
            )?;
        }

        if outcome.was_accepted {
            if let Some(new_json) = &outcome.new_policy_json {
                self.repository.append_policy_diff(&PolicyDiff {
                    game_session_id: self.session.game_session_id,
                    iteration_number: self.iteration,
                    agent_id: outcome.agent_id.clone(),
                    diff_text: line_diff(&outcome.old_policy_json, new_json),
                })?;
            }
            if let Some(candidate) = &outcome.new_policy {
                self.policies_by_agent.insert(outcome.agent_id.clone(), candidate.clone());
            }
            self.emit_event(
                "policy_change",
                Some(self.iteration),
                serde_json::json!({
                    "agent_id": outcome.agent_id,
                    "old_cost": outcome.old_mean_cost,
                    "new_cost": outcome.new_cost,
                    "reason": outcome.acceptance_reason,
                }),
            )?;
        } else {
            self.emit_event(
                "policy_rejected",
                Some(self.iteration),
                serde_json::json!({
                    "agent_id": outcome.agent_id,
                    "reason": outcome.acceptance_reason,
                }),
            )?;
        }

        let recorded_cost = outcome.new_cost.unwrap_or(outcome.old_mean_cost);
        self.best_known_cost
            .entry(outcome.agent_id.clone())
            .and_modify(|best| *best = (*best).min(recorded_cost))
            .or_insert(recorded_cost);

        self.agent_history
            .entry(outcome.agent_id.clone())
            .or_default()
            .push(AgentHistoryEntry {
                iteration: self.iteration,
                was_accepted: outcome.was_accepted,
                mean_cost: recorded_cost,
            });

        let record = PolicyIterationRecord {
            game_session_id: self.session.game_session_id,
            iteration_number: self.iteration,
            agent_id: outcome.agent_id,
            old_policy_json: outcome.old_policy_json,
            old_policy_hash: outcome.old_policy_hash,
            new_policy_json: outcome.new_policy_json,
            new_policy_hash: outcome.new_policy_hash,
            old_cost: outcome.old_mean_cost,
            new_cost: outcome.new_cost,
            sample_costs_old: outcome.old_sample_costs,
            sample_costs_new: outcome.sample_costs_new,
            mean_delta: outcome
                .new_cost
                .map(|c| (outcome.old_mean_cost - c) as f64)
                .unwrap_or(0.0),
            was_accepted: outcome.was_accepted,
            acceptance_reason: outcome.acceptance_reason,
            validation_errors: outcome.validation_errors,
            llm_latency_seconds: 0.0,
            tokens_used: 0,
            created_at: chrono::Utc::now(),
        };
        self.repository.append_iteration(&record)?;
        self.live_state.push_iteration(record);

        Ok(())
    }

    fn emit_event(
        &self,
        event_type: &str,
        iteration_number: Option<usize>,
        detail_json: serde_json::Value,
    ) -> CoreResult<()> {
        let event = GameEvent {
            game_session_id: self.session.game_session_id,
            iteration_number,
            event_type: event_type.to_string(),
            detail_json,
            created_at: chrono::Utc::now(),
        };
        self.repository.append_event(&event)?;
        if let Some(sink) = &self.event_sink {
            let _ = sink.send(event);
        }
        Ok(())
    }

    /// The historical transaction window visible to this iteration's
    /// sampling. `rl_optimization` models a single long episode with
    /// intra-episode optimization triggers by expanding the window one
    /// scenario day at a time; `campaign_learning` always resamples the
    /// full historical set, modeling repeated independent campaigns over
    /// the same recorded day.
    ///
    /// `SimulationRunner` runs one fixed-length episode per call with no
    /// pause/resume, so true intra-episode optimization (continuing the
    /// same episode's clock across a tick-triggered update) is out of
    /// scope here; this expanding-window approximation is the documented
    /// simplification for `rl_optimization`.
    fn history_window(&self) -> Vec<HistoricalTransaction> {
        match self.config.mode {
            GameMode::CampaignLearning => self.scenario.historical_transactions.clone(),
            GameMode::RlOptimization => {
                let ticks_per_day = self.scenario.ticks_per_day.max(1);
                let cutoff = (self.iteration + 1) * ticks_per_day;
                self.scenario
                    .historical_transactions
                    .iter()
                    .filter(|tx| tx.arrival_tick < cutoff)
                    .cloned()
                    .collect()
            }
        }
    }
}

/// One agent's propose/evaluate/decide step, run inside its own spawned
/// task. Pure with respect to orchestrator state: reads only the owned
/// copies passed in, writes nothing, and returns the fully-decided outcome
/// for the orchestrator task to persist.
#[allow(clippy::too_many_arguments)]
async fn run_agent_iteration(
    agent_id: String,
    current_policy: Policy,
    current_eval: crate::evaluator::EvaluationResult,
    history_window: Vec<AgentHistoryEntry>,
    best_known: Option<i64>,
    scenario: Arc<ScenarioConfig>,
    policies_snapshot: Arc<HashMap<String, Policy>>,
    history: Arc<Vec<HistoricalTransaction>>,
    constraints: Arc<PolicyConstraints>,
    monte_carlo: Arc<MonteCarloConfig>,
    llm: Arc<dyn LlmClient>,
    master_seed: u64,
    iteration: usize,
    max_retries: u32,
    improvement_threshold: f64,
) -> CoreResult<AgentIterationOutcome> {
    let optimizer = PolicyOptimizer::new(llm.as_ref(), &constraints, max_retries);
    let optimization = optimizer
        .optimize_agent(
            &agent_id,
            &current_policy,
            current_eval.mean_cost,
            iteration,
            &history_window,
            best_known,
        )
        .await;

    let old_policy_json = serde_json::to_string(&current_policy)?;
    let old_policy_hash = content_hash(&old_policy_json);
    let old_mean_cost = current_eval.mean_cost;
    let old_sample_costs = current_eval.sample_costs.clone();

    let Some(candidate) = optimization.new_policy else {
        return Ok(AgentIterationOutcome {
            agent_id,
            interactions: optimization.interactions,
            old_policy_json,
            old_policy_hash,
            old_mean_cost,
            old_sample_costs,
            new_policy: None,
            new_policy_json: None,
            new_policy_hash: None,
            new_cost: None,
            sample_costs_new: Vec::new(),
            was_accepted: false,
            acceptance_reason: format!(
                "no valid candidate: {}",
                optimization.validation_errors.join("; ")
            ),
            validation_errors: optimization.validation_errors,
        });
    };

    let mut candidate_policies = (*policies_snapshot).clone();
    candidate_policies.insert(agent_id.clone(), candidate.clone());

    let candidate_eval = PolicyEvaluator::evaluate(
        scenario,
        Arc::new(candidate_policies),
        history,
        &monte_carlo,
        master_seed,
        iteration,
        &agent_id,
    )
    .await?;

    let comparison = PairedComparator::compare(
        &old_sample_costs,
        &candidate_eval.sample_costs,
        improvement_threshold,
    );

    let new_policy_json = serde_json::to_string(&candidate)?;
    let new_policy_hash = content_hash(&new_policy_json);
    let (was_accepted, acceptance_reason) = if comparison.accepted {
        (
            true,
            format!("accepted: mean cost improved by {:.2}", comparison.mean_delta),
        )
    } else {
        (
            false,
            format!(
                "rejected: mean delta {:.2} did not clear improvement threshold",
                comparison.mean_delta
            ),
        )
    };

    Ok(AgentIterationOutcome {
        agent_id,
        interactions: optimization.interactions,
        old_policy_json,
        old_policy_hash,
        old_mean_cost,
        old_sample_costs,
        new_policy: if was_accepted { Some(candidate) } else { None },
        new_policy_json: Some(new_policy_json),
        new_policy_hash: Some(new_policy_hash),
        new_cost: Some(candidate_eval.mean_cost),
        sample_costs_new: candidate_eval.sample_costs,
        was_accepted,
        acceptance_reason,
        validation_errors: optimization.validation_errors,
    })
}

fn mean_of(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Minimal line-oriented diff: every line unique to `new` is reported
/// added, every line unique to `old` is reported removed. Not a true LCS
/// diff — good enough for an audit trail, not for patch application.
fn line_diff(old: &str, new: &str) -> String {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    let mut out = String::new();
    for line in &old_lines {
        if !new_lines.contains(line) {
            out.push_str("- ");
            out.push_str(line);
            out.push('\n');
        }
    }
    for line in &new_lines {
        if !old_lines.contains(line) {
            out.push_str("+ ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConvergenceCriteria, LlmConfig, MonteCarloConfig as MonteCarloCfg, OptimizationSchedule, OutputConfig, SampleMethod};
    use crate::llm::RecordingLlmClient;
    use serde_json::json;
    use std::collections::HashMap as StdHashMap;
    use std::io::Write;

    fn write_scenario(dir: &std::path::Path) -> String {
        let path = dir.join("scenario.yaml");
        let yaml = r#"
ticks_per_day: 20
agents:
  - id: BANK_A
    opening_balance: 1000000
    credit_limit: 500000
  - id: BANK_B
    opening_balance: 1000000
    credit_limit: 500000
historical_transactions:
  - sender_id: BANK_A
    receiver_id: BANK_B
    amount: 50000
    arrival_tick: 0
    deadline_tick: 10
"#;
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn seed_policy(policy_id: &str) -> Policy {
        Policy {
            version: "1.0".to_string(),
            policy_id: policy_id.to_string(),
            description: None,
            payment_tree: None,
            strategic_collateral_tree: None,
            end_of_tick_collateral_tree: None,
            bank_tree: None,
            parameters: StdHashMap::new(),
        }
    }

    fn minimal_config(scenario_path: String) -> GameConfig {
        let mut seed_policies = StdHashMap::new();
        seed_policies.insert("BANK_A".to_string(), seed_policy("BANK_A"));

        GameConfig {
            game_id: "test-game".to_string(),
            scenario_path,
            master_seed: 7,
            mode: GameMode::CampaignLearning,
            optimized_agents: vec!["BANK_A".to_string()],
            seed_policies,
            llm_config: LlmConfig {
                model: "openai:gpt-4o-mini".to_string(),
                temperature: 0.7,
                max_retries: 1,
                timeout_seconds: 30,
                thinking_budget: None,
                reasoning_effort: None,
                fanout_stagger_seconds: 0.0,
            },
            optimization_schedule: OptimizationSchedule::OnSimulationEnd {
                min_remaining_repetitions: 1,
            },
            monte_carlo_config: MonteCarloCfg {
                num_samples: 4,
                sample_method: SampleMethod::Bootstrap,
                evaluation_ticks: 20,
                parallel_workers: 2,
            },
            convergence_criteria: ConvergenceCriteria {
                metric_name: "total_cost".to_string(),
                stability_threshold: 0.05,
                stability_window: 2,
                max_iterations: 2,
                improvement_threshold: 0.0,
            },
            policy_constraints: None,
            output_config: OutputConfig::default(),
        }
    }

    #[tokio::test]
    async fn runs_to_max_iterations_with_no_candidates() {
        let dir = tempfile_dir();
        let scenario_path = write_scenario(&dir);
        let config = minimal_config(scenario_path);
        let llm = Box::new(RecordingLlmClient::new(vec![]));

        let mut orchestrator = GameOrchestrator::with_llm_client(config, llm).unwrap();
        let outcome = orchestrator.run().await.unwrap();

        assert_eq!(outcome.iterations_run, 2);
        assert!(!outcome.converged || outcome.convergence_reason.is_some());
    }

    #[tokio::test]
    async fn accepted_candidate_updates_joint_policy_set() {
        let dir = tempfile_dir();
        let scenario_path = write_scenario(&dir);
        let mut config = minimal_config(scenario_path);
        config.convergence_criteria.max_iterations = 1;

        let candidate = json!({
            "version": "1.0",
            "policy_id": "BANK_A_v2",
            "parameters": {},
            "payment_tree": {
                "type": "action",
                "node_id": "root",
                "action": "Hold"
            }
        });
        let llm = Box::new(RecordingLlmClient::new(vec![candidate]));

        let mut orchestrator = GameOrchestrator::with_llm_client(config, llm).unwrap();
        let outcome = orchestrator.run().await.unwrap();

        assert_eq!(outcome.iterations_run, 1);
        assert!(outcome.final_policies.contains_key("BANK_A"));
    }

    #[tokio::test]
    async fn run_emits_the_mandated_event_taxonomy() {
        let dir = tempfile_dir();
        let scenario_path = write_scenario(&dir);
        let mut config = minimal_config(scenario_path);
        config.convergence_criteria.max_iterations = 1;

        let candidate = json!({
            "version": "1.0",
            "policy_id": "BANK_A_v2",
            "parameters": {},
            "payment_tree": {
                "type": "action",
                "node_id": "root",
                "action": "Hold"
            }
        });
        let llm = Box::new(RecordingLlmClient::new(vec![candidate]));

        let mut orchestrator = GameOrchestrator::with_llm_client(config, llm).unwrap();
        let session_id = orchestrator.session.game_session_id;
        orchestrator.run().await.unwrap();

        let events = orchestrator.repository.list_events(session_id).unwrap();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        for expected in [
            "experiment_start",
            "iteration_start",
            "bootstrap_evaluation",
            "llm_call",
            "policy_change",
            "experiment_end",
        ] {
            assert!(types.contains(&expected), "missing event type {expected}; got {types:?}");
        }
    }

    #[tokio::test]
    async fn live_state_reflects_a_completed_run() {
        let dir = tempfile_dir();
        let scenario_path = write_scenario(&dir);
        let mut config = minimal_config(scenario_path);
        config.convergence_criteria.max_iterations = 1;
        let llm = Box::new(RecordingLlmClient::new(vec![]));

        let mut orchestrator = GameOrchestrator::with_llm_client(config, llm).unwrap();
        let live = orchestrator.live_state();
        orchestrator.run().await.unwrap();

        use crate::state_provider::StateProvider;
        let snapshots = live.latest_agent_snapshots().unwrap();
        assert!(snapshots.contains_key("BANK_A"));
    }

    fn tempfile_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "cashsim-core-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
