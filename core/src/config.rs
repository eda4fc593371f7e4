//! `GameConfig` and its nested configuration types.
//!
//! Deserialized from a YAML file via [`GameConfig::load`]. Load-time
//! validation enforces the invariants named in the data model: every
//! optimized agent has a seed policy, and every numeric knob lies in its
//! documented range.

use std::collections::HashMap;
use std::path::Path;

use cashsim_engine::policy::tree::DecisionTreeDef;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A per-agent policy as produced by the LLM or supplied as a seed. The
/// simulator consumes this directly as a JSON decision tree.
pub type Policy = DecisionTreeDef;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OptimizationSchedule {
    EveryTicks { interval: usize },
    AfterEndOfDay { min_remaining_days: usize },
    OnSimulationEnd { min_remaining_repetitions: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// `provider:model`, e.g. `"openai:gpt-4o-mini"`.
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub thinking_budget: Option<u64>,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    /// Delay before starting each subsequent optimized agent's call within
    /// the same iteration's concurrent fan-out, to respect provider rate
    /// limits.
    #[serde(default = "default_fanout_stagger_seconds")]
    pub fanout_stagger_seconds: f64,
}

fn default_temperature() -> f64 {
    0.7
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_seconds() -> u64 {
    60
}
fn default_fanout_stagger_seconds() -> f64 {
    0.5
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SampleMethod {
    Bootstrap,
    Permutation,
    Stratified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    pub num_samples: usize,
    pub sample_method: SampleMethod,
    pub evaluation_ticks: usize,
    #[serde(default = "default_parallel_workers")]
    pub parallel_workers: usize,
}

fn default_parallel_workers() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceCriteria {
    #[serde(default = "default_metric_name")]
    pub metric_name: String,
    pub stability_threshold: f64,
    pub stability_window: usize,
    pub max_iterations: usize,
    pub improvement_threshold: f64,
}

fn default_metric_name() -> String {
    "total_cost".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowedParameter {
    pub name: String,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConstraints {
    #[serde(default)]
    pub allowed_parameters: Vec<AllowedParameter>,
    #[serde(default)]
    pub allowed_fields: Vec<String>,
    #[serde(default = "default_payment_tree_actions")]
    pub payment_tree_actions: Vec<String>,
    #[serde(default = "default_bank_tree_actions")]
    pub bank_tree_actions: Vec<String>,
    #[serde(default = "default_collateral_tree_actions")]
    pub strategic_collateral_tree_actions: Vec<String>,
    #[serde(default = "default_collateral_tree_actions")]
    pub end_of_tick_collateral_tree_actions: Vec<String>,
}

fn default_payment_tree_actions() -> Vec<String> {
    vec!["Release".to_string(), "Hold".to_string(), "Split".to_string()]
}

fn default_bank_tree_actions() -> Vec<String> {
    vec!["SetReleaseBudget".to_string()]
}

fn default_collateral_tree_actions() -> Vec<String> {
    vec![
        "PostCollateral".to_string(),
        "WithdrawCollateral".to_string(),
        "HoldCollateral".to_string(),
    ]
}

/// Omitting `policy_constraints` from a `GameConfig` does not mean
/// "anything goes" — it falls back to the canonical per-tree action
/// vocabularies every scenario shares, so cross-tree action reuse is still
/// a hard error with no config at all. Parameter/field allow-lists have no
/// scenario-independent canonical set, so those stay empty (unrestricted)
/// until a config opts into narrowing them.
impl Default for PolicyConstraints {
    fn default() -> Self {
        Self {
            allowed_parameters: Vec::new(),
            allowed_fields: Vec::new(),
            payment_tree_actions: default_payment_tree_actions(),
            bank_tree_actions: default_bank_tree_actions(),
            strategic_collateral_tree_actions: default_collateral_tree_actions(),
            end_of_tick_collateral_tree_actions: default_collateral_tree_actions(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub db_path: Option<String>,
}

/// One transaction from the recorded historical scenario. Sampling draws
/// from a `Vec<HistoricalTransaction>` loaded alongside the scenario file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalTransaction {
    pub sender_id: String,
    pub receiver_id: String,
    pub amount: i64,
    pub arrival_tick: usize,
    pub deadline_tick: usize,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub divisible: bool,
}

fn default_priority() -> u8 {
    5
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    RlOptimization,
    CampaignLearning,
}

/// Top-level, immutable-after-load configuration for one optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    pub game_id: String,
    pub scenario_path: String,
    pub master_seed: u64,
    pub mode: GameMode,
    pub optimized_agents: Vec<String>,
    pub seed_policies: HashMap<String, Policy>,
    pub llm_config: LlmConfig,
    pub optimization_schedule: OptimizationSchedule,
    pub monte_carlo_config: MonteCarloConfig,
    pub convergence_criteria: ConvergenceCriteria,
    #[serde(default)]
    pub policy_constraints: Option<PolicyConstraints>,
    #[serde(default)]
    pub output_config: OutputConfig,
}

impl GameConfig {
    /// Load a `GameConfig` from a YAML file, applying all load-time
    /// invariants. Returns the first violated invariant as a
    /// `CoreError::Configuration`.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: GameConfig = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CoreResult<()> {
        if self.game_id.trim().is_empty() {
            return Err(CoreError::Configuration("game_id must not be empty".into()));
        }
        if self.optimized_agents.is_empty() {
            return Err(CoreError::Configuration(
                "optimized_agents must not be empty".into(),
            ));
        }
        for agent_id in &self.optimized_agents {
            if !self.seed_policies.contains_key(agent_id) {
                return Err(CoreError::Configuration(format!(
                    "optimized agent '{agent_id}' has no seed policy"
                )));
            }
        }
        if !(0.0..=2.0).contains(&self.llm_config.temperature) {
            return Err(CoreError::Configuration(format!(
                "llm_config.temperature must be in [0, 2], got {}",
                self.llm_config.temperature
            )));
        }
        if !(1..=10).contains(&self.llm_config.max_retries) {
            return Err(CoreError::Configuration(format!(
                "llm_config.max_retries must be in [1, 10], got {}",
                self.llm_config.max_retries
            )));
        }
        if !(10..=600).contains(&self.llm_config.timeout_seconds) {
            return Err(CoreError::Configuration(format!(
                "llm_config.timeout_seconds must be in [10, 600], got {}",
                self.llm_config.timeout_seconds
            )));
        }
        if !(1..=1000).contains(&self.monte_carlo_config.num_samples) {
            return Err(CoreError::Configuration(format!(
                "monte_carlo_config.num_samples must be in [1, 1000], got {}",
                self.monte_carlo_config.num_samples
            )));
        }
        if self.monte_carlo_config.evaluation_ticks < 10 {
            return Err(CoreError::Configuration(format!(
                "monte_carlo_config.evaluation_ticks must be >= 10, got {}",
                self.monte_carlo_config.evaluation_ticks
            )));
        }
        if self.monte_carlo_config.parallel_workers < 1 {
            return Err(CoreError::Configuration(
                "monte_carlo_config.parallel_workers must be >= 1".into(),
            ));
        }
        let cc = &self.convergence_criteria;
        if !(0.0..=0.5).contains(&cc.stability_threshold) || cc.stability_threshold <= 0.0 {
            return Err(CoreError::Configuration(format!(
                "convergence_criteria.stability_threshold must be in (0, 0.5], got {}",
                cc.stability_threshold
            )));
        }
        if !(2..=20).contains(&cc.stability_window) {
            return Err(CoreError::Configuration(format!(
                "convergence_criteria.stability_window must be in [2, 20], got {}",
                cc.stability_window
            )));
        }
        if !(5..=500).contains(&cc.max_iterations) {
            return Err(CoreError::Configuration(format!(
                "convergence_criteria.max_iterations must be in [5, 500], got {}",
                cc.max_iterations
            )));
        }
        if !(0.0..=0.5).contains(&cc.improvement_threshold) {
            return Err(CoreError::Configuration(format!(
                "convergence_criteria.improvement_threshold must be in [0, 0.5], got {}",
                cc.improvement_threshold
            )));
        }
        Ok(())
    }
}
