//! Scenario configuration: the fixed simulation setup a `GameConfig` points
//! at via `scenario_path` — agent roster, simulator rates, and the
//! historical transaction set sampling draws from.
//!
//! Kept separate from `GameConfig` because a scenario is typically shared
//! across many games (a historical settlement day replayed under many
//! different optimization configurations).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::HistoricalTransaction;
use crate::error::CoreResult;

/// Serializable mirror of `cashsim_engine::PolicyConfig`'s non-tree
/// variants. The `Tree` variant is deliberately absent here: a baseline
/// policy is what an agent runs when it is *not* the subject of
/// optimization, and only the optimizer ever produces decision trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BaselinePolicy {
    Fifo,
    Deadline {
        urgency_threshold: usize,
    },
    LiquidityAware {
        target_buffer: i64,
        urgency_threshold: usize,
    },
    LiquiditySplitting {
        max_splits: usize,
        min_split_amount: i64,
    },
}

impl Default for BaselinePolicy {
    fn default() -> Self {
        BaselinePolicy::Fifo
    }
}

impl BaselinePolicy {
    pub fn into_policy_config(self) -> cashsim_engine::PolicyConfig {
        match self {
            BaselinePolicy::Fifo => cashsim_engine::PolicyConfig::Fifo,
            BaselinePolicy::Deadline { urgency_threshold } => {
                cashsim_engine::PolicyConfig::Deadline { urgency_threshold }
            }
            BaselinePolicy::LiquidityAware {
                target_buffer,
                urgency_threshold,
            } => cashsim_engine::PolicyConfig::LiquidityAware {
                target_buffer,
                urgency_threshold,
            },
            BaselinePolicy::LiquiditySplitting {
                max_splits,
                min_split_amount,
            } => cashsim_engine::PolicyConfig::LiquiditySplitting {
                max_splits,
                min_split_amount,
            },
        }
    }
}

/// One agent's static roster entry: starting balance, credit limit, and
/// the policy it runs unless the game is actively optimizing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioAgent {
    pub id: String,
    pub opening_balance: i64,
    pub credit_limit: i64,
    #[serde(default)]
    pub baseline_policy: BaselinePolicy,
}

/// Serializable mirror of `cashsim_engine::CostRates`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioCostRates {
    #[serde(default = "default_overdraft_bps")]
    pub overdraft_bps_per_tick: f64,
    #[serde(default = "default_delay_cost")]
    pub delay_cost_per_tick_per_cent: f64,
    #[serde(default = "default_collateral_bps")]
    pub collateral_cost_per_tick_bps: f64,
    #[serde(default = "default_eod_penalty")]
    pub eod_penalty_per_transaction: i64,
    #[serde(default = "default_deadline_penalty")]
    pub deadline_penalty: i64,
    #[serde(default = "default_split_friction")]
    pub split_friction_cost: i64,
}

fn default_overdraft_bps() -> f64 {
    0.001
}
fn default_delay_cost() -> f64 {
    0.0001
}
fn default_collateral_bps() -> f64 {
    0.0002
}
fn default_eod_penalty() -> i64 {
    10_000
}
fn default_deadline_penalty() -> i64 {
    50_000
}
fn default_split_friction() -> i64 {
    1_000
}

impl Default for ScenarioCostRates {
    fn default() -> Self {
        Self {
            overdraft_bps_per_tick: default_overdraft_bps(),
            delay_cost_per_tick_per_cent: default_delay_cost(),
            collateral_cost_per_tick_bps: default_collateral_bps(),
            eod_penalty_per_transaction: default_eod_penalty(),
            deadline_penalty: default_deadline_penalty(),
            split_friction_cost: default_split_friction(),
        }
    }
}

impl From<ScenarioCostRates> for cashsim_engine::CostRates {
    fn from(rates: ScenarioCostRates) -> Self {
        cashsim_engine::CostRates {
            overdraft_bps_per_tick: rates.overdraft_bps_per_tick,
            delay_cost_per_tick_per_cent: rates.delay_cost_per_tick_per_cent,
            collateral_cost_per_tick_bps: rates.collateral_cost_per_tick_bps,
            eod_penalty_per_transaction: rates.eod_penalty_per_transaction,
            deadline_penalty: rates.deadline_penalty,
            split_friction_cost: rates.split_friction_cost,
        }
    }
}

/// Serializable mirror of `cashsim_engine::settlement::lsm::LsmConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioLsmConfig {
    #[serde(default = "default_true")]
    pub enable_bilateral: bool,
    #[serde(default = "default_true")]
    pub enable_cycles: bool,
    #[serde(default = "default_cycle_length")]
    pub max_cycle_length: usize,
    #[serde(default = "default_cycles_per_tick")]
    pub max_cycles_per_tick: usize,
}

fn default_true() -> bool {
    true
}
fn default_cycle_length() -> usize {
    4
}
fn default_cycles_per_tick() -> usize {
    10
}

impl Default for ScenarioLsmConfig {
    fn default() -> Self {
        Self {
            enable_bilateral: default_true(),
            enable_cycles: default_true(),
            max_cycle_length: default_cycle_length(),
            max_cycles_per_tick: default_cycles_per_tick(),
        }
    }
}

impl From<ScenarioLsmConfig> for cashsim_engine::settlement::lsm::LsmConfig {
    fn from(lsm: ScenarioLsmConfig) -> Self {
        cashsim_engine::settlement::lsm::LsmConfig {
            enable_bilateral: lsm.enable_bilateral,
            enable_cycles: lsm.enable_cycles,
            max_cycle_length: lsm.max_cycle_length,
            max_cycles_per_tick: lsm.max_cycles_per_tick,
        }
    }
}

/// The fixed setup a game optimizes policies against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub ticks_per_day: usize,
    pub agents: Vec<ScenarioAgent>,
    #[serde(default)]
    pub cost_rates: ScenarioCostRates,
    #[serde(default)]
    pub lsm: ScenarioLsmConfig,
    pub historical_transactions: Vec<HistoricalTransaction>,
}

impl ScenarioConfig {
    pub fn load(path: &Path) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let scenario: ScenarioConfig = serde_yaml::from_str(&raw)?;
        Ok(scenario)
    }
}
