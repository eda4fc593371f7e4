//! Persisted record types: one run's complete, replayable audit trail.
//!
//! These are the shapes `GameSessionRepository` stores and `StateProvider`
//! reads back — live from the orchestrator's in-memory event stream, or
//! from the database on replay. Both paths must render identically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::GameMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Converged,
    Failed,
}

/// Top-level container for one optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    pub game_session_id: Uuid,
    pub game_id: String,
    pub mode: GameMode,
    pub master_seed: u64,
    pub scenario_config_hash: String,
    pub full_config_json: String,
    pub status: SessionStatus,
    pub total_iterations: usize,
    pub accepted_count: usize,
    pub rejected_count: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub final_convergence_reason: Option<String>,
}

impl GameSession {
    pub fn new(
        game_id: String,
        mode: GameMode,
        master_seed: u64,
        scenario_config_hash: String,
        full_config_json: String,
    ) -> Self {
        Self {
            game_session_id: Uuid::new_v4(),
            game_id,
            mode,
            master_seed,
            scenario_config_hash,
            full_config_json,
            status: SessionStatus::Running,
            total_iterations: 0,
            accepted_count: 0,
            rejected_count: 0,
            started_at: Utc::now(),
            finished_at: None,
            final_convergence_reason: None,
        }
    }
}

/// One agent's one iteration of propose/evaluate/decide, full audit detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyIterationRecord {
    pub game_session_id: Uuid,
    pub iteration_number: usize,
    pub agent_id: String,
    pub old_policy_json: String,
    pub old_policy_hash: String,
    pub new_policy_json: Option<String>,
    pub new_policy_hash: Option<String>,
    pub old_cost: i64,
    pub new_cost: Option<i64>,
    pub sample_costs_old: Vec<i64>,
    pub sample_costs_new: Vec<i64>,
    pub mean_delta: f64,
    pub was_accepted: bool,
    pub acceptance_reason: String,
    pub validation_errors: Vec<String>,
    pub llm_latency_seconds: f64,
    pub tokens_used: u32,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit of one LLM call. Not the same as a `PolicyIterationRecord`:
/// a single iteration may include several failed LLM interactions (retries)
/// before arriving at the candidate the iteration record describes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmInteraction {
    pub game_session_id: Uuid,
    pub iteration_number: usize,
    pub agent_id: String,
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    pub raw_response: String,
    pub parsed_policy_json: Option<String>,
    pub parsing_error: Option<String>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub latency_seconds: f64,
    pub created_at: DateTime<Utc>,
}

/// Textual diff between an agent's old and new policy JSON, stored
/// alongside the iteration record for quick inspection without
/// re-parsing both policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDiff {
    pub game_session_id: Uuid,
    pub iteration_number: usize,
    pub agent_id: String,
    pub diff_text: String,
}

/// A single orchestrator-level audit event (iteration start, acceptance
/// decision, convergence check, run end, ...), independent of any one
/// agent's iteration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameEvent {
    pub game_session_id: Uuid,
    pub iteration_number: Option<usize>,
    pub event_type: String,
    pub detail_json: Json,
    pub created_at: DateTime<Utc>,
}

/// `sha2::Sha256` over the canonical (serde_json-serialized) form of a
/// value — used for both the scenario/config hashes bound to a
/// `GameSession` and per-policy content hashes in iteration records.
pub fn content_hash(canonical_json: &str) -> String {
    let digest = Sha256::digest(canonical_json.as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_deterministic() {
        let a = content_hash("{\"a\":1}");
        let b = content_hash("{\"a\":1}");
        assert_eq!(a, b);
    }

    #[test]
    fn content_hash_differs_on_different_input() {
        let a = content_hash("{\"a\":1}");
        let b = content_hash("{\"a\":2}");
        assert_ne!(a, b);
    }

    #[test]
    fn new_session_starts_running_with_zero_counters() {
        let session = GameSession::new(
            "game-1".to_string(),
            GameMode::RlOptimization,
            42,
            "scenario-hash".to_string(),
            "{}".to_string(),
        );
        assert_eq!(session.status, SessionStatus::Running);
        assert_eq!(session.total_iterations, 0);
        assert!(session.finished_at.is_none());
    }
}
