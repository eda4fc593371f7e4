//! DuckDB-backed storage for a game session's full replayable history.
//!
//! `GameSessionRepository` owns the single `duckdb::Connection` used for a
//! run; it is not shared across threads (DuckDB's Rust binding isn't
//! `Sync`-shareable the way a networked driver's pool would be), so it
//! lives exclusively on the orchestrator task. Every `append_*` write runs
//! inside its own transaction and is retried with a fixed, auditable
//! geometric backoff before surfacing `CoreError::Persistence`.

use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use duckdb::{params, Connection};
use uuid::Uuid;

use crate::config::GameMode;
use crate::error::{CoreError, CoreResult};
use crate::records::{
    GameEvent, GameSession, LlmInteraction, PolicyDiff, PolicyIterationRecord, SessionStatus,
};

/// Fixed geometric backoff schedule for retried writes: 100ms, 400ms, 1600ms.
const RETRY_DELAYS_MS: [u64; 3] = [100, 400, 1600];

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS game_sessions (
    game_session_id TEXT PRIMARY KEY,
    game_id TEXT NOT NULL,
    mode TEXT NOT NULL,
    master_seed UBIGINT NOT NULL,
    scenario_config_hash TEXT NOT NULL,
    full_config_json TEXT NOT NULL,
    status TEXT NOT NULL,
    total_iterations UBIGINT NOT NULL,
    accepted_count UBIGINT NOT NULL,
    rejected_count UBIGINT NOT NULL,
    started_at TIMESTAMP NOT NULL,
    finished_at TIMESTAMP,
    final_convergence_reason TEXT
);

CREATE TABLE IF NOT EXISTS policy_iterations (
    game_session_id TEXT NOT NULL,
    iteration_number UBIGINT NOT NULL,
    agent_id TEXT NOT NULL,
    old_policy_json TEXT NOT NULL,
    old_policy_hash TEXT NOT NULL,
    new_policy_json TEXT,
    new_policy_hash TEXT,
    old_cost BIGINT NOT NULL,
    new_cost BIGINT,
    sample_costs_old TEXT NOT NULL,
    sample_costs_new TEXT NOT NULL,
    mean_delta DOUBLE NOT NULL,
    was_accepted BOOLEAN NOT NULL,
    acceptance_reason TEXT NOT NULL,
    validation_errors TEXT NOT NULL,
    llm_latency_seconds DOUBLE NOT NULL,
    tokens_used UINTEGER NOT NULL,
    created_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS llm_interactions (
    game_session_id TEXT NOT NULL,
    iteration_number UBIGINT NOT NULL,
    agent_id TEXT NOT NULL,
    system_prompt TEXT,
    user_prompt TEXT NOT NULL,
    raw_response TEXT NOT NULL,
    parsed_policy_json TEXT,
    parsing_error TEXT,
    prompt_tokens UINTEGER,
    completion_tokens UINTEGER,
    latency_seconds DOUBLE NOT NULL,
    created_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS policy_diffs (
    game_session_id TEXT NOT NULL,
    iteration_number UBIGINT NOT NULL,
    agent_id TEXT NOT NULL,
    diff_text TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
    game_session_id TEXT NOT NULL,
    iteration_number UBIGINT,
    event_type TEXT NOT NULL,
    detail_json TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL
);
";

pub struct GameSessionRepository {
    conn: Connection,
}

impl GameSessionRepository {
    pub fn open(path: &Path) -> CoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// In-memory repository, for tests and `validate`/dry-run flows that
    /// should never touch disk.
    pub fn open_in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    fn with_retry<F>(&self, operation: &str, mut write: F) -> CoreResult<()>
    where
        F: FnMut(&Connection) -> duckdb::Result<()>,
    {
        let mut last_error = None;
        for delay_ms in RETRY_DELAYS_MS.iter().copied().chain(std::iter::once(0)) {
            match write(&self.conn) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    last_error = Some(err);
                    if delay_ms > 0 {
                        sleep(Duration::from_millis(delay_ms));
                    }
                }
            }
        }
        Err(CoreError::Persistence(format!(
            "{operation} failed after {} attempts: {}",
            RETRY_DELAYS_MS.len() + 1,
            last_error.expect("loop always sets last_error before exiting")
        )))
    }

    pub fn create_session(&self, session: &GameSession) -> CoreResult<()> {
        self.with_retry("create_session", |conn| {
            conn.execute(
                "INSERT INTO game_sessions (
                    game_session_id, game_id, mode, master_seed, scenario_config_hash,
                    full_config_json, status, total_iterations, accepted_count,
                    rejected_count, started_at, finished_at, final_convergence_reason
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    session.game_session_id.to_string(),
                    session.game_id,
                    mode_str(session.mode),
                    session.master_seed,
                    session.scenario_config_hash,
                    session.full_config_json,
                    status_str(session.status),
                    session.total_iterations as u64,
                    session.accepted_count as u64,
                    session.rejected_count as u64,
                    session.started_at.to_rfc3339(),
                    session.finished_at.map(|t| t.to_rfc3339()),
                    session.final_convergence_reason,
                ],
            )?;
            Ok(())
        })
    }

    pub fn update_session_status(
        &self,
        session_id: Uuid,
        status: SessionStatus,
        total_iterations: usize,
        accepted_count: usize,
        rejected_count: usize,
        final_convergence_reason: Option<&str>,
    ) -> CoreResult<()> {
        self.with_retry("update_session_status", |conn| {
            conn.execute(
                "UPDATE game_sessions SET
                    status = ?, total_iterations = ?, accepted_count = ?,
                    rejected_count = ?, finished_at = ?, final_convergence_reason = ?
                 WHERE game_session_id = ?",
                params![
                    status_str(status),
                    total_iterations as u64,
                    accepted_count as u64,
                    rejected_count as u64,
                    chrono::Utc::now().to_rfc3339(),
                    final_convergence_reason,
                    session_id.to_string(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn append_iteration(&self, record: &PolicyIterationRecord) -> CoreResult<()> {
        self.with_retry("append_iteration", |conn| {
            conn.execute(
                "INSERT INTO policy_iterations (
                    game_session_id, iteration_number, agent_id, old_policy_json,
                    old_policy_hash, new_policy_json, new_policy_hash, old_cost, new_cost,
                    sample_costs_old, sample_costs_new, mean_delta, was_accepted,
                    acceptance_reason, validation_errors, llm_latency_seconds,
                    tokens_used, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.game_session_id.to_string(),
                    record.iteration_number as u64,
                    record.agent_id,
                    record.old_policy_json,
                    record.old_policy_hash,
                    record.new_policy_json,
                    record.new_policy_hash,
                    record.old_cost,
                    record.new_cost,
                    serde_json::to_string(&record.sample_costs_old)
                        .expect("Vec<i64> always serializes"),
                    serde_json::to_string(&record.sample_costs_new)
                        .expect("Vec<i64> always serializes"),
                    record.mean_delta,
                    record.was_accepted,
                    record.acceptance_reason,
                    serde_json::to_string(&record.validation_errors)
                        .expect("Vec<String> always serializes"),
                    record.llm_latency_seconds,
                    record.tokens_used,
                    record.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn append_llm_interaction(&self, interaction: &LlmInteraction) -> CoreResult<()> {
        self.with_retry("append_llm_interaction", |conn| {
            conn.execute(
                "INSERT INTO llm_interactions (
                    game_session_id, iteration_number, agent_id, system_prompt,
                    user_prompt, raw_response, parsed_policy_json, parsing_error,
                    prompt_tokens, completion_tokens, latency_seconds, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    interaction.game_session_id.to_string(),
                    interaction.iteration_number as u64,
                    interaction.agent_id,
                    interaction.system_prompt,
                    interaction.user_prompt,
                    interaction.raw_response,
                    interaction.parsed_policy_json,
                    interaction.parsing_error,
                    interaction.prompt_tokens,
                    interaction.completion_tokens,
                    interaction.latency_seconds,
                    interaction.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn append_policy_diff(&self, diff: &PolicyDiff) -> CoreResult<()> {
        self.with_retry("append_policy_diff", |conn| {
            conn.execute(
                "INSERT INTO policy_diffs (game_session_id, iteration_number, agent_id, diff_text)
                 VALUES (?, ?, ?, ?)",
                params![
                    diff.game_session_id.to_string(),
                    diff.iteration_number as u64,
                    diff.agent_id,
                    diff.diff_text,
                ],
            )?;
            Ok(())
        })
    }

    pub fn append_event(&self, event: &GameEvent) -> CoreResult<()> {
        self.with_retry("append_event", |conn| {
            conn.execute(
                "INSERT INTO events (game_session_id, iteration_number, event_type, detail_json, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    event.game_session_id.to_string(),
                    event.iteration_number.map(|n| n as u64),
                    event.event_type,
                    serde_json::to_string(&event.detail_json).expect("Json always serializes"),
                    event.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// List every persisted session, most recently started first.
    pub fn list_sessions(&self) -> CoreResult<Vec<GameSession>> {
        let mut stmt = self.conn.prepare(
            "SELECT game_session_id, game_id, mode, master_seed, scenario_config_hash,
                    full_config_json, status, total_iterations, accepted_count,
                    rejected_count, started_at, finished_at, final_convergence_reason
             FROM game_sessions ORDER BY started_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_session)?;
        rows.collect::<duckdb::Result<Vec<_>>>()
            .map_err(CoreError::from)
    }

    pub fn get_session(&self, session_id: Uuid) -> CoreResult<Option<GameSession>> {
        let mut stmt = self.conn.prepare(
            "SELECT game_session_id, game_id, mode, master_seed, scenario_config_hash,
                    full_config_json, status, total_iterations, accepted_count,
                    rejected_count, started_at, finished_at, final_convergence_reason
             FROM game_sessions WHERE game_session_id = ?",
        )?;
        let mut rows = stmt.query_map(params![session_id.to_string()], row_to_session)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn list_iterations(&self, session_id: Uuid) -> CoreResult<Vec<PolicyIterationRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT game_session_id, iteration_number, agent_id, old_policy_json,
                    old_policy_hash, new_policy_json, new_policy_hash, old_cost, new_cost,
                    sample_costs_old, sample_costs_new, mean_delta, was_accepted,
                    acceptance_reason, validation_errors, llm_latency_seconds,
                    tokens_used, created_at
             FROM policy_iterations
             WHERE game_session_id = ?
             ORDER BY iteration_number ASC",
        )?;
        let rows = stmt.query_map(params![session_id.to_string()], row_to_iteration)?;
        rows.collect::<duckdb::Result<Vec<_>>>()
            .map_err(CoreError::from)
    }

    /// List every audit event for a session, in the order they were
    /// appended — the same ordering a live run's event stream observes.
    pub fn list_events(&self, session_id: Uuid) -> CoreResult<Vec<GameEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT game_session_id, iteration_number, event_type, detail_json, created_at
             FROM events
             WHERE game_session_id = ?
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![session_id.to_string()], row_to_event)?;
        rows.collect::<duckdb::Result<Vec<_>>>()
            .map_err(CoreError::from)
    }
}

fn mode_str(mode: GameMode) -> &'static str {
    match mode {
        GameMode::RlOptimization => "rl_optimization",
        GameMode::CampaignLearning => "campaign_learning",
    }
}

fn parse_mode(s: &str) -> GameMode {
    match s {
        "campaign_learning" => GameMode::CampaignLearning,
        _ => GameMode::RlOptimization,
    }
}

fn status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Running => "running",
        SessionStatus::Completed => "completed",
        SessionStatus::Converged => "converged",
        SessionStatus::Failed => "failed",
    }
}

fn parse_status(s: &str) -> SessionStatus {
    match s {
        "completed" => SessionStatus::Completed,
        "converged" => SessionStatus::Converged,
        "failed" => SessionStatus::Failed,
        _ => SessionStatus::Running,
    }
}

fn parse_rfc3339(s: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .expect("timestamps are always written via to_rfc3339")
        .with_timezone(&chrono::Utc)
}

fn row_to_session(row: &duckdb::Row) -> duckdb::Result<GameSession> {
    let id_str: String = row.get(0)?;
    let mode_str: String = row.get(2)?;
    let status_str: String = row.get(6)?;
    let started_at: String = row.get(10)?;
    let finished_at: Option<String> = row.get(11)?;

    Ok(GameSession {
        game_session_id: Uuid::parse_str(&id_str).expect("stored uuid is always valid"),
        game_id: row.get(1)?,
        mode: parse_mode(&mode_str),
        master_seed: row.get(3)?,
        scenario_config_hash: row.get(4)?,
        full_config_json: row.get(5)?,
        status: parse_status(&status_str),
        total_iterations: row.get::<_, u64>(7)? as usize,
        accepted_count: row.get::<_, u64>(8)? as usize,
        rejected_count: row.get::<_, u64>(9)? as usize,
        started_at: parse_rfc3339(&started_at),
        finished_at: finished_at.map(|s| parse_rfc3339(&s)),
        final_convergence_reason: row.get(12)?,
    })
}

fn row_to_iteration(row: &duckdb::Row) -> duckdb::Result<PolicyIterationRecord> {
    let id_str: String = row.get(0)?;
    let sample_costs_old: String = row.get(9)?;
    let sample_costs_new: String = row.get(10)?;
    let validation_errors: String = row.get(14)?;
    let created_at: String = row.get(17)?;

    Ok(PolicyIterationRecord {
        game_session_id: Uuid::parse_str(&id_str).expect("stored uuid is always valid"),
        iteration_number: row.get::<_, u64>(1)? as usize,
        agent_id: row.get(2)?,
        old_policy_json: row.get(3)?,
        old_policy_hash: row.get(4)?,
        new_policy_json: row.get(5)?,
        new_policy_hash: row.get(6)?,
        old_cost: row.get(7)?,
        new_cost: row.get(8)?,
        sample_costs_old: serde_json::from_str(&sample_costs_old)
            .expect("stored sample costs are always valid JSON"),
        sample_costs_new: serde_json::from_str(&sample_costs_new)
            .expect("stored sample costs are always valid JSON"),
        mean_delta: row.get(11)?,
        was_accepted: row.get(12)?,
        acceptance_reason: row.get(13)?,
        validation_errors: serde_json::from_str(&validation_errors)
            .expect("stored validation errors are always valid JSON"),
        llm_latency_seconds: row.get(15)?,
        tokens_used: row.get(16)?,
        created_at: parse_rfc3339(&created_at),
    })
}

fn row_to_event(row: &duckdb::Row) -> duckdb::Result<GameEvent> {
    let id_str: String = row.get(0)?;
    let iteration_number: Option<u64> = row.get(1)?;
    let detail_json: String = row.get(3)?;
    let created_at: String = row.get(4)?;

    Ok(GameEvent {
        game_session_id: Uuid::parse_str(&id_str).expect("stored uuid is always valid"),
        iteration_number: iteration_number.map(|n| n as usize),
        event_type: row.get(2)?,
        detail_json: serde_json::from_str(&detail_json).expect("stored detail is always valid JSON"),
        created_at: parse_rfc3339(&created_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameMode;

    #[test]
    fn create_and_fetch_session_round_trips() {
        let repo = GameSessionRepository::open_in_memory().unwrap();
        let session = GameSession::new(
            "game-1".to_string(),
            GameMode::RlOptimization,
            42,
            "scenario-hash".to_string(),
            "{}".to_string(),
        );
        repo.create_session(&session).unwrap();

        let fetched = repo.get_session(session.game_session_id).unwrap().unwrap();
        assert_eq!(fetched.game_id, "game-1");
        assert_eq!(fetched.status, SessionStatus::Running);
    }

    #[test]
    fn update_session_status_persists() {
        let repo = GameSessionRepository::open_in_memory().unwrap();
        let session = GameSession::new(
            "game-1".to_string(),
            GameMode::RlOptimization,
            42,
            "scenario-hash".to_string(),
            "{}".to_string(),
        );
        repo.create_session(&session).unwrap();
        repo.update_session_status(
            session.game_session_id,
            SessionStatus::Converged,
            10,
            7,
            3,
            Some("stable"),
        )
        .unwrap();

        let fetched = repo.get_session(session.game_session_id).unwrap().unwrap();
        assert_eq!(fetched.status, SessionStatus::Converged);
        assert_eq!(fetched.total_iterations, 10);
        assert_eq!(fetched.final_convergence_reason.as_deref(), Some("stable"));
    }

    #[test]
    fn append_and_list_iterations_preserves_order() {
        let repo = GameSessionRepository::open_in_memory().unwrap();
        let session = GameSession::new(
            "game-1".to_string(),
            GameMode::RlOptimization,
            42,
            "scenario-hash".to_string(),
            "{}".to_string(),
        );
        repo.create_session(&session).unwrap();

        for i in 0..3 {
            let record = PolicyIterationRecord {
                game_session_id: session.game_session_id,
                iteration_number: i,
                agent_id: "BANK_A".to_string(),
                old_policy_json: "{}".to_string(),
                old_policy_hash: "h0".to_string(),
                new_policy_json: None,
                new_policy_hash: None,
                old_cost: 1000,
                new_cost: None,
                sample_costs_old: vec![1000, 1000],
                sample_costs_new: vec![],
                mean_delta: 0.0,
                was_accepted: false,
                acceptance_reason: "no_candidate".to_string(),
                validation_errors: vec![],
                llm_latency_seconds: 0.1,
                tokens_used: 0,
                created_at: chrono::Utc::now(),
            };
            repo.append_iteration(&record).unwrap();
        }

        let iterations = repo.list_iterations(session.game_session_id).unwrap();
        assert_eq!(iterations.len(), 3);
        assert_eq!(iterations[0].iteration_number, 0);
        assert_eq!(iterations[2].iteration_number, 2);
    }

    #[test]
    fn list_sessions_returns_created_sessions() {
        let repo = GameSessionRepository::open_in_memory().unwrap();
        let session = GameSession::new(
            "game-1".to_string(),
            GameMode::RlOptimization,
            42,
            "scenario-hash".to_string(),
            "{}".to_string(),
        );
        repo.create_session(&session).unwrap();

        let sessions = repo.list_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].game_id, "game-1");
    }

    #[test]
    fn append_and_list_events_preserves_order() {
        let repo = GameSessionRepository::open_in_memory().unwrap();
        let session = GameSession::new(
            "game-1".to_string(),
            GameMode::RlOptimization,
            42,
            "scenario-hash".to_string(),
            "{}".to_string(),
        );
        repo.create_session(&session).unwrap();

        for event_type in ["experiment_start", "iteration_start", "experiment_end"] {
            repo.append_event(&GameEvent {
                game_session_id: session.game_session_id,
                iteration_number: None,
                event_type: event_type.to_string(),
                detail_json: serde_json::json!({}),
                created_at: chrono::Utc::now(),
            })
            .unwrap();
        }

        let events = repo.list_events(session.game_session_id).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type, "experiment_start");
        assert_eq!(events[2].event_type, "experiment_end");
    }
}
