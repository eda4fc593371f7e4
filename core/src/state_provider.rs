//! Read-side view of a game session, for progress reporting and replay.
//!
//! `StateProvider` is the one interface both a running orchestrator and the
//! `info`/`list` CLI subcommands render through — `LiveStateProvider` reads
//! an in-memory snapshot kept alongside a running `GameOrchestrator`,
//! `DatabaseStateProvider` reads the same shape back from a
//! `GameSessionRepository`. Rendering code that only goes through this
//! trait produces identical text from either implementation, modulo
//! `finished_at`/`created_at` timestamps that genuinely differ between an
//! in-flight run and an already-persisted one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::error::CoreResult;
use crate::persistence::GameSessionRepository;
use crate::records::{GameSession, PolicyIterationRecord};

/// One agent's snapshot at the most recently completed iteration.
#[derive(Debug, Clone)]
pub struct AgentSnapshot {
    pub agent_id: String,
    pub mean_cost: i64,
    pub was_accepted: bool,
    pub policy_id: String,
}

pub trait StateProvider: Send + Sync {
    fn session(&self) -> CoreResult<GameSession>;
    fn iterations(&self) -> CoreResult<Vec<PolicyIterationRecord>>;

    /// Latest per-agent snapshot, keyed by agent id, derived from the most
    /// recent `PolicyIterationRecord` seen for each agent.
    fn latest_agent_snapshots(&self) -> CoreResult<HashMap<String, AgentSnapshot>> {
        let mut snapshots: HashMap<String, AgentSnapshot> = HashMap::new();
        for record in self.iterations()? {
            let policy_id = record
                .new_policy_json
                .as_deref()
                .and_then(|json| serde_json::from_str::<serde_json::Value>(json).ok())
                .and_then(|v| v.get("policy_id").and_then(|p| p.as_str()).map(str::to_string))
                .unwrap_or_default();
            snapshots.insert(
                record.agent_id.clone(),
                AgentSnapshot {
                    agent_id: record.agent_id,
                    mean_cost: record.new_cost.unwrap_or(record.old_cost),
                    was_accepted: record.was_accepted,
                    policy_id,
                },
            );
        }
        Ok(snapshots)
    }
}

/// In-memory view fed directly from a running `GameOrchestrator`'s own
/// session/iteration state, without a database round trip.
pub struct LiveStateProvider {
    session: Arc<Mutex<GameSession>>,
    iterations: Arc<Mutex<Vec<PolicyIterationRecord>>>,
}

impl LiveStateProvider {
    pub fn new(session: GameSession) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            iterations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn update_session(&self, session: GameSession) {
        *self.session.lock().expect("session mutex poisoned") = session;
    }

    pub fn push_iteration(&self, record: PolicyIterationRecord) {
        self.iterations
            .lock()
            .expect("iterations mutex poisoned")
            .push(record);
    }
}

impl StateProvider for LiveStateProvider {
    fn session(&self) -> CoreResult<GameSession> {
        Ok(self.session.lock().expect("session mutex poisoned").clone())
    }

    fn iterations(&self) -> CoreResult<Vec<PolicyIterationRecord>> {
        Ok(self.iterations.lock().expect("iterations mutex poisoned").clone())
    }
}

/// Replay view backed by a `GameSessionRepository`.
pub struct DatabaseStateProvider<'a> {
    repository: &'a GameSessionRepository,
    session_id: Uuid,
}

impl<'a> DatabaseStateProvider<'a> {
    pub fn new(repository: &'a GameSessionRepository, session_id: Uuid) -> Self {
        Self { repository, session_id }
    }
}

impl<'a> StateProvider for DatabaseStateProvider<'a> {
    fn session(&self) -> CoreResult<GameSession> {
        self.repository.get_session(self.session_id)?.ok_or_else(|| {
            crate::error::CoreError::Configuration(format!(
                "no session found for id '{}'",
                self.session_id
            ))
        })
    }

    fn iterations(&self) -> CoreResult<Vec<PolicyIterationRecord>> {
        self.repository.list_iterations(self.session_id)
    }
}
