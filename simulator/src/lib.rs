//! Cashsim Engine - Rust Settlement Simulator
//!
//! High-performance payment settlement simulator with deterministic execution.
//! Consumed as a library by the optimization core; also usable standalone for
//! fixed-policy scenario runs.
//!
//! # Architecture
//!
//! - **core**: Time management and initialization
//! - **models**: Domain types (Agent, Transaction, State)
//! - **orchestrator**: Main simulation loop
//! - **settlement**: Settlement engines (RTGS, LSM)
//! - **rng**: Deterministic random number generation
//! - **policy**: Cash management policies, including the JSON decision-tree DSL
//! - **arrivals**: Native stochastic transaction arrival generation
//! - **events**: Scenario event scheduling
//!
//! # Critical Invariants
//!
//! 1. All money values are i64 (cents)
//! 2. All randomness is deterministic (seeded RNG)

// Module declarations
pub mod arrivals;
pub mod core;
pub mod events;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod rng;
pub mod settlement;

// Re-exports for convenience
pub use core::time::TimeManager;
pub use models::{
    agent::{Agent, AgentError},
    state::SimulationState,
    transaction::{Transaction, TransactionError, TransactionStatus},
};
pub use orchestrator::{AgentConfig, CostRates, Orchestrator, OrchestratorConfig, PolicyConfig};
pub use policy::{CashManagerPolicy, ReleaseDecision};
pub use rng::RngManager;
pub use settlement::{try_settle, try_settle_partial, SettlementError};
