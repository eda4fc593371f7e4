//! Agent (Bank) model
//!
//! Represents a bank participating in the payment system.
//!
//! CRITICAL: All money values are i64 (cents)

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::state::SimulationState;

/// Errors that can occur during agent operations
#[derive(Debug, Error, PartialEq)]
pub enum AgentError {
    #[error("Insufficient liquidity: required {required}, available {available}")]
    InsufficientLiquidity { required: i64, available: i64 },
}

/// Represents a bank (agent) in the payment system
///
/// # Example
/// ```
/// use cashsim_engine::Agent;
///
/// let mut agent = Agent::new("BANK_A".to_string(), 1000000, 500000);
/// assert_eq!(agent.balance(), 1000000); // $10,000.00 in cents
///
/// agent.debit(300000).unwrap(); // Pay $3,000
/// assert_eq!(agent.balance(), 700000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent identifier (e.g., "BANK_A")
    id: String,

    /// Current balance in settlement account (i64 cents)
    /// Positive = funds available
    /// Negative = using intraday credit
    balance: i64,

    /// Maximum unsecured intraday credit/overdraft allowed (i64 cents)
    credit_limit: i64,

    /// Queue 1 (internal outgoing queue): transaction IDs awaiting submission
    outgoing_queue: Vec<String>,

    /// Transaction IDs expected to arrive as incoming payments
    incoming_expected: Vec<String>,

    /// Tick at which the cash manager last rendered a decision for this agent
    last_decision_tick: Option<usize>,

    /// Target minimum balance the agent's policy tries to preserve
    liquidity_buffer: i64,

    /// Collateral currently posted against the collateral-backed overdraft facility
    posted_collateral: i64,

    /// Haircut applied to posted collateral when computing usable capacity (0.0-1.0)
    collateral_haircut: f64,

    /// Tick at which collateral was last posted
    collateral_posted_at_tick: Option<usize>,

    /// Maximum collateral this agent is permitted to post
    max_collateral_capacity: i64,

    /// Scalar state the cash-management bank tree writes at the bank level
    /// and reads back on later ticks (e.g. a discretionary release budget)
    bank_state: std::collections::HashMap<String, f64>,
}

impl Agent {
    /// Create a new agent with no collateral facility and zero liquidity buffer
    ///
    /// # Example
    /// ```
    /// use cashsim_engine::Agent;
    ///
    /// let agent = Agent::new("BANK_A".to_string(), 1000000, 500000);
    /// assert_eq!(agent.balance(), 1000000);
    /// ```
    pub fn new(id: String, balance: i64, credit_limit: i64) -> Self {
        assert!(credit_limit >= 0, "credit_limit must be non-negative");
        Self {
            id,
            balance,
            credit_limit,
            outgoing_queue: Vec::new(),
            incoming_expected: Vec::new(),
            last_decision_tick: None,
            liquidity_buffer: 0,
            posted_collateral: 0,
            collateral_haircut: 0.0,
            collateral_posted_at_tick: None,
            max_collateral_capacity: 0,
            bank_state: std::collections::HashMap::new(),
        }
    }

    /// Create a new agent with an explicit liquidity buffer target
    pub fn with_buffer(id: String, balance: i64, credit_limit: i64, liquidity_buffer: i64) -> Self {
        let mut agent = Self::new(id, balance, credit_limit);
        agent.liquidity_buffer = liquidity_buffer;
        agent
    }

    /// Reconstruct an agent from a persisted checkpoint snapshot
    #[allow(clippy::too_many_arguments)]
    pub fn from_snapshot(
        id: String,
        balance: i64,
        credit_limit: i64,
        outgoing_queue: Vec<String>,
        incoming_expected: Vec<String>,
        last_decision_tick: Option<usize>,
        liquidity_buffer: i64,
        posted_collateral: i64,
        collateral_haircut: f64,
        collateral_posted_at_tick: Option<usize>,
    ) -> Self {
        Self {
            id,
            balance,
            credit_limit,
            outgoing_queue,
            incoming_expected,
            last_decision_tick,
            liquidity_buffer,
            posted_collateral,
            collateral_haircut,
            collateral_posted_at_tick,
            max_collateral_capacity: 0,
            bank_state: std::collections::HashMap::new(),
        }
    }

    /// Get agent ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get current balance (i64 cents)
    pub fn balance(&self) -> i64 {
        self.balance
    }

    /// Get unsecured credit limit (i64 cents)
    pub fn credit_limit(&self) -> i64 {
        self.credit_limit
    }

    /// Replace the unsecured credit limit
    pub fn set_unsecured_cap(&mut self, new_limit: i64) {
        assert!(new_limit >= 0, "credit_limit must be non-negative");
        self.credit_limit = new_limit;
    }

    /// Total overdraft this agent is allowed to draw: unsecured credit plus
    /// collateral-backed capacity net of haircut.
    pub fn allowed_overdraft_limit(&self) -> i64 {
        let collateral_backed = (self.posted_collateral as f64) * (1.0 - self.collateral_haircut);
        self.credit_limit + collateral_backed.max(0.0) as i64
    }

    /// Calculate available liquidity (balance + unused overdraft capacity)
    ///
    /// # Example
    /// ```
    /// use cashsim_engine::Agent;
    ///
    /// let agent = Agent::new("BANK_A".to_string(), 1000000, 500000);
    /// assert_eq!(agent.available_liquidity(), 1500000);
    /// ```
    pub fn available_liquidity(&self) -> i64 {
        let limit = self.allowed_overdraft_limit();
        if self.balance >= 0 {
            self.balance + limit
        } else {
            limit - self.balance.abs()
        }
    }

    /// Check if agent can pay a given amount
    pub fn can_pay(&self, amount: i64) -> bool {
        amount <= self.available_liquidity()
    }

    /// Debit (decrease) balance
    pub fn debit(&mut self, amount: i64) -> Result<(), AgentError> {
        assert!(amount >= 0, "amount must be positive");

        if !self.can_pay(amount) {
            return Err(AgentError::InsufficientLiquidity {
                required: amount,
                available: self.available_liquidity(),
            });
        }

        self.balance -= amount;
        Ok(())
    }

    /// Credit (increase) balance
    pub fn credit(&mut self, amount: i64) {
        assert!(amount >= 0, "amount must be positive");
        self.balance += amount;
    }

    /// Check if agent is currently using intraday credit
    pub fn is_using_credit(&self) -> bool {
        self.balance < 0
    }

    /// Get amount of credit currently being used
    pub fn credit_used(&self) -> i64 {
        if self.balance < 0 {
            self.balance.abs()
        } else {
            0
        }
    }

    /// Minimum balance this agent's policy tries to preserve
    pub fn liquidity_buffer(&self) -> i64 {
        self.liquidity_buffer
    }

    /// Queue 1 (internal outgoing queue) transaction IDs
    pub fn outgoing_queue(&self) -> &[String] {
        &self.outgoing_queue
    }

    /// Number of transactions currently held in Queue 1
    pub fn outgoing_queue_size(&self) -> usize {
        self.outgoing_queue.len()
    }

    /// Append a transaction ID to Queue 1
    pub fn queue_outgoing(&mut self, tx_id: String) {
        if !self.outgoing_queue.contains(&tx_id) {
            self.outgoing_queue.push(tx_id);
        }
    }

    /// Remove a transaction ID from Queue 1 (e.g. after submission to RTGS)
    pub fn remove_from_queue(&mut self, tx_id: &str) {
        self.outgoing_queue.retain(|id| id != tx_id);
    }

    /// Transaction IDs expected to arrive as incoming payments
    pub fn incoming_expected(&self) -> &[String] {
        &self.incoming_expected
    }

    /// Register an expected inflow
    pub fn add_expected_inflow(&mut self, tx_id: String) {
        if !self.incoming_expected.contains(&tx_id) {
            self.incoming_expected.push(tx_id);
        }
    }

    /// Tick at which the cash manager last rendered a decision, if any
    pub fn last_decision_tick(&self) -> Option<usize> {
        self.last_decision_tick
    }

    /// Record the tick at which a decision was rendered
    pub fn record_decision_tick(&mut self, tick: usize) {
        self.last_decision_tick = Some(tick);
    }

    /// Liquidity pressure: how close the agent is to exhausting available
    /// liquidity, expressed as a ratio in \[0.0, 1.0\] (1.0 = fully used).
    pub fn liquidity_pressure(&self) -> f64 {
        let limit = self.allowed_overdraft_limit();
        if limit <= 0 {
            return if self.balance < 0 { 1.0 } else { 0.0 };
        }
        let used = (limit - self.available_liquidity()).max(0);
        (used as f64 / limit as f64).min(1.0)
    }

    /// Collateral currently posted against the collateral-backed facility
    pub fn posted_collateral(&self) -> i64 {
        self.posted_collateral
    }

    /// Post (or withdraw) collateral
    pub fn set_posted_collateral(&mut self, amount: i64) {
        assert!(amount >= 0, "posted_collateral must be non-negative");
        self.posted_collateral = amount;
    }

    /// Haircut applied to posted collateral (0.0-1.0)
    pub fn collateral_haircut(&self) -> f64 {
        self.collateral_haircut
    }

    /// Set the haircut applied to posted collateral
    pub fn set_collateral_haircut(&mut self, haircut: f64) {
        assert!((0.0..=1.0).contains(&haircut), "haircut must be in [0.0, 1.0]");
        self.collateral_haircut = haircut;
    }

    /// Tick at which collateral was last posted, if ever
    pub fn collateral_posted_at_tick(&self) -> Option<usize> {
        self.collateral_posted_at_tick
    }

    /// Maximum collateral this agent is permitted to post
    pub fn max_collateral_capacity(&self) -> i64 {
        self.max_collateral_capacity
    }

    /// Configure the maximum collateral capacity
    pub fn set_max_collateral_capacity(&mut self, capacity: i64) {
        assert!(capacity >= 0, "max_collateral_capacity must be non-negative");
        self.max_collateral_capacity = capacity;
    }

    /// Remaining headroom under the collateral capacity
    pub fn remaining_collateral_capacity(&self) -> i64 {
        (self.max_collateral_capacity - self.posted_collateral).max(0)
    }

    /// Gap between what Queue 1 needs and what is currently available, for
    /// transactions still sitting in this agent's internal queue.
    pub fn queue1_liquidity_gap(&self, state: &SimulationState) -> i64 {
        let queue_value: i64 = self
            .outgoing_queue
            .iter()
            .filter_map(|tx_id| state.get_transaction(tx_id))
            .map(|tx| tx.remaining_amount())
            .sum();
        (queue_value - self.available_liquidity()).max(0)
    }

    /// Read a bank-tree state value (defaults to 0.0 if never written)
    pub fn bank_state_value(&self, key: &str) -> f64 {
        *self.bank_state.get(key).unwrap_or(&0.0)
    }

    /// Overwrite a bank-tree state value
    pub fn set_bank_state_value(&mut self, key: impl Into<String>, value: f64) {
        self.bank_state.insert(key.into(), value);
    }

    /// Accumulate into a bank-tree state value
    pub fn add_bank_state_value(&mut self, key: impl Into<String>, delta: f64) {
        let key = key.into();
        let entry = self.bank_state.entry(key).or_insert(0.0);
        *entry += delta;
    }

    /// All bank-tree state entries
    pub fn bank_state(&self) -> &std::collections::HashMap<String, f64> {
        &self.bank_state
    }
}
