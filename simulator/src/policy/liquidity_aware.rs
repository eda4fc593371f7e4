//! Liquidity-Aware Policy
//!
//! Preserves liquidity buffer while prioritizing urgent transactions.
//!
//! # Behavior
//!
//! - Submits transactions only if sufficient liquidity buffer remains
//! - Submits urgent transactions regardless (deadline override)
//! - Holds transactions when liquidity is low
//! - Drops expired transactions
//!
//! # Parameters
//!
//! - `target_buffer`: Minimum balance to maintain (i64 cents)
//! - `urgency_threshold`: Ticks before deadline to override liquidity check (default: 5)
//!
//! # Decision Logic
//!
//! For each transaction:
//! 1. If past deadline → **Drop**
//! 2. If urgent (deadline within threshold) → **Submit** (override liquidity)
//! 3. If sending would violate buffer → **Hold** (await inflows)
//! 4. Otherwise → **Submit**
//!
//! # Use Case
//!
//! - Minimize credit usage (reduce overdraft costs)
//! - Balance liquidity preservation vs. deadline penalties
//! - Realistic strategic behavior (hold non-urgent when low liquidity)

use super::{CashManagerPolicy, HoldReason, ReleaseDecision};
use crate::orchestrator::CostRates;
use crate::{Agent, SimulationState};

/// Liquidity-aware policy: preserve liquidity buffer
///
/// # Example
///
/// ```
/// use cashsim_engine::policy::{LiquidityAwarePolicy, CashManagerPolicy};
/// use cashsim_engine::{Agent, SimulationState, Transaction, CostRates};
///
/// // Policy: keep at least 100k balance
/// let mut policy = LiquidityAwarePolicy::new(100_000);
///
/// // Agent with 200k balance
/// let agent = Agent::new("BANK_A".to_string(), 200_000, 0);
/// let mut state = SimulationState::new(vec![agent.clone()]);
///
/// // Transaction for 150k (would leave only 50k < 100k buffer)
/// let tx = Transaction::new("BANK_A".to_string(), "BANK_B".to_string(), 150_000, 0, 100);
/// let tx_id = tx.id().to_string();
/// state.add_transaction(tx);
/// state.get_agent_mut("BANK_A").unwrap().queue_outgoing(tx_id);
///
/// let agent = state.get_agent("BANK_A").unwrap();
/// let cost_rates = CostRates::default();
/// let decisions = policy.evaluate_queue(agent, &state, 5, &cost_rates);
///
/// // Should hold transaction (preserve buffer)
/// assert_eq!(decisions.len(), 1);
/// assert!(matches!(decisions[0], cashsim_engine::policy::ReleaseDecision::Hold { .. }));
/// ```
pub struct LiquidityAwarePolicy {
    /// Target minimum balance to maintain (cents)
    target_buffer: i64,

    /// Ticks before deadline to override liquidity check
    urgency_threshold: usize,
}

impl LiquidityAwarePolicy {
    /// Create new liquidity-aware policy
    ///
    /// # Arguments
    ///
    /// * `target_buffer` - Minimum balance to maintain in cents
    ///
    /// # Example
    ///
    /// ```
    /// use cashsim_engine::policy::LiquidityAwarePolicy;
    ///
    /// // Keep at least $1000 (100,000 cents) as buffer
    /// let policy = LiquidityAwarePolicy::new(100_000);
    /// ```
    pub fn new(target_buffer: i64) -> Self {
        Self {
            target_buffer,
            urgency_threshold: 5, // Default: urgent if deadline within 5 ticks
        }
    }

    /// Create policy with custom urgency threshold
    ///
    /// # Arguments
    ///
    /// * `target_buffer` - Minimum balance to maintain in cents
    /// * `urgency_threshold` - Ticks before deadline to override liquidity check
    pub fn with_urgency_threshold(target_buffer: i64, urgency_threshold: usize) -> Self {
        Self {
            target_buffer,
            urgency_threshold,
        }
    }
}

impl Default for LiquidityAwarePolicy {
    fn default() -> Self {
        Self::new(0) // Default: no buffer requirement
    }
}

impl CashManagerPolicy for LiquidityAwarePolicy {
    fn evaluate_queue(
        &mut self,
        agent: &Agent,
        state: &SimulationState,
        tick: usize,
        _cost_rates: &CostRates,
    ) -> Vec<ReleaseDecision> {
        // Note: cost_rates not used by LiquidityAwarePolicy (decision based on liquidity and urgency)
        let mut decisions = Vec::new();
        let current_balance = agent.balance();

        for tx_id in agent.outgoing_queue() {
            if let Some(tx) = state.get_transaction(tx_id) {
                let amount = tx.remaining_amount();
                let deadline = tx.deadline_tick();

                // Check if expired
                if deadline <= tick {
                    decisions.push(ReleaseDecision::Drop {
                        tx_id: tx_id.clone(),
                    });
                    continue;
                }

                let ticks_remaining = deadline - tick;
                let is_urgent = ticks_remaining <= self.urgency_threshold;

                // Calculate if sending would violate buffer
                // For zero buffer: just check if agent can physically pay (balance + credit)
                // For non-zero buffer: check if balance - amount >= buffer
                let can_send = if self.target_buffer == 0 {
                    agent.can_pay(amount)
                } else {
                    current_balance - amount >= self.target_buffer
                };

                if is_urgent {
                    // Urgent: submit regardless of liquidity (if physically possible)
                    if agent.can_pay(amount) {
                        decisions.push(ReleaseDecision::SubmitFull {
                            tx_id: tx_id.clone(),
                            priority_override: None,
                            target_tick: None,
                        });
                    } else {
                        // Can't pay even with all liquidity: hold (will likely expire)
                        decisions.push(ReleaseDecision::Hold {
                            tx_id: tx_id.clone(),
                            reason: HoldReason::InsufficientLiquidity,
                        });
                    }
                } else if can_send {
                    // Safe to send: either no buffer requirement or buffer will be maintained
                    decisions.push(ReleaseDecision::SubmitFull {
                        tx_id: tx_id.clone(),
                        priority_override: None,
                        target_tick: None,
                    });
                } else {
                    // Would violate buffer and not urgent: hold
                    decisions.push(ReleaseDecision::Hold {
                        tx_id: tx_id.clone(),
                        reason: HoldReason::InsufficientLiquidity,
                    });
                }
            }
        }

        decisions
    }
}
