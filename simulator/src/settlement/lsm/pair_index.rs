//! Incremental Bilateral Pair Index for LSM
//!
//! Phase 1 optimization: indexes the RTGS queue by counterparty pair so
//! `bilateral_offset` can pop ready pairs directly instead of rescanning
//! the whole queue for every candidate pair (O(N log N) vs O(N^2)).
//!
//! # Determinism
//!
//! Pairs are ordered `(min(agent_a, agent_b), max(agent_a, agent_b))` so
//! A→B and B→A transactions land in the same bucket regardless of queue
//! order. `pop_ready` always returns the pair with the highest liquidity
//! release first, tie-broken by agent ID pair, so the result does not
//! depend on queue iteration order.

use crate::models::state::SimulationState;
use std::collections::BTreeMap;

/// One direction of a queued pair: transaction ids in enqueue order, plus
/// their total remaining amount.
#[derive(Debug, Clone, Default)]
struct Direction {
    tx_ids: Vec<String>,
    total_amount: i64,
}

/// Identifies one unordered counterparty pair with both directions queued.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PairKey {
    agent_a: String,
    agent_b: String,
    liquidity_release: i64,
}

impl PairKey {
    pub fn agent_a(&self) -> &str {
        &self.agent_a
    }

    pub fn agent_b(&self) -> &str {
        &self.agent_b
    }

    pub fn liquidity_release(&self) -> i64 {
        self.liquidity_release
    }
}

/// Incremental index of queued transactions, bucketed by counterparty pair.
/// Once a pair is popped via `pop_ready`, its data moves into `popped` until
/// `get_transactions` retrieves it — this is a single-slot handoff, not a
/// general-purpose cache, matching the pop-then-fetch call pattern in
/// `bilateral_offset`.
#[derive(Debug, Clone, Default)]
pub struct PairIndex {
    /// (min_agent, max_agent) -> direction (agent, counterparty) -> queued txs
    buckets: BTreeMap<(String, String), BTreeMap<(String, String), Direction>>,
    popped: Option<((String, String), BTreeMap<(String, String), Direction>)>,
}

impl PairIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from the current RTGS queue. Only pairs where both
    /// directions have at least one queued transaction are retained.
    pub fn from_queue(state: &SimulationState) -> Self {
        let mut buckets: BTreeMap<(String, String), BTreeMap<(String, String), Direction>> =
            BTreeMap::new();

        for tx_id in state.rtgs_queue() {
            let Some(tx) = state.get_transaction(tx_id) else {
                continue;
            };
            let direction_key = (tx.sender_id().to_string(), tx.receiver_id().to_string());
            let pair_key = unordered_pair(&direction_key.0, &direction_key.1);
            let direction = buckets
                .entry(pair_key)
                .or_default()
                .entry(direction_key)
                .or_default();
            direction.tx_ids.push(tx_id.clone());
            direction.total_amount += tx.remaining_amount();
        }

        // Drop pairs where only one direction is populated; they cannot offset.
        buckets.retain(|_, directions| directions.len() == 2);

        Self {
            buckets,
            popped: None,
        }
    }

    /// Number of pairs with both directions currently queued (not yet popped).
    pub fn ready_count(&self) -> usize {
        self.buckets.len()
    }

    /// Total queued amount flowing `from` -> `to`. Valid both before and
    /// immediately after popping the owning pair.
    pub fn flow_sum(&self, from: &str, to: &str) -> i64 {
        let pair_key = unordered_pair(from, to);
        let direction_key = (from.to_string(), to.to_string());

        let directions = self
            .buckets
            .get(&pair_key)
            .or_else(|| match &self.popped {
                Some((popped_key, directions)) if *popped_key == pair_key => Some(directions),
                _ => None,
            });

        directions
            .and_then(|directions| directions.get(&direction_key))
            .map(|direction| direction.total_amount)
            .unwrap_or(0)
    }

    /// Pop the ready pair whose smaller directional sum (the net liquidity
    /// that bilateral offsetting would release) is largest, tie-broken by
    /// agent ID pair for determinism.
    pub fn pop_ready(&mut self) -> Option<PairKey> {
        let best = self
            .buckets
            .iter()
            .map(|(pair_key, directions)| {
                let release = directions
                    .values()
                    .map(|d| d.total_amount)
                    .min()
                    .unwrap_or(0);
                (pair_key.clone(), release)
            })
            .max_by(|(pair_a, release_a), (pair_b, release_b)| {
                release_a.cmp(release_b).then_with(|| pair_b.cmp(pair_a))
            })?;

        let (pair_key, liquidity_release) = best;
        let directions = self.buckets.remove(&pair_key)?;
        let agent_a = pair_key.0.clone();
        let agent_b = pair_key.1.clone();
        self.popped = Some((pair_key, directions));

        Some(PairKey {
            agent_a,
            agent_b,
            liquidity_release,
        })
    }

    /// Transaction ids queued `key.agent_a() -> key.agent_b()` and the
    /// reverse direction. Must be called exactly once per `pop_ready`
    /// result, immediately after popping it.
    pub fn get_transactions(&mut self, key: &PairKey) -> (Vec<String>, Vec<String>) {
        let pair_key = unordered_pair(&key.agent_a, &key.agent_b);
        let ab = (key.agent_a.clone(), key.agent_b.clone());
        let ba = (key.agent_b.clone(), key.agent_a.clone());

        let directions = match &self.popped {
            Some((popped_key, _)) if *popped_key == pair_key => self.popped.take().map(|(_, d)| d),
            _ => None,
        };

        match directions {
            Some(directions) => {
                let txs_ab = directions.get(&ab).map(|d| d.tx_ids.clone()).unwrap_or_default();
                let txs_ba = directions.get(&ba).map(|d| d.tx_ids.clone()).unwrap_or_default();
                (txs_ab, txs_ba)
            }
            None => (Vec::new(), Vec::new()),
        }
    }
}

fn unordered_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::agent::Agent;
    use crate::models::transaction::Transaction;

    fn state_with_bilateral_queue() -> SimulationState {
        let agents = vec![
            Agent::new("BANK_A".to_string(), 1_000_000, 500_000),
            Agent::new("BANK_B".to_string(), 1_000_000, 500_000),
        ];
        let mut state = SimulationState::new(agents);

        let tx_ab = Transaction::new("BANK_A".to_string(), "BANK_B".to_string(), 500_000, 0, 100);
        let tx_ba = Transaction::new("BANK_B".to_string(), "BANK_A".to_string(), 300_000, 0, 100);
        let id_ab = tx_ab.id().to_string();
        let id_ba = tx_ba.id().to_string();
        state.add_transaction(tx_ab);
        state.add_transaction(tx_ba);
        state.rtgs_queue_mut().push(id_ab);
        state.rtgs_queue_mut().push(id_ba);
        state
    }

    #[test]
    fn finds_bilateral_pair() {
        let state = state_with_bilateral_queue();
        let index = PairIndex::from_queue(&state);
        assert_eq!(index.ready_count(), 1);
    }

    #[test]
    fn one_sided_pair_not_ready() {
        let agents = vec![
            Agent::new("BANK_A".to_string(), 1_000_000, 500_000),
            Agent::new("BANK_B".to_string(), 1_000_000, 500_000),
        ];
        let mut state = SimulationState::new(agents);
        let tx = Transaction::new("BANK_A".to_string(), "BANK_B".to_string(), 500_000, 0, 100);
        let id = tx.id().to_string();
        state.add_transaction(tx);
        state.rtgs_queue_mut().push(id);

        let index = PairIndex::from_queue(&state);
        assert_eq!(index.ready_count(), 0);
    }

    #[test]
    fn pop_ready_then_get_transactions_round_trips() {
        let state = state_with_bilateral_queue();
        let mut index = PairIndex::from_queue(&state);
        let key = index.pop_ready().expect("one ready pair");
        assert_eq!(key.liquidity_release(), 300_000);

        let sum_ab = index.flow_sum(key.agent_a(), key.agent_b());
        let sum_ba = index.flow_sum(key.agent_b(), key.agent_a());
        assert_eq!(sum_ab.min(sum_ba), 300_000);

        let (txs_ab, txs_ba) = index.get_transactions(&key);
        assert_eq!(txs_ab.len(), 1);
        assert_eq!(txs_ba.len(), 1);
        assert!(index.pop_ready().is_none());
    }
}
