//! Transaction resampling for Monte Carlo policy evaluation.
//!
//! Each evaluation episode plays the recorded historical transaction set
//! back through a fresh, seeded `Orchestrator`. `TransactionSampler`
//! decides which historical transactions make it into a given episode and
//! what arrival tick they land on; the simulator itself remains unaware
//! that transactions are being resampled rather than freshly generated.

use cashsim_engine::RngManager;

use crate::config::{HistoricalTransaction, SampleMethod};

/// Resamples a historical transaction set using one of three methods.
///
/// - `Bootstrap`: draws `len(history)` transactions with replacement,
///   independently reassigning each one a fresh arrival tick within the
///   evaluation window. Captures volume and mix variance but destroys
///   inter-transaction timing correlation.
/// - `Permutation`: keeps every historical transaction exactly once but
///   shuffles the arrival order, preserving the original inter-arrival
///   gaps. Captures ordering sensitivity without volume variance.
/// - `Stratified`: partitions the pool into 4 amount quantiles and
///   bootstraps within each bucket independently, preserving the empirical
///   amount distribution.
///
/// Owns an append-only pool (`collect`) in addition to borrowing a fixed
/// slice at construction, so callers building up a scenario's history
/// incrementally and callers resampling a fixed scenario file both fit the
/// same type.
pub struct TransactionSampler<'a> {
    history: &'a [HistoricalTransaction],
    collected: Vec<HistoricalTransaction>,
}

impl<'a> TransactionSampler<'a> {
    pub fn new(history: &'a [HistoricalTransaction]) -> Self {
        Self {
            history,
            collected: Vec::new(),
        }
    }

    /// Add transactions to the pool.
    pub fn collect(&mut self, transactions: impl IntoIterator<Item = HistoricalTransaction>) {
        self.collected.extend(transactions);
    }

    fn pool(&self) -> Vec<&HistoricalTransaction> {
        self.history.iter().chain(self.collected.iter()).collect()
    }

    /// Produce `num_samples` resampled transaction lists, restricted to
    /// transactions relevant to `agent_id` (sender or receiver) and, if
    /// given, arriving no later than `max_tick`. Randomness is seeded by
    /// `sampling(iteration, agent_id)`-style callers; this method takes the
    /// already-derived seed directly.
    pub fn create_samples(
        &self,
        agent_id: &str,
        num_samples: usize,
        max_tick: Option<usize>,
        method: SampleMethod,
        evaluation_ticks: usize,
        seed: u64,
    ) -> Vec<Vec<HistoricalTransaction>> {
        let filtered: Vec<HistoricalTransaction> = self
            .pool()
            .into_iter()
            .filter(|tx| tx.sender_id == agent_id || tx.receiver_id == agent_id)
            .filter(|tx| max_tick.map(|max| tx.arrival_tick <= max).unwrap_or(true))
            .cloned()
            .collect();

        let sub_sampler = TransactionSampler::new(&filtered);
        (0..num_samples)
            .map(|i| sub_sampler.sample(method, evaluation_ticks, seed.wrapping_add(i as u64)))
            .collect()
    }

    /// Produce one resampled episode of transactions, with arrival ticks
    /// clamped into `[0, evaluation_ticks)` and deadlines shifted to
    /// preserve each transaction's original settlement window.
    pub fn sample(
        &self,
        method: SampleMethod,
        evaluation_ticks: usize,
        seed: u64,
    ) -> Vec<HistoricalTransaction> {
        let mut rng = RngManager::new(seed);
        match method {
            SampleMethod::Bootstrap => self.bootstrap(&mut rng, evaluation_ticks),
            SampleMethod::Permutation => self.permutation(&mut rng, evaluation_ticks),
            SampleMethod::Stratified => self.stratified(&mut rng, evaluation_ticks),
        }
    }

    fn bootstrap(&self, rng: &mut RngManager, evaluation_ticks: usize) -> Vec<HistoricalTransaction> {
        if self.history.is_empty() {
            return Vec::new();
        }
        (0..self.history.len())
            .map(|_| {
                let idx = rng.range(0, self.history.len() as i64) as usize;
                self.reseat(&self.history[idx], rng, evaluation_ticks)
            })
            .collect()
    }

    fn permutation(&self, rng: &mut RngManager, evaluation_ticks: usize) -> Vec<HistoricalTransaction> {
        let mut indices: Vec<usize> = (0..self.history.len()).collect();
        fisher_yates_shuffle(&mut indices, rng);

        let window = evaluation_ticks.max(1) as i64;
        indices
            .into_iter()
            .enumerate()
            .map(|(slot, idx)| {
                let tx = &self.history[idx];
                let span = (tx.deadline_tick.saturating_sub(tx.arrival_tick)).max(1) as i64;
                let arrival = ((slot as i64) * window / (self.history.len().max(1) as i64))
                    .clamp(0, window - 1);
                let deadline = (arrival + span).min(window);
                HistoricalTransaction {
                    arrival_tick: arrival as usize,
                    deadline_tick: deadline as usize,
                    ..tx.clone()
                }
            })
            .collect()
    }

    /// Partition the pool into 4 amount quantiles, bootstrap within each
    /// bucket, and concatenate — preserves the empirical amount
    /// distribution while still resampling with replacement per bucket.
    fn stratified(&self, rng: &mut RngManager, evaluation_ticks: usize) -> Vec<HistoricalTransaction> {
        if self.history.is_empty() {
            return Vec::new();
        }
        let mut by_amount: Vec<&HistoricalTransaction> = self.history.iter().collect();
        by_amount.sort_by_key(|tx| tx.amount);

        let bucket_count = 4usize.min(by_amount.len());
        let bucket_size = by_amount.len().div_ceil(bucket_count);
        let buckets: Vec<&[&HistoricalTransaction]> =
            by_amount.chunks(bucket_size.max(1)).collect();

        let mut out = Vec::with_capacity(self.history.len());
        for bucket in &buckets {
            for _ in 0..bucket.len() {
                let idx = rng.range(0, bucket.len() as i64) as usize;
                out.push(self.reseat(bucket[idx], rng, evaluation_ticks));
            }
        }
        out
    }

    fn reseat(
        &self,
        tx: &HistoricalTransaction,
        rng: &mut RngManager,
        evaluation_ticks: usize,
    ) -> HistoricalTransaction {
        let span = (tx.deadline_tick.saturating_sub(tx.arrival_tick)).max(1) as i64;
        let window = evaluation_ticks.max(1) as i64;
        let latest_arrival = (window - span - 1).max(0);
        let arrival = if latest_arrival > 0 {
            rng.range(0, latest_arrival + 1)
        } else {
            0
        };
        HistoricalTransaction {
            arrival_tick: arrival as usize,
            deadline_tick: (arrival + span) as usize,
            ..tx.clone()
        }
    }
}

fn fisher_yates_shuffle(indices: &mut [usize], rng: &mut RngManager) {
    for i in (1..indices.len()).rev() {
        let j = rng.range(0, (i + 1) as i64) as usize;
        indices.swap(i, j);
    }
}
