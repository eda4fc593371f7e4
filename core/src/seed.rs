//! Deterministic sub-seed derivation.
//!
//! `SeedManager` is the only source of randomness in the optimization core:
//! every stochastic operation (Monte Carlo sampling, simulator RNG seeding,
//! LLM call ordering where relevant, tie-breaking) must derive its seed from
//! here rather than reaching for a process-global RNG.
//!
//! # Determinism
//!
//! For a fixed `master_seed` and a fixed hierarchical key, the derived seed
//! is identical across platforms and runs: the key is joined into a single
//! string with `:` separators, hashed with SHA-256, and the leading 8 bytes
//! are interpreted as a big-endian `u64` reduced modulo 2^31.

use sha2::{Digest, Sha256};

/// Derives reproducible sub-seeds from a master seed and a hierarchical key.
#[derive(Debug, Clone, Copy)]
pub struct SeedManager {
    master_seed: u64,
}

impl SeedManager {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    /// Derive a sub-seed from an arbitrary hierarchical key.
    ///
    /// # Example
    /// ```
    /// use cashsim_core::seed::SeedManager;
    ///
    /// let mgr = SeedManager::new(42);
    /// let a = mgr.derive(&["iteration", "3", "agent_a"]);
    /// let b = mgr.derive(&["iteration", "3", "agent_a"]);
    /// assert_eq!(a, b);
    /// ```
    pub fn derive(&self, key: &[&str]) -> u64 {
        let joined = format!("{}:{}", self.master_seed, key.join(":"));
        let digest = Sha256::digest(joined.as_bytes());
        let leading = u64::from_be_bytes(digest[0..8].try_into().expect("sha256 digest is 32 bytes"));
        leading % (1u64 << 31)
    }

    /// Seed for a single Monte Carlo episode.
    pub fn simulation(&self, iteration: usize, sample_idx: usize) -> u64 {
        self.derive(&[
            "simulation",
            &iteration.to_string(),
            &sample_idx.to_string(),
        ])
    }

    /// Seed for an agent's transaction sampler at a given iteration.
    pub fn sampling(&self, iteration: usize, agent_id: &str) -> u64 {
        self.derive(&["sampling", &iteration.to_string(), agent_id])
    }

    /// Seed reserved for LLM-facing stochastic choices (e.g. sampling
    /// temperature jitter in a mock/recording client).
    pub fn llm(&self, iteration: usize, agent_id: &str) -> u64 {
        self.derive(&["llm", &iteration.to_string(), agent_id])
    }

    /// Seed for tie-break decisions within an iteration.
    pub fn tiebreaker(&self, iteration: usize) -> u64 {
        self.derive(&["tiebreaker", &iteration.to_string()])
    }
}
