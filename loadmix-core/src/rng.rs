//! Deterministic seed hierarchy.
//!
//! A master seed expands into one sub-seed per `(process, thread, run)` tuple.
//! Sub-seeds are derived by BLAKE3 hashing rather than by drawing from a shared
//! generator, so each worker thread's traffic mix is identical no matter how
//! the threads are scheduled or how many of them there are.

use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone)]
pub struct SeedHierarchy {
    master_seed: u64,
}

impl SeedHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Derive the sub-seed for one run of one worker thread.
    pub fn sub_seed(&self, process_id: &str, thread_id: u32, run: u64) -> u64 {
        self.derive(process_id, thread_id, &run.to_le_bytes())
    }

    /// Derive the seed for a worker's start-up jitter. Distinct from every
    /// run seed of the same thread.
    pub fn startup_seed(&self, process_id: &str, thread_id: u32) -> u64 {
        self.derive(process_id, thread_id, b"startup")
    }

    fn derive(&self, process_id: &str, thread_id: u32, tail: &[u8]) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(process_id.as_bytes());
        // Length separator keeps ("ab", 1) and ("a", ...) from colliding.
        hasher.update(&(process_id.len() as u64).to_le_bytes());
        hasher.update(&thread_id.to_le_bytes());
        hasher.update(tail);
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Seeded `StdRng` for one run of one worker thread.
    pub fn rng_for(&self, process_id: &str, thread_id: u32, run: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(process_id, thread_id, run))
    }

    pub fn startup_rng(&self, process_id: &str, thread_id: u32) -> StdRng {
        StdRng::seed_from_u64(self.startup_seed(process_id, thread_id))
    }
}
