use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::block::BlockCandidate;
use crate::constants::MAX_DIFFICULTY;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MiningStats {
    /// Hashes computed beyond the one made at construction.
    pub attempts: u64,
    pub elapsed: Duration,
}

pub fn leading_zero_hex(hash: &str) -> u32 {
    hash.bytes().take_while(|b| *b == b'0').count() as u32
}

/// True when the first `difficulty` characters of `hash` are all `'0'`.
pub fn meets_target(hash: &str, difficulty: u32) -> bool {
    leading_zero_hex(hash) >= difficulty
}

/// Increment the candidate's nonce until its hash has at least `difficulty`
/// leading zero hex characters.
///
/// Expected work is about `16^difficulty` hashes and there is no timeout:
/// the loop ends only when the target is met. A difficulty of zero returns
/// without hashing.
///
/// # Panics
///
/// If `difficulty` exceeds [`MAX_DIFFICULTY`], which no digest can satisfy.
pub fn mine(candidate: &mut BlockCandidate, difficulty: u32) -> MiningStats {
    assert!(
        difficulty <= MAX_DIFFICULTY,
        "difficulty {difficulty} exceeds the digest length"
    );
    let started = Instant::now();
    let mut attempts = 0u64;
    while !meets_target(candidate.hash(), difficulty) {
        candidate.bump_nonce();
        attempts += 1;
    }
    candidate.set_difficulty(difficulty);
    let elapsed = started.elapsed();

    if difficulty > 0 {
        info!(
            index = candidate.index(),
            nonce = candidate.nonce(),
            attempts,
            ?elapsed,
            "mined block {}",
            candidate.hash()
        );
    } else {
        debug!(index = candidate.index(), "difficulty 0, mining skipped");
    }
    MiningStats { attempts, elapsed }
}
