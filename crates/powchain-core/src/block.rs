use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::pow::{self, MiningStats};

/// Wall-clock seconds since the Unix epoch, with sub-second precision.
pub fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Canonical byte layout hashed for a block.
///
/// Fields are written in a fixed order, fixed-width integers little-endian and
/// variable-length strings prefixed with their byte length as a `u64`:
///
/// ```text
/// index (8) | timestamp bits (8) | len(data) (8) | data | len(previous_hash) (8) | previous_hash | nonce (8)
/// ```
pub fn hash_preimage(
    index: u64,
    timestamp: f64,
    data: &str,
    previous_hash: &str,
    nonce: u64,
) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(8 * 5 + data.len() + previous_hash.len());
    bytes.extend_from_slice(&index.to_le_bytes());
    bytes.extend_from_slice(&timestamp.to_bits().to_le_bytes());
    bytes.extend_from_slice(&(data.len() as u64).to_le_bytes());
    bytes.extend_from_slice(data.as_bytes());
    bytes.extend_from_slice(&(previous_hash.len() as u64).to_le_bytes());
    bytes.extend_from_slice(previous_hash.as_bytes());
    bytes.extend_from_slice(&nonce.to_le_bytes());
    bytes
}

/// SHA-256 of [`hash_preimage`], lowercase hex.
pub fn calculate_hash(
    index: u64,
    timestamp: f64,
    data: &str,
    previous_hash: &str,
    nonce: u64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(hash_preimage(index, timestamp, data, previous_hash, nonce));
    hex::encode(hasher.finalize())
}

/// A block under construction. Only the nonce (and with it the hash) changes
/// after creation; `freeze` turns it into a committed [`Block`].
#[derive(Clone, Debug)]
pub struct BlockCandidate {
    index: u64,
    timestamp: f64,
    data: String,
    previous_hash: String,
    nonce: u64,
    hash: String,
    difficulty: u32,
}

impl BlockCandidate {
    pub fn new(
        index: u64,
        timestamp: f64,
        data: impl Into<String>,
        previous_hash: impl Into<String>,
    ) -> Self {
        let data = data.into();
        let previous_hash = previous_hash.into();
        let hash = calculate_hash(index, timestamp, &data, &previous_hash, 0);
        Self {
            index,
            timestamp,
            data,
            previous_hash,
            nonce: 0,
            hash,
            difficulty: 0,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Search nonces until the hash has `difficulty` leading hex zeros.
    /// See [`pow::mine`] for the cost model.
    pub fn mine(&mut self, difficulty: u32) -> MiningStats {
        pow::mine(self, difficulty)
    }

    pub(crate) fn bump_nonce(&mut self) {
        self.nonce = self.nonce.wrapping_add(1);
        self.hash = calculate_hash(
            self.index,
            self.timestamp,
            &self.data,
            &self.previous_hash,
            self.nonce,
        );
    }

    pub(crate) fn set_difficulty(&mut self, difficulty: u32) {
        self.difficulty = difficulty;
    }

    pub fn freeze(self) -> Block {
        Block {
            index: self.index,
            timestamp: self.timestamp,
            data: self.data,
            previous_hash: self.previous_hash,
            nonce: self.nonce,
            hash: self.hash,
            difficulty: self.difficulty,
        }
    }
}

/// A committed, immutable ledger record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Block {
    index: u64,
    timestamp: f64,
    data: String,
    previous_hash: String,
    nonce: u64,
    hash: String,
    /// Target the block was mined at. Not part of the hash preimage.
    difficulty: u32,
}

impl Block {
    /// Adopt a block exactly as described by `view`, stored hash included.
    /// Nothing is checked here; run the chain validator over the result.
    pub fn from_view(view: BlockView) -> Self {
        Self {
            index: view.index,
            timestamp: view.timestamp,
            data: view.data,
            previous_hash: view.previous_hash,
            nonce: view.nonce,
            hash: view.hash,
            difficulty: view.difficulty,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn recompute_hash(&self) -> String {
        calculate_hash(
            self.index,
            self.timestamp,
            &self.data,
            &self.previous_hash,
            self.nonce,
        )
    }

    pub fn is_self_consistent(&self) -> bool {
        self.recompute_hash() == self.hash
    }

    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        pow::meets_target(&self.hash, difficulty)
    }

    pub fn view(&self) -> BlockView {
        BlockView {
            index: self.index,
            timestamp: self.timestamp,
            data: self.data.clone(),
            previous_hash: self.previous_hash.clone(),
            hash: self.hash.clone(),
            nonce: self.nonce,
            difficulty: self.difficulty,
        }
    }
}

/// Owned, detached copy of a block for rendering or export.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockView {
    pub index: u64,
    pub timestamp: f64,
    pub data: String,
    pub previous_hash: String,
    pub hash: String,
    pub nonce: u64,
    #[serde(default)]
    pub difficulty: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: f64 = 1_600_000_200.5;

    #[test]
    fn preimage_layout() {
        let bytes = hash_preimage(1, TS, "abc", "0", 42);
        assert_eq!(bytes.len(), 8 + 8 + 8 + 3 + 8 + 1 + 8);
        assert_eq!(&bytes[0..8], &1u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &TS.to_bits().to_le_bytes());
        assert_eq!(&bytes[16..24], &3u64.to_le_bytes());
        assert_eq!(&bytes[24..27], b"abc");
        assert_eq!(&bytes[27..35], &1u64.to_le_bytes());
        assert_eq!(&bytes[35..36], b"0");
        assert_eq!(&bytes[36..44], &42u64.to_le_bytes());
    }

    #[test]
    fn length_prefix_removes_field_ambiguity() {
        // Plain concatenation would render both of these as "ab" + "c".
        let a = calculate_hash(1, TS, "ab", "c", 0);
        let b = calculate_hash(1, TS, "a", "bc", 0);
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_deterministic_hex() {
        let h1 = calculate_hash(3, TS, "payload", "prev", 7);
        let h2 = calculate_hash(3, TS, "payload", "prev", 7);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), crate::constants::HASH_HEX_SIZE);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn every_field_feeds_the_hash() {
        let base = calculate_hash(3, TS, "payload", "prev", 7);
        assert_ne!(base, calculate_hash(4, TS, "payload", "prev", 7));
        assert_ne!(base, calculate_hash(3, TS + 0.001, "payload", "prev", 7));
        assert_ne!(base, calculate_hash(3, TS, "payloaD", "prev", 7));
        assert_ne!(base, calculate_hash(3, TS, "payload", "prev2", 7));
        assert_ne!(base, calculate_hash(3, TS, "payload", "prev", 8));
    }

    #[test]
    fn candidate_hashes_on_construction() {
        let candidate = BlockCandidate::new(1, TS, "data", "0");
        assert_eq!(candidate.nonce(), 0);
        assert_eq!(candidate.hash(), calculate_hash(1, TS, "data", "0", 0));
    }

    #[test]
    fn freeze_keeps_fields() {
        let mut candidate = BlockCandidate::new(5, TS, "data", "prev");
        candidate.mine(1);
        let nonce = candidate.nonce();
        let hash = candidate.hash().to_string();
        let block = candidate.freeze();
        assert_eq!(block.index(), 5);
        assert_eq!(block.timestamp(), TS);
        assert_eq!(block.data(), "data");
        assert_eq!(block.previous_hash(), "prev");
        assert_eq!(block.nonce(), nonce);
        assert_eq!(block.hash(), hash);
        assert_eq!(block.difficulty(), 1);
        assert!(block.is_self_consistent());
    }

    #[test]
    fn view_roundtrips_through_from_view() {
        let mut candidate = BlockCandidate::new(2, TS, "x", "y");
        candidate.mine(2);
        let block = candidate.freeze();
        assert_eq!(Block::from_view(block.view()), block);
    }

    #[test]
    fn tampered_view_is_not_self_consistent() {
        let block = BlockCandidate::new(2, TS, "x", "y").freeze();
        let mut view = block.view();
        view.data = "TAMPERED".into();
        let tampered = Block::from_view(view);
        assert_eq!(tampered.hash(), block.hash());
        assert!(!tampered.is_self_consistent());
    }

    #[test]
    fn view_serializes_to_json() {
        let block = BlockCandidate::new(0, 1.5, "Genesis Block", "0").freeze();
        let json = serde_json::to_value(block.view()).unwrap();
        assert_eq!(json["index"], 0);
        assert_eq!(json["timestamp"], 1.5);
        assert_eq!(json["previous_hash"], "0");
        assert_eq!(json["nonce"], 0);
        assert_eq!(json["hash"], block.hash());
    }
}
