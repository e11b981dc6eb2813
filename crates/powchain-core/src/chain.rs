use tracing::debug;

use crate::block::{now_timestamp, Block, BlockCandidate, BlockView};
use crate::config::ChainConfig;
use crate::constants::GENESIS_PREVIOUS_HASH;
use crate::error::ChainError;

/// Ordered, append-only sequence of blocks plus the current mining difficulty.
///
/// Always holds at least the genesis block. Blocks only enter through
/// [`Chain::append`] (or, unchecked, through [`Chain::from_blocks`]).
#[derive(Clone, Debug)]
pub struct Chain {
    blocks: Vec<Block>,
    difficulty: u32,
    config: ChainConfig,
}

#[allow(clippy::len_without_is_empty)]
impl Chain {
    pub fn new(difficulty: u32) -> Result<Self, ChainError> {
        Self::with_config(ChainConfig::with_difficulty(difficulty))
    }

    /// Create the chain and mine its genesis block at `config.difficulty`.
    pub fn with_config(config: ChainConfig) -> Result<Self, ChainError> {
        config.validate()?;
        let genesis = genesis_block(&config.genesis_data, config.difficulty);
        debug!(hash = genesis.hash(), "genesis block created");
        Ok(Self {
            blocks: vec![genesis],
            difficulty: config.difficulty,
            config,
        })
    }

    /// Adopt an existing sequence as-is, e.g. one received from a host that
    /// needs it checked. Use [`Chain::validate`] before trusting it.
    ///
    /// Only the tail index is checked, since [`Chain::append`] derives the
    /// next index from it.
    pub fn from_blocks(blocks: Vec<Block>, config: ChainConfig) -> Result<Self, ChainError> {
        config.validate()?;
        match blocks.last() {
            None => return Err(ChainError::Empty),
            Some(tail) if tail.index() == u64::MAX => {
                return Err(ChainError::IndexExhausted(tail.index()))
            }
            Some(_) => {}
        }
        Ok(Self {
            blocks,
            difficulty: config.difficulty,
            config,
        })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Change the target for future appends. Committed blocks keep the
    /// difficulty they were mined at.
    pub fn set_difficulty(&mut self, difficulty: u32) -> Result<(), ChainError> {
        self.config.check_difficulty(difficulty)?;
        debug!(from = self.difficulty, to = difficulty, "difficulty changed");
        self.difficulty = difficulty;
        Ok(())
    }

    pub fn latest(&self) -> &Block {
        self.blocks
            .last()
            .expect("chain always holds its genesis block")
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    /// Mine a block carrying `data` on top of the tail and push it.
    /// Returns the new block's index and hash.
    ///
    /// Blocks until the proof-of-work is found; see [`crate::pow::mine`].
    pub fn append(&mut self, data: impl Into<String>) -> (u64, String) {
        let mut candidate = self.next_candidate(data);
        candidate.mine(self.difficulty);
        self.commit(candidate.freeze())
    }

    /// Candidate linked to the current tail. Timestamps never go backwards,
    /// even if the wall clock does.
    pub(crate) fn next_candidate(&self, data: impl Into<String>) -> BlockCandidate {
        let tail = self.latest();
        let timestamp = now_timestamp().max(tail.timestamp());
        BlockCandidate::new(tail.index() + 1, timestamp, data, tail.hash())
    }

    pub(crate) fn commit(&mut self, block: Block) -> (u64, String) {
        debug_assert_eq!(block.previous_hash(), self.latest().hash());
        let out = (block.index(), block.hash().to_string());
        debug!(index = out.0, hash = %out.1, "block appended");
        self.blocks.push(block);
        out
    }

    pub fn snapshot(&self) -> Vec<BlockView> {
        self.blocks.iter().map(Block::view).collect()
    }
}

/// Index 0, sentinel previous hash, mined at `difficulty`.
pub fn genesis_block(data: &str, difficulty: u32) -> Block {
    let mut candidate = BlockCandidate::new(0, now_timestamp(), data, GENESIS_PREVIOUS_HASH);
    candidate.mine(difficulty);
    candidate.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_block_example() {
        let genesis = genesis_block("Genesis Block", 1);
        assert_eq!(genesis.index(), 0);
        assert_eq!(genesis.previous_hash(), "0");
        assert_eq!(genesis.data(), "Genesis Block");
        assert!(genesis.hash().starts_with('0'));
        assert!(genesis.is_self_consistent());
    }

    #[test]
    fn new_chain_holds_only_genesis() {
        let chain = Chain::new(0).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.latest().index(), 0);
        assert_eq!(chain.latest().nonce(), 0);
        assert_eq!(chain.difficulty(), 0);
    }

    #[test]
    fn custom_genesis_label() {
        let config = ChainConfig {
            genesis_data: "hello".into(),
            difficulty: 1,
            ..ChainConfig::default()
        };
        let chain = Chain::with_config(config).unwrap();
        assert_eq!(chain.latest().data(), "hello");
        assert!(chain.latest().meets_difficulty(1));
    }

    #[test]
    fn append_links_to_tail() {
        let mut chain = Chain::new(1).unwrap();
        let tail_hash = chain.latest().hash().to_string();
        let (index, hash) = chain.append("A");
        assert_eq!(index, 1);
        assert_eq!(chain.len(), 2);
        let block = chain.latest();
        assert_eq!(block.hash(), hash);
        assert_eq!(block.previous_hash(), tail_hash);
        assert_eq!(block.data(), "A");
        assert!(block.meets_difficulty(1));
    }

    #[test]
    fn timestamps_never_decrease() {
        let mut chain = Chain::new(0).unwrap();
        for i in 0..20 {
            chain.append(format!("block {i}"));
        }
        for pair in chain.blocks().windows(2) {
            assert!(pair[1].timestamp() >= pair[0].timestamp());
        }
    }

    #[test]
    fn difficulty_change_applies_to_future_blocks() {
        let mut chain = Chain::new(0).unwrap();
        chain.append("easy");
        chain.set_difficulty(2).unwrap();
        chain.append("hard");
        assert_eq!(chain.get(1).unwrap().difficulty(), 0);
        assert_eq!(chain.get(2).unwrap().difficulty(), 2);
        assert!(chain.get(2).unwrap().hash().starts_with("00"));
    }

    #[test]
    fn set_difficulty_respects_max() {
        let config = ChainConfig {
            difficulty: 1,
            max_difficulty: 3,
            ..ChainConfig::default()
        };
        let mut chain = Chain::with_config(config).unwrap();
        let err = chain.set_difficulty(4).unwrap_err();
        assert!(matches!(
            err,
            ChainError::DifficultyOutOfRange { requested: 4, max: 3 }
        ));
        assert_eq!(chain.difficulty(), 1);
    }

    #[test]
    fn new_rejects_unsatisfiable_difficulty() {
        assert!(matches!(
            Chain::new(65),
            Err(ChainError::DifficultyOutOfRange { requested: 65, .. })
        ));
    }

    #[test]
    fn from_blocks_rejects_empty() {
        assert!(matches!(
            Chain::from_blocks(Vec::new(), ChainConfig::default()),
            Err(ChainError::Empty)
        ));
    }

    #[test]
    fn from_blocks_rejects_exhausted_tail_index() {
        let mut view = genesis_block("Genesis Block", 0).view();
        view.index = u64::MAX;
        let blocks = vec![Block::from_view(view)];
        assert!(matches!(
            Chain::from_blocks(blocks, ChainConfig::default()),
            Err(ChainError::IndexExhausted(u64::MAX))
        ));
    }

    #[test]
    fn imported_chain_appends_after_its_tail() {
        let mut view = genesis_block("Genesis Block", 0).view();
        view.index = u64::MAX - 1;
        let blocks = vec![Block::from_view(view)];
        let mut chain = Chain::from_blocks(blocks, ChainConfig::with_difficulty(0)).unwrap();
        let (index, _) = chain.append("x");
        assert_eq!(index, u64::MAX);
    }

    #[test]
    fn snapshot_matches_blocks() {
        let mut chain = Chain::new(1).unwrap();
        chain.append("A");
        chain.append("B");
        let views = chain.snapshot();
        assert_eq!(views.len(), 3);
        for (view, block) in views.iter().zip(chain.blocks()) {
            assert_eq!(view.index, block.index());
            assert_eq!(view.hash, block.hash());
            assert_eq!(view.previous_hash, block.previous_hash());
            assert_eq!(view.nonce, block.nonce());
            assert_eq!(view.data, block.data());
        }
    }
}
