//! Integrity checks over a whole [`Chain`].
//!
//! Every block is checked on its own against its predecessor, so the checks
//! fan out over the rayon pool. Results are always reported in chain order.

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::block::Block;
use crate::chain::Chain;
use crate::constants::GENESIS_PREVIOUS_HASH;

/// The first (or every) broken invariant, located by position in the chain.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("block {index}: stored hash {stored} does not match recomputed {computed}")]
    HashMismatch {
        index: u64,
        stored: String,
        computed: String,
    },

    #[error("block {index}: previous_hash {found} does not match predecessor hash {expected}")]
    BrokenLink {
        index: u64,
        expected: String,
        found: String,
    },

    #[error("position {position}: expected index {expected}, found {found}")]
    IndexGap {
        position: u64,
        expected: u64,
        found: u64,
    },

    #[error("block {index}: hash has {found} leading zeros, {required} required")]
    InsufficientWork {
        index: u64,
        required: u32,
        found: u32,
    },

    #[error("genesis previous_hash is {found:?}, expected the sentinel")]
    BadGenesis { found: String },
}

impl ValidationError {
    /// Position of the offending block.
    pub fn index(&self) -> u64 {
        match self {
            Self::HashMismatch { index, .. }
            | Self::BrokenLink { index, .. }
            | Self::InsufficientWork { index, .. } => *index,
            Self::IndexGap { position, .. } => *position,
            Self::BadGenesis { .. } => 0,
        }
    }
}

/// Whether to re-check proof-of-work targets.
///
/// Difficulty may change over a chain's life, so the default only checks
/// linkage and hash self-consistency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PowCheck {
    #[default]
    Skip,
    /// Each block against the difficulty it recorded when mined.
    Recorded,
    /// Every block against one fixed floor.
    AtLeast(u32),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub violations: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn first(&self) -> Option<&ValidationError> {
        self.violations.first()
    }
}

impl Chain {
    /// Check hash self-consistency and linkage for every block.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_with(PowCheck::Skip)
    }

    /// Like [`Chain::validate`], optionally also checking proof-of-work.
    /// Returns the first violation in chain order.
    pub fn validate_with(&self, pow: PowCheck) -> Result<(), ValidationError> {
        let blocks = self.blocks();
        match (0..blocks.len())
            .into_par_iter()
            .find_map_first(|position| check_block(blocks, position, pow).into_iter().next())
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Collect every violation rather than stopping at the first.
    pub fn audit(&self, pow: PowCheck) -> ValidationReport {
        let blocks = self.blocks();
        let per_block: Vec<Vec<ValidationError>> = (0..blocks.len())
            .into_par_iter()
            .map(|position| check_block(blocks, position, pow))
            .collect();
        ValidationReport {
            violations: per_block.into_iter().flatten().collect(),
        }
    }
}

fn check_block(blocks: &[Block], position: usize, pow: PowCheck) -> Vec<ValidationError> {
    let block = &blocks[position];
    let mut found = Vec::new();

    let computed = block.recompute_hash();
    if computed != block.hash() {
        found.push(ValidationError::HashMismatch {
            index: position as u64,
            stored: block.hash().to_string(),
            computed,
        });
    }

    match position.checked_sub(1).map(|p| &blocks[p]) {
        None => {
            if block.previous_hash() != GENESIS_PREVIOUS_HASH {
                found.push(ValidationError::BadGenesis {
                    found: block.previous_hash().to_string(),
                });
            }
            if block.index() != 0 {
                found.push(ValidationError::IndexGap {
                    position: 0,
                    expected: 0,
                    found: block.index(),
                });
            }
        }
        Some(prev) => {
            if block.previous_hash() != prev.hash() {
                found.push(ValidationError::BrokenLink {
                    index: position as u64,
                    expected: prev.hash().to_string(),
                    found: block.previous_hash().to_string(),
                });
            }
            let expected = prev.index().wrapping_add(1);
            if block.index() != expected {
                found.push(ValidationError::IndexGap {
                    position: position as u64,
                    expected,
                    found: block.index(),
                });
            }
        }
    }

    let required = match pow {
        PowCheck::Skip => None,
        PowCheck::Recorded => Some(block.difficulty()),
        PowCheck::AtLeast(d) => Some(d),
    };
    if let Some(required) = required {
        if !block.meets_difficulty(required) {
            found.push(ValidationError::InsufficientWork {
                index: position as u64,
                required,
                found: crate::pow::leading_zero_hex(block.hash()),
            });
        }
    }

    found
}
