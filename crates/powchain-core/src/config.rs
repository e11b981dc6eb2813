use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_DIFFICULTY, GENESIS_DATA, MAX_DIFFICULTY};
use crate::error::ChainError;

/// Explicit settings for a [`Chain`](crate::chain::Chain).
///
/// Mining cost grows by roughly 16x per difficulty step, and appends have no
/// timeout. `max_difficulty` is the guard rail for hosts that let users pick
/// the difficulty interactively.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub difficulty: u32,
    pub max_difficulty: u32,
    pub genesis_data: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            max_difficulty: MAX_DIFFICULTY,
            genesis_data: GENESIS_DATA.to_string(),
        }
    }
}

impl ChainConfig {
    pub fn with_difficulty(difficulty: u32) -> Self {
        Self {
            difficulty,
            ..Self::default()
        }
    }

    pub fn from_json(text: &str) -> Result<Self, ChainError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        if self.max_difficulty > MAX_DIFFICULTY {
            return Err(ChainError::InvalidConfig(format!(
                "max_difficulty {} exceeds the {MAX_DIFFICULTY} hex characters of a digest",
                self.max_difficulty
            )));
        }
        self.check_difficulty(self.difficulty)
    }

    pub fn check_difficulty(&self, difficulty: u32) -> Result<(), ChainError> {
        if difficulty > self.max_difficulty {
            return Err(ChainError::DifficultyOutOfRange {
                requested: difficulty,
                max: self.max_difficulty,
            });
        }
        Ok(())
    }
}
