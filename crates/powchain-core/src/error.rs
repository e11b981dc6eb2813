use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("a chain needs at least its genesis block")]
    Empty,

    #[error("tail index {0} leaves no room for another block")]
    IndexExhausted(u64),

    #[error("difficulty {requested} is above the configured maximum {max}")]
    DifficultyOutOfRange { requested: u32, max: u32 },

    #[error("invalid chain config: {0}")]
    InvalidConfig(String),

    #[error("malformed chain config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("mining worker failed: {0}")]
    Worker(String),
}
