//! Append-only, hash-linked ledger with optional proof-of-work.
//!
//! A [`Chain`] owns an ordered sequence of immutable [`Block`]s. Each block
//! commits to its index, timestamp, payload, predecessor hash and nonce
//! through a SHA-256 digest; [`Chain::validate`] re-derives every digest and
//! link. [`SharedChain`] and [`AutoMiner`] add serialized concurrent appends
//! on a tokio runtime.

pub mod block;
pub mod chain;
pub mod config;
pub mod constants;
pub mod error;
pub mod pow;
pub mod shared;
pub mod validate;

pub use block::{calculate_hash, Block, BlockCandidate, BlockView};
pub use chain::Chain;
pub use config::ChainConfig;
pub use error::ChainError;
pub use pow::MiningStats;
pub use shared::{AutoMiner, SharedChain, StopSignal};
pub use validate::{PowCheck, ValidationError, ValidationReport};
