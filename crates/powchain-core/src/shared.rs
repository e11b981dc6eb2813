//! Concurrent access to one chain.
//!
//! Appends are serialized through a single lock held across
//! "read tail -> build -> mine -> push", so two appends can never both build
//! on the same tail. Mining itself runs on the blocking pool with no chain
//! lock held: readers keep seeing the committed blocks and a block only
//! becomes visible once it is fully mined.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::block::{Block, BlockView};
use crate::chain::Chain;
use crate::error::ChainError;
use crate::validate::{PowCheck, ValidationError, ValidationReport};

#[derive(Clone)]
pub struct SharedChain {
    chain: Arc<RwLock<Chain>>,
    append_lock: Arc<Mutex<()>>,
}

impl SharedChain {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain: Arc::new(RwLock::new(chain)),
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Mine and commit a block. If this future is dropped before mining
    /// finishes, nothing is committed.
    pub async fn append(&self, data: impl Into<String>) -> Result<(u64, String), ChainError> {
        let _serial = self.append_lock.lock().await;
        let (mut candidate, difficulty) = {
            let chain = self.chain.read().await;
            (chain.next_candidate(data), chain.difficulty())
        };
        let block = tokio::task::spawn_blocking(move || {
            candidate.mine(difficulty);
            candidate.freeze()
        })
        .await
        .map_err(|e| ChainError::Worker(e.to_string()))?;
        Ok(self.chain.write().await.commit(block))
    }

    /// Takes effect for the next append; one already mining keeps its target.
    pub async fn set_difficulty(&self, difficulty: u32) -> Result<(), ChainError> {
        self.chain.write().await.set_difficulty(difficulty)
    }

    pub async fn difficulty(&self) -> u32 {
        self.chain.read().await.difficulty()
    }

    pub async fn len(&self) -> usize {
        self.chain.read().await.len()
    }

    pub async fn latest(&self) -> Block {
        self.chain.read().await.latest().clone()
    }

    pub async fn snapshot(&self) -> Vec<BlockView> {
        self.chain.read().await.snapshot()
    }

    pub async fn validate(&self) -> Result<(), ValidationError> {
        let result = self.chain.read().await.validate();
        if let Err(err) = &result {
            warn!(%err, "chain failed validation");
        }
        result
    }

    pub async fn audit(&self, pow: PowCheck) -> ValidationReport {
        self.chain.read().await.audit(pow)
    }

    /// Run `f` against the committed chain under the read lock.
    pub async fn read<R>(&self, f: impl FnOnce(&Chain) -> R) -> R {
        f(&*self.chain.read().await)
    }
}

/// Background loop that appends a block every `interval`.
///
/// Stopping is cooperative: the stop signal is checked between blocks, so a
/// block that is being mined when [`AutoMiner::stop`] is called still lands.
pub struct AutoMiner {
    stop: StopSignal,
    handle: JoinHandle<u64>,
}

/// Detached stop request for an [`AutoMiner`], usable while another task
/// awaits [`AutoMiner::join`].
#[derive(Clone)]
pub struct StopSignal(Arc<watch::Sender<bool>>);

impl StopSignal {
    pub fn stop(&self) {
        let _ = self.0.send(true);
    }
}

impl AutoMiner {
    /// Start mining. `payload` receives how many blocks this loop has mined
    /// so far and returns the data for the next one. With `max_blocks` the
    /// loop ends by itself after that many blocks.
    pub fn spawn<F>(
        chain: SharedChain,
        interval: Duration,
        max_blocks: Option<u64>,
        mut payload: F,
    ) -> Self
    where
        F: FnMut(u64) -> String + Send + 'static,
    {
        let (stop, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut mined = 0u64;
            info!(?interval, ?max_blocks, "auto-miner started");
            while max_blocks.map_or(true, |max| mined < max) {
                tokio::select! {
                    biased;
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => {}
                }
                if *stopped.borrow() {
                    break;
                }
                match chain.append(payload(mined)).await {
                    Ok(_) => mined += 1,
                    Err(err) => {
                        warn!(%err, "auto-miner append failed, stopping");
                        break;
                    }
                }
            }
            info!(mined, "auto-miner finished");
            mined
        });
        Self {
            stop: StopSignal(Arc::new(stop)),
            handle,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Signal the loop to stop and wait for it. Returns the number of blocks
    /// it mined.
    pub async fn stop(self) -> Result<u64, ChainError> {
        self.stop.stop();
        self.join().await
    }

    /// Wait for the loop to end, either on its own (`max_blocks`, an error)
    /// or through a [`StopSignal`].
    pub async fn join(self) -> Result<u64, ChainError> {
        // Keep the sender alive until the task is done; dropping the last
        // one would read as a stop request.
        let Self { stop, handle } = self;
        let mined = handle.await.map_err(|e| ChainError::Worker(e.to_string()));
        drop(stop);
        mined
    }
}
