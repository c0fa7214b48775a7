use crate::ledger::{Candidate, Ledger};
use crate::pow::{self, CancelToken};
use crate::{Block, ChainSnapshot, LedgerError, Transaction, ValidationError};
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared owner of the node's ledger. Every read and write goes through the
/// lock, so a reader never sees a chain mid-append or mid-replace.
#[derive(Clone)]
pub struct LedgerHandle {
    inner: Arc<Inner>,
}

struct Inner {
    ledger: RwLock<Ledger>,
    /// Serializes miners; held across the whole search.
    miner: tokio::sync::Mutex<()>,
    /// Token of the search in flight, cancelled when the chain is replaced.
    active: Mutex<Option<CancelToken>>,
}

impl LedgerHandle {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            inner: Arc::new(Inner {
                ledger: RwLock::new(ledger),
                miner: tokio::sync::Mutex::new(()),
                active: Mutex::new(None),
            }),
        }
    }

    pub fn add_transaction(&self, sender: &str, recipient: &str, amount: f64) -> u64 {
        self.inner
            .ledger
            .write()
            .add_transaction(sender, recipient, amount)
    }

    /// Seal the pending pool on a blocking worker without holding the ledger
    /// lock. Transactions submitted meanwhile stay queued for the next block.
    ///
    /// Cancelling `cancel`, a chain replacement landing mid-search, or
    /// dropping the returned future leaves the ledger untouched and stops the
    /// blocking search.
    pub async fn mine(&self, miner: &str, cancel: CancelToken) -> Result<Block, LedgerError> {
        let _serial = self.inner.miner.lock().await;

        // Register under the read lock so a replacement either precedes the
        // candidate or sees the token.
        let Candidate {
            block,
            difficulty,
            drained,
        } = {
            let ledger = self.inner.ledger.read();
            let candidate = ledger.prepare_candidate(miner)?;
            *self.inner.active.lock() = Some(cancel.clone());
            candidate
        };
        let mut search = ActiveSearch {
            active: &self.inner.active,
            cancel: cancel.clone(),
            finished: false,
        };

        let worker_cancel = cancel.clone();
        let outcome =
            tokio::task::spawn_blocking(move || pow::seal_parallel(block, difficulty, &worker_cancel))
                .await;
        search.finished = true;
        drop(search);

        let sealed = match outcome {
            Ok(sealed) => sealed?,
            Err(err) => return Err(LedgerError::Worker(err.to_string())),
        };

        let mut ledger = self.inner.ledger.write();
        match ledger.commit(sealed, drained) {
            Ok(block) => Ok(block.clone()),
            Err(err) => {
                warn!("discarding sealed block: {err}");
                Err(err)
            }
        }
    }

    /// Replace the chain atomically and abandon any search built on the old tip.
    pub fn replace_chain(&self, chain: Vec<Block>) {
        let mut ledger = self.inner.ledger.write();
        ledger.replace_chain(chain);
        if let Some(token) = self.inner.active.lock().as_ref() {
            info!("cancelling in-flight mining after chain replacement");
            token.cancel();
        }
    }

    /// Exclusive access for callers that must decide and mutate in one step.
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Ledger> {
        self.inner.ledger.write()
    }

    pub(crate) fn cancel_mining(&self) {
        if let Some(token) = self.inner.active.lock().as_ref() {
            token.cancel();
        }
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        self.inner.ledger.read().snapshot()
    }

    pub fn len(&self) -> usize {
        self.inner.ledger.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.ledger.read().is_empty()
    }

    pub fn difficulty(&self) -> usize {
        self.inner.ledger.read().difficulty()
    }

    pub fn mining_reward(&self) -> f64 {
        self.inner.ledger.read().mining_reward()
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.inner.ledger.read().pending().to_vec()
    }

    pub fn balance_of(&self, address: &str) -> f64 {
        self.inner.ledger.read().balance_of(address)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.inner.ledger.read().validate()
    }

    pub fn config(&self) -> crate::LedgerConfig {
        self.inner.ledger.read().config()
    }
}

/// Clears the registered token when a search ends, and cancels the worker if
/// the search was abandoned before it reported back.
struct ActiveSearch<'a> {
    active: &'a Mutex<Option<CancelToken>>,
    cancel: CancelToken,
    finished: bool,
}

impl Drop for ActiveSearch<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("mining abandoned before the search finished; cancelling worker");
            self.cancel.cancel();
        }
        self.active.lock().take();
    }
}
