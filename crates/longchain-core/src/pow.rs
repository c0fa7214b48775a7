//! Nonce search for sealing candidate blocks.
//!
//! The search has no upper bound on attempts, so every entry point takes a
//! [`CancelToken`]. The nonce is a u64. If that space is exhausted without a
//! hit, the timestamp is refreshed and the search restarts at zero.

use crate::constants::{CANCEL_CHECK_INTERVAL, PROGRESS_LOG_INTERVAL};
use crate::{now_secs, Block, Hash, PowError, Preimage};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared flag used to abandon a running search.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Raise `block.nonce` from its current value until the hash carries
/// `difficulty` leading hex zeros. The returned block has `hash` set.
pub fn seal(mut block: Block, difficulty: usize, cancel: &CancelToken) -> Result<Block, PowError> {
    let mut preimage = Preimage::new(&block);
    let mut attempts: u64 = 0;
    loop {
        if attempts % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(PowError::Cancelled);
        }

        let hash = preimage.digest(block.nonce);
        if count_leading_zero_digits(&hash) >= difficulty {
            block.hash = hex::encode(hash);
            info!(
                index = block.index,
                nonce = block.nonce,
                attempts = attempts + 1,
                "sealed block {}",
                block.hash
            );
            return Ok(block);
        }

        attempts += 1;
        if attempts % PROGRESS_LOG_INTERVAL == 0 {
            debug!(index = block.index, nonce = block.nonce, "attempt #{attempts}");
        }

        match block.nonce.checked_add(1) {
            Some(next) => block.nonce = next,
            None => {
                block.timestamp = now_secs();
                block.nonce = 0;
                preimage = Preimage::new(&block);
            }
        }
    }
}

/// Same search as [`seal`] spread over the rayon pool. `find_first` keeps the
/// answer identical to the sequential search: the lowest qualifying nonce at
/// or above the starting one.
pub fn seal_parallel(
    mut block: Block,
    difficulty: usize,
    cancel: &CancelToken,
) -> Result<Block, PowError> {
    loop {
        let preimage = Preimage::new(&block);
        let found = (block.nonce..=u64::MAX)
            .into_par_iter()
            .find_first(|nonce| {
                cancel.is_cancelled()
                    || count_leading_zero_digits(&preimage.digest(*nonce)) >= difficulty
            });

        if cancel.is_cancelled() {
            return Err(PowError::Cancelled);
        }
        match found {
            Some(nonce) => {
                block.nonce = nonce;
                block.hash = hex::encode(preimage.digest(nonce));
                info!(
                    index = block.index,
                    nonce, "sealed block {} (parallel)", block.hash
                );
                return Ok(block);
            }
            None => {
                block.timestamp = now_secs();
                block.nonce = 0;
            }
        }
    }
}

/// Number of leading zero hex digits in a raw digest.
pub fn count_leading_zero_digits(hash: &Hash) -> usize {
    let mut total = 0;
    for b in hash {
        if *b == 0 {
            total += 2;
        } else {
            if *b < 0x10 {
                total += 1;
            }
            break;
        }
    }
    total
}

/// Number of leading `'0'` characters in a hex string.
pub fn count_leading_zero_chars(hash: &str) -> usize {
    hash.bytes().take_while(|c| *c == b'0').count()
}
