//! Longest-valid-chain conflict resolution.
//!
//! Peers are polled concurrently, each under its own timeout. Any chain longer
//! than ours is validated independently before it is considered. The first peer
//! in iteration order whose valid chain is strictly longer than the best so far
//! wins, so among equally long chains the earliest peer keeps the slot.

use crate::{Block, ChainSnapshot, Ledger, LedgerHandle, PeerError};
use futures_util::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Capability to query another node. Implemented over HTTP by the node binary.
pub trait PeerTransport: Send + Sync {
    /// The peer's full chain snapshot.
    fn fetch_chain(
        &self,
        peer: &str,
    ) -> impl Future<Output = Result<ChainSnapshot, PeerError>> + Send;

    /// Just the peer's chain length.
    fn fetch_length(&self, peer: &str) -> impl Future<Output = Result<u64, PeerError>> + Send;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The local chain was superseded by `peer`'s chain of `length` blocks.
    Replaced { peer: String, length: u64 },
    /// The local chain stays authoritative.
    Unchanged,
}

impl Resolution {
    pub fn is_replaced(&self) -> bool {
        matches!(self, Resolution::Replaced { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PeerStatus {
    pub address: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct Contender {
    peer: String,
    length: u64,
    chain: Vec<Block>,
}

pub struct ConsensusResolver<T> {
    transport: T,
    peer_timeout: Duration,
}

impl<T: PeerTransport> ConsensusResolver<T> {
    pub fn new(transport: T, peer_timeout: Duration) -> Self {
        Self {
            transport,
            peer_timeout,
        }
    }

    /// Fetch one peer's snapshot, bounded by the per-peer timeout. A snapshot
    /// whose reported length disagrees with its block count is malformed.
    pub async fn fetch(&self, peer: &str) -> Result<ChainSnapshot, PeerError> {
        let snapshot = tokio::time::timeout(self.peer_timeout, self.transport.fetch_chain(peer))
            .await
            .map_err(|_| PeerError::Timeout {
                peer: peer.to_string(),
            })??;

        if snapshot.length != snapshot.chain.len() as u64 {
            return Err(PeerError::MalformedResponse {
                peer: peer.to_string(),
                reason: format!(
                    "reported length {} but sent {} blocks",
                    snapshot.length,
                    snapshot.chain.len()
                ),
            });
        }
        Ok(snapshot)
    }

    /// Poll `peers` and adopt the longest valid chain strictly longer than ours.
    ///
    /// Fetching and validation happen without the ledger lock. The final pick
    /// and the swap happen under the writer lock, against the chain length at
    /// that moment.
    pub async fn resolve(&self, handle: &LedgerHandle, peers: &[String]) -> Resolution {
        let local_len = handle.len() as u64;
        let config = handle.config();

        let fetched = join_all(peers.iter().map(|peer| self.fetch(peer))).await;

        let mut contenders = Vec::new();
        for (peer, result) in peers.iter().zip(fetched) {
            let snapshot = match result {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!("skipping peer: {err}");
                    continue;
                }
            };
            if snapshot.length <= local_len {
                debug!(peer = %peer, length = snapshot.length, "peer chain not longer");
                continue;
            }

            let length = snapshot.length;
            let candidate = Ledger::from_chain(snapshot.chain, config);
            match candidate.validate() {
                Ok(()) => contenders.push(Contender {
                    peer: peer.clone(),
                    length,
                    chain: candidate.into_chain(),
                }),
                Err(err) => warn!(peer = %peer, length, "rejecting peer chain: {err}"),
            }
        }

        let mut ledger = handle.write();
        let mut best_length = ledger.len() as u64;
        let mut best: Option<Contender> = None;
        for contender in contenders {
            if contender.length > best_length {
                best_length = contender.length;
                best = Some(contender);
            }
        }

        match best {
            Some(Contender {
                peer,
                length,
                chain,
            }) => {
                ledger.replace_chain(chain);
                drop(ledger);
                handle.cancel_mining();
                info!(peer = %peer, length, "local chain superseded");
                Resolution::Replaced { peer, length }
            }
            None => {
                debug!(length = best_length, "local chain remains authoritative");
                Resolution::Unchanged
            }
        }
    }

    /// Check every peer's chain length concurrently.
    pub async fn probe(&self, peers: &[String]) -> Vec<PeerStatus> {
        let lengths = join_all(peers.iter().map(|peer| async move {
            tokio::time::timeout(self.peer_timeout, self.transport.fetch_length(peer))
                .await
                .map_err(|_| PeerError::Timeout {
                    peer: peer.to_string(),
                })
                .and_then(|r| r)
        }))
        .await;

        peers
            .iter()
            .zip(lengths)
            .map(|(peer, result)| match result {
                Ok(length) => PeerStatus {
                    address: peer.clone(),
                    active: true,
                    length: Some(length),
                    error: None,
                },
                Err(err) => {
                    debug!("peer inactive: {err}");
                    PeerStatus {
                        address: peer.clone(),
                        active: false,
                        length: None,
                        error: Some(err.to_string()),
                    }
                }
            })
            .collect()
    }
}
