use crate::transport::HttpTransport;
use longchain_core::PeerError;
use parking_lot::RwLock;
use reqwest::Url;
use std::sync::Arc;
use tracing::{debug, info};

/// Reduce a peer given as a URL (`http://host:port/...`) or a bare
/// `host:port` to the `host:port` form used for requests.
pub fn normalize_address(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.contains("://") {
        let url = Url::parse(raw).ok()?;
        let host = url.host_str()?;
        return Some(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        });
    }
    let bare = raw.trim_end_matches('/');
    if bare.is_empty() {
        None
    } else {
        Some(bare.to_string())
    }
}

/// Known peers, de-duplicated and kept in registration order.
#[derive(Clone, Default)]
pub struct PeerSet {
    inner: Arc<RwLock<Vec<String>>>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the address is unparseable or already known.
    pub fn register(&self, raw: &str) -> bool {
        let Some(address) = normalize_address(raw) else {
            debug!("ignoring malformed peer address {raw:?}");
            return false;
        };
        let mut peers = self.inner.write();
        if peers.contains(&address) {
            return false;
        }
        info!("registered peer {address}");
        peers.push(address);
        true
    }

    pub fn remove(&self, address: &str) -> bool {
        let mut peers = self.inner.write();
        let before = peers.len();
        peers.retain(|p| p != address);
        peers.len() != before
    }

    pub fn list(&self) -> Vec<String> {
        self.inner.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Register `seed` and every peer it knows about, skipping `own`. Returns
    /// how many addresses were new.
    pub async fn discover(
        &self,
        transport: &HttpTransport,
        seed: &str,
        own: &str,
    ) -> Result<usize, PeerError> {
        let seed = normalize_address(seed).unwrap_or_else(|| seed.to_string());
        let neighbours = transport.fetch_peers(&seed).await?;
        let own = normalize_address(own);
        let mut added = usize::from(self.register(&seed));
        for raw in &neighbours {
            if normalize_address(raw) == own {
                continue;
            }
            added += usize::from(self.register(raw));
        }
        info!(seed = %seed, found = neighbours.len(), added, "peer discovery finished");
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_urls_and_bare_addresses() {
        assert_eq!(
            normalize_address("http://127.0.0.1:5001").as_deref(),
            Some("127.0.0.1:5001")
        );
        assert_eq!(
            normalize_address("http://node.local:5002/chain").as_deref(),
            Some("node.local:5002")
        );
        assert_eq!(
            normalize_address("127.0.0.1:5003/").as_deref(),
            Some("127.0.0.1:5003")
        );
        assert_eq!(normalize_address("   "), None);
        assert_eq!(normalize_address("http://"), None);
    }

    #[test]
    fn register_deduplicates_and_keeps_order() {
        let peers = PeerSet::new();
        assert!(peers.register("http://127.0.0.1:5001"));
        assert!(peers.register("127.0.0.1:5002"));
        assert!(!peers.register("127.0.0.1:5001"));
        assert!(!peers.register(""));
        assert_eq!(peers.list(), vec!["127.0.0.1:5001", "127.0.0.1:5002"]);
    }

    #[tokio::test]
    async fn discovery_registers_seed_and_its_peers() {
        use crate::routes::{self, AppState};
        use longchain_core::{ConsensusResolver, Ledger, LedgerConfig, LedgerHandle};
        use std::time::Duration;

        let seed_state = AppState {
            ledger: LedgerHandle::new(Ledger::new(LedgerConfig::default()).unwrap()),
            peers: PeerSet::new(),
            resolver: Arc::new(ConsensusResolver::new(
                HttpTransport::default(),
                Duration::from_secs(1),
            )),
            mine_timeout: None,
        };
        seed_state.peers.register("127.0.0.1:7001");
        seed_state.peers.register("127.0.0.1:7002");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let seed = listener.local_addr().unwrap().to_string();
        let app = routes::router(seed_state);
        tokio::spawn(async move { axum::serve(listener, app).await });

        let peers = PeerSet::new();
        let added = peers
            .discover(&HttpTransport::default(), &format!("http://{seed}"), "127.0.0.1:7002")
            .await
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(peers.list(), vec![seed.clone(), "127.0.0.1:7001".to_string()]);

        let again = peers
            .discover(&HttpTransport::default(), &seed, "127.0.0.1:7002")
            .await
            .unwrap();
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn discovery_from_dead_seed_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let seed = listener.local_addr().unwrap().to_string();
        drop(listener);

        let peers = PeerSet::new();
        let err = peers
            .discover(&HttpTransport::default(), &seed, "127.0.0.1:8080")
            .await
            .unwrap_err();
        assert!(matches!(err, PeerError::Unreachable { .. }));
        assert!(peers.is_empty());
    }

    #[test]
    fn remove_reports_whether_peer_was_known() {
        let peers = PeerSet::new();
        peers.register("127.0.0.1:5001");
        assert!(peers.remove("127.0.0.1:5001"));
        assert!(!peers.remove("127.0.0.1:5001"));
        assert!(peers.is_empty());
    }
}
