use longchain_core::{ChainSnapshot, PeerError, PeerTransport};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};

#[derive(Debug, Deserialize)]
struct LengthResponse {
    length: u64,
}

#[derive(Deserialize)]
struct NodesResponse {
    nodes: Vec<String>,
}

/// Fetches peer chains from their `/chain` and `/chain/length` routes.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The peers a node has registered, from its `/nodes/list` route.
    pub async fn fetch_peers(&self, peer: &str) -> Result<Vec<String>, PeerError> {
        self.get_json::<NodesResponse>(peer, "/nodes/list")
            .await
            .map(|r| r.nodes)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        peer: &str,
        path: &str,
    ) -> Result<T, PeerError> {
        let url = format!("http://{peer}{path}");
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| PeerError::Unreachable {
                peer: peer.to_string(),
                reason: err.to_string(),
            })?;

        let status = res.status();
        if !status.is_success() {
            return Err(PeerError::MalformedResponse {
                peer: peer.to_string(),
                reason: format!("{url} answered {status}"),
            });
        }
        res.json::<T>()
            .await
            .map_err(|err| PeerError::MalformedResponse {
                peer: peer.to_string(),
                reason: err.to_string(),
            })
    }
}

impl PeerTransport for HttpTransport {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainSnapshot, PeerError> {
        self.get_json(peer, "/chain").await
    }

    async fn fetch_length(&self, peer: &str) -> Result<u64, PeerError> {
        self.get_json::<LengthResponse>(peer, "/chain/length")
            .await
            .map(|r| r.length)
    }
}
