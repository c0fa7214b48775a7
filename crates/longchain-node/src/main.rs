use clap::Parser;
use longchain_core::{ConsensusResolver, Ledger, LedgerConfig, LedgerHandle};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::{info, warn, Level};

mod peers;
mod routes;
mod transport;

use peers::PeerSet;
use routes::AppState;
use transport::HttpTransport;

#[derive(Parser, Debug)]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Leading hex zeros required on sealed block hashes
    #[arg(long, default_value_t = longchain_core::constants::DEFAULT_DIFFICULTY)]
    difficulty: usize,

    /// Amount credited to the miner of each block
    #[arg(long, default_value_t = longchain_core::constants::DEFAULT_MINING_REWARD)]
    mining_reward: f64,

    /// Peer to register at startup (host:port or URL); repeatable
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Known node whose peer list is pulled in at startup; repeatable
    #[arg(long = "seed")]
    seeds: Vec<String>,

    /// Per-peer timeout when fetching chains
    #[arg(long, default_value_t = longchain_core::constants::DEFAULT_PEER_TIMEOUT_SECS)]
    peer_timeout_secs: u64,

    /// Abandon a mining request after this many seconds (0 = never)
    #[arg(long, default_value_t = 0)]
    mine_timeout_secs: u64,

    /// Run conflict resolution in the background every N seconds (0 = off)
    #[arg(long, default_value_t = 0)]
    resolve_interval_secs: u64,
}

/// Periodically pull the longest valid chain from known peers.
fn start_autoresolve(state: AppState, every: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(every).await;
            let peers = state.peers.list();
            if peers.is_empty() {
                continue;
            }
            let resolution = state.resolver.resolve(&state.ledger, &peers).await;
            info!(?resolution, "background resolution finished");
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let ledger = Ledger::new(LedgerConfig {
        difficulty: args.difficulty,
        mining_reward: args.mining_reward,
    })?;

    let peer_timeout = Duration::from_secs(args.peer_timeout_secs);
    let transport = HttpTransport::new(reqwest::Client::builder().timeout(peer_timeout).build()?);

    let peers = PeerSet::new();
    for peer in &args.peers {
        peers.register(peer);
    }
    for seed in &args.seeds {
        if let Err(err) = peers.discover(&transport, seed, &args.listen).await {
            warn!("peer discovery via {seed} failed: {err}");
        }
    }

    let state = AppState {
        ledger: LedgerHandle::new(ledger),
        peers,
        resolver: Arc::new(ConsensusResolver::new(transport, peer_timeout)),
        mine_timeout: (args.mine_timeout_secs > 0)
            .then(|| Duration::from_secs(args.mine_timeout_secs)),
    };

    if args.resolve_interval_secs > 0 {
        start_autoresolve(state.clone(), Duration::from_secs(args.resolve_interval_secs));
    }

    let app = routes::router(state);
    let addr: SocketAddr = args.listen.parse()?;
    info!(
        difficulty = args.difficulty,
        reward = args.mining_reward,
        "longchain-node listening on http://{addr}"
    );
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
