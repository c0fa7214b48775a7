use anyhow::Result;
use clap::{Parser, Subcommand};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "longchain-cli")]
#[command(about = "CLI client for a longchain node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a transaction to the pending pool
    Submit {
        /// Sender
        #[arg(long)]
        from: String,
        /// Recipient
        #[arg(long)]
        to: String,
        /// Amount (may be negative)
        #[arg(long, allow_hyphen_values = true)]
        amount: f64,
    },
    /// Mine the pending pool, crediting the reward to `miner`
    Mine {
        #[arg(long)]
        miner: String,
    },
    /// Print the full chain snapshot
    Chain,
    /// Ask the node to validate its chain
    Validate,
    /// Show an address's balance
    Balance { address: String },
    /// Register peers with the node
    Register {
        /// Peer addresses (host:port or URL)
        #[arg(required = true)]
        peers: Vec<String>,
    },
    /// Probe every registered peer
    Status,
    /// Run longest-chain conflict resolution on the node
    Resolve,
}

#[derive(Serialize)]
struct Tx {
    sender: String,
    recipient: String,
    amount: f64,
}

#[derive(Serialize)]
struct MineReq {
    miner: String,
}

#[derive(Serialize)]
struct RegisterReq {
    nodes: Vec<String>,
}

async fn send(req: RequestBuilder) -> Result<()> {
    let res = req.send().await?;
    let status = res.status();
    let body = res.text().await?;
    println!("status: {}", status);
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let client = Client::new();
    let node = cli.node.trim_end_matches('/');
    debug!(node, "using node");

    let req = match cli.cmd {
        Command::Submit { from, to, amount } => client
            .post(format!("{node}/transactions/new"))
            .json(&Tx {
                sender: from,
                recipient: to,
                amount,
            }),
        Command::Mine { miner } => client
            .post(format!("{node}/mine"))
            .json(&MineReq { miner }),
        Command::Chain => client.get(format!("{node}/chain")),
        Command::Validate => client.get(format!("{node}/validate")),
        Command::Balance { address } => client.get(format!("{node}/balance/{address}")),
        Command::Register { peers } => client
            .post(format!("{node}/nodes/register"))
            .json(&RegisterReq { nodes: peers }),
        Command::Status => client.get(format!("{node}/nodes/status")),
        Command::Resolve => client.get(format!("{node}/nodes/resolve")),
    };
    send(req).await
}
