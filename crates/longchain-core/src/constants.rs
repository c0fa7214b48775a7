pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;

/// `previous_hash` carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";
/// Sender recorded on mining reward transactions.
pub const SYSTEM_SENDER: &str = "SYSTEM";

pub const DEFAULT_DIFFICULTY: usize = 4;
pub const DEFAULT_MINING_REWARD: f64 = 1.0;
/// Leading hex zeros are capped at the width of the u64 nonce domain.
pub const MAX_DIFFICULTY: usize = 16;

pub const PROGRESS_LOG_INTERVAL: u64 = 100_000;
pub const CANCEL_CHECK_INTERVAL: u64 = 1_024;

pub const DEFAULT_PEER_TIMEOUT_SECS: u64 = 5;
