use thiserror::Error;

/// Rejections raised at the boundary before a transaction reaches the pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("malformed transaction: missing field `{field}`")]
    Malformed { field: &'static str },

    #[error("malformed transaction: amount must be a finite number")]
    NonFiniteAmount,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowError {
    #[error("proof-of-work search cancelled")]
    Cancelled,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("no pending transactions to mine")]
    EmptyPool,

    #[error("difficulty {requested} exceeds the maximum of {max}")]
    DifficultyTooHigh { requested: usize, max: usize },

    #[error("mining reward must be a finite number")]
    InvalidReward,

    #[error("chain tip moved while mining block {index}; sealed block discarded")]
    Stale { index: u64 },

    #[error("mining cancelled")]
    Cancelled,

    #[error("mining worker failed: {0}")]
    Worker(String),
}

impl From<PowError> for LedgerError {
    fn from(err: PowError) -> Self {
        match err {
            PowError::Cancelled => LedgerError::Cancelled,
        }
    }
}

/// The reason a chain was rejected, naming the first block that failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("chain is empty")]
    EmptyChain,

    #[error("invalid genesis block: {reason}")]
    InvalidGenesis { reason: String },

    #[error("block {index}: stored hash does not match its contents")]
    HashMismatch { index: usize },

    #[error("block {index}: previous_hash does not match the preceding block's hash")]
    BrokenLink { index: usize },

    #[error("block {index}: hash has {actual} leading zeros, {required} required")]
    UnderMined {
        index: usize,
        required: usize,
        actual: usize,
    },

    #[error("block at position {expected} reports index {actual}")]
    IndexMismatch { expected: usize, actual: u64 },
}

impl ValidationError {
    /// Position of the offending block in the chain, if the error is tied to one.
    pub fn block_index(&self) -> Option<usize> {
        match self {
            ValidationError::EmptyChain => None,
            ValidationError::InvalidGenesis { .. } => Some(0),
            ValidationError::HashMismatch { index }
            | ValidationError::BrokenLink { index }
            | ValidationError::UnderMined { index, .. } => Some(*index),
            ValidationError::IndexMismatch { expected, .. } => Some(*expected),
        }
    }
}

/// Failures fetching a peer's chain. Always local to one peer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    #[error("peer {peer} unreachable: {reason}")]
    Unreachable { peer: String, reason: String },

    #[error("peer {peer} timed out")]
    Timeout { peer: String },

    #[error("peer {peer} sent a malformed response: {reason}")]
    MalformedResponse { peer: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_reports_block_index() {
        assert_eq!(ValidationError::EmptyChain.block_index(), None);
        assert_eq!(ValidationError::HashMismatch { index: 3 }.block_index(), Some(3));
        assert_eq!(
            ValidationError::UnderMined {
                index: 2,
                required: 4,
                actual: 1
            }
            .block_index(),
            Some(2)
        );
    }

    #[test]
    fn broken_link_message_names_block() {
        let msg = ValidationError::BrokenLink { index: 5 }.to_string();
        assert_eq!(
            msg,
            "block 5: previous_hash does not match the preceding block's hash"
        );
    }

    #[test]
    fn pow_cancellation_maps_to_ledger_error() {
        assert_eq!(LedgerError::from(PowError::Cancelled), LedgerError::Cancelled);
    }
}
