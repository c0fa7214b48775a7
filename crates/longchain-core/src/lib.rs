use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod consensus;
pub mod constants;
pub mod error;
pub mod handle;
pub mod ledger;
pub mod pow;
pub mod validation;

pub use consensus::{ConsensusResolver, PeerStatus, PeerTransport, Resolution};
pub use error::{LedgerError, PeerError, PowError, TransactionError, ValidationError};
pub use handle::LedgerHandle;
pub use ledger::{Ledger, LedgerConfig};
pub use pow::CancelToken;

use constants::{GENESIS_PREVIOUS_HASH, SYSTEM_SENDER};

pub type Hash = [u8; 32];

/// Seconds since the Unix epoch, with sub-second precision.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    #[default]
    Transfer,
    Reward,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Transfer => "transfer",
            TxKind::Reward => "reward",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
    pub timestamp: f64,
    #[serde(default)]
    pub kind: TxKind,
}

impl Transaction {
    pub fn transfer(sender: impl Into<String>, recipient: impl Into<String>, amount: f64) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            timestamp: now_secs(),
            kind: TxKind::Transfer,
        }
    }

    /// Credit `amount` to `recipient` from the system account.
    pub fn reward(recipient: impl Into<String>, amount: f64) -> Self {
        Self {
            sender: SYSTEM_SENDER.to_string(),
            recipient: recipient.into(),
            amount,
            timestamp: now_secs(),
            kind: TxKind::Reward,
        }
    }

    pub fn serialize(&self) -> Value {
        json!({
            "sender": self.sender,
            "recipient": self.recipient,
            "amount": self.amount,
            "timestamp": self.timestamp,
            "kind": self.kind.as_str(),
        })
    }
}

/// Boundary form of a submitted transaction; every field is required.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TransactionRequest {
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub amount: Option<f64>,
}

impl TransactionRequest {
    pub fn validate(self) -> Result<(String, String, f64), TransactionError> {
        let sender = self
            .sender
            .ok_or(TransactionError::Malformed { field: "sender" })?;
        let recipient = self
            .recipient
            .ok_or(TransactionError::Malformed { field: "recipient" })?;
        let amount = self
            .amount
            .ok_or(TransactionError::Malformed { field: "amount" })?;
        if !amount.is_finite() {
            return Err(TransactionError::NonFiniteAmount);
        }
        Ok((sender, recipient, amount))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: f64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    pub fn new(index: u64, transactions: Vec<Transaction>, previous_hash: impl Into<String>) -> Self {
        let mut block = Self {
            index,
            timestamp: now_secs(),
            transactions,
            previous_hash: previous_hash.into(),
            nonce: 0,
            hash: String::new(),
        };
        block.refresh_hash();
        block
    }

    /// A transaction-free block 0 pointing at the `"0"` sentinel.
    pub fn genesis() -> Self {
        Self::new(0, Vec::new(), GENESIS_PREVIOUS_HASH)
    }

    pub fn calculate_hash(&self) -> String {
        hex::encode(Preimage::new(self).digest(self.nonce))
    }

    pub fn refresh_hash(&mut self) {
        self.hash = self.calculate_hash();
    }

    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        pow::count_leading_zero_chars(&self.hash) >= difficulty
    }

    pub fn serialize(&self) -> Value {
        json!({
            "index": self.index,
            "timestamp": self.timestamp,
            "transactions": self.transactions.iter().map(Transaction::serialize).collect::<Vec<_>>(),
            "previous_hash": self.previous_hash,
            "nonce": self.nonce,
            "hash": self.hash,
        })
    }

    /// Canonical hash input: compact JSON of every field except `hash`, keys
    /// sorted at every level.
    pub fn canonical_preimage(&self) -> String {
        let mut out = Preimage::new(self);
        let mut bytes = out.prefix.clone();
        let _ = write!(bytes, "{}", self.nonce);
        bytes.append(&mut out.suffix);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Canonical preimage split around the nonce so the search only re-formats
/// the digits that change.
///
/// serde_json's default `Map` is key-ordered, so `json!` objects serialize
/// with sorted keys. The top-level keys sort as `index`, `nonce`,
/// `previous_hash`, `timestamp`, `transactions`, which puts the nonce right
/// after the index.
#[derive(Clone)]
pub(crate) struct Preimage {
    prefix: Vec<u8>,
    suffix: Vec<u8>,
    state: Sha256,
}

impl Preimage {
    pub(crate) fn new(block: &Block) -> Self {
        let prefix = format!("{{\"index\":{},\"nonce\":", block.index).into_bytes();
        let rest = json!({
            "previous_hash": block.previous_hash,
            "timestamp": block.timestamp,
            "transactions": block.transactions.iter().map(Transaction::serialize).collect::<Vec<_>>(),
        })
        .to_string();
        let mut suffix = Vec::with_capacity(rest.len());
        suffix.push(b',');
        suffix.extend_from_slice(rest.get(1..).unwrap_or_default().as_bytes());

        let mut state = Sha256::new();
        state.update(&prefix);
        Self {
            prefix,
            suffix,
            state,
        }
    }

    pub(crate) fn digest(&self, nonce: u64) -> Hash {
        let mut digits = [0u8; 20];
        let len = {
            let mut cursor = &mut digits[..];
            let before = cursor.len();
            let _ = write!(cursor, "{nonce}");
            before - cursor.len()
        };
        let mut hasher = self.state.clone();
        hasher.update(&digits[..len]);
        hasher.update(&self.suffix);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest[..]);
        out
    }
}

/// Wire form of a whole chain, as served to and consumed from peers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub length: u64,
    pub difficulty: usize,
    pub chain: Vec<Block>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn alice_bob() -> Vec<Transaction> {
        vec![
            Transaction {
                sender: "Alice".to_string(),
                recipient: "Bob".to_string(),
                amount: 10.0,
                timestamp: 1_600_000_000.0,
                kind: TxKind::Transfer,
            },
            Transaction {
                sender: "Bob".to_string(),
                recipient: "Charlie".to_string(),
                amount: 5.5,
                timestamp: 1_600_000_100.5,
                kind: TxKind::Transfer,
            },
        ]
    }

    fn fixed_block() -> Block {
        let mut block = Block::new(1, alice_bob(), "ab".repeat(32));
        block.timestamp = 1_600_000_200.25;
        block.refresh_hash();
        block
    }

    #[test]
    fn genesis_block_example() {
        let genesis = Block::genesis();
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.previous_hash, "0");
        assert_eq!(genesis.nonce, 0);
        assert!(genesis.transactions.is_empty());
        assert!(genesis.has_valid_hash());
        assert_eq!(genesis.hash.len(), constants::HASH_HEX_SIZE);
    }

    #[test]
    fn canonical_preimage_sorts_keys() {
        let block = fixed_block();
        let expected = format!(
            concat!(
                r#"{{"index":1,"nonce":0,"previous_hash":"{}","timestamp":1600000200.25,"transactions":["#,
                r#"{{"amount":10.0,"kind":"transfer","recipient":"Bob","sender":"Alice","timestamp":1600000000.0}},"#,
                r#"{{"amount":5.5,"kind":"transfer","recipient":"Charlie","sender":"Bob","timestamp":1600000100.5}}]}}"#
            ),
            "ab".repeat(32)
        );
        assert_eq!(block.canonical_preimage(), expected);
    }

    #[test]
    fn block_hash_is_sha256_of_canonical_preimage() {
        let block = fixed_block();
        let full = json!({
            "index": block.index,
            "nonce": block.nonce,
            "previous_hash": block.previous_hash,
            "timestamp": block.timestamp,
            "transactions": block.transactions.iter().map(Transaction::serialize).collect::<Vec<_>>(),
        })
        .to_string();
        let expected = hex::encode(Sha256::digest(full.as_bytes()));
        assert_eq!(block.calculate_hash(), expected);
        assert_eq!(block.hash, expected);
    }

    #[test]
    fn preimage_digest_matches_recomputed_hash_for_any_nonce() {
        let mut block = fixed_block();
        let preimage = Preimage::new(&block);
        for nonce in [0u64, 1, 9, 10, 12_345, u64::MAX] {
            block.nonce = nonce;
            assert_eq!(hex::encode(preimage.digest(nonce)), block.calculate_hash());
        }
    }

    #[test]
    fn block_hash_consistency() {
        let block = fixed_block();
        assert_eq!(block.calculate_hash(), block.calculate_hash());
        assert_eq!(block.clone().calculate_hash(), block.hash);
    }

    #[test]
    fn block_hash_changes_with_nonce() {
        let mut block = fixed_block();
        let hash1 = block.calculate_hash();
        block.nonce += 1;
        assert_ne!(hash1, block.calculate_hash());
    }

    #[test]
    fn block_hash_changes_with_transaction_order() {
        let mut block = fixed_block();
        let hash1 = block.calculate_hash();
        block.transactions.reverse();
        assert_ne!(hash1, block.calculate_hash());
    }

    #[test]
    fn block_inequality() {
        let block1 = Block::new(1, alice_bob(), "0");
        sleep(std::time::Duration::from_millis(5));
        let block2 = Block::new(1, alice_bob(), "0");
        assert_ne!(block1.hash, block2.hash);
    }

    #[test]
    fn tampered_amount_breaks_hash() {
        let mut block = fixed_block();
        block.transactions[0].amount = 1_000.0;
        assert!(!block.has_valid_hash());
    }

    #[test]
    fn transaction_serialization_example() {
        let tx = Transaction {
            sender: "Alice".to_string(),
            recipient: "Bob".to_string(),
            amount: -10.25,
            timestamp: 1_600_000_000.5,
            kind: TxKind::Reward,
        };
        let json = serde_json::to_string(&tx).unwrap();
        let expected_json = r#"{"sender":"Alice","recipient":"Bob","amount":-10.25,"timestamp":1600000000.5,"kind":"reward"}"#;
        assert_eq!(json, expected_json);
        let deserialized: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(tx, deserialized);
    }

    #[test]
    fn transaction_kind_defaults_to_transfer() {
        let tx: Transaction = serde_json::from_str(
            r#"{"sender":"a","recipient":"b","amount":3,"timestamp":1.5}"#,
        )
        .unwrap();
        assert_eq!(tx.kind, TxKind::Transfer);
    }

    #[test]
    fn reward_transaction_comes_from_system() {
        let tx = Transaction::reward("M1", 1.0);
        assert_eq!(tx.sender, SYSTEM_SENDER);
        assert_eq!(tx.kind, TxKind::Reward);
        assert!(tx.timestamp > 0.0);
    }

    #[test]
    fn block_serialize_keeps_every_field() {
        let block = fixed_block();
        let value = block.serialize();
        assert_eq!(value["index"], 1);
        assert_eq!(value["nonce"], 0);
        assert_eq!(value["hash"], block.hash.as_str());
        assert_eq!(value["previous_hash"], block.previous_hash.as_str());
        assert_eq!(value["transactions"][1]["recipient"], "Charlie");
        assert_eq!(value["transactions"][0]["kind"], "transfer");

        let back: Block = serde_json::from_value(value).unwrap();
        assert_eq!(back, block);
        assert!(back.has_valid_hash());
    }

    #[test]
    fn deserialized_block_keeps_reported_hash() {
        let mut value = fixed_block().serialize();
        value["hash"] = json!("00ff");
        let block: Block = serde_json::from_value(value).unwrap();
        assert_eq!(block.hash, "00ff");
        assert!(!block.has_valid_hash());
    }

    #[test]
    fn transaction_request_reports_missing_field() {
        let req: TransactionRequest =
            serde_json::from_str(r#"{"sender":"Alice","amount":5}"#).unwrap();
        assert_eq!(
            req.validate(),
            Err(TransactionError::Malformed { field: "recipient" })
        );

        let req: TransactionRequest =
            serde_json::from_str(r#"{"sender":"Alice","recipient":"Bob","amount":5}"#).unwrap();
        assert_eq!(
            req.validate(),
            Ok(("Alice".to_string(), "Bob".to_string(), 5.0))
        );
    }

    #[test]
    fn fractional_amounts_are_accepted() {
        let tx: Transaction = serde_json::from_str(
            r#"{"sender":"a","recipient":"b","amount":12.5,"timestamp":1.0,"kind":"transfer"}"#,
        )
        .unwrap();
        assert_eq!(tx.amount, 12.5);

        let req: TransactionRequest =
            serde_json::from_str(r#"{"sender":"a","recipient":"b","amount":0.1}"#).unwrap();
        assert_eq!(req.validate().unwrap().2, 0.1);
    }

    #[test]
    fn non_finite_amount_is_rejected() {
        let req = TransactionRequest {
            sender: Some("a".to_string()),
            recipient: Some("b".to_string()),
            amount: Some(f64::NAN),
        };
        assert_eq!(req.validate(), Err(TransactionError::NonFiniteAmount));
    }
}
