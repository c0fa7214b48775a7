#![allow(dead_code)]

use longchain_core::pow::{seal, CancelToken};
use longchain_core::{Block, ChainSnapshot, Ledger, LedgerConfig, LedgerHandle, Transaction};

pub const DIFFICULTY: usize = 2;

pub fn config() -> LedgerConfig {
    LedgerConfig {
        difficulty: DIFFICULTY,
        mining_reward: 1.0,
    }
}

/// A valid ledger of `length` blocks, each mined block rewarding `miner`.
pub fn ledger_of_length(length: usize, miner: &str) -> Ledger {
    let mut ledger = Ledger::new(config()).expect("ledger");
    for i in 1..length {
        ledger.add_transaction("Alice", "Bob", i as f64);
        ledger.mine_pending(miner).expect("mine");
    }
    ledger
}

pub fn handle_of_length(length: usize, miner: &str) -> LedgerHandle {
    LedgerHandle::new(ledger_of_length(length, miner))
}

pub fn snapshot_of_length(length: usize, miner: &str) -> ChainSnapshot {
    ledger_of_length(length, miner).snapshot()
}

/// A length-`length` snapshot whose last block had an amount edited after
/// sealing.
pub fn tampered_snapshot(length: usize) -> ChainSnapshot {
    let mut snapshot = snapshot_of_length(length, "Mallory");
    let last = snapshot.chain.len() - 1;
    snapshot.chain[last].transactions[1].amount = 1_000_000.0;
    snapshot
}

/// Blocks whose hashes are self-consistent but miss the required prefix.
pub fn under_mined_snapshot(length: usize) -> ChainSnapshot {
    let mut chain = vec![Block::genesis()];
    for i in 1..length {
        let txs = vec![Transaction::transfer("Eve", "Mallory", 1.0)];
        let mut block = Block::new(i as u64, txs, chain[i - 1].hash.clone());
        while block.hash.starts_with("0") {
            block.nonce += 1;
            block.refresh_hash();
        }
        chain.push(block);
    }
    ChainSnapshot {
        length: chain.len() as u64,
        difficulty: 0,
        chain,
    }
}

/// Transfer-only blocks sealed by hand, with no reward transactions.
pub fn transfer_only_chain(transfers: &[(&str, &str, f64)]) -> Vec<Block> {
    let mut chain = vec![Block::genesis()];
    for (i, (from, to, amount)) in transfers.iter().enumerate() {
        let txs = vec![Transaction::transfer(*from, *to, *amount)];
        let candidate = Block::new(i as u64 + 1, txs, chain[i].hash.clone());
        chain.push(seal(candidate, DIFFICULTY, &CancelToken::new()).expect("seal"));
    }
    chain
}
