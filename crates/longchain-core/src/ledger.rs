use crate::constants::{
    DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD, GENESIS_PREVIOUS_HASH, MAX_DIFFICULTY,
};
use crate::pow::{self, CancelToken};
use crate::validation;
use crate::{Block, ChainSnapshot, LedgerError, Transaction, ValidationError};
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LedgerConfig {
    /// Leading hex zeros required on every sealed block hash.
    pub difficulty: usize,
    /// Amount credited to whoever seals a block.
    pub mining_reward: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            mining_reward: DEFAULT_MINING_REWARD,
        }
    }
}

impl LedgerConfig {
    pub fn check(&self) -> Result<(), LedgerError> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::DifficultyTooHigh {
                requested: self.difficulty,
                max: MAX_DIFFICULTY,
            });
        }
        if !self.mining_reward.is_finite() {
            return Err(LedgerError::InvalidReward);
        }
        Ok(())
    }
}

/// An unsealed block built from a snapshot of the pending pool, together with
/// what the ledger looked like when the snapshot was taken.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub block: Block,
    pub difficulty: usize,
    /// Number of pending transactions folded into `block`, reward excluded.
    pub drained: usize,
}

/// Ordered sealed blocks plus the pool of transactions awaiting inclusion.
#[derive(Clone, Debug)]
pub struct Ledger {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
    config: LedgerConfig,
}

impl Ledger {
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        config.check()?;
        let genesis = Block::genesis();
        info!(difficulty = config.difficulty, "genesis block {}", genesis.hash);
        Ok(Self {
            chain: vec![genesis],
            pending: Vec::new(),
            config,
        })
    }

    /// Rebuild a ledger from raw blocks exactly as reported. Nothing is
    /// recomputed or checked; run [`Ledger::validate`] before trusting it.
    pub fn from_chain(chain: Vec<Block>, config: LedgerConfig) -> Self {
        Self {
            chain,
            pending: Vec::new(),
            config,
        }
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn into_chain(self) -> Vec<Block> {
        self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn latest_block(&self) -> Option<&Block> {
        self.chain.last()
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn difficulty(&self) -> usize {
        self.config.difficulty
    }

    pub fn mining_reward(&self) -> f64 {
        self.config.mining_reward
    }

    pub fn config(&self) -> LedgerConfig {
        self.config
    }

    /// Queue a transfer and return the index of the block that will hold it.
    /// Balances are not checked, so accounts may go negative.
    pub fn add_transaction(
        &mut self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: f64,
    ) -> u64 {
        self.pending
            .push(Transaction::transfer(sender, recipient, amount));
        self.chain.len() as u64
    }

    /// Seal every pending transaction into the next block, with the reward for
    /// `miner` in front. The pool is left untouched on failure.
    pub fn mine_pending(&mut self, miner: &str) -> Result<&Block, LedgerError> {
        let candidate = self.prepare_candidate(miner)?;
        let sealed = pow::seal(candidate.block, candidate.difficulty, &CancelToken::new())?;
        self.commit(sealed, candidate.drained)
    }

    pub fn prepare_candidate(&self, miner: &str) -> Result<Candidate, LedgerError> {
        if self.pending.is_empty() {
            return Err(LedgerError::EmptyPool);
        }
        let previous_hash = self
            .chain
            .last()
            .map(|b| b.hash.clone())
            .unwrap_or_else(|| GENESIS_PREVIOUS_HASH.to_string());

        let mut transactions = Vec::with_capacity(self.pending.len() + 1);
        transactions.push(Transaction::reward(miner, self.config.mining_reward));
        transactions.extend(self.pending.iter().cloned());

        Ok(Candidate {
            block: Block::new(self.chain.len() as u64, transactions, previous_hash),
            difficulty: self.config.difficulty,
            drained: self.pending.len(),
        })
    }

    /// Append a sealed candidate and drop the `drained` transactions it
    /// consumed from the front of the pool. Fails with `Stale` if the tip
    /// moved since the candidate was prepared.
    pub fn commit(&mut self, sealed: Block, drained: usize) -> Result<&Block, LedgerError> {
        let tip_matches = self
            .chain
            .last()
            .is_some_and(|tip| tip.hash == sealed.previous_hash);
        if sealed.index != self.chain.len() as u64 || !tip_matches {
            return Err(LedgerError::Stale {
                index: sealed.index,
            });
        }

        let drained = drained.min(self.pending.len());
        self.pending.drain(..drained);
        info!(
            index = sealed.index,
            txs = sealed.transactions.len(),
            "appended block {}",
            sealed.hash
        );
        let position = self.chain.len();
        self.chain.push(sealed);
        Ok(&self.chain[position])
    }

    /// Replay the whole chain: credits as recipient minus debits as sender.
    pub fn balance_of(&self, address: &str) -> f64 {
        let mut balance = 0.0;
        for tx in self.chain.iter().flat_map(|b| b.transactions.iter()) {
            if tx.recipient == address {
                balance += tx.amount;
            }
            if tx.sender == address {
                balance -= tx.amount;
            }
        }
        balance
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_chain(&self.chain, self.config.difficulty)
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Swap in a new chain wholesale. The pending pool and config stay.
    pub fn replace_chain(&mut self, chain: Vec<Block>) {
        info!(
            from = self.chain.len(),
            to = chain.len(),
            "replacing local chain"
        );
        self.chain = chain;
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            length: self.chain.len() as u64,
            difficulty: self.config.difficulty,
            chain: self.chain.clone(),
        }
    }
}
