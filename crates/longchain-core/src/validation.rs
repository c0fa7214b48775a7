use crate::constants::GENESIS_PREVIOUS_HASH;
use crate::pow::count_leading_zero_chars;
use crate::{Block, ValidationError};
use tracing::{debug, warn};

/// Walk `chain` and check every structural invariant, stopping at the first
/// failure.
///
/// Genesis must sit at index 0 on the `"0"` sentinel and hash to itself. It is
/// exempt from the link and difficulty checks. Every later block is checked for
/// tampered content, then its link to the predecessor, then its proof of work,
/// then its position.
pub fn validate_chain(chain: &[Block], difficulty: usize) -> Result<(), ValidationError> {
    let result = walk(chain, difficulty);
    match &result {
        Ok(()) => debug!(length = chain.len(), "chain valid"),
        Err(err) => warn!(length = chain.len(), "chain rejected: {err}"),
    }
    result
}

pub fn is_valid(chain: &[Block], difficulty: usize) -> bool {
    validate_chain(chain, difficulty).is_ok()
}

fn walk(chain: &[Block], difficulty: usize) -> Result<(), ValidationError> {
    let genesis = chain.first().ok_or(ValidationError::EmptyChain)?;
    if genesis.index != 0 {
        return Err(ValidationError::InvalidGenesis {
            reason: format!("index is {}", genesis.index),
        });
    }
    if genesis.previous_hash != GENESIS_PREVIOUS_HASH {
        return Err(ValidationError::InvalidGenesis {
            reason: format!("previous_hash is {:?}", genesis.previous_hash),
        });
    }
    if !genesis.has_valid_hash() {
        return Err(ValidationError::HashMismatch { index: 0 });
    }

    for (i, pair) in chain.windows(2).enumerate() {
        let (previous, current) = (&pair[0], &pair[1]);
        let index = i + 1;

        if !current.has_valid_hash() {
            return Err(ValidationError::HashMismatch { index });
        }
        if current.previous_hash != previous.hash {
            return Err(ValidationError::BrokenLink { index });
        }
        let actual = count_leading_zero_chars(&current.hash);
        if actual < difficulty {
            return Err(ValidationError::UnderMined {
                index,
                required: difficulty,
                actual,
            });
        }
        if current.index != index as u64 {
            return Err(ValidationError::IndexMismatch {
                expected: index,
                actual: current.index,
            });
        }
    }
    Ok(())
}
