//! Ferrocoin Consensus Rules
//!
//! This crate decides what is allowed into the ledger. [`TxVerifier`] checks
//! a candidate transaction against the current UTXO state and reports its
//! fee; [`BlockVerifier`] checks a candidate block's proof of work, its
//! transactions, the coinbase conservation rule, and its linkage to the
//! current tip. Both verifiers are read-only over [`ChainState`]; applying
//! the effects of an accepted block is the chain engine's job.

use std::fmt;

use log::debug;
use thiserror::Error;

use ferrocoin_core::{Block, Input, Output};
use ferrocoin_crypto::Wallet;
use ferrocoin_storage::ChainState;

pub mod difficulty;

/// Why a transaction was rejected.
#[derive(Debug, Error)]
pub enum TxError {
    /// The referenced transaction or output index is unknown.
    #[error("Transaction output not found: {0}")]
    UnknownPrevTx(String),

    /// The referenced output is not in the owner's unspent set.
    #[error("Output of transaction already spent: {0}")]
    DoubleSpend(String),

    /// The input signature does not verify against the output's owner.
    #[error("Signature verification failed for input {0}")]
    BadSignature(String),

    /// Outputs claim more value than the inputs provide.
    #[error("Insufficient funds: inputs {inputs}, outputs {outputs}")]
    InsufficientFunds { inputs: u64, outputs: u64 },
}

/// How a structurally valid block fails to extend the current tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutOfChainKind {
    /// Block index does not advance past the tip.
    WrongIndex,
    /// Block's `prev_hash` is not the tip hash.
    WrongParent,
    /// Block timestamp precedes the tip timestamp.
    FromPast,
}

impl fmt::Display for OutOfChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutOfChainKind::WrongIndex => write!(f, "wrong index"),
            OutOfChainKind::WrongParent => write!(f, "wrong parent"),
            OutOfChainKind::FromPast => write!(f, "from the past"),
        }
    }
}

/// Why a block was rejected.
#[derive(Debug, Error)]
pub enum BlockError {
    /// Block hash is above the difficulty target.
    #[error("Block hash above difficulty target")]
    BadDifficulty,

    /// A transaction in the block is unacceptable: a non-coinbase
    /// transaction failed verification, the coinbase is missing, or a
    /// coinbase input appears outside the first transaction.
    #[error("Invalid transaction in block: {0}")]
    BadTx(String),

    /// The coinbase pays something other than reward plus fees.
    #[error("Wrong reward sum: expected {expected}, found {found}")]
    BadReward { expected: u64, found: u64 },

    /// The block is valid in isolation but does not extend the tip. The
    /// engine pattern-matches this variant to drive fork resolution.
    #[error("Block out of chain: {0}")]
    OutOfChain(OutOfChainKind),
}

impl From<TxError> for BlockError {
    fn from(err: TxError) -> Self {
        BlockError::BadTx(err.to_string())
    }
}

/// Validates candidate transactions against the current UTXO state.
pub struct TxVerifier<'a> {
    state: &'a ChainState,
}

impl<'a> TxVerifier<'a> {
    pub fn new(state: &'a ChainState) -> Self {
        TxVerifier { state }
    }

    /// Checks every input and the value balance; returns the fee.
    ///
    /// The coinbase sentinel is honored only at input position 0, where it
    /// contributes the mining reward. Anywhere else it falls through to the
    /// archive lookup and fails as [`TxError::UnknownPrevTx`]. Signatures
    /// are verified against the owner recorded on the referenced output,
    /// never against the address the input claims.
    pub fn verify(&self, inputs: &[Input], outputs: &[Output]) -> Result<u64, TxError> {
        let mut total_in: u64 = 0;

        for (i, inp) in inputs.iter().enumerate() {
            if i == 0 && inp.is_coinbase() {
                total_in += self.state.config.mining_reward;
                continue;
            }

            let prev_tx = self
                .state
                .transaction_by_hash
                .get(&inp.prev_tx_hash)
                .ok_or_else(|| TxError::UnknownPrevTx(inp.prev_tx_hash.clone()))?;
            let out = prev_tx
                .outputs
                .get(inp.output_index)
                .ok_or_else(|| TxError::UnknownPrevTx(inp.prev_tx_hash.clone()))?;

            let owner = out.address.to_string();
            if !self.state.is_unspent(&owner, &inp.prev_tx_hash, &out.hash) {
                return Err(TxError::DoubleSpend(out.hash.clone()));
            }

            if !Wallet::verify(inp.commitment().as_bytes(), &inp.signature, &out.address) {
                return Err(TxError::BadSignature(inp.to_string()));
            }

            total_in += out.amount;
        }

        let total_out: u64 = outputs.iter().map(|out| out.amount).sum();

        if total_in < total_out {
            return Err(TxError::InsufficientFunds {
                inputs: total_in,
                outputs: total_out,
            });
        }

        Ok(total_in - total_out)
    }
}

/// Validates candidate blocks before the engine mutates anything.
pub struct BlockVerifier<'a> {
    state: &'a ChainState,
}

impl<'a> BlockVerifier<'a> {
    pub fn new(state: &'a ChainState) -> Self {
        BlockVerifier { state }
    }

    /// Runs the full acceptance check against the current tip.
    ///
    /// Order matters: proof of work first, then the transactions, then
    /// coinbase conservation, and only last the linkage to `head`, so a
    /// fork candidate that fails linkage has already proven its work and
    /// internal consistency by the time the engine sees
    /// [`BlockError::OutOfChain`].
    pub fn verify(&self, head: Option<&Block>, block: &Block) -> Result<(), BlockError> {
        if !difficulty::meets_target(&block.hash(), self.state.config.difficulty) {
            return Err(BlockError::BadDifficulty);
        }

        if block.txs.is_empty() {
            return Err(BlockError::BadTx("missing coinbase".to_string()));
        }

        // Reward starts at the subsidy and accrues the fee of every
        // non-coinbase transaction.
        let mut expected_reward = self.state.config.mining_reward;
        let tx_verifier = TxVerifier::new(self.state);
        for tx in &block.txs[1..] {
            if tx.inputs.iter().any(Input::is_coinbase) {
                return Err(BlockError::BadTx(
                    "coinbase input outside the first transaction".to_string(),
                ));
            }
            expected_reward += tx_verifier.verify(&tx.inputs, &tx.outputs)?;
        }

        let found = block.txs[0].total_output_value();
        if expected_reward != found {
            return Err(BlockError::BadReward {
                expected: expected_reward,
                found,
            });
        }

        if let Some(head) = head {
            if head.index >= block.index {
                return Err(BlockError::OutOfChain(OutOfChainKind::WrongIndex));
            }
            if head.hash() != block.prev_hash {
                return Err(BlockError::OutOfChain(OutOfChainKind::WrongParent));
            }
            if head.timestamp > block.timestamp {
                return Err(BlockError::OutOfChain(OutOfChainKind::FromPast));
            }
        }

        debug!("block {} passed verification", block.index);
        Ok(())
    }
}
