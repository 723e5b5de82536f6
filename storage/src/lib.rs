//! Ferrocoin Chain State Storage
//!
//! This crate holds the mutable ground truth derived from the chain: the
//! append-only transaction archive, the two unspent-output indexes, and the
//! chain configuration. The chain engine mutates a [`ChainState`] as blocks
//! are applied and reverted; [`SnapshotStore`] persists the whole state as a
//! JSON blob keyed by block index.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod snapshot;

use ferrocoin_core::{Output, Tx};

pub use snapshot::SnapshotStore;

/// Storage error types
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Consensus and mining parameters shared by every node on a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Upper bound on non-coinbase transactions per mined block.
    pub txs_per_block: usize,

    /// Reward minted by each block's coinbase transaction.
    pub mining_reward: u64,

    /// Proof-of-work difficulty: a block hash read as a 256-bit big-endian
    /// integer must be at most `2^(256 - difficulty)`.
    pub difficulty: u32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            txs_per_block: 4,
            mining_reward: 25,
            difficulty: 22,
        }
    }
}

/// The UTXO state derived from the chain, plus the transaction archive.
///
/// Two invariants tie the maps together after every block application and
/// every revert:
///
/// * every `(tx_hash, out_hash)` pair tracked for an address has a matching
///   amount entry, and vice versa;
/// * the archive only ever grows: reverting a block never deletes the
///   transactions it carried, because fork resolution may need to re-apply
///   them.
///
/// Empty per-address sets and maps are pruned on spend so that two states
/// with the same unspent outputs compare equal structurally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainState {
    pub config: ChainConfig,

    /// Index of the current tip (0 both before genesis and at genesis; the
    /// chain itself is the authority on whether genesis exists).
    pub block_index: u64,

    /// Append-only archive of every transaction ever admitted, keyed by
    /// content hash. Transactions land here already at mempool admission;
    /// whether an output is spendable is tracked by the unspent maps alone.
    pub transaction_by_hash: HashMap<String, Tx>,

    /// `address -> {(tx_hash, out_hash)}`: which outputs an address can spend.
    pub unspent_txs_by_user_hash: HashMap<String, HashSet<(String, String)>>,

    /// `address -> out_hash -> amount`: the value behind each spendable output.
    pub unspent_outputs_amount: HashMap<String, HashMap<String, u64>>,
}

impl ChainState {
    pub fn new(config: ChainConfig) -> Self {
        ChainState {
            config,
            block_index: 0,
            transaction_by_hash: HashMap::new(),
            unspent_txs_by_user_hash: HashMap::new(),
            unspent_outputs_amount: HashMap::new(),
        }
    }

    /// Records a transaction in the archive.
    pub fn archive_tx(&mut self, tx: &Tx) {
        self.transaction_by_hash.insert(tx.hash(), tx.clone());
    }

    pub fn is_archived(&self, tx_hash: &str) -> bool {
        self.transaction_by_hash.contains_key(tx_hash)
    }

    /// Marks an output spendable by its owner.
    pub fn credit_output(&mut self, tx_hash: &str, out: &Output) {
        let owner = out.address.to_string();
        self.unspent_txs_by_user_hash
            .entry(owner.clone())
            .or_default()
            .insert((tx_hash.to_string(), out.hash.clone()));
        self.unspent_outputs_amount
            .entry(owner)
            .or_default()
            .insert(out.hash.clone(), out.amount);
    }

    /// Removes an output from its owner's spendable set, pruning emptied
    /// per-address entries.
    pub fn spend_output(&mut self, owner: &str, tx_hash: &str, out_hash: &str) {
        if let Some(pairs) = self.unspent_txs_by_user_hash.get_mut(owner) {
            pairs.remove(&(tx_hash.to_string(), out_hash.to_string()));
            if pairs.is_empty() {
                self.unspent_txs_by_user_hash.remove(owner);
            }
        }
        if let Some(amounts) = self.unspent_outputs_amount.get_mut(owner) {
            amounts.remove(out_hash);
            if amounts.is_empty() {
                self.unspent_outputs_amount.remove(owner);
            }
        }
    }

    /// True when `owner` can still spend the given output.
    pub fn is_unspent(&self, owner: &str, tx_hash: &str, out_hash: &str) -> bool {
        self.unspent_txs_by_user_hash
            .get(owner)
            .map_or(false, |pairs| {
                pairs.contains(&(tx_hash.to_string(), out_hash.to_string()))
            })
    }

    /// Sum of every output an address can spend.
    pub fn balance(&self, owner: &str) -> u64 {
        self.unspent_outputs_amount
            .get(owner)
            .map_or(0, |amounts| amounts.values().sum())
    }

    /// Sum of every unspent output in the system. With coinbase as the only
    /// value source this equals `mining_reward * (block_index + 1)` after
    /// every block application.
    pub fn total_unspent(&self) -> u64 {
        self.unspent_outputs_amount
            .values()
            .flat_map(|amounts| amounts.values())
            .sum()
    }
}

impl Default for ChainState {
    fn default() -> Self {
        ChainState::new(ChainConfig::default())
    }
}
