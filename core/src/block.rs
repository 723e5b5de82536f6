//! Block model for Ferrocoin
//!
//! A block is an ordered list of transactions plus the linkage and
//! proof-of-work fields. By convention `txs[0]` is the coinbase transaction
//! that pays the miner the block reward plus the included fees.

use std::fmt;

use serde::{Deserialize, Serialize};

use ferrocoin_crypto::sha256_hex;
use ferrocoin_util::{current_timestamp, format_timestamp};

use crate::Tx;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Height of the block; genesis is 0.
    pub index: u64,

    /// Proof-of-work counter found by mining.
    pub nonce: u64,

    /// Nanoseconds since the Unix epoch.
    pub timestamp: u64,

    /// Hash of the previous block, or `"0"` for genesis.
    pub prev_hash: String,

    /// Transactions; `txs[0]` is the coinbase.
    pub txs: Vec<Tx>,
}

impl Block {
    /// Assembles an unmined block (nonce 0) stamped with the current time.
    pub fn new(txs: Vec<Tx>, index: u64, prev_hash: impl Into<String>) -> Self {
        Block {
            index,
            nonce: 0,
            timestamp: current_timestamp(),
            prev_hash: prev_hash.into(),
            txs,
        }
    }

    /// Block hash at the block's recorded nonce.
    pub fn hash(&self) -> String {
        self.hash_with_nonce(self.nonce)
    }

    /// Block hash at an arbitrary nonce, used by the mining loop.
    pub fn hash_with_nonce(&self, nonce: u64) -> String {
        Self::hash_parts(
            self.index,
            nonce,
            self.timestamp,
            &self.prev_hash,
            &self.tx_digest(),
        )
    }

    /// Raw concatenation of every transaction hash.
    ///
    /// Hashing a block is `sha256(header fields ++ tx_digest)`; miners
    /// compute the digest once and feed it to [`Block::hash_parts`] for each
    /// nonce instead of rehashing every transaction per attempt.
    pub fn tx_digest(&self) -> String {
        self.txs.iter().map(|tx| tx.hash()).collect()
    }

    /// The block-hash rule: `sha256_hex(index ++ nonce ++ timestamp ++
    /// prev_hash ++ tx_digest)`, all fields as decimal strings, no
    /// delimiters. Bit-exact interop with peers depends on this layout.
    pub fn hash_parts(
        index: u64,
        nonce: u64,
        timestamp: u64,
        prev_hash: &str,
        tx_digest: &str,
    ) -> String {
        sha256_hex(format!("{index}{nonce}{timestamp}{prev_hash}{tx_digest}").as_bytes())
    }

    /// The coinbase transaction, absent only in malformed blocks.
    pub fn coinbase(&self) -> Option<&Tx> {
        self.txs.first()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block {{ index: {}, hash: {}, time: {}, txs: {} }}",
            self.index,
            &self.hash()[..8],
            format_timestamp(self.timestamp),
            self.txs.len()
        )
    }
}
