//! Ferrocoin Query Facade
//!
//! The read-and-submit surface the external service layer (HTTP, RPC,
//! whatever transport the node grows) talks to. Queries are projections over
//! the engine's current state; submissions deserialize wire models at the
//! boundary and pass through to the engine.
//!
//! The facade holds the engine behind a mutex and keeps the lock for the
//! duration of each call, so every read observes a consistent state and
//! every write is serialized against all other engine operations.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;

use ferrocoin_chain::ChainEngine;
use ferrocoin_consensus::TxError;
use ferrocoin_core::{Block, Tx};
use ferrocoin_crypto::Address;

pub mod models;

pub use models::{BlockModel, InputModel, OutputModel, TxModel};

/// Default page size for [`Api::chain_slice`].
pub const DEFAULT_CHAIN_LIMIT: usize = 20;

/// Errors surfaced at the facade boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A wire payload failed to decode into core types.
    #[error("Malformed payload: {0}")]
    Decode(String),

    /// A submitted transaction failed verification.
    #[error(transparent)]
    Tx(#[from] TxError),
}

/// One spendable output, joined against the archive for its output index.
#[derive(Debug, Clone, Serialize)]
pub struct UnspentOutput {
    pub tx: String,
    pub output_index: usize,
    pub out_hash: String,
    pub amount: u64,
}

/// Shared handle over the chain engine.
pub struct Api {
    engine: Arc<Mutex<ChainEngine>>,
}

impl Api {
    pub fn new(engine: ChainEngine) -> Self {
        Api {
            engine: Arc::new(Mutex::new(engine)),
        }
    }

    /// A clone of the underlying engine handle, for transports that need to
    /// share it.
    pub fn handle(&self) -> Arc<Mutex<ChainEngine>> {
        self.engine.clone()
    }

    /// Sum of everything `address` can spend.
    pub fn balance(&self, address: &Address) -> u64 {
        let engine = self.engine.lock().unwrap();
        engine.state().balance(&address.to_string())
    }

    /// Every spendable output of `address`, with the output index recovered
    /// from the archived parent transaction.
    pub fn unspent_outputs(&self, address: &Address) -> Vec<UnspentOutput> {
        let engine = self.engine.lock().unwrap();
        let state = engine.state();
        let owner = address.to_string();

        let mut result = Vec::new();
        let Some(pairs) = state.unspent_txs_by_user_hash.get(&owner) else {
            return result;
        };
        for (tx_hash, out_hash) in pairs {
            let amount = state
                .unspent_outputs_amount
                .get(&owner)
                .and_then(|amounts| amounts.get(out_hash))
                .copied()
                .unwrap_or(0);
            if let Some(tx) = state.transaction_by_hash.get(tx_hash) {
                for (output_index, out) in tx.outputs.iter().enumerate() {
                    if out.hash == *out_hash {
                        result.push(UnspentOutput {
                            tx: tx_hash.clone(),
                            output_index,
                            out_hash: out_hash.clone(),
                            amount,
                        });
                    }
                }
            }
        }
        result
    }

    /// A slice of the chain starting at `from`, padded with any current fork
    /// candidates when the slice comes up short of `limit`.
    pub fn chain_slice(&self, from: usize, limit: usize) -> Vec<BlockModel> {
        let engine = self.engine.lock().unwrap();
        let chain = engine.chain();
        let end = chain.len().min(from.saturating_add(limit));
        let mut result: Vec<BlockModel> = if from < end {
            chain[from..end].iter().map(BlockModel::from).collect()
        } else {
            Vec::new()
        };
        if result.len() < limit {
            result.extend(engine.fork_blocks().values().map(BlockModel::from));
        }
        result
    }

    /// The current tip, if the chain has one.
    pub fn head(&self) -> Option<BlockModel> {
        let engine = self.engine.lock().unwrap();
        engine.head().map(BlockModel::from)
    }

    /// Decodes and submits a block received from a peer.
    pub fn submit_block(&self, model: BlockModel) -> Result<bool, ApiError> {
        let block = Block::try_from(model)?;
        Ok(self.engine.lock().unwrap().add_block(block))
    }

    /// Decodes and submits a transaction for mempool admission.
    pub fn submit_tx(&self, model: TxModel) -> Result<bool, ApiError> {
        let tx = Tx::try_from(model)?;
        Ok(self.engine.lock().unwrap().add_tx(tx)?)
    }

    /// Mines the next block out of the mempool; see
    /// [`ChainEngine::force_block`].
    pub fn mine<F: Fn() -> bool>(&self, should_stop: F) -> bool {
        self.engine.lock().unwrap().force_block(should_stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrocoin_core::{Input, Output};
    use ferrocoin_crypto::Wallet;
    use ferrocoin_storage::ChainConfig;

    fn test_api() -> (Api, Wallet) {
        let config = ChainConfig {
            txs_per_block: 4,
            mining_reward: 25,
            difficulty: 12,
        };
        let wallet = Wallet::create();
        let mut engine = ChainEngine::new(config, wallet.clone());
        engine.create_genesis_block();
        (Api::new(engine), wallet)
    }

    #[test]
    fn test_balance_and_unspent_after_genesis() {
        let (api, wallet) = test_api();
        assert_eq!(api.balance(&wallet.address()), 25);

        let unspent = api.unspent_outputs(&wallet.address());
        assert_eq!(unspent.len(), 1);
        assert_eq!(unspent[0].output_index, 0);
        assert_eq!(unspent[0].amount, 25);

        let stranger = Wallet::create();
        assert_eq!(api.balance(&stranger.address()), 0);
        assert!(api.unspent_outputs(&stranger.address()).is_empty());
    }

    #[test]
    fn test_head_and_chain_slice() {
        let (api, _) = test_api();
        let head = api.head().unwrap();
        assert_eq!(head.index, 0);

        assert!(api.mine(|| false));
        let slice = api.chain_slice(0, DEFAULT_CHAIN_LIMIT);
        assert_eq!(slice.len(), 2);
        assert_eq!(slice[1].prev_hash, {
            let genesis = Block::try_from(slice[0].clone()).unwrap();
            genesis.hash()
        });

        assert!(api.chain_slice(5, DEFAULT_CHAIN_LIMIT).is_empty());
    }

    #[test]
    fn test_submit_tx_round_trip() {
        let (api, wallet) = test_api();
        let head = api.head().unwrap();
        let coinbase = Tx::try_from(head.txs[0].clone()).unwrap();

        let mut inp = Input::new(coinbase.hash(), 0, wallet.address(), 0);
        inp.sign(&wallet);
        let recipient = Wallet::create();
        let tx = Tx::new(vec![inp], vec![Output::new(recipient.address(), 20, 0)]);

        assert!(api.submit_tx(TxModel::from(&tx)).unwrap());
        // A second submission of the same payload is a silent drop.
        assert!(!api.submit_tx(TxModel::from(&tx)).unwrap());

        assert!(api.mine(|| false));
        assert_eq!(api.balance(&recipient.address()), 20);
    }

    #[test]
    fn test_submit_duplicate_block_reports_false() {
        let (api, _) = test_api();
        let head = api.head().unwrap();
        assert!(!api.submit_block(head).unwrap());
    }

    #[test]
    fn test_submit_rejects_malformed_payloads() {
        let (api, _) = test_api();
        let mut head = api.head().unwrap();
        head.txs[0].inputs[0].address = "???".to_string();
        assert!(matches!(api.submit_block(head), Err(ApiError::Decode(_))));
    }
}
