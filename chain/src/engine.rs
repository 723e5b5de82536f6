//! The chain engine
//!
//! [`ChainEngine`] ties the verifiers, the UTXO state, and the node wallet
//! together. Blocks enter either through mining ([`ChainEngine::force_block`])
//! or from a peer ([`ChainEngine::add_block`]); both paths go through the
//! block verifier and, on success, through forward application.
//! [`ChainEngine::revert_tip`] is the exact inverse of forward application
//! on the unspent maps; the transaction archive is append-only and survives
//! reverts, which is what lets fork resolution re-apply a competing branch.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::{debug, error, info, warn};

use ferrocoin_consensus::{difficulty, BlockError, BlockVerifier, OutOfChainKind, TxError, TxVerifier};
use ferrocoin_core::{Block, Input, Output, Tx};
use ferrocoin_crypto::Wallet;
use ferrocoin_storage::{ChainConfig, ChainState};

/// Upper bound on the proof-of-work search space.
pub const MAX_NONCE: u64 = 1 << 32;

/// The single owner of the chain, the mempool, and the derived UTXO state.
pub struct ChainEngine {
    /// Accepted blocks in order; `chain[0]` is genesis.
    chain: Vec<Block>,

    /// Verified-but-unmined transactions as `(fee, tx_hash)`. The ordered
    /// set gives fee-descending selection a deterministic tie-break on the
    /// hash.
    unconfirmed_transactions: BTreeSet<(u64, String)>,

    /// The mempool slice tentatively included in the block being mined.
    current_block_transactions: HashSet<(u64, String)>,

    /// Proven siblings of the current tip, by block hash. The narrow
    /// split-brain case: adopt a sibling's child when one arrives.
    fork_blocks: HashMap<String, Block>,

    state: ChainState,

    /// The wallet coinbase rewards are paid to.
    wallet: Wallet,
}

impl ChainEngine {
    pub fn new(config: ChainConfig, wallet: Wallet) -> Self {
        Self::from_state(ChainState::new(config), wallet)
    }

    /// Builds an engine around a restored state snapshot. The block list
    /// itself is not part of a snapshot; blocks are re-synced from peers.
    pub fn from_state(state: ChainState, wallet: Wallet) -> Self {
        ChainEngine {
            chain: Vec::new(),
            unconfirmed_transactions: BTreeSet::new(),
            current_block_transactions: HashSet::new(),
            fork_blocks: HashMap::new(),
            state,
            wallet,
        }
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn head(&self) -> Option<&Block> {
        self.chain.last()
    }

    pub fn fork_blocks(&self) -> &HashMap<String, Block> {
        &self.fork_blocks
    }

    pub fn mempool(&self) -> &BTreeSet<(u64, String)> {
        &self.unconfirmed_transactions
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// Mines the first block in the chain: a lone coinbase on top of the
    /// all-zero parent.
    pub fn create_genesis_block(&mut self) -> bool {
        let tx = self.coinbase_tx(0);
        let block = Block::new(vec![tx], 0, "0");
        self.mine(block, || false)
    }

    /// Builds the coinbase transaction paying this node's wallet the mining
    /// reward plus the fees collected from the included transactions.
    fn coinbase_tx(&self, fees: u64) -> Tx {
        let mut inp = Input::coinbase(self.wallet.address());
        inp.sign(&self.wallet);
        let out = Output::new(
            self.wallet.address(),
            self.state.config.mining_reward + fees,
            0,
        );
        Tx::new(vec![inp], vec![out])
    }

    /// Admits a transaction into the mempool.
    ///
    /// Already-archived transactions are dropped (`Ok(false)`). A verified
    /// transaction is archived immediately, before it is ever mined: the
    /// mempool itself only holds `(fee, hash)` pairs and block assembly
    /// materializes the bodies from the archive.
    pub fn add_tx(&mut self, tx: Tx) -> Result<bool, TxError> {
        let tx_hash = tx.hash();
        if self.state.is_archived(&tx_hash) {
            debug!("transaction {} already known, dropping", &tx_hash[..8]);
            return Ok(false);
        }
        let fee = TxVerifier::new(&self.state).verify(&tx.inputs, &tx.outputs)?;
        self.state.transaction_by_hash.insert(tx_hash.clone(), tx);
        self.unconfirmed_transactions.insert((fee, tx_hash));
        Ok(true)
    }

    /// Runs block acceptance: verification, the two narrow fork cases, and
    /// forward application.
    ///
    /// Returns `true` only when the chain strictly advanced, either by a
    /// plain append or by a completed reorganization. Verifier failures are
    /// logged and reported as `false`.
    pub fn add_block(&mut self, block: Block) -> bool {
        if let Some(head) = self.head() {
            if head.hash() == block.hash() {
                warn!("duplicate of the current tip, dropping");
                return false;
            }
        }

        match BlockVerifier::new(&self.state).verify(self.head(), &block) {
            Ok(()) => {
                self.apply_block(&block);
                info!("block {} appended to the chain", block.index);
                self.chain.push(block);
                self.fork_blocks.clear();
                true
            }
            Err(BlockError::OutOfChain(kind)) => self.resolve_fork(block, kind),
            Err(err) => {
                error!("block verification failed: {err}");
                false
            }
        }
    }

    /// Handles a block that proved its work but does not extend the tip.
    ///
    /// Exactly two shapes are recoverable: a sibling of the tip (recorded
    /// for later) and a child of a recorded sibling (the competing branch is
    /// now longer: revert the tip and adopt both blocks). Anything deeper
    /// is logged and dropped.
    fn resolve_fork(&mut self, block: Block, kind: OutOfChainKind) -> bool {
        let Some(head) = self.chain.last() else {
            error!("out-of-chain block ({kind}) before genesis, dropping");
            return false;
        };

        if block.prev_hash == head.prev_hash {
            warn!(
                "split brain detected: {} competes with the tip",
                &block.hash()[..8]
            );
            self.fork_blocks.insert(block.hash(), block);
            return false;
        }

        if let Some(sibling) = self.fork_blocks.remove(&block.prev_hash) {
            warn!(
                "split brain resolved: adopting the longer branch ending at {}",
                &block.hash()[..8]
            );
            self.revert_tip();
            self.apply_block(&sibling);
            self.chain.push(sibling);
            self.apply_block(&block);
            self.chain.push(block);
            self.fork_blocks.clear();
            return true;
        }

        error!("block out of chain ({kind}) with no matching fork entry, dropping");
        false
    }

    /// Applies an accepted block to the UTXO state.
    ///
    /// Archives every transaction, credits every output to its owner, and
    /// spends every referenced output. Transactions selected for this block
    /// leave the mempool.
    fn apply_block(&mut self, block: &Block) {
        for entry in self.current_block_transactions.drain() {
            self.unconfirmed_transactions.remove(&entry);
        }

        self.state.block_index = block.index;
        for tx in &block.txs {
            let tx_hash = tx.hash();
            self.state
                .transaction_by_hash
                .insert(tx_hash.clone(), tx.clone());
            for out in &tx.outputs {
                self.state.credit_output(&tx_hash, out);
            }
            for inp in &tx.inputs {
                if inp.is_coinbase() {
                    continue;
                }
                let (owner, out_hash) = {
                    let prev = self
                        .state
                        .transaction_by_hash
                        .get(&inp.prev_tx_hash)
                        .expect("verified input references an archived transaction");
                    let out = &prev.outputs[inp.output_index];
                    (out.address.to_string(), out.hash.clone())
                };
                self.state.spend_output(&owner, &inp.prev_tx_hash, &out_hash);
            }
        }
    }

    /// Pops the tip and exactly undoes its effect on the unspent maps.
    ///
    /// Transactions walk backwards so that chained spends inside the block
    /// unwind cleanly. Every non-coinbase transaction returns to the mempool
    /// with its reconstructed fee; the coinbase does not, since it can never
    /// be mined again. The archive keeps every transaction the block carried.
    pub fn revert_tip(&mut self) -> Option<Block> {
        let block = self.chain.pop()?;
        self.state.block_index = self.state.block_index.saturating_sub(1);

        for tx in block.txs.iter().rev() {
            let tx_hash = tx.hash();
            let mut total_in: u64 = 0;
            let mut total_out: u64 = 0;

            for out in &tx.outputs {
                self.state
                    .spend_output(&out.address.to_string(), &tx_hash, &out.hash);
                total_out += out.amount;
            }

            for inp in &tx.inputs {
                if inp.is_coinbase() {
                    continue;
                }
                let restored = {
                    let prev = self
                        .state
                        .transaction_by_hash
                        .get(&inp.prev_tx_hash)
                        .expect("reverted input references an archived transaction");
                    prev.outputs[inp.output_index].clone()
                };
                total_in += restored.amount;
                self.state.credit_output(&inp.prev_tx_hash, &restored);
            }

            if !tx.is_coinbase() {
                self.unconfirmed_transactions
                    .insert((total_in - total_out, tx_hash));
            }
        }

        info!("reverted tip, chain is back at block {}", self.state.block_index);
        Some(block)
    }

    /// Assembles and mines the next block from the mempool.
    ///
    /// Selects up to `txs_per_block` transactions in descending fee order
    /// (ties broken by hash) and pays their fees to the coinbase.
    pub fn force_block<F: Fn() -> bool>(&mut self, should_stop: F) -> bool {
        let (next_index, prev_hash) = match self.chain.last() {
            Some(head) => (head.index + 1, head.hash()),
            None => {
                error!("cannot assemble a block before genesis");
                return false;
            }
        };

        let selected: Vec<(u64, String)> = self
            .unconfirmed_transactions
            .iter()
            .rev()
            .take(self.state.config.txs_per_block)
            .cloned()
            .collect();
        let fees: u64 = selected.iter().map(|(fee, _)| fee).sum();

        let mut txs = vec![self.coinbase_tx(fees)];
        for (_, tx_hash) in &selected {
            let tx = self
                .state
                .transaction_by_hash
                .get(tx_hash)
                .expect("mempool entries are archived")
                .clone();
            txs.push(tx);
        }
        self.current_block_transactions = selected.into_iter().collect();

        let block = Block::new(txs, next_index, prev_hash);
        self.mine(block, should_stop)
    }

    /// Searches the nonce space for a hash under the difficulty target.
    ///
    /// The stop predicate is polled once per nonce; an interrupted search
    /// releases the tentatively selected transactions back to the mempool.
    /// On a hit the block goes through the normal acceptance path.
    pub fn mine<F: Fn() -> bool>(&mut self, mut block: Block, should_stop: F) -> bool {
        let difficulty = self.state.config.difficulty;
        let tx_digest = block.tx_digest();

        for nonce in 0..MAX_NONCE {
            if should_stop() {
                warn!("mining interrupted at nonce {nonce}");
                self.current_block_transactions.clear();
                return false;
            }
            let hash = Block::hash_parts(
                block.index,
                nonce,
                block.timestamp,
                &block.prev_hash,
                &tx_digest,
            );
            if difficulty::meets_target(&hash, difficulty) {
                block.nonce = nonce;
                info!("block {} mined at nonce {nonce}", block.index);
                return self.add_block(block);
            }
        }

        error!("nonce space exhausted without finding a block");
        self.current_block_transactions.clear();
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ChainConfig {
        ChainConfig {
            txs_per_block: 4,
            mining_reward: 25,
            difficulty: 12,
        }
    }

    fn test_engine() -> ChainEngine {
        ChainEngine::new(test_config(), Wallet::create())
    }

    /// Spends `prev_coinbase` (owned by the engine wallet) into `outputs`.
    fn spend_coinbase(engine: &ChainEngine, prev_coinbase: &Tx, outputs: Vec<Output>) -> Tx {
        let mut inp = Input::new(prev_coinbase.hash(), 0, engine.wallet().address(), 0);
        inp.sign(engine.wallet());
        Tx::new(vec![inp], outputs)
    }

    fn assert_conservation(engine: &ChainEngine) {
        let expected = engine.state().config.mining_reward * (engine.state().block_index + 1);
        assert_eq!(engine.state().total_unspent(), expected);
    }

    #[test]
    fn test_genesis_block() {
        let mut engine = test_engine();
        assert!(engine.create_genesis_block());

        assert_eq!(engine.chain().len(), 1);
        let head = engine.head().unwrap();
        assert_eq!(head.index, 0);
        assert_eq!(head.prev_hash, "0");
        assert_eq!(engine.state().block_index, 0);
        assert_eq!(
            engine.state().balance(&engine.wallet().address().to_string()),
            25
        );
        assert_conservation(&engine);
    }

    #[test]
    fn test_chain_linkage_and_conservation_over_many_blocks() {
        let mut engine = test_engine();
        engine.create_genesis_block();

        for _ in 0..4 {
            let coinbase = engine.head().unwrap().txs[0].clone();
            let recipient = Wallet::create();
            let tx = spend_coinbase(
                &engine,
                &coinbase,
                vec![Output::new(recipient.address(), 2, 0)],
            );
            assert!(engine.add_tx(tx).unwrap());
            assert!(engine.force_block(|| false));
            assert_conservation(&engine);
        }

        let chain = engine.chain();
        for i in 1..chain.len() {
            assert_eq!(chain[i].prev_hash, chain[i - 1].hash());
            assert_eq!(chain[i].index, chain[i - 1].index + 1);
            assert!(chain[i].timestamp >= chain[i - 1].timestamp);
            assert!(difficulty::meets_target(
                &chain[i].hash(),
                engine.state().config.difficulty
            ));
        }
    }

    #[test]
    fn test_duplicate_tx_is_dropped() {
        let mut engine = test_engine();
        engine.create_genesis_block();

        let coinbase = engine.head().unwrap().txs[0].clone();
        let recipient = Wallet::create();
        let tx = spend_coinbase(
            &engine,
            &coinbase,
            vec![Output::new(recipient.address(), 5, 0)],
        );
        assert!(engine.add_tx(tx.clone()).unwrap());
        assert!(!engine.add_tx(tx).unwrap());
        assert_eq!(engine.mempool().len(), 1);
    }

    #[test]
    fn test_duplicate_block_is_dropped() {
        let mut engine = test_engine();
        engine.create_genesis_block();
        let head = engine.head().unwrap().clone();
        assert!(!engine.add_block(head));
        assert_eq!(engine.chain().len(), 1);
    }

    #[test]
    fn test_invalid_tx_is_rejected_by_mempool() {
        let mut engine = test_engine();
        engine.create_genesis_block();

        let coinbase = engine.head().unwrap().txs[0].clone();
        let recipient = Wallet::create();
        // Spends 30 out of a 25 output.
        let tx = spend_coinbase(
            &engine,
            &coinbase,
            vec![Output::new(recipient.address(), 30, 0)],
        );
        assert!(matches!(
            engine.add_tx(tx),
            Err(TxError::InsufficientFunds { .. })
        ));
        assert!(engine.mempool().is_empty());
    }

    #[test]
    fn test_mining_cancellation() {
        let mut engine = test_engine();
        engine.create_genesis_block();

        let coinbase = engine.head().unwrap().txs[0].clone();
        let recipient = Wallet::create();
        let tx = spend_coinbase(
            &engine,
            &coinbase,
            vec![Output::new(recipient.address(), 2, 0)],
        );
        engine.add_tx(tx).unwrap();

        assert!(!engine.force_block(|| true));
        assert_eq!(engine.chain().len(), 1);
        // The tentative selection is released back to the mempool.
        assert_eq!(engine.mempool().len(), 1);
        assert!(engine.force_block(|| false));
        assert!(engine.mempool().is_empty());
    }

    #[test]
    fn test_mempool_selection_prefers_higher_fees() {
        let mut config = test_config();
        config.txs_per_block = 2;
        let mut engine = ChainEngine::new(config, Wallet::create());
        engine.create_genesis_block();

        // Three funding outputs: mine two empty blocks beyond genesis.
        let mut coinbases = vec![engine.head().unwrap().txs[0].clone()];
        for _ in 0..2 {
            assert!(engine.force_block(|| false));
            coinbases.push(engine.head().unwrap().txs[0].clone());
        }

        let recipient = Wallet::create();
        // Fees 1, 5, 3 against three 25-unit coinbase outputs.
        for (coinbase, spend) in coinbases.iter().zip([24u64, 20, 22]) {
            let tx = spend_coinbase(
                &engine,
                coinbase,
                vec![Output::new(recipient.address(), spend, 0)],
            );
            assert!(engine.add_tx(tx).unwrap());
        }

        assert!(engine.force_block(|| false));
        let head = engine.head().unwrap();
        // Coinbase plus the two best-paying transactions, best first.
        assert_eq!(head.txs.len(), 3);
        assert_eq!(head.txs[0].total_output_value(), 25 + 8);
        assert_eq!(head.txs[1].total_output_value(), 20);
        assert_eq!(head.txs[2].total_output_value(), 22);
        // The fee-1 transaction stays queued.
        assert_eq!(engine.mempool().len(), 1);
        assert_eq!(engine.mempool().iter().next().unwrap().0, 1);
    }

    #[test]
    fn test_revert_restores_unspent_maps_exactly() {
        let mut engine = test_engine();
        engine.create_genesis_block();
        let mut mined_coinbase_hashes = vec![engine.head().unwrap().txs[0].hash()];

        let mut checkpoint = None;
        for _ in 0..6 {
            let coinbase = engine.head().unwrap().txs[0].clone();
            let w1 = Wallet::create();
            let w2 = Wallet::create();
            let tx = spend_coinbase(
                &engine,
                &coinbase,
                vec![
                    Output::new(w1.address(), 2, 0),
                    Output::new(w2.address(), 2, 1),
                ],
            );
            assert!(engine.add_tx(tx).unwrap());
            assert!(engine.force_block(|| false));
            mined_coinbase_hashes.push(engine.head().unwrap().txs[0].hash());

            if checkpoint.is_none() {
                checkpoint = Some(engine.state().clone());
            }
        }
        let checkpoint = checkpoint.unwrap();
        assert_eq!(engine.state().block_index, 6);

        for _ in 0..5 {
            assert!(engine.revert_tip().is_some());
        }

        assert_eq!(engine.state().block_index, 1);
        assert_eq!(engine.chain().len(), 2);
        assert_eq!(
            engine.state().unspent_txs_by_user_hash,
            checkpoint.unspent_txs_by_user_hash
        );
        assert_eq!(
            engine.state().unspent_outputs_amount,
            checkpoint.unspent_outputs_amount
        );
        // The archive is monotonic: everything the checkpoint knew is still
        // there, as is every coinbase the reverted blocks carried.
        for tx_hash in checkpoint.transaction_by_hash.keys() {
            assert!(engine.state().is_archived(tx_hash));
        }
        for tx_hash in &mined_coinbase_hashes {
            assert!(engine.state().is_archived(tx_hash));
        }
        // The five reverted spends are queued again with their original
        // fees. Each one emptied the previous coinbase (reward plus the fee
        // before it), so the fees compound: 25 + f - 4.
        let fees: Vec<u64> = engine.mempool().iter().map(|(fee, _)| *fee).collect();
        assert_eq!(fees, vec![42, 63, 84, 105, 126]);
        assert_conservation(&engine);
    }

    #[test]
    fn test_roll_round_trip_is_identity() {
        let mut engine = test_engine();
        engine.create_genesis_block();

        let coinbase = engine.head().unwrap().txs[0].clone();
        let recipient = Wallet::create();
        let tx = spend_coinbase(
            &engine,
            &coinbase,
            vec![Output::new(recipient.address(), 10, 0)],
        );
        engine.add_tx(tx).unwrap();

        let before = engine.state().clone();
        assert!(engine.force_block(|| false));
        assert!(engine.revert_tip().is_some());

        assert_eq!(
            engine.state().unspent_txs_by_user_hash,
            before.unspent_txs_by_user_hash
        );
        assert_eq!(
            engine.state().unspent_outputs_amount,
            before.unspent_outputs_amount
        );
        assert_eq!(engine.state().block_index, before.block_index);
    }

    #[test]
    fn test_split_brain_resolution() {
        let mut a = test_engine();
        let mut b = test_engine();

        a.create_genesis_block();
        assert!(b.add_block(a.head().unwrap().clone()));

        // Both nodes mine a child of genesis independently.
        assert!(a.force_block(|| false));
        assert!(b.force_block(|| false));
        let x = a.head().unwrap().clone();
        let y = b.head().unwrap().clone();
        assert_ne!(x.hash(), y.hash());

        // The competitor is recorded, not adopted.
        assert!(!a.add_block(y.clone()));
        assert!(a.fork_blocks().contains_key(&y.hash()));
        assert_eq!(a.head().unwrap().hash(), x.hash());

        // Its child makes the competing branch longer; A reorganizes.
        assert!(b.force_block(|| false));
        let z = b.head().unwrap().clone();
        assert!(a.add_block(z.clone()));

        let hashes: Vec<String> = a.chain().iter().map(Block::hash).collect();
        assert_eq!(hashes[1], y.hash());
        assert_eq!(hashes[2], z.hash());
        assert!(a.fork_blocks().is_empty());

        // The abandoned block's coinbase is no longer spendable, but its
        // transactions are still archived.
        let x_coinbase = &x.txs[0];
        assert!(!a.state().is_unspent(
            &x_coinbase.outputs[0].address.to_string(),
            &x_coinbase.hash(),
            &x_coinbase.outputs[0].hash
        ));
        assert!(a.state().is_archived(&x_coinbase.hash()));
        assert_conservation(&a);
    }

    #[test]
    fn test_second_level_fork_is_dropped() {
        let mut a = test_engine();
        let mut b = test_engine();

        a.create_genesis_block();
        assert!(b.add_block(a.head().unwrap().clone()));
        assert!(a.force_block(|| false));
        assert!(b.force_block(|| false));
        assert!(!a.add_block(b.head().unwrap().clone()));

        // A block whose parent is neither the tip nor a recorded sibling.
        let mut c = test_engine();
        c.create_genesis_block();
        assert!(c.force_block(|| false));
        assert!(c.force_block(|| false));
        let stranger = c.head().unwrap().clone();

        let chain_before = a.chain().len();
        assert!(!a.add_block(stranger));
        assert_eq!(a.chain().len(), chain_before);
    }

    #[test]
    fn test_spend_of_unmined_parent_is_rejected() {
        let mut engine = test_engine();
        engine.create_genesis_block();

        // tx1 spends the genesis coinbase; tx2 tries to spend tx1's output
        // before tx1 is mined. The parent resolves in the archive but its
        // output is not yet unspent, so the chained spend is refused.
        let coinbase = engine.head().unwrap().txs[0].clone();
        let tx1 = spend_coinbase(
            &engine,
            &coinbase,
            vec![Output::new(engine.wallet().address(), 20, 0)],
        );
        let tx1_hash = tx1.hash();
        assert!(engine.add_tx(tx1).unwrap());

        let mut inp = Input::new(tx1_hash.clone(), 0, engine.wallet().address(), 0);
        inp.sign(engine.wallet());
        let recipient = Wallet::create();
        let tx2 = Tx::new(vec![inp.clone()], vec![Output::new(recipient.address(), 15, 0)]);
        assert!(matches!(engine.add_tx(tx2), Err(TxError::DoubleSpend(_))));

        // Once tx1 is mined the same spend goes through.
        assert!(engine.force_block(|| false));
        let tx2 = Tx::new(vec![inp], vec![Output::new(recipient.address(), 15, 0)]);
        assert!(engine.add_tx(tx2).unwrap());
        assert!(engine.force_block(|| false));
        assert_conservation(&engine);
    }
}
