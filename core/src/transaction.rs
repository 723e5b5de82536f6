//! Transaction model for Ferrocoin
//!
//! A transaction destroys the outputs referenced by its inputs and mints a
//! new set of outputs. Each input carries a signature over its commitment
//! string, and each output carries a content hash salted with the parent
//! transaction's timestamp so that two outputs with identical
//! `(amount, address, index)` in different transactions never collide.

use std::fmt;

use serde::{Deserialize, Serialize};

use ferrocoin_crypto::{sha256_hex, Address, Wallet};
use ferrocoin_util::current_timestamp;

use crate::COINBASE;

/// A reference to a previous unspent output being spent.
///
/// `index` is the input's ordinal inside its parent transaction; it is part
/// of the signed commitment so that two inputs signed by the same address
/// still produce distinct commitments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    /// Hash of the transaction that created the referenced output, or the
    /// [`COINBASE`] sentinel.
    pub prev_tx_hash: String,

    /// Position of the referenced output inside that transaction.
    pub output_index: usize,

    /// Address the spender claims to be. Verification checks the signature
    /// against the owner recorded on the referenced output, not this field.
    pub address: Address,

    /// Ordinal of this input in the parent transaction's input list.
    pub index: u32,

    /// Hex-encoded signature over [`Input::commitment`], empty until signed.
    pub signature: String,
}

impl Input {
    /// Creates an unsigned input.
    pub fn new(
        prev_tx_hash: impl Into<String>,
        output_index: usize,
        address: Address,
        index: u32,
    ) -> Self {
        Input {
            prev_tx_hash: prev_tx_hash.into(),
            output_index,
            address,
            index,
            signature: String::new(),
        }
    }

    /// Creates the sentinel input that claims the block reward.
    pub fn coinbase(address: Address) -> Self {
        Input::new(COINBASE, 0, address, 0)
    }

    /// The exact string a spender signs: raw concatenation of the referenced
    /// transaction hash, output index, claimed address, and input ordinal.
    pub fn commitment(&self) -> String {
        format!(
            "{}{}{}{}",
            self.prev_tx_hash, self.output_index, self.address, self.index
        )
    }

    /// Signs the commitment with `wallet` and stores the hex signature.
    pub fn sign(&mut self, wallet: &Wallet) {
        self.signature = wallet.sign(self.commitment().as_bytes());
    }

    pub fn is_coinbase(&self) -> bool {
        self.prev_tx_hash == COINBASE
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_coinbase() {
            write!(f, "Input(COINBASE)")
        } else {
            write!(f, "Input({}:{})", &self.prev_tx_hash[..8], self.output_index)
        }
    }
}

/// A newly created spendable output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub amount: u64,

    /// Owner; only this address can later sign a spend of the output.
    pub address: Address,

    /// Ordinal of this output in the parent transaction's output list.
    pub index: u32,

    /// Content hash over `{amount}{address}{index}{salt}` where the salt is
    /// the parent transaction's timestamp. Filled in by [`Tx::new`].
    pub hash: String,
}

impl Output {
    /// Creates an output whose hash is assigned when it joins a transaction.
    pub fn new(address: Address, amount: u64, index: u32) -> Self {
        Output {
            amount,
            address,
            index,
            hash: String::new(),
        }
    }

    fn fill_hash(&mut self, salt: u64) {
        self.hash = sha256_hex(
            format!("{}{}{}{}", self.amount, self.address, self.index, salt).as_bytes(),
        );
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Output({} -> {})", self.amount, &self.hash[..8])
    }
}

/// A transfer of value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,

    /// Nanoseconds since the Unix epoch; doubles as the output-hash salt.
    pub timestamp: u64,
}

impl Tx {
    /// Assembles a transaction, stamping it with the current time and
    /// salting every output hash with that timestamp.
    pub fn new(inputs: Vec<Input>, outputs: Vec<Output>) -> Self {
        let timestamp = current_timestamp();
        let mut tx = Tx {
            inputs,
            outputs,
            timestamp,
        };
        for out in &mut tx.outputs {
            out.fill_hash(timestamp);
        }
        tx
    }

    /// Rebuilds a transaction received over the wire or read from a
    /// snapshot, trusting the recorded timestamp and output hashes.
    pub fn from_parts(inputs: Vec<Input>, outputs: Vec<Output>, timestamp: u64) -> Self {
        Tx {
            inputs,
            outputs,
            timestamp,
        }
    }

    /// Content hash identifying this transaction.
    ///
    /// Raw concatenation of every input commitment, every output hash, and
    /// the timestamp, hashed with SHA-256. Signatures are excluded, so the
    /// hash is stable across signing.
    pub fn hash(&self) -> String {
        let mut payload = String::new();
        for inp in &self.inputs {
            payload.push_str(&inp.commitment());
        }
        for out in &self.outputs {
            payload.push_str(&out.hash);
        }
        payload.push_str(&self.timestamp.to_string());
        sha256_hex(payload.as_bytes())
    }

    /// True when the first input claims the block reward.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.first().map_or(false, Input::is_coinbase)
    }

    /// Sum of all output amounts.
    pub fn total_output_value(&self) -> u64 {
        self.outputs.iter().map(|out| out.amount).sum()
    }
}

impl fmt::Display for Tx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tx {{ id: {}, ins: {}, outs: {} }}",
            &self.hash()[..8],
            self.inputs.len(),
            self.outputs.len()
        )
    }
}
