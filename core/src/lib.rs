//! Ferrocoin Core Types and Data Structures
//!
//! This crate defines the value objects the rest of the node is built on:
//! transaction inputs and outputs, transactions, and blocks, together with
//! their content-hashing rules. The hashing rules are a wire contract shared
//! with peers and must not drift; see the individual `hash` methods.

pub mod block;
pub mod transaction;

pub use block::Block;
pub use transaction::{Input, Output, Tx};

/// Sentinel `prev_tx_hash` naming the block reward as an input's source.
pub const COINBASE: &str = "COINBASE";
