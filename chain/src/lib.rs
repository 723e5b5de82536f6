//! Ferrocoin Chain Engine
//!
//! This crate owns the ordered chain and everything that mutates it: mempool
//! admission, block acceptance with narrow split-brain resolution, forward
//! and reverse application of blocks to the UTXO state, and the
//! proof-of-work mining loop.
//!
//! The engine is single-writer by construction (every mutating operation
//! takes `&mut self`) and never blocks on I/O. Mining is the only
//! long-running operation and is cancellable through a polled predicate.

pub mod engine;

pub use engine::{ChainEngine, MAX_NONCE};
