//! JSON snapshot persistence for the chain state
//!
//! A snapshot is the whole [`ChainState`] serialized to a single JSON file
//! named after its block index. The format is a private contract between the
//! node and its own data directory; the only requirement is that a
//! save/restore round-trip reproduces every map exactly.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::{ChainState, StorageError};

/// Writes and reads [`ChainState`] snapshots under a base directory.
pub struct SnapshotStore {
    base_dir: PathBuf,
}

impl SnapshotStore {
    /// Opens (and creates, if needed) the snapshot directory.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        Ok(SnapshotStore { base_dir })
    }

    fn path_for(&self, block_index: u64) -> PathBuf {
        self.base_dir.join(format!("block_{block_index}.json"))
    }

    /// Serializes `state` to `block_<index>.json`, replacing any previous
    /// snapshot at the same index. Returns the written path.
    pub fn save(&self, state: &ChainState) -> Result<PathBuf, StorageError> {
        let path = self.path_for(state.block_index);
        let file = File::create(&path)?;
        serde_json::to_writer(BufWriter::new(file), state)?;
        info!(
            "saved state snapshot at block {} to {}",
            state.block_index,
            path.display()
        );
        Ok(path)
    }

    /// Loads the snapshot taken at `block_index`.
    pub fn restore(&self, block_index: u64) -> Result<ChainState, StorageError> {
        let path = self.path_for(block_index);
        if !path.exists() {
            return Err(StorageError::NotFound(format!(
                "no snapshot for block {block_index} in {}",
                self.base_dir.display()
            )));
        }
        let file = File::open(&path)?;
        let state = serde_json::from_reader(BufReader::new(file))?;
        debug!("restored state snapshot from {}", path.display());
        Ok(state)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}
