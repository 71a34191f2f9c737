use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Identifier of a file record (inode-number analogue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which of the two storage representations a record currently uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageMode {
    /// Payload embedded directly in the metadata record
    Inline,
    /// Payload addressed through block references
    Block,
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageMode::Inline => write!(f, "inline"),
            StorageMode::Block => write!(f, "block"),
        }
    }
}

/// Reference to one logical data block of a record.
///
/// The reference is logical — `(record, index)` — and is resolved to real
/// storage by the block store that issued it. Freeing the underlying block
/// belongs to the external allocator; the engine only attaches and detaches
/// references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    pub record: RecordId,
    pub index: u64,
}

/// Snapshot of a record's metadata, for callers that must not hold the
/// record lock (CLI `stat`, tests).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordStat {
    pub id: RecordId,
    pub mode: StorageMode,
    pub size: u64,
    pub version: u64,
    pub blocks: usize,
    pub mtime: SystemTime,
}
