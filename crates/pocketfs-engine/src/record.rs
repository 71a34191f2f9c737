//! File records and the locked record table.
//!
//! A record's payload location is a tagged union: the inline byte array and
//! the block-reference list never coexist. Flipping the variant *is* the
//! mode change, which makes the "inline region must not be misread as block
//! pointers" invariant structural — there is no shared memory region to
//! leave stale bytes in.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use pocketfs_core::{
    BlockRef, PocketfsError, PocketfsResult, RecordId, RecordStat, StorageMode, INLINE_CAPACITY,
};

/// Payload location. Exactly one representation is live at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum Storage {
    Inline {
        #[serde(with = "inline_bytes")]
        bytes: [u8; INLINE_CAPACITY],
    },
    Block {
        refs: Vec<BlockRef>,
    },
}

/// Per-file metadata record (inode analogue).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: RecordId,
    /// Logical file size in bytes
    pub size: u64,
    /// Bumped on every mutation
    pub version: u64,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    /// Needs persisting
    #[serde(skip)]
    pub dirty: bool,
    storage: Storage,
}

impl FileRecord {
    /// A fresh record: inline, size 0.
    pub fn new(id: RecordId) -> Self {
        let now = SystemTime::now();
        FileRecord {
            id,
            size: 0,
            version: 0,
            mtime: now,
            ctime: now,
            dirty: false,
            storage: Storage::Inline {
                bytes: [0u8; INLINE_CAPACITY],
            },
        }
    }

    pub fn mode(&self) -> StorageMode {
        match self.storage {
            Storage::Inline { .. } => StorageMode::Inline,
            Storage::Block { .. } => StorageMode::Block,
        }
    }

    /// Verify I1: an inline record's size never exceeds the capacity.
    /// A violation means the persisted metadata is corrupt; it is reported,
    /// never repaired.
    pub fn check_consistency(&self) -> PocketfsResult<()> {
        if self.mode() == StorageMode::Inline && self.size > INLINE_CAPACITY as u64 {
            tracing::error!(
                record = %self.id,
                size = self.size,
                "inline record exceeds capacity"
            );
            return Err(PocketfsError::StorageInconsistency {
                record: self.id.0,
                size: self.size,
                capacity: INLINE_CAPACITY as u64,
            });
        }
        Ok(())
    }

    pub fn inline_payload(&self) -> PocketfsResult<&[u8; INLINE_CAPACITY]> {
        match &self.storage {
            Storage::Inline { bytes } => Ok(bytes),
            Storage::Block { .. } => Err(PocketfsError::InvalidArgument(format!(
                "record {} is block-mapped, not inline",
                self.id
            ))),
        }
    }

    pub fn inline_payload_mut(&mut self) -> PocketfsResult<&mut [u8; INLINE_CAPACITY]> {
        match &mut self.storage {
            Storage::Inline { bytes } => Ok(bytes),
            Storage::Block { .. } => Err(PocketfsError::InvalidArgument(format!(
                "record {} is block-mapped, not inline",
                self.id
            ))),
        }
    }

    pub fn block_refs(&self) -> PocketfsResult<&[BlockRef]> {
        match &self.storage {
            Storage::Block { refs } => Ok(refs),
            Storage::Inline { .. } => Err(PocketfsError::InvalidArgument(format!(
                "record {} is inline, not block-mapped",
                self.id
            ))),
        }
    }

    pub fn block_refs_mut(&mut self) -> PocketfsResult<&mut Vec<BlockRef>> {
        match &mut self.storage {
            Storage::Block { refs } => Ok(refs),
            Storage::Inline { .. } => Err(PocketfsError::InvalidArgument(format!(
                "record {} is inline, not block-mapped",
                self.id
            ))),
        }
    }

    /// Swap the storage representation — the single commit point of a mode
    /// conversion. Caller holds the record's exclusive lock.
    pub fn commit_storage(&mut self, storage: Storage) {
        self.storage = storage;
    }

    /// Refresh mtime/ctime, bump the version, mark for persistence.
    /// Called by writes and truncation, not by the converter.
    pub fn touch(&mut self) {
        let now = SystemTime::now();
        self.mtime = now;
        self.ctime = now;
        self.version += 1;
        self.dirty = true;
    }

    pub fn stat(&self) -> RecordStat {
        RecordStat {
            id: self.id,
            mode: self.mode(),
            size: self.size,
            version: self.version,
            blocks: match &self.storage {
                Storage::Inline { .. } => 0,
                Storage::Block { refs } => refs.len(),
            },
            mtime: self.mtime,
        }
    }
}

// ── Record table ──────────────────────────────────────────────────────────

/// All live records, each behind its own exclusive lock.
///
/// The per-record lock serializes every operation touching that record:
/// inline reads and writes, both conversions, and the block path. Lock
/// acquisition order is the total order observers see.
pub struct RecordTable {
    records: Mutex<HashMap<RecordId, Arc<Mutex<FileRecord>>>>,
    next_id: AtomicU64,
}

impl Default for RecordTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordTable {
    pub fn new() -> Self {
        RecordTable {
            records: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh record. New records start inline with size 0; the
    /// inline kind is expected here, so creation logs it at debug rather
    /// than flagging an unknown file kind.
    pub async fn create(&self) -> RecordId {
        let id = RecordId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let rec = FileRecord::new(id);
        self.records.lock().await.insert(id, Arc::new(Mutex::new(rec)));
        debug!(record = %id, kind = "inline", "record created");
        id
    }

    /// Insert a previously persisted record (image load path).
    pub async fn insert(&self, rec: FileRecord) {
        let id = rec.id;
        // Keep the id counter ahead of everything we have seen
        self.next_id.fetch_max(id.0 + 1, Ordering::Relaxed);
        self.records.lock().await.insert(id, Arc::new(Mutex::new(rec)));
    }

    pub async fn get(&self, id: RecordId) -> PocketfsResult<Arc<Mutex<FileRecord>>> {
        self.records
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| PocketfsError::InvalidArgument(format!("no such record: {id}")))
    }

    pub async fn ids(&self) -> Vec<RecordId> {
        let mut ids: Vec<RecordId> = self.records.lock().await.keys().copied().collect();
        ids.sort();
        ids
    }

    pub async fn remove(&self, id: RecordId) {
        self.records.lock().await.remove(&id);
    }
}

// JSON-friendly encoding of the fixed inline array
mod inline_bytes {
    use super::INLINE_CAPACITY;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &[u8; INLINE_CAPACITY],
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        ser.collect_seq(bytes.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<[u8; INLINE_CAPACITY], D::Error> {
        let v = Vec::<u8>::deserialize(de)?;
        if v.len() != INLINE_CAPACITY {
            return Err(D::Error::invalid_length(v.len(), &"inline capacity bytes"));
        }
        let mut out = [0u8; INLINE_CAPACITY];
        out.copy_from_slice(&v);
        Ok(out)
    }
}
