//! pocketfs-engine: the per-file read/write hot path
//!
//! # Overview
//!
//! Every file record uses one of two storage representations:
//!
//! ```text
//! Inline : payload embedded in the metadata record (≤ 60 bytes)
//! Block  : payload in separately stored blocks, addressed through refs
//! ```
//!
//! The write path flips between them on the fly: a write that would cross
//! the inline capacity promotes the record to block storage first, and a
//! write that leaves a block record at or under the capacity demotes it
//! back. Both conversions run under the record's exclusive lock and commit
//! by swapping the storage variant as the last step, so a failure mid-way
//! leaves the old representation intact.
//!
//! Files under the reserved `encrypt` top-level directory are transparently
//! ciphered: caller bytes are encrypted *before* they reach either store and
//! decrypted after they leave it, so the converter only ever moves opaque
//! bytes and the on-disk payload is ciphertext in both representations.
//!
//! - `record`: the metadata record and the locked record table
//! - `inline`: reads/writes/zeroing of the embedded payload region
//! - `blockstore`: the block storage trait + in-memory and on-disk backends
//! - `convert`: promote (inline → block) and demote (block → inline)
//! - `engine`: the dispatcher tying classification, conversion, and stores
//!   together

pub mod blockstore;
pub mod convert;
pub mod engine;
pub mod inline;
pub mod record;

pub use blockstore::{BlockStore, FsBlockStore, MemBlockStore};
pub use engine::{Engine, MAX_RECORD_SIZE};
pub use record::{FileRecord, RecordTable, Storage};
