//! pocketfs-core: shared types, config schema, and error taxonomy
//!
//! pocketfs stores small files *inline* — the payload lives directly inside
//! the metadata record, in the region a block-mapped file would use for its
//! block references. Files that outgrow the inline capacity are promoted to
//! block-mapped storage, and shrink back when they fit again. Files under the
//! reserved top-level directory are transparently ciphered on the way in and
//! out.

pub mod config;
pub mod error;
pub mod types;

pub use config::PocketfsConfig;
pub use error::{PocketfsError, PocketfsResult};
pub use types::{BlockRef, RecordId, RecordStat, StorageMode};

/// Inline payload capacity in bytes — the size of the block-reference area
/// repurposed for inline storage. On-disk contract: must stay bit-exact.
pub const INLINE_CAPACITY: usize = 60;

/// Reserved top-level directory name whose subtree is transparently
/// ciphered. Exact, case-sensitive match on the topmost ancestor only.
pub const RESERVED_DIR: &str = "encrypt";
