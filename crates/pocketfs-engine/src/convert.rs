//! Mode conversion: inline → block (promote) and block → inline (demote).
//!
//! Both directions are two-phase: stage the new representation completely,
//! make it durable, then flip the storage variant as the single commit
//! point. A failure anywhere before the flip leaves the record in its old
//! representation with its payload intact, so callers may surface the error
//! without wondering what state the record is in.
//!
//! The caller holds the record's exclusive lock for the whole conversion,
//! including across the block I/O awaits — the half-converted state must
//! never be observable, even at the cost of stalling other operations on
//! the same file while a slow store catches up.
//!
//! Size, version, and timestamp updates belong to the write that triggered
//! the conversion, not to the converter.

use tracing::debug;

use pocketfs_core::{PocketfsError, PocketfsResult, StorageMode, INLINE_CAPACITY};

use crate::blockstore::BlockStore;
use crate::record::{FileRecord, Storage};

/// Convert an inline record to block storage.
///
/// Triggered by the dispatcher when a write's end offset would cross the
/// inline capacity. An empty record promotes without touching the store.
pub async fn promote<B: BlockStore>(rec: &mut FileRecord, store: &B) -> PocketfsResult<()> {
    if rec.mode() != StorageMode::Inline {
        return Err(PocketfsError::InvalidArgument(format!(
            "promote on record {} which is already block-mapped",
            rec.id
        )));
    }
    rec.check_consistency()?;

    // Nothing to materialize for an empty file
    if rec.size == 0 {
        rec.commit_storage(Storage::Block { refs: Vec::new() });
        debug!(record = %rec.id, "promoted empty record to block storage");
        return Ok(());
    }

    // Stage: snapshot the inline payload and write it durably as block 0
    let scratch = rec.inline_payload()?[..rec.size as usize].to_vec();
    let block = store.get_or_allocate(rec.id, 0, true).await?;
    store.write_block(&block, &scratch).await?;
    store.flush(&block).await?;

    // Commit
    rec.commit_storage(Storage::Block { refs: vec![block] });
    debug!(record = %rec.id, size = rec.size, "promoted to block storage");
    Ok(())
}

/// Convert a block record back to inline storage.
///
/// Triggered by the dispatcher after a write leaves the record at or under
/// the inline capacity. The first block must already exist unless the file
/// is empty; block references are detached, not freed — releasing the
/// underlying blocks belongs to the external allocator.
pub async fn demote<B: BlockStore>(rec: &mut FileRecord, store: &B) -> PocketfsResult<()> {
    if rec.mode() != StorageMode::Block {
        return Err(PocketfsError::InvalidArgument(format!(
            "demote on record {} which is already inline",
            rec.id
        )));
    }
    if rec.size > INLINE_CAPACITY as u64 {
        return Err(PocketfsError::InvalidArgument(format!(
            "demote on record {} with size {} over capacity",
            rec.id, rec.size
        )));
    }

    let mut bytes = [0u8; INLINE_CAPACITY];
    if rec.size > 0 {
        // Stage: the payload now fits in block 0's prefix
        let block = *rec.block_refs()?.first().ok_or_else(|| {
            PocketfsError::Conversion(format!(
                "record {} has no first block to demote from",
                rec.id
            ))
        })?;
        let data = store.read_block(&block).await?;
        bytes[..rec.size as usize].copy_from_slice(&data[..rec.size as usize]);
    }

    // Commit; the old refs drop with the variant
    rec.commit_storage(Storage::Inline { bytes });
    debug!(record = %rec.id, size = rec.size, "demoted to inline storage");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockstore::MemBlockStore;
    use crate::inline;
    use pocketfs_core::RecordId;

    fn inline_record(data: &[u8]) -> FileRecord {
        let mut rec = FileRecord::new(RecordId(1));
        inline::write(&mut rec, 0, data).unwrap();
        rec
    }

    #[tokio::test]
    async fn test_promote_moves_payload_to_block_zero() {
        let store = MemBlockStore::new(128).unwrap();
        let mut rec = inline_record(b"payload bytes");

        promote(&mut rec, &store).await.unwrap();

        assert_eq!(rec.mode(), StorageMode::Block);
        assert_eq!(rec.block_refs().unwrap().len(), 1);
        let data = store
            .read_block(&rec.block_refs().unwrap()[0])
            .await
            .unwrap();
        assert_eq!(&data[..13], b"payload bytes");
        assert_eq!(rec.size, 13, "size belongs to the caller, not the converter");
    }

    #[tokio::test]
    async fn test_promote_empty_skips_block_io() {
        let store = MemBlockStore::new(128).unwrap();
        let mut rec = FileRecord::new(RecordId(2));

        promote(&mut rec, &store).await.unwrap();

        assert_eq!(rec.mode(), StorageMode::Block);
        assert!(rec.block_refs().unwrap().is_empty());
        assert_eq!(store.allocated_blocks(), 0);
    }

    #[tokio::test]
    async fn test_promote_flushes_before_commit() {
        let store = MemBlockStore::new(128).unwrap();
        let mut rec = inline_record(b"x");
        promote(&mut rec, &store).await.unwrap();
        assert_eq!(store.flush_count(), 1);
    }

    #[tokio::test]
    async fn test_promote_write_failure_leaves_record_inline() {
        let store = MemBlockStore::new(128).unwrap();
        let mut rec = inline_record(b"precious");
        store.fail_writes(true);

        let err = promote(&mut rec, &store).await.unwrap_err();
        assert!(matches!(err, PocketfsError::Conversion(_)));

        // Old representation intact
        assert_eq!(rec.mode(), StorageMode::Inline);
        let got = inline::read(&rec, 0, 8).unwrap();
        assert_eq!(&got[..], b"precious");
    }

    #[tokio::test]
    async fn test_promote_flush_failure_leaves_record_inline() {
        let store = MemBlockStore::new(128).unwrap();
        let mut rec = inline_record(b"precious");
        store.fail_flushes(true);

        assert!(promote(&mut rec, &store).await.is_err());
        assert_eq!(rec.mode(), StorageMode::Inline);
    }

    #[tokio::test]
    async fn test_demote_restores_inline_payload() {
        let store = MemBlockStore::new(128).unwrap();
        let mut rec = inline_record(b"roundtrip me");
        promote(&mut rec, &store).await.unwrap();

        demote(&mut rec, &store).await.unwrap();

        assert_eq!(rec.mode(), StorageMode::Inline);
        let got = inline::read(&rec, 0, 64).unwrap();
        assert_eq!(&got[..], b"roundtrip me");
    }

    #[tokio::test]
    async fn test_demote_empty_record() {
        let store = MemBlockStore::new(128).unwrap();
        let mut rec = FileRecord::new(RecordId(3));
        promote(&mut rec, &store).await.unwrap();

        demote(&mut rec, &store).await.unwrap();
        assert_eq!(rec.mode(), StorageMode::Inline);
        assert!(rec.inline_payload().unwrap().iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn test_demote_without_first_block_fails_intact() {
        let store = MemBlockStore::new(128).unwrap();
        let mut rec = FileRecord::new(RecordId(4));
        rec.commit_storage(Storage::Block { refs: Vec::new() });
        rec.size = 10; // claims payload but references no block

        let err = demote(&mut rec, &store).await.unwrap_err();
        assert!(matches!(err, PocketfsError::Conversion(_)));
        assert_eq!(rec.mode(), StorageMode::Block, "failed demote must not flip");
    }

    #[tokio::test]
    async fn test_demote_over_capacity_rejected() {
        let store = MemBlockStore::new(128).unwrap();
        let mut rec = FileRecord::new(RecordId(5));
        rec.commit_storage(Storage::Block { refs: Vec::new() });
        rec.size = INLINE_CAPACITY as u64 + 1;

        assert!(demote(&mut rec, &store).await.is_err());
    }
}
