//! Read/write dispatch: classification, conversion decisions, and
//! storage-path selection, in a fixed order.
//!
//! Write ordering is the load-bearing part:
//!
//! 1. cipher the caller's bytes (private copy) if the entry classifies
//!    encrypted — the stores and the converter only ever see opaque bytes;
//! 2. resolve append against the logical end-of-file;
//! 3. promote if the write would cross the inline capacity;
//! 4. dispatch to the mode-appropriate store;
//! 5. demote if the record ended up block-mapped at or under capacity.
//!
//! Classification runs fresh on every call: it is a property of the entry's
//! current tree position, so a rename in or out of the reserved subtree
//! takes effect on the next operation with no invalidation machinery.

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use pocketfs_core::{
    PocketfsError, PocketfsResult, RecordId, RecordStat, StorageMode, INLINE_CAPACITY,
};
use pocketfs_crypto::{is_encrypted, transform, CipherKey, EntryId, Namespace};

use crate::blockstore::BlockStore;
use crate::convert::{demote, promote};
use crate::inline;
use crate::record::{FileRecord, RecordTable};

/// Upper bound on a record's logical size. Offsets are caller-controlled;
/// anything whose end would land past this is rejected before it can drive
/// block materialization.
pub const MAX_RECORD_SIZE: u64 = 1 << 40;

/// The storage engine: a record table, a block store, and the cipher key
/// fixed at construction.
pub struct Engine<B: BlockStore> {
    store: B,
    records: RecordTable,
    key: CipherKey,
}

impl<B: BlockStore> Engine<B> {
    pub fn new(store: B, key: CipherKey) -> Self {
        Engine {
            store,
            records: RecordTable::new(),
            key,
        }
    }

    pub fn records(&self) -> &RecordTable {
        &self.records
    }

    pub fn store(&self) -> &B {
        &self.store
    }

    /// Allocate a fresh record (inline, size 0).
    pub async fn create(&self) -> RecordId {
        self.records.create().await
    }

    pub async fn stat(&self, id: RecordId) -> PocketfsResult<RecordStat> {
        let rec = self.records.get(id).await?;
        let rec = rec.lock().await;
        Ok(rec.stat())
    }

    /// Read up to `len` bytes at `pos`, decrypting when the access path
    /// classifies encrypted. Returns the bytes actually transferred — short
    /// at end-of-file, never long.
    pub async fn read<N: Namespace>(
        &self,
        ns: &N,
        entry: EntryId,
        id: RecordId,
        pos: u64,
        len: usize,
    ) -> PocketfsResult<Bytes> {
        if len == 0 {
            return Ok(Bytes::new());
        }
        let rec = self.records.get(id).await?;
        let rec = rec.lock().await;
        trace!(record = %id, pos, len, mode = %rec.mode(), "read");

        let data = match rec.mode() {
            StorageMode::Inline => inline::read(&rec, pos, len)?,
            StorageMode::Block => self.block_read(&rec, pos, len).await?,
        };
        drop(rec);

        if is_encrypted(ns, entry) {
            // Decrypt-on-read. The raw read has already succeeded, but bytes
            // must not reach the caller undecrypted.
            debug!(record = %id, bytes = data.len(), "deciphering read data");
            let mut buf = BytesMut::from(&data[..]);
            transform(&mut buf, self.key);
            return Ok(buf.freeze());
        }
        Ok(data)
    }

    /// Write `data` at `pos` (or at end-of-file when `append` is set),
    /// encrypting first when the access path classifies encrypted, and
    /// converting the storage mode as needed. Returns bytes written.
    pub async fn write<N: Namespace>(
        &self,
        ns: &N,
        entry: EntryId,
        id: RecordId,
        pos: u64,
        data: &[u8],
        append: bool,
    ) -> PocketfsResult<usize> {
        if data.is_empty() {
            return Ok(0);
        }

        // Encrypt before the conversion check, on a private copy — on-disk
        // bytes are ciphertext in both representations
        let mut buf = BytesMut::from(data);
        if is_encrypted(ns, entry) {
            debug!(record = %id, bytes = buf.len(), "enciphering write data");
            transform(&mut buf, self.key);
        }

        let rec = self.records.get(id).await?;
        let mut rec = rec.lock().await;

        // Append is relative to the logical end-of-file, resolved before the
        // conversion check so the offset stays valid across a store switch
        let pos = if append { rec.size } else { pos };
        let end = pos
            .checked_add(buf.len() as u64)
            .filter(|&end| end <= MAX_RECORD_SIZE)
            .ok_or_else(|| {
                PocketfsError::InvalidArgument(format!(
                    "write of {} bytes at offset {pos} exceeds the record size limit",
                    buf.len()
                ))
            })?;
        trace!(record = %id, pos, len = buf.len(), mode = %rec.mode(), "write");

        if rec.mode() == StorageMode::Inline && end > INLINE_CAPACITY as u64 {
            promote(&mut rec, &self.store).await?;
        }

        let written = match rec.mode() {
            StorageMode::Inline => inline::write(&mut rec, pos, &buf)?,
            StorageMode::Block => self.block_write(&mut rec, pos, &buf).await?,
        };

        if rec.mode() == StorageMode::Block && rec.size <= INLINE_CAPACITY as u64 {
            demote(&mut rec, &self.store).await?;
        }

        Ok(written)
    }

    /// Shrink a record to `new_size`. Growing is a job for writes.
    ///
    /// A block record shrunk to within the inline capacity stays
    /// block-mapped until the next write demotes it.
    pub async fn truncate(&self, id: RecordId, new_size: u64) -> PocketfsResult<()> {
        let rec = self.records.get(id).await?;
        let mut rec = rec.lock().await;
        rec.check_consistency()?;
        if new_size > rec.size {
            return Err(PocketfsError::InvalidArgument(format!(
                "truncate cannot grow record {id} from {} to {new_size}",
                rec.size
            )));
        }
        if new_size == rec.size {
            return Ok(());
        }

        match rec.mode() {
            StorageMode::Inline => {
                // Clear the dropped tail so it cannot resurface later
                rec.inline_payload_mut()?[new_size as usize..].fill(0);
            }
            StorageMode::Block => {
                let keep = new_size.div_ceil(self.store.block_size() as u64) as usize;
                // Detach dropped references; freeing the blocks is the
                // external allocator's job
                rec.block_refs_mut()?.truncate(keep);
            }
        }
        rec.size = new_size;
        rec.touch();
        debug!(record = %id, size = new_size, "truncated");
        Ok(())
    }

    // ── Block path ────────────────────────────────────────────────────────

    async fn block_read(&self, rec: &FileRecord, pos: u64, len: usize) -> PocketfsResult<Bytes> {
        if pos >= rec.size {
            return Ok(Bytes::new());
        }
        let end = pos.saturating_add(len as u64).min(rec.size);
        let bs = self.store.block_size() as u64;
        let refs = rec.block_refs()?;

        let mut out = BytesMut::with_capacity((end - pos) as usize);
        let mut at = pos;
        while at < end {
            let idx = at / bs;
            let in_block = (at % bs) as usize;
            let take = ((end - at) as usize).min(bs as usize - in_block);
            if (idx as usize) < refs.len() {
                let data = self.store.read_block(&refs[idx as usize]).await?;
                out.extend_from_slice(&data[in_block..in_block + take]);
            } else {
                // Hole: reads as zeroes
                out.extend_from_slice(&vec![0u8; take]);
            }
            at += take as u64;
        }
        Ok(out.freeze())
    }

    async fn block_write(
        &self,
        rec: &mut FileRecord,
        pos: u64,
        data: &[u8],
    ) -> PocketfsResult<usize> {
        let bs = self.store.block_size();
        let end = pos + data.len() as u64;
        let id = rec.id;

        // Materialize references up to the last block this write touches;
        // intermediate blocks allocate zeroed
        let last_idx = ((end - 1) / bs as u64) as usize;
        {
            let refs = rec.block_refs_mut()?;
            while refs.len() <= last_idx {
                let block = self
                    .store
                    .get_or_allocate(id, refs.len() as u64, true)
                    .await?;
                refs.push(block);
            }
        }

        let refs = rec.block_refs()?.to_vec();
        let mut at = pos;
        while at < end {
            let idx = (at / bs as u64) as usize;
            let in_block = (at % bs as u64) as usize;
            let take = ((end - at) as usize).min(bs - in_block);
            let src = &data[(at - pos) as usize..(at - pos) as usize + take];

            if take == bs {
                self.store.write_block(&refs[idx], src).await?;
            } else {
                // Partial coverage: read-modify-write
                let mut block_buf = BytesMut::from(&self.store.read_block(&refs[idx]).await?[..]);
                block_buf[in_block..in_block + take].copy_from_slice(src);
                self.store.write_block(&refs[idx], &block_buf).await?;
            }
            at += take as u64;
        }

        if end > rec.size {
            rec.size = end;
        }
        rec.touch();
        Ok(data.len())
    }
}
