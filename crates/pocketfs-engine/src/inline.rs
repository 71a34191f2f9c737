//! The inline payload store: reads and writes against the fixed-capacity
//! region embedded in the record.
//!
//! The capacity region may hold stale bytes beyond `size` (a previous write
//! left them there), so reads clamp to the logical size and never expose the
//! tail. The dispatcher is responsible for promoting a record before a write
//! crosses the capacity; a write that arrives here over-capacity is a
//! consistency violation, not a truncation.
//!
//! All functions assume the caller holds the record's exclusive lock.

use bytes::Bytes;

use pocketfs_core::{PocketfsError, PocketfsResult, INLINE_CAPACITY};

use crate::record::FileRecord;

/// Read up to `len` bytes at `offset`, clamped to the record's size.
///
/// Requests past end-of-file return the in-range prefix only; requests at or
/// beyond end-of-file return empty.
pub fn read(rec: &FileRecord, offset: u64, len: usize) -> PocketfsResult<Bytes> {
    rec.check_consistency()?;
    if len == 0 || offset >= rec.size {
        return Ok(Bytes::new());
    }
    let start = offset as usize;
    let end = offset.saturating_add(len as u64).min(rec.size) as usize;
    let payload = rec.inline_payload()?;
    Ok(Bytes::copy_from_slice(&payload[start..end]))
}

/// Write `data` at `offset` into the inline region.
///
/// Zero-length writes succeed with zero effect. On success the size grows to
/// cover the write, the version is bumped, and timestamps refresh.
pub fn write(rec: &mut FileRecord, offset: u64, data: &[u8]) -> PocketfsResult<usize> {
    rec.check_consistency()?;
    if data.is_empty() {
        return Ok(0);
    }
    let end = offset + data.len() as u64;
    if end > INLINE_CAPACITY as u64 {
        // The dispatcher should have promoted first
        return Err(PocketfsError::StorageInconsistency {
            record: rec.id.0,
            size: end,
            capacity: INLINE_CAPACITY as u64,
        });
    }

    let old_size = rec.size;
    let payload = rec.inline_payload_mut()?;
    // Writing past the current end leaves a gap; keep it zeroed rather than
    // exposing whatever a previous payload left behind
    if offset > old_size {
        payload[old_size as usize..offset as usize].fill(0);
    }
    payload[offset as usize..end as usize].copy_from_slice(data);

    if end > rec.size {
        rec.size = end;
    }
    rec.touch();
    Ok(data.len())
}

/// Clear the entire capacity region.
pub fn zero(rec: &mut FileRecord) -> PocketfsResult<()> {
    rec.inline_payload_mut()?.fill(0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pocketfs_core::RecordId;
    use proptest::prelude::*;

    fn fresh() -> FileRecord {
        FileRecord::new(RecordId(1))
    }

    #[test]
    fn test_write_then_read_back() {
        let mut rec = fresh();
        let n = write(&mut rec, 0, b"hello world").unwrap();
        assert_eq!(n, 11);
        assert_eq!(rec.size, 11);
        assert_eq!(rec.version, 1);
        assert!(rec.dirty);

        let got = read(&rec, 0, 11).unwrap();
        assert_eq!(&got[..], b"hello world");
    }

    #[test]
    fn test_read_clamps_to_size() {
        let mut rec = fresh();
        write(&mut rec, 0, b"abc").unwrap();

        // More than size: only the valid prefix comes back
        let got = read(&rec, 0, INLINE_CAPACITY).unwrap();
        assert_eq!(&got[..], b"abc");

        // At or past end-of-file: empty
        assert!(read(&rec, 3, 10).unwrap().is_empty());
        assert!(read(&rec, 100, 10).unwrap().is_empty());
    }

    #[test]
    fn test_read_never_exposes_stale_tail() {
        let mut rec = fresh();
        write(&mut rec, 0, &[0xEE; INLINE_CAPACITY]).unwrap();
        // Shrink logically; the stale 0xEE tail stays in the region
        rec.size = 4;

        let got = read(&rec, 0, INLINE_CAPACITY).unwrap();
        assert_eq!(got.len(), 4);
    }

    #[test]
    fn test_overlapping_writes() {
        let mut rec = fresh();
        write(&mut rec, 0, b"aaaaaaaa").unwrap();
        write(&mut rec, 4, b"bbbb").unwrap();
        let got = read(&rec, 0, 8).unwrap();
        assert_eq!(&got[..], b"aaaabbbb");
        assert_eq!(rec.size, 8);
    }

    #[test]
    fn test_gap_write_zero_fills() {
        let mut rec = fresh();
        write(&mut rec, 0, &[0xFF; 8]).unwrap();
        rec.size = 2; // pretend a truncate left stale bytes at 2..8
        write(&mut rec, 6, b"xy").unwrap();

        let got = read(&rec, 0, 8).unwrap();
        assert_eq!(&got[..], &[0xFF, 0xFF, 0, 0, 0, 0, b'x', b'y']);
    }

    #[test]
    fn test_write_to_exact_capacity() {
        let mut rec = fresh();
        let n = write(&mut rec, 0, &[7u8; INLINE_CAPACITY]).unwrap();
        assert_eq!(n, INLINE_CAPACITY);
        assert_eq!(rec.size, INLINE_CAPACITY as u64);
    }

    #[test]
    fn test_over_capacity_write_is_inconsistency() {
        let mut rec = fresh();
        let err = write(&mut rec, 0, &[0u8; INLINE_CAPACITY + 1]).unwrap_err();
        assert!(matches!(err, PocketfsError::StorageInconsistency { .. }));
        // Nothing changed
        assert_eq!(rec.size, 0);
        assert_eq!(rec.version, 0);

        let err = write(&mut rec, 55, b"toolong").unwrap_err();
        assert!(matches!(err, PocketfsError::StorageInconsistency { .. }));
    }

    #[test]
    fn test_zero_length_write_is_noop() {
        let mut rec = fresh();
        let n = write(&mut rec, 10, b"").unwrap();
        assert_eq!(n, 0);
        assert_eq!(rec.size, 0);
        assert_eq!(rec.version, 0, "no metadata churn on empty writes");
    }

    #[test]
    fn test_zero_clears_region() {
        let mut rec = fresh();
        write(&mut rec, 0, &[0xAA; 32]).unwrap();
        zero(&mut rec).unwrap();
        assert!(rec.inline_payload().unwrap().iter().all(|&b| b == 0));
    }

    proptest! {
        #[test]
        fn read_is_always_in_bounds(
            data in proptest::collection::vec(any::<u8>(), 1..=INLINE_CAPACITY),
            offset in 0u64..=80,
            len in 0usize..=128,
        ) {
            let mut rec = fresh();
            write(&mut rec, 0, &data).unwrap();
            let got = read(&rec, offset, len).unwrap();
            // Never past the logical size, never more than asked; past-EOF
            // reads come back empty
            prop_assert!(got.len() <= len);
            prop_assert!(got.len() as u64 <= rec.size.saturating_sub(offset));
            if !got.is_empty() {
                let start = offset as usize;
                prop_assert_eq!(&got[..], &data[start..start + got.len()]);
            }
        }
    }
}
