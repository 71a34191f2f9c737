//! Single-byte XOR keystream over a buffer, in place.
//!
//! The transform is involutive: applying it twice with the same key is the
//! identity, so one function serves both encrypt-on-write and
//! decrypt-on-read.

use serde::{Deserialize, Serialize};

/// The process-wide cipher key, fixed at engine construction.
///
/// The original design kept this as a mutable global with no
/// synchronization; here it is a value threaded through the engine and
/// immutable for the engine's lifetime, which removes the hazard outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherKey(pub u8);

impl CipherKey {
    /// Key 0 XORs to identity — classification still happens, but the
    /// transform is a no-op. Useful for debugging image contents.
    pub fn is_identity(&self) -> bool {
        self.0 == 0
    }
}

/// XOR every byte of `buf` with the key, in place.
///
/// A zero-length buffer is a success no-op.
pub fn transform(buf: &mut [u8], key: CipherKey) {
    if key.is_identity() {
        return;
    }
    for b in buf.iter_mut() {
        *b ^= key.0;
    }
}
