//! pocketfs-crypto: transparent cipher for the reserved subtree
//!
//! Not real cryptography. The transform is a single-byte XOR keystream,
//! preserved bit-exactly for on-disk compatibility with existing images.
//! What makes it interesting is the *activation* rule: a file is ciphered
//! because of where it sits in the naming tree (topmost ancestor named
//! `encrypt`), not because of any per-file flag.
//!
//! Pipeline position: the engine encrypts caller bytes before they reach
//! either storage representation, and decrypts after they leave it — so
//! inline payloads and block payloads both hold ciphertext, and the
//! converter moves opaque bytes without cipher awareness.

pub mod cipher;
pub mod classify;

pub use cipher::{transform, CipherKey};
pub use classify::{is_encrypted, path_of, EntryId, MemNamespace, Namespace};
