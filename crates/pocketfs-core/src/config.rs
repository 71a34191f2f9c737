use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration (loaded from pocketfs.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PocketfsConfig {
    pub storage: StorageConfig,
    pub crypto: CryptoConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the on-disk image (default: ~/.local/share/pocketfs/image)
    pub image: PathBuf,
    /// Logical block size in bytes for block-mapped files (default: 1024)
    pub block_size: usize,
}

/// Transparent-cipher configuration.
///
/// The key is a single byte, fixed at mount time and immutable for the
/// mount's lifetime. It is threaded into the engine at construction — there
/// is deliberately no way to change it on a live engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// XOR keystream byte (default: 0, the identity transform)
    pub key: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            image: PathBuf::from("~/.local/share/pocketfs/image"),
            block_size: 1024,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self { key: 0 }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
