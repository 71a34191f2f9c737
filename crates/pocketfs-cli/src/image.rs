//! On-disk image: the engine plus persisted metadata.
//!
//! Layout under the image root (all objects via the same OpenDAL fs
//! operator the block store uses):
//!
//! ```text
//! blocks/{record:016x}/{index:08x}   block payloads (FsBlockStore)
//! records/{record:016x}.json         FileRecord metadata
//! paths.json                         path → record id index
//! ```
//!
//! The path index doubles as the naming tree: entries are rebuilt into a
//! `MemNamespace` on open, so classification works exactly as it would
//! under a real name-resolution layer.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use pocketfs_core::{PocketfsConfig, RecordId};
use pocketfs_crypto::{CipherKey, EntryId, MemNamespace};
use pocketfs_engine::{Engine, FileRecord, FsBlockStore};

const PATHS_KEY: &str = "paths.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct PathIndex {
    /// Absolute path → record id, sorted for stable diffs
    entries: BTreeMap<String, RecordId>,
}

pub struct Image {
    engine: Engine<FsBlockStore>,
    ns: MemNamespace,
    index: PathIndex,
}

impl Image {
    /// Open (or initialize) the image at `root`.
    pub async fn open(root: &Path, cfg: &PocketfsConfig) -> Result<Self> {
        let store = FsBlockStore::open(root, cfg.storage.block_size)
            .context("opening block store")?;
        let engine = Engine::new(store, CipherKey(cfg.crypto.key));

        let mut image = Image {
            engine,
            ns: MemNamespace::new(),
            index: PathIndex::default(),
        };
        image.load().await?;
        Ok(image)
    }

    pub fn engine(&self) -> &Engine<FsBlockStore> {
        &self.engine
    }

    pub fn namespace(&self) -> &MemNamespace {
        &self.ns
    }

    async fn load(&mut self) -> Result<()> {
        let op = self.engine.store().operator().clone();

        if op.exists(PATHS_KEY).await.context("probing path index")? {
            let raw = op.read(PATHS_KEY).await.context("reading path index")?;
            self.index =
                serde_json::from_slice(&raw.to_bytes()).context("parsing path index")?;
        }

        for (path, id) in &self.index.entries {
            self.ns.entry_for_path(path);
            let key = record_key(*id);
            let raw = op
                .read(&key)
                .await
                .with_context(|| format!("reading record {id}"))?;
            let rec: FileRecord =
                serde_json::from_slice(&raw.to_bytes()).with_context(|| format!("parsing record {id}"))?;
            rec.check_consistency()?;
            self.engine.records().insert(rec).await;
        }

        debug!(files = self.index.entries.len(), "image loaded");
        Ok(())
    }

    /// Resolve a path to its entry and record, creating both if needed.
    pub async fn resolve_or_create(&mut self, path: &str) -> Result<(EntryId, RecordId)> {
        let path = normalize(path)?;
        let entry = self.ns.entry_for_path(&path);
        if let Some(&id) = self.index.entries.get(&path) {
            return Ok((entry, id));
        }
        let id = self.engine.create().await;
        self.index.entries.insert(path, id);
        Ok((entry, id))
    }

    /// Resolve a path that must already exist.
    pub async fn resolve(&mut self, path: &str) -> Result<(EntryId, RecordId)> {
        let path = normalize(path)?;
        let id = *self
            .index
            .entries
            .get(&path)
            .with_context(|| format!("no such file in image: {path}"))?;
        let entry = self.ns.entry_for_path(&path);
        Ok((entry, id))
    }

    pub fn paths(&self) -> impl Iterator<Item = (&str, RecordId)> {
        self.index.entries.iter().map(|(p, id)| (p.as_str(), *id))
    }

    /// Persist dirty records and the path index.
    pub async fn save(&self) -> Result<()> {
        let op = self.engine.store().operator().clone();

        for id in self.engine.records().ids().await {
            let rec = self.engine.records().get(id).await?;
            let mut rec = rec.lock().await;
            if !rec.dirty {
                continue;
            }
            let json = serde_json::to_vec_pretty(&*rec).context("encoding record")?;
            op.write(&record_key(id), json)
                .await
                .with_context(|| format!("writing record {id}"))?;
            rec.dirty = false;
        }

        let json = serde_json::to_vec_pretty(&self.index).context("encoding path index")?;
        op.write(PATHS_KEY, json)
            .await
            .context("writing path index")?;
        Ok(())
    }
}

fn record_key(id: RecordId) -> String {
    format!("records/{:016x}.json", id.0)
}

fn normalize(path: &str) -> Result<String> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        anyhow::bail!("path must name a file, not the root");
    }
    Ok(format!("/{trimmed}"))
}
