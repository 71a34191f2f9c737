//! Ancestry-based classification: is this entry under the reserved subtree?
//!
//! Classification is a property of the entry's *current* position in the
//! naming tree, so it is re-evaluated on every read and write — never cached
//! per file. Moving a file in or out of the reserved subtree changes
//! behavior on the very next operation with no invalidation step.
//!
//! A consequence the engine preserves deliberately: a hard-linked file
//! reachable through both an encrypted and a plain path is classified per
//! access path, so the same record can look ciphered via one name and
//! plain via another.

use std::collections::HashMap;

use pocketfs_core::RESERVED_DIR;

/// Opaque handle to a directory entry in the surrounding naming tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(pub usize);

/// Read-only view of the naming tree, owned by the surrounding filesystem.
///
/// Convention: `parent(root) == root`. The ancestor chain of every entry is
/// finite and rooted, so walks always terminate.
pub trait Namespace {
    fn root(&self) -> EntryId;
    fn parent(&self, entry: EntryId) -> EntryId;
    fn name(&self, entry: EntryId) -> &str;
}

/// True iff the topmost ancestor of `entry` (the child of the root on its
/// ancestor chain) is named exactly [`RESERVED_DIR`].
///
/// Only the *root* ancestor counts: `/encrypt/sub/file` classifies
/// encrypted, a sibling named `encrypted` does not.
pub fn is_encrypted<N: Namespace>(ns: &N, entry: EntryId) -> bool {
    let mut topmost;
    let mut walk = entry;
    loop {
        topmost = walk;
        walk = ns.parent(walk);
        if walk == ns.parent(walk) {
            break;
        }
    }
    ns.name(topmost) == RESERVED_DIR
}

/// Render the absolute path of an entry (`/a/b/c`), for log fields.
pub fn path_of<N: Namespace>(ns: &N, entry: EntryId) -> String {
    let mut names: Vec<&str> = Vec::new();
    let mut walk = entry;
    while walk != ns.parent(walk) {
        names.push(ns.name(walk));
        walk = ns.parent(walk);
    }
    if names.is_empty() {
        return "/".into();
    }
    let mut path = String::new();
    for name in names.iter().rev() {
        path.push('/');
        path.push_str(name);
    }
    path
}

// ── In-memory namespace ───────────────────────────────────────────────────

struct Node {
    parent: EntryId,
    name: String,
}

/// Arena-backed naming tree for the CLI and tests.
///
/// The real consumer of this engine supplies its own `Namespace`; this one
/// exists so the engine can be exercised without a surrounding filesystem.
pub struct MemNamespace {
    nodes: Vec<Node>,
    children: HashMap<(EntryId, String), EntryId>,
}

impl Default for MemNamespace {
    fn default() -> Self {
        Self::new()
    }
}

impl MemNamespace {
    pub fn new() -> Self {
        let root = Node {
            parent: EntryId(0),
            name: String::new(),
        };
        MemNamespace {
            nodes: vec![root],
            children: HashMap::new(),
        }
    }

    /// Get or create the child `name` under `parent`.
    pub fn child(&mut self, parent: EntryId, name: &str) -> EntryId {
        if let Some(&id) = self.children.get(&(parent, name.to_string())) {
            return id;
        }
        let id = EntryId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            name: name.to_string(),
        });
        self.children.insert((parent, name.to_string()), id);
        id
    }

    /// Get or create the entry for a slash-separated absolute path.
    /// `"/"` (or the empty string) resolves to the root.
    pub fn entry_for_path(&mut self, path: &str) -> EntryId {
        let mut at = self.root();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            at = self.child(at, part);
        }
        at
    }

    /// Reparent an entry, e.g. to model a rename across the reserved
    /// boundary. Classification follows on the next operation.
    pub fn reparent(&mut self, entry: EntryId, new_parent: EntryId) {
        let name = self.nodes[entry.0].name.clone();
        let old_parent = self.nodes[entry.0].parent;
        self.children.remove(&(old_parent, name.clone()));
        self.nodes[entry.0].parent = new_parent;
        self.children.insert((new_parent, name), entry);
    }
}

impl Namespace for MemNamespace {
    fn root(&self) -> EntryId {
        EntryId(0)
    }

    fn parent(&self, entry: EntryId) -> EntryId {
        self.nodes[entry.0].parent
    }

    fn name(&self, entry: EntryId) -> &str {
        &self.nodes[entry.0].name
    }
}
