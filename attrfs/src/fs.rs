// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: In-memory attribute tree with path based dispatch.
// Author: Lukas Bower

//! In-memory attribute tree.
//! Mirrors the sysfs layout under `devices/system/cpu/cpu<N>` and forwards
//! reads and writes to registered attribute callbacks.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, trace};

use crate::mode::{Access, Mode};
use crate::{AttrError, AttrHost, BinAttr, BinEntry, NodeId, TextAttr, TextEntry};

/// Path of the directory holding per-CPU device nodes.
pub const CPU_ROOT: &str = "devices/system/cpu";

/// Largest transfer handed to a binary attribute in one call.
pub const PAGE_SIZE: usize = 4096;

const ROOT: NodeId = NodeId(0);

enum Kind {
    Dir(BTreeMap<String, NodeId>),
    Text(Arc<dyn TextAttr>),
    Bin { ops: Arc<dyn BinAttr>, size: u64 },
}

struct Node {
    parent: Option<NodeId>,
    mode: Mode,
    kind: Kind,
}

#[derive(Default)]
struct Tree {
    nodes: HashMap<NodeId, Node>,
    failures: BTreeSet<String>,
}

impl Tree {
    fn children(&self, dir: NodeId) -> Option<&BTreeMap<String, NodeId>> {
        match self.nodes.get(&dir).map(|n| &n.kind) {
            Some(Kind::Dir(children)) => Some(children),
            _ => None,
        }
    }

    fn children_mut(&mut self, dir: NodeId) -> Option<&mut BTreeMap<String, NodeId>> {
        match self.nodes.get_mut(&dir).map(|n| &mut n.kind) {
            Some(Kind::Dir(children)) => Some(children),
            _ => None,
        }
    }

    fn resolve(&self, path: &str) -> Option<NodeId> {
        let mut node = ROOT;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            node = *self.children(node)?.get(component)?;
        }
        Some(node)
    }

    fn check_failure(&self, name: &str) -> Result<(), AttrError> {
        if self.failures.contains(name) {
            return Err(AttrError::NoMemory(name.to_owned()));
        }
        Ok(())
    }

    fn insert(&mut self, id: NodeId, parent: NodeId, name: &str, mode: Mode, kind: Kind) {
        if let Some(children) = self.children_mut(parent) {
            children.insert(name.to_owned(), id);
        }
        self.nodes.insert(
            id,
            Node {
                parent: Some(parent),
                mode,
                kind,
            },
        );
    }

    fn unlink(&mut self, parent: NodeId, name: &str) {
        let Some(id) = self.children_mut(parent).and_then(|c| c.remove(name)) else {
            return;
        };
        self.drop_subtree(id);
    }

    fn drop_subtree(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.remove(&id) {
            if let Kind::Dir(children) = node.kind {
                for child in children.into_values() {
                    self.drop_subtree(child);
                }
            }
        }
    }

    fn name_of(&self, id: NodeId) -> Option<String> {
        let parent = self.nodes.get(&id)?.parent?;
        self.children(parent)?
            .iter()
            .find(|(_, child)| **child == id)
            .map(|(name, _)| name.clone())
    }
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Leaf name.
    pub name: String,
    /// Permission bits.
    pub mode: Mode,
    /// `true` for directories.
    pub is_dir: bool,
    /// Declared size for binary attributes, zero otherwise.
    pub size: u64,
}

/// In-memory attribute tree implementing [`AttrHost`].
pub struct AttrFs {
    tree: Mutex<Tree>,
    next_id: AtomicU64,
}

impl Default for AttrFs {
    fn default() -> Self {
        Self::new()
    }
}

impl AttrFs {
    /// Create an empty tree containing only the CPU root directory.
    pub fn new() -> Self {
        let mut tree = Tree::default();
        tree.nodes.insert(
            ROOT,
            Node {
                parent: None,
                mode: Mode::DIR,
                kind: Kind::Dir(BTreeMap::new()),
            },
        );
        let fs = Self {
            tree: Mutex::new(tree),
            next_id: AtomicU64::new(1),
        };
        let mut parent = ROOT;
        for component in CPU_ROOT.split('/') {
            parent = fs.mkdir(parent, component);
        }
        fs
    }

    /// Create a tree with device nodes for CPUs `0..count`.
    pub fn with_cpus(count: u32) -> Self {
        let fs = Self::new();
        for cpu in 0..count {
            fs.add_cpu(cpu);
        }
        fs
    }

    fn lock(&self) -> MutexGuard<'_, Tree> {
        match self.tree.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn alloc_id(&self) -> NodeId {
        NodeId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn mkdir(&self, parent: NodeId, name: &str) -> NodeId {
        let mut tree = self.lock();
        if let Some(existing) = tree.children(parent).and_then(|c| c.get(name)) {
            return *existing;
        }
        let id = self.alloc_id();
        tree.insert(id, parent, name, Mode::DIR, Kind::Dir(BTreeMap::new()));
        id
    }

    /// Publish the device node for `cpu`.
    pub fn add_cpu(&self, cpu: u32) -> NodeId {
        let root = self.lock().resolve(CPU_ROOT).unwrap_or(ROOT);
        self.mkdir(root, &format!("cpu{cpu}"))
    }

    /// Withdraw the device node for `cpu` together with everything below it.
    pub fn remove_cpu(&self, cpu: u32) {
        let mut tree = self.lock();
        if let Some(root) = tree.resolve(CPU_ROOT) {
            tree.unlink(root, &format!("cpu{cpu}"));
        }
    }

    /// Make every subsequent registration of a node called `name` fail.
    pub fn inject_failure(&self, name: &str) {
        self.lock().failures.insert(name.to_owned());
    }

    /// Drop all injected failures.
    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Report whether a node exists at `path`.
    pub fn exists(&self, path: &str) -> bool {
        self.lock().resolve(path).is_some()
    }

    /// List the entries of the directory at `path`.
    pub fn list(&self, path: &str) -> Result<Vec<DirEntry>, AttrError> {
        let tree = self.lock();
        let dir = tree
            .resolve(path)
            .ok_or_else(|| AttrError::NotFound(path.to_owned()))?;
        let children = tree
            .children(dir)
            .ok_or_else(|| AttrError::Unsupported(path.to_owned()))?;
        Ok(children
            .iter()
            .filter_map(|(name, id)| {
                let node = tree.nodes.get(id)?;
                let (is_dir, size) = match &node.kind {
                    Kind::Dir(_) => (true, 0),
                    Kind::Text(_) => (false, 0),
                    Kind::Bin { size, .. } => (false, *size),
                };
                Some(DirEntry {
                    name: name.clone(),
                    mode: node.mode,
                    is_dir,
                    size,
                })
            })
            .collect())
    }

    /// Permission bits of the node at `path`.
    pub fn mode(&self, path: &str) -> Option<Mode> {
        let tree = self.lock();
        let id = tree.resolve(path)?;
        tree.nodes.get(&id).map(|n| n.mode)
    }

    fn text_ops(&self, path: &str, access: Access) -> Result<Arc<dyn TextAttr>, AttrError> {
        let tree = self.lock();
        let node = tree
            .resolve(path)
            .and_then(|id| tree.nodes.get(&id))
            .ok_or_else(|| AttrError::NotFound(path.to_owned()))?;
        if !node.mode.allows(access) {
            return Err(AttrError::Permission(path.to_owned()));
        }
        match &node.kind {
            Kind::Text(ops) => Ok(ops.clone()),
            _ => Err(AttrError::Unsupported(path.to_owned())),
        }
    }

    fn bin_ops(&self, path: &str, access: Access) -> Result<(Arc<dyn BinAttr>, u64), AttrError> {
        let tree = self.lock();
        let node = tree
            .resolve(path)
            .and_then(|id| tree.nodes.get(&id))
            .ok_or_else(|| AttrError::NotFound(path.to_owned()))?;
        if !node.mode.allows(access) {
            return Err(AttrError::Permission(path.to_owned()));
        }
        match &node.kind {
            Kind::Bin { ops, size } => Ok((ops.clone(), *size)),
            _ => Err(AttrError::Unsupported(path.to_owned())),
        }
    }

    /// Read a text attribute.
    pub fn show(&self, path: &str) -> Result<String, AttrError> {
        let ops = self.text_ops(path, Access::Read)?;
        trace!("show {path}");
        ops.show()
    }

    /// Write a text attribute.
    pub fn store(&self, path: &str, text: &str) -> Result<usize, AttrError> {
        let ops = self.text_ops(path, Access::Write)?;
        trace!("store {path} <- {:?}", text);
        ops.store(text)
    }

    /// Read a binary attribute, clamped to its declared size and to
    /// [`PAGE_SIZE`].
    pub fn read(&self, path: &str, offset: u64, count: usize) -> Result<Vec<u8>, AttrError> {
        let (ops, size) = self.bin_ops(path, Access::Read)?;
        let mut count = count.min(PAGE_SIZE);
        if size > 0 {
            if offset >= size {
                return Ok(Vec::new());
            }
            count = count.min((size - offset) as usize);
        }
        if count == 0 {
            return Ok(Vec::new());
        }
        ops.read(offset, count)
    }

    /// Write a binary attribute, clamped to its declared size and to
    /// [`PAGE_SIZE`].
    pub fn write(&self, path: &str, offset: u64, data: &[u8]) -> Result<usize, AttrError> {
        let (ops, size) = self.bin_ops(path, Access::Write)?;
        let mut data = &data[..data.len().min(PAGE_SIZE)];
        if size > 0 {
            if offset >= size {
                return Err(AttrError::TooBig { offset, size });
            }
            let room = (size - offset) as usize;
            if data.len() > room {
                data = &data[..room];
            }
        }
        if data.is_empty() {
            return Ok(0);
        }
        ops.write(offset, data)
    }
}

impl AttrHost for AttrFs {
    fn cpu_device(&self, cpu: u32) -> Option<NodeId> {
        self.lock().resolve(&format!("{CPU_ROOT}/cpu{cpu}"))
    }

    fn create_dir(&self, parent: NodeId, name: &str) -> Result<NodeId, AttrError> {
        let mut tree = self.lock();
        tree.check_failure(name)?;
        let children = tree
            .children(parent)
            .ok_or_else(|| AttrError::NotFound(parent.to_string()))?;
        if children.contains_key(name) {
            return Err(AttrError::Exists(name.to_owned()));
        }
        let id = self.alloc_id();
        tree.insert(id, parent, name, Mode::DIR, Kind::Dir(BTreeMap::new()));
        debug!("attrfs: created dir {name} ({id}) under {parent}");
        Ok(id)
    }

    fn remove_dir(&self, dir: NodeId) {
        let mut tree = self.lock();
        let parent = tree.nodes.get(&dir).and_then(|n| n.parent);
        match (parent, tree.name_of(dir)) {
            (Some(parent), Some(name)) => {
                tree.unlink(parent, &name);
                debug!("attrfs: removed dir {name} ({dir})");
            }
            _ => tree.drop_subtree(dir),
        }
    }

    fn create_group(&self, dir: NodeId, attrs: Vec<TextEntry>) -> Result<(), AttrError> {
        let mut tree = self.lock();
        let children = tree
            .children(dir)
            .ok_or_else(|| AttrError::NotFound(dir.to_string()))?;
        let mut seen = BTreeSet::new();
        for attr in &attrs {
            if children.contains_key(&attr.name) || !seen.insert(attr.name.as_str()) {
                return Err(AttrError::Exists(attr.name.clone()));
            }
            tree.check_failure(&attr.name)?;
        }
        let count = attrs.len();
        for attr in attrs {
            let id = self.alloc_id();
            tree.insert(id, dir, &attr.name, attr.mode, Kind::Text(attr.ops));
        }
        debug!("attrfs: added group of {count} text attributes to {dir}");
        Ok(())
    }

    fn remove_group(&self, dir: NodeId, names: &[String]) {
        let mut tree = self.lock();
        for name in names {
            tree.unlink(dir, name);
        }
    }

    fn create_bin_file(&self, dir: NodeId, attr: BinEntry) -> Result<(), AttrError> {
        let mut tree = self.lock();
        tree.check_failure(&attr.name)?;
        let children = tree
            .children(dir)
            .ok_or_else(|| AttrError::NotFound(dir.to_string()))?;
        if children.contains_key(&attr.name) {
            return Err(AttrError::Exists(attr.name));
        }
        let id = self.alloc_id();
        debug!(
            "attrfs: added binary attribute {} ({} bytes, mode {}) to {dir}",
            attr.name,
            attr.size,
            attr.mode.octal()
        );
        tree.insert(
            id,
            dir,
            &attr.name,
            attr.mode,
            Kind::Bin {
                ops: attr.ops,
                size: attr.size,
            },
        );
        Ok(())
    }

    fn remove_bin_file(&self, dir: NodeId, name: &str) {
        self.lock().unlink(dir, name);
    }
}
