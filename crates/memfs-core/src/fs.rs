// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The filesystem engine: node table, counters and the single lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{info, info_span, Span};

use crate::config::Config;
use crate::dir::Dir;
use crate::error::{FsError, FsResult};
use crate::file::File;
use crate::node::Node;
use crate::sequence::Sequence;
use crate::types::{CapacityReport, FileKind, FsStats, NodeId};

/// Default mode of the root directory.
const ROOT_MODE: u32 = 0o755;

/// A directory or a file, each owning its shared [`Node`] state.
#[derive(Debug)]
pub(crate) enum Entity {
    Dir(Dir),
    File(File),
}

impl Entity {
    pub(crate) fn node(&self) -> &Node {
        match self {
            Entity::Dir(dir) => &dir.node,
            Entity::File(file) => &file.node,
        }
    }

    pub(crate) fn node_mut(&mut self) -> &mut Node {
        match self {
            Entity::Dir(dir) => &mut dir.node,
            Entity::File(file) => &mut file.node,
        }
    }
}

/// Everything the engine lock protects.
#[derive(Debug)]
pub(crate) struct Tree {
    pub(crate) entities: HashMap<NodeId, Entity>,
    pub(crate) sequence: Sequence,
}

impl Tree {
    pub(crate) fn get(&self, id: NodeId) -> FsResult<&Entity> {
        self.entities.get(&id).ok_or(FsError::NotFound)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> FsResult<&mut Entity> {
        self.entities.get_mut(&id).ok_or(FsError::NotFound)
    }

    pub(crate) fn dir(&self, id: NodeId) -> FsResult<&Dir> {
        match self.get(id)? {
            Entity::Dir(dir) => Ok(dir),
            Entity::File(_) => Err(FsError::NotADirectory),
        }
    }

    pub(crate) fn dir_mut(&mut self, id: NodeId) -> FsResult<&mut Dir> {
        match self.get_mut(id)? {
            Entity::Dir(dir) => Ok(dir),
            Entity::File(_) => Err(FsError::NotADirectory),
        }
    }

    pub(crate) fn file_mut(&mut self, id: NodeId) -> FsResult<&mut File> {
        match self.get_mut(id)? {
            Entity::File(file) => Ok(file),
            Entity::Dir(_) => Err(FsError::IsADirectory),
        }
    }

    /// Walk parent links up to the root, then join the names back down.
    pub(crate) fn path(&self, id: NodeId) -> FsResult<PathBuf> {
        let mut names = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.get(current)?.node();
            names.push(node.name.as_str());
            cursor = node.parent;
        }

        let mut path = PathBuf::new();
        for name in names.iter().rev() {
            path.push(name);
        }
        Ok(path)
    }

    /// Whether `ancestor` is `id` itself or lies on its chain of parents.
    pub(crate) fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.entities.get(&current).and_then(|e| e.node().parent);
        }
        false
    }

    /// Evict `id` and everything below it, returning what was dropped.
    pub(crate) fn remove_subtree(&mut self, id: NodeId) -> FsStats {
        let mut dropped = FsStats::default();
        let mut pending = vec![id];

        while let Some(current) = pending.pop() {
            match self.entities.remove(&current) {
                Some(Entity::Dir(dir)) => {
                    dropped.ndirs += 1;
                    pending.extend(dir.children.into_values());
                }
                Some(Entity::File(file)) => {
                    dropped.nfiles += 1;
                    dropped.nbytes += file.data.len() as u64;
                }
                None => {}
            }
        }
        dropped
    }
}

/// An in-memory filesystem.
///
/// All tree state sits behind one mutex. The counters are atomics so that
/// [`FileSystem::stats`] and [`FileSystem::capacity`] can read them without
/// the lock; they are only ever written while the lock is held.
#[derive(Debug)]
pub struct FileSystem {
    mount: PathBuf,
    config: Config,
    tree: Mutex<Tree>,
    root: NodeId,
    nfiles: AtomicU64,
    ndirs: AtomicU64,
    nbytes: AtomicU64,
    uid: u32,
    gid: u32,
    readonly: bool,
    span: Span,
}

impl FileSystem {
    /// Build an empty filesystem whose root directory is named after `mount`.
    pub fn new(mount: impl AsRef<Path>, config: Config) -> FsResult<Self> {
        let mount = mount.as_ref().to_path_buf();
        let span = info_span!(
            "memfs",
            host = %config.name,
            mount = %mount.display()
        );
        let uid = nix::unistd::getuid().as_raw();
        let gid = nix::unistd::getgid().as_raw();

        let mut sequence = Sequence::new();
        let root = NodeId(sequence.next()?);
        let root_dir = {
            let _log = span.enter();
            let name = mount.to_string_lossy();
            let node = Node::new(root, &name, FileKind::Directory, ROOT_MODE, None, uid, gid);
            info!(ino = root.0, "created root directory");
            Dir::new(node)
        };

        let mut entities = HashMap::new();
        entities.insert(root, Entity::Dir(root_dir));

        let readonly = config.readonly;
        Ok(Self {
            mount,
            config,
            tree: Mutex::new(Tree { entities, sequence }),
            root,
            nfiles: AtomicU64::new(0),
            ndirs: AtomicU64::new(1),
            nbytes: AtomicU64::new(0),
            uid,
            gid,
            readonly,
            span,
        })
    }

    /// Identity of the root directory.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Owner assigned to nodes when no caller identity is supplied.
    pub fn owner(&self) -> (u32, u32) {
        (self.uid, self.gid)
    }

    pub fn stats(&self) -> FsStats {
        FsStats {
            nfiles: self.nfiles.load(Ordering::Relaxed),
            ndirs: self.ndirs.load(Ordering::Relaxed),
            nbytes: self.nbytes.load(Ordering::Relaxed),
        }
    }

    pub fn capacity(&self) -> CapacityReport {
        CapacityReport::compute(self.config.cache_size, self.stats())
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn check_writable(&self) -> FsResult<()> {
        if self.readonly {
            Err(FsError::PermissionDenied)
        } else {
            Ok(())
        }
    }

    pub(crate) fn ensure_mutable(&self, node: &Node) -> FsResult<()> {
        if self.readonly || node.is_archive() {
            Err(FsError::PermissionDenied)
        } else {
            Ok(())
        }
    }

    pub(crate) fn next_id(&self, tree: &mut Tree) -> FsResult<NodeId> {
        tree.sequence.next().map(NodeId)
    }

    pub(crate) fn grow_bytes(&self, delta: u64) {
        self.nbytes.fetch_add(delta, Ordering::Relaxed);
    }

    pub(crate) fn shrink_bytes(&self, delta: u64) {
        self.nbytes.fetch_sub(delta, Ordering::Relaxed);
    }

    pub(crate) fn count_added(&self, kind: FileKind) {
        match kind {
            FileKind::Directory => self.ndirs.fetch_add(1, Ordering::Relaxed),
            FileKind::RegularFile => self.nfiles.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub(crate) fn count_dropped(&self, dropped: FsStats) {
        self.nfiles.fetch_sub(dropped.nfiles, Ordering::Relaxed);
        self.ndirs.fetch_sub(dropped.ndirs, Ordering::Relaxed);
        self.nbytes.fetch_sub(dropped.nbytes, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_fs() -> FileSystem {
        FileSystem::new("/mnt/memfs", Config::default()).unwrap()
    }

    #[test]
    fn new_filesystem_has_only_root() {
        let fs = test_fs();
        assert_eq!(fs.root(), NodeId(1));
        assert_eq!(
            fs.stats(),
            FsStats {
                nfiles: 0,
                ndirs: 1,
                nbytes: 0
            }
        );

        let attr = fs.attr(fs.root()).unwrap();
        assert!(attr.is_dir());
        assert_eq!(attr.perm, 0o755);
        assert_eq!(fs.path(fs.root()).unwrap(), PathBuf::from("/mnt/memfs"));
    }

    #[test]
    fn readonly_is_copied_from_config() {
        let config = Config {
            readonly: true,
            ..Config::default()
        };
        let fs = FileSystem::new("/mnt/ro", config).unwrap();
        assert!(fs.is_readonly());
        assert_eq!(fs.check_writable(), Err(FsError::PermissionDenied));
    }

    #[test]
    fn capacity_follows_byte_counter() {
        let config = Config {
            cache_size: 4096 * 10,
            ..Config::default()
        };
        let fs = FileSystem::new("/mnt/cap", config).unwrap();
        fs.grow_bytes(5000);

        let report = fs.capacity();
        assert_eq!(report.total_blocks, 10);
        assert_eq!(report.used_blocks, 2);
        assert_eq!(report.free_blocks, 8);
        assert_eq!(report.total_files, 1);
    }

    #[test]
    fn data_past_the_cache_size_saturates_the_report() {
        let config = Config {
            cache_size: 4096,
            ..Config::default()
        };
        let fs = FileSystem::new("/mnt/small", config).unwrap();
        fs.grow_bytes(3 * 4096);

        let report = fs.capacity();
        assert_eq!(report.total_blocks, 1);
        assert_eq!(report.used_blocks, 3);
        assert_eq!(report.free_blocks, 0);
        assert_eq!(report.available_blocks, 0);
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let fs = std::sync::Arc::new(test_fs());
        let clone = fs.clone();
        let result = std::thread::spawn(move || {
            let _guard = clone.lock();
            panic!("poison the lock");
        })
        .join();
        assert!(result.is_err());

        assert!(fs.attr(fs.root()).is_ok());
    }

    #[test]
    fn tree_path_and_ancestry() {
        let fs = test_fs();
        let (uid, gid) = fs.owner();
        let sub = fs.mkdir(fs.root(), "sub", 0o755, uid, gid).unwrap();
        let leaf = fs
            .create(NodeId(sub.ino), "leaf.txt", 0o644, uid, gid)
            .unwrap();

        let tree = fs.lock();
        assert_eq!(
            tree.path(NodeId(leaf.ino)).unwrap(),
            PathBuf::from("/mnt/memfs/sub/leaf.txt")
        );
        assert!(tree.is_ancestor(fs.root(), NodeId(leaf.ino)));
        assert!(tree.is_ancestor(NodeId(sub.ino), NodeId(sub.ino)));
        assert!(!tree.is_ancestor(NodeId(leaf.ino), NodeId(sub.ino)));
    }
}
