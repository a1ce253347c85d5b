// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Directories and the operations that change the shape of the tree.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::error::{FsError, FsResult};
use crate::file::File;
use crate::fs::{Entity, FileSystem, Tree};
use crate::node::Node;
use crate::types::{Attr, Dirent, FileKind, NodeId};

#[derive(Clone, Debug)]
pub(crate) struct Dir {
    pub(crate) node: Node,
    pub(crate) children: HashMap<String, NodeId>,
}

impl Dir {
    pub(crate) fn new(node: Node) -> Self {
        Self {
            node,
            children: HashMap::new(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn child(&self, name: &str) -> FsResult<NodeId> {
        self.children.get(name).copied().ok_or(FsError::NotFound)
    }

    fn touch_structure(&mut self) {
        self.node.touch_mtime();
        self.node.touch_atime();
    }
}

impl FileSystem {
    /// Create an empty regular file named `name` under `parent`.
    ///
    /// An existing entry of the same name is replaced and dropped.
    pub fn create(
        &self,
        parent: NodeId,
        name: &str,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> FsResult<Attr> {
        let _log = self.span().enter();
        self.check_writable()?;
        let mut tree = self.lock();
        self.add_child(&mut tree, parent, name, FileKind::RegularFile, mode, (uid, gid))
    }

    /// Create an empty directory named `name` under `parent`.
    pub fn mkdir(
        &self,
        parent: NodeId,
        name: &str,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> FsResult<Attr> {
        let _log = self.span().enter();
        self.check_writable()?;
        let mut tree = self.lock();
        self.add_child(&mut tree, parent, name, FileKind::Directory, mode, (uid, gid))
    }

    fn add_child(
        &self,
        tree: &mut Tree,
        parent: NodeId,
        name: &str,
        kind: FileKind,
        mode: u32,
        (uid, gid): (u32, u32),
    ) -> FsResult<Attr> {
        self.ensure_mutable(&tree.dir(parent)?.node)?;

        let id = self.next_id(tree)?;
        let node = Node::new(id, name, kind, mode, Some(parent), uid, gid);
        let attr = node.attr();
        let entity = match kind {
            FileKind::Directory => Entity::Dir(Dir::new(node)),
            FileKind::RegularFile => Entity::File(File::new(node)),
        };

        let dir = tree.dir_mut(parent)?;
        let displaced = dir.children.insert(name.to_string(), id);
        dir.touch_structure();
        tree.entities.insert(id, entity);
        self.count_added(kind);

        if let Some(old) = displaced {
            let dropped = tree.remove_subtree(old);
            self.count_dropped(dropped);
            info!(parent = parent.0, name, ino = old.0, "replaced existing entry");
        }

        match kind {
            FileKind::Directory => info!(parent = parent.0, name, ino = id.0, "created directory"),
            FileKind::RegularFile => info!(parent = parent.0, name, ino = id.0, "created file"),
        }
        Ok(attr)
    }

    /// Unlink `name` from `parent`. Directories must be empty.
    pub fn remove(&self, parent: NodeId, name: &str) -> FsResult<()> {
        let _log = self.span().enter();
        self.check_writable()?;
        let mut tree = self.lock();

        let dir = tree.dir(parent)?;
        self.ensure_mutable(&dir.node)?;
        let child = dir.child(name)?;
        if let Entity::Dir(target) = tree.get(child)? {
            if !target.is_empty() {
                debug!(parent = parent.0, name, "refusing to remove non-empty directory");
                return Err(FsError::NotEmpty);
            }
        }

        let dir = tree.dir_mut(parent)?;
        dir.children.remove(name);
        dir.node.touch_mtime();

        let dropped = tree.remove_subtree(child);
        self.count_dropped(dropped);
        info!(parent = parent.0, name, ino = child.0, "removed entry");
        Ok(())
    }

    /// Move `old_name` in `parent` to `new_name` in `new_parent`.
    ///
    /// The moved entity keeps its identity. An existing destination entry of
    /// the same kind is replaced unless it is a non-empty directory.
    pub fn rename(
        &self,
        parent: NodeId,
        old_name: &str,
        new_parent: NodeId,
        new_name: &str,
    ) -> FsResult<()> {
        let _log = self.span().enter();
        self.check_writable()?;
        let mut tree = self.lock();

        let src = tree.dir(parent)?;
        self.ensure_mutable(&src.node)?;
        let child = src.child(old_name)?;
        let dst = tree.dir(new_parent)?;
        self.ensure_mutable(&dst.node)?;

        if parent == new_parent && old_name == new_name {
            return Ok(());
        }
        if tree.dir(child).is_ok() && tree.is_ancestor(child, new_parent) {
            debug!(
                ino = child.0,
                new_parent = new_parent.0,
                "refusing to move directory into itself"
            );
            return Err(FsError::InvalidArgument);
        }

        let displaced = dst.children.get(new_name).copied();
        if let Some(existing) = displaced {
            let moving_dir = tree.get(child)?.node().is_dir();
            match tree.get(existing)? {
                Entity::Dir(_) if !moving_dir => return Err(FsError::IsADirectory),
                Entity::Dir(target) if !target.is_empty() => return Err(FsError::NotEmpty),
                Entity::File(_) if moving_dir => return Err(FsError::NotADirectory),
                _ => {}
            }
        }

        let src = tree.dir_mut(parent)?;
        src.children.remove(old_name);
        src.touch_structure();

        let dst = tree.dir_mut(new_parent)?;
        dst.children.insert(new_name.to_string(), child);
        dst.touch_structure();

        let node = tree.get_mut(child)?.node_mut();
        node.name = new_name.to_string();
        node.parent = Some(new_parent);
        node.touch_mtime();

        if let Some(existing) = displaced {
            let dropped = tree.remove_subtree(existing);
            self.count_dropped(dropped);
        }

        info!(
            ino = child.0,
            from = old_name,
            to = new_name,
            new_parent = new_parent.0,
            "renamed entry"
        );
        Ok(())
    }

    /// Resolve `name` in `parent`. `.` and `..` get no special treatment.
    pub fn lookup(&self, parent: NodeId, name: &str) -> FsResult<Attr> {
        let _log = self.span().enter();
        let mut tree = self.lock();

        let dir = tree.dir_mut(parent)?;
        dir.node.touch_atime();
        let child = dir.child(name);
        debug!(parent = parent.0, name, found = child.is_ok(), "lookup");
        Ok(tree.get(child?)?.node().attr())
    }

    /// Every child of `id` in no particular order.
    pub fn read_dir_all(&self, id: NodeId) -> FsResult<Vec<Dirent>> {
        let _log = self.span().enter();
        let mut tree = self.lock();

        let dir = tree.dir_mut(id)?;
        dir.node.touch_atime();
        let children: Vec<(String, NodeId)> = dir
            .children
            .iter()
            .map(|(name, child)| (name.clone(), *child))
            .collect();

        let entries = children
            .into_iter()
            .filter_map(|(name, child)| {
                tree.entities.get(&child).map(|entity| Dirent {
                    ino: child.0,
                    kind: entity.node().attrs.kind,
                    name,
                })
            })
            .collect::<Vec<_>>();
        debug!(ino = id.0, entries = entries.len(), "read directory");
        Ok(entries)
    }
}
