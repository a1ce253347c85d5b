// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! State shared by every entity and the operations that act on it
//! regardless of whether the entity is a directory or a file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::fs::FileSystem;
use crate::types::{blocks_for, Attr, FileKind, NodeId, SetattrRequest, BLOCK_SIZE};

/// Identity, attributes, extended attributes and tree position of an entity.
///
/// The parent link is a `NodeId` into the engine's node table, never an
/// owning reference.
#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) attrs: Attr,
    pub(crate) xattrs: HashMap<String, Vec<u8>>,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        name: &str,
        kind: FileKind,
        perm: u32,
        parent: Option<NodeId>,
        uid: u32,
        gid: u32,
    ) -> Self {
        let now = SystemTime::now();
        let attrs = Attr {
            ino: id.0,
            size: 0,
            blocks: 0,
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
            kind,
            perm: perm & 0o7777,
            nlink: 1,
            uid,
            gid,
            rdev: 0,
            flags: 0,
            blksize: BLOCK_SIZE,
        };

        debug!(ino = id.0, name, "initialized node");
        Self {
            id,
            name: name.to_string(),
            parent,
            attrs,
            xattrs: HashMap::new(),
        }
    }

    pub(crate) fn is_dir(&self) -> bool {
        self.attrs.kind == FileKind::Directory
    }

    /// Archive nodes are read-only views of version history. None exist yet.
    pub(crate) fn is_archive(&self) -> bool {
        false
    }

    pub(crate) fn attr(&self) -> Attr {
        self.attrs.clone()
    }

    pub(crate) fn touch_atime(&mut self) {
        self.attrs.atime = SystemTime::now();
    }

    pub(crate) fn touch_mtime(&mut self) {
        self.attrs.mtime = SystemTime::now();
    }

    pub(crate) fn set_size(&mut self, size: u64) {
        self.attrs.size = size;
        self.attrs.blocks = blocks_for(size);
    }

    /// Apply every present field of `req` except the size, which only files
    /// know how to honour.
    pub(crate) fn apply_setattr(&mut self, req: &SetattrRequest) {
        let ino = self.id.0;

        if req.handle.is_some() {
            debug!(ino, "handle attr is not stored");
        }
        if let Some(size) = req.size {
            if self.is_dir() {
                debug!(ino, size, "ignoring size change on a directory");
            }
        }
        if let Some(atime) = req.atime {
            debug!(ino, ?atime, "setting atime");
            self.attrs.atime = atime;
        }
        if req.atime_now {
            debug!(ino, "setting atime to now");
            self.touch_atime();
        }
        if let Some(mtime) = req.mtime {
            debug!(ino, ?mtime, "setting mtime");
            self.attrs.mtime = mtime;
        }
        if req.mtime_now {
            debug!(ino, "setting mtime to now");
            self.touch_mtime();
        }
        if let Some(mode) = req.mode {
            debug!(ino, mode = format_args!("{:o}", mode), "setting mode");
            self.attrs.perm = mode & 0o7777;
        }
        if let Some(uid) = req.uid {
            debug!(ino, uid, "setting uid");
            self.attrs.uid = uid;
        }
        if let Some(gid) = req.gid {
            debug!(ino, gid, "setting gid");
            self.attrs.gid = gid;
        }
        if req.lock_owner.is_some() {
            debug!(ino, "lock owner is not implemented");
        }
        if let Some(bkuptime) = req.bkuptime {
            debug!(ino, ?bkuptime, "bkuptime is not stored");
        }
        if let Some(chgtime) = req.chgtime {
            debug!(ino, ?chgtime, "chgtime is not stored");
        }
        if let Some(crtime) = req.crtime {
            debug!(ino, ?crtime, "setting crtime");
            self.attrs.crtime = crtime;
        }
        if let Some(flags) = req.flags {
            debug!(ino, flags, "setting flags");
            self.attrs.flags = flags;
        }
    }

    /// Look up an extended attribute, cut down to `max_len` bytes if given.
    pub(crate) fn xattr(&self, name: &str, max_len: Option<usize>) -> FsResult<Vec<u8>> {
        let value = self.xattrs.get(name).ok_or(FsError::NoAttribute)?;
        let len = max_len.map_or(value.len(), |max| max.min(value.len()));
        Ok(value[..len].to_vec())
    }
}

impl FileSystem {
    /// Attribute snapshot for `id`.
    pub fn attr(&self, id: NodeId) -> FsResult<Attr> {
        let _log = self.span().enter();
        let tree = self.lock();
        let attr = tree.get(id)?.node().attr();
        debug!(ino = id.0, "attr");
        Ok(attr)
    }

    /// Partially update the attributes of `id`.
    ///
    /// A size change on a file runs as its own locked phase; the lock is
    /// released before the remaining fields are applied under a fresh
    /// acquisition.
    pub fn setattr(&self, id: NodeId, req: &SetattrRequest) -> FsResult<Attr> {
        let _log = self.span().enter();
        self.check_writable()?;

        match req.size {
            Some(size) => match self.truncate(id, size) {
                Ok(()) => self.setattr_node(id, &req.without_size()),
                Err(FsError::IsADirectory) => self.setattr_node(id, req),
                Err(err) => Err(err),
            },
            None => self.setattr_node(id, req),
        }
    }

    fn setattr_node(&self, id: NodeId, req: &SetattrRequest) -> FsResult<Attr> {
        let mut tree = self.lock();
        let node = tree.get_mut(id)?.node_mut();
        self.ensure_mutable(node)?;
        node.apply_setattr(req);
        Ok(node.attr())
    }

    /// Permission probe. Always granted; enforcement would belong to open.
    pub fn access(&self, id: NodeId, mask: i32) -> FsResult<()> {
        let _log = self.span().enter();
        debug!(ino = id.0, mask, "access");
        Ok(())
    }

    /// The kernel will not refer to `id` again.
    pub fn forget(&self, id: NodeId) {
        let _log = self.span().enter();
        debug!(ino = id.0, "forget");
    }

    /// Full path of `id`, rebuilt from the parent links on every call.
    pub fn path(&self, id: NodeId) -> FsResult<PathBuf> {
        let tree = self.lock();
        tree.path(id)
    }

    pub fn getxattr(&self, id: NodeId, name: &str, max_len: Option<usize>) -> FsResult<Vec<u8>> {
        let _log = self.span().enter();
        self.check_writable()?;
        let tree = self.lock();
        let node = tree.get(id)?.node();
        self.ensure_mutable(node)?;

        match node.xattr(name, max_len) {
            Ok(value) => {
                debug!(ino = id.0, name, "getting xattr");
                Ok(value)
            }
            Err(err) => {
                debug!(ino = id.0, name, "no such xattr");
                Err(err)
            }
        }
    }

    /// Insert or overwrite an extended attribute.
    pub fn setxattr(&self, id: NodeId, name: &str, value: &[u8]) -> FsResult<()> {
        let _log = self.span().enter();
        self.check_writable()?;
        let mut tree = self.lock();
        let node = tree.get_mut(id)?.node_mut();
        self.ensure_mutable(node)?;

        debug!(ino = id.0, name, len = value.len(), "setting xattr");
        node.xattrs.insert(name.to_string(), value.to_vec());
        Ok(())
    }

    pub fn listxattr(&self, id: NodeId) -> FsResult<Vec<String>> {
        let _log = self.span().enter();
        self.check_writable()?;
        let tree = self.lock();
        let node = tree.get(id)?.node();
        self.ensure_mutable(node)?;

        debug!(ino = id.0, "listing xattr names");
        Ok(node.xattrs.keys().cloned().collect())
    }

    pub fn removexattr(&self, id: NodeId, name: &str) -> FsResult<()> {
        let _log = self.span().enter();
        self.check_writable()?;
        let mut tree = self.lock();
        let node = tree.get_mut(id)?.node_mut();
        self.ensure_mutable(node)?;

        if node.xattrs.remove(name).is_some() {
            debug!(ino = id.0, name, "removed xattr");
            Ok(())
        } else {
            debug!(ino = id.0, name, "could not remove missing xattr");
            Err(FsError::NoAttribute)
        }
    }
}
