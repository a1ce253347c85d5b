// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! memfs FUSE adapter implementation
//!
//! Maps FUSE operations onto `memfs_core::FileSystem` calls. Inode numbers
//! are engine identities; the root identity is 1, which is `FUSE_ROOT_ID`.
//! All state lives in the engine, so file handles are always 0.

#[cfg(not(all(feature = "fuse", target_os = "linux")))]
compile_error!("This module requires the 'fuse' feature on Linux");

use crate::errno::errno;
use crate::xattr::{pack_names, sized_reply, SetMode, XattrReply};
use fuser::{
    FileAttr, FileType, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request, TimeOrNow,
    FUSE_ROOT_ID,
};
use libc::{c_int, EINVAL, ENAMETOOLONG};
use memfs_core::{Attr, Dirent, FileKind, FileSystem, NodeId, SetattrRequest, MAX_NAME_LENGTH};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

/// How long the kernel may cache attributes and entries.
const TTL: Duration = Duration::from_secs(1);

/// Handle returned by open, opendir and create.
const STATELESS_FH: u64 = 0;

pub struct MemFsFuse {
    fs: Arc<FileSystem>,
}

impl MemFsFuse {
    pub fn new(fs: Arc<FileSystem>) -> Self {
        debug_assert_eq!(fs.root().as_u64(), FUSE_ROOT_ID);
        Self { fs }
    }
}

fn file_type(kind: FileKind) -> FileType {
    match kind {
        FileKind::Directory => FileType::Directory,
        FileKind::RegularFile => FileType::RegularFile,
    }
}

fn attr_to_fuse(attr: &Attr) -> FileAttr {
    FileAttr {
        ino: attr.ino,
        size: attr.size,
        blocks: attr.blocks,
        atime: attr.atime,
        mtime: attr.mtime,
        ctime: attr.ctime,
        crtime: attr.crtime,
        kind: file_type(attr.kind),
        perm: (attr.perm & 0o7777) as u16,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: attr.rdev,
        blksize: attr.blksize,
        flags: attr.flags,
    }
}

/// Names must be UTF-8 and fit in a single path component.
fn component(name: &OsStr) -> Result<&str, c_int> {
    let name = name.to_str().ok_or(EINVAL)?;
    if name.len() > MAX_NAME_LENGTH as usize {
        return Err(ENAMETOOLONG);
    }
    Ok(name)
}

fn apply_time(time: Option<TimeOrNow>) -> (Option<SystemTime>, bool) {
    match time {
        Some(TimeOrNow::SpecificTime(at)) => (Some(at), false),
        Some(TimeOrNow::Now) => (None, true),
        None => (None, false),
    }
}

/// Directory entries from `offset` on, each with the offset of the entry after it.
///
/// Children are sorted by name so offsets stay stable between paged calls.
/// The kernel resolves ".." itself; its inode here is informational.
fn dir_page(ino: u64, mut entries: Vec<Dirent>, offset: i64) -> Vec<(u64, i64, FileType, String)> {
    entries.sort_unstable_by(|a, b| a.name.cmp(&b.name));
    let dots = [(ino, FileType::Directory, "."), (ino, FileType::Directory, "..")]
        .map(|(ino, kind, name)| (ino, kind, name.to_string()));
    let children = entries
        .into_iter()
        .map(|entry| (entry.ino, file_type(entry.kind), entry.name));

    let skip = usize::try_from(offset).unwrap_or(0);
    dots.into_iter()
        .chain(children)
        .enumerate()
        .skip(skip)
        .map(|(i, (ino, kind, name))| (ino, (i + 1) as i64, kind, name))
        .collect()
}

fn reply_xattr(reply: ReplyXattr, answer: XattrReply) {
    match answer {
        XattrReply::Size(len) => reply.size(len),
        XattrReply::Data(data) => reply.data(&data),
        XattrReply::Error(code) => reply.error(code),
    }
}

impl fuser::Filesystem for MemFsFuse {
    fn init(&mut self, _req: &Request, _config: &mut fuser::KernelConfig) -> Result<(), c_int> {
        info!(
            mount = %self.fs.mount_point().display(),
            readonly = self.fs.is_readonly(),
            "memfs FUSE adapter initialized"
        );
        Ok(())
    }

    fn destroy(&mut self) {
        let stats = self.fs.stats();
        info!(
            nfiles = stats.nfiles,
            ndirs = stats.ndirs,
            nbytes = stats.nbytes,
            "memfs FUSE adapter destroyed"
        );
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name = match component(name) {
            Ok(name) => name,
            Err(code) => return reply.error(code),
        };
        match self.fs.lookup(NodeId(parent), name) {
            Ok(attr) => reply.entry(&TTL, &attr_to_fuse(&attr), 0),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn forget(&mut self, _req: &Request, ino: u64, _nlookup: u64) {
        self.fs.forget(NodeId(ino));
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.fs.attr(NodeId(ino)) {
            Ok(attr) => reply.attr(&TTL, &attr_to_fuse(&attr)),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        crtime: Option<SystemTime>,
        chgtime: Option<SystemTime>,
        bkuptime: Option<SystemTime>,
        flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let (atime, atime_now) = apply_time(atime);
        let (mtime, mtime_now) = apply_time(mtime);
        let request = SetattrRequest {
            size,
            atime,
            atime_now,
            mtime,
            mtime_now,
            mode,
            uid,
            gid,
            crtime,
            flags,
            handle: fh,
            lock_owner: None,
            bkuptime,
            chgtime,
        };

        match self.fs.setattr(NodeId(ino), &request) {
            Ok(attr) => reply.attr(&TTL, &attr_to_fuse(&attr)),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn access(&mut self, _req: &Request, ino: u64, mask: i32, reply: ReplyEmpty) {
        match self.fs.access(NodeId(ino), mask) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        let report = self.fs.capacity();
        reply.statfs(
            report.total_blocks,
            report.free_blocks,
            report.available_blocks,
            report.total_files,
            report.free_files,
            report.block_size,
            report.max_name_length,
            report.block_size,
        );
    }

    fn create(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let name = match component(name) {
            Ok(name) => name,
            Err(code) => return reply.error(code),
        };
        let mode = mode & !umask & 0o7777;
        match self.fs.create(NodeId(parent), name, mode, req.uid(), req.gid()) {
            Ok(attr) => reply.created(&TTL, &attr_to_fuse(&attr), 0, STATELESS_FH, 0),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn mkdir(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        let name = match component(name) {
            Ok(name) => name,
            Err(code) => return reply.error(code),
        };
        let mode = mode & !umask & 0o7777;
        match self.fs.mkdir(NodeId(parent), name, mode, req.uid(), req.gid()) {
            Ok(attr) => reply.entry(&TTL, &attr_to_fuse(&attr), 0),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = match component(name) {
            Ok(name) => name,
            Err(code) => return reply.error(code),
        };
        match self.fs.remove(NodeId(parent), name) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = match component(name) {
            Ok(name) => name,
            Err(code) => return reply.error(code),
        };
        match self.fs.remove(NodeId(parent), name) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        if flags != 0 {
            // RENAME_NOREPLACE and RENAME_EXCHANGE are not supported
            return reply.error(EINVAL);
        }
        let (name, newname) = match (component(name), component(newname)) {
            (Ok(name), Ok(newname)) => (name, newname),
            (Err(code), _) | (_, Err(code)) => return reply.error(code),
        };
        match self.fs.rename(NodeId(parent), name, NodeId(newparent), newname) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.fs.attr(NodeId(ino)) {
            Ok(_) => reply.opened(STATELESS_FH, 0),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            return reply.error(EINVAL);
        };
        match self.fs.read(NodeId(ino), offset, u64::from(size)) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            return reply.error(EINVAL);
        };
        match self.fs.write(NodeId(ino), offset, data) {
            // the kernel never sends more than max_write bytes in one request
            Ok(written) => reply.written(written as u32),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn flush(&mut self, _req: &Request, ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        match self.fs.flush(NodeId(ino)) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.fs.release(NodeId(ino)) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn fsync(&mut self, _req: &Request, ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        match self.fs.fsync(NodeId(ino)) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn opendir(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.fs.attr(NodeId(ino)) {
            Ok(attr) if attr.is_dir() => reply.opened(STATELESS_FH, 0),
            Ok(_) => reply.error(libc::ENOTDIR),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let entries = match self.fs.read_dir_all(NodeId(ino)) {
            Ok(entries) => entries,
            Err(err) => return reply.error(errno(&err)),
        };

        for (entry_ino, next_offset, kind, name) in dir_page(ino, entries, offset) {
            if reply.add(entry_ino, next_offset, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request, ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        debug!(ino, "releasedir");
        reply.ok();
    }

    fn setxattr(
        &mut self,
        _req: &Request,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let Some(name) = name.to_str() else {
            return reply.error(EINVAL);
        };
        let id = NodeId(ino);

        let mode = SetMode::from_flags(flags);
        if mode != SetMode::Either {
            let exists = self.fs.getxattr(id, name, Some(0)).is_ok();
            if let Err(code) = mode.check(exists) {
                return reply.error(code);
            }
        }

        match self.fs.setxattr(id, name, value) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn getxattr(&mut self, _req: &Request, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let Some(name) = name.to_str() else {
            return reply.error(EINVAL);
        };
        match self.fs.getxattr(NodeId(ino), name, None) {
            Ok(value) => reply_xattr(reply, sized_reply(value, size)),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn listxattr(&mut self, _req: &Request, ino: u64, size: u32, reply: ReplyXattr) {
        match self.fs.listxattr(NodeId(ino)) {
            Ok(names) => reply_xattr(reply, sized_reply(pack_names(names), size)),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn removexattr(&mut self, _req: &Request, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(name) = name.to_str() else {
            return reply.error(EINVAL);
        };
        match self.fs.removexattr(NodeId(ino), name) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno(&err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memfs_core::Config;
    use std::time::UNIX_EPOCH;

    #[test]
    fn attributes_convert_to_fuse() {
        let fs = FileSystem::new("/mnt/fuse", Config::default()).unwrap();
        let attr = fs.create(fs.root(), "f", 0o640, 12, 34).unwrap();
        let fuse = attr_to_fuse(&attr);

        assert_eq!(fuse.ino, attr.ino);
        assert_eq!(fuse.kind, FileType::RegularFile);
        assert_eq!(fuse.perm, 0o640);
        assert_eq!(fuse.uid, 12);
        assert_eq!(fuse.gid, 34);
        assert_eq!(fuse.blksize, 4096);

        let root = attr_to_fuse(&fs.attr(fs.root()).unwrap());
        assert_eq!(root.ino, FUSE_ROOT_ID);
        assert_eq!(root.kind, FileType::Directory);
    }

    #[test]
    fn component_rejects_long_names() {
        let long = "x".repeat(MAX_NAME_LENGTH as usize + 1);
        assert_eq!(component(OsStr::new(&long)), Err(ENAMETOOLONG));
        assert_eq!(component(OsStr::new("ok.txt")), Ok("ok.txt"));
    }

    #[test]
    fn time_or_now_conversion() {
        let at = UNIX_EPOCH + Duration::from_secs(10);
        assert_eq!(apply_time(Some(TimeOrNow::SpecificTime(at))), (Some(at), false));
        assert_eq!(apply_time(Some(TimeOrNow::Now)), (None, true));
        assert_eq!(apply_time(None), (None, false));
    }

    fn dirent(ino: u64, name: &str) -> Dirent {
        Dirent {
            ino,
            kind: FileKind::RegularFile,
            name: name.to_string(),
        }
    }

    #[test]
    fn dir_pages_resume_by_name_order() {
        let names = |page: &[(u64, i64, FileType, String)]| {
            page.iter().map(|entry| entry.3.clone()).collect::<Vec<_>>()
        };
        let first = dir_page(1, vec![dirent(3, "c"), dirent(2, "a"), dirent(4, "b")], 0);
        assert_eq!(names(&first), [".", "..", "a", "b", "c"]);
        assert_eq!(first[2], (2, 3, FileType::RegularFile, "a".to_string()));

        // an entry added between calls must not shift what comes after "a"
        let resumed = dir_page(
            1,
            vec![dirent(4, "b"), dirent(5, "d"), dirent(3, "c"), dirent(2, "a")],
            first[2].1,
        );
        assert_eq!(names(&resumed), ["b", "c", "d"]);
        assert_eq!(resumed[0].1, 4);

        assert!(dir_page(1, Vec::new(), 2).is_empty());
        assert_eq!(names(&dir_page(1, Vec::new(), -1)), [".", ".."]);
    }

    #[test]
    fn adapter_creation() {
        let fs = Arc::new(FileSystem::new("/mnt/fuse", Config::default()).unwrap());
        let adapter = MemFsFuse::new(fs.clone());
        assert_eq!(Arc::strong_count(&fs), 2);
        drop(adapter);
    }
}
