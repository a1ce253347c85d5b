// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Regular files and their in-memory data.

use tracing::{debug, warn};

use crate::error::{FsError, FsResult};
use crate::fs::FileSystem;
use crate::node::Node;
use crate::types::NodeId;

#[derive(Clone, Debug)]
pub(crate) struct File {
    pub(crate) node: Node,
    /// Always as long as `node.attrs.size` between operations
    pub(crate) data: Vec<u8>,
}

impl File {
    pub(crate) fn new(node: Node) -> Self {
        Self {
            node,
            data: Vec::new(),
        }
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Resize the data to `size` bytes, zero-filling any new tail.
    fn resize(&mut self, size: u64) -> FsResult<()> {
        let len = usize::try_from(size).map_err(|_| FsError::InvalidArgument)?;
        self.data.resize(len, 0);
        self.node.set_size(size);
        Ok(())
    }

    /// Bytes in `[offset, offset + size)`, clipped to the logical size.
    fn slice(&self, offset: u64, size: u64) -> &[u8] {
        let limit = self.node.attrs.size.min(self.len());
        let to = offset.saturating_add(size).min(limit);
        if offset >= to {
            return &[];
        }
        // both bounds are at most data.len()
        &self.data[offset as usize..to as usize]
    }
}

impl FileSystem {
    /// Write `data` at `offset`, growing the file when the write ends past it.
    pub fn write(&self, id: NodeId, offset: u64, data: &[u8]) -> FsResult<usize> {
        let _log = self.span().enter();
        self.check_writable()?;
        let mut tree = self.lock();
        let file = tree.file_mut(id)?;
        self.ensure_mutable(&file.node)?;

        if file.len() != file.node.attrs.size {
            warn!(
                ino = id.0,
                len = file.len(),
                size = file.node.attrs.size,
                "file data length does not match its size attribute"
            );
        }

        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(FsError::InvalidArgument)?;
        let old = file.len();
        if end > old {
            file.resize(end)?;
            self.grow_bytes(end - old);
        }

        let start = usize::try_from(offset).map_err(|_| FsError::InvalidArgument)?;
        file.data[start..start + data.len()].copy_from_slice(data);
        file.node.touch_mtime();

        debug!(ino = id.0, offset, len = data.len(), "wrote data");
        Ok(data.len())
    }

    /// Up to `size` bytes from `offset`. Never reads past the end of the file.
    pub fn read(&self, id: NodeId, offset: u64, size: u64) -> FsResult<Vec<u8>> {
        let _log = self.span().enter();
        let mut tree = self.lock();
        let file = tree.file_mut(id)?;

        let bytes = file.slice(offset, size).to_vec();
        file.node.touch_atime();
        debug!(ino = id.0, offset, size, read = bytes.len(), "read data");
        Ok(bytes)
    }

    /// The whole content of the file.
    pub fn read_all(&self, id: NodeId) -> FsResult<Vec<u8>> {
        let _log = self.span().enter();
        let mut tree = self.lock();
        let file = tree.file_mut(id)?;

        file.node.touch_atime();
        debug!(ino = id.0, len = file.len(), "read all data");
        Ok(file.data.clone())
    }

    /// Set the length of a file, dropping or zero-filling its tail.
    ///
    /// Holds the lock only for the resize itself.
    pub(crate) fn truncate(&self, id: NodeId, size: u64) -> FsResult<()> {
        let mut tree = self.lock();
        let file = tree.file_mut(id)?;
        self.ensure_mutable(&file.node)?;

        let old = file.len();
        if size > old {
            file.resize(size)?;
            self.grow_bytes(size - old);
        } else {
            file.resize(size)?;
            self.shrink_bytes(old - size);
        }
        file.node.touch_mtime();

        debug!(ino = id.0, from = old, to = size, "truncated file");
        Ok(())
    }

    /// Nothing to persist; data only ever lives in memory.
    pub fn fsync(&self, id: NodeId) -> FsResult<()> {
        let _log = self.span().enter();
        debug!(ino = id.0, "fsync");
        Ok(())
    }

    pub fn flush(&self, id: NodeId) -> FsResult<()> {
        let _log = self.span().enter();
        self.check_writable()?;
        let tree = self.lock();

        match tree.get(id) {
            Ok(entity) => self.ensure_mutable(entity.node())?,
            Err(_) => debug!(ino = id.0, "flush of a removed node"),
        }
        debug!(ino = id.0, "flush");
        Ok(())
    }

    pub fn release(&self, id: NodeId) -> FsResult<()> {
        let _log = self.span().enter();
        debug!(ino = id.0, "release");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::types::SetattrRequest;
    use memfs_logging::test_utils::BufferWriter;

    fn fs_with_file() -> (FileSystem, NodeId) {
        let fs = FileSystem::new("/mnt/files", Config::default()).unwrap();
        let attr = fs.create(fs.root(), "data.bin", 0o644, 0, 0).unwrap();
        (fs, NodeId(attr.ino))
    }

    #[test]
    fn write_then_read_back() {
        let (fs, id) = fs_with_file();
        assert_eq!(fs.write(id, 0, b"hello world").unwrap(), 11);
        assert_eq!(fs.read(id, 0, 11).unwrap(), b"hello world");
        assert_eq!(fs.read(id, 6, 5).unwrap(), b"world");
        assert_eq!(fs.read_all(id).unwrap(), b"hello world");

        let attr = fs.attr(id).unwrap();
        assert_eq!(attr.size, 11);
        assert_eq!(attr.blocks, 1);
        assert_eq!(fs.stats().nbytes, 11);
    }

    #[test]
    fn overwrite_in_place_keeps_size() {
        let (fs, id) = fs_with_file();
        fs.write(id, 0, b"aaaaaaaa").unwrap();
        fs.write(id, 2, b"bb").unwrap();
        assert_eq!(fs.read_all(id).unwrap(), b"aabbaaaa");
        assert_eq!(fs.stats().nbytes, 8);
    }

    #[test]
    fn sparse_write_zero_fills_gap() {
        let (fs, id) = fs_with_file();
        fs.write(id, 0, b"ab").unwrap();
        fs.write(id, 6, b"cd").unwrap();

        assert_eq!(fs.read_all(id).unwrap(), b"ab\0\0\0\0cd");
        assert_eq!(fs.attr(id).unwrap().size, 8);
        assert_eq!(fs.stats().nbytes, 8);
    }

    #[test]
    fn read_past_end_is_clipped() {
        let (fs, id) = fs_with_file();
        fs.write(id, 0, b"0123456789").unwrap();

        assert_eq!(fs.read(id, 7, 100).unwrap(), b"789");
        assert!(fs.read(id, 10, 5).unwrap().is_empty());
        assert!(fs.read(id, 500, 5).unwrap().is_empty());
        assert!(fs.read(id, u64::MAX, u64::MAX).unwrap().is_empty());
    }

    #[test]
    fn write_offset_overflow_is_rejected() {
        let (fs, id) = fs_with_file();
        assert_eq!(fs.write(id, u64::MAX, b"x"), Err(FsError::InvalidArgument));
        assert_eq!(fs.attr(id).unwrap().size, 0);
    }

    #[test]
    fn writes_past_the_cache_size_still_grow_the_file() {
        let config = Config {
            cache_size: 1024,
            ..Config::default()
        };
        let fs = FileSystem::new("/mnt/tiny", config).unwrap();
        let id = NodeId(fs.create(fs.root(), "f", 0o644, 0, 0).unwrap().ino);

        assert_eq!(fs.write(id, 0, &[7; 2048]), Ok(2048));
        assert_eq!(fs.attr(id).unwrap().size, 2048);
        fs.setattr(id, &SetattrRequest::size(4096)).unwrap();
        assert_eq!(fs.attr(id).unwrap().size, 4096);
        assert_eq!(fs.stats().nbytes, 4096);

        let report = fs.capacity();
        assert_eq!(report.free_blocks, 0);
        assert_eq!(report.available_blocks, 0);
    }

    #[test]
    fn file_operations_on_directory_fail() {
        let (fs, _) = fs_with_file();
        let root = fs.root();
        assert_eq!(fs.write(root, 0, b"x"), Err(FsError::IsADirectory));
        assert_eq!(fs.read(root, 0, 1), Err(FsError::IsADirectory));
        assert_eq!(fs.read_all(root), Err(FsError::IsADirectory));
    }

    #[test]
    fn truncate_shrinks_and_grows() {
        let (fs, id) = fs_with_file();
        fs.write(id, 0, &[7; 4107]).unwrap();
        assert_eq!(fs.attr(id).unwrap().blocks, 9);

        let attr = fs.setattr(id, &SetattrRequest::size(1056)).unwrap();
        assert_eq!(attr.size, 1056);
        assert_eq!(attr.blocks, 3);
        assert_eq!(fs.read_all(id).unwrap().len(), 1056);
        assert_eq!(fs.stats().nbytes, 1056);

        fs.setattr(id, &SetattrRequest::size(1060)).unwrap();
        let data = fs.read_all(id).unwrap();
        assert_eq!(data.len(), 1060);
        assert_eq!(&data[1056..], &[0, 0, 0, 0]);
        assert_eq!(fs.stats().nbytes, 1060);
    }

    #[test]
    fn setattr_applies_size_and_other_fields() {
        let (fs, id) = fs_with_file();
        fs.write(id, 0, b"abcdef").unwrap();

        let req = SetattrRequest {
            size: Some(3),
            mode: Some(0o600),
            ..Default::default()
        };
        let attr = fs.setattr(id, &req).unwrap();
        assert_eq!(attr.size, 3);
        assert_eq!(attr.perm, 0o600);
        assert_eq!(fs.read_all(id).unwrap(), b"abc");
    }

    #[test]
    fn size_change_on_directory_is_ignored() {
        let (fs, _) = fs_with_file();
        let req = SetattrRequest {
            size: Some(10),
            mode: Some(0o700),
            ..Default::default()
        };
        let attr = fs.setattr(fs.root(), &req).unwrap();
        assert_eq!(attr.size, 0);
        assert_eq!(attr.perm, 0o700);
    }

    #[test]
    fn size_mismatch_is_logged_not_fatal() {
        let (fs, id) = fs_with_file();
        fs.write(id, 0, b"abcd").unwrap();
        {
            let mut tree = fs.lock();
            tree.file_mut(id).unwrap().node.attrs.size = 2;
        }

        let buffer = BufferWriter::new();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buffer.clone())
            .with_max_level(tracing::Level::WARN)
            .finish();
        let written = tracing::subscriber::with_default(subscriber, || fs.write(id, 0, b"xy"));

        assert_eq!(written, Ok(2));
        let output = buffer.contents();
        assert!(output.contains("WARN"));
        assert!(output.contains("file data length does not match its size attribute"));
        assert!(output.contains("len=4"));
        assert!(output.contains("size=2"));
    }

    #[test]
    fn handle_calls_tolerate_removed_nodes() {
        let (fs, id) = fs_with_file();
        fs.remove(fs.root(), "data.bin").unwrap();

        assert!(fs.flush(id).is_ok());
        assert!(fs.fsync(id).is_ok());
        assert!(fs.release(id).is_ok());
        fs.forget(id);
        assert_eq!(fs.read(id, 0, 1), Err(FsError::NotFound));
    }
}
