// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions shared by the engine and the kernel adapter

use std::fmt;
use std::time::SystemTime;

/// Size of the units reported in [`Attr::blocks`].
pub const BLOCK_UNIT: u64 = 512;

/// Preferred I/O size and the block size used for capacity accounting.
pub const BLOCK_SIZE: u32 = 4096;

/// Longest single path component the filesystem reports supporting.
pub const MAX_NAME_LENGTH: u32 = 255;

/// Inode budget advertised to the kernel.
pub const MAX_FILES: u64 = u32::MAX as u64;

/// Identity of a node. Doubles as its inode number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two kinds of entity the tree holds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    RegularFile,
}

/// Snapshot of a node's attributes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attr {
    pub ino: u64,
    pub size: u64,
    /// Size in 512-byte units, rounded up
    pub blocks: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub crtime: SystemTime,
    pub kind: FileKind,
    /// Permission bits only; the kind lives in `kind`
    pub perm: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u32,
    pub flags: u32,
    pub blksize: u32,
}

impl Attr {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

/// A partial attribute update. A field is applied only when it is `Some`.
///
/// `handle`, `lock_owner`, `bkuptime` and `chgtime` are accepted so a kernel
/// adapter can pass its request through untouched, but they are never stored.
#[derive(Clone, Debug, Default)]
pub struct SetattrRequest {
    pub size: Option<u64>,
    pub atime: Option<SystemTime>,
    pub atime_now: bool,
    pub mtime: Option<SystemTime>,
    pub mtime_now: bool,
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub crtime: Option<SystemTime>,
    pub flags: Option<u32>,
    pub handle: Option<u64>,
    pub lock_owner: Option<u64>,
    pub bkuptime: Option<SystemTime>,
    pub chgtime: Option<SystemTime>,
}

impl SetattrRequest {
    pub fn size(size: u64) -> Self {
        Self {
            size: Some(size),
            ..Default::default()
        }
    }

    /// Copy of this request with the size field cleared.
    pub(crate) fn without_size(&self) -> Self {
        Self {
            size: None,
            ..self.clone()
        }
    }
}

/// One entry of a directory listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dirent {
    pub ino: u64,
    pub kind: FileKind,
    pub name: String,
}

/// Running counters kept by the engine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FsStats {
    pub nfiles: u64,
    pub ndirs: u64,
    pub nbytes: u64,
}

/// Filesystem capacity, as reported to `statfs`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapacityReport {
    pub total_blocks: u64,
    pub used_blocks: u64,
    pub free_blocks: u64,
    pub available_blocks: u64,
    pub block_size: u32,
    pub total_files: u64,
    pub free_files: u64,
    pub max_name_length: u32,
}

impl CapacityReport {
    /// Pure capacity math over the configured cache size and the current counters.
    pub fn compute(cache_size: u64, stats: FsStats) -> Self {
        let block_size = u64::from(BLOCK_SIZE);
        let total_blocks = cache_size / block_size;
        let used_blocks = stats.nbytes.div_ceil(block_size);
        let free_blocks = total_blocks.saturating_sub(used_blocks);
        let total_files = stats.nfiles + stats.ndirs;

        Self {
            total_blocks,
            used_blocks,
            free_blocks,
            available_blocks: free_blocks,
            block_size: BLOCK_SIZE,
            total_files,
            free_files: MAX_FILES.saturating_sub(total_files),
            max_name_length: MAX_NAME_LENGTH,
        }
    }
}

pub(crate) fn blocks_for(size: u64) -> u64 {
    size.div_ceil(BLOCK_UNIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_round_up() {
        assert_eq!(blocks_for(0), 0);
        assert_eq!(blocks_for(1), 1);
        assert_eq!(blocks_for(512), 1);
        assert_eq!(blocks_for(1056), 3);
        assert_eq!(blocks_for(4107), 9);
    }

    #[test]
    fn capacity_of_empty_filesystem() {
        let report = CapacityReport::compute(4_295_000_000, FsStats::default());
        assert_eq!(report.total_blocks, 4_295_000_000 / 4096);
        assert_eq!(report.used_blocks, 0);
        assert_eq!(report.free_blocks, report.total_blocks);
        assert_eq!(report.available_blocks, report.free_blocks);
        assert_eq!(report.free_files, MAX_FILES);
        assert_eq!(report.max_name_length, 255);
    }

    #[test]
    fn capacity_counts_partial_blocks_as_used() {
        let stats = FsStats {
            nfiles: 2,
            ndirs: 1,
            nbytes: 4097,
        };
        let report = CapacityReport::compute(8192 * 4, stats);
        assert_eq!(report.total_blocks, 8);
        assert_eq!(report.used_blocks, 2);
        assert_eq!(report.free_blocks, 6);
        assert_eq!(report.total_files, 3);
        assert_eq!(report.free_files, MAX_FILES - 3);
    }

    #[test]
    fn capacity_saturates_when_over_budget() {
        let stats = FsStats {
            nfiles: 1,
            ndirs: 1,
            nbytes: 1 << 20,
        };
        let report = CapacityReport::compute(4096, stats);
        assert_eq!(report.total_blocks, 1);
        assert_eq!(report.free_blocks, 0);
        assert_eq!(report.available_blocks, 0);
    }
}
