// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Translation of engine errors into the errno values the kernel expects.

use libc::c_int;
use memfs_core::FsError;

pub fn errno(err: &FsError) -> c_int {
    match err {
        FsError::PermissionDenied => libc::EPERM,
        FsError::NotFound => libc::ENOENT,
        FsError::NotEmpty => libc::ENOTEMPTY,
        FsError::NotADirectory => libc::ENOTDIR,
        FsError::IsADirectory => libc::EISDIR,
        FsError::NoAttribute => libc::ENODATA,
        FsError::ResourceExhausted => libc::ENOSPC,
        FsError::InvalidArgument => libc::EINVAL,
    }
}
