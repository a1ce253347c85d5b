// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The kernel's two-step extended attribute protocol.
//!
//! A caller first asks with a zero-sized buffer to learn how many bytes it
//! needs, then asks again with a buffer of that size.

use libc::c_int;

#[derive(Debug, PartialEq, Eq)]
pub enum XattrReply {
    /// Report the length only
    Size(u32),
    Data(Vec<u8>),
    Error(c_int),
}

pub fn sized_reply(value: Vec<u8>, size: u32) -> XattrReply {
    let Ok(len) = u32::try_from(value.len()) else {
        return XattrReply::Error(libc::E2BIG);
    };
    if size == 0 {
        XattrReply::Size(len)
    } else if len <= size {
        XattrReply::Data(value)
    } else {
        XattrReply::Error(libc::ERANGE)
    }
}

/// Names joined as NUL-terminated strings, the listxattr wire format.
pub fn pack_names<I, S>(names: I) -> Vec<u8>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut buffer = Vec::new();
    for name in names {
        buffer.extend_from_slice(name.as_ref().as_bytes());
        buffer.push(0);
    }
    buffer
}

/// How a setxattr call must treat an existing value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetMode {
    Either,
    CreateOnly,
    ReplaceOnly,
}

impl SetMode {
    pub fn from_flags(flags: i32) -> Self {
        if flags & libc::XATTR_CREATE != 0 {
            SetMode::CreateOnly
        } else if flags & libc::XATTR_REPLACE != 0 {
            SetMode::ReplaceOnly
        } else {
            SetMode::Either
        }
    }

    /// The errno to fail with, given whether the attribute already exists.
    pub fn check(self, exists: bool) -> Result<(), c_int> {
        match (self, exists) {
            (SetMode::CreateOnly, true) => Err(libc::EEXIST),
            (SetMode::ReplaceOnly, false) => Err(libc::ENODATA),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_probe_reports_length() {
        assert_eq!(sized_reply(b"blue".to_vec(), 0), XattrReply::Size(4));
        assert_eq!(sized_reply(Vec::new(), 0), XattrReply::Size(0));
    }

    #[test]
    fn buffer_must_fit() {
        assert_eq!(sized_reply(b"blue".to_vec(), 4), XattrReply::Data(b"blue".to_vec()));
        assert_eq!(sized_reply(b"blue".to_vec(), 64), XattrReply::Data(b"blue".to_vec()));
        assert_eq!(sized_reply(b"blue".to_vec(), 3), XattrReply::Error(libc::ERANGE));
    }

    #[test]
    fn names_are_nul_terminated() {
        assert_eq!(pack_names(["user.a", "user.bc"]), b"user.a\0user.bc\0".to_vec());
        assert!(pack_names(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn set_flags() {
        assert_eq!(SetMode::from_flags(0), SetMode::Either);
        assert_eq!(SetMode::from_flags(libc::XATTR_CREATE), SetMode::CreateOnly);
        assert_eq!(SetMode::from_flags(libc::XATTR_REPLACE), SetMode::ReplaceOnly);

        assert_eq!(SetMode::CreateOnly.check(true), Err(libc::EEXIST));
        assert_eq!(SetMode::CreateOnly.check(false), Ok(()));
        assert_eq!(SetMode::ReplaceOnly.check(false), Err(libc::ENODATA));
        assert_eq!(SetMode::ReplaceOnly.check(true), Ok(()));
        assert_eq!(SetMode::Either.check(true), Ok(()));
    }
}
