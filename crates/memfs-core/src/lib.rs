// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! memfs core: an in-memory filesystem engine.
//!
//! The engine keeps a tree of directories and files entirely in memory and
//! exposes inode-addressed operations that a kernel adapter (such as the FUSE
//! host) can forward calls to. Every operation is serialized behind a single
//! lock owned by [`FileSystem`].

pub mod config;
pub mod error;
pub mod sequence;
pub mod types;

mod dir;
mod file;
mod fs;
mod node;

pub use config::{Config, ConfigError, Replica};
pub use error::{FsError, FsResult};
pub use fs::FileSystem;
pub use sequence::Sequence;
pub use types::*;

const VERSION_MAJOR: u32 = 0;
const VERSION_MINOR: u32 = 1;
const VERSION_MICRO: u32 = 0;
const VERSION_RELEASE: &str = "final";

/// Composes the version string: micro is omitted when zero and pre-releases
/// carry an `a` or `b` suffix.
fn compose_version(major: u32, minor: u32, micro: u32, release: &str) -> String {
    let mut version = format!("{major}.{minor}");
    if micro > 0 {
        version.push_str(&format!(".{micro}"));
    }
    match release {
        "alpha" => version.push('a'),
        "beta" => version.push('b'),
        _ => {}
    }
    version
}

/// Human-readable version of this package.
pub fn package_version() -> String {
    compose_version(VERSION_MAJOR, VERSION_MINOR, VERSION_MICRO, VERSION_RELEASE)
}
