// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for memfs core

/// Core filesystem error type
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    /// Filesystem mounted readonly, or the entity is an archive view
    #[error("permission denied")]
    PermissionDenied,
    #[error("not found")]
    NotFound,
    #[error("directory not empty")]
    NotEmpty,
    /// The target was expected to be a directory (e.g. a rename destination)
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("no such extended attribute")]
    NoAttribute,
    /// The identity sequence reached its upper bound
    #[error("identifier space exhausted")]
    ResourceExhausted,
    #[error("invalid argument")]
    InvalidArgument,
}

pub type FsResult<T> = Result<T, FsError>;
