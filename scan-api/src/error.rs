//! Error types shared by the catalog data model and its collaborators.
//!
//! Mirrors the layering used throughout this workspace: a `thiserror` enum at
//! each layer, wrapping the layer below it with `#[from]`, plus an
//! `anyhow`-backed escape hatch for callers that just want to propagate
//! whatever went wrong.

use std::io;
use thiserror::Error;

/// Errors produced while building or mutating a disk catalog, or while the
/// filesystem adapter / path filter collaborators are consulted on its
/// behalf.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// I/O failure while talking to the filesystem adapter (`lstat`,
    /// `readlink`, directory enumeration, physical-offset probes, ...).
    #[error("I/O error accessing '{path}': {source}")]
    Io {
        /// Path being accessed when the error occurred.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An index (by inode or by path) was asked to hold two entries under
    /// the same key, or was asked to resolve a key that should already have
    /// an entry. Indicates catalog corruption or a logic bug; unlike the
    /// environment errors above this is never expected to be encountered by
    /// a correctly behaving caller.
    #[error("catalog invariant violated: {0}")]
    Invariant(String),

    /// Invalid input was supplied directly to a catalog operation (for
    /// example a relative path escaping the disk root).
    #[error("invalid catalog input: {0}")]
    Input(String),

    /// Catch-all for collaborator errors that don't need to be matched on
    /// individually by catalog code.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Shorthand `Result` alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    /// Wraps an I/O error together with the path that was being accessed,
    /// so the message is actionable without needing to thread the path
    /// through a second channel.
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        CatalogError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display_carries_the_offending_path() {
        let err = CatalogError::io(
            "/disks/d1/a.txt",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/disks/d1/a.txt"));
    }

    #[test]
    fn invariant_error_display_carries_the_offending_identifier() {
        let err = CatalogError::Invariant("no such file \"a.txt\"".to_string());
        assert!(err.to_string().contains("a.txt"));
    }
}
