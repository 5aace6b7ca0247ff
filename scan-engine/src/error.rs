//! Error type used by reconciliation and driver code, wrapping the data
//! model layer the way `error_fs.rs` in this workspace wraps the
//! controller layer.

use scan_api::error::CatalogError;
use thiserror::Error;

/// Errors surfaced while scanning a disk.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Error from the catalog data model.
    #[error("catalog error")]
    Catalog(#[from] CatalogError),

    /// A policy gate refused to proceed (see `force_zero`/`force_empty` in
    /// `ScanConfig`).
    #[error("{0}")]
    Policy(String),

    /// An entry could not be classified and the scan cannot continue
    /// (malformed symlink target, unsupported path, ...).
    #[error("{0}")]
    Unsupported(String),

    /// A symlink target exceeded the configured `max_symlink_target_len`
    /// bound (§7, "symlink target longer than the path buffer").
    #[error("symlink target at {path:?} is {len} bytes, exceeding the configured bound of {max}")]
    SymlinkTargetTooLong {
        /// Path of the offending symlink.
        path: std::path::PathBuf,
        /// Length of the observed target, in bytes.
        len: usize,
        /// The configured bound it exceeded.
        max: usize,
    },

    /// Catch-all for collaborator errors (filesystem adapter I/O, mostly)
    /// that don't need to be matched on individually by driver code.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Shorthand `Result` alias for scan operations.
pub type Result<T> = std::result::Result<T, ScanError>;
