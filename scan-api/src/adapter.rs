//! Collaborator traits the scan engine is built against.
//!
//! A production binary wires in an adapter backed by `std::fs`; tests wire
//! in an in-memory fake. Neither lives in this crate: only the contracts
//! do, the way `fs.rs` in this workspace's original layered filesystem
//! defined trait contracts without implementing a concrete device.

use std::path::Path;

/// Kind of directory entry as reported by a [`FilesystemAdapter`], before
/// any `lstat` call is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A regular file.
    File,
    /// A directory.
    Dir,
    /// A symbolic link.
    Symlink,
    /// A fifo, socket, block device, character device, or other special
    /// file the scan does not follow.
    Other,
}

/// `lstat`-equivalent metadata for one filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    /// Inode number.
    pub ino: u64,
    /// Device number the entry resides on, used to detect mount-point
    /// crossings during recursion.
    pub dev: u64,
    /// Size in bytes.
    pub size: u64,
    /// Hardlink count.
    pub nlink: u64,
    /// Modification time, whole seconds.
    pub mtime_sec: i64,
    /// Modification time, sub-second nanoseconds.
    pub mtime_nsec: u32,
    /// Entry kind.
    pub kind: EntryKind,
}

/// Filesystem operations the scan engine needs, abstracted so the core
/// reconciliation logic can be tested without touching a real filesystem.
pub trait FilesystemAdapter {
    /// Error type returned by adapter operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lists the immediate children of `dir`, relative to the disk root,
    /// together with their kind where it can be determined without an
    /// extra `lstat` call.
    fn read_dir(&self, dir: &Path) -> Result<Vec<(std::path::PathBuf, EntryKind)>, Self::Error>;

    /// Returns metadata for `path` without following a trailing symlink.
    fn lstat(&self, path: &Path) -> Result<Metadata, Self::Error>;

    /// Returns the target of the symbolic link at `path`. The caller is
    /// responsible for rejecting a target past `ScanConfig`'s
    /// `max_symlink_target_len`; this trait places no bound of its own on
    /// the returned string.
    fn read_link(&self, path: &Path) -> Result<String, Self::Error>;

    /// Returns the physical on-device offset of `path`'s content, or
    /// `None` if the adapter cannot determine one (the entry's offset is
    /// then excluded from duplicate-offset detection rather than treated
    /// as colliding with other unknown offsets).
    fn physical_offset(&self, path: &Path, meta: &Metadata) -> Result<Option<u64>, Self::Error>;

    /// Probes whether `disk_root`'s filesystem preserves inode numbers
    /// across remounts.
    fn has_persistent_inodes(&self, disk_root: &Path) -> Result<bool, Self::Error>;

    /// Device number of `disk_root`, used as the baseline for mount-point
    /// crossing detection.
    fn root_device(&self, disk_root: &Path) -> Result<u64, Self::Error>;
}

/// Path-based inclusion policy consulted while walking a disk.
pub trait PathFilter {
    /// Returns `true` if the regular file at `sub` should be skipped.
    fn should_exclude_file(&self, sub: &Path) -> bool;

    /// Returns `true` if the directory at `sub`, and everything under it,
    /// should be skipped.
    fn should_exclude_dir(&self, sub: &Path) -> bool;

    /// Returns `true` if `sub` is a hidden entry that should be skipped
    /// (dotfiles on Unix, the hidden attribute on Windows).
    fn should_exclude_hidden(&self, sub: &Path) -> bool;

    /// Returns `true` if `sub` names a content file belonging to the
    /// backup system itself (for example the catalog file), which must
    /// never be scanned as user data.
    fn should_exclude_content_file(&self, sub: &Path) -> bool;
}
