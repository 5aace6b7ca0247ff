//! Core data model shared between the disk catalog and its collaborators.
//!
//! These types are intentionally inert: they carry no indexing or
//! allocation logic of their own (that lives in `scan-engine`), only the
//! fields the specification assigns to a `File`, `Link`, `EmptyDir` and a
//! parity block map cell.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Width, in bytes, of a block content hash.
pub const HASH_SIZE: usize = 16;

/// Opaque content hash carried by a file block.
pub type Hash = [u8; HASH_SIZE];

/// A hash that has not been computed, or has been explicitly cleared.
pub const ZERO_HASH: Hash = [0u8; HASH_SIZE];

/// State of a block still attached to a live `File`.
///
/// `Deleted` is deliberately not a variant here: once a file is removed its
/// blocks no longer exist as `FileBlock`s, they become an owned
/// [`ParityCell::Deleted`] entry in the block map (see `BlockAllocator` in
/// `scan-engine`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockState {
    /// Content is known to already be reflected in parity data.
    Blk,
    /// Content replaced a previous block occupying this slot; parity may
    /// still reflect the old content until the next sync.
    Chg,
    /// Content occupies a slot that held no data before; parity has never
    /// seen it.
    New,
}

/// One block of a `File`, as tracked by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBlock {
    /// Index into the disk's parity block map.
    pub parity_pos: u64,
    /// Whether parity is known to already reflect this block's content.
    pub state: BlockState,
    /// Content hash, or `ZERO_HASH` if undetermined.
    pub hash: Hash,
}

/// A regular file tracked in a disk catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// Path relative to the disk root.
    pub sub: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Modification time, whole seconds.
    pub mtime_sec: i64,
    /// Modification time, sub-second nanoseconds. `None` means the catalog
    /// entry predates sub-second tracking and should accept any observed
    /// value without treating it as a change (see `File::accepts_nsec`).
    pub mtime_nsec: Option<u32>,
    /// Inode number, or `None` if this disk has non-persistent inodes and
    /// the entry has been degraded to path-only tracking.
    pub inode: Option<u64>,
    /// Physical on-device offset, when the filesystem adapter can report
    /// one.
    pub physical: Option<u64>,
    /// Blocks making up the file's content, in file order.
    pub blocks: Vec<FileBlock>,
    /// Whether this entry has been observed on the current scan.
    pub present: bool,
}

impl File {
    /// Returns whether `observed` is compatible with this entry's stored
    /// sub-second modification time: either they agree, or the stored
    /// value predates sub-second tracking.
    pub fn accepts_nsec(&self, observed: u32) -> bool {
        match self.mtime_nsec {
            None => true,
            Some(stored) => stored == observed,
        }
    }
}

/// Kind of a filesystem link tracked by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkKind {
    /// A symbolic link; `Link::linkto` is the link's stored target text.
    Symlink,
    /// A hardlink to another file already present in this same catalog;
    /// `Link::linkto` is the `sub` of that file.
    Hardlink,
}

/// A symbolic or hard link tracked in a disk catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Path relative to the disk root.
    pub sub: PathBuf,
    /// Target of the link.
    pub linkto: String,
    /// Symlink or hardlink.
    pub kind: LinkKind,
    /// Whether this entry has been observed on the current scan.
    pub present: bool,
}

/// An empty directory tracked in a disk catalog.
///
/// Only directories with no catalogued children are tracked explicitly;
/// non-empty directories are implied by the `sub` paths of the files,
/// links and empty dirs they contain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyDir {
    /// Path relative to the disk root.
    pub sub: PathBuf,
    /// Whether this entry has been observed on the current scan.
    pub present: bool,
}

/// One cell of a disk's parity block map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParityCell {
    /// No file block or retained hash occupies this slot.
    Empty,
    /// Slot occupied by a block belonging to a live file. Indices into
    /// `File::blocks`, not an owned copy: the file is the owner.
    FileBlock {
        /// `sub` of the owning file, used to resolve back into the
        /// catalog's file index.
        owner: PathBuf,
        /// Index of the occupied block within `File::blocks`.
        block_index: usize,
    },
    /// Slot freed by a deletion, retaining the hash that occupied it so a
    /// later insert into the same slot can carry it forward (see
    /// `BlockAllocator::insert_file`).
    Deleted {
        /// Retained content hash, or `ZERO_HASH` if it was undetermined at
        /// deletion time.
        hash: Hash,
    },
}

/// Ordering applied to the deferred file-insert list before parity slots
/// are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    /// Ascending by physical on-device offset.
    Physical,
    /// Ascending by inode number.
    Inode,
    /// Ascending by `sub`.
    Alpha,
    /// Directory traversal order, unsorted.
    Dir,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_nsec_when_stored_is_invalid() {
        let f = File {
            sub: PathBuf::from("a"),
            size: 0,
            mtime_sec: 0,
            mtime_nsec: None,
            inode: Some(1),
            physical: None,
            blocks: vec![],
            present: false,
        };
        assert!(f.accepts_nsec(0));
        assert!(f.accepts_nsec(123));
    }

    #[test]
    fn accepts_nsec_requires_exact_match_when_stored() {
        let f = File {
            sub: PathBuf::from("a"),
            size: 0,
            mtime_sec: 0,
            mtime_nsec: Some(500),
            inode: Some(1),
            physical: None,
            blocks: vec![],
            present: false,
        };
        assert!(f.accepts_nsec(500));
        assert!(!f.accepts_nsec(501));
    }
}
