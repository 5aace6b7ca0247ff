//! Per-disk catalog: the in-memory state the reconciler reads and mutates,
//! dual-indexed by inode and by path the way this workspace's inode layer
//! indexes disk inodes by number and directories index entries by name.

use scan_api::error::CatalogError;
use scan_api::types::{BlockState, EmptyDir, File, Link, ParityCell, ZERO_HASH};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Returns the number of blocks a file of `size` bytes occupies under
/// `block_size`. Zero-length files occupy zero blocks (see invariant B1).
pub fn blocks_for_size(block_size: u64, size: u64) -> u64 {
    if size == 0 {
        0
    } else {
        (size + block_size - 1) / block_size
    }
}

/// One disk's catalog: files, links and empty directories dual-indexed,
/// plus the parity block map shared by every file's blocks.
#[derive(Debug)]
pub struct DiskCatalog {
    /// Block size this catalog's parity slots are sized against.
    pub block_size: u64,
    files: HashMap<PathBuf, File>,
    inode_index: HashMap<u64, PathBuf>,
    links: HashMap<PathBuf, Link>,
    empty_dirs: HashMap<PathBuf, EmptyDir>,
    block_map: Vec<ParityCell>,
    first_free_slot: usize,
    /// Set once the driver has probed the underlying filesystem and found
    /// it does not preserve inode numbers across remounts.
    pub has_not_persistent_inodes: bool,
    /// Set once the insert pass notices two files sharing a physical
    /// offset under `SortOrder::Physical`.
    pub has_not_reliable_physical: bool,
    need_write: bool,
}

impl DiskCatalog {
    /// Creates an empty catalog for a disk whose parity slots are
    /// `block_size` bytes wide.
    pub fn new(block_size: u64) -> Self {
        DiskCatalog {
            block_size,
            files: HashMap::new(),
            inode_index: HashMap::new(),
            links: HashMap::new(),
            empty_dirs: HashMap::new(),
            block_map: Vec::new(),
            first_free_slot: 0,
            has_not_persistent_inodes: false,
            has_not_reliable_physical: false,
            need_write: false,
        }
    }

    /// Whether any mutation has been made that a caller should persist.
    pub fn need_write(&self) -> bool {
        self.need_write
    }

    /// Marks the catalog as carrying state that must be persisted.
    pub fn mark_dirty(&mut self) {
        self.need_write = true;
    }

    /// Clears the transient `present` flag on every tracked entry. Must be
    /// called before a disk is walked.
    pub fn clear_present(&mut self) {
        for f in self.files.values_mut() {
            f.present = false;
        }
        for l in self.links.values_mut() {
            l.present = false;
        }
        for d in self.empty_dirs.values_mut() {
            d.present = false;
        }
    }

    /// Looks up a file by its inode number.
    pub fn file_by_inode(&self, ino: u64) -> Option<&File> {
        self.inode_index.get(&ino).and_then(|sub| self.files.get(sub))
    }

    /// Looks up a file by its path relative to the disk root.
    pub fn file_by_sub(&self, sub: &Path) -> Option<&File> {
        self.files.get(sub)
    }

    /// Looks up a mutable file by its path relative to the disk root.
    pub fn file_by_sub_mut(&mut self, sub: &Path) -> Option<&mut File> {
        self.files.get_mut(sub)
    }

    /// Looks up a link by its path relative to the disk root.
    pub fn link_by_sub(&self, sub: &Path) -> Option<&Link> {
        self.links.get(sub)
    }

    /// Looks up a mutable link by its path relative to the disk root.
    pub fn link_by_sub_mut(&mut self, sub: &Path) -> Option<&mut Link> {
        self.links.get_mut(sub)
    }

    /// Looks up an empty directory entry by its path relative to the disk
    /// root.
    pub fn empty_dir_by_sub(&self, sub: &Path) -> Option<&EmptyDir> {
        self.empty_dirs.get(sub)
    }

    /// Looks up a mutable empty directory entry by its path relative to
    /// the disk root.
    pub fn empty_dir_by_sub_mut(&mut self, sub: &Path) -> Option<&mut EmptyDir> {
        self.empty_dirs.get_mut(sub)
    }

    /// Iterates over every tracked file.
    pub fn files(&self) -> impl Iterator<Item = &File> {
        self.files.values()
    }

    /// Iterates over every tracked link.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    /// Iterates over every tracked empty directory.
    pub fn empty_dirs(&self) -> impl Iterator<Item = &EmptyDir> {
        self.empty_dirs.values()
    }

    /// Current size of the parity block map.
    pub fn block_map_len(&self) -> usize {
        self.block_map.len()
    }

    /// Returns the cell at `slot`, if the map is that large.
    pub fn block_map_cell(&self, slot: usize) -> Option<&ParityCell> {
        self.block_map.get(slot)
    }

    /// Lower bound on the first unoccupied slot (invariant I3).
    pub fn first_free_slot(&self) -> usize {
        self.first_free_slot
    }

    /// Seeds the catalog with a file that already carries fully assigned
    /// blocks, as a catalog loader collaborator would when restoring
    /// persisted state. The block map is grown and populated to match.
    pub fn seed_file(&mut self, file: File) {
        let sub = file.sub.clone();
        for (i, b) in file.blocks.iter().enumerate() {
            let pos = b.parity_pos as usize;
            if pos >= self.block_map.len() {
                self.block_map.resize(pos + 1, ParityCell::Empty);
            }
            self.block_map[pos] = ParityCell::FileBlock {
                owner: sub.clone(),
                block_index: i,
            };
        }
        if let Some(inode) = file.inode {
            self.inode_index.insert(inode, sub.clone());
        }
        self.files.insert(sub, file);
    }

    /// Seeds the catalog with a link, as a catalog loader collaborator
    /// would.
    pub fn seed_link(&mut self, link: Link) {
        self.links.insert(link.sub.clone(), link);
    }

    /// Seeds the catalog with an empty directory entry, as a catalog
    /// loader collaborator would.
    pub fn seed_empty_dir(&mut self, dir: EmptyDir) {
        self.empty_dirs.insert(dir.sub.clone(), dir);
    }

    /// Renames a tracked file's `sub`, keeping the inode index consistent.
    /// Used by the reconciler's move handling (see `reconcile_file`).
    pub fn rename_file(&mut self, old_sub: &Path, new_sub: PathBuf) -> Result<(), CatalogError> {
        let mut file = self.files.remove(old_sub).ok_or_else(|| {
            CatalogError::Invariant(format!("rename_file: no such file {:?}", old_sub))
        })?;
        file.sub = new_sub.clone();
        if let Some(inode) = file.inode {
            self.inode_index.insert(inode, new_sub.clone());
        }
        for cell in self.block_map.iter_mut() {
            if let ParityCell::FileBlock { owner, .. } = cell {
                if owner.as_path() == old_sub {
                    *owner = new_sub.clone();
                }
            }
        }
        self.files.insert(new_sub, file);
        Ok(())
    }

    /// De-indexes a file from the inode index, zeroing its stored inode,
    /// without removing it from the path index or the file list. Used
    /// when a disk's inodes turn out to be non-persistent, or when an
    /// inode is observed to have been reused for different content.
    pub fn drop_inode(&mut self, sub: &Path) -> Result<(), CatalogError> {
        let file = self.files.get_mut(sub).ok_or_else(|| {
            CatalogError::Invariant(format!("drop_inode: no such file {:?}", sub))
        })?;
        if let Some(inode) = file.inode.take() {
            self.inode_index.remove(&inode);
        }
        Ok(())
    }

    /// Restores a file's inode after it had previously been dropped by
    /// [`DiskCatalog::drop_inode`], re-indexing it. Used by path-based
    /// reconciliation on a disk whose inodes have since become readable
    /// again for this entry.
    pub fn restore_inode(&mut self, sub: &Path, inode: u64) -> Result<(), CatalogError> {
        let file = self.files.get_mut(sub).ok_or_else(|| {
            CatalogError::Invariant(format!("restore_inode: no such file {:?}", sub))
        })?;
        file.inode = Some(inode);
        self.inode_index.insert(inode, sub.to_path_buf());
        Ok(())
    }

    /// Re-indexes a file under a new inode, replacing whatever it held
    /// before. Used by restore handling (same path, new inode).
    pub fn reindex_inode(&mut self, sub: &Path, new_inode: u64) -> Result<(), CatalogError> {
        let file = self.files.get_mut(sub).ok_or_else(|| {
            CatalogError::Invariant(format!("reindex_inode: no such file {:?}", sub))
        })?;
        if let Some(old) = file.inode.replace(new_inode) {
            self.inode_index.remove(&old);
        }
        self.inode_index.insert(new_inode, sub.to_path_buf());
        Ok(())
    }

    /// Deletes `file`'s blocks from the parity block map, retaining their
    /// hashes according to the rules in invariant I5, and removes `file`
    /// from both indices. Returns the removed entry.
    pub fn remove_file(&mut self, sub: &Path, clear_undetermined_hash: bool) -> Result<File, CatalogError> {
        let file = self
            .files
            .remove(sub)
            .ok_or_else(|| CatalogError::Invariant(format!("remove_file: no such file {:?}", sub)))?;
        for b in &file.blocks {
            let pos = b.parity_pos as usize;
            if pos < self.first_free_slot {
                self.first_free_slot = pos;
            }
            let hash = match b.state {
                BlockState::Blk => b.hash,
                BlockState::Chg | BlockState::New => {
                    if clear_undetermined_hash {
                        b.hash
                    } else {
                        ZERO_HASH
                    }
                }
            };
            self.block_map[pos] = ParityCell::Deleted { hash };
        }
        if let Some(inode) = file.inode {
            self.inode_index.remove(&inode);
        }
        self.mark_dirty();
        Ok(file)
    }

    /// Removes a link entirely from the catalog.
    pub fn remove_link(&mut self, sub: &Path) -> Result<Link, CatalogError> {
        let link = self
            .links
            .remove(sub)
            .ok_or_else(|| CatalogError::Invariant(format!("remove_link: no such link {:?}", sub)))?;
        self.mark_dirty();
        Ok(link)
    }

    /// Removes an empty directory entry entirely from the catalog.
    pub fn remove_empty_dir(&mut self, sub: &Path) -> Result<EmptyDir, CatalogError> {
        let dir = self.empty_dirs.remove(sub).ok_or_else(|| {
            CatalogError::Invariant(format!("remove_empty_dir: no such dir {:?}", sub))
        })?;
        self.mark_dirty();
        Ok(dir)
    }

    /// Inserts `file` into both indices immediately, with no blocks
    /// allocated yet. This is the first half of the two-phase insert
    /// (§4.2 step 3): indexing happens as soon as a new entry is
    /// classified, so a later entry in the same scan can still be
    /// recognized as a hardlink to it, while the actual parity slot
    /// assignment is deferred until the insert list has been sorted (see
    /// [`DiskCatalog::allocate_blocks`]).
    pub fn insert_file_pending(&mut self, file: File) {
        let sub = file.sub.clone();
        if let Some(inode) = file.inode {
            self.inode_index.insert(inode, sub.clone());
        }
        self.files.insert(sub, file);
        self.mark_dirty();
    }

    /// Assigns parity slots to every block of the file at `sub` (§4.5
    /// insert path), reusing slots freed by earlier deletes before
    /// growing the map. Must be called once per pending insert, in the
    /// order produced by the deferred-insert sort (§4.7).
    pub fn allocate_blocks(&mut self, sub: &Path) -> Result<(), CatalogError> {
        let size = self
            .files
            .get(sub)
            .ok_or_else(|| CatalogError::Invariant(format!("allocate_blocks: no such file {:?}", sub)))?
            .size;
        let nblocks = blocks_for_size(self.block_size, size);
        let mut cursor = self.first_free_slot;
        let mut blocks = Vec::with_capacity(nblocks as usize);
        for _ in 0..nblocks {
            while cursor < self.block_map.len()
                && matches!(self.block_map[cursor], ParityCell::FileBlock { .. })
            {
                cursor += 1;
            }
            if cursor >= self.block_map.len() {
                self.block_map.resize(cursor + 1, ParityCell::Empty);
            }
            let (state, hash) = match &self.block_map[cursor] {
                ParityCell::Empty => (BlockState::New, ZERO_HASH),
                ParityCell::Deleted { hash } => (BlockState::Chg, *hash),
                ParityCell::FileBlock { .. } => {
                    unreachable!("cursor never stops on an occupied slot")
                }
            };
            blocks.push(scan_api::types::FileBlock {
                parity_pos: cursor as u64,
                state,
                hash,
            });
            cursor += 1;
        }
        if nblocks > 0 {
            self.first_free_slot = cursor;
        }
        for (i, b) in blocks.iter().enumerate() {
            self.block_map[b.parity_pos as usize] = ParityCell::FileBlock {
                owner: sub.to_path_buf(),
                block_index: i,
            };
        }
        self.files.get_mut(sub).expect("checked above").blocks = blocks;
        Ok(())
    }

    /// Inserts a new link, not previously tracked, into the catalog.
    pub fn insert_link(&mut self, link: Link) {
        self.links.insert(link.sub.clone(), link);
        self.mark_dirty();
    }

    /// Inserts a new empty directory entry, not previously tracked, into
    /// the catalog.
    pub fn insert_empty_dir(&mut self, dir: EmptyDir) {
        self.empty_dirs.insert(dir.sub.clone(), dir);
        self.mark_dirty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_api::types::FileBlock;

    fn file(sub: &str, inode: Option<u64>, size: u64) -> File {
        File {
            sub: PathBuf::from(sub),
            size,
            mtime_sec: 1000,
            mtime_nsec: Some(0),
            inode,
            physical: None,
            blocks: vec![],
            present: false,
        }
    }

    #[test]
    fn blocks_for_size_rounds_up_and_handles_zero() {
        assert_eq!(blocks_for_size(256, 0), 0);
        assert_eq!(blocks_for_size(256, 1), 1);
        assert_eq!(blocks_for_size(256, 256), 1);
        assert_eq!(blocks_for_size(256, 257), 2);
    }

    #[test]
    fn insert_reuses_deleted_slot_before_growing() {
        let mut cat = DiskCatalog::new(256);
        let mut f = file("x", Some(10), 512);
        f.blocks = vec![
            FileBlock { parity_pos: 0, state: BlockState::Blk, hash: [1; 16] },
            FileBlock { parity_pos: 1, state: BlockState::Blk, hash: [2; 16] },
        ];
        cat.seed_file(f);
        cat.remove_file(Path::new("x"), false).unwrap();
        assert_eq!(cat.first_free_slot(), 0);

        let y = file("y", Some(20), 256);
        cat.insert_file_pending(y);
        cat.allocate_blocks(Path::new("y")).unwrap();
        let inserted = cat.file_by_sub(Path::new("y")).unwrap();
        assert_eq!(inserted.blocks[0].parity_pos, 0);
        assert_eq!(inserted.blocks[0].state, BlockState::Chg);
        assert_eq!(inserted.blocks[0].hash, [1; 16]);
        assert_eq!(cat.first_free_slot(), 1);
        match cat.block_map_cell(1).unwrap() {
            ParityCell::Deleted { hash } => assert_eq!(*hash, [2; 16]),
            other => panic!("expected deleted cell, got {:?}", other),
        }
    }

    #[test]
    fn zero_length_insert_consumes_no_slot() {
        let mut cat = DiskCatalog::new(256);
        cat.insert_file_pending(file("empty", Some(1), 0));
        cat.allocate_blocks(Path::new("empty")).unwrap();
        assert_eq!(cat.block_map_len(), 0);
        assert_eq!(cat.first_free_slot(), 0);
    }
}
