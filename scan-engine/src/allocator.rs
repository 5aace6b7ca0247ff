//! Parity block allocator (§4.5).
//!
//! The allocator has no state of its own: it is the subset of
//! [`DiskCatalog`]'s behavior that owns the parity block map. It is split
//! out as its own module, the way this workspace splits block-layer
//! concerns from inode-layer concerns across separate source files, even
//! though both operate on the same catalog value.
//!
//! - [`DiskCatalog::remove_file`] is the delete path: it releases a file's
//!   slots back to the map as `Deleted` cells, preserving or clearing
//!   their hash per invariant I5.
//! - [`DiskCatalog::insert_file_pending`] / [`DiskCatalog::allocate_blocks`]
//!   are the two halves of the insert path: index immediately, allocate
//!   slots later, once the deferred-insert list has been sorted (§4.7).

pub use crate::catalog::DiskCatalog;
