//! Scan engine: reconciles a disk's catalog against its live filesystem
//! state and keeps the parity block map consistent while doing so.
//!
//! Entry point is [`driver::ScanDriver`]; [`catalog::DiskCatalog`] is the
//! data it mutates, built from the types in `scan-api`. `reconciler` holds
//! the per-entry classification rules, and `allocator` documents the
//! block-map-owning subset of `DiskCatalog`'s behavior.

#![deny(missing_docs)]

pub mod allocator;
pub mod catalog;
pub mod driver;
pub mod error;
pub mod reconciler;
