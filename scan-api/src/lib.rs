//! Foundational types and collaborator contracts for the scan engine.
//!
//! This crate carries no policy of its own: it defines the data model a
//! disk catalog is built from ([`types`]), the traits a filesystem adapter
//! and path filter must satisfy ([`adapter`]), the configuration flags a
//! scan is run with ([`config`]), and the error type collaborators surface
//! back up through ([`error`]). The reconciliation and allocation logic
//! that uses all of this lives in `scan-engine`.

#![deny(missing_docs)]

pub mod adapter;
pub mod config;
pub mod error;
pub mod types;
