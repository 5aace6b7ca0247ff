//! Policy flags controlling a scan, loaded from a configuration file by a
//! caller (a CLI front-end, out of scope here) and threaded through the
//! engine as a plain value.

use crate::types::SortOrder;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Policy flags for one invocation of the scan engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Allow a previously non-empty file to be recorded as shrinking to
    /// zero bytes. Off by default as a guard against filesystems (notably
    /// ext4 after an unclean shutdown) that can expose truncated files.
    #[serde(default)]
    pub force_zero: bool,
    /// Allow a disk scan whose only observed filesystem entries are
    /// removals or changes, with no equal/move/restore entries at all.
    #[serde(default)]
    pub force_empty: bool,
    /// Keep the hash of a deleted block even when its state was `Chg` or
    /// `New` at deletion time, instead of zeroing it.
    #[serde(default)]
    pub clear_undetermined_hash: bool,
    /// Emit machine-parseable `scan:*`/`summary:*` records alongside
    /// human-readable logging.
    #[serde(default)]
    pub gui: bool,
    /// Emit a line per reconciled entry.
    #[serde(default)]
    pub verbose: bool,
    /// Ordering applied to the deferred file-insert list.
    #[serde(default)]
    pub force_order: SortOrder,
    /// Block size, in bytes, used to compute how many blocks a file of a
    /// given size occupies. Must agree with the catalog it is paired
    /// with.
    pub block_size: u64,
    /// Maximum length, in bytes, accepted for a symlink target. A
    /// `PATH_MAX`-equivalent bound: Rust's `String` has no static limit of
    /// its own, but a target past this length is still treated as the
    /// original tool's "too long" fatal condition rather than silently
    /// accepted.
    #[serde(default = "default_max_symlink_target_len")]
    pub max_symlink_target_len: usize,
}

fn default_max_symlink_target_len() -> usize {
    4096
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            force_zero: false,
            force_empty: false,
            clear_undetermined_hash: false,
            gui: false,
            verbose: false,
            force_order: SortOrder::Dir,
            block_size: 256 * 1024,
            max_symlink_target_len: default_max_symlink_target_len(),
        }
    }
}

impl ScanConfig {
    /// Validates this configuration. Returns a user-facing message on
    /// failure, as the only way this struct's fields can be wrong is from
    /// a malformed configuration file.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.block_size == 0 {
            return Err("block_size must be greater than zero");
        }
        if self.max_symlink_target_len == 0 {
            return Err("max_symlink_target_len must be greater than zero");
        }
        Ok(())
    }

    /// Parses a configuration from any `Read` source, in whatever format
    /// the caller's `serde` deserializer expects (this crate does not pick
    /// a wire format on the caller's behalf).
    pub fn from_reader<R: Read, F>(mut reader: R, parse: F) -> anyhow::Result<Self>
    where
        F: FnOnce(&str) -> anyhow::Result<Self>,
    {
        let mut buf = String::new();
        reader.read_to_string(&mut buf)?;
        let config = parse(&buf)?;
        config
            .validate()
            .map_err(|msg| anyhow::anyhow!("invalid configuration: {msg}"))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ScanConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_block_size_is_rejected() {
        let mut cfg = ScanConfig::default();
        cfg.block_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_max_symlink_target_len_is_rejected() {
        let mut cfg = ScanConfig::default();
        cfg.max_symlink_target_len = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = ScanConfig {
            verbose: true,
            force_order: SortOrder::Physical,
            ..ScanConfig::default()
        };
        let encoded = serde_json::to_string(&cfg).unwrap();
        let decoded: ScanConfig = serde_json::from_str(&encoded).unwrap();
        assert_eq!(cfg, decoded);
    }
}
