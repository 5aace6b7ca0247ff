//! Scan driver: recursive walk, removal sweep, deferred-insert sorting and
//! sanity gates (§4.1, §4.6, §4.7), tying the filesystem adapter, filter,
//! catalog and reconciler together into one pass over a disk.

use crate::catalog::DiskCatalog;
use crate::error::{Result, ScanError};
use crate::reconciler::{self, Counters, FileOutcome};
use log::{info, warn};
use scan_api::adapter::{EntryKind, FilesystemAdapter, Metadata, PathFilter};
use scan_api::config::ScanConfig;
use scan_api::types::LinkKind;
use std::path::{Path, PathBuf};

/// Result of scanning one disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    /// Classification tally across files, links and empty directories.
    pub counters: Counters,
    /// Whether the caller should persist the catalog.
    pub need_write: bool,
}

/// Drives a scan of one or more disks against a shared configuration.
pub struct ScanDriver<'a, A, F> {
    adapter: &'a A,
    filter: &'a F,
    config: &'a ScanConfig,
}

impl<'a, A, F> ScanDriver<'a, A, F>
where
    A: FilesystemAdapter,
    A::Error: Send + Sync + 'static,
    F: PathFilter,
{
    /// Builds a driver against the given collaborators and policy flags.
    pub fn new(adapter: &'a A, filter: &'a F, config: &'a ScanConfig) -> Self {
        ScanDriver {
            adapter,
            filter,
            config,
        }
    }

    /// Runs a full scan of one disk rooted at `disk_root`, mutating
    /// `catalog` in place (§4.1). `disk` names the disk for the `<disk>`
    /// field of every `scan:*` GUI-protocol line (§6).
    pub fn scan_disk(&self, catalog: &mut DiskCatalog, disk: &str, disk_root: &Path) -> Result<ScanReport> {
        if !self
            .adapter
            .has_persistent_inodes(disk_root)
            .map_err(|e| ScanError::Other(anyhow::Error::new(e)))?
        {
            self.degrade_non_persistent_inodes(catalog);
        }

        catalog.clear_present();

        let mut counters = Counters::default();
        let mut insert_queue: Vec<PathBuf> = Vec::new();
        let root_dev = self
            .adapter
            .root_device(disk_root)
            .map_err(|e| ScanError::Other(anyhow::Error::new(e)))?;

        self.scan_dir(
            catalog,
            disk,
            disk_root,
            Path::new(""),
            root_dev,
            &mut counters,
            &mut insert_queue,
        )?;

        self.sweep_removals(catalog, disk, &mut counters);
        self.sort_insert_queue(catalog, &mut insert_queue);

        for sub in &insert_queue {
            catalog
                .allocate_blocks(sub)
                .map_err(ScanError::Catalog)?;
        }

        self.run_sanity_gates(catalog, &counters, &insert_queue)?;

        if self.config.verbose {
            info!(
                "scan complete: equal={} move={} restore={} change={} insert={} remove={}",
                counters.equal,
                counters.moved,
                counters.restored,
                counters.changed,
                counters.inserted,
                counters.removed
            );
        }
        if self.config.gui {
            info!(target: "scan::gui", "summary:equal:{}", counters.equal);
            info!(target: "scan::gui", "summary:moved:{}", counters.moved);
            info!(target: "scan::gui", "summary:restored:{}", counters.restored);
            info!(target: "scan::gui", "summary:updated:{}", counters.changed);
            info!(target: "scan::gui", "summary:added:{}", counters.inserted);
            info!(target: "scan::gui", "summary:removed:{}", counters.removed);
            let has_diff = counters.moved > 0
                || counters.restored > 0
                || counters.changed > 0
                || counters.inserted > 0
                || counters.removed > 0;
            info!(
                target: "scan::gui",
                "summary:exit:{}",
                if has_diff { "diff" } else { "equal" }
            );
        }

        Ok(ScanReport {
            counters,
            need_write: catalog.need_write(),
        })
    }

    /// Downgrades every file on a non-persistent-inode disk to path-only
    /// tracking, so no match will ever be attempted against a stale inode
    /// number (§4.1 step 1).
    fn degrade_non_persistent_inodes(&self, catalog: &mut DiskCatalog) {
        let subs: Vec<PathBuf> = catalog.files().map(|f| f.sub.clone()).collect();
        for sub in &subs {
            let _ = catalog.drop_inode(sub);
        }
        catalog.has_not_persistent_inodes = true;
        warn!("disk reports non-persistent inodes; move detection is degraded on this scan");
    }

    fn scan_dir(
        &self,
        catalog: &mut DiskCatalog,
        disk: &str,
        disk_root: &Path,
        sub_dir: &Path,
        root_dev: u64,
        counters: &mut Counters,
        insert_queue: &mut Vec<PathBuf>,
    ) -> Result<bool> {
        let abs_dir = disk_root.join(sub_dir);
        let mut entries = self
            .adapter
            .read_dir(&abs_dir)
            .map_err(|e| ScanError::Other(anyhow::Error::new(e)))?;

        if !catalog.has_not_persistent_inodes {
            let mut with_ino: Vec<(u64, (PathBuf, EntryKind))> = Vec::with_capacity(entries.len());
            for entry in entries.into_iter() {
                let abs = disk_root.join(sub_dir.join(&entry.0));
                let ino = self
                    .adapter
                    .lstat(&abs)
                    .map(|m| m.ino)
                    .unwrap_or(u64::MAX);
                with_ino.push((ino, entry));
            }
            with_ino.sort_by_key(|(ino, _)| *ino);
            entries = with_ino.into_iter().map(|(_, e)| e).collect();
        }

        let mut any_processed = false;

        for (name, kind) in entries {
            let entry_sub = sub_dir.join(&name);

            if self.filter.should_exclude_hidden(&entry_sub)
                || self.filter.should_exclude_content_file(&entry_sub)
            {
                if self.config.verbose {
                    info!("Excluding {}", entry_sub.display());
                }
                continue;
            }

            let abs_path = disk_root.join(&entry_sub);

            match kind {
                EntryKind::Dir => {
                    if self.filter.should_exclude_dir(&entry_sub) {
                        if self.config.verbose {
                            info!("Excluding {}", entry_sub.display());
                        }
                        continue;
                    }
                    let meta = self
                        .adapter
                        .lstat(&abs_path)
                        .map_err(|e| ScanError::Other(anyhow::Error::new(e)))?;
                    if meta.dev != root_dev {
                        warn!(
                            "not descending into {}: on a different device than the disk root",
                            entry_sub.display()
                        );
                        continue;
                    }
                    let processed = self.scan_dir(
                        catalog,
                        disk,
                        disk_root,
                        &entry_sub,
                        root_dev,
                        counters,
                        insert_queue,
                    )?;
                    if !processed {
                        reconciler::reconcile_empty_dir(catalog, disk, &entry_sub, counters);
                    }
                    any_processed = true;
                }
                EntryKind::File => {
                    if self.filter.should_exclude_file(&entry_sub) {
                        if self.config.verbose {
                            info!("Excluding {}", entry_sub.display());
                        }
                        continue;
                    }
                    let meta = self
                        .adapter
                        .lstat(&abs_path)
                        .map_err(|e| ScanError::Other(anyhow::Error::new(e)))?;
                    let physical = self
                        .adapter
                        .physical_offset(&abs_path, &meta)
                        .map_err(|e| ScanError::Other(anyhow::Error::new(e)))?;
                    let outcome = reconciler::reconcile_file(
                        catalog,
                        disk,
                        &entry_sub,
                        &meta,
                        physical,
                        self.config.force_zero,
                        counters,
                    )?;
                    if let FileOutcome::Queued = outcome {
                        insert_queue.push(entry_sub.clone());
                    }
                    if self.config.verbose {
                        log_file_outcome(&entry_sub, &outcome);
                    }
                    any_processed = true;
                }
                EntryKind::Symlink => {
                    let target = self
                        .adapter
                        .read_link(&abs_path)
                        .map_err(|e| ScanError::Other(anyhow::Error::new(e)))?;
                    if target.len() > self.config.max_symlink_target_len {
                        return Err(ScanError::SymlinkTargetTooLong {
                            path: entry_sub.clone(),
                            len: target.len(),
                            max: self.config.max_symlink_target_len,
                        });
                    }
                    reconciler::reconcile_link(
                        catalog,
                        disk,
                        &entry_sub,
                        target,
                        LinkKind::Symlink,
                        counters,
                    )?;
                    any_processed = true;
                }
                EntryKind::Other => {
                    warn!("skipping unsupported entry {}", entry_sub.display());
                }
            }
        }

        Ok(any_processed)
    }

    /// Removes every entry not observed on this scan (§4.1 step 4).
    fn sweep_removals(&self, catalog: &mut DiskCatalog, disk: &str, counters: &mut Counters) {
        let missing_files: Vec<PathBuf> = catalog
            .files()
            .filter(|f| !f.present)
            .map(|f| f.sub.clone())
            .collect();
        for sub in missing_files {
            if catalog.remove_file(&sub, self.config.clear_undetermined_hash).is_ok() {
                counters.removed += 1;
                if self.config.verbose {
                    info!("Remove {}", sub.display());
                }
                info!(target: "scan::gui", "scan:remove:{}:{}", disk, sub.display());
            }
        }

        let missing_links: Vec<PathBuf> = catalog
            .links()
            .filter(|l| !l.present)
            .map(|l| l.sub.clone())
            .collect();
        for sub in missing_links {
            if catalog.remove_link(&sub).is_ok() {
                counters.removed += 1;
                if self.config.verbose {
                    info!("Remove {}", sub.display());
                }
                info!(target: "scan::gui", "scan:remove:{}:{}", disk, sub.display());
            }
        }

        let missing_dirs: Vec<PathBuf> = catalog
            .empty_dirs()
            .filter(|d| !d.present)
            .map(|d| d.sub.clone())
            .collect();
        for sub in missing_dirs {
            if catalog.remove_empty_dir(&sub).is_ok() {
                counters.removed += 1;
                if self.config.verbose {
                    info!("Remove {}", sub.display());
                }
                info!(target: "scan::gui", "scan:remove:{}:{}", disk, sub.display());
            }
        }
    }

    /// Orders the deferred file-insert list before parity slots are
    /// assigned (§4.7). The sort is stable so ties fall back to traversal
    /// order.
    fn sort_insert_queue(&self, catalog: &DiskCatalog, queue: &mut Vec<PathBuf>) {
        use scan_api::types::SortOrder;
        match self.config.force_order {
            SortOrder::Dir => {}
            SortOrder::Alpha => queue.sort(),
            SortOrder::Inode => queue.sort_by_key(|sub| {
                catalog
                    .file_by_sub(sub)
                    .and_then(|f| f.inode)
                    .unwrap_or(u64::MAX)
            }),
            SortOrder::Physical => queue.sort_by_key(|sub| {
                catalog
                    .file_by_sub(sub)
                    .and_then(|f| f.physical)
                    .unwrap_or(u64::MAX)
            }),
        }
    }

    /// Post-insert checks (§4.6).
    fn run_sanity_gates(
        &self,
        catalog: &mut DiskCatalog,
        counters: &Counters,
        insert_queue: &[PathBuf],
    ) -> Result<()> {
        let all_absent = counters.equal == 0 && counters.moved == 0 && counters.restored == 0;
        let has_diff = counters.removed != 0 || counters.changed != 0;
        if all_absent && has_diff && !self.config.force_empty {
            return Err(ScanError::Policy(
                "disk appears empty (no equal/move/restore entries) but has removals or changes queued; pass force_empty to proceed anyway".to_string(),
            ));
        }

        if self.config.force_order == scan_api::types::SortOrder::Physical {
            let mut last: Option<u64> = None;
            for sub in insert_queue {
                if let Some(phys) = catalog.file_by_sub(sub).and_then(|f| f.physical) {
                    if last == Some(phys) {
                        catalog.has_not_reliable_physical = true;
                        warn!(
                            "physical offset {} is shared by more than one file; physical ordering is unreliable on this disk",
                            phys
                        );
                    }
                    last = Some(phys);
                }
            }
        }

        if catalog.has_not_persistent_inodes {
            warn!("inode numbers on this disk are not persistent; moves will not be detected on future scans");
        }

        Ok(())
    }
}

fn log_file_outcome(sub: &Path, outcome: &FileOutcome) {
    match outcome {
        FileOutcome::Queued => info!("Add {}", sub.display()),
        FileOutcome::Matched => info!("Update {}", sub.display()),
        FileOutcome::Hardlink { target } => {
            info!("Link {} -> {}", sub.display(), target.display())
        }
    }
}
