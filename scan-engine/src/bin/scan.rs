//! Thin CLI entry point wiring a real filesystem adapter into the scan
//! engine, so the workspace is runnable end to end. Argument parsing here
//! is deliberately minimal (a disk name and a root path): a real front end
//! would own configuration loading, multi-disk orchestration and content
//! file persistence, all named as external collaborators in the engine's
//! design rather than implemented here.

use anyhow::Context;
use scan_api::adapter::{EntryKind, FilesystemAdapter, Metadata, PathFilter};
use scan_api::config::ScanConfig;
use scan_engine::catalog::DiskCatalog;
use scan_engine::driver::ScanDriver;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

/// Filesystem adapter backed directly by `std::fs`.
struct StdFilesystemAdapter;

impl FilesystemAdapter for StdFilesystemAdapter {
    type Error = std::io::Error;

    fn read_dir(&self, dir: &Path) -> Result<Vec<(PathBuf, EntryKind)>, Self::Error> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            let kind = if meta.is_dir() {
                EntryKind::Dir
            } else if meta.file_type().is_symlink() {
                EntryKind::Symlink
            } else if meta.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };
            out.push((PathBuf::from(entry.file_name()), kind));
        }
        Ok(out)
    }

    #[cfg(unix)]
    fn lstat(&self, path: &Path) -> Result<Metadata, Self::Error> {
        let meta = std::fs::symlink_metadata(path)?;
        let kind = if meta.is_dir() {
            EntryKind::Dir
        } else if meta.file_type().is_symlink() {
            EntryKind::Symlink
        } else if meta.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };
        let mtime = meta.modified().ok();
        let (sec, nsec) = mtime
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| (d.as_secs() as i64, d.subsec_nanos()))
            .unwrap_or((0, 0));
        Ok(Metadata {
            ino: meta.ino(),
            dev: meta.dev(),
            size: meta.len(),
            nlink: meta.nlink(),
            mtime_sec: sec,
            mtime_nsec: nsec,
            kind,
        })
    }

    #[cfg(not(unix))]
    fn lstat(&self, path: &Path) -> Result<Metadata, Self::Error> {
        let meta = std::fs::symlink_metadata(path)?;
        let kind = if meta.is_dir() {
            EntryKind::Dir
        } else if meta.file_type().is_symlink() {
            EntryKind::Symlink
        } else if meta.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };
        let mtime = meta.modified().ok();
        let (sec, nsec) = mtime
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| (d.as_secs() as i64, d.subsec_nanos()))
            .unwrap_or((0, 0));
        // Windows file IDs require a separate, file-handle-based query;
        // a real adapter would fill this in. 0/1 keeps move and hardlink
        // detection harmlessly disabled rather than wrong.
        Ok(Metadata {
            ino: 0,
            dev: 1,
            size: meta.len(),
            nlink: 1,
            mtime_sec: sec,
            mtime_nsec: nsec,
            kind,
        })
    }

    fn read_link(&self, path: &Path) -> Result<String, Self::Error> {
        Ok(std::fs::read_link(path)?.to_string_lossy().into_owned())
    }

    fn physical_offset(&self, _path: &Path, _meta: &Metadata) -> Result<Option<u64>, Self::Error> {
        // No portable equivalent of snapraid's filephy() in std; physical
        // ordering degrades to directory order through this adapter.
        Ok(None)
    }

    fn has_persistent_inodes(&self, _disk_root: &Path) -> Result<bool, Self::Error> {
        // A real adapter probes the mounted filesystem type (see
        // fsinfo() in the system this engine reimplements); this
        // reference adapter assumes the common case.
        Ok(true)
    }

    #[cfg(unix)]
    fn root_device(&self, disk_root: &Path) -> Result<u64, Self::Error> {
        Ok(std::fs::metadata(disk_root)?.dev())
    }

    #[cfg(not(unix))]
    fn root_device(&self, _disk_root: &Path) -> Result<u64, Self::Error> {
        Ok(1)
    }
}

/// Path filter that excludes nothing; a real front end compiles this from
/// user-supplied include/exclude patterns.
struct AllowAllFilter;

impl PathFilter for AllowAllFilter {
    fn should_exclude_file(&self, _sub: &Path) -> bool {
        false
    }
    fn should_exclude_dir(&self, _sub: &Path) -> bool {
        false
    }
    fn should_exclude_hidden(&self, _sub: &Path) -> bool {
        false
    }
    fn should_exclude_content_file(&self, _sub: &Path) -> bool {
        false
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let disk_name = args
        .next()
        .context("usage: scan <disk-name> <disk-root> [block-size]")?;
    let disk_root = args
        .next()
        .context("usage: scan <disk-name> <disk-root> [block-size]")?;
    let block_size: u64 = args
        .next()
        .map(|s| s.parse())
        .transpose()
        .context("block-size must be an integer")?
        .unwrap_or(256 * 1024);

    let config = ScanConfig {
        verbose: true,
        block_size,
        ..ScanConfig::default()
    };

    let adapter = StdFilesystemAdapter;
    let filter = AllowAllFilter;
    let driver = ScanDriver::new(&adapter, &filter, &config);
    let mut catalog = DiskCatalog::new(config.block_size);

    let report = driver.scan_disk(&mut catalog, &disk_name, Path::new(&disk_root))?;
    println!(
        "equal={} move={} restore={} change={} insert={} remove={} need_write={}",
        report.counters.equal,
        report.counters.moved,
        report.counters.restored,
        report.counters.changed,
        report.counters.inserted,
        report.counters.removed,
        report.need_write
    );

    Ok(())
}
