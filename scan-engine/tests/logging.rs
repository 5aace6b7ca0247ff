//! Smoke test for the logging ambient stack (§4.8): `scan:*`/`summary:*`
//! records go out through the `log` facade on a dedicated target, not to
//! stdout directly, so a host application can route them independently of
//! human-readable lines.

use log::{Log, Metadata, Record};
use scan_api::adapter::{EntryKind, FilesystemAdapter, PathFilter};
use scan_api::config::ScanConfig;
use scan_engine::catalog::DiskCatalog;
use scan_engine::driver::ScanDriver;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use thiserror::Error;

static CAPTURED: OnceLock<Mutex<Vec<(String, String)>>> = OnceLock::new();

struct CapturingLogger;

impl Log for CapturingLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        CAPTURED
            .get_or_init(|| Mutex::new(Vec::new()))
            .lock()
            .unwrap()
            .push((record.target().to_string(), record.args().to_string()));
    }

    fn flush(&self) {}
}

#[derive(Debug, Error)]
#[error("fake adapter error: {0}")]
struct FakeError(String);

struct FakeAdapter {
    dirs: HashMap<PathBuf, Vec<(PathBuf, EntryKind)>>,
    metas: HashMap<PathBuf, scan_api::adapter::Metadata>,
}

impl FilesystemAdapter for FakeAdapter {
    type Error = FakeError;

    fn read_dir(&self, dir: &Path) -> Result<Vec<(PathBuf, EntryKind)>, Self::Error> {
        Ok(self.dirs.get(dir).cloned().unwrap_or_default())
    }

    fn lstat(&self, path: &Path) -> Result<scan_api::adapter::Metadata, Self::Error> {
        self.metas
            .get(path)
            .copied()
            .ok_or_else(|| FakeError(format!("no metadata for {:?}", path)))
    }

    fn read_link(&self, path: &Path) -> Result<String, Self::Error> {
        Err(FakeError(format!("no link at {:?}", path)))
    }

    fn physical_offset(
        &self,
        _path: &Path,
        _meta: &scan_api::adapter::Metadata,
    ) -> Result<Option<u64>, Self::Error> {
        Ok(None)
    }

    fn has_persistent_inodes(&self, _disk_root: &Path) -> Result<bool, Self::Error> {
        Ok(true)
    }

    fn root_device(&self, _disk_root: &Path) -> Result<u64, Self::Error> {
        Ok(1)
    }
}

struct NoFilter;
impl PathFilter for NoFilter {
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

static LOGGER: CapturingLogger = CapturingLogger;

#[test]
fn gui_summary_lines_are_routed_to_the_scan_gui_target() {
    log::set_logger(&LOGGER).expect("logger installed once per test binary");
    log::set_max_level(log::LevelFilter::Trace);

    let mut dirs = HashMap::new();
    dirs.insert(
        PathBuf::from("/disk"),
        vec![(PathBuf::from("a.txt"), EntryKind::File)],
    );
    let mut metas = HashMap::new();
    metas.insert(
        PathBuf::from("/disk/a.txt"),
        scan_api::adapter::Metadata {
            ino: 1,
            dev: 1,
            size: 10,
            nlink: 1,
            mtime_sec: 1000,
            mtime_nsec: 0,
            kind: EntryKind::File,
        },
    );
    let adapter = FakeAdapter { dirs, metas };
    let filter = NoFilter;
    let config = ScanConfig {
        block_size: 256,
        gui: true,
        ..ScanConfig::default()
    };
    let driver = ScanDriver::new(&adapter, &filter, &config);
    let mut catalog = DiskCatalog::new(256);

    driver
        .scan_disk(&mut catalog, "disk1", Path::new("/disk"))
        .unwrap();

    let records = CAPTURED.get().unwrap().lock().unwrap();
    assert!(records
        .iter()
        .any(|(target, msg)| target == "scan::gui" && msg.starts_with("scan:add:disk1:a.txt")));
    assert!(records
        .iter()
        .any(|(target, msg)| target == "scan::gui" && msg == "summary:exit:diff"));
    assert!(records
        .iter()
        .filter(|(_, msg)| msg.starts_with("scan:") || msg.starts_with("summary:"))
        .all(|(target, _)| target == "scan::gui"));
}
