//! In-memory [`Mounter`] used by the unit tests.
//!
//! Keeps its own mount table instead of touching the host, records every
//! call, and can be told to fail specific operations.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{MountState, Mounter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountCall {
    Bind {
        source: PathBuf,
        target: PathBuf,
        read_only: bool,
    },
    Overlay {
        lower: PathBuf,
        upper: PathBuf,
        work: PathBuf,
        merged: PathBuf,
    },
    Unmount(PathBuf),
}

#[derive(Debug, Default)]
struct Inner {
    mounted: HashSet<PathBuf>,
    calls: Vec<MountCall>,
    fail_bind_from: Option<PathBuf>,
    fail_overlay: bool,
    fail_unmount: bool,
}

#[derive(Debug, Default)]
pub struct RecordingMounter {
    inner: Mutex<Inner>,
}

impl RecordingMounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make bind mounts whose source is `source` fail with `EPERM`.
    pub fn fail_bind_from(&self, source: &Path) {
        self.inner.lock().unwrap().fail_bind_from = Some(source.to_path_buf());
    }

    pub fn fail_overlay(&self) {
        self.inner.lock().unwrap().fail_overlay = true;
    }

    pub fn fail_unmount(&self) {
        self.inner.lock().unwrap().fail_unmount = true;
    }

    /// Pretend something outside the driver mounted `path`.
    pub fn mark_mounted(&self, path: &Path) {
        self.inner.lock().unwrap().mounted.insert(path.to_path_buf());
    }

    pub fn is_mounted(&self, path: &Path) -> bool {
        self.inner.lock().unwrap().mounted.contains(path)
    }

    pub fn calls(&self) -> Vec<MountCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Number of mount syscalls issued (bind and overlay).
    pub fn mount_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| !matches!(c, MountCall::Unmount(_)))
            .count()
    }

    pub fn unmount_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MountCall::Unmount(_)))
            .count()
    }
}

fn eperm() -> io::Error {
    io::Error::from_raw_os_error(1)
}

impl Mounter for RecordingMounter {
    fn mount_state(&self, path: &Path) -> io::Result<MountState> {
        if !path.exists() {
            return Ok(MountState::Absent);
        }
        if self.inner.lock().unwrap().mounted.contains(path) {
            Ok(MountState::Mounted)
        } else {
            Ok(MountState::NotMounted)
        }
    }

    fn bind_mount(&self, source: &Path, target: &Path, read_only: bool) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(MountCall::Bind {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            read_only,
        });
        if inner.fail_bind_from.as_deref() == Some(source) {
            return Err(eperm());
        }
        inner.mounted.insert(target.to_path_buf());
        Ok(())
    }

    fn mount_overlay(
        &self,
        lower: &Path,
        upper: &Path,
        work: &Path,
        merged: &Path,
    ) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(MountCall::Overlay {
            lower: lower.to_path_buf(),
            upper: upper.to_path_buf(),
            work: work.to_path_buf(),
            merged: merged.to_path_buf(),
        });
        if inner.fail_overlay {
            return Err(eperm());
        }
        inner.mounted.insert(merged.to_path_buf());
        Ok(())
    }

    fn unmount(&self, target: &Path) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(MountCall::Unmount(target.to_path_buf()));
        if inner.fail_unmount {
            return Err(eperm());
        }
        if inner.mounted.remove(target) {
            Ok(())
        } else {
            Err(io::Error::from_raw_os_error(22))
        }
    }
}
