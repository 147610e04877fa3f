//! Mount-point inspection and mount/unmount syscalls.
//!
//! The strategies never issue mount syscalls directly: they go through a
//! [`Mounter`], so tests can substitute a stub that records calls.  Mount
//! state is always queried live from the host; nothing here caches it.

use std::io;
use std::path::Path;

mod linux;
#[cfg(test)]
pub(crate) mod recording;

pub use linux::{MOUNTINFO_PATH, SystemMounter};

/// Mount state of a path as observed on the host right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    /// Something is mounted at the path.
    Mounted,
    /// The path exists and is an ordinary entry of its parent filesystem.
    NotMounted,
    /// The path does not exist.
    Absent,
}

impl MountState {
    pub fn is_mounted(self) -> bool {
        self == Self::Mounted
    }
}

/// Host mount capability consumed by the mount strategies.
///
/// Implementations block on the underlying syscalls.
pub trait Mounter: Send + Sync {
    /// Report whether `path` is currently a mount point.
    ///
    /// A missing path is [`MountState::Absent`], not an error.
    fn mount_state(&self, path: &Path) -> io::Result<MountState>;

    /// Bind-mount `source` onto `target`, optionally read-only.
    fn bind_mount(&self, source: &Path, target: &Path, read_only: bool) -> io::Result<()>;

    /// Mount an overlay filesystem at `merged` composed of `lower`
    /// (read-only), `upper` (writable) and the scratch `work` directory.
    fn mount_overlay(&self, lower: &Path, upper: &Path, work: &Path, merged: &Path)
    -> io::Result<()>;

    /// Unmount whatever is mounted at `target`.
    fn unmount(&self, target: &Path) -> io::Result<()>;
}
