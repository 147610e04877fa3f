//! [`Mounter`] backed by the Linux mount syscalls via `nix`.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use nix::mount::{MsFlags, mount, umount};
use tracing::{debug, warn};

use super::{MountState, Mounter};

/// Mount table of the calling process.
pub const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// Issues real mount syscalls against the host.
#[derive(Debug, Clone)]
pub struct SystemMounter {
    mountinfo: PathBuf,
}

impl Default for SystemMounter {
    fn default() -> Self {
        Self {
            mountinfo: PathBuf::from(MOUNTINFO_PATH),
        }
    }
}

impl SystemMounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Mounter for SystemMounter {
    fn mount_state(&self, path: &Path) -> io::Result<MountState> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(MountState::Absent),
            Err(e) => return Err(e),
        };
        if meta.file_type().is_symlink() {
            return Ok(MountState::NotMounted);
        }

        let canonical = fs::canonicalize(path)?;
        let Some(parent) = canonical.parent() else {
            // `/` is always a mount point.
            return Ok(MountState::Mounted);
        };
        if fs::metadata(parent)?.dev() != meta.dev() {
            return Ok(MountState::Mounted);
        }

        // Bind mounts from the same device keep st_dev; only the mount
        // table can tell those apart.
        let table = fs::read_to_string(&self.mountinfo)?;
        if mountinfo_lists(&table, &canonical) {
            Ok(MountState::Mounted)
        } else {
            Ok(MountState::NotMounted)
        }
    }

    fn bind_mount(&self, source: &Path, target: &Path, read_only: bool) -> io::Result<()> {
        debug!(source = %source.display(), target_path = %target.display(), read_only, "bind mount");
        mount(
            Some(source),
            target,
            None::<&str>,
            MsFlags::MS_BIND,
            None::<&str>,
        )?;

        // MS_RDONLY is ignored on the initial bind; a separate remount is
        // required to actually enforce read-only access.
        if read_only
            && let Err(e) = mount(
                None::<&str>,
                target,
                None::<&str>,
                MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
                None::<&str>,
            )
        {
            if let Err(undo) = umount(target) {
                warn!(target_path = %target.display(), error = %undo, "failed to undo writable bind mount");
            }
            return Err(io::Error::other(format!("remount read-only: {e}")));
        }
        Ok(())
    }

    fn mount_overlay(
        &self,
        lower: &Path,
        upper: &Path,
        work: &Path,
        merged: &Path,
    ) -> io::Result<()> {
        let mut options = Vec::new();
        options.extend_from_slice(b"lowerdir=");
        options.extend_from_slice(lower.as_os_str().as_bytes());
        options.extend_from_slice(b",upperdir=");
        options.extend_from_slice(upper.as_os_str().as_bytes());
        options.extend_from_slice(b",workdir=");
        options.extend_from_slice(work.as_os_str().as_bytes());

        debug!(
            merged = %merged.display(),
            options = %String::from_utf8_lossy(&options),
            "overlay mount",
        );
        mount(
            Some("overlay".as_bytes()),
            merged,
            Some("overlay".as_bytes()),
            MsFlags::empty(),
            Some(&options[..]),
        )?;
        Ok(())
    }

    fn unmount(&self, target: &Path) -> io::Result<()> {
        debug!(target_path = %target.display(), "unmount");
        umount(target)?;
        Ok(())
    }
}

/// Return `true` if `path` appears as a mount point in a
/// `/proc/<pid>/mountinfo` table.
fn mountinfo_lists(table: &str, path: &Path) -> bool {
    // Format: <id> <parent> <maj:min> <root> <mountpoint> <options> ...
    table
        .lines()
        .filter_map(|line| line.split_whitespace().nth(4))
        .any(|field| unescape_octal(field) == path)
}

/// Decode the `\NNN` octal escapes the kernel applies to whitespace and
/// backslashes in mount table paths.
fn unescape_octal(field: &str) -> PathBuf {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let value = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
            if let Ok(byte) = u8::try_from(value) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    PathBuf::from(OsStr::from_bytes(&out))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
22 1 0:21 / /proc rw,nosuid,nodev,noexec,relatime shared:12 - proc proc rw
25 1 259:2 / / rw,relatime shared:1 - ext4 /dev/nvme0n1p2 rw
312 25 259:2 /srv/agent /var/lib/kubelet/pods/p1/volumes/agent rw,relatime shared:1 - ext4 /dev/nvme0n1p2 rw
313 25 259:2 /srv/data /mnt/with\\040space rw,relatime shared:1 - ext4 /dev/nvme0n1p2 rw
";

    #[test]
    fn finds_bind_mount_on_same_device() {
        assert!(mountinfo_lists(
            TABLE,
            Path::new("/var/lib/kubelet/pods/p1/volumes/agent")
        ));
        assert!(!mountinfo_lists(
            TABLE,
            Path::new("/var/lib/kubelet/pods/p1/volumes")
        ));
    }

    #[test]
    fn decodes_escaped_mount_points() {
        assert!(mountinfo_lists(TABLE, Path::new("/mnt/with space")));
        assert_eq!(unescape_octal("a\\134b"), PathBuf::from("a\\b"));
        assert_eq!(unescape_octal("trailing\\04"), PathBuf::from("trailing\\04"));
    }

    #[test]
    fn missing_path_is_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let state = SystemMounter::new()
            .mount_state(&tmp.path().join("nope"))
            .unwrap();
        assert_eq!(state, MountState::Absent);
    }

    #[test]
    fn plain_directory_is_not_mounted() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("plain");
        fs::create_dir(&dir).unwrap();
        let state = SystemMounter::new().mount_state(&dir).unwrap();
        assert_eq!(state, MountState::NotMounted);
    }
}
