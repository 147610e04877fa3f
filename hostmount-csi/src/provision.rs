//! Idempotent creation of the directories and files the strategies mount
//! onto or from.

use std::fs::{self, Permissions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::DriverConfig;
use crate::error::CsiError;

/// What [`Provisioner::ensure`] should create when the path is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Dir,
    File,
}

/// Creates missing paths with a fixed mode and refuses to ever create the
/// protected host log directory.
#[derive(Debug, Clone)]
pub struct Provisioner {
    mode: u32,
    protected: PathBuf,
}

impl Provisioner {
    pub fn new(config: &DriverConfig) -> Self {
        Self {
            mode: config.dir_mode,
            protected: config.protected_path.clone(),
        }
    }

    /// Make sure `path` exists, creating it (recursively for directories)
    /// with the configured mode if it does not.  Existing paths are left
    /// untouched.
    ///
    /// # Panics
    ///
    /// Panics if creating `path` would create the protected path.  That only
    /// happens on a misconfigured node and must not be handled as an error.
    pub fn ensure(&self, path: &Path, kind: PathKind) -> Result<(), CsiError> {
        match fs::symlink_metadata(path) {
            Ok(_) => {
                debug!(path = %path.display(), "path already exists");
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(CsiError::provision(path, format!("stat: {e}"))),
        }

        self.assert_not_protected(path);

        match kind {
            PathKind::Dir => {
                fs::create_dir_all(path)
                    .map_err(|e| CsiError::provision(path, format!("mkdir: {e}")))?;
            }
            PathKind::File => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| CsiError::provision(parent, format!("mkdir: {e}")))?;
                }
                fs::File::create(path)
                    .map_err(|e| CsiError::provision(path, format!("create: {e}")))?;
            }
        }

        // The umask may have stripped bits from the mode used at creation.
        fs::set_permissions(path, Permissions::from_mode(self.mode))
            .map_err(|e| CsiError::provision(path, format!("chmod: {e}")))?;

        info!(path = %path.display(), ?kind, mode = %format!("{:o}", self.mode), "created");
        Ok(())
    }

    /// Apply the configured mode to `root` and everything beneath it.
    ///
    /// Symlinks are not followed.  Stops at the first entry that cannot be
    /// read or chmod-ed.
    pub fn normalize_tree(&self, root: &Path) -> Result<(), CsiError> {
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(|e| {
                let at = e.path().unwrap_or(root).to_path_buf();
                CsiError::provision(&at, format!("walk: {e}"))
            })?;
            if entry.file_type().is_symlink() {
                continue;
            }
            fs::set_permissions(entry.path(), Permissions::from_mode(self.mode))
                .map_err(|e| CsiError::provision(entry.path(), format!("chmod: {e}")))?;
        }
        debug!(root = %root.display(), mode = %format!("{:o}", self.mode), "tree normalized");
        Ok(())
    }

    /// Abort if creating the missing `path` would bring the protected path
    /// into existence, either directly or as a missing ancestor.
    ///
    /// Every path `create_dir_all` would create is compared after resolving
    /// symlinks and `..`, so neither can be used to reach the protected path.
    fn assert_not_protected(&self, path: &Path) {
        let protected = resolve(&self.protected);
        let created = path
            .ancestors()
            .take_while(|p| !p.as_os_str().is_empty() && fs::symlink_metadata(p).is_err())
            .find(|p| resolve(p) == protected);
        if let Some(created) = created {
            panic!(
                "refusing to create protected path {} (while provisioning {}, via {})",
                self.protected.display(),
                path.display(),
                created.display()
            );
        }
    }
}

/// Resolve `path` the way the kernel would once its missing tail exists:
/// canonicalize the deepest existing ancestor, then apply the remaining
/// components lexically.
fn resolve(path: &Path) -> PathBuf {
    for existing in path.ancestors() {
        if existing.as_os_str().is_empty() {
            break;
        }
        let (Ok(mut resolved), Ok(tail)) = (fs::canonicalize(existing), path.strip_prefix(existing))
        else {
            continue;
        };
        push_lexical(&mut resolved, tail);
        return resolved;
    }
    let mut resolved = PathBuf::new();
    push_lexical(&mut resolved, path);
    resolved
}

fn push_lexical(base: &mut PathBuf, tail: &Path) {
    for component in tail.components() {
        match component {
            Component::ParentDir => {
                base.pop();
            }
            Component::CurDir => {}
            other => base.push(other),
        }
    }
}
