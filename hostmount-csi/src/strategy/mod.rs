//! Per-volume-type mount strategies and the teardown they share.
//!
//! | Strategy | Volume types | What lands at the target path |
//! |---|---|---|
//! | [`BindStrategy`] | `local`, `socket` | bind mount of a host directory (a socket's parent) |
//! | [`OverlayStrategy`] | `apm` | bind mount of a per-volume overlay over the shared base |
//!
//! Only mount *creation* differs between strategies; [`unmount_and_remove`]
//! tears down every kind of target the same way.

use std::path::Path;

use crate::error::CsiError;
use crate::mount::{MountState, Mounter};

mod bind;
mod overlay;
mod teardown;

pub use bind::BindStrategy;
pub use overlay::{OverlayLayout, OverlayStrategy};
pub use teardown::unmount_and_remove;

/// Query the live mount state of `path` before mounting onto it.
fn state_before_mount(mounter: &dyn Mounter, path: &Path) -> Result<MountState, CsiError> {
    mounter
        .mount_state(path)
        .map_err(|e| CsiError::mount(path, format!("checking mount point: {e}")))
}
