//! CSI error types.
//!
//! All errors in the `hostmount-csi` crate are represented by the [`CsiError`]
//! enum, which derives [`thiserror::Error`] for ergonomic error handling and
//! also implements [`Serialize`]/[`Deserialize`] so errors can travel across
//! the QUIC transport layer.
//!
//! Callers that need the coarse CSI status class (what the orchestrator sees)
//! use [`CsiError::code`].

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for CSI operations.
#[derive(Debug, Error, Serialize, Deserialize, Clone)]
pub enum CsiError {
    /// The caller supplied an invalid or incomplete request.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A directory or file could not be checked, created or chmod-ed.
    #[error("provisioning {path} failed: {reason}")]
    Provision {
        /// Filesystem path being provisioned.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// A mount operation (or the mount-point check preceding it) failed.
    #[error("mount failed at {path}: {reason}")]
    MountFailed {
        /// Filesystem path where the mount was attempted.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// An unmount operation, or the cleanup following it, failed.
    #[error("unmount failed at {path}: {reason}")]
    UnmountFailed {
        /// Filesystem path where the unmount was attempted.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// A QUIC / transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// An unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse status class reported back to the orchestrator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StatusCode {
    /// The request is malformed; retrying it unchanged will fail again.
    InvalidArgument,
    /// A host-side filesystem or mount operation failed.
    Internal,
    /// The plugin could not be reached.
    Unavailable,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => f.write_str("InvalidArgument"),
            Self::Internal => f.write_str("Internal"),
            Self::Unavailable => f.write_str("Unavailable"),
        }
    }
}

impl CsiError {
    /// Status class of this error.
    pub fn code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::InvalidArgument,
            Self::TransportError(_) => StatusCode::Unavailable,
            Self::Provision { .. }
            | Self::MountFailed { .. }
            | Self::UnmountFailed { .. }
            | Self::Internal(_) => StatusCode::Internal,
        }
    }

    /// Create a [`CsiError::InvalidArgument`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn invalid<E: fmt::Display>(e: E) -> Self {
        Self::InvalidArgument(e.to_string())
    }

    /// Create a [`CsiError::Provision`] for `path`.
    pub fn provision<E: fmt::Display>(path: &Path, e: E) -> Self {
        Self::Provision {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }

    /// Create a [`CsiError::MountFailed`] for `path`.
    pub fn mount<E: fmt::Display>(path: &Path, e: E) -> Self {
        Self::MountFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }

    /// Create a [`CsiError::UnmountFailed`] for `path`.
    pub fn unmount<E: fmt::Display>(path: &Path, e: E) -> Self {
        Self::UnmountFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }

    /// Create a [`CsiError::TransportError`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn transport<E: fmt::Display>(e: E) -> Self {
        Self::TransportError(e.to_string())
    }

    /// Create a [`CsiError::Internal`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn internal<E: fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}
