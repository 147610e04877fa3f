//! # hostmount-csi: host path CSI node plugin for RK8s
//!
//! `hostmount-csi` publishes pieces of the node's filesystem into Pods.  Each
//! publish request names a volume type in its context and is routed to one of
//! two mount strategies: a plain bind mount (`local`, `socket`) or a per-volume
//! overlay that is then bound into the Pod (`apm`).  Requests arrive over the
//! same QUIC-based CSI transport the rest of RK8s uses, and the plugin keeps no
//! state between calls; the host's mount table is authoritative.
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Wire data model: requests, plugin and node info. |
//! | [`error`] | [`CsiError`] and its [`StatusCode`] classification. |
//! | [`config`] | [`DriverConfig`]: base, overlay and protected directories. |
//! | [`message`] | [`CsiMessage`] protocol envelope for QUIC transport. |
//! | [`identity`] | [`CsiIdentity`] trait — plugin discovery & health. |
//! | [`node`] | [`CsiNode`] trait — publish and unpublish. |
//! | [`dispatch`] | Validates requests and picks a strategy by volume type. |
//! | [`strategy`] | Bind and overlay mount strategies, shared teardown. |
//! | [`provision`] | Creates missing paths and normalizes permissions. |
//! | [`mount`] | [`Mounter`](mount::Mounter) seam over the mount syscalls. |
//! | [`transport`] | QUIC client/server built on `quinn`. |
//! | [`backend`] | [`HostMountDriver`], the trait implementation served. |

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod message;
pub mod mount;
pub mod node;
pub mod provision;
pub mod strategy;
pub mod transport;
pub mod types;

pub use backend::hostmount::HostMountDriver;
pub use config::DriverConfig;
pub use error::{CsiError, StatusCode};
pub use identity::CsiIdentity;
pub use message::CsiMessage;
pub use node::CsiNode;
pub use types::*;
