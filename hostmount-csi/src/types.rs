//! Core CSI types: volume identity, volume types, requests and node info.
//!
//! These types form the data model shared by the CSI traits, transport layer,
//! and the host-mount driver.  They are all [`Serialize`]/[`Deserialize`] so
//! they can be transmitted over QUIC as JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Volume context key selecting the volume type.
pub const CONTEXT_TYPE: &str = "type";
/// Volume context key carrying the host-side source path (`local`/`socket`).
pub const CONTEXT_PATH: &str = "path";

// ---------------------------------------------------------------------------
// Volume identity
// ---------------------------------------------------------------------------

/// Opaque, unique identifier for a volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VolumeId(pub String);

impl VolumeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VolumeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VolumeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Volume type
// ---------------------------------------------------------------------------

/// The `type` attribute of a publish request's volume context.
///
/// Decoded once at the dispatcher boundary; values outside the supported set
/// are kept as [`VolumeType::Unknown`] so the error can name them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeType {
    /// A host directory bind-mounted as is.
    Local,
    /// A host socket file, exposed through its parent directory.
    Socket,
    /// A per-volume copy-on-write overlay over the shared base directory.
    Apm,
    Unknown(String),
}

impl VolumeType {
    pub const LOCAL: &'static str = "local";
    pub const SOCKET: &'static str = "socket";
    pub const APM: &'static str = "apm";
}

impl From<&str> for VolumeType {
    fn from(s: &str) -> Self {
        match s {
            Self::LOCAL => Self::Local,
            Self::SOCKET => Self::Socket,
            Self::APM => Self::Apm,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

impl fmt::Display for VolumeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str(Self::LOCAL),
            Self::Socket => f.write_str(Self::SOCKET),
            Self::Apm => f.write_str(Self::APM),
            Self::Unknown(other) => f.write_str(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Request to publish a volume into a Pod container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePublishVolumeRequest {
    /// Volume to publish.
    pub volume_id: VolumeId,
    /// Target path inside the container's filesystem namespace,
    /// e.g. `/var/lib/kubelet/pods/<pod-uid>/volumes/<vol-name>`.
    pub target_path: String,
    /// Type-specific parameters; must carry [`CONTEXT_TYPE`].
    #[serde(default)]
    pub volume_context: HashMap<String, String>,
    /// Whether the final bind mount should be read-only.
    #[serde(default)]
    pub read_only: bool,
}

// ---------------------------------------------------------------------------
// Plugin & node info
// ---------------------------------------------------------------------------

/// Information about the CSI plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Plugin name, e.g. `"rk8s.hostmount.csi"`.
    pub name: String,
    /// Vendor-provided version string.
    pub vendor_version: String,
}

/// Capabilities advertised by the CSI plugin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PluginCapability {
    /// Plugin provides a Controller service.
    ControllerService,
    /// Plugin supports volume topology constraints.
    VolumeAccessibilityConstraints,
}

/// Optional node-service RPCs a plugin may implement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeServiceCapability {
    /// Plugin implements `NodeStageVolume` / `NodeUnstageVolume`.
    StageUnstageVolume,
    /// Plugin reports volume usage statistics.
    GetVolumeStats,
}

/// Topology constraint expressed as key-value segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    /// Topology segments, e.g. `{"node": "node-01"}`.
    #[serde(default)]
    pub segments: HashMap<String, String>,
}

/// Information about the node on which the CSI Node service runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Unique node identifier.
    pub node_id: String,
    /// Maximum number of volumes the node can host; `0` means no limit.
    pub max_volumes: u64,
    /// Optional topology of this node.
    #[serde(default)]
    pub accessible_topology: Option<Topology>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_id_display() {
        let id = VolumeId("vol-abc".into());
        assert_eq!(id.to_string(), "vol-abc");
    }

    #[test]
    fn volume_type_decoding() {
        assert_eq!(VolumeType::from("local"), VolumeType::Local);
        assert_eq!(VolumeType::from("socket"), VolumeType::Socket);
        assert_eq!(VolumeType::from("apm"), VolumeType::Apm);
        assert_eq!(VolumeType::from("APM"), VolumeType::Unknown("APM".into()));
        assert_eq!(VolumeType::from("foo").to_string(), "foo");
    }

    #[test]
    fn publish_request_defaults() {
        let req: NodePublishVolumeRequest =
            serde_json::from_str(r#"{"volume_id":"v1","target_path":"/t"}"#).expect("parse");
        assert_eq!(req.volume_id, VolumeId::from("v1"));
        assert!(req.volume_context.is_empty());
        assert!(!req.read_only);
    }
}
