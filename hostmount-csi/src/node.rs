//! CSI Node service trait.
//!
//! The Node service runs on each worker node and makes host-resident data
//! visible inside Pod containers:
//!
//! 1. **Publish**: mount the volume's host data at the container target path.
//! 2. **Unpublish**: unmount the target path and remove it.
//!
//! There is no staging step; volumes are published straight from the host.

use async_trait::async_trait;

use crate::error::CsiError;
use crate::types::{NodeInfo, NodePublishVolumeRequest, NodeServiceCapability, VolumeId};

/// Node service — local mount / unmount operations.
#[async_trait]
pub trait CsiNode: Send + Sync {
    /// Publish a volume at `req.target_path`.
    ///
    /// This is idempotent: calling it again for an already-mounted target
    /// should succeed without issuing another mount.
    async fn publish_volume(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError>;

    /// Unpublish a volume: unmount and remove the target path.
    ///
    /// This is idempotent: a target that no longer exists is treated as
    /// already unpublished.
    async fn unpublish_volume(
        &self,
        volume_id: &VolumeId,
        target_path: &str,
    ) -> Result<(), CsiError>;

    /// Optional node RPCs implemented by this plugin.
    async fn get_capabilities(&self) -> Result<Vec<NodeServiceCapability>, CsiError>;

    /// Return information about the node on which this service is running.
    async fn get_info(&self) -> Result<NodeInfo, CsiError>;
}
