//! Host-mount CSI backend.
//!
//! [`HostMountDriver`] implements [`CsiIdentity`] and [`CsiNode`] on top of
//! the blocking [`Dispatcher`]: each publish/unpublish call runs to completion
//! on Tokio's blocking pool.  The driver keeps no per-volume state; the host's
//! mount table is the only record of what is published.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::config::DriverConfig;
use crate::dispatch::Dispatcher;
use crate::error::CsiError;
use crate::identity::CsiIdentity;
use crate::mount::{MOUNTINFO_PATH, Mounter, SystemMounter};
use crate::node::CsiNode;
use crate::types::*;

/// Name reported by `GetPluginInfo`.
pub const PLUGIN_NAME: &str = "rk8s.hostmount.csi";

/// Node plugin publishing host directories, sockets and overlays.
pub struct HostMountDriver {
    dispatcher: Arc<Dispatcher>,
    /// Node identifier supplied by the orchestrator.
    node_id: String,
    /// Mount table every mount-point check depends on.
    mount_table: PathBuf,
}

impl HostMountDriver {
    /// Create a driver that issues real mount syscalls.
    pub fn new(config: DriverConfig, node_id: String) -> Self {
        Self::with_mounter(config, node_id, Arc::new(SystemMounter::new()))
    }

    /// Create a driver on top of an arbitrary [`Mounter`].
    pub fn with_mounter(config: DriverConfig, node_id: String, mounter: Arc<dyn Mounter>) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(config, mounter)),
            node_id,
            mount_table: PathBuf::from(MOUNTINFO_PATH),
        }
    }

    /// Run `op` on the blocking pool.
    ///
    /// A panic inside `op` (the protected-path guard) is re-raised here rather
    /// than turned into an error response.
    async fn run_blocking<F>(&self, op: F) -> Result<(), CsiError>
    where
        F: FnOnce(&Dispatcher) -> Result<(), CsiError> + Send + 'static,
    {
        let dispatcher = Arc::clone(&self.dispatcher);
        match tokio::task::spawn_blocking(move || op(&dispatcher)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(CsiError::internal(format!("mount task cancelled: {e}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// CsiIdentity
// ---------------------------------------------------------------------------

#[async_trait]
impl CsiIdentity for HostMountDriver {
    async fn get_plugin_info(&self) -> Result<PluginInfo, CsiError> {
        Ok(PluginInfo {
            name: PLUGIN_NAME.to_owned(),
            vendor_version: env!("CARGO_PKG_VERSION").to_owned(),
        })
    }

    async fn probe(&self) -> Result<bool, CsiError> {
        // Mount-point checks are impossible without the mount table.
        match tokio::fs::read_to_string(&self.mount_table).await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!(mount_table = %self.mount_table.display(), error = %e, "mount table unreadable");
                Ok(false)
            }
        }
    }

    async fn get_plugin_capabilities(&self) -> Result<Vec<PluginCapability>, CsiError> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// CsiNode
// ---------------------------------------------------------------------------

#[async_trait]
impl CsiNode for HostMountDriver {
    #[instrument(skip_all, fields(volume_id = %req.volume_id, target_path = %req.target_path))]
    async fn publish_volume(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError> {
        info!("publish requested");
        self.run_blocking(move |dispatcher| dispatcher.publish(req))
            .await
    }

    #[instrument(skip(self))]
    async fn unpublish_volume(
        &self,
        volume_id: &VolumeId,
        target_path: &str,
    ) -> Result<(), CsiError> {
        info!("unpublish requested");
        let target_path = target_path.to_owned();
        self.run_blocking(move |dispatcher| dispatcher.unpublish(&target_path))
            .await
    }

    async fn get_capabilities(&self) -> Result<Vec<NodeServiceCapability>, CsiError> {
        Ok(Vec::new())
    }

    async fn get_info(&self) -> Result<NodeInfo, CsiError> {
        Ok(NodeInfo {
            node_id: self.node_id.clone(),
            max_volumes: 0,
            accessible_topology: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;

    use super::*;
    use crate::error::StatusCode;
    use crate::mount::recording::RecordingMounter;

    fn make_driver(root: &Path) -> (HostMountDriver, Arc<RecordingMounter>) {
        let mounter = Arc::new(RecordingMounter::new());
        let driver = HostMountDriver::with_mounter(
            DriverConfig::sandboxed(root),
            "test-node".to_owned(),
            mounter.clone(),
        );
        (driver, mounter)
    }

    fn apm_request(target: &Path) -> NodePublishVolumeRequest {
        NodePublishVolumeRequest {
            volume_id: "vol-1".into(),
            target_path: target.display().to_string(),
            volume_context: HashMap::from([("type".to_owned(), "apm".to_owned())]),
            read_only: false,
        }
    }

    #[tokio::test]
    async fn publish_and_unpublish_apm_volume() {
        let tmp = tempfile::tempdir().unwrap();
        let (driver, mounter) = make_driver(tmp.path());
        let target = tmp.path().join("pods").join("vol");

        driver.publish_volume(apm_request(&target)).await.unwrap();
        driver.publish_volume(apm_request(&target)).await.unwrap();
        assert_eq!(mounter.mount_count(), 2);
        assert!(mounter.is_mounted(&target));

        driver
            .unpublish_volume(&"vol-1".into(), target.to_str().unwrap())
            .await
            .unwrap();
        assert!(!target.exists());
        // The per-volume upper layer survives for the next publish.
        assert!(tmp.path().join("overlay/vol-1/upper").is_dir());
    }

    #[tokio::test]
    async fn unpublish_of_unknown_target_succeeds() {
        let tmp = tempfile::tempdir().unwrap();
        let (driver, mounter) = make_driver(tmp.path());

        driver
            .unpublish_volume(&"vol-1".into(), tmp.path().join("gone").to_str().unwrap())
            .await
            .unwrap();

        assert_eq!(mounter.unmount_count(), 0);
    }

    #[tokio::test]
    async fn invalid_request_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let (driver, _) = make_driver(tmp.path());
        let mut req = apm_request(&tmp.path().join("t"));
        req.volume_context.insert("type".into(), "nfs".into());

        let err = driver.publish_volume(req).await.unwrap_err();

        assert_eq!(err.code(), StatusCode::InvalidArgument);
    }

    #[tokio::test]
    #[should_panic(expected = "refusing to create protected path")]
    async fn protected_path_panic_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let (driver, _) = make_driver(tmp.path());
        let protected = tmp.path().join("log").join("pods");

        let _ = driver.publish_volume(apm_request(&protected)).await;
    }

    #[tokio::test]
    async fn plugin_info() {
        let tmp = tempfile::tempdir().unwrap();
        let (driver, _) = make_driver(tmp.path());
        let info = driver.get_plugin_info().await.unwrap();
        assert_eq!(info.name, "rk8s.hostmount.csi");
        assert!(driver.get_plugin_capabilities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn probe_requires_readable_mount_table() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut driver, _) = make_driver(tmp.path());

        let table = tmp.path().join("mountinfo");
        std::fs::write(&table, "25 1 259:2 / / rw - ext4 /dev/root rw\n").unwrap();
        driver.mount_table = table;
        assert!(driver.probe().await.unwrap());

        // A directory exists but cannot be read as a table.
        driver.mount_table = tmp.path().to_path_buf();
        assert!(!driver.probe().await.unwrap());

        driver.mount_table = tmp.path().join("missing");
        assert!(!driver.probe().await.unwrap());
    }

    #[tokio::test]
    async fn get_node_info() {
        let tmp = tempfile::tempdir().unwrap();
        let (driver, _) = make_driver(tmp.path());
        let info = driver.get_info().await.unwrap();
        assert_eq!(info.node_id, "test-node");
        assert_eq!(info.max_volumes, 0);
        assert!(driver.get_capabilities().await.unwrap().is_empty());
    }
}
