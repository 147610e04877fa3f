//! Routes publish requests to a mount strategy by their declared volume type.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::config::DriverConfig;
use crate::error::CsiError;
use crate::mount::Mounter;
use crate::provision::Provisioner;
use crate::strategy::{BindStrategy, OverlayStrategy, unmount_and_remove};
use crate::types::{CONTEXT_PATH, CONTEXT_TYPE, NodePublishVolumeRequest, VolumeId, VolumeType};

/// A publish request whose required fields have been checked and whose
/// volume type has been decoded.
#[derive(Debug, Clone)]
pub struct VolumeRequest {
    pub volume_id: VolumeId,
    pub target_path: PathBuf,
    pub volume_type: VolumeType,
    pub volume_context: HashMap<String, String>,
    pub read_only: bool,
}

impl TryFrom<NodePublishVolumeRequest> for VolumeRequest {
    type Error = CsiError;

    fn try_from(req: NodePublishVolumeRequest) -> Result<Self, Self::Error> {
        if req.target_path.is_empty() || req.volume_id.is_empty() {
            return Err(CsiError::invalid("target path and volume id are required"));
        }
        let target_path = absolute_target(&req.target_path)?;
        let volume_type = req
            .volume_context
            .get(CONTEXT_TYPE)
            .map(|t| VolumeType::from(t.as_str()))
            .ok_or_else(|| {
                CsiError::invalid(format!(
                    "volume context must include the '{CONTEXT_TYPE}' key"
                ))
            })?;

        Ok(Self {
            volume_id: req.volume_id,
            target_path,
            volume_type,
            volume_context: req.volume_context,
            read_only: req.read_only,
        })
    }
}

/// Target paths are resolved by the kernel, never against the plugin's
/// working directory.
fn absolute_target(target_path: &str) -> Result<PathBuf, CsiError> {
    let path = PathBuf::from(target_path);
    if !path.is_absolute() {
        return Err(CsiError::invalid(format!(
            "target path {target_path:?} must be absolute"
        )));
    }
    Ok(path)
}

impl VolumeRequest {
    /// The `path` parameter required by `local` and `socket` volumes.
    fn host_path(&self) -> Result<&Path, CsiError> {
        match self.volume_context.get(CONTEXT_PATH) {
            Some(path) if !path.is_empty() => Ok(Path::new(path)),
            _ => Err(CsiError::invalid(format!(
                "volume type {:?} requires the '{CONTEXT_PATH}' parameter",
                self.volume_type.to_string()
            ))),
        }
    }
}

/// Entry point of the blocking publish/unpublish logic.
///
/// Holds no mount state of its own: every decision is made against the host
/// as it is at call time.  Concurrent calls for the same target are not
/// serialized here; the orchestrator issues at most one per volume.
pub struct Dispatcher {
    bind: BindStrategy,
    overlay: OverlayStrategy,
    mounter: Arc<dyn Mounter>,
}

impl Dispatcher {
    pub fn new(config: DriverConfig, mounter: Arc<dyn Mounter>) -> Self {
        let provisioner = Provisioner::new(&config);
        Self {
            bind: BindStrategy::new(provisioner.clone(), Arc::clone(&mounter)),
            overlay: OverlayStrategy::new(config, provisioner, Arc::clone(&mounter)),
            mounter,
        }
    }

    /// Validate `req` and publish it with the strategy of its volume type.
    ///
    /// Validation completes before anything on the host is touched.
    #[instrument(skip_all, fields(volume_id = %req.volume_id))]
    pub fn publish(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError> {
        let req = VolumeRequest::try_from(req)?;
        debug!(volume_type = %req.volume_type, target_path = %req.target_path.display(), "dispatching publish");

        match &req.volume_type {
            VolumeType::Local | VolumeType::Socket => {
                let host_path = req.host_path()?;
                self.bind.mount(
                    &req.target_path,
                    host_path,
                    req.volume_type == VolumeType::Socket,
                    req.read_only,
                )
            }
            VolumeType::Apm => self
                .overlay
                .mount(&req.volume_id, &req.target_path, req.read_only),
            VolumeType::Unknown(other) => Err(CsiError::invalid(format!(
                "unsupported volume type {other:?}; volume type should be one of {}, {} or {}",
                VolumeType::LOCAL,
                VolumeType::SOCKET,
                VolumeType::APM
            ))),
        }
    }

    /// Tear down whatever was published at `target_path`.
    pub fn unpublish(&self, target_path: &str) -> Result<(), CsiError> {
        if target_path.is_empty() {
            return Err(CsiError::invalid("target path is required"));
        }
        let target_path = absolute_target(target_path)?;
        unmount_and_remove(self.mounter.as_ref(), &target_path)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::error::StatusCode;
    use crate::mount::recording::{MountCall, RecordingMounter};

    fn dispatcher(root: &Path) -> (Dispatcher, Arc<RecordingMounter>) {
        let mounter = Arc::new(RecordingMounter::new());
        (
            Dispatcher::new(DriverConfig::sandboxed(root), mounter.clone()),
            mounter,
        )
    }

    fn request(target: &Path, context: &[(&str, &str)]) -> NodePublishVolumeRequest {
        NodePublishVolumeRequest {
            volume_id: VolumeId::from("vol-1"),
            target_path: target.display().to_string(),
            volume_context: context
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            read_only: false,
        }
    }

    fn entries(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn empty_target_or_id_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let (dispatcher, _) = dispatcher(tmp.path());

        let mut req = request(Path::new(""), &[("type", "apm")]);
        let err = dispatcher.publish(req.clone()).unwrap_err();
        assert_eq!(err.code(), StatusCode::InvalidArgument);

        req.target_path = tmp.path().join("t").display().to_string();
        req.volume_id = VolumeId::default();
        let err = dispatcher.publish(req).unwrap_err();
        assert_eq!(err.code(), StatusCode::InvalidArgument);
    }

    #[test]
    fn missing_type_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let (dispatcher, mounter) = dispatcher(tmp.path());

        let err = dispatcher
            .publish(request(&tmp.path().join("t"), &[("path", "/srv")]))
            .unwrap_err();

        assert_eq!(err.code(), StatusCode::InvalidArgument);
        assert!(err.to_string().contains("'type'"));
        assert!(mounter.calls().is_empty());
    }

    #[test]
    fn unsupported_type_has_no_side_effects() {
        let tmp = tempfile::tempdir().unwrap();
        let (dispatcher, mounter) = dispatcher(tmp.path());
        let target = tmp.path().join("t");

        let err = dispatcher
            .publish(request(&target, &[("type", "foo"), ("path", "/srv")]))
            .unwrap_err();

        assert_eq!(err.code(), StatusCode::InvalidArgument);
        assert!(err.to_string().contains("\"foo\""));
        assert!(mounter.calls().is_empty());
        assert_eq!(entries(tmp.path()), 0);
    }

    #[test]
    fn local_without_path_names_the_parameter() {
        let tmp = tempfile::tempdir().unwrap();
        let (dispatcher, mounter) = dispatcher(tmp.path());

        let err = dispatcher
            .publish(request(&tmp.path().join("t"), &[("type", "local")]))
            .unwrap_err();

        assert_eq!(err.code(), StatusCode::InvalidArgument);
        assert!(err.to_string().contains("'path'"));
        assert!(mounter.calls().is_empty());
        assert_eq!(entries(tmp.path()), 0);
    }

    #[test]
    fn local_is_bound_from_path() {
        let tmp = tempfile::tempdir().unwrap();
        let (dispatcher, mounter) = dispatcher(tmp.path());
        let host = tmp.path().join("host");
        let target = tmp.path().join("t");

        dispatcher
            .publish(request(
                &target,
                &[("type", "local"), ("path", host.to_str().unwrap())],
            ))
            .unwrap();

        assert_eq!(
            mounter.calls(),
            vec![MountCall::Bind {
                source: host,
                target,
                read_only: false,
            }]
        );
    }

    #[test]
    fn apm_goes_through_overlay() {
        let tmp = tempfile::tempdir().unwrap();
        let (dispatcher, mounter) = dispatcher(tmp.path());

        dispatcher
            .publish(request(&tmp.path().join("t"), &[("type", "apm")]))
            .unwrap();

        assert!(matches!(mounter.calls()[0], MountCall::Overlay { .. }));
    }

    #[test]
    fn publish_then_unpublish_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let (dispatcher, mounter) = dispatcher(tmp.path());
        let target = tmp.path().join("t");
        let req = request(
            &target,
            &[("type", "local"), ("path", tmp.path().join("host").to_str().unwrap())],
        );

        dispatcher.publish(req.clone()).unwrap();
        dispatcher.publish(req).unwrap();
        assert_eq!(mounter.mount_count(), 1);

        dispatcher.unpublish(target.to_str().unwrap()).unwrap();
        assert!(!target.exists());
        assert_eq!(mounter.unmount_count(), 1);

        dispatcher.unpublish(target.to_str().unwrap()).unwrap();
        assert_eq!(mounter.unmount_count(), 1);
    }

    #[test]
    fn relative_target_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let (dispatcher, mounter) = dispatcher(tmp.path());

        let err = dispatcher
            .publish(request(Path::new("pods/vol"), &[("type", "apm")]))
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::InvalidArgument);
        assert!(err.to_string().contains("absolute"));

        let err = dispatcher.unpublish("pods/vol").unwrap_err();
        assert_eq!(err.code(), StatusCode::InvalidArgument);

        assert!(mounter.calls().is_empty());
        assert!(!Path::new("pods").exists());
        assert_eq!(entries(tmp.path()), 0);
    }

    #[test]
    fn unpublish_requires_target() {
        let tmp = tempfile::tempdir().unwrap();
        let (dispatcher, _) = dispatcher(tmp.path());

        let err = dispatcher.unpublish("").unwrap_err();

        assert_eq!(err.code(), StatusCode::InvalidArgument);
    }
}
