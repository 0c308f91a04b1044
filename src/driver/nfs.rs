// NFS volume driver
//
// Request handlers over the registry. A volume moves through
// absent -> idle (connections == 0) -> attached (connections >= 1) -> idle -> absent.
// Registry state is only changed after the OS action it reflects succeeded.

use super::error::{DriverError, DriverResult};
use super::fsutil;
use super::metrics::DriverMetrics;
use super::mounter::Mounter;
use super::registry::{SOURCE_OPT, VolumeInfo, VolumeRegistry};
use super::{Capabilities, Detach, SCOPE_LOCAL, VolumeDriver};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

pub struct NfsDriver {
    registry: Arc<VolumeRegistry>,
    mounter: Mounter,
    metrics: Option<Arc<DriverMetrics>>,
}

impl NfsDriver {
    pub fn new(registry: Arc<VolumeRegistry>, mounter: Mounter) -> Self {
        Self { registry, mounter, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<DriverMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &Arc<VolumeRegistry> {
        &self.registry
    }

    fn observe<T>(&self, method: &str, start: Instant, result: &DriverResult<T>) {
        if let Err(e) = result {
            tracing::error!(method, "{}", e);
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_operation(method, start.elapsed().as_secs_f64(), result.is_ok());
        }
    }

    fn attached(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.volume_attached();
        }
    }

    fn released(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.volume_released();
        }
    }

    async fn create_volume(&self, name: &str, opts: HashMap<String, String>) -> DriverResult<()> {
        validate_name(name)?;

        if !opts.contains_key(SOURCE_OPT) {
            return Err(DriverError::MissingOption(SOURCE_OPT.to_string()));
        }

        let mountpoint = self.registry.mountpoint(name);
        tracing::debug!(
            method = "create",
            "Create volume {}: mountpoint={}, opts={:?}",
            name,
            mountpoint.display(),
            opts
        );

        fsutil::ensure_dir(&mountpoint).await?;
        self.registry.create(name, opts).await
    }

    async fn mount_volume(&self, name: &str) -> DriverResult<PathBuf> {
        let volumes = self.registry.read().await;
        let volume = volumes.get(name).ok_or_else(|| DriverError::NotFound(name.to_string()))?;
        let mountpoint = volume.mountpoint();

        let mut state = volume.lock().await;
        let source = state.source().ok_or(DriverError::SourceNotProvided)?.to_string();

        if state.connections > 0 {
            tracing::info!(
                method = "mount",
                "Using existing NFS volume mount: {}",
                mountpoint.display()
            );
            if self.mounter.is_active(mountpoint).await {
                state.connections += 1;
                return Ok(mountpoint.to_path_buf());
            }
            tracing::info!(method = "mount", "Existing NFS volume not mounted, force remount.");
        }

        tracing::info!(
            method = "mount",
            "Mounting NFS volume {} on {}",
            source,
            mountpoint.display()
        );
        self.mounter.mount(&state.opts, &source, mountpoint).await?;

        if state.connections == 0 {
            self.attached();
        }
        state.connections += 1;
        Ok(mountpoint.to_path_buf())
    }

    async fn unmount_volume(&self, name: &str) -> DriverResult<Detach> {
        let volumes = self.registry.read().await;
        let volume = volumes.get(name).ok_or_else(|| DriverError::NotFound(name.to_string()))?;
        let mountpoint = volume.mountpoint();

        let mut state = volume.lock().await;
        match state.connections {
            0 => Err(DriverError::NotMounted(name.to_string())),
            n if n > 1 => {
                tracing::info!(
                    method = "unmount",
                    "Skipping unmount for {} - in use by other containers",
                    name
                );
                state.connections -= 1;
                Ok(Detach::Released { remaining: state.connections })
            }
            _ => {
                tracing::info!(
                    method = "unmount",
                    "Unmounting volume name {} from {}",
                    name,
                    mountpoint.display()
                );
                self.mounter.unmount(mountpoint).await?;
                state.connections = 0;
                self.released();

                let cleanup = self.mounter.reclaim(mountpoint).await?;
                Ok(Detach::Unmounted { cleanup })
            }
        }
    }
}

/// Names become a single path component under the root
fn validate_name(name: &str) -> DriverResult<()> {
    let invalid = name.is_empty() || name == "." || name == "..";
    if invalid || name.contains('/') || name.contains('\0') {
        return Err(DriverError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[async_trait]
impl VolumeDriver for NfsDriver {
    async fn create(&self, name: &str, opts: HashMap<String, String>) -> DriverResult<()> {
        let start = Instant::now();
        let result = self.create_volume(name, opts).await;
        self.observe("create", start, &result);
        result
    }

    async fn remove(&self, name: &str) -> DriverResult<()> {
        let start = Instant::now();
        tracing::debug!(method = "remove", volume = name, "Remove volume");

        let result = self.registry.remove(name).await.map(|removed| {
            if !removed {
                tracing::debug!(method = "remove", "Volume {} not found, nothing to remove", name);
            }
        });
        self.observe("remove", start, &result);
        result
    }

    fn path(&self, name: &str) -> PathBuf {
        let mountpoint = self.registry.mountpoint(name);
        tracing::debug!(method = "path", "Volume {} with path: {}", name, mountpoint.display());
        mountpoint
    }

    async fn get(&self, name: &str) -> Option<VolumeInfo> {
        let info = self.registry.get(name).await;
        if let Some(info) = &info {
            tracing::debug!(
                method = "get",
                "Mount found for {}: mountpoint={}",
                name,
                info.mountpoint.display()
            );
        }
        info
    }

    async fn list(&self) -> Vec<VolumeInfo> {
        let volumes = self.registry.list().await;
        tracing::debug!(method = "list", "volumes: {:?}", volumes);
        volumes
    }

    async fn mount(&self, name: &str) -> DriverResult<PathBuf> {
        let start = Instant::now();
        let result = self.mount_volume(name).await;
        self.observe("mount", start, &result);
        result
    }

    async fn unmount(&self, name: &str) -> DriverResult<Detach> {
        let start = Instant::now();
        let result = self.unmount_volume(name).await;
        self.observe("unmount", start, &result);
        result
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { scope: SCOPE_LOCAL.to_string() }
    }
}
