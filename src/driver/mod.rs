pub mod error;
pub mod fsutil;
pub mod metrics;
pub mod mount_table;
pub mod mounter;
pub mod nfs;
pub mod registry;
pub mod runner;

pub use error::{DriverError, DriverResult};
pub use metrics::DriverMetrics;
pub use mounter::{Cleanup, Mounter, NfsVersion};
pub use nfs::NfsDriver;
pub use registry::{MountState, Volume, VolumeInfo, VolumeRegistry};
pub use runner::{CommandRunner, SystemRunner};

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Scope reported to the host: volumes are only visible on this node
pub const SCOPE_LOCAL: &str = "local";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub scope: String,
}

/// Result of a detach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detach {
    /// Other attachers remain; the OS mount was kept
    Released { remaining: u32 },
    /// Last attacher left; the filesystem was unmounted
    Unmounted { cleanup: Cleanup },
}

/// Operations the container host calls on a volume driver
#[async_trait]
pub trait VolumeDriver: Send + Sync {
    async fn create(&self, name: &str, opts: HashMap<String, String>) -> DriverResult<()>;

    /// Removing a volume that does not exist succeeds
    async fn remove(&self, name: &str) -> DriverResult<()>;

    /// Mountpoint of `name`, computed even for unknown volumes
    fn path(&self, name: &str) -> PathBuf;

    async fn get(&self, name: &str) -> Option<VolumeInfo>;

    async fn list(&self) -> Vec<VolumeInfo>;

    /// Attach `name`, returning its mountpoint
    async fn mount(&self, name: &str) -> DriverResult<PathBuf>;

    async fn unmount(&self, name: &str) -> DriverResult<Detach>;

    fn capabilities(&self) -> Capabilities;
}
