// NFS mount orchestration
//
// Translates a volume's options into a `mount` invocation for the configured
// NFS major version, and reverses it on detach.

use super::error::DriverResult;
use super::fsutil;
use super::mount_table;
use super::registry::NFS_OPTS;
use super::runner::CommandRunner;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Options used for NFSv3 when none are configured
pub const NFS_V3_DEFAULT_OPTS: &str = "port=2049,nolock,proto=tcp";

pub const DEFAULT_MOUNT_TABLE: &str = "/proc/mounts";

const MOUNT_CMD: &str = "mount";
const UMOUNT_CMD: &str = "umount";

/// NFS protocol major version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NfsVersion {
    V3,
    V4,
}

impl From<u8> for NfsVersion {
    /// Anything other than 3 is treated as version 4
    fn from(version: u8) -> Self {
        match version {
            3 => NfsVersion::V3,
            _ => NfsVersion::V4,
        }
    }
}

impl std::fmt::Display for NfsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NfsVersion::V3 => write!(f, "3"),
            NfsVersion::V4 => write!(f, "4"),
        }
    }
}

impl NfsVersion {
    pub fn fs_type(&self) -> &'static str {
        match self {
            NfsVersion::V3 => "nfs",
            NfsVersion::V4 => "nfs4",
        }
    }
}

/// What happened to the mountpoint directory after an unmount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleanup {
    /// Directory was empty and has been deleted
    Removed,
    /// Directory still had entries and was left in place
    Retained,
}

pub struct Mounter {
    runner: Arc<dyn CommandRunner>,
    version: NfsVersion,
    defaults: HashMap<String, String>,
    verbose: bool,
    mount_table: PathBuf,
}

impl Mounter {
    /// `nfs_opts` becomes the driver-wide fallback for the `nfsopts` option
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        version: NfsVersion,
        nfs_opts: Option<&str>,
    ) -> Self {
        let defaults = nfs_opts
            .filter(|opts| !opts.is_empty())
            .map(|opts| HashMap::from([(NFS_OPTS.to_string(), opts.to_string())]))
            .unwrap_or_default();

        Self {
            runner,
            version,
            defaults,
            verbose: false,
            mount_table: PathBuf::from(DEFAULT_MOUNT_TABLE),
        }
    }

    /// Pass `-v` to every mount invocation
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_mount_table(mut self, mount_table: impl Into<PathBuf>) -> Self {
        self.mount_table = mount_table.into();
        self
    }

    /// Volume options layered over the driver defaults; volume keys win
    pub fn effective_options(&self, opts: &HashMap<String, String>) -> HashMap<String, String> {
        let mut merged = self.defaults.clone();
        merged.extend(opts.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// Arguments for `mount` attaching `source` at `mountpoint`
    pub fn mount_args(
        &self,
        opts: &HashMap<String, String>,
        source: &str,
        mountpoint: &Path,
    ) -> Vec<String> {
        let options = self.effective_options(opts);
        let nfs_opts = options.get(NFS_OPTS).map(String::as_str).filter(|o| !o.is_empty());

        let mut args = Vec::new();
        if self.verbose {
            args.push("-v".to_string());
        }

        args.push("-t".to_string());
        args.push(self.version.fs_type().to_string());

        let nfs_opts = match self.version {
            NfsVersion::V3 => Some(nfs_opts.unwrap_or(NFS_V3_DEFAULT_OPTS)),
            NfsVersion::V4 => nfs_opts,
        };
        if let Some(nfs_opts) = nfs_opts {
            args.push("-o".to_string());
            args.push(nfs_opts.to_string());
        }

        args.push(source.to_string());
        args.push(mountpoint.display().to_string());
        args
    }

    /// Whether `mountpoint` is still an active mount.
    ///
    /// An unreadable mount table counts as not mounted, so the caller remounts.
    pub async fn is_active(&self, mountpoint: &Path) -> bool {
        match mount_table::is_mounted(&self.mount_table, mountpoint).await {
            Ok(mounted) => mounted,
            Err(e) => {
                tracing::warn!("Failed to read mount table: {}", e);
                false
            }
        }
    }

    /// Create the mountpoint and mount `source` on it
    pub async fn mount(
        &self,
        opts: &HashMap<String, String>,
        source: &str,
        mountpoint: &Path,
    ) -> DriverResult<()> {
        fsutil::ensure_dir(mountpoint).await?;

        tracing::debug!(
            "Mounting with NFSv{} - src: {}, dst: {}",
            self.version,
            source,
            mountpoint.display()
        );

        let args = self.mount_args(opts, source, mountpoint);
        self.runner.run(MOUNT_CMD, args).await
    }

    pub async fn unmount(&self, mountpoint: &Path) -> DriverResult<()> {
        self.runner.run(UMOUNT_CMD, vec![mountpoint.display().to_string()]).await
    }

    /// Delete the mountpoint directory if nothing is left in it
    pub async fn reclaim(&self, mountpoint: &Path) -> DriverResult<Cleanup> {
        if !fsutil::is_empty_dir(mountpoint).await? {
            tracing::warn!(
                "Directory {} is not empty after unmount. Skipping removal.",
                mountpoint.display()
            );
            return Ok(Cleanup::Retained);
        }

        fsutil::remove_dir(mountpoint).await?;
        Ok(Cleanup::Removed)
    }
}
