// In-memory volume registry
//
// Locking: the outer RwLock guards membership of the map. `create` and `remove`
// take it for writing so their check-then-act is atomic. Attach and detach take
// it for reading and then lock the volume's own state, holding both for the
// whole check/command/refcount sequence. Different volumes therefore mount
// concurrently, while a volume can never be removed under an in-flight attach.

use super::error::{DriverError, DriverResult};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard};

/// Option naming the remote export, e.g. `10.0.0.1:/export`
pub const SOURCE_OPT: &str = "src";

/// Option carrying the mount options string passed to `mount -o`
pub const NFS_OPTS: &str = "nfsopts";

/// Mutable part of a volume, guarded by the volume's own lock
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountState {
    /// Number of attaches not yet matched by a detach
    pub connections: u32,
    pub opts: HashMap<String, String>,
}

impl MountState {
    /// The data source, if set and non-empty
    pub fn source(&self) -> Option<&str> {
        self.opts.get(SOURCE_OPT).map(String::as_str).filter(|s| !s.is_empty())
    }
}

/// A named volume and its mount state
#[derive(Debug)]
pub struct Volume {
    name: String,
    mountpoint: PathBuf,
    state: Mutex<MountState>,
}

impl Volume {
    fn new(name: &str, mountpoint: PathBuf, opts: HashMap<String, String>) -> Self {
        Self {
            name: name.to_string(),
            mountpoint,
            state: Mutex::new(MountState { connections: 0, opts }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// Lock the mutable state for a compound read-modify-write
    pub async fn lock(&self) -> MutexGuard<'_, MountState> {
        self.state.lock().await
    }

    pub fn info(&self) -> VolumeInfo {
        VolumeInfo { name: self.name.clone(), mountpoint: self.mountpoint.clone() }
    }
}

/// Descriptor returned by get/list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeInfo {
    pub name: String,
    pub mountpoint: PathBuf,
}

/// Read access to the registry, held across an attach or detach
pub struct Volumes<'a> {
    guard: RwLockReadGuard<'a, HashMap<String, Volume>>,
}

impl Volumes<'_> {
    pub fn get(&self, name: &str) -> Option<&Volume> {
        self.guard.get(name)
    }
}

/// Authoritative name → volume mapping for the process
#[derive(Debug)]
pub struct VolumeRegistry {
    root: PathBuf,
    volumes: RwLock<HashMap<String, Volume>>,
}

impl VolumeRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), volumes: RwLock::new(HashMap::new()) }
    }

    /// Deterministic mountpoint of `name`, whether or not it exists
    pub fn mountpoint(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Enter `name` as an idle volume.
    ///
    /// If the volume is attached, only its options are replaced; the
    /// mountpoint and connection count are kept.
    pub async fn create(&self, name: &str, opts: HashMap<String, String>) -> DriverResult<()> {
        let mut volumes = self.volumes.write().await;

        if let Some(volume) = volumes.get_mut(name) {
            let state = volume.state.get_mut();
            if state.connections > 0 {
                state.opts = opts;
                return Ok(());
            }
        }

        let mountpoint = self.mountpoint(name);
        volumes.insert(name.to_string(), Volume::new(name, mountpoint, opts));
        Ok(())
    }

    /// Delete `name` if idle. Returns whether an entry was removed.
    pub async fn remove(&self, name: &str) -> DriverResult<bool> {
        let mut volumes = self.volumes.write().await;

        let in_use = match volumes.get_mut(name) {
            None => return Ok(false),
            Some(volume) => volume.state.get_mut().connections > 0,
        };

        if in_use {
            return Err(DriverError::InUse(name.to_string()));
        }

        volumes.remove(name);
        Ok(true)
    }

    pub async fn get(&self, name: &str) -> Option<VolumeInfo> {
        self.volumes.read().await.get(name).map(Volume::info)
    }

    pub async fn list(&self) -> Vec<VolumeInfo> {
        self.volumes.read().await.values().map(Volume::info).collect()
    }

    /// Current connection count of `name`
    pub async fn connections(&self, name: &str) -> Option<u32> {
        let volumes = self.volumes.read().await;
        let volume = volumes.get(name)?;
        Some(volume.lock().await.connections)
    }

    /// Shared access for attach/detach; blocks create and remove until dropped
    pub async fn read(&self) -> Volumes<'_> {
        Volumes { guard: self.volumes.read().await }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(src: &str) -> HashMap<String, String> {
        HashMap::from([(SOURCE_OPT.to_string(), src.to_string())])
    }

    #[test]
    fn test_mountpoint_is_root_join_name() {
        let registry = VolumeRegistry::new("/mnt/fs");
        assert_eq!(registry.mountpoint("v1"), PathBuf::from("/mnt/fs/v1"));
    }

    #[test]
    fn test_source_filters_empty() {
        let state = MountState { connections: 0, opts: opts("") };
        assert_eq!(state.source(), None);

        let state = MountState { connections: 0, opts: opts("10.0.0.1:/export") };
        assert_eq!(state.source(), Some("10.0.0.1:/export"));
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = VolumeRegistry::new("/mnt/fs");
        registry.create("v1", opts("10.0.0.1:/export")).await.unwrap();

        let info = registry.get("v1").await.unwrap();
        assert_eq!(info.name, "v1");
        assert_eq!(info.mountpoint, PathBuf::from("/mnt/fs/v1"));
        assert_eq!(registry.connections("v1").await, Some(0));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let registry = VolumeRegistry::new("/mnt/fs");
        assert!(registry.get("missing").await.is_none());
        assert!(registry.connections("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_recreate_idle_replaces_entry() {
        let registry = VolumeRegistry::new("/mnt/fs");
        registry.create("v1", opts("a:/x")).await.unwrap();
        registry.create("v1", opts("b:/y")).await.unwrap();

        let volumes = registry.read().await;
        let state = volumes.get("v1").unwrap().lock().await;
        assert_eq!(state.source(), Some("b:/y"));
        assert_eq!(state.connections, 0);
    }

    #[tokio::test]
    async fn test_recreate_attached_only_refreshes_opts() {
        let registry = VolumeRegistry::new("/mnt/fs");
        registry.create("v1", opts("a:/x")).await.unwrap();
        {
            let volumes = registry.read().await;
            volumes.get("v1").unwrap().lock().await.connections = 2;
        }

        registry.create("v1", opts("b:/y")).await.unwrap();

        let volumes = registry.read().await;
        let volume = volumes.get("v1").unwrap();
        assert_eq!(volume.mountpoint(), Path::new("/mnt/fs/v1"));
        let state = volume.lock().await;
        assert_eq!(state.connections, 2);
        assert_eq!(state.source(), Some("b:/y"));
    }

    #[tokio::test]
    async fn test_remove_idle() {
        let registry = VolumeRegistry::new("/mnt/fs");
        registry.create("v1", opts("a:/x")).await.unwrap();

        assert!(registry.remove("v1").await.unwrap());
        assert!(registry.get("v1").await.is_none());
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let registry = VolumeRegistry::new("/mnt/fs");
        assert!(!registry.remove("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_in_use_keeps_volume() {
        let registry = VolumeRegistry::new("/mnt/fs");
        registry.create("v1", opts("a:/x")).await.unwrap();
        {
            let volumes = registry.read().await;
            volumes.get("v1").unwrap().lock().await.connections = 1;
        }

        let result = registry.remove("v1").await;
        assert!(matches!(result, Err(DriverError::InUse(name)) if name == "v1"));
        assert!(registry.get("v1").await.is_some());
    }

    #[tokio::test]
    async fn test_list() {
        let registry = VolumeRegistry::new("/mnt/fs");
        registry.create("v1", opts("a:/x")).await.unwrap();
        registry.create("v2", opts("a:/y")).await.unwrap();

        let mut names: Vec<String> = registry.list().await.into_iter().map(|v| v.name).collect();
        names.sort();
        assert_eq!(names, vec!["v1", "v2"]);
    }
}
