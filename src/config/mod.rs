use crate::driver::NfsVersion;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "NFS_VOLUME";
const DEFAULT_FILE: &str = "nfs-volume";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory under which every volume gets `<root>/<name>`
    pub root: PathBuf,
    /// NFS major version; anything but 3 means 4
    pub nfs_version: u8,
    /// Fallback mount options for volumes that set none
    pub nfs_opts: Option<String>,
    /// Plugin socket
    pub socket: PathBuf,
    pub mount_table: PathBuf,
    pub command_timeout_secs: u64,
    /// Pass `-v` to mount; unset follows whether debug logging is on
    pub verbose_mount: Option<bool>,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub filter: String,
    pub json: bool,
    pub file: Option<PathBuf>,
}

/// Values given on the command line, applied over every other source
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub root: Option<PathBuf>,
    pub nfs_version: Option<u8>,
    pub nfs_opts: Option<String>,
    pub socket: Option<PathBuf>,
}

impl Config {
    /// Defaults, then the config file, then `NFS_VOLUME_*` environment variables
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with(file, &Overrides::default())
    }

    pub fn load_with(file: Option<&Path>, overrides: &Overrides) -> anyhow::Result<Self> {
        let file_source = match file {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_FILE).required(false),
        };

        let config = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?)
            .add_source(file_source)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("root", overrides.root.as_deref().map(path_value))?
            .set_override_option("nfs_version", overrides.nfs_version.map(i64::from))?
            .set_override_option("nfs_opts", overrides.nfs_opts.clone())?
            .set_override_option("socket", overrides.socket.as_deref().map(path_value))?
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.root.is_absolute() {
            anyhow::bail!("root must be an absolute path: {}", self.root.display());
        }

        if self.command_timeout_secs == 0 {
            anyhow::bail!("command_timeout_secs must be greater than zero");
        }

        Ok(())
    }

    pub fn version(&self) -> NfsVersion {
        NfsVersion::from(self.nfs_version)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Whether mount runs verbosely, given the active log level
    pub fn mount_verbose(&self, debug_enabled: bool) -> bool {
        self.verbose_mount.unwrap_or(debug_enabled)
    }
}

fn path_value(path: &Path) -> String {
    path.display().to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/mnt/fs"),
            nfs_version: 3,
            nfs_opts: None,
            socket: PathBuf::from("/run/docker/plugins/nfs.sock"),
            mount_table: PathBuf::from("/proc/mounts"),
            command_timeout_secs: 60,
            verbose_mount: None,
            log: LogConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { filter: "nfs_volume=debug,info".to_string(), json: false, file: None }
    }
}
