use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("\"{0}\" option should not be empty")]
    MissingOption(String),

    #[error("Invalid volume name: {0:?}")]
    InvalidName(String),

    #[error("NFS source option (src) is not provided")]
    SourceNotProvided,

    #[error("Volume {0} doesn't exist")]
    NotFound(String),

    #[error("Volume {0} is currently in use")]
    InUse(String),

    #[error("Volume {0} is not mounted")]
    NotMounted(String),

    #[error("{} already exist and it's not a directory", .0.display())]
    NotDirectory(PathBuf),

    #[error("{program} failed ({status}): {output}")]
    CommandFailed { program: String, status: String, output: String },

    #[error("{program} did not finish within {}s", .timeout.as_secs())]
    CommandTimeout { program: String, timeout: Duration },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DriverError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DriverError::Io { path: path.into(), source }
    }

    /// Errors raised before any OS action was attempted
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DriverError::MissingOption(_)
                | DriverError::InvalidName(_)
                | DriverError::SourceNotProvided
        )
    }
}
