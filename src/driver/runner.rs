// External command execution
//
// Every OS action of the driver (mount, umount) goes through a CommandRunner so
// that tests can substitute a fake and assert on the exact invocation.

use super::error::{DriverError, DriverResult};
use async_trait::async_trait;
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;
use std::time::Duration;
use tokio::process::Command;

#[cfg_attr(any(test, feature = "mockall"), automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, succeeding only on a zero exit status.
    ///
    /// On failure the combined stdout/stderr is carried in the error.
    async fn run(&self, program: &str, args: Vec<String>) -> DriverResult<()>;
}

/// Runs commands on the host with a bounded wait
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: Vec<String>) -> DriverResult<()> {
        tracing::debug!("exec: {} {:?}", program, args);

        let mut cmd = Command::new(program);
        cmd.args(&args).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| DriverError::io(program, e))?,
            Err(_) => {
                return Err(DriverError::CommandTimeout {
                    program: program.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        if output.status.success() {
            return Ok(());
        }

        let combined = combine_output(&output.stdout, &output.stderr);
        tracing::info!("{}", combined);

        Err(DriverError::CommandFailed {
            program: program.to_string(),
            status: output.status.to_string(),
            output: combined,
        })
    }
}

/// stdout and stderr of a finished command, one per line
fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);

    [stdout.trim(), stderr.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command() {
        let runner = SystemRunner::new(Duration::from_secs(5));
        let result = runner.run("true", vec![]).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_failed_command_captures_output() {
        let runner = SystemRunner::new(Duration::from_secs(5));
        let result = runner
            .run("sh", vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()])
            .await;

        match result {
            Err(DriverError::CommandFailed { program, output, .. }) => {
                assert_eq!(program, "sh");
                assert_eq!(output, "boom");
            }
            other => panic!("expected CommandFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_command_separates_stdout_and_stderr() {
        let runner = SystemRunner::new(Duration::from_secs(5));
        let script = "printf 'mount failed'; echo 'mount.nfs: access denied' >&2; exit 32";
        let result = runner.run("sh", vec!["-c".to_string(), script.to_string()]).await;

        match result {
            Err(DriverError::CommandFailed { output, .. }) => {
                assert_eq!(output, "mount failed\nmount.nfs: access denied");
            }
            other => panic!("expected CommandFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_combine_output_skips_empty_streams() {
        assert_eq!(combine_output(b"", b"boom\n"), "boom");
        assert_eq!(combine_output(b"out\n", b""), "out");
        assert_eq!(combine_output(b"", b""), "");
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let runner = SystemRunner::new(Duration::from_secs(5));
        let result = runner.run("/nonexistent/nfs-volume-test-binary", vec![]).await;
        assert!(matches!(result, Err(DriverError::Io { .. })));
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let runner = SystemRunner::new(Duration::from_millis(50));
        let result = runner.run("sleep", vec!["5".to_string()]).await;
        assert!(matches!(result, Err(DriverError::CommandTimeout { .. })));
    }

    #[tokio::test]
    async fn test_mock_runner_records_arguments() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|program, args| program == "umount" && args == &["/mnt/fs/v1".to_string()])
            .times(1)
            .returning(|_, _| Ok(()));

        assert!(runner.run("umount", vec!["/mnt/fs/v1".to_string()]).await.is_ok());
    }
}
