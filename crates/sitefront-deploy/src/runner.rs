//! External command execution.
//!
//! Commands run attached to the terminal: stdin is inherited so interactive
//! prompts keep working, while stdout/stderr are echoed through as they
//! arrive and a copy is buffered for the caller.

use crate::error::RunnerError;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Value following `flag` in the argument list, if any.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Buffered output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external commands on behalf of the pipeline.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. Exit status 0 resolves with the buffered output;
    /// anything else is an error carrying the exit code and output.
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, RunnerError>;
}

/// Runs commands as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    current_dir: Option<PathBuf>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            current_dir: Some(dir.into()),
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        if spec.program.is_empty() {
            return Err(RunnerError::EmptyCommand);
        }

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .env("FORCE_COLOR", "1")
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let launch_err = |source| RunnerError::Launch {
            command: spec.to_string(),
            source,
        };

        let mut child = command.spawn().map_err(launch_err)?;
        debug!(command = %spec, pid = ?child.id(), "Spawned command");

        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(tee(out, tokio::io::stdout())));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(tee(err, tokio::io::stderr())));

        let status = child.wait().await.map_err(launch_err)?;

        let stdout = collect(stdout_task).await;
        let stderr = collect(stderr_task).await;

        if status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            // Killed by a signal: no exit code.
            let exit_code = status.code().unwrap_or(-1);
            Err(RunnerError::Failed {
                command: spec.to_string(),
                exit_code,
                stdout,
                stderr,
            })
        }
    }
}

/// Copy `reader` into `echo` chunk by chunk, returning everything read.
///
/// Chunks are forwarded without waiting for a newline so partial-line
/// prompts show up immediately.
async fn tee<R, W>(mut reader: R, mut echo: W) -> Vec<u8>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut captured = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                captured.extend_from_slice(&chunk[..n]);
                if let Err(e) = echo.write_all(&chunk[..n]).await {
                    debug!(error = %e, "Failed to echo command output");
                }
                let _ = echo.flush().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read command output");
                break;
            }
        }
    }

    captured
}

async fn collect(task: Option<tokio::task::JoinHandle<Vec<u8>>>) -> String {
    match task {
        Some(handle) => match handle.await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!(error = %e, "Output reader task failed");
                String::new()
            }
        },
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_display() {
        let spec = CommandSpec::new("cdk", ["deploy", "--all"]);
        assert_eq!(spec.to_string(), "cdk deploy --all");
    }

    #[test]
    fn test_flag_value() {
        let spec = CommandSpec::new("cdk", ["deploy", "--outputs-file", "/tmp/out"]);
        assert_eq!(spec.flag_value("--outputs-file"), Some("/tmp/out"));
        assert_eq!(spec.flag_value("--all"), None);

        let dangling = CommandSpec::new("cdk", ["--outputs-file"]);
        assert_eq!(dangling.flag_value("--outputs-file"), None);
    }

    #[tokio::test]
    async fn test_tee_captures_everything() {
        let input: &[u8] = b"line one\npartial";
        let mut echoed = Vec::new();
        let captured = tee(input, &mut echoed).await;
        assert_eq!(captured, b"line one\npartial");
        assert_eq!(echoed, b"line one\npartial");
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let spec = CommandSpec::new("echo", ["hello"]);

        let output = ProcessRunner::new().run(&spec).await.expect("execute failed");
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_execute_failing_command() {
        let spec = CommandSpec::new("sh", ["-c", "echo oops >&2; exit 3"]);

        let err = ProcessRunner::new().run(&spec).await.expect_err("should fail");
        match err {
            RunnerError::Failed {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, 3);
                assert!(stderr.contains("oops"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_error() {
        let spec = CommandSpec::new("sitefront-definitely-not-a-binary", Vec::<String>::new());

        let err = ProcessRunner::new().run(&spec).await.expect_err("should fail");
        assert!(matches!(err, RunnerError::Launch { .. }));
    }

    #[tokio::test]
    async fn test_runs_in_configured_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = CommandSpec::new("pwd", Vec::<String>::new());

        let output = ProcessRunner::in_dir(dir.path())
            .run(&spec)
            .await
            .expect("pwd");
        let reported = std::path::PathBuf::from(output.stdout.trim());
        assert_eq!(
            reported.canonicalize().expect("canonical"),
            dir.path().canonicalize().expect("canonical")
        );
    }

    #[tokio::test]
    async fn test_force_color_set_for_child() {
        let spec = CommandSpec::new("sh", ["-c", "printf %s \"$FORCE_COLOR\""]);

        let output = ProcessRunner::new().run(&spec).await.expect("sh");
        assert_eq!(output.stdout, "1");
    }
}
