use crate::options::StreamTarget;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::process::{Command, Output, Stdio};
#[cfg(test)]
use std::sync::Mutex;

/// Trait for executing system commands, allowing for mocking in tests
pub trait CommandExecutor: Send + Sync {
    /// Execute a command and capture its output
    fn execute(
        &self,
        command: &str,
        args: &[String],
        working_dir: &Path,
        env: &HashMap<String, String>,
    ) -> Result<Output>;

    /// Execute a command with stdin/stderr inherited and stdout sent to `stdout`.
    /// Returns the exit code (-1 when terminated by a signal).
    fn execute_streaming(
        &self,
        command: &str,
        args: &[String],
        working_dir: &Path,
        env: &HashMap<String, String>,
        stdout: StreamTarget,
    ) -> Result<i32>;
}

/// Real command executor using std::process::Command
pub struct RealCommandExecutor;

impl RealCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RealCommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor for RealCommandExecutor {
    fn execute(
        &self,
        command: &str,
        args: &[String],
        working_dir: &Path,
        env: &HashMap<String, String>,
    ) -> Result<Output> {
        Command::new(command)
            .args(args)
            .current_dir(working_dir)
            .envs(env)
            .output()
            .with_context(|| format!("Failed to execute {}", command))
    }

    fn execute_streaming(
        &self,
        command: &str,
        args: &[String],
        working_dir: &Path,
        env: &HashMap<String, String>,
        stdout: StreamTarget,
    ) -> Result<i32> {
        let stdout = match stdout {
            StreamTarget::Stdout => Stdio::inherit(),
            StreamTarget::Stderr => Stdio::from(std::io::stderr()),
        };

        let mut child = Command::new(command)
            .args(args)
            .current_dir(working_dir)
            .envs(env)
            .stdin(Stdio::inherit())
            .stdout(stdout)
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Failed to execute {}", command))?;

        let status = child.wait()?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// A recorded invocation made against MockCommandExecutor
#[cfg(test)]
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCommand {
    pub command: String,
    pub args: Vec<String>,
}

/// Pre-configured result for MockCommandExecutor, matched on command name
#[cfg(test)]
#[derive(Clone, Debug)]
pub struct MockCommandResult {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Mock command executor for testing
#[cfg(test)]
pub struct MockCommandExecutor {
    outputs: Mutex<Vec<MockCommandResult>>,
    calls: Mutex<Vec<RecordedCommand>>,
}

#[cfg(test)]
impl MockCommandExecutor {
    pub fn new() -> Self {
        Self::with_outputs(Vec::new())
    }

    pub fn with_outputs(outputs: Vec<MockCommandResult>) -> Self {
        Self {
            outputs: Mutex::new(outputs),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCommand> {
        self.calls.lock().unwrap().clone()
    }

    fn take_result(&self, command: &str, args: &[String]) -> Option<MockCommandResult> {
        self.calls.lock().unwrap().push(RecordedCommand {
            command: command.to_string(),
            args: args.to_vec(),
        });

        let mut outputs = self.outputs.lock().unwrap();
        let index = outputs.iter().position(|r| r.command == command)?;
        Some(outputs.remove(index))
    }
}

#[cfg(test)]
impl Default for MockCommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl CommandExecutor for MockCommandExecutor {
    fn execute(
        &self,
        command: &str,
        args: &[String],
        _working_dir: &Path,
        _env: &HashMap<String, String>,
    ) -> Result<Output> {
        // Default: successful empty output
        let result = self.take_result(command, args).unwrap_or(MockCommandResult {
            command: command.to_string(),
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        });

        Ok(Output {
            status: create_exit_status(result.exit_code),
            stdout: result.stdout.into_bytes(),
            stderr: result.stderr.into_bytes(),
        })
    }

    fn execute_streaming(
        &self,
        command: &str,
        args: &[String],
        _working_dir: &Path,
        _env: &HashMap<String, String>,
        _stdout: StreamTarget,
    ) -> Result<i32> {
        Ok(self
            .take_result(command, args)
            .map(|result| result.exit_code)
            .unwrap_or(0))
    }
}

#[cfg(test)]
fn create_exit_status(code: i32) -> std::process::ExitStatus {
    // ExitStatus can't be constructed directly
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        std::process::ExitStatus::from_raw(code << 8)
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::ExitStatusExt;
        std::process::ExitStatus::from_raw(code as u32)
    }
}
