//! `execute_command`: run a shell command in the working directory.
//!
//! Each command has its own timeout, independent of the conversation's turn
//! budget. The child is killed when the timeout fires.

use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Params, Tool};
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::args;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ExecuteCommandTool {
    default_timeout: Duration,
}

impl ExecuteCommandTool {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }
}

impl Default for ExecuteCommandTool {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

fn shell_command(command: &str) -> Command {
    if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Run a shell command in the project directory and return stdout, stderr and the exit code."
    }

    async fn execute(&self, params: &Params, working_dir: &Path) -> Result<String, ToolError> {
        let command = args::require_str(params, "command")?;
        let timeout = params
            .get("timeout")
            .and_then(|v| v.as_f64())
            .filter(|t| *t > 0.0)
            .map(|t| Duration::from_secs(t as u64).max(Duration::from_secs(1)))
            .unwrap_or(self.default_timeout);

        debug!(command = %command, timeout_secs = timeout.as_secs(), "Executing shell command");

        let mut cmd = shell_command(command);
        cmd.current_dir(working_dir).kill_on_drop(true);
        // keep terminal Ctrl+C away from the child; only our timeout stops it
        #[cfg(unix)]
        cmd.process_group(0);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ToolError::failed(self.name(), e.to_string())),
            Err(_) => {
                warn!(command = %command, "Command timed out");
                return Err(ToolError::Timeout {
                    tool_name: self.name().to_string(),
                    timeout_secs: timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut report = format!(
            "Command: {command}\nWorking Directory: {}\n\n",
            working_dir.display()
        );
        if !stdout.is_empty() {
            let _ = writeln!(report, "STDOUT:\n{stdout}");
        }
        if !stderr.is_empty() {
            let _ = writeln!(report, "STDERR:\n{stderr}");
        }

        let code = output.status.code().unwrap_or(-1);
        if !output.status.success() {
            warn!(command = %command, exit_code = code, "Command failed");
        }
        let _ = writeln!(report, "Exit Code: {code}");
        Ok(report)
    }
}
