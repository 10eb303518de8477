//! Git tools. Read-only ones (status, diff, log, branch) are safe to call
//! freely; add and commit change the index and history.

use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Params, Tool};
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::args;

struct GitOutput {
    stdout: String,
}

async fn run_git(tool: &str, working_dir: &Path, argv: &[String]) -> Result<GitOutput, ToolError> {
    debug!(tool, args = ?argv, "Running git");
    let output = Command::new("git")
        .args(argv)
        .current_dir(working_dir)
        .output()
        .await
        .map_err(|e| ToolError::failed(tool, format!("failed to run git: {e}")))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = [stdout.trim(), stderr.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        return Err(ToolError::failed(
            tool,
            format!("git {} failed: {detail}", argv.first().map(String::as_str).unwrap_or("")),
        ));
    }
    Ok(GitOutput { stdout })
}

fn argv(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub struct GitStatusTool;

#[async_trait]
impl Tool for GitStatusTool {
    fn name(&self) -> &str {
        "git_status"
    }

    fn description(&self) -> &str {
        "Show changed files (porcelain format)."
    }

    async fn execute(&self, _params: &Params, working_dir: &Path) -> Result<String, ToolError> {
        let out = run_git(self.name(), working_dir, &argv(&["status", "--porcelain"])).await?;
        if out.stdout.is_empty() {
            return Ok("Working tree clean - no changes to commit".to_string());
        }
        Ok(format!("Git Status:\n{}", out.stdout))
    }
}

pub struct GitDiffTool;

#[async_trait]
impl Tool for GitDiffTool {
    fn name(&self) -> &str {
        "git_diff"
    }

    fn description(&self) -> &str {
        "Show unstaged changes, or staged ones with staged=true. Optional file_path."
    }

    async fn execute(&self, params: &Params, working_dir: &Path) -> Result<String, ToolError> {
        let mut cmd = argv(&["diff"]);
        if args::flag(params, "staged") {
            cmd.push("--staged".into());
        }
        if let Some(file) = args::opt_str(params, "file_path") {
            cmd.push(file.to_string());
        }

        let out = run_git(self.name(), working_dir, &cmd).await?;
        if out.stdout.is_empty() {
            return Ok("No changes to show".to_string());
        }
        Ok(out.stdout)
    }
}

pub struct GitLogTool;

#[async_trait]
impl Tool for GitLogTool {
    fn name(&self) -> &str {
        "git_log"
    }

    fn description(&self) -> &str {
        "Show recent commits, one line each (limit defaults to 10)."
    }

    async fn execute(&self, params: &Params, working_dir: &Path) -> Result<String, ToolError> {
        let limit = args::opt_int(params, "limit")?.unwrap_or(10).max(1);
        let cmd = vec![
            "log".to_string(),
            format!("-n{limit}"),
            "--pretty=format:%h - %s (%an, %ar)".to_string(),
        ];
        Ok(run_git(self.name(), working_dir, &cmd).await?.stdout)
    }
}

pub struct GitAddTool;

#[async_trait]
impl Tool for GitAddTool {
    fn name(&self) -> &str {
        "git_add"
    }

    fn description(&self) -> &str {
        "Stage files for commit. Ask the user first."
    }

    async fn execute(&self, params: &Params, working_dir: &Path) -> Result<String, ToolError> {
        if !params.get("files").is_some_and(|v| v.is_array()) {
            return Err(ToolError::InvalidArguments(
                "files parameter is required and must be an array".into(),
            ));
        }
        let files = args::str_list(params, "files");
        if files.is_empty() {
            return Err(ToolError::InvalidArguments("no valid file paths provided".into()));
        }

        let mut cmd = argv(&["add", "--"]);
        cmd.extend(files.iter().cloned());
        run_git(self.name(), working_dir, &cmd).await?;
        Ok(format!("Staged {} files for commit", files.len()))
    }
}

pub struct GitCommitTool;

#[async_trait]
impl Tool for GitCommitTool {
    fn name(&self) -> &str {
        "git_commit"
    }

    fn description(&self) -> &str {
        "Commit staged changes with a message. Ask the user first."
    }

    async fn execute(&self, params: &Params, working_dir: &Path) -> Result<String, ToolError> {
        let message = args::opt_str(params, "message")
            .ok_or_else(|| ToolError::InvalidArguments("message parameter is required".into()))?;
        let cmd = vec!["commit".to_string(), "-m".to_string(), message.to_string()];
        let out = run_git(self.name(), working_dir, &cmd).await?;
        Ok(format!("Commit created:\n{}", out.stdout))
    }
}

pub struct GitBranchTool;

#[async_trait]
impl Tool for GitBranchTool {
    fn name(&self) -> &str {
        "git_branch"
    }

    fn description(&self) -> &str {
        "List local and remote branches."
    }

    async fn execute(&self, _params: &Params, working_dir: &Path) -> Result<String, ToolError> {
        Ok(run_git(self.name(), working_dir, &argv(&["branch", "-a"])).await?.stdout)
    }
}
