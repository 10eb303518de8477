//! `search_files`: content search backed by `grep -rnH`.

use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Params, Tool};
use std::path::Path;
use tokio::process::Command;

use crate::args;

pub struct SearchFilesTool;

/// Build the grep argument list for a search request.
fn grep_args(params: &Params, pattern: &str, directory: &Path) -> Result<Vec<String>, ToolError> {
    let mut argv = vec!["-r".to_string(), "-n".to_string(), "-H".to_string()];

    if let Some(ctx) = args::opt_int(params, "context_lines")?
        && ctx > 0
    {
        argv.push(format!("-C{ctx}"));
    }
    if args::flag(params, "regex") {
        argv.push("-E".into());
    }
    for ext in args::str_list(params, "file_types") {
        argv.push(format!("--include=*{ext}"));
    }
    for dir in args::str_list(params, "exclude_dirs") {
        argv.push(format!("--exclude-dir={dir}"));
    }

    argv.push(pattern.to_string());
    argv.push(directory.to_string_lossy().into_owned());
    Ok(argv)
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search file contents recursively. Supports context_lines, regex, file_types and exclude_dirs."
    }

    async fn execute(&self, params: &Params, working_dir: &Path) -> Result<String, ToolError> {
        let pattern = args::require_str(params, "pattern")?;
        let directory = args::resolve_dir(params, "directory", working_dir);
        let argv = grep_args(params, pattern, &directory)?;

        let output = Command::new("grep")
            .args(&argv)
            .output()
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("grep failed: {e}")))?;

        match output.status.code() {
            Some(0) => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
            // grep exits 1 when nothing matched
            Some(1) => Ok("No matches found".to_string()),
            code => Err(ToolError::failed(
                self.name(),
                format!(
                    "grep failed (exit {}): {}",
                    code.unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            )),
        }
    }
}
