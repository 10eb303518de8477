//! Directory listing and file-name search.

use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Params, Tool};
use glob::Pattern;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::args;

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

async fn blocking<T, F>(tool: &'static str, f: F) -> Result<T, ToolError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ToolError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ToolError::failed(tool, format!("worker task failed: {e}")))?
}

/// `[DIR]` / `[FILE]` listing of a directory.
pub struct ListFilesTool;

fn list_dir(root: PathBuf, recursive: bool) -> Result<String, ToolError> {
    let mut out = String::new();
    let walker = WalkDir::new(&root)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|e| {
            ToolError::failed("list_files", format!("failed to read directory: {e}"))
        })?;
        let rel = relative(&root, entry.path());
        if entry.file_type().is_dir() {
            let _ = writeln!(out, "[DIR]  {rel}");
        } else {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let _ = writeln!(out, "[FILE] {rel} ({size} bytes)");
        }
    }
    Ok(out)
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files in a directory, optionally recursively."
    }

    async fn execute(&self, params: &Params, working_dir: &Path) -> Result<String, ToolError> {
        let root = args::resolve_dir(params, "directory", working_dir);
        let recursive = args::flag(params, "recursive");
        blocking("list_files", move || list_dir(root, recursive)).await
    }
}

/// Glob search on file names.
pub struct FindFilesTool;

fn find(root: PathBuf, pattern: String, excludes: Vec<String>) -> Result<String, ToolError> {
    let primary = Pattern::new(&pattern)
        .map_err(|e| ToolError::InvalidArguments(format!("invalid pattern '{pattern}': {e}")))?;
    // `**/*.rs` style patterns match on the file name anywhere in the tree.
    let flattened = if pattern.contains("**") {
        Pattern::new(&pattern.replace("**/*", "*").replace("**/", "")).ok()
    } else {
        None
    };
    let exclude_patterns: Vec<(String, Option<Pattern>)> = excludes
        .into_iter()
        .filter(|e| !e.is_empty())
        .map(|e| {
            let p = Pattern::new(&e).ok();
            (e, p)
        })
        .collect();

    let is_excluded = |entry: &walkdir::DirEntry| {
        let name = entry.file_name().to_string_lossy();
        let rel = relative(&root, entry.path());
        exclude_patterns.iter().any(|(raw, pat)| {
            pat.as_ref().is_some_and(|p| p.matches(&name)) || rel.contains(raw.as_str())
        })
    };

    let mut matches = Vec::new();
    let walker = WalkDir::new(&root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_excluded(e));

    for entry in walker.filter_map(Result::ok) {
        if entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        let hit = primary.matches(&name) || flattened.as_ref().is_some_and(|p| p.matches(&name));
        if hit {
            matches.push(relative(&root, entry.path()));
        }
    }

    if matches.is_empty() {
        return Ok("No files found matching pattern".to_string());
    }

    let mut out = format!("Found {} files matching '{pattern}':\n", matches.len());
    for m in &matches {
        let _ = writeln!(out, "  {m}");
    }
    Ok(out)
}

#[async_trait]
impl Tool for FindFilesTool {
    fn name(&self) -> &str {
        "find_files"
    }

    fn description(&self) -> &str {
        "Find files whose names match a glob pattern (supports **)."
    }

    async fn execute(&self, params: &Params, working_dir: &Path) -> Result<String, ToolError> {
        let pattern = args::require_str(params, "pattern")?.to_string();
        let root = args::resolve_dir(params, "directory", working_dir);
        let excludes = args::str_list(params, "exclude");
        blocking("find_files", move || find(root, pattern, excludes)).await
    }
}
