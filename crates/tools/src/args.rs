//! Parameter coercion shared by the built-in tools.
//!
//! Parameters arrive as loose JSON. Numbers are floats on the wire, so integer
//! parameters accept any JSON number and truncate toward zero.

use codeloop_core::error::ToolError;
use codeloop_core::tool::Params;
use std::path::{Path, PathBuf};

/// A required string parameter.
pub fn require_str<'a>(params: &'a Params, key: &str) -> Result<&'a str, ToolError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArguments(format!("{key} parameter is required")))
}

/// An optional, non-empty string parameter.
pub fn opt_str<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

/// A boolean flag; anything other than JSON `true` is false.
pub fn flag(params: &Params, key: &str) -> bool {
    params.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

/// A required integer parameter.
pub fn require_int(params: &Params, key: &str) -> Result<i64, ToolError> {
    params.get(key).and_then(|v| v.as_f64()).map(|n| n as i64).ok_or_else(|| {
        ToolError::InvalidArguments(format!("{key} parameter is required and must be a number"))
    })
}

/// An optional integer parameter. Present but non-numeric is an error.
pub fn opt_int(params: &Params, key: &str) -> Result<Option<i64>, ToolError> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(|n| Some(n as i64))
            .ok_or_else(|| ToolError::InvalidArguments(format!("{key} must be a number"))),
    }
}

/// The string members of an array parameter; other members are skipped.
pub fn str_list(params: &Params, key: &str) -> Vec<String> {
    params
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Resolve `path` against the working directory unless it is absolute.
pub fn resolve(working_dir: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        working_dir.join(p)
    }
}

/// Resolve an optional directory parameter, defaulting to the working directory.
pub fn resolve_dir(params: &Params, key: &str, working_dir: &Path) -> PathBuf {
    match opt_str(params, key) {
        Some(dir) => resolve(working_dir, dir),
        None => working_dir.to_path_buf(),
    }
}

/// Final path component for display.
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
