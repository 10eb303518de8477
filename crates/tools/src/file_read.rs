//! `read_file`: return a file's content, optionally a numbered line range.

use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Params, Tool};
use std::fmt::Write as _;
use std::path::Path;

use crate::args;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file. Optional start_line/end_line return a numbered excerpt."
    }

    async fn execute(&self, params: &Params, working_dir: &Path) -> Result<String, ToolError> {
        let file_path = args::require_str(params, "file_path")?;
        let path = args::resolve(working_dir, file_path);

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("failed to read file: {e}")))?;

        let start = args::opt_int(params, "start_line")?;
        let end = args::opt_int(params, "end_line")?;
        if start.is_none() && end.is_none() {
            return Ok(content);
        }

        let lines: Vec<&str> = content.split('\n').collect();
        let total = lines.len() as i64;

        let start = start.unwrap_or(1);
        if start < 1 || start > total {
            return Err(ToolError::failed(
                self.name(),
                format!("start_line {start} is out of range (file has {total} lines)"),
            ));
        }
        let end = end.unwrap_or(total);
        if end < start || end > total {
            return Err(ToolError::failed(
                self.name(),
                format!("end_line {end} is invalid (must be between {start} and {total})"),
            ));
        }

        let mut out = format!(
            "=== {} (lines {start}-{end} of {total}) ===\n",
            args::base_name(&path)
        );
        for (offset, line) in lines[(start - 1) as usize..end as usize].iter().enumerate() {
            let _ = writeln!(out, "{:4}: {line}", start + offset as i64);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(v: serde_json::Value) -> Params {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn reads_whole_file_relative_to_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "alpha\nbeta\n").unwrap();

        let out = ReadFileTool
            .execute(&params(json!({"file_path": "notes.txt"})), dir.path())
            .await
            .unwrap();
        assert_eq!(out, "alpha\nbeta\n");
    }

    #[tokio::test]
    async fn reads_numbered_range() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.rs"), "one\ntwo\nthree\nfour").unwrap();

        let out = ReadFileTool
            .execute(&params(json!({"file_path": "f.rs", "start_line": 2.0, "end_line": 3})), dir.path())
            .await
            .unwrap();
        assert_eq!(out, "=== f.rs (lines 2-3 of 4) ===\n   2: two\n   3: three\n");
    }

    #[tokio::test]
    async fn start_only_reads_to_end() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "a\nb\nc").unwrap();

        let out = ReadFileTool
            .execute(&params(json!({"file_path": "f.txt", "start_line": 3})), dir.path())
            .await
            .unwrap();
        assert!(out.starts_with("=== f.txt (lines 3-3 of 3) ===\n"));
        assert!(out.ends_with("   3: c\n"));
    }

    #[tokio::test]
    async fn out_of_range_start_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "a\nb").unwrap();

        let err = ReadFileTool
            .execute(&params(json!({"file_path": "f.txt", "start_line": 9})), dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("start_line 9 is out of range (file has 2 lines)"));
    }

    #[tokio::test]
    async fn missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReadFileTool
            .execute(&params(json!({"file_path": "nope.txt"})), dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to read file"));
    }

    #[tokio::test]
    async fn missing_path_argument() {
        let dir = tempfile::tempdir().unwrap();
        let result = ReadFileTool.execute(&Params::new(), dir.path()).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }
}
