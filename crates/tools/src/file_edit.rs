//! In-place edits: string replacement and line-based insert/replace/delete.
//!
//! Line numbers are 1-based. A file is treated as its `\n`-separated pieces,
//! so a trailing newline yields a final empty line.

use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Params, Tool};
use std::path::{Path, PathBuf};

use crate::args;

async fn read(tool: &str, path: &Path) -> Result<String, ToolError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ToolError::failed(tool, format!("failed to read file: {e}")))
}

async fn write(tool: &str, path: &Path, content: &str) -> Result<(), ToolError> {
    tokio::fs::write(path, content)
        .await
        .map_err(|e| ToolError::failed(tool, format!("failed to write file: {e}")))
}

/// Validate an inclusive `start..=end` range against `len` lines.
fn check_range(tool: &str, start: i64, end: i64, len: usize) -> Result<(usize, usize), ToolError> {
    let len = len as i64;
    if start < 1 || start > len {
        return Err(ToolError::failed(
            tool,
            format!("start_line {start} is out of range (file has {len} lines)"),
        ));
    }
    if end < start || end > len {
        return Err(ToolError::failed(
            tool,
            format!("end_line {end} is invalid (must be between {start} and {len})"),
        ));
    }
    Ok((start as usize, end as usize))
}

struct LineTarget {
    path: PathBuf,
    lines: Vec<String>,
}

async fn load_lines(tool: &str, params: &Params, working_dir: &Path) -> Result<LineTarget, ToolError> {
    let file_path = args::require_str(params, "file_path")?;
    let path = args::resolve(working_dir, file_path);
    let content = read(tool, &path).await?;
    Ok(LineTarget {
        lines: content.split('\n').map(str::to_string).collect(),
        path,
    })
}

/// Replace an exact substring.
pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace exact text in a file. old_string must be unique unless replace_all is true."
    }

    async fn execute(&self, params: &Params, working_dir: &Path) -> Result<String, ToolError> {
        let file_path = args::require_str(params, "file_path")?;
        let old_string = args::require_str(params, "old_string")?;
        if old_string.is_empty() {
            return Err(ToolError::InvalidArguments(
                "old_string cannot be empty. To completely rewrite a file, use write_file. \
                 To add content to the end, use append_file. To modify specific text, \
                 read the file first to find the exact text to replace"
                    .into(),
            ));
        }
        let new_string = args::require_str(params, "new_string")?;
        let replace_all = args::flag(params, "replace_all");
        let path = args::resolve(working_dir, file_path);

        let content = read(self.name(), &path).await?;
        let count = content.matches(old_string).count();
        if count == 0 {
            return Err(ToolError::failed(
                self.name(),
                "old_string not found in file. Make sure to match the exact text including whitespace and indentation",
            ));
        }
        if count > 1 && !replace_all {
            return Err(ToolError::failed(
                self.name(),
                format!(
                    "old_string appears {count} times in file. Use replace_all=true to replace all occurrences, or provide more context to make it unique"
                ),
            ));
        }

        let updated = if replace_all {
            content.replace(old_string, new_string)
        } else {
            content.replacen(old_string, new_string, 1)
        };
        write(self.name(), &path, &updated).await?;

        if replace_all && count > 1 {
            Ok(format!("Successfully replaced {count} occurrences in {}", path.display()))
        } else {
            Ok(format!("Successfully edited {}", path.display()))
        }
    }
}

/// Insert content before a given line.
pub struct InsertLinesTool;

#[async_trait]
impl Tool for InsertLinesTool {
    fn name(&self) -> &str {
        "insert_lines"
    }

    fn description(&self) -> &str {
        "Insert content at a line number (1 to line count + 1)."
    }

    async fn execute(&self, params: &Params, working_dir: &Path) -> Result<String, ToolError> {
        let content = args::require_str(params, "content")?;
        let line_number = args::require_int(params, "line_number")?;
        let mut target = load_lines(self.name(), params, working_dir).await?;

        let len = target.lines.len() as i64;
        if line_number < 1 || line_number > len + 1 {
            return Err(ToolError::failed(
                self.name(),
                format!("line_number {line_number} is out of range (file has {len} lines)"),
            ));
        }

        target.lines.insert((line_number - 1) as usize, content.to_string());
        write(self.name(), &target.path, &target.lines.join("\n")).await?;

        Ok(format!(
            "Successfully inserted at line {line_number} in {}",
            target.path.display()
        ))
    }
}

/// Replace an inclusive line range with new content.
pub struct ReplaceLinesTool;

#[async_trait]
impl Tool for ReplaceLinesTool {
    fn name(&self) -> &str {
        "replace_lines"
    }

    fn description(&self) -> &str {
        "Replace lines start_line through end_line with new content."
    }

    async fn execute(&self, params: &Params, working_dir: &Path) -> Result<String, ToolError> {
        let content = args::require_str(params, "content")?;
        let start = args::require_int(params, "start_line")?;
        let end = args::require_int(params, "end_line")?;
        let mut target = load_lines(self.name(), params, working_dir).await?;

        let (start, end) = check_range(self.name(), start, end, target.lines.len())?;
        target
            .lines
            .splice(start - 1..end, std::iter::once(content.to_string()));
        write(self.name(), &target.path, &target.lines.join("\n")).await?;

        Ok(format!(
            "Successfully replaced lines {start}-{end} ({} lines) in {}",
            end - start + 1,
            target.path.display()
        ))
    }
}

/// Delete an inclusive line range.
pub struct DeleteLinesTool;

#[async_trait]
impl Tool for DeleteLinesTool {
    fn name(&self) -> &str {
        "delete_lines"
    }

    fn description(&self) -> &str {
        "Delete lines start_line through end_line."
    }

    async fn execute(&self, params: &Params, working_dir: &Path) -> Result<String, ToolError> {
        let start = args::require_int(params, "start_line")?;
        let end = args::require_int(params, "end_line")?;
        let mut target = load_lines(self.name(), params, working_dir).await?;

        let (start, end) = check_range(self.name(), start, end, target.lines.len())?;
        target.lines.drain(start - 1..end);
        write(self.name(), &target.path, &target.lines.join("\n")).await?;

        Ok(format!(
            "Successfully deleted lines {start}-{end} ({} lines) from {}",
            end - start + 1,
            target.path.display()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(v: serde_json::Value) -> Params {
        v.as_object().cloned().unwrap()
    }

    fn setup(content: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), content).unwrap();
        dir
    }

    fn read_back(dir: &tempfile::TempDir) -> String {
        std::fs::read_to_string(dir.path().join("f.txt")).unwrap()
    }

    #[tokio::test]
    async fn edit_replaces_unique_match() {
        let dir = setup("fn main() {\n    old();\n}\n");
        let out = EditFileTool
            .execute(
                &params(json!({"file_path": "f.txt", "old_string": "old()", "new_string": "new()"})),
                dir.path(),
            )
            .await
            .unwrap();
        assert!(out.starts_with("Successfully edited"));
        assert_eq!(read_back(&dir), "fn main() {\n    new();\n}\n");
    }

    #[tokio::test]
    async fn edit_rejects_ambiguous_match() {
        let dir = setup("a a a");
        let err = EditFileTool
            .execute(&params(json!({"file_path": "f.txt", "old_string": "a", "new_string": "b"})), dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("appears 3 times"));
        assert_eq!(read_back(&dir), "a a a");
    }

    #[tokio::test]
    async fn edit_replace_all_reports_count() {
        let dir = setup("a a a");
        let out = EditFileTool
            .execute(
                &params(json!({"file_path": "f.txt", "old_string": "a", "new_string": "b", "replace_all": true})),
                dir.path(),
            )
            .await
            .unwrap();
        assert!(out.starts_with("Successfully replaced 3 occurrences in"));
        assert_eq!(read_back(&dir), "b b b");
    }

    #[tokio::test]
    async fn edit_rejects_empty_and_missing_text() {
        let dir = setup("hello");
        let empty = EditFileTool
            .execute(&params(json!({"file_path": "f.txt", "old_string": "", "new_string": "x"})), dir.path())
            .await;
        assert!(matches!(empty, Err(ToolError::InvalidArguments(_))));

        let missing = EditFileTool
            .execute(&params(json!({"file_path": "f.txt", "old_string": "bye", "new_string": "x"})), dir.path())
            .await
            .unwrap_err();
        assert!(missing.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn insert_before_line_and_at_end() {
        let dir = setup("one\ntwo");
        InsertLinesTool
            .execute(&params(json!({"file_path": "f.txt", "line_number": 2, "content": "mid"})), dir.path())
            .await
            .unwrap();
        assert_eq!(read_back(&dir), "one\nmid\ntwo");

        let out = InsertLinesTool
            .execute(&params(json!({"file_path": "f.txt", "line_number": 4.0, "content": "end"})), dir.path())
            .await
            .unwrap();
        assert!(out.starts_with("Successfully inserted at line 4 in"));
        assert_eq!(read_back(&dir), "one\nmid\ntwo\nend");
    }

    #[tokio::test]
    async fn insert_out_of_range_is_error() {
        let dir = setup("one");
        let err = InsertLinesTool
            .execute(&params(json!({"file_path": "f.txt", "line_number": 5, "content": "x"})), dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("line_number 5 is out of range"));
    }

    #[tokio::test]
    async fn replace_range() {
        let dir = setup("1\n2\n3\n4");
        let out = ReplaceLinesTool
            .execute(
                &params(json!({"file_path": "f.txt", "start_line": 2, "end_line": 3, "content": "two-three"})),
                dir.path(),
            )
            .await
            .unwrap();
        assert!(out.starts_with("Successfully replaced lines 2-3 (2 lines) in"));
        assert_eq!(read_back(&dir), "1\ntwo-three\n4");
    }

    #[tokio::test]
    async fn delete_range() {
        let dir = setup("1\n2\n3\n4");
        let out = DeleteLinesTool
            .execute(&params(json!({"file_path": "f.txt", "start_line": 1, "end_line": 2})), dir.path())
            .await
            .unwrap();
        assert!(out.starts_with("Successfully deleted lines 1-2 (2 lines) from"));
        assert_eq!(read_back(&dir), "3\n4");
    }

    #[tokio::test]
    async fn inverted_range_is_error() {
        let dir = setup("1\n2\n3");
        let err = DeleteLinesTool
            .execute(&params(json!({"file_path": "f.txt", "start_line": 3, "end_line": 2})), dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("end_line 2 is invalid (must be between 3 and 3)"));
    }
}
