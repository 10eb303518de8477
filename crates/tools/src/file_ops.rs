//! Whole-file operations: copy, move, delete and directory creation.

use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Params, Tool};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::args;

fn source_and_dest(params: &Params, working_dir: &Path) -> Result<(PathBuf, PathBuf), ToolError> {
    let source = args::require_str(params, "source_path")?;
    let dest = args::require_str(params, "dest_path")?;
    Ok((args::resolve(working_dir, source), args::resolve(working_dir, dest)))
}

async fn ensure_parent(tool: &str, path: &Path) -> Result<(), ToolError> {
    if let Some(parent) = path.parent()
        && let Err(e) = tokio::fs::create_dir_all(parent).await
    {
        return Err(ToolError::failed(
            tool,
            format!("failed to create destination directories: {e}"),
        ));
    }
    Ok(())
}

pub struct CopyFileTool;

#[async_trait]
impl Tool for CopyFileTool {
    fn name(&self) -> &str {
        "copy_file"
    }

    fn description(&self) -> &str {
        "Copy a file to a new path, creating parent directories."
    }

    async fn execute(&self, params: &Params, working_dir: &Path) -> Result<String, ToolError> {
        let (source, dest) = source_and_dest(params, working_dir)?;
        ensure_parent(self.name(), &dest).await?;
        tokio::fs::copy(&source, &dest)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("failed to copy file: {e}")))?;
        Ok(format!(
            "Successfully copied {} to {}",
            source.display(),
            dest.display()
        ))
    }
}

pub struct MoveFileTool;

#[async_trait]
impl Tool for MoveFileTool {
    fn name(&self) -> &str {
        "move_file"
    }

    fn description(&self) -> &str {
        "Move or rename a file."
    }

    async fn execute(&self, params: &Params, working_dir: &Path) -> Result<String, ToolError> {
        let (source, dest) = source_and_dest(params, working_dir)?;
        if let Err(e) = tokio::fs::metadata(&source).await {
            return Err(ToolError::failed(
                self.name(),
                format!("source file does not exist: {e}"),
            ));
        }
        ensure_parent(self.name(), &dest).await?;

        if let Err(e) = tokio::fs::rename(&source, &dest).await {
            // Cross-device moves cannot rename.
            debug!(error = %e, "rename failed, falling back to copy and delete");
            tokio::fs::copy(&source, &dest).await.map_err(|e| {
                ToolError::failed(self.name(), format!("failed to copy file: {e}"))
            })?;
            tokio::fs::remove_file(&source).await.map_err(|e| {
                ToolError::failed(
                    self.name(),
                    format!("failed to remove source file after copy: {e}"),
                )
            })?;
        }

        Ok(format!(
            "Successfully moved {} to {}",
            source.display(),
            dest.display()
        ))
    }
}

/// Delete a file, or a directory when `recursive` is set. Missing paths succeed.
pub struct DeleteFileTool;

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file. Directories require recursive=true."
    }

    async fn execute(&self, params: &Params, working_dir: &Path) -> Result<String, ToolError> {
        let file_path = args::require_str(params, "file_path")?;
        let path = args::resolve(working_dir, file_path);
        let done = format!("Successfully deleted {}", path.display());

        let Ok(meta) = tokio::fs::metadata(&path).await else {
            return Ok(done);
        };

        if meta.is_dir() {
            if !args::flag(params, "recursive") {
                return Err(ToolError::failed(
                    self.name(),
                    "cannot delete directory without recursive=true. Use recursive=true to delete the directory and its contents",
                ));
            }
            tokio::fs::remove_dir_all(&path).await.map_err(|e| {
                ToolError::failed(self.name(), format!("failed to delete directory: {e}"))
            })?;
        } else {
            tokio::fs::remove_file(&path).await.map_err(|e| {
                ToolError::failed(self.name(), format!("failed to delete file: {e}"))
            })?;
        }

        Ok(done)
    }
}

pub struct CreateDirectoryTool;

#[async_trait]
impl Tool for CreateDirectoryTool {
    fn name(&self) -> &str {
        "create_directory"
    }

    fn description(&self) -> &str {
        "Create a directory and any missing parents."
    }

    async fn execute(&self, params: &Params, working_dir: &Path) -> Result<String, ToolError> {
        let dir = args::require_str(params, "path")?;
        let path = args::resolve(working_dir, dir);

        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if meta.is_dir() {
                return Ok(format!("Directory already exists: {}", path.display()));
            }
            return Err(ToolError::failed(
                self.name(),
                format!("a file already exists at path: {}", path.display()),
            ));
        }

        tokio::fs::create_dir_all(&path).await.map_err(|e| {
            ToolError::failed(self.name(), format!("failed to create directory: {e}"))
        })?;
        Ok(format!("Created directory: {}", path.display()))
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
    async fn copy_creates_destination_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "data").unwrap();

        let out = CopyFileTool
            .execute(&params(json!({"source_path": "a.txt", "dest_path": "backup/b.txt"})), dir.path())
            .await
            .unwrap();
        assert!(out.starts_with("Successfully copied"));
        assert_eq!(std::fs::read_to_string(dir.path().join("backup/b.txt")).unwrap(), "data");
        assert!(dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn move_removes_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "data").unwrap();

        MoveFileTool
            .execute(&params(json!({"source_path": "a.txt", "dest_path": "moved/a.txt"})), dir.path())
            .await
            .unwrap();
        assert!(!dir.path().join("a.txt").exists());
        assert!(dir.path().join("moved/a.txt").exists());
    }

    #[tokio::test]
    async fn move_missing_source_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = MoveFileTool
            .execute(&params(json!({"source_path": "nope", "dest_path": "x"})), dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("source file does not exist"));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let out = DeleteFileTool
            .execute(&params(json!({"file_path": "ghost.txt"})), dir.path())
            .await
            .unwrap();
        assert!(out.starts_with("Successfully deleted"));
    }

    #[tokio::test]
    async fn delete_directory_needs_recursive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("build/out")).unwrap();

        let err = DeleteFileTool
            .execute(&params(json!({"file_path": "build"})), dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("recursive=true"));

        DeleteFileTool
            .execute(&params(json!({"file_path": "build", "recursive": true})), dir.path())
            .await
            .unwrap();
        assert!(!dir.path().join("build").exists());
    }

    #[tokio::test]
    async fn create_directory_reports_existing() {
        let dir = tempfile::tempdir().unwrap();
        let first = CreateDirectoryTool
            .execute(&params(json!({"path": "a/b"})), dir.path())
            .await
            .unwrap();
        assert!(first.starts_with("Created directory: "));
        let second = CreateDirectoryTool
            .execute(&params(json!({"path": "a/b"})), dir.path())
            .await
            .unwrap();
        assert!(second.starts_with("Directory already exists: "));
    }

    #[tokio::test]
    async fn create_directory_over_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("taken"), "").unwrap();
        let err = CreateDirectoryTool
            .execute(&params(json!({"path": "taken"})), dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("a file already exists"));
    }
}
