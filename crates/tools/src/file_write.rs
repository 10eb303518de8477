//! `write_file` and `append_file`.

use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Params, Tool};
use std::path::Path;

use crate::args;

/// Create or overwrite a file, creating parent directories.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file if it doesn't exist, overwrites if it does."
    }

    async fn execute(&self, params: &Params, working_dir: &Path) -> Result<String, ToolError> {
        let file_path = args::require_str(params, "file_path")?;
        let content = args::require_str(params, "content")?;
        let path = args::resolve(working_dir, file_path);

        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Err(ToolError::failed(
                self.name(),
                format!("failed to create directories: {e}"),
            ));
        }

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("failed to write file: {e}")))?;

        Ok(format!("Successfully wrote to {}", path.display()))
    }
}

/// Append to an existing file.
pub struct AppendFileTool;

#[async_trait]
impl Tool for AppendFileTool {
    fn name(&self) -> &str {
        "append_file"
    }

    fn description(&self) -> &str {
        "Append content to the end of an existing file."
    }

    async fn execute(&self, params: &Params, working_dir: &Path) -> Result<String, ToolError> {
        let file_path = args::require_str(params, "file_path")?;
        let content = args::require_str(params, "content")?;
        let path = args::resolve(working_dir, file_path);

        let mut existing = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("failed to read file: {e}")))?;
        existing.push_str(content);

        tokio::fs::write(&path, existing)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("failed to write file: {e}")))?;

        Ok(format!("Successfully appended to {}", path.display()))
    }
}
