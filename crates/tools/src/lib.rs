//! Built-in tool implementations for codeloop.
//!
//! Tools give the model the ability to work on a project: read and edit
//! files, search, run shell commands, and inspect or update git state.
//! Every tool resolves relative paths against the working directory it is
//! handed at call time.

pub mod args;
pub mod file_edit;
pub mod file_ops;
pub mod file_read;
pub mod file_write;
pub mod git;
pub mod listing;
pub mod search;
pub mod shell;

use codeloop_core::tool::ToolRegistry;
use std::time::Duration;

/// Create a registry with all built-in tools and the default command timeout.
pub fn default_registry() -> ToolRegistry {
    registry_with_timeout(shell::DEFAULT_COMMAND_TIMEOUT)
}

/// Create a registry with all built-in tools.
///
/// `command_timeout` applies to `execute_command` calls that do not pass
/// their own `timeout`.
pub fn registry_with_timeout(command_timeout: Duration) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    // File operations
    registry.register(Box::new(file_read::ReadFileTool));
    registry.register(Box::new(file_write::WriteFileTool));
    registry.register(Box::new(file_write::AppendFileTool));
    registry.register(Box::new(file_edit::EditFileTool));
    registry.register(Box::new(file_edit::InsertLinesTool));
    registry.register(Box::new(file_edit::ReplaceLinesTool));
    registry.register(Box::new(file_edit::DeleteLinesTool));
    registry.register(Box::new(file_ops::CopyFileTool));
    registry.register(Box::new(file_ops::MoveFileTool));
    registry.register(Box::new(file_ops::DeleteFileTool));
    registry.register(Box::new(file_ops::CreateDirectoryTool));
    registry.register(Box::new(listing::ListFilesTool));
    registry.register(Box::new(listing::FindFilesTool));

    // Search and commands
    registry.register(Box::new(search::SearchFilesTool));
    registry.register(Box::new(shell::ExecuteCommandTool::new(command_timeout)));

    // Git
    registry.register(Box::new(git::GitStatusTool));
    registry.register(Box::new(git::GitDiffTool));
    registry.register(Box::new(git::GitLogTool));
    registry.register(Box::new(git::GitAddTool));
    registry.register(Box::new(git::GitCommitTool));
    registry.register(Box::new(git::GitBranchTool));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeloop_core::tool::Params;

    #[test]
    fn registers_every_tool() {
        let registry = default_registry();
        assert_eq!(registry.len(), 21);
        for name in [
            "read_file", "write_file", "append_file", "edit_file", "insert_lines",
            "replace_lines", "delete_lines", "copy_file", "move_file", "delete_file",
            "create_directory", "list_files", "find_files", "search_files",
            "execute_command", "git_status", "git_diff", "git_log", "git_add",
            "git_commit", "git_branch",
        ] {
            assert!(registry.get(name).is_some(), "missing {name}");
        }
    }

    #[tokio::test]
    async fn dispatch_by_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi").unwrap();
        let registry = default_registry();

        let mut params = Params::new();
        params.insert("file_path".into(), "hello.txt".into());
        let out = registry.execute("read_file", &params, dir.path()).await.unwrap();
        assert_eq!(out, "hi");

        let err = registry.execute("frobnicate", &params, dir.path()).await.unwrap_err();
        assert_eq!(err.to_string(), "unknown tool: frobnicate");
    }
}
