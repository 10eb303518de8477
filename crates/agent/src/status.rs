//! One-line status summaries for executed tool calls.

use codeloop_core::tool::Params;
use std::path::Path;

pub const GRAY: &str = "\x1b[90m";
pub const GREEN: &str = "\x1b[32m";
pub const RED: &str = "\x1b[31m";
pub const RESET: &str = "\x1b[0m";

fn str_param<'a>(params: &'a Params, key: &str) -> &'a str {
    params.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

fn int_param(params: &Params, key: &str) -> i64 {
    params.get(key).and_then(|v| v.as_f64()).map(|n| n as i64).unwrap_or(0)
}

fn base(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

fn newlines(text: &str) -> usize {
    text.matches('\n').count()
}

fn gray(text: String) -> String {
    format!("{GRAY}{text}{RESET}")
}

fn green(text: String) -> String {
    format!("{GREEN}{text}{RESET}")
}

/// Summarize a tool result for display. Never fails: missing or mistyped
/// params read as empty strings and zeros.
pub fn format_tool_status(tool: &str, params: &Params, result: &str, is_error: bool) -> String {
    if is_error {
        return format!("{RED}✗ {tool} failed{RESET}");
    }

    let file = || base(str_param(params, "file_path"));

    match tool {
        "read_file" => gray(format!("→ Read {} ({} lines)", file(), newlines(result) + 1)),
        "search_files" => {
            let pattern = str_param(params, "pattern");
            if result.contains("No matches") {
                gray(format!("→ Searched for \"{pattern}\" (no matches)"))
            } else {
                gray(format!("→ Searched for \"{pattern}\" ({} matches)", newlines(result)))
            }
        }
        "list_files" => {
            let dir = match str_param(params, "directory") {
                "" | "." => "current directory",
                d => d,
            };
            gray(format!("→ Listed {dir} ({} items)", newlines(result)))
        }
        "execute_command" => {
            let cmd = str_param(params, "command");
            let shown = if cmd.chars().count() > 40 {
                format!("{}...", cmd.chars().take(37).collect::<String>())
            } else {
                cmd.to_string()
            };
            gray(format!("→ Executed: {shown}"))
        }
        "write_file" => green(format!("✓ Wrote {}", file())),
        "append_file" => green(format!("✓ Appended to {}", file())),
        "edit_file" => green(format!("✓ Edited {}", file())),
        "insert_lines" => green(format!(
            "✓ Inserted at line {} in {}",
            int_param(params, "line_number"),
            file()
        )),
        "replace_lines" => green(format!(
            "✓ Replaced lines {}-{} in {}",
            int_param(params, "start_line"),
            int_param(params, "end_line"),
            file()
        )),
        "delete_lines" => green(format!(
            "✓ Deleted lines {}-{} from {}",
            int_param(params, "start_line"),
            int_param(params, "end_line"),
            file()
        )),
        "copy_file" | "move_file" => {
            let verb = if tool == "copy_file" { "Copied" } else { "Moved" };
            green(format!(
                "✓ {verb} {} to {}",
                base(str_param(params, "source_path")),
                base(str_param(params, "dest_path"))
            ))
        }
        "delete_file" => {
            let recursive = params.get("recursive").and_then(|v| v.as_bool()).unwrap_or(false);
            let suffix = if recursive { " (recursive)" } else { "" };
            green(format!("✓ Deleted {}{suffix}", file()))
        }
        "create_directory" => green(format!(
            "✓ Created directory {}",
            base(str_param(params, "path"))
        )),
        "find_files" => {
            let pattern = str_param(params, "pattern");
            if result.contains("No files found") {
                gray(format!("→ Find \"{pattern}\" (no matches)"))
            } else {
                gray(format!("→ Find \"{pattern}\" ({} files)", newlines(result)))
            }
        }
        "git_status" => {
            if result.contains("clean") {
                gray("→ Git status: clean".to_string())
            } else {
                gray(format!("→ Git status: {} changes", newlines(result)))
            }
        }
        "git_diff" => {
            if result.contains("No changes") {
                gray("→ Git diff: no changes".to_string())
            } else {
                gray(format!("→ Git diff: {} lines", newlines(result)))
            }
        }
        "git_log" => gray(format!("→ Git log: {} commits", newlines(result) + 1)),
        "git_add" => green("✓ Git: staged files".to_string()),
        "git_commit" => green("✓ Git: commit created".to_string()),
        "git_branch" => gray(format!("→ Git branches: {}", newlines(result) + 1)),
        _ => gray(format!("→ {tool} completed")),
    }
}
