//! Line input from the terminal.
//!
//! Stdin is read on a background task and handed over through a channel, so
//! the REPL can wait on input and Ctrl+C at the same time.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

static FILE_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\s)@(\S+)").expect("valid regex"));

#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error("failed to read file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Spawn the stdin reader. The channel closes on EOF (Ctrl+D) or a read error.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut lines = BufReader::new(io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });

    rx
}

/// What a line of input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    Exit,
    /// A slash command: name without the slash, then its arguments
    Command(String, Vec<String>),
    Message(String),
}

pub fn parse_line(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if matches!(line, "exit" | "quit") {
        return Input::Exit;
    }
    if let Some(rest) = line.strip_prefix('/') {
        let mut parts = rest.split_whitespace().map(str::to_string);
        let name = parts.next().unwrap_or_default();
        return Input::Command(name, parts.collect());
    }
    Input::Message(line.to_string())
}

/// Inline every `@path` token of a message as a fenced file block.
///
/// Paths resolve against `working_dir`. An `@` inside a word (`a@b.com`) or
/// on its own is left alone.
pub async fn expand_file_references(message: &str, working_dir: &Path) -> Result<String, ReferenceError> {
    let mut expanded = String::with_capacity(message.len());
    let mut last = 0;

    for caps in FILE_REFERENCE.captures_iter(message) {
        let (Some(whole), Some(path)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        let content = tokio::fs::read_to_string(working_dir.join(path.as_str()))
            .await
            .map_err(|source| ReferenceError::Read {
                path: path.as_str().to_string(),
                source,
            })?;
        let lang = Path::new(path.as_str())
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        expanded.push_str(&message[last..whole.start()]);
        expanded.push_str(&format!(
            "\n\n**File: `{}`**\n```{lang}\n{}\n```",
            path.as_str(),
            content.trim_end_matches('\n')
        ));
        last = whole.end();
    }

    expanded.push_str(&message[last..]);
    Ok(expanded)
}
