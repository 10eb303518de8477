//! Terminal rendering: the spinner, model output and tool status lines.

use codeloop_agent::Output;
use codeloop_agent::status::{GRAY, GREEN, RED, RESET};
use codeloop_core::ProgressSink;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

const FRAMES: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
const FRAME_INTERVAL: Duration = Duration::from_millis(80);
const CLEAR_LINE: &str = "\r\x1b[K";

struct Running {
    message: Arc<Mutex<String>>,
    handle: JoinHandle<()>,
}

/// Animated spinner on stderr.
#[derive(Default)]
pub struct TerminalProgress {
    running: Mutex<Option<Running>>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for TerminalProgress {
    fn start(&self, message: &str) {
        let Ok(mut running) = self.running.lock() else {
            return;
        };
        if let Some(r) = running.as_ref() {
            if let Ok(mut m) = r.message.lock() {
                *m = message.to_string();
            }
            return;
        }

        let shared = Arc::new(Mutex::new(message.to_string()));
        let text = shared.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FRAME_INTERVAL);
            for frame in FRAMES.iter().cycle() {
                ticker.tick().await;
                let msg = text.lock().map(|m| m.clone()).unwrap_or_default();
                let mut err = std::io::stderr().lock();
                let _ = write!(err, "{CLEAR_LINE}{GRAY}{frame} {msg}{RESET}");
                let _ = err.flush();
            }
        });
        *running = Some(Running { message: shared, handle });
    }

    fn update(&self, message: &str) {
        if let Ok(running) = self.running.lock() {
            if let Some(r) = running.as_ref() {
                if let Ok(mut m) = r.message.lock() {
                    *m = message.to_string();
                }
            }
        }
    }

    fn stop(&self) {
        let Ok(mut running) = self.running.lock() else {
            return;
        };
        if let Some(r) = running.take() {
            r.handle.abort();
            let mut err = std::io::stderr().lock();
            let _ = write!(err, "{CLEAR_LINE}");
            let _ = err.flush();
        }
    }
}

impl Drop for TerminalProgress {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Writes model output to stdout and tool status to stderr.
pub struct TerminalOutput {
    color: bool,
    mid_stream: AtomicBool,
}

impl TerminalOutput {
    pub fn new(color: bool) -> Self {
        Self {
            color,
            mid_stream: AtomicBool::new(false),
        }
    }

    fn paint(&self, line: &str) -> String {
        if self.color {
            line.to_string()
        } else {
            strip_colors(line)
        }
    }

    pub fn error(&self, message: &str) {
        eprintln!("{}", self.paint(&format!("{RED}Error: {message}{RESET}")));
    }

    pub fn note(&self, message: &str) {
        println!("{}", self.paint(&format!("{GRAY}{message}{RESET}")));
    }
}

impl Output for TerminalOutput {
    fn prose(&self, text: &str) {
        println!("\n{text}\n");
    }

    fn status(&self, line: &str) {
        eprintln!("{}", self.paint(line));
    }

    fn stream_chunk(&self, text: &str) {
        if !self.mid_stream.swap(true, Ordering::Relaxed) {
            println!();
        }
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "{text}");
        let _ = out.flush();
    }

    fn stream_end(&self) {
        if self.mid_stream.swap(false, Ordering::Relaxed) {
            println!("\n");
        }
    }
}

/// Remove the ANSI color codes this crate emits.
pub fn strip_colors(line: &str) -> String {
    [GRAY, GREEN, RED, RESET]
        .iter()
        .fold(line.to_string(), |acc, code| acc.replace(code, ""))
}

/// Startup details shown once before the prompt.
pub struct Banner<'a> {
    pub vendor: &'a str,
    pub host: &'a str,
    pub model: &'a str,
    pub working_dir: &'a std::path::Path,
    pub storage: &'a str,
    pub resumed: Option<(&'a str, usize)>,
}

impl Banner<'_> {
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("\n  codeloop\n\n");
        out.push_str(&format!("  Connected to {} at {}\n", self.vendor, self.host));
        out.push_str(&format!("  Model:     {}\n", self.model));
        out.push_str(&format!("  Directory: {}\n", self.working_dir.display()));
        out.push_str(&format!("  Storage:   {}\n", self.storage));
        if let Some((id, count)) = self.resumed {
            out.push_str(&format!(
                "  Resumed session {} ({count} messages)\n",
                short_id(id)
            ));
        }
        out.push_str("\n  Type /help for commands, exit to quit.\n");
        out
    }
}

/// First eight characters of a session id.
pub fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(i, _)| &id[..i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn strips_only_known_codes() {
        let line = format!("{GREEN}✓ Wrote a.rs{RESET}");
        assert_eq!(strip_colors(&line), "✓ Wrote a.rs");
        assert_eq!(strip_colors("plain"), "plain");
    }

    #[test]
    fn short_ids() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn banner_mentions_resumed_session() {
        let banner = Banner {
            vendor: "Ollama",
            host: "http://localhost:11434",
            model: "qwen2.5-coder:7b",
            working_dir: Path::new("/work"),
            storage: "file",
            resumed: Some(("0123456789", 4)),
        };
        let text = banner.render();
        assert!(text.contains("Connected to Ollama at http://localhost:11434"));
        assert!(text.contains("Model:     qwen2.5-coder:7b"));
        assert!(text.contains("Resumed session 01234567 (4 messages)"));

        let fresh = Banner { resumed: None, ..banner };
        assert!(!fresh.render().contains("Resumed"));
    }

    #[tokio::test]
    async fn spinner_stop_is_idempotent() {
        let progress = TerminalProgress::new();
        progress.stop();
        progress.start("Thinking...");
        progress.update("Running read_file...");
        progress.start("again");
        progress.stop();
        progress.stop();
        assert!(progress.running.lock().unwrap().is_none());
    }
}
