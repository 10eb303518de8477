//! Where the conversation loop writes user-facing text.

use std::sync::Mutex;

/// Display capability injected into [`crate::AgentLoop`].
pub trait Output: Send + Sync {
    /// A complete block of model prose (buffered mode, or leading prose).
    fn prose(&self, text: &str);

    /// A one-line tool status.
    fn status(&self, line: &str);

    /// Visible text of a streamed response, as it arrives.
    fn stream_chunk(&self, text: &str);

    /// The streamed response is over. Must be harmless when nothing was streamed.
    fn stream_end(&self);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

impl Output for NullOutput {
    fn prose(&self, _text: &str) {}
    fn status(&self, _line: &str) {}
    fn stream_chunk(&self, _text: &str) {}
    fn stream_end(&self) {}
}

/// One recorded display event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shown {
    Prose(String),
    Status(String),
    Streamed(String),
}

/// Keeps everything in memory for later inspection.
#[derive(Debug, Default)]
pub struct CaptureOutput {
    events: Mutex<Vec<Shown>>,
}

impl CaptureOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Shown> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// All streamed text concatenated.
    pub fn streamed(&self) -> String {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Shown::Streamed(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: Shown) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl Output for CaptureOutput {
    fn prose(&self, text: &str) {
        self.record(Shown::Prose(text.to_string()));
    }

    fn status(&self, line: &str) {
        self.record(Shown::Status(line.to_string()));
    }

    fn stream_chunk(&self, text: &str) {
        self.record(Shown::Streamed(text.to_string()));
    }

    fn stream_end(&self) {}
}
