//! Real-time removal of `<think>` blocks from streamed model output.
//!
//! Reasoning models wrap their chain of thought in `<think>...</think>`.
//! While streaming we hide those blocks from the user, one character at a
//! time, without ever losing a character from the full transcript that the
//! tool-call extractor later works on.

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

/// Per-response filter state.
#[derive(Debug, Default)]
pub struct StreamFilter {
    /// Characters held back while they could still be a tag
    pending: String,
    in_think: bool,
    /// Every chunk fed in, verbatim
    full: String,
}

impl StreamFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the part of it that may be displayed now.
    pub fn process(&mut self, chunk: &str) -> String {
        self.full.push_str(chunk);

        let mut display = String::new();
        for c in chunk.chars() {
            self.pending.push(c);

            if self.in_think {
                if self.pending.ends_with(CLOSE_TAG) {
                    self.in_think = false;
                    self.pending.clear();
                } else if self.pending.len() > CLOSE_TAG.len() {
                    // only the tail can complete the closing tag
                    let cut = self.pending.len() - CLOSE_TAG.len();
                    let cut = (cut..=self.pending.len())
                        .find(|i| self.pending.is_char_boundary(*i))
                        .unwrap_or(self.pending.len());
                    self.pending.drain(..cut);
                }
                continue;
            }

            if self.pending == OPEN_TAG {
                self.in_think = true;
                self.pending.clear();
            } else if !OPEN_TAG.starts_with(self.pending.as_str()) {
                // a trailing `<` may still open a tag
                let keep_lt = c == '<';
                if keep_lt {
                    self.pending.pop();
                }
                display.push_str(&self.pending);
                self.pending.clear();
                if keep_lt {
                    self.pending.push('<');
                }
            }
        }

        display
    }

    /// Emit whatever is still held back at end of stream.
    ///
    /// Text inside an unclosed think block is never shown.
    pub fn flush(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        if self.in_think { String::new() } else { rest }
    }

    /// The complete unfiltered response so far.
    pub fn full_content(&self) -> &str {
        &self.full
    }

    pub fn in_think(&self) -> bool {
        self.in_think
    }
}
