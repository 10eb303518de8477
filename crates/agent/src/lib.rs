//! The conversation loop of codeloop.
//!
//! One user turn follows a **Request → Extract → Act** cycle:
//!
//! 1. **Send** the full history to the model (streamed or buffered)
//! 2. **Extract** tool calls written as JSON into the reply text
//! 3. **Run** them in order and feed the results back as a user message
//! 4. **Repeat** until the model answers without tools or the iteration cap is hit
//!
//! Everything user-facing goes through injected [`Output`] and
//! [`codeloop_core::ProgressSink`] implementations.

pub mod extractor;
pub mod loop_runner;
pub mod output;
pub mod prompt;
pub mod status;
pub mod stream_filter;

pub use extractor::{Extraction, clean_response, extract_tool_calls, normalize_json};
pub use loop_runner::{AgentLoop, TurnOutcome, format_usage};
pub use output::{CaptureOutput, NullOutput, Output, Shown};
pub use prompt::{PROJECT_CONTEXT_FILE, build_system_prompt, load_project_context};
pub use status::format_tool_status;
pub use stream_filter::StreamFilter;
