//! # codeloop core
//!
//! Domain types, traits, and error definitions shared by every codeloop crate.
//! Nothing in here talks to the network or the filesystem; it defines the
//! model that the other crates implement against.
//!
//! ## Seams
//!
//! - [`Provider`]: a chat-completion client for a locally hosted model
//! - [`Tool`] / [`ToolRegistry`]: named executors the model can invoke
//! - [`SessionStore`]: persistence for sessions, plans and state
//! - [`ProgressSink`]: start/update/stop progress reporting

pub mod error;
pub mod message;
pub mod progress;
pub mod provider;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, StorageError, ToolError};
pub use message::{Conversation, Message, Role};
pub use progress::{NoopProgress, ProgressSink};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use session::{
    CurrentState, Plan, PlanStatus, Preferences, Session, SessionMessage, SessionMetadata,
    SessionStore, Task, TaskStatus, TokenUsage, ToolCallRecord,
};
pub use tool::{Params, Tool, ToolCall, ToolRegistry};
