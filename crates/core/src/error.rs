//! Error types for the codeloop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator has its own error enum.

use thiserror::Error;

/// The top-level error type for all codeloop operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Storage errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Turn budget ---
    #[error("Request timed out after {secs}s")]
    TurnTimeout { secs: u64 },

    #[error("Interrupted")]
    Interrupted,

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    NotFound(String),

    #[error("{tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("{tool_name} timed out after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

impl ToolError {
    /// Shorthand for an execution failure.
    pub fn failed(tool_name: &str, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            tool_name: tool_name.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Corrupt data in {path}: {reason}")]
    Serialization { path: String, reason: String },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("No active plan")]
    NoActivePlan,

    #[error("Task not found: {0}")]
    TaskNotFound(String),
}
