//! Session, plan and project-state data model plus the persistence trait.
//!
//! The on-disk layout belongs to the storage crate; this module only fixes the
//! JSON shape of each record and the operations the agent relies on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::StorageError;
use crate::provider::Usage;
use crate::tool::Params;

/// Running token counters for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Add one response's usage. Counters only ever grow.
    pub fn add(&mut self, usage: &Usage) {
        self.prompt_tokens += u64::from(usage.prompt_tokens);
        self.completion_tokens += u64::from(usage.completion_tokens);
        self.total_tokens += u64::from(usage.total_tokens);
    }

    pub fn is_empty(&self) -> bool {
        self.total_tokens == 0 && self.prompt_tokens == 0 && self.completion_tokens == 0
    }
}

/// Audit entry for one executed tool call. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    #[serde(default)]
    pub params: Params,
    pub result: String,
    pub duration_ms: u64,
    pub success: bool,
}

/// Role name used for persisted tool-call audit entries.
pub const TOOL_ROLE: &str = "tool";

/// A message as persisted in a session file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    /// `user`, `assistant`, `system` or `tool`
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl SessionMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now(),
            tool_call: None,
            usage: None,
        }
    }

    /// A `tool` entry carrying the execution record; content is the result text.
    pub fn tool(record: ToolCallRecord) -> Self {
        Self {
            role: TOOL_ROLE.to_string(),
            content: record.result.clone(),
            timestamp: Utc::now(),
            tool_call: Some(record),
            usage: None,
        }
    }

    pub fn is_tool(&self) -> bool {
        self.role == TOOL_ROLE
    }
}

/// A persisted conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_usage: Option<TokenUsage>,
}

impl Session {
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            summary: None,
            tags: None,
            total_usage: None,
        }
    }

    pub fn metadata(&self) -> SessionMetadata {
        SessionMetadata {
            id: self.id.clone(),
            name: self.name.clone().unwrap_or_default(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            message_count: self.messages.len(),
            summary: self.summary.clone(),
        }
    }
}

/// Index entry summarizing one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    Completed,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
}

impl TaskStatus {
    /// Checkbox marker used in prompts and the `/plan` listing.
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Pending => "[ ]",
            Self::InProgress => "[>]",
            Self::Completed => "[x]",
            Self::Skipped => "[-]",
        }
    }
}

/// A task plan with ordered tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: PlanStatus,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub content: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_tasks: Option<Vec<Task>>,
}

/// Runtime pointers into the active plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_plan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_task_id: Option<String>,
    pub last_activity: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_context: Option<String>,
}

impl Default for CurrentState {
    fn default() -> Self {
        Self {
            active_plan_id: None,
            active_task_id: None,
            last_activity: Utc::now(),
            working_context: None,
        }
    }
}

/// Per-project preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_auto_load_context")]
    pub auto_load_context: bool,
    #[serde(default = "default_max_history_length")]
    pub max_history_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_dirs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt_rules: Option<Vec<String>>,
}

fn default_auto_load_context() -> bool {
    true
}

fn default_max_history_length() -> usize {
    100
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            auto_load_context: default_auto_load_context(),
            max_history_length: default_max_history_length(),
            preferred_model: None,
            exclude_dirs: None,
            custom_prompt_rules: None,
        }
    }
}

/// Persistence for sessions, plans, state and preferences.
///
/// Every mutating call is a complete, synchronous write of the affected
/// record, so a crash loses at most the call in flight.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Backend name for status output (e.g., "file", "in_memory").
    fn name(&self) -> &str;

    /// Where the data lives, if anywhere.
    fn location(&self) -> Option<PathBuf> {
        None
    }

    /// Create a session and make it the active one.
    async fn create_session(&self, name: Option<&str>) -> Result<Session, StorageError>;

    async fn get_session(&self, id: &str) -> Result<Session, StorageError>;

    /// The active session, if one is recorded and still readable.
    async fn get_active_session(&self) -> Result<Option<Session>, StorageError>;

    async fn set_active_session(&self, id: &str) -> Result<(), StorageError>;

    /// Append a message to a session, trimming to the preferred history length.
    async fn add_message(&self, session_id: &str, message: SessionMessage) -> Result<(), StorageError>;

    /// Drop the newest `count` messages of a session.
    async fn remove_last_messages(&self, session_id: &str, count: usize) -> Result<(), StorageError>;

    /// Overwrite a session's running usage totals.
    async fn update_usage(&self, session_id: &str, usage: TokenUsage) -> Result<(), StorageError>;

    async fn list_sessions(&self) -> Result<Vec<SessionMetadata>, StorageError>;

    /// Create the active plan from task descriptions.
    async fn create_plan(&self, title: &str, tasks: &[String]) -> Result<Plan, StorageError>;

    async fn get_active_plan(&self) -> Result<Option<Plan>, StorageError>;

    async fn update_task_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StorageError>;

    /// Move the active plan to the archive.
    async fn archive_plan(&self, plan_id: &str) -> Result<(), StorageError>;

    async fn current_state(&self) -> Result<CurrentState, StorageError>;

    async fn update_current_state(&self, state: CurrentState) -> Result<(), StorageError>;

    async fn preferences(&self) -> Result<Preferences, StorageError>;

    async fn save_preferences(&self, prefs: Preferences) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_usage_accumulates() {
        let mut total = TokenUsage::default();
        assert!(total.is_empty());
        total.add(&Usage { prompt_tokens: 10, completion_tokens: 5, total_tokens: 15 });
        total.add(&Usage { prompt_tokens: 1, completion_tokens: 2, total_tokens: 3 });
        assert_eq!(total.prompt_tokens, 11);
        assert_eq!(total.completion_tokens, 7);
        assert_eq!(total.total_tokens, 18);
    }

    #[test]
    fn tool_message_carries_record() {
        let record = ToolCallRecord {
            tool: "read_file".into(),
            params: Params::new(),
            result: "hello".into(),
            duration_ms: 4,
            success: true,
        };
        let msg = SessionMessage::tool(record);
        assert!(msg.is_tool());
        assert_eq!(msg.content, "hello");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""duration_ms":4"#));
    }

    #[test]
    fn statuses_use_snake_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, r#""in_progress""#);
        assert_eq!(TaskStatus::Completed.marker(), "[x]");
    }

    #[test]
    fn preferences_fill_defaults() {
        let prefs: Preferences = serde_json::from_str("{}").unwrap();
        assert!(prefs.auto_load_context);
        assert_eq!(prefs.max_history_length, 100);
    }

    #[test]
    fn session_metadata_counts_messages() {
        let mut session = Session::new("s1", Some("work".into()));
        session.messages.push(SessionMessage::new("user", "hi"));
        let meta = session.metadata();
        assert_eq!(meta.message_count, 1);
        assert_eq!(meta.name, "work");
    }
}
