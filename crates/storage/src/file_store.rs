//! File-based store: pretty-printed JSON under `<project>/.codeloop/`.
//!
//! ```text
//! .codeloop/
//!   history/sessions.json        session index
//!   history/session_<id>.json    one file per session
//!   plans/active.json            the active plan
//!   plans/archive/plan_<id>.json archived plans
//!   state/current.json           active plan/task pointers
//!   state/preferences.json       per-project preferences
//! ```
//!
//! The index, state and preferences are cached in memory and written through
//! on every mutation. Sessions and plans are read from disk on demand. Each
//! write replaces one whole file.

use async_trait::async_trait;
use chrono::Utc;
use codeloop_core::error::StorageError;
use codeloop_core::session::{
    CurrentState, Plan, PlanStatus, Preferences, Session, SessionMessage, SessionMetadata,
    SessionStore, TaskStatus, TokenUsage,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::records;

/// Name of the per-project storage directory.
pub const STORAGE_DIR: &str = ".codeloop";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SessionIndex {
    #[serde(default)]
    active_session_id: String,
    #[serde(default)]
    sessions: Vec<SessionMetadata>,
}

struct Cache {
    index: SessionIndex,
    state: CurrentState,
    prefs: Preferences,
}

pub struct FileStore {
    root: PathBuf,
    cache: Mutex<Cache>,
}

fn io_err(path: &Path, e: impl std::fmt::Display) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

/// Read a JSON file. Missing files are `Ok(None)`.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(path, e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| StorageError::Serialization {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

/// Read a cached record, falling back to its default when absent or corrupt.
fn read_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match read_json(path) {
        Ok(Some(v)) => v,
        Ok(None) => T::default(),
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable storage file");
            T::default()
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|e| StorageError::Serialization {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    std::fs::write(path, json).map_err(|e| io_err(path, e))?;
    debug!(path = %path.display(), "Wrote storage file");
    Ok(())
}

impl FileStore {
    /// Open (creating if needed) the store for a project directory.
    pub fn open(project_dir: &Path) -> Result<Self, StorageError> {
        let root = project_dir.join(STORAGE_DIR);
        for sub in ["history", "plans", "plans/archive", "state"] {
            let dir = root.join(sub);
            std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }

        let cache = Cache {
            index: read_or_default(&root.join("history/sessions.json")),
            state: read_or_default(&root.join("state/current.json")),
            prefs: read_or_default(&root.join("state/preferences.json")),
        };
        debug!(
            root = %root.display(),
            sessions = cache.index.sessions.len(),
            "File store opened"
        );

        Ok(Self {
            root,
            cache: Mutex::new(cache),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("history/sessions.json")
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("history/session_{id}.json"))
    }

    fn active_plan_path(&self) -> PathBuf {
        self.root.join("plans/active.json")
    }

    fn archive_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("plans/archive/plan_{id}.json"))
    }

    fn state_path(&self) -> PathBuf {
        self.root.join("state/current.json")
    }

    fn prefs_path(&self) -> PathBuf {
        self.root.join("state/preferences.json")
    }

    fn load_session(&self, id: &str) -> Result<Session, StorageError> {
        read_json(&self.session_path(id))?.ok_or_else(|| StorageError::SessionNotFound(id.into()))
    }
}

#[async_trait]
impl SessionStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    fn location(&self) -> Option<PathBuf> {
        Some(self.root.clone())
    }

    async fn create_session(&self, name: Option<&str>) -> Result<Session, StorageError> {
        let mut cache = self.cache.lock().await;
        let session = Session::new(Uuid::new_v4().to_string(), name.map(str::to_string));
        write_json(&self.session_path(&session.id), &session)?;

        cache.index.sessions.push(session.metadata());
        cache.index.active_session_id = session.id.clone();
        write_json(&self.index_path(), &cache.index)?;

        debug!(session_id = %session.id, "Created session");
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<Session, StorageError> {
        let _guard = self.cache.lock().await;
        self.load_session(id)
    }

    async fn get_active_session(&self) -> Result<Option<Session>, StorageError> {
        let cache = self.cache.lock().await;
        let id = &cache.index.active_session_id;
        if id.is_empty() {
            return Ok(None);
        }
        match self.load_session(id) {
            Ok(session) => Ok(Some(session)),
            Err(StorageError::SessionNotFound(_)) => {
                warn!(session_id = %id, "Active session file is missing");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn set_active_session(&self, id: &str) -> Result<(), StorageError> {
        let mut cache = self.cache.lock().await;
        let session = self.load_session(id)?;
        if !cache.index.sessions.iter().any(|m| m.id == id) {
            cache.index.sessions.push(session.metadata());
        }
        cache.index.active_session_id = id.to_string();
        write_json(&self.index_path(), &cache.index)
    }

    async fn add_message(&self, session_id: &str, message: SessionMessage) -> Result<(), StorageError> {
        let mut cache = self.cache.lock().await;
        let mut session = self.load_session(session_id)?;
        records::append_trimmed(&mut session, message, cache.prefs.max_history_length);
        write_json(&self.session_path(session_id), &session)?;

        match cache.index.sessions.iter_mut().find(|m| m.id == session_id) {
            Some(meta) => {
                meta.updated_at = session.updated_at;
                meta.message_count = session.messages.len();
            }
            None => cache.index.sessions.push(session.metadata()),
        }
        write_json(&self.index_path(), &cache.index)
    }

    async fn remove_last_messages(&self, session_id: &str, count: usize) -> Result<(), StorageError> {
        let mut cache = self.cache.lock().await;
        let mut session = self.load_session(session_id)?;
        records::drop_last(&mut session, count);
        write_json(&self.session_path(session_id), &session)?;

        if let Some(meta) = cache.index.sessions.iter_mut().find(|m| m.id == session_id) {
            meta.updated_at = session.updated_at;
            meta.message_count = session.messages.len();
        }
        write_json(&self.index_path(), &cache.index)
    }

    async fn update_usage(&self, session_id: &str, usage: TokenUsage) -> Result<(), StorageError> {
        let _guard = self.cache.lock().await;
        let mut session = self.load_session(session_id)?;
        session.total_usage = Some(usage);
        write_json(&self.session_path(session_id), &session)
    }

    async fn list_sessions(&self) -> Result<Vec<SessionMetadata>, StorageError> {
        let cache = self.cache.lock().await;
        let mut sessions = cache.index.sessions.clone();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    async fn create_plan(&self, title: &str, tasks: &[String]) -> Result<Plan, StorageError> {
        let mut cache = self.cache.lock().await;
        let plan = records::new_plan(title, tasks);
        write_json(&self.active_plan_path(), &plan)?;

        cache.state.active_plan_id = Some(plan.id.clone());
        cache.state.active_task_id = plan.tasks.first().map(|t| t.id.clone());
        cache.state.last_activity = Utc::now();
        write_json(&self.state_path(), &cache.state)?;
        Ok(plan)
    }

    async fn get_active_plan(&self) -> Result<Option<Plan>, StorageError> {
        let _guard = self.cache.lock().await;
        read_json(&self.active_plan_path())
    }

    async fn update_task_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StorageError> {
        let _guard = self.cache.lock().await;
        let mut plan: Plan = read_json(&self.active_plan_path())?.ok_or(StorageError::NoActivePlan)?;
        records::set_task_status(&mut plan, task_id, status)?;
        write_json(&self.active_plan_path(), &plan)
    }

    async fn archive_plan(&self, plan_id: &str) -> Result<(), StorageError> {
        let mut cache = self.cache.lock().await;
        let mut plan: Plan = read_json(&self.active_plan_path())?
            .filter(|p: &Plan| p.id == plan_id)
            .ok_or(StorageError::NoActivePlan)?;

        plan.status = PlanStatus::Archived;
        plan.updated_at = Utc::now();
        write_json(&self.archive_path(&plan.id), &plan)?;

        let active = self.active_plan_path();
        std::fs::remove_file(&active).map_err(|e| io_err(&active, e))?;

        cache.state.active_plan_id = None;
        cache.state.active_task_id = None;
        cache.state.last_activity = Utc::now();
        write_json(&self.state_path(), &cache.state)
    }

    async fn current_state(&self) -> Result<CurrentState, StorageError> {
        Ok(self.cache.lock().await.state.clone())
    }

    async fn update_current_state(&self, state: CurrentState) -> Result<(), StorageError> {
        let mut cache = self.cache.lock().await;
        cache.state = state;
        cache.state.last_activity = Utc::now();
        write_json(&self.state_path(), &cache.state)
    }

    async fn preferences(&self) -> Result<Preferences, StorageError> {
        Ok(self.cache.lock().await.prefs.clone())
    }

    async fn save_preferences(&self, prefs: Preferences) -> Result<(), StorageError> {
        let mut cache = self.cache.lock().await;
        cache.prefs = prefs;
        write_json(&self.prefs_path(), &cache.prefs)
    }
}
