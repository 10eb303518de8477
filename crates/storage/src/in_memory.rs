//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use codeloop_core::error::StorageError;
use codeloop_core::session::{
    CurrentState, Plan, PlanStatus, Preferences, Session, SessionMessage, SessionMetadata,
    SessionStore, TaskStatus, TokenUsage,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::records;

#[derive(Default)]
struct State {
    sessions: HashMap<String, Session>,
    active_session_id: Option<String>,
    active_plan: Option<Plan>,
    archived: Vec<Plan>,
    current: CurrentState,
    prefs: Preferences,
}

/// A store that keeps everything in process memory.
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    /// Plans moved out by [`SessionStore::archive_plan`].
    pub async fn archived_plans(&self) -> Vec<Plan> {
        self.state.read().await.archived.clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_session(&self, name: Option<&str>) -> Result<Session, StorageError> {
        let session = Session::new(Uuid::new_v4().to_string(), name.map(str::to_string));
        let mut state = self.state.write().await;
        state.active_session_id = Some(session.id.clone());
        state.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<Session, StorageError> {
        self.state
            .read()
            .await
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::SessionNotFound(id.to_string()))
    }

    async fn get_active_session(&self) -> Result<Option<Session>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .active_session_id
            .as_ref()
            .and_then(|id| state.sessions.get(id))
            .cloned())
    }

    async fn set_active_session(&self, id: &str) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        if !state.sessions.contains_key(id) {
            return Err(StorageError::SessionNotFound(id.to_string()));
        }
        state.active_session_id = Some(id.to_string());
        Ok(())
    }

    async fn add_message(&self, session_id: &str, message: SessionMessage) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        let max = state.prefs.max_history_length;
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StorageError::SessionNotFound(session_id.to_string()))?;
        records::append_trimmed(session, message, max);
        Ok(())
    }

    async fn remove_last_messages(&self, session_id: &str, count: usize) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StorageError::SessionNotFound(session_id.to_string()))?;
        records::drop_last(session, count);
        Ok(())
    }

    async fn update_usage(&self, session_id: &str, usage: TokenUsage) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StorageError::SessionNotFound(session_id.to_string()))?;
        session.total_usage = Some(usage);
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionMetadata>, StorageError> {
        let state = self.state.read().await;
        let mut sessions: Vec<_> = state.sessions.values().map(Session::metadata).collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    async fn create_plan(&self, title: &str, tasks: &[String]) -> Result<Plan, StorageError> {
        let plan = records::new_plan(title, tasks);
        let mut state = self.state.write().await;
        state.current.active_plan_id = Some(plan.id.clone());
        state.current.active_task_id = plan.tasks.first().map(|t| t.id.clone());
        state.current.last_activity = Utc::now();
        state.active_plan = Some(plan.clone());
        Ok(plan)
    }

    async fn get_active_plan(&self) -> Result<Option<Plan>, StorageError> {
        Ok(self.state.read().await.active_plan.clone())
    }

    async fn update_task_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        let plan = state.active_plan.as_mut().ok_or(StorageError::NoActivePlan)?;
        records::set_task_status(plan, task_id, status)
    }

    async fn archive_plan(&self, plan_id: &str) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        let mut plan = state
            .active_plan
            .take_if(|p| p.id == plan_id)
            .ok_or(StorageError::NoActivePlan)?;
        plan.status = PlanStatus::Archived;
        plan.updated_at = Utc::now();
        state.archived.push(plan);
        state.current.active_plan_id = None;
        state.current.active_task_id = None;
        Ok(())
    }

    async fn current_state(&self) -> Result<CurrentState, StorageError> {
        Ok(self.state.read().await.current.clone())
    }

    async fn update_current_state(&self, current: CurrentState) -> Result<(), StorageError> {
        self.state.write().await.current = current;
        Ok(())
    }

    async fn preferences(&self) -> Result<Preferences, StorageError> {
        Ok(self.state.read().await.prefs.clone())
    }

    async fn save_preferences(&self, prefs: Preferences) -> Result<(), StorageError> {
        self.state.write().await.prefs = prefs;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_makes_session_active() {
        let store = InMemoryStore::new();
        let s = store.create_session(Some("scratch")).await.unwrap();
        let active = store.get_active_session().await.unwrap().unwrap();
        assert_eq!(active.id, s.id);
        assert_eq!(active.name.as_deref(), Some("scratch"));
    }

    #[tokio::test]
    async fn add_message_to_unknown_session_fails() {
        let store = InMemoryStore::new();
        let err = store
            .add_message("nope", SessionMessage::new("user", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn archive_moves_plan() {
        let store = InMemoryStore::new();
        let plan = store.create_plan("Plan", &["one".into()]).await.unwrap();
        assert!(store.archive_plan("other").await.is_err());
        assert!(store.get_active_plan().await.unwrap().is_some());

        store.archive_plan(&plan.id).await.unwrap();
        assert!(store.get_active_plan().await.unwrap().is_none());
        let archived = store.archived_plans().await;
        assert_eq!(archived[0].status, PlanStatus::Archived);
    }
}
