//! No-op store: disables persistence entirely.

use async_trait::async_trait;
use codeloop_core::error::StorageError;
use codeloop_core::session::{
    CurrentState, Plan, Preferences, Session, SessionMessage, SessionMetadata, SessionStore,
    TaskStatus, TokenUsage,
};
use uuid::Uuid;

/// A store that keeps nothing. Sessions it creates exist only for the caller.
pub struct NoopStore;

#[async_trait]
impl SessionStore for NoopStore {
    fn name(&self) -> &str {
        "none"
    }

    async fn create_session(&self, name: Option<&str>) -> Result<Session, StorageError> {
        Ok(Session::new(Uuid::new_v4().to_string(), name.map(str::to_string)))
    }

    async fn get_session(&self, id: &str) -> Result<Session, StorageError> {
        Err(StorageError::SessionNotFound(id.to_string()))
    }

    async fn get_active_session(&self) -> Result<Option<Session>, StorageError> {
        Ok(None)
    }

    async fn set_active_session(&self, id: &str) -> Result<(), StorageError> {
        Err(StorageError::SessionNotFound(id.to_string()))
    }

    async fn add_message(&self, _session_id: &str, _message: SessionMessage) -> Result<(), StorageError> {
        Ok(())
    }

    async fn remove_last_messages(&self, _session_id: &str, _count: usize) -> Result<(), StorageError> {
        Ok(())
    }

    async fn update_usage(&self, _session_id: &str, _usage: TokenUsage) -> Result<(), StorageError> {
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionMetadata>, StorageError> {
        Ok(Vec::new())
    }

    async fn create_plan(&self, _title: &str, _tasks: &[String]) -> Result<Plan, StorageError> {
        Err(StorageError::NoActivePlan)
    }

    async fn get_active_plan(&self) -> Result<Option<Plan>, StorageError> {
        Ok(None)
    }

    async fn update_task_status(&self, _task_id: &str, _status: TaskStatus) -> Result<(), StorageError> {
        Err(StorageError::NoActivePlan)
    }

    async fn archive_plan(&self, _plan_id: &str) -> Result<(), StorageError> {
        Err(StorageError::NoActivePlan)
    }

    async fn current_state(&self) -> Result<CurrentState, StorageError> {
        Ok(CurrentState::default())
    }

    async fn update_current_state(&self, _state: CurrentState) -> Result<(), StorageError> {
        Ok(())
    }

    async fn preferences(&self) -> Result<Preferences, StorageError> {
        Ok(Preferences::default())
    }

    async fn save_preferences(&self, _prefs: Preferences) -> Result<(), StorageError> {
        Ok(())
    }
}
