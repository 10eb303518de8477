//! Record mutations shared by the stores.

use chrono::Utc;
use codeloop_core::error::StorageError;
use codeloop_core::session::{Plan, PlanStatus, Session, SessionMessage, Task, TaskStatus};
use uuid::Uuid;

/// Append a message, keeping only the newest `max_history` entries (0 = unbounded).
pub(crate) fn append_trimmed(session: &mut Session, message: SessionMessage, max_history: usize) {
    session.messages.push(message);
    if max_history > 0 && session.messages.len() > max_history {
        let excess = session.messages.len() - max_history;
        session.messages.drain(..excess);
    }
    session.updated_at = Utc::now();
}

pub(crate) fn drop_last(session: &mut Session, count: usize) {
    let keep = session.messages.len().saturating_sub(count);
    session.messages.truncate(keep);
    session.updated_at = Utc::now();
}

pub(crate) fn new_plan(title: &str, tasks: &[String]) -> Plan {
    let now = Utc::now();
    Plan {
        id: Uuid::new_v4().to_string(),
        title: title.to_string(),
        description: None,
        created_at: now,
        updated_at: now,
        status: PlanStatus::Active,
        tasks: tasks
            .iter()
            .map(|content| Task {
                id: Uuid::new_v4().to_string(),
                content: content.clone(),
                status: TaskStatus::Pending,
                created_at: now,
                completed_at: None,
                notes: None,
                sub_tasks: None,
            })
            .collect(),
    }
}

fn find_task<'a>(tasks: &'a mut [Task], task_id: &str) -> Option<&'a mut Task> {
    for task in tasks.iter_mut() {
        if task.id == task_id {
            return Some(task);
        }
        if let Some(subs) = task.sub_tasks.as_mut()
            && let Some(found) = find_task(subs, task_id)
        {
            return Some(found);
        }
    }
    None
}

/// Set a task's status; completing a task stamps `completed_at`.
pub(crate) fn set_task_status(
    plan: &mut Plan,
    task_id: &str,
    status: TaskStatus,
) -> Result<(), StorageError> {
    let now = Utc::now();
    let task = find_task(&mut plan.tasks, task_id)
        .ok_or_else(|| StorageError::TaskNotFound(task_id.to_string()))?;
    task.status = status;
    if status == TaskStatus::Completed {
        task.completed_at = Some(now);
    }
    plan.updated_at = now;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trimming_keeps_newest() {
        let mut session = Session::new("s", None);
        for i in 0..5 {
            append_trimmed(&mut session, SessionMessage::new("user", i.to_string()), 3);
        }
        let contents: Vec<_> = session.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["2", "3", "4"]);
    }

    #[test]
    fn drop_last_never_underflows() {
        let mut session = Session::new("s", None);
        for i in 0..3 {
            append_trimmed(&mut session, SessionMessage::new("user", i.to_string()), 0);
        }
        drop_last(&mut session, 2);
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].content, "0");
        drop_last(&mut session, 5);
        assert!(session.messages.is_empty());
    }

    #[test]
    fn zero_limit_is_unbounded() {
        let mut session = Session::new("s", None);
        for i in 0..5 {
            append_trimmed(&mut session, SessionMessage::new("user", i.to_string()), 0);
        }
        assert_eq!(session.messages.len(), 5);
    }

    #[test]
    fn completing_task_stamps_time() {
        let mut plan = new_plan("Ship", &["write".into(), "test".into()]);
        assert!(plan.tasks.iter().all(|t| t.status == TaskStatus::Pending));
        let id = plan.tasks[1].id.clone();
        set_task_status(&mut plan, &id, TaskStatus::Completed).unwrap();
        assert_eq!(plan.tasks[1].status, TaskStatus::Completed);
        assert!(plan.tasks[1].completed_at.is_some());
        assert!(plan.tasks[0].completed_at.is_none());
    }

    #[test]
    fn unknown_task_is_error() {
        let mut plan = new_plan("Ship", &["write".into()]);
        let err = set_task_status(&mut plan, "nope", TaskStatus::Skipped).unwrap_err();
        assert!(matches!(err, StorageError::TaskNotFound(_)));
    }
}
