// src/tasks.rs
// Long-running task store: session-isolated lifecycle state.
//
// State machine: submitted -> working -> completed | failed | cancelled.
// Terminal states are absorbing; results may only be written in completed or
// failed. Every operation is scoped by session id: records written under one
// session are invisible to another.

use crate::error::{Result, ServerError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Page size for task listings.
const LIST_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Submitted,
    Working,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Submitted => "submitted",
            TaskStatus::Working => "working",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub session_id: String,
    pub tool_name: String,
    pub status: TaskStatus,
    pub created_at: String,
    pub ttl_secs: Option<u64>,
    pub status_message: Option<String>,
    /// Present only in `completed` or `failed`.
    pub result: Option<Value>,
    /// The original call request, kept for diagnostics.
    pub request: Value,
}

/// Persistence interface for long-running tasks. Stdio deployments use the
/// in-memory store below; HTTP deployments may plug an external one.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create a task in `submitted` state and return the record.
    async fn create_task(
        &self,
        session_id: &str,
        tool_name: &str,
        request: Value,
        ttl_secs: Option<u64>,
    ) -> Result<TaskRecord>;

    async fn get_task(&self, task_id: &str, session_id: &str) -> Result<Option<TaskRecord>>;

    /// Transition task status. Transitions out of a terminal state are
    /// rejected; callers must check for cancellation first.
    async fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        message: Option<String>,
        session_id: &str,
    ) -> Result<()>;

    /// Write the result together with a terminal status (`completed` or
    /// `failed`). Idempotent on repeated same-value writes.
    async fn store_task_result(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Value,
        session_id: &str,
    ) -> Result<()>;

    /// Fetch the result payload. Errors while the task is not in a
    /// result-bearing terminal state.
    async fn get_task_result(&self, task_id: &str, session_id: &str) -> Result<Value>;

    /// List the session's tasks, newest first, with an opaque cursor.
    async fn list_tasks(
        &self,
        cursor: Option<&str>,
        session_id: &str,
    ) -> Result<(Vec<TaskRecord>, Option<String>)>;

    /// Cancel a non-terminal task.
    async fn cancel_task(
        &self,
        task_id: &str,
        message: Option<String>,
        session_id: &str,
    ) -> Result<TaskRecord>;

    /// Poll-check used by execution code before `working` and before any
    /// result write.
    async fn is_cancelled(&self, task_id: &str, session_id: &str) -> Result<bool> {
        Ok(self
            .get_task(task_id, session_id)
            .await?
            .is_some_and(|t| t.status == TaskStatus::Cancelled))
    }
}

/// In-memory task store for single-process deployments.
#[derive(Default)]
pub struct InMemoryTaskStore {
    records: Mutex<HashMap<(String, String), TaskRecord>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(session_id: &str, task_id: &str) -> (String, String) {
        (session_id.to_string(), task_id.to_string())
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task(
        &self,
        session_id: &str,
        tool_name: &str,
        request: Value,
        ttl_secs: Option<u64>,
    ) -> Result<TaskRecord> {
        let record = TaskRecord {
            task_id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            tool_name: tool_name.to_string(),
            status: TaskStatus::Submitted,
            created_at: chrono::Utc::now().to_rfc3339(),
            ttl_secs,
            status_message: None,
            result: None,
            request,
        };
        let mut records = self.records.lock().await;
        records.insert(Self::key(session_id, &record.task_id), record.clone());
        Ok(record)
    }

    async fn get_task(&self, task_id: &str, session_id: &str) -> Result<Option<TaskRecord>> {
        let records = self.records.lock().await;
        Ok(records.get(&Self::key(session_id, task_id)).cloned())
    }

    async fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        message: Option<String>,
        session_id: &str,
    ) -> Result<()> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(&Self::key(session_id, task_id))
            .ok_or_else(|| ServerError::NotFound(format!("task '{task_id}' not found")))?;

        if record.status.is_terminal() {
            return Err(ServerError::TaskState(format!(
                "task '{}' is already {}",
                task_id,
                record.status.as_str()
            )));
        }
        record.status = status;
        if message.is_some() {
            record.status_message = message;
        }
        Ok(())
    }

    async fn store_task_result(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Value,
        session_id: &str,
    ) -> Result<()> {
        if !matches!(status, TaskStatus::Completed | TaskStatus::Failed) {
            return Err(ServerError::TaskState(format!(
                "results may only be stored with a completed or failed status, got {}",
                status.as_str()
            )));
        }
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(&Self::key(session_id, task_id))
            .ok_or_else(|| ServerError::NotFound(format!("task '{task_id}' not found")))?;

        if record.status.is_terminal() {
            // Repeating the same terminal write is a no-op; anything else is
            // a forbidden transition.
            if record.status == status && record.result.as_ref() == Some(&result) {
                return Ok(());
            }
            return Err(ServerError::TaskState(format!(
                "task '{}' is already {}",
                task_id,
                record.status.as_str()
            )));
        }
        record.status = status;
        record.result = Some(result);
        Ok(())
    }

    async fn get_task_result(&self, task_id: &str, session_id: &str) -> Result<Value> {
        let records = self.records.lock().await;
        let record = records
            .get(&Self::key(session_id, task_id))
            .ok_or_else(|| ServerError::NotFound(format!("task '{task_id}' not found")))?;

        if !matches!(record.status, TaskStatus::Completed | TaskStatus::Failed) {
            return Err(ServerError::TaskState(format!(
                "task '{}' is not completed yet (status: {})",
                task_id,
                record.status.as_str()
            )));
        }
        record
            .result
            .clone()
            .ok_or_else(|| ServerError::TaskState(format!("task '{task_id}' has no result")))
    }

    async fn list_tasks(
        &self,
        cursor: Option<&str>,
        session_id: &str,
    ) -> Result<(Vec<TaskRecord>, Option<String>)> {
        let records = self.records.lock().await;
        let mut session_tasks: Vec<TaskRecord> = records
            .values()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect();
        // Newest first; rfc3339 sorts lexicographically, ids break ties
        session_tasks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.task_id.cmp(&a.task_id))
        });

        let offset: usize = cursor
            .map(|c| {
                c.parse().map_err(|_| {
                    ServerError::InvalidInput(format!("invalid task list cursor: {c:?}"))
                })
            })
            .transpose()?
            .unwrap_or(0);

        let page: Vec<TaskRecord> = session_tasks
            .iter()
            .skip(offset)
            .take(LIST_PAGE_SIZE)
            .cloned()
            .collect();
        let next_cursor = if offset + page.len() < session_tasks.len() {
            Some((offset + page.len()).to_string())
        } else {
            None
        };
        Ok((page, next_cursor))
    }

    async fn cancel_task(
        &self,
        task_id: &str,
        message: Option<String>,
        session_id: &str,
    ) -> Result<TaskRecord> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(&Self::key(session_id, task_id))
            .ok_or_else(|| ServerError::NotFound(format!("task '{task_id}' not found")))?;

        if record.status.is_terminal() {
            return Err(ServerError::TaskState(format!(
                "task '{}' is already {}",
                task_id,
                record.status.as_str()
            )));
        }
        record.status = TaskStatus::Cancelled;
        record.status_message =
            Some(message.unwrap_or_else(|| "cancelled by client".to_string()));
        Ok(record.clone())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store_with_task(session: &str) -> (InMemoryTaskStore, String) {
        let store = InMemoryTaskStore::new();
        let task = store
            .create_task(session, "call-actor", json!({ "actor": "apify/rag-web-browser" }), None)
            .await
            .unwrap();
        (store, task.task_id)
    }

    #[tokio::test]
    async fn test_create_starts_submitted() {
        let (store, id) = store_with_task("s1").await;
        let task = store.get_task(&id, "s1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Submitted);
        assert!(task.result.is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_to_completed() {
        let (store, id) = store_with_task("s1").await;
        store
            .update_task_status(&id, TaskStatus::Working, None, "s1")
            .await
            .unwrap();
        store
            .store_task_result(&id, TaskStatus::Completed, json!({ "ok": true }), "s1")
            .await
            .unwrap();

        let result = store.get_task_result(&id, "s1").await.unwrap();
        assert_eq!(result, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn test_terminal_states_are_absorbing() {
        let (store, id) = store_with_task("s1").await;
        store
            .cancel_task(&id, Some("client cancelled".into()), "s1")
            .await
            .unwrap();

        // No transition leaves a terminal state
        assert!(
            store
                .update_task_status(&id, TaskStatus::Working, None, "s1")
                .await
                .is_err()
        );
        assert!(
            store
                .store_task_result(&id, TaskStatus::Completed, json!(1), "s1")
                .await
                .is_err()
        );
        assert!(store.cancel_task(&id, None, "s1").await.is_err());

        let task = store.get_task(&id, "s1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert!(task.result.is_none());
    }

    #[tokio::test]
    async fn test_competing_terminal_writers_resolve_to_one() {
        // completed first, cancel second
        let (store, id) = store_with_task("s1").await;
        store
            .store_task_result(&id, TaskStatus::Completed, json!(1), "s1")
            .await
            .unwrap();
        assert!(store.cancel_task(&id, None, "s1").await.is_err());
        let task = store.get_task(&id, "s1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);

        // cancel first, completed second
        let (store, id) = store_with_task("s1").await;
        store.cancel_task(&id, None, "s1").await.unwrap();
        assert!(
            store
                .store_task_result(&id, TaskStatus::Completed, json!(1), "s1")
                .await
                .is_err()
        );
        let task = store.get_task(&id, "s1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_result_write_is_idempotent() {
        let (store, id) = store_with_task("s1").await;
        store
            .store_task_result(&id, TaskStatus::Failed, json!({ "error": "boom" }), "s1")
            .await
            .unwrap();
        // Same-value repeat is accepted
        store
            .store_task_result(&id, TaskStatus::Failed, json!({ "error": "boom" }), "s1")
            .await
            .unwrap();
        // Different value is not
        assert!(
            store
                .store_task_result(&id, TaskStatus::Failed, json!({ "error": "other" }), "s1")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_result_only_with_terminal_status() {
        let (store, id) = store_with_task("s1").await;
        assert!(
            store
                .store_task_result(&id, TaskStatus::Working, json!(1), "s1")
                .await
                .is_err()
        );
        assert!(
            store
                .store_task_result(&id, TaskStatus::Cancelled, json!(1), "s1")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_cancelled_task_has_no_payload() {
        let (store, id) = store_with_task("s1").await;
        store.cancel_task(&id, None, "s1").await.unwrap();

        let err = store.get_task_result(&id, "s1").await.unwrap_err();
        assert!(err.to_string().contains("not completed yet"));
    }

    #[tokio::test]
    async fn test_session_isolation() {
        let (store, id) = store_with_task("session-a").await;

        // Invisible from another session, for every operation
        assert!(store.get_task(&id, "session-b").await.unwrap().is_none());
        assert!(store.get_task_result(&id, "session-b").await.is_err());
        assert!(store.cancel_task(&id, None, "session-b").await.is_err());
        let (tasks, _) = store.list_tasks(None, "session-b").await.unwrap();
        assert!(tasks.is_empty());

        let (tasks, _) = store.list_tasks(None, "session-a").await.unwrap();
        assert_eq!(tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let store = InMemoryTaskStore::new();
        for _ in 0..25 {
            store
                .create_task("s1", "call-actor", json!({}), None)
                .await
                .unwrap();
        }

        let (page1, cursor) = store.list_tasks(None, "s1").await.unwrap();
        assert_eq!(page1.len(), 20);
        let cursor = cursor.expect("more pages");

        let (page2, cursor2) = store.list_tasks(Some(&cursor), "s1").await.unwrap();
        assert_eq!(page2.len(), 5);
        assert!(cursor2.is_none());
    }

    #[tokio::test]
    async fn test_is_cancelled_helper() {
        let (store, id) = store_with_task("s1").await;
        assert!(!store.is_cancelled(&id, "s1").await.unwrap());
        store.cancel_task(&id, None, "s1").await.unwrap();
        assert!(store.is_cancelled(&id, "s1").await.unwrap());
    }
}
