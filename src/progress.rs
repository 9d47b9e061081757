// src/progress.rs
// Progress tracking for tool calls: a monotonic counter of notifications plus
// an optional poller that follows a remote run.
//
// A tracker is single-owner: it belongs to the execution engine for one call
// and must be stopped on every exit path, including abort. Emission goes
// through a channel; the server core forwards updates to the MCP peer so the
// tracker itself stays transport-free.

use crate::apify::{ApifyClient, RunStatus};
use rmcp::model::ProgressToken;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::debug;

/// Fixed polling interval for remote run status; the remote API is poll-only.
pub const RUN_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// One progress notification, before it is bound to a token.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub progress: f64,
    pub message: Option<String>,
}

pub struct ProgressTracker {
    token: ProgressToken,
    /// When the call runs as a task, notifications carry the task relation.
    task_id: Option<String>,
    counter: AtomicU64,
    stopped: AtomicBool,
    tx: UnboundedSender<ProgressUpdate>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl ProgressTracker {
    /// Create a tracker and the receiving end of its update stream.
    pub fn new(
        token: ProgressToken,
        task_id: Option<String>,
    ) -> (std::sync::Arc<Self>, UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let tracker = std::sync::Arc::new(Self {
            token,
            task_id,
            counter: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            tx,
            poller: Mutex::new(None),
        });
        (tracker, rx)
    }

    pub fn token(&self) -> &ProgressToken {
        &self.token
    }

    /// Emit one notification with a monotonically increasing counter. Errors
    /// while emitting (receiver gone) are swallowed; a dead client must not
    /// fail the call.
    pub fn update_progress(&self, message: Option<String>) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        let progress = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let message = match (&self.task_id, message) {
            (Some(task_id), Some(msg)) => Some(format!("[task {task_id}] {msg}")),
            (Some(task_id), None) => Some(format!("[task {task_id}]")),
            (None, msg) => msg,
        };
        let _ = self.tx.send(ProgressUpdate {
            progress: progress as f64,
            message,
        });
    }

    /// Start polling a remote run, emitting only when `(status, statusMessage)`
    /// changes. The poll stops by itself on any terminal run status.
    pub fn start_run_updates(
        self: &std::sync::Arc<Self>,
        client: ApifyClient,
        run_id: String,
        actor_name: String,
    ) {
        let tracker = self.clone();
        let handle = tokio::spawn(async move {
            let mut last: Option<(RunStatus, Option<String>)> = None;
            loop {
                match client.get_run(&run_id).await {
                    Ok(run) => {
                        let current = (run.status, run.status_message.clone());
                        if should_emit(&last, &current) {
                            tracker.update_progress(Some(format_run_update(
                                &actor_name,
                                &current.0,
                                current.1.as_deref(),
                            )));
                            last = Some(current);
                        }
                        if run.status.is_terminal() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(run_id = %run_id, error = %e, "Run status poll failed");
                    }
                }
                tokio::time::sleep(RUN_POLL_INTERVAL).await;
            }
        });

        let mut slot = self.poller.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(handle);
    }

    /// Stop the tracker. Idempotent; called on every exit path of the
    /// execution engine. No notification is emitted after this returns.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let handle = {
            let mut slot = self.poller.lock().unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }

}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Emit only on a `(status, statusMessage)` change since the last poll.
fn should_emit(
    last: &Option<(RunStatus, Option<String>)>,
    current: &(RunStatus, Option<String>),
) -> bool {
    last.as_ref() != Some(current)
}

fn format_run_update(actor_name: &str, status: &RunStatus, message: Option<&str>) -> String {
    match message {
        Some(message) => format!("{actor_name}: {} - {message}", status.as_str()),
        None => format!("{actor_name}: {}", status.as_str()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> ProgressToken {
        serde_json::from_value(serde_json::json!("t1")).unwrap()
    }

    #[tokio::test]
    async fn test_counter_is_monotonic() {
        let (tracker, mut rx) = ProgressTracker::new(token(), None);
        tracker.update_progress(Some("one".into()));
        tracker.update_progress(None);
        tracker.update_progress(Some("three".into()));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let third = rx.recv().await.unwrap();
        assert_eq!(first.progress, 1.0);
        assert_eq!(second.progress, 2.0);
        assert_eq!(third.progress, 3.0);
        assert_eq!(first.message.as_deref(), Some("one"));
        assert_eq!(second.message, None);
    }

    #[tokio::test]
    async fn test_stop_silences_tracker() {
        let (tracker, mut rx) = ProgressTracker::new(token(), None);
        tracker.update_progress(Some("before".into()));
        tracker.stop();
        tracker.stop(); // idempotent
        tracker.update_progress(Some("after".into()));
        drop(tracker);

        assert_eq!(rx.recv().await.unwrap().message.as_deref(), Some("before"));
        // Channel closes without delivering the post-stop update
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_task_relation_in_message() {
        let (tracker, mut rx) =
            ProgressTracker::new(token(), Some("task-9".into()));
        tracker.update_progress(Some("working".into()));
        let update = rx.recv().await.unwrap();
        assert_eq!(update.message.as_deref(), Some("[task task-9] working"));
    }

    #[test]
    fn test_should_emit_dedups_identical_states() {
        let running = (RunStatus::Running, Some("crawling".to_string()));
        let mut last = None;

        // RUNNING, RUNNING, RUNNING, SUCCEEDED -> exactly two emissions
        let mut emitted = 0;
        for current in [
            running.clone(),
            running.clone(),
            running.clone(),
            (RunStatus::Succeeded, Some("done".to_string())),
        ] {
            if should_emit(&last, &current) {
                emitted += 1;
                last = Some(current);
            }
        }
        assert_eq!(emitted, 2);
    }

    #[test]
    fn test_should_emit_on_message_change_only() {
        let last = Some((RunStatus::Running, Some("page 1".to_string())));
        let current = (RunStatus::Running, Some("page 2".to_string()));
        assert!(should_emit(&last, &current));
    }

    #[test]
    fn test_format_run_update() {
        assert_eq!(
            format_run_update("apify/rag-web-browser", &RunStatus::Running, Some("crawling")),
            "apify/rag-web-browser: RUNNING - crawling"
        );
        assert_eq!(
            format_run_update("apify/rag-web-browser", &RunStatus::Succeeded, None),
            "apify/rag-web-browser: SUCCEEDED"
        );
    }
}
