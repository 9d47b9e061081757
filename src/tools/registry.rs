// src/tools/registry.rs
// In-memory tool registry: name -> entry, with a change-notification hook.

use super::ToolEntry;
use crate::error::{Result, ServerError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Invoked with the post-image name set after a notifying mutation. The
/// server core uses this to mirror the tool set into shared state.
pub type ChangeHandler = Box<dyn Fn(Vec<String>) + Send + Sync>;

/// Registry of the tools visible to a server instance. Entries are owned by
/// value and treated as immutable; replacement happens via `upsert`.
#[derive(Default)]
pub struct ToolRegistry {
    entries: RwLock<HashMap<String, (u64, Arc<ToolEntry>)>>,
    /// Monotonic insertion counter; keeps `list()` in observation order.
    next_seq: Mutex<u64>,
    change_handler: std::sync::Mutex<Option<ChangeHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert-or-replace entries by name. When `notify` is set and at least
    /// one entry was written, the change handler fires exactly once with the
    /// post-image name set.
    pub async fn upsert(&self, tools: Vec<ToolEntry>, notify: bool) {
        if tools.is_empty() {
            return;
        }
        let names: Vec<String>;
        {
            let mut entries = self.entries.write().await;
            let mut seq = self.next_seq.lock().await;
            for tool in tools {
                let name = tool.name().to_string();
                // Replacement keeps the original observation position.
                let position = entries.get(&name).map(|(s, _)| *s).unwrap_or_else(|| {
                    *seq += 1;
                    *seq
                });
                entries.insert(name, (position, Arc::new(tool)));
            }
            names = Self::name_snapshot(&entries);
        }
        if notify {
            self.fire_change(names);
        }
    }

    /// Remove entries by name, returning the names actually removed.
    pub async fn remove(&self, names: &[String], notify: bool) -> Vec<String> {
        let removed: Vec<String>;
        let snapshot: Vec<String>;
        {
            let mut entries = self.entries.write().await;
            removed = names
                .iter()
                .filter(|name| entries.remove(*name).is_some())
                .cloned()
                .collect();
            snapshot = Self::name_snapshot(&entries);
        }
        if notify && !removed.is_empty() {
            self.fire_change(snapshot);
        }
        removed
    }

    pub async fn get(&self, name: &str) -> Option<Arc<ToolEntry>> {
        self.entries.read().await.get(name).map(|(_, e)| e.clone())
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    /// Current entries in observation order of insertion. The ordering is an
    /// implementation detail, not a contract; the listing layer re-sorts.
    pub async fn list(&self) -> Vec<Arc<ToolEntry>> {
        let entries = self.entries.read().await;
        let mut all: Vec<(u64, Arc<ToolEntry>)> = entries.values().cloned().collect();
        all.sort_by_key(|(seq, _)| *seq);
        all.into_iter().map(|(_, e)| e).collect()
    }

    pub async fn names(&self) -> Vec<String> {
        self.list().await.iter().map(|e| e.name().to_string()).collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop all entries (and their cached validators).
    pub async fn close(&self) {
        self.entries.write().await.clear();
    }

    /// Register the single change-handler slot. Registering twice is an error.
    pub fn register_change_handler(&self, handler: ChangeHandler) -> Result<()> {
        let mut slot = self
            .change_handler
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return Err(ServerError::Other(
                "a tool change handler is already registered".to_string(),
            ));
        }
        *slot = Some(handler);
        Ok(())
    }

    /// Unregister the change handler. Unregistering when absent is an error.
    pub fn unregister_change_handler(&self) -> Result<()> {
        let mut slot = self
            .change_handler
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if slot.take().is_none() {
            return Err(ServerError::Other(
                "no tool change handler is registered".to_string(),
            ));
        }
        Ok(())
    }

    fn fire_change(&self, names: Vec<String>) {
        let slot = self
            .change_handler
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(handler) = slot.as_ref() {
            handler(names);
        }
    }

    fn name_snapshot(entries: &HashMap<String, (u64, Arc<ToolEntry>)>) -> Vec<String> {
        let mut all: Vec<(u64, &String)> = entries.iter().map(|(n, (s, _))| (*s, n)).collect();
        all.sort_by_key(|(seq, _)| *seq);
        all.into_iter().map(|(_, n)| n.clone()).collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{TaskSupport, ToolKind, ToolSpec};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entry(name: &str) -> ToolEntry {
        ToolEntry::new(
            ToolSpec {
                name: name.to_string(),
                description: "test".to_string(),
                input_schema: json!({ "type": "object" }),
                output_schema: None,
                annotations: None,
                meta: None,
                task_support: TaskSupport::None,
            },
            ToolKind::Internal,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_on_names() {
        let registry = ToolRegistry::new();
        registry.upsert(vec![entry("a"), entry("b")], false).await;
        assert_eq!(registry.len().await, 2);

        // Repeated upserts for the same names leave size unchanged
        registry.upsert(vec![entry("a"), entry("b")], false).await;
        registry.upsert(vec![entry("b"), entry("c")], false).await;
        assert_eq!(registry.len().await, 3);
        assert_eq!(registry.names().await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_remove_returns_actually_removed() {
        let registry = ToolRegistry::new();
        registry.upsert(vec![entry("a"), entry("b")], false).await;

        let removed = registry
            .remove(&["a".to_string(), "ghost".to_string()], false)
            .await;
        assert_eq!(removed, vec!["a"]);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_change_handler_fires_once_per_mutation() {
        let registry = ToolRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        registry
            .register_change_handler(Box::new(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        registry.upsert(vec![entry("a"), entry("b")], true).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        registry.upsert(vec![entry("c")], false).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Removing nothing does not notify
        registry.remove(&["ghost".to_string()], true).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        registry.remove(&["a".to_string()], true).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_change_handler_single_slot() {
        let registry = ToolRegistry::new();
        assert!(registry.unregister_change_handler().is_err());

        registry.register_change_handler(Box::new(|_| {})).unwrap();
        assert!(registry.register_change_handler(Box::new(|_| {})).is_err());

        registry.unregister_change_handler().unwrap();
        assert!(registry.unregister_change_handler().is_err());
    }

    #[tokio::test]
    async fn test_close_drops_everything() {
        let registry = ToolRegistry::new();
        registry.upsert(vec![entry("a")], false).await;
        registry.close().await;
        assert!(registry.is_empty().await);
        assert!(registry.get("a").await.is_none());
    }

    #[tokio::test]
    async fn test_replacement_keeps_position() {
        let registry = ToolRegistry::new();
        registry.upsert(vec![entry("a"), entry("b")], false).await;
        registry.upsert(vec![entry("a")], false).await;
        assert_eq!(registry.names().await, vec!["a", "b"]);
    }
}
