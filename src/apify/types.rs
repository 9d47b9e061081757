// src/apify/types.rs
// Wire types for the Apify REST API (v2)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Platform ceiling for run memory, in megabytes.
pub const MAX_RUN_MEMORY_MBYTES: u32 = 32_768;

/// Floor for run memory, in megabytes.
pub const MIN_RUN_MEMORY_MBYTES: u32 = 128;

/// An Actor as returned by `GET /v2/acts/{id}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub username: String,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Standby path under which the Actor serves MCP over HTTP, if any.
    pub web_server_mcp_path: Option<String>,
    pub default_run_options: Option<RunOptions>,
    pub stats: Option<ActorStats>,
}

impl Actor {
    /// Full name in `owner/name` form.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.username, self.name)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorStats {
    pub total_runs: Option<u64>,
    pub total_users: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    pub memory_mbytes: Option<u32>,
    pub timeout_secs: Option<u32>,
}

/// Terminal-aware run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum RunStatus {
    Ready,
    Running,
    Succeeded,
    Failed,
    Aborting,
    Aborted,
    TimingOut,
    TimedOut,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Aborted | RunStatus::TimedOut
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Ready => "READY",
            RunStatus::Running => "RUNNING",
            RunStatus::Succeeded => "SUCCEEDED",
            RunStatus::Failed => "FAILED",
            RunStatus::Aborting => "ABORTING",
            RunStatus::Aborted => "ABORTED",
            RunStatus::TimingOut => "TIMING-OUT",
            RunStatus::TimedOut => "TIMED-OUT",
        }
    }
}

/// An Actor run as returned by the runs endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: String,
    pub act_id: String,
    pub status: RunStatus,
    pub status_message: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub default_dataset_id: Option<String>,
    pub default_key_value_store_id: Option<String>,
    pub options: Option<RunOptions>,
}

/// Default build detail; carries the Actor definition with its input schema
/// and declared storage views.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    pub id: String,
    pub actor_definition: Option<ActorDefinition>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorDefinition {
    pub input: Option<Value>,
    pub storages: Option<Storages>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Storages {
    pub dataset: Option<DatasetSchema>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSchema {
    #[serde(default)]
    pub views: HashMap<String, DatasetView>,
}

/// A dataset view. Fields listed in `transformation.fields` or
/// `display.properties` are the ones the Actor author considers important.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetView {
    pub transformation: Option<ViewTransformation>,
    pub display: Option<ViewDisplay>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewTransformation {
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewDisplay {
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

impl DatasetSchema {
    /// Union of fields declared important by any view.
    pub fn important_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        for view in self.views.values() {
            if let Some(t) = &view.transformation {
                for f in &t.fields {
                    if !fields.contains(f) {
                        fields.push(f.clone());
                    }
                }
            }
            if let Some(d) = &view.display {
                for f in d.properties.keys() {
                    if !fields.contains(f) {
                        fields.push(f.clone());
                    }
                }
            }
        }
        fields
    }
}

/// A store search hit (trimmed to what the tools surface).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreActor {
    pub id: String,
    pub name: String,
    pub username: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub stats: Option<ActorStats>,
    pub current_pricing_info: Option<Value>,
}

/// Generic `{ "data": ... }` envelope every v2 endpoint uses.
#[derive(Debug, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

/// Paginated `{ "data": { "items": [...], ... } }` envelope.
#[derive(Debug, Deserialize)]
pub struct ListEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_status_terminal() {
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Aborted.is_terminal());
        assert!(RunStatus::TimedOut.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Ready.is_terminal());
        assert!(!RunStatus::Aborting.is_terminal());
    }

    #[test]
    fn test_run_status_wire_format() {
        let status: RunStatus = serde_json::from_value(json!("TIMED-OUT")).unwrap();
        assert_eq!(status, RunStatus::TimedOut);
        let status: RunStatus = serde_json::from_value(json!("RUNNING")).unwrap();
        assert_eq!(status, RunStatus::Running);
    }

    #[test]
    fn test_important_fields_union() {
        let schema: DatasetSchema = serde_json::from_value(json!({
            "views": {
                "overview": {
                    "transformation": { "fields": ["id", "title"] },
                    "display": { "properties": { "title": {}, "url": {} } }
                },
                "detail": {
                    "transformation": { "fields": ["id", "body"] }
                }
            }
        }))
        .unwrap();

        let mut fields = schema.important_fields();
        fields.sort();
        assert_eq!(fields, vec!["body", "id", "title", "url"]);
    }

    #[test]
    fn test_actor_full_name() {
        let actor: Actor = serde_json::from_value(json!({
            "id": "abc",
            "name": "rag-web-browser",
            "username": "apify"
        }))
        .unwrap();
        assert_eq!(actor.full_name(), "apify/rag-web-browser");
    }
}
