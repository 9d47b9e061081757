// src/mcp/mod.rs
// Server core: shared state, per-session server instances, and tool loading.

pub mod handler;
pub mod resources;

use crate::apify::ApifyClient;
use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::tasks::{InMemoryTaskStore, TaskStore};
use crate::telemetry::Telemetry;
use crate::tools::catalog;
use crate::tools::docs::DocsSearch;
use crate::tools::registry::ToolRegistry;
use rmcp::model::{LoggingLevel, LoggingMessageNotification, LoggingMessageNotificationParam};
use rmcp::service::{Peer, RoleServer};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// State shared by every session of one server instance. The registry is the
/// only tool-set mutation point; the task store is the only cross-request
/// mutable state beyond it.
pub struct ServerState {
    pub config: Config,
    /// Absent in unauthenticated mode.
    pub apify: Option<ApifyClient>,
    pub registry: ToolRegistry,
    pub docs: DocsSearch,
    pub task_store: Arc<dyn TaskStore>,
    pub telemetry: Option<Telemetry>,
    pub http: reqwest::Client,
}

impl ServerState {
    pub fn new(config: Config) -> Self {
        let http = crate::http::shared_client();
        let apify = config
            .token
            .clone()
            .map(|token| ApifyClient::new(http.clone(), Some(token)))
            .or_else(|| {
                // Without a token only documentation tools run, but public
                // read endpoints still work for tool loading.
                config
                    .allow_unauth
                    .then(|| ApifyClient::new(http.clone(), None))
            });
        let telemetry = Telemetry::from_config(&config.telemetry, http.clone());

        Self {
            apify,
            registry: ToolRegistry::new(),
            docs: DocsSearch::new(http.clone()),
            task_store: Arc::new(InMemoryTaskStore::new()),
            telemetry,
            http,
            config,
        }
    }

    /// Replace the task store (external stores for HTTP deployments).
    pub fn with_task_store(mut self, task_store: Arc<dyn TaskStore>) -> Self {
        self.task_store = task_store;
        self
    }

    /// The API client, or the soft failure every gated tool reports in
    /// unauthenticated mode.
    pub fn apify(&self) -> Result<&ApifyClient> {
        match &self.apify {
            Some(client) if client.has_token() => Ok(client),
            _ => Err(ServerError::Unauthorized(
                "this tool requires an Apify API token; set APIFY_TOKEN. \
                 Documentation tools work without one."
                    .to_string(),
            )),
        }
    }

    /// Resolve the configured selectors and fill the registry. Called once on
    /// startup; sessions share the resulting tool set.
    pub async fn load_tools(&self) -> Result<()> {
        let selection = catalog::resolve_selectors(
            self.config.tools.as_deref(),
            self.config.actors.as_deref(),
            self.config.ui_mode,
            self.config.enable_adding_actors,
        );
        debug!(
            internal = selection.internal.len(),
            actors = selection.actors.len(),
            "Resolved tool selection"
        );

        let mut entries = catalog::build_internal_tools(
            &selection,
            self.config.ui_mode,
            self.config.skyfire_mode,
        );
        entries.extend(catalog::load_actor_entries(self, &selection.actors).await);

        let count = entries.len();
        self.registry.upsert(entries, false).await;
        info!(tools = count, mode = self.config.ui_mode.as_str(), "Tools loaded");
        Ok(())
    }

    /// Teardown: drop the tool set.
    pub async fn close(&self) {
        self.registry.close().await;
    }
}

/// One MCP session. Cheap to clone; the heavy state is shared behind Arcs.
/// For stdio a single instance exists with a generated session id; the HTTP
/// transport builds one per session through the service factory.
#[derive(Clone)]
pub struct ActorsMcpServer {
    pub state: Arc<ServerState>,
    pub session_id: String,
    /// Current outbound log filter, set via logging/setLevel.
    log_level: Arc<RwLock<LoggingLevel>>,
    /// Cancellation tokens of in-flight task executions, keyed by task id.
    running_tasks: Arc<Mutex<HashMap<String, CancellationToken>>>,
    /// Client identity captured at initialize, for telemetry.
    client_info: Arc<RwLock<Option<rmcp::model::Implementation>>>,
    protocol_version: Arc<RwLock<Option<String>>>,
}

impl ActorsMcpServer {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self {
            state,
            session_id: uuid::Uuid::new_v4().to_string(),
            log_level: Arc::new(RwLock::new(LoggingLevel::Info)),
            running_tasks: Arc::new(Mutex::new(HashMap::new())),
            client_info: Arc::new(RwLock::new(None)),
            protocol_version: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn set_log_level(&self, level: LoggingLevel) {
        *self.log_level.write().await = level;
    }

    pub async fn remember_client(&self, info: rmcp::model::Implementation, protocol: String) {
        *self.client_info.write().await = Some(info);
        *self.protocol_version.write().await = Some(protocol);
    }

    pub async fn client_info(&self) -> (Option<String>, Option<String>, Option<String>) {
        let info = self.client_info.read().await;
        let protocol = self.protocol_version.read().await;
        (
            info.as_ref().map(|i| i.name.to_string()),
            info.as_ref().map(|i| i.version.to_string()),
            protocol.clone(),
        )
    }

    /// Send a logging message to the client unless the current level filters
    /// it out. Send failures are swallowed.
    pub async fn log_to_client(
        &self,
        peer: &Peer<RoleServer>,
        level: LoggingLevel,
        data: serde_json::Value,
    ) {
        let current = *self.log_level.read().await;
        if logging_level_rank(level) < logging_level_rank(current) {
            return;
        }
        let _ = peer
            .send_notification(
                LoggingMessageNotification::new(LoggingMessageNotificationParam {
                    level,
                    logger: Some("actors-mcp-server".to_string()),
                    data,
                })
                .into(),
            )
            .await;
    }

    // ── Running-task bookkeeping ─────────────────────────────────────────

    pub async fn register_running_task(&self, task_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.running_tasks
            .lock()
            .await
            .insert(task_id.to_string(), token.clone());
        token
    }

    pub async fn unregister_running_task(&self, task_id: &str) {
        self.running_tasks.lock().await.remove(task_id);
    }

    /// Fire the abort signal of an in-flight task, if any.
    pub async fn cancel_running_task(&self, task_id: &str) {
        if let Some(token) = self.running_tasks.lock().await.get(task_id) {
            token.cancel();
        }
    }
}

/// Severity rank per the MCP logging levels (syslog order).
pub fn logging_level_rank(level: LoggingLevel) -> u8 {
    match level {
        LoggingLevel::Debug => 0,
        LoggingLevel::Info => 1,
        LoggingLevel::Notice => 2,
        LoggingLevel::Warning => 3,
        LoggingLevel::Error => 4,
        LoggingLevel::Critical => 5,
        LoggingLevel::Alert => 6,
        LoggingLevel::Emergency => 7,
    }
}
