// src/mcp/handler.rs
// MCP ServerHandler implementation: protocol lifecycle methods.

use super::ActorsMcpServer;
use crate::dispatch;
use crate::tasks::{TaskRecord, TaskStatus};
use crate::tools::TaskSupport;
use rmcp::{
    ErrorData, ServerHandler,
    model::{
        CallToolRequestParams, CallToolResult, CancelTaskParams, CreateTaskResult,
        GetPromptRequestParams, GetPromptResult, GetTaskInfoParams, GetTaskInfoResult,
        GetTaskResultParams, InitializeRequestParams, InitializeResult,
        ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult, ListTasksResult,
        ListToolsResult, PaginatedRequestParams, PromptsCapability, ReadResourceRequestParams,
        ReadResourceResult, ResourcesCapability, ServerCapabilities, ServerInfo,
        SetLevelRequestParams, Task, TaskResult as ModelTaskResult, TasksCapability,
        ToolsCapability,
    },
    service::{RequestContext, RoleServer},
};
use serde_json::Value;

/// Suggested client poll interval for task status, in milliseconds.
const TASK_POLL_INTERVAL_MS: u32 = 2_000;

fn to_wire_status(status: TaskStatus) -> rmcp::model::TaskStatus {
    match status {
        TaskStatus::Submitted => rmcp::model::TaskStatus::Submitted,
        TaskStatus::Working => rmcp::model::TaskStatus::Working,
        TaskStatus::Completed => rmcp::model::TaskStatus::Completed,
        TaskStatus::Failed => rmcp::model::TaskStatus::Failed,
        TaskStatus::Cancelled => rmcp::model::TaskStatus::Cancelled,
    }
}

fn to_wire_task(record: &TaskRecord) -> Task {
    Task {
        task_id: record.task_id.clone(),
        status: to_wire_status(record.status),
        status_message: record.status_message.clone(),
        created_at: record.created_at.clone(),
        last_updated_at: None,
        ttl: record.ttl_secs.map(|t| t * 1000),
        poll_interval: Some(TASK_POLL_INTERVAL_MS as u64),
    }
}

impl ServerHandler for ActorsMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut capabilities = ServerCapabilities::builder()
            .enable_tools()
            .enable_logging()
            .enable_tasks_with(TasksCapability::server_default())
            .build();
        capabilities.tools = Some(ToolsCapability {
            list_changed: Some(true),
            ..Default::default()
        });
        // Placeholders: declared so hosts can probe, served minimally
        capabilities.resources = Some(ResourcesCapability::default());
        capabilities.prompts = Some(PromptsCapability::default());

        ServerInfo {
            protocol_version: Default::default(),
            capabilities,
            server_info: rmcp::model::Implementation {
                name: "actors-mcp-server".into(),
                title: Some("Apify Actors MCP Server".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                description: None,
                icons: None,
                website_url: Some("https://apify.com".into()),
            },
            instructions: Some(
                "Exposes Apify Actors as tools. Workflow: store-search to discover \
                 Actors, fetch-actor-details for the input schema, call-actor to run \
                 one, get-actor-run to monitor, get-actor-output for results."
                    .into(),
            ),
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn initialize(
        &self,
        request: InitializeRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<InitializeResult, ErrorData>> + Send + '_ {
        async move {
            // Capture client identity for telemetry before answering
            let protocol = serde_json::to_value(&request.protocol_version)
                .ok()
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default();
            self.remember_client(request.client_info.clone(), protocol).await;
            Ok(self.get_info())
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        async move {
            let mut entries = self.state.registry.list().await;
            crate::tools::catalog::sort_for_listing(&mut entries);
            let tools = entries
                .iter()
                .map(|entry| entry.to_rmcp_tool(self.state.config.ui_mode))
                .collect();
            Ok(ListToolsResult {
                tools,
                next_cursor: None,
                meta: None,
            })
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        async move { dispatch::dispatch_call(self, request, context).await }
    }

    #[allow(clippy::manual_async_fn)]
    fn enqueue_task(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CreateTaskResult, ErrorData>> + Send + '_ {
        async move {
            let tool_name = request.name.to_string();
            let Some(entry) = self.state.registry.get(&tool_name).await else {
                return Err(ErrorData::invalid_params(
                    format!("unknown tool '{tool_name}'"),
                    None,
                ));
            };
            if entry.spec.task_support == TaskSupport::None {
                return Err(ErrorData::invalid_params(
                    format!("tool '{tool_name}' does not support task execution"),
                    None,
                ));
            }

            let args = request.arguments.clone().unwrap_or_default();
            if let Err(violations) = entry.validate_args(&Value::Object(args.clone())) {
                return Err(ErrorData::invalid_params(
                    format!("invalid arguments for '{}': {}", tool_name, violations.join("; ")),
                    None,
                ));
            }

            let progress = context
                .meta
                .get_progress_token()
                .map(|token| (token, context.peer.clone()));
            let record = dispatch::enqueue_tool_task(
                self,
                entry,
                args,
                &self.session_id,
                progress,
            )
            .await?;

            tracing::info!(
                task_id = %record.task_id,
                tool = %record.tool_name,
                "Created task"
            );
            Ok(CreateTaskResult {
                task: to_wire_task(&record),
            })
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn list_tasks(
        &self,
        request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListTasksResult, ErrorData>> + Send + '_ {
        async move {
            let cursor = request.and_then(|r| r.cursor);
            let (records, next_cursor) = self
                .state
                .task_store
                .list_tasks(cursor.as_deref(), &self.session_id)
                .await
                .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;

            Ok(ListTasksResult {
                tasks: records.iter().map(to_wire_task).collect(),
                next_cursor,
                total: None,
            })
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn get_task_info(
        &self,
        request: GetTaskInfoParams,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<GetTaskInfoResult, ErrorData>> + Send + '_ {
        async move {
            let record = self
                .state
                .task_store
                .get_task(&request.task_id, &self.session_id)
                .await
                .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;
            Ok(GetTaskInfoResult {
                task: record.as_ref().map(to_wire_task),
            })
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn get_task_result(
        &self,
        request: GetTaskResultParams,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ModelTaskResult, ErrorData>> + Send + '_ {
        async move {
            let payload = self
                .state
                .task_store
                .get_task_result(&request.task_id, &self.session_id)
                .await
                .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;

            let summary = payload
                .pointer("/content/0/text")
                .and_then(Value::as_str)
                .map(|text| crate::utils::truncate(text, 200));
            Ok(ModelTaskResult {
                content_type: "application/json".to_string(),
                value: payload,
                summary,
            })
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn cancel_task(
        &self,
        request: CancelTaskParams,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<(), ErrorData>> + Send + '_ {
        async move {
            self.state
                .task_store
                .cancel_task(
                    &request.task_id,
                    Some("cancelled by client".to_string()),
                    &self.session_id,
                )
                .await
                .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;

            // Best-effort abort of the in-flight execution
            self.cancel_running_task(&request.task_id).await;
            tracing::info!(task_id = %request.task_id, "Task cancelled");
            Ok(())
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn set_level(
        &self,
        request: SetLevelRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<(), ErrorData>> + Send + '_ {
        async move {
            self.set_log_level(request.level).await;
            Ok(())
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn list_resources(
        &self,
        request: Option<PaginatedRequestParams>,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, ErrorData>> + Send + '_
    {
        async move { self.handle_list_resources(request, context).await }
    }

    #[allow(clippy::manual_async_fn)]
    fn list_resource_templates(
        &self,
        request: Option<PaginatedRequestParams>,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourceTemplatesResult, ErrorData>> + Send + '_
    {
        async move { self.handle_list_resource_templates(request, context).await }
    }

    #[allow(clippy::manual_async_fn)]
    fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ReadResourceResult, ErrorData>> + Send + '_ {
        async move { self.handle_read_resource(request, context).await }
    }

    // Prompts are declared but not populated; hosts probing the capability
    // get an empty list instead of a method-not-found error.

    #[allow(clippy::manual_async_fn)]
    fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListPromptsResult, ErrorData>> + Send + '_ {
        async move {
            Ok(ListPromptsResult {
                prompts: Vec::new(),
                next_cursor: None,
                meta: None,
            })
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn get_prompt(
        &self,
        request: GetPromptRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<GetPromptResult, ErrorData>> + Send + '_ {
        async move {
            Err(ErrorData::invalid_params(
                format!("Unknown prompt: {}", request.name),
                None,
            ))
        }
    }
}
