// src/mcp/resources.rs
// Widget resources for openai UI mode: HTML templates shipped alongside the
// binary, referenced by tools through `openai/outputTemplate` metadata.

use super::ActorsMcpServer;
use crate::config::UiMode;
use rmcp::{
    ErrorData,
    model::{
        AnnotateAble, Annotated, ListResourceTemplatesResult, ListResourcesResult,
        PaginatedRequestParams, RawResource, ReadResourceRequestParams, ReadResourceResult,
        ResourceContents,
    },
    service::{RequestContext, RoleServer},
};
use std::path::PathBuf;

const WIDGET_URI_PREFIX: &str = "ui://widget/";

/// Helper to wrap a raw resource without annotations.
fn no_ann<T: AnnotateAble>(raw: T) -> Annotated<T> {
    Annotated::new(raw, None)
}

/// Directory holding widget templates: `widgets/` next to the executable.
fn widget_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    Some(exe.parent()?.join("widgets"))
}

/// Enumerate available widget files. Missing directory means no widgets;
/// that is normal outside packaged builds.
fn widget_files() -> Vec<String> {
    let Some(dir) = widget_dir() else {
        return Vec::new();
    };
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };
    let mut files: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(".html"))
        .collect();
    files.sort();
    files
}

impl ActorsMcpServer {
    /// Handle `resources/list`. Only openai mode exposes widgets.
    pub(super) async fn handle_list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        let resources = if self.state.config.ui_mode == UiMode::Openai {
            widget_files()
                .into_iter()
                .map(|file| {
                    no_ann(RawResource {
                        uri: format!("{WIDGET_URI_PREFIX}{file}"),
                        name: file.trim_end_matches(".html").to_string(),
                        title: None,
                        description: Some("Widget template for UI hosts".into()),
                        mime_type: Some("text/html".into()),
                        size: None,
                        icons: None,
                        meta: None,
                    })
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(ListResourcesResult {
            resources,
            next_cursor: None,
            meta: None,
        })
    }

    /// Handle `resources/templates/list`. No parameterized resources exist.
    pub(super) async fn handle_list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, ErrorData> {
        Ok(ListResourceTemplatesResult {
            resource_templates: Vec::new(),
            next_cursor: None,
            meta: None,
        })
    }

    /// Handle `resources/read` for widget URIs.
    pub(super) async fn handle_read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        let uri = request.uri;
        let Some(file) = uri.strip_prefix(WIDGET_URI_PREFIX) else {
            return Err(ErrorData::invalid_params(
                format!("Unknown resource URI: {uri}"),
                None,
            ));
        };
        // Widget names are flat files; reject anything that walks the tree
        if file.contains('/') || file.contains("..") {
            return Err(ErrorData::invalid_params(
                format!("Invalid widget name: {file}"),
                None,
            ));
        }

        let path = widget_dir()
            .map(|dir| dir.join(file))
            .filter(|path| path.is_file())
            .ok_or_else(|| {
                ErrorData::invalid_params(format!("Widget not found: {file}"), None)
            })?;

        let text = std::fs::read_to_string(&path)
            .map_err(|e| ErrorData::internal_error(format!("Failed to read widget: {e}"), None))?;

        Ok(ReadResourceResult {
            contents: vec![ResourceContents::TextResourceContents {
                uri,
                mime_type: Some("text/html".into()),
                text,
                meta: None,
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widget_uri_prefix_parsing() {
        assert_eq!(
            "ui://widget/store-search.html".strip_prefix(WIDGET_URI_PREFIX),
            Some("store-search.html")
        );
        assert!("apify://other".strip_prefix(WIDGET_URI_PREFIX).is_none());
    }
}
