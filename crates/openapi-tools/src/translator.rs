//! `OpenAPI` → function-tool translation.
//!
//! Each backend server behind the gateway publishes its own document at
//! `{base}/{server}/openapi.json`. Every path with a POST operation becomes one tool named
//! `{server}_{path segments joined by '_'}` whose dispatch URL is `{base}/{server}{path}`.
//!
//! Name collisions (two servers or two paths producing the same tool name) are resolved
//! last-write-wins: the later definition and route replace the earlier ones and a warning is
//! logged.

use crate::document::OpenApiDocument;
use crate::error::{OpenApiToolsError, Result};
use crate::resolver::LocalRefResolver;
use crate::tool::{ParametersSchema, ToolDefinition};
use reqwest::Client;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// One translated operation: the tool shown to the model and where calls to it go.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedTool {
    pub server: String,
    pub path: String,
    pub definition: ToolDefinition,
    pub dispatch_url: String,
}

/// The result of one discovery pass: tool definitions plus the name → dispatch URL routes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCatalog {
    tools: Vec<ToolDefinition>,
    routes: HashMap<String, String>,
    positions: HashMap<String, usize>,
}

impl ToolCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a translated tool, replacing any earlier tool with the same name.
    ///
    /// A replaced definition keeps the slot of the one it replaces.
    pub fn insert(&mut self, tool: TranslatedTool) {
        let name = tool.definition.name().to_string();
        if let Some(&idx) = self.positions.get(&name) {
            tracing::warn!(
                tool = %name,
                server = %tool.server,
                path = %tool.path,
                "duplicate tool name; later definition replaces the earlier one"
            );
            self.tools[idx] = tool.definition;
        } else {
            self.positions.insert(name.clone(), self.tools.len());
            self.tools.push(tool.definition);
        }
        self.routes.insert(name, tool.dispatch_url);
    }

    #[must_use]
    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    #[must_use]
    pub fn routes(&self) -> &HashMap<String, String> {
        &self.routes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    #[must_use]
    pub fn into_parts(self) -> (Vec<ToolDefinition>, HashMap<String, String>) {
        (self.tools, self.routes)
    }
}

impl Extend<TranslatedTool> for ToolCatalog {
    fn extend<I: IntoIterator<Item = TranslatedTool>>(&mut self, iter: I) {
        for tool in iter {
            self.insert(tool);
        }
    }
}

/// Build the canonical tool name for a server path.
///
/// Leading/trailing slashes are stripped and inner slashes become underscores:
/// `("time", "/get_current_time")` → `time_get_current_time`,
/// `("fs", "/dir/list/")` → `fs_dir_list`.
#[must_use]
pub fn canonical_tool_name(server: &str, path: &str) -> String {
    format!("{server}_{}", path.trim_matches('/').replace('/', "_"))
}

/// Drop `title` from every property and `description` where it is blank.
#[must_use]
pub fn clean_properties(props: &Map<String, Value>) -> Map<String, Value> {
    props
        .iter()
        .map(|(name, definition)| {
            let mut definition = definition.clone();
            if let Some(obj) = definition.as_object_mut() {
                obj.remove("title");
                let blank = obj
                    .get("description")
                    .and_then(Value::as_str)
                    .is_some_and(|d| d.trim().is_empty());
                if blank {
                    obj.remove("description");
                }
            }
            (name.clone(), definition)
        })
        .collect()
}

/// Translate every POST operation of one backend document.
#[must_use]
pub fn translate_document(
    server: &str,
    base_url: &str,
    doc: &OpenApiDocument,
) -> Vec<TranslatedTool> {
    let resolver = LocalRefResolver::new(doc);
    let base_url = base_url.trim_end_matches('/');

    doc.paths()
        .filter_map(|(path, item)| {
            let post = item.get("post")?;
            let description = post
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let parameters = request_parameters(&resolver, post);

            Some(TranslatedTool {
                server: server.to_string(),
                path: path.to_string(),
                definition: ToolDefinition::function(
                    canonical_tool_name(server, path),
                    description,
                    parameters,
                ),
                dispatch_url: format!("{base_url}/{server}{path}"),
            })
        })
        .collect()
}

fn request_parameters(resolver: &LocalRefResolver<'_>, post: &Value) -> ParametersSchema {
    let Some(body) = post.get("requestBody") else {
        return ParametersSchema::default();
    };
    let body = resolver.resolve(body);
    let Some(schema) = body
        .pointer("/content/application~1json/schema")
        .map(|s| resolver.resolve(s))
    else {
        return ParametersSchema::default();
    };

    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .map(clean_properties)
        .unwrap_or_default();
    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| {
            r.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    ParametersSchema {
        properties,
        required,
        ..ParametersSchema::default()
    }
}

/// Fetch and parse `{base_url}/{server}/openapi.json`.
///
/// # Errors
///
/// Returns an error on transport failure, non-2xx status, unreadable body, or unparsable
/// document.
pub async fn fetch_server_document(
    client: &Client,
    base_url: &str,
    server: &str,
) -> Result<OpenApiDocument> {
    let url = format!("{}/{server}/openapi.json", base_url.trim_end_matches('/'));
    tracing::debug!(%url, "Fetching OpenAPI spec");

    let resp = client
        .get(&url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| OpenApiToolsError::OpenApiSpecFetch {
            url: url.clone(),
            message: e.to_string(),
        })?;
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| OpenApiToolsError::OpenApiSpecReadBody {
            url: url.clone(),
            message: e.to_string(),
        })?;

    OpenApiDocument::from_slice(&bytes, &url)
}

/// Discover the tools of every named server.
///
/// Documents are fetched concurrently; a server whose document cannot be fetched or parsed is
/// logged and skipped, the rest are still translated. Results are merged in `server_names`
/// order, so collisions resolve in favor of the later server.
pub async fn list_tools(client: &Client, base_url: &str, server_names: &[String]) -> ToolCatalog {
    let fetches = server_names
        .iter()
        .map(|name| fetch_server_document(client, base_url, name));
    let documents = futures::future::join_all(fetches).await;

    let mut catalog = ToolCatalog::new();
    for (name, document) in server_names.iter().zip(documents) {
        match document {
            Ok(doc) => {
                let tools = translate_document(name, base_url, &doc);
                tracing::info!(server = %name, count = tools.len(), "Discovered tools");
                catalog.extend(tools);
            }
            Err(e) => {
                tracing::warn!(server = %name, "Failed to load tools: {e}");
            }
        }
    }
    catalog
}
