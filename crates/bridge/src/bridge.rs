//! [`ToolBridge`]: discovery, translation and dispatch against one gateway.

use crate::config::{McpConfig, gateway_base_url};
use crate::discovery;
use crate::dispatcher::{DispatchOutcome, Dispatcher, ToolArguments, ToolCall};
use crate::error::Result;
use crate::registry::ToolRegistry;
use crate::supervisor::GatewaySupervisor;
use mcpo_openapi_tools::ToolDefinition;
use reqwest::Client;
use std::sync::Arc;

/// Turns the gateway's backends into chat-model tools and routes calls back to them.
///
/// The tool list and routes are replaced as a whole by every [`ToolBridge::list_tools`] call.
/// When two backends produce the same canonical tool name the last one wins; the collision is
/// logged but not otherwise reported.
#[derive(Debug, Clone)]
pub struct ToolBridge {
    host: String,
    port: u16,
    config: Option<McpConfig>,
    client: Client,
    registry: Arc<ToolRegistry>,
    dispatcher: Dispatcher,
}

impl ToolBridge {
    /// `config` makes discovery authoritative; without it the gateway metadata is queried.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, config: Option<McpConfig>) -> Self {
        let client = Client::new();
        let registry = Arc::new(ToolRegistry::new());
        let dispatcher = Dispatcher::new(client.clone(), Arc::clone(&registry));
        Self {
            host: host.into(),
            port,
            config,
            client,
            registry,
            dispatcher,
        }
    }

    /// A bridge for the gateway a supervisor launches, sharing its backend configuration.
    #[must_use]
    pub fn for_supervisor(supervisor: &GatewaySupervisor) -> Self {
        let cfg = supervisor.config();
        Self::new(
            cfg.host.clone(),
            cfg.port,
            Some(supervisor.mcp_config().clone()),
        )
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        gateway_base_url(&self.host, self.port)
    }

    #[must_use]
    pub fn config(&self) -> Option<&McpConfig> {
        self.config.as_ref()
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// # Errors
    ///
    /// See [`discovery::discover_servers`]; the configured path never fails.
    pub async fn discover_servers(&self) -> Result<Vec<String>> {
        discovery::discover_servers(self.config.as_ref(), &self.client, &self.base_url()).await
    }

    /// Run a discovery pass and replace the registry with its result.
    ///
    /// Backends whose documents cannot be fetched contribute no tools. Concurrent calls on the
    /// same bridge run one after another.
    ///
    /// # Errors
    ///
    /// Only server discovery can fail (fallback path); translation failures are per backend.
    /// A failed pass leaves the registry empty.
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        let _guard = self.registry.discovery_guard().await;

        let servers = match self.discover_servers().await {
            Ok(servers) => servers,
            Err(e) => {
                self.registry.clear();
                tracing::warn!("Tool discovery failed, registry cleared: {e}");
                return Err(e);
            }
        };
        let base_url = self.base_url();
        let catalog = mcpo_openapi_tools::list_tools(&self.client, &base_url, &servers).await;
        tracing::info!(
            servers = servers.len(),
            tools = catalog.len(),
            "Tool discovery finished"
        );

        self.registry.replace(catalog);
        Ok(self.registry.tools())
    }

    /// Tools from the latest discovery pass.
    #[must_use]
    pub fn tools(&self) -> Vec<ToolDefinition> {
        self.registry.tools()
    }

    /// # Errors
    ///
    /// `InvalidArguments` or `UnknownTool`; dispatch failures come back as
    /// [`DispatchOutcome::Failed`].
    pub async fn call(
        &self,
        tool_name: &str,
        arguments: impl Into<ToolArguments>,
    ) -> Result<DispatchOutcome> {
        self.dispatcher.call(tool_name, arguments).await
    }

    /// # Errors
    ///
    /// Same as [`ToolBridge::call`].
    pub async fn call_tool(&self, call: &ToolCall) -> Result<DispatchOutcome> {
        self.dispatcher
            .call(&call.function.name, call.arguments())
            .await
    }

    /// Dispatch calls in order, stopping at the first caller error.
    ///
    /// # Errors
    ///
    /// The first `InvalidArguments` or `UnknownTool` encountered.
    pub async fn call_tools(&self, calls: &[ToolCall]) -> Result<Vec<DispatchOutcome>> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.call_tool(call).await?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, extract::Path};
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn backend_doc(path: &str) -> Value {
        json!({
            "openapi": "3.1.0",
            "info": {"title": "t", "version": "1"},
            "paths": {
                path: {"post": {
                    "description": "Echo",
                    "requestBody": {"content": {"application/json": {"schema": {
                        "type": "object",
                        "properties": {"x": {"type": "integer", "title": "X"}},
                        "required": ["x"]
                    }}}}
                }}
            }
        })
    }

    async fn gateway() -> (String, u16) {
        let router = Router::new()
            .route("/a/openapi.json", get(|| async { Json(backend_doc("/echo")) }))
            .route("/b/openapi.json", get(|| async { Json(backend_doc("/time")) }))
            .route(
                "/{server}/{op}",
                post(
                    |Path((server, op)): Path<(String, String)>, Json(body): Json<Value>| {
                        async move { Json(json!({"server": server, "op": op, "body": body})) }
                    },
                ),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        ("127.0.0.1".to_string(), port)
    }

    fn config(names: &[&str]) -> McpConfig {
        let servers: serde_json::Map<String, Value> = names
            .iter()
            .map(|n| ((*n).to_string(), json!({"command": "true"})))
            .collect();
        McpConfig::from_value(json!({ "mcpServers": servers })).unwrap()
    }

    #[tokio::test]
    async fn test_list_and_call() {
        let (host, port) = gateway().await;
        let bridge = ToolBridge::new(host, port, Some(config(&["a", "b"])));

        let tools = bridge.list_tools().await.unwrap();
        let names: Vec<_> = tools.iter().map(ToolDefinition::name).collect();
        assert_eq!(names, vec!["a_echo", "b_time"]);
        assert!(tools[0].function.parameters.properties["x"].get("title").is_none());

        let out = bridge
            .call_tool(&ToolCall::new("a_echo", json!({"x": 1})))
            .await
            .unwrap();
        assert_eq!(
            out.into_value(),
            json!({"server": "a", "op": "echo", "body": {"x": 1}})
        );
    }

    #[tokio::test]
    async fn test_missing_backend_is_skipped() {
        let (host, port) = gateway().await;
        let bridge = ToolBridge::new(host, port, Some(config(&["a", "missing"])));

        let tools = bridge.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert!(bridge.registry().resolve("a_echo").is_some());
    }

    #[tokio::test]
    async fn test_call_tools_stops_at_first_caller_error() {
        let (host, port) = gateway().await;
        let bridge = ToolBridge::new(host, port, Some(config(&["a"])));
        bridge.list_tools().await.unwrap();

        let ok = bridge
            .call_tools(&[
                ToolCall::new("a_echo", json!("{\"x\": 2}")),
                ToolCall::new("a_echo", json!({"x": 3})),
            ])
            .await
            .unwrap();
        assert_eq!(ok.len(), 2);
        assert!(ok.iter().all(DispatchOutcome::is_success));

        let err = bridge
            .call_tools(&[
                ToolCall::new("a_echo", json!({"x": 1})),
                ToolCall::new("nope", json!({})),
                ToolCall::new("a_echo", json!({"x": 1})),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_failed_discovery_clears_registry() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let router = Router::new()
            .route(
                "/openapi.json",
                get(move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                            Json(json!({
                                "openapi": "3.1.0",
                                "info": {"title": "gw", "version": "1", "description": "- [a]"},
                                "paths": {}
                            }))
                            .into_response()
                        } else {
                            StatusCode::SERVICE_UNAVAILABLE.into_response()
                        }
                    }
                }),
            )
            .route("/a/openapi.json", get(|| async { Json(backend_doc("/echo")) }))
            .route("/a/echo", post(|Json(body): Json<Value>| async move { Json(body) }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let bridge = ToolBridge::new("127.0.0.1", port, None);
        assert_eq!(bridge.list_tools().await.unwrap().len(), 1);
        assert!(bridge.registry().resolve("a_echo").is_some());

        let err = bridge.list_tools().await.unwrap_err();
        assert!(matches!(err, BridgeError::GatewayNotReady { status: 503, .. }));
        assert!(bridge.registry().is_empty());
        assert!(bridge.tools().is_empty());

        let err = bridge.call("a_echo", json!({"x": 1})).await.unwrap_err();
        assert!(matches!(err, BridgeError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_discovery_is_idempotent() {
        let (host, port) = gateway().await;
        let bridge = ToolBridge::new(host, port, Some(config(&["a", "b"])));

        bridge.list_tools().await.unwrap();
        let first = bridge.registry().snapshot();
        bridge.list_tools().await.unwrap();
        let second = bridge.registry().snapshot();
        assert_eq!(first.routes, second.routes);
        assert_eq!(first.tools, second.tools);
    }
}
