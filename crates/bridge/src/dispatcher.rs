//! Tool call dispatch.
//!
//! Caller mistakes (unparsable arguments, unknown tool) are errors. Anything that goes wrong
//! once the request is on the wire (HTTP error status, timeout, refused connection, non-JSON
//! body) is a [`DispatchOutcome::Failed`] value, so a chat loop can hand the message back to
//! the model instead of aborting.

use crate::error::{BridgeError, Result};
use crate::registry::ToolRegistry;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

/// Tool call arguments as they arrive from a model: JSON text or an already-decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolArguments {
    Text(String),
    Value(Value),
}

impl From<&str> for ToolArguments {
    fn from(s: &str) -> Self {
        ToolArguments::Text(s.to_string())
    }
}

impl From<String> for ToolArguments {
    fn from(s: String) -> Self {
        ToolArguments::Text(s)
    }
}

impl From<Value> for ToolArguments {
    fn from(v: Value) -> Self {
        match v {
            Value::String(s) => ToolArguments::Text(s),
            Value::Null => ToolArguments::Value(json!({})),
            other => ToolArguments::Value(other),
        }
    }
}

impl ToolArguments {
    fn into_value(self, tool: &str) -> Result<Value> {
        match self {
            ToolArguments::Value(v) => Ok(v),
            ToolArguments::Text(s) => {
                serde_json::from_str(&s).map_err(|e| BridgeError::InvalidArguments {
                    tool: tool.to_string(),
                    reason: format!("{e}: {s}"),
                })
            }
        }
    }
}

/// Result of a dispatched call.
///
/// Serializes as the raw response body on success and as `{"error": "..."}` on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DispatchOutcome {
    Failed { error: String },
    Success(Value),
}

impl DispatchOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success(_))
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            DispatchOutcome::Success(v) => v,
            DispatchOutcome::Failed { error } => json!({ "error": error }),
        }
    }
}

/// A tool call envelope as emitted by chat models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON text or object; absent means `{}`.
    #[serde(default = "empty_arguments")]
    pub arguments: Value,
}

fn empty_arguments() -> Value {
    json!({})
}

impl ToolCall {
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            function: FunctionCall {
                name: name.into(),
                arguments,
            },
        }
    }

    #[must_use]
    pub fn arguments(&self) -> ToolArguments {
        ToolArguments::from(self.function.arguments.clone())
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: Client,
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(client: Client, registry: Arc<ToolRegistry>) -> Self {
        Self { client, registry }
    }

    /// Call a registered tool.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidArguments`] if text arguments are not JSON and
    /// [`BridgeError::UnknownTool`] if the tool is not registered. Network and HTTP failures are
    /// returned as [`DispatchOutcome::Failed`].
    pub async fn call(
        &self,
        tool_name: &str,
        arguments: impl Into<ToolArguments>,
    ) -> Result<DispatchOutcome> {
        let params = arguments.into().into_value(tool_name)?;
        let url = self
            .registry
            .resolve(tool_name)
            .ok_or_else(|| BridgeError::UnknownTool(tool_name.to_string()))?;

        tracing::debug!(tool = %tool_name, %url, "Dispatching tool call");
        let outcome = post_json(&self.client, &url, &params).await;
        if let DispatchOutcome::Failed { error } = &outcome {
            tracing::warn!(tool = %tool_name, %url, "Tool call failed: {error}");
        }
        Ok(outcome)
    }
}

/// POST `params` to `url` and decode the JSON response; never fails.
pub async fn post_json(client: &Client, url: &str, params: &Value) -> DispatchOutcome {
    let resp = match client
        .post(url)
        .json(params)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
    {
        Ok(resp) => resp,
        Err(e) => {
            return DispatchOutcome::Failed {
                error: e.to_string(),
            };
        }
    };

    let bytes = match resp.bytes().await {
        Ok(b) => b,
        Err(e) => {
            return DispatchOutcome::Failed {
                error: e.to_string(),
            };
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(body) => DispatchOutcome::Success(body),
        Err(e) => DispatchOutcome::Failed {
            error: format!("invalid JSON response from {url}: {e}"),
        },
    }
}
