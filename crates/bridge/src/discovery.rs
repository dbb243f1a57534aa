//! Backend server discovery.
//!
//! With a backend configuration, discovery is authoritative: the configured names, in order.
//! Without one, the gateway's root `openapi.json` is queried and `[name]` tokens are extracted
//! from `info.description`. That fallback depends on the gateway's free-text description
//! convention and is best-effort only.

use crate::config::McpConfig;
use crate::error::{BridgeError, Result};
use mcpo_openapi_tools::OpenApiDocument;
use regex::Regex;
use reqwest::Client;
use std::sync::LazyLock;

/// Matches `[time]`, `[file-system]`, `[some-123_name]`.
static SERVER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([\w-]+)\]").expect("server token pattern compiles"));

/// Highest status code still treated as "gateway ready" by the metadata fallback.
const MAX_READY_STATUS: u16 = 210;

/// List backend server names.
///
/// # Errors
///
/// Only the fallback path can fail: transport errors, a status above 210, or an unparsable
/// metadata document.
pub async fn discover_servers(
    config: Option<&McpConfig>,
    client: &Client,
    base_url: &str,
) -> Result<Vec<String>> {
    if let Some(config) = config {
        return Ok(config.server_names());
    }

    let url = format!("{}/openapi.json", base_url.trim_end_matches('/'));
    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| BridgeError::Http(format!("failed to query {url}: {e}")))?;

    let status = resp.status().as_u16();
    if status > MAX_READY_STATUS {
        return Err(BridgeError::GatewayNotReady { url, status });
    }

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| BridgeError::Http(format!("failed to read {url}: {e}")))?;
    let doc = OpenApiDocument::from_slice(&bytes, &url)
        .map_err(|e| BridgeError::Http(e.to_string()))?;

    let names = server_names_from_description(doc.description());
    tracing::debug!(?names, "Discovered servers from gateway description");
    Ok(names)
}

/// Extract `[name]` tokens in order of appearance.
#[must_use]
pub fn server_names_from_description(description: &str) -> Vec<String> {
    SERVER_TOKEN
        .captures_iter(description)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}
