//! Error types for the bridge.

use thiserror::Error;

/// Main error type for the bridge.
///
/// Dispatch failures (HTTP status, transport) are deliberately absent: they are returned as
/// [`crate::dispatcher::DispatchOutcome::Failed`] values.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration errors (invalid JSON/YAML, missing fields, no source given)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The gateway executable could not be launched
    #[error("Failed to launch gateway '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// `start` was called while a gateway is still owned by the supervisor
    #[error("Gateway is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    /// The gateway metadata endpoint answered with a not-ready status
    #[error("Gateway at {url} is not available or not ready (HTTP {status})")]
    GatewayNotReady { url: String, status: u16 },

    /// HTTP errors while talking to the gateway (discovery only)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Tool call arguments were not valid JSON
    #[error("Invalid JSON arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// Tool name not present in the registry
    #[error("Tool '{0}' not found in registry")]
    UnknownTool(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
