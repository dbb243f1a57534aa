//! Backend-server and supervisor configuration.
//!
//! The backend configuration is the Claude-Desktop style document the gateway itself consumes:
//!
//! ```json
//! {"mcpServers": {"time": {"command": "uvx", "args": ["mcp-server-time"]}}}
//! ```
//!
//! Server order is preserved (it drives discovery order). Keys the bridge does not understand
//! are kept and written back out verbatim when the supervisor materializes the config for the
//! gateway.

use crate::error::{BridgeError, Result};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the `npx` replacement used on Windows.
pub const WIN_NPX_PATH_ENV: &str = "WIN_NODEJS_NPX_PATH";

pub const DEFAULT_GATEWAY_PROGRAM: &str = "mcpo";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5090;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One backend tool server the gateway launches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendServerConfig {
    /// Key under `mcpServers`.
    #[serde(skip)]
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
    /// Anything else (`cwd`, `disabled`, ...) is passed through.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A validated, platform-normalized backend configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct McpConfig {
    servers: Vec<BackendServerConfig>,
    extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default, rename = "mcpServers")]
    mcp_servers: Map<String, Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl McpConfig {
    /// Parse, validate and normalize a configuration value.
    ///
    /// # Errors
    ///
    /// Returns a config error if `mcpServers` is malformed or a server has no command.
    pub fn from_value(value: Value) -> Result<Self> {
        Self::from_value_for(value, cfg!(windows), &windows_npx_path())
    }

    fn from_value_for(value: Value, is_windows: bool, npx_path: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_value(value)
            .map_err(|e| BridgeError::Config(format!("invalid MCP config: {e}")))?;

        let mut servers = Vec::with_capacity(raw.mcp_servers.len());
        for (name, server) in raw.mcp_servers {
            let mut server: BackendServerConfig = serde_json::from_value(server)
                .map_err(|e| BridgeError::Config(format!("invalid server '{name}': {e}")))?;
            if name.trim().is_empty() {
                return Err(BridgeError::Config("server name must not be empty".to_string()));
            }
            if server.command.trim().is_empty() {
                return Err(BridgeError::Config(format!(
                    "server '{name}' has an empty command"
                )));
            }
            server.name = name;
            servers.push(server);
        }

        let mut config = Self {
            servers,
            extra: raw.extra,
        };
        config.normalize_commands(is_windows, npx_path);
        Ok(config)
    }

    /// Load a configuration file (`.json`, or `.yaml`/`.yml`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or fails validation.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        let value: Value = if is_yaml {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        Self::from_value(value)
    }

    /// Use an inline config if given, otherwise load `path`.
    ///
    /// # Errors
    ///
    /// Returns a config error when neither source is given, or any load/validation error.
    pub fn resolve(config: Option<Value>, path: Option<&Path>) -> Result<Self> {
        match (config, path) {
            (Some(value), _) => Self::from_value(value),
            (None, Some(path)) => Self::from_path(path),
            (None, None) => Err(BridgeError::Config(
                "either a config or a config path must be provided".to_string(),
            )),
        }
    }

    fn normalize_commands(&mut self, is_windows: bool, npx_path: &str) {
        if !is_windows {
            return;
        }
        for server in &mut self.servers {
            if server.command == "npx" {
                server.command = npx_path.to_string();
            }
        }
    }

    /// Servers in configuration order.
    #[must_use]
    pub fn servers(&self) -> &[BackendServerConfig] {
        &self.servers
    }

    /// Server names in configuration order.
    #[must_use]
    pub fn server_names(&self) -> Vec<String> {
        self.servers.iter().map(|s| s.name.clone()).collect()
    }

    /// The JSON document handed to the gateway.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Serialize for McpConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        struct Servers<'a>(&'a [BackendServerConfig]);

        impl Serialize for Servers<'_> {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.0.len()))?;
                for server in self.0 {
                    map.serialize_entry(&server.name, server)?;
                }
                map.end()
            }
        }

        let mut map = serializer.serialize_map(Some(self.extra.len() + 1))?;
        map.serialize_entry("mcpServers", &Servers(&self.servers))?;
        for (k, v) in &self.extra {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

fn windows_npx_path() -> String {
    std::env::var(WIN_NPX_PATH_ENV).unwrap_or_else(|_| "npx".to_string())
}

/// How to launch the gateway executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCommand {
    pub program: PathBuf,
    /// Passed before `--host/--port/--config`.
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Default for GatewayCommand {
    fn default() -> Self {
        Self::new(DEFAULT_GATEWAY_PROGRAM)
    }
}

impl GatewayCommand {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Supervisor settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub gateway: GatewayCommand,
    /// Bind host passed to the gateway.
    pub host: String,
    pub port: u16,
    /// Bounds readiness waiting; `stop` waits up to a third of it for `finished`.
    pub timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayCommand::default(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SupervisorConfig {
    /// Base URL clients use to reach the gateway.
    #[must_use]
    pub fn base_url(&self) -> String {
        gateway_base_url(&self.host, self.port)
    }
}

/// Host to connect to for a given bind host (wildcard binds are reached over loopback).
#[must_use]
pub fn client_host(bind_host: &str) -> String {
    match bind_host {
        "0.0.0.0" | "" => "127.0.0.1".to_string(),
        "::" | "[::]" => "[::1]".to_string(),
        h if h.contains(':') && !h.starts_with('[') => format!("[{h}]"),
        h => h.to_string(),
    }
}

/// `http://{host}:{port}` for a bind host.
#[must_use]
pub fn gateway_base_url(bind_host: &str, port: u16) -> String {
    format!("http://{}:{port}", client_host(bind_host))
}
