//! Supervise an OpenAPI tool gateway and expose its backends as chat-model function tools.
//!
//! The gateway is an external process that fronts several backend tool servers over REST, one
//! OpenAPI document per backend. This crate:
//!
//! - normalizes the backend configuration ([`config`]),
//! - launches and tears down the gateway process tree ([`supervisor`], [`signals`]),
//! - waits for it to accept connections ([`readiness`]),
//! - discovers backends and translates their documents into tool definitions ([`discovery`],
//!   [`ToolBridge::list_tools`]),
//! - routes tool calls back to the gateway ([`dispatcher`]).

pub mod bridge;
pub mod config;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod readiness;
pub mod registry;
pub mod signals;
pub mod supervisor;

pub use bridge::ToolBridge;
pub use config::{BackendServerConfig, GatewayCommand, McpConfig, SupervisorConfig};
pub use dispatcher::{DispatchOutcome, Dispatcher, FunctionCall, ToolArguments, ToolCall};
pub use error::{BridgeError, Result};
pub use mcpo_openapi_tools::ToolDefinition;
pub use registry::ToolRegistry;
pub use signals::{LifecycleSignals, Signal, SignalSnapshot};
pub use supervisor::{GatewayState, GatewaySupervisor, Readiness};
