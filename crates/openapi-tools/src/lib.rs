//! OpenAPI->function-tool translation.
//!
//! This crate is intended to be used by `mcpo-bridge`: it turns the per-backend `OpenAPI`
//! documents a gateway publishes into chat-model tool definitions plus the dispatch URL of each
//! tool.
//!
//! It intentionally contains **no** process handling and **no** dispatch logic.

pub mod document;
pub mod error;
pub mod resolver;
pub mod tool;
pub mod translator;

pub use document::OpenApiDocument;
pub use tool::{FunctionDefinition, ParametersSchema, ToolDefinition, ToolKind};
pub use translator::{ToolCatalog, TranslatedTool, canonical_tool_name, list_tools};
