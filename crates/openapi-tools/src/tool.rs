//! Function-tool wire types handed to chat models.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool definition in the chat-model function-calling shape:
///
/// ```json
/// {"type": "function", "function": {"name": "...", "description": "...", "parameters": {...}}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: ToolKind,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    #[default]
    Function,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parameters: ParametersSchema,
}

/// Object schema describing the tool arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParametersSchema {
    /// Always `"object"`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for ParametersSchema {
    fn default() -> Self {
        Self {
            kind: "object".to_string(),
            properties: Map::new(),
            required: Vec::new(),
        }
    }
}

impl ToolDefinition {
    #[must_use]
    pub fn function(name: String, description: String, parameters: ParametersSchema) -> Self {
        Self {
            kind: ToolKind::Function,
            function: FunctionDefinition {
                name,
                description,
                parameters,
            },
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.function.name
    }
}
