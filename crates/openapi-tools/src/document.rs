//! Lenient `OpenAPI` document model.
//!
//! Gateways generate their documents from whatever the backend tool server advertises, so the
//! model only types the handful of fields translation needs and keeps the raw JSON around for
//! `$ref` pointer lookups. Path order is preserved (`serde_json` is built with
//! `preserve_order`), which keeps tool order and last-write-wins collisions deterministic.

use crate::error::{OpenApiToolsError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

/// A parsed `OpenAPI` 3.x document.
#[derive(Debug, Clone)]
pub struct OpenApiDocument {
    info: Info,
    paths: Map<String, Value>,
    components: Components,
    raw: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Info {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Components {
    #[serde(default)]
    schemas: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct DocumentParts {
    #[serde(default)]
    info: Info,
    #[serde(default)]
    paths: Map<String, Value>,
    #[serde(default)]
    components: Components,
}

impl OpenApiDocument {
    /// Parse a document from raw bytes (JSON first, YAML as a fallback).
    ///
    /// `location` is only used for error context.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are neither JSON nor YAML, or if the top-level fields have
    /// the wrong shape.
    pub fn from_slice(bytes: &[u8], location: &str) -> Result<Self> {
        let raw: Value = match serde_json::from_slice(bytes) {
            Ok(v) => v,
            Err(_) => serde_yaml::from_slice(bytes).map_err(|source| {
                OpenApiToolsError::OpenApiSpecParse {
                    location: location.to_string(),
                    source,
                }
            })?,
        };
        Self::from_value(raw, location)
    }

    /// Build a document from an already-decoded JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if `info`, `paths` or `components.schemas` are present with the wrong type.
    pub fn from_value(raw: Value, location: &str) -> Result<Self> {
        let parts: DocumentParts = serde_json::from_value(raw.clone()).map_err(|source| {
            OpenApiToolsError::OpenApiSpecShape {
                location: location.to_string(),
                source,
            }
        })?;
        Ok(Self {
            info: parts.info,
            paths: parts.paths,
            components: parts.components,
            raw,
        })
    }

    /// `info.description`, or an empty string.
    #[must_use]
    pub fn description(&self) -> &str {
        self.info.description.as_deref().unwrap_or_default()
    }

    /// Path items in document order.
    pub fn paths(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.paths.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// `components.schemas` (empty when absent).
    #[must_use]
    pub fn component_schemas(&self) -> &Map<String, Value> {
        &self.components.schemas
    }

    /// Look up a JSON pointer (`/components/...`) in the raw document.
    #[must_use]
    pub fn pointer(&self, ptr: &str) -> Option<&Value> {
        self.raw.pointer(ptr)
    }
}
