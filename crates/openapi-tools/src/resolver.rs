//! Local `$ref` resolver.
//!
//! Gateway-generated documents keep request bodies in `#/components/schemas/...` and reference
//! them with `$ref`. This resolver supports:
//! - Component schema refs (`#/components/schemas/{key}`), resolved by direct key lookup
//! - Any other local JSON pointer (`#/components/requestBodies/...`)
//!
//! External refs (files, URLs) are not fetched. Anything that cannot be resolved (missing key,
//! external document, cycle) resolves to the empty schema `{}` rather than an error, so a single
//! odd operation never hides the rest of a backend's tools.

use crate::document::OpenApiDocument;
use serde_json::{Map, Value};
use std::collections::HashSet;

const COMPONENT_SCHEMA_PREFIX: &str = "#/components/schemas/";

#[derive(Debug)]
pub struct LocalRefResolver<'a> {
    doc: &'a OpenApiDocument,
}

/// Where a `$ref` points.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RefTarget<'r> {
    ComponentSchema(&'r str),
    Pointer(&'r str),
    External(&'r str),
}

impl<'r> RefTarget<'r> {
    fn parse(reference: &'r str) -> Self {
        if let Some(key) = reference.strip_prefix(COMPONENT_SCHEMA_PREFIX) {
            return RefTarget::ComponentSchema(key);
        }
        match reference.strip_prefix('#') {
            Some(ptr) if ptr.is_empty() || ptr.starts_with('/') => RefTarget::Pointer(ptr),
            _ => RefTarget::External(reference),
        }
    }
}

impl<'a> LocalRefResolver<'a> {
    #[must_use]
    pub fn new(doc: &'a OpenApiDocument) -> Self {
        Self { doc }
    }

    /// Resolve a value that may be a `$ref` object, following chains of refs.
    ///
    /// Non-ref values are returned unchanged. Unresolvable refs yield `{}`.
    #[must_use]
    pub fn resolve(&self, value: &Value) -> Value {
        let mut seen: HashSet<String> = HashSet::new();
        let mut cur = value;

        loop {
            let Some(reference) = ref_of(cur) else {
                return cur.clone();
            };

            if !seen.insert(reference.to_string()) {
                tracing::warn!(reference, "cyclic $ref; using empty schema");
                return empty_schema();
            }

            match self.lookup(reference) {
                Some(next) => cur = next,
                None => return empty_schema(),
            }
        }
    }

    fn lookup(&self, reference: &str) -> Option<&'a Value> {
        match RefTarget::parse(reference) {
            RefTarget::ComponentSchema(key) => {
                let found = self.doc.component_schemas().get(key);
                if found.is_none() {
                    tracing::debug!(reference, "unresolved component schema; using empty schema");
                }
                found
            }
            RefTarget::Pointer(ptr) => {
                let found = self.doc.pointer(ptr);
                if found.is_none() {
                    tracing::debug!(reference, "unresolved $ref pointer; using empty schema");
                }
                found
            }
            RefTarget::External(reference) => {
                tracing::warn!(reference, "external $ref is not supported; using empty schema");
                None
            }
        }
    }
}

fn ref_of(value: &Value) -> Option<&str> {
    value.as_object()?.get("$ref")?.as_str()
}

fn empty_schema() -> Value {
    Value::Object(Map::new())
}
