//! Error types for `mcpo-openapi-tools`.

use thiserror::Error;

/// Main error type for `OpenAPI` tooling.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    /// The document could not be fetched (transport failure or non-2xx status).
    #[error("OpenAPI error: failed to fetch spec from '{url}': {message}")]
    OpenApiSpecFetch { url: String, message: String },

    /// The response body could not be read.
    #[error("OpenAPI error: failed to read spec body from '{url}': {message}")]
    OpenApiSpecReadBody { url: String, message: String },

    /// The document is neither valid JSON nor valid YAML.
    #[error("OpenAPI error: failed to parse OpenAPI spec from '{location}': {source}")]
    OpenApiSpecParse {
        location: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// The document parsed but does not have the shape of an `OpenAPI` document.
    #[error("OpenAPI error: malformed OpenAPI document from '{location}': {source}")]
    OpenApiSpecShape {
        location: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type alias for `OpenAPI` tooling operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
