//! # Error Types
//!
//! Every failure the validator can produce, grouped by who caused it and
//! when it happens. All errors use `thiserror` for derive-based `Display`
//! and `Error` implementations.
//!
//! ## Design
//!
//! - Construction fails with [`SetupError`], which wraps either a
//!   [`ConfigError`] (bad settings) or a [`LoadError`] (the initial document
//!   could not be fetched, parsed, or compiled).
//! - Refresh-time [`LoadError`]s never reach callers of `validate`; they are
//!   logged and the previous document stays in service.
//! - Each `validate` call fails with exactly one [`ValidateError`] kind, so an
//!   upstream HTTP handler can map it to a status code without string matching.

use std::time::Duration;

use serde_json::json;
use thiserror::Error;

use crate::violation::ValidationViolations;

/// Invalid or missing construction parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The `type` setting was absent or empty.
    #[error("type not configured")]
    MissingType,

    /// The `location` setting was absent or empty.
    #[error("location not configured")]
    MissingLocation,

    /// The `type` setting is not one of `url`, `file`, or `dir`.
    #[error("config type must be 'url', 'file', or 'dir', got '{0}'")]
    UnknownKind(String),

    /// The location cannot be used with the configured source kind.
    #[error("invalid location '{location}': {reason}")]
    InvalidLocation {
        /// The configured location.
        location: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Failure to fetch, parse, or prepare a schema document.
#[derive(Error, Debug)]
pub enum LoadError {
    /// Multi-file directory sources are not supported.
    #[error("directory loading not yet implemented")]
    DirNotImplemented,

    /// A location or `$ref` target could not be turned into a URI.
    #[error("failed to parse URL '{location}': {reason}")]
    InvalidUrl {
        /// The offending location.
        location: String,
        /// Parser message.
        reason: String,
    },

    /// HTTP transport failure.
    #[error("failed to fetch {location}: {source}")]
    Fetch {
        /// URL being fetched.
        location: String,
        /// Underlying transport error.
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("fetching {location} returned HTTP {status}")]
    HttpStatus {
        /// URL being fetched.
        location: String,
        /// HTTP status code.
        status: u16,
    },

    /// Local file could not be read.
    #[error("failed to read {location}: {source}")]
    Io {
        /// Path being read.
        location: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The bytes are neither valid JSON nor valid YAML, or the result is not
    /// a usable document.
    #[error("failed to parse document {location}: {reason}")]
    Parse {
        /// Where the bytes came from.
        location: String,
        /// Parser message.
        reason: String,
    },

    /// The whole load exceeded its deadline.
    #[error("loading {location} timed out after {elapsed:?}")]
    Timeout {
        /// Root document location.
        location: String,
        /// The deadline that was exceeded.
        elapsed: Duration,
    },

    /// An operation's request-body schema could not be compiled.
    #[error("failed to compile request schema for {method} {path}: {reason}")]
    Compile {
        /// Path key of the operation.
        path: String,
        /// HTTP method of the operation.
        method: String,
        /// Compiler message.
        reason: String,
    },
}

/// Error returned by validator construction.
#[derive(Error, Debug)]
pub enum SetupError {
    /// Settings were invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The initial document load failed.
    #[error("failed to initialise schema validator: {0}")]
    Load(#[from] LoadError),
}

/// Outcome of a failed `validate` call.
#[derive(Error, Debug, Clone)]
pub enum ValidateError {
    /// Body is not JSON, or `context.action` is not a string.
    #[error("failed to parse JSON payload: {0}")]
    MalformedPayload(String),

    /// `context.action` is absent or empty.
    #[error("missing field Action in context")]
    MissingAction,

    /// No operation in the document constrains `context.action` to this value.
    #[error("unsupported action: {action}")]
    UnsupportedAction {
        /// The action the payload declared.
        action: String,
    },

    /// No document has ever been loaded.
    #[error("no OpenAPI spec loaded")]
    NotReady,

    /// The payload does not conform to the resolved operation schema.
    #[error("schema validation failed:\n{violations}")]
    SchemaValidation {
        /// Every violation found, flattened.
        violations: ValidationViolations,
    },
}

impl ValidateError {
    /// Whether the request itself is at fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::NotReady)
    }

    /// HTTP status an upstream handler should answer with.
    pub fn status_code(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            503
        }
    }

    /// The violations carried by a [`ValidateError::SchemaValidation`].
    pub fn violations(&self) -> Option<&ValidationViolations> {
        match self {
            Self::SchemaValidation { violations } => Some(violations),
            _ => None,
        }
    }

    /// Render as the gateway's JSON error body.
    ///
    /// Schema failures carry every violation under `paths` so a client can
    /// fix all of them in one round trip.
    pub fn to_response_body(&self) -> serde_json::Value {
        let mut error = json!({
            "code": self.status_code(),
        });
        match self {
            Self::SchemaValidation { violations } => {
                error["message"] = json!("schema validation failed");
                error["paths"] = json!(violations.violations());
            }
            other => {
                error["message"] = json!(other.to_string());
            }
        }
        json!({ "error": error })
    }
}
