//! # Schema Validator
//!
//! The gateway-facing entry point. A [`SchemaValidator`] loads its document
//! once at construction, starts one background refresh task, and then
//! validates request bodies against whatever document is current:
//!
//! 1. Read `context.action` from the body.
//! 2. Take a cache snapshot.
//! 3. Resolve the operation that handles the action.
//! 4. Run the operation's compiled validator over the whole body.
//! 5. Flatten any violations into `(path, message)` pairs.
//!
//! Each step has its own [`ValidateError`] kind. Validation never performs
//! I/O and never waits on a reload.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cache::{CachedSpec, SpecCache};
use crate::config::Config;
use crate::document::SchemaDocument;
use crate::error::{LoadError, SetupError, ValidateError};
use crate::refresh::{self, RefreshScheduler};
use crate::resolver::resolve_action;
use crate::source::SpecSource;

/// Validates request bodies for a gateway step.
pub trait PayloadValidator: Send + Sync {
    /// Validate `body`, received at `request_url`.
    fn validate(&self, request_url: Option<&Url>, body: &[u8]) -> Result<(), ValidateError>;
}

/// A cached, self-refreshing validator over one schema document.
#[derive(Debug)]
pub struct SchemaValidator {
    config: Config,
    source: Arc<SpecSource>,
    cache: Arc<SpecCache>,
    refresher: RefreshScheduler,
}

impl SchemaValidator {
    /// Load the document and start background refresh.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Config`] for unusable configuration and
    /// [`SetupError::Load`] if the initial load fails.
    pub async fn new(config: Config) -> Result<Self, SetupError> {
        Self::with_cancellation(config, &CancellationToken::new()).await
    }

    /// Like [`SchemaValidator::new`], with a refresh task that also stops
    /// when `parent` is cancelled.
    ///
    /// # Errors
    ///
    /// See [`SchemaValidator::new`].
    pub async fn with_cancellation(
        config: Config,
        parent: &CancellationToken,
    ) -> Result<Self, SetupError> {
        config.validate()?;
        let source = Arc::new(SpecSource::new(&config)?);
        let cache = Arc::new(SpecCache::new());

        let document = match source.load().await {
            Ok(document) => document,
            Err(e) => {
                tracing::error!(
                    kind = %config.kind,
                    location = %config.location,
                    error = %e,
                    "initial schema load failed"
                );
                return Err(e.into());
            }
        };
        tracing::info!(
            kind = %config.kind,
            location = %config.location,
            documents = document.document_count(),
            operations = document.operations().len(),
            ttl_secs = config.cache_ttl.as_secs(),
            "schema document loaded"
        );
        cache.replace(document);

        let refresher = RefreshScheduler::start(
            Arc::clone(&source),
            Arc::clone(&cache),
            config.cache_ttl,
            parent.child_token(),
        );
        Ok(Self {
            config,
            source,
            cache,
            refresher,
        })
    }

    /// Build from the plugin host's string settings.
    ///
    /// # Errors
    ///
    /// See [`Config::from_settings`] and [`SchemaValidator::new`].
    pub async fn from_settings(settings: &HashMap<String, String>) -> Result<Self, SetupError> {
        let config = Config::from_settings(settings)?;
        Self::new(config).await
    }

    /// Effective configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The current document and its load time.
    pub fn snapshot(&self) -> Option<Arc<CachedSpec>> {
        self.cache.snapshot()
    }

    /// Reload the document now. On failure the current document stays.
    ///
    /// # Errors
    ///
    /// Returns the [`LoadError`] from the attempted load.
    pub async fn reload(&self) -> Result<(), LoadError> {
        refresh::reload(&self.source, &self.cache).await
    }

    /// Stop background refresh and wait for the task to exit. Validation
    /// keeps working against the last loaded document.
    pub async fn shutdown(&self) {
        self.refresher.stop().await;
    }

    /// Whether background refresh is still running.
    pub fn is_refreshing(&self) -> bool {
        !self.refresher.is_finished()
    }

    /// Validate a request body.
    ///
    /// # Errors
    ///
    /// Returns the [`ValidateError`] kind for the first step that fails.
    pub fn validate(&self, request_url: Option<&Url>, body: &[u8]) -> Result<(), ValidateError> {
        if let Some(url) = request_url {
            tracing::trace!(url = %url, bytes = body.len(), "validating request body");
        }
        let snapshot = self.cache.snapshot();
        validate_payload(snapshot.as_deref().map(|spec| &spec.document), body)
    }
}

impl PayloadValidator for SchemaValidator {
    fn validate(&self, request_url: Option<&Url>, body: &[u8]) -> Result<(), ValidateError> {
        SchemaValidator::validate(self, request_url, body)
    }
}

/// Validate `body` against `document`; `None` means nothing has loaded yet.
///
/// # Errors
///
/// See [`SchemaValidator::validate`].
pub fn validate_payload(document: Option<&SchemaDocument>, body: &[u8]) -> Result<(), ValidateError> {
    let payload: Value =
        serde_json::from_slice(body).map_err(|e| ValidateError::MalformedPayload(e.to_string()))?;
    let action = action_of(&payload)?;

    let document = document.ok_or(ValidateError::NotReady)?;
    let operation =
        resolve_action(document, action).ok_or_else(|| ValidateError::UnsupportedAction {
            action: action.to_string(),
        })?;
    tracing::debug!(
        action = %action,
        path = %operation.path(),
        method = %operation.method(),
        "resolved operation for action"
    );

    operation.validate(&payload).map_err(|tree| {
        let violations = tree.flatten();
        tracing::debug!(
            action = %action,
            violations = violations.len(),
            "payload failed schema validation"
        );
        ValidateError::SchemaValidation { violations }
    })
}

/// Read `context.action`. Absent, null, or empty is a missing action; any
/// non-string value or a non-object envelope is malformed.
fn action_of(payload: &Value) -> Result<&str, ValidateError> {
    let envelope = payload
        .as_object()
        .ok_or_else(|| ValidateError::MalformedPayload("payload must be a JSON object".into()))?;
    let context = match envelope.get("context") {
        None | Some(Value::Null) => return Err(ValidateError::MissingAction),
        Some(Value::Object(context)) => context,
        Some(_) => {
            return Err(ValidateError::MalformedPayload(
                "context must be a JSON object".into(),
            ))
        }
    };
    match context.get("action") {
        None | Some(Value::Null) => Err(ValidateError::MissingAction),
        Some(Value::String(action)) if action.is_empty() => Err(ValidateError::MissingAction),
        Some(Value::String(action)) => Ok(action),
        Some(_) => Err(ValidateError::MalformedPayload(
            "context.action must be a string".into(),
        )),
    }
}
