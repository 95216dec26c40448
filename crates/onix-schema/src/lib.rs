//! # onix-schema: Request Schema Validation for the ONIX Gateway
//!
//! Validates beckn request bodies against an OpenAPI document. The payload's
//! `context.action` picks the operation; the operation's JSON request-body
//! schema then checks the whole payload.
//!
//! ## Lifecycle
//!
//! A [`SchemaValidator`] loads its document (URL or local file, JSON or
//! YAML, plus every document it references) when constructed, then keeps
//! it fresh from a background task that reloads once the document is older
//! than the configured TTL. A failed reload is logged and the previous
//! document keeps serving.
//!
//! ## Validation
//!
//! - [`resolver`] finds the first operation whose schema constrains
//!   `context.action` to the payload's action, through `const` or `enum`,
//!   directly or inside `allOf`.
//! - [`document`] holds each operation's precompiled structural validator
//!   (draft 2020-12, formats checked, `readOnly` properties not required).
//!   OpenAPI 3.0 documents have `nullable` and boolean exclusive bounds
//!   rewritten first.
//! - [`violation`] flattens the validator's error tree into ordered
//!   `{path, message}` pairs.
//!
//! Every failure is one [`ValidateError`] kind; see
//! [`ValidateError::status_code`] for the HTTP mapping.
//!
//! ## Crate Policy
//!
//! - Validation never performs I/O. Fetching happens at load time only.
//! - The library never installs a tracing subscriber.

pub mod cache;
pub mod config;
pub mod document;
pub mod error;
pub mod node;
pub mod refresh;
pub mod resolver;
pub mod source;
pub mod validator;
pub mod violation;

pub use cache::{CachedSpec, SpecCache};
pub use config::{Config, SourceKind, DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT};
pub use document::{Method, Operation, SchemaDocument};
pub use error::{ConfigError, LoadError, SetupError, ValidateError};
pub use refresh::RefreshScheduler;
pub use resolver::resolve_action;
pub use source::SpecSource;
pub use validator::{validate_payload, PayloadValidator, SchemaValidator};
pub use violation::{ValidationViolations, Violation, ViolationTree};
