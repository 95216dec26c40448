//! # onix-cli: Operator Tool for the ONIX Schema Validator
//!
//! Builds a validator from the same `type`/`location`/`cacheTTL` settings a
//! gateway would pass, then works against the loaded document:
//!
//! ```bash
//! onix validate --type url --location https://example.com/core.yaml search.json
//! onix operations --type file --location ./core.yaml
//! ```

pub mod operations;
pub mod validate;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use onix_schema::{Config, SchemaValidator, SourceKind};

/// Where to load the schema document from.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Source kind: url, file, or dir.
    #[arg(long = "type", value_name = "KIND")]
    pub kind: SourceKind,

    /// URL or path of the schema document.
    #[arg(long)]
    pub location: String,

    /// Refresh interval in seconds. Non-positive uses the default.
    #[arg(long, allow_hyphen_values = true)]
    pub cache_ttl: Option<i64>,

    /// Load deadline in seconds.
    #[arg(long)]
    pub fetch_timeout: Option<u64>,
}

impl SourceArgs {
    /// Validator configuration for these arguments.
    pub fn config(&self) -> Config {
        let mut config = Config::new(self.kind, self.location.clone());
        if let Some(ttl) = self.cache_ttl {
            config = config.with_cache_ttl_secs(ttl);
        }
        if let Some(timeout) = self.fetch_timeout {
            config = config.with_fetch_timeout(Duration::from_secs(timeout));
        }
        config
    }

    /// Load the document and build a validator.
    pub async fn build(&self) -> Result<SchemaValidator> {
        SchemaValidator::new(self.config())
            .await
            .with_context(|| format!("failed to load schema from {}", self.location))
    }
}
