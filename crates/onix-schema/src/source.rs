//! # Schema Sources
//!
//! Turns a configured `(kind, location)` into a built [`SchemaDocument`]:
//! fetch the root document, follow references to other documents through
//! the same transport, then parse and compile everything. All I/O happens
//! here, before a document is handed to the cache.
//!
//! ## Timeout
//!
//! Every HTTP request carries the configured fetch timeout, and the whole
//! load (root, referenced documents, compilation) runs under the same
//! deadline. Exceeding it is a [`LoadError::Timeout`].

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::config::{Config, SourceKind};
use crate::document::{parse_document, referenced_documents, DocumentSet, SchemaDocument};
use crate::error::LoadError;

/// Most documents a single load will fetch, root included.
const MAX_DOCUMENTS: usize = 256;

/// Where schema documents come from.
#[derive(Debug, Clone)]
pub struct SpecSource {
    kind: SourceKind,
    location: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl SpecSource {
    /// Create a source for the configured location.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Fetch`] if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, LoadError> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .map_err(|e| LoadError::Fetch {
                location: config.location.clone(),
                source: e,
            })?;
        Ok(Self {
            kind: config.kind,
            location: config.location.clone(),
            timeout: config.fetch_timeout,
            client,
        })
    }

    /// Source kind.
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Root document location as configured.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Absolute URI of the root document.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::DirNotImplemented`] for directory sources and
    /// [`LoadError::InvalidUrl`] if the location cannot be expressed as a URI.
    pub fn base_uri(&self) -> Result<Url, LoadError> {
        match self.kind {
            SourceKind::Url => Url::parse(&self.location).map_err(|e| LoadError::InvalidUrl {
                location: self.location.clone(),
                reason: e.to_string(),
            }),
            SourceKind::File => {
                let path = absolute_path(Path::new(&self.location)).map_err(|e| LoadError::Io {
                    location: self.location.clone(),
                    source: e,
                })?;
                Url::from_file_path(&path).map_err(|()| LoadError::InvalidUrl {
                    location: self.location.clone(),
                    reason: "path cannot be expressed as a file URI".into(),
                })
            }
            SourceKind::Dir => Err(LoadError::DirNotImplemented),
        }
    }

    /// Fetch, parse, and compile the document and everything it references.
    ///
    /// # Errors
    ///
    /// Returns the first [`LoadError`] encountered, or
    /// [`LoadError::Timeout`] if the deadline passes first.
    pub async fn load(&self) -> Result<SchemaDocument, LoadError> {
        match tokio::time::timeout(self.timeout, self.load_documents()).await {
            Ok(result) => result,
            Err(_) => Err(LoadError::Timeout {
                location: self.location.clone(),
                elapsed: self.timeout,
            }),
        }
    }

    async fn load_documents(&self) -> Result<SchemaDocument, LoadError> {
        let base = self.base_uri()?;
        let mut documents = DocumentSet::default();
        let mut pending = VecDeque::from([base.clone()]);

        while let Some(uri) = pending.pop_front() {
            if documents.contains(&uri) {
                continue;
            }
            if documents.len() >= MAX_DOCUMENTS {
                return Err(LoadError::Parse {
                    location: self.location.clone(),
                    reason: format!("more than {MAX_DOCUMENTS} referenced documents"),
                });
            }
            let bytes = self.fetch(&uri).await?;
            let document = parse_document(&bytes, uri.as_str())?;
            for next in referenced_documents(&document, &uri) {
                if !documents.contains(&next) {
                    pending.push_back(next);
                }
            }
            tracing::debug!(uri = %uri, bytes = bytes.len(), "fetched schema document");
            documents.insert(&uri, document);
        }

        let document = SchemaDocument::build(base, documents)?;
        if !document.findings().is_empty() {
            tracing::warn!(
                location = %self.location,
                findings = document.findings().len(),
                "schema document has lint findings"
            );
            for finding in document.findings() {
                tracing::debug!(location = %self.location, finding = %finding, "lint");
            }
        }
        Ok(document)
    }

    /// Read the raw bytes at `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] for transport failures, non-success HTTP
    /// statuses, unreadable files, and unsupported schemes.
    pub async fn fetch(&self, uri: &Url) -> Result<Vec<u8>, LoadError> {
        match uri.scheme() {
            "http" | "https" => self.fetch_http(uri).await,
            "file" => {
                let path = uri.to_file_path().map_err(|()| LoadError::InvalidUrl {
                    location: uri.to_string(),
                    reason: "not a local file URI".into(),
                })?;
                tokio::fs::read(&path).await.map_err(|e| LoadError::Io {
                    location: path.display().to_string(),
                    source: e,
                })
            }
            other => Err(LoadError::InvalidUrl {
                location: uri.to_string(),
                reason: format!("unsupported scheme '{other}'"),
            }),
        }
    }

    async fn fetch_http(&self, uri: &Url) -> Result<Vec<u8>, LoadError> {
        let resp = self
            .client
            .get(uri.clone())
            .send()
            .await
            .map_err(|e| self.transport_error(uri, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LoadError::HttpStatus {
                location: uri.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| self.transport_error(uri, e))?;
        Ok(body.to_vec())
    }

    fn transport_error(&self, uri: &Url, e: reqwest::Error) -> LoadError {
        if e.is_timeout() {
            LoadError::Timeout {
                location: uri.to_string(),
                elapsed: self.timeout,
            }
        } else {
            LoadError::Fetch {
                location: uri.to_string(),
                source: e,
            }
        }
    }
}

fn absolute_path(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
