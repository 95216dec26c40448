//! # Validator Configuration
//!
//! Where the schema document lives and how often it is refreshed. The
//! gateway's plugin host hands settings over as a flat string map;
//! [`Config::from_settings`] turns that map into a typed [`Config`].
//!
//! Recognised keys:
//! - `type` (required): `url`, `file`, or `dir`
//! - `location` (required): URL or filesystem path of the document
//! - `cacheTTL` (optional): refresh interval in seconds, default 3600
//! - `fetchTimeout` (optional): per-load deadline in seconds, default 30
//!
//! Non-positive or unparsable durations fall back to their defaults
//! silently; they never disable refresh.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

/// Refresh interval used when none (or a non-positive one) is configured.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Load deadline used when none (or a non-positive one) is configured.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a schema document is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Fetched over HTTP(S).
    Url,
    /// Read from a local file.
    File,
    /// A directory of schema files. Accepted here, always rejected at load.
    Dir,
}

impl FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "url" => Ok(Self::Url),
            "file" => Ok(Self::File),
            "dir" => Ok(Self::Dir),
            "" => Err(ConfigError::MissingType),
            other => Err(ConfigError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Url => "url",
            Self::File => "file",
            Self::Dir => "dir",
        };
        f.write_str(s)
    }
}

/// Validator configuration. Immutable once a validator is built from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Source kind.
    pub kind: SourceKind,
    /// URL or path of the root document.
    pub location: String,
    /// How long a loaded document stays fresh. Always positive.
    pub cache_ttl: Duration,
    /// Deadline for one complete load, including referenced documents.
    pub fetch_timeout: Duration,
}

impl Config {
    /// Create a configuration with default refresh interval and timeout.
    pub fn new(kind: SourceKind, location: impl Into<String>) -> Self {
        Self {
            kind,
            location: location.into(),
            cache_ttl: DEFAULT_CACHE_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Set the refresh interval. Zero falls back to the default.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = if ttl.is_zero() { DEFAULT_CACHE_TTL } else { ttl };
        self
    }

    /// Set the refresh interval in seconds. Non-positive falls back to the default.
    pub fn with_cache_ttl_secs(self, secs: i64) -> Self {
        self.with_cache_ttl(positive_secs(secs).unwrap_or(DEFAULT_CACHE_TTL))
    }

    /// Set the load deadline. Zero falls back to the default.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = if timeout.is_zero() {
            DEFAULT_FETCH_TIMEOUT
        } else {
            timeout
        };
        self
    }

    /// Build a configuration from the plugin host's string settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `type` or `location` is missing or empty,
    /// when `type` is not recognised, or when the location is unusable for
    /// the kind (see [`Config::validate`]).
    pub fn from_settings(settings: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let kind = match settings.get("type").map(String::as_str) {
            None | Some("") => return Err(ConfigError::MissingType),
            Some(raw) => raw.parse::<SourceKind>()?,
        };
        let location = match settings.get("location") {
            Some(loc) if !loc.is_empty() => loc.clone(),
            _ => return Err(ConfigError::MissingLocation),
        };

        let config = Self::new(kind, location)
            .with_cache_ttl(setting_secs(settings, "cacheTTL").unwrap_or(DEFAULT_CACHE_TTL))
            .with_fetch_timeout(
                setting_secs(settings, "fetchTimeout").unwrap_or(DEFAULT_FETCH_TIMEOUT),
            );
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can be used to load a document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingLocation`] for an empty location and
    /// [`ConfigError::InvalidLocation`] when a `url` source is not an
    /// absolute `http`/`https` URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.location.is_empty() {
            return Err(ConfigError::MissingLocation);
        }
        if self.kind == SourceKind::Url {
            let url = Url::parse(&self.location).map_err(|e| ConfigError::InvalidLocation {
                location: self.location.clone(),
                reason: e.to_string(),
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidLocation {
                    location: self.location.clone(),
                    reason: format!("unsupported scheme '{}'", url.scheme()),
                });
            }
        }
        Ok(())
    }
}

fn positive_secs(secs: i64) -> Option<Duration> {
    u64::try_from(secs)
        .ok()
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
}

fn setting_secs(settings: &HashMap<String, String>, key: &str) -> Option<Duration> {
    settings
        .get(key)
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .and_then(positive_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_source_kind_round_trip() {
        for kind in [SourceKind::Url, SourceKind::File, SourceKind::Dir] {
            assert_eq!(kind.to_string().parse::<SourceKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert_eq!(
            "invalid".parse::<SourceKind>(),
            Err(ConfigError::UnknownKind("invalid".into()))
        );
    }

    #[test]
    fn test_missing_type() {
        let err = Config::from_settings(&settings(&[("location", "http://example.com")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingType);

        let err = Config::from_settings(&settings(&[("type", ""), ("location", "x")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingType);
    }

    #[test]
    fn test_missing_location() {
        let err = Config::from_settings(&settings(&[("type", "url")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingLocation);

        let err = Config::from_settings(&settings(&[("type", "url"), ("location", "")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingLocation);
    }

    #[test]
    fn test_default_ttl_when_unset() {
        let cfg = Config::from_settings(&settings(&[
            ("type", "file"),
            ("location", "/tmp/spec.yaml"),
        ]))
        .unwrap();
        assert_eq!(cfg.cache_ttl, DEFAULT_CACHE_TTL);
        assert_eq!(cfg.fetch_timeout, DEFAULT_FETCH_TIMEOUT);
    }

    #[test]
    fn test_non_positive_or_garbage_ttl_falls_back() {
        for raw in ["0", "-5", "soon", ""] {
            let cfg = Config::from_settings(&settings(&[
                ("type", "file"),
                ("location", "/tmp/spec.yaml"),
                ("cacheTTL", raw),
            ]))
            .unwrap();
            assert_eq!(cfg.cache_ttl, DEFAULT_CACHE_TTL, "cacheTTL={raw}");
        }
    }

    #[test]
    fn test_custom_ttl_and_timeout() {
        let cfg = Config::from_settings(&settings(&[
            ("type", "file"),
            ("location", "/tmp/spec.yaml"),
            ("cacheTTL", "120"),
            ("fetchTimeout", "5"),
        ]))
        .unwrap();
        assert_eq!(cfg.cache_ttl, Duration::from_secs(120));
        assert_eq!(cfg.fetch_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_ttl_builders_default_non_positive() {
        let cfg = Config::new(SourceKind::File, "x").with_cache_ttl(Duration::ZERO);
        assert_eq!(cfg.cache_ttl, DEFAULT_CACHE_TTL);
        let cfg = Config::new(SourceKind::File, "x").with_cache_ttl_secs(-1);
        assert_eq!(cfg.cache_ttl, DEFAULT_CACHE_TTL);
        let cfg = Config::new(SourceKind::File, "x").with_cache_ttl_secs(7);
        assert_eq!(cfg.cache_ttl, Duration::from_secs(7));
    }

    #[test]
    fn test_url_location_must_be_http() {
        let err = Config::new(SourceKind::Url, "ftp://example.com/spec.yaml")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLocation { .. }));

        let err = Config::new(SourceKind::Url, "not a url").validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLocation { .. }));

        Config::new(SourceKind::Url, "https://example.com/spec.yaml")
            .validate()
            .unwrap();
    }

    #[test]
    fn test_dir_kind_is_accepted_by_config() {
        let cfg = Config::from_settings(&settings(&[("type", "dir"), ("location", "/schemas")]))
            .unwrap();
        assert_eq!(cfg.kind, SourceKind::Dir);
    }
}
