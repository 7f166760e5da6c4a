use crate::transport::TransportError;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "cache_names.prefix", "manifest[3].url")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "memory_cache", "host_config")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the caching runtime.
///
/// The first group of variants are the error kinds strategies and the precache
/// controller report; [`Error::code`] returns their stable kebab-case names.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no-response: no strategy produced a response for {url}{}", format_source(.source))]
    NoResponse {
        url: String,
        #[source]
        source: Option<Box<Error>>,
    },

    #[error("missing-precache-entry: {url} is not in cache '{cache_name}' and network fallback is disabled")]
    MissingPrecacheEntry { cache_name: String, url: String },

    #[error("bad-precaching-response: {url} returned HTTP {status}")]
    BadPrecachingResponse { url: String, status: u16 },

    #[error("add-to-cache-list-conflicting-entries: {first_entry} and {second_entry} share a URL but have different revisions")]
    ConflictingEntries {
        first_entry: String,
        second_entry: String,
    },

    #[error("add-to-cache-list-conflicting-integrities: {url} was added with integrity {first_integrity:?} and {second_integrity:?}")]
    ConflictingIntegrities {
        url: String,
        first_integrity: Option<String>,
        second_integrity: Option<String>,
    },

    #[error("add-to-cache-list-unexpected-type: {message}")]
    InvalidManifestEntry { message: String },

    #[error("plugin-error-request-will-fetch: plugin '{plugin}' failed: {source}")]
    PluginRequestWillFetch {
        plugin: String,
        #[source]
        source: Box<Error>,
    },

    #[error("attempt-to-cache-non-get-request: refusing to cache {method} {url}")]
    NonGetCacheAttempt { method: String, url: String },

    #[error("non-precached-url: {url} is not in the precache manifest")]
    NonPrecachedUrl { url: String },

    #[error("quota-exceeded: writing {requested} bytes to '{cache_name}' exceeds the {quota} byte quota")]
    QuotaExceeded {
        cache_name: String,
        requested: usize,
        quota: usize,
    },

    #[error("network-timeout: timed out the network response after {seconds} seconds")]
    NetworkTimeout { seconds: f64 },

    #[error("invalid-state: {0}")]
    InvalidState(String),

    #[error("Plugin '{plugin}' error: {message}")]
    Plugin { plugin: String, message: String },

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Cache storage error: {message}{}", format_context(.context))]
    Storage {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

fn format_source(source: &Option<Box<Error>>) -> String {
    match source {
        Some(err) => format!(" (caused by: {})", err),
        None => String::new(),
    }
}

impl Error {
    /// Stable kebab-case name of the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NoResponse { .. } => "no-response",
            Error::MissingPrecacheEntry { .. } => "missing-precache-entry",
            Error::BadPrecachingResponse { .. } => "bad-precaching-response",
            Error::ConflictingEntries { .. } => "add-to-cache-list-conflicting-entries",
            Error::ConflictingIntegrities { .. } => "add-to-cache-list-conflicting-integrities",
            Error::InvalidManifestEntry { .. } => "add-to-cache-list-unexpected-type",
            Error::PluginRequestWillFetch { .. } => "plugin-error-request-will-fetch",
            Error::NonGetCacheAttempt { .. } => "attempt-to-cache-non-get-request",
            Error::NonPrecachedUrl { .. } => "non-precached-url",
            Error::QuotaExceeded { .. } => "quota-exceeded",
            Error::NetworkTimeout { .. } => "network-timeout",
            Error::InvalidState(_) => "invalid-state",
            Error::Plugin { .. } => "plugin-error",
            Error::Transport(_) => "network-error",
            Error::Storage { .. } => "storage-error",
            Error::Configuration { .. } => "configuration-error",
            Error::Url(_) => "invalid-url",
            Error::Serialization(_) => "serialization-error",
            Error::Runtime { .. } => "runtime-error",
        }
    }

    /// `no-response` for `url`, optionally wrapping the failure that caused it.
    pub fn no_response(url: impl Into<String>, source: Option<Error>) -> Self {
        Error::NoResponse {
            url: url.into(),
            source: source.map(Box::new),
        }
    }

    /// Error raised by a plugin callback.
    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Plugin {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Error::QuotaExceeded { .. })
    }

    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Create a new storage error with structured context
    pub fn storage_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Storage {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Storage { context, .. }
            | Error::Configuration { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::configuration_with_context(
            err.to_string(),
            ErrorContext::new().with_source("serde_yaml"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_kinds() {
        let err = Error::no_response("https://example.com/a", None);
        assert_eq!(err.code(), "no-response");

        let err = Error::ConflictingEntries {
            first_entry: "a".into(),
            second_entry: "b".into(),
        };
        assert_eq!(err.code(), "add-to-cache-list-conflicting-entries");
        assert!(!err.is_quota_exceeded());

        let err = Error::QuotaExceeded {
            cache_name: "c".into(),
            requested: 10,
            quota: 5,
        };
        assert!(err.is_quota_exceeded());
    }

    #[test]
    fn test_no_response_keeps_source() {
        let inner = Error::NetworkTimeout { seconds: 2.0 };
        let err = Error::no_response("https://example.com/a", Some(inner));
        let rendered = err.to_string();
        assert!(rendered.contains("no-response"));
        assert!(rendered.contains("timed out"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_context_formatting() {
        let err = Error::configuration_with_context(
            "bad scope",
            ErrorContext::new()
                .with_field_path("scope")
                .with_source("host_config"),
        );
        assert_eq!(
            err.to_string(),
            "Configuration error: bad scope (field: scope, source: host_config)"
        );
        assert_eq!(err.context().unwrap().field_path.as_deref(), Some("scope"));
    }
}
