//! Capabilities: the external operations the executor drives.
//!
//! The engine owns no network stack and no cache store. It consumes them
//! through these traits, bundled into [`Capabilities`]:
//!
//! | Trait | Operation |
//! |-------|-----------|
//! | [`Network`] | fetch a request |
//! | [`CacheStorage`] | named-cache lookup and write |
//! | [`FetchHandler`] | invoke the programmable handler |
//! | [`UrlPatternMatcher`] | judge URL patterns |
//!
//! Every I/O operation is a suspension point; implementations must be
//! `Send + Sync` because race branches run as independent tasks.

use crate::{GlobMatcher, RequestSnapshot, UrlPatternMatcher};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// A response produced by any source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Header name/value pairs, in order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Bytes,
}

impl Response {
    /// A response with the given status and body and no headers.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Add a header (builder pattern).
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns `true` for a 2xx status.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A network-level failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    /// The fetch failed before a response arrived.
    #[error("network request failed: {0}")]
    Failed(String),
    /// The fetch produced a non-OK response.
    #[error("network responded with status {0}")]
    Status(u16),
    /// The operation did not complete within the configured timeout.
    #[error("operation timed out")]
    TimedOut,
    /// The task running the operation was aborted or panicked.
    #[error("operation task ended abnormally: {0}")]
    Aborted(String),
}

/// The programmable handler declined the request or failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// The handler chose not to respond.
    #[error("fetch handler declined the request")]
    Declined,
    /// The handler failed.
    #[error("fetch handler failed: {0}")]
    Failed(String),
}

/// A named-cache write failed. Only ever observed through diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to write to cache \"{cache}\": {reason}")]
pub struct CacheWriteError {
    /// The cache that rejected the write.
    pub cache: String,
    /// Why.
    pub reason: String,
}

/// Network fetch capability.
#[async_trait]
pub trait Network: Send + Sync + fmt::Debug {
    /// Fetch the request from the network.
    ///
    /// A non-OK HTTP status is still `Ok(response)`; the executor judges it.
    async fn fetch(&self, request: &RequestSnapshot) -> Result<Response, NetworkError>;
}

/// Named-cache capability.
#[async_trait]
pub trait CacheStorage: Send + Sync + fmt::Debug {
    /// Look up a stored response. `None` is a miss.
    async fn lookup(&self, cache_name: &str, request: &RequestSnapshot) -> Option<Response>;

    /// Store a response, replacing any previous one for the same request.
    async fn put(
        &self,
        cache_name: &str,
        request: &RequestSnapshot,
        response: Response,
    ) -> Result<(), CacheWriteError>;
}

/// Programmable handler capability.
#[async_trait]
pub trait FetchHandler: Send + Sync + fmt::Debug {
    /// Invoke the handler. `callback_id` tags router-triggered invocations.
    async fn invoke(
        &self,
        request: &RequestSnapshot,
        callback_id: Option<&str>,
    ) -> Result<Response, HandlerError>;
}

/// The bundle of external operations a router drives.
#[derive(Clone)]
pub struct Capabilities {
    /// Network fetch.
    pub network: Arc<dyn Network>,
    /// Named caches.
    pub cache: Arc<dyn CacheStorage>,
    /// Programmable handler.
    pub handler: Arc<dyn FetchHandler>,
    /// URL pattern judge.
    pub patterns: Arc<dyn UrlPatternMatcher>,
}

impl Capabilities {
    /// Bundle capabilities using the built-in [`GlobMatcher`] for URL patterns.
    pub fn new(
        network: Arc<dyn Network>,
        cache: Arc<dyn CacheStorage>,
        handler: Arc<dyn FetchHandler>,
    ) -> Self {
        Self {
            network,
            cache,
            handler,
            patterns: Arc::new(GlobMatcher),
        }
    }

    /// Replace the URL pattern judge (builder pattern).
    #[must_use]
    pub fn with_patterns(mut self, patterns: Arc<dyn UrlPatternMatcher>) -> Self {
        self.patterns = patterns;
        self
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("network", &self.network)
            .field("cache", &self.cache)
            .field("handler", &self.handler)
            .field("patterns", &self.patterns)
            .finish()
    }
}
