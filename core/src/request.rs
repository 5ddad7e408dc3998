//! `RequestSnapshot`: the immutable view of a request that rules inspect.
//!
//! A snapshot is taken once per routing decision. Racing branches each own a
//! clone, so the inner data is shared behind an `Arc` and cloning is cheap.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use url::Url;

/// Error building a [`RequestSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// The request URL could not be parsed as an absolute URL.
    #[error("invalid request URL \"{url}\": {source}")]
    InvalidUrl {
        /// The URL as given.
        url: String,
        /// The parser's complaint.
        source: url::ParseError,
    },
}

struct RequestInner {
    url: Url,
    method: String,
    mode: String,
    destination: String,
    headers: HashMap<String, String>,
}

/// Immutable capture of the request attributes conditions may inspect.
///
/// Defaults follow `fetch()`: method `GET`, mode `cors`, empty destination.
#[derive(Clone)]
pub struct RequestSnapshot {
    inner: Arc<RequestInner>,
}

impl RequestSnapshot {
    /// Start building a snapshot for the given absolute URL.
    #[must_use]
    pub fn builder(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            url: url.into(),
            method: "GET".to_owned(),
            mode: "cors".to_owned(),
            destination: String::new(),
            headers: HashMap::new(),
        }
    }

    /// A plain `GET` snapshot for the given URL.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidUrl`] if `url` is not an absolute URL.
    pub fn get(url: impl Into<String>) -> Result<Self, RequestError> {
        Self::builder(url).build()
    }

    /// The request URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// The request method, upper-cased.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.inner.method
    }

    /// The request mode (`navigate`, `cors`, `no-cors`, `same-origin`, ...).
    #[must_use]
    pub fn mode(&self) -> &str {
        &self.inner.mode
    }

    /// The request destination (`document`, `image`, `script`, ...), possibly empty.
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.inner.destination
    }

    /// Get a header value by name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner
            .headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The key used to address this request in a named cache: the URL
    /// without its fragment.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let mut url = self.inner.url.clone();
        url.set_fragment(None);
        url.into()
    }
}

impl fmt::Debug for RequestSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSnapshot")
            .field("url", &self.inner.url.as_str())
            .field("method", &self.inner.method)
            .field("mode", &self.inner.mode)
            .field("destination", &self.inner.destination)
            .finish_non_exhaustive()
    }
}

impl PartialEq for RequestSnapshot {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.url == other.inner.url
                && self.inner.method == other.inner.method
                && self.inner.mode == other.inner.mode
                && self.inner.destination == other.inner.destination
                && self.inner.headers == other.inner.headers)
    }
}

/// Builder for [`RequestSnapshot`].
#[derive(Debug)]
pub struct RequestBuilder {
    url: String,
    method: String,
    mode: String,
    destination: String,
    headers: HashMap<String, String>,
}

impl RequestBuilder {
    /// Set the HTTP method (normalized to upper case).
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_ascii_uppercase();
        self
    }

    /// Set the request mode.
    #[must_use]
    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    /// Set the request destination.
    #[must_use]
    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    /// Add a header (name is lowercased for case-insensitive lookup).
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Build the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidUrl`] if the URL is not absolute.
    pub fn build(self) -> Result<RequestSnapshot, RequestError> {
        let url = Url::parse(&self.url).map_err(|source| RequestError::InvalidUrl {
            url: self.url.clone(),
            source,
        })?;
        Ok(RequestSnapshot {
            inner: Arc::new(RequestInner {
                url,
                method: self.method,
                mode: self.mode,
                destination: self.destination,
                headers: self.headers,
            }),
        })
    }
}
