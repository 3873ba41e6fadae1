//! Request descriptors, cache keys and stored responses.

use std::fmt;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An intercepted request: the identity used for cache lookup and, on a
/// miss, the exact request replayed against the network.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: Url,
    /// Request headers as received.
    pub headers: HeaderMap,
    /// Request body; empty for GET.
    pub body: Bytes,
}

impl Request {
    /// Creates a bodiless GET request for `url`.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Returns the key this request is stored or looked up under.
    #[must_use]
    pub fn key(&self) -> RequestKey {
        RequestKey::from_url(&self.url)
    }

    /// Only GET requests can be answered from the cache.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET
    }
}

/// Cache key: the absolute URL without its fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestKey(String);

impl RequestKey {
    /// Builds the key for a URL, dropping any fragment.
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(String::from(url))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A response as stored in, or served from, a cache bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl CachedResponse {
    /// Creates a response with no headers.
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Parses the origin every resource identifier is resolved against.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] if `origin` is not an absolute URL.
pub fn parse_origin(origin: &str) -> Result<Url> {
    Url::parse(origin).map_err(|e| Error::InvalidUrl {
        input: origin.to_string(),
        reason: e.to_string(),
    })
}

/// Resolves a resource identifier (a path or an absolute URL) against `origin`.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] if the identifier cannot be joined.
pub fn resolve(origin: &Url, identifier: &str) -> Result<Url> {
    origin.join(identifier).map_err(|e| Error::InvalidUrl {
        input: identifier.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        parse_origin("http://127.0.0.1:8000").unwrap()
    }

    #[test]
    fn resolve_paths_against_origin() {
        let url = resolve(&origin(), "/style.css").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8000/style.css");

        let root = resolve(&origin(), "/").unwrap();
        assert_eq!(root.as_str(), "http://127.0.0.1:8000/");
    }

    #[test]
    fn resolve_keeps_absolute_urls() {
        let url = resolve(&origin(), "https://cdn.example.com/a.js").unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/a.js");
    }

    #[test]
    fn parse_origin_rejects_relative() {
        let err = parse_origin("/not-absolute").unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }));
    }

    #[test]
    fn key_drops_fragment_keeps_query() {
        let url = resolve(&origin(), "/index.html?v=2#top").unwrap();
        let key = RequestKey::from_url(&url);
        assert_eq!(key.as_str(), "http://127.0.0.1:8000/index.html?v=2");
    }

    #[test]
    fn root_and_index_are_distinct_keys() {
        let root = Request::get(resolve(&origin(), "/").unwrap());
        let index = Request::get(resolve(&origin(), "/index.html").unwrap());
        assert_ne!(root.key(), index.key());
    }

    #[test]
    fn only_get_is_cacheable() {
        let mut request = Request::get(resolve(&origin(), "/").unwrap());
        assert!(request.is_cacheable());
        request.method = Method::POST;
        assert!(!request.is_cacheable());
    }
}
