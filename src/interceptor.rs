//! Cache-first request handling.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::request::{CachedResponse, Request};
use crate::store::CacheBucket;

/// Which branch produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Served from the cache bucket.
    Cache,
    /// Cache miss; fetched live and not stored.
    Network,
    /// The agent was not active; the request went straight to the network.
    Passthrough,
}

impl Source {
    /// Returns a short lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Network => "network",
            Self::Passthrough => "passthrough",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A response and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intercepted {
    /// The response, unmodified.
    pub response: CachedResponse,
    /// Branch that served it.
    pub source: Source,
}

/// Answers requests from a populated bucket, falling back to the network.
///
/// The bucket is only ever read here.
pub struct Interceptor<F: Fetcher = HttpFetcher> {
    bucket: Arc<dyn CacheBucket>,
    fetcher: Arc<F>,
}

impl<F: Fetcher> Interceptor<F> {
    /// Creates an interceptor over `bucket`.
    #[must_use]
    pub fn new(bucket: Arc<dyn CacheBucket>, fetcher: Arc<F>) -> Self {
        Self { bucket, fetcher }
    }

    /// Serves `request` from the bucket, or fetches it live on a miss.
    ///
    /// # Errors
    ///
    /// A failed lookup or a failed live fetch is returned as is.
    pub async fn handle(&self, request: &Request) -> Result<Intercepted> {
        if request.is_cacheable() {
            if let Some(response) = self.bucket.get(&request.key()).await? {
                log::debug!("hit {}", request.url);
                return Ok(Intercepted {
                    response,
                    source: Source::Cache,
                });
            }
        }

        log::debug!("miss {} {}", request.method, request.url);
        let response = self.fetcher.fetch(request).await?;
        Ok(Intercepted {
            response,
            source: Source::Network,
        })
    }
}
