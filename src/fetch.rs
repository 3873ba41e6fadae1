//! Network abstraction for testability.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::request::{CachedResponse, Request};

/// Abstraction over live network fetches.
///
/// Implementations return whatever the network produced, including non-2xx
/// responses; only transport failures are errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Performs `request` against the network and buffers the response.
    async fn fetch(&self, request: &Request) -> Result<CachedResponse>;
}

/// Default fetcher backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with a tuned connection pool.
    ///
    /// Redirects are not followed: a 3xx is handed back like any other
    /// response, so every fetch is exactly one request to the URL asked for.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .tcp_keepalive(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<CachedResponse> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        log::debug!("{} {} -> {status}", request.method, request.url);
        Ok(CachedResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted fetcher shared by the installer, interceptor and agent tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use reqwest::StatusCode;

    use super::Fetcher;
    use crate::error::{Error, Result};
    use crate::request::{CachedResponse, Request};

    enum Route {
        Respond(CachedResponse),
        Unreachable,
    }

    /// Serves canned responses by URL and records every call.
    pub struct MockFetcher {
        routes: Mutex<HashMap<String, Route>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockFetcher {
        pub fn new() -> Self {
            Self {
                routes: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn ok(&self, url: &str, body: &str) -> &Self {
            self.respond(url, CachedResponse::new(StatusCode::OK, body.to_string()))
        }

        pub fn respond(&self, url: &str, response: CachedResponse) -> &Self {
            self.routes
                .lock()
                .unwrap()
                .insert(url.to_string(), Route::Respond(response));
            self
        }

        pub fn unreachable(&self, url: &str) -> &Self {
            self.routes
                .lock()
                .unwrap()
                .insert(url.to_string(), Route::Unreachable);
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn calls_to(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
        }

        pub fn reset_calls(&self) {
            self.calls.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn fetch(&self, request: &Request) -> Result<CachedResponse> {
            let url = request.url.to_string();
            self.calls.lock().unwrap().push(url.clone());
            match self.routes.lock().unwrap().get(&url) {
                Some(Route::Respond(response)) => Ok(response.clone()),
                Some(Route::Unreachable) | None => Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    format!("connection refused: {url}"),
                ))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MockFetcher;
    use super::*;
    use crate::request::parse_origin;

    #[test]
    fn http_fetcher_builds() {
        assert!(HttpFetcher::new().is_ok());
    }

    #[tokio::test]
    async fn mock_fetcher_records_calls() {
        let fetcher = MockFetcher::new();
        fetcher.ok("http://origin/a", "a");

        let url = parse_origin("http://origin/a").unwrap();
        let response = fetcher.fetch(&Request::get(url.clone())).await.unwrap();
        assert_eq!(response.body.as_ref(), b"a");

        let missing = parse_origin("http://origin/b").unwrap();
        assert!(fetcher.fetch(&Request::get(missing)).await.is_err());

        assert_eq!(fetcher.calls(), vec!["http://origin/a", "http://origin/b"]);
        assert_eq!(fetcher.calls_to("http://origin/a"), 1);
    }
}
