//! Activation-time population of the cache bucket.

use std::collections::HashSet;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};

use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::manifest::Manifest;
use crate::request::{CachedResponse, Request, RequestKey, parse_origin, resolve};
use crate::store::{CacheBucket, CacheStorage};

/// Summary of a successful installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Bucket that was populated.
    pub bucket: String,
    /// Number of entries stored.
    pub entries: usize,
    /// Total body bytes stored.
    pub bytes: u64,
}

/// A populated bucket together with its report.
pub struct Installation {
    /// The bucket the manifest was written to.
    pub bucket: Arc<dyn CacheBucket>,
    /// What was written.
    pub report: InstallReport,
}

/// Fetches every manifest entry and commits them to the bucket as one unit.
pub struct Installer<F: Fetcher = HttpFetcher> {
    manifest: Manifest,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<F>,
    config: AgentConfig,
}

impl<F: Fetcher> Installer<F> {
    /// Creates an installer for `manifest`.
    #[must_use]
    pub fn new(
        manifest: Manifest,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<F>,
        config: AgentConfig,
    ) -> Self {
        Self {
            manifest,
            storage,
            fetcher,
            config,
        }
    }

    /// Returns the agent configuration.
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Returns the shared fetcher.
    #[must_use]
    pub fn fetcher(&self) -> Arc<F> {
        Arc::clone(&self.fetcher)
    }

    /// Resolves the manifest into GET requests, dropping entries that map to
    /// an already-seen key.
    fn requests(&self) -> Result<Vec<Request>> {
        let origin = parse_origin(&self.config.origin)?;
        let mut seen = HashSet::new();
        let mut requests = Vec::with_capacity(self.manifest.len());
        for identifier in self.manifest.iter() {
            let request = Request::get(resolve(&origin, identifier)?);
            if seen.insert(request.key()) {
                requests.push(request);
            }
        }
        Ok(requests)
    }

    /// Fetches one asset; anything but a 2xx response fails the install.
    async fn fetch_asset(&self, request: Request) -> Result<(RequestKey, CachedResponse)> {
        let url = request.url.to_string();
        let response = self
            .fetcher
            .fetch(&request)
            .await
            .map_err(|e| Error::Install {
                url: url.clone(),
                source: Box::new(e),
            })?;

        if !response.is_success() {
            return Err(Error::Install {
                url: url.clone(),
                source: Box::new(Error::Status {
                    url,
                    status: response.status.as_u16(),
                }),
            });
        }

        log::debug!("Fetched {url} ({} bytes)", response.body.len());
        Ok((request.key(), response))
    }

    /// Opens the bucket and fills it with every manifest entry.
    ///
    /// Nothing is written unless every fetch succeeds. Fetches run
    /// concurrently, and the first failure cancels the rest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Install`] if any entry fails to fetch or answers with
    /// a non-success status, or a storage error if the bucket cannot be
    /// opened or written.
    pub async fn install(&self) -> Result<Installation> {
        let requests = self.requests()?;
        let bucket = self.storage.open(&self.config.bucket).await?;

        log::info!(
            "Installing {} assets from {} into bucket '{}'",
            requests.len(),
            self.config.origin,
            bucket.name()
        );

        let fetched: Vec<(RequestKey, CachedResponse)> = stream::iter(requests)
            .map(|request| self.fetch_asset(request))
            .buffer_unordered(self.config.concurrent_fetches.max(1))
            .try_collect()
            .await
            .inspect_err(|e| log::error!("Install aborted: {e}"))?;

        let report = InstallReport {
            bucket: bucket.name().to_string(),
            entries: fetched.len(),
            bytes: fetched.iter().map(|(_, r)| r.body.len() as u64).sum(),
        };

        bucket.put_all(fetched).await?;

        log::info!(
            "Installed {} assets ({} bytes) into bucket '{}'",
            report.entries,
            report.bytes,
            report.bucket
        );
        Ok(Installation { bucket, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::MockFetcher;
    use crate::store::MemoryStorage;
    use reqwest::StatusCode;

    const ORIGIN: &str = "http://origin.test";

    fn installer(manifest: &[&str], fetcher: &Arc<MockFetcher>) -> (Installer<MockFetcher>, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let installer = Installer::new(
            Manifest::from_static(manifest),
            Arc::clone(&storage) as Arc<dyn CacheStorage>,
            Arc::clone(fetcher),
            AgentConfig::new().with_origin(ORIGIN),
        );
        (installer, storage)
    }

    #[tokio::test]
    async fn install_stores_one_entry_per_identifier() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher
            .ok("http://origin.test/", "home")
            .ok("http://origin.test/index.html", "index")
            .ok("http://origin.test/style.css", "css")
            .ok("http://origin.test/unrelated.js", "never fetched");
        let (installer, _) = installer(&["/", "/index.html", "/style.css"], &fetcher);

        let installation = installer.install().await.unwrap();

        assert_eq!(installation.report.entries, 3);
        assert_eq!(installation.report.bytes, 4 + 5 + 3);
        let keys: Vec<String> = installation
            .bucket
            .keys()
            .await
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            keys,
            vec![
                "http://origin.test/",
                "http://origin.test/index.html",
                "http://origin.test/style.css",
            ]
        );
        assert_eq!(fetcher.calls_to("http://origin.test/unrelated.js"), 0);
    }

    #[tokio::test]
    async fn install_uses_configured_bucket() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.ok("http://origin.test/", "home");
        let (installer, storage) = installer(&["/"], &fetcher);

        installer.install().await.unwrap();

        assert!(storage.has("my-cache").await.unwrap());
    }

    #[tokio::test]
    async fn one_unreachable_asset_fails_install() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher
            .ok("http://origin.test/", "home")
            .unreachable("http://origin.test/style.css")
            .ok("http://origin.test/script.js", "js");
        let (installer, storage) = installer(&["/", "/style.css", "/script.js"], &fetcher);

        let Err(err) = installer.install().await else {
            panic!("install should fail");
        };

        assert!(err.is_install_failure());
        assert!(err.to_string().contains("style.css"));
        let bucket = storage.open("my-cache").await.unwrap();
        assert!(bucket.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn non_success_status_fails_install() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher
            .ok("http://origin.test/", "home")
            .respond(
                "http://origin.test/missing.png",
                CachedResponse::new(StatusCode::NOT_FOUND, "not found"),
            );
        let (installer, storage) = installer(&["/", "/missing.png"], &fetcher);

        let Err(Error::Install { url, source }) = installer.install().await else {
            panic!("expected install failure");
        };

        assert_eq!(url, "http://origin.test/missing.png");
        assert!(matches!(*source, Error::Status { status: 404, .. }));
        let bucket = storage.open("my-cache").await.unwrap();
        assert_eq!(bucket.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_identifiers_fetch_once() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.ok("http://origin.test/style.css", "css");
        let (installer, _) = installer(&["/style.css", "style.css", "/style.css#top"], &fetcher);

        let installation = installer.install().await.unwrap();

        assert_eq!(installation.report.entries, 1);
        assert_eq!(fetcher.calls_to("http://origin.test/style.css"), 1);
    }

    #[tokio::test]
    async fn empty_manifest_installs_nothing() {
        let fetcher = Arc::new(MockFetcher::new());
        let (installer, _) = installer(&[], &fetcher);

        let installation = installer.install().await.unwrap();

        assert_eq!(installation.report.entries, 0);
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_origin_is_rejected_before_fetching() {
        let fetcher = Arc::new(MockFetcher::new());
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let installer = Installer::new(
            Manifest::from_static(&["/"]),
            storage,
            Arc::clone(&fetcher),
            AgentConfig::new().with_origin("not a url"),
        );

        assert!(matches!(
            installer.install().await,
            Err(Error::InvalidUrl { .. })
        ));
        assert!(fetcher.calls().is_empty());
    }
}
