//! Agent lifecycle: binds installation and interception to host events.
//!
//! The host delivers two events. `activate` fires once per lifecycle and
//! runs the installer; `handle_fetch` fires for every request in scope.
//! Requests are intercepted only after a successful activation. Until then,
//! or after a failed one, they go straight to the network.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{OnceCell, RwLock};

use crate::error::Result;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::installer::{InstallReport, Installation, Installer};
use crate::interceptor::{Intercepted, Interceptor, Source};
use crate::request::Request;

/// Where the agent is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    /// Not yet activated, or an activation is in progress.
    Installing,
    /// Installed; requests are intercepted.
    Activated,
    /// The last activation failed; requests pass through.
    Failed(String),
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installing => f.write_str("installing"),
            Self::Activated => f.write_str("activated"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

struct Active<F: Fetcher> {
    interceptor: Interceptor<F>,
    report: InstallReport,
}

/// A cache-first agent.
pub struct Agent<F: Fetcher = HttpFetcher> {
    installer: Installer<F>,
    fetcher: Arc<F>,
    active: OnceCell<Active<F>>,
    lifecycle: RwLock<Lifecycle>,
}

impl<F: Fetcher> Agent<F> {
    /// Creates an agent that has not been activated yet.
    #[must_use]
    pub fn new(installer: Installer<F>) -> Self {
        let fetcher = installer.fetcher();
        Self {
            installer,
            fetcher,
            active: OnceCell::new(),
            lifecycle: RwLock::new(Lifecycle::Installing),
        }
    }

    /// Returns the installer.
    #[must_use]
    pub const fn installer(&self) -> &Installer<F> {
        &self.installer
    }

    /// Returns the current lifecycle state.
    pub async fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.read().await.clone()
    }

    /// Returns true once requests are being intercepted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.initialized()
    }

    /// Handles the activation event.
    ///
    /// Runs the installer and, on success, starts intercepting. After a
    /// success further calls return the original report without reinstalling.
    /// After a failure the next call tries again.
    ///
    /// # Errors
    ///
    /// Returns the installation error; the agent is left in
    /// [`Lifecycle::Failed`] and keeps passing requests through.
    pub async fn activate(&self) -> Result<InstallReport> {
        // Concurrent callers wait on the same install; a failure leaves the
        // cell empty for the next call.
        let active = self.active.get_or_try_init(|| self.install()).await?;
        Ok(active.report.clone())
    }

    async fn install(&self) -> Result<Active<F>> {
        *self.lifecycle.write().await = Lifecycle::Installing;
        match self.installer.install().await {
            Ok(Installation { bucket, report }) => {
                log::info!("Agent activated on bucket '{}'", report.bucket);
                *self.lifecycle.write().await = Lifecycle::Activated;
                Ok(Active {
                    interceptor: Interceptor::new(bucket, Arc::clone(&self.fetcher)),
                    report,
                })
            }
            Err(e) => {
                log::error!("Activation failed: {e}");
                *self.lifecycle.write().await = Lifecycle::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Handles an outgoing-request event.
    ///
    /// # Errors
    ///
    /// Network failures are returned unchanged.
    pub async fn handle_fetch(&self, request: &Request) -> Result<Intercepted> {
        if let Some(active) = self.active.get() {
            return active.interceptor.handle(request).await;
        }

        let response = self.fetcher.fetch(request).await?;
        Ok(Intercepted {
            response,
            source: Source::Passthrough,
        })
    }
}
