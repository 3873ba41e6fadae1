//! precache - a cache-first asset agent.
//!
//! On activation the agent opens a named cache bucket and fills it with a
//! fixed manifest of assets fetched from an origin. Afterwards every request
//! in scope is answered from that bucket when possible and fetched live,
//! without being stored, when not.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use precache::{AgentConfig, Agent, HttpFetcher, Installer, Manifest, MemoryStorage, Request};
//!
//! # async fn example() -> precache::Result<()> {
//! let installer = Installer::new(
//!     Manifest::from_static(&["/", "/style.css"]),
//!     Arc::new(MemoryStorage::new()),
//!     Arc::new(HttpFetcher::new()?),
//!     AgentConfig::new().with_origin("http://127.0.0.1:8000"),
//! );
//! let agent = Agent::new(installer);
//!
//! // Activation event: all-or-nothing population of the bucket.
//! let report = agent.activate().await?;
//! println!("Cached {} assets", report.entries);
//!
//! // Outgoing-request event: cache first, network on a miss.
//! let url = precache::request::parse_origin("http://127.0.0.1:8000/style.css")?;
//! let served = agent.handle_fetch(&Request::get(url)).await?;
//! println!("{} bytes from {}", served.response.body.len(), served.source);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod agent;
pub mod config;
pub mod error;
pub mod fetch;
pub mod installer;
pub mod interceptor;
pub mod manifest;
pub mod request;
#[cfg(feature = "server")]
pub mod server;
pub mod store;

// Re-export main types for convenience
pub use agent::{Agent, Lifecycle};
pub use config::{AgentConfig, AppConfig, ServerConfig, StorageConfig};
pub use error::{Error, Result};
pub use fetch::{Fetcher, HttpFetcher};
pub use installer::{InstallReport, Installation, Installer};
pub use interceptor::{Intercepted, Interceptor, Source};
pub use manifest::{DEFAULT_MANIFEST, Manifest};
pub use request::{CachedResponse, Request, RequestKey};
pub use store::{CacheBucket, CacheStorage, DiskStorage, MemoryStorage};
