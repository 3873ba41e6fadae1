//! Configuration for the agent, its storage and the host server.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Bucket name used when none is configured.
pub const DEFAULT_BUCKET: &str = "my-cache";

/// Port the host server listens on by default.
pub const DEFAULT_PORT: u16 = 9724;

/// Agent settings shared by the installer and interceptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Origin that manifest identifiers and intercepted paths resolve against.
    pub origin: String,
    /// Name of the cache bucket.
    pub bucket: String,
    /// Maximum number of manifest fetches in flight during install.
    pub concurrent_fetches: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:8000".to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
            concurrent_fetches: 4,
        }
    }
}

impl AgentConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the origin URL.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Sets the bucket name.
    #[must_use]
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Sets the install concurrency. Zero is treated as one.
    #[must_use]
    pub const fn with_concurrent_fetches(mut self, concurrent: usize) -> Self {
        self.concurrent_fetches = concurrent;
        self
    }
}

/// Where buckets are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for on-disk buckets.
    pub dir: PathBuf,
    /// Keep buckets in memory only.
    pub memory: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
            memory: false,
        }
    }
}

/// Returns the directory buckets are stored under.
///
/// Uses `STATE_DIRECTORY` (set by systemd when `StateDirectory=` is configured),
/// falling back to `$XDG_DATA_HOME/precache` for interactive use.
#[must_use]
pub fn default_storage_dir() -> PathBuf {
    std::env::var("STATE_DIRECTORY").map_or_else(
        |_| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("precache")
                .join("buckets")
        },
        |dir| PathBuf::from(dir).join("buckets"),
    )
}

/// Host server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Complete application configuration as stored in `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Agent settings.
    pub agent: AgentConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Server settings.
    pub server: ServerConfig,
}

impl AppConfig {
    /// Returns the default config file location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("precache")
            .join("config.toml")
    }

    /// Parses a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not valid TOML for this schema.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Loads the config at `path`, writing a default template if it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or created.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save(path)?;
                log::info!("Wrote default config to {}", path.display());
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Saves the config atomically (write tmp + rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        let tmp_path = path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, text)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Applies `PRECACHE_ORIGIN` and `PRECACHE_PORT` from the process environment.
    #[must_use]
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides from `lookup`; unparsable values are ignored.
    #[must_use]
    pub fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(origin) = lookup("PRECACHE_ORIGIN") {
            self.agent.origin = origin;
        }
        if let Some(port) = lookup("PRECACHE_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_agent_config() {
        let config = AgentConfig::default();
        assert_eq!(config.bucket, "my-cache");
        assert_eq!(config.concurrent_fetches, 4);
        assert_eq!(config.origin, "http://127.0.0.1:8000");
    }

    #[test]
    fn agent_config_builder_pattern() {
        let config = AgentConfig::new()
            .with_origin("https://example.com")
            .with_bucket("assets")
            .with_concurrent_fetches(16);

        assert_eq!(config.origin, "https://example.com");
        assert_eq!(config.bucket, "assets");
        assert_eq!(config.concurrent_fetches, 16);
    }

    #[test]
    fn default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn default_storage_is_on_disk() {
        let config = StorageConfig::default();
        assert!(!config.memory);
        assert!(config.dir.ends_with("buckets"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [agent]
            origin = "https://static.example.com"

            [server]
            port = 8080
            "#,
        )
        .unwrap();
        assert_eq!(config.agent.origin, "https://static.example.com");
        assert_eq!(config.agent.bucket, DEFAULT_BUCKET);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = AppConfig::from_toml("[agent\norigin = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn load_or_create_writes_template() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = AppConfig::load_or_create(&path).unwrap();
        assert!(path.exists());

        let loaded = AppConfig::load_or_create(&path).unwrap();
        assert_eq!(created, loaded);
    }

    #[test]
    fn env_overrides_apply() {
        let config = AppConfig::default().apply_env_from(|name| match name {
            "PRECACHE_ORIGIN" => Some("http://origin.test".to_string()),
            "PRECACHE_PORT" => Some("7000".to_string()),
            _ => None,
        });
        assert_eq!(config.agent.origin, "http://origin.test");
        assert_eq!(config.server.port, 7000);
    }

    #[test]
    fn bad_port_env_is_ignored() {
        let config = AppConfig::default()
            .apply_env_from(|name| (name == "PRECACHE_PORT").then(|| "nope".to_string()));
        assert_eq!(config.server.port, DEFAULT_PORT);
    }
}
