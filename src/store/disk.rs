//! On-disk bucket backend.
//!
//! Each bucket is a directory under the storage root. Each entry is a pair of
//! files named by the SHA-256 of its key: `<hash>.body` holds the raw body and
//! `<hash>.json` the key, status and headers. An entry exists once its
//! `.json` file does; bodies are renamed into place first so a reader never
//! finds metadata without a body.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{CacheBucket, CacheStorage, validate_bucket_name};
use crate::error::{Error, Result};
use crate::request::{CachedResponse, RequestKey};

const META_EXT: &str = "json";
const BODY_EXT: &str = "body";
const STAGING_SUFFIX: &str = "tmp";

/// Buckets persisted as directories under `root`.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    /// Creates a storage rooted at `root`. The directory is created on first open.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheBucket>> {
        validate_bucket_name(name)?;
        let dir = self.root.join(name);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Arc::new(DiskBucket {
            name: name.to_string(),
            dir,
        }))
    }

    async fn has(&self, name: &str) -> Result<bool> {
        validate_bucket_name(name)?;
        Ok(tokio::fs::metadata(self.root.join(name))
            .await
            .is_ok_and(|m| m.is_dir()))
    }
}

/// Metadata stored next to each body.
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: RequestKey,
    status: u16,
    /// Header names with their values base64-encoded, in response order.
    headers: Vec<(String, String)>,
    body_len: u64,
    stored_at: DateTime<Utc>,
}

impl EntryMeta {
    fn from_response(key: RequestKey, response: &CachedResponse) -> Self {
        let headers = response
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    STANDARD.encode(value.as_bytes()),
                )
            })
            .collect();
        Self {
            key,
            status: response.status.as_u16(),
            headers,
            body_len: response.body.len() as u64,
            stored_at: Utc::now(),
        }
    }

    fn into_response(self, body: Bytes) -> Result<CachedResponse> {
        if body.len() as u64 != self.body_len {
            return Err(Error::Storage(format!(
                "body of {} is {} bytes, expected {}",
                self.key,
                body.len(),
                self.body_len
            )));
        }
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| Error::Storage(format!("{}: {e}", self.key)))?;
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Storage(format!("{}: {e}", self.key)))?;
            let value = STANDARD
                .decode(value)
                .map_err(|e| Error::Storage(format!("{}: {e}", self.key)))
                .and_then(|bytes| {
                    HeaderValue::from_bytes(&bytes)
                        .map_err(|e| Error::Storage(format!("{}: {e}", self.key)))
                })?;
            headers.append(name, value);
        }
        Ok(CachedResponse {
            status,
            headers,
            body,
        })
    }
}

/// A bucket stored in a single directory.
#[derive(Debug)]
pub struct DiskBucket {
    name: String,
    dir: PathBuf,
}

impl DiskBucket {
    fn stem(key: &RequestKey) -> String {
        let digest = Sha256::digest(key.as_str().as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn entry_path(&self, key: &RequestKey, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{ext}", Self::stem(key)))
    }

    /// Writes every entry to staging files. On failure, removes what was written.
    async fn stage(
        &self,
        entries: &[(RequestKey, CachedResponse)],
    ) -> Result<Vec<(PathBuf, PathBuf)>> {
        let mut staged = Vec::with_capacity(entries.len() * 2);
        for (key, response) in entries {
            let meta = EntryMeta::from_response(key.clone(), response);
            let json = serde_json::to_vec_pretty(&meta)
                .map_err(|e| Error::Storage(format!("{key}: {e}")))?;

            for (ext, contents) in [(BODY_EXT, response.body.as_ref()), (META_EXT, &json[..])] {
                let target = self.entry_path(key, ext);
                let tmp = target.with_extension(format!("{ext}.{STAGING_SUFFIX}"));
                if let Err(e) = tokio::fs::write(&tmp, contents).await {
                    let _ = tokio::fs::remove_file(&tmp).await;
                    remove_staged(&staged).await;
                    return Err(e.into());
                }
                staged.push((tmp, target));
            }
        }
        Ok(staged)
    }
}

async fn remove_staged(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        let _ = tokio::fs::remove_file(tmp).await;
    }
}

#[async_trait]
impl CacheBucket for DiskBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
        let meta = match tokio::fs::read(self.entry_path(key, META_EXT)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta: EntryMeta = serde_json::from_slice(&meta)
            .map_err(|e| Error::Storage(format!("{key}: {e}")))?;
        // Two keys sharing a hash would be a collision, not a hit.
        if &meta.key != key {
            return Ok(None);
        }
        let body = tokio::fs::read(self.entry_path(key, BODY_EXT)).await?;
        meta.into_response(Bytes::from(body)).map(Some)
    }

    async fn put_all(&self, entries: Vec<(RequestKey, CachedResponse)>) -> Result<()> {
        let staged = self.stage(&entries).await?;
        // Staging order is body then metadata per entry, so renaming in
        // order publishes each body before its metadata.
        for (i, (tmp, target)) in staged.iter().enumerate() {
            if let Err(e) = tokio::fs::rename(tmp, target).await {
                log::error!(
                    "Failed to commit {} in bucket '{}': {e}",
                    target.display(),
                    self.name
                );
                remove_staged(&staged[i..]).await;
                return Err(e.into());
            }
        }
        log::debug!("Committed {} entries to {}", entries.len(), self.dir.display());
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        let mut read_dir = tokio::fs::read_dir(&self.dir).await?;
        let mut keys = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == META_EXT) {
                let bytes = tokio::fs::read(&path).await?;
                let meta: EntryMeta = serde_json::from_slice(&bytes)
                    .map_err(|e| Error::Storage(format!("{}: {e}", path.display())))?;
                keys.push(meta.key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
