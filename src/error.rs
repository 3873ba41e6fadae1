//! Error types for the precache library.

use thiserror::Error;

/// Errors that can occur while installing or serving cached assets.
#[derive(Error, Debug)]
pub enum Error {
    /// Network failure while talking to the origin.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The origin answered with a non-success status.
    #[error("{url} returned {status}")]
    Status {
        /// URL that was requested.
        url: String,
        /// Status code received.
        status: u16,
    },

    /// Populating the cache bucket failed; the activation did not complete.
    #[error("install failed at {url}: {source}")]
    Install {
        /// First manifest entry that failed.
        url: String,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// A resource identifier or origin could not be resolved to a URL.
    #[error("invalid URL {input:?}: {reason}")]
    InvalidUrl {
        /// The text that failed to parse.
        input: String,
        /// Parser message.
        reason: String,
    },

    /// Bucket name is not usable as a storage key.
    #[error("invalid bucket name: {0:?}")]
    InvalidBucketName(String),

    /// A stored entry could not be decoded.
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error during storage operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed or written.
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true if this error aborted an installation.
    #[must_use]
    pub const fn is_install_failure(&self) -> bool {
        matches!(self, Self::Install { .. })
    }
}

/// A specialized `Result` type for precache operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_error_wraps_cause() {
        let err = Error::Install {
            url: "http://origin/style.css".to_string(),
            source: Box::new(Error::Status {
                url: "http://origin/style.css".to_string(),
                status: 404,
            }),
        };
        assert!(err.is_install_failure());
        let msg = err.to_string();
        assert!(msg.contains("style.css"));
        assert!(msg.contains("404"));
    }

    #[test]
    fn status_error_is_not_install_failure() {
        let err = Error::Status {
            url: "http://origin/".to_string(),
            status: 500,
        };
        assert!(!err.is_install_failure());
    }
}
