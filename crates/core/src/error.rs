//! Unified error types for settee.
//!
//! Every failure surfaces to the immediate caller. A capacity rejection from
//! the cache is not an error: `CacheStore::set` returns `Ok(false)` instead.

use crate::config::ConfigError;

/// Unified error type for transport, protocol, and cache failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid arguments to a client operation (e.g., empty document id).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Loaded configuration failed validation.
    #[error("CONFIG_ERROR: {0}")]
    Configuration(String),

    /// Authentication scheme other than Basic.
    #[error("CONFIG_ERROR: unsupported auth scheme: {0}")]
    UnsupportedAuthScheme(String),

    /// TCP connect to the server failed.
    #[error("CONNECTION_ERROR: error connecting to {host}:{port} - {message}")]
    Connection { host: String, port: u16, message: String },

    /// The request could not be written to the socket.
    #[error("WRITE_ERROR: {0}")]
    Write(String),

    /// The response could not be read, or the read was interrupted.
    #[error("READ_ERROR: {0}")]
    Read(String),

    /// Connect, write, or read exceeded the configured timeout.
    #[error("TIMEOUT: {0}")]
    Timeout(String),

    /// The first response line is not `HTTP/<version> <status>`.
    #[error("MALFORMED_STATUS_LINE: {0}")]
    MalformedStatusLine(String),

    /// The server answered with an `error` field in its JSON body.
    #[error("REMOTE_ERROR: {error} ({}) [status {status}]", .reason.as_deref().unwrap_or(""))]
    Remote { error: String, reason: Option<String>, status: u16 },

    /// Writing the entry would leave the disk below its free-space margin.
    #[error("CACHE_ERROR: insufficient disk space: need {needed} bytes, {available} available")]
    InsufficientDiskSpace { needed: u64, available: u64 },

    /// Cache directory is missing, not a directory, or not readable and writable.
    #[error("CACHE_ERROR: invalid cache location: {0}")]
    InvalidCacheLocation(String),

    /// Empty key or an expiration that is not in the future.
    #[error("CACHE_ERROR: invalid parameters for caching: {0}")]
    InvalidCacheArgs(String),

    /// Cache file could not be read, written, or removed.
    #[error("CACHE_ERROR: {0}")]
    CacheIo(String),

    /// A payload could not be encoded as JSON.
    #[error("SERIALIZATION_ERROR: {0}")]
    Serialization(String),
}

impl Error {
    /// True for failures on the network leg, which callers may choose to retry.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Connection { .. } | Error::Write(_) | Error::Read(_) | Error::Timeout(_))
    }

    /// HTTP status carried by a remote error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
