//! Error types for the add-on runner.
//!
//! Resolution-time errors abort the run; invocation-time errors are
//! recovered by the navigation loop.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while resolving, downloading or running add-ons.
#[derive(Debug, Error)]
pub enum Error {
    /// The addon.xml file is missing, malformed or lacks a recognized
    /// extension point.
    #[error("invalid manifest at {path}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },

    /// A required dependency exists neither locally nor on any remote
    /// repository.
    #[error("dependency '{0}' could not be found locally or on any repository")]
    DependencyNotFound(String),

    /// A download was requested for an id the remote catalog does not list.
    #[error("add-on '{0}' is not available on any configured repository")]
    AddonNotAvailable(String),

    /// An I/O failure occurred mid-download; the partial file has been
    /// cleaned up.
    #[error("download of '{0}' failed: {1}")]
    DownloadFailed(String, #[source] io::Error),

    /// The add-on's own code raised an error during execution.
    #[error("add-on '{0}' failed during execution")]
    AddonRuntimeError(String),

    /// The worker process died without sending a final message.
    #[error("worker for '{0}' became unresponsive")]
    WorkerUnresponsive(String),

    /// The worker channel carried a message that could not be decoded.
    #[error("invalid channel message: {0}")]
    ChannelProtocol(String),

    /// A version string could not be parsed into numeric fields.
    #[error("invalid version string '{0}'")]
    InvalidVersion(String),

    /// A callback url was not a valid plugin:// url.
    #[error("invalid callback url '{0}'")]
    InvalidUrl(String),

    /// HTTP request failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Archive extraction failure.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Generic IO error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
