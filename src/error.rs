//! Error types for the sync and query engine
//!
//! Errors are grouped by the component that raises them. Variants carry
//! string payloads (not error sources) so the whole taxonomy stays `Clone`
//! and a single update outcome can be shared between coalesced callers.

use thiserror::Error;

use crate::core::series::DataSeries;

/// Errors raised while fetching or interpreting remote data files.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    #[error("Version file not found at {url}")]
    VersionFileNotFound { url: String },

    #[error("Version file at {url} not accessible: {reason}")]
    VersionFileNotAccessible { url: String, reason: String },

    #[error("Version file invalid: {reason}")]
    VersionFileInvalid { reason: String },

    #[error("No version {major} for series {series} in the version file")]
    MajorVersionNotFound { series: DataSeries, major: u32 },

    #[error("Local database {local} is newer than the remote {remote}")]
    DatabaseTooOld { local: String, remote: String },

    #[error("Data file not found at {url}")]
    DatabaseFileNotFound { url: String },

    #[error("Data file at {url} not accessible: {reason}")]
    DatabaseFileNotAccessible { url: String, reason: String },

    #[error("No bytes received for {url} within {seconds}s")]
    Stalled { url: String, seconds: u64 },

    #[error("Data file {url} does not start with a header line")]
    FileHeaderMissing { url: String },

    #[error("Data file {url} contains a second header line")]
    FileHeaderDuplicate { url: String },

    #[error("Header of {url} declares version {header} but the file is {expected}")]
    FileVersionMismatch { url: String, header: String, expected: String },

    #[error("Invalid JSON in data file: {reason}")]
    FileInvalidJson { reason: String },

    #[error("Unrecognized record in data file: {reason}")]
    FileInvalidRecord { reason: String },

    #[error("Deletion record in a full snapshot")]
    DeletionInSnapshot,

    #[error("Version header while the previous version is still open")]
    UnexpectedVersion,

    #[error("Stream ended with an unclosed version")]
    UnclosedVersion,

    #[error("Download canceled")]
    Canceled,
}

impl DownloadError {
    /// Whether retrying the download later can plausibly succeed.
    ///
    /// Network-class failures (unreachable origin, missing files, stalls)
    /// are retriable. Protocol-class failures mean the upstream content is
    /// malformed and retrying would replay the same failure.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            DownloadError::VersionFileNotFound { .. }
                | DownloadError::VersionFileNotAccessible { .. }
                | DownloadError::VersionFileInvalid { .. }
                | DownloadError::DatabaseFileNotFound { .. }
                | DownloadError::DatabaseFileNotAccessible { .. }
                | DownloadError::Stalled { .. }
        )
    }
}

/// Errors raised by the local store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing engine cannot be used at all (permissions, a lock held
    /// by another process, corrupt directory).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store schema {stored} is newer than the supported schema {supported}")]
    SchemaTooNew { stored: u32, supported: u32 },

    #[error("Store quota exceeded: {0}")]
    QuotaExceeded(String),

    /// A write raced with a conflicting write. Worth a bounded retry.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Storage engine error: {0}")]
    Engine(String),

    #[error("Record serialization failed: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        let msg = err.to_string();
        // RocksDB reports a held LOCK file and a full disk through the same
        // error type; classify from the message.
        if msg.contains("lock") || msg.contains("LOCK") {
            StoreError::Unavailable(msg)
        } else if msg.contains("No space left") {
            StoreError::QuotaExceeded(msg)
        } else {
            StoreError::Engine(msg)
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Top-level outcome of an update run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Update aborted")]
    Aborted,

    #[error("An update for {series} is already in progress")]
    OverlappingUpdate { series: DataSeries },

    #[error("Network is offline")]
    Offline,
}

impl UpdateError {
    pub fn is_retriable(&self) -> bool {
        match self {
            UpdateError::Download(e) => e.is_retriable(),
            UpdateError::Store(StoreError::Constraint(_)) => true,
            UpdateError::Offline => true,
            _ => false,
        }
    }

    /// Constraint-class store failures get a short idle-time retry rather
    /// than exponential backoff.
    pub fn is_constraint(&self) -> bool {
        matches!(self, UpdateError::Store(StoreError::Constraint(_)))
    }

    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            UpdateError::Aborted | UpdateError::Download(DownloadError::Canceled)
        )
    }
}
