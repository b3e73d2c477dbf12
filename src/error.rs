//! Error types for the qrcache library.

use thiserror::Error;

/// Errors raised by the cache manager.
///
/// Nothing here is fatal to the host: every failure path leaves the
/// previously active generation, if any, intact and serving.
#[derive(Error, Debug)]
pub enum CacheError {
  /// A manifest asset could not be fetched during install. The install is
  /// aborted and the previous generation keeps serving.
  #[error("install aborted: could not populate {resource}")]
  PopulateFailure { resource: String },

  /// The store cannot accept another snapshot.
  #[error("cache storage exhausted")]
  StorageCapacity,

  /// No response could be obtained from the network.
  #[error("network unavailable for {url}: {reason}")]
  NetworkUnavailable { url: String, reason: String },

  /// Underlying storage failure.
  #[error("storage error: {0}")]
  Storage(#[from] rusqlite::Error),

  /// I/O failure preparing the storage location.
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  /// The storage mutex was poisoned by a panicking writer.
  #[error("storage lock poisoned")]
  LockPoisoned,

  /// Snapshot headers could not be encoded or decoded.
  #[error("snapshot encoding error: {0}")]
  Encoding(#[from] serde_json::Error),

  /// A stored timestamp was not in SQLite's datetime format.
  #[error("invalid stored timestamp: {0}")]
  Timestamp(String),

  /// A lifecycle entry point was called in the wrong phase.
  #[error("{operation} is not allowed in the {phase} phase")]
  InvalidPhase {
    operation: &'static str,
    phase: &'static str,
  },

  /// A resource path or method could not be resolved into a request.
  #[error("invalid resource {path}: {reason}")]
  InvalidResource { path: String, reason: String },

  /// The HTTP client could not be constructed.
  #[error("HTTP client error: {0}")]
  Http(#[from] reqwest::Error),
}

/// A specialized `Result` type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
