//! Error types for the cache layer.
//!
//! The taxonomy is deliberately lopsided: registry mis-wiring is fail-fast
//! ([`RegistryError`] is returned to the caller), while everything that can
//! go wrong during steady-state cache traffic is modeled as [`CacheIoError`]
//! and caught inside the cache operations, which degrade to a miss.

use std::path::PathBuf;

/// Fail-fast errors from [`CacheRegistry`](crate::registry::CacheRegistry).
///
/// These indicate a wiring or programming mistake, not a transient cache
/// condition, and are the only errors the cache layer ever surfaces as `Err`.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The registry was used before `initialize` bound a configuration.
    #[error("cache registry not initialized; call initialize(config) first")]
    NotInitialized,

    /// No binding exists for the requested cache type.
    #[error("unknown cache type: {requested}; registered types: {registered:?}")]
    UnknownType {
        requested: String,
        registered: Vec<String>,
    },

    /// A binding exists for the type identifier, but it constructs a
    /// different concrete cache than the one requested.
    #[error("cache type {cache_type} is bound to a different implementation")]
    InstanceMismatch { cache_type: String },
}

/// Failures inside the locked file I/O layer.
///
/// Cache operations catch these, log them through `tracing`, and return
/// `None` / `false` so a broken or cold cache degrades to "recompute".
#[derive(Debug, thiserror::Error)]
pub enum CacheIoError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A compressed companion existed but contained no members.
    #[error("zip archive is empty: {path}")]
    EmptyArchive { path: PathBuf },

    /// A path could not be written because it has no parent directory.
    #[error("path has no parent directory: {path}")]
    NoParent { path: PathBuf },

    /// A binary artifact store was asked to cache a file that does not exist.
    #[error("source file not found: {path}")]
    MissingSource { path: PathBuf },
}
