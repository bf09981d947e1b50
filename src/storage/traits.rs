//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{ManifestTracker, SourceStores, Store};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file exists but is not a valid store or manifest; it is never overwritten
    #[error("Corrupt file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// A source's stores are only ever written by that source's task, so
/// implementations need no locking of their own.
pub trait Storage: Send + Sync {
    // ===== Stores =====

    /// Loads every year store of a source
    ///
    /// A source with no stores yet yields an empty set. A store that
    /// exists but cannot be parsed is an error.
    fn load_source_stores(&self, source_id: &str, source_name: &str) -> StorageResult<SourceStores>;

    /// Persists one store, replacing the previous version atomically
    fn save_store(&self, store: &Store) -> StorageResult<()>;

    // ===== Manifest =====

    /// Loads the manifest, or an empty one if none exists yet
    fn load_manifest(&self) -> StorageResult<ManifestTracker>;

    fn save_manifest(&self, manifest: &ManifestTracker) -> StorageResult<()>;
}
