//! Civic-Collector: a polite municipal document link collector
//!
//! This crate implements a per-source, rate-limited collector that discovers
//! document links on municipal listing pages, classifies them by document type,
//! and merges them into an append-only, year-partitioned JSON store.

pub mod config;
pub mod crawler;
pub mod logging;
pub mod output;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

pub use crawler::NetworkError;
pub use storage::StorageError;

/// Main error type for collector operations
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid state transition for source {source_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        source_id: String,
        from: state::SourcePhase,
        to: state::SourcePhase,
    },

    #[error("Source {source_id} failed: {reason}")]
    SourceFailed { source_id: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("No source matches '{0}'")]
    UnknownSource(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL: {0}")]
    MissingHost(String),
}

/// Result type alias for collector operations
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{Config, Source, SourceKind};
pub use crawler::{collect, ExitStatus, RunCoordinator, RunSummary};
pub use state::SourcePhase;
