//! Configuration module for Civic-Collector
//!
//! This module handles loading, parsing, and validating the TOML source catalog.
//!
//! # Example
//!
//! ```no_run
//! use civic_collector::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sources.toml")).unwrap();
//! for source in config.select_sources(None) {
//!     println!("{} ({})", source.name, source.kind.label());
//! }
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ClassificationRule, CollectorConfig, Config, OutputConfig, Predicate, Source, SourceKind,
    UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config, slugify};
