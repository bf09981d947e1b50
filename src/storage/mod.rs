//! Storage module for persisting collected items
//!
//! This module handles:
//! - Per-source, per-year item stores and the merge of each run into them
//! - The cross-run manifest of processed and failing urls
//! - The JSON file backend behind the `Storage` trait

mod json;
mod manifest;
mod merge;
mod store;
mod traits;

pub use json::{JsonStorage, StoreFile};
pub use manifest::{ManifestEntry, ManifestStats, ManifestTracker, Outcome, RunRecord, MAX_RUN_HISTORY};
pub use merge::{MergeReport, ProspectiveItem, SourceStores};
pub use store::{Item, ItemStatus, Store, StoreMetadata};
pub use traits::{Storage, StorageError, StorageResult};

use crate::config::OutputConfig;

/// Opens the JSON storage rooted at the configured output directory
pub fn open_storage(output: &OutputConfig) -> JsonStorage {
    JsonStorage::new(output)
}
