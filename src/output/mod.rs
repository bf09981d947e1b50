//! Output module for persisting and reporting collection results
//!
//! This module handles:
//! - Atomic writes of store and manifest files
//! - Verification of the store files on disk
//! - Printing run and manifest statistics

pub mod stats;
mod verify;
mod writer;

pub use stats::{print_manifest_stats, print_run_summary};
pub use verify::{print_verify_report, verify_outputs, FileReport, VerifyReport, REQUIRED_FIELDS};
pub use writer::{write_atomic, write_json};
