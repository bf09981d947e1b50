//! Crawler module for collecting document links
//!
//! This module contains the core collection logic, including:
//! - HTTP fetching with retry logic and politeness delays
//! - HTML link extraction per source kind
//! - Document-type classification
//! - Overall run coordination

mod classifier;
mod coordinator;
mod extractor;
mod fetcher;

pub use classifier::{builtin_rules, DocTypeClassifier, DEFAULT_DOC_TYPE};
pub use coordinator::{collect, ExitStatus, RunCoordinator, RunSummary, SourceReport};
pub use extractor::{CandidateLink, LinkExtractor, PageLinks, PageRole};
pub use fetcher::{
    build_http_client, classify_status, FetchedPage, Fetcher, NetworkError, RetryPolicy,
};
