//! State module for tracking collection progress
//!
//! # Components
//!
//! - `SourcePhase`: the phase of one source's run (fetching, merging, done, ...)
//! - `SourceProgress`: enforces legal phase transitions for a source
//! - `HostThrottle`: per-source politeness delay between requests

mod host_throttle;
mod source_phase;

// Re-export main types
pub use host_throttle::HostThrottle;
pub use source_phase::{SourcePhase, SourceProgress};
