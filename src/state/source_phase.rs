//! Per-source run phases
//!
//! A source moves `Init → Fetching ⇄ Extracting → Classifying → Merging →
//! Writing → Done`. `Failed` is reachable from every non-terminal phase.

use crate::CollectorError;
use std::fmt;

/// Represents the current phase of one source's collection run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourcePhase {
    // ===== Active Phases =====
    /// Task created, nothing requested yet
    Init,

    /// Fetching a listing or detail page
    Fetching,

    /// Applying discovery rules to a fetched page
    Extracting,

    /// Assigning doc types to discovered links
    Classifying,

    /// Reconciling discovered links with the stored items
    Merging,

    /// Persisting changed stores
    Writing,

    // ===== Terminal Phases =====
    /// Finished, possibly with some per-page failures
    Done,

    /// Nothing usable was collected or a store could not be read or written
    Failed,
}

impl SourcePhase {
    /// Returns true if this is a terminal phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if the source completed (fully or partially)
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Whether moving from `self` to `next` is a legal step
    ///
    /// Fetching may repeat (several listing pages) and Extracting may go back
    /// to Fetching for follow-up detail pages. Merging may finish directly
    /// when no store needs writing, and Init may finish directly when every
    /// listing page was skipped as recently processed.
    pub fn can_transition_to(&self, next: SourcePhase) -> bool {
        use SourcePhase::*;

        if next == Failed {
            return !self.is_terminal();
        }

        matches!(
            (*self, next),
            (Init, Fetching)
                | (Init, Done)
                | (Fetching, Fetching)
                | (Fetching, Extracting)
                | (Fetching, Classifying)
                | (Extracting, Fetching)
                | (Extracting, Classifying)
                | (Classifying, Merging)
                | (Merging, Writing)
                | (Merging, Done)
                | (Writing, Done)
        )
    }

    /// Lowercase label used in logs and the run summary
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Classifying => "classifying",
            Self::Merging => "merging",
            Self::Writing => "writing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SourcePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the phase of one source and rejects illegal transitions
#[derive(Debug, Clone)]
pub struct SourceProgress {
    source_id: String,
    phase: SourcePhase,
}

impl SourceProgress {
    pub fn new(source_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            phase: SourcePhase::Init,
        }
    }

    pub fn phase(&self) -> SourcePhase {
        self.phase
    }

    /// Moves to `next`, or returns `InvalidTransition`
    pub fn advance(&mut self, next: SourcePhase) -> Result<(), CollectorError> {
        if !self.phase.can_transition_to(next) {
            return Err(CollectorError::InvalidTransition {
                source_id: self.source_id.clone(),
                from: self.phase,
                to: next,
            });
        }
        tracing::trace!("{}: {} -> {}", self.source_id, self.phase, next);
        self.phase = next;
        Ok(())
    }

    /// Marks the run failed; a no-op when already terminal
    pub fn fail(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = SourcePhase::Failed;
        }
    }
}
