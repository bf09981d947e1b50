//! Cross-run bookkeeping of processed urls
//!
//! The manifest is independent of the stores: it answers "was this url
//! handled recently, and did it work", which lets a run skip listing pages
//! fetched successfully within the configured window.
//!
//! On disk it is `{last_full_run, urls_processed: {url: ts}, urls_failed: [..],
//! runs: [..]}`; a url's outcome is `Failure` iff it is in `urls_failed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Number of runs kept in the history
pub const MAX_RUN_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub url: String,
    pub last_processed: DateTime<Utc>,
    pub outcome: Outcome,
}

/// One entry of the run history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// `--source` selector, when one was given
    #[serde(default)]
    pub source_filter: Option<String>,
    pub config_hash: String,
    #[serde(default)]
    pub sources_ok: usize,
    #[serde(default)]
    pub sources_failed: usize,
    #[serde(default)]
    pub items_inserted: usize,
    #[serde(default)]
    pub items_seen_again: usize,
}

impl RunRecord {
    pub fn start(started_at: DateTime<Utc>, source_filter: Option<&str>, config_hash: &str) -> Self {
        Self {
            started_at,
            finished_at: None,
            source_filter: source_filter.map(str::to_string),
            config_hash: config_hash.to_string(),
            sources_ok: 0,
            sources_failed: 0,
            items_inserted: 0,
            items_seen_again: 0,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    last_full_run: Option<DateTime<Utc>>,
    #[serde(default)]
    urls_processed: BTreeMap<String, DateTime<Utc>>,
    #[serde(default)]
    urls_failed: Vec<String>,
    #[serde(default)]
    runs: Vec<RunRecord>,
}

/// Counts reported by the `stats` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestStats {
    pub tracked_urls: usize,
    pub failing_urls: usize,
    pub last_full_run: Option<DateTime<Utc>>,
    pub last_run: Option<RunRecord>,
    pub runs_recorded: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ManifestFile", into = "ManifestFile")]
pub struct ManifestTracker {
    last_full_run: Option<DateTime<Utc>>,
    entries: BTreeMap<String, ManifestEntry>,
    runs: Vec<RunRecord>,
}

impl ManifestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the latest outcome for `url`
    ///
    /// A success clears any earlier failure for the same url.
    pub fn record_outcome(&mut self, url: &str, outcome: Outcome, at: DateTime<Utc>) {
        self.entries.insert(
            url.to_string(),
            ManifestEntry {
                url: url.to_string(),
                last_processed: at,
                outcome,
            },
        );
    }

    /// True if `url` last succeeded at or after `cutoff`
    pub fn was_processed_since(&self, url: &str, cutoff: DateTime<Utc>) -> bool {
        self.entries
            .get(url)
            .map(|e| e.outcome == Outcome::Success && e.last_processed >= cutoff)
            .unwrap_or(false)
    }

    pub fn entry(&self, url: &str) -> Option<&ManifestEntry> {
        self.entries.get(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Urls whose most recent outcome is a failure, sorted
    pub fn failing_urls(&self) -> Vec<&str> {
        self.entries
            .values()
            .filter(|e| e.outcome == Outcome::Failure)
            .map(|e| e.url.as_str())
            .collect()
    }

    pub fn last_full_run(&self) -> Option<DateTime<Utc>> {
        self.last_full_run
    }

    pub fn mark_full_run(&mut self, at: DateTime<Utc>) {
        self.last_full_run = Some(at);
    }

    pub fn runs(&self) -> &[RunRecord] {
        &self.runs
    }

    /// Appends a run to the history, dropping the oldest beyond the cap
    pub fn push_run(&mut self, run: RunRecord) {
        self.runs.push(run);
        if self.runs.len() > MAX_RUN_HISTORY {
            let excess = self.runs.len() - MAX_RUN_HISTORY;
            self.runs.drain(..excess);
        }
    }

    /// Removes entries last processed before `cutoff`; returns how many
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.last_processed >= cutoff);
        before - self.entries.len()
    }

    pub fn stats(&self) -> ManifestStats {
        ManifestStats {
            tracked_urls: self.entries.len(),
            failing_urls: self.failing_urls().len(),
            last_full_run: self.last_full_run,
            last_run: self.runs.last().cloned(),
            runs_recorded: self.runs.len(),
        }
    }
}

impl From<ManifestFile> for ManifestTracker {
    fn from(file: ManifestFile) -> Self {
        let failed: BTreeSet<String> = file.urls_failed.into_iter().collect();
        let entries = file
            .urls_processed
            .into_iter()
            .map(|(url, last_processed)| {
                let outcome = if failed.contains(&url) {
                    Outcome::Failure
                } else {
                    Outcome::Success
                };
                let entry = ManifestEntry {
                    url: url.clone(),
                    last_processed,
                    outcome,
                };
                (url, entry)
            })
            .collect();

        Self {
            last_full_run: file.last_full_run,
            entries,
            runs: file.runs,
        }
    }
}

impl From<ManifestTracker> for ManifestFile {
    fn from(tracker: ManifestTracker) -> Self {
        let urls_failed = tracker
            .failing_urls()
            .into_iter()
            .map(str::to_string)
            .collect();
        let urls_processed = tracker
            .entries
            .into_values()
            .map(|e| (e.url, e.last_processed))
            .collect();

        Self {
            last_full_run: tracker.last_full_run,
            urls_processed,
            urls_failed,
            runs: tracker.runs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_was_processed_since() {
        let mut manifest = ManifestTracker::new();
        manifest.record_outcome("https://x.gov/list", Outcome::Success, t(10));

        assert!(manifest.was_processed_since("https://x.gov/list", t(9)));
        assert!(manifest.was_processed_since("https://x.gov/list", t(10)));
        assert!(!manifest.was_processed_since("https://x.gov/list", t(11)));
        assert!(!manifest.was_processed_since("https://x.gov/other", t(0)));
    }

    #[test]
    fn test_failure_is_never_processed() {
        let mut manifest = ManifestTracker::new();
        manifest.record_outcome("https://x.gov/list", Outcome::Failure, t(10));
        assert!(!manifest.was_processed_since("https://x.gov/list", t(0)));
        assert_eq!(manifest.failing_urls(), vec!["https://x.gov/list"]);
    }

    #[test]
    fn test_success_clears_failure() {
        let mut manifest = ManifestTracker::new();
        manifest.record_outcome("https://x.gov/list", Outcome::Failure, t(10));
        manifest.record_outcome("https://x.gov/list", Outcome::Success, t(11));
        assert!(manifest.failing_urls().is_empty());
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_file_format() {
        let mut manifest = ManifestTracker::new();
        manifest.record_outcome("https://x.gov/a", Outcome::Success, t(1));
        manifest.record_outcome("https://x.gov/b", Outcome::Failure, t(2));
        manifest.mark_full_run(t(3));

        let value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(value["last_full_run"], "2025-05-01T03:00:00Z");
        assert_eq!(value["urls_processed"]["https://x.gov/a"], "2025-05-01T01:00:00Z");
        assert_eq!(value["urls_failed"], serde_json::json!(["https://x.gov/b"]));

        let back: ManifestTracker = serde_json::from_value(value).unwrap();
        assert_eq!(back, manifest);
    }

    #[test]
    fn test_parses_without_runs() {
        let json = r#"{"last_full_run": null, "urls_processed": {}, "urls_failed": []}"#;
        let manifest: ManifestTracker = serde_json::from_str(json).unwrap();
        assert!(manifest.is_empty());
        assert!(manifest.runs().is_empty());
    }

    #[test]
    fn test_run_history_capped() {
        let mut manifest = ManifestTracker::new();
        let start = t(0);
        for i in 0..(MAX_RUN_HISTORY + 5) {
            manifest.push_run(RunRecord::start(
                start + Duration::minutes(i as i64),
                None,
                "hash",
            ));
        }
        assert_eq!(manifest.runs().len(), MAX_RUN_HISTORY);
        assert_eq!(manifest.runs()[0].started_at, start + Duration::minutes(5));
    }

    #[test]
    fn test_prune_before() {
        let mut manifest = ManifestTracker::new();
        manifest.record_outcome("https://x.gov/old", Outcome::Success, t(1));
        manifest.record_outcome("https://x.gov/new", Outcome::Failure, t(5));

        assert_eq!(manifest.prune_before(t(3)), 1);
        assert!(manifest.entry("https://x.gov/old").is_none());
        assert!(manifest.entry("https://x.gov/new").is_some());
    }

    #[test]
    fn test_stats() {
        let mut manifest = ManifestTracker::new();
        manifest.record_outcome("https://x.gov/a", Outcome::Success, t(1));
        manifest.record_outcome("https://x.gov/b", Outcome::Failure, t(1));
        manifest.push_run(RunRecord::start(t(0), Some("ddrb"), "abc"));

        let stats = manifest.stats();
        assert_eq!(stats.tracked_urls, 2);
        assert_eq!(stats.failing_urls, 1);
        assert_eq!(stats.runs_recorded, 1);
        assert_eq!(
            stats.last_run.and_then(|r| r.source_filter),
            Some("ddrb".to_string())
        );
    }
}
