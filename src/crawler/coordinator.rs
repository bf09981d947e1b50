//! Run coordinator - per-source collection orchestration
//!
//! This module sequences one collection run:
//! - Selecting the sources to run and bounding their concurrency
//! - Driving each source through fetch, extract, classify, merge and write
//! - Isolating failures so one source never affects another
//! - Keeping the shared manifest current and persisting it
//! - Producing the run summary and exit status

use crate::config::{Config, Source, SourceKind};
use crate::crawler::{
    build_http_client, CandidateLink, DocTypeClassifier, FetchedPage, Fetcher, LinkExtractor,
    PageLinks, PageRole, RetryPolicy,
};
use crate::robots::{fetch_robots, ParsedRobots};
use crate::url::parse_http_url;
use crate::state::{HostThrottle, SourcePhase, SourceProgress};
use crate::storage::{
    open_storage, ItemStatus, ManifestTracker, MergeReport, Outcome, ProspectiveItem, RunRecord,
    Storage,
};
use crate::{CollectorError, ConfigError, NetworkError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use url::Url;

/// Upper bound for skip and retention windows (100 years)
const MAX_WINDOW_HOURS: u64 = 24 * 366 * 100;

/// Process exit status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Every selected source finished
    Success,
    /// At least one source failed
    PartialFailure,
    /// Nothing ran: the configuration was unusable, `--source` matched no
    /// source, or the manifest could not be read
    ConfigError,
}

impl ExitStatus {
    pub fn code(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::PartialFailure => 1,
            Self::ConfigError => 2,
        }
    }
}

/// Outcome of one source's run
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source_id: String,
    pub kind: &'static str,
    /// `Done` or `Failed`
    pub phase: SourcePhase,
    pub pages_attempted: usize,
    pub pages_fetched: usize,
    pub pages_failed: usize,
    /// Listing pages skipped as recently processed
    pub pages_skipped: usize,
    pub links_found: usize,
    pub merge: Option<MergeReport>,
    pub stores_written: usize,
    pub error: Option<String>,
}

impl SourceReport {
    fn new(source: &Source) -> Self {
        Self {
            source_id: source.id.clone(),
            kind: source.kind.label(),
            phase: SourcePhase::Init,
            pages_attempted: 0,
            pages_fetched: 0,
            pages_failed: 0,
            pages_skipped: 0,
            links_found: 0,
            merge: None,
            stores_written: 0,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.phase.is_success()
    }
}

/// Summary of a whole run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source_filter: Option<String>,
    /// Per-source reports in configuration order
    pub reports: Vec<SourceReport>,
    /// Source tasks that ended abnormally (panicked)
    pub aborted_tasks: usize,
    /// Set when the final manifest save failed
    pub manifest_error: Option<String>,
}

impl RunSummary {
    pub fn sources_ok(&self) -> usize {
        self.reports.iter().filter(|r| r.is_success()).count()
    }

    pub fn sources_failed(&self) -> usize {
        self.reports.len() - self.sources_ok() + self.aborted_tasks
    }

    pub fn items_inserted(&self) -> usize {
        self.reports
            .iter()
            .filter_map(|r| r.merge.as_ref())
            .map(|m| m.inserted)
            .sum()
    }

    pub fn items_seen_again(&self) -> usize {
        self.reports
            .iter()
            .filter_map(|r| r.merge.as_ref())
            .map(|m| m.seen_again)
            .sum()
    }

    pub fn exit_status(&self) -> ExitStatus {
        if self.sources_failed() > 0 || self.manifest_error.is_some() {
            ExitStatus::PartialFailure
        } else {
            ExitStatus::Success
        }
    }
}

/// Sequences a collection run over the configured sources
pub struct RunCoordinator {
    config: Arc<Config>,
    storage: Arc<dyn Storage>,
    manifest: Arc<Mutex<ManifestTracker>>,
    client: Client,
    config_hash: String,
}

impl RunCoordinator {
    /// Creates a coordinator writing under the configured output root
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `config_hash` - Hash of the configuration file, kept in the run history
    ///
    /// # Returns
    ///
    /// * `Ok(RunCoordinator)` - Ready to run
    /// * `Err(CollectorError)` - The manifest is unreadable or the HTTP client could not be built
    pub fn new(config: Config, config_hash: &str) -> Result<Self, CollectorError> {
        let storage = Arc::new(open_storage(&config.output));
        Self::with_storage(config, storage, config_hash)
    }

    pub fn with_storage(
        config: Config,
        storage: Arc<dyn Storage>,
        config_hash: &str,
    ) -> Result<Self, CollectorError> {
        let manifest = storage.load_manifest()?;
        tracing::debug!(
            "Manifest loaded: {} tracked url(s), {} failing",
            manifest.len(),
            manifest.failing_urls().len()
        );

        let client = build_http_client(&config.user_agent, &config.collector)?;

        Ok(Self {
            config: Arc::new(config),
            storage,
            manifest: Arc::new(Mutex::new(manifest)),
            client,
            config_hash: config_hash.to_string(),
        })
    }

    /// Runs every selected source and persists the manifest
    ///
    /// With a selector only the matching source runs (even if disabled);
    /// an unmatched selector is a configuration error and nothing runs.
    pub async fn run(&self, selector: Option<&str>) -> Result<RunSummary, CollectorError> {
        let sources: Vec<Source> = self
            .config
            .select_sources(selector)
            .into_iter()
            .cloned()
            .collect();

        if let Some(sel) = selector {
            if sources.is_empty() {
                return Err(ConfigError::UnknownSource(sel.to_string()).into());
            }
        }

        let started_at = Utc::now();
        tracing::info!(
            "Starting run: {} source(s), up to {} at a time (config hash {})",
            sources.len(),
            self.config.collector.max_concurrent_sources,
            self.config_hash
        );

        let order: HashMap<String, usize> = sources
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();

        let semaphore = Arc::new(Semaphore::new(
            self.config.collector.max_concurrent_sources.max(1) as usize,
        ));
        let mut tasks = JoinSet::new();

        for source in sources {
            let task = SourceTask {
                source,
                config: Arc::clone(&self.config),
                storage: Arc::clone(&self.storage),
                manifest: Arc::clone(&self.manifest),
                client: self.client.clone(),
                run_started: started_at,
            };
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                task.run().await
            });
        }

        let mut reports = Vec::new();
        let mut aborted_tasks = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!("Source task ended abnormally: {}", e);
                    aborted_tasks += 1;
                }
            }
        }
        reports.sort_by_key(|r| order.get(&r.source_id).copied().unwrap_or(usize::MAX));

        let mut summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            source_filter: selector.map(str::to_string),
            reports,
            aborted_tasks,
            manifest_error: None,
        };

        if let Err(e) = self.finish_manifest(&summary).await {
            tracing::error!("Failed to save manifest: {}", e);
            summary.manifest_error = Some(e.to_string());
        }

        tracing::info!(
            "Run finished: {} ok, {} failed, {} new item(s), {} seen again",
            summary.sources_ok(),
            summary.sources_failed(),
            summary.items_inserted(),
            summary.items_seen_again()
        );

        Ok(summary)
    }

    async fn finish_manifest(&self, summary: &RunSummary) -> Result<(), CollectorError> {
        let mut manifest = self.manifest.lock().await;

        if summary.source_filter.is_none() {
            manifest.mark_full_run(summary.started_at);
        }

        if let Some(days) = self.config.output.manifest_retention_days {
            let window = ChronoDuration::hours(u64::from(days).saturating_mul(24).min(MAX_WINDOW_HOURS) as i64);
            if let Some(cutoff) = summary.finished_at.checked_sub_signed(window) {
                let pruned = manifest.prune_before(cutoff);
                if pruned > 0 {
                    tracing::info!("Pruned {} manifest entr(ies) older than {} day(s)", pruned, days);
                }
            }
        }

        let mut record = RunRecord::start(
            summary.started_at,
            summary.source_filter.as_deref(),
            &self.config_hash,
        );
        record.finished_at = Some(summary.finished_at);
        record.sources_ok = summary.sources_ok();
        record.sources_failed = summary.sources_failed();
        record.items_inserted = summary.items_inserted();
        record.items_seen_again = summary.items_seen_again();
        manifest.push_run(record);

        self.storage.save_manifest(&manifest)?;
        Ok(())
    }
}

/// Convenience entry point: builds a coordinator and runs it once
///
/// # Example
///
/// ```no_run
/// use civic_collector::config::load_config_with_hash;
/// use civic_collector::collect;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("sources.toml"))?;
/// let summary = collect(config, Some("city_council"), &hash).await?;
/// std::process::exit(summary.exit_status().code() as i32);
/// # }
/// ```
pub async fn collect(
    config: Config,
    selector: Option<&str>,
    config_hash: &str,
) -> Result<RunSummary, CollectorError> {
    let coordinator = RunCoordinator::new(config, config_hash)?;
    coordinator.run(selector).await
}

/// Everything one source's task owns
struct SourceTask {
    source: Source,
    config: Arc<Config>,
    storage: Arc<dyn Storage>,
    manifest: Arc<Mutex<ManifestTracker>>,
    client: Client,
    run_started: DateTime<Utc>,
}

impl SourceTask {
    async fn run(self) -> SourceReport {
        let mut report = SourceReport::new(&self.source);
        let mut progress = SourceProgress::new(&self.source.id);

        tracing::info!(
            "[{}] Collecting {} ({})",
            self.source.id,
            self.source.name,
            self.source.kind.label()
        );

        let mut outcomes = Vec::new();
        let succeeded = match self.collect(&mut progress, &mut report, &mut outcomes).await {
            Ok(()) => {
                tracing::info!(
                    "[{}] Done: {} page(s) fetched, {} failed, {} skipped, {} link(s)",
                    self.source.id,
                    report.pages_fetched,
                    report.pages_failed,
                    report.pages_skipped,
                    report.links_found
                );
                true
            }
            Err(e) => {
                progress.fail();
                tracing::error!("[{}] Source failed: {}", self.source.id, e);
                report.error = Some(e.to_string());
                false
            }
        };

        report.phase = progress.phase();

        // Page outcomes are only committed once the source's stores are
        // written; a failed source leaves every page due for the next run
        let mut manifest = self.manifest.lock().await;
        let now = Utc::now();
        for (url, outcome) in &outcomes {
            let outcome = if succeeded { *outcome } else { Outcome::Failure };
            manifest.record_outcome(url.as_str(), outcome, now);
        }
        if let Err(e) = self.storage.save_manifest(&manifest) {
            tracing::warn!("[{}] Manifest save failed: {}", self.source.id, e);
        }

        report
    }

    async fn collect(
        &self,
        progress: &mut SourceProgress,
        report: &mut SourceReport,
        outcomes: &mut Vec<(Url, Outcome)>,
    ) -> Result<(), CollectorError> {
        let source = &self.source;

        // A store that cannot be read fails the source before any request
        let mut stores = self.storage.load_source_stores(&source.id, &source.name)?;

        let throttle = HostThrottle::new(source.politeness_delay(&self.config.collector));
        let mut fetcher = Fetcher::new(
            self.client.clone(),
            RetryPolicy::from_config(&self.config.collector),
            throttle,
            &source.id,
        );
        let extractor = LinkExtractor::for_source(source);

        let mut candidates: Vec<CandidateLink> = Vec::new();
        let mut seen: HashSet<Url> = HashSet::new();
        let mut follow_ups: Vec<Url> = Vec::new();
        let mut queued: HashSet<Url> = HashSet::new();
        let mut robots: HashMap<String, ParsedRobots> = HashMap::new();

        // Listing pages
        for raw in &source.urls {
            let url = match parse_http_url(raw) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!("[{}] Skipping malformed url {}: {}", source.id, raw, e);
                    report.pages_attempted += 1;
                    report.pages_failed += 1;
                    continue;
                }
            };

            if self.recently_processed(&url).await {
                tracing::info!("[{}] Skipping recently processed {}", source.id, url);
                report.pages_skipped += 1;
                continue;
            }

            let Some(page) = self
                .fetch_page(&mut fetcher, &mut robots, &url, progress, report, outcomes)
                .await?
            else {
                continue;
            };

            progress.advance(SourcePhase::Extracting)?;
            let links = extractor.extract(&page, PageRole::Listing, self.run_started);
            self.note_anomaly(&page, &links);

            push_unique(&mut candidates, &mut seen, links.candidates);
            for next in links.follow_ups {
                if queued.insert(next.clone()) {
                    follow_ups.push(next);
                }
            }
        }

        // Detail pages
        if !follow_ups.is_empty() {
            tracing::info!(
                "[{}] Following {} detail page(s)",
                source.id,
                follow_ups.len()
            );
        }
        for url in follow_ups {
            let Some(page) = self
                .fetch_page(&mut fetcher, &mut robots, &url, progress, report, outcomes)
                .await?
            else {
                continue;
            };

            progress.advance(SourcePhase::Extracting)?;
            let links = extractor.extract(&page, PageRole::Detail, self.run_started);
            self.note_anomaly(&page, &links);
            push_unique(&mut candidates, &mut seen, links.candidates);
        }

        // Layer endpoints are recorded whatever their check says
        if let SourceKind::ArcgisLayers { layers } = &source.kind {
            if progress.phase() == SourcePhase::Init {
                progress.advance(SourcePhase::Fetching)?;
            }
            let layer_links = self.check_layers(&mut fetcher, layers).await;
            tracing::info!(
                "[{}] Recorded {} known layer endpoint(s)",
                source.id,
                layer_links.len()
            );
            push_unique(&mut candidates, &mut seen, layer_links);
        }

        if report.pages_attempted > 0 && report.pages_fetched == 0 && candidates.is_empty() {
            return Err(CollectorError::SourceFailed {
                source_id: source.id.clone(),
                reason: format!("all {} page(s) failed", report.pages_attempted),
            });
        }

        if progress.phase() == SourcePhase::Init {
            // Nothing fetched: every listing page was skipped
            progress.advance(SourcePhase::Done)?;
            return Ok(());
        }

        report.links_found = candidates.len();

        progress.advance(SourcePhase::Classifying)?;
        let classifier = DocTypeClassifier::for_source(source);
        let prospective: Vec<ProspectiveItem> = candidates
            .iter()
            .map(|c| ProspectiveItem::from_candidate(c, classifier.classify(c)))
            .collect();

        progress.advance(SourcePhase::Merging)?;
        let merge = stores.merge(prospective, self.run_started);
        tracing::info!(
            "[{}] Merged: {} new, {} seen again ({} changed), {} retained",
            source.id,
            merge.inserted,
            merge.seen_again,
            merge.refreshed,
            merge.retained
        );

        if merge.dirty_years.is_empty() {
            report.merge = Some(merge);
            progress.advance(SourcePhase::Done)?;
            return Ok(());
        }

        progress.advance(SourcePhase::Writing)?;
        for store in stores.dirty_stores(&merge) {
            self.storage.save_store(store)?;
            report.stores_written += 1;
        }
        report.merge = Some(merge);

        outcomes.extend(
            candidates
                .iter()
                .filter(|link| link.status == ItemStatus::Ok)
                .map(|link| (link.url.clone(), Outcome::Success)),
        );

        progress.advance(SourcePhase::Done)?;
        Ok(())
    }

    /// Fetches a listing or detail page, buffering its outcome in `outcomes`
    ///
    /// Per-page failures are logged and counted, and yield `Ok(None)`.
    async fn fetch_page(
        &self,
        fetcher: &mut Fetcher,
        robots: &mut HashMap<String, ParsedRobots>,
        url: &Url,
        progress: &mut SourceProgress,
        report: &mut SourceReport,
        outcomes: &mut Vec<(Url, Outcome)>,
    ) -> Result<Option<FetchedPage>, CollectorError> {
        progress.advance(SourcePhase::Fetching)?;
        report.pages_attempted += 1;

        if self.config.collector.respect_robots && !self.robots_allow(fetcher, robots, url).await {
            tracing::warn!("[{}] Disallowed by robots.txt: {}", self.source.id, url);
            report.pages_failed += 1;
            outcomes.push((url.clone(), Outcome::Failure));
            return Ok(None);
        }

        match fetcher.fetch(url).await {
            Ok(page) => {
                report.pages_fetched += 1;
                outcomes.push((url.clone(), Outcome::Success));
                Ok(Some(page))
            }
            Err(e) => {
                tracing::warn!(
                    "[{}] Giving up on {}: {}",
                    self.source.id,
                    url,
                    describe(&e)
                );
                report.pages_failed += 1;
                outcomes.push((url.clone(), Outcome::Failure));
                Ok(None)
            }
        }
    }

    async fn robots_allow(
        &self,
        fetcher: &mut Fetcher,
        cache: &mut HashMap<String, ParsedRobots>,
        url: &Url,
    ) -> bool {
        let agent = &self.config.user_agent.crawler_name;
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();

        if !cache.contains_key(&host) {
            let parsed = fetch_robots(fetcher, url).await;
            if let Some(delay) = parsed.crawl_delay(agent) {
                fetcher.throttle_mut().raise_delay(delay);
            }
            cache.insert(host.clone(), parsed);
        }

        cache
            .get(&host)
            .map(|r| r.is_allowed(url.as_str(), agent))
            .unwrap_or(true)
    }

    async fn check_layers(&self, fetcher: &mut Fetcher, layers: &[String]) -> Vec<CandidateLink> {
        let mut links = Vec::new();

        for raw in layers {
            let Ok(url) = parse_http_url(raw) else {
                tracing::warn!("[{}] Skipping malformed layer url {}", self.source.id, raw);
                continue;
            };

            let (http_status, status) = match fetcher.fetch(&url).await {
                Ok(page) => (Some(page.status), ItemStatus::Ok),
                Err(e) => {
                    tracing::warn!("[{}] Known layer check failed: {}", self.source.id, e);
                    let status = match e.status() {
                        Some(_) => ItemStatus::Error,
                        None => ItemStatus::Unreachable,
                    };
                    (e.status(), status)
                }
            };

            links.push(CandidateLink {
                url,
                title: "known_layer".to_string(),
                source_id: self.source.id.clone(),
                discovered_at: self.run_started,
                http_status,
                status,
            });
        }

        links
    }

    async fn recently_processed(&self, url: &Url) -> bool {
        let Some(hours) = self.config.collector.skip_recent_hours else {
            return false;
        };
        let window = ChronoDuration::hours(hours.min(MAX_WINDOW_HOURS) as i64);
        let Some(cutoff) = self.run_started.checked_sub_signed(window) else {
            return false;
        };
        self.manifest
            .lock()
            .await
            .was_processed_since(url.as_str(), cutoff)
    }

    fn note_anomaly(&self, page: &FetchedPage, links: &PageLinks) {
        if links.is_anomaly() {
            tracing::warn!(
                "[{}] No links at all on {} ({} bytes)",
                self.source.id,
                page.final_url,
                page.body.len()
            );
        }
    }
}

fn push_unique(into: &mut Vec<CandidateLink>, seen: &mut HashSet<Url>, links: Vec<CandidateLink>) {
    for link in links {
        if seen.insert(link.url.clone()) {
            into.push(link);
        }
    }
}

fn describe(error: &NetworkError) -> String {
    let kind = if error.is_transient() {
        "transient"
    } else {
        "permanent"
    };
    format!("{} ({})", error, kind)
}
