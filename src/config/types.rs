use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Civic-Collector
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl Config {
    /// Sources that take part in a run.
    ///
    /// With a selector, the single source whose id or name matches is returned
    /// even if it is disabled. Without one, every enabled source is returned in
    /// configuration order.
    pub fn select_sources(&self, selector: Option<&str>) -> Vec<&Source> {
        match selector {
            Some(sel) => self
                .sources
                .iter()
                .filter(|s| s.matches_selector(sel))
                .collect(),
            None => self.sources.iter().filter(|s| s.enabled).collect(),
        }
    }
}

/// Collector behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Total per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Connection establishment timeout (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Maximum retries for transient failures
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry backoff (milliseconds), doubled on every further retry
    #[serde(rename = "initial-backoff-ms", default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for a single retry backoff (milliseconds)
    #[serde(rename = "max-backoff-ms", default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Default minimum time between requests to one source (milliseconds)
    #[serde(rename = "politeness-delay-ms", default = "default_politeness_delay")]
    pub politeness_delay_ms: u64,

    /// Number of sources collected in parallel
    #[serde(rename = "max-concurrent-sources", default = "default_concurrent_sources")]
    pub max_concurrent_sources: u32,

    /// Skip listing pages fetched successfully within this many hours
    #[serde(rename = "skip-recent-hours", default)]
    pub skip_recent_hours: Option<u64>,

    /// Honor robots.txt of each source host
    #[serde(rename = "respect-robots", default)]
    pub respect_robots: bool,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_politeness_delay() -> u64 {
    1000
}

fn default_concurrent_sources() -> u32 {
    4
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            politeness_delay_ms: default_politeness_delay(),
            max_concurrent_sources: default_concurrent_sources(),
            skip_recent_hours: None,
            respect_robots: false,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the collector
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the collector
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the collector
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for collector-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Root of the output tree (raw/, state/ and logs/ live below it)
    #[serde(default = "default_output_root")]
    pub root: String,

    /// Prune manifest entries not processed within this many days
    #[serde(rename = "manifest-retention-days", default)]
    pub manifest_retention_days: Option<u32>,
}

fn default_output_root() -> String {
    "outputs".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_output_root(),
            manifest_retention_days: None,
        }
    }
}

impl OutputConfig {
    pub fn raw_dir(&self) -> PathBuf {
        PathBuf::from(&self.root).join("raw")
    }

    pub fn state_dir(&self) -> PathBuf {
        PathBuf::from(&self.root).join("state")
    }

    pub fn logs_dir(&self) -> PathBuf {
        PathBuf::from(&self.root).join("logs")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.state_dir().join("collection_manifest.json")
    }
}

/// One configured municipal origin
#[derive(Debug, Clone, Deserialize)]
pub struct Source {
    /// Stable identifier; derived from `name` when omitted
    #[serde(default)]
    pub id: String,

    /// Display name
    pub name: String,

    /// Listing pages to fetch
    #[serde(default, alias = "candidates")]
    pub urls: Vec<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Overrides the collector-wide politeness delay (milliseconds)
    #[serde(rename = "politeness-delay-ms", default)]
    pub politeness_delay_ms: Option<u64>,

    /// Discovery behavior
    #[serde(flatten)]
    pub kind: SourceKind,

    /// Classification rules evaluated before the kind's built-in table
    #[serde(default)]
    pub classify: Vec<ClassificationRule>,
}

fn default_enabled() -> bool {
    true
}

impl Source {
    /// Whether `selector` names this source by id or display name
    pub fn matches_selector(&self, selector: &str) -> bool {
        self.id == selector || self.name == selector
    }

    /// Minimum interval between two requests issued for this source
    pub fn politeness_delay(&self, collector: &CollectorConfig) -> Duration {
        Duration::from_millis(
            self.politeness_delay_ms
                .unwrap_or(collector.politeness_delay_ms),
        )
    }

    /// Every url fetched directly from configuration
    pub fn entry_urls(&self) -> Vec<&str> {
        let mut urls: Vec<&str> = self.urls.iter().map(String::as_str).collect();
        if let SourceKind::ArcgisLayers { layers } = &self.kind {
            urls.extend(layers.iter().map(String::as_str));
        }
        urls
    }
}

/// Closed set of source behaviors
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SourceKind {
    /// Keeps anchors on the listing pages that match `discover` (all when empty)
    Generic {
        #[serde(default)]
        discover: Vec<Predicate>,
    },

    /// Legistar calendars: direct `View.ashx` links plus attachments on
    /// followed `MeetingDetail.aspx` pages
    Legistar {
        #[serde(default)]
        discover: Vec<Predicate>,
    },

    /// Listing pages linking to per-meeting pages on `detail-host`, which in
    /// turn link to the documents
    DetailPages {
        #[serde(rename = "detail-host")]
        detail_host: String,

        /// Hosts serving documents without a `.pdf` suffix
        #[serde(rename = "document-hosts", default)]
        document_hosts: Vec<String>,

        #[serde(default = "default_document_keywords")]
        keywords: Vec<String>,
    },

    /// Fixed GIS layer endpoints recorded unconditionally
    ArcgisLayers { layers: Vec<String> },
}

fn default_document_keywords() -> Vec<String> {
    vec![
        "agenda".to_string(),
        "minutes".to_string(),
        "packet".to_string(),
    ]
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Generic { .. } => "generic",
            Self::Legistar { .. } => "legistar",
            Self::DetailPages { .. } => "detail-pages",
            Self::ArcgisLayers { .. } => "arcgis-layers",
        }
    }
}

/// A match condition over a link's url and title
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "match", rename_all = "kebab-case")]
pub enum Predicate {
    /// Title or url contains `value` (case-insensitive)
    TextContains { value: String },
    /// Title contains `value` (case-insensitive)
    TitleContains { value: String },
    /// Url contains `value` (case-insensitive)
    UrlContains { value: String },
    /// Url path ends with `value` (case-insensitive)
    UrlSuffix { value: String },
    /// Query parameter `name` equals `value`
    QueryParam { name: String, value: String },
    /// Loose pattern: `/regex/`, regex-looking text, or a plain substring
    Pattern { value: String },
    /// Case-insensitive regular expression over "title url"
    Regex { value: String },
    /// Matches every link
    Always,
}

/// One row of a classification table
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClassificationRule {
    #[serde(flatten)]
    pub predicate: Predicate,
    pub label: String,
}

impl ClassificationRule {
    pub fn new(predicate: Predicate, label: &str) -> Self {
        Self {
            predicate,
            label: label.to_string(),
        }
    }
}
