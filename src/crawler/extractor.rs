//! HTML link extraction
//!
//! This module applies a source's discovery rules to a fetched page:
//! - Anchors are resolved against the page's final url
//! - Special schemes, fragments and `download` anchors are dropped
//! - Each source kind decides which anchors are candidate documents and
//!   which are detail pages to follow
//!
//! Extraction is total: a page without matches yields an empty result.

use crate::config::{Predicate, Source, SourceKind};
use crate::crawler::FetchedPage;
use crate::storage::ItemStatus;
use crate::url::{host_of, resolve_link, CompiledPredicate};
use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// A link discovered during this run, before classification
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateLink {
    pub url: Url,
    /// Anchor text, whitespace-collapsed
    pub title: String,
    pub source_id: String,
    pub discovered_at: DateTime<Utc>,
    /// Status of the response the link was found on (or of the layer check, for layers)
    pub http_status: Option<u16>,
    pub status: ItemStatus,
}

/// Whether a page was configured directly or reached by following a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRole {
    Listing,
    Detail,
}

/// Result of extracting one page
#[derive(Debug, Clone, Default)]
pub struct PageLinks {
    /// Candidate documents in page order, deduplicated
    pub candidates: Vec<CandidateLink>,
    /// Detail pages to fetch next, in page order, deduplicated
    pub follow_ups: Vec<Url>,
    /// Number of usable anchors on the page; zero is an extraction anomaly
    pub anchors_seen: usize,
}

impl PageLinks {
    pub fn is_anomaly(&self) -> bool {
        self.anchors_seen == 0
    }
}

/// An anchor resolved to an absolute http(s) url
#[derive(Debug, Clone)]
struct Anchor {
    url: Url,
    title: String,
}

/// What an anchor turned out to be for a given source kind
enum Decision {
    Keep,
    Follow,
    Ignore,
}

/// Applies one source's discovery rules to fetched pages
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    source_id: String,
    kind: SourceKind,
    /// The kind's `discover` rules, compiled
    discover: Vec<CompiledPredicate>,
}

impl LinkExtractor {
    pub fn for_source(source: &Source) -> Self {
        let discover = match &source.kind {
            SourceKind::Generic { discover } | SourceKind::Legistar { discover } => {
                discover.iter().map(Predicate::compile).collect()
            }
            _ => Vec::new(),
        };

        Self {
            source_id: source.id.clone(),
            kind: source.kind.clone(),
            discover,
        }
    }

    /// Extracts candidate links and follow-up pages from `page`
    ///
    /// # Arguments
    ///
    /// * `page` - The fetched page; links resolve against its final url
    /// * `role` - Listing or detail page; only listings yield follow-ups
    /// * `now` - Discovery timestamp stamped on every candidate
    ///
    /// # Returns
    ///
    /// The links found, with `anchors_seen == 0` when the page had no
    /// usable anchors at all.
    pub fn extract(&self, page: &FetchedPage, role: PageRole, now: DateTime<Utc>) -> PageLinks {
        let anchors = parse_anchors(&page.body, &page.final_url);
        let mut links = PageLinks {
            anchors_seen: anchors.len(),
            ..PageLinks::default()
        };

        let mut kept = HashSet::new();
        let mut followed = HashSet::new();

        for anchor in anchors {
            match self.decide(&anchor, role) {
                Decision::Keep => {
                    if kept.insert(anchor.url.clone()) {
                        links.candidates.push(CandidateLink {
                            url: anchor.url,
                            title: anchor.title,
                            source_id: self.source_id.clone(),
                            discovered_at: now,
                            http_status: Some(page.status),
                            status: ItemStatus::Ok,
                        });
                    }
                }
                Decision::Follow => {
                    if followed.insert(anchor.url.clone()) {
                        links.follow_ups.push(anchor.url);
                    }
                }
                Decision::Ignore => {}
            }
        }

        tracing::debug!(
            "[{}] {} anchors on {}: kept {}, following {}",
            self.source_id,
            links.anchors_seen,
            page.final_url,
            links.candidates.len(),
            links.follow_ups.len()
        );

        links
    }

    fn decide(&self, anchor: &Anchor, role: PageRole) -> Decision {
        let lower = anchor.url.as_str().to_lowercase();

        match &self.kind {
            SourceKind::Generic { .. } => {
                if any_match(&self.discover, anchor) {
                    Decision::Keep
                } else {
                    Decision::Ignore
                }
            }

            SourceKind::Legistar { .. } => match role {
                PageRole::Listing => {
                    if lower.contains("meetingdetail.aspx") {
                        Decision::Follow
                    } else if lower.contains("view.ashx") {
                        // Calendar rows often carry icon-only links, so no filtering here
                        Decision::Keep
                    } else {
                        Decision::Ignore
                    }
                }
                PageRole::Detail => {
                    let is_attachment =
                        lower.contains("view.ashx") || anchor.url.path().to_lowercase().ends_with(".pdf");
                    if is_attachment && any_match(&self.discover, anchor) {
                        Decision::Keep
                    } else {
                        Decision::Ignore
                    }
                }
            },

            SourceKind::DetailPages {
                detail_host,
                document_hosts,
                keywords,
            } => {
                let host = anchor
                    .url
                    .host_str()
                    .map(|h| h.to_ascii_lowercase())
                    .unwrap_or_default();
                let is_pdf = anchor.url.path().to_lowercase().ends_with(".pdf");
                let on_document_host = document_hosts
                    .iter()
                    .any(|h| host_matches(&host, h));

                if is_pdf || on_document_host {
                    if has_keyword(keywords, anchor) {
                        Decision::Keep
                    } else {
                        Decision::Ignore
                    }
                } else if role == PageRole::Listing && host_matches(&host, detail_host) {
                    Decision::Follow
                } else {
                    Decision::Ignore
                }
            }

            // Layer endpoints are recorded from configuration, not discovered
            SourceKind::ArcgisLayers { .. } => Decision::Ignore,
        }
    }
}

/// Empty rule lists accept every anchor
fn any_match(rules: &[CompiledPredicate], anchor: &Anchor) -> bool {
    rules.is_empty() || rules.iter().any(|p| p.matches(&anchor.url, &anchor.title))
}

fn has_keyword(keywords: &[String], anchor: &Anchor) -> bool {
    let url = anchor.url.as_str().to_lowercase();
    let title = anchor.title.to_lowercase();
    keywords.iter().any(|k| {
        let k = k.to_lowercase();
        url.contains(&k) || title.contains(&k)
    })
}

/// `configured` may be a bare host or a url
fn host_matches(host: &str, configured: &str) -> bool {
    let configured = host_of(configured).unwrap_or_else(|| configured.trim().to_ascii_lowercase());
    !configured.is_empty() && host == configured
}

fn parse_anchors(html: &str, base_url: &Url) -> Vec<Anchor> {
    let document = Html::parse_document(html);
    let mut anchors = Vec::new();

    let Ok(selector) = Selector::parse("a[href]") else {
        return anchors;
    };

    for element in document.select(&selector) {
        if element.value().attr("download").is_some() {
            continue;
        }

        let Some(href) = element.value().attr("href") else {
            continue;
        };

        if let Some(url) = resolve_link(href, base_url) {
            let title = element
                .text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ");
            anchors.push(Anchor { url, title });
        }
    }

    anchors
}
