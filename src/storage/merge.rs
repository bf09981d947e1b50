//! Reconciles a run's discoveries with a source's stored items
//!
//! Guarantees, for one source:
//! - exactly one item per url across all of its year stores
//! - `date_collected`, filename and title never change once written
//! - `seen_before` is true iff the url was stored before this run
//! - an item's year bucket is fixed at creation
//! - items absent from this run are kept untouched

use crate::crawler::CandidateLink;
use crate::storage::{Item, ItemStatus, Store};
use crate::url::filename_from_url;
use chrono::{DateTime, Datelike, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// A classified candidate, ready to merge
#[derive(Debug, Clone, PartialEq)]
pub struct ProspectiveItem {
    pub url: String,
    pub filename: String,
    pub title: String,
    pub http_status: Option<u16>,
    pub status: ItemStatus,
    pub doc_type: String,
}

impl ProspectiveItem {
    pub fn from_candidate(link: &CandidateLink, doc_type: String) -> Self {
        Self {
            url: link.url.to_string(),
            filename: filename_from_url(&link.url),
            title: link.title.clone(),
            http_status: link.http_status,
            status: link.status,
            doc_type,
        }
    }
}

/// What a merge did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// New urls, added to the current year's store
    pub inserted: usize,
    /// Known urls seen again
    pub seen_again: usize,
    /// Known urls whose status, http status or doc type changed
    pub refreshed: usize,
    /// Known urls not seen this run, left as they were
    pub retained: usize,
    /// Duplicate urls within the run's discoveries, ignored
    pub duplicates: usize,
    /// Years whose store must be written
    pub dirty_years: BTreeSet<i32>,
}

/// Every year store of one source
#[derive(Debug, Clone)]
pub struct SourceStores {
    source_id: String,
    source_name: String,
    stores: BTreeMap<i32, Store>,
}

impl SourceStores {
    pub fn new(source_id: &str, source_name: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            source_name: source_name.to_string(),
            stores: BTreeMap::new(),
        }
    }

    pub fn from_stores(source_id: &str, source_name: &str, stores: Vec<Store>) -> Self {
        let mut all = Self::new(source_id, source_name);
        for store in stores {
            all.stores.insert(store.year(), store);
        }
        all
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn years(&self) -> Vec<i32> {
        self.stores.keys().copied().collect()
    }

    pub fn store(&self, year: i32) -> Option<&Store> {
        self.stores.get(&year)
    }

    /// Total items over all years
    pub fn item_count(&self) -> usize {
        self.stores.values().map(Store::len).sum()
    }

    pub fn find(&self, url: &str) -> Option<&Item> {
        self.stores
            .values()
            .flat_map(|s| s.items.iter())
            .find(|item| item.url == url)
    }

    /// Merges this run's items; see the module docs for the guarantees
    ///
    /// # Arguments
    ///
    /// * `prospective` - Classified candidates in discovery order
    /// * `now` - Run timestamp; its UTC year picks the store for new items
    ///
    /// # Returns
    ///
    /// A report whose `dirty_years` lists the stores to persist. The
    /// current year's store is always among them when it exists, so its
    /// `updated_at` is refreshed on every successful run.
    pub fn merge(&mut self, prospective: Vec<ProspectiveItem>, now: DateTime<Utc>) -> MergeReport {
        let current_year = now.year();
        let mut report = MergeReport::default();

        let mut index: HashMap<String, (i32, usize)> = HashMap::new();
        for (year, store) in &self.stores {
            for (pos, item) in store.items.iter().enumerate() {
                index.entry(item.url.clone()).or_insert((*year, pos));
            }
        }
        let known_before = index.len();

        let mut touched: HashSet<String> = HashSet::new();

        for p in prospective {
            if !touched.insert(p.url.clone()) {
                report.duplicates += 1;
                continue;
            }

            match index.get(&p.url).copied() {
                Some((year, pos)) => {
                    let Some(item) = self.stores.get_mut(&year).and_then(|s| s.items.get_mut(pos))
                    else {
                        continue;
                    };

                    let changed = item.http_status != p.http_status
                        || item.status != p.status
                        || item.doc_type != p.doc_type;

                    item.seen_before = true;
                    item.last_seen = Some(now);
                    item.http_status = p.http_status;
                    item.status = p.status;
                    item.doc_type = p.doc_type;

                    report.seen_again += 1;
                    if changed {
                        report.refreshed += 1;
                    }
                    report.dirty_years.insert(year);
                }
                None => {
                    let store = self.stores.entry(current_year).or_insert_with(|| {
                        Store::new(&self.source_id, &self.source_name, current_year, now)
                    });

                    store.items.push(Item {
                        url: p.url.clone(),
                        filename: p.filename,
                        title: p.title,
                        source_id: self.source_id.clone(),
                        source_name: self.source_name.clone(),
                        date_collected: now,
                        last_seen: Some(now),
                        http_status: p.http_status,
                        status: p.status,
                        seen_before: false,
                        doc_type: p.doc_type,
                    });
                    index.insert(p.url, (current_year, store.items.len() - 1));

                    report.inserted += 1;
                    report.dirty_years.insert(current_year);
                }
            }
        }

        report.retained = known_before - report.seen_again;

        if self.stores.contains_key(&current_year) {
            report.dirty_years.insert(current_year);
        }
        for year in &report.dirty_years {
            if let Some(store) = self.stores.get_mut(year) {
                store.touch(now);
            }
        }

        report
    }

    /// Stores listed in a merge report, in year order
    pub fn dirty_stores<'a>(&'a self, report: &'a MergeReport) -> impl Iterator<Item = &'a Store> {
        report
            .dirty_years
            .iter()
            .filter_map(move |year| self.stores.get(year))
    }
}
