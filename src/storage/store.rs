use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reachability of an item as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Ok,
    /// The server answered with an error status
    Error,
    /// No response (timeout, connection failure)
    Unreachable,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Unreachable => "unreachable",
        }
    }
}

/// One persisted document link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique key within a source
    pub url: String,
    pub filename: String,
    pub title: String,
    #[serde(rename = "source")]
    pub source_id: String,
    pub source_name: String,
    /// First discovery; never changes
    pub date_collected: DateTime<Utc>,
    /// Last run the url was discovered again
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    pub http_status: Option<u16>,
    pub status: ItemStatus,
    pub seen_before: bool,
    pub doc_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMetadata {
    pub source: String,
    pub source_name: String,
    pub year: i32,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub item_count: usize,
}

/// All items of one source first collected in one year
///
/// Items keep insertion order and are never removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub metadata: StoreMetadata,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Store {
    pub fn new(source_id: &str, source_name: &str, year: i32, now: DateTime<Utc>) -> Self {
        Self {
            metadata: StoreMetadata {
                source: source_id.to_string(),
                source_name: source_name.to_string(),
                year,
                updated_at: now,
                item_count: 0,
            },
            items: Vec::new(),
        }
    }

    pub fn year(&self) -> i32 {
        self.metadata.year
    }

    pub fn source_id(&self) -> &str {
        &self.metadata.source
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Refreshes `updated_at` and the cached item count
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.metadata.updated_at = now;
        self.metadata.item_count = self.items.len();
    }
}
