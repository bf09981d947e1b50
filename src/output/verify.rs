//! Consistency checks over the store files on disk
//!
//! Files are inspected as raw JSON so that a missing field is reported per
//! item instead of failing the whole file.

use crate::storage::{JsonStorage, StorageResult, StoreFile};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Item fields that must be present and non-empty
pub const REQUIRED_FIELDS: &[&str] = &[
    "url",
    "source",
    "date_collected",
    "status",
    "seen_before",
    "doc_type",
];

#[derive(Debug, Clone)]
pub struct FileReport {
    pub source_id: String,
    pub year: i32,
    pub path: PathBuf,
    pub item_count: usize,
    pub problems: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub files: Vec<FileReport>,
    /// Items per doc_type over all files
    pub doc_types: BTreeMap<String, usize>,
}

impl VerifyReport {
    pub fn total_items(&self) -> usize {
        self.files.iter().map(|f| f.item_count).sum()
    }

    pub fn problem_count(&self) -> usize {
        self.files.iter().map(|f| f.problems.len()).sum()
    }

    pub fn is_ok(&self) -> bool {
        self.problem_count() == 0
    }
}

/// Checks every store file matching the filters
///
/// # Arguments
///
/// * `storage` - Storage whose raw directory is walked
/// * `source_id` - Only this source, when given
/// * `year` - Only this year, when given
///
/// # Returns
///
/// A report listing, per file, missing required fields, urls stored more
/// than once for the same source, and unreadable files.
pub fn verify_outputs(
    storage: &JsonStorage,
    source_id: Option<&str>,
    year: Option<i32>,
) -> StorageResult<VerifyReport> {
    let mut report = VerifyReport::default();
    // source -> url -> year of first occurrence
    let mut first_seen: HashMap<String, HashMap<String, i32>> = HashMap::new();

    for file in storage.list_store_files(source_id, year)? {
        let file_report = verify_file(&file, &mut first_seen, &mut report.doc_types);
        report.files.push(file_report);
    }

    Ok(report)
}

fn verify_file(
    file: &StoreFile,
    first_seen: &mut HashMap<String, HashMap<String, i32>>,
    doc_types: &mut BTreeMap<String, usize>,
) -> FileReport {
    let mut report = FileReport {
        source_id: file.source_id.clone(),
        year: file.year,
        path: file.path.clone(),
        item_count: 0,
        problems: Vec::new(),
    };

    let data: Value = match std::fs::read_to_string(&file.path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()))
    {
        Ok(value) => value,
        Err(e) => {
            report.problems.push(format!("unreadable: {}", e));
            return report;
        }
    };

    let Some(items) = data.get("items").and_then(Value::as_array) else {
        report.problems.push("no items array".to_string());
        return report;
    };
    report.item_count = items.len();

    let seen_urls = first_seen.entry(file.source_id.clone()).or_default();

    for (idx, item) in items.iter().enumerate() {
        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| is_missing(item.get(*field)))
            .collect();
        if !missing.is_empty() {
            report
                .problems
                .push(format!("item {}: missing {}", idx, missing.join(", ")));
        }

        if let Some(url) = item.get("url").and_then(Value::as_str) {
            if let Some(first_year) = seen_urls.get(url) {
                report
                    .problems
                    .push(format!("item {}: duplicate url {} (first in {})", idx, url, first_year));
            } else {
                seen_urls.insert(url.to_string(), file.year);
            }
        }

        let doc_type = item
            .get("doc_type")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("(none)");
        *doc_types.entry(doc_type.to_string()).or_insert(0) += 1;
    }

    report
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// Prints a verify report to stdout
pub fn print_verify_report(report: &VerifyReport) {
    println!("=== Output Verification ===\n");

    if report.files.is_empty() {
        println!("No store files found.");
        return;
    }

    for file in &report.files {
        println!(
            "{}  {}  count={}  file={}",
            file.year,
            file.source_id,
            file.item_count,
            file.path.display()
        );
        if file.item_count == 0 && file.problems.is_empty() {
            println!("  ! zero items");
        }
        for problem in &file.problems {
            println!("  ! {}", problem);
        }
    }

    println!("\nItems by doc_type:");
    let mut counts: Vec<_> = report.doc_types.iter().collect();
    counts.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    for (doc_type, count) in counts {
        println!("  {}: {}", doc_type, count);
    }

    println!(
        "\nTotal: {} item(s) in {} file(s), {} problem(s)",
        report.total_items(),
        report.files.len(),
        report.problem_count()
    );
}
