//! Integration tests for collection runs
//!
//! These tests use wiremock to create mock municipal sites and test
//! the full fetch, extract, classify, merge and write cycle end-to-end.

use chrono::{Datelike, Utc};
use civic_collector::config::{parse_config, Config};
use civic_collector::crawler::{ExitStatus, RunCoordinator};
use civic_collector::output::verify_outputs;
use civic_collector::state::SourcePhase;
use civic_collector::storage::{JsonStorage, Outcome, Storage};
use civic_collector::{CollectorError, ConfigError};
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with fast timings and the given sources
fn create_test_config(root: &Path, collector_extra: &str, sources: &str) -> Config {
    let toml = format!(
        r#"
[collector]
request-timeout-secs = 5
connect-timeout-secs = 2
max-retries = 3
initial-backoff-ms = 1
max-backoff-ms = 5
politeness-delay-ms = 0
{collector_extra}

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[output]
root = "{root}"

{sources}
"#,
        collector_extra = collector_extra,
        root = root.display(),
        sources = sources
    );
    parse_config(&toml).expect("Failed to parse test config")
}

fn generic_source(id: &str, url: &str) -> String {
    format!(
        r#"
[[sources]]
id = "{id}"
name = "{id} board"
kind = "generic"
urls = ["{url}"]
"#
    )
}

fn storage_for(config: &Config) -> JsonStorage {
    JsonStorage::new(&config.output)
}

fn read_store(storage: &JsonStorage, source_id: &str) -> Value {
    let path = storage.store_path(source_id, Utc::now().year());
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("store {} not readable: {}", path.display(), e));
    serde_json::from_str(&text).expect("store is not JSON")
}

fn items(store: &Value) -> &Vec<Value> {
    store["items"].as_array().expect("items array")
}

fn listing_with_documents(base: &str, count: usize) -> String {
    let links: String = (1..=count)
        .map(|i| format!(r#"<li><a href="{base}/docs/agenda-{i}.pdf">Agenda {i}</a></li>"#))
        .collect();
    format!("<html><body><ul>{links}</ul></body></html>")
}

#[tokio::test]
async fn test_second_run_marks_items_seen_before() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/meetings"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_with_documents(&base, 5))
                .insert_header("content-type", "text/html"),
        )
        .expect(2)
        .mount(&server)
        .await;

    let config = create_test_config(
        dir.path(),
        "",
        &generic_source("ddrb", &format!("{}/meetings", base)),
    );
    let storage = storage_for(&config);

    let first = RunCoordinator::new(config.clone(), "hash-1")
        .unwrap()
        .run(None)
        .await
        .unwrap();
    assert_eq!(first.exit_status(), ExitStatus::Success);
    assert_eq!(first.items_inserted(), 5);

    let store = read_store(&storage, "ddrb");
    assert_eq!(items(&store).len(), 5);
    assert!(items(&store)
        .iter()
        .all(|i| i["seen_before"] == Value::Bool(false)));
    assert!(items(&store)
        .iter()
        .all(|i| i["doc_type"] == Value::from("agenda")));
    assert_eq!(store["metadata"]["item_count"], Value::from(5));

    let second = RunCoordinator::new(config.clone(), "hash-1")
        .unwrap()
        .run(None)
        .await
        .unwrap();
    assert_eq!(second.exit_status(), ExitStatus::Success);
    assert_eq!(second.items_inserted(), 0);
    assert_eq!(second.items_seen_again(), 5);

    let store = read_store(&storage, "ddrb");
    assert_eq!(items(&store).len(), 5);
    assert!(items(&store)
        .iter()
        .all(|i| i["seen_before"] == Value::Bool(true)));

    let verified = verify_outputs(&storage, None, None).unwrap();
    assert!(verified.is_ok());
    assert_eq!(verified.total_items(), 5);

    let manifest = storage.load_manifest().unwrap();
    assert_eq!(manifest.runs().len(), 2);
    assert!(manifest.last_full_run().is_some());
    assert_eq!(manifest.runs()[1].config_hash, "hash-1");
}

#[tokio::test]
async fn test_failing_source_does_not_affect_others() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/council"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_with_documents(&base, 3)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/healthy"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_with_documents(&base, 2)))
        .expect(2)
        .mount(&server)
        .await;

    let healthy = generic_source("healthy", &format!("{}/healthy", base));
    let reachable = create_test_config(
        dir.path(),
        "",
        &format!("{}{}", generic_source("council", &format!("{}/council", base)), healthy),
    );
    let unreachable = create_test_config(
        dir.path(),
        "",
        &format!("{}{}", generic_source("council", "http://127.0.0.1:1/council"), healthy),
    );
    let storage = storage_for(&reachable);

    let first = RunCoordinator::new(reachable, "h")
        .unwrap()
        .run(None)
        .await
        .unwrap();
    assert_eq!(first.exit_status(), ExitStatus::Success);

    let council_path = storage.store_path("council", Utc::now().year());
    let council_before = std::fs::read(&council_path).unwrap();

    let summary = RunCoordinator::new(unreachable, "h")
        .unwrap()
        .run(None)
        .await
        .unwrap();

    assert_eq!(summary.exit_status(), ExitStatus::PartialFailure);
    assert_eq!(summary.exit_status().code(), 1);
    assert_eq!(summary.reports.len(), 2);
    assert_eq!(summary.reports[0].source_id, "council");
    assert_eq!(summary.reports[0].phase, SourcePhase::Failed);
    assert!(summary.reports[0].error.is_some());
    assert_eq!(summary.reports[1].phase, SourcePhase::Done);

    // The failed source's store is byte-for-byte what the first run wrote
    assert_eq!(std::fs::read(&council_path).unwrap(), council_before);

    // The healthy source was merged and rewritten
    let healthy_store = read_store(&storage, "healthy");
    assert_eq!(items(&healthy_store).len(), 2);
    assert!(items(&healthy_store)
        .iter()
        .all(|i| i["seen_before"] == Value::Bool(true)));

    let manifest = storage.load_manifest().unwrap();
    assert_eq!(manifest.failing_urls(), vec!["http://127.0.0.1:1/council"]);
}

#[tokio::test]
async fn test_write_failure_leaves_listing_due() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();
    let listing = format!("{}/meetings", base);

    Mock::given(method("GET"))
        .and(path("/meetings"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_with_documents(&base, 2)))
        .expect(2)
        .mount(&server)
        .await;

    let config = create_test_config(
        dir.path(),
        "skip-recent-hours = 24",
        &generic_source("ddrb", &listing),
    );
    let storage = storage_for(&config);

    // A plain file where the year directory belongs makes the store write fail
    let store_path = storage.store_path("ddrb", Utc::now().year());
    let year_dir = store_path.parent().unwrap().to_path_buf();
    std::fs::create_dir_all(year_dir.parent().unwrap()).unwrap();
    std::fs::write(&year_dir, "blocking").unwrap();

    let first = RunCoordinator::new(config.clone(), "h")
        .unwrap()
        .run(None)
        .await
        .unwrap();
    assert_eq!(first.exit_status(), ExitStatus::PartialFailure);
    assert_eq!(first.reports[0].phase, SourcePhase::Failed);
    assert_eq!(first.reports[0].pages_fetched, 1);

    let manifest = storage.load_manifest().unwrap();
    assert_eq!(manifest.entry(&listing).unwrap().outcome, Outcome::Failure);
    assert!(manifest.entry(&format!("{}/docs/agenda-1.pdf", base)).is_none());

    std::fs::remove_file(&year_dir).unwrap();

    let second = RunCoordinator::new(config, "h")
        .unwrap()
        .run(None)
        .await
        .unwrap();
    assert_eq!(second.exit_status(), ExitStatus::Success);
    assert_eq!(second.reports[0].pages_skipped, 0);
    assert_eq!(second.reports[0].pages_fetched, 1);
    assert_eq!(items(&read_store(&storage, "ddrb")).len(), 2);

    let manifest = storage.load_manifest().unwrap();
    assert_eq!(manifest.entry(&listing).unwrap().outcome, Outcome::Success);
}

#[tokio::test]
async fn test_legistar_follows_meeting_details() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/Calendar.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<html><body><table>
            <tr><td><a href="MeetingDetail.aspx?ID=7&GUID=abc">Meeting details</a></td>
                <td><a href="View.ashx?M=A&ID=7&GUID=abc">Agenda</a></td></tr>
            <tr><td><a href="{base}/about">About the council</a></td></tr>
            </table></body></html>"#
        )))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/MeetingDetail.aspx"))
        .and(query_param("ID", "7"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body>
            <a href="View.ashx?M=M&ID=7&GUID=abc">Minutes</a>
            <a href="Calendar.aspx">Back to calendar</a>
            </body></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let sources = format!(
        r#"
[[sources]]
id = "council"
name = "City Council"
kind = "legistar"
urls = ["{base}/Calendar.aspx"]
"#
    );
    let config = create_test_config(dir.path(), "", &sources);
    let storage = storage_for(&config);

    let summary = RunCoordinator::new(config, "h")
        .unwrap()
        .run(Some("City Council"))
        .await
        .unwrap();

    assert_eq!(summary.exit_status(), ExitStatus::Success);
    assert_eq!(summary.reports[0].pages_fetched, 2);

    let store = read_store(&storage, "council");
    let mut doc_types: Vec<(&str, &str)> = items(&store)
        .iter()
        .map(|i| (i["title"].as_str().unwrap(), i["doc_type"].as_str().unwrap()))
        .collect();
    doc_types.sort();
    assert_eq!(doc_types, vec![("Agenda", "agenda"), ("Minutes", "minutes")]);

    // Filtered runs do not count as full runs
    let manifest = storage.load_manifest().unwrap();
    assert!(manifest.last_full_run().is_none());
    assert_eq!(manifest.runs()[0].source_filter.as_deref(), Some("City Council"));
}

#[tokio::test]
async fn test_transient_status_is_retried() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/meetings"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/meetings"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_with_documents(&base, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(
        dir.path(),
        "",
        &generic_source("ddrb", &format!("{}/meetings", base)),
    );
    let storage = storage_for(&config);

    let summary = RunCoordinator::new(config, "h")
        .unwrap()
        .run(None)
        .await
        .unwrap();

    assert_eq!(summary.exit_status(), ExitStatus::Success);
    let store = read_store(&storage, "ddrb");
    assert_eq!(items(&store)[0]["http_status"], Value::from(200));
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(
        dir.path(),
        "",
        &generic_source("ddrb", &format!("{}/gone", base)),
    );

    let summary = RunCoordinator::new(config, "h")
        .unwrap()
        .run(None)
        .await
        .unwrap();

    assert_eq!(summary.exit_status(), ExitStatus::PartialFailure);
    assert_eq!(summary.reports[0].pages_failed, 1);
    assert!(summary.reports[0]
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("all 1 page(s) failed"));
}

#[tokio::test]
async fn test_recently_processed_listing_is_skipped() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/meetings"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_with_documents(&base, 3)))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(
        dir.path(),
        "skip-recent-hours = 24",
        &generic_source("ddrb", &format!("{}/meetings", base)),
    );
    let storage = storage_for(&config);

    let first = RunCoordinator::new(config.clone(), "h")
        .unwrap()
        .run(None)
        .await
        .unwrap();
    assert_eq!(first.items_inserted(), 3);

    let second = RunCoordinator::new(config, "h")
        .unwrap()
        .run(None)
        .await
        .unwrap();
    assert_eq!(second.exit_status(), ExitStatus::Success);
    assert_eq!(second.reports[0].pages_skipped, 1);
    assert_eq!(second.reports[0].pages_attempted, 0);
    assert!(second.reports[0].merge.is_none());

    assert_eq!(items(&read_store(&storage, "ddrb")).len(), 3);
}

#[tokio::test]
async fn test_unknown_source_is_config_error() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(
        dir.path(),
        "",
        &generic_source("ddrb", "https://city.example.gov/meetings"),
    );

    let result = RunCoordinator::new(config, "h")
        .unwrap()
        .run(Some("nope"))
        .await;

    match result {
        Err(CollectorError::Config(ConfigError::UnknownSource(name))) => assert_eq!(name, "nope"),
        other => panic!("expected UnknownSource, got {:?}", other.map(|s| s.reports.len())),
    }
}

#[tokio::test]
async fn test_corrupt_store_fails_source_untouched() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/meetings"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_with_documents(&base, 2)))
        .expect(0)
        .mount(&server)
        .await;

    let config = create_test_config(
        dir.path(),
        "",
        &generic_source("ddrb", &format!("{}/meetings", base)),
    );
    let storage = storage_for(&config);

    let store_path = storage.store_path("ddrb", Utc::now().year());
    std::fs::create_dir_all(store_path.parent().unwrap()).unwrap();
    std::fs::write(&store_path, "{ not json").unwrap();

    let summary = RunCoordinator::new(config, "h")
        .unwrap()
        .run(None)
        .await
        .unwrap();

    assert_eq!(summary.exit_status(), ExitStatus::PartialFailure);
    assert_eq!(summary.reports[0].phase, SourcePhase::Failed);
    assert_eq!(std::fs::read_to_string(&store_path).unwrap(), "{ not json");
}

#[tokio::test]
async fn test_arcgis_layers_recorded_even_when_check_fails() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/arcgis/rest/services/Zoning/MapServer/0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/arcgis/rest/services/Parcels/MapServer/1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let sources = format!(
        r#"
[[sources]]
id = "gis"
name = "City GIS"
kind = "arcgis-layers"
layers = [
    "{base}/arcgis/rest/services/Zoning/MapServer/0",
    "{base}/arcgis/rest/services/Parcels/MapServer/1",
]
"#
    );
    let config = create_test_config(dir.path(), "", &sources);
    let storage = storage_for(&config);

    let summary = RunCoordinator::new(config, "h")
        .unwrap()
        .run(None)
        .await
        .unwrap();
    assert_eq!(summary.exit_status(), ExitStatus::Success);

    let store = read_store(&storage, "gis");
    let items = items(&store);
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i["doc_type"] == Value::from("gis_layer")));

    let parcels = items
        .iter()
        .find(|i| i["url"].as_str().unwrap().contains("Parcels"))
        .unwrap();
    assert_eq!(parcels["status"], Value::from("error"));
    assert_eq!(parcels["http_status"], Value::from(404));
}

#[tokio::test]
async fn test_robots_disallowed_listing_is_not_fetched() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private/\n"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/private/meetings"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_with_documents(&base, 1)))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/public/meetings"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_with_documents(&base, 2)))
        .expect(1)
        .mount(&server)
        .await;

    let sources = format!(
        r#"
[[sources]]
id = "ddrb"
name = "DDRB"
kind = "generic"
urls = ["{base}/private/meetings", "{base}/public/meetings"]
"#
    );
    let config = create_test_config(dir.path(), "respect-robots = true", &sources);
    let storage = storage_for(&config);

    let summary = RunCoordinator::new(config, "h")
        .unwrap()
        .run(None)
        .await
        .unwrap();

    // Partial results still count as done
    assert_eq!(summary.exit_status(), ExitStatus::Success);
    assert_eq!(summary.reports[0].pages_failed, 1);
    assert_eq!(summary.reports[0].pages_fetched, 1);
    assert_eq!(items(&read_store(&storage, "ddrb")).len(), 2);
}
