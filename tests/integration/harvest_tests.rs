//! Integration tests for the harvester
//!
//! These tests use wiremock to serve paginated listings and run the full
//! discovery, batching, checkpointing and output cycle end-to-end.

use catalog_harvest::config::parse_config;
use catalog_harvest::storage::{
    CheckpointStore, JournalEntry, JsonCheckpointStore, JsonlJournal, RecordJournal,
};
use catalog_harvest::{Harvester, JobKey, Record};
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Builds a configuration writing checkpoints and output under `dir`
fn config_toml(dir: &Path, engine: &str, jobs: &str) -> String {
    format!(
        r#"
[engine]
batch-delay-ms = 0
{engine}

[checkpoint]
dir = "{checkpoints}"

[output]
dir = "{output}"
prefix = "test"

{jobs}
"#,
        checkpoints = dir.join("checkpoints").display(),
        output = dir.join("output").display(),
    )
}

fn read_records(path: &Path) -> Vec<Record> {
    let content = std::fs::read_to_string(path).expect("Failed to read output file");
    serde_json::from_str(&content).expect("Output is not a JSON array")
}

fn firm_rows(page: u64, count: u64) -> String {
    let rows: String = (0..count)
        .map(|i| {
            format!(
                r#"<div class="table-row">
                     <p class="name">Name: Firm {page}-{i}</p>
                     <a href="/firms/{page}-{i}">details</a>
                   </div>"#
            )
        })
        .collect();
    format!(
        r#"<html><body><p class="results-count">Showing 5 firms</p>{rows}</body></html>"#
    )
}

fn listing_json(page: u64) -> String {
    json!({ "items": [ { "page": page, "item": 0 }, { "page": page, "item": 1 } ] }).to_string()
}

async fn mount_json_page(server: &MockServer, page: u64) {
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_json(page)))
        .mount(server)
        .await;
}

fn fixed_json_job(server: &MockServer, pages: u64) -> String {
    format!(
        r#"
[[job]]
name = "items"
base-url = "{}/items"
discovery = {{ type = "fixed", pages = {} }}
extractor = {{ type = "json", pointer = "/items" }}
"#,
        server.uri(),
        pages
    )
}

#[tokio::test]
async fn test_html_listing_end_to_end() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    for (page, count) in [(1, 2), (2, 2), (3, 1)] {
        Mock::given(method("GET"))
            .and(path("/firms"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_string(firm_rows(page, count)))
            .mount(&server)
            .await;
    }

    let jobs = format!(
        r#"
[[job]]
name = "firms"
base-url = "{}/firms"
discovery = {{ type = "item-count", selector = ".results-count", per-page = 2 }}

[job.extractor]
type = "html"
row-selector = ".table-row"

[job.extractor.fields.name]
selector = ".name"
strip-prefix = "Name:"

[job.extractor.fields.url]
selector = "a"
attr = "href"
prepend = "https://register.example"
"#,
        server.uri()
    );
    let config = parse_config(&config_toml(dir.path(), "batch-size = 2", &jobs)).unwrap();

    let mut harvester = Harvester::from_config(config).unwrap();
    let selected = harvester.select_jobs(&[]).unwrap();
    let report = harvester.run(&selected).await.unwrap();

    assert!(report.is_success());
    let records = read_records(&dir.path().join("output").join("test_firms.json"));
    assert_eq!(records.len(), 5);
    assert_eq!(records[0]["name"], "Firm 1-0");
    assert_eq!(records[4]["url"], "https://register.example/firms/3-0");

    let store = JsonCheckpointStore::new(dir.path().join("checkpoints")).unwrap();
    assert_eq!(store.load(&JobKey::new("firms")).unwrap(), Some(3));
    assert_eq!(
        read_records(&dir.path().join("output").join("combined.json")).len(),
        5
    );
}

#[tokio::test]
async fn test_register_with_detail_pages() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    for (page, count) in [(1, 3), (2, 2)] {
        Mock::given(method("GET"))
            .and(path("/firms"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_string(firm_rows(page, count)))
            .mount(&server)
            .await;
    }
    for firm in ["1-0", "1-1", "1-2", "2-0", "2-1"] {
        let body = format!(
            r#"<html><body>
                 <div class="info"><p class="address">{firm} Gate Avenue</p></div>
                 <div class="table-content"><a><p class="person">Officer of {firm}</p></a></div>
               </body></html>"#
        );
        Mock::given(method("GET"))
            .and(path(format!("/firms/{}", firm)))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    let jobs = format!(
        r#"
[[job]]
name = "firms"
base-url = "{}/firms"
discovery = {{ type = "item-count", selector = ".results-count", per-page = 3 }}

[job.extractor]
type = "html"
row-selector = ".table-row"

[job.extractor.fields.name]
selector = ".name"
strip-prefix = "Name:"

[job.extractor.fields.url]
selector = "a"
attr = "href"

[job.details]
url-field = "url"
batch-size = 2

[job.details.extractor]
type = "html"
row-selector = ".info"

[job.details.extractor.fields.address]
selector = ".address"
"#,
        server.uri()
    );
    let config = parse_config(&config_toml(dir.path(), "batch-size = 2", &jobs)).unwrap();

    let mut harvester = Harvester::from_config(config).unwrap();
    let selected = harvester.select_jobs(&[]).unwrap();
    let report = harvester.run(&selected).await.unwrap();

    assert!(report.is_success());
    let records = read_records(&dir.path().join("output").join("test_firms.json"));
    assert_eq!(records.len(), 5);
    assert_eq!(
        records[1],
        json!({ "name": "Firm 1-1", "url": "/firms/1-1", "address": "1-1 Gate Avenue" })
    );
    assert_eq!(records[3]["address"], "2-0 Gate Avenue");
}

#[tokio::test]
async fn test_json_post_job_with_total_pages() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    for page in 0..2u64 {
        let body = json!({
            "data": {
                "pagination": { "totalPages": 2 },
                "products": [ { "sku": format!("P{}", page) } ]
            }
        });
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_partial_json(json!({ "variables": { "page": page } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
    }

    let jobs = format!(
        r#"
[[job]]
name = "office"
key = "5649"
base-url = "{}/graphql"
url-template = "{{base}}"
method = "POST"
body-template = '{{"query": "search", "variables": {{"category": "{{key}}", "page": {{page}}}}}}'
headers = {{ content-type = "application/json" }}
first-page = 0
discovery = {{ type = "json-total", pointer = "/data/pagination/totalPages" }}
extractor = {{ type = "json", pointer = "/data/products" }}
"#,
        server.uri()
    );
    let config = parse_config(&config_toml(dir.path(), "", &jobs)).unwrap();

    let mut harvester = Harvester::from_config(config).unwrap();
    let selected = harvester.select_jobs(&[]).unwrap();
    let report = harvester.run(&selected).await.unwrap();

    assert!(report.is_success());
    let records = read_records(&dir.path().join("output").join("test_5649.json"));
    assert_eq!(records, vec![json!({"sku": "P0"}), json!({"sku": "P1"})]);
}

#[tokio::test]
async fn test_embedded_json_with_last_page_link() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    for page in 1..=2u64 {
        let body = format!(
            r#"<html><body>
                 <div class="pg-w"><a href="/phones/?page=2#catalog-listing">Last</a></div>
                 <script>window.__STORE__={{"products": [{{"sku": "J{page}", "simples": []}}]}};</script>
               </body></html>"#
        );
        Mock::given(method("GET"))
            .and(path("/phones/"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
    }

    let jobs = format!(
        r#"
[[job]]
name = "phones"
base-url = "{}/phones/"
discovery = {{ type = "last-page-link", selector = "div.pg-w" }}
extractor = {{ type = "embedded-json", marker = "window.__STORE__=", pointer = "/products", drop-fields = ["simples"] }}
"#,
        server.uri()
    );
    let config = parse_config(&config_toml(dir.path(), "", &jobs)).unwrap();

    let mut harvester = Harvester::from_config(config).unwrap();
    let selected = harvester.select_jobs(&[]).unwrap();
    harvester.run(&selected).await.unwrap();

    let records = read_records(&dir.path().join("output").join("test_phones.json"));
    assert_eq!(records, vec![json!({"sku": "J1"}), json!({"sku": "J2"})]);
}

#[tokio::test]
async fn test_resume_skips_committed_pages() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let key = JobKey::new("items");

    // A previous run committed pages 1-2
    let mut store = JsonCheckpointStore::new(dir.path().join("checkpoints")).unwrap();
    store.save(&key, 2).unwrap();
    let mut journal = JsonlJournal::new(dir.path().join("checkpoints")).unwrap();
    let earlier: Vec<JournalEntry> = (1..=2u64)
        .map(|page| JournalEntry {
            page,
            record: json!({ "page": page, "item": 0 }),
        })
        .collect();
    journal.append(&key, &earlier).unwrap();

    for page in 1..=2u64 {
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing_json(page)))
            .expect(0)
            .mount(&server)
            .await;
    }
    for page in 3..=4 {
        mount_json_page(&server, page).await;
    }

    let config = parse_config(&config_toml(dir.path(), "", &fixed_json_job(&server, 4))).unwrap();
    let mut harvester = Harvester::from_config(config).unwrap();
    let selected = harvester.select_jobs(&[]).unwrap();
    let report = harvester.run(&selected).await.unwrap();

    let outcome = &report.completed[0].1;
    assert_eq!(outcome.resumed_from, Some(2));
    assert_eq!(outcome.recovered_records, 2);
    assert_eq!(outcome.records.len(), 6);
    assert_eq!(outcome.records[0], json!({ "page": 1, "item": 0 }));
    assert_eq!(store.load(&key).unwrap(), Some(4));
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    for page in 1..=3 {
        mount_json_page(&server, page).await;
    }

    let config = parse_config(&config_toml(dir.path(), "", &fixed_json_job(&server, 3))).unwrap();
    let mut harvester = Harvester::from_config(config).unwrap();
    let selected = harvester.select_jobs(&[]).unwrap();
    let report = harvester.run(&selected).await.unwrap();

    assert!(report.is_success());
    let outcome = &report.completed[0].1;
    assert_eq!(outcome.retries, 2);
    assert_eq!(outcome.records.len(), 6);
}

#[tokio::test]
async fn test_failed_page_stops_job_after_committing_prefix() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("page", "7"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;
    for page in (1..=10).filter(|page| *page != 7) {
        mount_json_page(&server, page).await;
    }

    let config = parse_config(&config_toml(
        dir.path(),
        "batch-size = 5\npage-attempts = 2",
        &fixed_json_job(&server, 10),
    ))
    .unwrap();
    let mut harvester = Harvester::from_config(config).unwrap();
    let selected = harvester.select_jobs(&[]).unwrap();
    let report = harvester.run(&selected).await.unwrap();

    assert!(!report.is_success());
    assert!(report.failures[0].error.contains("Page 7"));

    let key = JobKey::new("items");
    let store = JsonCheckpointStore::new(dir.path().join("checkpoints")).unwrap();
    assert_eq!(store.load(&key).unwrap(), Some(6));

    let mut journal = JsonlJournal::new(dir.path().join("checkpoints")).unwrap();
    let committed = journal.recover(&key, Some(6)).unwrap();
    assert_eq!(committed.len(), 12);

    // No per-job output for the failed job; the combined file is still written
    assert!(!dir.path().join("output").join("test_items.json").exists());
    assert!(read_records(&dir.path().join("output").join("combined.json")).is_empty());
}
