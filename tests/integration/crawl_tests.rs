//! Integration tests for the crawler
//!
//! These tests use wiremock for both the GraphQL endpoint and the search index,
//! and real SQLite and filesystem sinks in temporary directories, to run the
//! full crawl cycle end-to-end.

use anilist_crawler::config::{parse_config, Config};
use anilist_crawler::crawler::{run_crawl, RunSpec, RunStatus};
use anilist_crawler::sink::SqliteSink;
use serde_json::{json, Value};
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Builds a configuration pointing at the mock servers, with every sink enabled
fn create_test_config(api: &str, search: &str, dir: &Path, per_page: u32, workers: usize) -> Config {
    let toml = format!(
        r#"
[api]
endpoint = "{api}/"
per-page = {per_page}

[crawler]
workers = {workers}
max-attempts = 3
server-error-delay-secs = 0

[sinks.sqlite]
database-path = '{db}'

[sinks.search]
endpoint = "{search}"
index = "anilist"

[sinks.filesystem]
output-dir = '{out}'
"#,
        db = dir.join("anilist.db").display(),
        out = dir.join("anilist_anime").display(),
    );
    parse_config(&toml).expect("test config is valid")
}

fn media(id: i64) -> Value {
    json!({ "id": id, "title": { "native": format!("作品{}", id), "romaji": format!("Sakuhin {}", id) } })
}

fn page_body(ids: &[i64], has_next_page: bool) -> Value {
    json!({
        "data": { "Page": {
            "pageInfo": { "hasNextPage": has_next_page, "perPage": ids.len() },
            "media": ids.iter().map(|id| media(*id)).collect::<Vec<_>>()
        }}
    })
}

async fn mount_page(server: &MockServer, page: u32, body: Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "variables": { "page": page } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

async fn accept_all_documents(search: &MockServer) {
    Mock::given(method("PUT"))
        .and(path_regex(r"^/anilist/anime/\d+$"))
        .respond_with(ResponseTemplate::new(201))
        .mount(search)
        .await;
}

fn open_db(dir: &TempDir) -> SqliteSink {
    SqliteSink::open(&dir.path().join("anilist.db"), "anime", None).unwrap()
}

#[tokio::test]
async fn test_single_item_written_to_every_sink() {
    let api = MockServer::start().await;
    let search = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "variables": { "id": 101 } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&[101], false)))
        .expect(1)
        .mount(&api)
        .await;
    Mock::given(method("PUT"))
        .and(path("/anilist/anime/101"))
        .and(body_partial_json(json!({ "id": 101 })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&search)
        .await;

    let config = create_test_config(&api.uri(), &search.uri(), dir.path(), 50, 4);
    let report = run_crawl(&config, "hash-1", &RunSpec::single_item(101))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.items_written, 1);

    let db = open_db(&dir);
    assert_eq!(db.get(101).unwrap().unwrap()["id"], json!(101));

    let file = dir.path().join("anilist_anime").join("101.json");
    let saved: Value = serde_json::from_str(&std::fs::read_to_string(file).unwrap()).unwrap();
    assert_eq!(saved, media(101));
}

#[tokio::test]
async fn test_page_range_fetches_pages_in_order() {
    let api = MockServer::start().await;
    let search = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(&api, 1, page_body(&[1, 2], true)).await;
    // the listing goes on, but the range ends at page 2
    mount_page(&api, 2, page_body(&[3], true)).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "variables": { "page": 3 } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&[4], false)))
        .expect(0)
        .mount(&api)
        .await;
    accept_all_documents(&search).await;

    let config = create_test_config(&api.uri(), &search.uri(), dir.path(), 2, 2);
    let spec = RunSpec::parse_page_range("1-2").unwrap();
    let report = run_crawl(&config, "hash-2", &spec).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.pages_fetched, vec![1, 2]);
    assert_eq!(report.items_written, 3);
    assert_eq!(open_db(&dir).count().unwrap(), 3);

    let out = dir.path().join("anilist_anime");
    for id in [1, 2, 3] {
        assert!(out.join(format!("{}.json", id)).exists());
    }
    assert!(!out.join("4.json").exists());
}

#[tokio::test]
async fn test_unbounded_range_stops_on_last_page() {
    let api = MockServer::start().await;
    let search = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(&api, 5, page_body(&[50, 51], true)).await;
    mount_page(&api, 6, page_body(&[60], false)).await;
    accept_all_documents(&search).await;

    let config = create_test_config(&api.uri(), &search.uri(), dir.path(), 2, 3);
    let spec = RunSpec::parse_page_range("5-").unwrap();
    let report = run_crawl(&config, "hash", &spec).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.pages_fetched, vec![5, 6]);
    assert_eq!(report.items_written, 3);
}

#[tokio::test]
async fn test_rate_limit_waits_for_retry_after() {
    let api = MockServer::start().await;
    let search = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // registered first, so it answers the first request only
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&api)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&[101], false)))
        .expect(1)
        .mount(&api)
        .await;
    accept_all_documents(&search).await;

    let config = create_test_config(&api.uri(), &search.uri(), dir.path(), 50, 1);
    let started = Instant::now();
    let report = run_crawl(&config, "hash", &RunSpec::single_item(101))
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.items_written, 1);
}

#[tokio::test]
async fn test_one_failed_sink_write_does_not_stop_the_run() {
    let api = MockServer::start().await;
    let search = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(&api, 1, page_body(&[1, 2, 3, 4, 5], false)).await;
    Mock::given(method("PUT"))
        .and(path("/anilist/anime/3"))
        .respond_with(ResponseTemplate::new(500).set_body_string("shard unavailable"))
        .mount(&search)
        .await;
    accept_all_documents(&search).await;

    let config = create_test_config(&api.uri(), &search.uri(), dir.path(), 5, 3);
    let spec = RunSpec::parse_page_range("1-").unwrap();
    let report = run_crawl(&config, "hash", &spec).await.unwrap();

    assert_eq!(report.status, RunStatus::CompletedWithFailures(1));
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.items_written, 4);
    assert_eq!(report.failed_ids, vec![3]);
    // the other sinks still hold the failed item; re-running repairs the index
    assert_eq!(open_db(&dir).count().unwrap(), 5);
    assert!(report.peak_busy <= 3);
}

#[tokio::test]
async fn test_failed_page_aborts_with_exit_code_two() {
    let api = MockServer::start().await;
    let search = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(&api, 1, page_body(&[1, 2], true)).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "variables": { "page": 2 } })))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&api)
        .await;
    accept_all_documents(&search).await;

    let config = create_test_config(&api.uri(), &search.uri(), dir.path(), 2, 2);
    let spec = RunSpec::parse_page_range("1-").unwrap();
    let report = run_crawl(&config, "hash", &spec).await.unwrap();

    assert!(matches!(report.status, RunStatus::Aborted(_)));
    assert_eq!(report.exit_code(), 2);
    // items discovered before the failure are still fully processed
    assert_eq!(report.items_written, 2);
    assert_eq!(report.pages_fetched, vec![1]);
}

#[tokio::test]
async fn test_runs_are_recorded_in_the_ledger() {
    let api = MockServer::start().await;
    let search = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&[7], false)))
        .mount(&api)
        .await;
    accept_all_documents(&search).await;

    let config = create_test_config(&api.uri(), &search.uri(), dir.path(), 50, 2);
    let first = run_crawl(&config, "hash-a", &RunSpec::single_item(7))
        .await
        .unwrap();
    let second = run_crawl(&config, "hash-a", &RunSpec::single_item(7))
        .await
        .unwrap();

    let db = open_db(&dir);
    assert_eq!(db.latest_run_id().unwrap(), second.run_id);
    assert_ne!(first.run_id, second.run_id);

    let run = db.get_run(second.run_id.unwrap()).unwrap().unwrap();
    assert_eq!(run.status, "completed");
    assert_eq!(run.mode, "anime 7");
    assert_eq!(run.config_hash, "hash-a");
    assert_eq!(run.items_written, 1);
    // rewriting the same id is an upsert
    assert_eq!(db.count().unwrap(), 1);
}
