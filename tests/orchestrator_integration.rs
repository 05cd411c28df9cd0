//! Integration tests for the download orchestrator.
//!
//! These drive `Orchestrator` against a wiremock server with real ledgers on
//! disk: concurrency bound, retry classification, integrity rejection, ledger
//! deduplication and new-object detection.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bucketdl_core::{
    CsvLedger, DownloadStatus, EngineError, HttpClient, Ledger, LedgerRecord, Orchestrator,
    ProgressTotals, RenameStrategy, RetryPolicy, SqliteLedger,
};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::socket_guard::{should_skip_socket_bound_test, start_mock_server_or_skip};
use support::{etag_for, object_response};

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return Ok(());
        };
        mock_server
    }};
}

type TestResult = Result<(), Box<dyn std::error::Error>>;

// ==================== Helper Functions ====================

fn orchestrator(
    concurrency: usize,
    max_attempts: u32,
    root: &Path,
    ledger: Arc<dyn Ledger>,
) -> Result<Orchestrator, EngineError> {
    Orchestrator::new(
        concurrency,
        RetryPolicy::immediate(max_attempts),
        HttpClient::new(),
        root,
        ledger,
    )
}

async fn mount_object(server: &MockServer, name: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/{name}")))
        .respond_with(object_response(body))
        .mount(server)
        .await;
}

fn url(server: &MockServer, name: &str) -> String {
    format!("{}/{name}", server.uri())
}

fn csv_rows(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .map(|text| text.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

// ==================== Scenarios ====================

#[tokio::test]
async fn test_all_files_succeed_and_are_recorded() -> TestResult {
    let server = require_mock_server!();
    for name in ["a.txt", "b.txt", "c.pdf"] {
        mount_object(&server, name, name.as_bytes()).await;
    }

    let temp = TempDir::new()?;
    let root = temp.path().join("downloads");
    let ledger_path = temp.path().join("links.csv");
    let engine = orchestrator(2, 3, &root, Arc::new(CsvLedger::new(&ledger_path)))?;

    let urls: Vec<String> = ["a.txt", "b.txt", "c.pdf"]
        .iter()
        .map(|name| url(&server, name))
        .collect();
    let summary = engine.run_urls(&urls, RenameStrategy::None).await;

    assert_eq!(summary.success_count, 3);
    assert_eq!(summary.failure_count, 0);
    assert_eq!(summary.ledger_appended, 3);
    assert!(summary.ledger_error.is_none());
    assert_eq!(std::fs::read(root.join("txt/a.txt"))?, b"a.txt");
    assert_eq!(std::fs::read(root.join("pdf/c.pdf"))?, b"c.pdf");

    let rows = csv_rows(&ledger_path);
    assert_eq!(rows[0], "Link,Nome do Arquivo,Data de Download,Status");
    assert_eq!(rows.len(), 4);
    assert!(rows[1..].iter().all(|row| row.ends_with(",Baixado")));

    let outcome_urls: Vec<&str> = summary
        .outcomes
        .iter()
        .map(|o| o.task.url.as_str())
        .collect();
    let expected: Vec<&str> = urls.iter().map(String::as_str).collect();
    assert_eq!(outcome_urls, expected);
    Ok(())
}

#[tokio::test]
async fn test_always_failing_transfer_uses_every_attempt() -> TestResult {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/missing.bin"))
        .respond_with(ResponseTemplate::new(404))
        .expect(3)
        .mount(&server)
        .await;

    let temp = TempDir::new()?;
    let ledger_path = temp.path().join("links.csv");
    let engine = orchestrator(2, 3, temp.path(), Arc::new(CsvLedger::new(&ledger_path)))?;

    let summary = engine
        .run_urls(&[url(&server, "missing.bin")], RenameStrategy::None)
        .await;

    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.status, DownloadStatus::TransientFailure);
    assert_eq!(outcome.attempts, 3);
    assert!(outcome.message.contains("404"));
    assert_eq!(summary.ledger_appended, 0);
    assert!(!ledger_path.exists());
    assert!(!temp.path().join("bin/missing.bin").exists());
    Ok(())
}

#[tokio::test]
async fn test_integrity_mismatch_leaves_no_file() -> TestResult {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/photo.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", etag_for(b"something else").as_str())
                .set_body_bytes(b"actual bytes".to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new()?;
    let ledger_path = temp.path().join("links.csv");
    let engine = orchestrator(1, 3, temp.path(), Arc::new(CsvLedger::new(&ledger_path)))?;

    let summary = engine
        .run_urls(&[url(&server, "photo.jpg")], RenameStrategy::None)
        .await;

    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.status, DownloadStatus::IntegrityFailure);
    assert_eq!(outcome.attempts, 1);
    assert!(!temp.path().join("jpg/photo.jpg").exists());
    let leftovers = std::fs::read_dir(temp.path().join("jpg"))?.count();
    assert_eq!(leftovers, 0, "partial file should be removed");
    assert!(!ledger_path.exists());
    Ok(())
}

#[tokio::test]
async fn test_missing_etag_is_an_integrity_failure() -> TestResult {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/notes.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"no validator".to_vec()))
        .mount(&server)
        .await;

    let temp = TempDir::new()?;
    let engine = orchestrator(
        1,
        3,
        temp.path(),
        Arc::new(CsvLedger::new(temp.path().join("links.csv"))),
    )?;

    let summary = engine
        .run_urls(&[url(&server, "notes.txt")], RenameStrategy::None)
        .await;

    assert_eq!(summary.outcomes[0].status, DownloadStatus::IntegrityFailure);
    assert!(!temp.path().join("txt/notes.txt").exists());
    Ok(())
}

#[tokio::test]
async fn test_download_new_dispatches_only_unrecorded_urls() -> TestResult {
    let server = require_mock_server!();
    for (name, expected_hits) in [
        ("a.txt", 0_u64),
        ("b.txt", 0),
        ("c.txt", 1),
        ("d.txt", 1),
        ("e.txt", 1),
    ] {
        Mock::given(method("GET"))
            .and(path(format!("/{name}")))
            .respond_with(object_response(name.as_bytes()))
            .expect(expected_hits)
            .mount(&server)
            .await;
    }

    let temp = TempDir::new()?;
    let ledger = Arc::new(CsvLedger::new(temp.path().join("links.csv")));
    ledger
        .append(&[
            LedgerRecord::downloaded(url(&server, "a.txt"), "a.txt"),
            LedgerRecord::downloaded(url(&server, "b.txt"), "b.txt"),
        ])
        .await?;

    let candidates: Vec<String> = ["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"]
        .iter()
        .map(|name| url(&server, name))
        .collect();
    assert_eq!(ledger.diff_new(&candidates).await?, candidates[2..].to_vec());

    let engine = orchestrator(3, 1, temp.path(), ledger.clone())?;
    let summary = engine
        .download_new(&candidates, RenameStrategy::None)
        .await?;

    assert_eq!(summary.total(), 3);
    assert_eq!(summary.success_count, 3);
    assert_eq!(ledger.known_urls().await?.len(), 5);
    assert!(ledger.diff_new(&candidates).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_in_flight_downloads_never_exceed_concurrency() -> TestResult {
    let server = require_mock_server!();
    let names: Vec<String> = (0..8).map(|i| format!("f{i}.bin")).collect();
    for name in &names {
        Mock::given(method("GET"))
            .and(path(format!("/{name}")))
            .respond_with(object_response(name.as_bytes()).set_delay(Duration::from_millis(150)))
            .mount(&server)
            .await;
    }

    let temp = TempDir::new()?;
    let totals = Arc::new(ProgressTotals::new());
    let engine = orchestrator(
        3,
        1,
        temp.path(),
        Arc::new(CsvLedger::new(temp.path().join("links.csv"))),
    )?
    .with_reporter(totals.clone());

    let urls: Vec<String> = names.iter().map(|name| url(&server, name)).collect();
    let summary = engine.run_urls(&urls, RenameStrategy::None).await;

    assert_eq!(summary.success_count, 8);
    assert!(
        totals.peak_in_flight() <= 3,
        "peak {}",
        totals.peak_in_flight()
    );
    assert!(totals.peak_in_flight() >= 1);
    assert_eq!(totals.finished(), 8);
    assert_eq!(totals.in_flight(), 0);
    Ok(())
}

#[tokio::test]
async fn test_one_failure_does_not_affect_siblings() -> TestResult {
    let server = require_mock_server!();
    mount_object(&server, "ok-1.txt", b"one").await;
    mount_object(&server, "ok-2.txt", b"two").await;
    Mock::given(method("GET"))
        .and(path("/broken.txt"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let temp = TempDir::new()?;
    let ledger = Arc::new(CsvLedger::new(temp.path().join("links.csv")));
    let engine = orchestrator(2, 2, temp.path(), ledger.clone())?;

    let urls = vec![
        url(&server, "ok-1.txt"),
        url(&server, "broken.txt"),
        url(&server, "ok-2.txt"),
    ];
    let summary = engine.run_urls(&urls, RenameStrategy::None).await;

    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.failure_count, 1);
    assert_eq!(summary.outcomes[1].status, DownloadStatus::TransientFailure);
    assert_eq!(summary.outcomes[1].attempts, 2);

    let known = ledger.known_urls().await?;
    assert!(known.contains(&urls[0]));
    assert!(known.contains(&urls[2]));
    assert!(!known.contains(&urls[1]));
    Ok(())
}

#[tokio::test]
async fn test_rerunning_same_urls_adds_no_duplicate_rows() -> TestResult {
    let server = require_mock_server!();
    mount_object(&server, "a.txt", b"a").await;
    mount_object(&server, "b.txt", b"b").await;

    let temp = TempDir::new()?;
    let ledger_path = temp.path().join("links.csv");
    let engine = orchestrator(2, 1, temp.path(), Arc::new(CsvLedger::new(&ledger_path)))?;
    let urls = vec![url(&server, "a.txt"), url(&server, "b.txt")];

    let first = engine.run_urls(&urls, RenameStrategy::None).await;
    let second = engine.run_urls(&urls, RenameStrategy::None).await;

    assert_eq!(first.ledger_appended, 2);
    assert_eq!(second.success_count, 2);
    assert_eq!(second.ledger_appended, 0);
    assert_eq!(csv_rows(&ledger_path).len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_strip_prefix_renames_file_and_ledger_entry() -> TestResult {
    let server = require_mock_server!();
    mount_object(&server, "abc123def45photo.JPG", b"jpeg").await;

    let temp = TempDir::new()?;
    let root = temp.path().join("downloads");
    let ledger_path = temp.path().join("links.csv");
    let engine = orchestrator(1, 1, &root, Arc::new(CsvLedger::new(&ledger_path)))?;

    let summary = engine
        .run_urls(
            &[url(&server, "abc123def45photo.JPG")],
            RenameStrategy::StripPrefix(11),
        )
        .await;

    assert_eq!(summary.success_count, 1);
    assert!(root.join("jpg/photo.JPG").exists());
    assert!(csv_rows(&ledger_path)[1].contains(",photo.JPG,"));
    Ok(())
}

#[tokio::test]
async fn test_sqlite_ledger_records_successes() -> TestResult {
    let server = require_mock_server!();
    mount_object(&server, "a.txt", b"a").await;
    mount_object(&server, "b.txt", b"b").await;

    let temp = TempDir::new()?;
    let db_path = temp.path().join("state/links.db");
    let ledger = Arc::new(SqliteLedger::new(&db_path));
    let engine = orchestrator(2, 1, temp.path(), ledger.clone())?;
    let urls = vec![url(&server, "a.txt"), url(&server, "b.txt")];

    let summary = engine.run_urls(&urls, RenameStrategy::None).await;
    assert_eq!(summary.ledger_appended, 2);
    assert!(db_path.exists());

    let summary = engine.download_new(&urls, RenameStrategy::None).await?;
    assert_eq!(summary.total(), 0);
    assert_eq!(ledger.known_urls().await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_built_tasks_run_and_are_recorded() -> TestResult {
    let server = require_mock_server!();
    mount_object(&server, "a.txt", b"first").await;
    mount_object(&server, "b.pdf", b"second").await;

    let temp = TempDir::new()?;
    let root = temp.path().join("downloads");
    let ledger_path = temp.path().join("links.csv");
    let engine = orchestrator(2, 1, &root, Arc::new(CsvLedger::new(&ledger_path)))?;

    let urls = vec![
        url(&server, "a.txt"),
        format!("{}/", server.uri()),
        url(&server, "b.pdf"),
    ];
    let tasks = engine.build_tasks(&urls, RenameStrategy::None);
    assert_eq!(tasks.len(), 2, "URL without a file name is skipped");

    let summary = engine.run(tasks).await;

    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.ledger_appended, 2);
    assert_eq!(std::fs::read(root.join("txt/a.txt"))?, b"first");
    assert_eq!(std::fs::read(root.join("pdf/b.pdf"))?, b"second");
    assert_eq!(csv_rows(&ledger_path).len(), 3);
    Ok(())
}

// ==================== Retry classification ====================

#[tokio::test]
async fn test_transient_failure_then_success() -> TestResult {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/flaky.txt"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky.txt"))
        .respond_with(object_response(b"eventually"))
        .with_priority(2)
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new()?;
    let ledger_path = temp.path().join("links.csv");
    let engine = orchestrator(1, 3, temp.path(), Arc::new(CsvLedger::new(&ledger_path)))?;

    let summary = engine
        .run_urls(&[url(&server, "flaky.txt")], RenameStrategy::None)
        .await;

    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.status, DownloadStatus::Success);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(std::fs::read(temp.path().join("txt/flaky.txt"))?, b"eventually");
    assert_eq!(summary.ledger_appended, 1);
    Ok(())
}

#[tokio::test]
async fn test_connection_refused_uses_every_attempt() -> TestResult {
    if should_skip_socket_bound_test() {
        return Ok(());
    }
    // Bind then release a port so nothing is listening on it.
    let addr = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?;

    let temp = TempDir::new()?;
    let ledger_path = temp.path().join("links.csv");
    let engine = orchestrator(1, 3, temp.path(), Arc::new(CsvLedger::new(&ledger_path)))?;

    let summary = engine
        .run_urls(&[format!("http://{addr}/down.bin")], RenameStrategy::None)
        .await;

    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.status, DownloadStatus::TransientFailure);
    assert_eq!(outcome.attempts, 3);
    assert!(outcome.message.contains("network error"), "{}", outcome.message);
    assert!(!ledger_path.exists());
    Ok(())
}

/// Canned HTTP/1.1 response written by [`spawn_raw_server`].
#[derive(Clone)]
struct RawResponse {
    content_length: usize,
    etag: String,
    chunks: Vec<&'static [u8]>,
    gap: Duration,
}

/// Serves `response` on every connection, writing its chunks `gap` apart and
/// closing afterwards. Returns the address and a connection counter.
async fn spawn_raw_server(
    response: RawResponse,
) -> std::io::Result<(SocketAddr, Arc<AtomicUsize>)> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let response = response.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nETag: {}\r\n\
                     Connection: close\r\n\r\n",
                    response.content_length, response.etag
                );
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                for chunk in response.chunks {
                    tokio::time::sleep(response.gap).await;
                    if socket.write_all(chunk).await.is_err() {
                        return;
                    }
                    let _ = socket.flush().await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    Ok((addr, hits))
}

#[tokio::test]
async fn test_interrupted_body_is_retried_and_cleaned_up() -> TestResult {
    if should_skip_socket_bound_test() {
        return Ok(());
    }
    // Declares 100 bytes, sends 10, then hangs up.
    let (addr, hits) = spawn_raw_server(RawResponse {
        content_length: 100,
        etag: etag_for(b"never delivered"),
        chunks: vec![&b"only ten b"[..]],
        gap: Duration::ZERO,
    })
    .await?;

    let temp = TempDir::new()?;
    let root = temp.path().join("downloads");
    let ledger_path = temp.path().join("links.csv");
    let engine = orchestrator(1, 2, &root, Arc::new(CsvLedger::new(&ledger_path)))?;

    let summary = engine
        .run_urls(&[format!("http://{addr}/cut.bin")], RenameStrategy::None)
        .await;

    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.status, DownloadStatus::TransientFailure);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    let leftovers: Vec<_> = std::fs::read_dir(root.join("bin"))?
        .filter_map(Result::ok)
        .map(|entry| entry.file_name())
        .collect();
    assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
    assert!(!ledger_path.exists());
    Ok(())
}

#[tokio::test]
async fn test_slow_transfer_outlasting_read_timeout_succeeds() -> TestResult {
    if should_skip_socket_bound_test() {
        return Ok(());
    }
    let chunks: Vec<&'static [u8]> = vec![&b"slow "[..], &b"but "[..], &b"steady"[..]];
    let body = chunks.concat();
    // Each read completes within the 1s limit; the whole body takes about 1.8s.
    let (addr, _hits) = spawn_raw_server(RawResponse {
        content_length: body.len(),
        etag: etag_for(&body),
        chunks,
        gap: Duration::from_millis(600),
    })
    .await?;

    let temp = TempDir::new()?;
    let engine = Orchestrator::new(
        1,
        RetryPolicy::immediate(1),
        HttpClient::new_with_timeouts(1, 1),
        temp.path(),
        Arc::new(CsvLedger::new(temp.path().join("links.csv"))),
    )?;

    let summary = engine
        .run_urls(&[format!("http://{addr}/slow.txt")], RenameStrategy::None)
        .await;

    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.status, DownloadStatus::Success, "{}", outcome.message);
    assert_eq!(std::fs::read(temp.path().join("txt/slow.txt"))?, body);
    Ok(())
}
