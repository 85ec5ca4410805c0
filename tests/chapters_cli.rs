use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use novelgrab::formats::{BookExport, ChapterRecord, LinksFile};
use predicates::prelude::*;

fn chapter_body(n: usize) -> String {
    let paragraph =
        "Klein stared at the crimson moon while the fog rolled over the quiet street again. "
            .repeat(3);
    format!(
        "<html><body><h1 class=\"chapter-title\">Chapter {n}: Fog</h1>\
         <div class=\"text-content\"><p>{paragraph}</p><p>{paragraph}</p></div></body></html>"
    )
}

fn spawn_site(hits: Arc<AtomicUsize>) -> (String, mpsc::Sender<()>, thread::JoinHandle<()>) {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
    let addr = server.server_addr();
    let base_url = format!("http://{addr}");

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let handle = thread::spawn(move || {
        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            let request = match server.recv_timeout(Duration::from_millis(50)) {
                Ok(Some(req)) => req,
                Ok(None) => continue,
                Err(_) => break,
            };

            let path = request.url().to_string();
            let body = match path.as_str() {
                "/ch/1.html" => Some(chapter_body(1)),
                "/ch/2.html" => Some(chapter_body(2)),
                "/ch/3.html" => Some(chapter_body(3)),
                _ => None,
            };

            let response = match body {
                Some(html) => {
                    hits.fetch_add(1, Ordering::SeqCst);
                    let header = tiny_http::Header::from_bytes(
                        &b"Content-Type"[..],
                        &b"text/html; charset=utf-8"[..],
                    )
                    .expect("build header");
                    tiny_http::Response::from_string(html).with_header(header)
                }
                None => tiny_http::Response::from_string("not found").with_status_code(404),
            };

            let _ = request.respond(response);
        }
    });

    (base_url, shutdown_tx, handle)
}

#[test]
fn chapters_command_fetches_exports_and_resumes() -> anyhow::Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let (base_url, shutdown_tx, server_handle) = spawn_site(hits.clone());
    let temp = tempfile::TempDir::new()?;

    let links_path = temp.path().join("links.json");
    let links = LinksFile {
        book_id: "133485".to_owned(),
        links: (1..=3)
            .map(|n| {
                ChapterRecord::link(format!("{base_url}/ch/{n}.html"), format!("Chapter {n}"), n - 1)
            })
            .collect(),
    };
    fs::write(&links_path, serde_json::to_string_pretty(&links)?)?;

    // Zero delays so the test does not sleep between chapters.
    let config_path = temp.path().join("config.yaml");
    fs::write(
        &config_path,
        "rate_limit:\n  min_secs: 0.0\n  max_secs: 0.0\nretry:\n  max_attempts: 1\n  timeout_secs: 10\n",
    )?;

    let checkpoint_path = temp.path().join("checkpoint.json");
    let out_base = temp.path().join("chapters_133485");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("novelgrab");
    cmd.args([
        "chapters",
        "--links",
        links_path.to_str().unwrap(),
        "--config",
        config_path.to_str().unwrap(),
        "--checkpoint",
        checkpoint_path.to_str().unwrap(),
        "--out",
        out_base.to_str().unwrap(),
        "--format",
        "all",
    ])
    .assert()
    .success();

    assert_eq!(hits.load(Ordering::SeqCst), 3, "each chapter fetched once");

    let json_path = out_base.with_extension("json");
    let export: BookExport = serde_json::from_str(&fs::read_to_string(&json_path)?)?;
    assert_eq!(export.book_info.book_id, "133485");
    assert_eq!(export.chapters.len(), 3);
    assert!(export.chapters.iter().all(|c| c.has_content()));
    assert_eq!(export.chapters[1].title, "Chapter 2: Fog");

    let db_path = out_base.with_extension("db");
    let conn = rusqlite::Connection::open(&db_path)?;
    let rows: i64 = conn.query_row(
        "SELECT COUNT(*) FROM chapters WHERE book_id = ?1",
        rusqlite::params!["133485"],
        |row| row.get(0),
    )?;
    assert_eq!(rows, 3);

    let txt = fs::read_to_string(out_base.with_extension("txt"))?;
    assert!(txt.contains("Chapter 1: Fog"));
    assert!(txt.contains("crimson moon"));

    assert!(checkpoint_path.exists(), "expected checkpoint to exist");

    // Re-invocation resumes: nothing is fetched again, exports stay stable.
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("novelgrab");
    cmd.args([
        "chapters",
        "--links",
        links_path.to_str().unwrap(),
        "--config",
        config_path.to_str().unwrap(),
        "--checkpoint",
        checkpoint_path.to_str().unwrap(),
        "--out",
        out_base.to_str().unwrap(),
        "--format",
        "all",
    ])
    .assert()
    .success();

    assert_eq!(hits.load(Ordering::SeqCst), 3, "completed chapters are never re-fetched");

    let export: BookExport = serde_json::from_str(&fs::read_to_string(&json_path)?)?;
    assert_eq!(export.chapters.len(), 3);

    let conn = rusqlite::Connection::open(&db_path)?;
    let rows: i64 = conn.query_row(
        "SELECT COUNT(*) FROM chapters WHERE book_id = ?1",
        rusqlite::params!["133485"],
        |row| row.get(0),
    )?;
    assert_eq!(rows, 3, "sqlite export upserts, never appends");

    let _ = shutdown_tx.send(());
    let _ = server_handle.join();

    Ok(())
}

#[test]
fn chapters_command_rejects_empty_links_file() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;

    let links_path = temp.path().join("links.json");
    fs::write(&links_path, r#"{"book_id":"133485","links":[]}"#)?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("novelgrab");
    cmd.args(["chapters", "--links", links_path.to_str().unwrap()])
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no links found"));

    Ok(())
}
