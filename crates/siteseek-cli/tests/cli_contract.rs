use assert_cmd::Command;
use axum::{http::header, routing::get, Router};
use predicates::prelude::*;
use std::net::SocketAddr;
use std::path::Path;

const PAGE: &str = r#"<html><head><title>Field guide</title></head><body>
<main>
  <h2>Foxes</h2>
  <p>The red fox is the largest of the true foxes and one of the most widely distributed members of the order Carnivora.</p>
</main>
</body></html>"#;

const ENV_KEYS: [&str; 8] = [
    "SITESEEK_PAGE",
    "SITESEEK_CACHE_DIR",
    "SITESEEK_MAX_RESULTS",
    "SITESEEK_SEARCH_ENDPOINT",
    "SITESEEK_SEARCH_METHOD",
    "SITESEEK_SEARCH_LABEL",
    "SITESEEK_OBSERVE_DOM",
    "SITESEEK_SITEMAP_URL",
];

fn siteseek(cache: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("siteseek"));
    for k in ENV_KEYS {
        cmd.env_remove(k);
    }
    cmd.env_remove("RUST_LOG");
    cmd.arg("--cache-dir").arg(cache);
    cmd
}

fn write_page(dir: &Path) -> String {
    let p = dir.join("guide.html");
    std::fs::write(&p, PAGE).unwrap();
    p.to_string_lossy().to_string()
}

#[test]
fn search_local_page_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let page = write_page(dir.path());
    let out = siteseek(dir.path())
        .args(["--page", &page, "--url", "https://a.test/guide", "--json", "search", "red fox"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["provider_name"].as_str(), Some("page content"));
    assert_eq!(v["provider_label"].as_str(), Some("this page"));
    let results = v["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["title"].as_str(), Some("Foxes"));
    assert!(results[0]["url"].as_str().unwrap().starts_with("https://a.test/guide#"));
}

#[test]
fn search_without_matches_prints_no_results() {
    let dir = tempfile::tempdir().unwrap();
    let page = write_page(dir.path());
    siteseek(dir.path())
        .args(["--page", &page, "--url", "https://a.test/guide", "search", "zebra"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no results"));
}

#[test]
fn index_lists_sections() {
    let dir = tempfile::tempdir().unwrap();
    let page = write_page(dir.path());
    siteseek(dir.path())
        .args(["--page", &page, "--url", "https://a.test/guide", "index"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 entries"))
        .stdout(predicate::str::contains("Foxes <https://a.test/guide#"));
}

#[test]
fn local_page_without_url_fails() {
    let dir = tempfile::tempdir().unwrap();
    let page = write_page(dir.path());
    siteseek(dir.path())
        .args(["--page", &page, "index"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--url is required"));
}

#[test]
fn crawl_without_site_indexing_fails() {
    let dir = tempfile::tempdir().unwrap();
    let page = write_page(dir.path());
    siteseek(dir.path())
        .args(["--page", &page, "--url", "https://a.test/guide", "crawl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("site indexing is disabled"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn crawl_persists_and_later_searches_use_the_cache() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let sitemap = format!(
        r#"<?xml version="1.0"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
        <url><loc>http://{addr}/otters</loc></url></urlset>"#
    );
    let app = Router::new()
        .route(
            "/sitemap.xml",
            get(move || {
                let body = sitemap.clone();
                async move { ([(header::CONTENT_TYPE, "application/xml")], body) }
            }),
        )
        .route(
            "/otters",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "text/html")],
                    "<html><head><title>Otters</title></head><body><main>Sea otters hold hands while they sleep so they do not drift apart on the water.</main></body></html>",
                )
            }),
        )
        .route(
            "/",
            get(|| async { ([(header::CONTENT_TYPE, "text/html")], PAGE) }),
        );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let dir = tempfile::tempdir().unwrap();
    let cfg = dir.path().join("site.json");
    std::fs::write(&cfg, r#"{"siteIndexing": {"sitemapUrl": "/sitemap.xml"}}"#).unwrap();
    let cache = dir.path().join("cache");
    let page_url = format!("http://{addr}/");

    let (cache2, cfg2, url2) = (cache.clone(), cfg.clone(), page_url.clone());
    let crawl = tokio::task::spawn_blocking(move || {
        siteseek(&cache2)
            .arg("--page")
            .arg(&url2)
            .arg("--config")
            .arg(&cfg2)
            .args(["--json", "crawl"])
            .output()
            .unwrap()
    })
    .await
    .unwrap();
    assert!(crawl.status.success(), "{}", String::from_utf8_lossy(&crawl.stderr));
    let entries: serde_json::Value = serde_json::from_slice(&crawl.stdout).unwrap();
    assert_eq!(entries.as_array().unwrap().len(), 1);
    assert_eq!(entries[0]["title"].as_str(), Some("Otters"));
    assert!(std::fs::read_dir(&cache).unwrap().next().is_some());

    let search = tokio::task::spawn_blocking(move || {
        siteseek(&cache)
            .arg("--page")
            .arg(&page_url)
            .arg("--config")
            .arg(&cfg)
            .args(["--json", "search", "otters"])
            .output()
            .unwrap()
    })
    .await
    .unwrap();
    assert!(search.status.success(), "{}", String::from_utf8_lossy(&search.stderr));
    let v: serde_json::Value = serde_json::from_slice(&search.stdout).unwrap();
    assert_eq!(v["provider_name"].as_str(), Some("site index"));
    assert_eq!(v["results"][0]["title"].as_str(), Some("Otters"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn search_on_stale_cache_finishes_the_refresh_before_exit() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let sitemap = format!(
        r#"<?xml version="1.0"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
        <url><loc>http://{addr}/otters</loc></url></urlset>"#
    );
    let page_hits = Arc::new(AtomicUsize::new(0));
    let hits = page_hits.clone();
    let app = Router::new()
        .route(
            "/sitemap.xml",
            get(move || {
                let body = sitemap.clone();
                async move { ([(header::CONTENT_TYPE, "application/xml")], body) }
            }),
        )
        .route(
            "/otters",
            get(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (
                        [(header::CONTENT_TYPE, "text/html")],
                        "<html><head><title>Otters</title></head><body><main>Sea otters hold hands while they sleep so they do not drift apart on the water.</main></body></html>",
                    )
                }
            }),
        )
        .route(
            "/",
            get(|| async { ([(header::CONTENT_TYPE, "text/html")], PAGE) }),
        );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let dir = tempfile::tempdir().unwrap();
    let cfg = dir.path().join("site.json");
    std::fs::write(
        &cfg,
        r#"{"siteIndexing": {"sitemapUrl": "/sitemap.xml", "cacheTtl": 1}}"#,
    )
    .unwrap();
    let cache = dir.path().join("cache");
    let page_url = format!("http://{addr}/");

    let run = |args: &'static [&'static str]| {
        let (cache, cfg, url) = (cache.clone(), cfg.clone(), page_url.clone());
        tokio::task::spawn_blocking(move || {
            siteseek(&cache)
                .arg("--page")
                .arg(&url)
                .arg("--config")
                .arg(&cfg)
                .args(args)
                .output()
                .unwrap()
        })
    };

    let crawl = run(&["--json", "crawl"]).await.unwrap();
    assert!(crawl.status.success(), "{}", String::from_utf8_lossy(&crawl.stderr));
    assert_eq!(page_hits.load(Ordering::SeqCst), 1);

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    let search = run(&["--json", "search", "otters"]).await.unwrap();
    assert!(search.status.success(), "{}", String::from_utf8_lossy(&search.stderr));
    let v: serde_json::Value = serde_json::from_slice(&search.stdout).unwrap();
    assert_eq!(v["provider_name"].as_str(), Some("site index"));
    assert_eq!(page_hits.load(Ordering::SeqCst), 2, "background refresh ran to completion");
}
