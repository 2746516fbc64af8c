//! `siteseek-cli` library surface.
//!
//! The binary is the entrypoint for end users; these helpers load the page
//! snapshot and configuration the same way it does, so they can be reused.

use anyhow::{Context, Result};
use serde_json::Value;
use siteseek_local::{http, AssistantConfig, FsStore, PageSnapshot};
use std::path::{Path, PathBuf};

pub use siteseek_core as core;

/// Per-user cache directory, falling back to the store's temp-dir default.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("siteseek"))
        .unwrap_or_else(FsStore::default_dir)
}

/// Read each `--config` file as a JSON layer, then apply env overrides.
pub fn load_config(paths: &[PathBuf]) -> Result<AssistantConfig> {
    let mut layers: Vec<Value> = Vec::with_capacity(paths.len());
    for p in paths {
        let txt = std::fs::read_to_string(p)
            .with_context(|| format!("read config {}", p.display()))?;
        let v: Value = serde_json::from_str(&txt)
            .with_context(|| format!("parse config {}", p.display()))?;
        if !v.is_object() {
            anyhow::bail!("config {} must be a JSON object", p.display());
        }
        layers.push(v);
    }
    Ok(AssistantConfig::from_layers_and_env(&layers)?)
}

fn is_http_url(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Load the page to search.
///
/// `page` is an `http(s)` URL (fetched) or a local HTML file. For a file,
/// `url` is required so relative links and the origin resolve. For a fetched
/// page, `url` overrides the final response URL.
pub async fn load_page(
    page: &str,
    url: Option<&str>,
    config: &AssistantConfig,
) -> Result<PageSnapshot> {
    if is_http_url(page) {
        let client = http::build_client(config)?;
        let resp = client
            .get(page.trim())
            .send()
            .await
            .with_context(|| format!("fetch {page}"))?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("fetch {page}: HTTP {status}");
        }
        let final_url = resp.url().to_string();
        let html = resp.text().await.with_context(|| format!("read {page}"))?;
        let page_url = url.unwrap_or(&final_url);
        return Ok(PageSnapshot::new(page_url, html)?);
    }

    let Some(page_url) = url else {
        anyhow::bail!("--url is required when --page is a local file");
    };
    let html = std::fs::read_to_string(Path::new(page))
        .with_context(|| format!("read page {page}"))?;
    Ok(PageSnapshot::new(page_url, html)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_files_layer_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");
        std::fs::write(&a, r#"{"searchLabel": "docs", "siteIndexing": {"maxPages": 4}}"#).unwrap();
        std::fs::write(&b, r#"{"siteIndexing": {"label": "archive"}}"#).unwrap();
        let c = load_config(&[a, b]).unwrap();
        assert_eq!(c.search_label, "docs");
        assert_eq!(c.site_indexing.max_pages, 4);
        assert_eq!(c.site_indexing.label.as_deref(), Some("archive"));
    }

    #[test]
    fn non_object_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("bad.json");
        std::fs::write(&p, "[1, 2]").unwrap();
        assert!(load_config(&[p]).is_err());
    }

    #[tokio::test]
    async fn local_page_needs_a_url() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("page.html");
        std::fs::write(&p, "<html><head><title>T</title></head></html>").unwrap();
        let path = p.to_string_lossy().to_string();
        let cfg = AssistantConfig::default();
        assert!(load_page(&path, None, &cfg).await.is_err());
        let page = load_page(&path, Some("https://a.test/docs/"), &cfg).await.unwrap();
        assert_eq!(page.origin(), "https://a.test");
        assert_eq!(page.document_title(), "T");
    }

    #[test]
    fn url_detection() {
        assert!(is_http_url(" HTTPS://a.test"));
        assert!(!is_http_url("./page.html"));
    }
}
