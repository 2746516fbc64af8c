//! Crawl target discovery: XML sitemaps and CMS REST listings.

use crate::config::ResolvedSiteIndexing;
use crate::json_path;
use crate::page::PageSnapshot;
use futures_util::future::join_all;
use quick_xml::events::Event;
use serde_json::Value;
use siteseek_core::{Error, Result};
use tracing::{debug, warn};
use url::Url;

/// A page to crawl, optionally with the title the listing gave it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub url: String,
    pub title: Option<String>,
}

impl Target {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitemapKind {
    UrlSet,
    Index,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sitemap {
    pub kind: SitemapKind,
    pub locs: Vec<String>,
}

/// Collect every `<loc>` in document order. The root element decides whether
/// the locations are pages (`urlset`) or child sitemaps (`sitemapindex`).
pub fn parse_sitemap(xml: &str) -> Result<Sitemap> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut kind = SitemapKind::UrlSet;
    let mut seen_root = false;
    let mut in_loc = false;
    let mut cur = String::new();
    let mut locs = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                let name = name.as_ref();
                if !seen_root {
                    seen_root = true;
                    if name.eq_ignore_ascii_case(b"sitemapindex") {
                        kind = SitemapKind::Index;
                    }
                }
                if name.eq_ignore_ascii_case(b"loc") {
                    in_loc = true;
                    cur.clear();
                }
            }
            Ok(Event::Text(t)) if in_loc => {
                let txt = t
                    .unescape()
                    .map_err(|e| Error::Parse(format!("sitemap: {e}")))?;
                cur.push_str(&txt);
            }
            Ok(Event::CData(t)) if in_loc => {
                cur.push_str(&String::from_utf8_lossy(t.as_ref()));
            }
            Ok(Event::End(e)) => {
                if in_loc && e.local_name().as_ref().eq_ignore_ascii_case(b"loc") {
                    in_loc = false;
                    let loc = cur.trim();
                    if !loc.is_empty() {
                        locs.push(loc.to_string());
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                return Err(Error::Parse(format!(
                    "sitemap at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
        }
        buf.clear();
    }
    if !seen_root {
        return Err(Error::Parse("sitemap: no root element".into()));
    }
    Ok(Sitemap { kind, locs })
}

/// Items of a CMS REST listing: `url` or `link`, plus a `title` that may be a
/// string or `{ "rendered": ... }`. Items without a URL are skipped.
pub fn parse_rest_listing(v: &Value, max: usize) -> Vec<Target> {
    let Some(items) = v.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let url = json_path::first_text(item, &["url", "link"])?;
            let title = json_path::first_text(item, &["title"]).map(|t| crate::text::strip_html(&t));
            Some(Target {
                url,
                title: title.filter(|t| !t.is_empty()),
            })
        })
        .take(max)
        .collect()
}

/// Add `per_page=<n>` unless the URL already carries one.
pub fn with_per_page(url: &Url, n: usize) -> Url {
    if url.query_pairs().any(|(k, _)| k == "per_page") {
        return url.clone();
    }
    let mut u = url.clone();
    u.query_pairs_mut().append_pair("per_page", &n.to_string());
    u
}

pub fn default_rest_url(page: &PageSnapshot) -> String {
    format!("{}/wp-json/wp/v2/search", page.origin())
}

/// Find crawl candidates: the sitemap if one is configured, else the REST
/// listing (configured, or the WordPress default when `wordpress` is set).
/// Capped at `max_pages`; no filtering happens here.
pub async fn discover(
    client: &reqwest::Client,
    cfg: &ResolvedSiteIndexing,
    page: &PageSnapshot,
    wordpress: bool,
) -> Result<Vec<Target>> {
    if cfg.max_pages == 0 {
        return Ok(Vec::new());
    }
    if let Some(sitemap) = &cfg.sitemap_url {
        let url = resolve(page, sitemap)?;
        return from_sitemap(client, &url, cfg.max_pages).await;
    }
    let rest = match &cfg.rest_url {
        Some(r) => r.clone(),
        None if wordpress => default_rest_url(page),
        None => return Ok(Vec::new()),
    };
    let url = with_per_page(&resolve(page, &rest)?, cfg.max_pages);
    let body = get_text(client, &url).await?;
    let v: Value = serde_json::from_str(&body).map_err(|e| Error::Parse(format!("{url}: {e}")))?;
    let out = parse_rest_listing(&v, cfg.max_pages);
    debug!(url = %url, found = out.len(), "rest discovery");
    Ok(out)
}

async fn from_sitemap(client: &reqwest::Client, url: &Url, max: usize) -> Result<Vec<Target>> {
    let root = parse_sitemap(&get_text(client, url).await?)?;
    if root.kind == SitemapKind::UrlSet {
        debug!(url = %url, found = root.locs.len(), "sitemap discovery");
        return Ok(root.locs.into_iter().take(max).map(Target::new).collect());
    }

    // Index: follow the children one level, in order.
    let children: Vec<Url> = root
        .locs
        .iter()
        .filter_map(|l| url.join(l).ok())
        .collect();
    let fetched = join_all(children.iter().map(|c| async move {
        let res = async { parse_sitemap(&get_text(client, c).await?) }.await;
        (c, res)
    }))
    .await;

    let mut out = Vec::new();
    for (child, res) in fetched {
        match res {
            Ok(sm) if sm.kind == SitemapKind::UrlSet => {
                out.extend(sm.locs.into_iter().map(Target::new));
            }
            Ok(_) => debug!(url = %child, "nested sitemap index ignored"),
            Err(e) => warn!(url = %child, error = %e, "child sitemap failed"),
        }
        if out.len() >= max {
            break;
        }
    }
    out.truncate(max);
    debug!(url = %url, found = out.len(), "sitemap index discovery");
    Ok(out)
}

fn resolve(page: &PageSnapshot, s: &str) -> Result<Url> {
    page.url
        .join(s)
        .map_err(|e| Error::InvalidUrl(format!("{s}: {e}")))
}

async fn get_text(client: &reqwest::Client, url: &Url) -> Result<String> {
    let resp = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| Error::Fetch(e.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Http {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    resp.text().await.map_err(|e| Error::Fetch(e.to_string()))
}
