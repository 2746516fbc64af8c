//! Site-wide index built by crawling same-origin pages.
//!
//! Lifecycle: the first [`SiteIndexer::ensure_loaded`] adopts the persisted
//! record for this origin (refreshing it in the background when stale) or, with
//! no usable record, crawls and waits. At most one crawl runs at a time; callers
//! that arrive while one is running share its result.

use crate::config::{AssistantConfig, ResolvedSiteIndexing};
use crate::page::{self, PageSnapshot};
use crate::sitemap::{self, Target};
use crate::store::site_index_key;
use crate::{ranking, text};
use futures_util::future::{join_all, BoxFuture, FutureExt, Shared};
use html_scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use siteseek_core::{IndexEntry, IndexHit, KeyValueStore, StoredEntry};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub const CACHE_VERSION: u32 = 1;

/// Persisted crawl output for one origin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheRecord {
    pub version: u32,
    /// Epoch milliseconds of the crawl.
    pub timestamp: u64,
    pub entries: Vec<StoredEntry>,
}

impl CacheRecord {
    /// Stale once more than `ttl_ms` has passed. A zero TTL is never fresh.
    pub fn is_stale(&self, now_ms: u64, ttl_ms: u64) -> bool {
        ttl_ms == 0 || now_ms.saturating_sub(self.timestamp) > ttl_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Idle,
    Loading,
    Fresh,
    Stale,
    Refreshing,
}

/// A crawl in flight, shareable between callers.
pub type CrawlFuture = Shared<BoxFuture<'static, Arc<Vec<IndexEntry>>>>;

#[derive(Default)]
struct CrawlSlot {
    generation: u64,
    in_flight: Option<CrawlFuture>,
}

#[derive(Clone)]
pub struct SiteIndexer {
    inner: Arc<Inner>,
}

struct Inner {
    client: reqwest::Client,
    store: Arc<dyn KeyValueStore>,
    page: PageSnapshot,
    cfg: ResolvedSiteIndexing,
    selectors: Vec<String>,
    wordpress: bool,
    entries: RwLock<Arc<Vec<IndexEntry>>>,
    // Epoch ms of the data in `entries`; None until something was adopted.
    fetched_at: Mutex<Option<u64>>,
    loaded: OnceCell<()>,
    crawl: Mutex<CrawlSlot>,
    crawls: AtomicU64,
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

impl SiteIndexer {
    pub fn new(
        config: &AssistantConfig,
        page: PageSnapshot,
        store: Arc<dyn KeyValueStore>,
        client: reqwest::Client,
    ) -> Self {
        let wordpress = config.force_word_press || page.looks_like_wordpress();
        Self {
            inner: Arc::new(Inner {
                client,
                store,
                cfg: config.site_indexing.resolve(),
                selectors: config.index_selectors(),
                wordpress,
                page,
                entries: RwLock::new(Arc::new(Vec::new())),
                fetched_at: Mutex::new(None),
                loaded: OnceCell::new(),
                crawl: Mutex::new(CrawlSlot::default()),
                crawls: AtomicU64::new(0),
            }),
        }
    }

    pub fn settings(&self) -> &ResolvedSiteIndexing {
        &self.inner.cfg
    }

    pub fn cache_key(&self) -> String {
        site_index_key(&self.inner.page.origin())
    }

    pub fn is_enabled(&self) -> bool {
        let cfg = &self.inner.cfg;
        if cfg.explicitly_disabled || cfg.max_cache_entries == 0 {
            return false;
        }
        cfg.sitemap_url.is_some() || cfg.rest_url.is_some() || self.inner.wordpress
    }

    pub fn entries(&self) -> Arc<Vec<IndexEntry>> {
        self.inner
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of crawls started so far.
    pub fn crawl_count(&self) -> u64 {
        self.inner.crawls.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> IndexState {
        let crawling = self.in_flight().is_some();
        let has_entries = !self.entries().is_empty();
        match (crawling, has_entries) {
            (true, false) => IndexState::Loading,
            (true, true) => IndexState::Refreshing,
            (false, _) if self.inner.loaded.get().is_none() => IndexState::Idle,
            (false, _) if self.is_stale() => IndexState::Stale,
            (false, _) => IndexState::Fresh,
        }
    }

    fn is_stale(&self) -> bool {
        let ttl = self.inner.cfg.cache_ttl_ms;
        if ttl == 0 {
            // Nothing is persisted, so the in-memory crawl lives for the session.
            return false;
        }
        let fetched = *self.inner.fetched_at.lock().unwrap_or_else(|e| e.into_inner());
        match fetched {
            Some(ts) => now_ms().saturating_sub(ts) > ttl,
            None => true,
        }
    }

    fn in_flight(&self) -> Option<CrawlFuture> {
        self.inner
            .crawl
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .in_flight
            .clone()
    }

    /// Wait for the crawl in flight, if any.
    pub async fn settled(&self) {
        if let Some(f) = self.in_flight() {
            f.await;
        }
    }

    pub async fn ensure_loaded(&self) {
        if !self.is_enabled() {
            return;
        }
        let mut first = false;
        self.inner
            .loaded
            .get_or_init(|| {
                first = true;
                self.load_initial()
            })
            .await;
        if first {
            return;
        }
        let empty = self.entries().is_empty();
        if let Some(running) = self.in_flight() {
            if empty {
                running.await;
            }
            return;
        }
        if !self.is_stale() {
            return;
        }
        if empty {
            // Nothing to serve meanwhile.
            self.refresh(false).await;
        } else {
            self.spawn_refresh();
        }
    }

    async fn load_initial(&self) {
        match self.read_cache() {
            Some(rec) if !rec.entries.is_empty() => {
                let stale = rec.is_stale(now_ms(), self.inner.cfg.cache_ttl_ms);
                let entries: Vec<IndexEntry> = rec
                    .entries
                    .into_iter()
                    .take(self.inner.cfg.max_cache_entries)
                    .map(IndexEntry::from)
                    .collect();
                debug!(entries = entries.len(), stale, "site index loaded from cache");
                self.adopt(Arc::new(entries), rec.timestamp);
                if stale {
                    self.spawn_refresh();
                }
            }
            _ => {
                self.refresh(false).await;
            }
        }
    }

    fn spawn_refresh(&self) {
        if self.in_flight().is_some() {
            return;
        }
        tokio::spawn(self.refresh(false));
    }

    /// Start a crawl, or join the one in flight. With `force`, a crawl already
    /// in flight is allowed to finish and a new one is chained after it.
    ///
    /// The crawl is registered when this is called, not when the returned
    /// future is first polled.
    pub fn refresh(&self, force: bool) -> CrawlFuture {
        let mut slot = self.inner.crawl.lock().unwrap_or_else(|e| e.into_inner());
        let previous = match (&slot.in_flight, force) {
            (Some(f), false) => return f.clone(),
            (Some(f), true) => Some(f.clone()),
            (None, _) => None,
        };
        slot.generation += 1;
        let generation = slot.generation;
        let this = self.clone();
        let fut = async move {
            if let Some(prev) = previous {
                prev.await;
            }
            let out = this.crawl_and_commit().await;
            let mut slot = this.inner.crawl.lock().unwrap_or_else(|e| e.into_inner());
            if slot.generation == generation {
                slot.in_flight = None;
            }
            out
        }
        .boxed()
        .shared();
        slot.in_flight = Some(fut.clone());
        fut
    }

    async fn crawl_and_commit(&self) -> Arc<Vec<IndexEntry>> {
        self.inner.crawls.fetch_add(1, Ordering::SeqCst);
        let entries = self.crawl().await;
        let current = self.entries();
        if entries.is_empty() && !current.is_empty() {
            warn!(origin = %self.inner.page.origin(), "crawl produced no entries; keeping previous index");
            return current;
        }
        let now = now_ms();
        let entries = Arc::new(entries);
        self.adopt(entries.clone(), now);
        if !entries.is_empty() {
            self.persist(&entries, now);
        }
        entries
    }

    fn adopt(&self, entries: Arc<Vec<IndexEntry>>, fetched_at: u64) {
        *self.inner.entries.write().unwrap_or_else(|e| e.into_inner()) = entries;
        *self.inner.fetched_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(fetched_at);
    }

    async fn crawl(&self) -> Vec<IndexEntry> {
        let inner = &self.inner;
        let discovered =
            match sitemap::discover(&inner.client, &inner.cfg, &inner.page, inner.wordpress).await {
                Ok(t) => t,
                Err(e) => {
                    warn!(error = %e, "site discovery failed");
                    Vec::new()
                }
            };
        let targets = self.filter_targets(discovered);
        debug!(targets = targets.len(), "crawling");
        let pages = join_all(targets.iter().map(|t| self.fetch_entry(t))).await;
        let entries = ranking::dedupe_entries(pages.into_iter().flatten().collect());
        info!(
            origin = %inner.page.origin(),
            targets = targets.len(),
            entries = entries.len(),
            "site crawl finished"
        );
        entries
    }

    /// Same-origin http(s) targets, minus the current page, deduplicated
    /// without fragments, capped at `min(max_pages, max_cache_entries)`.
    /// Relative URLs resolve against the origin root.
    pub fn filter_targets(&self, targets: Vec<Target>) -> Vec<Target> {
        let page_url = &self.inner.page.url;
        let origin = page_url.origin();
        let Ok(root) = page_url.join("/") else {
            return Vec::new();
        };
        let current = page::without_fragment(page_url);
        let cap = self.inner.cfg.target_cap();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for t in targets {
            if out.len() >= cap {
                break;
            }
            let Ok(u) = root.join(t.url.trim()) else {
                continue;
            };
            if !matches!(u.scheme(), "http" | "https") || u.origin() != origin {
                debug!(url = %u, "crawl target rejected");
                continue;
            }
            let key = page::without_fragment(&u);
            if key == current || !seen.insert(key.clone()) {
                continue;
            }
            out.push(Target {
                url: key,
                title: t.title,
            });
        }
        out
    }

    async fn fetch_entry(&self, target: &Target) -> Option<IndexEntry> {
        let resp = match self.inner.client.get(&target.url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(url = %target.url, error = %e, "page fetch failed");
                return None;
            }
        };
        let status = resp.status();
        if !status.is_success() {
            warn!(url = %target.url, status = status.as_u16(), "page skipped");
            return None;
        }
        let html = match resp.text().await {
            Ok(h) => h,
            Err(e) => {
                warn!(url = %target.url, error = %e, "page body unreadable");
                return None;
            }
        };
        extract_page(&html, target, &self.inner.selectors, &self.inner.cfg)
    }

    fn read_cache(&self) -> Option<CacheRecord> {
        if !self.inner.cfg.persistence_enabled() {
            return None;
        }
        let raw = match self.inner.store.get(&self.cache_key()) {
            Ok(Some(s)) => s,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "site index cache unreadable");
                return None;
            }
        };
        match serde_json::from_str::<CacheRecord>(&raw) {
            Ok(rec) if rec.version == CACHE_VERSION => Some(rec),
            Ok(rec) => {
                debug!(version = rec.version, "site index cache version mismatch");
                None
            }
            Err(e) => {
                debug!(error = %e, "site index cache corrupt");
                None
            }
        }
    }

    fn persist(&self, entries: &[IndexEntry], timestamp: u64) {
        if !self.inner.cfg.persistence_enabled() {
            return;
        }
        let record = CacheRecord {
            version: CACHE_VERSION,
            timestamp,
            entries: entries
                .iter()
                .take(self.inner.cfg.max_cache_entries)
                .map(IndexEntry::to_stored)
                .collect(),
        };
        let res = serde_json::to_string(&record)
            .map_err(|e| siteseek_core::Error::Cache(e.to_string()))
            .and_then(|s| self.inner.store.set(&self.cache_key(), &s));
        if let Err(e) = res {
            warn!(error = %e, "site index cache write failed");
        }
    }

    pub async fn search(&self, query: &str, max_results: usize) -> Vec<IndexHit> {
        if !self.is_enabled() {
            return Vec::new();
        }
        self.ensure_loaded().await;
        ranking::rank(&self.entries(), query, max_results)
    }
}

/// Turn one fetched page into an entry. `None` when no text survives.
pub fn extract_page(
    html: &str,
    target: &Target,
    selectors: &[String],
    cfg: &ResolvedSiteIndexing,
) -> Option<IndexEntry> {
    let doc = Html::parse_document(html);
    let text = content_text(&doc, selectors, cfg.max_content_length);
    if text.is_empty() {
        return None;
    }
    let title = target
        .title
        .clone()
        .map(|t| text::clean_whitespace(&t))
        .filter(|t| !t.is_empty())
        .or_else(|| Some(page::document_title(&doc)).filter(|t| !t.is_empty()))
        .or_else(|| og_title(&doc))
        .unwrap_or_else(|| target.url.clone());
    let snippet = text::preview(&text, cfg.snippet_length);
    Some(IndexEntry::new(title, target.url.clone(), text).with_snippet(snippet))
}

fn og_title(doc: &Html) -> Option<String> {
    let sel = Selector::parse("meta[property=\"og:title\"]").ok()?;
    doc.select(&sel)
        .filter_map(|m| m.value().attr("content"))
        .map(text::clean_whitespace)
        .find(|t| !t.is_empty())
}

fn content_text(doc: &Html, selectors: &[String], max_chars: usize) -> String {
    let mut taken: Vec<ElementRef<'_>> = Vec::new();
    let mut out = String::new();
    let mut used = 0usize;

    'outer: for raw in selectors {
        let Ok(sel) = Selector::parse(raw) else {
            debug!(selector = %raw, "invalid content selector skipped");
            continue;
        };
        for node in doc.select(&sel) {
            let overlaps = taken.iter().any(|t| {
                t.id() == node.id()
                    || node.ancestors().any(|a| a.id() == t.id())
                    || t.ancestors().any(|a| a.id() == node.id())
            });
            if overlaps {
                continue;
            }
            taken.push(node);
            let chunk = text::rendered_text(node);
            if chunk.is_empty() {
                continue;
            }
            if !out.is_empty() {
                if used + 1 >= max_chars {
                    break 'outer;
                }
                out.push(' ');
                used += 1;
            }
            let (piece, _) = text::truncate_chars(&chunk, max_chars - used);
            used += piece.chars().count();
            out.push_str(&piece);
            if used >= max_chars {
                break 'outer;
            }
        }
    }

    if out.is_empty() {
        if let Ok(body) = Selector::parse("body") {
            if let Some(b) = doc.select(&body).next() {
                out = text::truncate_chars(&text::rendered_text(b), max_chars).0;
            }
        }
    }
    out.trim_end().to_string()
}
