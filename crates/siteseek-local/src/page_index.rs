//! Ranked index over the sections of the currently loaded page.
//!
//! The host owns the page markup. It hands a new document over with
//! [`PageIndexer::set_document`] and reports structural changes through
//! [`PageIndexer::notify_content_changed`] (or a channel passed to
//! [`PageIndexer::observe`]); rebuilds are debounced behind a single pending timer.

use crate::config::AssistantConfig;
use crate::page::{self, PageSnapshot};
use crate::{ranking, text};
use html_scraper::{ElementRef, Html, Selector};
use siteseek_core::{IndexEntry, IndexHit};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

pub const REBUILD_DEBOUNCE: Duration = Duration::from_millis(800);

const HEADING_SELECTOR: &str = "h1, h2, h3, [data-title]";

/// A change reported by the host's DOM (or equivalent) observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentMutation {
    NodesAdded,
    NodesRemoved,
    CharacterData,
}

impl ContentMutation {
    fn is_structural(self) -> bool {
        matches!(self, Self::NodesAdded | Self::NodesRemoved)
    }
}

#[derive(Clone)]
pub struct PageIndexer {
    inner: Arc<Inner>,
}

struct Inner {
    page_url: Url,
    html: RwLock<String>,
    selectors: Vec<String>,
    min_section_length: usize,
    entries: RwLock<Arc<Vec<IndexEntry>>>,
    // Content key -> synthetic anchor, so rebuilds hand out the same fragment.
    anchors: Mutex<HashMap<String, String>>,
    rebuild_pending: AtomicBool,
    builds: AtomicU64,
    debounce: Duration,
}

impl PageIndexer {
    pub fn new(page: &PageSnapshot, config: &AssistantConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                page_url: page.url.clone(),
                html: RwLock::new(page.html.clone()),
                selectors: config.index_selectors(),
                min_section_length: config.min_section_length,
                entries: RwLock::new(Arc::new(Vec::new())),
                anchors: Mutex::new(HashMap::new()),
                rebuild_pending: AtomicBool::new(false),
                builds: AtomicU64::new(0),
                debounce: REBUILD_DEBOUNCE,
            }),
        }
    }

    /// Same indexer with a different debounce window. Must be called before
    /// the indexer is shared.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.debounce = debounce;
        }
        self
    }

    /// Replace the page markup. Does not rebuild by itself.
    pub fn set_document(&self, html: impl Into<String>) {
        let mut g = self.inner.html.write().unwrap_or_else(|e| e.into_inner());
        *g = html.into();
    }

    pub fn entries(&self) -> Arc<Vec<IndexEntry>> {
        self.inner
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Synthetic anchors remembered from the last build.
    pub fn anchor_count(&self) -> usize {
        self.inner
            .anchors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// How many times the index has been (re)built.
    pub fn build_count(&self) -> u64 {
        self.inner.builds.load(Ordering::SeqCst)
    }

    pub fn build(&self) -> usize {
        self.build_with(&self.inner.selectors)
    }

    /// Rebuild from `selectors` and swap the new index in. Returns the entry count.
    pub fn build_with(&self, selectors: &[String]) -> usize {
        let html = self
            .inner
            .html
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let doc = Html::parse_document(&html);
        let page_url = page::without_fragment(&self.inner.page_url);
        let doc_title = page::document_title(&doc);

        let mut sections = Vec::new();
        for (i, node) in select_candidates(&doc, selectors).into_iter().enumerate() {
            let cleaned = text::rendered_text(node);
            if cleaned.is_empty() || cleaned.chars().count() < self.inner.min_section_length {
                continue;
            }
            let title = find_heading(node)
                .filter(|h| !h.is_empty())
                .or_else(|| (!doc_title.is_empty()).then(|| doc_title.clone()))
                .unwrap_or_else(|| page_url.clone());
            let id = node
                .value()
                .id()
                .filter(|id| !id.trim().is_empty())
                .map(str::to_string);
            sections.push((i, title, cleaned, id));
        }

        let mut anchors = self.inner.anchors.lock().unwrap_or_else(|e| e.into_inner());
        let key_of = |cleaned: &str| -> String {
            cleaned.chars().take(siteseek_core::DEDUP_KEY_CHARS).collect()
        };
        let ids: HashSet<String> = sections.iter().filter_map(|s| s.3.clone()).collect();
        // Kept anchors lose out to element ids now using the same name.
        let kept = |key: &str| anchors.get(key).filter(|a| !ids.contains(*a)).cloned();
        let mut used = ids.clone();
        for (_, _, cleaned, id) in &sections {
            if id.is_none() {
                used.extend(kept(&key_of(cleaned)));
            }
        }

        let mut current: HashMap<String, String> = HashMap::new();
        let mut entries = Vec::with_capacity(sections.len());
        for (i, title, cleaned, id) in sections {
            let anchor = match id {
                Some(id) => id,
                None => {
                    let key = key_of(&cleaned);
                    let known = current.get(&key).cloned().or_else(|| kept(&key));
                    let anchor = known.unwrap_or_else(|| {
                        let mut n = i;
                        while used.contains(&format!("section-{n}")) {
                            n += 1;
                        }
                        let minted = format!("section-{n}");
                        used.insert(minted.clone());
                        minted
                    });
                    current.insert(key, anchor.clone());
                    anchor
                }
            };
            entries.push(IndexEntry::new(title, format!("{page_url}#{anchor}"), cleaned));
        }
        *anchors = current;
        drop(anchors);

        let entries = ranking::dedupe_entries(entries);
        let n = entries.len();
        *self.inner.entries.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(entries);
        self.inner.builds.fetch_add(1, Ordering::SeqCst);
        debug!(entries = n, "page index built");
        n
    }

    pub fn search(&self, query: &str, max_results: usize) -> Vec<IndexHit> {
        ranking::rank(&self.entries(), query, max_results)
    }

    /// Schedule a debounced rebuild if any mutation added or removed nodes.
    ///
    /// Returns true when this call armed the timer. While a rebuild is pending,
    /// further notifications are absorbed.
    pub fn notify_content_changed(&self, mutations: &[ContentMutation]) -> bool {
        if !mutations.iter().any(|m| m.is_structural()) {
            return false;
        }
        self.schedule_rebuild()
    }

    fn schedule_rebuild(&self) -> bool {
        if self.inner.rebuild_pending.swap(true, Ordering::SeqCst) {
            return false;
        }
        let this = self.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(this.inner.debounce).await;
                    this.inner.rebuild_pending.store(false, Ordering::SeqCst);
                    this.build();
                });
            }
            Err(_) => {
                // No runtime to wait on: rebuild right away.
                this.inner.rebuild_pending.store(false, Ordering::SeqCst);
                this.build();
            }
        }
        true
    }

    /// Forward mutation batches from `events` until the sender is dropped.
    pub fn observe(&self, mut events: mpsc::UnboundedReceiver<Vec<ContentMutation>>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            while let Some(batch) = events.recv().await {
                this.notify_content_changed(&batch);
            }
        })
    }
}

fn select_candidates<'a>(doc: &'a Html, selectors: &[String]) -> Vec<ElementRef<'a>> {
    let joined = selectors
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(",");
    let mut nodes = Vec::new();
    if !joined.is_empty() {
        match Selector::parse(&joined) {
            Ok(sel) => nodes = doc.select(&sel).collect(),
            Err(e) => warn!(selectors = %joined, error = ?e, "invalid index selectors"),
        }
    }
    if nodes.is_empty() {
        if let Ok(body) = Selector::parse("body") {
            nodes.extend(doc.select(&body).next());
        }
    }
    nodes
}

/// First heading inside `node`, else in the previous sibling at each level up to `body`.
fn find_heading(node: ElementRef<'_>) -> Option<String> {
    let sel = Selector::parse(HEADING_SELECTOR).ok()?;
    let heading_text = |el: ElementRef<'_>| text::clean_whitespace(&el.text().collect::<String>());

    if let Some(h) = node.select(&sel).find(|h| h.id() != node.id()) {
        return Some(heading_text(h));
    }
    let mut current = Some(node);
    while let Some(cur) = current {
        if matches!(cur.value().name(), "body" | "html") {
            break;
        }
        if let Some(prev) = cur.prev_siblings().find_map(ElementRef::wrap) {
            if sel.matches(&prev) {
                return Some(heading_text(prev));
            }
            if let Some(h) = prev.select(&sel).next() {
                return Some(heading_text(h));
            }
        }
        current = cur.parent().and_then(ElementRef::wrap);
    }
    None
}
