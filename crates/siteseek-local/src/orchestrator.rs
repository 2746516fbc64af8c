//! Ordered-fallback search across providers.
//!
//! Providers are tried one at a time in priority order. The first one whose
//! results survive normalization wins; a provider that errors (or times out)
//! is disabled for the rest of the session.

use crate::config::AssistantConfig;
use crate::page::PageSnapshot;
use crate::page_index::PageIndexer;
use crate::providers::{
    CmsNativeProvider, CmsPluginProvider, CustomEndpointProvider, PageIndexProvider,
    SiteIndexProvider, PAGE_CONTENT_NAME,
};
use crate::site_index::SiteIndexer;
use crate::text;
use siteseek_core::{Error, NormalizedResult, SearchOutcome, SearchProvider, SearchResult};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

pub const UNTITLED_RESULT: &str = "View result";

struct Slot {
    provider: Box<dyn SearchProvider>,
    disabled: AtomicBool,
}

pub struct SearchOrchestrator {
    slots: Vec<Slot>,
    max_results: usize,
    provider_timeout: Option<Duration>,
}

impl SearchOrchestrator {
    pub fn new(providers: Vec<Box<dyn SearchProvider>>, max_results: usize) -> Self {
        Self {
            slots: providers
                .into_iter()
                .map(|provider| Slot {
                    provider,
                    disabled: AtomicBool::new(false),
                })
                .collect(),
            max_results: max_results.max(1),
            provider_timeout: None,
        }
    }

    pub fn with_provider_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.provider_timeout = timeout;
        self
    }

    /// The standard chain: custom endpoint, CMS search, CMS plugin, site index,
    /// page index. Optional providers are left out when they do not apply.
    pub fn from_config(
        config: &AssistantConfig,
        page: &PageSnapshot,
        client: reqwest::Client,
        page_index: PageIndexer,
        site_index: SiteIndexer,
    ) -> Self {
        let wordpress = config.force_word_press || page.looks_like_wordpress();
        let mut providers: Vec<Box<dyn SearchProvider>> = Vec::new();
        if let Some(p) = CustomEndpointProvider::from_config(client.clone(), config, page) {
            providers.push(Box::new(p));
        }
        if let Some(p) = CmsNativeProvider::from_config(client.clone(), config, page, wordpress) {
            providers.push(Box::new(p));
        }
        providers.push(Box::new(CmsPluginProvider::from_config(
            client, config, page, wordpress,
        )));
        if site_index.is_enabled() {
            providers.push(Box::new(SiteIndexProvider::new(site_index)));
        }
        providers.push(Box::new(PageIndexProvider::new(page_index)));

        let timeout = (config.provider_timeout_ms > 0)
            .then(|| Duration::from_millis(config.provider_timeout_ms));
        Self::new(providers, config.max_results).with_provider_timeout(timeout)
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.provider.name()).collect()
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.slots
            .iter()
            .any(|s| s.provider.name() == name && s.disabled.load(Ordering::SeqCst))
    }

    /// Never fails: exhaustion and blank queries both yield an empty outcome
    /// carrying the page index's name.
    pub async fn search(&self, query: &str) -> SearchOutcome {
        let query = query.trim();
        if query.is_empty() {
            return SearchOutcome::empty(PAGE_CONTENT_NAME);
        }

        for slot in &self.slots {
            if slot.disabled.load(Ordering::SeqCst) {
                continue;
            }
            let provider = slot.provider.as_ref();
            let name = provider.name();
            match provider.is_enabled() {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    debug!(provider = name, error = %e, "enabled check failed; skipping");
                    continue;
                }
            }

            let call = provider.execute(query, self.max_results);
            let res = match self.provider_timeout {
                Some(t) => match tokio::time::timeout(t, call).await {
                    Ok(r) => r,
                    Err(_) => Err(Error::Timeout(t.as_millis() as u64)),
                },
                None => call.await,
            };

            match res {
                Ok(items) => {
                    let results = normalize_results(items, name, self.max_results);
                    if !results.is_empty() {
                        debug!(provider = name, results = results.len(), "search answered");
                        let label = Some(provider.label())
                            .filter(|l| !l.is_empty())
                            .unwrap_or(name);
                        return SearchOutcome {
                            results,
                            provider_label: label.to_string(),
                            provider_name: name.to_string(),
                        };
                    }
                    debug!(provider = name, "no results; trying next provider");
                }
                Err(e) => {
                    slot.disabled.store(true, Ordering::SeqCst);
                    warn!(provider = name, error = %e, "search provider failed; disabled for this session");
                }
            }
        }
        SearchOutcome::empty(PAGE_CONTENT_NAME)
    }
}

/// Plain-text titles (never empty), URLs as given, escaped whitespace-clean
/// snippets; duplicates of the (title, url, snippet) triple dropped; at most
/// `max_results`.
pub fn normalize_results(
    items: Vec<SearchResult>,
    provider: &str,
    max_results: usize,
) -> Vec<NormalizedResult> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let title = Some(text::strip_html(item.title.as_deref().unwrap_or("")))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED_RESULT.to_string());
        let url = item.url.unwrap_or_default();
        let snippet_text = text::strip_html(item.snippet.as_deref().unwrap_or(""));
        let snippet = if snippet_text.is_empty() {
            String::new()
        } else {
            text::escape_html(&text::clean_whitespace(&snippet_text))
        };
        if !seen.insert((title.clone(), url.clone(), snippet.clone())) {
            continue;
        }
        out.push(NormalizedResult {
            title,
            url,
            snippet,
            provider: provider.to_string(),
        });
    }
    out.truncate(max_results);
    out
}
