//! The host-facing application context.
//!
//! One [`Assistant`] per page. [`Assistant::initialize`] wires the indexers and
//! the provider chain exactly once; every other entry point initializes lazily.

use crate::config::AssistantConfig;
use crate::http;
use crate::orchestrator::SearchOrchestrator;
use crate::page::PageSnapshot;
use crate::page_index::{ContentMutation, PageIndexer};
use crate::site_index::SiteIndexer;
use siteseek_core::{Error, IndexEntry, KeyValueStore, Result, SearchOutcome};
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

pub struct Assistant {
    config: AssistantConfig,
    page: PageSnapshot,
    store: Arc<dyn KeyValueStore>,
    ready: OnceLock<Ready>,
    init_lock: Mutex<()>,
}

struct Ready {
    page_index: PageIndexer,
    site_index: SiteIndexer,
    orchestrator: SearchOrchestrator,
    events: Option<mpsc::UnboundedSender<Vec<ContentMutation>>>,
    _observer: Option<JoinHandle<()>>,
}

impl Assistant {
    pub fn new(config: AssistantConfig, page: PageSnapshot, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            config,
            page,
            store,
            ready: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    pub fn page(&self) -> &PageSnapshot {
        &self.page
    }

    pub fn is_initialized(&self) -> bool {
        self.ready.get().is_some()
    }

    /// Build the page index, start observing content changes (when enabled and
    /// a runtime is available), and assemble the provider chain.
    ///
    /// Returns `Ok(true)` if this call did the work, `Ok(false)` if the context
    /// was already initialized.
    pub fn initialize(&self) -> Result<bool> {
        if self.ready.get().is_some() {
            return Ok(false);
        }
        let _guard = self.init_lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.ready.get().is_some() {
            return Ok(false);
        }

        let client = http::build_client(&self.config)?;
        let page_index = PageIndexer::new(&self.page, &self.config);
        let sections = page_index.build();

        let (events, observer) = match (self.config.observe_dom, tokio::runtime::Handle::try_current()) {
            (true, Ok(_)) => {
                let (tx, rx) = mpsc::unbounded_channel();
                (Some(tx), Some(page_index.observe(rx)))
            }
            (true, Err(_)) => {
                debug!("no async runtime; content changes rebuild synchronously");
                (None, None)
            }
            (false, _) => (None, None),
        };

        let site_index = SiteIndexer::new(
            &self.config,
            self.page.clone(),
            self.store.clone(),
            client.clone(),
        );
        let orchestrator = SearchOrchestrator::from_config(
            &self.config,
            &self.page,
            client,
            page_index.clone(),
            site_index.clone(),
        );
        debug!(
            sections,
            providers = ?orchestrator.provider_names(),
            "assistant initialized"
        );

        let ready = Ready {
            page_index,
            site_index,
            orchestrator,
            events,
            _observer: observer,
        };
        if self.ready.set(ready).is_err() {
            return Ok(false);
        }
        Ok(true)
    }

    fn ready(&self) -> Result<&Ready> {
        self.initialize()?;
        self.ready
            .get()
            .ok_or_else(|| Error::NotConfigured("assistant not initialized".into()))
    }

    pub async fn search(&self, query: &str) -> Result<SearchOutcome> {
        Ok(self.ready()?.orchestrator.search(query).await)
    }

    /// Rebuild the page index now. Returns the number of sections.
    pub fn refresh_index(&self) -> Result<usize> {
        Ok(self.ready()?.page_index.build())
    }

    /// Force a fresh crawl of the site.
    pub async fn refresh_site_index(&self) -> Result<Arc<Vec<IndexEntry>>> {
        let ready = self.ready()?;
        if !ready.site_index.is_enabled() {
            return Err(Error::NotConfigured("site indexing is disabled".into()));
        }
        Ok(ready.site_index.refresh(true).await)
    }

    /// Replace the page markup the page index reads from.
    pub fn set_document(&self, html: impl Into<String>) -> Result<()> {
        self.ready()?.page_index.set_document(html);
        Ok(())
    }

    /// Report DOM mutations. Ignored when `observe_dom` is off.
    pub fn notify_content_changed(&self, mutations: &[ContentMutation]) -> Result<bool> {
        if !self.config.observe_dom {
            return Ok(false);
        }
        Ok(self.ready()?.page_index.notify_content_changed(mutations))
    }

    /// Sender half for hosts that stream mutation batches. `None` when
    /// observation is off.
    pub fn content_events(&self) -> Result<Option<mpsc::UnboundedSender<Vec<ContentMutation>>>> {
        Ok(self.ready()?.events.clone())
    }

    pub fn page_index(&self) -> Result<&PageIndexer> {
        Ok(&self.ready()?.page_index)
    }

    pub fn site_index(&self) -> Result<&SiteIndexer> {
        Ok(&self.ready()?.site_index)
    }

    pub fn orchestrator(&self) -> Result<&SearchOrchestrator> {
        Ok(&self.ready()?.orchestrator)
    }
}
