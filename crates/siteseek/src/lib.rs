//! Public facade crate for `siteseek`.
//!
//! Re-exports the backend-agnostic types/traits from `siteseek-core` and the
//! application context from `siteseek-local`, so hosts can depend on one crate.

pub use siteseek_core::*;
pub use siteseek_local::assistant::Assistant;
pub use siteseek_local::config::AssistantConfig;
pub use siteseek_local::orchestrator::SearchOrchestrator;
pub use siteseek_local::page::PageSnapshot;
pub use siteseek_local::page_index::{ContentMutation, PageIndexer};
pub use siteseek_local::site_index::SiteIndexer;
pub use siteseek_local::store::{FsStore, MemoryStore};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn facade_wires_an_assistant() {
        let config = AssistantConfig::from_json_str(r#"{"minSectionLength": 10}"#).unwrap();
        let page = PageSnapshot::new(
            "https://a.test/",
            "<html><body><main><h1>Hello</h1><p>Plenty of words here.</p></main></body></html>",
        )
        .unwrap();
        let assistant = Assistant::new(config, page, Arc::new(MemoryStore::new()));
        assert!(assistant.initialize().unwrap());
        let entries = assistant.page_index().unwrap().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Hello");
        assert!(!assistant.site_index().unwrap().is_enabled());
    }
}
