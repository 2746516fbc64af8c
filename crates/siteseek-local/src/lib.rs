pub mod assistant;
pub mod config;
pub mod http;
pub mod json_path;
pub mod orchestrator;
pub mod page;
pub mod page_index;
pub mod providers;
pub mod ranking;
pub mod site_index;
pub mod sitemap;
pub mod store;
pub mod text;

pub use assistant::Assistant;
pub use config::AssistantConfig;
pub use orchestrator::{normalize_results, SearchOrchestrator};
pub use page::PageSnapshot;
pub use page_index::{ContentMutation, PageIndexer};
pub use site_index::{CacheRecord, SiteIndexer};
pub use store::{FsStore, MemoryStore};
