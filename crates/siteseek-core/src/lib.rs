use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("http status {status} from {url}")]
    Http { status: u16, url: String },
    #[error("parse failed: {0}")]
    Parse(String),
    #[error("cache error: {0}")]
    Cache(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("timed out after {0} ms")]
    Timeout(u64),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Number of leading characters of `text` that identify an entry for dedup.
pub const DEDUP_KEY_CHARS: usize = 200;

/// One indexed unit of content (a page section or a crawled page).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub title: String,
    pub url: String,
    pub text: String,
    /// Preview text for crawled pages; page sections leave this empty.
    pub snippet: Option<String>,
    text_lower: String,
}

impl IndexEntry {
    pub fn new(title: String, url: String, text: String) -> Self {
        let text_lower = text.to_lowercase();
        Self {
            title,
            url,
            text,
            snippet: None,
            text_lower,
        }
    }

    pub fn with_snippet(mut self, snippet: String) -> Self {
        self.snippet = Some(snippet);
        self
    }

    /// Lowercased copy of `text`, used only for matching.
    pub fn text_lower(&self) -> &str {
        &self.text_lower
    }

    /// The first-200-characters key used to drop duplicate entries.
    pub fn dedup_key(&self) -> String {
        self.text.chars().take(DEDUP_KEY_CHARS).collect()
    }

    pub fn to_stored(&self) -> StoredEntry {
        StoredEntry {
            title: self.title.clone(),
            url: self.url.clone(),
            snippet: self.snippet.clone(),
            text: self.text.clone(),
        }
    }
}

/// Persisted shape of an [`IndexEntry`]: the lowercase copy is derived on load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredEntry {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    pub text: String,
}

impl From<StoredEntry> for IndexEntry {
    fn from(s: StoredEntry) -> Self {
        let mut e = IndexEntry::new(s.title, s.url, s.text);
        e.snippet = s.snippet;
        e
    }
}

/// A ranked index entry, as produced by the lexical matcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub score: u64,
}

/// Provider-raw result. Every field is optional; shapes vary by backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    pub title: Option<String>,
    pub url: Option<String>,
    pub snippet: Option<String>,
}

impl From<IndexHit> for SearchResult {
    fn from(h: IndexHit) -> Self {
        Self {
            title: Some(h.title),
            url: Some(h.url),
            snippet: Some(h.snippet),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NormalizedResult {
    /// Plain text, never empty.
    pub title: String,
    /// Possibly empty.
    pub url: String,
    /// HTML-escaped, whitespace-collapsed; possibly empty.
    pub snippet: String,
    pub provider: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchOutcome {
    pub results: Vec<NormalizedResult>,
    pub provider_label: String,
    pub provider_name: String,
}

impl SearchOutcome {
    pub fn empty(provider_name: &str) -> Self {
        Self {
            results: Vec::new(),
            provider_label: String::new(),
            provider_name: provider_name.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    CustomEndpoint,
    CmsNative,
    CmsPlugin,
    SiteIndex,
    PageIndex,
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;
    fn name(&self) -> &str;
    fn label(&self) -> &str;
    /// Whether the provider should be tried at all. An error counts as "no".
    fn is_enabled(&self) -> Result<bool> {
        Ok(true)
    }
    async fn execute(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

/// String key-value storage used for the persisted site index.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_entry_round_trip_rederives_lowercase() {
        let e = IndexEntry::new("T".into(), "/a".into(), "Hello World".into())
            .with_snippet("Hello".into());
        let js = serde_json::to_string(&e.to_stored()).unwrap();
        assert!(!js.contains("hello world"));
        let back: IndexEntry = serde_json::from_str::<StoredEntry>(&js).unwrap().into();
        assert_eq!(back.text_lower(), "hello world");
        assert_eq!(back, e);
    }

    #[test]
    fn dedup_key_counts_chars_not_bytes() {
        let text = "é".repeat(250);
        let e = IndexEntry::new("t".into(), "u".into(), text);
        assert_eq!(e.dedup_key().chars().count(), DEDUP_KEY_CHARS);
    }
}
