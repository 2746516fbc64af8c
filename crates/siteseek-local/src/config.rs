//! Assistant configuration: defaults, layered JSON overrides, env overrides,
//! and the derived site-indexing limits.
//!
//! Layers are deep-merged in order (later wins); objects merge key by key,
//! everything else (arrays, scalars, null) replaces.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use siteseek_core::{Error, Result};
use std::collections::BTreeMap;

pub const DEFAULT_MAX_RESULTS: usize = 3;
pub const MAX_CACHE_ENTRIES_CAP: i64 = 200;
pub const MIN_SNIPPET_LENGTH: i64 = 120;

pub const DEFAULT_INDEX_SELECTORS: &[&str] = &[
    "main",
    "article",
    "section",
    "[role=\"main\"]",
    ".entry-content",
    ".post",
    ".page",
    ".product",
    ".content",
    ".site-main",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AssistantConfig {
    pub max_results: usize,
    pub search_endpoint: Option<String>,
    pub search_method: String,
    pub search_headers: Option<BTreeMap<String, String>>,
    pub search_body_template: Option<String>,
    pub search_results_path: String,
    pub search_title_path: String,
    pub search_url_path: String,
    pub search_snippet_path: String,
    pub search_label: String,
    pub observe_dom: bool,
    pub index_selectors: Option<Vec<String>>,
    pub min_section_length: usize,
    pub force_word_press: bool,
    pub word_press_endpoint: Option<String>,
    #[serde(rename = "searchWP")]
    pub search_wp: SearchWpConfig,
    pub site_indexing: SiteIndexingConfig,
    pub request_timeout_ms: u64,
    pub provider_timeout_ms: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            search_endpoint: None,
            search_method: "GET".to_string(),
            search_headers: None,
            search_body_template: None,
            search_results_path: String::new(),
            search_title_path: "title".to_string(),
            search_url_path: "url".to_string(),
            search_snippet_path: "snippet".to_string(),
            search_label: "site search".to_string(),
            observe_dom: true,
            index_selectors: None,
            min_section_length: 80,
            force_word_press: false,
            word_press_endpoint: None,
            search_wp: SearchWpConfig::default(),
            site_indexing: SiteIndexingConfig::default(),
            request_timeout_ms: 20_000,
            provider_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchWpConfig {
    pub endpoint: Option<String>,
}

/// Raw site-indexing knobs, as configured. Signed so that negative values can
/// be floored rather than rejected; see [`SiteIndexingConfig::resolve`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteIndexingConfig {
    pub enabled: Option<bool>,
    pub sitemap_url: Option<String>,
    pub wordpress_rest_url: Option<String>,
    pub max_pages: i64,
    pub max_cache_entries: i64,
    /// Milliseconds.
    pub cache_ttl: i64,
    pub snippet_length: i64,
    pub max_content_length: i64,
    pub label: Option<String>,
}

impl Default for SiteIndexingConfig {
    fn default() -> Self {
        Self {
            enabled: None,
            sitemap_url: None,
            wordpress_rest_url: None,
            max_pages: 25,
            max_cache_entries: 50,
            cache_ttl: 6 * 60 * 60 * 1000,
            snippet_length: 240,
            max_content_length: 4_000,
            label: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSiteIndexing {
    pub explicitly_disabled: bool,
    pub sitemap_url: Option<String>,
    pub rest_url: Option<String>,
    pub max_pages: usize,
    pub max_cache_entries: usize,
    pub cache_ttl_ms: u64,
    pub snippet_length: usize,
    pub max_content_length: usize,
    pub label: String,
}

impl ResolvedSiteIndexing {
    pub fn persistence_enabled(&self) -> bool {
        self.cache_ttl_ms > 0
    }

    /// Upper bound on crawl targets.
    pub fn target_cap(&self) -> usize {
        self.max_pages.min(self.max_cache_entries)
    }
}

fn non_empty(s: &Option<String>) -> Option<String> {
    s.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl SiteIndexingConfig {
    /// Apply the derivation rules, in order, each clamped.
    pub fn resolve(&self) -> ResolvedSiteIndexing {
        let max_cache_entries = self.max_cache_entries.clamp(0, MAX_CACHE_ENTRIES_CAP);
        let mut max_pages = self.max_pages;
        if max_cache_entries > 0 {
            max_pages = max_pages.min(max_cache_entries);
        }
        let max_pages = max_pages.max(0);
        let cache_ttl = self.cache_ttl.max(0);
        let snippet_length = self.snippet_length.max(MIN_SNIPPET_LENGTH);
        let max_content_length = self.max_content_length.max(snippet_length);
        ResolvedSiteIndexing {
            explicitly_disabled: self.enabled == Some(false),
            sitemap_url: non_empty(&self.sitemap_url),
            rest_url: non_empty(&self.wordpress_rest_url),
            max_pages: max_pages as usize,
            max_cache_entries: max_cache_entries as usize,
            cache_ttl_ms: cache_ttl as u64,
            snippet_length: snippet_length as usize,
            max_content_length: max_content_length as usize,
            label: non_empty(&self.label).unwrap_or_else(|| "site index".to_string()),
        }
    }
}

impl AssistantConfig {
    pub fn index_selectors(&self) -> Vec<String> {
        match &self.index_selectors {
            Some(v) if !v.is_empty() => v.clone(),
            _ => DEFAULT_INDEX_SELECTORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn search_endpoint(&self) -> Option<String> {
        non_empty(&self.search_endpoint)
    }

    pub fn word_press_endpoint(&self) -> Option<String> {
        non_empty(&self.word_press_endpoint)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let v: Value = serde_json::from_str(s).map_err(|e| Error::Parse(e.to_string()))?;
        Self::from_layers(&[v])
    }

    /// Defaults, then each JSON layer deep-merged in order.
    pub fn from_layers(layers: &[Value]) -> Result<Self> {
        let mut merged =
            serde_json::to_value(Self::default()).map_err(|e| Error::Parse(e.to_string()))?;
        for layer in layers {
            if layer.is_object() {
                deep_merge(&mut merged, layer);
            }
        }
        coerce_max_results(&mut merged);
        serde_json::from_value(merged).map_err(|e| Error::Parse(e.to_string()))
    }

    /// Like [`Self::from_layers`], with `SITESEEK_*` environment overrides on top.
    pub fn from_layers_and_env(layers: &[Value]) -> Result<Self> {
        let mut all = layers.to_vec();
        all.push(env_layer());
        Self::from_layers(&all)
    }
}

pub fn deep_merge(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(t), Value::Object(s)) => {
            for (k, v) in s {
                let nested = matches!((t.get(k), v), (Some(Value::Object(_)), Value::Object(_)));
                if nested {
                    if let Some(existing) = t.get_mut(k) {
                        deep_merge(existing, v);
                    }
                } else {
                    t.insert(k.clone(), v.clone());
                }
            }
        }
        (t, s) => *t = s.clone(),
    }
}

fn coerce_max_results(v: &mut Value) {
    let Some(obj) = v.as_object_mut() else {
        return;
    };
    let n = match obj.get("maxResults") {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .filter(|n| *n != 0),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok().filter(|n| *n != 0),
        _ => None,
    }
    .unwrap_or(DEFAULT_MAX_RESULTS as i64)
    .max(1);
    obj.insert("maxResults".to_string(), Value::from(n));
}

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_boolean(s: &str) -> bool {
    matches!(s.trim(), "true" | "1")
}

fn env_layer() -> Value {
    let mut out = serde_json::Map::new();
    if let Some(v) = env("SITESEEK_MAX_RESULTS") {
        out.insert("maxResults".into(), Value::String(v));
    }
    if let Some(v) = env("SITESEEK_SEARCH_ENDPOINT") {
        out.insert("searchEndpoint".into(), Value::String(v));
    }
    if let Some(v) = env("SITESEEK_SEARCH_METHOD") {
        out.insert("searchMethod".into(), Value::String(v));
    }
    if let Some(v) = env("SITESEEK_SEARCH_LABEL") {
        out.insert("searchLabel".into(), Value::String(v));
    }
    if let Some(v) = env("SITESEEK_OBSERVE_DOM") {
        out.insert("observeDom".into(), Value::Bool(parse_boolean(&v)));
    }
    if let Some(v) = env("SITESEEK_SITEMAP_URL") {
        out.insert(
            "siteIndexing".into(),
            serde_json::json!({ "sitemapUrl": v }),
        );
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_documented_values() {
        let c = AssistantConfig::default();
        assert_eq!(c.max_results, 3);
        assert_eq!(c.min_section_length, 80);
        assert!(c.observe_dom);
        assert_eq!(c.index_selectors().len(), DEFAULT_INDEX_SELECTORS.len());
    }

    #[test]
    fn layers_deep_merge_nested_objects() {
        let c = AssistantConfig::from_layers(&[
            json!({"siteIndexing": {"sitemapUrl": "/sitemap.xml", "maxPages": 5}}),
            json!({"siteIndexing": {"maxPages": 7}, "searchLabel": "docs"}),
        ])
        .unwrap();
        assert_eq!(c.site_indexing.sitemap_url.as_deref(), Some("/sitemap.xml"));
        assert_eq!(c.site_indexing.max_pages, 7);
        assert_eq!(c.site_indexing.max_cache_entries, 50);
        assert_eq!(c.search_label, "docs");
    }

    #[test]
    fn max_results_is_coerced() {
        let c = AssistantConfig::from_layers(&[json!({"maxResults": "5"})]).unwrap();
        assert_eq!(c.max_results, 5);
        let c = AssistantConfig::from_layers(&[json!({"maxResults": -4})]).unwrap();
        assert_eq!(c.max_results, 1);
        let c = AssistantConfig::from_layers(&[json!({"maxResults": "many"})]).unwrap();
        assert_eq!(c.max_results, DEFAULT_MAX_RESULTS);
        let c = AssistantConfig::from_layers(&[json!({"maxResults": 0})]).unwrap();
        assert_eq!(c.max_results, DEFAULT_MAX_RESULTS);
    }

    #[test]
    fn null_headers_and_selectors_are_accepted() {
        let c = AssistantConfig::from_json_str(
            r#"{"searchHeaders": null, "indexSelectors": [], "searchWP": {"endpoint": "/s"}}"#,
        )
        .unwrap();
        assert!(c.search_headers.is_none());
        assert_eq!(c.index_selectors()[0], "main");
        assert_eq!(c.search_wp.endpoint.as_deref(), Some("/s"));
    }

    #[test]
    fn site_indexing_derivation_clamps_in_order() {
        let r = SiteIndexingConfig {
            max_pages: 500,
            max_cache_entries: 999,
            cache_ttl: -5,
            snippet_length: 10,
            max_content_length: 50,
            ..Default::default()
        }
        .resolve();
        assert_eq!(r.max_cache_entries, 200);
        assert_eq!(r.max_pages, 200);
        assert_eq!(r.cache_ttl_ms, 0);
        assert!(!r.persistence_enabled());
        assert_eq!(r.snippet_length, 120);
        assert_eq!(r.max_content_length, 120);

        let r = SiteIndexingConfig {
            max_pages: 40,
            max_cache_entries: 0,
            ..Default::default()
        }
        .resolve();
        assert_eq!(r.max_cache_entries, 0);
        assert_eq!(r.max_pages, 40);
        assert_eq!(r.target_cap(), 0);

        let r = SiteIndexingConfig {
            max_pages: -3,
            ..Default::default()
        }
        .resolve();
        assert_eq!(r.max_pages, 0);
    }

    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn env_overrides_sit_above_every_layer() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("SITESEEK_MAX_RESULTS", " 7 ");
        std::env::set_var("SITESEEK_OBSERVE_DOM", "0");
        std::env::set_var("SITESEEK_SITEMAP_URL", "/env-sitemap.xml");

        let c = AssistantConfig::from_layers_and_env(&[json!({
            "maxResults": 2,
            "observeDom": true,
            "siteIndexing": {"sitemapUrl": "/layer.xml", "maxPages": 9}
        })])
        .unwrap();
        assert_eq!(c.max_results, 7);
        assert!(!c.observe_dom);
        assert_eq!(c.site_indexing.sitemap_url.as_deref(), Some("/env-sitemap.xml"));
        assert_eq!(c.site_indexing.max_pages, 9);

        for k in ["SITESEEK_MAX_RESULTS", "SITESEEK_OBSERVE_DOM", "SITESEEK_SITEMAP_URL"] {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn blank_urls_resolve_to_none() {
        let r = SiteIndexingConfig {
            sitemap_url: Some("   ".into()),
            enabled: Some(false),
            ..Default::default()
        }
        .resolve();
        assert!(r.sitemap_url.is_none());
        assert!(r.explicitly_disabled);
        assert_eq!(r.label, "site index");
    }
}
