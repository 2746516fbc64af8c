//! The five search backends, in the order the orchestrator tries them.

use crate::config::AssistantConfig;
use crate::http::is_json_content_type;
use crate::json_path::{first_text, resolve_path};
use crate::page::PageSnapshot;
use crate::page_index::PageIndexer;
use crate::site_index::SiteIndexer;
use crate::text::strip_html;
use futures_util::future::join_all;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;
use siteseek_core::{Error, ProviderKind, Result, SearchProvider, SearchResult};
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

pub const CUSTOM_SEARCH_NAME: &str = "custom search";
pub const WORDPRESS_SEARCH_NAME: &str = "WordPress search";
pub const SEARCHWP_NAME: &str = "SearchWP";
pub const SITE_INDEX_NAME: &str = "site index";
pub const PAGE_CONTENT_NAME: &str = "page content";
pub const PAGE_CONTENT_LABEL: &str = "this page";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=UTF-8";

// Everything but ASCII alphanumerics and `-_.!~*'()`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encode like a browser's `encodeURIComponent`.
pub fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, COMPONENT).to_string()
}

/// Substitute `{{query}}`; a template with neither a placeholder nor any `=`
/// gets `query=<q>` appended.
pub fn build_url_with_query(template: &str, query: &str) -> String {
    let encoded = encode_component(query);
    if template.contains("{{query}}") {
        return template.replace("{{query}}", &encoded);
    }
    if template.contains('=') {
        return template.to_string();
    }
    let sep = if template.contains('?') { '&' } else { '?' };
    format!("{template}{sep}query={encoded}")
}

fn resolve_endpoint(page: &PageSnapshot, s: &str) -> Result<Url> {
    page.url
        .join(s.trim())
        .map_err(|e| Error::InvalidUrl(format!("{s}: {e}")))
}

fn header_value<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Which fields of a custom endpoint response hold the results.
#[derive(Debug, Clone)]
pub struct ResultPaths {
    pub results: String,
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl ResultPaths {
    pub fn from_config(c: &AssistantConfig) -> Self {
        Self {
            results: c.search_results_path.clone(),
            title: c.search_title_path.clone(),
            url: c.search_url_path.clone(),
            snippet: c.search_snippet_path.clone(),
        }
    }
}

pub fn parse_custom_results(data: &Value, paths: &ResultPaths, max: usize) -> Vec<SearchResult> {
    let located = if paths.results.trim().is_empty() {
        Some(data)
    } else {
        resolve_path(data, &paths.results)
    };
    let Some(items) = located.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter(|item| !matches!(item, Value::Null | Value::Bool(false)))
        .take(max)
        .map(|item| SearchResult {
            title: first_text(item, &[paths.title.as_str(), "title"]),
            url: first_text(item, &[paths.url.as_str(), "url"]),
            snippet: first_text(item, &[paths.snippet.as_str(), "snippet", "excerpt"]),
        })
        .collect()
}

pub struct CustomEndpointProvider {
    client: reqwest::Client,
    endpoint: String,
    page: PageSnapshot,
    method: reqwest::Method,
    headers: BTreeMap<String, String>,
    body_template: Option<String>,
    paths: ResultPaths,
    label: String,
}

impl CustomEndpointProvider {
    /// `None` when no endpoint is configured.
    pub fn from_config(
        client: reqwest::Client,
        config: &AssistantConfig,
        page: &PageSnapshot,
    ) -> Option<Self> {
        let endpoint = config.search_endpoint()?;
        let method = reqwest::Method::from_bytes(config.search_method.trim().to_uppercase().as_bytes())
            .unwrap_or(reqwest::Method::GET);
        let label = Some(config.search_label.trim())
            .filter(|l| !l.is_empty())
            .unwrap_or("site search")
            .to_string();
        Some(Self {
            client,
            endpoint,
            page: page.clone(),
            method,
            headers: config.search_headers.clone().unwrap_or_default(),
            body_template: config.search_body_template.clone().filter(|t| !t.is_empty()),
            paths: ResultPaths::from_config(config),
            label,
        })
    }

    fn apply_headers(&self, mut rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (k, v) in &self.headers {
            match (
                reqwest::header::HeaderName::from_bytes(k.as_bytes()),
                reqwest::header::HeaderValue::from_str(v),
            ) {
                (Ok(name), Ok(value)) => rb = rb.header(name, value),
                _ => debug!(header = %k, "invalid search header skipped"),
            }
        }
        rb
    }
}

#[async_trait::async_trait]
impl SearchProvider for CustomEndpointProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CustomEndpoint
    }

    fn name(&self) -> &str {
        CUSTOM_SEARCH_NAME
    }

    fn label(&self) -> &str {
        &self.label
    }

    async fn execute(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let url = resolve_endpoint(&self.page, &build_url_with_query(&self.endpoint, query))?;
        let mut rb = self.apply_headers(self.client.request(self.method.clone(), url));
        if self.method != reqwest::Method::GET {
            let content_type = header_value(&self.headers, "content-type");
            let body = if let Some(t) = &self.body_template {
                t.replace("{{query}}", &encode_component(query))
            } else if content_type.is_some_and(|ct| ct.contains("application/json")) {
                serde_json::json!({ "query": query }).to_string()
            } else {
                if content_type.is_none() {
                    rb = rb.header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE);
                }
                format!("query={}", encode_component(query))
            };
            rb = rb.body(body);
        }

        let resp = rb.send().await.map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("custom search HTTP {status}")));
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = resp.text().await.map_err(|e| Error::Search(e.to_string()))?;
        let data: Value = if is_json_content_type(&content_type) {
            serde_json::from_str(&body).map_err(|e| Error::Search(format!("custom search: {e}")))?
        } else {
            match serde_json::from_str(&body) {
                Ok(v) => v,
                Err(_) => return Ok(Vec::new()),
            }
        };
        Ok(parse_custom_results(&data, &self.paths, max_results))
    }
}

/// REST collection for a search hit's subtype.
pub fn rest_base(subtype: &str) -> &str {
    match subtype {
        "post" => "posts",
        "page" => "pages",
        other => other,
    }
}

pub struct CmsNativeProvider {
    client: reqwest::Client,
    base: String,
}

impl CmsNativeProvider {
    /// `None` unless WordPress was detected or its endpoint is configured.
    pub fn from_config(
        client: reqwest::Client,
        config: &AssistantConfig,
        page: &PageSnapshot,
        wordpress: bool,
    ) -> Option<Self> {
        let configured = config.word_press_endpoint();
        if !wordpress && configured.is_none() {
            return None;
        }
        let base = match configured {
            Some(e) => resolve_endpoint(page, &e)
                .map(|u| u.to_string())
                .unwrap_or(e),
            None => format!("{}/wp-json", page.origin()),
        };
        Some(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    async fn detail(&self, item: &Value) -> SearchResult {
        let title = first_text(item, &["title"]).unwrap_or_default();
        let url = first_text(item, &["url"]).unwrap_or_default();
        let subtype = first_text(item, &["subtype"]).unwrap_or_else(|| "post".to_string());
        let Some(id) = first_text(item, &["id"]) else {
            return SearchResult {
                title: Some(title),
                url: Some(url),
                snippet: None,
            };
        };
        let detail_url = format!(
            "{}/wp/v2/{}/{}?_fields=link,title.rendered,excerpt.rendered",
            self.base,
            rest_base(&subtype),
            encode_component(&id)
        );
        let fallback = || {
            let t = strip_html(&title);
            SearchResult {
                title: Some(t.clone()),
                url: Some(url.clone()),
                snippet: Some(t),
            }
        };
        let resp = match self.client.get(&detail_url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(url = %detail_url, error = %e, "detail fetch failed");
                return fallback();
            }
        };
        if !resp.status().is_success() {
            return SearchResult {
                title: Some(title.clone()),
                url: Some(url.clone()),
                snippet: None,
            };
        }
        let detail: Value = match resp.json().await {
            Ok(v) => v,
            Err(_) => return fallback(),
        };
        let resolved_title = resolve_path(&detail, "title.rendered")
            .and_then(Value::as_str)
            .map(strip_html)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| strip_html(&title));
        let link = first_text(&detail, &["link"]).unwrap_or_else(|| url.clone());
        let excerpt = resolve_path(&detail, "excerpt.rendered")
            .and_then(Value::as_str)
            .map(strip_html)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| resolved_title.clone());
        SearchResult {
            title: Some(resolved_title),
            url: Some(link),
            snippet: Some(excerpt),
        }
    }
}

#[async_trait::async_trait]
impl SearchProvider for CmsNativeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CmsNative
    }

    fn name(&self) -> &str {
        WORDPRESS_SEARCH_NAME
    }

    fn label(&self) -> &str {
        WORDPRESS_SEARCH_NAME
    }

    async fn execute(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let endpoint = format!("{}/wp/v2/search", self.base);
        let mut url =
            Url::parse(&endpoint).map_err(|e| Error::InvalidUrl(format!("{endpoint}: {e}")))?;
        url.query_pairs_mut()
            .append_pair("search", query)
            .append_pair("per_page", &max_results.to_string());
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("WordPress search HTTP {status}")));
        }
        let v: Value = resp
            .json()
            .await
            .map_err(|e| Error::Search(format!("WordPress search: {e}")))?;
        let Some(items) = v.as_array() else {
            return Ok(Vec::new());
        };
        Ok(join_all(items.iter().take(max_results).map(|item| self.detail(item))).await)
    }
}

pub fn parse_plugin_results(data: &Value, max: usize) -> Vec<SearchResult> {
    let items = match data {
        Value::Array(a) => a.as_slice(),
        other => match other.get("results").and_then(Value::as_array) {
            Some(a) => a.as_slice(),
            None => &[],
        },
    };
    items
        .iter()
        .filter(|item| !item.is_null())
        .take(max)
        .map(|item| SearchResult {
            title: first_text(item, &["title", "post_title"]),
            url: first_text(item, &["url", "permalink"]),
            snippet: first_text(item, &["excerpt", "content"]),
        })
        .collect()
}

pub struct CmsPluginProvider {
    client: reqwest::Client,
    endpoint: String,
    enabled: bool,
}

impl CmsPluginProvider {
    pub fn from_config(
        client: reqwest::Client,
        config: &AssistantConfig,
        page: &PageSnapshot,
        wordpress: bool,
    ) -> Self {
        let configured = config
            .search_wp
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty());
        let endpoint = match configured {
            Some(e) => resolve_endpoint(page, e)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| e.to_string()),
            None => format!("{}/wp-json/searchwp/v1/search", page.origin()),
        };
        Self {
            client,
            endpoint,
            enabled: configured.is_some() || wordpress,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl SearchProvider for CmsPluginProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CmsPlugin
    }

    fn name(&self) -> &str {
        SEARCHWP_NAME
    }

    fn label(&self) -> &str {
        SEARCHWP_NAME
    }

    fn is_enabled(&self) -> Result<bool> {
        Ok(self.enabled)
    }

    async fn execute(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", self.endpoint)))?;
        url.query_pairs_mut()
            .append_pair("per_page", &max_results.to_string())
            .append_pair("s", query);
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("SearchWP HTTP {status}")));
        }
        let v: Value = resp
            .json()
            .await
            .map_err(|e| Error::Search(format!("SearchWP: {e}")))?;
        Ok(parse_plugin_results(&v, max_results))
    }
}

pub struct SiteIndexProvider {
    indexer: SiteIndexer,
}

impl SiteIndexProvider {
    pub fn new(indexer: SiteIndexer) -> Self {
        Self { indexer }
    }
}

#[async_trait::async_trait]
impl SearchProvider for SiteIndexProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SiteIndex
    }

    fn name(&self) -> &str {
        SITE_INDEX_NAME
    }

    fn label(&self) -> &str {
        &self.indexer.settings().label
    }

    fn is_enabled(&self) -> Result<bool> {
        Ok(self.indexer.is_enabled())
    }

    async fn execute(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let hits = self.indexer.search(query, max_results).await;
        Ok(hits.into_iter().map(SearchResult::from).collect())
    }
}

pub struct PageIndexProvider {
    indexer: PageIndexer,
}

impl PageIndexProvider {
    pub fn new(indexer: PageIndexer) -> Self {
        Self { indexer }
    }
}

#[async_trait::async_trait]
impl SearchProvider for PageIndexProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::PageIndex
    }

    fn name(&self) -> &str {
        PAGE_CONTENT_NAME
    }

    fn label(&self) -> &str {
        PAGE_CONTENT_LABEL
    }

    async fn execute(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        Ok(self
            .indexer
            .search(query, max_results)
            .into_iter()
            .map(SearchResult::from)
            .collect())
    }
}
