//! The host page: its URL, its markup, and what can be inferred from them.

use crate::text;
use html_scraper::{Html, Selector};
use siteseek_core::{Error, Result};
use url::Url;

#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub url: Url,
    pub html: String,
}

impl PageSnapshot {
    pub fn new(url: &str, html: impl Into<String>) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self {
            url,
            html: html.into(),
        })
    }

    /// `scheme://host[:port]`, used as the crawl boundary and cache key.
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    pub fn url_without_fragment(&self) -> String {
        without_fragment(&self.url)
    }

    pub fn document_title(&self) -> String {
        document_title(&Html::parse_document(&self.html))
    }

    /// Heuristic WordPress detection: generator meta tag, `wp-content/` or
    /// `wp-includes/` asset paths, or a `wp-` body class.
    pub fn looks_like_wordpress(&self) -> bool {
        let doc = Html::parse_document(&self.html);
        let markers = [
            "meta[name=\"generator\"][content*=\"WordPress\"]",
            "link[href*=\"wp-content/\"]",
            "script[src*=\"wp-content/\"]",
            "link[href*=\"wp-includes/\"]",
            "script[src*=\"wp-includes/\"]",
        ];
        for p in markers {
            if let Ok(sel) = Selector::parse(p) {
                if doc.select(&sel).next().is_some() {
                    return true;
                }
            }
        }
        let Ok(body) = Selector::parse("body") else {
            return false;
        };
        doc.select(&body)
            .next()
            .map(|b| b.value().classes().any(|c| c.starts_with("wp-")))
            .unwrap_or(false)
    }
}

pub fn without_fragment(u: &Url) -> String {
    let mut u = u.clone();
    u.set_fragment(None);
    u.to_string()
}

pub fn document_title(doc: &Html) -> String {
    let Ok(sel) = Selector::parse("title") else {
        return String::new();
    };
    doc.select(&sel)
        .next()
        .map(|t| text::clean_whitespace(&t.text().collect::<String>()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_and_fragment_handling() {
        let p = PageSnapshot::new("https://example.com:8443/docs/a?x=1#top", "").unwrap();
        assert_eq!(p.origin(), "https://example.com:8443");
        assert_eq!(p.url_without_fragment(), "https://example.com:8443/docs/a?x=1");
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(matches!(
            PageSnapshot::new("not a url", ""),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn detects_wordpress_markers() {
        let gen = r#"<html><head><meta name="generator" content="WordPress 6.5"></head><body></body></html>"#;
        let assets = r#"<html><head><link rel="stylesheet" href="/wp-content/themes/x/style.css"></head></html>"#;
        let body = r#"<html><body class="home wp-custom-logo"></body></html>"#;
        let plain = r#"<html><head><title>Plain</title></head><body class="home"></body></html>"#;
        for html in [gen, assets, body] {
            assert!(PageSnapshot::new("https://a.test/", html).unwrap().looks_like_wordpress());
        }
        let p = PageSnapshot::new("https://a.test/", plain).unwrap();
        assert!(!p.looks_like_wordpress());
        assert_eq!(p.document_title(), "Plain");
    }
}
