//! Small, stateless text helpers shared by the indexers and the orchestrator.
//!
//! All lengths and offsets here are in characters, not bytes.

use html_scraper::{ElementRef, Html};

pub const ELLIPSIS: char = '…';
pub const SNIPPET_BEFORE: usize = 80;
pub const SNIPPET_AFTER: usize = 220;

const SKIP_TAGS: &[&str] = &["script", "style", "noscript", "template", "head", "svg"];

// Elements whose boundaries separate words when rendered.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "details", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table", "tbody",
    "td", "tfoot", "th", "thead", "tr", "ul", "option", "title",
];

/// Collapse whitespace runs (including NBSP) to single spaces and trim.
pub fn clean_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text content of an HTML fragment. Scripts and styles are dropped, never run.
pub fn strip_html(s: &str) -> String {
    if !s.contains('<') && !s.contains('&') {
        return s.trim().to_string();
    }
    let frag = Html::parse_fragment(s);
    let mut out = String::new();
    push_rendered(frag.root_element(), &mut out);
    out.trim().to_string()
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Non-overlapping, case-sensitive substring count.
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if haystack.is_empty() || needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}

pub fn truncate_chars(s: &str, max_chars: usize) -> (String, bool) {
    match s.char_indices().nth(max_chars) {
        Some((byte, _)) => (s[..byte].to_string(), true),
        None => (s.to_string(), false),
    }
}

/// First `max_chars` characters, with a trailing ellipsis when clipped.
pub fn preview(s: &str, max_chars: usize) -> String {
    let (mut out, clipped) = truncate_chars(s, max_chars);
    if clipped {
        out.push(ELLIPSIS);
    }
    out
}

/// Context window around the earliest token match, using the default window.
pub fn extract_snippet(text: &str, tokens: &[String]) -> String {
    extract_snippet_with(text, tokens, SNIPPET_BEFORE, SNIPPET_AFTER)
}

pub fn extract_snippet_with(text: &str, tokens: &[String], before: usize, after: usize) -> String {
    if text.is_empty() {
        return String::new();
    }
    if tokens.iter().all(|t| t.is_empty()) {
        return preview(&clean_whitespace(text), after);
    }

    let chars: Vec<char> = text.chars().collect();
    // Lowercasing can change lengths, so keep a map from lowered byte offsets
    // back to original char indices.
    let mut lower = String::with_capacity(text.len());
    let mut starts: Vec<(usize, usize)> = Vec::with_capacity(chars.len());
    for (ci, ch) in chars.iter().enumerate() {
        starts.push((lower.len(), ci));
        lower.extend(ch.to_lowercase());
    }

    let first = tokens
        .iter()
        .filter(|t| !t.is_empty())
        .filter_map(|t| lower.find(t.to_lowercase().as_str()))
        .min()
        .map(|byte| match starts.binary_search_by_key(&byte, |(b, _)| *b) {
            Ok(i) => starts[i].1,
            Err(i) => starts[i.saturating_sub(1)].1,
        })
        .unwrap_or(0);

    let start = first.saturating_sub(before);
    let end = chars.len().min(first + after);
    let window: String = chars[start..end].iter().collect();
    let mut out = String::new();
    if start > 0 {
        out.push(ELLIPSIS);
    }
    out.push_str(&clean_whitespace(&window));
    if end < chars.len() {
        out.push(ELLIPSIS);
    }
    out
}

/// Rendered text of an element, roughly what a browser's `innerText` gives:
/// block boundaries become spaces and non-content elements are skipped.
pub fn rendered_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    push_rendered(el, &mut out);
    clean_whitespace(&out)
}

fn push_rendered(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        if let Some(t) = child.value().as_text() {
            out.push_str(t);
            continue;
        }
        let Some(child_el) = ElementRef::wrap(child) else {
            continue;
        };
        let name = child_el.value().name();
        if SKIP_TAGS.contains(&name) {
            continue;
        }
        let block = BLOCK_TAGS.contains(&name);
        if block {
            out.push(' ');
        }
        push_rendered(child_el, out);
        if block {
            out.push(' ');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn toks(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn clean_whitespace_collapses_nbsp_and_is_idempotent() {
        let s = "  a\u{00a0}\u{00a0}b \n\t c  ";
        let once = clean_whitespace(s);
        assert_eq!(once, "a b c");
        assert_eq!(clean_whitespace(&once), once);
    }

    #[test]
    fn strip_html_drops_tags_and_scripts() {
        let s = "<b>Hello</b> <script>alert(1)</script>&amp; <i>bye</i>";
        let out = strip_html(s);
        assert!(out.starts_with("Hello"));
        assert!(out.contains("& "));
        assert!(out.ends_with("bye"));
        assert!(!out.contains("alert"));
        assert_eq!(strip_html("  plain  "), "plain");
    }

    #[test]
    fn escape_html_covers_quotes() {
        assert_eq!(escape_html(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }

    #[test]
    fn count_occurrences_is_non_overlapping() {
        assert_eq!(count_occurrences("aaaa", "aa"), 2);
        assert_eq!(count_occurrences("fox and fox", "fox"), 2);
        assert_eq!(count_occurrences("", "fox"), 0);
        assert_eq!(count_occurrences("fox", ""), 0);
    }

    #[test]
    fn snippet_centres_on_earliest_token() {
        let text = format!("{} needle {}", "x".repeat(200), "y".repeat(400));
        let out = extract_snippet(&text, &toks(&["zzz", "needle"]));
        assert!(out.starts_with(ELLIPSIS));
        assert!(out.ends_with(ELLIPSIS));
        assert!(out.contains("needle"));
    }

    #[test]
    fn snippet_without_match_starts_at_zero() {
        let text = "short text without the token";
        assert_eq!(extract_snippet(text, &toks(&["absent"])), text);
    }

    #[test]
    fn snippet_without_tokens_is_a_prefix() {
        let text = "w ".repeat(300);
        let out = extract_snippet(&text, &[]);
        assert!(out.ends_with(ELLIPSIS));
        assert_eq!(out.chars().count(), SNIPPET_AFTER + 1);
        assert_eq!(extract_snippet("tiny", &[]), "tiny");
    }

    #[test]
    fn snippet_match_is_case_insensitive_with_unicode_prefix() {
        let text = format!("{}Ünïcode FOX here", "İ".repeat(120));
        let out = extract_snippet(&text, &toks(&["fox"]));
        assert!(out.contains("FOX"));
    }

    #[test]
    fn rendered_text_separates_blocks() {
        let doc = Html::parse_document("<body><p>one</p><p>two<b>three</b></p><style>.x{}</style></body>");
        let sel = html_scraper::Selector::parse("body").unwrap();
        let body = doc.select(&sel).next().unwrap();
        assert_eq!(rendered_text(body), "one twothree");
    }

    proptest! {
        #[test]
        fn snippet_length_is_bounded_and_contains_match(
            prefix in "[a-z ]{0,400}",
            suffix in "[a-z ]{0,400}",
        ) {
            let text = format!("{prefix}QQQ{suffix}");
            let out = extract_snippet(&text, &["qqq".to_string()]);
            prop_assert!(out.chars().count() <= SNIPPET_BEFORE + SNIPPET_AFTER + 2);
            prop_assert!(out.contains("QQQ"));
        }
    }
}
