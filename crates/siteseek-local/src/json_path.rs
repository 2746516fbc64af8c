//! Dotted/indexed accessors into JSON responses, e.g. `data.items[0].title`.

use serde_json::Value;

/// Walk `path` from `root`. An empty path (or empty segments) selects `root`
/// itself; any missing step or `null` yields `None`.
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for part in path.split('.').map(str::trim).filter(|p| !p.is_empty()) {
        let (prop, indexes) = split_indexes(part);
        if !prop.is_empty() {
            current = current.as_object()?.get(prop)?;
        }
        for i in indexes {
            current = current.as_array()?.get(i)?;
        }
        if current.is_null() {
            return None;
        }
    }
    Some(current)
}

// "items[0][2]" -> ("items", [0, 2]). A malformed bracket makes the whole
// segment a plain property name.
fn split_indexes(part: &str) -> (&str, Vec<usize>) {
    let Some(open) = part.find('[') else {
        return (part, Vec::new());
    };
    if !part.ends_with(']') {
        return (part, Vec::new());
    }
    let mut indexes = Vec::new();
    for raw in part[open + 1..part.len() - 1].split("][") {
        match raw.parse::<usize>() {
            Ok(i) => indexes.push(i),
            Err(_) => return (part, Vec::new()),
        }
    }
    (&part[..open], indexes)
}

/// Display text of a scalar, treating falsy values (`null`, `false`, `0`, `""`)
/// as absent. A `{ "rendered": "..." }` object (the WordPress REST shape)
/// yields its rendered string.
pub fn truthy_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        Value::Object(o) => o.get("rendered").and_then(truthy_text),
        _ => None,
    }
}

/// First truthy text among `paths` resolved against `item`. Empty paths are skipped.
pub fn first_text(item: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .filter(|p| !p.trim().is_empty())
        .find_map(|p| resolve_path(item, p).and_then(truthy_text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_dotted_and_indexed_paths() {
        let v = json!({"data": {"items": [{"title": "a"}, {"title": "b", "tags": [["x", "y"]]}]}});
        assert_eq!(resolve_path(&v, "data.items[1].title"), Some(&json!("b")));
        assert_eq!(resolve_path(&v, "data.items[1].tags[0][1]"), Some(&json!("y")));
        assert_eq!(resolve_path(&v, ""), Some(&v));
        assert_eq!(resolve_path(&v, "data..items[0].title"), Some(&json!("a")));
        assert!(resolve_path(&v, "data.items[5]").is_none());
        assert!(resolve_path(&v, "data.missing.title").is_none());
        assert!(resolve_path(&v, "data[0]").is_none());
    }

    #[test]
    fn null_steps_resolve_to_none() {
        let v = json!({"a": null});
        assert!(resolve_path(&v, "a").is_none());
    }

    #[test]
    fn falsy_values_fall_through() {
        let item = json!({"headline": "", "title": {"rendered": "Hello &amp; bye"}, "n": 0, "url": "/x"});
        assert_eq!(first_text(&item, &["headline", "title"]).as_deref(), Some("Hello &amp; bye"));
        assert_eq!(first_text(&item, &["n", "url"]).as_deref(), Some("/x"));
        assert_eq!(first_text(&item, &["", "missing"]), None);
        assert_eq!(truthy_text(&json!(7)).as_deref(), Some("7"));
        assert_eq!(truthy_text(&json!(false)), None);
    }
}
