use std::collections::HashSet;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

/// `<meta property|name="key" content="...">`, first non-empty match.
pub fn meta_content(html: &str, key: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(&format!(
        r#"meta[property="{key}"], meta[name="{key}"], meta[itemprop="{key}"]"#
    ))
    .ok()?;

    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(|c| decode_entities(c.trim()))
        .find(|c| !c.is_empty())
}

pub fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Text of every `<script>` matching `selector`, e.g. `script#__NEXT_DATA__`
/// or `script[type="application/ld+json"]`.
pub fn script_texts(html: &str, selector: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(selector) else {
        return Vec::new();
    };
    document
        .select(&selector)
        .map(|el| el.text().collect::<String>())
        .filter(|t| !t.trim().is_empty())
        .collect()
}

/// First capture group of every match, in document order.
pub fn capture_all(re: &Regex, haystack: &str) -> Vec<String> {
    re.captures_iter(haystack)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Undoes the escaping that URLs pick up inside inline JSON and HTML
/// attributes (`\/`, `&`, `&amp;`, ...).
pub fn unescape_url(raw: &str) -> String {
    let mut s = raw.trim().trim_matches('"').to_string();
    for (from, to) in [
        ("\\\\/", "/"),
        ("\\/", "/"),
        ("\\u0026", "&"),
        ("\\u003d", "="),
        ("\\u003D", "="),
        ("\\u0025", "%"),
        ("\\u002F", "/"),
        ("\\u002f", "/"),
        ("&amp;", "&"),
    ] {
        s = s.replace(from, to);
    }
    s
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

/// Drops duplicates and empty strings, keeping first occurrences.
pub fn dedup(urls: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|u| !u.is_empty() && seen.insert(u.clone()))
        .collect()
}

/// Parses the JSON object or array that starts at the first `{` or `[` after
/// `marker`, e.g. `window._sharedData = {...};`.
pub fn json_after(haystack: &str, marker: &str) -> Option<Value> {
    let start = haystack.find(marker)? + marker.len();
    let rest = &haystack[start..];
    let open = rest.find(['{', '['])?;
    let slice = balanced_slice(&rest[open..])?;
    serde_json::from_str(slice).ok()
}

fn balanced_slice(s: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Depth-first walk over every string in `value`, passing the key it sits
/// under (if any).
pub fn walk_strings<'a>(value: &'a Value, visit: &mut dyn FnMut(Option<&'a str>, &'a str)) {
    fn walk<'a>(
        value: &'a Value,
        key: Option<&'a str>,
        visit: &mut dyn FnMut(Option<&'a str>, &'a str),
    ) {
        match value {
            Value::String(s) => visit(key, s),
            Value::Array(items) => {
                for item in items {
                    walk(item, key, visit);
                }
            }
            Value::Object(map) => {
                for (k, v) in map {
                    walk(v, Some(k.as_str()), visit);
                }
            }
            _ => {}
        }
    }

    walk(value, None, visit);
}

/// First value found under any of `keys`, searched depth-first.
pub fn find_key<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    match value {
        Value::Object(map) => {
            for key in keys {
                if let Some(v) = map.get(*key) {
                    if !v.is_null() {
                        return Some(v);
                    }
                }
            }
            map.values().find_map(|v| find_key(v, keys))
        }
        Value::Array(items) => items.iter().find_map(|v| find_key(v, keys)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAGE: &str = r#"<html><head>
        <title>Clip title | Facebook</title>
        <meta property="og:image" content="https://scontent.xx.fbcdn.net/a.jpg?x=1&amp;y=2">
        <meta name="description" content="">
        <script type="application/ld+json">{"contentUrl":"https://v1.pinimg.com/videos/a.mp4"}</script>
        </head><body></body></html>"#;

    #[test]
    fn reads_meta_and_title() {
        assert_eq!(
            meta_content(PAGE, "og:image").as_deref(),
            Some("https://scontent.xx.fbcdn.net/a.jpg?x=1&y=2")
        );
        assert_eq!(meta_content(PAGE, "description"), None);
        assert_eq!(page_title(PAGE).as_deref(), Some("Clip title | Facebook"));
    }

    #[test]
    fn reads_ld_json_scripts() {
        let scripts = script_texts(PAGE, r#"script[type="application/ld+json"]"#);
        assert_eq!(scripts.len(), 1);
        let v: Value = serde_json::from_str(&scripts[0]).unwrap();
        assert_eq!(v["contentUrl"], "https://v1.pinimg.com/videos/a.mp4");
    }

    #[test]
    fn unescapes_json_urls() {
        assert_eq!(
            unescape_url(r#"https:\/\/video.xx.fbcdn.net\/v\/a.mp4?a=1&b=2"#),
            "https://video.xx.fbcdn.net/v/a.mp4?a=1&b=2"
        );
    }

    #[test]
    fn json_after_handles_nested_and_strings() {
        let html = r#"<script>window._sharedData = {"a":{"b":"}{"},"c":[1,2]};</script>"#;
        let v = json_after(html, "window._sharedData").unwrap();
        assert_eq!(v["a"]["b"], "}{");
        assert_eq!(v["c"][1], 2);

        let html = r#"window.__sc_hydration = [{"hydratable":"sound"}];"#;
        let v = json_after(html, "__sc_hydration").unwrap();
        assert_eq!(v[0]["hydratable"], "sound");

        assert!(json_after("var x = {broken", "var x").is_none());
    }

    #[test]
    fn walk_and_find() {
        let v = json!({"items": [{"video_url": "https://a/v.mp4"}, {"display_url": "https://a/i.jpg"}]});
        let mut seen = Vec::new();
        walk_strings(&v, &mut |k, s| seen.push((k.map(String::from), s.to_string())));
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0.as_deref(), Some("video_url"));

        assert_eq!(find_key(&v, &["display_url"]).unwrap(), "https://a/i.jpg");
        assert!(find_key(&v, &["missing"]).is_none());
    }

    #[test]
    fn dedup_keeps_order() {
        let urls = dedup(vec!["b".into(), "a".into(), "b".into(), String::new()]);
        assert_eq!(urls, vec!["b".to_string(), "a".to_string()]);
    }
}
