use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\b[a-z][a-z0-9+.-]*://[^\s<>"'`\]\[)(]+"#).expect("url regex must compile")
    })
}

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '*', '_', '>'];

/// Collects URL-shaped substrings from agent outputs in order of first
/// appearance. Duplicates are dropped case-insensitively and anything that is
/// not `http` or `https` is rejected.
pub fn collect_sources<S: AsRef<str>>(texts: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for text in texts {
        for m in url_re().find_iter(text.as_ref()) {
            let url = m.as_str().trim_end_matches(TRAILING_PUNCTUATION);
            if !is_web_url(url) {
                continue;
            }
            if seen.insert(url.to_lowercase()) {
                sources.push(url.to_string());
            }
        }
    }
    sources
}

/// Merges two source lists, keeping the first spelling of each URL.
pub fn merge_sources(primary: &[String], extra: &[String]) -> Vec<String> {
    let mut all = primary.to_vec();
    all.extend(extra.iter().cloned());
    collect_sources(&all)
}

fn is_web_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty())
}
