/// Trims prose and code fences around a JSON payload emitted by an agent.
///
/// Whichever of `{` or `[` opens first decides the bracket pair; the slice runs
/// to the last matching closer. Falls back to the trimmed input.
pub fn clean_json_output(raw: &str) -> String {
    let (open, close) = match (raw.find('{'), raw.find('[')) {
        (Some(object), Some(array)) if array < object => ('[', ']'),
        (Some(_), _) => ('{', '}'),
        (None, Some(_)) => ('[', ']'),
        (None, None) => return raw.trim().to_string(),
    };
    if let (Some(start), Some(end)) = (raw.find(open), raw.rfind(close)) {
        if end > start {
            return raw[start..=end].to_string();
        }
    }
    raw.trim().to_string()
}

/// Collapses every run of whitespace to a single space and trims both ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cuts `text` to at most `max_chars` characters, replacing the tail with `…`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(1);
    let mut out: String = text.chars().take(keep).collect();
    out.truncate(out.trim_end().len());
    out.push('…');
    out
}

/// Removes markdown bold/italic markers (`**`, `__`) without touching single
/// characters that may be meaningful in prose.
pub fn strip_markdown_emphasis(text: &str) -> String {
    text.replace("**", "").replace("__", "")
}

/// Returns the last `max_chars` characters of `text`, cut on a char boundary.
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    let skip = total - max_chars;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}
