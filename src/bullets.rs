//! Turns free-form agent text into a clean, deduplicated bullet list.
//!
//! Literal bullet lines (`-`, `•`, `*`, `1.`, `1)`) are preferred. Only when a
//! text has none does extraction fall back to sentences that carry a numeric
//! signal: a quarter token, a percentage, a currency or a number of three or
//! more digits. Source citations and bare URLs never become bullets.

use crate::utils::{collapse_whitespace, strip_markdown_emphasis, truncate_chars};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

pub const MIN_BULLET_CHARS: usize = 8;
/// Upper bound on a whole bullet, `"- "` prefix included.
pub const MAX_BULLET_CHARS: usize = 240;
const BULLET_PREFIX: &str = "- ";

fn bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*•]|\d{1,3}[.)])\s+(.+)$").expect("bullet regex must compile")
    })
}

fn source_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?:[-*•]\s*|\d{1,3}[.)]\s*)?[*_\[(]*\s*(?:sources?|urls?|links?|references?|citations?)\s*[*_\])]*\s*:",
        )
        .expect("source line regex must compile")
    })
}

fn bare_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?:[-*•]\s*|\d{1,3}[.)]\s*)?(?:<?(?:https?://|www\.)\S+>?|\[[^\]]*\]\(https?://[^)]+\))$",
        )
        .expect("bare url regex must compile")
    })
}

fn quarter_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bQ[1-4]\s*[-_/ ]?\s*\d{4}\b|\b\d{4}\s*[-_/ ]?\s*Q[1-4]\b")
            .expect("quarter token regex must compile")
    })
}

fn percentage_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:[.,]\d+)?\s?%").expect("percentage regex must compile"))
}

fn currency_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:USD|EUR|SEK|GBP|JPY|CNY|CHF|NOK|DKK|CAD|AUD|INR)\b|[$€£¥]")
            .expect("currency regex must compile")
    })
}

fn large_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d{3,}|\d{1,3}(?:,\d{3})+").expect("large number regex must compile")
    })
}

fn sentence_end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]+(?:\s+|$)").expect("sentence regex must compile"))
}

/// Lines such as `Source: ...`, `URL: ...` or a lone link.
pub fn is_source_line(line: &str) -> bool {
    let line = line.trim();
    source_line_re().is_match(line) || bare_url_re().is_match(line)
}

/// True when a sentence mentions a quarter, a percentage, a currency or a
/// number with at least three digits.
pub fn has_numeric_signal(sentence: &str) -> bool {
    quarter_token_re().is_match(sentence)
        || percentage_re().is_match(sentence)
        || currency_re().is_match(sentence)
        || large_number_re().is_match(sentence)
}

/// Content of a bullet line with its marker removed, or `None` for plain text.
pub fn bullet_content(line: &str) -> Option<String> {
    bullet_re()
        .captures(line)
        .map(|caps| clean_fragment(&caps[1]))
        .filter(|content| !content.is_empty())
}

/// Splits a line into sentences, keeping terminal punctuation.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in sentence_end_re().find_iter(text) {
        let sentence = text[start..m.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        start = m.end();
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

fn clean_fragment(text: &str) -> String {
    collapse_whitespace(&strip_markdown_emphasis(text))
}

fn is_heading_line(line: &str) -> bool {
    line.starts_with('#')
}

/// A line ending in `:` waiting for its continuation.
struct Held {
    text: String,
    from_bullet: bool,
}

fn primary_candidates(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut held: Option<Held> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || is_source_line(line) {
            continue;
        }

        match bullet_content(line) {
            Some(content) => {
                let opens_group = content.ends_with(':');
                match held.take() {
                    Some(head) if !opens_group => {
                        out.push(format!("{} {}", head.text, content));
                    }
                    Some(head) => {
                        if head.from_bullet {
                            out.push(head.text);
                        }
                        held = Some(Held {
                            text: content,
                            from_bullet: true,
                        });
                    }
                    None if opens_group => {
                        held = Some(Held {
                            text: content,
                            from_bullet: true,
                        });
                    }
                    None => out.push(content),
                }
            }
            None => {
                let plain = clean_fragment(line);
                match held.take() {
                    Some(head) if head.from_bullet => {
                        if is_heading_line(line) {
                            out.push(head.text);
                        } else {
                            out.push(format!("{} {}", head.text, plain));
                        }
                    }
                    _ => {
                        if !is_heading_line(line) && plain.ends_with(':') {
                            held = Some(Held {
                                text: plain,
                                from_bullet: false,
                            });
                        }
                    }
                }
            }
        }
    }
    if let Some(head) = held {
        if head.from_bullet {
            out.push(head.text);
        }
    }
    out
}

fn fallback_candidates(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || is_heading_line(line) || is_source_line(line) {
            continue;
        }
        for sentence in split_sentences(line) {
            if is_source_line(&sentence) || !has_numeric_signal(&sentence) {
                continue;
            }
            out.push(clean_fragment(&sentence));
        }
    }
    out
}

fn candidates(text: &str) -> Vec<String> {
    let primary = primary_candidates(text);
    if primary.is_empty() {
        fallback_candidates(text)
    } else {
        primary
    }
}

fn dedup_bullets(candidates: impl IntoIterator<Item = String>, max_items: usize) -> Vec<String> {
    let max_content = MAX_BULLET_CHARS - BULLET_PREFIX.len();
    let mut seen = HashSet::new();
    let mut bullets = Vec::new();
    for candidate in candidates {
        if bullets.len() >= max_items {
            break;
        }
        let content = collapse_whitespace(&candidate);
        if content.chars().count() < MIN_BULLET_CHARS {
            continue;
        }
        let bullet = format!("{}{}", BULLET_PREFIX, truncate_chars(&content, max_content));
        if seen.insert(bullet.to_lowercase()) {
            bullets.push(bullet);
        }
    }
    bullets
}

/// Extracts at most `max_items` unique bullets, each formatted as `"- ..."`.
pub fn extract_bullets(text: &str, max_items: usize) -> Vec<String> {
    dedup_bullets(candidates(text), max_items)
}

/// Like [`extract_bullets`] over several texts, deciding between literal
/// bullets and the numeric fallback for each text on its own. The merged list
/// is deduplicated and capped at `max_items`.
pub fn extract_bullets_each<S: AsRef<str>>(texts: &[S], max_items: usize) -> Vec<String> {
    dedup_bullets(
        texts.iter().flat_map(|text| candidates(text.as_ref())),
        max_items,
    )
}

/// Joins bullets into a Markdown list block.
pub fn render_bullets(bullets: &[String]) -> String {
    bullets.join("\n")
}
