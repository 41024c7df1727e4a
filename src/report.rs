use crate::error::Result;
use crate::sections::{extract_section, ReportSection};
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Body text for each report section. Empty strings mean "no content".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSections {
    pub executive_summary: String,
    pub key_research_insights: String,
    pub financial_analysis_highlights: String,
    pub recommendations: String,
}

impl ReportSections {
    pub fn get(&self, section: ReportSection) -> &str {
        match section {
            ReportSection::ExecutiveSummary => &self.executive_summary,
            ReportSection::KeyResearchInsights => &self.key_research_insights,
            ReportSection::FinancialAnalysisHighlights => &self.financial_analysis_highlights,
            ReportSection::Recommendations => &self.recommendations,
            ReportSection::Sources => "",
        }
    }

    pub fn is_empty(&self) -> bool {
        ReportSection::ALL.iter().all(|s| self.get(*s).trim().is_empty())
    }
}

/// A finished Markdown report for one company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub company: String,
    pub text: String,
}

impl Report {
    /// Lays out title, non-empty sections, sources and the closing marker.
    pub fn assemble(company: &str, sections: &ReportSections, sources: &[String]) -> Self {
        let mut blocks = vec![format!("# Company Analysis Report for {}", company)];

        for section in ReportSection::ALL {
            let content = sections.get(section).trim();
            if content.is_empty() {
                continue;
            }
            blocks.push(format!(
                "## {}\n\n{}\n\n{}",
                section.heading(),
                content,
                section.end_marker()
            ));
        }

        let sources: Vec<&str> = sources
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if sources.is_empty() {
            blocks.push(ReportSection::Sources.end_marker().to_string());
        } else {
            let list: Vec<String> = sources.iter().map(|url| format!("- {}", url)).collect();
            blocks.push(format!(
                "## {}\n\n{}\n\n{}",
                ReportSection::Sources.heading(),
                list.join("\n"),
                ReportSection::Sources.end_marker()
            ));
        }

        debug!(
            "Assembled report for {} with {} section blocks",
            company,
            blocks.len()
        );
        Self {
            company: company.to_string(),
            text: clean_report_text(&blocks.join("\n\n")),
        }
    }

    /// The report produced when the pipeline fails.
    pub fn failure(company: &str, message: &str) -> Self {
        Self {
            company: company.to_string(),
            text: format!("Error analyzing {}: {}", company, message),
        }
    }

    /// `Acme Corp` becomes `Acme_Corp_report.md`.
    pub fn file_name(&self) -> String {
        let stem: String = self
            .company
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '/' | '\\' => '_',
                other => other,
            })
            .collect();
        format!("{}_report.md", stem)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn section(&self, section: ReportSection) -> Option<String> {
        extract_section(&self.text, section)
    }

    /// Writes the report into `dir` under [`Report::file_name`].
    pub fn write_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let path = dir.as_ref().join(self.file_name());
        std::fs::write(&path, self.as_bytes())?;
        debug!("Wrote report to {}", path.display());
        Ok(path)
    }
}

fn truncation_note_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)[ \t]*(?:\.\.\.|…)?[ \t]*\[truncated for length\]")
            .expect("truncation regex must compile")
    })
}

fn bullet_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^([ \t]*)[•*][ \t]+").expect("bullet regex must compile"))
}

fn inline_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[ \t]*---[ \t]*(?i:End of) [^\n]+?[ \t]*---[ \t]*")
            .expect("marker regex must compile")
    })
}

/// Removes a comma sitting between two digits: `82,000,000` becomes
/// `82000000`. Neighbours are judged on the input, so one pass is enough.
pub fn strip_digit_separators(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == ',' && i > 0 {
            let before = chars[i - 1];
            let after = chars.get(i + 1).copied();
            if before.is_ascii_digit() && after.is_some_and(|a| a.is_ascii_digit()) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Strips trailing whitespace, keeps at most one blank line between blocks and
/// ends the text with exactly one newline.
pub fn normalize_spacing(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() && lines.last().map_or(true, |prev| prev.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    if lines.is_empty() {
        return String::new();
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

pub fn clean_report_text(text: &str) -> String {
    normalize_spacing(&strip_digit_separators(text))
}

/// Tidies Markdown written by an agent before it goes into a report:
/// truncation notes are dropped, `•`/`*` bullets become `-` and end markers
/// are moved onto their own lines.
pub fn normalize_agent_markdown(text: &str) -> String {
    let text = truncation_note_re().replace_all(text, "");
    let text = bullet_marker_re().replace_all(&text, "${1}- ");
    normalize_spacing(&isolate_markers(&text))
}

fn isolate_markers(text: &str) -> String {
    let mut lines = Vec::new();
    for line in text.lines() {
        if !inline_marker_re().is_match(line) {
            lines.push(line.to_string());
            continue;
        }
        let mut rest = line;
        while let Some(m) = inline_marker_re().find(rest) {
            let before = rest[..m.start()].trim_end();
            if !before.is_empty() {
                lines.push(before.to_string());
            }
            lines.push(m.as_str().trim().to_string());
            rest = &rest[m.end()..];
        }
        if !rest.trim().is_empty() {
            lines.push(rest.trim_start().to_string());
        }
    }
    lines.join("\n")
}
