//! Report sections and their end markers.
//!
//! Every section of an assembled report closes with a fixed marker line such
//! as `--- End of Executive Summary ---`. Downstream consumers rely on these
//! markers to cut a report back into sections, so their wording must not
//! change.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReportSection {
    ExecutiveSummary,
    KeyResearchInsights,
    FinancialAnalysisHighlights,
    Recommendations,
    Sources,
}

impl ReportSection {
    /// Sections in report order.
    pub const ALL: [ReportSection; 5] = [
        ReportSection::ExecutiveSummary,
        ReportSection::KeyResearchInsights,
        ReportSection::FinancialAnalysisHighlights,
        ReportSection::Recommendations,
        ReportSection::Sources,
    ];

    pub fn heading(&self) -> &'static str {
        match self {
            Self::ExecutiveSummary => "Executive Summary",
            Self::KeyResearchInsights => "Key Research Insights",
            Self::FinancialAnalysisHighlights => "Financial Analysis Highlights",
            Self::Recommendations => "Recommendations",
            Self::Sources => "Sources",
        }
    }

    /// The name inside the end marker. The highlights section closes with
    /// "Financial Analysis" and the sources section closes the whole report.
    pub fn marker_name(&self) -> &'static str {
        match self {
            Self::ExecutiveSummary => "Executive Summary",
            Self::KeyResearchInsights => "Key Research Insights",
            Self::FinancialAnalysisHighlights => "Financial Analysis",
            Self::Recommendations => "Recommendations",
            Self::Sources => "Report",
        }
    }

    pub fn end_marker(&self) -> &'static str {
        match self {
            Self::ExecutiveSummary => "--- End of Executive Summary ---",
            Self::KeyResearchInsights => "--- End of Key Research Insights ---",
            Self::FinancialAnalysisHighlights => "--- End of Financial Analysis ---",
            Self::Recommendations => "--- End of Recommendations ---",
            Self::Sources => "--- End of Report ---",
        }
    }

    pub fn from_marker_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.marker_name().eq_ignore_ascii_case(name))
    }

    fn heading_re(&self) -> &'static Regex {
        static RES: OnceLock<Vec<Regex>> = OnceLock::new();
        let all = RES.get_or_init(|| {
            ReportSection::ALL
                .iter()
                .map(|s| {
                    Regex::new(&format!(
                        r"(?im)^[ \t]*#*[ \t]*{}[ \t]*$",
                        regex::escape(s.heading())
                    ))
                    .expect("heading regex must compile")
                })
                .collect()
        });
        &all[*self as usize]
    }
}

impl fmt::Display for ReportSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.heading())
    }
}

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"---[ \t]*(?i:End of) ([^\n]+?)[ \t]*---").expect("marker regex must compile")
    })
}

fn is_heading_for(line: &str, name: &str) -> bool {
    let bare = line
        .trim()
        .trim_start_matches('#')
        .trim()
        .trim_matches(|c| c == '*' || c == '_')
        .trim()
        .trim_end_matches(':')
        .trim();
    !bare.is_empty() && bare.eq_ignore_ascii_case(name)
}

/// Splits text on `--- End of <Name> ---` markers.
///
/// Each entry maps the marker name to the text between the previous marker
/// and this one, trimmed. A leading heading line repeating the name is
/// dropped. Text after the last marker is ignored.
pub fn split_by_markers(text: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let mut cursor = 0;
    for caps in marker_re().captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = name.as_str().trim().to_string();
        let mut lines: Vec<&str> = text[cursor..whole.start()].trim().lines().collect();
        let section_heading = ReportSection::from_marker_name(&name).map(|s| s.heading());
        while let Some(first) = lines.first() {
            let repeats_name = is_heading_for(first, &name)
                || section_heading.is_some_and(|h| is_heading_for(first, h));
            if !repeats_name {
                break;
            }
            lines.remove(0);
        }
        out.insert(name, lines.join("\n").trim().to_string());
        cursor = whole.end();
    }
    out
}

/// Pulls one section, heading through end marker, out of a finished report.
///
/// When the heading is present but its marker is missing, the section runs up
/// to the next known heading and the marker is appended.
pub fn extract_section(report: &str, section: ReportSection) -> Option<String> {
    let heading = section.heading_re().find(report)?;
    let marker = section.end_marker();

    if let Some(offset) = report[heading.end()..].find(marker) {
        let end = heading.end() + offset + marker.len();
        return Some(report[heading.start()..end].trim().to_string());
    }

    let next_heading = ReportSection::ALL
        .iter()
        .filter_map(|s| s.heading_re().find(&report[heading.end()..]))
        .map(|m| heading.end() + m.start())
        .min()
        .unwrap_or(report.len());
    let body = report[heading.start()..next_heading].trim();
    Some(format!("{}\n{}", body, marker))
}

/// Every section found in `report`, keyed by section.
pub fn parse_report(report: &str) -> BTreeMap<ReportSection, String> {
    ReportSection::ALL
        .into_iter()
        .filter_map(|s| extract_section(report, s).map(|text| (s, text)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "# Company Analysis Report for Acme\n\n## Executive Summary\n\nSolid quarter.\n\n--- End of Executive Summary ---\n\n## Financial Analysis Highlights\n\n- Revenue 82000000000\n\n--- End of Financial Analysis ---\n\n## Sources\n\n- https://example.com\n\n--- End of Report ---\n";

    #[test]
    fn test_markers_are_exact() {
        assert_eq!(
            ReportSection::FinancialAnalysisHighlights.end_marker(),
            "--- End of Financial Analysis ---"
        );
        assert_eq!(ReportSection::Sources.end_marker(), "--- End of Report ---");
        for section in ReportSection::ALL {
            assert_eq!(
                section.end_marker(),
                format!("--- End of {} ---", section.marker_name())
            );
        }
    }

    #[test]
    fn test_split_by_markers() {
        let text = "## Executive Summary\nAcme is growing.\n--- End of Executive Summary ---\nRecommendations:\n- Hold the stock for now\n--- End of Recommendations ---\ntrailing";
        let sections = split_by_markers(text);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections["Executive Summary"], "Acme is growing.");
        assert_eq!(sections["Recommendations"], "- Hold the stock for now");
    }

    #[test]
    fn test_split_by_markers_ignores_marker_case() {
        let text = "## Executive Summary\nAcme is growing.\n--- END OF EXECUTIVE SUMMARY ---";
        let sections = split_by_markers(text);
        assert_eq!(sections["EXECUTIVE SUMMARY"], "Acme is growing.");
        assert_eq!(
            ReportSection::from_marker_name("EXECUTIVE SUMMARY"),
            Some(ReportSection::ExecutiveSummary)
        );
    }

    #[test]
    fn test_split_without_markers_is_empty() {
        assert!(split_by_markers("Just prose, no markers.").is_empty());
    }

    #[test]
    fn test_extract_section_with_marker() {
        let section = extract_section(REPORT, ReportSection::FinancialAnalysisHighlights).unwrap();
        assert_eq!(
            section,
            "## Financial Analysis Highlights\n\n- Revenue 82000000000\n\n--- End of Financial Analysis ---"
        );
        let sources = extract_section(REPORT, ReportSection::Sources).unwrap();
        assert!(sources.ends_with("--- End of Report ---"));
    }

    #[test]
    fn test_extract_section_falls_back_to_next_heading() {
        let report = "Executive Summary\nGood results.\nRecommendations\n- Buy\n";
        let summary = extract_section(report, ReportSection::ExecutiveSummary).unwrap();
        assert_eq!(
            summary,
            "Executive Summary\nGood results.\n--- End of Executive Summary ---"
        );
    }

    #[test]
    fn test_missing_section_is_none() {
        assert!(extract_section(REPORT, ReportSection::Recommendations).is_none());
        let parsed = parse_report(REPORT);
        assert_eq!(parsed.len(), 3);
        assert!(!parsed.contains_key(&ReportSection::KeyResearchInsights));
    }

    #[test]
    fn test_from_marker_name() {
        assert_eq!(
            ReportSection::from_marker_name("financial analysis"),
            Some(ReportSection::FinancialAnalysisHighlights)
        );
        assert_eq!(ReportSection::from_marker_name("Report"), Some(ReportSection::Sources));
        assert_eq!(ReportSection::from_marker_name("Appendix"), None);
    }
}
