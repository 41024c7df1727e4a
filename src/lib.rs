//! # Company Analyzer
//!
//! Turns the free-form output of an LLM agent crew into deterministic
//! artifacts: a Markdown company report with fixed section markers, a list of
//! source URLs and a canonical quarterly financial payload.
//!
//! ## Core Concepts
//!
//! - **Quarter labels**: every period token is normalized to `Q<1-4> <YYYY>`
//!   and ordered by `(year, quarter)`.
//! - **Quarterly payload**: metrics × quarters tables and per-quarter records
//!   built from vendor tables, JSON objects or blocks embedded in agent text,
//!   whatever their orientation.
//! - **Bullets**: agent prose reduced to short, deduplicated `- ` lines.
//! - **Report**: fixed sections, each closed by an `--- End of <Name> ---`
//!   marker so it can be cut apart again downstream.
//! - **Pipeline**: a research crew, then a reporting crew, then quarterly data
//!   resolution, never raising past [`CompanyAnalyzer::analyze`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use company_analyzer::*;
//! use std::sync::Arc;
//!
//! let analyzer = CompanyAnalyzer::new(Arc::new(my_crew), AnalyzerConfig::from_env()?)
//!     .with_data_source(Arc::new(my_vendor));
//!
//! let (report, sources, quarterly) = analyzer.analyze("Ericsson").await.into_parts();
//! ```

pub mod agents;
pub mod bullets;
pub mod config;
pub mod debug_log;
pub mod error;
pub mod ingestion;
pub mod metrics;
pub mod quarter;
pub mod report;
pub mod schema;
pub mod sections;
pub mod sources;
pub mod summary;
pub mod table;
pub mod utils;

pub use agents::{
    embedded_block_instructions, AgentTask, AnalysisOutcome, CompanyAnalyzer, CrewRunner,
    FallbackSearch, FinancialDataSource, PipelineEvent, PipelineStage, QuarterlyOrigin,
    SearchProvider, TaskContext, TaskRequest, SEARCH_FAILED_MESSAGE,
};
pub use bullets::{extract_bullets, extract_bullets_each};
pub use config::AnalyzerConfig;
pub use debug_log::{tail_log, FileLogSink, LogSink, MemoryLogSink, NullLogSink};
pub use error::{AnalysisError, Result};
pub use ingestion::*;
pub use metrics::{resolve_metric, MetricKey};
pub use quarter::{normalize_quarter, quarter_sort_key, QuarterKey};
pub use report::{clean_report_text, Report, ReportSections};
pub use schema::*;
pub use sections::{extract_section, split_by_markers, ReportSection};
pub use sources::collect_sources;
pub use summary::{latest_quarters, year_over_year, QuarterlySummary, YearOverYear};
pub use table::{normalize_orientation, QuarterlyTable};
