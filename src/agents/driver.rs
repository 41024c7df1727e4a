//! Sequences one analysis run.
//!
//! ```text
//! Init -> ResearchRun -> SourceCollection -> BulletExtraction -> ReportingRun
//!      -> SectionAssembly -> QuarterlyResolution -> Done
//! ```
//!
//! Any failure of the research or reporting crew ends the run in `Failed` with
//! a one-line error report. The caller always gets an [`AnalysisOutcome`].

use crate::agents::crew::{AgentTask, CrewRunner, FinancialDataSource, TaskContext, TaskRequest};
use crate::agents::events::{PipelineEvent, PipelineStage, QuarterlyOrigin};
use crate::bullets::{extract_bullets, extract_bullets_each, render_bullets};
use crate::config::AnalyzerConfig;
use crate::debug_log::{FileLogSink, LogSink, NullLogSink};
use crate::error::{AnalysisError, Result};
use crate::ingestion::{build, strip_embedded_block, EmbeddedBlock};
use crate::report::{normalize_agent_markdown, Report, ReportSections};
use crate::schema::QuarterlyPayload;
use crate::sections::{split_by_markers, ReportSection};
use crate::sources::{collect_sources, merge_sources};
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub report: Report,
    pub sources: Vec<String>,
    pub quarterly: Option<QuarterlyPayload>,
    pub quarterly_origin: QuarterlyOrigin,
    /// `Done` or `Failed`.
    pub stage: PipelineStage,
}

impl AnalysisOutcome {
    fn failed(company: &str, reason: &str) -> Self {
        Self {
            report: Report::failure(company, reason),
            sources: Vec::new(),
            quarterly: None,
            quarterly_origin: QuarterlyOrigin::Unavailable,
            stage: PipelineStage::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.stage == PipelineStage::Done
    }

    /// `(report text, sources, quarterly payload)`.
    pub fn into_parts(self) -> (String, Vec<String>, Option<QuarterlyPayload>) {
        (self.report.text, self.sources, self.quarterly)
    }
}

/// Research outputs keyed by task.
struct Research {
    web_search: String,
    financial_research: String,
    financial_analysis: String,
}

impl Research {
    fn texts(&self) -> [&str; 3] {
        [
            self.web_search.as_str(),
            self.financial_research.as_str(),
            self.financial_analysis.as_str(),
        ]
    }

    /// Outputs that may carry embedded blocks, lowest precedence first.
    fn block_carriers(&self) -> [&str; 2] {
        [
            self.financial_research.as_str(),
            self.financial_analysis.as_str(),
        ]
    }
}

pub struct CompanyAnalyzer {
    crew: Arc<dyn CrewRunner>,
    data_source: Option<Arc<dyn FinancialDataSource>>,
    config: AnalyzerConfig,
    progress: Option<Sender<PipelineEvent>>,
}

impl CompanyAnalyzer {
    pub fn new(crew: Arc<dyn CrewRunner>, config: AnalyzerConfig) -> Self {
        Self {
            crew,
            data_source: None,
            config,
            progress: None,
        }
    }

    pub fn with_data_source(mut self, source: Arc<dyn FinancialDataSource>) -> Self {
        self.data_source = Some(source);
        self
    }

    pub fn with_progress(mut self, sender: Sender<PipelineEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Runs the pipeline, logging to `debug_log_path` when configured.
    pub async fn analyze(&self, company: &str) -> AnalysisOutcome {
        match &self.config.debug_log_path {
            Some(path) => match FileLogSink::create(path) {
                Ok(mut sink) => self.analyze_with_sink(company, &mut sink).await,
                Err(e) => {
                    warn!("Debug log {} unavailable: {}", path.display(), e);
                    self.analyze_with_sink(company, &mut NullLogSink).await
                }
            },
            None => self.analyze_with_sink(company, &mut NullLogSink).await,
        }
    }

    pub async fn analyze_with_sink(&self, company: &str, sink: &mut dyn LogSink) -> AnalysisOutcome {
        let company = company.trim();
        self.enter(PipelineStage::Init).await;
        info!("Starting analysis for {}", company);

        match self.run_pipeline(company, sink).await {
            Ok(outcome) => {
                self.send_event(PipelineEvent::Finished).await;
                info!("Analysis for {} finished", company);
                outcome
            }
            Err(e) => {
                let reason = e.to_string();
                error!("Analysis for {} failed: {}", company, reason);
                sink.append("ERROR", &reason);
                self.send_event(PipelineEvent::Failed {
                    reason: reason.clone(),
                })
                .await;
                AnalysisOutcome::failed(company, &reason)
            }
        }
    }

    async fn run_pipeline(&self, company: &str, sink: &mut dyn LogSink) -> Result<AnalysisOutcome> {
        self.enter(PipelineStage::ResearchRun).await;
        let research = self.run_research(company, sink).await?;

        self.enter(PipelineStage::SourceCollection).await;
        let sources = gather_sources(&research);
        sink.append("SOURCES", &sources.join("\n"));
        self.send_event(PipelineEvent::SourcesCollected {
            count: sources.len(),
        })
        .await;

        self.enter(PipelineStage::BulletExtraction).await;
        let insights = extract_bullets(&research.web_search, self.config.max_insights);
        let highlight_texts = [
            strip_embedded_block(&research.financial_research),
            strip_embedded_block(&research.financial_analysis),
        ];
        let highlights = extract_bullets_each(&highlight_texts, self.config.max_highlights);
        sink.append("INSIGHTS", &render_bullets(&insights));
        sink.append("HIGHLIGHTS", &render_bullets(&highlights));

        self.enter(PipelineStage::ReportingRun).await;
        let reporting = self
            .run_reporting(company, &research, &sources, &insights, &highlights)
            .await?;
        sink.append("RAW reporting", &reporting);

        self.enter(PipelineStage::SectionAssembly).await;
        let sections = self.assemble_sections(&reporting, &insights, &highlights);
        let report = Report::assemble(company, &sections, &sources);
        sink.append("REPORT", &report.text);

        self.enter(PipelineStage::QuarterlyResolution).await;
        let (quarterly, quarterly_origin) = self.resolve_quarterly(company, &research, sink).await;
        self.send_event(PipelineEvent::QuarterlyResolved {
            origin: quarterly_origin,
            quarters: quarterly.as_ref().map_or(0, |p| p.quarters.len()),
        })
        .await;

        self.enter(PipelineStage::Done).await;
        Ok(AnalysisOutcome {
            report,
            sources,
            quarterly,
            quarterly_origin,
            stage: PipelineStage::Done,
        })
    }

    async fn run_task(&self, task: AgentTask, company: &str, context: TaskContext) -> Result<String> {
        let request = TaskRequest::new(task, company, context);
        let output = self.crew.run(&request).await.map_err(|e| match e {
            AnalysisError::AgentRun { .. } => e,
            other => AnalysisError::AgentRun {
                task: task.name().to_string(),
                message: other.to_string(),
            },
        })?;
        info!("Task {} completed ({} chars)", task, output.len());
        self.send_event(PipelineEvent::TaskCompleted {
            task,
            output_chars: output.chars().count(),
        })
        .await;
        Ok(output)
    }

    async fn run_research(&self, company: &str, sink: &mut dyn LogSink) -> Result<Research> {
        let mut context = TaskContext::default();
        for task in AgentTask::RESEARCH {
            let output = self.run_task(task, company, context.clone()).await?;
            sink.append(&format!("RAW {}", task), &output);
            context.push_output(task, output);
            let texts: Vec<&str> = context.prior_outputs.iter().map(|(_, o)| o.as_str()).collect();
            context.sources = collect_sources(&texts);
        }

        let take = |task: AgentTask| context.output(task).unwrap_or_default().to_string();
        Ok(Research {
            web_search: take(AgentTask::WebSearch),
            financial_research: take(AgentTask::FinancialResearch),
            financial_analysis: take(AgentTask::FinancialAnalysis),
        })
    }

    async fn run_reporting(
        &self,
        company: &str,
        research: &Research,
        sources: &[String],
        insights: &[String],
        highlights: &[String],
    ) -> Result<String> {
        let context = TaskContext {
            prior_outputs: vec![
                (AgentTask::WebSearch, research.web_search.clone()),
                (
                    AgentTask::FinancialResearch,
                    strip_embedded_block(&research.financial_research),
                ),
                (
                    AgentTask::FinancialAnalysis,
                    strip_embedded_block(&research.financial_analysis),
                ),
            ],
            sources: sources.to_vec(),
            extracted: vec![
                (ReportSection::KeyResearchInsights, insights.to_vec()),
                (ReportSection::FinancialAnalysisHighlights, highlights.to_vec()),
            ],
        };
        self.run_task(AgentTask::Reporting, company, context).await
    }

    /// Research bullets win for insights and highlights; the reporting output
    /// fills whatever the research left empty.
    fn assemble_sections(
        &self,
        reporting: &str,
        insights: &[String],
        highlights: &[String],
    ) -> ReportSections {
        let cleaned = normalize_agent_markdown(reporting);
        let marked = split_by_markers(&cleaned);
        let has_markers = !marked.is_empty();
        let parts: BTreeMap<ReportSection, String> = marked
            .into_iter()
            .filter_map(|(name, content)| {
                ReportSection::from_marker_name(&name).map(|section| (section, content))
            })
            .collect();
        let part = |section: ReportSection| parts.get(&section).cloned().unwrap_or_default();

        let executive_summary = if !has_markers {
            cleaned.trim().to_string()
        } else {
            part(ReportSection::ExecutiveSummary)
        };

        let recommendations_text = part(ReportSection::Recommendations);
        let recommendation_bullets =
            extract_bullets(&recommendations_text, self.config.max_recommendations);
        let recommendations = if recommendation_bullets.is_empty() {
            recommendations_text
        } else {
            render_bullets(&recommendation_bullets)
        };

        let or_fallback = |bullets: &[String], section: ReportSection| {
            if bullets.is_empty() {
                part(section)
            } else {
                render_bullets(bullets)
            }
        };

        ReportSections {
            executive_summary,
            key_research_insights: or_fallback(insights, ReportSection::KeyResearchInsights),
            financial_analysis_highlights: or_fallback(
                highlights,
                ReportSection::FinancialAnalysisHighlights,
            ),
            recommendations,
        }
    }

    async fn resolve_quarterly(
        &self,
        company: &str,
        research: &Research,
        sink: &mut dyn LogSink,
    ) -> (Option<QuarterlyPayload>, QuarterlyOrigin) {
        let mut embedded: Option<QuarterlyPayload> = None;
        let mut saw_empty_block = false;

        for text in research.block_carriers() {
            let Some(block) = EmbeddedBlock::find(text) else {
                continue;
            };
            match block.into_payload() {
                Ok(payload) if payload.is_empty() => saw_empty_block = true,
                Ok(payload) => match embedded.as_mut() {
                    Some(existing) => existing.merge_from(&payload),
                    None => embedded = Some(payload),
                },
                Err(AnalysisError::EmptyQuarterlyData) => saw_empty_block = true,
                Err(e) => {
                    warn!("Embedded quarterly block unusable: {}", e);
                    sink.append("EMBEDDED BLOCK ERROR", &e.to_string());
                    saw_empty_block = true;
                }
            }
        }

        let wants_live = embedded.is_none() || self.config.always_fetch_live;
        if wants_live {
            if let Some(source) = &self.data_source {
                match self.fetch_live(source.as_ref(), company).await {
                    Ok(mut live) => {
                        let origin = match &embedded {
                            Some(overlay) => {
                                live.merge_from(overlay);
                                QuarterlyOrigin::Merged
                            }
                            None => QuarterlyOrigin::Live,
                        };
                        log_payload(sink, &live);
                        return (Some(live), origin);
                    }
                    Err(e) => {
                        warn!("Live quarterly fetch for {} failed: {}", company, e);
                        sink.append("LIVE FETCH ERROR", &e.to_string());
                    }
                }
            }
        }

        match embedded {
            Some(payload) => {
                log_payload(sink, &payload);
                (Some(payload), QuarterlyOrigin::Embedded)
            }
            None if saw_empty_block => (Some(QuarterlyPayload::default()), QuarterlyOrigin::EmptyBlock),
            None => (None, QuarterlyOrigin::Unavailable),
        }
    }

    async fn fetch_live(
        &self,
        source: &dyn FinancialDataSource,
        company: &str,
    ) -> Result<QuarterlyPayload> {
        info!("Fetching live quarterly data for {}", company);
        let raw = source.fetch_quarterly(company).await?;
        build(raw)
    }

    async fn enter(&self, stage: PipelineStage) {
        info!("Pipeline stage: {}", stage);
        self.send_event(PipelineEvent::StageEntered { stage }).await;
    }

    async fn send_event(&self, event: PipelineEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event).await;
        }
    }
}

fn gather_sources(research: &Research) -> Vec<String> {
    let found = collect_sources(&research.texts());
    let listed: Vec<String> = research
        .block_carriers()
        .iter()
        .filter_map(|text| EmbeddedBlock::find(text))
        .flat_map(|block| block.sources())
        .collect();
    merge_sources(&found, &listed)
}

fn log_payload(sink: &mut dyn LogSink, payload: &QuarterlyPayload) {
    match serde_json::to_string_pretty(payload) {
        Ok(json) => sink.append("QUARTERLY PAYLOAD", &json),
        Err(e) => warn!("Could not serialize quarterly payload for the debug log: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_log::MemoryLogSink;
    use crate::ingestion::PayloadSource;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct ScriptedCrew {
        outputs: HashMap<AgentTask, String>,
        requests: Mutex<Vec<TaskRequest>>,
    }

    impl ScriptedCrew {
        fn new(outputs: &[(AgentTask, &str)]) -> Arc<Self> {
            Arc::new(Self {
                outputs: outputs
                    .iter()
                    .map(|(t, o)| (*t, o.to_string()))
                    .collect(),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CrewRunner for ScriptedCrew {
        async fn run(&self, request: &TaskRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request.clone());
            self.outputs
                .get(&request.task)
                .cloned()
                .ok_or_else(|| AnalysisError::DataFetch("model offline".to_string()))
        }
    }

    struct StaticSource(serde_json::Value);

    #[async_trait]
    impl FinancialDataSource for StaticSource {
        async fn fetch_quarterly(&self, _company: &str) -> Result<PayloadSource> {
            PayloadSource::from_json(self.0.clone())
        }
    }

    const REPORTING: &str = "## Executive Summary\nAcme delivered a solid quarter.\n--- End of Executive Summary ---\n## Recommendations\n- Keep monitoring margins closely\n--- End of Recommendations ---";

    fn full_crew(research_block: &str) -> Arc<ScriptedCrew> {
        let research = format!("Total Revenue Q2 2025: 82,000,000,000\n{}", research_block);
        ScriptedCrew::new(&[
            (AgentTask::WebSearch, "- Acme expanded into Asia (https://news.example.com/acme)"),
            (AgentTask::FinancialResearch, research.as_str()),
            (AgentTask::FinancialAnalysis, "- Margins improved by 2% in Q2 2025"),
            (AgentTask::Reporting, REPORTING),
        ])
    }

    #[tokio::test]
    async fn test_context_is_chained_between_tasks() {
        let crew = full_crew("");
        let analyzer = CompanyAnalyzer::new(crew.clone(), AnalyzerConfig::default());
        let outcome = analyzer.analyze_with_sink("Acme", &mut MemoryLogSink::new()).await;
        assert!(outcome.is_success());

        let requests = crew.requests.lock().unwrap();
        let tasks: Vec<AgentTask> = requests.iter().map(|r| r.task).collect();
        assert_eq!(
            tasks,
            vec![
                AgentTask::WebSearch,
                AgentTask::FinancialResearch,
                AgentTask::FinancialAnalysis,
                AgentTask::Reporting
            ]
        );
        assert!(requests[1].description.contains("Acme expanded into Asia"));
        assert!(requests[2]
            .description
            .contains("Sources available from prior tasks:\n- https://news.example.com/acme"));
        assert_eq!(requests[3].context.sources, vec!["https://news.example.com/acme"]);
    }

    #[tokio::test]
    async fn test_analysis_block_overrides_research_block() {
        let crew = ScriptedCrew::new(&[
            (AgentTask::WebSearch, "nothing"),
            (
                AgentTask::FinancialResearch,
                "=== QUARTERLY DATA (returned) ===\n{\"quarters\": [{\"quarter\": \"Q1 2025\", \"revenue\": 1}, {\"quarter\": \"Q2 2025\", \"revenue\": 2}]}\n=== END ===",
            ),
            (
                AgentTask::FinancialAnalysis,
                "=== QUARTERLY DATA (returned) ===\n{\"quarters\": [{\"quarter\": \"Q2 2025\", \"revenue\": 3}]}\n=== END ===",
            ),
            (AgentTask::Reporting, REPORTING),
        ]);
        let source = Arc::new(StaticSource(json!({"Total Revenue": {"Q1 2025": 99}})));
        let analyzer =
            CompanyAnalyzer::new(crew, AnalyzerConfig::default()).with_data_source(source);
        let outcome = analyzer.analyze_with_sink("Acme", &mut MemoryLogSink::new()).await;

        assert_eq!(outcome.quarterly_origin, QuarterlyOrigin::Embedded);
        let quarters = outcome.quarterly.unwrap().quarters;
        assert_eq!(quarters.len(), 2);
        assert_eq!(quarters[0].revenue, Some(1));
        assert_eq!(quarters[1].revenue, Some(3));
    }

    #[tokio::test]
    async fn test_always_fetch_live_merges_under_embedded() {
        let crew = full_crew(
            "=== QUARTERLY DATA (returned) ===\n{\"quarters\": [{\"quarter\": \"Q2 2025\", \"revenue\": 82000000000}]}\n=== END ===",
        );
        let source = Arc::new(StaticSource(json!({
            "quarterly_financials": {"Total Revenue": {"Q1 2025": 80, "Q2 2025": 81}}
        })));
        let config = AnalyzerConfig {
            always_fetch_live: true,
            ..Default::default()
        };
        let analyzer = CompanyAnalyzer::new(crew, config).with_data_source(source);
        let outcome = analyzer.analyze_with_sink("Acme", &mut MemoryLogSink::new()).await;

        assert_eq!(outcome.quarterly_origin, QuarterlyOrigin::Merged);
        let payload = outcome.quarterly.unwrap();
        assert_eq!(payload.quarters.len(), 2);
        assert_eq!(payload.quarters[0].revenue, Some(80));
        assert_eq!(payload.quarters[1].revenue, Some(82_000_000_000));
    }

    #[tokio::test]
    async fn test_reporting_without_markers_becomes_summary() {
        let crew = ScriptedCrew::new(&[
            (AgentTask::WebSearch, "Plain prose without numbers."),
            (AgentTask::FinancialResearch, "More prose."),
            (AgentTask::FinancialAnalysis, "Even more prose."),
            (AgentTask::Reporting, "Acme is a steady company with a loyal customer base."),
        ]);
        let analyzer = CompanyAnalyzer::new(crew, AnalyzerConfig::default());
        let outcome = analyzer.analyze_with_sink("Acme", &mut MemoryLogSink::new()).await;

        let summary = outcome.report.section(ReportSection::ExecutiveSummary).unwrap();
        assert!(summary.contains("loyal customer base"));
        assert!(outcome.report.section(ReportSection::KeyResearchInsights).is_none());
        assert_eq!(outcome.quarterly, None);
        assert_eq!(outcome.quarterly_origin, QuarterlyOrigin::Unavailable);
    }

    #[tokio::test]
    async fn test_highlights_come_from_each_research_output() {
        let analyzer = CompanyAnalyzer::new(full_crew(""), AnalyzerConfig::default());
        let outcome = analyzer.analyze_with_sink("Acme", &mut MemoryLogSink::new()).await;

        let highlights = outcome
            .report
            .section(ReportSection::FinancialAnalysisHighlights)
            .unwrap();
        assert!(highlights.contains("- Total Revenue Q2 2025: 82000000000"));
        assert!(highlights.contains("- Margins improved by 2% in Q2 2025"));
    }

    #[tokio::test]
    async fn test_marker_names_match_any_case() {
        let crew = ScriptedCrew::new(&[
            (AgentTask::WebSearch, "Plain prose without numbers."),
            (AgentTask::FinancialResearch, "More prose."),
            (AgentTask::FinancialAnalysis, "Even more prose."),
            (
                AgentTask::Reporting,
                "## Executive Summary\nAcme had a calm quarter.\n--- End of executive summary ---\n\
                 ## Recommendations\n- Hold the position for now\n--- END OF RECOMMENDATIONS ---",
            ),
        ]);
        let analyzer = CompanyAnalyzer::new(crew, AnalyzerConfig::default());
        let outcome = analyzer.analyze_with_sink("Acme", &mut MemoryLogSink::new()).await;

        let summary = outcome.report.section(ReportSection::ExecutiveSummary).unwrap();
        assert!(summary.contains("Acme had a calm quarter."));
        assert!(!summary.contains("Recommendations"));
        let recommendations = outcome.report.section(ReportSection::Recommendations).unwrap();
        assert!(recommendations.contains("- Hold the position for now"));
    }

    #[tokio::test]
    async fn test_reporting_failure_is_contained() {
        let crew = ScriptedCrew::new(&[
            (AgentTask::WebSearch, "- Acme expanded into Asia"),
            (AgentTask::FinancialResearch, "data"),
            (AgentTask::FinancialAnalysis, "analysis"),
        ]);
        let mut sink = MemoryLogSink::new();
        let analyzer = CompanyAnalyzer::new(crew, AnalyzerConfig::default());
        let outcome = analyzer.analyze_with_sink("Acme", &mut sink).await;

        assert_eq!(outcome.stage, PipelineStage::Failed);
        assert_eq!(
            outcome.report.text,
            "Error analyzing Acme: Agent task 'reporting' failed: Financial data fetch failed: model offline"
        );
        assert!(outcome.sources.is_empty());
        assert!(outcome.quarterly.is_none());
        assert!(sink.get("ERROR").is_some());
    }

    #[tokio::test]
    async fn test_progress_events_follow_stages() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(64);
        let analyzer = CompanyAnalyzer::new(full_crew(""), AnalyzerConfig::default()).with_progress(tx);
        analyzer.analyze_with_sink("Acme", &mut MemoryLogSink::new()).await;
        drop(analyzer);

        let mut stages = Vec::new();
        let mut last = None;
        while let Some(event) = rx.recv().await {
            if let PipelineEvent::StageEntered { stage } = &event {
                stages.push(*stage);
            }
            last = Some(event);
        }
        assert_eq!(
            stages,
            vec![
                PipelineStage::Init,
                PipelineStage::ResearchRun,
                PipelineStage::SourceCollection,
                PipelineStage::BulletExtraction,
                PipelineStage::ReportingRun,
                PipelineStage::SectionAssembly,
                PipelineStage::QuarterlyResolution,
                PipelineStage::Done,
            ]
        );
        assert!(matches!(last, Some(PipelineEvent::Finished)));
    }
}
