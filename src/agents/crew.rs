//! The agent tasks of an analysis run and the seams to the outside world.
//!
//! A [`CrewRunner`] executes one task description and returns the agent's
//! final text. A [`FinancialDataSource`] fetches live quarterly tables. Both
//! are implemented by the host application; the driver only sequences them.

use crate::agents::prompts;
use crate::error::Result;
use crate::ingestion::PayloadSource;
use crate::schema::QuarterlyPayload;
use crate::sections::ReportSection;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentTask {
    WebSearch,
    FinancialResearch,
    FinancialAnalysis,
    Reporting,
}

impl AgentTask {
    /// The research crew, in execution order.
    pub const RESEARCH: [AgentTask; 3] = [
        AgentTask::WebSearch,
        AgentTask::FinancialResearch,
        AgentTask::FinancialAnalysis,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::WebSearch => "web_search",
            Self::FinancialResearch => "financial_research",
            Self::FinancialAnalysis => "financial_analysis",
            Self::Reporting => "reporting",
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::WebSearch => "Senior Web Researcher",
            Self::FinancialResearch => "Financial Data Collector",
            Self::FinancialAnalysis => "Senior Financial Analyst",
            Self::Reporting => "Financial Report Writer",
        }
    }

    /// Tasks asked to append an embedded quarterly data block.
    pub fn embeds_quarterly_data(&self) -> bool {
        matches!(self, Self::FinancialResearch | Self::FinancialAnalysis)
    }

    fn prompts(&self) -> (&'static str, &'static str) {
        match self {
            Self::WebSearch => (prompts::WEB_SEARCH_TASK, prompts::WEB_SEARCH_OUTPUT),
            Self::FinancialResearch => (
                prompts::FINANCIAL_RESEARCH_TASK,
                prompts::FINANCIAL_RESEARCH_OUTPUT,
            ),
            Self::FinancialAnalysis => (
                prompts::FINANCIAL_ANALYSIS_TASK,
                prompts::FINANCIAL_ANALYSIS_OUTPUT,
            ),
            Self::Reporting => (prompts::REPORTING_TASK, prompts::REPORTING_OUTPUT),
        }
    }
}

impl fmt::Display for AgentTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What earlier tasks of the run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskContext {
    pub prior_outputs: Vec<(AgentTask, String)>,
    pub sources: Vec<String>,
    /// Bullets already pulled out of the research, per report section.
    pub extracted: Vec<(ReportSection, Vec<String>)>,
}

impl TaskContext {
    pub fn push_output(&mut self, task: AgentTask, output: impl Into<String>) {
        self.prior_outputs.push((task, output.into()));
    }

    pub fn output(&self, task: AgentTask) -> Option<&str> {
        self.prior_outputs
            .iter()
            .find(|(t, _)| *t == task)
            .map(|(_, out)| out.as_str())
    }

    /// Prior outputs, each labelled `Output from <role>:`.
    pub fn dependency_text(&self) -> String {
        self.prior_outputs
            .iter()
            .filter(|(_, out)| !out.trim().is_empty())
            .map(|(task, out)| format!("Output from {}:\n{}", task.role(), out.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn sources_text(&self) -> Option<String> {
        if self.sources.is_empty() {
            return None;
        }
        let list: Vec<String> = self.sources.iter().map(|s| format!("- {}", s)).collect();
        Some(format!(
            "Sources available from prior tasks:\n{}",
            list.join("\n")
        ))
    }
}

/// One task handed to a [`CrewRunner`].
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    pub task: AgentTask,
    pub company: String,
    pub description: String,
    pub expected_output: String,
    pub context: TaskContext,
}

impl TaskRequest {
    pub fn new(task: AgentTask, company: &str, context: TaskContext) -> Self {
        let (task_prompt, output_prompt) = task.prompts();
        let mut parts = vec![task_prompt.trim().replace("{company}", company)];

        if let Some(sources) = context.sources_text() {
            parts.push(format!("---\n{}\n---", sources));
        }
        let dependencies = context.dependency_text();
        if !dependencies.is_empty() {
            parts.push(format!(
                "Use the following information gathered from previous tasks as input:\n\n{}",
                dependencies
            ));
        }
        for (section, bullets) in &context.extracted {
            if !bullets.is_empty() {
                parts.push(format!("{} already extracted:\n{}", section, bullets.join("\n")));
            }
        }
        if task.embeds_quarterly_data() {
            parts.push(embedded_block_instructions());
        }

        Self {
            task,
            company: company.to_string(),
            description: parts.join("\n\n"),
            expected_output: output_prompt.trim().replace("{company}", company),
            context,
        }
    }
}

/// Format instructions for the embedded quarterly block, with the payload
/// JSON schema appended.
pub fn embedded_block_instructions() -> String {
    let schema = QuarterlyPayload::schema_as_json().unwrap_or_default();
    format!("{}\n{}", prompts::EMBEDDED_BLOCK_FORMAT.trim(), schema)
}

/// Runs a single agent task to completion and returns the agent's final text.
#[async_trait]
pub trait CrewRunner: Send + Sync {
    async fn run(&self, request: &TaskRequest) -> Result<String>;
}

/// Live quarterly financials for a company, in whatever shape the vendor
/// returns them.
#[async_trait]
pub trait FinancialDataSource: Send + Sync {
    async fn fetch_quarterly(&self, company: &str) -> Result<PayloadSource>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_text_labels_roles() {
        let mut context = TaskContext::default();
        context.push_output(AgentTask::WebSearch, "Web search results about Ericsson.");
        context.push_output(AgentTask::FinancialResearch, "   ");
        context.push_output(AgentTask::FinancialAnalysis, "Margins look healthy.");

        assert_eq!(
            context.dependency_text(),
            "Output from Senior Web Researcher:\nWeb search results about Ericsson.\n\nOutput from Senior Financial Analyst:\nMargins look healthy."
        );
        assert_eq!(context.output(AgentTask::FinancialAnalysis), Some("Margins look healthy."));
        assert_eq!(context.output(AgentTask::Reporting), None);
    }

    #[test]
    fn test_first_task_has_no_context() {
        let request = TaskRequest::new(AgentTask::WebSearch, "Ericsson", TaskContext::default());
        assert!(request.description.contains("Ericsson"));
        assert!(!request.description.contains("Output from"));
        assert!(!request.description.contains("QUARTERLY DATA"));
        assert!(request.expected_output.contains("Ericsson"));
    }

    #[test]
    fn test_research_tasks_ask_for_embedded_block() {
        let request =
            TaskRequest::new(AgentTask::FinancialResearch, "Ericsson", TaskContext::default());
        assert!(request.description.contains("=== QUARTERLY DATA (returned) ==="));
        assert!(request.description.contains("=== END ==="));
        assert!(request.description.contains("quarterly_financials"));
    }

    #[test]
    fn test_reporting_request_lists_sources_and_bullets() {
        let context = TaskContext {
            prior_outputs: vec![(AgentTask::WebSearch, "Web search results".to_string())],
            sources: vec![
                "https://example.com/web".to_string(),
                "https://example.com/finance".to_string(),
            ],
            extracted: vec![(
                ReportSection::KeyResearchInsights,
                vec!["- Market share rose to 31%".to_string()],
            )],
        };
        let request = TaskRequest::new(AgentTask::Reporting, "Ericsson", context);
        let text = &request.description;
        assert!(text.contains("Sources available from prior tasks:\n- https://example.com/web\n- https://example.com/finance"));
        assert!(text.contains("Output from Senior Web Researcher:\nWeb search results"));
        assert!(text.contains("Key Research Insights already extracted:\n- Market share rose to 31%"));
        assert!(request.expected_output.contains("--- End of Financial Analysis ---"));
        assert!(!text.contains("QUARTERLY DATA"));
    }
}
