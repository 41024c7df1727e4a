use async_trait::async_trait;
use company_analyzer::*;
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Duration;

/// A search provider that never answers in time.
struct StalledSearch;

#[async_trait]
impl SearchProvider for StalledSearch {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn search(&self, _query: &str) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(String::new())
    }
}

/// Canned headlines standing in for a real search backend.
struct OfflineIndex;

#[async_trait]
impl SearchProvider for OfflineIndex {
    fn name(&self) -> &str {
        "offline_index"
    }

    async fn search(&self, query: &str) -> Result<String> {
        Ok(format!(
            "- {query}: Q2 2025 net sales rose 5% to SEK 56,100,000,000 (https://news.example.com/q2-2025)\n\
             - {query} signed a 5G network deal with a major European operator (https://press.example.com/5g-deal)\n\
             - Source: https://news.example.com/q2-2025"
        ))
    }
}

/// Plays every agent with fixed text so the pipeline can run offline.
struct DemoCrew {
    search: FallbackSearch,
}

#[async_trait]
impl CrewRunner for DemoCrew {
    async fn run(&self, request: &TaskRequest) -> Result<String> {
        let company = &request.company;
        let output = match request.task {
            AgentTask::WebSearch => self.search.run(company).await,
            AgentTask::FinancialResearch => format!(
                "{company} reported Total Revenue Q2 2025: 56,100,000,000 and Q1 2025: 55,000,000,000.\n\
                 - Net income for Q2 2025 was SEK 4,200,000,000\n\n\
                 === QUARTERLY DATA (returned) ===\n\
                 {{\"quarterly_financials\": {{\"Total Revenue\": {{\"Q1 2025\": 55000000000, \"Q2 2025\": 56100000000}}, \"Net Income\": {{\"Q2 2025\": 4200000000}}}},\n\
                  \"sources\": [\"https://ir.example.com/q2-2025-report.pdf\"]}}\n\
                 === END ==="
            ),
            AgentTask::FinancialAnalysis => "Key points:\n\
                 - Gross margin improved to 47.4% in Q2 2025\n\
                 - Free cash flow stayed positive for the fourth straight quarter\n\
                 === QUARTERLY DATA (returned) ===\nOK\n=== END ==="
                .to_string(),
            AgentTask::Reporting => format!(
                "## Executive Summary\n\
                 {company} grew net sales by 5% while improving margins.\n\
                 --- End of Executive Summary ---\n\n\
                 ## Recommendations\n\
                 * Track the 5G rollout pace in Europe\n\
                 * Watch currency effects on reported SEK figures\n\
                 --- End of Recommendations ---"
            ),
        };
        Ok(output)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let company = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Ericsson".to_string());

    let config = AnalyzerConfig::from_env()?;
    let search = FallbackSearch::new(
        Arc::new(StalledSearch),
        Arc::new(OfflineIndex),
        Duration::from_millis(200),
    );
    let crew = Arc::new(DemoCrew { search });

    let (tx, mut rx) = tokio::sync::mpsc::channel(32);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                PipelineEvent::StageEntered { stage } => println!("▶ {}", stage),
                PipelineEvent::TaskCompleted { task, output_chars } => {
                    println!("  ✅ {} ({} chars)", task, output_chars)
                }
                PipelineEvent::SourcesCollected { count } => println!("  🔗 {} sources", count),
                PipelineEvent::QuarterlyResolved { origin, quarters } => {
                    println!("  📊 {} quarters ({:?})", quarters, origin)
                }
                PipelineEvent::Failed { reason } => println!("❌ {}", reason),
                PipelineEvent::Finished => println!("🏁 finished"),
            }
        }
    });

    let analyzer = CompanyAnalyzer::new(crew, config).with_progress(tx);
    let outcome = analyzer.analyze(&company).await;
    drop(analyzer);
    printer.await?;

    println!("\n{}", outcome.report.text);

    if let Some(payload) = &outcome.quarterly {
        if let Some(summary) = QuarterlySummary::from_payload(&company, payload, 4) {
            println!("{}", summary.to_markdown());
        }
        if let Some(yoy) = year_over_year(payload) {
            println!("Year over year: {} vs {}", yoy.latest, yoy.year_ago);
        }
    }

    let path = outcome.report.write_to(std::env::temp_dir())?;
    println!("📄 Report written to {}", path.display());

    Ok(())
}
