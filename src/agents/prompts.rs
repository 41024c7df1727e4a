// Task prompts for the research and reporting crews. `{company}` is replaced
// before the prompt is sent.

pub const WEB_SEARCH_TASK: &str = r#"
Conduct thorough online research on {company}. Prefer reliable sources such as
news articles, press releases, regulatory filings and analyst commentary.
Extract distinct, fact-based insights that can inform a financial and business
analysis of the company.
"#;

pub const WEB_SEARCH_OUTPUT: &str = r#"
A bullet list of at least 5 distinct, verifiable insights about {company}. Each
bullet starts with "- " and ends with its source URL and publication date.
"#;

pub const FINANCIAL_RESEARCH_TASK: &str = r#"
Collect the most recent financial data available for {company}. Extract the key
metrics from the latest quarterly or annual report, and retrieve comparable
figures for the past one to two years: revenue, net income, EBITDA, cash flow,
debt levels, market capitalization and management commentary on performance.
"#;

pub const FINANCIAL_RESEARCH_OUTPUT: &str = r#"
A fact-based summary of {company}'s latest financial metrics with clear labels
and source references, paying attention to changes over time.
"#;

pub const FINANCIAL_ANALYSIS_TASK: &str = r#"
Analyze the financial data gathered for {company}. Identify performance, key
trends, strengths, weaknesses, opportunities and risks. Consider profitability,
liquidity, leverage, growth and market positioning.
"#;

pub const FINANCIAL_ANALYSIS_OUTPUT: &str = r#"
A concise financial analysis of {company} with at least 3 major insights as
bullets and any potential red flags.
"#;

pub const REPORTING_TASK: &str = r#"
Compile the research and financial analysis of {company} into a well-structured,
business-friendly report that synthesizes key insights, financial performance
and strategic recommendations.
"#;

pub const REPORTING_OUTPUT: &str = r#"
A professional business report for {company}. Write each section below and close
it with its end marker on a line of its own, exactly as shown:

## Executive Summary
...
--- End of Executive Summary ---

## Key Research Insights
- ...
--- End of Key Research Insights ---

## Financial Analysis Highlights
- ...
--- End of Financial Analysis ---

## Recommendations
- ...
--- End of Recommendations ---

Use plain integers for amounts (82000000000, not 82,000,000,000).
"#;

pub const EMBEDDED_BLOCK_FORMAT: &str = r#"
## QUARTERLY DATA
At the very end of your answer, append the quarterly figures you found as JSON
between these two marker lines:

=== QUARTERLY DATA (returned) ===
{"quarterly_financials": {"Total Revenue": {"Q2 2025": 82000000000}}, "quarters": [{"quarter": "Q2 2025", "revenue": 82000000000}], "sources": ["https://..."]}
=== END ===

Rules:
- Quarter labels use the form "Q<1-4> <YYYY>".
- Values are plain integers without separators or currency symbols.
- If you found no quarterly figures, put the single word OK between the markers.

The JSON must match this schema:
"#;
