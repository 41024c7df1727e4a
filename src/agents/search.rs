//! Web search used as an agent tool.
//!
//! [`FallbackSearch`] runs the primary provider on a background task and waits
//! for it with a deadline. On timeout or error the secondary provider is asked
//! instead; when both fail the tool answers with [`SEARCH_FAILED_MESSAGE`].

use crate::error::{AnalysisError, Result};
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

pub const SEARCH_FAILED_MESSAGE: &str = "Search failed with both primary and fallback providers.";

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str) -> Result<String>;
}

pub struct FallbackSearch {
    primary: Arc<dyn SearchProvider>,
    secondary: Arc<dyn SearchProvider>,
    deadline: Duration,
}

impl FallbackSearch {
    pub fn new(
        primary: Arc<dyn SearchProvider>,
        secondary: Arc<dyn SearchProvider>,
        deadline: Duration,
    ) -> Self {
        Self {
            primary,
            secondary,
            deadline,
        }
    }

    /// Never fails; the failure message is returned as the tool result.
    pub async fn run(&self, query: &str) -> String {
        match self.try_primary(query).await {
            Ok(results) => return results,
            Err(e) => warn!(
                "Primary search '{}' failed, falling back to '{}': {}",
                self.primary.name(),
                self.secondary.name(),
                e
            ),
        }
        match self.secondary.search(query).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Fallback search '{}' failed: {}", self.secondary.name(), e);
                SEARCH_FAILED_MESSAGE.to_string()
            }
        }
    }

    async fn try_primary(&self, query: &str) -> Result<String> {
        let provider = Arc::clone(&self.primary);
        let owned_query = query.to_string();
        let mut handle = tokio::spawn(async move { provider.search(&owned_query).await });

        match timeout(self.deadline, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(AnalysisError::Search(format!(
                "search task aborted: {}",
                join_error
            ))),
            Err(_) => {
                handle.abort();
                debug!(
                    "Primary search '{}' exceeded {:?}",
                    self.primary.name(),
                    self.deadline
                );
                Err(AnalysisError::Search(format!(
                    "timed out after {:?}",
                    self.deadline
                )))
            }
        }
    }
}

#[async_trait]
impl SearchProvider for FallbackSearch {
    fn name(&self) -> &str {
        "fallback_search"
    }

    async fn search(&self, query: &str) -> Result<String> {
        Ok(self.run(query).await)
    }
}

#[cfg(feature = "web")]
pub use web::{default_web_search, DuckDuckGoSearch, SerpApiSearch};

#[cfg(feature = "web")]
mod web {
    use super::{FallbackSearch, SearchProvider};
    use crate::config::AnalyzerConfig;
    use crate::error::{AnalysisError, Result};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;

    const SERPAPI_URL: &str = "https://serpapi.com/search.json";
    const DUCKDUCKGO_URL: &str = "https://api.duckduckgo.com/";
    const MAX_RESULTS: usize = 8;

    pub struct SerpApiSearch {
        client: reqwest::Client,
        api_key: Option<String>,
    }

    impl SerpApiSearch {
        pub fn new(api_key: Option<String>) -> Self {
            Self {
                client: reqwest::Client::new(),
                api_key,
            }
        }
    }

    #[async_trait]
    impl SearchProvider for SerpApiSearch {
        fn name(&self) -> &str {
            "serpapi"
        }

        async fn search(&self, query: &str) -> Result<String> {
            let key = self
                .api_key
                .as_deref()
                .ok_or_else(|| AnalysisError::Search("SERPAPI_API_KEY is not set".to_string()))?;
            let body: Value = self
                .client
                .get(SERPAPI_URL)
                .query(&[("engine", "google"), ("q", query), ("api_key", key)])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            format_serpapi(&body)
        }
    }

    pub struct DuckDuckGoSearch {
        client: reqwest::Client,
    }

    impl DuckDuckGoSearch {
        pub fn new() -> Self {
            Self {
                client: reqwest::Client::new(),
            }
        }
    }

    impl Default for DuckDuckGoSearch {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl SearchProvider for DuckDuckGoSearch {
        fn name(&self) -> &str {
            "duckduckgo"
        }

        async fn search(&self, query: &str) -> Result<String> {
            let body: Value = self
                .client
                .get(DUCKDUCKGO_URL)
                .query(&[("q", query), ("format", "json"), ("no_html", "1")])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            format_duckduckgo(&body)
        }
    }

    /// SerpAPI first, DuckDuckGo on timeout or error.
    pub fn default_web_search(config: &AnalyzerConfig) -> FallbackSearch {
        FallbackSearch::new(
            Arc::new(SerpApiSearch::new(config.serpapi_api_key.clone())),
            Arc::new(DuckDuckGoSearch::new()),
            config.search_timeout(),
        )
    }

    fn result_line(title: &str, snippet: &str, url: &str) -> String {
        match (snippet.is_empty(), url.is_empty()) {
            (false, false) => format!("- {}: {} ({})", title, snippet, url),
            (false, true) => format!("- {}: {}", title, snippet),
            (true, false) => format!("- {} ({})", title, url),
            (true, true) => format!("- {}", title),
        }
    }

    fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
        value.get(key).and_then(Value::as_str).unwrap_or("").trim()
    }

    pub(super) fn format_serpapi(body: &Value) -> Result<String> {
        if let Some(error) = body.get("error").and_then(Value::as_str) {
            return Err(AnalysisError::Search(error.to_string()));
        }
        let lines: Vec<String> = body
            .get("organic_results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .take(MAX_RESULTS)
                    .map(|r| {
                        result_line(
                            str_field(r, "title"),
                            str_field(r, "snippet"),
                            str_field(r, "link"),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        if lines.is_empty() {
            return Err(AnalysisError::Search("no organic results".to_string()));
        }
        Ok(lines.join("\n"))
    }

    pub(super) fn format_duckduckgo(body: &Value) -> Result<String> {
        let mut lines = Vec::new();
        let abstract_text = str_field(body, "AbstractText");
        if !abstract_text.is_empty() {
            lines.push(result_line(
                str_field(body, "Heading"),
                abstract_text,
                str_field(body, "AbstractURL"),
            ));
        }
        if let Some(topics) = body.get("RelatedTopics").and_then(Value::as_array) {
            for topic in topics.iter().filter(|t| t.get("Text").is_some()) {
                if lines.len() >= MAX_RESULTS {
                    break;
                }
                lines.push(result_line(
                    str_field(topic, "Text"),
                    "",
                    str_field(topic, "FirstURL"),
                ));
            }
        }
        if lines.is_empty() {
            return Err(AnalysisError::Search("no results".to_string()));
        }
        Ok(lines.join("\n"))
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        name: &'static str,
        delay: Duration,
        answer: Option<&'static str>,
        calls: AtomicUsize,
        finished: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &'static str, delay_ms: u64, answer: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                name,
                delay: Duration::from_millis(delay_ms),
                answer,
                calls: AtomicUsize::new(0),
                finished: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SearchProvider for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(&self, _query: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            self.answer
                .map(str::to_string)
                .ok_or_else(|| AnalysisError::Search(format!("{} unavailable", self.name)))
        }
    }

    #[tokio::test]
    async fn test_primary_answer_is_used() {
        let primary = Scripted::new("primary", 0, Some("primary results"));
        let secondary = Scripted::new("secondary", 0, Some("secondary results"));
        let search = FallbackSearch::new(primary, secondary.clone(), Duration::from_millis(200));
        assert_eq!(search.run("acme").await, "primary results");
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_slow_primary_falls_back() {
        let primary = Scripted::new("primary", 2_000, Some("too late"));
        let secondary = Scripted::new("secondary", 0, Some("secondary results"));
        let search = FallbackSearch::new(primary, secondary, Duration::from_millis(50));
        assert_eq!(search.run("acme").await, "secondary results");
    }

    #[tokio::test]
    async fn test_timed_out_primary_is_aborted() {
        let primary = Scripted::new("primary", 150, Some("too late"));
        let secondary = Scripted::new("secondary", 0, Some("secondary results"));
        let search = FallbackSearch::new(primary.clone(), secondary, Duration::from_millis(20));
        assert_eq!(search.run("acme").await, "secondary results");

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(primary.finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failing_primary_falls_back() {
        let primary = Scripted::new("primary", 0, None);
        let secondary = Scripted::new("secondary", 0, Some("secondary results"));
        let search = FallbackSearch::new(primary, secondary, Duration::from_millis(200));
        assert_eq!(search.search("acme").await.unwrap(), "secondary results");
    }

    #[tokio::test]
    async fn test_both_failing_returns_message() {
        let primary = Scripted::new("primary", 0, None);
        let secondary = Scripted::new("secondary", 0, None);
        let search = FallbackSearch::new(primary, secondary, Duration::from_millis(200));
        assert_eq!(search.run("acme").await, SEARCH_FAILED_MESSAGE);
    }
}
