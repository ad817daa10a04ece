//! Chunked LLM analysis
//!
//! Splits line-oriented data into chunks, asks the LLM about each one
//! (sequentially or under a concurrency bound), drops uninformative answers
//! and synthesises the survivors into one report.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use triage_core::domain::task::ReportMetadata;
use triage_llm::{ChatClient, ChatRequest, OpenAiClient};

use super::prompts::{self, NONE_SENTINEL};
use super::{Analyzer, ProgressReporter};
use crate::chunk::chunk_text;
use crate::params::Params;
use crate::source::Collected;

/// Results shorter than this are treated as boilerplate
pub const MIN_FINDING_LEN: usize = 50;

/// Extra time granted on top of the client timeout before a call is abandoned
pub const TIMEOUT_GUARD: Duration = Duration::from_secs(5);

/// Separator between per-chunk findings
const FINDINGS_SEPARATOR: &str = "\n\n---\n\n";

/// Phrases marking a result as "nothing found"
const NO_ISSUE_PHRASES: &[&str] = &["no errors found", "no issues found", "no errors detected"];

/// Report returned when no chunk produced a finding
pub const NO_ERRORS_REPORT: &str = "## Analysis Result\n\n✅ **No errors detected**\n\nNo errors, exceptions or warnings were found in the analyzed logs.";

/// How chunks are dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    Sequential,
    Concurrent,
}

impl AnalysisMode {
    fn parse(raw: &str) -> Self {
        match raw {
            "sequential" => AnalysisMode::Sequential,
            _ => AnalysisMode::Concurrent,
        }
    }
}

/// Tuning for [`ChunkedAnalyzer`]
#[derive(Debug, Clone)]
pub struct ChunkedSettings {
    pub mode: AnalysisMode,
    /// Upper bound on in-flight chunk requests (at least 1)
    pub concurrency: usize,
    /// Byte budget per chunk
    pub chunk_size: usize,
    /// Client-side request timeout
    pub timeout: Duration,
    pub temperature: f32,
    pub chunk_prompt: String,
    pub summary_prompt: String,
}

impl Default for ChunkedSettings {
    fn default() -> Self {
        Self {
            mode: AnalysisMode::Concurrent,
            concurrency: 3,
            chunk_size: 5000,
            timeout: Duration::from_secs(60),
            temperature: 0.3,
            chunk_prompt: prompts::CHUNK_PROMPT.to_string(),
            summary_prompt: prompts::SUMMARY_PROMPT.to_string(),
        }
    }
}

impl ChunkedSettings {
    /// Reads settings from analyzer parameters, falling back to defaults
    pub fn from_params(params: &Map<String, Value>) -> Self {
        let p = Params::new(params);
        let defaults = Self::default();
        let prompts = p.object("prompts");
        let prompt = |keys: &[&str]| {
            prompts.and_then(|pr| keys.iter().find_map(|k| pr.string(k)))
        };

        Self {
            mode: p
                .string("mode")
                .map(|m| AnalysisMode::parse(&m))
                .unwrap_or(defaults.mode),
            concurrency: p
                .u64("concurrency")
                .map(|n| n.max(1) as usize)
                .unwrap_or(defaults.concurrency),
            chunk_size: p
                .u64("chunk_size")
                .map(|n| n.max(1) as usize)
                .unwrap_or(defaults.chunk_size),
            timeout: p
                .u64("timeout")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            temperature: p
                .f64("temperature")
                .map(|t| t as f32)
                .unwrap_or(defaults.temperature),
            chunk_prompt: prompt(&["analyze_chunk", "analyze_log_chunk"])
                .unwrap_or(defaults.chunk_prompt),
            summary_prompt: prompt(&["summarize", "summarize_analyses"])
                .unwrap_or(defaults.summary_prompt),
        }
    }

    fn chunk_request(&self, chunk: &str) -> ChatRequest {
        let prompt = prompts::render(
            &self.chunk_prompt,
            &[("{chunk}", chunk), ("{log_chunk}", chunk)],
        );
        ChatRequest::new(prompts::CHUNK_SYSTEM, prompt).with_temperature(self.temperature)
    }

    fn summary_request(&self, findings: &str) -> ChatRequest {
        let prompt = prompts::render(&self.summary_prompt, &[("{analyses}", findings)]);
        ChatRequest::new(prompts::SUMMARY_SYSTEM, prompt).with_temperature(self.temperature)
    }
}

/// Analyzer for large line-oriented inputs such as container logs
pub struct ChunkedAnalyzer {
    client: Arc<dyn ChatClient>,
    settings: Arc<ChunkedSettings>,
    metadata: Option<ReportMetadata>,
}

impl ChunkedAnalyzer {
    /// Builds the analyzer and its OpenAI-compatible client from parameters
    ///
    /// Requires `base_url`, `api_key` and `model_name`.
    pub fn from_params(params: &Map<String, Value>) -> anyhow::Result<Self> {
        let p = Params::new(params);
        let settings = ChunkedSettings::from_params(params);
        let client = OpenAiClient::with_timeout(
            p.require("base_url")?,
            p.string_or("api_key", ""),
            p.require("model_name")?,
            settings.timeout,
        )
        .context("Failed to create LLM client")?;
        Ok(Self::with_client(Arc::new(client), settings))
    }

    /// Creates the analyzer around an existing chat client
    pub fn with_client(client: Arc<dyn ChatClient>, settings: ChunkedSettings) -> Self {
        Self {
            client,
            settings: Arc::new(settings),
            metadata: None,
        }
    }

    pub fn settings(&self) -> &ChunkedSettings {
        &self.settings
    }

    /// Runs the full chunk, filter, synthesise pipeline over `text`
    async fn analyze_text(&self, text: &str, progress: Arc<dyn ProgressReporter>) -> String {
        if text.trim().is_empty() {
            info!("Nothing to analyze, returning empty-input report");
            return NO_ERRORS_REPORT.to_string();
        }

        let chunks = chunk_text(text, self.settings.chunk_size);
        let total = chunks.len();
        info!(
            "Analyzing {} bytes in {} chunk(s) ({:?} mode)",
            text.len(),
            total,
            self.settings.mode
        );
        progress.report(total, 0);

        let results = match self.settings.mode {
            AnalysisMode::Sequential => self.analyze_sequential(chunks, progress).await,
            AnalysisMode::Concurrent => self.analyze_concurrent(chunks, progress).await,
        };

        let findings = filter_findings(results);
        debug!("{} of {} chunk result(s) survived filtering", findings.len(), total);

        match findings.len() {
            0 => NO_ERRORS_REPORT.to_string(),
            1 => findings.into_iter().next().unwrap_or_default(),
            _ => self.synthesize(findings).await,
        }
    }

    async fn analyze_sequential(
        &self,
        chunks: Vec<String>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Vec<String> {
        let total = chunks.len();
        let mut results = Vec::with_capacity(total);
        for (index, chunk) in chunks.iter().enumerate() {
            debug!("Analyzing chunk {}/{}", index + 1, total);
            results.push(analyze_chunk(&self.client, &self.settings, chunk).await);
            progress.report(total, index + 1);
        }
        results
    }

    /// Dispatches chunks under a semaphore sized to `concurrency`
    ///
    /// Results are returned in chunk order regardless of completion order.
    async fn analyze_concurrent(
        &self,
        chunks: Vec<String>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Vec<String> {
        let total = chunks.len();
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency));
        let processed = Arc::new(Mutex::new(0usize));
        let mut tasks = JoinSet::new();

        for (index, chunk) in chunks.into_iter().enumerate() {
            // Admission happens before spawning so at most `concurrency` tasks exist
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let client = Arc::clone(&self.client);
            let settings = Arc::clone(&self.settings);
            let processed = Arc::clone(&processed);
            let progress = Arc::clone(&progress);

            tasks.spawn(async move {
                debug!("Analyzing chunk {}/{}", index + 1, total);
                let result = analyze_chunk(&client, &settings, &chunk).await;
                drop(permit);

                let mut done = processed.lock().unwrap_or_else(PoisonError::into_inner);
                *done += 1;
                progress.report(total, *done);
                (index, result)
            });
        }

        let mut results: Vec<Option<String>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => error!("Chunk analysis task panicked: {}", e),
            }
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| "Analysis failed: chunk task aborted".to_string()))
            .collect()
    }

    /// Merges several findings with one more LLM call
    ///
    /// Falls back to the concatenated findings when the call fails.
    async fn synthesize(&self, findings: Vec<String>) -> String {
        let joined = findings.join(FINDINGS_SEPARATOR);
        info!("Synthesizing {} finding(s) into one report", findings.len());

        let request = self.settings.summary_request(&joined);
        let guard = self.settings.timeout + TIMEOUT_GUARD;
        match tokio::time::timeout(guard, self.client.chat(request)).await {
            Ok(Ok(summary)) => summary.trim().to_string(),
            Ok(Err(e)) => {
                warn!("Synthesis call failed ({}), returning raw findings", e);
                joined
            }
            Err(_) => {
                warn!("Synthesis call timed out after {:?}, returning raw findings", guard);
                joined
            }
        }
    }
}

#[async_trait]
impl Analyzer for ChunkedAnalyzer {
    fn set_metadata(&mut self, metadata: ReportMetadata) {
        self.metadata = Some(metadata);
    }

    fn metadata(&self) -> Option<&ReportMetadata> {
        self.metadata.as_ref()
    }

    async fn analyze(&self, data: Collected, progress: Arc<dyn ProgressReporter>) -> String {
        let text = match data {
            Collected::Structured(value) => {
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            }
            other => other.into_text().unwrap_or_default(),
        };
        self.analyze_text(&text, progress).await
    }
}

/// Asks about one chunk; failures become a placeholder result
async fn analyze_chunk(client: &Arc<dyn ChatClient>, settings: &ChunkedSettings, chunk: &str) -> String {
    let guard = settings.timeout + TIMEOUT_GUARD;
    match tokio::time::timeout(guard, client.chat(settings.chunk_request(chunk))).await {
        Ok(Ok(answer)) => answer.trim().to_string(),
        Ok(Err(e)) => {
            error!("Chunk analysis failed: {}", e);
            format!("Analysis failed: {}", e)
        }
        Err(_) => {
            error!("Chunk analysis timed out after {:?}", guard);
            format!("Analysis failed: timed out after {}s", guard.as_secs())
        }
    }
}

/// Whether a chunk result carries no useful finding
pub fn is_noise(result: &str) -> bool {
    let trimmed = result.trim();
    if trimmed.is_empty() || trimmed == NONE_SENTINEL {
        return true;
    }
    let lower = trimmed.to_lowercase();
    if NO_ISSUE_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
        return true;
    }
    trimmed.chars().count() < MIN_FINDING_LEN
}

/// Drops noise, keeping the remaining results in order
pub fn filter_findings(results: Vec<String>) -> Vec<String> {
    results.into_iter().filter(|r| !is_noise(r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingProgress, ScriptedClient};
    use triage_llm::LlmError;

    fn settings(mode: AnalysisMode, chunk_size: usize) -> ChunkedSettings {
        ChunkedSettings {
            mode,
            chunk_size,
            ..Default::default()
        }
    }

    fn finding(tag: &str) -> String {
        format!("{}: {}", tag, "x".repeat(200))
    }

    /// 120 lines of 99 bytes, 12000 bytes in total
    fn twelve_kb() -> String {
        let mut text = String::new();
        for i in 0..120 {
            text.push_str(&format!("{:03} {}\n", i, "e".repeat(95)));
        }
        text
    }

    #[test]
    fn test_noise_filter() {
        assert!(is_noise(""));
        assert!(is_noise("  <NONE>  "));
        assert!(is_noise("short finding"));
        assert!(is_noise(&format!("No errors found in this chunk. {}", "x".repeat(80))));
        assert!(is_noise(&format!("Result: no issues found {}", "x".repeat(80))));
        assert!(!is_noise(&finding("OOM")));
    }

    #[test]
    fn test_filter_is_idempotent() {
        let results = vec![
            "<NONE>".to_string(),
            finding("a"),
            "tiny".to_string(),
            finding("b"),
        ];
        let once = filter_findings(results);
        assert_eq!(once, vec![finding("a"), finding("b")]);
        assert_eq!(filter_findings(once.clone()), once);
    }

    #[test]
    fn test_settings_from_params() {
        let params = serde_json::json!({
            "mode": "sequential",
            "concurrency": 0,
            "chunk_size": "2000",
            "timeout": 30,
            "prompts": { "analyze_log_chunk": "Check {log_chunk}" }
        });
        let s = ChunkedSettings::from_params(params.as_object().unwrap());
        assert_eq!(s.mode, AnalysisMode::Sequential);
        assert_eq!(s.concurrency, 1);
        assert_eq!(s.chunk_size, 2000);
        assert_eq!(s.timeout, Duration::from_secs(30));
        assert_eq!(s.chunk_prompt, "Check {log_chunk}");
        assert_eq!(s.summary_prompt, prompts::SUMMARY_PROMPT);

        let request = s.chunk_request("LINE");
        assert_eq!(request.user_content(), "Check LINE");
    }

    #[test]
    fn test_from_params_requires_endpoint() {
        let params = serde_json::json!({ "model_name": "m" });
        assert!(ChunkedAnalyzer::from_params(params.as_object().unwrap()).is_err());

        let params = serde_json::json!({ "base_url": "http://llm", "model_name": "m" });
        assert!(ChunkedAnalyzer::from_params(params.as_object().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_single_survivor_is_returned_verbatim() {
        let text = twelve_kb();
        assert_eq!(text.len(), 12_000);
        let expected = finding("chunk3");
        let answer = expected.clone();

        let client = Arc::new(ScriptedClient::new(move |req| {
            if req.user_content().contains("119 ") {
                Ok(answer.clone())
            } else {
                Ok(NONE_SENTINEL.to_string())
            }
        }));
        let analyzer = ChunkedAnalyzer::with_client(
            client.clone(),
            settings(AnalysisMode::Sequential, 5000),
        );

        let report = analyzer
            .analyze(Collected::Text(text), Arc::new(RecordingProgress::default()))
            .await;

        assert_eq!(report, expected);
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_zero_survivors_skip_synthesis() {
        let client = Arc::new(ScriptedClient::new(|_| Ok(NONE_SENTINEL.to_string())));
        let analyzer = ChunkedAnalyzer::with_client(
            client.clone(),
            settings(AnalysisMode::Concurrent, 5000),
        );

        let report = analyzer
            .analyze(Collected::Text(twelve_kb()), Arc::new(RecordingProgress::default()))
            .await;

        assert_eq!(report, NO_ERRORS_REPORT);
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_multiple_survivors_are_synthesized() {
        let client = Arc::new(ScriptedClient::new(|req| {
            if req.user_content().contains("---") {
                Ok("  consolidated report  ".to_string())
            } else {
                Ok(finding("chunk"))
            }
        }));
        let analyzer = ChunkedAnalyzer::with_client(
            client.clone(),
            settings(AnalysisMode::Concurrent, 5000),
        );

        let report = analyzer
            .analyze(Collected::Text(twelve_kb()), Arc::new(RecordingProgress::default()))
            .await;

        assert_eq!(report, "consolidated report");
        assert_eq!(client.calls(), 4);
    }

    #[tokio::test]
    async fn test_failed_synthesis_returns_joined_findings() {
        let client = Arc::new(ScriptedClient::new(|req| {
            if req.user_content().contains("Analyses:") {
                Err(LlmError::Connect("refused".into()))
            } else if req.user_content().contains("000 ") {
                Ok(finding("first"))
            } else {
                Ok(finding("other"))
            }
        }));
        let analyzer = ChunkedAnalyzer::with_client(
            client.clone(),
            settings(AnalysisMode::Sequential, 5000),
        );

        let report = analyzer
            .analyze(Collected::Text(twelve_kb()), Arc::new(RecordingProgress::default()))
            .await;

        let expected = [finding("first"), finding("other"), finding("other")].join(FINDINGS_SEPARATOR);
        assert_eq!(report, expected);
    }

    #[tokio::test]
    async fn test_failed_chunk_becomes_placeholder() {
        let client = Arc::new(ScriptedClient::new(|_| {
            Err(LlmError::Timeout("operation timed out after 60s".into()))
        }));
        let analyzer = ChunkedAnalyzer::with_client(
            client.clone(),
            settings(AnalysisMode::Sequential, 100_000),
        );

        let report = analyzer
            .analyze(
                Collected::Text("ERROR boom".into()),
                Arc::new(RecordingProgress::default()),
            )
            .await;

        assert!(report.starts_with("Analysis failed: LLM request timed out"));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_blank_input_skips_llm() {
        let client = Arc::new(ScriptedClient::new(|_| Ok(finding("never"))));
        let analyzer =
            ChunkedAnalyzer::with_client(client.clone(), ChunkedSettings::default());

        let report = analyzer
            .analyze(Collected::Lines(vec![]), Arc::new(RecordingProgress::default()))
            .await;

        assert_eq!(report, NO_ERRORS_REPORT);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_sequential_progress() {
        let client = Arc::new(ScriptedClient::new(|_| Ok(NONE_SENTINEL.to_string())));
        let analyzer = ChunkedAnalyzer::with_client(client, settings(AnalysisMode::Sequential, 5000));
        let progress = Arc::new(RecordingProgress::default());

        analyzer
            .analyze(Collected::Text(twelve_kb()), progress.clone())
            .await;

        assert_eq!(progress.events(), vec![(3, 0), (3, 1), (3, 2), (3, 3)]);
    }

    #[tokio::test]
    async fn test_concurrent_progress_is_exact_and_bounded() {
        let client = Arc::new(
            ScriptedClient::new(|_| Ok(NONE_SENTINEL.to_string()))
                .with_delay(Duration::from_millis(20)),
        );
        let mut s = settings(AnalysisMode::Concurrent, 100);
        s.concurrency = 3;
        let analyzer = ChunkedAnalyzer::with_client(client.clone(), s);
        let progress = Arc::new(RecordingProgress::default());

        let text: String = (0..20).map(|i| format!("{:02} {}\n", i, "y".repeat(96))).collect();
        analyzer.analyze(Collected::Text(text), progress.clone()).await;

        let events = progress.events();
        let total = events[0].0;
        assert_eq!(events[0], (total, 0));
        let processed: Vec<usize> = events[1..].iter().map(|(_, p)| *p).collect();
        assert_eq!(processed, (1..=total).collect::<Vec<_>>());
        assert_eq!(client.calls(), total);
        assert!(client.max_in_flight() <= 3);
        assert!(client.max_in_flight() >= 2);
    }

    #[tokio::test]
    async fn test_concurrent_results_keep_chunk_order() {
        let client = Arc::new(ScriptedClient::new(|req| {
            let content = req.user_content();
            let tag = if content.contains("AAA") { "first" } else { "second" };
            Ok(finding(tag))
        }).with_delay(Duration::from_millis(5)));
        let analyzer = ChunkedAnalyzer::with_client(
            client,
            settings(AnalysisMode::Concurrent, 60),
        );
        let text = format!("AAA {}\nBBB {}", "a".repeat(50), "b".repeat(50));

        let results = analyzer
            .analyze_concurrent(chunk_text(&text, 60), Arc::new(RecordingProgress::default()))
            .await;

        assert_eq!(results, vec![finding("first"), finding("second")]);
    }
}
