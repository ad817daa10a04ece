//! Structured-data analysis
//!
//! Sends a whole structured snapshot (for example database statistics) to the
//! LLM in a single request and wraps the answer in a report with a computed
//! header and statistics table.

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use triage_core::domain::task::ReportMetadata;
use triage_llm::{ChatClient, ChatRequest, LlmError, OpenAiClient};

use super::chunked::TIMEOUT_GUARD;
use super::layout::normalize_layout;
use super::prompts;
use super::{Analyzer, ProgressReporter};
use crate::params::Params;
use crate::source::Collected;

/// Databases never listed in report headers
const SYSTEM_DATABASES: &[&str] = &["template0", "template1"];

/// Databases listed individually before collapsing into "and N more"
const HEADER_DATABASE_LIMIT: usize = 10;

/// Collection errors shown in the statistics section
const SHOWN_ERRORS: usize = 5;

/// Tuning for [`StructuredAnalyzer`]
#[derive(Debug, Clone)]
pub struct StructuredSettings {
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
    pub prompt: String,
}

impl Default for StructuredSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_tokens: 1600,
            temperature: 0.3,
            prompt: prompts::DATABASE_PROMPT.to_string(),
        }
    }
}

impl StructuredSettings {
    pub fn from_params(params: &Map<String, Value>) -> Self {
        let p = Params::new(params);
        let defaults = Self::default();
        let prompt = p.object("prompts").and_then(|pr| {
            pr.string("analyze")
                .or_else(|| pr.string("analyze_database"))
        });

        Self {
            timeout: p
                .u64("timeout")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_tokens: p
                .u64("max_tokens")
                .map(|n| n.min(u32::MAX as u64) as u32)
                .unwrap_or(defaults.max_tokens),
            temperature: p
                .f64("temperature")
                .map(|t| t as f32)
                .unwrap_or(defaults.temperature),
            prompt: prompt.unwrap_or(defaults.prompt),
        }
    }
}

/// Where the LLM lives, used to make failure reports actionable
#[derive(Debug, Clone, Default)]
struct Endpoint {
    base_url: String,
    api_key: String,
    model: String,
}

/// Single-shot analyzer for structured snapshots
pub struct StructuredAnalyzer {
    client: Arc<dyn ChatClient>,
    settings: StructuredSettings,
    endpoint: Endpoint,
    metadata: Option<ReportMetadata>,
}

impl StructuredAnalyzer {
    /// Builds the analyzer and its client from `base_url`, `api_key` and `model_name`
    pub fn from_params(params: &Map<String, Value>) -> anyhow::Result<Self> {
        let p = Params::new(params);
        let settings = StructuredSettings::from_params(params);
        let endpoint = Endpoint {
            base_url: p.require("base_url")?,
            api_key: p.string_or("api_key", ""),
            model: p.require("model_name")?,
        };
        let client = OpenAiClient::with_timeout(
            endpoint.base_url.clone(),
            endpoint.api_key.clone(),
            endpoint.model.clone(),
            settings.timeout,
        )
        .context("Failed to create LLM client")?;

        Ok(Self {
            client: Arc::new(client),
            settings,
            endpoint,
            metadata: None,
        })
    }

    pub fn with_client(client: Arc<dyn ChatClient>, settings: StructuredSettings) -> Self {
        Self {
            client,
            settings,
            endpoint: Endpoint::default(),
            metadata: None,
        }
    }

    /// Records endpoint details shown in failure hints
    pub fn with_endpoint(
        mut self,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        self.endpoint = Endpoint {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        };
        self
    }

    async fn request(&self, data: &Value) -> Result<String, LlmError> {
        let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
        let prompt = prompts::render(&self.settings.prompt, &[("{database_data}", &json)]);
        let request = ChatRequest::new(prompts::DATABASE_SYSTEM, prompt)
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens);

        let guard = self.settings.timeout + TIMEOUT_GUARD;
        match tokio::time::timeout(guard, self.client.chat(request)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(format!(
                "no response within {}s",
                guard.as_secs()
            ))),
        }
    }

    /// Builds the failure report with hints specific to the error category
    pub fn format_error_report(&self, message: &str, category: Option<&str>, data: &Value) -> String {
        let mut out = header(self.metadata.as_ref(), data, "❌ Analysis failed");
        let _ = write!(out, "## ⚠️ Error\n\n{}\n\n", message);

        let hints = self.hints(category);
        if !hints.is_empty() {
            out.push_str("## 🔧 Troubleshooting\n\n");
            for (i, hint) in hints.iter().enumerate() {
                let _ = writeln!(out, "{}. {}", i + 1, hint);
            }
            out.push('\n');
        }

        out.push_str("---\n\n");
        out.push_str(&statistics(data));
        out
    }

    fn hints(&self, category: Option<&str>) -> Vec<String> {
        let url = display_or(&self.endpoint.base_url, "(not configured)");
        match category {
            Some("timeout") => vec![
                format!(
                    "The model did not answer within {}s; increase `timeout` or reduce the collected data.",
                    self.settings.timeout.as_secs()
                ),
                format!("Check the load on the LLM service at {}.", url),
            ],
            Some("connection") => vec![
                format!("Verify the LLM service is reachable at {}.", url),
                "Check DNS, firewall and proxy settings between this host and the service.".into(),
            ],
            Some("auth") => vec![
                format!(
                    "The API key was rejected (configured key: {}).",
                    mask_key(&self.endpoint.api_key)
                ),
                "Set a valid `api_key` for the analyzer.".into(),
            ],
            Some("api") => vec![
                format!(
                    "The LLM service returned an error; confirm the model `{}` exists.",
                    display_or(&self.endpoint.model, "(not configured)")
                ),
                "Retry later if the service reported overload.".into(),
            ],
            Some("parse") | Some("empty") => vec![
                "The service answered with an unexpected body; confirm it speaks the OpenAI chat completions protocol.".into(),
                format!("Check the endpoint path under {}.", url),
            ],
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl Analyzer for StructuredAnalyzer {
    fn set_metadata(&mut self, metadata: ReportMetadata) {
        self.metadata = Some(metadata);
    }

    fn metadata(&self) -> Option<&ReportMetadata> {
        self.metadata.as_ref()
    }

    /// Single request; chunk progress is not reported
    async fn analyze(&self, data: Collected, _progress: Arc<dyn ProgressReporter>) -> String {
        let data = match data {
            Collected::Structured(value) => value,
            other => Value::String(other.into_text().unwrap_or_default()),
        };

        info!("Requesting structured analysis");
        match self.request(&data).await {
            Ok(body) => format_report(&normalize_layout(&body), &data, self.metadata.as_ref()),
            Err(e) => {
                error!("Structured analysis failed: {}", e);
                self.format_error_report(&e.to_string(), Some(e.category()), &data)
            }
        }
    }

    fn error_report(&self, message: &str, data: &Value) -> String {
        self.format_error_report(message, None, data)
    }
}

/// Wraps the analysis body with the computed header and statistics
pub fn format_report(body: &str, data: &Value, metadata: Option<&ReportMetadata>) -> String {
    let mut out = header(metadata, data, "✅ Completed");
    out.push_str(body.trim());
    out.push_str("\n\n---\n\n");
    out.push_str(&statistics(data));
    out
}

fn header(metadata: Option<&ReportMetadata>, data: &Value, status: &str) -> String {
    let text = |key: &str| match data.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "Unknown".to_string(),
    };
    let task = metadata.map(|m| m.task_name.as_str()).unwrap_or("Unknown");

    let mut out = String::from("# 📊 Database Analysis Report\n\n");
    let _ = writeln!(out, "> **Generated at**: {}  ", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "> **Task**: {}  ", task);
    let _ = writeln!(out, "> **Database type**: {}  ", text("database_type"));
    let _ = writeln!(out, "> **Host**: {}:{}  ", text("host"), text("port"));
    let _ = writeln!(out, "> **Database**: {}  ", text("database"));
    if let Some(line) = database_summary(data) {
        let _ = writeln!(out, "> **Databases**: {}  ", line);
    }
    let _ = writeln!(out, "> **Status**: {}", status);
    out.push_str("\n---\n\n");
    out
}

/// "N (a (1.0MB, 50.0%), ...)" for user databases, largest first
fn database_summary(data: &Value) -> Option<String> {
    let rows = data.get("databases")?.as_array()?;
    let mut databases: Vec<(&str, u64)> = rows
        .iter()
        .filter_map(|row| {
            let name = row.get("database_name")?.as_str()?;
            let size = row.get("database_size").and_then(Value::as_u64).unwrap_or(0);
            Some((name, size))
        })
        .filter(|(name, _)| !SYSTEM_DATABASES.contains(name))
        .collect();
    if databases.is_empty() {
        return None;
    }
    databases.sort_by(|a, b| b.1.cmp(&a.1));

    let total: u64 = databases.iter().map(|(_, size)| size).sum();
    let listed: Vec<String> = databases
        .iter()
        .take(HEADER_DATABASE_LIMIT)
        .map(|(name, size)| {
            let share = if total == 0 {
                0.0
            } else {
                *size as f64 * 100.0 / total as f64
            };
            format!("{} ({:.1}MB, {:.1}%)", name, *size as f64 / 1_048_576.0, share)
        })
        .collect();

    let mut line = format!("{} ({})", databases.len(), listed.join(", "));
    if databases.len() > HEADER_DATABASE_LIMIT {
        let _ = write!(line, " and {} more", databases.len() - HEADER_DATABASE_LIMIT);
    }
    Some(line)
}

fn statistics(data: &Value) -> String {
    let mut out = String::from("## 📈 Collection Statistics\n\n| Dataset | Result |\n|---|---|\n");
    for (label, key) in [
        ("Slow queries", "slow_queries"),
        ("Connections", "processlist"),
        ("Status", "status"),
        ("Variables", "variables"),
        ("Indexes", "indexes"),
        ("Tables", "tables"),
    ] {
        let _ = writeln!(out, "| {} | {} |", label, dataset_result(data.get(key)));
    }

    if let Some(tables) = data.get("tables").and_then(Value::as_array) {
        let mut per_database: BTreeMap<&str, usize> = BTreeMap::new();
        for table in tables {
            let name = table
                .get("database_name")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            *per_database.entry(name).or_default() += 1;
        }
        if !per_database.is_empty() {
            out.push_str("\n**Tables per database**: ");
            let parts: Vec<String> = per_database
                .iter()
                .map(|(name, count)| format!("{}: {}", name, count))
                .collect();
            out.push_str(&parts.join(", "));
            out.push('\n');
        }
    }

    if let Some(errors) = data.get("errors").and_then(Value::as_array) {
        let errors: Vec<&str> = errors.iter().filter_map(Value::as_str).collect();
        if !errors.is_empty() {
            let _ = write!(out, "\n**Collection errors** ({}):\n\n", errors.len());
            for e in errors.iter().take(SHOWN_ERRORS) {
                let _ = writeln!(out, "- {}", e);
            }
        }
    }
    out
}

fn dataset_result(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(items)) if !items.is_empty() => format!("✅ {} rows", items.len()),
        Some(Value::Object(map)) if !map.is_empty() => format!("✅ {} entries", map.len()),
        _ => "no data".to_string(),
    }
}

fn display_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() { fallback } else { value }
}

/// Shows only the first four characters of a secret
fn mask_key(key: &str) -> String {
    if key.chars().count() > 4 {
        format!("{}...", key.chars().take(4).collect::<String>())
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingProgress, ScriptedClient};
    use serde_json::json;

    fn snapshot() -> Value {
        json!({
            "database_type": "PostgreSQL",
            "host": "db.internal",
            "port": 5432,
            "database": "all",
            "databases": [
                { "database_name": "template1", "database_size": 8_000_000 },
                { "database_name": "orders", "database_size": 3_145_728 },
                { "database_name": "users", "database_size": 1_048_576 }
            ],
            "tables": [
                { "database_name": "orders", "tablename": "items" },
                { "database_name": "orders", "tablename": "payments" }
            ],
            "variables": { "max_connections": { "value": "100" } },
            "slow_queries": [],
            "errors": ["slow queries skipped: pg_stat_statements is not installed"]
        })
    }

    #[test]
    fn test_database_summary_excludes_templates() {
        let line = database_summary(&snapshot()).unwrap();
        assert_eq!(line, "2 (orders (3.0MB, 75.0%), users (1.0MB, 25.0%))");
    }

    #[test]
    fn test_database_summary_collapses_long_lists() {
        let rows: Vec<Value> = (0..12)
            .map(|i| json!({ "database_name": format!("db{}", i), "database_size": 1000 - i }))
            .collect();
        let line = database_summary(&json!({ "databases": rows })).unwrap();
        assert!(line.starts_with("12 (db0 "));
        assert!(line.ends_with(" and 2 more"));
        assert!(!line.contains("db10"));
    }

    #[test]
    fn test_statistics_table() {
        let stats = statistics(&snapshot());
        assert!(stats.contains("| Slow queries | no data |"));
        assert!(stats.contains("| Tables | ✅ 2 rows |"));
        assert!(stats.contains("| Variables | ✅ 1 entries |"));
        assert!(stats.contains("orders: 2"));
        assert!(stats.contains("pg_stat_statements is not installed"));
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-abcdef"), "sk-a...");
        assert_eq!(mask_key("abc"), "***");
        assert_eq!(mask_key(""), "***");
    }

    #[tokio::test]
    async fn test_analyze_wraps_normalized_body() {
        let client = Arc::new(ScriptedClient::new(|req| {
            assert!(req.user_content().contains("db.internal"));
            assert_eq!(req.max_tokens, Some(1600));
            Ok("### I. Instance overview\n1. Healthy.".to_string())
        }));
        let analyzer = StructuredAnalyzer::with_client(client.clone(), StructuredSettings::default());
        let progress = Arc::new(RecordingProgress::default());

        let report = analyzer
            .analyze(Collected::Structured(snapshot()), progress.clone())
            .await;

        assert!(report.starts_with("# 📊 Database Analysis Report"));
        assert!(report.contains("> **Host**: db.internal:5432"));
        assert!(report.contains("### I. Instance overview"));
        assert!(report.contains("## 📈 Collection Statistics"));
        assert_eq!(client.calls(), 1);
        assert!(progress.events().is_empty());
    }

    #[tokio::test]
    async fn test_auth_failure_masks_key() {
        let client = Arc::new(ScriptedClient::new(|_| {
            Err(LlmError::from_status(401, "invalid key"))
        }));
        let analyzer = StructuredAnalyzer::with_client(client, StructuredSettings::default())
            .with_endpoint("http://llm.internal/v1", "sk-secret-value", "qwen");

        let report = analyzer
            .analyze(Collected::Structured(snapshot()), Arc::new(RecordingProgress::default()))
            .await;

        assert!(report.contains("❌ Analysis failed"));
        assert!(report.contains("sk-s..."));
        assert!(!report.contains("sk-secret-value"));
        assert!(report.contains("| Tables | ✅ 2 rows |"));
    }

    #[tokio::test]
    async fn test_connection_failure_names_endpoint() {
        let client = Arc::new(ScriptedClient::new(|_| {
            Err(LlmError::Connect("connection refused".into()))
        }));
        let analyzer = StructuredAnalyzer::with_client(client, StructuredSettings::default())
            .with_endpoint("http://llm.internal/v1", "", "qwen");

        let report = analyzer
            .analyze(Collected::Structured(json!({})), Arc::new(RecordingProgress::default()))
            .await;

        assert!(report.contains("connection refused"));
        assert!(report.contains("reachable at http://llm.internal/v1"));
    }

    #[test]
    fn test_error_report_for_unreachable_source() {
        let client = Arc::new(ScriptedClient::new(|_| Ok(String::new())));
        let analyzer = StructuredAnalyzer::with_client(client, StructuredSettings::default());
        let report = analyzer.error_report(
            "Data source connection failed: db unreachable",
            &json!({ "database_type": "PostgreSQL", "host": "10.0.0.9", "port": 5432 }),
        );
        assert!(report.contains("Data source connection failed: db unreachable"));
        assert!(report.contains("10.0.0.9:5432"));
    }
}
