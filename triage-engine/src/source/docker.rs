//! Container log source
//!
//! Shells out to the docker CLI (`docker logs`) and returns the container's
//! recent output, optionally pre-filtered to lines that look like errors.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use super::{Collected, Source};
use crate::error::SourceError;
use crate::params::Params;

/// Lines returned by `docker logs --tail` when unset
pub const DEFAULT_TAIL: u64 = 3000;

/// Upper bound on `tail`
pub const MAX_TAIL: u64 = 50_000;

/// Hard limit on one `docker logs` invocation
const COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Substrings (lowercased) marking a line as worth analysing
const ERROR_KEYWORDS: &[&str] = &[
    "error",
    "exception",
    "fatal",
    "critical",
    "warning",
    "err",
    "fail",
    "traceback",
    "stack",
];

/// Collection window for `docker logs`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Window {
    Minutes(u64),
    Hours(u64),
    /// Absolute start, already normalised to `YYYY-MM-DDTHH:MM:SS`
    Since(String),
}

impl Window {
    /// Value passed to `--since`
    fn as_arg(&self) -> String {
        match self {
            Window::Minutes(m) => format!("{}m", m),
            Window::Hours(h) => format!("{}h", h),
            Window::Since(s) => s.clone(),
        }
    }
}

/// Collects logs of one container
#[derive(Debug, Clone)]
pub struct DockerSource {
    container_name: String,
    window: Window,
    until: Option<String>,
    tail: u64,
    max_lines: Option<usize>,
    max_bytes: Option<usize>,
    errors_only: bool,
    binary: String,
}

impl DockerSource {
    /// Creates a source for the last 24 hours of `container_name`
    pub fn new(container_name: impl Into<String>) -> Self {
        Self {
            container_name: container_name.into(),
            window: Window::Hours(24),
            until: None,
            tail: DEFAULT_TAIL,
            max_lines: None,
            max_bytes: None,
            errors_only: true,
            binary: "docker".to_string(),
        }
    }

    /// Builds the source from its parameters
    ///
    /// `since` wins over `minutes_ago`, which wins over `hours_ago`.
    pub fn from_params(params: &Map<String, Value>) -> anyhow::Result<Self> {
        let p = Params::new(params);
        let container_name = p
            .require("container_name")
            .context("docker source requires 'container_name'")?;

        let window = if let Some(since) = p.string("since").filter(|s| !s.is_empty()) {
            Window::Since(normalize_timestamp(&since))
        } else if let Some(minutes) = p.u64("minutes_ago") {
            Window::Minutes(minutes)
        } else {
            Window::Hours(p.u64("hours_ago").unwrap_or(24))
        };

        Ok(Self {
            container_name,
            window,
            until: p
                .string("until")
                .filter(|s| !s.is_empty())
                .map(|s| normalize_timestamp(&s)),
            tail: p.u64("tail").unwrap_or(DEFAULT_TAIL).clamp(1, MAX_TAIL),
            max_lines: p.u64("max_lines").map(|n| n as usize),
            max_bytes: p.u64("max_bytes").map(|n| n as usize),
            errors_only: p.bool_or("errors_only", true),
            binary: p.string_or("binary", "docker"),
        })
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// Arguments for `docker logs`
    fn command_args(&self) -> Vec<String> {
        let mut args = vec![
            "logs".to_string(),
            "--since".to_string(),
            self.window.as_arg(),
        ];
        if let Some(until) = &self.until {
            args.push("--until".to_string());
            args.push(until.clone());
        }
        args.push("--timestamps".to_string());
        args.push(format!("--tail={}", self.tail));
        args.push(self.container_name.clone());
        args
    }
}

#[async_trait]
impl Source for DockerSource {
    fn kind(&self) -> &'static str {
        "docker"
    }

    async fn collect(&self) -> Result<Collected, SourceError> {
        let args = self.command_args();
        info!(
            "Collecting logs for container {} (since {}, tail={})",
            self.container_name,
            self.window.as_arg(),
            self.tail
        );
        debug!("Running {} {}", self.binary, args.join(" "));

        let mut command = Command::new(&self.binary);
        command.args(&args).kill_on_drop(true);

        let output = match tokio::time::timeout(COMMAND_TIMEOUT, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::Connection(format!(
                    "'{}' executable not found",
                    self.binary
                )));
            }
            Ok(Err(e)) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to execute {} logs", self.binary))
                    .into());
            }
            Err(_) => {
                error!(
                    "docker logs for {} timed out after {:?}",
                    self.container_name, COMMAND_TIMEOUT
                );
                return Ok(Collected::Text(String::new()));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let message = stderr.trim();
            if is_daemon_unreachable(message) {
                return Err(SourceError::Connection(format!(
                    "Docker daemon unreachable: {}",
                    message
                )));
            }
            if message.contains("No such container") {
                warn!("Container {} does not exist", self.container_name);
            } else {
                error!(
                    "docker logs failed for {}: {}",
                    self.container_name, message
                );
            }
            return Ok(Collected::Text(String::new()));
        }

        // `docker logs` replays the container's stderr on its own stderr
        let mut logs = stdout.into_owned();
        if !stderr.trim().is_empty() {
            if !logs.is_empty() && !logs.ends_with('\n') {
                logs.push('\n');
            }
            logs.push_str(&stderr);
        }

        if logs.trim().is_empty() {
            warn!("Container {} produced no logs", self.container_name);
            return Ok(Collected::Text(String::new()));
        }

        let logs = if self.errors_only {
            prefilter_errors(&logs)
        } else {
            logs
        };
        let logs = apply_limits(&logs, self.max_lines, self.max_bytes);

        info!(
            "Collected {} bytes of logs from {}",
            logs.len(),
            self.container_name
        );
        Ok(Collected::Text(logs))
    }
}

/// Normalises `YYYY-MM-DD HH:MM:SS` to `YYYY-MM-DDTHH:MM:SS`
pub fn normalize_timestamp(raw: &str) -> String {
    raw.trim().replacen(' ', "T", 1)
}

fn is_daemon_unreachable(stderr: &str) -> bool {
    stderr.contains("Cannot connect to the Docker daemon")
        || stderr.contains("Is the docker daemon running")
        || (stderr.contains("permission denied") && stderr.contains("docker.sock"))
}

/// Keeps only lines that mention an error keyword
///
/// Returns the input unchanged when no line matches, so a quiet container
/// still gets analysed.
pub fn prefilter_errors(logs: &str) -> String {
    let kept: Vec<&str> = logs
        .lines()
        .filter(|line| {
            let lower = line.to_lowercase();
            ERROR_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .collect();

    if kept.is_empty() {
        debug!("Prefilter found no error keywords, keeping all lines");
        logs.to_string()
    } else {
        debug!("Prefilter kept {} line(s)", kept.len());
        kept.join("\n")
    }
}

/// Keeps the last `max_lines` lines, then the last `max_bytes` bytes
///
/// The byte cut moves forward to the next character boundary.
pub fn apply_limits(logs: &str, max_lines: Option<usize>, max_bytes: Option<usize>) -> String {
    let mut result = match max_lines {
        Some(max) => {
            let lines: Vec<&str> = logs.split('\n').collect();
            let start = lines.len().saturating_sub(max);
            lines[start..].join("\n")
        }
        None => logs.to_string(),
    };

    if let Some(max) = max_bytes {
        if result.len() > max {
            let mut cut = result.len() - max;
            while !result.is_char_boundary(cut) {
                cut += 1;
            }
            result = result[cut..].to_string();
        }
    }

    result
}
