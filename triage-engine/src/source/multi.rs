//! Multi-source aggregator
//!
//! Treats several line-oriented sources as one. Sub-sources are collected one
//! after another; each is stamped with the time its collection finished and
//! the merged stream is ordered by that stamp.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::{Collected, Source, create_leaf_source};
use crate::error::SourceError;
use crate::params::Params;

/// Resolution of the per-sub-source completion stamp
const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Protocol shown for an edge that names none
const UNKNOWN_PROTOCOL: &str = "unknown";

/// A labelled sub-source
pub type LabelledSource = (String, Box<dyn Source>);

/// One caller-to-callee relation between services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEdge {
    pub from: String,
    pub to: String,
    pub protocol: Option<String>,
}

impl CallEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, protocol: Option<&str>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            protocol: protocol.map(str::to_string),
        }
    }
}

/// Reads `call_chain` as edge tables or as an ordered list of service names
///
/// A table needs `from` and `to`; its `protocol` falls back to
/// `call_protocol`. A name list becomes one edge per consecutive pair, all
/// using `call_protocol`. Malformed entries are logged and skipped.
fn parse_call_chain(p: &Params<'_>) -> Vec<CallEdge> {
    let default_protocol = p.string("call_protocol").filter(|s| !s.is_empty());
    let Some(items) = p.array("call_chain") else {
        return Vec::new();
    };

    let mut edges = Vec::new();
    let mut names: Vec<String> = Vec::new();
    for item in items {
        match item {
            Value::Object(entry) => {
                let entry = Params::new(entry);
                match (entry.string("from"), entry.string("to")) {
                    (Some(from), Some(to)) => edges.push(CallEdge {
                        from,
                        to,
                        protocol: entry
                            .string("protocol")
                            .filter(|s| !s.is_empty())
                            .or_else(|| default_protocol.clone()),
                    }),
                    _ => warn!("Call chain entry without 'from' and 'to', skipping"),
                }
            }
            Value::String(name) => names.push(crate::params::expand_env(name)),
            other => warn!("Unsupported call chain entry {}, skipping", other),
        }
    }

    edges.extend(names.windows(2).map(|pair| CallEdge {
        from: pair[0].clone(),
        to: pair[1].clone(),
        protocol: default_protocol.clone(),
    }));
    edges
}

/// Fan-out/fan-in over several sources
pub struct MultiSource {
    sources: Vec<LabelledSource>,
    call_chain: Vec<CallEdge>,
}

impl std::fmt::Debug for MultiSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiSource")
            .field("sources", &self.labels())
            .field("call_chain", &self.call_chain)
            .finish()
    }
}

impl MultiSource {
    /// Wraps already-built sources
    ///
    /// Fails with [`SourceError::NoValidSources`] when `sources` is empty.
    pub fn from_sources(sources: Vec<LabelledSource>) -> Result<Self, SourceError> {
        if sources.is_empty() {
            return Err(SourceError::NoValidSources);
        }
        Ok(Self {
            sources,
            call_chain: Vec::new(),
        })
    }

    /// Builds sub-sources from the `sources` list
    ///
    /// Entries with an unknown `type` or invalid parameters are logged and
    /// skipped. Construction fails only when none remain.
    pub fn from_params(params: &Map<String, Value>) -> Result<Self, SourceError> {
        let p = Params::new(params);
        let mut sources: Vec<LabelledSource> = Vec::new();

        for (index, entry) in p.array("sources").into_iter().flatten().enumerate() {
            let Some(entry) = entry.as_object() else {
                warn!("Sub-source #{} is not a table, skipping", index);
                continue;
            };
            let entry_params = Params::new(entry);
            let Some(kind) = entry_params.string("type") else {
                warn!("Sub-source #{} has no type, skipping", index);
                continue;
            };
            let label = entry_params
                .string("label")
                .or_else(|| entry_params.string("container_name"))
                .or_else(|| entry_params.string("path"))
                .unwrap_or_else(|| format!("{}-{}", kind, index));

            match create_leaf_source(&kind, entry) {
                Ok(source) => {
                    debug!("Created {} sub-source '{}'", kind, label);
                    sources.push((label, source));
                }
                Err(e) => error!("Failed to create sub-source '{}': {:#}", label, e),
            }
        }

        let mut multi = Self::from_sources(sources)?;
        multi.call_chain = parse_call_chain(&p);
        Ok(multi)
    }

    /// Adds call relations emitted ahead of the log lines
    pub fn with_call_chain(mut self, chain: Vec<CallEdge>) -> Self {
        self.call_chain = chain;
        self
    }

    /// Sub-source labels in collection order
    pub fn labels(&self) -> Vec<&str> {
        self.sources.iter().map(|(label, _)| label.as_str()).collect()
    }

    /// One `# call chain: from -> to (protocol)` line per edge
    fn call_chain_header(&self) -> Vec<String> {
        self.call_chain
            .iter()
            .map(|edge| {
                format!(
                    "# call chain: {} -> {} ({})",
                    edge.from,
                    edge.to,
                    edge.protocol.as_deref().unwrap_or(UNKNOWN_PROTOCOL)
                )
            })
            .collect()
    }
}

/// One collected line waiting to be merged
struct Entry {
    stamp: String,
    label: String,
    line: String,
}

#[async_trait]
impl Source for MultiSource {
    fn kind(&self) -> &'static str {
        "multi"
    }

    async fn collect(&self) -> Result<Collected, SourceError> {
        let mut entries: Vec<Entry> = Vec::new();

        for (label, source) in &self.sources {
            let collected = match source.collect().await {
                Ok(collected) => collected,
                Err(e) => {
                    warn!("Sub-source '{}' failed, skipping: {}", label, e);
                    continue;
                }
            };
            let stamp = Utc::now().format(STAMP_FORMAT).to_string();

            let Some(text) = collected.into_text() else {
                warn!("Sub-source '{}' returned structured data, skipping", label);
                continue;
            };

            let before = entries.len();
            entries.extend(
                text.lines()
                    .filter(|line| !line.trim().is_empty())
                    .map(|line| Entry {
                        stamp: stamp.clone(),
                        label: label.clone(),
                        line: line.to_string(),
                    }),
            );
            debug!(
                "Sub-source '{}' contributed {} line(s)",
                label,
                entries.len() - before
            );
        }

        if entries.is_empty() {
            warn!(
                "No data collected from any of {} sub-source(s)",
                self.sources.len()
            );
            return Ok(Collected::Lines(Vec::new()));
        }

        // stable: lines of one sub-source keep their relative order
        entries.sort_by(|a, b| a.stamp.cmp(&b.stamp));

        let header = self.call_chain_header();
        let mut output = Vec::with_capacity(entries.len() + header.len() + 1);
        if !header.is_empty() {
            output.extend(header);
            output.push(String::new());
        }
        output.extend(
            entries
                .into_iter()
                .map(|e| format!("[{}] [{}] {}", e.stamp, e.label, e.line)),
        );

        info!(
            "Merged {} line(s) from {} sub-source(s)",
            output.len(),
            self.sources.len()
        );
        Ok(Collected::Lines(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StaticSource(Vec<&'static str>);

    #[async_trait]
    impl Source for StaticSource {
        fn kind(&self) -> &'static str {
            "static"
        }

        async fn collect(&self) -> Result<Collected, SourceError> {
            Ok(Collected::Lines(
                self.0.iter().map(|s| s.to_string()).collect(),
            ))
        }
    }

    struct FailingSource;

    #[async_trait]
    impl Source for FailingSource {
        fn kind(&self) -> &'static str {
            "failing"
        }

        async fn collect(&self) -> Result<Collected, SourceError> {
            Err(SourceError::Connection("daemon unreachable".into()))
        }
    }

    fn labelled(label: &str, source: impl Source + 'static) -> LabelledSource {
        (label.to_string(), Box::new(source))
    }

    fn strip_stamp(line: &str) -> &str {
        // "[YYYY-MM-DD HH:MM:SS] " is 22 bytes
        &line[22..]
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_other_sources() {
        let multi = MultiSource::from_sources(vec![
            labelled("api", StaticSource(vec!["ERROR a1", "ERROR a2"])),
            labelled("broken", FailingSource),
            labelled("worker", StaticSource(vec!["ERROR w1"])),
        ])
        .unwrap();

        let Collected::Lines(lines) = multi.collect().await.unwrap() else {
            panic!("expected lines");
        };

        let bodies: Vec<&str> = lines.iter().map(|l| strip_stamp(l)).collect();
        assert_eq!(
            bodies,
            vec!["[api] ERROR a1", "[api] ERROR a2", "[worker] ERROR w1"]
        );
        assert!(lines.iter().all(|l| l.starts_with('[')));
        assert!(!lines.iter().any(|l| l.contains("[broken]")));
    }

    #[tokio::test]
    async fn test_all_failing_yields_empty_stream() {
        let multi = MultiSource::from_sources(vec![
            labelled("a", FailingSource),
            labelled("b", FailingSource),
        ])
        .unwrap()
        .with_call_chain(vec![CallEdge::new("gw", "api", None)]);

        let collected = multi.collect().await.unwrap();
        assert_eq!(collected, Collected::Lines(Vec::new()));
    }

    #[tokio::test]
    async fn test_call_chain_header_leads() {
        let multi = MultiSource::from_sources(vec![labelled("api", StaticSource(vec!["x"]))])
            .unwrap()
            .with_call_chain(vec![
                CallEdge::new("gateway", "api", Some("HTTP SSE")),
                CallEdge::new("api", "db", None),
            ]);

        let Collected::Lines(lines) = multi.collect().await.unwrap() else {
            panic!("expected lines");
        };
        assert_eq!(lines[0], "# call chain: gateway -> api (HTTP SSE)");
        assert_eq!(lines[1], "# call chain: api -> db (unknown)");
        assert_eq!(lines[2], "");
        assert_eq!(strip_stamp(&lines[3]), "[api] x");
    }

    #[tokio::test]
    async fn test_blank_lines_are_dropped() {
        let multi =
            MultiSource::from_sources(vec![labelled("api", StaticSource(vec!["a", "  ", "b"]))])
                .unwrap();
        let Collected::Lines(lines) = multi.collect().await.unwrap() else {
            panic!("expected lines");
        };
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_no_sources_is_rejected() {
        assert!(matches!(
            MultiSource::from_sources(Vec::new()),
            Err(SourceError::NoValidSources)
        ));
    }

    #[test]
    fn test_from_params_skips_invalid_entries() {
        let params = json!({
            "sources": [
                { "type": "docker", "container_name": "api" },
                { "type": "mysql", "host": "db" },
                { "type": "docker" },
                "not a table",
                { "type": "file", "path": "/var/log/app.log", "label": "app" }
            ],
            "call_chain": ["api", "db"]
        });
        let multi = MultiSource::from_params(params.as_object().unwrap()).unwrap();
        assert_eq!(multi.labels(), vec!["api", "app"]);
        assert_eq!(multi.call_chain_header(), vec!["# call chain: api -> db (unknown)"]);
    }

    #[test]
    fn test_call_chain_edge_tables() {
        let params = json!({
            "sources": [ { "type": "docker", "container_name": "api" } ],
            "call_protocol": "HTTP",
            "call_chain": [
                { "from": "frontend", "to": "api", "protocol": "HTTP SSE" },
                { "from": "api", "to": "tools" },
                { "from": "orphan" }
            ]
        });
        let multi = MultiSource::from_params(params.as_object().unwrap()).unwrap();
        assert_eq!(
            multi.call_chain_header(),
            vec![
                "# call chain: frontend -> api (HTTP SSE)",
                "# call chain: api -> tools (HTTP)",
            ]
        );
    }

    #[test]
    fn test_call_chain_name_list_becomes_edges() {
        let params = json!({
            "sources": [ { "type": "docker", "container_name": "api" } ],
            "call_protocol": "grpc",
            "call_chain": ["gateway", "api", "db"]
        });
        let multi = MultiSource::from_params(params.as_object().unwrap()).unwrap();
        assert_eq!(
            multi.call_chain,
            vec![
                CallEdge::new("gateway", "api", Some("grpc")),
                CallEdge::new("api", "db", Some("grpc")),
            ]
        );
    }

    #[test]
    fn test_from_params_all_invalid() {
        let params = json!({ "sources": [ { "type": "mongodb" } ] });
        assert!(matches!(
            MultiSource::from_params(params.as_object().unwrap()),
            Err(SourceError::NoValidSources)
        ));

        let params = json!({});
        assert!(matches!(
            MultiSource::from_params(params.as_object().unwrap()),
            Err(SourceError::NoValidSources)
        ));
    }
}
