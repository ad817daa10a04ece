//! Per-run configuration overrides
//!
//! Overrides never touch the catalog entry; they are applied to a copy.

use serde_json::{Map, Value, json};
use triage_core::domain::task::{PluginSpec, TaskConfig};
use triage_core::dto::run::RunOverrides;

/// Time and size limits carried onto docker sources
const DOCKER_KEYS: &[&str] = &["since", "until", "tail", "max_lines", "max_bytes"];

/// Returns `task` with `overrides` applied
///
/// * With a container and a `multi` source, the sub-sources are replaced by a
///   single docker source for that container.
/// * With a container and a `docker` source, its `container_name` is replaced.
/// * Time and limit overrides land on every docker source.
/// * `chunk_size` and `concurrency` land on the analyzer.
pub fn apply_overrides(task: &TaskConfig, overrides: &RunOverrides) -> TaskConfig {
    let mut task = task.clone();

    if let Some(container) = &overrides.container {
        match task.source.name.as_str() {
            "multi" => {
                let mut entry = Map::new();
                entry.insert("type".into(), json!("docker"));
                entry.insert("container_name".into(), json!(container));
                entry.insert("label".into(), json!(container));
                apply_docker_limits(&mut entry, overrides);
                task.source
                    .params
                    .insert("sources".into(), Value::Array(vec![Value::Object(entry)]));
            }
            "docker" | "docker_logs" => {
                task.source
                    .params
                    .insert("container_name".into(), json!(container));
            }
            _ => {}
        }
    }

    if is_docker(&task.source) {
        apply_docker_limits(&mut task.source.params, overrides);
    } else if let Some(Value::Array(sources)) = task.source.params.get_mut("sources") {
        for entry in sources.iter_mut().filter_map(Value::as_object_mut) {
            if entry.get("type").and_then(Value::as_str) == Some("docker") {
                apply_docker_limits(entry, overrides);
            }
        }
    }

    if let Some(chunk_size) = overrides.chunk_size {
        task.analyzer
            .params
            .insert("chunk_size".into(), json!(chunk_size));
    }
    if let Some(concurrency) = overrides.concurrency {
        task.analyzer
            .params
            .insert("concurrency".into(), json!(concurrency));
    }

    task
}

fn is_docker(spec: &PluginSpec) -> bool {
    matches!(spec.name.as_str(), "docker" | "docker_logs")
}

fn apply_docker_limits(params: &mut Map<String, Value>, overrides: &RunOverrides) {
    if let Some(minutes) = overrides.minutes_ago {
        params.insert("minutes_ago".into(), json!(minutes));
        params.remove("hours_ago");
    } else if let Some(hours) = overrides.hours_ago {
        params.insert("hours_ago".into(), json!(hours));
        params.remove("minutes_ago");
    }

    let values: [Option<Value>; 5] = [
        overrides.since.clone().map(Value::from),
        overrides.until.clone().map(Value::from),
        overrides.tail.map(Value::from),
        overrides.max_lines.map(Value::from),
        overrides.max_bytes.map(Value::from),
    ];
    for (key, value) in DOCKER_KEYS.iter().zip(values) {
        if let Some(value) = value {
            params.insert((*key).into(), value);
        }
    }
}

/// Ad-hoc task analysing one container with the LLM taken from the environment
///
/// Reads `LLM_BASE_URL`, `LLM_API_KEY` and `LLM_MODEL_NAME`, and writes the
/// report under `reports/`.
pub fn default_container_task(container: &str) -> TaskConfig {
    let env = |key: &str| std::env::var(key).unwrap_or_default();
    TaskConfig {
        name: format!("container:{}", container),
        source: PluginSpec::new("docker")
            .with_param("container_name", container)
            .with_param("hours_ago", 24),
        analyzer: PluginSpec::new("chunked_llm")
            .with_param("base_url", env("LLM_BASE_URL"))
            .with_param("api_key", env("LLM_API_KEY"))
            .with_param("model_name", env("LLM_MODEL_NAME")),
        sinks: vec![PluginSpec::new("file")],
    }
}
