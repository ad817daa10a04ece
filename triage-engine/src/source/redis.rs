//! Redis statistics source
//!
//! Reads `INFO`, `SLOWLOG`, `CLIENT LIST` and `CONFIG GET` over one
//! multiplexed connection. The datasets use the same keys as the SQL sources
//! (`slow_queries`, `processlist`, `status`, `variables`) so reports render
//! the same statistics table; `memory` and `keyspace` are Redis-only.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Collected, ServerInfo, Source};
use crate::error::SourceError;
use crate::params::Params;

/// `INFO memory` fields copied into the `memory` dataset
const MEMORY_FIELDS: &[&str] = &[
    "used_memory",
    "used_memory_human",
    "used_memory_rss",
    "used_memory_peak",
    "used_memory_peak_human",
    "mem_fragmentation_ratio",
    "maxmemory",
    "maxmemory_human",
    "maxmemory_policy",
];

/// `CLIENT LIST` fields kept per client
const CLIENT_FIELDS: &[&str] = &["id", "addr", "name", "age", "idle", "flags", "db", "cmd"];

/// Collects server statistics from Redis
#[derive(Debug, Clone)]
pub struct RedisSource {
    host: String,
    port: u16,
    password: Option<String>,
    database: i64,
    connect_timeout: Duration,
    command_timeout: Duration,
    slowlog_limit: u64,
}

impl RedisSource {
    /// Builds the source from its parameters
    pub fn from_params(params: &Map<String, Value>) -> anyhow::Result<Self> {
        let p = Params::new(params);
        let port = p.u64("port").unwrap_or(6379);
        let port =
            u16::try_from(port).map_err(|_| anyhow::anyhow!("invalid redis port {}", port))?;
        let database = p.u64("database").unwrap_or(0);
        if database > 15 {
            anyhow::bail!("invalid redis database {}: expected 0-15", database);
        }

        Ok(Self {
            host: p.string_or("host", "localhost"),
            port,
            password: p.string("password").filter(|s| !s.is_empty()),
            database: database as i64,
            connect_timeout: Duration::from_secs(p.u64("socket_connect_timeout").unwrap_or(10)),
            command_timeout: Duration::from_secs(p.u64("socket_timeout").unwrap_or(30)),
            slowlog_limit: p.u64("slowlog_limit").unwrap_or(100),
        })
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: self.database,
                password: self.password.clone(),
                ..Default::default()
            },
        }
    }

    async fn connect(&self) -> Result<MultiplexedConnection, SourceError> {
        let target = format!("{}:{}", self.host, self.port);
        let client = redis::Client::open(self.connection_info())
            .map_err(|e| SourceError::Other(anyhow::anyhow!("invalid redis address: {}", e)))?;

        let attempt = client.get_multiplexed_async_connection();
        let mut conn = match tokio::time::timeout(self.connect_timeout, attempt).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                return Err(SourceError::Connection(describe_connect_error(&target, &e)));
            }
            Err(_) => {
                return Err(SourceError::Connection(format!(
                    "Cannot connect to Redis at {}: connection timed out after {:?}",
                    target, self.connect_timeout
                )));
            }
        };

        let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        match pong {
            Ok(_) => Ok(conn),
            Err(e) => Err(SourceError::Connection(describe_connect_error(&target, &e))),
        }
    }

    /// Runs one command under the command timeout
    async fn query<T: redis::FromRedisValue>(
        &self,
        conn: &mut MultiplexedConnection,
        cmd: &redis::Cmd,
    ) -> Result<T, String> {
        match tokio::time::timeout(self.command_timeout, cmd.query_async(&mut *conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", self.command_timeout)),
        }
    }

    /// Runs every command, recording failures instead of returning them
    async fn gather(&self, conn: &mut MultiplexedConnection) -> Map<String, Value> {
        let mut result = Map::new();
        result.insert("database_type".into(), json!("Redis"));
        result.insert("host".into(), json!(self.host));
        result.insert("port".into(), json!(self.port));
        result.insert("database".into(), json!(self.database));
        let mut errors: Vec<String> = Vec::new();

        match self.query::<String>(conn, &redis::cmd("INFO")).await {
            Ok(text) => {
                let info = parse_info(&text);
                if let Some(version) = info.get("redis_version").and_then(Value::as_str) {
                    result.insert("version".into(), json!(version));
                }
                let memory: Map<String, Value> = MEMORY_FIELDS
                    .iter()
                    .filter_map(|key| info.get(*key).map(|v| (key.to_string(), v.clone())))
                    .collect();
                result.insert("memory".into(), Value::Object(memory));
                result.insert("keyspace".into(), keyspace(&info));
                result.insert("status".into(), Value::Object(info));
            }
            Err(e) => errors.push(format!("info: {}", e)),
        }

        let mut slowlog = redis::cmd("SLOWLOG");
        slowlog.arg("GET").arg(self.slowlog_limit);
        match self.query::<redis::Value>(conn, &slowlog).await {
            Ok(value) => {
                result.insert("slow_queries".into(), Value::Array(slowlog_entries(&value)));
            }
            Err(e) => errors.push(format!("slow log: {}", e)),
        }

        let mut clients = redis::cmd("CLIENT");
        clients.arg("LIST");
        match self.query::<String>(conn, &clients).await {
            Ok(text) => {
                result.insert("processlist".into(), Value::Array(parse_client_list(&text)));
            }
            Err(e) => errors.push(format!("client list: {}", e)),
        }

        let mut config = redis::cmd("CONFIG");
        config.arg("GET").arg("*");
        match self.query::<HashMap<String, String>>(conn, &config).await {
            Ok(map) => {
                let variables: Map<String, Value> =
                    map.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
                result.insert("variables".into(), Value::Object(variables));
            }
            Err(e) => errors.push(format!("config: {}", e)),
        }

        for error in &errors {
            warn!("Redis collection partial failure: {}", error);
        }
        result.insert("errors".into(), json!(errors));
        result
    }
}

#[async_trait]
impl Source for RedisSource {
    fn kind(&self) -> &'static str {
        "redis"
    }

    async fn collect(&self) -> Result<Collected, SourceError> {
        info!("Collecting Redis statistics from {}:{}", self.host, self.port);

        let mut conn = self.connect().await?;
        let result = self.gather(&mut conn).await;
        drop(conn);

        debug!("Redis collection finished with {} section(s)", result.len());
        Ok(Collected::Structured(Value::Object(result)))
    }

    async fn test_connection(&self) -> Result<ServerInfo, SourceError> {
        let mut conn = self.connect().await?;
        let mut server = redis::cmd("INFO");
        server.arg("server");
        let version = self
            .query::<String>(&mut conn, &server)
            .await
            .ok()
            .and_then(|text| {
                parse_info(&text)
                    .get("redis_version")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });

        Ok(ServerInfo {
            database_type: "Redis".to_string(),
            version,
        })
    }
}

/// Parses `INFO` output into a flat map, numbers where they parse
fn parse_info(text: &str) -> Map<String, Value> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.to_string(), scalar(value)))
        .collect()
}

fn scalar(value: &str) -> Value {
    if let Ok(n) = value.parse::<i64>() {
        json!(n)
    } else if let Ok(f) = value.parse::<f64>() {
        json!(f)
    } else {
        Value::String(value.to_string())
    }
}

/// `db0:keys=1,expires=0,avg_ttl=0` entries, parsed per database
fn keyspace(info: &Map<String, Value>) -> Value {
    let databases: Map<String, Value> = info
        .iter()
        .filter(|(key, _)| key.starts_with("db") && key[2..].parse::<u32>().is_ok())
        .filter_map(|(key, value)| {
            let stats: Map<String, Value> = value
                .as_str()?
                .split(',')
                .filter_map(|pair| pair.split_once('='))
                .map(|(k, v)| (k.to_string(), scalar(v)))
                .collect();
            Some((key.clone(), Value::Object(stats)))
        })
        .collect();
    Value::Object(databases)
}

/// One object per `CLIENT LIST` line
fn parse_client_list(text: &str) -> Vec<Value> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let fields: HashMap<&str, &str> = line
                .split_whitespace()
                .filter_map(|pair| pair.split_once('='))
                .collect();
            let client: Map<String, Value> = CLIENT_FIELDS
                .iter()
                .map(|key| {
                    let value = fields.get(key).copied().unwrap_or_default();
                    (key.to_string(), json!(value))
                })
                .collect();
            Value::Object(client)
        })
        .collect()
}

/// Converts `SLOWLOG GET` replies
///
/// Each entry is `[id, start_time, duration_us, [args...], client_addr?, client_name?]`;
/// the last two are absent on servers older than 4.0.
fn slowlog_entries(value: &redis::Value) -> Vec<Value> {
    let redis::Value::Array(entries) = value else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let redis::Value::Array(fields) = entry else {
                return None;
            };
            let int = |i: usize| {
                fields
                    .get(i)
                    .and_then(|v| redis::from_redis_value::<i64>(v).ok())
                    .unwrap_or_default()
            };
            let text = |i: usize| {
                fields
                    .get(i)
                    .and_then(|v| redis::from_redis_value::<String>(v).ok())
                    .unwrap_or_default()
            };
            let command = fields
                .get(3)
                .and_then(|v| redis::from_redis_value::<Vec<String>>(v).ok())
                .unwrap_or_default()
                .join(" ");

            Some(json!({
                "id": int(0),
                "timestamp": int(1),
                "duration_sec": int(2) as f64 / 1_000_000.0,
                "command": command,
                "client": text(4),
                "client_name": text(5),
            }))
        })
        .collect()
}

/// Human-readable connection failure with the likely cause
fn describe_connect_error(target: &str, err: &redis::RedisError) -> String {
    let hint = if err.is_connection_refusal() {
        "connection refused: check that Redis is running and listening on this address"
    } else if err.kind() == redis::ErrorKind::AuthenticationFailed {
        "authentication failed: check the password"
    } else if err.is_timeout() {
        "connection timed out: check network reachability and the host address"
    } else {
        "unexpected connection failure"
    };
    format!("Cannot connect to Redis at {}: {} ({})", target, hint, err)
}
