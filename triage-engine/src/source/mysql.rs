//! MySQL statistics source
//!
//! Same contract as the PostgreSQL source: one read-only, low-impact
//! connection per call, every dataset rendered as JSON by the server and
//! failed queries recorded in `errors`.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::Connection;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Collected, ServerInfo, Source};
use crate::error::SourceError;
use crate::params::Params;

/// Schemas that belong to the server itself
const SYSTEM_SCHEMAS: &str = "('information_schema', 'performance_schema', 'mysql', 'sys')";

const DATABASES_SQL: &str = "
    SELECT COALESCE(JSON_ARRAYAGG(JSON_OBJECT(
               'database_name', t.database_name,
               'database_size', t.database_size)), JSON_ARRAY())
    FROM (SELECT TABLE_SCHEMA AS database_name,
                 CAST(SUM(COALESCE(DATA_LENGTH, 0) + COALESCE(INDEX_LENGTH, 0)) AS UNSIGNED)
                     AS database_size
          FROM information_schema.TABLES
          WHERE TABLE_SCHEMA NOT IN {system}
          GROUP BY TABLE_SCHEMA) t";

const SLOW_QUERIES_SQL: &str = "
    SELECT COALESCE(JSON_ARRAYAGG(JSON_OBJECT(
               'query', t.query, 'exec_count', t.exec_count,
               'avg_time_sec', t.avg_time_sec, 'max_time_sec', t.max_time_sec,
               'sum_time_sec', t.sum_time_sec)), JSON_ARRAY())
    FROM (SELECT LEFT(DIGEST_TEXT, 500) AS query,
                 COUNT_STAR AS exec_count,
                 AVG_TIMER_WAIT / 1000000000000 AS avg_time_sec,
                 MAX_TIMER_WAIT / 1000000000000 AS max_time_sec,
                 SUM_TIMER_WAIT / 1000000000000 AS sum_time_sec
          FROM performance_schema.events_statements_summary_by_digest
          WHERE AVG_TIMER_WAIT > 0
          ORDER BY SUM_TIMER_WAIT DESC
          LIMIT ?) t";

const PROCESSLIST_SQL: &str = "
    SELECT COALESCE(JSON_ARRAYAGG(JSON_OBJECT(
               'id', ID, 'user', USER, 'host', HOST, 'db', DB, 'command', COMMAND,
               'time', TIME, 'state', STATE, 'query', LEFT(INFO, 500))), JSON_ARRAY())
    FROM information_schema.PROCESSLIST";

const STATUS_SQL: &str = "
    SELECT COALESCE(JSON_OBJECTAGG(VARIABLE_NAME, VARIABLE_VALUE), JSON_OBJECT())
    FROM performance_schema.global_status";

const VARIABLES_SQL: &str = "
    SELECT COALESCE(JSON_OBJECTAGG(VARIABLE_NAME, VARIABLE_VALUE), JSON_OBJECT())
    FROM performance_schema.global_variables";

const INDEXES_SQL: &str = "
    SELECT COALESCE(JSON_ARRAYAGG(JSON_OBJECT(
               'database_name', t.TABLE_SCHEMA, 'tablename', t.TABLE_NAME,
               'indexname', t.INDEX_NAME, 'column_name', t.COLUMN_NAME,
               'seq_in_index', t.SEQ_IN_INDEX, 'non_unique', t.NON_UNIQUE,
               'cardinality', t.CARDINALITY)), JSON_ARRAY())
    FROM (SELECT TABLE_SCHEMA, TABLE_NAME, INDEX_NAME, COLUMN_NAME,
                 SEQ_IN_INDEX, NON_UNIQUE, CARDINALITY
          FROM information_schema.STATISTICS
          WHERE TABLE_SCHEMA NOT IN {system}
            AND (? IS NULL OR TABLE_SCHEMA = ?)
          ORDER BY TABLE_SCHEMA, TABLE_NAME, INDEX_NAME, SEQ_IN_INDEX
          LIMIT ?) t";

const TABLES_SQL: &str = "
    SELECT COALESCE(JSON_ARRAYAGG(JSON_OBJECT(
               'database_name', t.TABLE_SCHEMA, 'tablename', t.TABLE_NAME,
               'table_rows', t.TABLE_ROWS, 'data_size', t.DATA_LENGTH,
               'index_size', t.INDEX_LENGTH, 'data_free', t.DATA_FREE,
               'engine', t.ENGINE, 'collation', t.TABLE_COLLATION)), JSON_ARRAY())
    FROM (SELECT TABLE_SCHEMA, TABLE_NAME, TABLE_ROWS, DATA_LENGTH, INDEX_LENGTH,
                 DATA_FREE, ENGINE, TABLE_COLLATION
          FROM information_schema.TABLES
          WHERE TABLE_SCHEMA NOT IN {system}
            AND (? IS NULL OR TABLE_SCHEMA = ?)
          ORDER BY DATA_LENGTH + INDEX_LENGTH DESC
          LIMIT ?) t";

/// Collects server statistics from MySQL
#[derive(Debug, Clone)]
pub struct MySqlSource {
    host: String,
    port: u16,
    user: String,
    password: String,
    database: Option<String>,
    connect_timeout: Duration,
    query_timeout: Duration,
    read_only: bool,
    slow_query_limit: u64,
    table_limit: u64,
    index_limit: u64,
}

impl MySqlSource {
    /// Builds the source from its parameters
    pub fn from_params(params: &Map<String, Value>) -> anyhow::Result<Self> {
        let p = Params::new(params);
        let port = p.u64("port").unwrap_or(3306);
        let port =
            u16::try_from(port).map_err(|_| anyhow::anyhow!("invalid mysql port {}", port))?;

        Ok(Self {
            host: p.string_or("host", "localhost"),
            port,
            user: p.string_or("user", "root"),
            password: p.string_or("password", ""),
            database: p.string("database").filter(|s| !s.is_empty()),
            connect_timeout: Duration::from_secs(p.u64("connect_timeout").unwrap_or(10)),
            query_timeout: Duration::from_secs(p.u64("query_timeout").unwrap_or(30)),
            read_only: p.bool_or("read_only_mode", true),
            slow_query_limit: p.u64("slow_query_limit").unwrap_or(100),
            table_limit: p.u64("table_limit").unwrap_or(1000),
            index_limit: p.u64("index_limit").unwrap_or(5000),
        })
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        let options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .charset("utf8mb4");
        match &self.database {
            Some(database) => options.database(database),
            None => options,
        }
    }

    async fn connect(&self) -> Result<MySqlConnection, SourceError> {
        let target = format!("{}:{}", self.host, self.port);
        let options = self.connect_options();
        let attempt = MySqlConnection::connect_with(&options);

        match tokio::time::timeout(self.connect_timeout, attempt).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(SourceError::Connection(describe_connect_error(&target, &e))),
            Err(_) => Err(SourceError::Connection(format!(
                "Cannot connect to MySQL at {}: connection timed out after {:?}",
                target, self.connect_timeout
            ))),
        }
    }

    /// Limits the session's impact on the server
    async fn restrict_session(&self, conn: &mut MySqlConnection) {
        let timeout_sql = format!(
            "SET SESSION max_execution_time = {}",
            self.query_timeout.as_millis()
        );
        if let Err(e) = sqlx::query(&timeout_sql).execute(&mut *conn).await {
            warn!("Failed to set max_execution_time: {}", e);
        }
        if self.read_only {
            if let Err(e) = sqlx::query("SET SESSION TRANSACTION READ ONLY")
                .execute(&mut *conn)
                .await
            {
                warn!("Failed to switch session to read-only: {}", e);
            }
        }
    }

    /// Runs every query, recording failures instead of returning them
    async fn gather(&self, conn: &mut MySqlConnection) -> Map<String, Value> {
        let mut result = Map::new();
        result.insert("database_type".into(), json!("MySQL"));
        result.insert("host".into(), json!(self.host));
        result.insert("port".into(), json!(self.port));
        result.insert(
            "database".into(),
            json!(self.database.as_deref().unwrap_or("all")),
        );
        let mut errors: Vec<String> = Vec::new();
        let database = self.database.as_deref();

        self.restrict_session(conn).await;

        match sqlx::query_scalar::<_, String>("SELECT VERSION()")
            .fetch_one(&mut *conn)
            .await
        {
            Ok(version) => {
                result.insert("version".into(), json!(version));
            }
            Err(e) => errors.push(format!("version: {}", e)),
        }

        let databases = DATABASES_SQL.replace("{system}", SYSTEM_SCHEMAS);
        match sqlx::query_scalar::<_, Value>(&databases)
            .fetch_one(&mut *conn)
            .await
        {
            Ok(rows) => {
                result.insert("databases".into(), rows);
            }
            Err(e) => errors.push(format!("database list: {}", e)),
        }

        match sqlx::query_scalar::<_, Value>(SLOW_QUERIES_SQL)
            .bind(self.slow_query_limit)
            .fetch_one(&mut *conn)
            .await
        {
            Ok(rows) => {
                result.insert("slow_queries".into(), rows);
            }
            Err(e) => errors.push(format!(
                "slow queries: {} (requires SELECT on performance_schema)",
                e
            )),
        }

        for (key, label, sql) in [
            ("processlist", "process list", PROCESSLIST_SQL),
            ("status", "status", STATUS_SQL),
            ("variables", "variables", VARIABLES_SQL),
        ] {
            match sqlx::query_scalar::<_, Value>(sql).fetch_one(&mut *conn).await {
                Ok(value) => {
                    result.insert(key.into(), value);
                }
                Err(e) => errors.push(format!("{}: {}", label, e)),
            }
        }

        for (key, sql, limit) in [
            ("indexes", INDEXES_SQL, self.index_limit),
            ("tables", TABLES_SQL, self.table_limit),
        ] {
            let sql = sql.replace("{system}", SYSTEM_SCHEMAS);
            match sqlx::query_scalar::<_, Value>(&sql)
                .bind(database)
                .bind(database)
                .bind(limit)
                .fetch_one(&mut *conn)
                .await
            {
                Ok(rows) => {
                    result.insert(key.into(), rows);
                }
                Err(e) => errors.push(format!("{}: {}", key, e)),
            }
        }

        for error in &errors {
            warn!("MySQL collection partial failure: {}", error);
        }
        result.insert("errors".into(), json!(errors));
        result
    }
}

#[async_trait]
impl Source for MySqlSource {
    fn kind(&self) -> &'static str {
        "mysql"
    }

    async fn collect(&self) -> Result<Collected, SourceError> {
        info!("Collecting MySQL statistics from {}:{}", self.host, self.port);

        let mut conn = self.connect().await?;
        let result = self.gather(&mut conn).await;

        if let Err(e) = conn.close().await {
            warn!("Failed to close MySQL connection cleanly: {}", e);
        }

        debug!("MySQL collection finished with {} section(s)", result.len());
        Ok(Collected::Structured(Value::Object(result)))
    }

    async fn test_connection(&self) -> Result<ServerInfo, SourceError> {
        let mut conn = self.connect().await?;
        let version = sqlx::query_scalar::<_, String>("SELECT VERSION()")
            .fetch_one(&mut conn)
            .await;
        if let Err(e) = conn.close().await {
            warn!("Failed to close MySQL connection cleanly: {}", e);
        }

        let version = version
            .map_err(|e| SourceError::Connection(format!("MySQL version query failed: {}", e)))?;
        Ok(ServerInfo {
            database_type: "MySQL".to_string(),
            version: Some(version),
        })
    }
}

/// Human-readable connection failure with the likely cause
fn describe_connect_error(target: &str, err: &sqlx::Error) -> String {
    let detail = err.to_string();
    let lower = detail.to_lowercase();
    let hint = if lower.contains("refused") {
        "connection refused: check that MySQL is running and listening on this address"
    } else if lower.contains("access denied") {
        "authentication failed: check the user name, password and host grants"
    } else if lower.contains("timed out") || lower.contains("timeout") {
        "connection timed out: check network reachability and the host address"
    } else if lower.contains("unknown database") {
        "the requested database does not exist"
    } else {
        "unexpected connection failure"
    };
    format!("Cannot connect to MySQL at {}: {} ({})", target, hint, detail)
}
