//! PostgreSQL statistics source
//!
//! Opens one connection per `collect()` call, runs a fixed set of read-only
//! catalog queries and returns the results as a single JSON document. A
//! failed query is recorded in `errors` and does not abort the collection.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Collected, ServerInfo, Source};
use crate::error::SourceError;
use crate::params::Params;

const DATABASES_SQL: &str = "
    SELECT datname AS database_name,
           pg_database_size(datname)::bigint AS database_size
    FROM pg_database
    WHERE datistemplate = false
    ORDER BY pg_database_size(datname) DESC";

const SLOW_QUERIES_EXTENSION_SQL: &str =
    "SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = 'pg_stat_statements')";

const PROCESSLIST_SQL: &str = "
    SELECT pid, usename, application_name, client_addr::text AS client_addr, state,
           left(query, 500) AS query, query_start::text AS query_start
    FROM pg_stat_activity
    WHERE datname IS NOT NULL AND ($1::text IS NULL OR datname = $1)";

const STATUS_SQL: &str = "
    SELECT SUM(numbackends)::bigint AS connections,
           SUM(xact_commit)::bigint AS commits,
           SUM(xact_rollback)::bigint AS rollbacks,
           SUM(blks_read)::bigint AS disk_reads,
           SUM(blks_hit)::bigint AS cache_hits,
           SUM(tup_returned)::bigint AS tuples_returned,
           SUM(tup_fetched)::bigint AS tuples_fetched,
           SUM(tup_inserted)::bigint AS tuples_inserted,
           SUM(tup_updated)::bigint AS tuples_updated,
           SUM(tup_deleted)::bigint AS tuples_deleted
    FROM pg_stat_database
    WHERE datname NOT IN ('template0', 'template1')
      AND ($1::text IS NULL OR datname = $1)";

const VARIABLES_SQL: &str = "
    SELECT COALESCE(json_object_agg(name, json_build_object(
               'value', setting, 'unit', unit, 'context', context)), '{}'::json)
    FROM pg_settings
    WHERE context IN ('postmaster', 'sighup', 'superuser', 'user')
      AND (name LIKE '%timeout%' OR name LIKE '%memory%' OR name LIKE '%cache%'
           OR name LIKE '%connection%' OR name LIKE '%wal%' OR name LIKE '%checkpoint%'
           OR name LIKE '%shared_buffers%' OR name LIKE '%work_mem%'
           OR name = 'listen_addresses')";

/// Collects server statistics from PostgreSQL
#[derive(Debug, Clone)]
pub struct PostgresSource {
    host: String,
    port: u16,
    user: String,
    password: String,
    database: Option<String>,
    connect_timeout: Duration,
    query_timeout: Duration,
    slow_query_limit: u64,
    table_limit: u64,
    index_limit: u64,
}

impl PostgresSource {
    /// Builds the source from its parameters
    pub fn from_params(params: &Map<String, Value>) -> anyhow::Result<Self> {
        let p = Params::new(params);
        let port = p.u64("port").unwrap_or(5432);
        let port = u16::try_from(port)
            .map_err(|_| anyhow::anyhow!("invalid postgres port {}", port))?;

        Ok(Self {
            host: p.string_or("host", "localhost"),
            port,
            user: p.string_or("user", "postgres"),
            password: p.string_or("password", ""),
            database: p.string("database").filter(|s| !s.is_empty()),
            connect_timeout: Duration::from_secs(p.u64("connect_timeout").unwrap_or(10)),
            query_timeout: Duration::from_secs(p.u64("query_timeout").unwrap_or(30)),
            slow_query_limit: p.u64("slow_query_limit").unwrap_or(100),
            table_limit: p.u64("table_limit").unwrap_or(1000),
            index_limit: p.u64("index_limit").unwrap_or(5000),
        })
    }

    fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password);
        match &self.database {
            Some(database) => options.database(database),
            None => options,
        }
    }

    async fn connect(&self) -> Result<PgConnection, SourceError> {
        let target = format!("{}:{}", self.host, self.port);
        let options = self.connect_options();
        let attempt = PgConnection::connect_with(&options);

        match tokio::time::timeout(self.connect_timeout, attempt).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(SourceError::Connection(describe_connect_error(&target, &e))),
            Err(_) => Err(SourceError::Connection(format!(
                "Cannot connect to PostgreSQL at {}: connection timed out after {:?}",
                target, self.connect_timeout
            ))),
        }
    }

    /// Runs every query, recording failures instead of returning them
    async fn gather(&self, conn: &mut PgConnection) -> Map<String, Value> {
        let mut result = Map::new();
        result.insert("database_type".into(), json!("PostgreSQL"));
        result.insert("host".into(), json!(self.host));
        result.insert("port".into(), json!(self.port));
        result.insert(
            "database".into(),
            json!(self.database.as_deref().unwrap_or("all")),
        );
        let mut errors: Vec<String> = Vec::new();
        let database = self.database.as_deref();

        let timeout_sql = format!(
            "SET statement_timeout = '{}ms'",
            self.query_timeout.as_millis()
        );
        if let Err(e) = sqlx::query(&timeout_sql).execute(&mut *conn).await {
            warn!("Failed to set statement_timeout: {}", e);
        }

        match sqlx::query_scalar::<_, String>("SELECT version()")
            .fetch_one(&mut *conn)
            .await
        {
            Ok(version) => {
                result.insert("version".into(), json!(version));
            }
            Err(e) => errors.push(format!("version: {}", e)),
        }

        match fetch_rows(conn, DATABASES_SQL, None).await {
            Ok(rows) => {
                result.insert("databases".into(), rows);
            }
            Err(e) => errors.push(format!("database list: {}", e)),
        }

        match sqlx::query_scalar::<_, bool>(SLOW_QUERIES_EXTENSION_SQL)
            .fetch_one(&mut *conn)
            .await
        {
            Ok(true) => {
                let sql = format!(
                    "SELECT left(query, 500) AS query, calls::bigint AS exec_count,
                            (mean_exec_time / 1000.0)::float8 AS avg_time_sec,
                            (max_exec_time / 1000.0)::float8 AS max_time_sec,
                            (total_exec_time / 1000.0)::float8 AS sum_time_sec
                     FROM pg_stat_statements
                     WHERE mean_exec_time > 0
                     ORDER BY total_exec_time DESC
                     LIMIT {}",
                    self.slow_query_limit
                );
                match fetch_rows(conn, &sql, None).await {
                    Ok(rows) => {
                        result.insert("slow_queries".into(), rows);
                    }
                    Err(e) => errors.push(format!("slow queries: {}", e)),
                }
            }
            Ok(false) => {
                errors.push("slow queries skipped: pg_stat_statements is not installed".into())
            }
            Err(e) => errors.push(format!("slow queries: {}", e)),
        }

        match fetch_rows(conn, PROCESSLIST_SQL, Some(database)).await {
            Ok(rows) => {
                result.insert("processlist".into(), rows);
            }
            Err(e) => errors.push(format!("process list: {}", e)),
        }

        let status = format!("SELECT row_to_json(t) FROM ({}) t", STATUS_SQL);
        match sqlx::query_scalar::<_, Value>(&status)
            .bind(database)
            .fetch_optional(&mut *conn)
            .await
        {
            Ok(row) => {
                result.insert("status".into(), row.unwrap_or_else(|| json!({})));
            }
            Err(e) => errors.push(format!("status: {}", e)),
        }

        match sqlx::query_scalar::<_, Value>(VARIABLES_SQL)
            .fetch_one(&mut *conn)
            .await
        {
            Ok(variables) => {
                result.insert("variables".into(), variables);
            }
            Err(e) => errors.push(format!("variables: {}", e)),
        }

        let indexes = format!(
            "SELECT schemaname, tablename, indexname,
                    CASE WHEN indexdef LIKE '%PRIMARY KEY%' THEN 'PRIMARY KEY'
                         WHEN indexdef LIKE '%UNIQUE%' THEN 'UNIQUE'
                         ELSE 'INDEX' END AS index_type
             FROM pg_indexes
             WHERE schemaname NOT IN ('pg_catalog', 'information_schema')
             ORDER BY schemaname, tablename, indexname
             LIMIT {}",
            self.index_limit
        );
        match fetch_rows(conn, &indexes, None).await {
            Ok(rows) => {
                result.insert("indexes".into(), rows);
            }
            Err(e) => errors.push(format!("indexes: {}", e)),
        }

        let tables = format!(
            "SELECT current_database() AS database_name,
                    nsp.nspname AS schemaname,
                    cls.relname AS tablename,
                    COALESCE(stat.n_live_tup, 0)::bigint AS table_rows,
                    pg_total_relation_size(cls.oid)::bigint AS total_size,
                    pg_relation_size(cls.oid)::bigint AS data_size,
                    pg_indexes_size(cls.oid)::bigint AS index_size
             FROM pg_class cls
             JOIN pg_namespace nsp ON nsp.oid = cls.relnamespace
             LEFT JOIN pg_stat_user_tables stat ON stat.relid = cls.oid
             WHERE cls.relkind = 'r'
               AND nsp.nspname NOT IN ('pg_catalog', 'information_schema')
             ORDER BY pg_total_relation_size(cls.oid) DESC
             LIMIT {}",
            self.table_limit
        );
        match fetch_rows(conn, &tables, None).await {
            Ok(rows) => {
                result.insert("tables".into(), rows);
            }
            Err(e) => errors.push(format!("tables: {}", e)),
        }

        for error in &errors {
            warn!("PostgreSQL collection partial failure: {}", error);
        }
        result.insert("errors".into(), json!(errors));
        result
    }
}

#[async_trait]
impl Source for PostgresSource {
    fn kind(&self) -> &'static str {
        "postgres"
    }

    async fn collect(&self) -> Result<Collected, SourceError> {
        info!("Collecting PostgreSQL statistics from {}:{}", self.host, self.port);

        let mut conn = self.connect().await?;
        let result = self.gather(&mut conn).await;

        if let Err(e) = conn.close().await {
            warn!("Failed to close PostgreSQL connection cleanly: {}", e);
        }

        debug!("PostgreSQL collection finished with {} section(s)", result.len());
        Ok(Collected::Structured(Value::Object(result)))
    }

    async fn test_connection(&self) -> Result<ServerInfo, SourceError> {
        let mut conn = self.connect().await?;
        let version = sqlx::query_scalar::<_, String>("SELECT version()")
            .fetch_one(&mut conn)
            .await;
        if let Err(e) = conn.close().await {
            warn!("Failed to close PostgreSQL connection cleanly: {}", e);
        }

        let version = version.map_err(|e| {
            SourceError::Connection(format!("PostgreSQL version query failed: {}", e))
        })?;
        Ok(ServerInfo {
            database_type: "PostgreSQL".to_string(),
            version: Some(short_version(&version)),
        })
    }
}

/// `PostgreSQL 16.2 on x86_64-pc-linux-gnu, compiled by ...` without the build details
fn short_version(version: &str) -> String {
    version.split(',').next().unwrap_or(version).trim().to_string()
}

/// Runs `sql` and returns its rows as a JSON array
///
/// `database` is bound as `$1` when given.
async fn fetch_rows(
    conn: &mut PgConnection,
    sql: &str,
    database: Option<Option<&str>>,
) -> Result<Value, sqlx::Error> {
    let wrapped = format!("SELECT COALESCE(json_agg(t), '[]'::json) FROM ({}) t", sql);
    let query = sqlx::query_scalar::<_, Value>(&wrapped);
    let query = match database {
        Some(database) => query.bind(database),
        None => query,
    };
    query.fetch_one(conn).await
}

/// Human-readable connection failure with the likely cause
fn describe_connect_error(target: &str, err: &sqlx::Error) -> String {
    let detail = err.to_string();
    let lower = detail.to_lowercase();
    let hint = if lower.contains("refused") {
        "connection refused: check that PostgreSQL is running and listening on this address"
    } else if lower.contains("password") || lower.contains("authentication") {
        "authentication failed: check the user name and password"
    } else if lower.contains("timed out") || lower.contains("timeout") {
        "connection timed out: check network reachability and the host address"
    } else if lower.contains("does not exist") {
        "the requested database does not exist"
    } else {
        "unexpected connection failure"
    };
    format!("Cannot connect to PostgreSQL at {}: {} ({})", target, hint, detail)
}
