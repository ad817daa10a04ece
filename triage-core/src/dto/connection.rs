//! Connection test DTOs

use serde::{Deserialize, Serialize};

/// Outcome of a connection test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Success,
    Failed,
}

/// Result of connecting to a data source without collecting from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTest {
    pub status: ConnectionStatus,
    pub message: String,
    /// Backend name, e.g. `PostgreSQL`, or the source name when unknown
    pub database_type: String,
    pub version: Option<String>,
    pub error: Option<String>,
}

impl ConnectionTest {
    pub fn success(database_type: impl Into<String>, version: Option<String>) -> Self {
        Self {
            status: ConnectionStatus::Success,
            message: "Connection succeeded".to_string(),
            database_type: database_type.into(),
            version,
            error: None,
        }
    }

    pub fn failed(database_type: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: ConnectionStatus::Failed,
            message: "Connection failed".to_string(),
            database_type: database_type.into(),
            version: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ConnectionStatus::Success
    }
}
