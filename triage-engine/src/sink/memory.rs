//! In-process report store and its sink

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use triage_core::domain::task::ReportMetadata;

use super::{Sink, SinkKind, report_stem};
use crate::error::SinkError;

/// Shared, append-only list of `(key, content)` pairs
///
/// Cloning yields a handle to the same store.
#[derive(Clone, Default)]
pub struct ReportStore {
    entries: Arc<Mutex<Vec<(String, String)>>>,
}

impl ReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, key: impl Into<String>, content: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key.into(), content.into()));
    }

    /// Snapshot of every stored report, oldest first
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Most recent content stored under `key`
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, content)| content.clone())
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sink appending to a [`ReportStore`]
#[derive(Clone)]
pub struct MemorySink {
    store: ReportStore,
}

impl MemorySink {
    pub fn new(store: ReportStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Sink for MemorySink {
    fn kind(&self) -> SinkKind {
        SinkKind::Memory
    }

    async fn save(
        &self,
        report: &str,
        metadata: &ReportMetadata,
    ) -> Result<Option<String>, SinkError> {
        let key = report_stem(metadata);
        self.store.add(key.clone(), report);
        Ok(Some(format!("memory://{}", key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::test_metadata;

    #[tokio::test]
    async fn test_memory_sink_shares_store() {
        let store = ReportStore::new();
        let sink = MemorySink::new(store.clone());

        let location = sink.save("body", &test_metadata("api")).await.unwrap();

        assert_eq!(location.as_deref(), Some("memory://20240102_030405_api"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("20240102_030405_api").as_deref(), Some("body"));
    }

    #[test]
    fn test_get_returns_latest() {
        let store = ReportStore::new();
        store.add("k", "old");
        store.add("k", "new");
        assert_eq!(store.get("k").as_deref(), Some("new"));
        assert_eq!(store.entries().len(), 2);
        assert!(store.get("missing").is_none());
    }
}
