//! Run and report registries
//!
//! Both are process-memory-resident and grow for the lifetime of the
//! process; nothing is ever evicted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use triage_core::domain::report::{Report, ReportSummary};
use triage_core::domain::run::{Run, RunId};
use triage_core::dto::report::ReportQuery;

/// Shared cell holding one run's state
///
/// Only the worker executing the run writes to it; status pollers read.
/// The lock makes each field update visible but readers are not promised a
/// consistent multi-field snapshot across consecutive updates. Driving the
/// same run from two workers is unsupported.
pub type RunCell = Arc<RwLock<Run>>;

#[derive(Default)]
struct RunTable {
    last_id: RunId,
    runs: HashMap<RunId, RunCell>,
}

/// Registry allocating run ids and tracking every run
#[derive(Default)]
pub struct RunRegistry {
    table: Mutex<RunTable>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next id and records a fresh run under it
    ///
    /// Allocation and insertion happen in one critical section, so the run
    /// is visible to [`RunRegistry::get`] as soon as this returns.
    pub fn create(&self, task_name: &str, label: Option<String>) -> RunCell {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.last_id += 1;
        let id = table.last_id;
        let cell = Arc::new(RwLock::new(Run::new(id, task_name, label)));
        table.runs.insert(id, Arc::clone(&cell));
        cell
    }

    /// Snapshot of a run's current state
    pub fn get(&self, id: RunId) -> Option<Run> {
        let cell = {
            let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table.runs.get(&id).cloned()
        }?;
        let run = cell.read().unwrap_or_else(PoisonError::into_inner).clone();
        Some(run)
    }

    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .runs
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Applies `update` to a run cell
pub fn update_run(cell: &RunCell, update: impl FnOnce(&mut Run)) {
    let mut run = cell.write().unwrap_or_else(PoisonError::into_inner);
    update(&mut run);
}

/// Registry of produced reports
///
/// Each report is stored under its composite key and reachable by its run id.
#[derive(Default)]
pub struct ReportRegistry {
    inner: RwLock<ReportTable>,
}

#[derive(Default)]
struct ReportTable {
    by_key: HashMap<String, Arc<Report>>,
    by_run: HashMap<RunId, Arc<Report>>,
}

impl ReportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a report under `base`, or `base_{run_id}` when `base` is taken
    ///
    /// The key is chosen and the report inserted under one write lock, so
    /// two runs finishing in the same second never share a key.
    ///
    /// # Returns
    /// The key the report was stored under
    pub fn insert_unique(&self, base: &str, mut report: Report) -> String {
        let mut table = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let key = if table.by_key.contains_key(base) {
            format!("{}_{}", base, report.run_id)
        } else {
            base.to_string()
        };
        report.id = key.clone();

        let report = Arc::new(report);
        table.by_run.insert(report.run_id, Arc::clone(&report));
        table.by_key.insert(key.clone(), report);
        key
    }

    /// Looks a report up by composite key, falling back to a run id
    pub fn get(&self, id: &str) -> Option<Report> {
        let table = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        table
            .by_key
            .get(id)
            .or_else(|| id.parse::<RunId>().ok().and_then(|run| table.by_run.get(&run)))
            .map(|report| Report::clone(report))
    }

    /// Newest-first summaries matching the query
    ///
    /// `start_time` and `end_time` are compared as strings against
    /// `%Y-%m-%dT%H:%M:%S` creation times. A `limit` of zero means no limit.
    pub fn list(&self, query: &ReportQuery) -> Vec<ReportSummary> {
        let table = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut matching: Vec<&Arc<Report>> = table
            .by_key
            .values()
            .filter(|r| query.label.as_ref().is_none_or(|label| &r.label == label))
            .filter(|r| {
                let created = r.created_at_key();
                query
                    .start_time
                    .as_ref()
                    .is_none_or(|start| created.as_str() >= start.as_str())
                    && query
                        .end_time
                        .as_ref()
                        .is_none_or(|end| created.as_str() <= end.as_str())
            })
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.run_id.cmp(&a.run_id)));
        matching
            .into_iter()
            .take(query.limit.filter(|&n| n > 0).unwrap_or(usize::MAX))
            .map(|r| ReportSummary::from(r.as_ref()))
            .collect()
    }
}
