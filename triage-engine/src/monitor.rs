//! Scheduled monitoring
//!
//! Launches the configured task once a day at a fixed local hour, covering
//! the last `hours_ago` hours of container logs.

use chrono::{Local, NaiveDateTime, NaiveTime, TimeDelta};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use triage_core::dto::monitor::MonitorStatus;
use triage_core::dto::run::{LaunchedRun, RunOverrides};

use crate::config::MonitoringConfig;
use crate::error::ExecutorError;
use crate::executor::TaskExecutor;

/// First `hour:00` strictly after `now`
pub fn next_report_time(now: NaiveDateTime, hour: u32) -> NaiveDateTime {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date().and_time(at);
    if today > now {
        today
    } else {
        today + TimeDelta::days(1)
    }
}

/// Time to sleep before the next tick, capped at the report interval
pub fn delay_until_next(config: &MonitoringConfig, now: NaiveDateTime) -> Duration {
    let wait = (next_report_time(now, config.report_hour) - now)
        .to_std()
        .unwrap_or_default();
    wait.min(Duration::from_secs(config.report_interval))
}

/// Background scheduler for the daily summary report
pub struct Monitor {
    config: MonitoringConfig,
    executor: Arc<TaskExecutor>,
}

impl Monitor {
    pub fn new(config: MonitoringConfig, executor: Arc<TaskExecutor>) -> Self {
        Self { config, executor }
    }

    /// Schedule snapshot at `now`
    pub fn status(&self, now: NaiveDateTime) -> MonitorStatus {
        MonitorStatus {
            enabled: self.config.enabled,
            task: self.config.task.clone(),
            report_interval: self.config.report_interval,
            report_interval_hours: self.config.report_interval as f64 / 3600.0,
            report_hour: self.config.report_hour,
            next_report_time: next_report_time(now, self.config.report_hour),
            containers: self.watched_containers(),
            hours_ago: self.config.hours_ago,
        }
    }

    pub fn current_status(&self) -> MonitorStatus {
        self.status(Local::now().naive_local())
    }

    /// Configured containers, or the docker containers the task reads from
    pub fn watched_containers(&self) -> Vec<String> {
        if !self.config.containers.is_empty() {
            return self.config.containers.clone();
        }
        let Some(task) = self.executor.catalog().get_task(&self.config.task) else {
            return Vec::new();
        };

        let params = &task.source.params;
        match task.source.name.as_str() {
            "docker" | "docker_logs" => params
                .get("container_name")
                .and_then(Value::as_str)
                .map(|name| vec![name.to_string()])
                .unwrap_or_default(),
            _ => params
                .get("sources")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter(|s| s.get("type").and_then(Value::as_str) == Some("docker"))
                .filter_map(|s| s.get("container_name").and_then(Value::as_str))
                .map(str::to_string)
                .collect(),
        }
    }

    /// Launches one report covering every watched container
    ///
    /// # Returns
    /// `None` when there is nothing to watch
    pub fn trigger(&self) -> Result<Option<LaunchedRun>, ExecutorError> {
        let containers = self.watched_containers();
        if containers.is_empty() {
            warn!(
                "Monitoring task '{}' watches no containers, skipping report",
                self.config.task
            );
            return Ok(None);
        }

        info!(
            "Generating scheduled report for {:?} (last {}h)",
            containers, self.config.hours_ago
        );
        let overrides = RunOverrides {
            hours_ago: Some(self.config.hours_ago),
            ..Default::default()
        };
        self.executor.launch(&self.config.task, &overrides).map(Some)
    }

    /// Runs the schedule until the process exits
    pub async fn run(&self) {
        info!(
            "Starting monitor for task '{}' (report hour: {:02}:00, interval: {}s)",
            self.config.task, self.config.report_hour, self.config.report_interval
        );

        loop {
            let now = Local::now().naive_local();
            let wait = delay_until_next(&self.config, now);
            info!(
                "Next scheduled report at {} (in {:.1}h)",
                next_report_time(now, self.config.report_hour),
                wait.as_secs_f64() / 3600.0
            );
            tokio::time::sleep(wait).await;

            match self.trigger() {
                Ok(Some(launched)) => info!("Scheduled report launched as run {}", launched.run_id),
                Ok(None) => {}
                Err(e) => error!("Scheduled report failed to launch: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskCatalog;
    use crate::executor::StandardFactory;
    use chrono::NaiveDate;
    use serde_json::json;
    use triage_core::domain::task::{PluginSpec, TaskConfig};

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn config() -> MonitoringConfig {
        MonitoringConfig {
            enabled: true,
            task: "apps".into(),
            ..Default::default()
        }
    }

    fn monitor(config: MonitoringConfig) -> Monitor {
        let apps = TaskConfig {
            name: "apps".into(),
            source: PluginSpec::new("multi").with_param(
                "sources",
                json!([
                    { "type": "docker", "container_name": "api", "minutes_ago": 30 },
                    { "type": "file", "path": "/var/log/app.log" },
                    { "type": "docker", "container_name": "worker" }
                ]),
            ),
            analyzer: PluginSpec::new("chunked_llm"),
            sinks: vec![],
        };
        let files = TaskConfig {
            name: "files".into(),
            source: PluginSpec::new("file").with_param("path", "/var/log/app.log"),
            ..apps.clone()
        };
        let executor = TaskExecutor::new(
            TaskCatalog::new(vec![apps, files]),
            Arc::new(StandardFactory::default()),
        );
        Monitor::new(config, Arc::new(executor))
    }

    #[test]
    fn test_next_report_time_rolls_to_tomorrow() {
        assert_eq!(next_report_time(at(1, 30), 2), at(2, 0));
        assert_eq!(next_report_time(at(2, 0), 2), at(2, 0) + TimeDelta::days(1));
        assert_eq!(next_report_time(at(23, 59), 2), at(2, 0) + TimeDelta::days(1));
    }

    #[test]
    fn test_delay_is_capped_by_interval() {
        let config = config();
        assert_eq!(delay_until_next(&config, at(1, 0)), Duration::from_secs(3600));

        let hourly = MonitoringConfig {
            report_interval: 600,
            ..config
        };
        assert_eq!(delay_until_next(&hourly, at(1, 0)), Duration::from_secs(600));
    }

    #[test]
    fn test_status_reports_schedule() {
        let status = monitor(config()).status(at(8, 15));
        assert!(status.enabled);
        assert_eq!(status.report_interval_hours, 24.0);
        assert_eq!(status.next_report_time, at(2, 0) + TimeDelta::days(1));
        assert_eq!(status.containers, vec!["api", "worker"]);
        assert_eq!(status.hours_ago, 24);
    }

    #[test]
    fn test_configured_containers_win() {
        let monitor = monitor(MonitoringConfig {
            containers: vec!["billing".into()],
            ..config()
        });
        assert_eq!(monitor.watched_containers(), vec!["billing"]);
    }

    #[tokio::test]
    async fn test_trigger_launches_unlabelled_run() {
        let monitor = monitor(config());
        let launched = monitor.trigger().unwrap().unwrap();
        assert_eq!(launched.task_name, "apps");
        assert_eq!(launched.label, "all");
        assert!(monitor.executor.get_run(launched.run_id).is_some());
    }

    #[tokio::test]
    async fn test_trigger_skips_task_without_containers() {
        let monitor = monitor(MonitoringConfig {
            task: "files".into(),
            ..config()
        });
        assert!(monitor.trigger().unwrap().is_none());
    }
}
