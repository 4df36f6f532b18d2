//! Usage reporting over logged runs.
//!
//! The [`Monitor`] counts runs recorded for one tracking project between two
//! calendar dates. Both dates are inclusive: the window runs from
//! `start 00:00:00` to `end 23:59:59` UTC.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::error::{Error, Result};
use crate::trace::TraceStore;

/// Accepted date format for report bounds.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct Monitor {
    store: Arc<dyn TraceStore>,
    project: String,
}

impl Monitor {
    pub fn new(store: Arc<dyn TraceStore>, project: impl Into<String>) -> Self {
        Self {
            store,
            project: project.into(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Create the tracking project unless it already exists. Returns `true`
    /// when it was created.
    pub async fn ensure_project(&self) -> Result<bool> {
        let projects = self.store.list_projects().await?;
        if projects.iter().any(|p| p == &self.project) {
            tracing::debug!(project = %self.project, "tracking project exists");
            return Ok(false);
        }
        self.store.create_project(&self.project).await?;
        tracing::info!(project = %self.project, "created tracking project");
        Ok(true)
    }

    /// Names of all tracking projects.
    pub async fn list_projects(&self) -> Result<Vec<String>> {
        self.store.list_projects().await
    }

    /// Number of runs started between `start` and `end` (`YYYY-MM-DD`).
    /// Creates the tracking project first if it is missing.
    pub async fn count_runs(&self, start: &str, end: &str) -> Result<usize> {
        let (from, to) = report_window(start, end)?;
        self.ensure_project().await?;
        let runs = self.store.list_runs(&self.project, from, to).await?;
        Ok(runs.len())
    }

    /// Human-readable run count for the date range.
    pub async fn report(&self, start: &str, end: &str) -> Result<String> {
        let count = self.count_runs(start, end).await?;
        Ok(format!(
            "Total runs between {} and {}: {}",
            start.trim(),
            end.trim(),
            count
        ))
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT).map_err(|_| {
        Error::invalid_input(format!(
            "invalid date '{}', expected YYYY-MM-DD",
            input.trim()
        ))
    })
}

/// Inclusive UTC window covering every second of `start` through `end`.
pub fn report_window(start: &str, end: &str) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let start = parse_date(start)?;
    let end = parse_date(end)?;
    if start > end {
        return Err(Error::invalid_input(format!(
            "start date {} is after end date {}",
            start, end
        )));
    }
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59)
        .ok_or_else(|| Error::invalid_input("invalid end-of-day time"))?;
    Ok((
        start.and_time(NaiveTime::MIN).and_utc(),
        end.and_time(end_of_day).and_utc(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTraceStore;
    use crate::models::RunRecord;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn run_at(project: &str, at: DateTime<Utc>) -> RunRecord {
        RunRecord {
            id: Uuid::new_v4(),
            project: project.to_string(),
            question: "q".to_string(),
            sources: vec![],
            answer: "a".to_string(),
            user_id: None,
            start_time: at,
            end_time: at,
        }
    }

    async fn seeded() -> (Arc<MemoryTraceStore>, Monitor) {
        let store = Arc::new(MemoryTraceStore::new());
        for (day, hour) in [(1, 0), (2, 12), (3, 23)] {
            let at = Utc.with_ymd_and_hms(2024, 5, day, hour, 30, 0).unwrap();
            store.create_run(&run_at("engine", at)).await.unwrap();
        }
        let other = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();
        store.create_run(&run_at("other", other)).await.unwrap();
        let monitor = Monitor::new(store.clone(), "engine");
        (store, monitor)
    }

    #[test]
    fn test_window_is_inclusive() {
        let (from, to) = report_window("2024-05-01", "2024-05-01").unwrap();
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 59).unwrap());
    }

    #[test]
    fn test_rejects_bad_dates() {
        assert!(matches!(
            report_window("2024/05/01", "2024-05-02"),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            report_window("2024-05-03", "2024-05-01"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_report_counts_project_runs() {
        let (_store, monitor) = seeded().await;
        let report = monitor.report("2024-05-01", "2024-05-03").await.unwrap();
        assert_eq!(report, "Total runs between 2024-05-01 and 2024-05-03: 3");
    }

    #[tokio::test]
    async fn test_report_end_day_included() {
        let (_store, monitor) = seeded().await;
        assert_eq!(monitor.count_runs("2024-05-03", "2024-05-03").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_report_empty_window() {
        let (_store, monitor) = seeded().await;
        let report = monitor.report("2023-01-01", "2023-01-31").await.unwrap();
        assert_eq!(report, "Total runs between 2023-01-01 and 2023-01-31: 0");
    }

    #[tokio::test]
    async fn test_ensure_project_idempotent() {
        let store = Arc::new(MemoryTraceStore::new());
        let monitor = Monitor::new(store.clone(), "engine");

        assert!(monitor.ensure_project().await.unwrap());
        assert!(!monitor.ensure_project().await.unwrap());

        assert_eq!(store.project_creations(), 1);
        assert_eq!(monitor.list_projects().await.unwrap(), vec!["engine".to_string()]);
    }

    #[tokio::test]
    async fn test_report_creates_project_once() {
        let store = Arc::new(MemoryTraceStore::new());
        let monitor = Monitor::new(store.clone(), "engine");

        let report = monitor.report("2024-01-01", "2024-01-02").await.unwrap();
        assert_eq!(report, "Total runs between 2024-01-01 and 2024-01-02: 0");
        monitor.report("2024-01-01", "2024-01-02").await.unwrap();

        assert_eq!(store.project_creations(), 1);
        assert_eq!(monitor.list_projects().await.unwrap(), vec!["engine".to_string()]);
    }

    #[tokio::test]
    async fn test_bad_dates_do_not_create_project() {
        let store = Arc::new(MemoryTraceStore::new());
        let monitor = Monitor::new(store.clone(), "engine");

        assert!(monitor.report("2024-13-01", "2024-12-31").await.is_err());
        assert_eq!(store.project_creations(), 0);
    }
}
