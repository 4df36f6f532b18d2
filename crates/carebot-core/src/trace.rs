//! Trace store abstraction: where query runs and feedback are recorded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::RunRecord;

/// Feedback key attached to user helpfulness scores.
pub const FEEDBACK_KEY: &str = "user_score";

/// A remote run/trace logging service.
#[async_trait]
pub trait TraceStore: Send + Sync {
    /// Names of all tracking projects.
    async fn list_projects(&self) -> Result<Vec<String>>;

    async fn create_project(&self, name: &str) -> Result<()>;

    /// Record a completed run.
    async fn create_run(&self, run: &RunRecord) -> Result<()>;

    /// Runs in `project` whose start time lies within `[start, end]`.
    async fn list_runs(
        &self,
        project: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Uuid>>;

    /// Attach a score under `key` to a previously created run.
    async fn create_feedback(&self, run_id: Uuid, key: &str, score: f64) -> Result<()>;
}
