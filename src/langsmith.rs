//! LangSmith trace store client.
//!
//! Projects are LangSmith "sessions". Runs are created as root `chain` runs
//! carrying the question, the retrieved sources and the answer, and are
//! counted through the cursor-paginated `POST /runs/query` endpoint.

use async_trait::async_trait;
use carebot_core::error::{Error, Result};
use carebot_core::models::RunRecord;
use carebot_core::trace::TraceStore;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::http::{check_status, join_url, json_body};

const SERVICE: &str = "langsmith";
const RUN_NAME: &str = "interpret_query";
const PAGE_SIZE: usize = 100;

pub struct LangSmithClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl LangSmithClient {
    pub fn new(client: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(join_url(&self.base_url, path))
            .header("x-api-key", &self.api_key)
    }

    fn post(&self, path: &str, body: &Value) -> RequestBuilder {
        self.client
            .post(join_url(&self.base_url, path))
            .header("x-api-key", &self.api_key)
            .json(body)
    }

    async fn sessions(&self, query: &[(&str, String)]) -> Result<Vec<Value>> {
        let response = self
            .get("sessions")
            .query(query)
            .send()
            .await
            .map_err(send_err)?;
        let json = json_body(SERVICE, response).await?;
        json.as_array()
            .cloned()
            .ok_or_else(|| Error::remote(SERVICE, "invalid response: expected a session list"))
    }

    async fn session_id(&self, project: &str) -> Result<String> {
        let sessions = self.sessions(&[("name", project.to_string())]).await?;
        sessions
            .iter()
            .find(|s| s.get("name").and_then(|n| n.as_str()) == Some(project))
            .and_then(|s| s.get("id").and_then(|i| i.as_str()))
            .map(str::to_string)
            .ok_or_else(|| Error::remote(SERVICE, format!("project '{}' not found", project)))
    }
}

fn send_err(e: reqwest::Error) -> Error {
    Error::remote(SERVICE, e)
}

#[async_trait]
impl TraceStore for LangSmithClient {
    async fn list_projects(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut offset = 0usize;
        loop {
            let page = self
                .sessions(&[
                    ("limit", PAGE_SIZE.to_string()),
                    ("offset", offset.to_string()),
                ])
                .await?;
            names.extend(
                page.iter()
                    .filter_map(|s| s.get("name").and_then(|n| n.as_str()))
                    .map(str::to_string),
            );
            if page.len() < PAGE_SIZE {
                return Ok(names);
            }
            offset += page.len();
        }
    }

    async fn create_project(&self, name: &str) -> Result<()> {
        let response = self
            .post("sessions", &json!({ "name": name }))
            .send()
            .await
            .map_err(send_err)?;
        check_status(SERVICE, response).await?;
        Ok(())
    }

    async fn create_run(&self, run: &RunRecord) -> Result<()> {
        let response = self
            .post("runs", &run_body(run))
            .send()
            .await
            .map_err(send_err)?;
        check_status(SERVICE, response).await?;
        tracing::debug!(run_id = %run.id, "run logged");
        Ok(())
    }

    async fn list_runs(
        &self,
        project: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        let session = self.session_id(project).await?;
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({
                "session": [session],
                "start_time": timestamp(start),
                "is_root": true,
                "limit": PAGE_SIZE,
                "select": ["id", "start_time"],
            });
            if let Some(c) = &cursor {
                body["cursor"] = json!(c);
            }

            let response = self
                .post("runs/query", &body)
                .send()
                .await
                .map_err(send_err)?;
            let page = json_body(SERVICE, response).await?;
            let (runs, next) = parse_runs_page(&page)?;
            ids.extend(
                runs.into_iter()
                    .filter(|(_, at)| *at >= start && *at <= end)
                    .map(|(id, _)| id),
            );

            match next {
                Some(next) => cursor = Some(next),
                None => return Ok(ids),
            }
        }
    }

    async fn create_feedback(&self, run_id: Uuid, key: &str, score: f64) -> Result<()> {
        let body = json!({
            "run_id": run_id,
            "key": key,
            "score": score,
        });
        let response = self
            .post("feedback", &body)
            .send()
            .await
            .map_err(send_err)?;
        check_status(SERVICE, response).await?;
        Ok(())
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Request body for `POST /runs`.
fn run_body(run: &RunRecord) -> Value {
    let mut metadata = serde_json::Map::new();
    if let Some(user_id) = &run.user_id {
        metadata.insert("user_id".to_string(), json!(user_id));
    }
    json!({
        "id": run.id,
        "name": RUN_NAME,
        "run_type": "chain",
        "session_name": run.project,
        "inputs": {"question": run.question},
        "outputs": {"answer": run.answer, "sources": run.sources},
        "start_time": timestamp(run.start_time),
        "end_time": timestamp(run.end_time),
        "extra": {"metadata": metadata},
    })
}

/// Runs in one query page plus the cursor of the next page, if any.
fn parse_runs_page(json: &Value) -> Result<(Vec<(Uuid, DateTime<Utc>)>, Option<String>)> {
    let runs = json
        .get("runs")
        .and_then(|r| r.as_array())
        .ok_or_else(|| Error::remote(SERVICE, "invalid response: missing runs array"))?;

    let mut parsed = Vec::with_capacity(runs.len());
    for run in runs {
        let id = run
            .get("id")
            .and_then(|i| i.as_str())
            .and_then(|i| Uuid::parse_str(i).ok())
            .ok_or_else(|| Error::remote(SERVICE, "invalid response: run without id"))?;
        let at = run
            .get("start_time")
            .and_then(|t| t.as_str())
            .and_then(parse_timestamp)
            .ok_or_else(|| Error::remote(SERVICE, "invalid response: run without start_time"))?;
        parsed.push((id, at));
    }

    let next = json
        .pointer("/cursors/next")
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    Ok((parsed, next))
}

/// RFC 3339, or the naive ISO form LangSmith uses for UTC times.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|t| t.and_utc())
        })
}
