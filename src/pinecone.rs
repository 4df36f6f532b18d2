//! Pinecone vector database client.
//!
//! Implements the control plane ([`IndexControl`]) against the global
//! controller API and hands out data-plane handles ([`PineconeIndex`]) that
//! talk to the index's own host.
//!
//! Control plane (`https://api.pinecone.io`):
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list | `GET /indexes` |
//! | describe | `GET /indexes/{name}` |
//! | create | `POST /indexes` |
//! | delete | `DELETE /indexes/{name}`, then `GET` until 404 |
//!
//! Data plane (`https://{host}`): `POST /vectors/upsert`, `POST /query`,
//! `POST /vectors/delete`, `POST /describe_index_stats`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use carebot_core::error::{Error, Result};
use carebot_core::index::{IndexControl, VectorIndex};
use carebot_core::models::{
    CreateIndexRequest, IndexDescription, IndexSpec, Metric, ScoredMatch, VectorRecord,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};

use crate::http::{check_status, join_url, json_body};

const SERVICE: &str = "pinecone";
const API_VERSION: &str = "2024-07";

/// How long to wait for a new index to become ready, or for a deleted one
/// to disappear.
const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

// ============ Control plane ============

pub struct PineconeControl {
    client: Client,
    controller_url: String,
    api_key: String,
    ready_timeout: Duration,
    poll_interval: Duration,
}

impl PineconeControl {
    pub fn new(client: Client, controller_url: &str, api_key: &str) -> Self {
        Self {
            client,
            controller_url: controller_url.to_string(),
            api_key: api_key.to_string(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        authorize(
            self.client
                .request(method, join_url(&self.controller_url, path)),
            &self.api_key,
        )
    }

    async fn wait_until_ready(&self, name: &str) -> Result<IndexDescription> {
        let deadline = tokio::time::Instant::now() + self.ready_timeout;
        loop {
            let description = self.describe_index(name).await?;
            if description.ready {
                return Ok(description);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::remote(
                    SERVICE,
                    format!(
                        "index '{}' not ready after {}s",
                        name,
                        self.ready_timeout.as_secs()
                    ),
                ));
            }
            tracing::debug!(index = name, "waiting for index to become ready");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Deletion is asynchronous: the index stays `Terminating` and its name
    /// stays taken until `describe` returns 404.
    async fn wait_until_deleted(&self, name: &str) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.ready_timeout;
        loop {
            let response = self
                .request(reqwest::Method::GET, &format!("indexes/{}", name))
                .send()
                .await
                .map_err(send_err)?;
            if response.status() == StatusCode::NOT_FOUND {
                tracing::debug!(index = name, "index deleted");
                return Ok(());
            }
            check_status(SERVICE, response).await?;
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::remote(
                    SERVICE,
                    format!(
                        "index '{}' still terminating after {}s",
                        name,
                        self.ready_timeout.as_secs()
                    ),
                ));
            }
            tracing::debug!(index = name, "waiting for index deletion");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn authorize(builder: RequestBuilder, api_key: &str) -> RequestBuilder {
    builder
        .header("Api-Key", api_key)
        .header("X-Pinecone-API-Version", API_VERSION)
}

fn send_err(e: reqwest::Error) -> Error {
    Error::remote(SERVICE, e)
}

#[async_trait]
impl IndexControl for PineconeControl {
    async fn list_indexes(&self) -> Result<Vec<String>> {
        let response = self
            .request(reqwest::Method::GET, "indexes")
            .send()
            .await
            .map_err(send_err)?;
        let json = json_body(SERVICE, response).await?;
        parse_index_list(&json)
    }

    async fn describe_index(&self, name: &str) -> Result<IndexDescription> {
        let response = self
            .request(reqwest::Method::GET, &format!("indexes/{}", name))
            .send()
            .await
            .map_err(send_err)?;
        let json = json_body(SERVICE, response).await?;
        parse_index_description(&json)
    }

    async fn create_index(&self, request: &CreateIndexRequest) -> Result<IndexDescription> {
        let response = self
            .request(reqwest::Method::POST, "indexes")
            .json(&create_body(request))
            .send()
            .await
            .map_err(send_err)?;
        check_status(SERVICE, response).await?;
        self.wait_until_ready(&request.name).await
    }

    async fn delete_index(&self, name: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("indexes/{}", name))
            .send()
            .await
            .map_err(send_err)?;
        check_status(SERVICE, response).await?;
        self.wait_until_deleted(name).await
    }

    fn open(&self, description: &IndexDescription) -> Result<Arc<dyn VectorIndex>> {
        let host = description.host.as_deref().ok_or_else(|| {
            Error::remote(
                SERVICE,
                format!("index '{}' has no host yet", description.name),
            )
        })?;
        Ok(Arc::new(PineconeIndex {
            client: self.client.clone(),
            name: description.name.clone(),
            base_url: host_url(host),
            api_key: self.api_key.clone(),
        }))
    }
}

/// Request body for `POST /indexes`.
fn create_body(request: &CreateIndexRequest) -> Value {
    let spec = match &request.spec {
        IndexSpec::Serverless { cloud, region } => json!({
            "serverless": {"cloud": cloud, "region": region}
        }),
        IndexSpec::Pod {
            environment,
            pod_type,
        } => json!({
            "pod": {"environment": environment, "pod_type": pod_type, "pods": 1}
        }),
    };
    json!({
        "name": request.name,
        "dimension": request.dimension,
        "metric": request.metric,
        "spec": spec,
    })
}

fn host_url(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

fn parse_index_list(json: &Value) -> Result<Vec<String>> {
    let indexes = json
        .get("indexes")
        .and_then(|i| i.as_array())
        .ok_or_else(|| Error::remote(SERVICE, "invalid response: missing indexes array"))?;
    Ok(indexes
        .iter()
        .filter_map(|i| i.get("name").and_then(|n| n.as_str()))
        .map(str::to_string)
        .collect())
}

fn parse_index_description(json: &Value) -> Result<IndexDescription> {
    let name = json
        .get("name")
        .and_then(|n| n.as_str())
        .ok_or_else(|| Error::remote(SERVICE, "invalid response: missing index name"))?;
    let dimension = json
        .get("dimension")
        .and_then(|d| d.as_u64())
        .ok_or_else(|| Error::remote(SERVICE, "invalid response: missing dimension"))?;
    let metric = match json.get("metric").and_then(|m| m.as_str()) {
        Some("euclidean") => Metric::Euclidean,
        Some("dotproduct") => Metric::Dotproduct,
        _ => Metric::Cosine,
    };
    let host = json
        .get("host")
        .and_then(|h| h.as_str())
        .filter(|h| !h.is_empty())
        .map(str::to_string);
    let ready = json
        .pointer("/status/ready")
        .and_then(|r| r.as_bool())
        .unwrap_or(false);

    Ok(IndexDescription {
        name: name.to_string(),
        dimension: dimension as usize,
        metric,
        host,
        ready,
    })
}

// ============ Data plane ============

/// Data-plane handle for one Pinecone index.
pub struct PineconeIndex {
    client: Client,
    name: String,
    base_url: String,
    api_key: String,
}

impl PineconeIndex {
    fn post(&self, path: &str, body: &Value) -> RequestBuilder {
        authorize(
            self.client.post(join_url(&self.base_url, path)),
            &self.api_key,
        )
        .json(body)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        let body = json!({ "vectors": records });
        let response = self
            .post("vectors/upsert", &body)
            .send()
            .await
            .map_err(send_err)?;
        let json = json_body(SERVICE, response).await?;
        Ok(json
            .get("upsertedCount")
            .and_then(|c| c.as_u64())
            .map(|c| c as usize)
            .unwrap_or(records.len()))
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredMatch>> {
        let body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "includeValues": false,
        });
        let response = self
            .post("query", &body)
            .send()
            .await
            .map_err(send_err)?;
        let json = json_body(SERVICE, response).await?;
        parse_matches(&json)
    }

    async fn delete_all(&self) -> Result<()> {
        let response = self
            .post("vectors/delete", &json!({ "deleteAll": true }))
            .send()
            .await
            .map_err(send_err)?;
        // An index that never held vectors has no default namespace yet.
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(index = %self.name, "namespace not found, nothing to delete");
            return Ok(());
        }
        check_status(SERVICE, response).await?;
        Ok(())
    }

    async fn vector_count(&self) -> Result<u64> {
        let response = self
            .post("describe_index_stats", &json!({}))
            .send()
            .await
            .map_err(send_err)?;
        let json = json_body(SERVICE, response).await?;
        Ok(json
            .get("totalVectorCount")
            .and_then(|c| c.as_u64())
            .unwrap_or(0))
    }
}

fn parse_matches(json: &Value) -> Result<Vec<ScoredMatch>> {
    let Some(matches) = json.get("matches") else {
        return Ok(Vec::new());
    };
    let matches = matches
        .as_array()
        .ok_or_else(|| Error::remote(SERVICE, "invalid response: matches is not an array"))?;

    matches
        .iter()
        .map(|m| {
            let id = m
                .get("id")
                .and_then(|i| i.as_str())
                .ok_or_else(|| Error::remote(SERVICE, "invalid response: match without id"))?;
            Ok(ScoredMatch {
                id: id.to_string(),
                score: m.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32,
                metadata: m
                    .get("metadata")
                    .and_then(|md| md.as_object())
                    .cloned()
                    .unwrap_or_default(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index_list() {
        let json = json!({"indexes": [{"name": "care"}, {"name": "other"}]});
        assert_eq!(parse_index_list(&json).unwrap(), vec!["care", "other"]);
        assert!(parse_index_list(&json!({})).is_err());
    }

    #[test]
    fn test_parse_index_description() {
        let json = json!({
            "name": "care",
            "dimension": 768,
            "metric": "cosine",
            "host": "care-abc123.svc.aped-4627-b74a.pinecone.io",
            "spec": {"serverless": {"cloud": "aws", "region": "us-east-1"}},
            "status": {"ready": true, "state": "Ready"}
        });
        let d = parse_index_description(&json).unwrap();
        assert_eq!(d.name, "care");
        assert_eq!(d.dimension, 768);
        assert_eq!(d.metric, Metric::Cosine);
        assert!(d.ready);
        assert_eq!(
            host_url(d.host.as_deref().unwrap()),
            "https://care-abc123.svc.aped-4627-b74a.pinecone.io"
        );
    }

    #[test]
    fn test_parse_initializing_index_not_ready() {
        let json = json!({
            "name": "care",
            "dimension": 1024,
            "metric": "dotproduct",
            "host": "",
            "status": {"ready": false, "state": "Initializing"}
        });
        let d = parse_index_description(&json).unwrap();
        assert!(!d.ready);
        assert!(d.host.is_none());
        assert_eq!(d.metric, Metric::Dotproduct);
    }

    #[test]
    fn test_create_body_serverless_and_pod() {
        let mut request = CreateIndexRequest {
            name: "care".to_string(),
            dimension: 768,
            metric: Metric::Cosine,
            spec: IndexSpec::Serverless {
                cloud: "gcp".to_string(),
                region: "us-east1".to_string(),
            },
        };
        let body = create_body(&request);
        assert_eq!(body["metric"], "cosine");
        assert_eq!(body["dimension"], 768);
        assert_eq!(body["spec"]["serverless"]["cloud"], "gcp");

        request.spec = IndexSpec::Pod {
            environment: "us-east-1-aws".to_string(),
            pod_type: "p1.x1".to_string(),
        };
        let body = create_body(&request);
        assert_eq!(body["spec"]["pod"]["environment"], "us-east-1-aws");
        assert_eq!(body["spec"]["pod"]["pods"], 1);
        assert!(body["spec"].get("serverless").is_none());
    }

    #[test]
    fn test_parse_matches() {
        let json = json!({
            "matches": [
                {"id": "a", "score": 0.92, "metadata": {"page_content": "deductible", "source": "a.pdf"}},
                {"id": "b", "score": 0.41}
            ],
            "namespace": ""
        });
        let matches = parse_matches(&json).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].text(), Some("deductible"));
        assert!(matches[1].metadata.is_empty());
        assert!(parse_matches(&json!({})).unwrap().is_empty());
    }
}
