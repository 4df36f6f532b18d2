//! Hugging Face inference embedding provider.
//!
//! Calls the `feature-extraction` pipeline:
//!
//! ```text
//! POST {base}/pipeline/feature-extraction/{model}
//! {"inputs": ["..."], "options": {"wait_for_model": true}}
//! ```
//!
//! Sentence-transformer models answer with one pooled vector per input.
//! Models without a pooling head answer with one vector per token; those are
//! mean-pooled here so callers always get one vector per input.

use async_trait::async_trait;
use carebot_core::embedding::Embedder;
use carebot_core::error::{Error, Result};
use reqwest::Client;
use serde_json::Value;

use crate::http::{join_url, json_body};

const SERVICE: &str = "huggingface";

pub struct HuggingFaceEmbedder {
    client: Client,
    base_url: String,
    model: String,
    token: Option<String>,
}

impl HuggingFaceEmbedder {
    pub fn new(client: Client, base_url: &str, model: &str, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            model: model.to_string(),
            token,
        }
    }
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = join_url(
            &self.base_url,
            &format!("pipeline/feature-extraction/{}", self.model),
        );
        let body = serde_json::json!({
            "inputs": texts,
            "options": {"wait_for_model": true},
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| Error::remote(SERVICE, e))?;
        let json = json_body(SERVICE, response).await?;

        let vectors = parse_feature_extraction(&json)?;
        if vectors.len() != texts.len() {
            return Err(Error::remote(
                SERVICE,
                format!(
                    "expected {} embeddings, received {}",
                    texts.len(),
                    vectors.len()
                ),
            ));
        }
        tracing::debug!(model = %self.model, count = vectors.len(), "embedded batch");
        Ok(vectors)
    }
}

/// Parse a feature-extraction response into one vector per input.
fn parse_feature_extraction(json: &Value) -> Result<Vec<Vec<f32>>> {
    if let Some(message) = json.get("error").and_then(|e| e.as_str()) {
        return Err(Error::remote(SERVICE, message));
    }

    let items = json
        .as_array()
        .ok_or_else(|| Error::remote(SERVICE, "invalid response: expected an array"))?;

    items.iter().map(pool_item).collect()
}

/// One input's embedding: a flat vector, or a token matrix to mean-pool.
fn pool_item(item: &Value) -> Result<Vec<f32>> {
    let rows = item
        .as_array()
        .ok_or_else(|| Error::remote(SERVICE, "invalid response: expected a vector"))?;

    if rows.iter().all(Value::is_number) {
        return Ok(rows.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect());
    }

    let mut sum: Vec<f32> = Vec::new();
    let mut count = 0usize;
    for row in rows {
        let row = row
            .as_array()
            .ok_or_else(|| Error::remote(SERVICE, "invalid response: ragged token matrix"))?;
        if sum.is_empty() {
            sum = vec![0.0; row.len()];
        }
        if row.len() != sum.len() {
            return Err(Error::remote(SERVICE, "invalid response: ragged token matrix"));
        }
        for (acc, v) in sum.iter_mut().zip(row) {
            *acc += v.as_f64().unwrap_or(0.0) as f32;
        }
        count += 1;
    }
    if count > 0 {
        for acc in &mut sum {
            *acc /= count as f32;
        }
    }
    Ok(sum)
}
