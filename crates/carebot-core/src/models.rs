//! Core data models used throughout carebot.
//!
//! These types represent the documents, index descriptions, vectors and
//! query runs that flow between the loader, the index, the engine and the
//! trace store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Metadata key under which document text is stored alongside each vector.
pub const TEXT_KEY: &str = "page_content";

/// Metadata key flagging a record that holds an entire source document.
pub const WHOLE_DOCUMENT_KEY: &str = "is_whole_document";

/// Metadata key holding the path the document was loaded from.
pub const SOURCE_KEY: &str = "source";

/// A loaded document, consumed once by ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub content: String,
    pub metadata: Map<String, Value>,
}

impl Document {
    /// A whole-document record for `source` with the given text.
    pub fn whole(source: impl Into<String>, content: impl Into<String>) -> Self {
        let mut metadata = Map::new();
        metadata.insert(SOURCE_KEY.to_string(), Value::String(source.into()));
        metadata.insert(WHOLE_DOCUMENT_KEY.to_string(), Value::Bool(true));
        Self {
            content: content.into(),
            metadata,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(Value::as_str)
    }

    pub fn is_whole_document(&self) -> bool {
        self.metadata
            .get(WHOLE_DOCUMENT_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Similarity metric of a vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cosine,
    Euclidean,
    Dotproduct,
}

/// How a new index should be provisioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSpec {
    /// Pay-per-use index placed in a cloud region.
    Serverless { cloud: String, region: String },
    /// Statically provisioned pods in a fixed environment.
    Pod {
        environment: String,
        pod_type: String,
    },
}

impl IndexSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            IndexSpec::Serverless { .. } => "serverless",
            IndexSpec::Pod { .. } => "pod",
        }
    }
}

/// Everything needed to create an index.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexRequest {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub spec: IndexSpec,
}

/// Remote view of an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDescription {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    /// Data-plane host, when the service exposes one.
    pub host: Option<String>,
    pub ready: bool,
}

/// A vector with its metadata, as written to the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Map<String, Value>,
}

/// A nearest-neighbour match returned by the index.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Map<String, Value>,
}

impl ScoredMatch {
    /// Text stored with the vector, if any.
    pub fn text(&self) -> Option<&str> {
        self.metadata.get(TEXT_KEY).and_then(Value::as_str)
    }
}

/// A single logged question/answer interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub id: Uuid,
    pub project: String,
    pub question: String,
    pub sources: Vec<String>,
    pub answer: String,
    pub user_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}
