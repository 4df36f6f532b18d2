//! In-memory collaborators for tests and offline runs.
//!
//! Every hosted service carebot talks to has a stand-in here:
//!
//! | Type | Stands in for |
//! |------|---------------|
//! | [`HashingEmbedder`] | embedding inference service |
//! | [`MemoryIndexService`] | vector database control + data plane |
//! | [`StaticChat`] | chat-completion model |
//! | [`MemoryTraceStore`] | run/trace logging service |
//!
//! State lives behind `std::sync::RwLock`; search is brute-force cosine
//! similarity. Services record the calls they receive so tests can assert
//! on side effects.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::chat::{ChatMessage, ChatModel};
use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{Error, Result};
use crate::index::{IndexControl, VectorIndex};
use crate::models::{
    CreateIndexRequest, IndexDescription, IndexSpec, Metric, RunRecord, ScoredMatch,
    VectorRecord,
};
use crate::trace::TraceStore;

// ============ Embedder ============

/// Deterministic feature-hashing embedder.
///
/// Each lowercase alphanumeric token is hashed into one of `dims` buckets
/// with a hashed sign. Identical texts always produce identical vectors.
pub struct HashingEmbedder {
    model: String,
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(model: impl Into<String>, dims: usize) -> Self {
        Self {
            model: model.into(),
            dims,
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        if self.dims == 0 {
            return vector;
        }
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) as usize
                % self.dims;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

// ============ Vector index ============

/// A call received by [`MemoryIndexService`] or one of its handles.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexCall {
    List,
    Describe(String),
    /// Creation attempt with the given spec, successful or not.
    Create(IndexSpec),
    Delete(String),
    /// Upsert of this many records.
    Upsert(usize),
    Query,
    DeleteAll,
}

struct StoredIndex {
    description: IndexDescription,
    spec: IndexSpec,
    records: BTreeMap<String, VectorRecord>,
}

#[derive(Default)]
struct IndexState {
    indexes: HashMap<String, StoredIndex>,
    calls: Vec<IndexCall>,
    reject_serverless: bool,
    reject_pod: bool,
}

/// In-memory vector database. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryIndexService {
    state: Arc<RwLock<IndexState>>,
}

impl MemoryIndexService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index directly, without recording a call.
    pub fn seed_index(&self, name: &str, dimension: usize) {
        let mut state = self.state.write().unwrap();
        state.indexes.insert(
            name.to_string(),
            StoredIndex {
                description: describe(name, dimension, Metric::Cosine),
                spec: IndexSpec::Serverless {
                    cloud: "aws".to_string(),
                    region: "us-east-1".to_string(),
                },
                records: BTreeMap::new(),
            },
        );
    }

    /// Make serverless creation attempts fail.
    pub fn reject_serverless(&self, reject: bool) {
        self.state.write().unwrap().reject_serverless = reject;
    }

    /// Make pod creation attempts fail.
    pub fn reject_pod(&self, reject: bool) {
        self.state.write().unwrap().reject_pod = reject;
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<IndexCall> {
        self.state.read().unwrap().calls.clone()
    }

    /// Spec the named index was created with.
    pub fn spec_of(&self, name: &str) -> Option<IndexSpec> {
        self.state
            .read()
            .unwrap()
            .indexes
            .get(name)
            .map(|i| i.spec.clone())
    }

    fn record(&self, call: IndexCall) {
        self.state.write().unwrap().calls.push(call);
    }
}

fn describe(name: &str, dimension: usize, metric: Metric) -> IndexDescription {
    IndexDescription {
        name: name.to_string(),
        dimension,
        metric,
        host: Some(format!("memory://{}", name)),
        ready: true,
    }
}

fn not_found(name: &str) -> Error {
    Error::remote("memory-index", format!("index '{}' not found", name))
}

#[async_trait]
impl IndexControl for MemoryIndexService {
    async fn list_indexes(&self) -> Result<Vec<String>> {
        self.record(IndexCall::List);
        let mut names: Vec<String> = self.state.read().unwrap().indexes.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn describe_index(&self, name: &str) -> Result<IndexDescription> {
        self.record(IndexCall::Describe(name.to_string()));
        self.state
            .read()
            .unwrap()
            .indexes
            .get(name)
            .map(|i| i.description.clone())
            .ok_or_else(|| not_found(name))
    }

    async fn create_index(&self, request: &CreateIndexRequest) -> Result<IndexDescription> {
        let mut state = self.state.write().unwrap();
        state.calls.push(IndexCall::Create(request.spec.clone()));

        let rejected = match request.spec {
            IndexSpec::Serverless { .. } => state.reject_serverless,
            IndexSpec::Pod { .. } => state.reject_pod,
        };
        if rejected {
            return Err(Error::remote(
                "memory-index",
                format!("{} index creation rejected", request.spec.kind()),
            ));
        }
        if state.indexes.contains_key(&request.name) {
            return Err(Error::remote(
                "memory-index",
                format!("index '{}' already exists", request.name),
            ));
        }

        let description = describe(&request.name, request.dimension, request.metric);
        state.indexes.insert(
            request.name.clone(),
            StoredIndex {
                description: description.clone(),
                spec: request.spec.clone(),
                records: BTreeMap::new(),
            },
        );
        Ok(description)
    }

    async fn delete_index(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.calls.push(IndexCall::Delete(name.to_string()));
        state
            .indexes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }

    fn open(&self, description: &IndexDescription) -> Result<Arc<dyn VectorIndex>> {
        Ok(Arc::new(MemoryVectorIndex {
            name: description.name.clone(),
            service: self.clone(),
        }))
    }
}

/// Data-plane handle onto one index of a [`MemoryIndexService`].
///
/// Resolves the index by name on every call, so a handle keeps working
/// across delete-and-recreate.
pub struct MemoryVectorIndex {
    name: String,
    service: MemoryIndexService,
}

fn check_dimension(index: &StoredIndex, len: usize) -> Result<()> {
    if index.description.dimension != len {
        return Err(Error::remote(
            "memory-index",
            format!(
                "vector dimension {} does not match the dimension of the index {}",
                len, index.description.dimension
            ),
        ));
    }
    Ok(())
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        let mut state = self.service.state.write().unwrap();
        state.calls.push(IndexCall::Upsert(records.len()));
        let index = state
            .indexes
            .get_mut(&self.name)
            .ok_or_else(|| not_found(&self.name))?;
        for record in records {
            check_dimension(index, record.values.len())?;
        }
        for record in records {
            index.records.insert(record.id.clone(), record.clone());
        }
        Ok(records.len())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredMatch>> {
        let mut state = self.service.state.write().unwrap();
        state.calls.push(IndexCall::Query);
        let index = state
            .indexes
            .get(&self.name)
            .ok_or_else(|| not_found(&self.name))?;
        check_dimension(index, vector.len())?;

        let mut matches: Vec<ScoredMatch> = index
            .records
            .values()
            .map(|r| ScoredMatch {
                id: r.id.clone(),
                score: cosine_similarity(vector, &r.values),
                metadata: r.metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete_all(&self) -> Result<()> {
        let mut state = self.service.state.write().unwrap();
        state.calls.push(IndexCall::DeleteAll);
        let index = state
            .indexes
            .get_mut(&self.name)
            .ok_or_else(|| not_found(&self.name))?;
        index.records.clear();
        Ok(())
    }

    async fn vector_count(&self) -> Result<u64> {
        let state = self.service.state.read().unwrap();
        let index = state
            .indexes
            .get(&self.name)
            .ok_or_else(|| not_found(&self.name))?;
        Ok(index.records.len() as u64)
    }
}

// ============ Chat ============

/// Chat model that always gives the same reply (or the same failure) and
/// remembers every prompt it was sent.
pub struct StaticChat {
    reply: std::result::Result<String, String>,
    prompts: RwLock<Vec<String>>,
}

impl StaticChat {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: Ok(reply.into()),
            prompts: RwLock::new(Vec::new()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            reply: Err(message.into()),
            prompts: RwLock::new(Vec::new()),
        }
    }

    /// Last message content of every completion request, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.read().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for StaticChat {
    fn model_name(&self) -> &str {
        "static"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.prompts.write().unwrap().push(prompt);
        self.reply
            .clone()
            .map_err(|message| Error::remote("static-chat", message))
    }
}

// ============ Trace store ============

#[derive(Default)]
struct TraceState {
    projects: Vec<String>,
    runs: Vec<RunRecord>,
    feedback: Vec<(Uuid, String, f64)>,
    project_creations: usize,
}

/// In-memory run and feedback log.
#[derive(Default)]
pub struct MemoryTraceStore {
    state: RwLock<TraceState>,
}

impl MemoryTraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        self.state.read().unwrap().runs.clone()
    }

    /// `(run_id, key, score)` triples in submission order.
    pub fn feedback(&self) -> Vec<(Uuid, String, f64)> {
        self.state.read().unwrap().feedback.clone()
    }

    /// How many times `create_project` actually created a project.
    pub fn project_creations(&self) -> usize {
        self.state.read().unwrap().project_creations
    }
}

#[async_trait]
impl TraceStore for MemoryTraceStore {
    async fn list_projects(&self) -> Result<Vec<String>> {
        Ok(self.state.read().unwrap().projects.clone())
    }

    async fn create_project(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.projects.iter().any(|p| p == name) {
            return Err(Error::remote(
                "memory-trace",
                format!("project '{}' already exists", name),
            ));
        }
        state.projects.push(name.to_string());
        state.project_creations += 1;
        Ok(())
    }

    async fn create_run(&self, run: &RunRecord) -> Result<()> {
        self.state.write().unwrap().runs.push(run.clone());
        Ok(())
    }

    async fn list_runs(
        &self,
        project: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .runs
            .iter()
            .filter(|r| r.project == project && r.start_time >= start && r.start_time <= end)
            .map(|r| r.id)
            .collect())
    }

    async fn create_feedback(&self, run_id: Uuid, key: &str, score: f64) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if !state.runs.iter().any(|r| r.id == run_id) {
            return Err(Error::remote(
                "memory-trace",
                format!("run {} not found", run_id),
            ));
        }
        state.feedback.push((run_id, key.to_string(), score));
        Ok(())
    }
}
