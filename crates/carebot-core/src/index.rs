//! Vector index abstraction and lifecycle management.
//!
//! The [`IndexControl`] trait covers the control plane of a hosted vector
//! database (list, describe, create, delete) and hands out
//! [`VectorIndex`] data-plane handles (upsert, query, delete-all).
//!
//! [`ensure_index`] guarantees a queryable index whose dimension matches the
//! active embedding model:
//!
//! ```text
//!   probe dimension ──▶ listed? ──no──▶ create (plan)
//!                          │
//!                         yes
//!                          ▼
//!                     same dim? ──yes──▶ existing handle
//!                          │
//!                          no ──▶ allow_recreate? ──no──▶ DimensionMismatch
//!                                        │
//!                                       yes ──▶ delete ──▶ create (plan)
//! ```
//!
//! Creation follows an ordered plan of [`IndexSpec`]s: a serverless spec in
//! the hinted region, then a pod spec. The pod spec does not carry the region
//! hint.

use std::sync::Arc;

use async_trait::async_trait;

use crate::embedding::{probe_dimension, Embedder};
use crate::error::{Error, Result};
use crate::models::{
    CreateIndexRequest, IndexDescription, IndexSpec, Metric, ScoredMatch, VectorRecord,
};

/// Environment used by the pod fallback, independent of the region hint.
pub const POD_ENVIRONMENT: &str = "us-east-1-aws";

/// Pod size used by the pod fallback.
pub const POD_TYPE: &str = "p1.x1";

/// Region used when the hint is blank.
const DEFAULT_REGION: &str = "us-east-1";

/// Control plane of a vector database.
#[async_trait]
pub trait IndexControl: Send + Sync {
    /// Names of all indexes visible to the caller.
    async fn list_indexes(&self) -> Result<Vec<String>>;

    async fn describe_index(&self, name: &str) -> Result<IndexDescription>;

    /// Create an index and return its description once it can be queried.
    async fn create_index(&self, request: &CreateIndexRequest) -> Result<IndexDescription>;

    async fn delete_index(&self, name: &str) -> Result<()>;

    /// Open a data-plane handle for a described index.
    fn open(&self, description: &IndexDescription) -> Result<Arc<dyn VectorIndex>>;
}

/// Data plane of a single vector index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Insert or overwrite records by id. Returns the number written.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize>;

    /// Top-`top_k` matches by similarity, best first.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredMatch>>;

    /// Remove every vector. Irreversible.
    async fn delete_all(&self) -> Result<()>;

    /// Number of vectors currently stored.
    async fn vector_count(&self) -> Result<u64>;
}

/// Which index to ensure, and whether it may be rebuilt.
#[derive(Debug, Clone)]
pub struct IndexTarget {
    pub name: String,
    /// Cloud/region hint, e.g. `us-east-1` or the legacy `us-east1-gcp`.
    pub region: String,
    /// Permission to delete and rebuild an index of the wrong dimension.
    pub allow_recreate: bool,
}

/// What [`ensure_index`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Existing,
    Created,
    Recreated { previous_dimension: usize },
}

/// A queryable index plus how it came to be.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    pub description: IndexDescription,
    pub outcome: EnsureOutcome,
}

/// Ordered creation strategies for `region_hint`: serverless first, then pod.
pub fn creation_plan(region_hint: &str) -> Vec<IndexSpec> {
    vec![
        serverless_spec(region_hint),
        IndexSpec::Pod {
            environment: POD_ENVIRONMENT.to_string(),
            pod_type: POD_TYPE.to_string(),
        },
    ]
}

/// Map a region hint to a serverless spec.
///
/// A legacy environment suffix (`-gcp`, `-aws`, `-azure`) selects the cloud
/// and is stripped from the region; anything else is an AWS region.
pub fn serverless_spec(region_hint: &str) -> IndexSpec {
    let hint = region_hint.trim().to_lowercase();
    for cloud in ["gcp", "aws", "azure"] {
        if let Some(region) = hint.strip_suffix(&format!("-{}", cloud)) {
            if !region.is_empty() {
                return IndexSpec::Serverless {
                    cloud: cloud.to_string(),
                    region: region.to_string(),
                };
            }
        }
    }
    let region = if hint.is_empty() {
        DEFAULT_REGION.to_string()
    } else {
        hint
    };
    IndexSpec::Serverless {
        cloud: "aws".to_string(),
        region,
    }
}

/// Probe the embedder and make sure `target` exists with a matching dimension.
pub async fn ensure_index(
    control: &dyn IndexControl,
    embedder: &dyn Embedder,
    target: &IndexTarget,
) -> Result<IndexHandle> {
    let dimension = probe_dimension(embedder).await?;
    ensure_index_with_dimension(control, dimension, target).await
}

/// [`ensure_index`] with an already-probed dimension.
pub async fn ensure_index_with_dimension(
    control: &dyn IndexControl,
    dimension: usize,
    target: &IndexTarget,
) -> Result<IndexHandle> {
    let plan = creation_plan(&target.region);
    let names = control.list_indexes().await?;

    if !names.iter().any(|n| n == &target.name) {
        tracing::info!(index = %target.name, dimension, "index not found, creating");
        let description = create_with_plan(control, &target.name, dimension, &plan).await?;
        return Ok(IndexHandle {
            description,
            outcome: EnsureOutcome::Created,
        });
    }

    let existing = control.describe_index(&target.name).await?;
    tracing::info!(
        index = %target.name,
        dimension = existing.dimension,
        "existing index found"
    );

    if existing.dimension == dimension {
        return Ok(IndexHandle {
            description: existing,
            outcome: EnsureOutcome::Existing,
        });
    }

    if !target.allow_recreate {
        return Err(Error::DimensionMismatch {
            index: target.name.clone(),
            existing: existing.dimension,
            expected: dimension,
        });
    }

    tracing::warn!(
        index = %target.name,
        existing = existing.dimension,
        expected = dimension,
        "dimension mismatch, deleting and recreating index (stored vectors are lost)"
    );
    control.delete_index(&target.name).await?;
    let description = create_with_plan(control, &target.name, dimension, &plan).await?;

    Ok(IndexHandle {
        description,
        outcome: EnsureOutcome::Recreated {
            previous_dimension: existing.dimension,
        },
    })
}

/// Try each spec in order; the first success wins, the last failure propagates.
async fn create_with_plan(
    control: &dyn IndexControl,
    name: &str,
    dimension: usize,
    plan: &[IndexSpec],
) -> Result<IndexDescription> {
    let mut last_err = None;

    for (i, spec) in plan.iter().enumerate() {
        if i > 0 {
            tracing::info!(index = name, spec = spec.kind(), "falling back to next index spec");
        }
        let request = CreateIndexRequest {
            name: name.to_string(),
            dimension,
            metric: Metric::Cosine,
            spec: spec.clone(),
        };
        match control.create_index(&request).await {
            Ok(description) => {
                tracing::info!(index = name, dimension, spec = spec.kind(), "index created");
                return Ok(description);
            }
            Err(e) => {
                tracing::error!(index = name, spec = spec.kind(), error = %e, "index creation failed");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| Error::invalid_input("empty index creation plan")))
}
