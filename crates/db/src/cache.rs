//! Workflow definition caching using Moka.
//!
//! Workflow definitions are read on every submission and transition but
//! change only through [`WorkflowRepository`](crate::repositories::WorkflowRepository),
//! which invalidates the whole cache after each write.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use quorum_core::Workflow;
use quorum_shared::types::WorkflowId;

/// Default cache capacity (entries per index).
const DEFAULT_CACHE_CAPACITY: u64 = 1_000;

/// Default time-to-live for cache entries (1 minute).
const DEFAULT_TTL_SECS: u64 = 60;

/// Cache of workflow definitions, indexed by id and by document type.
///
/// Clones share the same underlying storage.
#[derive(Clone)]
pub struct WorkflowCache {
    by_id: Cache<WorkflowId, Arc<Workflow>>,
    by_document_type: Cache<String, Arc<Vec<Workflow>>>,
}

impl WorkflowCache {
    /// Creates a cache with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_CACHE_CAPACITY, DEFAULT_TTL_SECS)
    }

    /// Creates a cache with custom capacity and time-to-live.
    #[must_use]
    pub fn with_config(max_capacity: u64, ttl_secs: u64) -> Self {
        let ttl = Duration::from_secs(ttl_secs);
        Self {
            by_id: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
            by_document_type: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Cached workflow by id.
    pub async fn workflow(&self, id: WorkflowId) -> Option<Arc<Workflow>> {
        self.by_id.get(&id).await
    }

    /// Caches a workflow under its id.
    pub async fn put_workflow(&self, workflow: Workflow) {
        self.by_id.insert(workflow.id, Arc::new(workflow)).await;
    }

    /// Cached workflows for a document type.
    pub async fn document_type(&self, document_type: &str) -> Option<Arc<Vec<Workflow>>> {
        self.by_document_type.get(document_type).await
    }

    /// Caches the workflows of a document type.
    pub async fn put_document_type(&self, document_type: &str, workflows: Vec<Workflow>) {
        self.by_document_type
            .insert(document_type.to_string(), Arc::new(workflows))
            .await;
    }

    /// Drops every cached definition.
    pub fn invalidate_all(&self) {
        self.by_id.invalidate_all();
        self.by_document_type.invalidate_all();
    }
}

impl Default for WorkflowCache {
    fn default() -> Self {
        Self::new()
    }
}
