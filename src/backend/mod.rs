//! Outbound database contract.
//!
//! The loader never talks HTTP directly; it drives a `VectorBackend`, so the
//! same batching and retry logic runs against Weaviate or a test double.

pub mod weaviate;

pub use weaviate::WeaviateBackend;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DatasetVector, Identifier, IndexConfig, QueryParameter};

/// Per-object status returned by a batch insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStatus {
    pub identifier: Identifier,
    /// Empty when the object was accepted.
    pub errors: Vec<String>,
}

impl ItemStatus {
    pub fn ok(identifier: Identifier) -> Self {
        Self {
            identifier,
            errors: Vec::new(),
        }
    }

    pub fn rejected(identifier: Identifier, message: impl Into<String>) -> Self {
        Self {
            identifier,
            errors: vec![message.into()],
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Operations consumed from the remote vector database.
///
/// Implementations return transport failures as errors for which
/// [`crate::error::LoaderError::is_transient`] is true; the loader owns
/// retry and timeout policy.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Probe that the database is reachable and ready.
    async fn ready(&self) -> Result<()>;

    /// Delete a class. Deleting an absent class succeeds.
    async fn delete_class(&self, class: &str) -> Result<()>;

    /// Create a class with the given index configuration.
    async fn create_class(&self, config: &IndexConfig) -> Result<()>;

    /// Whether the server currently holds `class`.
    async fn class_exists(&self, class: &str) -> Result<bool>;

    /// Write one batch of objects, returning a status per object.
    async fn batch_insert(&self, class: &str, vectors: &[DatasetVector])
        -> Result<Vec<ItemStatus>>;

    /// Change a single mutable index parameter on an existing class.
    async fn update_index_parameter(
        &self,
        class: &str,
        parameter: QueryParameter,
        value: u64,
    ) -> Result<()>;

    /// Nearest neighbors of `vector`, nearest first, at most `limit`.
    async fn near_vector(&self, class: &str, vector: &[f32], limit: usize)
        -> Result<Vec<Identifier>>;

    /// Delete every class in the database.
    async fn delete_all(&self) -> Result<()>;

    fn name(&self) -> &str;

    fn endpoint(&self) -> &str;
}
