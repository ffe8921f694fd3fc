//! Document store abstraction
//!
//! Controllers talk to storage only through [`DocumentStore`]. A store owns
//! one named collection of JSON documents keyed by an opaque string
//! identifier stored under [`DocumentStore::id_field`].
//!
//! [`MemoryStore`] is a complete in-process implementation, suitable for
//! tests and small services.

mod error;
mod memory;

use std::collections::BTreeSet;
use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::filter::Filter;
use crate::query::Sort;

pub use error::{StoreError, StoreErrorKind, StoreOperation, StoreResult};
pub use memory::MemoryStore;

/// Store-native document
pub type Document = Map<String, Value>;

/// Identifier field used when a store does not override it
pub const DEFAULT_ID_FIELD: &str = "_id";

/// Field selection applied to fetched documents
///
/// The identifier field is always returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    /// Every field
    #[default]
    All,
    /// Only the listed fields, plus the identifier
    Fields(BTreeSet<String>),
}

impl Projection {
    /// Select the listed fields
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Fields(fields.into_iter().map(Into::into).collect())
    }

    /// Select only the identifier
    pub fn identifiers() -> Self {
        Self::Fields(BTreeSet::new())
    }

    /// Whether `field` survives this projection
    pub fn includes(&self, field: &str, id_field: &str) -> bool {
        match self {
            Self::All => true,
            Self::Fields(fields) => field == id_field || fields.contains(field),
        }
    }

    /// Drop the fields this projection excludes
    pub fn apply(&self, document: Document, id_field: &str) -> Document {
        match self {
            Self::All => document,
            Self::Fields(_) => document
                .into_iter()
                .filter(|(field, _)| self.includes(field, id_field))
                .collect(),
        }
    }
}

/// Options for [`DocumentStore::find`]
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Field selection
    pub projection: Projection,
    /// Matching documents to skip
    pub skip: u64,
    /// Maximum documents to return
    pub limit: Option<u64>,
    /// Sort order; empty means store order
    pub sort: Sort,
}

impl FindOptions {
    /// Options returning every matching document in store order
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the projection
    #[must_use]
    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    /// Set the skip count
    #[must_use]
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    /// Set the limit
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the sort order
    #[must_use]
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }
}

/// Match and modify counts from a partial update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    /// Documents matching the filter
    pub matched: u64,
    /// Documents whose fields actually changed
    pub modified: u64,
}

/// Count from a delete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    /// Documents removed
    pub deleted_count: u64,
}

/// Storage collaborator for a single collection
///
/// Implementations must be safe to share across concurrent requests. Each
/// call is expected to be atomic per document; nothing here spans documents
/// transactionally.
pub trait DocumentStore: Send + Sync {
    /// Collection name, used in logs and error messages
    fn name(&self) -> &str;

    /// Field holding the native identifier
    fn id_field(&self) -> &str {
        DEFAULT_ID_FIELD
    }

    /// Whether `raw` is a syntactically valid identifier for this store
    fn is_valid_id(&self, raw: &str) -> bool;

    /// Count documents matching the filter
    fn count(&self, filter: &Filter) -> impl Future<Output = StoreResult<u64>> + Send;

    /// Fetch matching documents
    fn find(
        &self,
        filter: &Filter,
        options: &FindOptions,
    ) -> impl Future<Output = StoreResult<Vec<Document>>> + Send;

    /// Fetch the first matching document
    fn find_one(
        &self,
        filter: &Filter,
        projection: &Projection,
    ) -> impl Future<Output = StoreResult<Option<Document>>> + Send;

    /// Insert a new document, assigning an identifier when it has none
    ///
    /// Returns the document as persisted.
    fn insert(&self, document: Document) -> impl Future<Output = StoreResult<Document>> + Send;

    /// Set `fields` on the first matching document
    fn update_one(
        &self,
        filter: &Filter,
        fields: Document,
    ) -> impl Future<Output = StoreResult<UpdateResult>> + Send;

    /// Set `fields` on every matching document
    fn update_many(
        &self,
        filter: &Filter,
        fields: Document,
    ) -> impl Future<Output = StoreResult<UpdateResult>> + Send;

    /// Remove the first matching document
    fn delete_one(&self, filter: &Filter) -> impl Future<Output = StoreResult<DeleteResult>> + Send;

    /// Remove every matching document
    fn delete_many(&self, filter: &Filter)
        -> impl Future<Output = StoreResult<DeleteResult>> + Send;
}
