//! Document store error types
//!
//! # Example
//!
//! ```rust
//! use resource_controller::store::{StoreError, StoreErrorKind};
//!
//! let error = StoreError::duplicate_key("adventures", "doc_01h455vb4pex5vsknk084sn02q");
//! assert!(matches!(error.kind, StoreErrorKind::DuplicateKey));
//! assert!(!error.is_retriable());
//! ```

use std::fmt;

/// Store call that was running when the error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// Counting matching documents
    Count,
    /// Fetching a page of documents
    Find,
    /// Fetching a single document
    FindOne,
    /// Inserting a document
    Insert,
    /// Applying a partial update
    Update,
    /// Removing documents
    Delete,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => write!(f, "count"),
            Self::Find => write!(f, "find"),
            Self::FindOne => write!(f, "find_one"),
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Category of store error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// A document with the same identifier already exists
    DuplicateKey,
    /// The document or field set cannot be stored as given
    InvalidDocument,
    /// The backend could not be reached
    ConnectionFailed,
    /// The backend did not answer in time
    Timeout,
    /// The backend reported a failure
    Backend,
    /// Other unclassified error
    Other,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateKey => write!(f, "duplicate_key"),
            Self::InvalidDocument => write!(f, "invalid_document"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::Backend => write!(f, "backend"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Failure reported by a [`DocumentStore`](super::DocumentStore)
///
/// The message holds the backend's own description. It is logged for
/// operators and never shown to callers.
#[derive(Debug, Clone)]
pub struct StoreError {
    /// Store call that failed
    pub operation: StoreOperation,
    /// Category of failure
    pub kind: StoreErrorKind,
    /// Backend description of the failure
    pub message: String,
    /// Collection involved, when known
    pub collection: Option<String>,
}

impl StoreError {
    /// Create a new store error
    pub fn new(operation: StoreOperation, kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            collection: None,
        }
    }

    /// Insert collided with an existing identifier
    pub fn duplicate_key(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(
            StoreOperation::Insert,
            StoreErrorKind::DuplicateKey,
            format!("identifier '{}' already exists", id.into()),
        )
        .with_collection(collection)
    }

    /// Document or field set is not storable
    pub fn invalid_document(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StoreErrorKind::InvalidDocument, message)
    }

    /// Backend unreachable
    pub fn connection_failed(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StoreErrorKind::ConnectionFailed, message)
    }

    /// Backend timed out
    pub fn timeout(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StoreErrorKind::Timeout, message)
    }

    /// Backend-reported failure
    pub fn backend(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StoreErrorKind::Backend, message)
    }

    /// Attach the collection name
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Whether a retry might succeed
    ///
    /// The controller never retries on its own; this is for store wrappers
    /// that want to.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            StoreErrorKind::ConnectionFailed | StoreErrorKind::Timeout
        )
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Store {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let Some(collection) = &self.collection {
            write!(f, " [{collection}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for StoreError {}

/// Result type for store calls
pub type StoreResult<T> = std::result::Result<T, StoreError>;
