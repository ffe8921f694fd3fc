//! # resource-controller
//!
//! Policy-driven CRUD controllers for document collections.
//!
//! A [`Controller`](controller::Controller) turns one document collection plus
//! a set of per-operation policies into eight request handlers: list, get-one,
//! get-many-by-reference, create, update-one, update-many, delete-one and
//! delete-many.
//!
//! ## Features
//!
//! - **Authorization as filters**: each operation's policy either refuses or
//!   returns a filter fragment that scopes every store call it makes
//! - **Validation gate**: per-operation validators check and reshape caller data
//! - **Query building**: pagination, sorting and filter merging where the
//!   security fragment always wins
//! - **Item codec**: declared field transforms between stored and exposed shapes
//! - **HTTP adapter**: an axum router per controller, with status-code mapping
//! - **Ambient stack**: figment configuration, JSON tracing, graceful shutdown
//!
//! ## Example
//!
//! ```rust,no_run
//! use resource_controller::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load_for_service("adventures")?;
//!     init_tracing(&config)?;
//!
//!     let adventures = Controller::builder(MemoryStore::new("adventures"))
//!         .security_all(AllowAll)
//!         .pagination(config.pagination)
//!         .field("tags", FieldTransform::identifier_objects())
//!         .build()?;
//!
//!     let app = Router::new().nest("/adventures", router(adventures));
//!     Server::new(config).serve(app).await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod filter;
pub mod ids;
pub mod observability;
pub mod query;
pub mod request;
pub mod response;
pub mod routes;
pub mod security;
pub mod server;
pub mod store;
pub mod validation;

/// Common imports
pub mod prelude {
    pub use crate::codec::{FieldShape, FieldTransform, Item, ItemCodec};
    pub use crate::config::{Config, PaginationConfig, ServiceConfig};
    pub use crate::controller::{Controller, ControllerBuilder, View};
    pub use crate::error::{Error, ErrorResponse, Result};
    pub use crate::filter::{Condition, Filter};
    pub use crate::ids::{DocumentId, RequestId};
    pub use crate::observability::init_tracing;
    pub use crate::query::{Sort, SortOrder};
    pub use crate::request::{AuthenticatedUser, ResourceRequest};
    pub use crate::response::{
        CreatedPayload, DeletePayload, ItemPayload, ListPayload, PaginationMeta,
        ReferencesPayload, UpdateManyPayload, UpdatePayload,
    };
    pub use crate::routes::router;
    pub use crate::security::{
        policy_async, policy_fn, AllowAll, Authorizer, DenyAll, Operation, OwnerScope,
        Rejection, RequireRole,
    };
    pub use crate::server::Server;
    pub use crate::store::{
        DeleteResult, Document, DocumentStore, FindOptions, MemoryStore, Projection,
        StoreError, UpdateResult,
    };
    pub use crate::validation::{
        validator_async, validator_fn, KnownFields, PassThrough, UnknownFields, ValidationError,
        Validator,
    };

    pub use axum::Router;
}
