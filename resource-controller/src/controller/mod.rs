//! Resource controllers
//!
//! A [`Controller`] wraps one [`DocumentStore`] collection with a fixed set of
//! policies and exposes the eight resource operations (list, get-one,
//! get-many-by-reference, create, update-one, update-many, delete-one,
//! delete-many). Its configuration is assembled once through
//! [`ControllerBuilder`] and shared read-only across concurrent requests.
//!
//! Every operation runs the same pipeline: authorize into a filter fragment,
//! then build the query (reads) or validate and compact the payload
//! (writes), call the store, expand the results, and return a payload.
//!
//! ```rust
//! use resource_controller::prelude::*;
//!
//! # fn main() -> resource_controller::error::Result<()> {
//! let controller = Controller::builder(MemoryStore::new("adventures"))
//!     .security_all(AllowAll)
//!     .security(Operation::Delete, RequireRole::new("admin"))
//!     .security(Operation::DeleteMany, RequireRole::new("admin"))
//!     .validator(Operation::Post, KnownFields::new(["tags"]).require("name"))
//!     .projection(View::List, Projection::fields(["name"]))
//!     .field("tags", FieldTransform::identifier_objects())
//!     .default_sort(Sort::ascending("name"))
//!     .build()?;
//! # let _ = controller;
//! # Ok(())
//! # }
//! ```

mod handlers;

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;

use crate::codec::{FieldTransform, ItemCodec, ITEM_ID_FIELD};
use crate::config::PaginationConfig;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::query::{QueryBuilder, SearchFilterFn, Sort};
use crate::request::ResourceRequest;
use crate::security::{Authorizer, Operation, SecurityPolicies};
use crate::store::{DocumentStore, Projection};
use crate::validation::{Validator, Validators};

/// Named field selections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    /// Items on a list page
    List,
    /// A single item
    View,
    /// Items fetched by identifier
    References,
}

/// Projection per view; all views default to every field
#[derive(Debug, Clone, Default)]
pub struct Projections {
    /// Used by list
    pub list: Projection,
    /// Used by get-one
    pub view: Projection,
    /// Used by get-many-by-reference
    pub references: Projection,
}

impl Projections {
    /// Projection for a view
    pub fn get(&self, view: View) -> &Projection {
        match view {
            View::List => &self.list,
            View::View => &self.view,
            View::References => &self.references,
        }
    }

    fn set(&mut self, view: View, projection: Projection) {
        match view {
            View::List => self.list = projection,
            View::View => self.view = projection,
            View::References => self.references = projection,
        }
    }
}

/// Controller-wide defaults
#[derive(Debug, Clone, Default)]
pub struct Defaults {
    /// Sort when the request gives none; `None` means newest first by identifier
    pub sort: Option<Sort>,
    /// Page sizing
    pub pagination: PaginationConfig,
}

/// Immutable configuration behind a [`Controller`]
pub struct ControllerConfig<S> {
    collection: S,
    defaults: Defaults,
    security: SecurityPolicies,
    validators: Validators,
    projections: Projections,
    codec: ItemCodec,
    search_filter: Option<Box<SearchFilterFn>>,
}

impl<S: DocumentStore> fmt::Debug for ControllerConfig<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("collection", &self.collection.name())
            .field("defaults", &self.defaults)
            .field("security", &self.security)
            .field("validators", &self.validators)
            .field("projections", &self.projections)
            .field("codec", &self.codec)
            .field("search_filter", &self.search_filter.is_some())
            .finish()
    }
}

/// Assembles a [`Controller`], checking that every operation is covered
pub struct ControllerBuilder<S> {
    collection: S,
    defaults: Defaults,
    security: SecurityPolicies,
    validators: Validators,
    projections: Projections,
    fields: Vec<(String, FieldTransform)>,
    search_filter: Option<Box<SearchFilterFn>>,
}

impl<S: DocumentStore> ControllerBuilder<S> {
    /// Start configuring a controller over `collection`
    pub fn new(collection: S) -> Self {
        Self {
            collection,
            defaults: Defaults::default(),
            security: SecurityPolicies::new(),
            validators: Validators::new(),
            projections: Projections::default(),
            fields: Vec::new(),
            search_filter: None,
        }
    }

    /// Bind the security policy for one operation
    #[must_use]
    pub fn security(mut self, operation: Operation, authorizer: impl Authorizer + 'static) -> Self {
        self.security.bind(operation, Arc::new(authorizer));
        self
    }

    /// Bind one policy to every operation
    ///
    /// Later [`security`](Self::security) calls override individual
    /// operations.
    #[must_use]
    pub fn security_all(mut self, authorizer: impl Authorizer + 'static) -> Self {
        let shared: Arc<dyn Authorizer> = Arc::new(authorizer);
        for operation in Operation::ALL {
            self.security.bind(operation, Arc::clone(&shared));
        }
        self
    }

    /// Bind the validator for one operation
    #[must_use]
    pub fn validator(mut self, operation: Operation, validator: impl Validator + 'static) -> Self {
        self.validators.bind(operation, Arc::new(validator));
        self
    }

    /// Set the projection for a view
    #[must_use]
    pub fn projection(mut self, view: View, projection: Projection) -> Self {
        self.projections.set(view, projection);
        self
    }

    /// Declare a field transform for the item codec
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, transform: FieldTransform) -> Self {
        self.fields.push((name.into(), transform));
        self
    }

    /// Sort used when a list request gives none
    #[must_use]
    pub fn default_sort(mut self, sort: Sort) -> Self {
        self.defaults.sort = Some(sort);
        self
    }

    /// Page sizing
    #[must_use]
    pub fn pagination(mut self, pagination: PaginationConfig) -> Self {
        self.defaults.pagination = pagination;
        self
    }

    /// Server-side search hook whose filter is merged into every list query
    #[must_use]
    pub fn search_filter<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ResourceRequest) -> Filter + Send + Sync + 'static,
    {
        self.search_filter = Some(Box::new(hook));
        self
    }

    /// Finish configuration
    ///
    /// Fails with [`Error::Configuration`] when an operation has no security
    /// policy, when pagination sizes are zero, or when a field transform
    /// targets an identifier field.
    pub fn build(self) -> Result<Controller<S>> {
        let unbound = self.security.unbound(&Operation::ALL);
        if !unbound.is_empty() {
            let names: Vec<&str> = unbound.iter().map(Operation::as_str).collect();
            return Err(Error::Configuration(format!(
                "collection '{}' has no security policy for: {}",
                self.collection.name(),
                names.join(", ")
            )));
        }

        let pagination = self.defaults.pagination;
        if pagination.default_per_page == 0 || pagination.max_per_page == 0 {
            return Err(Error::Configuration(
                "pagination sizes must be at least 1".to_string(),
            ));
        }

        let id_field = self.collection.id_field().to_string();
        let mut codec = ItemCodec::new(id_field.clone());
        for (name, transform) in self.fields {
            if name == ITEM_ID_FIELD || name == id_field {
                return Err(Error::Configuration(format!(
                    "identifier field '{name}' cannot carry a transform"
                )));
            }
            codec = codec.with_field(name, transform);
        }

        tracing::debug!(
            collection = %self.collection.name(),
            id_field = %id_field,
            "Controller configured"
        );

        Ok(Controller {
            config: Arc::new(ControllerConfig {
                collection: self.collection,
                defaults: self.defaults,
                security: self.security,
                validators: self.validators,
                projections: self.projections,
                codec,
                search_filter: self.search_filter,
            }),
        })
    }
}

/// Request handlers for one collection
///
/// Cheap to clone; clones share configuration.
pub struct Controller<S> {
    config: Arc<ControllerConfig<S>>,
}

impl<S> Clone for Controller<S> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: DocumentStore> fmt::Debug for Controller<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("config", &self.config)
            .finish()
    }
}

impl<S: DocumentStore> Controller<S> {
    /// Start configuring a controller over `collection`
    pub fn builder(collection: S) -> ControllerBuilder<S> {
        ControllerBuilder::new(collection)
    }

    /// Underlying store
    pub fn collection(&self) -> &S {
        &self.config.collection
    }

    /// Item codec in use
    pub fn codec(&self) -> &ItemCodec {
        &self.config.codec
    }

    /// Controller defaults
    pub fn defaults(&self) -> &Defaults {
        &self.config.defaults
    }

    fn projection(&self, view: View) -> &Projection {
        self.config.projections.get(view)
    }

    fn query_builder(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(&self.config.defaults.pagination, self.collection().id_field())
            .default_sort(self.config.defaults.sort.as_ref())
            .search_filter(self.config.search_filter.as_deref())
    }
}
