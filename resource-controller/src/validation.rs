//! Validation gate
//!
//! Validators check and reshape caller data before it reaches the store.
//! An operation without a validator passes data through unchanged; bulk
//! operations fall back to their singular counterpart's validator.
//!
//! ```rust
//! use resource_controller::validation::{validator_fn, ValidationError};
//!
//! let require_name = validator_fn(|data, _request| {
//!     match data.get("name").and_then(|v| v.as_str()) {
//!         Some(name) if !name.trim().is_empty() => Ok(data),
//!         _ => Err(ValidationError::new("Invalid item").with_field("name", "is required")),
//!     }
//! });
//! # let _ = require_name;
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::filter::json_kind;
use crate::request::ResourceRequest;
use crate::security::Operation;

/// Problem with one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Offending field
    pub field: String,
    /// What is wrong with it
    pub message: String,
}

impl FieldError {
    /// Create a new field error
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Rejected caller data, with optional per-field detail
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Summary message
    pub message: String,
    /// Per-field problems
    pub fields: Vec<FieldError>,
}

impl ValidationError {
    /// Error with a summary and no field detail
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field-level problem
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.fields.push(FieldError::new(field, message));
        self
    }
}

/// Check and transform caller data for one operation
#[async_trait]
pub trait Validator: Send + Sync {
    /// Return the data to persist, or reject it
    async fn validate(
        &self,
        data: Value,
        request: &ResourceRequest,
    ) -> std::result::Result<Value, ValidationError>;
}

/// Returns data unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

#[async_trait]
impl Validator for PassThrough {
    async fn validate(
        &self,
        data: Value,
        _request: &ResourceRequest,
    ) -> std::result::Result<Value, ValidationError> {
        Ok(data)
    }
}

/// What [`KnownFields`] does with undeclared fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownFields {
    /// Fail validation, naming each unknown field
    #[default]
    Reject,
    /// Drop them silently
    Strip,
}

/// Declared-field check for object payloads
///
/// ```rust
/// use resource_controller::validation::{KnownFields, UnknownFields};
///
/// let validator = KnownFields::new(["name", "tags"])
///     .require("name")
///     .unknown(UnknownFields::Strip);
/// # let _ = validator;
/// ```
#[derive(Debug, Clone)]
pub struct KnownFields {
    allowed: BTreeSet<String>,
    required: BTreeSet<String>,
    unknown: UnknownFields,
}

impl KnownFields {
    /// Allow exactly these fields (plus `id`)
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: fields.into_iter().map(Into::into).collect(),
            required: BTreeSet::new(),
            unknown: UnknownFields::default(),
        }
    }

    /// Require a field to be present and non-null
    #[must_use]
    pub fn require(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.allowed.insert(field.clone());
        self.required.insert(field);
        self
    }

    /// Choose how undeclared fields are handled
    #[must_use]
    pub fn unknown(mut self, mode: UnknownFields) -> Self {
        self.unknown = mode;
        self
    }

    fn check(&self, data: Value) -> std::result::Result<Value, ValidationError> {
        let mut map = match data {
            Value::Object(map) => map,
            other => {
                return Err(ValidationError::new(format!(
                    "expected an object, got {}",
                    json_kind(&other)
                )))
            }
        };

        let mut error = ValidationError::new("Invalid fields");

        let unknown: Vec<String> = map
            .keys()
            .filter(|k| k.as_str() != crate::codec::ITEM_ID_FIELD && !self.allowed.contains(*k))
            .cloned()
            .collect();
        for field in unknown {
            match self.unknown {
                UnknownFields::Reject => error = error.with_field(field, "is not a known field"),
                UnknownFields::Strip => {
                    map.remove(&field);
                }
            }
        }

        for field in &self.required {
            if map.get(field).map_or(true, Value::is_null) {
                error = error.with_field(field.clone(), "is required");
            }
        }

        if error.fields.is_empty() {
            Ok(Value::Object(map))
        } else {
            Err(error)
        }
    }
}

#[async_trait]
impl Validator for KnownFields {
    async fn validate(
        &self,
        data: Value,
        _request: &ResourceRequest,
    ) -> std::result::Result<Value, ValidationError> {
        self.check(data)
    }
}

/// Validator backed by a synchronous closure; see [`validator_fn`]
pub struct ValidatorFn<F>(F);

/// Build a validator from a synchronous closure
pub fn validator_fn<F>(f: F) -> ValidatorFn<F>
where
    F: Fn(Value, &ResourceRequest) -> std::result::Result<Value, ValidationError> + Send + Sync,
{
    ValidatorFn(f)
}

#[async_trait]
impl<F> Validator for ValidatorFn<F>
where
    F: Fn(Value, &ResourceRequest) -> std::result::Result<Value, ValidationError> + Send + Sync,
{
    async fn validate(
        &self,
        data: Value,
        request: &ResourceRequest,
    ) -> std::result::Result<Value, ValidationError> {
        (self.0)(data, request)
    }
}

/// Validator backed by an async closure; see [`validator_async`]
pub struct AsyncValidatorFn<F>(F);

/// Build a validator from an async closure that receives its own request copy
pub fn validator_async<F, Fut>(f: F) -> AsyncValidatorFn<F>
where
    F: Fn(Value, ResourceRequest) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Value, ValidationError>> + Send + 'static,
{
    AsyncValidatorFn(f)
}

#[async_trait]
impl<F, Fut> Validator for AsyncValidatorFn<F>
where
    F: Fn(Value, ResourceRequest) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Value, ValidationError>> + Send + 'static,
{
    async fn validate(
        &self,
        data: Value,
        request: &ResourceRequest,
    ) -> std::result::Result<Value, ValidationError> {
        (self.0)(data, request.clone()).await
    }
}

/// Operation-to-validator bindings for one controller
#[derive(Clone, Default)]
pub struct Validators {
    validators: HashMap<Operation, Arc<dyn Validator>>,
}

impl fmt::Debug for Validators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bound: Vec<_> = self.validators.keys().collect();
        bound.sort();
        f.debug_struct("Validators").field("bound", &bound).finish()
    }
}

impl Validators {
    /// No bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a validator to an operation
    pub fn bind(&mut self, operation: Operation, validator: Arc<dyn Validator>) {
        self.validators.insert(operation, validator);
    }

    /// Validator in effect for an operation, after bulk fallback
    fn resolve(&self, operation: Operation) -> Option<&Arc<dyn Validator>> {
        self.validators.get(&operation).or_else(|| {
            operation
                .singular()
                .and_then(|singular| self.validators.get(&singular))
        })
    }

    /// Validate `data` for `operation`; unbound operations pass through
    pub async fn validate(
        &self,
        operation: Operation,
        data: Value,
        request: &ResourceRequest,
    ) -> Result<Value> {
        let Some(validator) = self.resolve(operation) else {
            return Ok(data);
        };

        validator.validate(data, request).await.map_err(|err| {
            tracing::debug!(
                operation = %operation,
                fields = ?err.fields,
                "Validation rejected: {}", err.message
            );
            Error::Validation(err)
        })
    }
}
