//! Security gate: authorization as a filter
//!
//! Every operation a controller exposes is bound to an [`Authorizer`]. A
//! policy either grants access by returning a [`Filter`] fragment that
//! scopes what the caller may touch (an empty filter means unrestricted), or
//! rejects:
//!
//! - [`Rejection::Forbidden`] means the caller is not allowed (403)
//! - [`Rejection::Failed`] means the policy itself broke (500, logged)
//!
//! ```rust
//! use resource_controller::filter::Filter;
//! use resource_controller::security::{policy_fn, Rejection};
//!
//! // Editors see everything; everyone else only published items
//! let list_policy = policy_fn(|request| match &request.user {
//!     Some(user) if user.has_role("editor") => Ok(Filter::new()),
//!     Some(_) => Ok(Filter::eq("status", "published")),
//!     None => Err(Rejection::Forbidden),
//! });
//! # let _ = list_policy;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::filter::{Condition, Filter};
use crate::request::ResourceRequest;

/// Operations a controller can be asked to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    /// List a page of items
    List,
    /// Read one item
    View,
    /// Create an item
    Post,
    /// Update one item
    Put,
    /// Update several items by id
    PutMany,
    /// Delete one item
    Delete,
    /// Delete several items by id
    DeleteMany,
}

impl Operation {
    /// Every operation, in declaration order
    pub const ALL: [Operation; 7] = [
        Self::List,
        Self::View,
        Self::Post,
        Self::Put,
        Self::PutMany,
        Self::Delete,
        Self::DeleteMany,
    ];

    /// Wire name of the operation
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::View => "view",
            Self::Post => "post",
            Self::Put => "put",
            Self::PutMany => "putMany",
            Self::Delete => "delete",
            Self::DeleteMany => "deleteMany",
        }
    }

    /// Singular counterpart of a bulk operation
    pub const fn singular(&self) -> Option<Operation> {
        match self {
            Self::PutMany => Some(Self::Put),
            Self::DeleteMany => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a policy refused
#[derive(Debug)]
pub enum Rejection {
    /// The caller may not perform the operation
    Forbidden,
    /// The policy could not reach a decision
    Failed(anyhow::Error),
}

impl Rejection {
    /// Wrap an internal failure
    pub fn failed(err: impl Into<anyhow::Error>) -> Self {
        Self::Failed(err.into())
    }
}

/// Authorization policy for one operation
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Decide whether `request` may proceed, and under which constraints
    async fn authorize(&self, request: &ResourceRequest) -> std::result::Result<Filter, Rejection>;
}

/// Grants every request without restriction
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn authorize(&self, _request: &ResourceRequest) -> std::result::Result<Filter, Rejection> {
        Ok(Filter::new())
    }
}

/// Refuses every request
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

#[async_trait]
impl Authorizer for DenyAll {
    async fn authorize(&self, _request: &ResourceRequest) -> std::result::Result<Filter, Rejection> {
        Err(Rejection::Forbidden)
    }
}

/// Grants unrestricted access to callers holding a role
#[derive(Debug, Clone)]
pub struct RequireRole {
    role: String,
}

impl RequireRole {
    /// Require `role`
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into() }
    }
}

#[async_trait]
impl Authorizer for RequireRole {
    async fn authorize(&self, request: &ResourceRequest) -> std::result::Result<Filter, Rejection> {
        match &request.user {
            Some(user) if user.has_role(&self.role) => Ok(Filter::new()),
            _ => Err(Rejection::Forbidden),
        }
    }
}

/// Restricts authenticated callers to documents they own
///
/// Produces `{<owner_field>: <user.sub>}`. Anonymous callers are refused.
#[derive(Debug, Clone)]
pub struct OwnerScope {
    owner_field: String,
}

impl OwnerScope {
    /// Scope by the given owner field
    pub fn new(owner_field: impl Into<String>) -> Self {
        Self {
            owner_field: owner_field.into(),
        }
    }
}

#[async_trait]
impl Authorizer for OwnerScope {
    async fn authorize(&self, request: &ResourceRequest) -> std::result::Result<Filter, Rejection> {
        let user = request.user.as_ref().ok_or(Rejection::Forbidden)?;
        Ok(Filter::new().with(
            self.owner_field.clone(),
            Condition::Eq(Value::String(user.sub.clone())),
        ))
    }
}

/// Policy backed by a synchronous closure; see [`policy_fn`]
pub struct PolicyFn<F>(F);

/// Build a policy from a synchronous closure
pub fn policy_fn<F>(f: F) -> PolicyFn<F>
where
    F: Fn(&ResourceRequest) -> std::result::Result<Filter, Rejection> + Send + Sync,
{
    PolicyFn(f)
}

#[async_trait]
impl<F> Authorizer for PolicyFn<F>
where
    F: Fn(&ResourceRequest) -> std::result::Result<Filter, Rejection> + Send + Sync,
{
    async fn authorize(&self, request: &ResourceRequest) -> std::result::Result<Filter, Rejection> {
        (self.0)(request)
    }
}

/// Policy backed by an async closure; see [`policy_async`]
pub struct AsyncPolicyFn<F>(F);

/// Build a policy from an async closure
///
/// The closure receives its own copy of the request so the returned future
/// can be `'static`, which suits policies that call out to other services.
pub fn policy_async<F, Fut>(f: F) -> AsyncPolicyFn<F>
where
    F: Fn(ResourceRequest) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Filter, Rejection>> + Send + 'static,
{
    AsyncPolicyFn(f)
}

#[async_trait]
impl<F, Fut> Authorizer for AsyncPolicyFn<F>
where
    F: Fn(ResourceRequest) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Filter, Rejection>> + Send + 'static,
{
    async fn authorize(&self, request: &ResourceRequest) -> std::result::Result<Filter, Rejection> {
        (self.0)(request.clone()).await
    }
}

/// Operation-to-policy bindings for one controller
#[derive(Clone, Default)]
pub struct SecurityPolicies {
    policies: HashMap<Operation, Arc<dyn Authorizer>>,
}

impl fmt::Debug for SecurityPolicies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bound: Vec<_> = self.policies.keys().collect();
        bound.sort();
        f.debug_struct("SecurityPolicies")
            .field("bound", &bound)
            .finish()
    }
}

impl SecurityPolicies {
    /// No bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a policy to an operation, replacing any earlier binding
    pub fn bind(&mut self, operation: Operation, authorizer: Arc<dyn Authorizer>) {
        self.policies.insert(operation, authorizer);
    }

    /// Whether an operation has a policy
    pub fn is_bound(&self, operation: Operation) -> bool {
        self.policies.contains_key(&operation)
    }

    /// Operations from `required` that have no policy
    pub fn unbound(&self, required: &[Operation]) -> Vec<Operation> {
        required
            .iter()
            .copied()
            .filter(|op| !self.is_bound(*op))
            .collect()
    }

    /// Run the policy for `operation`
    ///
    /// A missing binding is a configuration error, never an implicit grant.
    pub async fn authorize(&self, operation: Operation, request: &ResourceRequest) -> Result<Filter> {
        let authorizer = self.policies.get(&operation).ok_or_else(|| {
            Error::Configuration(format!("no security policy bound for operation '{operation}'"))
        })?;

        match authorizer.authorize(request).await {
            Ok(filter) => {
                tracing::debug!(
                    operation = %operation,
                    scoped_fields = filter.len(),
                    "Authorized"
                );
                Ok(filter)
            }
            Err(Rejection::Forbidden) => Err(Error::Forbidden { operation }),
            Err(Rejection::Failed(source)) => Err(Error::Authorization { operation, source }),
        }
    }
}
