//! Framework-neutral request model
//!
//! Controller operations take a [`ResourceRequest`] rather than a framework
//! request type. The HTTP adapter in [`routes`](crate::routes) builds one from
//! an axum request; tests and other transports build one directly:
//!
//! ```rust
//! use resource_controller::request::{AuthenticatedUser, ResourceRequest};
//! use serde_json::json;
//!
//! let request = ResourceRequest::new()
//!     .with_param("id", "doc_01h455vb4pex5vsknk084sn02q")
//!     .with_body(json!({ "ops": { "name": "Renamed" } }))
//!     .with_user(AuthenticatedUser::new("user-1").with_role("editor"));
//!
//! assert_eq!(request.param("id"), Some("doc_01h455vb4pex5vsknk084sn02q"));
//! assert_eq!(request.ops(), json!({ "name": "Renamed" }));
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Caller identity established by upstream authentication
///
/// Insert one into the request extensions (for example from token
/// middleware) and the HTTP adapter hands it to security policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// Subject (user or client id)
    pub sub: String,

    /// Roles
    #[serde(default)]
    pub roles: Vec<String>,

    /// Permissions
    #[serde(default)]
    pub perms: Vec<String>,
}

impl AuthenticatedUser {
    /// User with no roles or permissions
    pub fn new(sub: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            roles: Vec::new(),
            perms: Vec::new(),
        }
    }

    /// Add a role
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Add a permission
    #[must_use]
    pub fn with_permission(mut self, perm: impl Into<String>) -> Self {
        self.perms.push(perm.into());
        self
    }

    /// Check if the user has a specific role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Check if the user has a specific permission
    pub fn has_permission(&self, perm: &str) -> bool {
        self.perms.iter().any(|p| p == perm)
    }
}

/// An incoming request as seen by the controller
#[derive(Debug, Clone, Default)]
pub struct ResourceRequest {
    /// Query parameters, already decoded into JSON values
    pub query: Map<String, Value>,
    /// Path parameters
    pub params: HashMap<String, String>,
    /// Parsed body, `Null` when there was none
    pub body: Value,
    /// Authenticated caller, if any
    pub user: Option<AuthenticatedUser>,
}

impl ResourceRequest {
    /// Empty anonymous request
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a query parameter
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Set a path parameter
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Set the authenticated caller
    #[must_use]
    pub fn with_user(mut self, user: AuthenticatedUser) -> Self {
        self.user = Some(user);
        self
    }

    /// Path parameter, ignoring blank values
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Bulk identifier list, from the query string or else the body
    pub fn id_list(&self) -> Option<&Value> {
        self.query
            .get("ids")
            .filter(|v| !v.is_null())
            .or_else(|| self.body.get("ids"))
    }

    /// Update operations from the body's `ops` member, `{}` when absent
    pub fn ops(&self) -> Value {
        match self.body.get("ops") {
            Some(ops) if !ops.is_null() => ops.clone(),
            _ => Value::Object(Map::new()),
        }
    }
}
