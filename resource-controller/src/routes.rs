//! HTTP adapter: mounts a [`Controller`] on an axum router
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | GET | `/` | list |
//! | POST | `/` | create |
//! | PUT | `/` | update-many |
//! | DELETE | `/` | delete-many |
//! | GET | `/id/{id}` | get-one |
//! | PUT | `/id/{id}` | update-one |
//! | DELETE | `/id/{id}` | delete-one |
//! | GET, POST | `/ref` | get-many-by-reference |
//!
//! Nest the router under the collection's path:
//!
//! ```rust,no_run
//! use axum::Router;
//! use resource_controller::prelude::*;
//!
//! # fn main() -> resource_controller::error::Result<()> {
//! let adventures = Controller::builder(MemoryStore::new("adventures"))
//!     .security_all(AllowAll)
//!     .build()?;
//! let app: Router = Router::new().nest("/api/adventures", resource_controller::routes::router(adventures));
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    routing::get,
    Router,
};
use serde_json::{Map, Value};

use crate::controller::Controller;
use crate::error::{Error, Result};
use crate::request::{AuthenticatedUser, ResourceRequest};
use crate::response::{
    CreatedPayload, DeletePayload, ItemPayload, ListPayload, ReferencesPayload, UpdateManyPayload,
    UpdatePayload,
};
use crate::store::DocumentStore;

/// Query keys that always decode to a list
const LIST_KEYS: &[&str] = &["ids"];

/// Build the route table for one controller
pub fn router<S>(controller: Controller<S>) -> Router
where
    S: DocumentStore + 'static,
{
    Router::new()
        .route(
            "/",
            get(list::<S>)
                .post(create::<S>)
                .put(update_many::<S>)
                .delete(delete_many::<S>),
        )
        .route(
            "/id/{id}",
            get(get_one::<S>).put(update_one::<S>).delete(delete_one::<S>),
        )
        .route("/ref", get(references::<S>).post(references::<S>))
        .with_state(controller)
}

async fn list<S: DocumentStore + 'static>(
    State(controller): State<Controller<S>>,
    request: ResourceRequest,
) -> Result<ListPayload> {
    controller.list(&request).await
}

async fn get_one<S: DocumentStore + 'static>(
    State(controller): State<Controller<S>>,
    request: ResourceRequest,
) -> Result<ItemPayload> {
    controller.get_one(&request).await
}

async fn references<S: DocumentStore + 'static>(
    State(controller): State<Controller<S>>,
    request: ResourceRequest,
) -> Result<ReferencesPayload> {
    controller.references(&request).await
}

async fn create<S: DocumentStore + 'static>(
    State(controller): State<Controller<S>>,
    request: ResourceRequest,
) -> Result<CreatedPayload> {
    controller.create(&request).await
}

async fn update_one<S: DocumentStore + 'static>(
    State(controller): State<Controller<S>>,
    request: ResourceRequest,
) -> Result<UpdatePayload> {
    controller.update_one(&request).await
}

async fn update_many<S: DocumentStore + 'static>(
    State(controller): State<Controller<S>>,
    request: ResourceRequest,
) -> Result<UpdateManyPayload> {
    controller.update_many(&request).await
}

async fn delete_one<S: DocumentStore + 'static>(
    State(controller): State<Controller<S>>,
    request: ResourceRequest,
) -> Result<DeletePayload> {
    controller.delete_one(&request).await
}

async fn delete_many<S: DocumentStore + 'static>(
    State(controller): State<Controller<S>>,
    request: ResourceRequest,
) -> Result<DeletePayload> {
    controller.delete_many(&request).await
}

impl<St> FromRequest<St> for ResourceRequest
where
    St: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &St) -> std::result::Result<Self, Self::Rejection> {
        let (mut parts, body) = req.into_parts();

        // routes without path parameters reject the extractor; treat as none
        let params = Path::<HashMap<String, String>>::from_request_parts(&mut parts, state)
            .await
            .map(|Path(params)| params)
            .unwrap_or_default();

        let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
            .map_err(|e| Error::BadRequest(format!("invalid query string: {}", e.body_text())))?;
        let query = fold_query(pairs);

        let user = parts.extensions.get::<AuthenticatedUser>().cloned();

        let bytes = Bytes::from_request(Request::from_parts(parts, body), state)
            .await
            .map_err(|e| Error::BadRequest(e.body_text()))?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .map_err(|e| Error::BadRequest(format!("invalid JSON body: {e}")))?
        };

        Ok(ResourceRequest {
            query,
            params,
            body,
            user,
        })
    }
}

/// Fold decoded query pairs into a JSON map
///
/// `key[]` and the keys in [`LIST_KEYS`] always produce arrays, repeated keys
/// collect into arrays, and values that look like JSON objects or arrays are
/// parsed.
fn fold_query(pairs: Vec<(String, String)>) -> Map<String, Value> {
    let mut query = Map::new();
    for (key, raw) in pairs {
        let (key, is_list) = match key.strip_suffix("[]") {
            Some(base) => (base.to_string(), true),
            None => {
                let is_list = LIST_KEYS.contains(&key.as_str());
                (key, is_list)
            }
        };
        let value = decode_value(raw);
        let folded = match (query.remove(&key), value) {
            (None, Value::Array(values)) if is_list => Value::Array(values),
            (None, value) if is_list => Value::Array(vec![value]),
            (None, value) => value,
            (Some(Value::Array(mut values)), Value::Array(more)) if is_list => {
                values.extend(more);
                Value::Array(values)
            }
            (Some(Value::Array(mut values)), value) => {
                values.push(value);
                Value::Array(values)
            }
            (Some(previous), value) => Value::Array(vec![previous, value]),
        };
        query.insert(key, folded);
    }
    query
}

fn decode_value(raw: String) -> Value {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str(trimmed) {
            return value;
        }
    }
    Value::String(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_fold_scalars_and_json() {
        let query = fold_query(pairs(&[
            ("page", "2"),
            ("filter", r#"{"name":"Item 3"}"#),
            ("sort", "-name"),
        ]));
        assert_eq!(
            Value::Object(query),
            json!({"page": "2", "filter": {"name": "Item 3"}, "sort": "-name"})
        );
    }

    #[test]
    fn test_fold_lists() {
        let query = fold_query(pairs(&[("ids", "a")]));
        assert_eq!(query["ids"], json!(["a"]));

        let query = fold_query(pairs(&[("ids", "a"), ("ids", "b"), ("tag[]", "x")]));
        assert_eq!(query["ids"], json!(["a", "b"]));
        assert_eq!(query["tag"], json!(["x"]));

        let query = fold_query(pairs(&[("ids", r#"["a","b"]"#), ("ids", "c")]));
        assert_eq!(query["ids"], json!(["a", "b", "c"]));

        let query = fold_query(pairs(&[("owner", "a"), ("owner", "b")]));
        assert_eq!(query["owner"], json!(["a", "b"]));
    }

    #[test]
    fn test_malformed_json_stays_text() {
        let query = fold_query(pairs(&[("filter", "{not json")]));
        assert_eq!(query["filter"], json!("{not json"));
    }
}
