//! Adventures API over the in-memory store
//!
//! ```bash
//! cargo run --example adventures
//! curl 'localhost:8080/api/adventures?perPage=5&sort=-name'
//! curl -X POST localhost:8080/api/adventures -H 'x-user: frodo' \
//!     -H 'content-type: application/json' -d '{"name": "Moria", "tags": [{"id": "mines"}]}'
//! ```
//!
//! The `x-user` header stands in for real authentication middleware. Anyone
//! may read; writes are scoped to the caller's own adventures, and only the
//! `admin` role may delete.

use axum::{extract::Request, middleware::Next, response::Response};
use resource_controller::prelude::*;
use serde_json::{json, Value};

async fn seed(store: &MemoryStore) -> Result<()> {
    let adventures = [
        ("The Shire", "frodo", vec!["home"]),
        ("Moria", "gandalf", vec!["mines", "dark"]),
        ("Rivendell", "frodo", vec!["elves"]),
    ];
    for (name, owner, tags) in adventures {
        if let Value::Object(document) = json!({"name": name, "owner": owner, "tags": tags}) {
            store.insert(document).await?;
        }
    }
    Ok(())
}

/// Take the caller's identity from the `x-user` header
async fn header_user(mut request: Request, next: Next) -> Response {
    let user = request
        .headers()
        .get("x-user")
        .and_then(|value| value.to_str().ok())
        .map(|sub| {
            let user = AuthenticatedUser::new(sub);
            if sub == "gandalf" {
                user.with_role("admin")
            } else {
                user
            }
        });
    if let Some(user) = user {
        request.extensions_mut().insert(user);
    }
    next.run(request).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_for_service("adventures")?;
    init_tracing(&config)?;

    let store = MemoryStore::new("adventures");
    seed(&store).await?;

    let adventures = Controller::builder(store)
        .security(Operation::List, AllowAll)
        .security(Operation::View, AllowAll)
        .security(Operation::Post, policy_fn(|request: &ResourceRequest| {
            if request.user.is_some() {
                Ok(Filter::new())
            } else {
                Err(Rejection::Forbidden)
            }
        }))
        .security(Operation::Put, OwnerScope::new("owner"))
        .security(Operation::PutMany, OwnerScope::new("owner"))
        .security(Operation::Delete, RequireRole::new("admin"))
        .security(Operation::DeleteMany, RequireRole::new("admin"))
        .validator(
            Operation::Post,
            validator_fn(|data: Value, request: &ResourceRequest| {
                let Value::Object(mut fields) = data else {
                    return Err(ValidationError::new("expected an object"));
                };
                if !fields.contains_key("name") {
                    return Err(ValidationError::new("Invalid fields").with_field("name", "is required"));
                }
                if let Some(user) = &request.user {
                    fields.insert("owner".to_string(), Value::String(user.sub.clone()));
                }
                Ok(Value::Object(fields))
            }),
        )
        .validator(
            Operation::Put,
            KnownFields::new(["name", "tags", "description"]).unknown(UnknownFields::Strip),
        )
        .projection(View::List, Projection::fields(["name", "tags"]))
        .field("tags", FieldTransform::identifier_objects())
        .default_sort(Sort::ascending("name"))
        .pagination(config.pagination)
        .build()?;

    let app = Router::new()
        .nest("/api/adventures", router(adventures))
        .layer(axum::middleware::from_fn(header_user));

    Server::new(config).serve(app).await
}
