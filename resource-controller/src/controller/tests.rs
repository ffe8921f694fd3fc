use std::str::FromStr;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::{json, Value};

use super::*;
use crate::codec::Item;
use crate::filter::Condition;
use crate::ids::DocumentId;
use crate::request::AuthenticatedUser;
use crate::security::{policy_fn, AllowAll, DenyAll, OwnerScope, Rejection};
use crate::store::{
    DeleteResult, Document, FindOptions, MemoryStore, StoreError, StoreOperation, StoreResult,
    UpdateResult,
};
use crate::validation::{validator_fn, KnownFields, ValidationError};

fn object(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

/// 30 documents named "Item 1".."Item 30", alternating owners
async fn seeded_store() -> (MemoryStore, Vec<String>) {
    let store = MemoryStore::new("items");
    let mut ids = Vec::new();
    for i in 1..=30 {
        let owner = if i % 2 == 1 { "alice" } else { "bob" };
        let stored = store
            .insert(object(json!({
                "name": format!("Item {i}"),
                "tags": ["one", "two", "three"],
                "owner": owner,
            })))
            .await
            .unwrap();
        ids.push(stored["_id"].as_str().unwrap().to_string());
    }
    (store, ids)
}

fn open_builder(store: MemoryStore) -> ControllerBuilder<MemoryStore> {
    Controller::builder(store)
        .security_all(AllowAll)
        .field("tags", FieldTransform::identifier_objects())
}

async fn open_controller() -> (Controller<MemoryStore>, Vec<String>) {
    let (store, ids) = seeded_store().await;
    (open_builder(store).build().unwrap(), ids)
}

fn names(items: &[Item]) -> Vec<&str> {
    items.iter().map(|i| i["name"].as_str().unwrap()).collect()
}

fn by_id(id: &str) -> ResourceRequest {
    ResourceRequest::new().with_param("id", id)
}

fn as_user(sub: &str) -> AuthenticatedUser {
    AuthenticatedUser::new(sub)
}

#[tokio::test]
async fn test_list_first_page() {
    let (controller, _) = open_controller().await;

    let request = ResourceRequest::new().with_query("perPage", "10");
    let payload = controller.list(&request).await.unwrap();

    assert_eq!(payload.items.len(), 10);
    assert_eq!(payload.pagination.total, 30);
    assert_eq!(payload.pagination.per_page, 10);
    assert_eq!(payload.pagination.total_pages, 3);
    assert!(payload.pagination.has_next);

    let item = &payload.items[0];
    assert!(item["id"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(!item.contains_key("_id"));
    assert_eq!(item["tags"], json!([{"id": "one"}, {"id": "two"}, {"id": "three"}]));
}

#[tokio::test]
async fn test_list_with_filter() {
    let (controller, _) = open_controller().await;

    let request = ResourceRequest::new().with_query("filter", json!({"name": "Item 3"}));
    let payload = controller.list(&request).await.unwrap();
    assert_eq!(names(&payload.items), ["Item 3"]);
    assert_eq!(payload.pagination.total, 1);

    let request = ResourceRequest::new().with_query("filter", json!({"tags": "two"}));
    let payload = controller.list(&request).await.unwrap();
    assert_eq!(payload.pagination.total, 30);
}

#[tokio::test]
async fn test_list_total_is_independent_of_paging() {
    let (controller, _) = open_controller().await;

    for per_page in [1u32, 7, 10, 30, 50] {
        for page in [1u32, 2, 4, 31] {
            let request = ResourceRequest::new()
                .with_query("page", page)
                .with_query("perPage", per_page);
            let payload = controller.list(&request).await.unwrap();

            assert_eq!(payload.pagination.total, 30);
            assert!(payload.items.len() <= per_page as usize);

            let expected = 30usize
                .saturating_sub(((page - 1) * per_page) as usize)
                .min(per_page as usize);
            assert_eq!(payload.items.len(), expected, "page {page} per_page {per_page}");
        }
    }
}

#[tokio::test]
async fn test_list_beyond_last_page_and_empty_collection() {
    let (controller, _) = open_controller().await;
    let request = ResourceRequest::new().with_query("page", 5).with_query("perPage", 10);
    let payload = controller.list(&request).await.unwrap();
    assert!(payload.items.is_empty());
    assert_eq!(payload.pagination.total, 30);
    assert!(!payload.pagination.has_next);

    let empty = open_builder(MemoryStore::new("empty")).build().unwrap();
    let payload = empty.list(&ResourceRequest::new()).await.unwrap();
    assert!(payload.items.is_empty());
    assert_eq!(payload.pagination.total, 0);
    assert_eq!(payload.pagination.total_pages, 0);
}

#[tokio::test]
async fn test_list_sorting() {
    let (store, _) = seeded_store().await;
    let controller = open_builder(store)
        .default_sort(Sort::ascending("name"))
        .build()
        .unwrap();

    let payload = controller
        .list(&ResourceRequest::new().with_query("perPage", 3))
        .await
        .unwrap();
    assert_eq!(names(&payload.items), ["Item 1", "Item 10", "Item 11"]);

    let request = ResourceRequest::new()
        .with_query("perPage", 2)
        .with_query("sort", "-name");
    let payload = controller.list(&request).await.unwrap();
    assert_eq!(names(&payload.items), ["Item 9", "Item 8"]);

    let request = ResourceRequest::new()
        .with_query("perPage", 2)
        .with_query("order", "desc");
    let payload = controller.list(&request).await.unwrap();
    assert_eq!(names(&payload.items), ["Item 9", "Item 8"]);
}

#[tokio::test]
async fn test_list_caller_id_within_security_scope() {
    let (store, ids) = seeded_store().await;
    let scoped = vec![json!(ids[0]), json!(ids[1])];
    let controller = open_builder(store)
        .security(
            Operation::List,
            policy_fn(move |_: &ResourceRequest| {
                Ok(Filter::new().with("_id", Condition::In(scoped.clone())))
            }),
        )
        .build()
        .unwrap();

    let payload = controller.list(&ResourceRequest::new()).await.unwrap();
    assert_eq!(payload.pagination.total, 2);

    let request = ResourceRequest::new().with_query("filter", json!({"id": ids[0]}));
    let payload = controller.list(&request).await.unwrap();
    assert_eq!(payload.pagination.total, 1);
    assert_eq!(payload.items[0]["id"], ids[0].as_str());

    let request = ResourceRequest::new().with_query("filter", json!({"id": ids[2]}));
    let payload = controller.list(&request).await.unwrap();
    assert_eq!(payload.pagination.total, 0);
}

#[tokio::test]
async fn test_list_projection() {
    let (store, _) = seeded_store().await;
    let controller = open_builder(store)
        .projection(View::List, Projection::fields(["name"]))
        .build()
        .unwrap();

    let payload = controller.list(&ResourceRequest::new()).await.unwrap();
    for item in &payload.items {
        let keys: Vec<&str> = item.keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 2);
        assert!(item.contains_key("id") && item.contains_key("name"));
    }
}

#[tokio::test]
async fn test_search_filter_hook() {
    let (store, _) = seeded_store().await;
    let controller = open_builder(store)
        .search_filter(|request: &ResourceRequest| match request.query.get("q") {
            Some(Value::String(q)) => Filter::eq("owner", q.as_str()),
            _ => Filter::new(),
        })
        .build()
        .unwrap();

    let request = ResourceRequest::new().with_query("q", "alice");
    let payload = controller.list(&request).await.unwrap();
    assert_eq!(payload.pagination.total, 15);
    assert!(payload.items.iter().all(|i| i["owner"] == "alice"));
}

#[tokio::test]
async fn test_references() {
    let (controller, ids) = open_controller().await;

    let request = ResourceRequest::new().with_query("ids", json!(ids[..3]));
    let payload = controller.references(&request).await.unwrap();
    assert_eq!(payload.total, 3);
    assert_eq!(payload.items.len(), 3);

    let request = ResourceRequest::new().with_body(json!({
        "ids": [ids[0], "not-an-id", 42, ids[1]]
    }));
    let payload = controller.references(&request).await.unwrap();
    assert_eq!(payload.total, 2);

    let payload = controller.references(&ResourceRequest::new()).await.unwrap();
    assert_eq!(payload.total, 0);
    assert!(payload.items.is_empty());

    let request = ResourceRequest::new().with_body(json!({"ids": ids[0]}));
    let err = controller.references(&request).await.unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn test_get_one() {
    let (controller, ids) = open_controller().await;

    let payload = controller.get_one(&by_id(&ids[2])).await.unwrap();
    assert_eq!(payload.item["name"], "Item 3");
    assert_eq!(payload.item["id"], ids[2].as_str());

    let missing = DocumentId::new().to_string();
    let err = controller.get_one(&by_id(&missing)).await.unwrap_err();
    assert!(matches!(&err, Error::NotFound { id, .. } if *id == missing));
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

    let err = controller.get_one(&by_id("Item 3")).await.unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));

    let err = controller.get_one(&ResourceRequest::new()).await.unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn test_create_round_trips_tags() {
    let (controller, _) = open_controller().await;

    let body = json!({"name": "New Item", "tags": [{"id": "a"}, {"id": "b"}]});
    let payload = controller
        .create(&ResourceRequest::new().with_body(body))
        .await
        .unwrap();

    let created = &payload.created_item;
    assert_eq!(created["tags"], json!([{"id": "a"}, {"id": "b"}]));
    assert_eq!(created["name"], "New Item");
    let id = created["id"].as_str().unwrap();
    assert!(DocumentId::from_str(id).is_ok());

    // stored compacted
    let stored = controller
        .collection()
        .find_one(&Filter::eq("_id", id), &Projection::All)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored["tags"], json!(["a", "b"]));
    assert_eq!(controller.collection().len().await, 31);
}

#[tokio::test]
async fn test_create_ignores_caller_identifier() {
    let (controller, ids) = open_controller().await;

    let body = json!({"id": ids[0], "name": "Impostor"});
    let payload = controller
        .create(&ResourceRequest::new().with_body(body))
        .await
        .unwrap();
    assert_ne!(payload.created_item["id"], ids[0].as_str());
}

#[tokio::test]
async fn test_create_with_alter_hook() {
    let (controller, _) = open_controller().await;
    let request = ResourceRequest::new()
        .with_body(json!({"name": "Owned"}))
        .with_user(as_user("carol"));

    let owner = request.user.as_ref().map(|u| u.sub.clone());
    let payload = controller
        .create_with(&request, move |document| {
            if let Some(owner) = owner {
                document.insert("owner".to_string(), Value::String(owner));
            }
        })
        .await
        .unwrap();
    assert_eq!(payload.created_item["owner"], "carol");
}

#[tokio::test]
async fn test_create_validation_failure() {
    let (store, _) = seeded_store().await;
    let controller = open_builder(store)
        .validator(Operation::Post, KnownFields::new(["tags"]).require("name"))
        .build()
        .unwrap();

    let request = ResourceRequest::new().with_body(json!({"colour": "red"}));
    let err = controller.create(&request).await.unwrap_err();
    match &err {
        Error::Validation(validation) => {
            let fields: Vec<&str> = validation.fields.iter().map(|f| f.field.as_str()).collect();
            assert!(fields.contains(&"colour"));
            assert!(fields.contains(&"name"));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(controller.collection().len().await, 30);

    let err = controller
        .create(&ResourceRequest::new().with_body(json!(["not", "an", "object"])))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_update_one() {
    let (controller, ids) = open_controller().await;

    let request = by_id(&ids[0]).with_body(json!({"ops": {"name": "Renamed", "tags": [{"id": "x"}]}}));
    let payload = controller.update_one(&request).await.unwrap();

    assert_eq!(payload.result, UpdateResult { matched: 1, modified: 1 });
    assert_eq!(payload.ops["id"], ids[0].as_str());
    assert_eq!(payload.ops["name"], "Renamed");
    assert_eq!(payload.ops["tags"], json!([{"id": "x"}]));

    let item = controller.get_one(&by_id(&ids[0])).await.unwrap().item;
    assert_eq!(item["name"], "Renamed");
    assert_eq!(item["owner"], "alice");
}

#[tokio::test]
async fn test_update_one_requires_identifier() {
    let (controller, _) = open_controller().await;
    let request = ResourceRequest::new().with_body(json!({"ops": {"name": "x"}}));
    let err = controller.update_one(&request).await.unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn test_update_many() {
    let (controller, ids) = open_controller().await;

    let request = ResourceRequest::new().with_body(json!({
        "ids": ids[..3],
        "ops": {"flag": true, "id": "ignored"}
    }));
    let payload = controller.update_many(&request).await.unwrap();

    assert_eq!(payload.result, UpdateResult { matched: 3, modified: 3 });
    assert_eq!(payload.ids.len(), 3);
    assert!(payload.ids.iter().all(|id| !id.is_empty()));
    assert_eq!(Value::Object(payload.ops), json!({"flag": true}));

    let err = controller
        .update_many(&ResourceRequest::new().with_body(json!({"ops": {"flag": false}})))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));

    let request = ResourceRequest::new().with_body(json!({"ids": [ids[0], "bogus"], "ops": {}}));
    let err = controller.update_many(&request).await.unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn test_update_many_validator_falls_back_to_put() {
    let (store, ids) = seeded_store().await;
    let controller = open_builder(store)
        .validator(Operation::Put, KnownFields::new(["name"]))
        .build()
        .unwrap();

    let request = ResourceRequest::new().with_body(json!({"ids": ids[..2], "ops": {"rank": 1}}));
    let err = controller.update_many(&request).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_delete_one_without_identifier_touches_nothing() {
    let (controller, _) = open_controller().await;

    for request in [ResourceRequest::new(), by_id(""), by_id("   ")] {
        let err = controller.delete_one(&request).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }
    assert_eq!(controller.collection().len().await, 30);

    // identifier checks come before authorization
    let (store, _) = seeded_store().await;
    let locked = Controller::builder(store).security_all(DenyAll).build().unwrap();
    let err = locked.delete_one(&ResourceRequest::new()).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(locked.collection().len().await, 30);
}

#[tokio::test]
async fn test_delete_one_and_many() {
    let (controller, ids) = open_controller().await;

    let payload = controller.delete_one(&by_id(&ids[0])).await.unwrap();
    assert_eq!(payload.result, DeleteResult { deleted_count: 1 });
    assert_eq!(controller.collection().len().await, 29);

    let request = ResourceRequest::new().with_query("ids", json!(ids[1..4]));
    let payload = controller.delete_many(&request).await.unwrap();
    assert_eq!(payload.result.deleted_count, 3);
    assert_eq!(controller.collection().len().await, 26);

    let request = ResourceRequest::new().with_query("ids", json!([]));
    let payload = controller.delete_many(&request).await.unwrap();
    assert_eq!(payload.result.deleted_count, 0);
    assert_eq!(controller.collection().len().await, 26);

    let err = controller.delete_many(&ResourceRequest::new()).await.unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn test_owner_scope_cannot_be_broadened() {
    let (store, ids) = seeded_store().await;
    let controller = open_builder(store)
        .security_all(OwnerScope::new("owner"))
        .build()
        .unwrap();

    let request = ResourceRequest::new()
        .with_query("filter", json!({"owner": "bob"}))
        .with_query("perPage", 100)
        .with_user(as_user("alice"));
    let payload = controller.list(&request).await.unwrap();
    assert_eq!(payload.pagination.total, 15);
    assert!(payload.items.iter().all(|i| i["owner"] == "alice"));

    // ids[1] belongs to bob
    let err = controller
        .get_one(&by_id(&ids[1]).with_user(as_user("alice")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    let request = by_id(&ids[1])
        .with_body(json!({"ops": {"name": "Stolen"}}))
        .with_user(as_user("alice"));
    let payload = controller.update_one(&request).await.unwrap();
    assert_eq!(payload.result.matched, 0);

    let request = ResourceRequest::new()
        .with_body(json!({"ids": ids[..4]}))
        .with_user(as_user("alice"));
    let payload = controller.delete_many(&request).await.unwrap();
    assert_eq!(payload.result.deleted_count, 2);

    let err = controller.list(&ResourceRequest::new()).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden { .. }));
}

#[tokio::test]
async fn test_forbidden_and_failed_authorization_differ() {
    let (store, _) = seeded_store().await;
    let controller = open_builder(store)
        .security(Operation::List, DenyAll)
        .security(
            Operation::View,
            policy_fn(|_: &ResourceRequest| Err(Rejection::failed(anyhow::anyhow!("policy backend down")))),
        )
        .build()
        .unwrap();

    let err = controller.list(&ResourceRequest::new()).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden { operation: Operation::List }));
    assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);

    let err = controller
        .get_one(&by_id(&DocumentId::new().to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Authorization { operation: Operation::View, .. }));
    assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_validator_may_reshape() {
    let (store, ids) = seeded_store().await;
    let controller = open_builder(store)
        .validator(
            Operation::Put,
            validator_fn(|mut data: Value, _: &ResourceRequest| {
                if let Some(name) = data.get("name").and_then(Value::as_str) {
                    let trimmed = Value::String(name.trim().to_string());
                    data["name"] = trimmed;
                }
                Ok::<_, ValidationError>(data)
            }),
        )
        .build()
        .unwrap();

    let request = by_id(&ids[0]).with_body(json!({"ops": {"name": "  Padded  "}}));
    let payload = controller.update_one(&request).await.unwrap();
    assert_eq!(payload.ops["name"], "Padded");
}

#[test]
fn test_build_requires_every_policy() {
    let err = Controller::builder(MemoryStore::new("items"))
        .security(Operation::List, AllowAll)
        .security(Operation::View, AllowAll)
        .build()
        .unwrap_err();

    let Error::Configuration(message) = err else {
        panic!("expected configuration error");
    };
    for name in ["post", "put", "putMany", "delete", "deleteMany"] {
        assert!(message.contains(name), "{message}");
    }
    assert!(!message.contains("list"));
}

#[test]
fn test_build_rejects_bad_settings() {
    let err = Controller::builder(MemoryStore::new("items"))
        .security_all(AllowAll)
        .field("_id", FieldTransform::identifier_list())
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));

    let err = Controller::builder(MemoryStore::new("items"))
        .security_all(AllowAll)
        .pagination(PaginationConfig {
            default_per_page: 0,
            max_per_page: 10,
        })
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[tokio::test]
async fn test_concurrent_requests_share_configuration() {
    let (controller, _) = open_controller().await;

    let creates = (0..10).map(|i| {
        let controller = controller.clone();
        async move {
            let request = ResourceRequest::new().with_body(json!({"name": format!("Batch {i}")}));
            controller.create(&request).await
        }
    });
    let results = futures::future::join_all(creates).await;
    assert!(results.iter().all(|r| r.is_ok()));

    let lists = (0..10).map(|_| {
        let controller = controller.clone();
        async move { controller.list(&ResourceRequest::new()).await }
    });
    for payload in futures::future::join_all(lists).await {
        assert_eq!(payload.unwrap().pagination.total, 40);
    }
}

/// Store whose every call fails
struct FailingStore;

impl FailingStore {
    fn failure(operation: StoreOperation) -> StoreError {
        StoreError::connection_failed(operation, "connection refused").with_collection("broken")
    }
}

impl DocumentStore for FailingStore {
    fn name(&self) -> &str {
        "broken"
    }

    fn is_valid_id(&self, raw: &str) -> bool {
        DocumentId::is_valid(raw)
    }

    async fn count(&self, _filter: &Filter) -> StoreResult<u64> {
        Err(Self::failure(StoreOperation::Count))
    }

    async fn find(&self, _filter: &Filter, _options: &FindOptions) -> StoreResult<Vec<Document>> {
        Err(Self::failure(StoreOperation::Find))
    }

    async fn find_one(&self, _filter: &Filter, _projection: &Projection) -> StoreResult<Option<Document>> {
        Err(Self::failure(StoreOperation::FindOne))
    }

    async fn insert(&self, _document: Document) -> StoreResult<Document> {
        Err(Self::failure(StoreOperation::Insert))
    }

    async fn update_one(&self, _filter: &Filter, _fields: Document) -> StoreResult<UpdateResult> {
        Err(Self::failure(StoreOperation::Update))
    }

    async fn update_many(&self, _filter: &Filter, _fields: Document) -> StoreResult<UpdateResult> {
        Err(Self::failure(StoreOperation::Update))
    }

    async fn delete_one(&self, _filter: &Filter) -> StoreResult<DeleteResult> {
        Err(Self::failure(StoreOperation::Delete))
    }

    async fn delete_many(&self, _filter: &Filter) -> StoreResult<DeleteResult> {
        Err(Self::failure(StoreOperation::Delete))
    }
}

#[tokio::test]
async fn test_store_failures_are_internal_errors() {
    let controller = Controller::builder(FailingStore).security_all(AllowAll).build().unwrap();

    let err = controller.list(&ResourceRequest::new()).await.unwrap_err();
    match &err {
        Error::Store(store) => {
            assert_eq!(store.operation, StoreOperation::Count);
            assert!(store.is_retriable());
        }
        other => panic!("expected store error, got {other:?}"),
    }
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

    let err = controller
        .create(&ResourceRequest::new().with_body(json!({"name": "x"})))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Store(_)));
}
