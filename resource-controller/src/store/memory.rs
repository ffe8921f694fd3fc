//! In-process document store

use serde_json::Value;
use tokio::sync::RwLock;

use super::{
    DeleteResult, Document, DocumentStore, FindOptions, Projection, StoreError, StoreOperation,
    StoreResult, UpdateResult, DEFAULT_ID_FIELD,
};
use crate::filter::Filter;
use crate::ids::DocumentId;

/// Collection held in memory behind an async read-write lock
///
/// Identifiers are [`DocumentId`]s. Documents keep insertion order, which is
/// the order returned when a find has no sort.
///
/// ```rust
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use resource_controller::filter::Filter;
/// use resource_controller::store::{DocumentStore, MemoryStore};
/// use serde_json::json;
///
/// let store = MemoryStore::new("adventures");
/// let doc = store
///     .insert(json!({"name": "Moria"}).as_object().unwrap().clone())
///     .await
///     .unwrap();
/// assert!(store.is_valid_id(doc["_id"].as_str().unwrap()));
/// assert_eq!(store.count(&Filter::eq("name", "Moria")).await.unwrap(), 1);
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    id_field: String,
    documents: RwLock<Vec<Document>>,
}

impl MemoryStore {
    /// Empty collection using `_id` as the identifier field
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_field: DEFAULT_ID_FIELD.to_string(),
            documents: RwLock::new(Vec::new()),
        }
    }

    /// Use a different identifier field
    #[must_use]
    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    /// Number of stored documents
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// True when nothing is stored
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    fn project(&self, document: &Document, projection: &Projection) -> Document {
        projection.apply(document.clone(), &self.id_field)
    }

    fn check_fields(&self, fields: &Document) -> StoreResult<()> {
        if fields.contains_key(&self.id_field) {
            return Err(StoreError::invalid_document(
                StoreOperation::Update,
                format!("field '{}' cannot be updated", self.id_field),
            )
            .with_collection(&self.name));
        }
        Ok(())
    }
}

/// Set each field; true when anything changed
fn apply_fields(document: &mut Document, fields: &Document) -> bool {
    let mut changed = false;
    for (field, value) in fields {
        if document.get(field) != Some(value) {
            document.insert(field.clone(), value.clone());
            changed = true;
        }
    }
    changed
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn id_field(&self) -> &str {
        &self.id_field
    }

    fn is_valid_id(&self, raw: &str) -> bool {
        DocumentId::is_valid(raw)
    }

    async fn count(&self, filter: &Filter) -> StoreResult<u64> {
        let documents = self.documents.read().await;
        let count = documents.iter().filter(|d| filter.matches(d)).count();
        tracing::trace!(collection = %self.name, count, "count");
        Ok(count as u64)
    }

    async fn find(&self, filter: &Filter, options: &FindOptions) -> StoreResult<Vec<Document>> {
        let documents = self.documents.read().await;
        let mut matched: Vec<&Document> = documents.iter().filter(|d| filter.matches(d)).collect();

        if !options.sort.is_empty() {
            matched.sort_by(|a, b| options.sort.compare(a, b));
        }

        let page: Vec<Document> = matched
            .into_iter()
            .skip(to_usize(options.skip))
            .take(options.limit.map_or(usize::MAX, to_usize))
            .map(|d| self.project(d, &options.projection))
            .collect();

        tracing::trace!(collection = %self.name, returned = page.len(), "find");
        Ok(page)
    }

    async fn find_one(&self, filter: &Filter, projection: &Projection) -> StoreResult<Option<Document>> {
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .find(|d| filter.matches(d))
            .map(|d| self.project(d, projection)))
    }

    async fn insert(&self, mut document: Document) -> StoreResult<Document> {
        let mut documents = self.documents.write().await;

        match document.get(&self.id_field).cloned() {
            None | Some(Value::Null) => {
                document.insert(
                    self.id_field.clone(),
                    Value::String(DocumentId::new().to_string()),
                );
            }
            Some(Value::String(id)) => {
                if !self.is_valid_id(&id) {
                    return Err(StoreError::invalid_document(
                        StoreOperation::Insert,
                        format!("malformed identifier '{id}'"),
                    )
                    .with_collection(&self.name));
                }
                let taken = documents
                    .iter()
                    .any(|d| d.get(&self.id_field).and_then(Value::as_str) == Some(id.as_str()));
                if taken {
                    return Err(StoreError::duplicate_key(&self.name, id));
                }
            }
            Some(_) => {
                return Err(StoreError::invalid_document(
                    StoreOperation::Insert,
                    "identifier must be a string",
                )
                .with_collection(&self.name));
            }
        }

        documents.push(document.clone());
        tracing::trace!(collection = %self.name, total = documents.len(), "insert");
        Ok(document)
    }

    async fn update_one(&self, filter: &Filter, fields: Document) -> StoreResult<UpdateResult> {
        self.check_fields(&fields)?;
        let mut documents = self.documents.write().await;

        let Some(document) = documents.iter_mut().find(|d| filter.matches(d)) else {
            return Ok(UpdateResult::default());
        };
        let modified = apply_fields(document, &fields);

        Ok(UpdateResult {
            matched: 1,
            modified: u64::from(modified),
        })
    }

    async fn update_many(&self, filter: &Filter, fields: Document) -> StoreResult<UpdateResult> {
        self.check_fields(&fields)?;
        let mut documents = self.documents.write().await;

        let mut result = UpdateResult::default();
        for document in documents.iter_mut().filter(|d| filter.matches(d)) {
            result.matched += 1;
            if apply_fields(document, &fields) {
                result.modified += 1;
            }
        }
        tracing::trace!(
            collection = %self.name,
            matched = result.matched,
            modified = result.modified,
            "update_many"
        );
        Ok(result)
    }

    async fn delete_one(&self, filter: &Filter) -> StoreResult<DeleteResult> {
        let mut documents = self.documents.write().await;
        let deleted_count = match documents.iter().position(|d| filter.matches(d)) {
            Some(index) => {
                documents.remove(index);
                1
            }
            None => 0,
        };
        Ok(DeleteResult { deleted_count })
    }

    async fn delete_many(&self, filter: &Filter) -> StoreResult<DeleteResult> {
        let mut documents = self.documents.write().await;
        let before = documents.len();
        documents.retain(|d| !filter.matches(d));
        let deleted_count = (before - documents.len()) as u64;
        tracing::trace!(collection = %self.name, deleted_count, "delete_many");
        Ok(DeleteResult { deleted_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Condition;
    use crate::query::{Sort, SortOrder};
    use crate::store::StoreErrorKind;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    async fn seeded(n: usize) -> MemoryStore {
        let store = MemoryStore::new("items");
        for i in 1..=n {
            store
                .insert(doc(json!({"name": format!("Item {i}"), "rank": i % 3})))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_insert_assigns_identifier() {
        let store = MemoryStore::new("items");
        let stored = store.insert(doc(json!({"name": "a"}))).await.unwrap();
        let id = stored["_id"].as_str().unwrap();
        assert!(id.starts_with("doc_"));
        assert!(store.is_valid_id(id));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates_and_bad_ids() {
        let store = MemoryStore::new("items");
        let id = DocumentId::new().to_string();
        store.insert(doc(json!({"_id": id, "n": 1}))).await.unwrap();

        let err = store.insert(doc(json!({"_id": id}))).await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::DuplicateKey);

        let err = store.insert(doc(json!({"_id": 5}))).await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::InvalidDocument);

        let err = store.insert(doc(json!({"_id": "nope"}))).await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::InvalidDocument);
    }

    #[tokio::test]
    async fn test_find_sorts_pages_and_projects() {
        let store = seeded(10).await;
        let options = FindOptions::new()
            .sort(Sort::ascending("rank").then("name", SortOrder::Desc))
            .skip(1)
            .limit(3)
            .projection(Projection::fields(["name"]));

        let page = store.find(&Filter::new(), &options).await.unwrap();
        let names: Vec<_> = page.iter().map(|d| d["name"].as_str().unwrap()).collect();
        // rank 0: Item 9, Item 6, Item 3; rank 1: Item 7, ...
        assert_eq!(names, ["Item 6", "Item 3", "Item 7"]);
        assert!(page.iter().all(|d| d.contains_key("_id") && !d.contains_key("rank")));
    }

    #[tokio::test]
    async fn test_find_without_sort_keeps_insertion_order() {
        let store = seeded(3).await;
        let all = store.find(&Filter::new(), &FindOptions::new()).await.unwrap();
        let names: Vec<_> = all.iter().map(|d| d["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["Item 1", "Item 2", "Item 3"]);
    }

    #[tokio::test]
    async fn test_update_counts() {
        let store = seeded(6).await;
        let filter = Filter::eq("rank", 1);

        let result = store
            .update_many(&filter, doc(json!({"flag": true})))
            .await
            .unwrap();
        assert_eq!(result, UpdateResult { matched: 2, modified: 2 });

        let again = store
            .update_many(&filter, doc(json!({"flag": true})))
            .await
            .unwrap();
        assert_eq!(again, UpdateResult { matched: 2, modified: 0 });

        let single = store
            .update_one(&Filter::eq("name", "Item 2"), doc(json!({"flag": false})))
            .await
            .unwrap();
        assert_eq!(single, UpdateResult { matched: 1, modified: 1 });

        let missing = store
            .update_one(&Filter::eq("name", "nope"), doc(json!({"flag": false})))
            .await
            .unwrap();
        assert_eq!(missing, UpdateResult::default());
    }

    #[tokio::test]
    async fn test_update_refuses_identifier_change() {
        let store = seeded(1).await;
        let err = store
            .update_one(&Filter::new(), doc(json!({"_id": "doc_x"})))
            .await
            .unwrap_err();
        assert_eq!(err.operation, StoreOperation::Update);
    }

    #[tokio::test]
    async fn test_deletes() {
        let store = seeded(6).await;
        let one = store.delete_one(&Filter::eq("rank", 0)).await.unwrap();
        assert_eq!(one.deleted_count, 1);

        let many = store
            .delete_many(&Filter::new().with("rank", Condition::In(vec![json!(0), json!(1)])))
            .await
            .unwrap();
        assert_eq!(many.deleted_count, 3);
        assert_eq!(store.len().await, 2);

        let none = store.delete_one(&Filter::eq("rank", 0)).await.unwrap();
        assert_eq!(none.deleted_count, 0);
    }
}
