//! Operation handlers
//!
//! Each handler authorizes first (deletes check their identifiers first),
//! then builds its filter by intersecting the security fragment with the
//! identifier constraint, so neither the caller nor a missing identifier can
//! widen what a store call touches.

use serde_json::Value;

use super::{Controller, View};
use crate::codec::Item;
use crate::error::{Error, Result};
use crate::filter::{json_kind, Condition, Filter};
use crate::request::ResourceRequest;
use crate::response::{
    CreatedPayload, DeletePayload, ItemPayload, ListPayload, PaginationMeta, ReferencesPayload,
    UpdateManyPayload, UpdatePayload,
};
use crate::security::Operation;
use crate::store::{Document, DocumentStore, FindOptions, Projection};
use crate::validation::ValidationError;

impl<S: DocumentStore> Controller<S> {
    /// Page through the collection
    #[tracing::instrument(skip_all, fields(collection = %self.collection().name(), operation = "list"))]
    pub async fn list(&self, request: &ResourceRequest) -> Result<ListPayload> {
        let security = self.config.security.authorize(Operation::List, request).await?;
        let query = self.query_builder().build(request, security)?;

        let total = self.collection().count(&query.filter).await?;
        let pagination = PaginationMeta::new(query.page, query.per_page, total);
        if total == 0 || query.skip >= total {
            tracing::debug!(total, skip = query.skip, "Nothing to fetch");
            return Ok(ListPayload {
                items: Vec::new(),
                pagination,
            });
        }

        let options = FindOptions::new()
            .projection(self.projection(View::List).clone())
            .skip(query.skip)
            .limit(query.limit)
            .sort(query.sort);
        let documents = self.collection().find(&query.filter, &options).await?;
        let items = self.codec().expand_all(documents);

        tracing::debug!(total, returned = items.len(), "Listed items");
        Ok(ListPayload { items, pagination })
    }

    /// Fetch one item by its path identifier
    #[tracing::instrument(skip_all, fields(collection = %self.collection().name(), operation = "view"))]
    pub async fn get_one(&self, request: &ResourceRequest) -> Result<ItemPayload> {
        let security = self.config.security.authorize(Operation::View, request).await?;
        let id = self.require_id(request)?;
        let filter = self.scope_to(security, &id);

        let document = self
            .collection()
            .find_one(&filter, self.projection(View::View))
            .await?
            .ok_or_else(|| Error::NotFound {
                collection: self.collection().name().to_string(),
                id,
            })?;

        Ok(ItemPayload {
            item: self.codec().expand(document),
        })
    }

    /// Fetch the items named by an `ids` list
    ///
    /// Invalid identifiers are dropped; `total` is the number of items found.
    #[tracing::instrument(skip_all, fields(collection = %self.collection().name(), operation = "list"))]
    pub async fn references(&self, request: &ResourceRequest) -> Result<ReferencesPayload> {
        let security = self.config.security.authorize(Operation::List, request).await?;
        let ids = self.id_sequence(request)?;
        if ids.is_empty() {
            return Ok(ReferencesPayload {
                items: Vec::new(),
                total: 0,
            });
        }

        let filter = self.scope_to_all(security, ids);
        let options = FindOptions::new().projection(self.projection(View::References).clone());
        let documents = self.collection().find(&filter, &options).await?;
        let items = self.codec().expand_all(documents);

        let total = items.len() as u64;
        tracing::debug!(total, "Resolved references");
        Ok(ReferencesPayload { items, total })
    }

    /// Create an item from the request body
    pub async fn create(&self, request: &ResourceRequest) -> Result<CreatedPayload> {
        self.create_with(request, |_| {}).await
    }

    /// Create an item, letting `alter` adjust the compacted document before insert
    ///
    /// Any identifier in the body is discarded; `alter` may set one.
    #[tracing::instrument(skip_all, fields(collection = %self.collection().name(), operation = "post"))]
    pub async fn create_with<F>(&self, request: &ResourceRequest, alter: F) -> Result<CreatedPayload>
    where
        F: FnOnce(&mut Document) + Send,
    {
        // inserts are not scoped by a filter
        self.config.security.authorize(Operation::Post, request).await?;

        let data = self
            .config
            .validators
            .validate(Operation::Post, request.body.clone(), request)
            .await?;
        let mut document = self.codec().compact(into_object(data)?);
        document.remove(self.collection().id_field());
        alter(&mut document);

        let stored = self.collection().insert(document).await?;
        let created_item = self.codec().expand(stored);

        let id = created_item.get("id").and_then(Value::as_str).unwrap_or_default();
        tracing::info!(id, "Created item");
        Ok(CreatedPayload { created_item })
    }

    /// Apply `ops` to the item named by the path identifier
    #[tracing::instrument(skip_all, fields(collection = %self.collection().name(), operation = "put"))]
    pub async fn update_one(&self, request: &ResourceRequest) -> Result<UpdatePayload> {
        let security = self.config.security.authorize(Operation::Put, request).await?;
        let id = self.require_id(request)?;
        let filter = self.scope_to(security, &id);

        let mut fields = self.validated_ops(Operation::Put, request).await?;
        let result = self.collection().update_one(&filter, fields.clone()).await?;

        fields.insert(self.collection().id_field().to_string(), Value::String(id));
        tracing::info!(matched = result.matched, modified = result.modified, "Updated item");
        Ok(UpdatePayload {
            result,
            ops: self.codec().expand(fields),
        })
    }

    /// Apply `ops` to every item named by an `ids` list
    ///
    /// The returned `ids` come from a re-query after the update and list every
    /// document that matches the filter, changed or not.
    #[tracing::instrument(skip_all, fields(collection = %self.collection().name(), operation = "putMany"))]
    pub async fn update_many(&self, request: &ResourceRequest) -> Result<UpdateManyPayload> {
        let security = self.config.security.authorize(Operation::PutMany, request).await?;
        let ids = self.require_ids(request)?;
        let filter = self.scope_to_all(security, ids);

        let fields = self.validated_ops(Operation::PutMany, request).await?;
        let result = self.collection().update_many(&filter, fields.clone()).await?;

        let options = FindOptions::new().projection(Projection::identifiers());
        let matching = self.collection().find(&filter, &options).await?;
        let ids: Vec<String> = matching
            .iter()
            .filter_map(|document| self.codec().identifier_of(document))
            .collect();

        tracing::info!(
            matched = result.matched,
            modified = result.modified,
            "Updated items"
        );
        Ok(UpdateManyPayload {
            result,
            ops: self.codec().expand(fields),
            ids,
        })
    }

    /// Remove the item named by the path identifier
    #[tracing::instrument(skip_all, fields(collection = %self.collection().name(), operation = "delete"))]
    pub async fn delete_one(&self, request: &ResourceRequest) -> Result<DeletePayload> {
        let id = self.require_id(request)?;
        let security = self.config.security.authorize(Operation::Delete, request).await?;
        let filter = self.scope_to(security, &id);

        let result = self.collection().delete_one(&filter).await?;
        tracing::info!(deleted = result.deleted_count, "Deleted item");
        Ok(DeletePayload { result })
    }

    /// Remove every item named by an `ids` list
    #[tracing::instrument(skip_all, fields(collection = %self.collection().name(), operation = "deleteMany"))]
    pub async fn delete_many(&self, request: &ResourceRequest) -> Result<DeletePayload> {
        let ids = self.require_ids(request)?;
        let security = self.config.security.authorize(Operation::DeleteMany, request).await?;
        let filter = self.scope_to_all(security, ids);

        let result = self.collection().delete_many(&filter).await?;
        tracing::info!(deleted = result.deleted_count, "Deleted items");
        Ok(DeletePayload { result })
    }

    /// Validate and compact `ops`; the identifier field is never written
    async fn validated_ops(&self, operation: Operation, request: &ResourceRequest) -> Result<Document> {
        let ops = self
            .config
            .validators
            .validate(operation, request.ops(), request)
            .await?;
        let mut fields = self.codec().compact(into_object(ops)?);
        fields.remove(self.collection().id_field());
        Ok(fields)
    }

    fn scope_to(&self, security: Filter, id: &str) -> Filter {
        security.constrain(
            self.collection().id_field(),
            Condition::Eq(Value::String(id.to_string())),
        )
    }

    fn scope_to_all(&self, security: Filter, ids: Vec<String>) -> Filter {
        security.constrain(
            self.collection().id_field(),
            Condition::In(ids.into_iter().map(Value::String).collect()),
        )
    }

    fn require_id(&self, request: &ResourceRequest) -> Result<String> {
        let id = request
            .param("id")
            .ok_or_else(|| Error::BadRequest("an item identifier is required".to_string()))?;
        if !self.collection().is_valid_id(id) {
            return Err(Error::BadRequest(format!("malformed identifier '{id}'")));
        }
        Ok(id.to_string())
    }

    /// Bulk identifiers; every entry must be a valid identifier
    fn require_ids(&self, request: &ResourceRequest) -> Result<Vec<String>> {
        let Some(list) = request.id_list() else {
            return Err(Error::BadRequest("an 'ids' list is required".to_string()));
        };
        let Value::Array(entries) = list else {
            return Err(Error::BadRequest(format!(
                "'ids' must be a list, got {}",
                json_kind(list)
            )));
        };

        entries
            .iter()
            .map(|entry| match entry.as_str() {
                Some(id) if self.collection().is_valid_id(id) => Ok(id.to_string()),
                _ => Err(Error::BadRequest(format!("malformed identifier {entry}"))),
            })
            .collect()
    }

    /// Reference identifiers; invalid entries are dropped
    fn id_sequence(&self, request: &ResourceRequest) -> Result<Vec<String>> {
        match request.id_list() {
            None => Ok(Vec::new()),
            Some(Value::Array(entries)) => Ok(entries
                .iter()
                .filter_map(Value::as_str)
                .filter(|id| self.collection().is_valid_id(id))
                .map(str::to_string)
                .collect()),
            Some(other) => Err(Error::BadRequest(format!(
                "'ids' must be a list, got {}",
                json_kind(other)
            ))),
        }
    }
}

fn into_object(data: Value) -> Result<Item> {
    match data {
        Value::Object(map) => Ok(map),
        other => Err(ValidationError::new(format!(
            "expected an object, got {}",
            json_kind(&other)
        ))
        .into()),
    }
}
