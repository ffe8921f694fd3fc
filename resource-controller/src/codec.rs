//! Item codec: store documents to API items and back
//!
//! Externally, every item carries a string `id` and never the store's native
//! identifier field. Fields whose shape differs between storage and the API
//! are declared in a transform table, one [`FieldTransform`] per field, so
//! the direction of each conversion is explicit and reversibility can be
//! checked per field.
//!
//! ```rust
//! use resource_controller::codec::{FieldTransform, ItemCodec};
//! use serde_json::json;
//!
//! let codec = ItemCodec::new("_id").with_field("tags", FieldTransform::identifier_objects());
//!
//! let stored = json!({"_id": "doc_1", "name": "Item 1", "tags": ["one", "two"]});
//! let item = codec.expand(stored.as_object().unwrap().clone());
//! assert_eq!(
//!     serde_json::Value::Object(item.clone()),
//!     json!({"id": "doc_1", "name": "Item 1", "tags": [{"id": "one"}, {"id": "two"}]})
//! );
//!
//! let back = codec.compact(item);
//! assert_eq!(serde_json::Value::Object(back), stored);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::store::Document;

/// External item shape
pub type Item = Map<String, Value>;

/// Name of the identifier field on external items
pub const ITEM_ID_FIELD: &str = "id";

/// One direction of a field conversion
pub type TransformFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Representation of a field on one side of the codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    /// Array of bare identifiers: `["a", "b"]`
    Identifiers,
    /// Array of identifier objects: `[{"id": "a"}, {"id": "b"}]`
    IdentifierObjects,
    /// Anything else; the transform pair defines it
    Opaque,
}

/// Declared conversion for one field
#[derive(Clone)]
pub struct FieldTransform {
    internal: FieldShape,
    external: FieldShape,
    reversible: bool,
    expand: TransformFn,
    compact: TransformFn,
}

impl fmt::Debug for FieldTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldTransform")
            .field("internal", &self.internal)
            .field("external", &self.external)
            .field("reversible", &self.reversible)
            .finish_non_exhaustive()
    }
}

impl FieldTransform {
    /// A transform pair whose directions undo each other
    pub fn reversible<E, C>(internal: FieldShape, external: FieldShape, expand: E, compact: C) -> Self
    where
        E: Fn(Value) -> Value + Send + Sync + 'static,
        C: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self {
            internal,
            external,
            reversible: true,
            expand: Arc::new(expand),
            compact: Arc::new(compact),
        }
    }

    /// A transform pair that loses information in at least one direction
    pub fn one_way<E, C>(internal: FieldShape, external: FieldShape, expand: E, compact: C) -> Self
    where
        E: Fn(Value) -> Value + Send + Sync + 'static,
        C: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self {
            reversible: false,
            ..Self::reversible(internal, external, expand, compact)
        }
    }

    /// Stored as bare identifiers, exposed as `{id}` objects
    pub fn identifier_objects() -> Self {
        Self::reversible(
            FieldShape::Identifiers,
            FieldShape::IdentifierObjects,
            wrap_identifiers,
            unwrap_identifiers,
        )
    }

    /// Stored as `{id}` objects, exposed as bare identifiers
    pub fn identifier_list() -> Self {
        Self::reversible(
            FieldShape::IdentifierObjects,
            FieldShape::Identifiers,
            unwrap_identifiers,
            wrap_identifiers,
        )
    }

    /// Storage-side shape
    pub fn internal(&self) -> FieldShape {
        self.internal
    }

    /// API-side shape
    pub fn external(&self) -> FieldShape {
        self.external
    }

    /// Whether compact undoes expand (and vice versa)
    pub fn is_reversible(&self) -> bool {
        self.reversible
    }
}

/// Turn bare identifiers into `{id}` objects; objects pass through
///
/// A null field becomes an empty array.
pub fn wrap_identifiers(value: Value) -> Value {
    match value {
        Value::Null => Value::Array(Vec::new()),
        Value::Array(entries) => Value::Array(
            entries
                .into_iter()
                .map(|entry| match entry {
                    Value::Object(_) => entry,
                    bare => {
                        let mut object = Map::new();
                        object.insert(ITEM_ID_FIELD.to_string(), bare);
                        Value::Object(object)
                    }
                })
                .collect(),
        ),
        other => other,
    }
}

/// Collapse `{id}` objects to their identifier; bare values pass through
///
/// A null field becomes an empty array.
pub fn unwrap_identifiers(value: Value) -> Value {
    match value {
        Value::Null => Value::Array(Vec::new()),
        Value::Array(entries) => Value::Array(
            entries
                .into_iter()
                .map(|entry| match entry {
                    Value::Object(mut object) => {
                        object.remove(ITEM_ID_FIELD).unwrap_or(Value::Null)
                    }
                    bare => bare,
                })
                .collect(),
        ),
        other => other,
    }
}

/// Converts between store documents and API items
#[derive(Debug, Clone)]
pub struct ItemCodec {
    id_field: String,
    fields: BTreeMap<String, FieldTransform>,
}

impl ItemCodec {
    /// Codec for a store whose identifier lives in `id_field`
    pub fn new(id_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Declare a field conversion
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, transform: FieldTransform) -> Self {
        self.fields.insert(field.into(), transform);
        self
    }

    /// Native identifier field
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Declared conversion for a field
    pub fn transform(&self, field: &str) -> Option<&FieldTransform> {
        self.fields.get(field)
    }

    /// Whether a field round-trips; undeclared fields pass through untouched
    pub fn is_reversible(&self, field: &str) -> bool {
        self.fields.get(field).map_or(true, FieldTransform::is_reversible)
    }

    /// Store document to API item
    pub fn expand(&self, document: Document) -> Item {
        let mut item = Item::new();
        let mut native_id = None;

        for (field, value) in document {
            if field == self.id_field {
                native_id = Some(value);
                continue;
            }
            let value = match self.fields.get(&field) {
                Some(transform) => (transform.expand)(value),
                None => value,
            };
            item.insert(field, value);
        }

        if let Some(id) = native_id {
            item.insert(ITEM_ID_FIELD.to_string(), Value::String(id_to_string(id)));
        }
        item
    }

    /// Expand a batch of documents
    pub fn expand_all(&self, documents: Vec<Document>) -> Vec<Item> {
        documents.into_iter().map(|d| self.expand(d)).collect()
    }

    /// API data to store document
    ///
    /// `id` is mapped back to the native identifier field.
    pub fn compact(&self, item: Item) -> Document {
        let mut document = Document::new();
        for (field, value) in item {
            if field == ITEM_ID_FIELD {
                document.insert(self.id_field.clone(), value);
                continue;
            }
            let value = match self.fields.get(&field) {
                Some(transform) => (transform.compact)(value),
                None => value,
            };
            document.insert(field, value);
        }
        document
    }

    /// String form of a document's identifier
    pub fn identifier_of(&self, document: &Document) -> Option<String> {
        document.get(&self.id_field).cloned().map(id_to_string)
    }
}

fn id_to_string(id: Value) -> String {
    match id {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
