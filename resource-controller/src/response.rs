//! Success payloads for controller operations
//!
//! Each operation returns one of these types; all of them serialize as
//! camelCase JSON and respond with `200 OK`.
//!
//! | Operation | Payload |
//! |-----------|---------|
//! | list | [`ListPayload`] `{items, pagination}` |
//! | get-one | [`ItemPayload`] `{item}` |
//! | get-many-by-reference | [`ReferencesPayload`] `{items, total}` |
//! | create | [`CreatedPayload`] `{createdItem}` |
//! | update-one | [`UpdatePayload`] `{result, ops}` |
//! | update-many | [`UpdateManyPayload`] `{result, ops, ids}` |
//! | delete-one / delete-many | [`DeletePayload`] `{result}` |

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use paginator_rs::PaginatorResponseMeta;
use serde::{Deserialize, Serialize};

use crate::codec::Item;
use crate::store::{DeleteResult, UpdateResult};

/// Pagination metadata for list responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    /// Documents matching the query before skip/limit
    pub total: u64,
    /// Page size in effect
    pub per_page: u32,
    /// Current page (1-indexed)
    pub page: u32,
    /// Number of pages
    pub total_pages: u32,
    /// Whether a later page exists
    pub has_next: bool,
    /// Whether an earlier page exists
    pub has_prev: bool,
}

impl PaginationMeta {
    /// Metadata for `page` of `total` documents at `per_page` per page
    ///
    /// ```rust
    /// use resource_controller::response::PaginationMeta;
    ///
    /// let pagination = PaginationMeta::new(2, 10, 30);
    /// assert_eq!(pagination.total_pages, 3);
    /// assert!(pagination.has_next);
    /// assert!(pagination.has_prev);
    /// ```
    #[must_use]
    pub fn new(page: u32, per_page: u32, total: u64) -> Self {
        let per_page = per_page.max(1);
        let total_pages = total_pages(total, per_page);
        Self {
            total,
            per_page,
            page,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

/// Counts beyond `u32::MAX` saturate
impl From<PaginationMeta> for PaginatorResponseMeta {
    fn from(meta: PaginationMeta) -> Self {
        Self {
            page: meta.page,
            per_page: meta.per_page,
            total: Some(u32::try_from(meta.total).unwrap_or(u32::MAX)),
            total_pages: Some(meta.total_pages),
            has_next: meta.has_next,
            has_prev: meta.has_prev,
            next_cursor: None,
            prev_cursor: None,
        }
    }
}

fn total_pages(total: u64, per_page: u32) -> u32 {
    let per_page = u64::from(per_page);
    let pages = total.div_ceil(per_page);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Page of items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListPayload {
    /// Items on this page
    pub items: Vec<Item>,
    /// Paging metadata
    pub pagination: PaginationMeta,
}

/// Single item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPayload {
    /// The item
    pub item: Item,
}

/// Items fetched by identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencesPayload {
    /// Items found
    pub items: Vec<Item>,
    /// Number of items returned
    pub total: u64,
}

/// Newly created item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPayload {
    /// The item as persisted
    pub created_item: Item,
}

/// Result of a single-item update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePayload {
    /// Store match/modify counts
    pub result: UpdateResult,
    /// Applied fields, expanded, including the item `id`
    pub ops: Item,
}

/// Result of a bulk update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateManyPayload {
    /// Store match/modify counts
    pub result: UpdateResult,
    /// Applied fields, expanded
    pub ops: Item,
    /// Identifiers of every document matching the update filter afterwards
    pub ids: Vec<String>,
}

/// Result of a delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePayload {
    /// Store delete count
    pub result: DeleteResult,
}

macro_rules! ok_json {
    ($($payload:ty),+ $(,)?) => {
        $(
            impl IntoResponse for $payload {
                fn into_response(self) -> Response {
                    (StatusCode::OK, Json(self)).into_response()
                }
            }
        )+
    };
}

ok_json!(
    ListPayload,
    ItemPayload,
    ReferencesPayload,
    CreatedPayload,
    UpdatePayload,
    UpdateManyPayload,
    DeletePayload,
);
