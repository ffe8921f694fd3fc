//! List query parameters and effective-query construction
//!
//! [`ListQuery`] is the typed view of a list request's query string. The
//! [`QueryBuilder`] turns it, together with the security fragment and the
//! controller's search hook, into an [`EffectiveQuery`] the store can run.
//!
//! Filter fragments merge in a fixed order: search, then caller, then
//! security. The security fragment is applied last so a caller can never
//! relax a policy-imposed constraint. A caller's identifier condition is the
//! exception: it is intersected with whatever the other fragments say about
//! the identifier, so it can only narrow the result.
//!
//! ```rust
//! use resource_controller::config::PaginationConfig;
//! use resource_controller::filter::Filter;
//! use resource_controller::query::QueryBuilder;
//! use resource_controller::request::ResourceRequest;
//!
//! let pagination = PaginationConfig::default();
//! let request = ResourceRequest::new()
//!     .with_query("page", "3")
//!     .with_query("perPage", 10)
//!     .with_query("filter", serde_json::json!({"owner": "someone-else"}));
//!
//! let query = QueryBuilder::new(&pagination, "_id")
//!     .build(&request, Filter::eq("owner", "me"))
//!     .unwrap();
//!
//! assert_eq!(query.skip, 20);
//! assert_eq!(query.limit, 10);
//! assert_eq!(query.filter, Filter::eq("owner", "me"));
//! ```

use std::cmp::Ordering;
use std::fmt;

use paginator_rs::SortDirection;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::codec::ITEM_ID_FIELD;
use crate::config::PaginationConfig;
use crate::error::{Error, Result};
use crate::filter::{compare_values, Filter};
use crate::request::ResourceRequest;

/// Server-side search hook: computes a filter fragment from the request
pub type SearchFilterFn = dyn Fn(&ResourceRequest) -> Filter + Send + Sync;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending (A-Z, 0-9, oldest first)
    #[default]
    Asc,
    /// Descending (Z-A, 9-0, newest first)
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

impl From<SortOrder> for SortDirection {
    fn from(order: SortOrder) -> Self {
        match order {
            SortOrder::Asc => SortDirection::Asc,
            SortOrder::Desc => SortDirection::Desc,
        }
    }
}

impl From<SortDirection> for SortOrder {
    fn from(direction: SortDirection) -> Self {
        match direction {
            SortDirection::Asc => SortOrder::Asc,
            SortDirection::Desc => SortOrder::Desc,
        }
    }
}

impl SortOrder {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Store field to sort on
    pub field: String,
    /// Direction
    pub order: SortOrder,
}

/// Ordered list of sort keys; earlier keys take precedence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sort {
    keys: Vec<SortKey>,
}

impl Sort {
    /// Single ascending key
    pub fn ascending(field: impl Into<String>) -> Self {
        Self::default().then(field, SortOrder::Asc)
    }

    /// Single descending key
    pub fn descending(field: impl Into<String>) -> Self {
        Self::default().then(field, SortOrder::Desc)
    }

    /// Append a tie-breaking key
    #[must_use]
    pub fn then(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.keys.push(SortKey {
            field: field.into(),
            order,
        });
        self
    }

    /// Parse a comma-separated sort expression
    ///
    /// `-field` sorts descending, `+field` ascending, and a bare field uses
    /// `default_order`.
    pub fn parse(raw: &str, default_order: SortOrder) -> Result<Self> {
        let mut sort = Self::default();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (field, order) = if let Some(rest) = part.strip_prefix('-') {
                (rest.trim(), SortOrder::Desc)
            } else if let Some(rest) = part.strip_prefix('+') {
                (rest.trim(), SortOrder::Asc)
            } else {
                (part, default_order)
            };
            if field.is_empty() || field.starts_with('$') {
                return Err(Error::BadRequest(format!("invalid sort field '{part}'")));
            }
            sort = sort.then(field, order);
        }
        Ok(sort)
    }

    /// Set every key to `order`
    #[must_use]
    pub fn with_order(mut self, order: SortOrder) -> Self {
        for key in &mut self.keys {
            key.order = order;
        }
        self
    }

    /// Sort keys in precedence order
    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    /// True when no key is set
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Rename a key's field, used to map the caller-facing `id`
    #[must_use]
    pub fn rename_field(mut self, from: &str, to: &str) -> Self {
        for key in &mut self.keys {
            if key.field == from {
                key.field = to.to_string();
            }
        }
        self
    }

    /// Compare two documents; missing fields sort before present ones
    pub fn compare(&self, a: &Map<String, Value>, b: &Map<String, Value>) -> Ordering {
        for key in &self.keys {
            let ordering = match (a.get(&key.field), b.get(&key.field)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
            };
            let ordering = key.order.apply(ordering);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Query-string parameters of a list request
///
/// Numeric parameters accept either JSON numbers or numeric strings, since
/// query strings carry everything as text.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// Page number (1-indexed)
    #[serde(default, deserialize_with = "lenient_u32")]
    pub page: Option<u32>,

    /// Items per page
    #[serde(default, alias = "per_page", deserialize_with = "lenient_u32")]
    pub per_page: Option<u32>,

    /// Comma-separated sort fields
    #[serde(default)]
    pub sort: Option<String>,

    /// Direction for sort fields without a `+`/`-` prefix
    #[serde(default)]
    pub order: Option<SortOrder>,

    /// Caller-supplied filter
    #[serde(default)]
    pub filter: Option<Filter>,
}

impl ListQuery {
    /// Parse the list parameters out of a request's query map
    pub fn from_request(request: &ResourceRequest) -> Result<Self> {
        serde_json::from_value(Value::Object(request.query.clone()))
            .map_err(|e| Error::BadRequest(format!("invalid list parameters: {e}")))
    }

    /// Page number, defaulting to 1
    #[must_use]
    pub fn page_number(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }
}

fn lenient_u32<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => u32::try_from(n).map(Some).map_err(de::Error::custom),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => s.trim().parse().map(Some).map_err(de::Error::custom),
    }
}

/// Fully resolved list query
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveQuery {
    /// Merged filter
    pub filter: Filter,
    /// Documents to skip
    pub skip: u64,
    /// Page size
    pub limit: u64,
    /// Page size, as reported in pagination metadata
    pub per_page: u32,
    /// Sort order
    pub sort: Sort,
    /// Requested page (1-indexed)
    pub page: u32,
}

/// Builds [`EffectiveQuery`] values for one controller
pub struct QueryBuilder<'a> {
    pagination: &'a PaginationConfig,
    id_field: &'a str,
    default_sort: Option<&'a Sort>,
    search_filter: Option<&'a SearchFilterFn>,
}

impl<'a> QueryBuilder<'a> {
    /// Builder with no default sort and no search hook
    pub fn new(pagination: &'a PaginationConfig, id_field: &'a str) -> Self {
        Self {
            pagination,
            id_field,
            default_sort: None,
            search_filter: None,
        }
    }

    /// Sort used when the request supplies none
    #[must_use]
    pub fn default_sort(mut self, sort: Option<&'a Sort>) -> Self {
        self.default_sort = sort;
        self
    }

    /// Server-side search hook
    #[must_use]
    pub fn search_filter(mut self, hook: Option<&'a SearchFilterFn>) -> Self {
        self.search_filter = hook;
        self
    }

    /// Resolve pagination, sort and the merged filter for a request
    ///
    /// An `order` without `sort` redirects the fallback sort. Caller
    /// conditions replace search conditions on the same field and security
    /// conditions replace both, except on the identifier field, where the
    /// caller's condition is intersected with the rest.
    pub fn build(&self, request: &ResourceRequest, security: Filter) -> Result<EffectiveQuery> {
        let params = ListQuery::from_request(request)?;

        let page = params.page_number();
        let limit = self.pagination.per_page(params.per_page);
        let skip = u64::from(page - 1) * u64::from(limit);

        let requested = match params.sort.as_deref() {
            Some(raw) => Sort::parse(raw, params.order.unwrap_or_default())?,
            None => Sort::default(),
        };
        let sort = if requested.is_empty() {
            let fallback = self
                .default_sort
                .cloned()
                .unwrap_or_else(|| Sort::descending(self.id_field));
            match params.order {
                Some(order) => fallback.with_order(order),
                None => fallback,
            }
        } else {
            requested.rename_field(ITEM_ID_FIELD, self.id_field)
        };

        let search = self
            .search_filter
            .map(|hook| hook(request))
            .unwrap_or_default();
        let mut caller = params
            .filter
            .unwrap_or_default()
            .rename_field(ITEM_ID_FIELD, self.id_field);
        let caller_ids = caller.remove(self.id_field);

        let mut filter = search.merge(caller).merge(security);
        if let Some(ids) = caller_ids {
            filter = filter.constrain(self.id_field, ids);
        }
        tracing::debug!(
            page,
            limit,
            skip,
            constrained_fields = filter.len(),
            "Built list query"
        );

        Ok(EffectiveQuery {
            filter,
            skip,
            limit: u64::from(limit),
            per_page: limit,
            sort,
            page,
        })
    }
}
