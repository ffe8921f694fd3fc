//! Type-safe identifiers built on TypeID
//!
//! Two identifier kinds are used by this crate:
//!
//! - [`DocumentId`] (`doc_…`): identifiers assigned by [`MemoryStore`](crate::store::MemoryStore)
//!   to inserted documents. Its parser doubles as the store's "is this a
//!   syntactically valid identifier" check.
//! - [`RequestId`] (`req_…`): per-request correlation ids attached by the
//!   HTTP server's request-id layer.
//!
//! Both use UUIDv7 suffixes, so ids of one kind sort by creation time.
//!
//! ```rust
//! use resource_controller::ids::DocumentId;
//! use std::str::FromStr;
//!
//! let id = DocumentId::new();
//! assert!(id.as_str().starts_with("doc_"));
//! assert!(DocumentId::from_str(id.as_str()).is_ok());
//! assert!(DocumentId::from_str("req_01h455vb4pex5vsknk084sn02q").is_err());
//! ```

use http::Request;
use mti::prelude::*;
use std::fmt;
use std::str::FromStr;
use tower_http::request_id::{MakeRequestId, RequestId as TowerRequestId};

/// Error parsing a typed identifier
#[derive(Debug, thiserror::Error)]
pub enum IdError {
    /// The text is not a TypeID at all
    #[error("failed to parse identifier: {0}")]
    Parse(#[from] MagicTypeIdError),

    /// The TypeID carries another kind's prefix
    #[error("invalid prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix {
        /// The expected prefix
        expected: String,
        /// The actual prefix found
        actual: String,
    },
}

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(MagicTypeId);

        impl $name {
            /// Prefix carried by every identifier of this kind
            pub const PREFIX: &'static str = $prefix;

            /// Creates a new time-sortable identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Self::PREFIX.create_type_id::<V7>())
            }

            /// Returns the identifier as a string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            /// Returns the prefix portion of the identifier
            #[must_use]
            pub fn prefix(&self) -> &str {
                self.0.prefix().as_str()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let parsed = MagicTypeId::from_str(s)?;
                if parsed.prefix().as_str() != Self::PREFIX {
                    return Err(IdError::InvalidPrefix {
                        expected: Self::PREFIX.to_string(),
                        actual: parsed.prefix().as_str().to_string(),
                    });
                }
                Ok(Self(parsed))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }
    };
}

typed_id!(
    /// Identifier of a stored document, e.g. `doc_01h455vb4pex5vsknk084sn02q`
    DocumentId,
    "doc"
);

typed_id!(
    /// Correlation identifier for an HTTP request, e.g. `req_01h455vb4pex5vsknk084sn02q`
    RequestId,
    "req"
);

impl DocumentId {
    /// Whether `raw` parses as a document identifier
    pub fn is_valid(raw: &str) -> bool {
        Self::from_str(raw).is_ok()
    }
}

/// Generates [`RequestId`]s for `tower_http::request_id::SetRequestIdLayer`
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeTypedRequestId;

impl MakeRequestId for MakeTypedRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<TowerRequestId> {
        let id = RequestId::new();
        let header_value = http::HeaderValue::from_str(id.as_str()).ok()?;
        Some(TowerRequestId::new(header_value))
    }
}
