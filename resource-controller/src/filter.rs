//! Query filter fragments
//!
//! A [`Filter`] maps field names to [`Condition`]s. Several pipeline stages
//! contribute a fragment (the security policy, the controller's search hook,
//! the caller's `filter` parameter) and the fragments are merged before the
//! store sees them.
//!
//! Filters use the JSON shape callers already send:
//!
//! ```rust
//! use resource_controller::filter::{Condition, Filter};
//! use serde_json::json;
//!
//! let filter = Filter::try_from(json!({
//!     "name": "Item 3",
//!     "rank": { "$gte": 2, "$lt": 10 },
//!     "tags": { "$in": ["one", "two"] }
//! }))
//! .unwrap();
//!
//! assert_eq!(filter.len(), 3);
//! assert_eq!(filter.get("name"), Some(&Condition::Eq(json!("Item 3"))));
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while parsing a filter from JSON
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// Filter root was not an object
    #[error("filter must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// Top-level field names may not be operators
    #[error("field names may not start with '$': {0}")]
    ReservedField(String),

    /// Operator is not recognised
    #[error("unknown filter operator '{operator}' on field '{field}'")]
    UnknownOperator {
        /// Field the operator was applied to
        field: String,
        /// Offending operator
        operator: String,
    },

    /// Operator received the wrong kind of operand
    #[error("operator '{operator}' on field '{field}' expects {expected}")]
    InvalidOperand {
        /// Field the operator was applied to
        field: String,
        /// Offending operator
        operator: String,
        /// Expected operand kind
        expected: &'static str,
    },

    /// Object mixes `$operators` with plain keys
    #[error("field '{0}' mixes operators and plain values")]
    MixedOperators(String),
}

/// Bounds for a range condition; unset bounds are open
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Range {
    /// Exclusive lower bound
    pub gt: Option<Value>,
    /// Inclusive lower bound
    pub gte: Option<Value>,
    /// Exclusive upper bound
    pub lt: Option<Value>,
    /// Inclusive upper bound
    pub lte: Option<Value>,
}

impl Range {
    /// True when no bound is set
    pub fn is_unbounded(&self) -> bool {
        self.gt.is_none() && self.gte.is_none() && self.lt.is_none() && self.lte.is_none()
    }

    /// Whether `value` lies within every set bound
    ///
    /// Values that cannot be ordered against a bound (a string against a
    /// number, say) fall outside the range.
    pub fn contains(&self, value: &Value) -> bool {
        let within = |bound: &Option<Value>, accept: fn(Ordering) -> bool| {
            bound
                .as_ref()
                .map_or(true, |b| compare_values(value, b).is_some_and(accept))
        };

        within(&self.gt, Ordering::is_gt)
            && within(&self.gte, Ordering::is_ge)
            && within(&self.lt, Ordering::is_lt)
            && within(&self.lte, Ordering::is_le)
    }
}

/// Constraint on a single field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Field equals the value (or, for array fields, contains it)
    Eq(Value),
    /// Negation of [`Condition::Eq`]
    Ne(Value),
    /// Field equals any of the values
    In(Vec<Value>),
    /// Field equals none of the values
    NotIn(Vec<Value>),
    /// Field lies within the bounds
    Range(Range),
    /// Every nested condition holds
    All(Vec<Condition>),
}

impl Condition {
    /// Evaluate the condition against a field value (`None` when absent)
    pub fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Self::Eq(expected) => field_equals(value, expected),
            Self::Ne(expected) => !field_equals(value, expected),
            Self::In(candidates) => candidates.iter().any(|c| field_equals(value, c)),
            Self::NotIn(candidates) => !candidates.iter().any(|c| field_equals(value, c)),
            Self::Range(range) => value.is_some_and(|v| range.contains(v)),
            Self::All(conditions) => conditions.iter().all(|c| c.matches(value)),
        }
    }

    /// Conjunction of two conditions, flattening nested conjunctions
    pub fn and(self, other: Condition) -> Condition {
        let mut conditions = match self {
            Self::All(existing) => existing,
            single => vec![single],
        };
        match other {
            Self::All(more) => conditions.extend(more),
            single => conditions.push(single),
        }
        Self::All(conditions)
    }

    fn parse(field: &str, raw: Value) -> Result<Self, FilterError> {
        let Value::Object(map) = raw else {
            return Ok(Self::Eq(raw));
        };

        let operators = map.keys().filter(|k| k.starts_with('$')).count();
        if operators == 0 {
            return Ok(Self::Eq(Value::Object(map)));
        }
        if operators != map.len() {
            return Err(FilterError::MixedOperators(field.to_string()));
        }

        let mut conditions = Vec::new();
        let mut range = Range::default();

        for (operator, operand) in map {
            match operator.as_str() {
                "$eq" => conditions.push(Self::Eq(operand)),
                "$ne" => conditions.push(Self::Ne(operand)),
                "$in" => conditions.push(Self::In(expect_array(field, &operator, operand)?)),
                "$nin" => conditions.push(Self::NotIn(expect_array(field, &operator, operand)?)),
                "$gt" => range.gt = Some(operand),
                "$gte" => range.gte = Some(operand),
                "$lt" => range.lt = Some(operand),
                "$lte" => range.lte = Some(operand),
                "$and" => {
                    for nested in expect_array(field, &operator, operand)? {
                        conditions.push(Self::parse(field, nested)?);
                    }
                }
                _ => {
                    return Err(FilterError::UnknownOperator {
                        field: field.to_string(),
                        operator,
                    })
                }
            }
        }

        if !range.is_unbounded() {
            conditions.push(Self::Range(range));
        }

        Ok(match conditions.len() {
            1 => conditions.remove(0),
            _ => Self::All(conditions),
        })
    }

    fn to_json(&self) -> Value {
        let operator = |name: &str, operand: Value| {
            let mut map = Map::new();
            map.insert(name.to_string(), operand);
            Value::Object(map)
        };

        match self {
            // Object operands are wrapped so they cannot be mistaken for operators
            Self::Eq(value @ Value::Object(_)) => operator("$eq", value.clone()),
            Self::Eq(value) => value.clone(),
            Self::Ne(value) => operator("$ne", value.clone()),
            Self::In(values) => operator("$in", Value::Array(values.clone())),
            Self::NotIn(values) => operator("$nin", Value::Array(values.clone())),
            Self::Range(range) => {
                let mut map = Map::new();
                for (name, bound) in [
                    ("$gt", &range.gt),
                    ("$gte", &range.gte),
                    ("$lt", &range.lt),
                    ("$lte", &range.lte),
                ] {
                    if let Some(bound) = bound {
                        map.insert(name.to_string(), bound.clone());
                    }
                }
                Value::Object(map)
            }
            Self::All(conditions) => operator(
                "$and",
                Value::Array(conditions.iter().map(Condition::to_json).collect()),
            ),
        }
    }
}

/// A set of per-field conditions, all of which must hold
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Filter {
    conditions: BTreeMap<String, Condition>,
}

impl Filter {
    /// Empty filter; matches every document
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-field equality filter
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().with(field, Condition::Eq(value.into()))
    }

    /// Set the condition for a field, replacing any existing one
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.insert(field, condition);
        self
    }

    /// Set the condition for a field, returning the one it replaced
    pub fn insert(&mut self, field: impl Into<String>, condition: Condition) -> Option<Condition> {
        self.conditions.insert(field.into(), condition)
    }

    /// Add a condition that must hold in addition to any existing one
    ///
    /// Unlike [`Filter::with`], this can only narrow the filter.
    #[must_use]
    pub fn constrain(mut self, field: impl Into<String>, condition: Condition) -> Self {
        let field = field.into();
        let combined = match self.conditions.remove(&field) {
            Some(existing) => existing.and(condition),
            None => condition,
        };
        self.conditions.insert(field, combined);
        self
    }

    /// Shallow union by field; `other` wins on conflicting keys
    #[must_use]
    pub fn merge(mut self, other: Filter) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    /// Move the condition on `from` to `to`, intersecting with anything already there
    #[must_use]
    pub fn rename_field(mut self, from: &str, to: &str) -> Self {
        if from == to {
            return self;
        }
        match self.conditions.remove(from) {
            Some(condition) => self.constrain(to, condition),
            None => self,
        }
    }

    /// Take the condition on a field out of the filter
    pub fn remove(&mut self, field: &str) -> Option<Condition> {
        self.conditions.remove(field)
    }

    /// Condition on a field
    pub fn get(&self, field: &str) -> Option<&Condition> {
        self.conditions.get(field)
    }

    /// Whether the field is constrained
    pub fn contains_field(&self, field: &str) -> bool {
        self.conditions.contains_key(field)
    }

    /// Iterate over constrained fields and their conditions
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.conditions.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of constrained fields
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// True when the filter matches everything
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate the filter against a document
    pub fn matches(&self, document: &Map<String, Value>) -> bool {
        self.conditions
            .iter()
            .all(|(field, condition)| condition.matches(document.get(field)))
    }
}

impl TryFrom<Value> for Filter {
    type Error = FilterError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let map = match value {
            Value::Object(map) => map,
            Value::Null => return Ok(Self::new()),
            other => return Err(FilterError::NotAnObject(json_kind(&other))),
        };

        let mut filter = Self::new();
        for (field, raw) in map {
            if field.starts_with('$') {
                return Err(FilterError::ReservedField(field));
            }
            let condition = Condition::parse(&field, raw)?;
            filter.conditions.insert(field, condition);
        }
        Ok(filter)
    }
}

impl From<Filter> for Value {
    fn from(filter: Filter) -> Self {
        Value::Object(
            filter
                .conditions
                .iter()
                .map(|(field, condition)| (field.clone(), condition.to_json()))
                .collect(),
        )
    }
}

/// Order two JSON scalars of the same kind
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Short name of a JSON value's kind, for error messages
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn field_equals(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
        Some(actual) => actual == expected,
    }
}

fn expect_array(field: &str, operator: &str, operand: Value) -> Result<Vec<Value>, FilterError> {
    match operand {
        Value::Array(items) => Ok(items),
        _ => Err(FilterError::InvalidOperand {
            field: field.to_string(),
            operator: operator.to_string(),
            expected: "an array",
        }),
    }
}
