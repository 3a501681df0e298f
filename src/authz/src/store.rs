//! Data-store query boundary
//!
//! The engine reads roles, custom role definitions and space memberships
//! through [`QueryExecutor`], an elevated-privilege filtered read against a
//! named collection. Errors returned by an executor are passed through to the
//! caller untouched.

use crate::error::{AuthzError, Result};
use crate::types::Record;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PostgresQueryExecutor;

/// A single field constraint
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Field equals the value; on array fields, the array contains it
    Equals(Value),
    /// Field is one of the values; on array fields, the arrays intersect
    In(Vec<Value>),
    /// Field is none of the values; on array fields, no element matches
    NotIn(Vec<Value>),
}

impl Predicate {
    /// Evaluate against a field value (`None` when the field is absent)
    pub fn matches(&self, field: Option<&Value>) -> bool {
        match self {
            Predicate::Equals(expected) => match field {
                Some(Value::Array(items)) => items.iter().any(|item| values_equal(item, expected)),
                Some(value) => values_equal(value, expected),
                None => false,
            },
            Predicate::In(candidates) => match field {
                Some(Value::Array(items)) => items
                    .iter()
                    .any(|item| candidates.iter().any(|c| values_equal(item, c))),
                Some(value) => candidates.iter().any(|c| values_equal(value, c)),
                None => false,
            },
            Predicate::NotIn(excluded) => {
                !Predicate::In(excluded.clone()).matches(field)
            }
        }
    }
}

/// Pointers compare by class and id only, ignoring any extra keys
fn values_equal(a: &Value, b: &Value) -> bool {
    match (pointer_key(a), pointer_key(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn pointer_key(value: &Value) -> Option<(&str, &str)> {
    let obj = value.as_object()?;
    if obj.get("__type")?.as_str()? != "Pointer" {
        return None;
    }
    Some((obj.get("className")?.as_str()?, obj.get("objectId")?.as_str()?))
}

/// Filtered read against one collection
///
/// Constraints on the same query are ANDed.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub class_name: String,
    pub constraints: Vec<(String, Predicate)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            constraints: Vec::new(),
            limit: None,
        }
    }

    pub fn equal_to(mut self, field: impl Into<String>, value: Value) -> Self {
        self.constraints.push((field.into(), Predicate::Equals(value)));
        self
    }

    pub fn contained_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.constraints.push((field.into(), Predicate::In(values)));
        self
    }

    pub fn not_contained_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.constraints.push((field.into(), Predicate::NotIn(values)));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True when the record satisfies every constraint
    pub fn matches(&self, record: &Record) -> bool {
        self.constraints
            .iter()
            .all(|(field, predicate)| predicate.matches(record.get(field)))
    }
}

/// Elevated-privilege query execution
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run `query` and return the matching records
    async fn execute(&self, query: &Query) -> Result<Vec<Record>>;
}

/// In-memory query executor
///
/// Holds records per class and counts executed queries, which makes it the
/// executor of choice for tests and local tooling.
pub struct InMemoryQueryExecutor {
    collections: Arc<RwLock<HashMap<String, Vec<Record>>>>,
    queries: AtomicUsize,
    fail_next: AtomicBool,
}

impl InMemoryQueryExecutor {
    /// Create an empty executor
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            queries: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Store a record; non-object values are ignored
    pub async fn insert(&self, class_name: &str, record: Value) {
        if let Value::Object(record) = record {
            let mut collections = self.collections.write().await;
            collections
                .entry(class_name.to_string())
                .or_default()
                .push(record);
        }
    }

    /// Remove every record of a class
    pub async fn clear_class(&self, class_name: &str) {
        self.collections.write().await.remove(class_name);
    }

    /// Number of queries executed so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn reset_query_count(&self) {
        self.queries.store(0, Ordering::SeqCst);
    }

    /// Make the next query fail with a database error
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl Default for InMemoryQueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryExecutor for InMemoryQueryExecutor {
    async fn execute(&self, query: &Query) -> Result<Vec<Record>> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AuthzError::Database(format!(
                "Simulated failure querying {}",
                query.class_name
            )));
        }

        let collections = self.collections.read().await;
        let records = collections
            .get(&query.class_name)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| query.matches(record))
                    .take(query.limit.unwrap_or(usize::MAX))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(records)
    }
}
