//! Key-value table contract consumed by the migration store.
//!
//! This module provides:
//! - `TableService` - list/create/update/batch-write primitives over JSON rows
//! - `RedisTable` - production backend on a pooled Redis connection
//! - `MemoryTable` - in-process backend for tests and local tooling

mod memory;
mod redis_table;

pub use memory::{CallCounts, MemoryTable};
pub use redis_table::RedisTable;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{errors::StoreError, id::generate_record_id};

/// Name of the identifier field every row carries.
pub const ID_FIELD: &str = "id";

/// Result of a full-table list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListOutput {
    pub items: Vec<Value>,
}

/// Put requests for one table inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableWrites {
    pub table: String,
    pub puts: Vec<Value>,
}

/// Grouped put requests spanning one or more tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchWriteRequest {
    pub request_items: Vec<TableWrites>,
}

impl BatchWriteRequest {
    pub fn item_count(&self) -> usize {
        self.request_items.iter().map(|writes| writes.puts.len()).sum()
    }
}

/// Rows written for one table by a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableWriteSummary {
    pub table: String,
    pub ids: Vec<String>,
}

/// Raw result of a batch write, as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchWriteOutput {
    pub tables: Vec<TableWriteSummary>,
}

/// Primitives offered by a key-value table service.
///
/// Every method takes `&self` so a caller can keep several writes in flight
/// against the same handle.
#[allow(async_fn_in_trait)]
pub trait TableService {
    /// Returns every row of `table` in a single unfiltered scan.
    async fn list(&self, table: &str) -> Result<ListOutput, StoreError>;

    /// Inserts `item`, assigning an `id` when it has none, and returns the stored row.
    async fn create(&self, table: &str, item: Value) -> Result<Value, StoreError>;

    /// Replaces the row whose `id` matches `item` and returns the stored row.
    async fn update(&self, table: &str, item: Value) -> Result<Value, StoreError>;

    /// Applies grouped puts for several tables in one request.
    async fn batch_write(&self, request: BatchWriteRequest) -> Result<BatchWriteOutput, StoreError>;
}

/// Makes sure `item` is an object with a string `id`, generating one if absent.
pub(crate) fn ensure_id(item: &mut Value) -> Result<String, StoreError> {
    let object = item
        .as_object_mut()
        .ok_or_else(|| StoreError::invalid_record("table items must be JSON objects"))?;
    match object.get(ID_FIELD) {
        None | Some(Value::Null) => {
            let id = generate_record_id();
            object.insert(ID_FIELD.to_string(), Value::String(id.clone()));
            Ok(id)
        }
        Some(Value::String(id)) => Ok(id.clone()),
        Some(other) => {
            Err(StoreError::invalid_record(format!("`id` must be a string, got {other}")))
        }
    }
}

/// Extracts the `id` an update must carry.
pub(crate) fn require_id(item: &Value) -> Result<String, StoreError> {
    match item.get(ID_FIELD) {
        Some(Value::String(id)) => Ok(id.clone()),
        _ => Err(StoreError::invalid_record("update requires a string `id`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ensure_id_keeps_existing_identifier() {
        let mut item = json!({"id": "abc", "title": "1_a"});
        assert_eq!(ensure_id(&mut item).unwrap(), "abc");
    }

    #[test]
    fn ensure_id_fills_missing_or_null_identifier() {
        let mut item = json!({"title": "1_a"});
        let id = ensure_id(&mut item).unwrap();
        assert_eq!(item["id"], id.as_str());

        let mut item = json!({"id": null});
        let id = ensure_id(&mut item).unwrap();
        assert!(!id.is_empty());
    }

    #[test]
    fn ensure_id_rejects_non_objects_and_numeric_ids() {
        assert!(ensure_id(&mut json!([1, 2])).is_err());
        assert!(ensure_id(&mut json!({"id": 7})).is_err());
    }

    #[test]
    fn require_id_demands_a_string() {
        assert_eq!(require_id(&json!({"id": "x"})).unwrap(), "x");
        assert!(matches!(
            require_id(&json!({"title": "1_a"})),
            Err(StoreError::InvalidRecord { .. })
        ));
    }
}
