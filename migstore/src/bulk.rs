//! Chunked bulk seeding of table rows.
//!
//! Independent of `load`/`save`: callers hand over arbitrary `(table, data)`
//! pairs which are grouped into batch put requests of at most
//! [`DEFAULT_CHUNK_SIZE`] items and written one chunk at a time.

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    errors::StoreError,
    table::{BatchWriteOutput, BatchWriteRequest, TableService, TableWrites},
};

/// Items per batch request, matching the usual table-service batch limit.
pub const DEFAULT_CHUNK_SIZE: usize = 25;

/// One row destined for `table`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkRecord {
    pub table: String,
    pub data: Value,
}

impl BulkRecord {
    pub fn new(table: impl Into<String>, data: Value) -> Self {
        Self {
            table: table.into(),
            data,
        }
    }
}

/// Groups a chunk into per-table put lists. Tables keep first-seen order.
pub fn group_chunk(chunk: &[BulkRecord]) -> BatchWriteRequest {
    let mut request_items: Vec<TableWrites> = Vec::new();
    for record in chunk {
        match request_items.iter_mut().find(|writes| writes.table == record.table) {
            Some(writes) => writes.puts.push(record.data.clone()),
            None => request_items.push(TableWrites {
                table: record.table.clone(),
                puts: vec![record.data.clone()],
            }),
        }
    }
    BatchWriteRequest { request_items }
}

/// Writes `records` in chunks of `chunk_size`, waiting for each chunk before
/// issuing the next. Each chunk's raw result is logged and returned.
///
/// A failed chunk stops the run; earlier chunks stay written.
pub async fn batch_write<T>(
    table: &T,
    records: &[BulkRecord],
    chunk_size: usize,
) -> Result<Vec<BatchWriteOutput>, StoreError>
where
    T: TableService,
{
    if chunk_size == 0 {
        return Err(StoreError::InvalidRequest {
            message: "chunk size must be at least 1".to_string(),
        });
    }

    let mut outputs = Vec::with_capacity(records.len().div_ceil(chunk_size));
    for chunk in records.chunks(chunk_size) {
        let output = table.batch_write(group_chunk(chunk)).await?;
        info!("{}", serde_json::to_string_pretty(&output)?);
        outputs.push(output);
    }
    Ok(outputs)
}
