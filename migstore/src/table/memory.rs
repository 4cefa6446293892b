use std::{
    borrow::Cow,
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use serde_json::Value;

use super::{
    BatchWriteOutput, BatchWriteRequest, ID_FIELD, ListOutput, TableService, TableWriteSummary,
    ensure_id, require_id,
};
use crate::errors::StoreError;

/// Number of calls made against a [`MemoryTable`], per primitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list: usize,
    pub create: usize,
    pub update: usize,
    pub batch_write: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Rows per table, in insertion order.
    tables: BTreeMap<String, Vec<Value>>,
    calls: CallCounts,
    batches: Vec<BatchWriteRequest>,
    fail_lists: Option<String>,
    /// Title -> message; creates and updates for that title fail.
    failing_titles: BTreeMap<String, String>,
}

/// In-process table backend with call accounting and failure injection.
#[derive(Debug, Default)]
pub struct MemoryTable {
    state: Mutex<MemoryState>,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts rows directly, bypassing call accounting. Rows without an `id` get one.
    pub fn seed<I>(&self, table: &str, items: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut state = self.state()?;
        let rows = state.tables.entry(table.to_string()).or_default();
        for mut item in items {
            ensure_id(&mut item)?;
            rows.push(item);
        }
        Ok(())
    }

    /// Snapshot of the rows currently stored in `table`.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.state()
            .map(|state| state.tables.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> CallCounts {
        self.state().map(|state| state.calls).unwrap_or_default()
    }

    /// Every batch request received so far, in call order.
    pub fn batch_requests(&self) -> Vec<BatchWriteRequest> {
        self.state().map(|state| state.batches.clone()).unwrap_or_default()
    }

    /// Makes every subsequent `list` call fail with `message`.
    pub fn fail_lists(&self, message: impl Into<String>) {
        if let Ok(mut state) = self.state() {
            state.fail_lists = Some(message.into());
        }
    }

    /// Makes creates and updates of rows titled `title` fail with `message`.
    pub fn fail_writes_for(&self, title: impl Into<String>, message: impl Into<String>) {
        if let Ok(mut state) = self.state() {
            state.failing_titles.insert(title.into(), message.into());
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Backend {
            message: Cow::Borrowed("memory table lock poisoned"),
        })
    }
}

impl MemoryState {
    fn check_write(&self, item: &Value) -> Result<(), StoreError> {
        let title = item.get("title").and_then(Value::as_str);
        match title.and_then(|title| self.failing_titles.get(title)) {
            Some(message) => Err(StoreError::Backend {
                message: Cow::Owned(message.clone()),
            }),
            None => Ok(()),
        }
    }
}

fn row_id(row: &Value) -> Option<&str> {
    row.get(ID_FIELD).and_then(Value::as_str)
}

impl TableService for MemoryTable {
    async fn list(&self, table: &str) -> Result<ListOutput, StoreError> {
        let mut state = self.state()?;
        state.calls.list += 1;
        if let Some(message) = &state.fail_lists {
            return Err(StoreError::Backend {
                message: Cow::Owned(message.clone()),
            });
        }
        let items = state.tables.get(table).cloned().unwrap_or_default();
        Ok(ListOutput { items })
    }

    async fn create(&self, table: &str, mut item: Value) -> Result<Value, StoreError> {
        let mut state = self.state()?;
        state.calls.create += 1;
        state.check_write(&item)?;

        let id = ensure_id(&mut item)?;
        let rows = state.tables.entry(table.to_string()).or_default();
        if rows.iter().any(|row| row_id(row) == Some(id.as_str())) {
            return Err(StoreError::InvalidRequest {
                message: format!("row `{id}` already exists in table `{table}`"),
            });
        }
        rows.push(item.clone());
        Ok(item)
    }

    async fn update(&self, table: &str, item: Value) -> Result<Value, StoreError> {
        let mut state = self.state()?;
        state.calls.update += 1;
        state.check_write(&item)?;

        let id = require_id(&item)?;
        let slot = state
            .tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|row| row_id(row) == Some(id.as_str())))
            .ok_or_else(|| StoreError::NotFound { id: id.clone() })?;
        *slot = item.clone();
        Ok(item)
    }

    async fn batch_write(
        &self,
        request: BatchWriteRequest,
    ) -> Result<BatchWriteOutput, StoreError> {
        let mut state = self.state()?;
        state.calls.batch_write += 1;
        state.batches.push(request.clone());

        let mut tables = Vec::with_capacity(request.request_items.len());
        for writes in request.request_items {
            let rows = state.tables.entry(writes.table.clone()).or_default();
            let mut ids = Vec::with_capacity(writes.puts.len());
            for mut item in writes.puts {
                let id = ensure_id(&mut item)?;
                // Puts overwrite an existing row with the same id.
                match rows.iter_mut().find(|row| row_id(row) == Some(id.as_str())) {
                    Some(slot) => *slot = item,
                    None => rows.push(item),
                }
                ids.push(id);
            }
            tables.push(TableWriteSummary {
                table: writes.table,
                ids,
            });
        }
        Ok(BatchWriteOutput { tables })
    }
}
