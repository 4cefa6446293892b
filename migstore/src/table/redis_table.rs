use redis::aio::ConnectionManager;
use serde_json::Value;

use super::{
    BatchWriteOutput, BatchWriteRequest, ListOutput, TableService, TableWriteSummary, ensure_id,
    require_id,
};
use crate::{errors::StoreError, keys::KeyContext};

const SCAN_COUNT: usize = 1000;
const MGET_CHUNK: usize = 500;

/// Table backend storing each row as a JSON string under `{namespace}:{table}:{id}`.
///
/// The connection manager is multiplexed; every operation works on a clone of
/// it, so concurrent calls on one `RedisTable` do not serialize on a lock.
#[derive(Clone)]
pub struct RedisTable {
    conn: ConnectionManager,
    namespace: String,
}

impl RedisTable {
    pub fn new(conn: ConnectionManager, namespace: impl Into<String>) -> Self {
        Self {
            conn,
            namespace: namespace.into(),
        }
    }

    /// Opens a pooled connection to `url` and scopes all keys under `namespace`.
    pub async fn connect(url: &str, namespace: impl Into<String>) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn, namespace))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Clone of the connection manager for advanced operations.
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    fn keys<'a>(&'a self, table: &'a str) -> Result<KeyContext<'a>, StoreError> {
        KeyContext::try_new(&self.namespace, table)
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        // SCAN may return a key more than once across iterations.
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

impl TableService for RedisTable {
    async fn list(&self, table: &str) -> Result<ListOutput, StoreError> {
        let keys = self.scan_keys(&self.keys(table)?.table_pattern()).await?;
        let mut conn = self.conn.clone();
        let mut items = Vec::with_capacity(keys.len());

        for chunk in keys.chunks(MGET_CHUNK) {
            let rows: Vec<Option<String>> =
                redis::cmd("MGET").arg(chunk).query_async(&mut conn).await?;
            // A row deleted between SCAN and MGET comes back as nil.
            for raw in rows.into_iter().flatten() {
                items.push(serde_json::from_str(&raw)?);
            }
        }

        Ok(ListOutput { items })
    }

    async fn create(&self, table: &str, mut item: Value) -> Result<Value, StoreError> {
        let id = ensure_id(&mut item)?;
        let key = self.keys(table)?.row(&id);
        let payload = serde_json::to_string(&item)?;

        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(payload)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        if reply.is_none() {
            return Err(StoreError::InvalidRequest {
                message: format!("row `{id}` already exists in table `{table}`"),
            });
        }
        Ok(item)
    }

    async fn update(&self, table: &str, item: Value) -> Result<Value, StoreError> {
        let id = require_id(&item)?;
        let key = self.keys(table)?.row(&id);
        let payload = serde_json::to_string(&item)?;

        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(payload)
            .arg("XX")
            .query_async(&mut conn)
            .await?;
        if reply.is_none() {
            return Err(StoreError::NotFound { id });
        }
        Ok(item)
    }

    async fn batch_write(
        &self,
        request: BatchWriteRequest,
    ) -> Result<BatchWriteOutput, StoreError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        let mut tables = Vec::with_capacity(request.request_items.len());

        for writes in request.request_items {
            let mut ids = Vec::with_capacity(writes.puts.len());
            for mut item in writes.puts {
                let id = ensure_id(&mut item)?;
                let key = self.keys(&writes.table)?.row(&id);
                pipe.cmd("SET").arg(key).arg(serde_json::to_string(&item)?).ignore();
                ids.push(id);
            }
            tables.push(TableWriteSummary {
                table: writes.table,
                ids,
            });
        }

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(BatchWriteOutput { tables })
    }
}
