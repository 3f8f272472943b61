//! Log writer.
//!
//! Appends records to the tenant's currently active shard. The writer
//! never creates shards; a missing shard is a provisioning gap and
//! surfaces as `NotFound`.

use std::sync::Arc;

use bson::oid::ObjectId;
use chrono::Utc;
use tracing::debug;

use crate::error::Result;
use crate::model::LogRecord;
use crate::shard::shard_key;
use crate::store::LogStore;

pub struct LogWriter {
    store: Arc<dyn LogStore>,
    tenant: String,
}

impl LogWriter {
    pub fn new(store: Arc<dyn LogStore>, tenant: &str) -> Self {
        Self {
            store,
            tenant: tenant.to_string(),
        }
    }

    /// Appends one record to the active shard.
    pub async fn write(&self, record: &LogRecord) -> Result<ObjectId> {
        let shard = shard_key(&self.tenant, Utc::now());
        let id = self
            .store
            .insert_one(&shard.database(), &shard.collection(), record.to_document()?)
            .await?;
        debug!(%shard, %id, "record written");
        Ok(id)
    }

    /// Appends a batch to the active shard. All-or-nothing from the
    /// caller's perspective; the store's bulk semantics are inherited.
    pub async fn write_bulk(&self, records: &[LogRecord]) -> Result<Vec<ObjectId>> {
        let shard = shard_key(&self.tenant, Utc::now());
        let docs = records
            .iter()
            .map(LogRecord::to_document)
            .collect::<Result<Vec<_>>>()?;
        let ids = self
            .store
            .insert_many(&shard.database(), &shard.collection(), docs)
            .await?;
        debug!(%shard, count = ids.len(), "bulk records written");
        Ok(ids)
    }
}
