//! Log reader.
//!
//! Range queries against the tenant's currently active shard, newest
//! first. Queries do not span day boundaries; callers wanting history
//! across days issue one query per day shard.

use std::sync::Arc;

use chrono::Utc;

use crate::error::Result;
use crate::model::LogRecord;
use crate::shard::shard_key;
use crate::store::{LogStore, RangeQuery};

pub struct LogReader {
    store: Arc<dyn LogStore>,
    tenant: String,
}

impl LogReader {
    pub fn new(store: Arc<dyn LogStore>, tenant: &str) -> Self {
        Self {
            store,
            tenant: tenant.to_string(),
        }
    }

    /// Returns records in the query's inclusive time range, optionally
    /// filtered by level, newest first, capped by the query limit. An
    /// empty result is not an error; a missing shard is `NotFound`.
    pub async fn query(&self, query: &RangeQuery) -> Result<Vec<LogRecord>> {
        let shard = shard_key(&self.tenant, Utc::now());
        let docs = self
            .store
            .find_range(&shard.database(), &shard.collection(), query)
            .await?;
        docs.into_iter()
            .map(|mut doc| {
                doc.remove("_id");
                LogRecord::from_document(doc)
            })
            .collect()
    }
}
