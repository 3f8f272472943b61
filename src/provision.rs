//! Shard provisioner.
//!
//! `ensure_shard` is the idempotence contract the daily rotation depends
//! on: it runs from cron, from manual retries, and pre-emptively for
//! tomorrow, possibly concurrently from several scheduler instances, and
//! all of those must converge without coordination.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::shard::{ShardId, ShardSchema};
use crate::store::LogStore;

/// What `ensure_shard` found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    AlreadyExists,
}

pub struct Provisioner {
    store: Arc<dyn LogStore>,
    schema: ShardSchema,
}

impl Provisioner {
    pub fn new(store: Arc<dyn LogStore>, schema: ShardSchema) -> Self {
        Self { store, schema }
    }

    /// Ensures the shard for `(tenant, date)` exists with the configured
    /// schema and its secondary index. Safe to call any number of times;
    /// fails only on genuine non-conflict failures.
    pub async fn ensure_shard(&self, tenant: &str, date: NaiveDate) -> Result<Outcome> {
        let shard = ShardId::new(tenant, date);
        let db = shard.database();
        let coll = shard.collection();

        let outcome = match self.store.create_timeseries(&db, &coll, &self.schema).await {
            Ok(()) => Outcome::Created,
            Err(Error::Conflict(_)) => {
                // The namespace exists; confirm it is actually a shard
                // before calling it a success. TTL drift is tolerated.
                let info = self.store.collection_info(&db, &coll).await?.ok_or_else(|| {
                    Error::Store(format!("{shard} reported existing but is not listed"))
                })?;
                match info.timeseries {
                    Some(ref ts) if self.schema.matches(ts) => Outcome::AlreadyExists,
                    Some(ts) => {
                        return Err(Error::SchemaConflict {
                            namespace: shard.to_string(),
                            reason: format!(
                                "existing time-series options {:?} do not match the shard schema",
                                ts
                            ),
                        })
                    }
                    None => {
                        return Err(Error::SchemaConflict {
                            namespace: shard.to_string(),
                            reason: "existing collection is not a time-series collection".into(),
                        })
                    }
                }
            }
            Err(e) => return Err(e),
        };

        self.store
            .create_index(&db, &coll, ShardSchema::index_keys())
            .await?;

        match outcome {
            Outcome::Created => info!(%shard, "shard created"),
            Outcome::AlreadyExists => info!(%shard, "shard already exists"),
        }
        Ok(outcome)
    }

    /// Provisions every `(tenant, date)` combination. A failure aborts the
    /// remaining dates for that tenant but never blocks other tenants; all
    /// failures are collected into the report.
    pub async fn run(&self, tenants: &[String], dates: &[NaiveDate]) -> RunReport {
        let mut report = RunReport::default();
        for tenant in tenants {
            for &date in dates {
                match self.ensure_shard(tenant, date).await {
                    Ok(Outcome::Created) => report.created.push(ShardId::new(tenant, date)),
                    Ok(Outcome::AlreadyExists) => {
                        report.already_existed.push(ShardId::new(tenant, date))
                    }
                    Err(error) => {
                        warn!(%tenant, %date, %error, "tenant provisioning failed");
                        report.failures.push(TenantFailure {
                            tenant: tenant.clone(),
                            error,
                        });
                        break;
                    }
                }
            }
        }
        report
    }
}

/// One tenant's recorded failure in a provisioning run.
#[derive(Debug)]
pub struct TenantFailure {
    pub tenant: String,
    pub error: Error,
}

/// Aggregate outcome of a provisioning run across tenants.
#[derive(Debug, Default)]
pub struct RunReport {
    pub created: Vec<ShardId>,
    pub already_existed: Vec<ShardId>,
    pub failures: Vec<TenantFailure>,
}

impl RunReport {
    /// True only when every tenant succeeded.
    pub fn is_healthy(&self) -> bool {
        self.failures.is_empty()
    }
}
