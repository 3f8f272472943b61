//! Shard identity and schema.
//!
//! A shard is one tenant's time-series collection for one UTC calendar
//! day. The key function here is the single source of truth for which
//! shard an instant belongs to; the writer, reader, and provisioner all
//! go through it so they can never disagree.

use bson::{doc, Document};
use chrono::{DateTime, NaiveDate, Utc};

/// Field holding the event time in every log document.
pub const TIME_FIELD: &str = "timestamp";
/// Field holding the grouping metadata (service, level, host, pid).
pub const META_FIELD: &str = "meta";
/// Bucketing granularity hint for the time-series engine.
pub const GRANULARITY: &str = "seconds";

/// Composite identity of a shard: tenant + UTC calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardId {
    tenant: String,
    date: NaiveDate,
}

impl ShardId {
    pub fn new(tenant: &str, date: NaiveDate) -> Self {
        Self {
            tenant: tenant.to_string(),
            date,
        }
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Tenant database name. The `<tenant>_logs` convention is load-bearing:
    /// operator role privileges are enumerated over databases with this
    /// suffix.
    pub fn database(&self) -> String {
        format!("{}_logs", self.tenant)
    }

    /// Shard collection name, `<tenant>_log_<YYYY-MM-DD>`.
    pub fn collection(&self) -> String {
        format!("{}_log_{}", self.tenant, self.date.format("%Y-%m-%d"))
    }
}

impl std::fmt::Display for ShardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database(), self.collection())
    }
}

/// Maps an instant to the shard it belongs to. Pure and total: depends
/// only on the tenant and the UTC date portion of the instant.
pub fn shard_key(tenant: &str, instant: DateTime<Utc>) -> ShardId {
    ShardId::new(tenant, instant.date_naive())
}

/// Physical properties a shard must be created with.
///
/// Time field, meta field, and granularity are immutable after creation;
/// only the TTL may legitimately differ across re-provisioning attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSchema {
    pub time_field: String,
    pub meta_field: String,
    pub granularity: String,
    pub expire_after_secs: u64,
}

impl ShardSchema {
    pub fn with_ttl_days(days: u64) -> Self {
        Self {
            time_field: TIME_FIELD.to_string(),
            meta_field: META_FIELD.to_string(),
            granularity: GRANULARITY.to_string(),
            expire_after_secs: days * 24 * 60 * 60,
        }
    }

    /// Whether an existing time-series collection is compatible with this
    /// schema. TTL is deliberately ignored: a TTL change is not a schema
    /// conflict.
    pub fn matches(&self, info: &TimeseriesInfo) -> bool {
        info.time_field == self.time_field
            && info.meta_field == self.meta_field
            && info.granularity == self.granularity
    }

    /// Secondary index every shard carries: `{ "meta.service": 1,
    /// "timestamp": -1 }`.
    pub fn index_keys() -> Document {
        doc! { "meta.service": 1, TIME_FIELD: -1 }
    }
}

/// Time-series properties reported for an existing collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeseriesInfo {
    pub time_field: String,
    pub meta_field: String,
    pub granularity: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_naming_convention() {
        let id = ShardId::new("svc-a", NaiveDate::from_ymd_opt(2025, 3, 9).unwrap());
        assert_eq!(id.database(), "svc-a_logs");
        assert_eq!(id.collection(), "svc-a_log_2025-03-09");
    }

    #[test]
    fn test_shard_key_same_day() {
        let morning = Utc.with_ymd_and_hms(2025, 3, 9, 0, 0, 1).unwrap();
        let night = Utc.with_ymd_and_hms(2025, 3, 9, 23, 59, 59).unwrap();
        assert_eq!(shard_key("svc-a", morning), shard_key("svc-a", night));
    }

    #[test]
    fn test_shard_key_day_boundary() {
        let before = Utc.with_ymd_and_hms(2025, 3, 9, 23, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();
        assert_ne!(shard_key("svc-a", before), shard_key("svc-a", after));
    }

    #[test]
    fn test_ttl_not_part_of_schema_match() {
        let schema = ShardSchema::with_ttl_days(30);
        let info = TimeseriesInfo {
            time_field: TIME_FIELD.to_string(),
            meta_field: META_FIELD.to_string(),
            granularity: GRANULARITY.to_string(),
        };
        assert!(schema.matches(&info));
        assert!(ShardSchema::with_ttl_days(7).matches(&info));
    }

    #[test]
    fn test_schema_mismatch() {
        let schema = ShardSchema::with_ttl_days(30);
        let info = TimeseriesInfo {
            time_field: "ts".to_string(),
            meta_field: META_FIELD.to_string(),
            granularity: GRANULARITY.to_string(),
        };
        assert!(!schema.matches(&info));
    }

    proptest! {
        #[test]
        fn prop_shard_key_stable(secs in 0i64..4_102_444_800) {
            let instant = Utc.timestamp_opt(secs, 0).unwrap();
            let first = shard_key("svc-a", instant);
            let second = shard_key("svc-a", instant);
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.date(), instant.date_naive());
        }
    }
}
