//! Log record model.
//!
//! Wire shape (one BSON document per record):
//! `{ timestamp, meta: { service, level, hostname, pid }, message, details }`.
//! `timestamp` places the record in a shard; `meta` is the time-series
//! grouping field.

use bson::Document;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Severity level, stored lowercase in `meta.level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Level {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            other => Err(crate::error::Error::InvalidConfig(format!(
                "unknown log level: {other}"
            ))),
        }
    }
}

/// Grouping metadata for one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMeta {
    pub service: String,
    pub level: Level,
    pub hostname: String,
    pub pid: u32,
}

/// One structured log entry. Immutable once written; expires with its
/// shard's TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
    pub meta: RecordMeta,
    pub message: String,
    #[serde(default)]
    pub details: Document,
}

impl LogRecord {
    /// A record timestamped "now", with hostname and pid captured from the
    /// running process.
    pub fn now(service: &str, level: Level, message: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            meta: RecordMeta {
                service: service.to_string(),
                level,
                hostname: gethostname::gethostname().to_string_lossy().into_owned(),
                pid: std::process::id(),
            },
            message: message.to_string(),
            details: Document::new(),
        }
    }

    pub fn with_details(mut self, details: Document) -> Self {
        self.details = details;
        self
    }

    pub fn to_document(&self) -> Result<Document> {
        Ok(bson::to_document(self)?)
    }

    pub fn from_document(doc: Document) -> Result<Self> {
        Ok(bson::from_document(doc)?)
    }
}
