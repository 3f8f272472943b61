//! daylog — multi-tenant, daily-sharded log storage on MongoDB
//! time-series collections.
//!
//! Each tenant gets one database (`<tenant>_logs`) and one time-series
//! collection per UTC day (`<tenant>_log_<YYYY-MM-DD>`) with a retention
//! TTL, so no single collection grows without bound. The crate covers:
//!
//! - the shard lifecycle: [`shard_key`] maps instants to shards,
//!   [`provision::Provisioner`] creates them idempotently ahead of the
//!   date boundary;
//! - cluster bootstrap: [`bootstrap::Bootstrapper`] initializes the
//!   replica set, creates per-tenant databases and scoped users, and
//!   synthesizes the least-privilege operator role used for shard
//!   creation;
//! - log I/O: [`writer::LogWriter`] and [`reader::LogReader`] against the
//!   currently active shard.
//!
//! The document store sits behind [`store::LogStore`]; the MongoDB
//! adapter classifies all provider error codes into [`Error`], and an
//! in-memory implementation backs the test suite.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod model;
pub mod provision;
pub mod reader;
pub mod retry;
pub mod shard;
pub mod store;
pub mod writer;

pub use config::Config;
pub use error::{Error, Result};
pub use model::{Level, LogRecord, RecordMeta};
pub use provision::{Outcome, Provisioner, RunReport};
pub use reader::LogReader;
pub use shard::{shard_key, ShardId, ShardSchema};
pub use store::{LogStore, MemoryStore, MongoStore, RangeQuery};
pub use writer::LogWriter;
