//! Document-store boundary.
//!
//! [`LogStore`] is the seam between the shard lifecycle logic and the
//! underlying document store. The MongoDB adapter lives in [`mongo`]; an
//! in-memory fake with the same conflict/absence semantics lives in
//! [`memory`] for tests. Provider error codes are classified into
//! [`crate::Error`] inside the adapters and nowhere else.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::Document;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::Level;
use crate::shard::{ShardSchema, TimeseriesInfo};

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Inclusive timestamp range with an optional level filter and a result
/// cap. Results are always newest-first.
#[derive(Debug, Clone)]
pub struct RangeQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub level: Option<Level>,
    pub limit: i64,
}

impl RangeQuery {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            level: None,
            limit: 100,
        }
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

/// What the store reports about an existing collection.
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub name: String,
    /// `None` when the collection exists but is not a time-series
    /// collection.
    pub timeseries: Option<TimeseriesInfo>,
}

/// One user to create, with its role bindings.
#[derive(Debug, Clone)]
pub struct UserSpec {
    pub name: String,
    pub password: String,
    pub roles: Vec<RoleBinding>,
}

#[derive(Debug, Clone)]
pub struct RoleBinding {
    pub role: String,
    pub db: String,
}

/// A role with a computed privilege list. Privileges are carried as raw
/// documents because their shape is exactly what the server consumes.
#[derive(Debug, Clone)]
pub struct RoleSpec {
    pub name: String,
    pub privileges: Vec<Document>,
}

/// Replica-set topology to initiate.
#[derive(Debug, Clone)]
pub struct ReplicaSetSpec {
    pub name: String,
    pub members: Vec<ReplicaMember>,
}

#[derive(Debug, Clone)]
pub struct ReplicaMember {
    pub id: i32,
    pub host: String,
    pub priority: f64,
}

/// Reported replica-set member state.
#[derive(Debug, Clone)]
pub struct MemberStatus {
    pub name: String,
    /// Raw state number; 1 is primary.
    pub state: i32,
}

#[derive(Debug, Clone, Default)]
pub struct ReplicaSetStatus {
    pub members: Vec<MemberStatus>,
}

impl ReplicaSetStatus {
    pub fn primary(&self) -> Option<&MemberStatus> {
        self.members.iter().find(|m| m.state == 1)
    }
}

/// Operations the shard lifecycle needs from a document store.
///
/// Contract highlights the implementations must honor:
/// - `create_timeseries` on an existing namespace is `Error::Conflict`;
/// - `insert_*` and `find_range` against an absent collection are
///   `Error::NotFound` (never implicit creation);
/// - `create_index` with an identical existing index succeeds;
/// - `find_range` returns documents sorted newest-first, capped by the
///   query limit.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn create_timeseries(&self, db: &str, coll: &str, schema: &ShardSchema) -> Result<()>;

    async fn collection_info(&self, db: &str, coll: &str) -> Result<Option<CollectionInfo>>;

    async fn create_index(&self, db: &str, coll: &str, keys: Document) -> Result<()>;

    async fn insert_one(&self, db: &str, coll: &str, doc: Document) -> Result<ObjectId>;

    async fn insert_many(&self, db: &str, coll: &str, docs: Vec<Document>) -> Result<Vec<ObjectId>>;

    async fn find_range(&self, db: &str, coll: &str, query: &RangeQuery) -> Result<Vec<Document>>;

    async fn database_names(&self) -> Result<Vec<String>>;

    /// Materializes a database by writing `marker` into its `_init`
    /// collection, once. Document stores may not list a database until its
    /// first write.
    async fn ensure_database(&self, db: &str, marker: Document) -> Result<()>;

    async fn replica_set_status(&self) -> Result<ReplicaSetStatus>;

    async fn initiate_replica_set(&self, spec: &ReplicaSetSpec) -> Result<()>;

    async fn create_user(&self, spec: &UserSpec) -> Result<()>;

    async fn create_role(&self, spec: &RoleSpec) -> Result<()>;

    async fn update_role(&self, spec: &RoleSpec) -> Result<()>;
}
