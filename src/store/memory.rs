//! In-memory [`LogStore`] fake.
//!
//! Mirrors the server-side semantics the lifecycle logic depends on:
//! create-on-existing is a conflict, inserts and queries against absent
//! collections are `NotFound`, index creation is idempotent, and the
//! replica set can be configured to elect a primary only after a number
//! of status polls. Used by the integration tests; also handy for
//! embedding in downstream test suites.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::Document;

use crate::error::{Error, Result};
use crate::shard::{ShardSchema, TimeseriesInfo, TIME_FIELD};

use super::{
    CollectionInfo, LogStore, MemberStatus, RangeQuery, ReplicaSetSpec, ReplicaSetStatus,
    RoleSpec, UserSpec,
};

#[derive(Default)]
struct CollectionState {
    timeseries: Option<(TimeseriesInfo, u64)>,
    docs: Vec<Document>,
    indexes: Vec<Document>,
}

#[derive(Default)]
struct DatabaseState {
    collections: BTreeMap<String, CollectionState>,
}

struct ReplState {
    initiated: bool,
    member_hosts: Vec<String>,
    polls_until_primary: u32,
}

struct State {
    databases: BTreeMap<String, DatabaseState>,
    users: BTreeMap<String, UserSpec>,
    roles: BTreeMap<String, RoleSpec>,
    repl: ReplState,
    denied: HashSet<String>,
}

pub struct MemoryStore {
    state: Mutex<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// A store whose replica set is already initialized with an elected
    /// primary.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                databases: BTreeMap::new(),
                users: BTreeMap::new(),
                roles: BTreeMap::new(),
                repl: ReplState {
                    initiated: true,
                    member_hosts: vec!["mongo1:27017".to_string()],
                    polls_until_primary: 0,
                },
                denied: HashSet::new(),
            }),
        }
    }

    /// A store with no replica set yet. After `initiate_replica_set`, a
    /// primary appears only once `polls_until_primary` status calls have
    /// been made.
    pub fn uninitialized(polls_until_primary: u32) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock().unwrap();
            state.repl.initiated = false;
            state.repl.member_hosts.clear();
            state.repl.polls_until_primary = polls_until_primary;
        }
        store
    }

    /// Makes every operation on `db` fail with `PermissionDenied`.
    pub fn deny_database(&self, db: &str) {
        self.state.lock().unwrap().denied.insert(db.to_string());
    }

    /// Creates a plain (non-time-series) collection, for name-collision
    /// scenarios.
    pub fn create_plain_collection(&self, db: &str, coll: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .databases
            .entry(db.to_string())
            .or_default()
            .collections
            .entry(coll.to_string())
            .or_default();
    }

    pub fn collection_exists(&self, db: &str, coll: &str) -> bool {
        let state = self.state.lock().unwrap();
        state
            .databases
            .get(db)
            .map(|d| d.collections.contains_key(coll))
            .unwrap_or(false)
    }

    pub fn shard_ttl(&self, db: &str, coll: &str) -> Option<u64> {
        let state = self.state.lock().unwrap();
        state
            .databases
            .get(db)?
            .collections
            .get(coll)?
            .timeseries
            .as_ref()
            .map(|(_, ttl)| *ttl)
    }

    pub fn index_count(&self, db: &str, coll: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .databases
            .get(db)
            .and_then(|d| d.collections.get(coll))
            .map(|c| c.indexes.len())
            .unwrap_or(0)
    }

    pub fn document_count(&self, db: &str, coll: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .databases
            .get(db)
            .and_then(|d| d.collections.get(coll))
            .map(|c| c.docs.len())
            .unwrap_or(0)
    }

    pub fn user_names(&self) -> Vec<String> {
        self.state.lock().unwrap().users.keys().cloned().collect()
    }

    pub fn role(&self, name: &str) -> Option<RoleSpec> {
        self.state.lock().unwrap().roles.get(name).cloned()
    }

    fn check_denied(state: &State, db: &str) -> Result<()> {
        if state.denied.contains(db) {
            return Err(Error::PermissionDenied(format!("not authorized on {db}")));
        }
        Ok(())
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn create_timeseries(&self, db: &str, coll: &str, schema: &ShardSchema) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_denied(&state, db)?;
        let database = state.databases.entry(db.to_string()).or_default();
        if database.collections.contains_key(coll) {
            return Err(Error::Conflict(format!("{db}.{coll}: namespace exists")));
        }
        let info = TimeseriesInfo {
            time_field: schema.time_field.clone(),
            meta_field: schema.meta_field.clone(),
            granularity: schema.granularity.clone(),
        };
        database.collections.insert(
            coll.to_string(),
            CollectionState {
                timeseries: Some((info, schema.expire_after_secs)),
                docs: Vec::new(),
                indexes: Vec::new(),
            },
        );
        Ok(())
    }

    async fn collection_info(&self, db: &str, coll: &str) -> Result<Option<CollectionInfo>> {
        let state = self.state.lock().unwrap();
        Self::check_denied(&state, db)?;
        Ok(state
            .databases
            .get(db)
            .and_then(|d| d.collections.get(coll))
            .map(|c| CollectionInfo {
                name: coll.to_string(),
                timeseries: c.timeseries.as_ref().map(|(info, _)| info.clone()),
            }))
    }

    async fn create_index(&self, db: &str, coll: &str, keys: Document) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_denied(&state, db)?;
        let collection = state
            .databases
            .get_mut(db)
            .and_then(|d| d.collections.get_mut(coll))
            .ok_or_else(|| Error::NotFound(format!("{db}.{coll} does not exist")))?;
        if !collection.indexes.contains(&keys) {
            collection.indexes.push(keys);
        }
        Ok(())
    }

    async fn insert_one(&self, db: &str, coll: &str, doc: Document) -> Result<ObjectId> {
        let ids = self.insert_many(db, coll, vec![doc]).await?;
        Ok(ids[0])
    }

    async fn insert_many(&self, db: &str, coll: &str, docs: Vec<Document>) -> Result<Vec<ObjectId>> {
        let mut state = self.state.lock().unwrap();
        Self::check_denied(&state, db)?;
        let collection = state
            .databases
            .get_mut(db)
            .and_then(|d| d.collections.get_mut(coll))
            .ok_or_else(|| Error::NotFound(format!("shard {db}.{coll} does not exist")))?;
        let mut ids = Vec::with_capacity(docs.len());
        for mut doc in docs {
            let id = ObjectId::new();
            doc.insert("_id", id);
            collection.docs.push(doc);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn find_range(&self, db: &str, coll: &str, query: &RangeQuery) -> Result<Vec<Document>> {
        let state = self.state.lock().unwrap();
        Self::check_denied(&state, db)?;
        let collection = state
            .databases
            .get(db)
            .and_then(|d| d.collections.get(coll))
            .ok_or_else(|| Error::NotFound(format!("shard {db}.{coll} does not exist")))?;

        let start = bson::DateTime::from_chrono(query.start);
        let end = bson::DateTime::from_chrono(query.end);
        let mut matched: Vec<Document> = collection
            .docs
            .iter()
            .filter(|doc| {
                let Ok(ts) = doc.get_datetime(TIME_FIELD) else {
                    return false;
                };
                if *ts < start || *ts > end {
                    return false;
                }
                match query.level {
                    None => true,
                    Some(level) => doc
                        .get_document("meta")
                        .and_then(|m| m.get_str("level"))
                        .map(|l| l == level.as_str())
                        .unwrap_or(false),
                }
            })
            .cloned()
            .collect();
        matched.sort_by_key(|doc| {
            std::cmp::Reverse(
                doc.get_datetime(TIME_FIELD)
                    .map(|t| *t)
                    .unwrap_or(bson::DateTime::MIN),
            )
        });
        matched.truncate(query.limit.max(0) as usize);
        Ok(matched)
    }

    async fn database_names(&self) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state.databases.keys().cloned().collect())
    }

    async fn ensure_database(&self, db: &str, marker: Document) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_denied(&state, db)?;
        let database = state.databases.entry(db.to_string()).or_default();
        let init = database.collections.entry("_init".to_string()).or_default();
        if init.docs.is_empty() {
            init.docs.push(marker);
        }
        Ok(())
    }

    async fn replica_set_status(&self) -> Result<ReplicaSetStatus> {
        let mut state = self.state.lock().unwrap();
        if !state.repl.initiated {
            return Err(Error::NotFound("no replica set config".into()));
        }
        let electing = state.repl.polls_until_primary > 0;
        if electing {
            state.repl.polls_until_primary -= 1;
        }
        let members = state
            .repl
            .member_hosts
            .iter()
            .enumerate()
            .map(|(i, host)| MemberStatus {
                name: host.clone(),
                state: if i == 0 && !electing { 1 } else { 2 },
            })
            .collect();
        Ok(ReplicaSetStatus { members })
    }

    async fn initiate_replica_set(&self, spec: &ReplicaSetSpec) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.repl.initiated {
            return Err(Error::Conflict("already initialized".into()));
        }
        state.repl.initiated = true;
        state.repl.member_hosts = spec.members.iter().map(|m| m.host.clone()).collect();
        Ok(())
    }

    async fn create_user(&self, spec: &UserSpec) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.users.contains_key(&spec.name) {
            return Err(Error::Conflict(format!("user {} already exists", spec.name)));
        }
        state.users.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    async fn create_role(&self, spec: &RoleSpec) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.roles.contains_key(&spec.name) {
            return Err(Error::Conflict(format!("role {} already exists", spec.name)));
        }
        state.roles.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    async fn update_role(&self, spec: &RoleSpec) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.roles.get_mut(&spec.name) {
            Some(existing) => {
                *existing = spec.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!("role {} does not exist", spec.name))),
        }
    }
}
