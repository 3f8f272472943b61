//! MongoDB adapter.
//!
//! The only module allowed to look at raw server error codes. Everything
//! it returns is already classified into the crate taxonomy, so the shard
//! lifecycle logic stays portable across any store offering equivalent
//! primitives.

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::options::FindOptions;
use mongodb::Client;
use tracing::debug;

use crate::error::{Error, Result};
use crate::shard::{ShardSchema, TimeseriesInfo, TIME_FIELD};

use super::{
    CollectionInfo, LogStore, MemberStatus, RangeQuery, ReplicaSetSpec, ReplicaSetStatus,
    RoleSpec, UserSpec,
};

// Server error codes this adapter recognizes. Everything else propagates
// as Error::Store.
const NAMESPACE_EXISTS: i32 = 48;
const ROLE_ALREADY_EXISTS: i32 = 51002;
const USER_ALREADY_EXISTS: i32 = 51003;
const ALREADY_INITIALIZED: i32 = 23;
const INDEX_OPTIONS_CONFLICT: i32 = 85;
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;
const UNAUTHORIZED: i32 = 13;
const AUTHENTICATION_FAILED: i32 = 18;
const NAMESPACE_NOT_FOUND: i32 = 26;
const NOT_YET_INITIALIZED: i32 = 94;
const HOST_UNREACHABLE: i32 = 6;
const HOST_NOT_FOUND: i32 = 7;
const NETWORK_TIMEOUT: i32 = 89;
const SOCKET_EXCEPTION: i32 = 9001;
const NOT_WRITABLE_PRIMARY: i32 = 10107;

pub struct MongoStore {
    client: Client,
}

impl MongoStore {
    pub async fn connect(uri: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| classify(e, "connect"))?;
        Ok(Self { client })
    }

    async fn admin_command(&self, command: Document, what: &str) -> Result<Document> {
        self.client
            .database("admin")
            .run_command(command, None)
            .await
            .map_err(|e| classify(e, what))
    }
}

#[async_trait]
impl LogStore for MongoStore {
    async fn create_timeseries(&self, db: &str, coll: &str, schema: &ShardSchema) -> Result<()> {
        let command = doc! {
            "create": coll,
            "timeseries": {
                "timeField": schema.time_field.as_str(),
                "metaField": schema.meta_field.as_str(),
                "granularity": schema.granularity.as_str(),
            },
            "expireAfterSeconds": schema.expire_after_secs as i64,
        };
        self.client
            .database(db)
            .run_command(command, None)
            .await
            .map(|_| ())
            .map_err(|e| classify(e, &format!("{db}.{coll}")))
    }

    async fn collection_info(&self, db: &str, coll: &str) -> Result<Option<CollectionInfo>> {
        let reply = self
            .client
            .database(db)
            .run_command(doc! { "listCollections": 1, "filter": { "name": coll } }, None)
            .await
            .map_err(|e| classify(e, &format!("{db}.{coll}")))?;

        let batch = reply
            .get_document("cursor")
            .and_then(|c| c.get_array("firstBatch"))
            .map_err(|e| Error::Store(format!("malformed listCollections reply: {e}")))?;

        let Some(Bson::Document(entry)) = batch.first() else {
            return Ok(None);
        };
        Ok(Some(parse_collection_entry(entry)?))
    }

    async fn create_index(&self, db: &str, coll: &str, keys: Document) -> Result<()> {
        let command = doc! {
            "createIndexes": coll,
            "indexes": [ { "key": keys.clone(), "name": index_name(&keys) } ],
        };
        debug!(db, coll, "ensuring secondary index");
        self.client
            .database(db)
            .run_command(command, None)
            .await
            .map(|_| ())
            .map_err(|e| classify(e, &format!("{db}.{coll}")))
    }

    async fn insert_one(&self, db: &str, coll: &str, doc: Document) -> Result<ObjectId> {
        // Inserting into an absent namespace would implicitly create a
        // plain collection and poison the day's shard; reject instead.
        self.require_collection(db, coll).await?;
        let result = self
            .client
            .database(db)
            .collection::<Document>(coll)
            .insert_one(doc, None)
            .await
            .map_err(|e| classify(e, &format!("{db}.{coll}")))?;
        object_id(result.inserted_id)
    }

    async fn insert_many(&self, db: &str, coll: &str, docs: Vec<Document>) -> Result<Vec<ObjectId>> {
        self.require_collection(db, coll).await?;
        let count = docs.len();
        let result = self
            .client
            .database(db)
            .collection::<Document>(coll)
            .insert_many(docs, None)
            .await
            .map_err(|e| classify(e, &format!("{db}.{coll}")))?;
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let id = result
                .inserted_ids
                .get(&i)
                .cloned()
                .ok_or_else(|| Error::Store(format!("missing inserted id at index {i}")))?;
            ids.push(object_id(id)?);
        }
        Ok(ids)
    }

    async fn find_range(&self, db: &str, coll: &str, query: &RangeQuery) -> Result<Vec<Document>> {
        self.require_collection(db, coll).await?;
        let mut filter = doc! {
            TIME_FIELD: {
                "$gte": bson::DateTime::from_chrono(query.start),
                "$lte": bson::DateTime::from_chrono(query.end),
            }
        };
        if let Some(level) = query.level {
            filter.insert("meta.level", level.as_str());
        }
        let options = FindOptions::builder()
            .sort(doc! { TIME_FIELD: -1 })
            .limit(query.limit)
            .build();
        let cursor = self
            .client
            .database(db)
            .collection::<Document>(coll)
            .find(filter, options)
            .await
            .map_err(|e| classify(e, &format!("{db}.{coll}")))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| classify(e, &format!("{db}.{coll}")))
    }

    async fn database_names(&self) -> Result<Vec<String>> {
        self.client
            .list_database_names(None, None)
            .await
            .map_err(|e| classify(e, "listDatabases"))
    }

    async fn ensure_database(&self, db: &str, marker: Document) -> Result<()> {
        let init = self.client.database(db).collection::<Document>("_init");
        let existing = init
            .find_one(None, None)
            .await
            .map_err(|e| classify(e, &format!("{db}._init")))?;
        if existing.is_some() {
            return Ok(());
        }
        init.insert_one(marker, None)
            .await
            .map(|_| ())
            .map_err(|e| classify(e, &format!("{db}._init")))
    }

    async fn replica_set_status(&self) -> Result<ReplicaSetStatus> {
        let reply = self
            .admin_command(doc! { "replSetGetStatus": 1 }, "replSetGetStatus")
            .await?;
        let mut members = Vec::new();
        if let Ok(raw) = reply.get_array("members") {
            for entry in raw {
                if let Bson::Document(m) = entry {
                    members.push(MemberStatus {
                        name: m.get_str("name").unwrap_or_default().to_string(),
                        state: m.get_i32("state").unwrap_or(-1),
                    });
                }
            }
        }
        Ok(ReplicaSetStatus { members })
    }

    async fn initiate_replica_set(&self, spec: &ReplicaSetSpec) -> Result<()> {
        let members: Vec<Document> = spec
            .members
            .iter()
            .map(|m| doc! { "_id": m.id, "host": m.host.as_str(), "priority": m.priority })
            .collect();
        self.admin_command(
            doc! { "replSetInitiate": { "_id": spec.name.as_str(), "members": members } },
            "replSetInitiate",
        )
        .await
        .map(|_| ())
    }

    async fn create_user(&self, spec: &UserSpec) -> Result<()> {
        let roles: Vec<Document> = spec
            .roles
            .iter()
            .map(|r| doc! { "role": r.role.as_str(), "db": r.db.as_str() })
            .collect();
        self.admin_command(
            doc! { "createUser": spec.name.as_str(), "pwd": spec.password.as_str(), "roles": roles },
            "createUser",
        )
        .await
        .map(|_| ())
    }

    async fn create_role(&self, spec: &RoleSpec) -> Result<()> {
        self.admin_command(
            doc! { "createRole": spec.name.as_str(), "privileges": spec.privileges.clone(), "roles": [] },
            "createRole",
        )
        .await
        .map(|_| ())
    }

    async fn update_role(&self, spec: &RoleSpec) -> Result<()> {
        self.admin_command(
            doc! { "updateRole": spec.name.as_str(), "privileges": spec.privileges.clone(), "roles": [] },
            "updateRole",
        )
        .await
        .map(|_| ())
    }
}

impl MongoStore {
    async fn require_collection(&self, db: &str, coll: &str) -> Result<()> {
        match self.collection_info(db, coll).await? {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("shard {db}.{coll} does not exist"))),
        }
    }
}

fn parse_collection_entry(entry: &Document) -> Result<CollectionInfo> {
    let name = entry
        .get_str("name")
        .map_err(|e| Error::Store(format!("malformed collection entry: {e}")))?
        .to_string();
    let is_timeseries = entry.get_str("type").map(|t| t == "timeseries").unwrap_or(false);
    let timeseries = if is_timeseries {
        let ts = entry
            .get_document("options")
            .and_then(|o| o.get_document("timeseries"))
            .map_err(|e| Error::Store(format!("time-series collection without options: {e}")))?;
        Some(TimeseriesInfo {
            time_field: ts.get_str("timeField").unwrap_or_default().to_string(),
            meta_field: ts.get_str("metaField").unwrap_or_default().to_string(),
            granularity: ts.get_str("granularity").unwrap_or("seconds").to_string(),
        })
    } else {
        None
    };
    Ok(CollectionInfo { name, timeseries })
}

/// Default server-style index name, e.g. `meta.service_1_timestamp_-1`.
fn index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(field, dir)| {
            let dir = match dir {
                Bson::Int32(v) => v.to_string(),
                Bson::Int64(v) => v.to_string(),
                other => other.to_string(),
            };
            format!("{field}_{dir}")
        })
        .collect::<Vec<_>>()
        .join("_")
}

fn object_id(id: Bson) -> Result<ObjectId> {
    id.as_object_id()
        .ok_or_else(|| Error::Store(format!("unexpected inserted id: {id}")))
}

/// Maps a driver error to the crate taxonomy. The single place where
/// numeric server codes are interpreted.
fn classify(err: mongodb::error::Error, what: &str) -> Error {
    use mongodb::error::{ErrorKind, WriteFailure};

    match *err.kind {
        ErrorKind::Command(ref c) => classify_code(c.code, &c.message, what),
        ErrorKind::Write(WriteFailure::WriteError(ref w)) => {
            classify_code(w.code, &w.message, what)
        }
        ErrorKind::Write(WriteFailure::WriteConcernError(ref w)) => {
            Error::Transient(format!("{what}: {}", w.message))
        }
        ErrorKind::BulkWrite(ref failure) => {
            if let Some(first) = failure.write_errors.as_ref().and_then(|v| v.first()) {
                classify_code(first.code, &first.message, what)
            } else {
                Error::Store(format!("{what}: bulk write failed"))
            }
        }
        ErrorKind::Authentication { ref message, .. } => {
            Error::PermissionDenied(format!("{what}: {message}"))
        }
        ErrorKind::Io(ref e) => Error::Transient(format!("{what}: {e}")),
        ErrorKind::ServerSelection { ref message, .. } => {
            Error::Transient(format!("{what}: {message}"))
        }
        ErrorKind::DnsResolve { ref message, .. } => {
            Error::Transient(format!("{what}: {message}"))
        }
        _ => Error::Store(format!("{what}: {err}")),
    }
}

fn classify_code(code: i32, message: &str, what: &str) -> Error {
    match code {
        NAMESPACE_EXISTS | ROLE_ALREADY_EXISTS | USER_ALREADY_EXISTS | ALREADY_INITIALIZED => {
            Error::Conflict(format!("{what}: {message}"))
        }
        INDEX_OPTIONS_CONFLICT | INDEX_KEY_SPECS_CONFLICT => Error::SchemaConflict {
            namespace: what.to_string(),
            reason: message.to_string(),
        },
        UNAUTHORIZED | AUTHENTICATION_FAILED => {
            Error::PermissionDenied(format!("{what}: {message}"))
        }
        NAMESPACE_NOT_FOUND | NOT_YET_INITIALIZED => {
            Error::NotFound(format!("{what}: {message}"))
        }
        HOST_UNREACHABLE | HOST_NOT_FOUND | NETWORK_TIMEOUT | SOCKET_EXCEPTION
        | NOT_WRITABLE_PRIMARY => Error::Transient(format!("{what}: {message}")),
        _ => Error::Store(format!("{what}: command failed (code {code}): {message}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_code_conflicts() {
        assert!(matches!(
            classify_code(NAMESPACE_EXISTS, "ns exists", "a.b"),
            Error::Conflict(_)
        ));
        assert!(matches!(
            classify_code(USER_ALREADY_EXISTS, "user exists", "createUser"),
            Error::Conflict(_)
        ));
        assert!(matches!(
            classify_code(UNAUTHORIZED, "not authorized", "a.b"),
            Error::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_code(NOT_YET_INITIALIZED, "no replset config", "replSetGetStatus"),
            Error::NotFound(_)
        ));
        assert!(matches!(
            classify_code(NETWORK_TIMEOUT, "timed out", "a.b"),
            Error::Transient(_)
        ));
        assert!(matches!(
            classify_code(12345, "mystery", "a.b"),
            Error::Store(_)
        ));
    }

    #[test]
    fn test_index_name() {
        let keys = ShardSchema::index_keys();
        assert_eq!(index_name(&keys), "meta.service_1_timestamp_-1");
    }

    #[test]
    fn test_parse_timeseries_entry() {
        let entry = doc! {
            "name": "svc-a_log_2025-03-09",
            "type": "timeseries",
            "options": {
                "timeseries": {
                    "timeField": "timestamp",
                    "metaField": "meta",
                    "granularity": "seconds",
                },
                "expireAfterSeconds": 2592000_i64,
            },
        };
        let info = parse_collection_entry(&entry).unwrap();
        let ts = info.timeseries.unwrap();
        assert_eq!(ts.time_field, "timestamp");
        assert_eq!(ts.meta_field, "meta");
        assert_eq!(ts.granularity, "seconds");
    }

    #[test]
    fn test_parse_plain_entry() {
        let entry = doc! { "name": "other", "type": "collection", "options": {} };
        let info = parse_collection_entry(&entry).unwrap();
        assert!(info.timeseries.is_none());
    }
}
