//! Bootstrapper integration tests against the in-memory store.

use std::sync::Arc;

use chrono::Utc;
use daylog::bootstrap::Bootstrapper;
use daylog::config::{Config, Credentials, ElectionConfig, MemberConfig, ReplicaSetConfig};
use daylog::store::MemoryStore;
use daylog::{shard_key, Error};

fn config(tenants: &[&str]) -> Config {
    Config {
        uri: "mongodb://unused".to_string(),
        tenants: tenants.iter().map(|t| t.to_string()).collect(),
        ttl_days: 30,
        root: Credentials {
            user: "root".to_string(),
            password: "root".to_string(),
        },
        operator: Default::default(),
        replica_set: ReplicaSetConfig {
            name: "rs0".to_string(),
            members: vec![
                MemberConfig {
                    host: "mongo1:27017".to_string(),
                    priority: 2.0,
                },
                MemberConfig {
                    host: "mongo2:27017".to_string(),
                    priority: 1.0,
                },
                MemberConfig {
                    host: "mongo3:27017".to_string(),
                    priority: 1.0,
                },
            ],
        },
        election: Default::default(),
        tenant_passwords: Default::default(),
    }
}

fn today_collection(tenant: &str) -> (String, String) {
    let shard = shard_key(tenant, Utc::now());
    (shard.database(), shard.collection())
}

#[tokio::test]
async fn test_bootstrap_two_tenant_scenario() {
    let store = Arc::new(MemoryStore::new());
    Bootstrapper::new(store.clone(), config(&["svc-a", "svc-b"]))
        .run()
        .await
        .unwrap();

    // One database, marker, user, and today-shard per tenant.
    for tenant in ["svc-a", "svc-b"] {
        let (db, coll) = today_collection(tenant);
        assert_eq!(db, format!("{tenant}_logs"));
        assert!(store.collection_exists(&db, &coll));
        assert_eq!(store.document_count(&db, "_init"), 1);
    }
    assert_eq!(store.user_names(), ["log_cron", "root", "svc-a", "svc-b"]);

    // Operator role lists exactly the tenant databases plus cluster status.
    let role = store.role("logCollectionManager").unwrap();
    assert_eq!(role.privileges.len(), 3);
    let dbs: Vec<&str> = role
        .privileges
        .iter()
        .filter_map(|p| p.get_document("resource").ok())
        .filter_map(|r| r.get_str("db").ok())
        .collect();
    assert_eq!(dbs, ["svc-a_logs", "svc-b_logs"]);
}

#[tokio::test]
async fn test_bootstrap_converges_when_rerun() {
    let store = Arc::new(MemoryStore::new());
    let bootstrapper = Bootstrapper::new(store.clone(), config(&["svc-a", "svc-b"]));
    bootstrapper.run().await.unwrap();
    bootstrapper.run().await.unwrap();

    assert_eq!(store.user_names(), ["log_cron", "root", "svc-a", "svc-b"]);
    assert_eq!(store.document_count("svc-a_logs", "_init"), 1);
    let (db, coll) = today_collection("svc-a");
    assert_eq!(store.index_count(&db, &coll), 1);
    assert_eq!(
        store.role("logCollectionManager").unwrap().privileges.len(),
        3
    );
}

#[tokio::test]
async fn test_operator_privileges_track_added_tenant() {
    let store = Arc::new(MemoryStore::new());
    // An unrelated database must never appear in the privilege list.
    store.create_plain_collection("metrics", "samples");

    Bootstrapper::new(store.clone(), config(&["svc-a"]))
        .run()
        .await
        .unwrap();
    assert_eq!(store.role("logCollectionManager").unwrap().privileges.len(), 2);

    Bootstrapper::new(store.clone(), config(&["svc-a", "svc-b"]))
        .run()
        .await
        .unwrap();
    let role = store.role("logCollectionManager").unwrap();
    let dbs: Vec<&str> = role
        .privileges
        .iter()
        .filter_map(|p| p.get_document("resource").ok())
        .filter_map(|r| r.get_str("db").ok())
        .collect();
    assert_eq!(dbs, ["svc-a_logs", "svc-b_logs"]);
}

#[tokio::test(start_paused = true)]
async fn test_bootstrap_initiates_replica_set_and_waits_for_primary() {
    // Primary appears only after three status polls.
    let store = Arc::new(MemoryStore::uninitialized(3));
    Bootstrapper::new(store.clone(), config(&["svc-a"]))
        .run()
        .await
        .unwrap();
    assert!(store.collection_exists("svc-a_logs", &today_collection("svc-a").1));
}

#[tokio::test(start_paused = true)]
async fn test_election_timeout_is_fatal() {
    let store = Arc::new(MemoryStore::uninitialized(100));
    let mut cfg = config(&["svc-a"]);
    cfg.election = ElectionConfig {
        max_attempts: 3,
        interval_secs: 2,
    };

    let result = Bootstrapper::new(store.clone(), cfg).run().await;
    match result {
        Err(Error::Timeout { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected election timeout, got {other:?}"),
    }
    // Nothing past phase 1 ran.
    assert!(store.user_names().is_empty());
}

#[tokio::test]
async fn test_tenant_failure_aborts_bootstrap() {
    let store = Arc::new(MemoryStore::new());
    store.deny_database("svc-b_logs");

    let result = Bootstrapper::new(store.clone(), config(&["svc-a", "svc-b", "svc-c"]))
        .run()
        .await;
    assert!(matches!(result, Err(Error::PermissionDenied(_))));
    // Later phases never ran: no operator role was synthesized.
    assert!(store.role("logCollectionManager").is_none());
}
