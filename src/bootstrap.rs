//! Cluster bootstrapper.
//!
//! Four ordered phases, each idempotent so the whole sequence can be
//! re-run after a partial failure and converge: replica-set init, root
//! identity, per-tenant provisioning, operator role synthesis. Phases are
//! not isolated from each other; any unexpected failure aborts the run.

use std::sync::Arc;

use bson::{doc, Document};
use chrono::Utc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::provision::Provisioner;
use crate::retry;
use crate::store::{LogStore, ReplicaMember, ReplicaSetSpec, RoleBinding, RoleSpec, UserSpec};

/// Suffix identifying tenant log databases. Operator privileges are
/// enumerated over databases carrying it.
const LOG_DB_SUFFIX: &str = "_logs";

/// Builds the operator role's privilege list from the current tenant
/// database enumeration. Pure: the role definition is a function of the
/// database list, recomputed on every bootstrap run so privileges track
/// newly added tenants.
pub fn operator_privileges(log_dbs: &[String]) -> Vec<Document> {
    let mut privileges: Vec<Document> = log_dbs
        .iter()
        .map(|db| {
            doc! {
                "resource": { "db": db.as_str(), "collection": "" },
                "actions": ["createCollection", "createIndex", "listCollections"],
            }
        })
        .collect();
    privileges.push(doc! {
        "resource": { "cluster": true },
        "actions": ["replSetGetStatus"],
    });
    privileges
}

pub struct Bootstrapper {
    store: Arc<dyn LogStore>,
    config: Config,
}

impl Bootstrapper {
    pub fn new(store: Arc<dyn LogStore>, config: Config) -> Self {
        Self { store, config }
    }

    /// Runs the full bootstrap sequence. Safe to re-run; "already exists"
    /// conditions are swallowed at every step.
    pub async fn run(&self) -> Result<()> {
        self.init_replica_set().await?;
        self.create_root_user().await?;
        self.provision_tenants().await?;
        self.synthesize_operator().await?;
        info!("bootstrap complete");
        Ok(())
    }

    /// Phase 1: replica-set initialization and primary election.
    async fn init_replica_set(&self) -> Result<()> {
        match self.store.replica_set_status().await {
            Ok(status) if status.primary().is_some() => {
                info!("replica set already initialized");
                return Ok(());
            }
            Ok(_) => {
                info!("replica set initialized, waiting for primary");
            }
            Err(Error::NotFound(_)) => {
                let spec = self.replica_set_spec()?;
                info!(name = %spec.name, members = spec.members.len(), "initiating replica set");
                match self.store.initiate_replica_set(&spec).await {
                    Ok(()) => {}
                    // Another bootstrapper got there first.
                    Err(Error::Conflict(_)) => {}
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        }
        self.await_primary().await
    }

    async fn await_primary(&self) -> Result<()> {
        let policy = self.config.election_policy();
        let store = self.store.clone();
        let primary = retry::poll_until(&policy, "primary election", move || {
            let store = store.clone();
            async move {
                match store.replica_set_status().await {
                    Ok(status) => Ok(status.primary().map(|p| p.name.clone())),
                    // Status can be unavailable mid-election; keep polling.
                    Err(Error::NotFound(_)) | Err(Error::Transient(_)) => Ok(None),
                    Err(e) => Err(e),
                }
            }
        })
        .await?;
        info!(%primary, "primary elected");
        Ok(())
    }

    fn replica_set_spec(&self) -> Result<ReplicaSetSpec> {
        let rs = &self.config.replica_set;
        if rs.members.is_empty() {
            return Err(Error::InvalidConfig(
                "replica set is uninitialized and no members are configured".into(),
            ));
        }
        Ok(ReplicaSetSpec {
            name: rs.name.clone(),
            members: rs
                .members
                .iter()
                .enumerate()
                .map(|(i, m)| ReplicaMember {
                    id: i as i32,
                    host: m.host.clone(),
                    priority: m.priority,
                })
                .collect(),
        })
    }

    /// Phase 2: root-equivalent identity.
    async fn create_root_user(&self) -> Result<()> {
        let spec = UserSpec {
            name: self.config.root.user.clone(),
            password: self.config.root.password.clone(),
            roles: vec![RoleBinding {
                role: "root".to_string(),
                db: "admin".to_string(),
            }],
        };
        match self.store.create_user(&spec).await {
            Ok(()) => info!(user = %spec.name, "root user created"),
            Err(Error::Conflict(_)) => info!(user = %spec.name, "root user already exists"),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Phase 3: database, scoped identity, and today's shard per tenant.
    /// Unlike the daily provisioning run, this loop is fail-fast: later
    /// phases assume every tenant completed.
    async fn provision_tenants(&self) -> Result<()> {
        let provisioner = Provisioner::new(self.store.clone(), self.config.schema());
        let today = Utc::now().date_naive();

        for tenant in &self.config.tenants {
            let db = format!("{tenant}{LOG_DB_SUFFIX}");
            let marker = doc! {
                "service": tenant.as_str(),
                "initialized": true,
                "createdAt": bson::DateTime::now(),
            };
            self.store.ensure_database(&db, marker).await?;

            let user = UserSpec {
                name: tenant.clone(),
                password: self.config.tenant_password(tenant).to_string(),
                roles: vec![RoleBinding {
                    role: "readWrite".to_string(),
                    db: db.clone(),
                }],
            };
            match self.store.create_user(&user).await {
                Ok(()) => info!(%tenant, %db, "tenant user created"),
                Err(Error::Conflict(_)) => info!(%tenant, "tenant user already exists"),
                Err(e) => return Err(e),
            }

            provisioner.ensure_shard(tenant, today).await?;
        }
        Ok(())
    }

    /// Phase 4: operator role and identity, with privileges recomputed
    /// from the live database enumeration.
    async fn synthesize_operator(&self) -> Result<()> {
        let mut log_dbs: Vec<String> = self
            .store
            .database_names()
            .await?
            .into_iter()
            .filter(|name| name.ends_with(LOG_DB_SUFFIX))
            .collect();
        log_dbs.sort();

        let role = RoleSpec {
            name: self.config.operator.role.clone(),
            privileges: operator_privileges(&log_dbs),
        };
        match self.store.create_role(&role).await {
            Ok(()) => info!(role = %role.name, databases = log_dbs.len(), "operator role created"),
            Err(Error::Conflict(_)) => {
                // Privileges must track newly added tenants.
                warn!(role = %role.name, "operator role exists, updating privileges in place");
                self.store.update_role(&role).await?;
            }
            Err(e) => return Err(e),
        }

        let user = UserSpec {
            name: self.config.operator.user.clone(),
            password: self.config.operator.password.clone(),
            roles: vec![RoleBinding {
                role: role.name.clone(),
                db: "admin".to_string(),
            }],
        };
        match self.store.create_user(&user).await {
            Ok(()) => info!(user = %user.name, "operator user created"),
            Err(Error::Conflict(_)) => info!(user = %user.name, "operator user already exists"),
            Err(e) => return Err(e),
        }
        Ok(())
    }
}
