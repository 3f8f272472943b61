//! Configuration surface.
//!
//! Everything externally supplied lives here: connection URI, tenant list,
//! TTL, replica-set topology, credentials, and the election retry budget.
//! Components receive a `Config` at construction; nothing reads globals.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::shard::ShardSchema;

fn default_ttl_days() -> u64 {
    30
}

fn default_replica_set_name() -> String {
    "rs0".to_string()
}

fn default_priority() -> f64 {
    1.0
}

fn default_operator_user() -> String {
    "log_cron".to_string()
}

fn default_operator_role() -> String {
    "logCollectionManager".to_string()
}

fn default_max_attempts() -> u32 {
    10
}

fn default_interval_secs() -> u64 {
    2
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Connection string for an identity privileged enough for the task at
    /// hand (root for bootstrap, the operator for provisioning).
    pub uri: String,
    /// Tenant identifiers; each maps to one `<tenant>_logs` database.
    pub tenants: Vec<String>,
    /// Retention window for log records, in days.
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u64,
    pub root: Credentials,
    #[serde(default)]
    pub operator: OperatorConfig,
    #[serde(default)]
    pub replica_set: ReplicaSetConfig,
    #[serde(default)]
    pub election: ElectionConfig,
    /// Per-tenant passwords; tenants absent from the map fall back to the
    /// tenant identifier itself.
    #[serde(default)]
    pub tenant_passwords: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperatorConfig {
    #[serde(default = "default_operator_user")]
    pub user: String,
    #[serde(default = "default_operator_user")]
    pub password: String,
    #[serde(default = "default_operator_role")]
    pub role: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            user: default_operator_user(),
            password: default_operator_user(),
            role: default_operator_role(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplicaSetConfig {
    #[serde(default = "default_replica_set_name")]
    pub name: String,
    #[serde(default)]
    pub members: Vec<MemberConfig>,
}

impl Default for ReplicaSetConfig {
    fn default() -> Self {
        Self {
            name: default_replica_set_name(),
            members: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberConfig {
    pub host: String,
    #[serde(default = "default_priority")]
    pub priority: f64,
}

/// Bounded-retry budget for the primary-election wait.
#[derive(Debug, Clone, Deserialize)]
pub struct ElectionConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl Config {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Config =
            toml::from_str(&raw).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tenants.is_empty() {
            return Err(Error::InvalidConfig("tenant list is empty".into()));
        }
        if self.ttl_days == 0 {
            return Err(Error::InvalidConfig("ttl_days must be at least 1".into()));
        }
        Ok(())
    }

    pub fn schema(&self) -> ShardSchema {
        ShardSchema::with_ttl_days(self.ttl_days)
    }

    pub fn election_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.election.max_attempts,
            interval: Duration::from_secs(self.election.interval_secs),
        }
    }

    pub fn tenant_password<'a>(&'a self, tenant: &'a str) -> &'a str {
        self.tenant_passwords
            .get(tenant)
            .map(String::as_str)
            .unwrap_or(tenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config: Config = toml::from_str(
            r#"
            uri = "mongodb://localhost:27017"
            tenants = ["svc-a", "svc-b"]

            [root]
            user = "root"
            password = "secret"
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.ttl_days, 30);
        assert_eq!(config.operator.role, "logCollectionManager");
        assert_eq!(config.replica_set.name, "rs0");
        assert_eq!(config.election.max_attempts, 10);
        assert_eq!(config.tenant_password("svc-a"), "svc-a");
    }

    #[test]
    fn test_replica_set_members() {
        let config: Config = toml::from_str(
            r#"
            uri = "mongodb://localhost:27017"
            tenants = ["svc-a"]

            [root]
            user = "root"
            password = "secret"

            [[replica_set.members]]
            host = "mongo1:27017"
            priority = 2

            [[replica_set.members]]
            host = "mongo2:27017"
            "#,
        )
        .unwrap();
        assert_eq!(config.replica_set.members.len(), 2);
        assert_eq!(config.replica_set.members[0].priority, 2.0);
        assert_eq!(config.replica_set.members[1].priority, 1.0);
    }

    #[test]
    fn test_empty_tenants_rejected() {
        let config: Config = toml::from_str(
            r#"
            uri = "mongodb://localhost:27017"
            tenants = []

            [root]
            user = "root"
            password = "secret"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
