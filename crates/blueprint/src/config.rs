//! Blueprint configuration and management scope

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Error, Result};
use crate::identity::{ContainerDepth, ResourceType, Urn, normalize_identifier};

/// How much of the account a blueprint manages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlueprintScope {
    #[default]
    Account,
    Database,
    Schema,
}

impl fmt::Display for BlueprintScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Account => "account",
            Self::Database => "database",
            Self::Schema => "schema",
        };
        f.write_str(label)
    }
}

/// Strategy for listing object grants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantFetchStrategy {
    /// One account-wide query; needs elevated read access, may be hours stale
    Bulk,
    /// One query per grantee; slower, strongly consistent
    #[default]
    PerObject,
}

/// Account edition; gates multi-cluster warehouses and long retention
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountEdition {
    Standard,
    #[default]
    Enterprise,
    BusinessCritical,
}

/// Resource types for which REMOVE actions are permitted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncAllowlist(BTreeSet<ResourceType>);

impl SyncAllowlist {
    /// An allow-list that permits no removals
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, resource_type: ResourceType) -> bool {
        self.0.contains(&resource_type)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ResourceType> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<ResourceType> for SyncAllowlist {
    fn from_iter<I: IntoIterator<Item = ResourceType>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The part of the account a plan may touch, resolved from config
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagementScope {
    Account,
    Database {
        database: Option<String>,
    },
    Schema {
        database: Option<String>,
        schema: Option<String>,
    },
}

fn matches_name(wanted: Option<&String>, actual: Option<&String>) -> bool {
    match wanted {
        None => actual.is_some(),
        Some(w) => actual == Some(w),
    }
}

impl ManagementScope {
    /// Whether a resource falls inside this scope
    pub fn contains(&self, urn: &Urn) -> bool {
        let fqn = &urn.fqn;
        match self {
            Self::Account => true,
            Self::Database { database } => match urn.resource_type {
                ResourceType::Database => {
                    database.as_ref().is_none_or(|d| d == &fqn.name)
                }
                t if t.depth() >= ContainerDepth::Database => {
                    matches_name(database.as_ref(), fqn.database.as_ref())
                }
                _ => false,
            },
            Self::Schema { database, schema } => match urn.resource_type {
                ResourceType::Schema => {
                    matches_name(database.as_ref(), fqn.database.as_ref())
                        && schema.as_ref().is_none_or(|s| s == &fqn.name)
                }
                t if t.depth() == ContainerDepth::Schema => {
                    matches_name(database.as_ref(), fqn.database.as_ref())
                        && matches_name(schema.as_ref(), fqn.schema.as_ref())
                }
                _ => false,
            },
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Account => "account".to_string(),
            Self::Database { database } => match database {
                Some(db) => format!("database {db}"),
                None => "database".to_string(),
            },
            Self::Schema { database, schema } => match (database, schema) {
                (Some(db), Some(s)) => format!("schema {db}.{s}"),
                (None, Some(s)) => format!("schema {s}"),
                _ => "schema".to_string(),
            },
        }
    }
}

/// Configuration for one plan/apply run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlueprintConfig {
    /// Display name for this blueprint
    pub name: Option<String>,

    /// Account locator used in every URN
    pub account: String,

    /// How much of the account is managed
    pub scope: BlueprintScope,

    /// Database for `database`/`schema` scope; also fills missing containers
    pub database: Option<String>,

    /// Schema for `schema` scope; also fills missing containers
    pub schema: Option<String>,

    /// Types whose undeclared remote resources are removed
    pub sync_resources: Option<Vec<ResourceType>>,

    /// Record statements instead of executing them
    pub dry_run: bool,

    /// Worker pool size
    pub threads: usize,

    /// How object grants are listed
    pub grant_fetch: GrantFetchStrategy,

    /// Open sessions with `USE SECONDARY ROLES ALL`
    pub use_secondary_roles: bool,

    /// Warehouse for statements that need compute
    pub warehouse: Option<String>,

    /// Edition of the target account
    pub edition: AccountEdition,
}

impl Default for BlueprintConfig {
    fn default() -> Self {
        Self {
            name: None,
            account: String::new(),
            scope: BlueprintScope::Account,
            database: None,
            schema: None,
            sync_resources: None,
            dry_run: false,
            threads: 8,
            grant_fetch: GrantFetchStrategy::PerObject,
            use_secondary_roles: true,
            warehouse: None,
            edition: AccountEdition::Enterprise,
        }
    }
}

impl BlueprintConfig {
    /// Create a config for an account with defaults everywhere else
    pub fn for_account(account: &str) -> Self {
        Self {
            account: account.to_string(),
            ..Default::default()
        }
    }

    /// Check the config for contradictions
    pub fn validate(&self) -> Result<()> {
        if self.account.trim().is_empty() {
            return Err(Error::InvalidConfig("account must be provided".into()));
        }
        if self.threads == 0 {
            return Err(Error::InvalidConfig("threads must be at least 1".into()));
        }
        if let Some(sync) = &self.sync_resources
            && sync.is_empty()
        {
            return Err(Error::InvalidConfig(
                "sync_resources must have at least one resource type".into(),
            ));
        }
        match self.scope {
            BlueprintScope::Account if self.database.is_some() || self.schema.is_some() => {
                Err(Error::InvalidConfig(format!(
                    "cannot specify a database or schema when using account scope (database={:?}, schema={:?})",
                    self.database, self.schema
                )))
            }
            BlueprintScope::Database if self.schema.is_some() => Err(Error::InvalidConfig(
                "cannot specify a schema when using database scope".into(),
            )),
            _ => Ok(()),
        }
    }

    /// The resolved management scope
    pub fn management_scope(&self) -> ManagementScope {
        let database = self.database.as_deref().map(normalize_identifier);
        let schema = self.schema.as_deref().map(normalize_identifier);
        match self.scope {
            BlueprintScope::Account => ManagementScope::Account,
            BlueprintScope::Database => ManagementScope::Database { database },
            BlueprintScope::Schema => ManagementScope::Schema { database, schema },
        }
    }

    /// The resolved sync allow-list (empty when sync is off)
    pub fn sync_allowlist(&self) -> SyncAllowlist {
        self.sync_resources
            .iter()
            .flatten()
            .copied()
            .collect()
    }

    /// Defaults for `[database, schema]`, by position
    pub fn default_container(&self) -> [Option<&str>; 2] {
        [self.database.as_deref(), self.schema.as_deref()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Fqn;

    #[test]
    fn test_scope_config_validation() {
        let ok = BlueprintConfig {
            scope: BlueprintScope::Database,
            database: Some("foo".into()),
            ..BlueprintConfig::for_account("A")
        };
        assert!(ok.validate().is_ok());

        let db_with_schema = BlueprintConfig {
            scope: BlueprintScope::Database,
            schema: Some("bar".into()),
            ..BlueprintConfig::for_account("A")
        };
        assert!(db_with_schema.validate().is_err());

        let account_with_db = BlueprintConfig {
            database: Some("foo".into()),
            ..BlueprintConfig::for_account("A")
        };
        assert!(account_with_db.validate().is_err());
    }

    #[test]
    fn test_validation_of_basics() {
        assert!(BlueprintConfig::default().validate().is_err());
        let zero_threads = BlueprintConfig {
            threads: 0,
            ..BlueprintConfig::for_account("A")
        };
        assert!(zero_threads.validate().is_err());
        let empty_sync = BlueprintConfig {
            sync_resources: Some(vec![]),
            ..BlueprintConfig::for_account("A")
        };
        assert!(empty_sync.validate().is_err());
    }

    #[test]
    fn test_sync_allowlist_off_by_default() {
        let config = BlueprintConfig::for_account("A");
        assert!(config.sync_allowlist().is_empty());
        let config = BlueprintConfig {
            sync_resources: Some(vec![ResourceType::Role]),
            ..config
        };
        assert!(config.sync_allowlist().contains(ResourceType::Role));
        assert!(!config.sync_allowlist().contains(ResourceType::Grant));
    }

    #[test]
    fn test_database_scope_contains() {
        let scope = ManagementScope::Database {
            database: Some("DB1".into()),
        };
        let db = Urn::new("A", ResourceType::Database, Fqn::new("db1"));
        let other_db = Urn::new("A", ResourceType::Database, Fqn::new("db2"));
        let schema = Urn::new(
            "A",
            ResourceType::Schema,
            Fqn::in_container(&["DB1".into()], "S"),
        );
        assert!(scope.contains(&db));
        assert!(!scope.contains(&other_db));
        assert!(scope.contains(&schema));
        assert!(!scope.contains(&Urn::role("A", "R")));
    }

    #[test]
    fn test_schema_scope_contains() {
        let scope = ManagementScope::Schema {
            database: Some("DB1".into()),
            schema: Some("S".into()),
        };
        let table = Urn::new(
            "A",
            ResourceType::Table,
            Fqn::in_container(&["DB1".into(), "S".into()], "T"),
        );
        let elsewhere = Urn::new(
            "A",
            ResourceType::Table,
            Fqn::in_container(&["DB1".into(), "OTHER".into()], "T"),
        );
        assert!(scope.contains(&table));
        assert!(!scope.contains(&elsewhere));
        assert!(!scope.contains(&Urn::new("A", ResourceType::Database, Fqn::new("DB1"))));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: BlueprintConfig = serde_json::from_value(serde_json::json!({
            "account": "ABCD123",
            "scope": "database",
            "database": "analytics",
            "sync_resources": ["role", "grant"],
            "grant_fetch": "bulk",
            "threads": 4
        }))
        .unwrap();
        assert_eq!(config.account, "ABCD123");
        assert_eq!(config.scope, BlueprintScope::Database);
        assert_eq!(config.grant_fetch, GrantFetchStrategy::Bulk);
        assert_eq!(config.threads, 4);
        assert!(config.use_secondary_roles);
        assert_eq!(
            config.management_scope(),
            ManagementScope::Database {
                database: Some("ANALYTICS".into())
            }
        );
    }
}
