//! Account-level and database-level objects

use serde_json::Value;

use super::{
    Lifecycle, Mutability, SYSADMIN, USERADMIN, alter_statements, delta, object_ref,
    property_clause, uppercase_fields,
};
use crate::error::{Error, Result};
use crate::identity::{ResourceType, Urn};
use crate::types::{Action, Properties};

/// The account itself: always exists, can only be altered
pub struct AccountLifecycle;

impl Lifecycle for AccountLifecycle {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Account
    }

    fn render(
        &self,
        urn: &Urn,
        action: Action,
        before: Option<&Properties>,
        after: Option<&Properties>,
    ) -> Result<Vec<String>> {
        match (action, after) {
            (Action::Change, Some(after)) => Ok(alter_statements("ACCOUNT", &delta(before, after))),
            (Action::Add, _) => Ok(Vec::new()),
            _ => Err(Error::Execution {
                urn: urn.clone(),
                message: format!("the account cannot be targeted by {action}"),
            }),
        }
    }

    fn default_role(&self) -> &'static str {
        "ACCOUNTADMIN"
    }

    fn has_owner(&self) -> bool {
        false
    }

    fn supports_remove(&self) -> bool {
        false
    }

    fn always_exists(&self) -> bool {
        true
    }
}

/// A named object created with `CREATE <KIND> <name> KEY = value ...`
///
/// Covers the types whose syntax is uniform: databases, schemas, roles,
/// database roles, warehouses and users. Boolean `flags` render as keywords
/// between `CREATE` and the kind (`CREATE TRANSIENT DATABASE`).
pub struct ObjectLifecycle {
    resource_type: ResourceType,
    default_role: &'static str,
    flags: &'static [&'static str],
    immutable: &'static [&'static str],
    forbids_replace: &'static [&'static str],
    write_only: &'static [&'static str],
    normalize: fn(&mut Properties),
    enterprise: fn(&Properties) -> Vec<&'static str>,
}

fn no_normalization(_: &mut Properties) {}

fn above_one(properties: &Properties, key: &str) -> bool {
    properties.get(key).and_then(Value::as_u64).is_some_and(|n| n > 1)
}

fn no_enterprise_features(_: &Properties) -> Vec<&'static str> {
    Vec::new()
}

fn extended_retention(properties: &Properties) -> Vec<&'static str> {
    if above_one(properties, "data_retention_time_in_days") {
        vec!["data_retention_time_in_days"]
    } else {
        Vec::new()
    }
}

fn multi_cluster_warehouse(properties: &Properties) -> Vec<&'static str> {
    let mut features: Vec<&'static str> = ["min_cluster_count", "max_cluster_count"]
        .into_iter()
        .filter(|key| above_one(properties, key))
        .collect();
    if properties.get("enable_query_acceleration") == Some(&Value::Bool(true)) {
        features.push("enable_query_acceleration");
    }
    features
}

fn normalize_warehouse(properties: &mut Properties) {
    uppercase_fields(properties, &["warehouse_type", "scaling_policy"]);
    if let Some(Value::String(size)) = properties.get_mut("warehouse_size") {
        *size = size.to_ascii_uppercase().replace(['-', '_'], "");
    }
}

fn normalize_user(properties: &mut Properties) {
    uppercase_fields(
        properties,
        &["default_role", "default_warehouse", "default_secondary_roles"],
    );
    if let Some(Value::String(login)) = properties.get_mut("login_name") {
        *login = login.to_ascii_uppercase();
    }
}

impl ObjectLifecycle {
    pub fn database() -> Self {
        Self {
            resource_type: ResourceType::Database,
            default_role: SYSADMIN,
            flags: &["transient"],
            immutable: &[],
            forbids_replace: &["transient"],
            write_only: &[],
            normalize: no_normalization,
            enterprise: extended_retention,
        }
    }

    pub fn schema() -> Self {
        Self {
            resource_type: ResourceType::Schema,
            default_role: SYSADMIN,
            flags: &["transient"],
            immutable: &[],
            forbids_replace: &["transient"],
            write_only: &[],
            normalize: no_normalization,
            enterprise: extended_retention,
        }
    }

    pub fn role() -> Self {
        Self {
            resource_type: ResourceType::Role,
            default_role: USERADMIN,
            flags: &[],
            immutable: &[],
            forbids_replace: &[],
            write_only: &[],
            normalize: no_normalization,
            enterprise: no_enterprise_features,
        }
    }

    pub fn database_role() -> Self {
        Self {
            resource_type: ResourceType::DatabaseRole,
            default_role: SYSADMIN,
            flags: &[],
            immutable: &[],
            forbids_replace: &[],
            write_only: &[],
            normalize: no_normalization,
            enterprise: no_enterprise_features,
        }
    }

    pub fn warehouse() -> Self {
        Self {
            resource_type: ResourceType::Warehouse,
            default_role: SYSADMIN,
            flags: &[],
            immutable: &["initially_suspended"],
            forbids_replace: &[],
            write_only: &[],
            normalize: normalize_warehouse,
            enterprise: multi_cluster_warehouse,
        }
    }

    pub fn user() -> Self {
        Self {
            resource_type: ResourceType::User,
            default_role: USERADMIN,
            flags: &[],
            immutable: &[],
            forbids_replace: &[],
            write_only: &["password"],
            normalize: normalize_user,
            enterprise: no_enterprise_features,
        }
    }

    fn create(&self, urn: &Urn, after: &Properties) -> String {
        let prefix: String = self
            .flags
            .iter()
            .filter(|f| after.get(**f) == Some(&Value::Bool(true)))
            .map(|f| format!("{} ", f.to_ascii_uppercase()))
            .collect();
        format!(
            "CREATE {prefix}{}{}",
            object_ref(urn),
            property_clause(after, self.flags)
        )
    }
}

impl Lifecycle for ObjectLifecycle {
    fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    fn render(
        &self,
        urn: &Urn,
        action: Action,
        before: Option<&Properties>,
        after: Option<&Properties>,
    ) -> Result<Vec<String>> {
        let statements = match (action, after) {
            (Action::Add, Some(after)) => vec![self.create(urn, after)],
            (Action::Change, Some(after)) => {
                let changes: Vec<_> = delta(before, after)
                    .into_iter()
                    .filter(|(k, _)| !self.write_only.contains(k))
                    .collect();
                alter_statements(&object_ref(urn), &changes)
            }
            (Action::Remove, _) => vec![format!("DROP {}", object_ref(urn))],
            _ => {
                return Err(Error::Execution {
                    urn: urn.clone(),
                    message: format!("cannot render {action} without properties"),
                });
            }
        };
        Ok(statements)
    }

    fn field_mutability(&self, field: &str) -> Mutability {
        if self.forbids_replace.contains(&field) {
            Mutability::ForbidsReplace
        } else if self.immutable.contains(&field) {
            Mutability::Immutable
        } else {
            Mutability::Mutable
        }
    }

    fn default_role(&self) -> &'static str {
        self.default_role
    }

    fn write_only_fields(&self) -> &'static [&'static str] {
        self.write_only
    }

    fn normalize(&self, properties: &mut Properties) {
        (self.normalize)(properties);
    }

    fn enterprise_features(&self, properties: &Properties) -> Vec<&'static str> {
        (self.enterprise)(properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Fqn;
    use serde_json::json;

    fn props(value: serde_json::Value) -> Properties {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_create_warehouse() {
        let urn = Urn::new("A", ResourceType::Warehouse, Fqn::new("wh"));
        let statements = ObjectLifecycle::warehouse()
            .render(
                &urn,
                Action::Add,
                None,
                Some(&props(json!({"warehouse_size": "XSMALL", "auto_suspend": 60, "owner": "SYSADMIN"}))),
            )
            .unwrap();
        assert_eq!(
            statements,
            vec!["CREATE WAREHOUSE WH AUTO_SUSPEND = 60 WAREHOUSE_SIZE = XSMALL"]
        );
    }

    #[test]
    fn test_transient_database_flag() {
        let urn = Urn::new("A", ResourceType::Database, Fqn::new("scratch"));
        let statements = ObjectLifecycle::database()
            .render(&urn, Action::Add, None, Some(&props(json!({"transient": true}))))
            .unwrap();
        assert_eq!(statements, vec!["CREATE TRANSIENT DATABASE SCRATCH"]);
        assert_eq!(
            ObjectLifecycle::database().field_mutability("transient"),
            Mutability::ForbidsReplace
        );
    }

    #[test]
    fn test_drop_database_role() {
        let urn = Urn::new(
            "A",
            ResourceType::DatabaseRole,
            Fqn::in_container(&["DB".into()], "reader"),
        );
        let statements = ObjectLifecycle::database_role()
            .render(&urn, Action::Remove, Some(&Properties::new()), None)
            .unwrap();
        assert_eq!(statements, vec!["DROP DATABASE ROLE DB.READER"]);
    }

    #[test]
    fn test_enterprise_features() {
        let warehouse = ObjectLifecycle::warehouse();
        assert!(warehouse.enterprise_features(&props(json!({"min_cluster_count": 1}))).is_empty());
        assert_eq!(
            warehouse.enterprise_features(&props(json!({"max_cluster_count": 3, "enable_query_acceleration": true}))),
            vec!["max_cluster_count", "enable_query_acceleration"]
        );
        assert_eq!(
            ObjectLifecycle::schema().enterprise_features(&props(json!({"data_retention_time_in_days": 30}))),
            vec!["data_retention_time_in_days"]
        );
        assert!(ObjectLifecycle::role().enterprise_features(&props(json!({}))).is_empty());
    }

    #[test]
    fn test_warehouse_size_normalization() {
        let mut p = props(json!({"warehouse_size": "x-small"}));
        ObjectLifecycle::warehouse().normalize(&mut p);
        assert_eq!(p["warehouse_size"], json!("XSMALL"));
    }

    #[test]
    fn test_user_password_is_write_only() {
        let users = ObjectLifecycle::user();
        let mut p = props(json!({"password": "hunter2", "default_role": "analyst"}));
        users.normalize(&mut p);
        assert_eq!(p["default_role"], json!("ANALYST"));
        assert!(users.write_only_fields().contains(&"password"));

        let urn = Urn::new("A", ResourceType::User, Fqn::new("ann"));
        let create = users.render(&urn, Action::Add, None, Some(&p)).unwrap();
        assert_eq!(create, vec!["CREATE USER ANN DEFAULT_ROLE = ANALYST PASSWORD = 'hunter2'"]);
        let alter = users
            .render(&urn, Action::Change, Some(&Properties::new()), Some(&p))
            .unwrap();
        assert_eq!(alter, vec!["ALTER USER ANN SET DEFAULT_ROLE = ANALYST"]);
    }

    #[test]
    fn test_account_is_never_removed() {
        assert!(!AccountLifecycle.supports_remove());
        let urn = Urn::account("A");
        assert!(
            AccountLifecycle
                .render(&urn, Action::Remove, Some(&Properties::new()), None)
                .is_err()
        );
    }
}
