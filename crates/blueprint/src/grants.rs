//! Grant expansion and grant listing
//!
//! A grant declaration names a target, a grantee and one or more privileges.
//! The engine tracks each privilege as its own resource so that adding or
//! revoking one privilege never touches the others. `ALL` is expanded to the
//! concrete privilege set of the target type, both for declarations and for
//! what the remote reports, so the two sides always compare like with like.

use log::{debug, warn};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::GrantFetchStrategy;
use crate::declaration::{NodeSpec, ResourceDeclaration};
use crate::error::{Error, FetchErrorKind, Result};
use crate::fetch::{FetchScope, RemoteRecord, RemoteSource};
use crate::identity::{ContainerDepth, Fqn, ResourceType, Urn};
use crate::types::Properties;

/// Name every grant-shaped URN carries; grants are identified by parameters
pub const GRANT_NAME: &str = "GRANT";

/// Privilege that is modelled through the `owner` property, never as a grant
pub const OWNERSHIP: &str = "OWNERSHIP";

/// The concrete privileges `ALL` stands for on a target type
pub fn all_privileges_for(on_type: ResourceType) -> &'static [&'static str] {
    match on_type {
        ResourceType::Account => &[
            "CREATE DATABASE",
            "CREATE ROLE",
            "CREATE USER",
            "CREATE WAREHOUSE",
            "EXECUTE TASK",
            "MANAGE GRANTS",
            "MONITOR EXECUTION",
            "MONITOR USAGE",
        ],
        ResourceType::Database => &[
            "APPLYBUDGET",
            "CREATE DATABASE ROLE",
            "CREATE SCHEMA",
            "MODIFY",
            "MONITOR",
            "USAGE",
        ],
        ResourceType::Schema => &[
            "ADD SEARCH OPTIMIZATION",
            "APPLYBUDGET",
            "CREATE FUNCTION",
            "CREATE PROCEDURE",
            "CREATE SEQUENCE",
            "CREATE STAGE",
            "CREATE STREAM",
            "CREATE TABLE",
            "CREATE TASK",
            "CREATE VIEW",
            "MODIFY",
            "MONITOR",
            "USAGE",
        ],
        ResourceType::Warehouse => &["APPLYBUDGET", "MODIFY", "MONITOR", "OPERATE", "USAGE"],
        ResourceType::Table => &[
            "DELETE",
            "EVOLVE SCHEMA",
            "INSERT",
            "REBUILD",
            "REFERENCES",
            "SELECT",
            "TRUNCATE",
            "UPDATE",
        ],
        ResourceType::View => &["REFERENCES", "SELECT"],
        ResourceType::User => &["MONITOR"],
        _ => &[],
    }
}

/// Normalize a `priv` value (string or list) into concrete privilege names
///
/// `ALL` (or `ALL PRIVILEGES`) expands to the target type's set. Duplicates
/// collapse; order of first appearance is kept.
pub fn expand_privileges(label: &str, value: Option<&Value>, on_type: ResourceType) -> Result<Vec<String>> {
    let raw: Vec<String> = match value {
        Some(Value::String(p)) => vec![p.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(p) => Ok(p.clone()),
                other => Err(Error::invalid(label, format!("privilege must be a string, got {other}"))),
            })
            .collect::<Result<_>>()?,
        Some(other) => {
            return Err(Error::invalid(label, format!("priv must be a string or list, got {other}")));
        }
        None => return Err(Error::invalid(label, "missing 'priv'")),
    };
    if raw.is_empty() {
        return Err(Error::invalid(label, "priv list must not be empty"));
    }

    let mut seen = BTreeSet::new();
    let mut privileges = Vec::new();
    for p in raw {
        let p = p.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
        if p == OWNERSHIP {
            return Err(Error::invalid(label, "ownership is declared with the 'owner' property"));
        }
        let expanded: Vec<String> = if p == "ALL" || p == "ALL PRIVILEGES" {
            let set = all_privileges_for(on_type);
            if set.is_empty() {
                return Err(Error::invalid(label, format!("ALL has no meaning on {on_type}")));
            }
            set.iter().map(|s| (*s).to_string()).collect()
        } else {
            vec![p]
        };
        for p in expanded {
            if seen.insert(p.clone()) {
                privileges.push(p);
            }
        }
    }
    Ok(privileges)
}

fn grant_option(decl: &ResourceDeclaration) -> Result<bool> {
    match decl.properties.get("grant_option") {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(Error::invalid(decl.label(), format!("grant_option must be a boolean, got {other}"))),
    }
}

fn check_grantee(decl: &ResourceDeclaration, to: &Urn, allowed: &[ResourceType]) -> Result<()> {
    if allowed.contains(&to.resource_type) {
        Ok(())
    } else {
        Err(Error::invalid(
            decl.label(),
            format!("cannot grant to a {}", to.resource_type),
        ))
    }
}

/// URN of one object-level privilege grant
pub fn grant_urn(account: &str, privilege: &str, on: &Urn, to: &Urn) -> Urn {
    Urn::new(
        account,
        ResourceType::Grant,
        Fqn::new(GRANT_NAME)
            .with_param("on", on.to_ref())
            .with_param("priv", privilege)
            .with_param("to", to.to_ref()),
    )
}

/// URN of one future or all-objects grant
pub fn scoped_grant_urn(
    account: &str,
    resource_type: ResourceType,
    privilege: &str,
    on_type: ResourceType,
    container: &Urn,
    to: &Urn,
) -> Urn {
    Urn::new(
        account,
        resource_type,
        Fqn::new(GRANT_NAME)
            .with_param("in", container.to_ref())
            .with_param("on_type", on_type.as_str())
            .with_param("priv", privilege)
            .with_param("to", to.to_ref()),
    )
}

/// URN of a role granted to a role or a user
pub fn role_grant_urn(account: &str, role: &Urn, to: &Urn) -> Urn {
    let key = match to.resource_type {
        ResourceType::User => "user",
        _ => "role",
    };
    Urn::new(
        account,
        ResourceType::RoleGrant,
        Fqn::new(role.name()).with_param(key, to.fqn.qualified_name()),
    )
}

/// Grant properties; privilege, target and grantee live in the URN
fn grant_properties(grant_option: bool) -> Properties {
    let mut props = Properties::new();
    props.insert("grant_option".into(), Value::Bool(grant_option));
    props
}

fn node(urn: Urn, properties: Properties, deps: &[&Urn]) -> NodeSpec {
    NodeSpec {
        urn,
        properties,
        dependencies: deps
            .iter()
            .filter(|d| d.resource_type != ResourceType::Account)
            .map(|d| (*d).clone())
            .collect(),
    }
}

/// Expand a grant-shaped declaration into one node per privilege
pub fn expand_declaration(decl: &ResourceDeclaration, account: &str) -> Result<Vec<NodeSpec>> {
    let label = decl.label();
    match decl.resource_type {
        ResourceType::Grant => {
            let on = decl.required_reference("on", account)?;
            let to = decl.required_reference("to", account)?;
            check_grantee(decl, &to, &[ResourceType::Role, ResourceType::DatabaseRole])?;
            let option = grant_option(decl)?;
            let privileges = expand_privileges(&label, decl.properties.get("priv"), on.resource_type)?;
            Ok(privileges
                .iter()
                .map(|p| node(grant_urn(account, p, &on, &to), grant_properties(option), &[&on, &to]))
                .collect())
        }
        ResourceType::FutureGrant | ResourceType::GrantOnAll => {
            let container = decl.required_reference("in", account)?;
            if !matches!(
                container.resource_type,
                ResourceType::Database | ResourceType::Schema
            ) {
                return Err(Error::invalid(label, "'in' must be a database or a schema"));
            }
            let to = decl.required_reference("to", account)?;
            check_grantee(decl, &to, &[ResourceType::Role, ResourceType::DatabaseRole])?;
            let on_type: ResourceType = match decl.properties.get("on_type") {
                Some(Value::String(t)) => t.parse()?,
                _ => return Err(Error::invalid(label, "missing 'on_type'")),
            };
            if on_type.depth() == ContainerDepth::Account || on_type.is_grant() {
                return Err(Error::invalid(label, format!("{on_type} cannot be granted in bulk")));
            }
            let option = grant_option(decl)?;
            let privileges = expand_privileges(&label, decl.properties.get("priv"), on_type)?;
            Ok(privileges
                .iter()
                .map(|p| {
                    node(
                        scoped_grant_urn(account, decl.resource_type, p, on_type, &container, &to),
                        grant_properties(option),
                        &[&container, &to],
                    )
                })
                .collect())
        }
        ResourceType::RoleGrant => {
            let role = decl.required_reference("role", account)?;
            let to = decl.required_reference("to", account)?;
            if role.resource_type != ResourceType::Role {
                return Err(Error::invalid(label, "'role' must reference a role"));
            }
            check_grantee(decl, &to, &[ResourceType::Role, ResourceType::User])?;
            Ok(vec![node(role_grant_urn(account, &role, &to), Properties::new(), &[&role, &to])])
        }
        other => Err(Error::invalid(label, format!("{other} is not a grant type"))),
    }
}

/// Bring remote grant records into the shape declarations expand to
///
/// `ALL` rows are split into one record per concrete privilege and
/// `OWNERSHIP` rows are dropped (ownership is read from the object itself).
pub fn normalize_remote(records: Vec<RemoteRecord>) -> Vec<RemoteRecord> {
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        let privilege = record.urn.param("priv").map(|p| p.to_ascii_uppercase());
        let Some(privilege) = privilege else {
            out.push(record);
            continue;
        };
        if privilege == OWNERSHIP {
            continue;
        }
        if privilege != "ALL" && privilege != "ALL PRIVILEGES" {
            out.push(record);
            continue;
        }
        let on_type = target_type(&record.urn);
        for p in on_type.map(all_privileges_for).unwrap_or_default() {
            let mut urn = record.urn.clone();
            urn.fqn.params.insert("priv".into(), (*p).to_string());
            out.push(RemoteRecord {
                urn,
                properties: record.properties.clone(),
            });
        }
    }
    out
}

/// Type of the objects a grant URN applies privileges to
pub fn target_type(urn: &Urn) -> Option<ResourceType> {
    if let Some(on_type) = urn.param("on_type") {
        return on_type.parse().ok();
    }
    urn.param("on")
        .and_then(|on| on.split_once('/'))
        .and_then(|(kind, _)| kind.parse().ok())
}

/// List object grants with the configured strategy
///
/// The bulk strategy reads one account-wide view. If the session lacks access
/// to it the listing falls back to one query per grantee.
pub fn fetch_object_grants(source: &dyn RemoteSource, scope: &FetchScope) -> Result<Vec<RemoteRecord>> {
    if scope.grant_strategy == GrantFetchStrategy::Bulk {
        match source.grants_bulk() {
            Ok(records) => {
                debug!("Fetched {} grants in bulk", records.len());
                return Ok(normalize_remote(records));
            }
            Err(e) if e.kind == FetchErrorKind::AccessDenied => {
                warn!("Bulk grant listing unavailable ({e}), falling back to per-grantee listing");
            }
            Err(e) => return Err(Error::fetch(ResourceType::Grant, e.message)),
        }
    }

    let mut merged = BTreeMap::new();
    for grantee in &scope.grantees {
        let records = source
            .grants_to(grantee)
            .map_err(|e| Error::fetch(ResourceType::Grant, format!("{grantee}: {}", e.message)))?;
        for record in records {
            merged.insert(record.urn.clone(), record);
        }
    }
    debug!(
        "Fetched {} grants for {} grantee(s)",
        merged.len(),
        scope.grantees.len()
    );
    Ok(normalize_remote(merged.into_values().collect()))
}

/// List future or all-objects grants in every container of interest
pub fn fetch_scoped_grants(
    resource_type: ResourceType,
    source: &dyn RemoteSource,
    scope: &FetchScope,
) -> Result<Vec<RemoteRecord>> {
    let mut merged = BTreeMap::new();
    for container in &scope.containers {
        let records = source
            .scoped_grants(resource_type, container)
            .map_err(|e| Error::fetch(resource_type, format!("{container}: {}", e.message)))?;
        for record in records {
            merged.insert(record.urn.clone(), record);
        }
    }
    Ok(normalize_remote(merged.into_values().collect()))
}

/// Grantee named by a grant URN (`to=` for object grants, `role=`/`user=` for role grants)
pub fn grantee_of(urn: &Urn) -> Option<Urn> {
    if let Some(to) = urn.param("to") {
        return Urn::from_ref(&urn.account, to).ok();
    }
    if let Some(role) = urn.param("role") {
        return Some(Urn::role(&urn.account, role));
    }
    urn.param("user")
        .map(|user| Urn::new(&urn.account, ResourceType::User, Fqn::new(user)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::Reference;
    use crate::error::FetchError;
    use crate::fetch::StaticSource;
    use serde_json::json;

    fn usage_grant(privs: Value) -> ResourceDeclaration {
        ResourceDeclaration::new(ResourceType::Grant, "")
            .with("priv", privs)
            .with_ref("on", Reference::named(ResourceType::Warehouse, "wh"))
            .with_ref("to", Reference::named(ResourceType::Role, "analyst"))
    }

    #[test]
    fn test_grant_expands_per_privilege() {
        let specs = expand_declaration(&usage_grant(json!(["usage", "monitor"])), "A").unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(
            specs[0].urn.to_string(),
            "urn::A:grant/GRANT?on=warehouse/WH&priv=USAGE&to=role/ANALYST"
        );
        assert_eq!(specs[1].urn.param("priv"), Some("MONITOR"));
        assert!(specs[0].dependencies.contains(&Urn::role("A", "ANALYST")));
        assert_eq!(specs[0].properties["grant_option"], json!(false));
    }

    #[test]
    fn test_all_expands_to_concrete_set() {
        let specs = expand_declaration(&usage_grant(json!("ALL")), "A").unwrap();
        assert_eq!(specs.len(), all_privileges_for(ResourceType::Warehouse).len());
    }

    #[test]
    fn test_priv_validation() {
        assert!(expand_declaration(&usage_grant(json!([])), "A").is_err());
        assert!(expand_declaration(&usage_grant(json!("ownership")), "A").is_err());
        assert!(expand_declaration(&usage_grant(json!(3)), "A").is_err());
        let specs = expand_declaration(&usage_grant(json!(["usage", "USAGE"])), "A").unwrap();
        assert_eq!(specs.len(), 1);
    }

    #[test]
    fn test_account_target_is_not_a_dependency() {
        let decl = ResourceDeclaration::new(ResourceType::Grant, "")
            .with("priv", "create database")
            .with_ref("on", Reference::named(ResourceType::Account, "A"))
            .with_ref("to", Reference::named(ResourceType::Role, "r"));
        let specs = expand_declaration(&decl, "A").unwrap();
        assert_eq!(specs[0].dependencies.len(), 1);
        assert_eq!(specs[0].urn.param("on"), Some("account/ACCOUNT"));
    }

    #[test]
    fn test_future_grant_urn() {
        let decl = ResourceDeclaration::new(ResourceType::FutureGrant, "")
            .with("priv", "select")
            .with("on_type", "table")
            .with_ref(
                "in",
                Reference::Named {
                    resource_type: ResourceType::Schema,
                    name: "raw".into(),
                    container: vec!["db".into()],
                },
            )
            .with_ref("to", Reference::named(ResourceType::Role, "reader"));
        let specs = expand_declaration(&decl, "A").unwrap();
        assert_eq!(
            specs[0].urn.to_string(),
            "urn::A:future_grant/GRANT?in=schema/DB.RAW&on_type=table&priv=SELECT&to=role/READER"
        );
        assert_eq!(target_type(&specs[0].urn), Some(ResourceType::Table));
    }

    #[test]
    fn test_role_grant_urn() {
        let decl = ResourceDeclaration::new(ResourceType::RoleGrant, "")
            .with_ref("role", Reference::named(ResourceType::Role, "child"))
            .with_ref("to", Reference::named(ResourceType::User, "ann"));
        let specs = expand_declaration(&decl, "A").unwrap();
        assert_eq!(specs[0].urn.to_string(), "urn::A:role_grant/CHILD?user=ANN");
        assert_eq!(
            grantee_of(&specs[0].urn),
            Some(Urn::new("A", ResourceType::User, Fqn::new("ANN")))
        );
    }

    #[test]
    fn test_normalize_remote_splits_all_and_drops_ownership() {
        let on = Urn::new("A", ResourceType::View, Fqn::in_container(&["D".into(), "S".into()], "V"));
        let to = Urn::role("A", "R");
        let records = vec![
            RemoteRecord::new(grant_urn("A", "ALL", &on, &to), grant_properties(true)),
            RemoteRecord::new(grant_urn("A", "OWNERSHIP", &on, &to), grant_properties(false)),
        ];
        let normalized = normalize_remote(records);
        let privs: Vec<&str> = normalized.iter().filter_map(|r| r.urn.param("priv")).collect();
        assert_eq!(privs, vec!["REFERENCES", "SELECT"]);
        assert_eq!(normalized[1].properties["grant_option"], json!(true));
    }

    #[test]
    fn test_bulk_fetch_falls_back_on_access_denied() {
        let on = Urn::new("A", ResourceType::Warehouse, Fqn::new("WH"));
        let to = Urn::role("A", "R");
        let source = StaticSource::new(vec![RemoteRecord::new(
            grant_urn("A", "USAGE", &on, &to),
            grant_properties(false),
        )])
        .with_bulk_error(FetchError::access_denied("ACCOUNT_USAGE not granted"));
        let scope = FetchScope {
            grant_strategy: GrantFetchStrategy::Bulk,
            grantees: vec![to],
            ..FetchScope::default()
        };
        let records = fetch_object_grants(&source, &scope).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_bulk_fetch_surfaces_other_errors() {
        let source = StaticSource::new(vec![]).with_bulk_error(FetchError::transport("connection reset"));
        let scope = FetchScope {
            grant_strategy: GrantFetchStrategy::Bulk,
            ..FetchScope::default()
        };
        let err = fetch_object_grants(&source, &scope).unwrap_err();
        assert!(matches!(err, Error::RemoteFetch { .. }));
    }
}
