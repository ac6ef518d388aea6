//! Desired-vs-remote comparison
//!
//! Every graph node becomes exactly one change. Remote records that nothing
//! declares become REMOVE changes, but only for types on the sync allow-list
//! and never for objects the account manages itself.

use log::{debug, warn};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::config::BlueprintConfig;
use crate::error::{Error, Result};
use crate::fetch::{RemoteRecord, RemoteSnapshot};
use crate::graph::{ResourceGraph, ResourceNode};
use crate::identity::{
    ResourceType, SYSTEM_SCHEMAS, Urn, is_system_role, normalize_identifier,
};
use crate::lifecycle::{Lifecycle, LifecycleRegistry, Mutability, ownership_statement, values_match};
use crate::plan::{Plan, ResourceChange, SessionRequirements, Statement};
use crate::types::{Action, Properties};

/// Database every account ships with
const SYSTEM_DATABASE: &str = "SNOWFLAKE";

/// Compare the desired graph with a remote snapshot
pub fn diff(
    graph: &ResourceGraph,
    snapshot: &RemoteSnapshot,
    registry: &LifecycleRegistry,
    config: &BlueprintConfig,
) -> Result<Plan> {
    validate_external_references(graph, snapshot)?;

    let mut changes = Vec::with_capacity(graph.len());
    for node in graph.nodes() {
        let lifecycle = registry.get(node.urn.resource_type)?;
        let implicit = implicit_record(&node.urn, graph, snapshot);
        let remote = snapshot.get(&node.urn).or(implicit.as_ref());
        changes.push(diff_node(node, remote, lifecycle, config)?);
    }

    let base_level = graph.max_level().map_or(0, |l| l + 1);
    changes.extend(plan_removals(graph, snapshot, registry, config, base_level)?);

    let plan = Plan::new(changes);
    let summary = plan.summary();
    debug!(
        "Diff: {} actionable, {} unchanged, {} rejected",
        summary.actionable(),
        summary.noop,
        summary.rejected
    );
    Ok(plan)
}

/// Objects that exist without being created by anyone
fn exists_implicitly(urn: &Urn, graph: &ResourceGraph, snapshot: &RemoteSnapshot) -> bool {
    match urn.resource_type {
        ResourceType::Account => true,
        ResourceType::Role => is_system_role(urn.name()),
        ResourceType::Database => urn.name() == SYSTEM_DATABASE,
        ResourceType::Schema if SYSTEM_SCHEMAS.contains(&urn.name()) => urn
            .parent()
            .is_some_and(|db| graph.contains(&db) || snapshot.contains(&db) || db.name() == SYSTEM_DATABASE),
        _ => false,
    }
}

/// Empty stand-in for a declared object the account creates on its own
///
/// A database comes with its PUBLIC and INFORMATION_SCHEMA schemas, so
/// declaring one of them never produces a CREATE.
fn implicit_record(urn: &Urn, graph: &ResourceGraph, snapshot: &RemoteSnapshot) -> Option<RemoteRecord> {
    (!snapshot.contains(urn) && exists_implicitly(urn, graph, snapshot))
        .then(|| RemoteRecord::new(urn.clone(), Properties::new()))
}

/// Every reference outside the manifest must exist remotely
pub fn validate_external_references(graph: &ResourceGraph, snapshot: &RemoteSnapshot) -> Result<()> {
    for node in graph.nodes() {
        for reference in &node.external {
            if snapshot.contains(reference) || exists_implicitly(reference, graph, snapshot) {
                continue;
            }
            return Err(Error::UnresolvedReference {
                from: node.urn.clone(),
                reference: reference.clone(),
            });
        }
    }
    Ok(())
}

fn owner_of(properties: &Properties) -> Option<String> {
    properties
        .get("owner")
        .and_then(Value::as_str)
        .map(normalize_identifier)
}

fn canonical(lifecycle: &dyn Lifecycle, properties: &Properties) -> Properties {
    let mut properties = properties.clone();
    lifecycle.normalize(&mut properties);
    if lifecycle.has_owner() {
        let owner = owner_of(&properties).unwrap_or_else(|| lifecycle.default_role().to_string());
        properties.insert("owner".into(), Value::String(owner));
    } else {
        properties.remove("owner");
    }
    properties
}

/// Role that issues the create, and the owner to hand over to afterwards
///
/// System-role owners create directly. Any other owner may not exist yet
/// when the create runs, so the type's default role creates and ownership
/// is transferred in the same change.
fn creator<'a>(lifecycle: &dyn Lifecycle, desired: &'a Properties) -> (String, Option<&'a str>) {
    match desired.get("owner").and_then(Value::as_str) {
        Some(owner) if lifecycle.has_owner() && !is_system_role(owner) => {
            (lifecycle.default_role().to_string(), Some(owner))
        }
        Some(owner) if lifecycle.has_owner() => (owner.to_string(), None),
        _ => (lifecycle.default_role().to_string(), None),
    }
}

/// Role that currently controls an existing resource
fn controller(lifecycle: &dyn Lifecycle, current: &Properties) -> String {
    if lifecycle.has_owner()
        && let Some(owner) = current.get("owner").and_then(Value::as_str)
    {
        return owner.to_string();
    }
    lifecycle.default_role().to_string()
}

fn statements(role: &str, sql: Vec<String>) -> impl Iterator<Item = Statement> + '_ {
    sql.into_iter().map(move |s| Statement::new(role, s))
}

fn create_statements(lifecycle: &dyn Lifecycle, urn: &Urn, desired: &Properties) -> Result<Vec<Statement>> {
    let (role, transfer) = creator(lifecycle, desired);
    let mut out: Vec<Statement> = statements(&role, lifecycle.render(urn, Action::Add, None, Some(desired))?).collect();
    if let Some(owner) = transfer {
        out.push(Statement::new(&role, ownership_statement(urn, owner)));
    }
    Ok(out)
}

fn session_for(lifecycle: &dyn Lifecycle, urn: &Urn, desired: &Properties, config: &BlueprintConfig) -> SessionRequirements {
    let warehouse = if lifecycle.needs_warehouse(desired) {
        config.warehouse.as_deref().map(normalize_identifier)
    } else {
        None
    };
    let schema = if lifecycle.needs_schema_context() {
        urn.fqn.database.clone().zip(urn.fqn.schema.clone())
    } else {
        None
    };
    SessionRequirements { warehouse, schema }
}

/// Decide the one change that brings a node's remote state to its desired state
pub fn diff_node(
    node: &ResourceNode,
    remote: Option<&RemoteRecord>,
    lifecycle: &dyn Lifecycle,
    config: &BlueprintConfig,
) -> Result<ResourceChange> {
    let urn = &node.urn;
    let desired = canonical(lifecycle, &node.properties);
    let mut change = ResourceChange {
        urn: urn.clone(),
        action: Action::Noop,
        level: node.level,
        before: None,
        after: None,
        statements: Vec::new(),
        session: session_for(lifecycle, urn, &desired, config),
        depends_on: node.dependencies.iter().cloned().collect(),
        rejection: None,
    };

    let current = match remote {
        Some(record) => canonical(lifecycle, &record.properties),
        None if lifecycle.always_exists() => canonical(lifecycle, &Properties::new()),
        None => {
            change.action = Action::Add;
            change.statements = create_statements(lifecycle, urn, &desired)?;
            change.after = Some(desired);
            return Ok(change);
        }
    };

    let write_only = lifecycle.write_only_fields();
    let changed: Vec<&str> = desired
        .iter()
        .filter(|(k, _)| k.as_str() != "owner" && !write_only.contains(&k.as_str()))
        .filter(|(k, v)| !values_match(v, current.get(*k)))
        .map(|(k, _)| k.as_str())
        .collect();
    let owner_changed = lifecycle.has_owner() && desired.get("owner") != current.get("owner");
    let role = controller(lifecycle, &current);

    let forbidden = changed
        .iter()
        .find(|k| lifecycle.field_mutability(k) == Mutability::ForbidsReplace);
    let immutable = changed
        .iter()
        .any(|k| lifecycle.field_mutability(k) == Mutability::Immutable);

    if let Some(field) = forbidden {
        let error = Error::ReplaceNotSupported {
            urn: urn.clone(),
            field: (*field).to_string(),
        };
        warn!("{error}");
        change.action = Action::Replace;
        change.rejection = Some(error.to_string());
    } else if immutable {
        change.action = Action::Replace;
        change.statements = statements(&role, lifecycle.render(urn, Action::Remove, Some(&current), None)?).collect();
        change
            .statements
            .extend(create_statements(lifecycle, urn, &desired)?);
    } else if !changed.is_empty() {
        change.action = Action::Change;
        change.statements = statements(
            &role,
            lifecycle.render(urn, Action::Change, Some(&current), Some(&desired))?,
        )
        .collect();
        if owner_changed && let Some(owner) = desired.get("owner").and_then(Value::as_str) {
            change.statements.push(Statement::new(&role, ownership_statement(urn, owner)));
        }
    } else if owner_changed && let Some(owner) = desired.get("owner").and_then(Value::as_str) {
        change.action = Action::Transfer;
        change.statements = vec![Statement::new(&role, ownership_statement(urn, owner))];
    }

    change.before = Some(current);
    change.after = Some(desired);
    Ok(change)
}

/// Objects that belong to the account itself and are never removed
fn is_system_managed(urn: &Urn) -> bool {
    let in_system_database = urn.fqn.database.as_deref() == Some(SYSTEM_DATABASE);
    match urn.resource_type {
        ResourceType::Account => true,
        ResourceType::Role => is_system_role(urn.name()),
        ResourceType::Database => urn.name() == SYSTEM_DATABASE,
        ResourceType::Schema => in_system_database || SYSTEM_SCHEMAS.contains(&urn.name()),
        ResourceType::RoleGrant => is_system_role(urn.name()),
        ResourceType::Grant | ResourceType::FutureGrant | ResourceType::GrantOnAll => urn
            .implied_dependencies()
            .iter()
            .filter(|d| !matches!(d.resource_type, ResourceType::Role | ResourceType::DatabaseRole | ResourceType::User))
            .any(is_system_managed),
        _ => in_system_database,
    }
}

/// REMOVE changes for undeclared remote records on the sync allow-list
///
/// Removals run after every other level. Within them, anything that depends
/// on another removed record (a grant on a role, a schema in a database)
/// goes first.
pub fn plan_removals(
    graph: &ResourceGraph,
    snapshot: &RemoteSnapshot,
    registry: &LifecycleRegistry,
    config: &BlueprintConfig,
    base_level: usize,
) -> Result<Vec<ResourceChange>> {
    let allowlist = config.sync_allowlist();
    if allowlist.is_empty() {
        return Ok(Vec::new());
    }
    let scope = config.management_scope();
    let referenced: BTreeSet<&Urn> = graph.external_references().collect();

    let mut candidates: BTreeMap<&Urn, &RemoteRecord> = BTreeMap::new();
    for record in snapshot.records() {
        let urn = &record.urn;
        if !allowlist.contains(urn.resource_type)
            || graph.contains(urn)
            || referenced.contains(urn)
            || !scope.contains(urn)
            || is_system_managed(urn)
        {
            continue;
        }
        if !registry.get(urn.resource_type)?.supports_remove() {
            continue;
        }
        candidates.insert(urn, record);
    }

    // dependents[x]: candidates that must be removed before x
    let mut dependents: BTreeMap<&Urn, Vec<&Urn>> = candidates.keys().map(|u| (*u, Vec::new())).collect();
    for urn in candidates.keys() {
        for dep in urn.implied_dependencies() {
            if let Some((dep, _)) = candidates.get_key_value(&dep)
                && dep != urn
                && let Some(list) = dependents.get_mut(*dep)
            {
                list.push(*urn);
            }
        }
    }

    let mut depth: BTreeMap<&Urn, usize> = BTreeMap::new();
    let mut remaining: BTreeMap<&Urn, usize> = dependents.iter().map(|(u, d)| (*u, d.len())).collect();
    let mut queue: VecDeque<&Urn> = remaining
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(u, _)| *u)
        .collect();
    while let Some(urn) = queue.pop_front() {
        let own = dependents[urn]
            .iter()
            .filter_map(|d| depth.get(d))
            .map(|d| d + 1)
            .max()
            .unwrap_or(0);
        depth.insert(urn, own);
        for dep in urn.implied_dependencies() {
            if let Some(n) = remaining.get_mut(&dep)
                && &dep != urn
            {
                *n -= 1;
                if *n == 0
                    && let Some((key, _)) = candidates.get_key_value(&dep)
                {
                    queue.push_back(*key);
                }
            }
        }
    }

    let deepest = depth.values().copied().max().unwrap_or(0);
    let mut changes = Vec::with_capacity(candidates.len());
    for (urn, record) in &candidates {
        let lifecycle = registry.get(urn.resource_type)?;
        let current = canonical(lifecycle, &record.properties);
        let level = match depth.get(urn) {
            Some(d) => base_level + d,
            None => {
                warn!("Could not order removal of {urn}; running it last");
                base_level + deepest + 1
            }
        };
        let role = controller(lifecycle, &current);
        let sql = lifecycle.render(urn, Action::Remove, Some(&current), None)?;
        changes.push(ResourceChange {
            urn: (*urn).clone(),
            action: Action::Remove,
            level,
            before: Some(current),
            after: None,
            statements: statements(&role, sql).collect(),
            session: SessionRequirements::default(),
            depends_on: dependents[urn].iter().map(|u| (*u).clone()).collect(),
            rejection: None,
        });
    }
    if !changes.is_empty() {
        debug!("Planned {} removal(s)", changes.len());
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::{Reference, ResourceDeclaration};
    use crate::identity::Fqn;
    use crate::test_support::{record, role, usage_grant, warehouse};
    use serde_json::json;

    fn plan(
        decls: &[ResourceDeclaration],
        remote: Vec<RemoteRecord>,
        config: &BlueprintConfig,
    ) -> Result<Plan> {
        let graph = ResourceGraph::build(decls, config)?;
        diff(
            &graph,
            &RemoteSnapshot::from_records(remote),
            &LifecycleRegistry::builtin(),
            config,
        )
    }

    fn config() -> BlueprintConfig {
        BlueprintConfig::for_account("A")
    }

    fn sql(change: &ResourceChange) -> Vec<(&str, &str)> {
        change
            .statements
            .iter()
            .map(|s| (s.role.as_str(), s.sql.as_str()))
            .collect()
    }

    #[test]
    fn test_add_uses_default_role() {
        let plan = plan(&[role("analyst")], vec![], &config()).unwrap();
        let change = &plan.changes()[0];
        assert_eq!(change.action, Action::Add);
        assert_eq!(sql(change), vec![("USERADMIN", "CREATE ROLE ANALYST")]);
    }

    #[test]
    fn test_add_with_custom_owner_transfers() {
        let decl = warehouse("wh").with("owner", "loader");
        let plan = plan(
            &[decl, role("loader")],
            vec![],
            &config(),
        )
        .unwrap();
        let change = plan.get(&"urn::A:warehouse/WH".parse().unwrap()).unwrap();
        assert_eq!(
            sql(change),
            vec![
                ("SYSADMIN", "CREATE WAREHOUSE WH"),
                ("SYSADMIN", "GRANT OWNERSHIP ON WAREHOUSE WH TO ROLE LOADER COPY CURRENT GRANTS"),
            ]
        );
        assert_eq!(change.depends_on, vec![Urn::role("A", "LOADER")]);
    }

    #[test]
    fn test_mutable_field_changes_in_place() {
        let decl = warehouse("wh").with("warehouse_size", "large");
        let remote = vec![record(
            "urn::A:warehouse/WH",
            json!({"warehouse_size": "XSMALL", "owner": "SYSADMIN", "auto_suspend": 600}),
        )];
        let plan = plan(&[decl], remote, &config()).unwrap();
        let change = &plan.changes()[0];
        assert_eq!(change.action, Action::Change);
        assert_eq!(
            sql(change),
            vec![("SYSADMIN", "ALTER WAREHOUSE WH SET WAREHOUSE_SIZE = LARGE")]
        );
    }

    #[test]
    fn test_unchanged_is_noop() {
        let decl = warehouse("wh").with("warehouse_size", "x-small");
        let remote = vec![record(
            "urn::A:warehouse/WH",
            json!({"warehouse_size": "XSMALL", "owner": "SYSADMIN"}),
        )];
        let plan = plan(&[decl], remote, &config()).unwrap();
        assert_eq!(plan.changes()[0].action, Action::Noop);
        assert!(plan.is_noop());
    }

    #[test]
    fn test_owner_only_is_transfer() {
        let remote = vec![
            record("urn::A:warehouse/WH", json!({"owner": "SYSADMIN"})),
            record("urn::A:role/LOADER", json!({"owner": "USERADMIN"})),
        ];
        let plan = plan(&[warehouse("wh").with("owner", "loader")], remote, &config()).unwrap();
        let change = &plan.changes()[0];
        assert_eq!(change.action, Action::Transfer);
        assert_eq!(
            sql(change),
            vec![("SYSADMIN", "GRANT OWNERSHIP ON WAREHOUSE WH TO ROLE LOADER COPY CURRENT GRANTS")]
        );
    }

    #[test]
    fn test_owner_folds_into_change() {
        let remote = vec![
            record("urn::A:warehouse/WH", json!({"owner": "SYSADMIN", "auto_suspend": 60})),
            record("urn::A:role/LOADER", json!({})),
        ];
        let decl = warehouse("wh").with("owner", "loader").with("auto_suspend", 120);
        let plan = plan(&[decl], remote, &config()).unwrap();
        let change = &plan.changes()[0];
        assert_eq!(change.action, Action::Change);
        assert_eq!(change.statements.len(), 2);
        assert!(change.statements[1].sql.starts_with("GRANT OWNERSHIP"));
    }

    #[test]
    fn test_immutable_field_replaces() {
        let decl = ResourceDeclaration::new(ResourceType::View, "v")
            .in_container(&["db", "s"])
            .with("as_", "SELECT 2");
        let remote = vec![
            record("urn::A:database/DB", json!({})),
            record("urn::A:schema/DB.S", json!({})),
            record("urn::A:view/DB.S.V", json!({"as_": "SELECT 1", "owner": "SYSADMIN"})),
        ];
        let plan = plan(&[decl], remote, &config()).unwrap();
        let change = &plan.changes()[0];
        assert_eq!(change.action, Action::Replace);
        assert_eq!(
            sql(change),
            vec![
                ("SYSADMIN", "DROP VIEW DB.S.V"),
                ("SYSADMIN", "CREATE VIEW DB.S.V AS SELECT 2"),
            ]
        );
        assert_eq!(change.session.schema, Some(("DB".into(), "S".into())));
    }

    #[test]
    fn test_forbidden_replace_is_rejected() {
        let decl = ResourceDeclaration::new(ResourceType::Table, "t")
            .in_container(&["db", "s"])
            .with("columns", json!(["ID NUMBER", "NAME TEXT"]));
        let remote = vec![
            record("urn::A:database/DB", json!({})),
            record("urn::A:schema/DB.S", json!({})),
            record("urn::A:table/DB.S.T", json!({"columns": ["ID NUMBER"], "owner": "SYSADMIN"})),
        ];
        let plan = plan(&[decl], remote, &config()).unwrap();
        let change = &plan.changes()[0];
        assert_eq!(change.action, Action::Replace);
        assert!(change.statements.is_empty());
        assert!(change.rejection.as_deref().unwrap().contains("columns"));
    }

    #[test]
    fn test_unresolved_reference() {
        let err = plan(&[usage_grant(&["usage"], "wh", "analyst")], vec![], &config()).unwrap_err();
        assert!(matches!(err, Error::UnresolvedReference { .. }));
    }

    #[test]
    fn test_system_objects_resolve_implicitly() {
        let decl = ResourceDeclaration::new(ResourceType::Grant, "")
            .with("priv", "usage")
            .with_ref(
                "on",
                Reference::Named {
                    resource_type: ResourceType::Schema,
                    name: "public".into(),
                    container: vec!["db".into()],
                },
            )
            .with_ref("to", Reference::named(ResourceType::Role, "sysadmin"));
        let db = ResourceDeclaration::new(ResourceType::Database, "db");
        let plan = plan(&[db, decl], vec![], &config()).unwrap();
        assert_eq!(plan.summary().add, 2);
    }

    #[test]
    fn test_public_schema_of_new_database_is_not_created() {
        let db = ResourceDeclaration::new(ResourceType::Database, "db");
        let public = ResourceDeclaration::new(ResourceType::Schema, "public").in_container(&["db"]);
        let public_urn: Urn = "urn::A:schema/DB.PUBLIC".parse().unwrap();

        let bare = plan(&[db.clone(), public.clone()], vec![], &config()).unwrap();
        assert_eq!(bare.summary().add, 1);
        assert_eq!(bare.actionable().count(), 1);
        assert_eq!(bare.get(&public_urn).unwrap().action, Action::Noop);

        let commented = plan(&[db, public.with("comment", "landing")], vec![], &config()).unwrap();
        let change = commented.get(&public_urn).unwrap();
        assert_eq!(change.action, Action::Change);
        assert!(change.statements[0].sql.starts_with("ALTER SCHEMA DB.PUBLIC SET COMMENT"));
        assert_eq!(change.depends_on, vec![Urn::new("A", ResourceType::Database, Fqn::new("db"))]);
    }

    #[test]
    fn test_grant_expansion_and_privilege_drop() {
        let remote = vec![
            record("urn::A:warehouse/WH", json!({})),
            record("urn::A:role/ANALYST", json!({})),
        ];
        let first = plan(
            &[usage_grant(&["usage", "operate"], "wh", "analyst")],
            remote.clone(),
            &config(),
        )
        .unwrap();
        assert_eq!(first.summary().add, 2);

        let mut applied = remote.clone();
        for priv_ in ["USAGE", "OPERATE"] {
            applied.push(record(
                &format!("urn::A:grant/GRANT?on=warehouse/WH&priv={priv_}&to=role/ANALYST"),
                json!({"grant_option": false}),
            ));
        }
        let synced = BlueprintConfig {
            sync_resources: Some(vec![ResourceType::Grant]),
            ..config()
        };
        let second = plan(&[usage_grant(&["usage"], "wh", "analyst")], applied, &synced).unwrap();
        let summary = second.summary();
        assert_eq!(summary.remove, 1);
        assert_eq!(summary.noop, 1);
        let remove = second.actionable().next().unwrap();
        assert_eq!(
            sql(remove),
            vec![("SECURITYADMIN", "REVOKE OPERATE ON WAREHOUSE WH FROM ROLE ANALYST")]
        );
    }

    #[test]
    fn test_grant_option_toggles_in_place() {
        let urn = "urn::A:grant/GRANT?on=warehouse/WH&priv=USAGE&to=role/ANALYST";
        let remote = |grant_option: bool| {
            vec![
                record("urn::A:warehouse/WH", json!({})),
                record("urn::A:role/ANALYST", json!({})),
                record(urn, json!({"grant_option": grant_option})),
            ]
        };
        let with_option = usage_grant(&["usage"], "wh", "analyst").with("grant_option", true);

        let granted = plan(&[with_option.clone()], remote(false), &config()).unwrap();
        let change = &granted.changes()[0];
        assert_eq!(change.action, Action::Change);
        assert_eq!(
            sql(change),
            vec![("SECURITYADMIN", "GRANT USAGE ON WAREHOUSE WH TO ROLE ANALYST WITH GRANT OPTION")]
        );

        let settled = plan(&[with_option], remote(true), &config()).unwrap();
        assert!(settled.is_noop());

        let revoked = plan(&[usage_grant(&["usage"], "wh", "analyst")], remote(true), &config()).unwrap();
        let change = &revoked.changes()[0];
        assert_eq!(change.action, Action::Change);
        assert_eq!(
            sql(change),
            vec![("SECURITYADMIN", "REVOKE GRANT OPTION FOR USAGE ON WAREHOUSE WH FROM ROLE ANALYST")]
        );
    }

    #[test]
    fn test_empty_allowlist_never_removes() {
        let remote = vec![
            record("urn::A:role/STALE", json!({})),
            record("urn::A:warehouse/OLD", json!({})),
        ];
        let plan = plan(&[], remote, &config()).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_removals_ordered_by_dependency() {
        let config = BlueprintConfig {
            sync_resources: Some(vec![ResourceType::Role, ResourceType::Grant]),
            ..config()
        };
        let remote = vec![
            record("urn::A:warehouse/WH", json!({})),
            record("urn::A:role/R", json!({"owner": "USERADMIN"})),
            record("urn::A:role/SYSADMIN", json!({})),
            record(
                "urn::A:grant/GRANT?on=warehouse/WH&priv=USAGE&to=role/R",
                json!({"grant_option": false}),
            ),
        ];
        let plan = plan(&[role("keep")], remote, &config).unwrap();
        let role_r = plan.get(&Urn::role("A", "R")).unwrap();
        let grant = plan
            .get(&"urn::A:grant/GRANT?on=warehouse/WH&priv=USAGE&to=role/R".parse().unwrap())
            .unwrap();
        assert_eq!(grant.level, 1);
        assert_eq!(role_r.level, 2);
        assert_eq!(role_r.depends_on, vec![grant.urn.clone()]);
        assert_eq!(sql(role_r), vec![("USERADMIN", "DROP ROLE R")]);
        assert!(plan.get(&Urn::role("A", "SYSADMIN")).is_none());
    }

    #[test]
    fn test_referenced_records_are_not_removed() {
        let config = BlueprintConfig {
            sync_resources: Some(vec![ResourceType::Role]),
            ..config()
        };
        let remote = vec![
            record("urn::A:warehouse/WH", json!({})),
            record("urn::A:role/ANALYST", json!({})),
        ];
        let plan = plan(&[usage_grant(&["usage"], "wh", "analyst")], remote, &config).unwrap();
        assert_eq!(plan.summary().remove, 0);
    }

    #[test]
    fn test_account_always_exists() {
        let decl = ResourceDeclaration::new(ResourceType::Account, "account").with("min_data_retention_time_in_days", 7);
        let plan = plan(&[decl], vec![], &config()).unwrap();
        let change = &plan.changes()[0];
        assert_eq!(change.action, Action::Change);
        assert_eq!(
            sql(change),
            vec![("ACCOUNTADMIN", "ALTER ACCOUNT SET MIN_DATA_RETENTION_TIME_IN_DAYS = 7")]
        );
    }

    #[test]
    fn test_ctas_requests_configured_warehouse() {
        let config = BlueprintConfig {
            warehouse: Some("compute_wh".into()),
            ..config()
        };
        let decl = ResourceDeclaration::new(ResourceType::Table, "t")
            .in_container(&["db", "s"])
            .with("as_", "SELECT 1 AS X");
        let remote = vec![
            record("urn::A:database/DB", json!({})),
            record("urn::A:schema/DB.S", json!({})),
        ];
        let plan = plan(&[decl], remote, &config).unwrap();
        assert_eq!(plan.changes()[0].session.warehouse.as_deref(), Some("COMPUTE_WH"));
    }
}
