//! Remote state retrieval
//!
//! The engine never talks to the warehouse directly while planning. It asks a
//! [`RemoteSource`] for records, one resource type at a time, and freezes the
//! answers into a [`RemoteSnapshot`] that the differ reads from. Each type is
//! fetched at most once per plan.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::{BlueprintConfig, GrantFetchStrategy, ManagementScope};
use crate::error::{FetchError, Result};
use crate::grants;
use crate::graph::ResourceGraph;
use crate::identity::{ContainerDepth, ResourceType, Urn};
use crate::lifecycle::LifecycleRegistry;
use crate::types::Properties;

/// One resource as the remote reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub urn: Urn,
    #[serde(default)]
    pub properties: Properties,
}

impl RemoteRecord {
    pub fn new(urn: Urn, properties: Properties) -> Self {
        Self { urn, properties }
    }
}

/// Read side of the remote account
///
/// Implementations wrap whatever connection layer is in use. Every method
/// returns the records of one shape; the engine handles filtering, merging
/// and normalization.
pub trait RemoteSource: Send + Sync {
    /// Every resource of a type visible in the given scope
    fn list(&self, resource_type: ResourceType, scope: &FetchScope) -> std::result::Result<Vec<RemoteRecord>, FetchError>;

    /// Every object grant in the account from one account-wide view
    fn grants_bulk(&self) -> std::result::Result<Vec<RemoteRecord>, FetchError>;

    /// Object grants held by one grantee
    fn grants_to(&self, grantee: &Urn) -> std::result::Result<Vec<RemoteRecord>, FetchError>;

    /// Future or all-objects grants defined in a database or schema
    fn scoped_grants(
        &self,
        resource_type: ResourceType,
        container: &Urn,
    ) -> std::result::Result<Vec<RemoteRecord>, FetchError>;
}

/// What a fetch is allowed and asked to look at
#[derive(Debug, Clone)]
pub struct FetchScope {
    pub management: ManagementScope,
    /// Grantees whose grants are listed under the per-object strategy
    pub grantees: Vec<Urn>,
    /// Databases and schemas whose future/all grants are listed
    pub containers: Vec<Urn>,
    pub grant_strategy: GrantFetchStrategy,
}

impl Default for FetchScope {
    fn default() -> Self {
        Self {
            management: ManagementScope::Account,
            grantees: Vec::new(),
            containers: Vec::new(),
            grant_strategy: GrantFetchStrategy::PerObject,
        }
    }
}

/// Immutable view of remote state for one plan
#[derive(Debug, Clone, Default)]
pub struct RemoteSnapshot {
    records: BTreeMap<Urn, RemoteRecord>,
    fetched: BTreeSet<ResourceType>,
}

impl RemoteSnapshot {
    /// Build a snapshot from already-fetched records
    pub fn from_records(records: impl IntoIterator<Item = RemoteRecord>) -> Self {
        let mut snapshot = Self::default();
        for record in records {
            snapshot.fetched.insert(record.urn.resource_type);
            snapshot.records.insert(record.urn.clone(), record);
        }
        snapshot
    }

    pub fn get(&self, urn: &Urn) -> Option<&RemoteRecord> {
        self.records.get(urn)
    }

    pub fn contains(&self, urn: &Urn) -> bool {
        self.records.contains_key(urn)
    }

    /// Every record, ordered by URN
    pub fn records(&self) -> impl Iterator<Item = &RemoteRecord> {
        self.records.values()
    }

    /// Records of one type
    pub fn records_of(&self, resource_type: ResourceType) -> impl Iterator<Item = &RemoteRecord> {
        self.records
            .values()
            .filter(move |r| r.urn.resource_type == resource_type)
    }

    /// Types that were listed while building this snapshot
    pub fn fetched_types(&self) -> &BTreeSet<ResourceType> {
        &self.fetched
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Accumulates records while fetching; frozen into a [`RemoteSnapshot`]
struct SnapshotBuilder {
    snapshot: RemoteSnapshot,
}

impl SnapshotBuilder {
    fn insert(&mut self, resource_type: ResourceType, records: Vec<RemoteRecord>) {
        self.snapshot.fetched.insert(resource_type);
        for record in records
            .into_iter()
            .filter(|r| r.urn.resource_type == resource_type)
        {
            self.snapshot.records.insert(record.urn.clone(), record);
        }
    }
}

/// Resource types a plan needs to see
fn types_to_fetch(graph: &ResourceGraph, config: &BlueprintConfig) -> BTreeSet<ResourceType> {
    let mut types = graph.resource_types();
    types.extend(graph.external_references().map(|u| u.resource_type));
    let sync = config.sync_allowlist();
    types.extend(sync.iter());
    if sync.contains(ResourceType::Grant) || sync.contains(ResourceType::RoleGrant) {
        types.insert(ResourceType::Role);
    }
    if sync.contains(ResourceType::FutureGrant) || sync.contains(ResourceType::GrantOnAll) {
        types.insert(ResourceType::Database);
        types.insert(ResourceType::Schema);
    }
    types
}

/// Fetch everything a plan over `graph` needs into one snapshot
///
/// Non-grant types are listed first; under the per-object strategy the roles
/// found there widen the set of grantees whose grants are listed.
pub fn fetch_snapshot(
    graph: &ResourceGraph,
    registry: &LifecycleRegistry,
    config: &BlueprintConfig,
    source: &dyn RemoteSource,
) -> Result<RemoteSnapshot> {
    let types = types_to_fetch(graph, config);
    let sync = config.sync_allowlist();
    let mut scope = FetchScope {
        management: config.management_scope(),
        grant_strategy: config.grant_fetch,
        ..FetchScope::default()
    };
    let mut builder = SnapshotBuilder {
        snapshot: RemoteSnapshot::default(),
    };

    for resource_type in types.iter().filter(|t| !t.is_grant()) {
        let lifecycle = registry.get(*resource_type)?;
        let records = lifecycle.fetch(source, &scope)?;
        debug!("Fetched {} remote {resource_type} record(s)", records.len());
        builder.insert(*resource_type, records);
    }

    let mut grantees: BTreeSet<Urn> = graph
        .nodes()
        .iter()
        .filter(|n| n.urn.resource_type.is_grant())
        .filter_map(|n| grants::grantee_of(&n.urn))
        .collect();
    if sync.contains(ResourceType::Grant) {
        grantees.extend(
            builder
                .snapshot
                .records()
                .filter(|r| {
                    matches!(
                        r.urn.resource_type,
                        ResourceType::Role | ResourceType::DatabaseRole
                    )
                })
                .map(|r| r.urn.clone()),
        );
    }

    let mut containers: BTreeSet<Urn> = graph
        .nodes()
        .iter()
        .filter_map(|n| n.urn.param("in"))
        .filter_map(|c| Urn::from_ref(&config.account, c).ok())
        .collect();
    if sync.contains(ResourceType::FutureGrant) || sync.contains(ResourceType::GrantOnAll) {
        containers.extend(
            builder
                .snapshot
                .records()
                .filter(|r| {
                    matches!(
                        r.urn.resource_type,
                        ResourceType::Database | ResourceType::Schema
                    )
                })
                .map(|r| r.urn.clone()),
        );
    }
    scope.grantees = grantees.into_iter().collect();
    scope.containers = containers.into_iter().collect();

    for resource_type in types.iter().filter(|t| t.is_grant()) {
        let lifecycle = registry.get(*resource_type)?;
        let records = lifecycle.fetch(source, &scope)?;
        debug!("Fetched {} remote {resource_type} record(s)", records.len());
        builder.insert(*resource_type, records);
    }

    let snapshot = builder.snapshot;
    info!(
        "Remote snapshot: {} record(s) across {} type(s)",
        snapshot.len(),
        snapshot.fetched_types().len()
    );
    Ok(snapshot)
}

/// In-memory [`RemoteSource`] over a fixed set of records
///
/// Used to plan offline against a saved state file, and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    records: Vec<RemoteRecord>,
    bulk_error: Option<FetchError>,
}

impl StaticSource {
    pub fn new(records: Vec<RemoteRecord>) -> Self {
        Self {
            records,
            bulk_error: None,
        }
    }

    /// Make the account-wide grant view fail with `error`
    pub fn with_bulk_error(mut self, error: FetchError) -> Self {
        self.bulk_error = Some(error);
        self
    }

    fn of_type(&self, resource_type: ResourceType) -> impl Iterator<Item = &RemoteRecord> {
        self.records
            .iter()
            .filter(move |r| r.urn.resource_type == resource_type)
    }
}

impl RemoteSource for StaticSource {
    fn list(&self, resource_type: ResourceType, scope: &FetchScope) -> std::result::Result<Vec<RemoteRecord>, FetchError> {
        Ok(self
            .of_type(resource_type)
            .filter(|r| {
                resource_type.is_grant()
                    || resource_type.depth() == ContainerDepth::Account
                    || scope.management.contains(&r.urn)
            })
            .cloned()
            .collect())
    }

    fn grants_bulk(&self) -> std::result::Result<Vec<RemoteRecord>, FetchError> {
        if let Some(error) = &self.bulk_error {
            return Err(error.clone());
        }
        Ok(self.of_type(ResourceType::Grant).cloned().collect())
    }

    fn grants_to(&self, grantee: &Urn) -> std::result::Result<Vec<RemoteRecord>, FetchError> {
        let wanted = grantee.to_ref();
        Ok(self
            .of_type(ResourceType::Grant)
            .filter(|r| r.urn.param("to") == Some(wanted.as_str()))
            .cloned()
            .collect())
    }

    fn scoped_grants(
        &self,
        resource_type: ResourceType,
        container: &Urn,
    ) -> std::result::Result<Vec<RemoteRecord>, FetchError> {
        let wanted = container.to_ref();
        Ok(self
            .of_type(resource_type)
            .filter(|r| r.urn.param("in") == Some(wanted.as_str()))
            .cloned()
            .collect())
    }
}
