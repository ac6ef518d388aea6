//! The plan/apply pipeline
//!
//! [`Blueprint`] ties the stages together: declarations become a graph, the
//! graph decides what to fetch, the snapshot is diffed into a plan, and the
//! plan is handed to the scheduler.

use log::info;

use crate::config::{AccountEdition, BlueprintConfig};
use crate::context::{AutoConfirm, ConfirmCallback, NoProgress, NoTransport, ProgressCallback, Transport};
use crate::declaration::ResourceDeclaration;
use crate::differ;
use crate::error::{Error, Result};
use crate::fetch::{self, RemoteSnapshot, RemoteSource};
use crate::graph::ResourceGraph;
use crate::identity::Urn;
use crate::lifecycle::LifecycleRegistry;
use crate::plan::Plan;
use crate::scheduler::{self, ApplyReport};
use crate::types::ExecuteOptions;

/// A validated configuration plus the lifecycles it plans with
pub struct Blueprint {
    config: BlueprintConfig,
    registry: LifecycleRegistry,
}

impl Blueprint {
    /// Create a blueprint with the built-in lifecycles
    pub fn new(config: BlueprintConfig) -> Result<Self> {
        Self::with_registry(config, LifecycleRegistry::builtin())
    }

    /// Create a blueprint with a custom lifecycle registry
    pub fn with_registry(config: BlueprintConfig, registry: LifecycleRegistry) -> Result<Self> {
        config.validate()?;
        for resource_type in config.sync_allowlist().iter() {
            if !registry.get(resource_type)?.supports_remove() {
                return Err(Error::UnsupportedSyncResource {
                    resource_type,
                    urn: None,
                });
            }
        }
        Ok(Self { config, registry })
    }

    pub fn config(&self) -> &BlueprintConfig {
        &self.config
    }

    pub fn registry(&self) -> &LifecycleRegistry {
        &self.registry
    }

    /// Scheduler options derived from the config
    pub fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions {
            dry_run: self.config.dry_run,
            jobs: self.config.threads,
            use_secondary_roles: self.config.use_secondary_roles,
        }
    }

    /// Build the graph and check every node is inside the management scope
    /// and within what the account edition allows
    pub fn build_graph(&self, declarations: &[ResourceDeclaration]) -> Result<ResourceGraph> {
        let graph = ResourceGraph::build(declarations, &self.config)?;
        let scope = self.config.management_scope();
        let outside: Vec<Urn> = graph
            .nodes()
            .iter()
            .filter(|n| !scope.contains(&n.urn))
            .map(|n| n.urn.clone())
            .collect();
        if !outside.is_empty() {
            return Err(Error::NonConformingPlan {
                scope: scope.label(),
                urns: outside,
            });
        }
        if self.config.edition == AccountEdition::Standard {
            for node in graph.nodes() {
                let lifecycle = self.registry.get(node.urn.resource_type)?;
                if let Some(feature) = lifecycle.enterprise_features(&node.properties).first() {
                    return Err(Error::WrongEdition {
                        urn: node.urn.clone(),
                        feature: (*feature).to_string(),
                    });
                }
            }
        }
        Ok(graph)
    }

    /// Take the one remote snapshot a plan is computed against
    pub fn fetch(&self, graph: &ResourceGraph, source: &dyn RemoteSource) -> Result<RemoteSnapshot> {
        fetch::fetch_snapshot(graph, &self.registry, &self.config, source)
    }

    pub fn diff(&self, graph: &ResourceGraph, snapshot: &RemoteSnapshot) -> Result<Plan> {
        differ::diff(graph, snapshot, &self.registry, &self.config)
    }

    /// Declarations to plan in one call
    pub fn plan(&self, declarations: &[ResourceDeclaration], source: &dyn RemoteSource) -> Result<Plan> {
        let graph = self.build_graph(declarations)?;
        let snapshot = self.fetch(&graph, source)?;
        let plan = self.diff(&graph, &snapshot)?;
        let s = plan.summary();
        info!(
            "Plan: {} to add, {} to change, {} to replace, {} to transfer, {} to remove",
            s.add, s.change, s.replace, s.transfer, s.remove
        );
        Ok(plan)
    }

    /// Apply a plan
    ///
    /// Removals outside the sync allow-list are refused before anything runs.
    pub fn apply<P, C>(
        &self,
        plan: &Plan,
        transport: &dyn Transport,
        progress: &mut P,
        confirm: &mut C,
    ) -> Result<ApplyReport>
    where
        P: ProgressCallback,
        C: ConfirmCallback,
    {
        plan.validate_removals(&self.config.sync_allowlist())?;
        scheduler::execute(plan, transport, &self.execute_options(), progress, confirm)
    }

    /// Run a plan without a transport, recording what would be executed
    pub fn dry_run(&self, plan: &Plan) -> Result<ApplyReport> {
        plan.validate_removals(&self.config.sync_allowlist())?;
        let opts = ExecuteOptions {
            dry_run: true,
            ..self.execute_options()
        };
        scheduler::execute(plan, &NoTransport, &opts, &mut NoProgress, &mut AutoConfirm)
    }
}
