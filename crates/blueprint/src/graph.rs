//! Resource graph construction
//!
//! Declarations are ingested into nodes keyed by URN. Edges point from a node
//! to what it depends on. Levels follow Kahn's algorithm: a node's level is
//! one more than the highest level among its in-graph dependencies, so every
//! node in a level can run concurrently once earlier levels are done.

use log::debug;
use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::config::BlueprintConfig;
use crate::declaration::{NodeSpec, ResourceDeclaration};
use crate::error::{Error, Result};
use crate::identity::{ResourceType, Urn};
use crate::types::Properties;

/// One desired resource in the graph
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    pub urn: Urn,
    pub properties: Properties,
    /// Dependencies declared in the same manifest
    pub dependencies: BTreeSet<Urn>,
    /// Dependencies expected to already exist remotely
    pub external: BTreeSet<Urn>,
    pub level: usize,
}

/// Validated dependency graph of desired resources
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    nodes: Vec<ResourceNode>,
    index: HashMap<Urn, usize>,
}

impl ResourceGraph {
    /// Ingest declarations, deduplicate, and assign levels
    pub fn build(declarations: &[ResourceDeclaration], config: &BlueprintConfig) -> Result<Self> {
        let mut specs: Vec<NodeSpec> = Vec::new();
        let mut seen: HashMap<Urn, usize> = HashMap::new();

        for decl in declarations {
            for spec in decl.ingest(config)? {
                if let Some(&existing) = seen.get(&spec.urn) {
                    if specs[existing] == spec {
                        debug!("Collapsing duplicate declaration of {}", spec.urn);
                        continue;
                    }
                    return Err(Error::ConflictingDeclaration { urn: spec.urn });
                }
                seen.insert(spec.urn.clone(), specs.len());
                specs.push(spec);
            }
        }

        let nodes: Vec<ResourceNode> = specs
            .into_iter()
            .map(|spec| {
                let (dependencies, external) = spec
                    .dependencies
                    .into_iter()
                    .partition(|d| seen.contains_key(d));
                ResourceNode {
                    urn: spec.urn,
                    properties: spec.properties,
                    dependencies,
                    external,
                    level: 0,
                }
            })
            .collect();

        let mut graph = Self { nodes, index: seen };
        graph.assign_levels()?;
        debug!(
            "Built resource graph: {} node(s), {} level(s)",
            graph.nodes.len(),
            graph.max_level().map_or(0, |l| l + 1)
        );
        Ok(graph)
    }

    fn assign_levels(&mut self) -> Result<()> {
        let count = self.nodes.len();
        let mut remaining: Vec<usize> = self.nodes.iter().map(|n| n.dependencies.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.dependencies {
                dependents[self.index[dep]].push(i);
            }
        }

        let mut queue: VecDeque<usize> = (0..count).filter(|&i| remaining[i] == 0).collect();
        let mut done = vec![false; count];
        let mut processed = 0;
        while let Some(i) = queue.pop_front() {
            done[i] = true;
            processed += 1;
            let level = self.nodes[i].level;
            for &d in &dependents[i] {
                self.nodes[d].level = self.nodes[d].level.max(level + 1);
                remaining[d] -= 1;
                if remaining[d] == 0 {
                    queue.push_back(d);
                }
            }
        }

        if processed < count {
            return Err(Error::CycleDetected {
                cycles: self.find_cycles(&done),
            });
        }
        Ok(())
    }

    /// Every group of nodes that loops back on itself
    ///
    /// Runs Tarjan's algorithm, iteratively, over the nodes Kahn's pass left
    /// unordered. A component loops when it has more than one node or a node
    /// depends on itself. Nodes merely downstream of a loop are not reported.
    /// Members are listed in ingestion order.
    fn find_cycles(&self, done: &[bool]) -> Vec<Vec<Urn>> {
        let count = self.nodes.len();
        let edges = |i: usize| -> Vec<usize> {
            self.nodes[i]
                .dependencies
                .iter()
                .map(|d| self.index[d])
                .filter(|&j| !done[j])
                .collect()
        };

        let mut order: Vec<Option<usize>> = vec![None; count];
        let mut low = vec![0; count];
        let mut on_stack = vec![false; count];
        let mut stack: Vec<usize> = Vec::new();
        let mut next = 0;
        let mut cycles = Vec::new();

        for root in (0..count).filter(|&i| !done[i]) {
            if order[root].is_some() {
                continue;
            }
            order[root] = Some(next);
            low[root] = next;
            next += 1;
            stack.push(root);
            on_stack[root] = true;
            let mut work: Vec<(usize, Vec<usize>, usize)> = vec![(root, edges(root), 0)];

            while let Some((v, successors, pos)) = work.last_mut() {
                let v = *v;
                if let Some(&w) = successors.get(*pos) {
                    *pos += 1;
                    match order[w] {
                        None => {
                            order[w] = Some(next);
                            low[w] = next;
                            next += 1;
                            stack.push(w);
                            on_stack[w] = true;
                            work.push((w, edges(w), 0));
                        }
                        Some(seen) if on_stack[w] => low[v] = low[v].min(seen),
                        Some(_) => {}
                    }
                    continue;
                }

                work.pop();
                if let Some(&(parent, _, _)) = work.last() {
                    low[parent] = low[parent].min(low[v]);
                }
                if order[v] != Some(low[v]) {
                    continue;
                }
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                let node = &self.nodes[v];
                if component.len() > 1 || node.dependencies.contains(&node.urn) {
                    component.sort_unstable();
                    cycles.push(component.iter().map(|&i| self.nodes[i].urn.clone()).collect());
                }
            }
        }
        cycles
    }

    /// Nodes in ingestion order
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn get(&self, urn: &Urn) -> Option<&ResourceNode> {
        self.index.get(urn).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, urn: &Urn) -> bool {
        self.index.contains_key(urn)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Highest assigned level, if the graph has any nodes
    pub fn max_level(&self) -> Option<usize> {
        self.nodes.iter().map(|n| n.level).max()
    }

    /// Nodes grouped by level, lowest first
    pub fn levels(&self) -> Vec<Vec<&ResourceNode>> {
        let mut levels: Vec<Vec<&ResourceNode>> =
            vec![Vec::new(); self.max_level().map_or(0, |l| l + 1)];
        for node in &self.nodes {
            levels[node.level].push(node);
        }
        levels
    }

    /// Every resource type present in the graph
    pub fn resource_types(&self) -> BTreeSet<ResourceType> {
        self.nodes.iter().map(|n| n.urn.resource_type).collect()
    }

    /// Every dependency that must already exist remotely
    pub fn external_references(&self) -> impl Iterator<Item = &Urn> {
        self.nodes
            .iter()
            .flat_map(|n| n.external.iter())
            .collect::<BTreeSet<_>>()
            .into_iter()
    }
}
