//! Plans: the ordered set of changes that reconciles remote with desired

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::config::SyncAllowlist;
use crate::error::{Error, Result};
use crate::identity::Urn;
use crate::types::{Action, Properties};

/// One rendered statement and the role that must run it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub role: String,
    pub sql: String,
}

impl Statement {
    pub fn new(role: &str, sql: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            sql: sql.into(),
        }
    }
}

/// Session state a change needs besides its role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    /// `(database, schema)` to `USE` before running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<(String, String)>,
}

/// A single planned change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceChange {
    pub urn: Urn,
    pub action: Action,
    pub level: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Properties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Properties>,
    #[serde(default)]
    pub statements: Vec<Statement>,
    #[serde(default)]
    pub session: SessionRequirements,
    /// Changes that must reach APPLIED before this one runs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<Urn>,
    /// Why this change cannot be executed, if it cannot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<String>,
}

/// One field-level difference, for display
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDiff<'a> {
    Added { key: &'a str, value: &'a Value },
    Changed { key: &'a str, from: &'a Value, to: &'a Value },
    Removed { key: &'a str, value: &'a Value },
}

impl FieldDiff<'_> {
    pub fn key(&self) -> &str {
        match self {
            Self::Added { key, .. } | Self::Changed { key, .. } | Self::Removed { key, .. } => key,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Added { .. } => "+",
            Self::Changed { .. } => "~",
            Self::Removed { .. } => "-",
        }
    }
}

impl ResourceChange {
    /// Field differences worth showing for this change
    ///
    /// Adds list every desired field, removes every remote field, changes
    /// only the managed fields that differ (owner included).
    pub fn field_diffs(&self) -> Vec<FieldDiff<'_>> {
        match (self.action, &self.before, &self.after) {
            (Action::Add, _, Some(after)) => after
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(key, value)| FieldDiff::Added { key, value })
                .collect(),
            (Action::Change | Action::Replace | Action::Transfer, Some(before), Some(after)) => after
                .iter()
                .filter_map(|(key, to)| match before.get(key) {
                    Some(from) if from == to => None,
                    Some(from) => Some(FieldDiff::Changed { key, from, to }),
                    None if to.is_null() => None,
                    None => Some(FieldDiff::Added { key, value: to }),
                })
                .collect(),
            (Action::Remove, Some(before), _) => before
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(key, value)| FieldDiff::Removed { key, value })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether the scheduler will refuse to run this change
    pub fn is_rejected(&self) -> bool {
        self.rejection.is_some()
    }
}

/// Number of changes per action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub add: usize,
    pub change: usize,
    pub replace: usize,
    pub transfer: usize,
    pub remove: usize,
    pub noop: usize,
    pub rejected: usize,
}

impl PlanSummary {
    /// Number of changes that would touch the remote
    pub fn actionable(&self) -> usize {
        self.add + self.change + self.replace + self.transfer + self.remove
    }
}

/// Changes ordered by level, then URN
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    changes: Vec<ResourceChange>,
}

impl Plan {
    pub fn new(mut changes: Vec<ResourceChange>) -> Self {
        changes.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.urn.cmp(&b.urn)));
        Self { changes }
    }

    /// Every change, NOOPs included
    pub fn changes(&self) -> &[ResourceChange] {
        &self.changes
    }

    /// Changes that touch the remote
    pub fn actionable(&self) -> impl Iterator<Item = &ResourceChange> {
        self.changes.iter().filter(|c| c.action.is_mutation())
    }

    pub fn get(&self, urn: &Urn) -> Option<&ResourceChange> {
        self.changes.iter().find(|c| &c.urn == urn)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Whether applying would do nothing
    pub fn is_noop(&self) -> bool {
        self.actionable().next().is_none()
    }

    /// Changes grouped by level, lowest first
    pub fn levels(&self) -> Vec<(usize, Vec<&ResourceChange>)> {
        let mut levels: BTreeMap<usize, Vec<&ResourceChange>> = BTreeMap::new();
        for change in &self.changes {
            levels.entry(change.level).or_default().push(change);
        }
        levels.into_iter().collect()
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for change in &self.changes {
            match change.action {
                Action::Add => summary.add += 1,
                Action::Change => summary.change += 1,
                Action::Replace => summary.replace += 1,
                Action::Transfer => summary.transfer += 1,
                Action::Remove => summary.remove += 1,
                Action::Noop => summary.noop += 1,
            }
            if change.is_rejected() {
                summary.rejected += 1;
            }
        }
        summary
    }

    /// Refuse REMOVE changes for types outside the allow-list
    pub fn validate_removals(&self, allowlist: &SyncAllowlist) -> Result<()> {
        match self
            .changes
            .iter()
            .find(|c| c.action == Action::Remove && !allowlist.contains(c.urn.resource_type))
        {
            Some(change) => Err(Error::UnsupportedSyncResource {
                resource_type: change.urn.resource_type,
                urn: Some(change.urn.clone()),
            }),
            None => Ok(()),
        }
    }

    /// Plain-text rendering, NOOPs omitted
    pub fn render_text(&self) -> String {
        let s = self.summary();
        let mut out = format!(
            "Plan: {} to add, {} to change, {} to replace, {} to transfer, {} to remove.\n",
            s.add, s.change, s.replace, s.transfer, s.remove
        );
        for change in self.actionable() {
            out.push('\n');
            let _ = write!(out, "{} {}", change.action.symbol(), change.urn);
            if let Some(reason) = &change.rejection {
                let _ = write!(out, "  # rejected: {reason}");
            }
            let diffs = change.field_diffs();
            if diffs.is_empty() {
                out.push('\n');
                continue;
            }
            out.push_str(" {\n");
            let width = diffs.iter().map(|d| d.key().len()).max().unwrap_or(0);
            for diff in &diffs {
                let line = match diff {
                    FieldDiff::Added { key, value } | FieldDiff::Removed { key, value } => {
                        format!("{key:<width$} = {value}")
                    }
                    FieldDiff::Changed { key, from, to } => {
                        format!("{key:<width$} = {from} -> {to}")
                    }
                };
                let _ = writeln!(out, "  {} {line}", diff.symbol());
            }
            out.push_str("}\n");
        }
        out
    }

    /// JSON rendering of the actionable changes
    pub fn to_json(&self) -> Result<String> {
        let actionable: Vec<&ResourceChange> = self.actionable().collect();
        serde_json::to_string_pretty(&actionable)
            .map_err(|e| Error::InvalidConfig(format!("plan is not serializable: {e}")))
    }
}
