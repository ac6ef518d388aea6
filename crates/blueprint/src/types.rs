//! Core types shared by the differ and the scheduler

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Typed key/value property bag of a resource
pub type Properties = BTreeMap<String, Value>;

/// What a change does to its resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Resource does not exist remotely and will be created
    Add,
    /// Mutable fields differ and will be altered in place
    Change,
    /// An immutable field differs; drop and re-create
    Replace,
    /// Only the owner differs; ownership is transferred
    Transfer,
    /// Resource exists remotely but is no longer declared
    Remove,
    /// Remote already matches
    Noop,
}

impl Action {
    /// Diff symbol used when displaying plans
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Change | Self::Transfer => "~",
            Self::Replace => "-/+",
            Self::Remove => "-",
            Self::Noop => " ",
        }
    }

    /// Whether this action mutates the remote
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Noop)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Add => "ADD",
            Self::Change => "CHANGE",
            Self::Replace => "REPLACE",
            Self::Transfer => "TRANSFER",
            Self::Remove => "REMOVE",
            Self::Noop => "NOOP",
        };
        f.write_str(label)
    }
}

/// Terminal state of a change after apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChangeStatus {
    /// All statements succeeded (or there was nothing to do)
    Applied,
    /// A statement failed, or the change was rejected at plan time
    Failed { error: String },
    /// Not attempted because a dependency failed or apply was declined
    Skipped { reason: String },
}

impl ChangeStatus {
    /// Check if the status represents success (no failure)
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Applied)
    }

    /// Whether dependents of a change in this state must be skipped
    pub fn blocks_dependents(&self) -> bool {
        !self.is_success()
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub added: usize,
    pub changed: usize,
    pub replaced: usize,
    pub transferred: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.added + self.changed + self.replaced + self.transferred + self.removed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }

    /// Total number of changes processed
    pub fn total(&self) -> usize {
        self.total_changes() + self.unchanged + self.skipped + self.failed
    }

    /// Add an outcome to the summary
    pub fn add(&mut self, action: Action, status: &ChangeStatus) {
        match status {
            ChangeStatus::Failed { .. } => self.failed += 1,
            ChangeStatus::Skipped { .. } => self.skipped += 1,
            ChangeStatus::Applied => match action {
                Action::Add => self.added += 1,
                Action::Change => self.changed += 1,
                Action::Replace => self.replaced += 1,
                Action::Transfer => self.transferred += 1,
                Action::Remove => self.removed += 1,
                Action::Noop => self.unchanged += 1,
            },
        }
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Record statements instead of sending them
    pub dry_run: bool,
    /// Number of parallel workers within a level
    pub jobs: usize,
    /// Open every worker session with `USE SECONDARY ROLES ALL`
    pub use_secondary_roles: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 8,
            use_secondary_roles: true,
        }
    }
}
