//! Execution context and provider traits
//!
//! These traits keep the engine independent of any particular connection
//! layer or terminal UI. A [`Transport`] opens sessions, a [`Session`] runs
//! statements, and the callbacks report progress and gate a live apply.

use crate::error::SessionError;
use crate::identity::Urn;
use crate::plan::SessionRequirements;
use crate::types::ChangeStatus;

/// One open connection that runs statements in order
pub trait Session: Send {
    /// Run one statement
    fn execute(&mut self, sql: &str) -> Result<(), SessionError>;
}

/// Opens sessions; one per worker, lazily
pub trait Transport: Send + Sync {
    fn open_session(&self) -> Result<Box<dyn Session>, SessionError>;
}

/// Transport for runs that must never reach the remote
pub struct NoTransport;

impl Transport for NoTransport {
    fn open_session(&self) -> Result<Box<dyn Session>, SessionError> {
        Err(SessionError::new("no transport configured"))
    }
}

/// Progress callback for execution operations
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback: Send {
    /// Called when a level starts
    fn on_level_start(&mut self, level: usize, count: usize);

    /// Called when a change reaches its terminal status
    fn on_change_complete(&mut self, urn: &Urn, status: &ChangeStatus);

    /// Called when every change in a level is terminal
    fn on_level_complete(&mut self, level: usize);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> std::io::Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_level_start(&mut self, _level: usize, _count: usize) {}
    fn on_change_complete(&mut self, _urn: &Urn, _status: &ChangeStatus) {}
    fn on_level_complete(&mut self, _level: usize) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> std::io::Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> std::io::Result<bool> {
        Ok(false)
    }
}

/// A session-state switch issued ahead of a statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Switch {
    SecondaryRoles,
    Role(String),
    Warehouse(String),
    Schema { database: String, schema: String },
}

impl Switch {
    pub fn sql(&self) -> String {
        match self {
            Self::SecondaryRoles => "USE SECONDARY ROLES ALL".to_string(),
            Self::Role(role) => format!("USE ROLE {role}"),
            Self::Warehouse(warehouse) => format!("USE WAREHOUSE {warehouse}"),
            Self::Schema { database, schema } => format!("USE SCHEMA {database}.{schema}"),
        }
    }
}

/// What a worker's session currently has in effect
///
/// Only ever updated after the corresponding switch succeeded, so a failed
/// `USE` is retried on the next statement that needs it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    role: Option<String>,
    warehouse: Option<String>,
    schema: Option<(String, String)>,
    secondary_roles: bool,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Role in effect, if any has been set
    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn warehouse(&self) -> Option<&str> {
        self.warehouse.as_deref()
    }

    /// Switches needed before running a statement as `role` with `session`
    pub fn switches_for(
        &self,
        role: &str,
        session: &SessionRequirements,
        secondary_roles: bool,
    ) -> Vec<Switch> {
        let mut switches = Vec::new();
        if secondary_roles && !self.secondary_roles {
            switches.push(Switch::SecondaryRoles);
        }
        if self.role.as_deref() != Some(role) {
            switches.push(Switch::Role(role.to_string()));
        }
        if let Some(warehouse) = &session.warehouse
            && self.warehouse.as_ref() != Some(warehouse)
        {
            switches.push(Switch::Warehouse(warehouse.clone()));
        }
        if let Some((database, schema)) = &session.schema
            && self.schema.as_ref() != session.schema.as_ref()
        {
            switches.push(Switch::Schema {
                database: database.clone(),
                schema: schema.clone(),
            });
        }
        switches
    }

    /// Record a switch that succeeded
    pub fn commit(&mut self, switch: &Switch) {
        match switch {
            Switch::SecondaryRoles => self.secondary_roles = true,
            Switch::Role(role) => self.role = Some(role.clone()),
            Switch::Warehouse(warehouse) => self.warehouse = Some(warehouse.clone()),
            Switch::Schema { database, schema } => {
                self.schema = Some((database.clone(), schema.clone()));
            }
        }
    }
}
