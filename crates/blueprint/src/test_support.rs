//! Fixtures shared by unit tests

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::context::{Session, Transport};
use crate::declaration::{Reference, ResourceDeclaration};
use crate::error::{FetchError, SessionError};
use crate::fetch::{FetchScope, RemoteRecord, RemoteSource, StaticSource};
use crate::identity::{ResourceType, Urn};

pub fn record(urn: &str, properties: Value) -> RemoteRecord {
    RemoteRecord::new(urn.parse().unwrap(), serde_json::from_value(properties).unwrap())
}

pub fn role(name: &str) -> ResourceDeclaration {
    ResourceDeclaration::new(ResourceType::Role, name)
}

pub fn warehouse(name: &str) -> ResourceDeclaration {
    ResourceDeclaration::new(ResourceType::Warehouse, name)
}

pub fn usage_grant(privs: &[&str], warehouse: &str, role: &str) -> ResourceDeclaration {
    ResourceDeclaration::new(ResourceType::Grant, "")
        .with("priv", privs.to_vec())
        .with_ref("on", Reference::named(ResourceType::Warehouse, warehouse))
        .with_ref("to", Reference::named(ResourceType::Role, role))
}

/// Wraps a [`StaticSource`] and counts what was asked of it
pub struct CountingSource {
    inner: StaticSource,
    failing: Option<ResourceType>,
    lists: Mutex<HashMap<ResourceType, usize>>,
    grantees: Mutex<Vec<Urn>>,
}

impl CountingSource {
    pub fn new(inner: StaticSource) -> Self {
        Self {
            inner,
            failing: None,
            lists: Mutex::new(HashMap::new()),
            grantees: Mutex::new(Vec::new()),
        }
    }

    /// Make listing `resource_type` fail with a transport error
    pub fn failing(mut self, resource_type: ResourceType) -> Self {
        self.failing = Some(resource_type);
        self
    }

    pub fn list_calls(&self, resource_type: ResourceType) -> usize {
        self.lists
            .lock()
            .unwrap()
            .get(&resource_type)
            .copied()
            .unwrap_or(0)
    }

    pub fn grantee_calls(&self) -> Vec<Urn> {
        self.grantees.lock().unwrap().clone()
    }
}

impl RemoteSource for CountingSource {
    fn list(&self, resource_type: ResourceType, scope: &FetchScope) -> Result<Vec<RemoteRecord>, FetchError> {
        *self.lists.lock().unwrap().entry(resource_type).or_default() += 1;
        if self.failing == Some(resource_type) {
            return Err(FetchError::transport("connection reset"));
        }
        self.inner.list(resource_type, scope)
    }

    fn grants_bulk(&self) -> Result<Vec<RemoteRecord>, FetchError> {
        self.inner.grants_bulk()
    }

    fn grants_to(&self, grantee: &Urn) -> Result<Vec<RemoteRecord>, FetchError> {
        self.grantees.lock().unwrap().push(grantee.clone());
        self.inner.grants_to(grantee)
    }

    fn scoped_grants(&self, resource_type: ResourceType, container: &Urn) -> Result<Vec<RemoteRecord>, FetchError> {
        self.inner.scoped_grants(resource_type, container)
    }
}

#[derive(Default)]
struct Recorded {
    statements: Vec<String>,
    sessions: usize,
    fail_on: Vec<String>,
    fail_once_on: Vec<String>,
}

/// Transport whose sessions record every statement they are sent
#[derive(Clone, Default)]
pub struct RecordingTransport {
    state: Arc<Mutex<Recorded>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every statement containing `needle`
    pub fn failing_on(self, needle: &str) -> Self {
        self.state.lock().unwrap().fail_on.push(needle.to_string());
        self
    }

    /// Fail the first statement containing `needle`, then let it through
    pub fn failing_once_on(self, needle: &str) -> Self {
        self.state.lock().unwrap().fail_once_on.push(needle.to_string());
        self
    }

    /// Every statement sent so far, failed ones included
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.lock().unwrap().sessions
    }
}

impl Transport for RecordingTransport {
    fn open_session(&self) -> Result<Box<dyn Session>, SessionError> {
        self.state.lock().unwrap().sessions += 1;
        Ok(Box::new(RecordingSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct RecordingSession {
    state: Arc<Mutex<Recorded>>,
}

impl Session for RecordingSession {
    fn execute(&mut self, sql: &str) -> Result<(), SessionError> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(sql.to_string());
        if state.fail_on.iter().any(|n| sql.contains(n.as_str())) {
            return Err(SessionError::with_code(2003, format!("rejected: {sql}")));
        }
        if let Some(i) = state.fail_once_on.iter().position(|n| sql.contains(n.as_str())) {
            state.fail_once_on.remove(i);
            return Err(SessionError::new(format!("rejected once: {sql}")));
        }
        Ok(())
    }
}
