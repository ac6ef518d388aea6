//! Per-type lifecycles
//!
//! The core never branches on resource type. Everything type-specific
//! (statement syntax, which fields can be altered in place, how to list the
//! type remotely) sits behind the [`Lifecycle`] trait and is looked up in a
//! [`LifecycleRegistry`] keyed by [`ResourceType`].

mod grant;
mod object;
mod schema_object;

pub use grant::{GrantLifecycle, RoleGrantLifecycle, ScopedGrantLifecycle};
pub use object::{AccountLifecycle, ObjectLifecycle};
pub use schema_object::{TableLifecycle, ViewLifecycle};

use serde_json::Value;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::fetch::{FetchScope, RemoteRecord, RemoteSource};
use crate::identity::{ResourceType, Urn};
use crate::types::{Action, Properties};

/// Role that creates objects of most types
pub const SYSADMIN: &str = "SYSADMIN";
/// Role that creates roles and users
pub const USERADMIN: &str = "USERADMIN";
/// Role that manages grants
pub const SECURITYADMIN: &str = "SECURITYADMIN";

/// How a field may change on an existing resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    /// Altered in place
    Mutable,
    /// Changing it means drop and re-create
    Immutable,
    /// Changing it would need a replace that loses data; refuse
    ForbidsReplace,
}

/// Type-specific behavior of one resource type
pub trait Lifecycle: Send + Sync {
    /// The type this lifecycle handles
    fn resource_type(&self) -> ResourceType;

    /// Render the statements for an action
    ///
    /// `Add` receives only `after`, `Remove` only `before`, `Change` both.
    /// Ownership transfers and replaces are composed by the differ.
    fn render(
        &self,
        urn: &Urn,
        action: Action,
        before: Option<&Properties>,
        after: Option<&Properties>,
    ) -> Result<Vec<String>>;

    /// Mutability of a property
    fn field_mutability(&self, _field: &str) -> Mutability {
        Mutability::Mutable
    }

    /// List this type remotely
    fn fetch(&self, source: &dyn RemoteSource, scope: &FetchScope) -> Result<Vec<RemoteRecord>> {
        let resource_type = self.resource_type();
        source
            .list(resource_type, scope)
            .map_err(|e| Error::fetch(resource_type, e.message))
    }

    /// Role that creates this type when no system-role owner is declared
    fn default_role(&self) -> &'static str {
        SYSADMIN
    }

    /// Whether this type carries an `owner`
    fn has_owner(&self) -> bool {
        true
    }

    /// Whether undeclared remote resources of this type may be dropped
    fn supports_remove(&self) -> bool {
        true
    }

    /// Whether the resource exists even when the remote reports nothing
    fn always_exists(&self) -> bool {
        false
    }

    /// Fields sent on create but never reported back by the remote
    fn write_only_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Bring a property bag into canonical form before comparison
    fn normalize(&self, _properties: &mut Properties) {}

    /// Whether creating this resource needs a running warehouse
    fn needs_warehouse(&self, _properties: &Properties) -> bool {
        false
    }

    /// Whether statements must run with the resource's schema in use
    fn needs_schema_context(&self) -> bool {
        false
    }

    /// Declared fields that only Enterprise edition or higher accepts
    fn enterprise_features(&self, _properties: &Properties) -> Vec<&'static str> {
        Vec::new()
    }
}

/// Lifecycles keyed by resource type
pub struct LifecycleRegistry {
    lifecycles: HashMap<ResourceType, Box<dyn Lifecycle>>,
}

impl LifecycleRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            lifecycles: HashMap::new(),
        }
    }

    /// Registry with a lifecycle for every built-in type
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(AccountLifecycle));
        registry.register(Box::new(ObjectLifecycle::database()));
        registry.register(Box::new(ObjectLifecycle::schema()));
        registry.register(Box::new(ObjectLifecycle::role()));
        registry.register(Box::new(ObjectLifecycle::database_role()));
        registry.register(Box::new(ObjectLifecycle::warehouse()));
        registry.register(Box::new(ObjectLifecycle::user()));
        registry.register(Box::new(TableLifecycle));
        registry.register(Box::new(ViewLifecycle));
        registry.register(Box::new(GrantLifecycle));
        registry.register(Box::new(ScopedGrantLifecycle::future()));
        registry.register(Box::new(ScopedGrantLifecycle::all()));
        registry.register(Box::new(RoleGrantLifecycle));
        registry
    }

    /// Add or replace the lifecycle for its type
    pub fn register(&mut self, lifecycle: Box<dyn Lifecycle>) {
        self.lifecycles.insert(lifecycle.resource_type(), lifecycle);
    }

    /// Look up the lifecycle for a type
    pub fn get(&self, resource_type: ResourceType) -> Result<&dyn Lifecycle> {
        self.lifecycles
            .get(&resource_type)
            .map(|l| &**l)
            .ok_or(Error::MissingLifecycle(resource_type))
    }
}

impl Default for LifecycleRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Whether a remote value satisfies a desired one
///
/// A field the remote does not report only matches an explicit `null`.
pub fn values_match(desired: &Value, current: Option<&Value>) -> bool {
    match current {
        Some(current) => desired == current,
        None => desired.is_null(),
    }
}

/// Managed fields whose desired value differs from the current one
///
/// Only keys present in `after` are compared; `owner` is handled separately.
pub fn delta<'a>(before: Option<&Properties>, after: &'a Properties) -> Vec<(&'a str, &'a Value)> {
    after
        .iter()
        .filter(|(k, _)| k.as_str() != "owner")
        .filter(|(k, v)| !values_match(v, before.and_then(|b| b.get(*k))))
        .map(|(k, v)| (k.as_str(), v))
        .collect()
}

/// Render a property value as a SQL literal
pub fn sql_value(key: &str, value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) if key == "comment" && !s.contains("$$") && !s.ends_with('$') => {
            format!("$${s}$$")
        }
        Value::String(s) if key == "comment" => quote(s),
        Value::String(s) if is_bare_token(s) => s.clone(),
        Value::String(s) => quote(s),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(|v| sql_value(key, v)).collect();
            format!("({})", inner.join(", "))
        }
        Value::Object(_) => quote(&value.to_string()),
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Upper-case keyword-like values (`LARGE`, `STANDARD`, role names) go unquoted
fn is_bare_token(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && s
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// `KEY = value` pairs for every non-null property not in `skip`
pub fn property_clause(properties: &Properties, skip: &[&str]) -> String {
    properties
        .iter()
        .filter(|(k, v)| !v.is_null() && k.as_str() != "owner" && !skip.contains(&k.as_str()))
        .map(|(k, v)| format!(" {} = {}", k.to_ascii_uppercase(), sql_value(k, v)))
        .collect()
}

/// `ALTER ... SET` / `ALTER ... UNSET` statements for changed fields
pub fn alter_statements(target: &str, changes: &[(&str, &Value)]) -> Vec<String> {
    let mut statements = Vec::new();
    let sets: String = changes
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| format!(" {} = {}", k.to_ascii_uppercase(), sql_value(k, v)))
        .collect();
    if !sets.is_empty() {
        statements.push(format!("ALTER {target} SET{sets}"));
    }
    let unsets: Vec<String> = changes
        .iter()
        .filter(|(_, v)| v.is_null())
        .map(|(k, _)| k.to_ascii_uppercase())
        .collect();
    if !unsets.is_empty() {
        statements.push(format!("ALTER {target} UNSET {}", unsets.join(", ")));
    }
    statements
}

/// Upper-case string values of the given keys
pub fn uppercase_fields(properties: &mut Properties, keys: &[&str]) {
    for key in keys {
        if let Some(Value::String(s)) = properties.get_mut(*key) {
            *s = s.to_ascii_uppercase();
        }
    }
}

/// `<KIND> <name>` for a resource
pub fn object_ref(urn: &Urn) -> String {
    match urn.resource_type {
        ResourceType::Account => "ACCOUNT".to_string(),
        t => format!("{} {}", t.sql_keyword(), urn.fqn.qualified_name()),
    }
}

/// Statement handing ownership of an existing resource to `owner`
pub fn ownership_statement(urn: &Urn, owner: &str) -> String {
    format!(
        "GRANT OWNERSHIP ON {} TO ROLE {owner} COPY CURRENT GRANTS",
        object_ref(urn)
    )
}
