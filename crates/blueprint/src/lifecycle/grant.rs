//! Grant-shaped resources
//!
//! Grants carry everything that identifies them in their URN, so rendering
//! reads the target, grantee and privilege back out of the discriminators.

use serde_json::Value;

use super::{Lifecycle, Mutability, SECURITYADMIN, USERADMIN, object_ref};
use crate::error::{Error, Result};
use crate::fetch::{FetchScope, RemoteRecord, RemoteSource};
use crate::grants;
use crate::identity::{ResourceType, Urn};
use crate::types::{Action, Properties};

fn param<'a>(urn: &'a Urn, key: &str) -> Result<&'a str> {
    urn.param(key)
        .ok_or_else(|| Error::InvalidUrn(format!("{urn} has no '{key}' parameter")))
}

fn referenced(urn: &Urn, key: &str) -> Result<Urn> {
    Urn::from_ref(&urn.account, param(urn, key)?)
}

fn grant_option(properties: Option<&Properties>) -> bool {
    properties.and_then(|p| p.get("grant_option")) == Some(&Value::Bool(true))
}

/// Statements shared by every privilege grant shape
///
/// `target` is the `ON ...` clause body.
fn render_privilege(
    urn: &Urn,
    action: Action,
    target: &str,
    before: Option<&Properties>,
    after: Option<&Properties>,
) -> Result<Vec<String>> {
    let privilege = param(urn, "priv")?;
    let grantee = object_ref(&referenced(urn, "to")?);
    let statement = match action {
        Action::Add => {
            let option = if grant_option(after) {
                " WITH GRANT OPTION"
            } else {
                ""
            };
            format!("GRANT {privilege} ON {target} TO {grantee}{option}")
        }
        Action::Change if grant_option(after) && !grant_option(before) => {
            format!("GRANT {privilege} ON {target} TO {grantee} WITH GRANT OPTION")
        }
        Action::Change => {
            format!("REVOKE GRANT OPTION FOR {privilege} ON {target} FROM {grantee}")
        }
        Action::Remove => format!("REVOKE {privilege} ON {target} FROM {grantee}"),
        other => {
            return Err(Error::Execution {
                urn: urn.clone(),
                message: format!("grants do not support {other}"),
            });
        }
    };
    Ok(vec![statement])
}

fn normalize_grant(properties: &mut Properties) {
    properties
        .entry("grant_option".to_string())
        .or_insert(Value::Bool(false));
}

fn grant_field_mutability(field: &str) -> Mutability {
    match field {
        "grant_option" => Mutability::Mutable,
        _ => Mutability::Immutable,
    }
}

/// A privilege on one object
pub struct GrantLifecycle;

impl Lifecycle for GrantLifecycle {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Grant
    }

    fn render(
        &self,
        urn: &Urn,
        action: Action,
        before: Option<&Properties>,
        after: Option<&Properties>,
    ) -> Result<Vec<String>> {
        let target = object_ref(&referenced(urn, "on")?);
        render_privilege(urn, action, &target, before, after)
    }

    fn field_mutability(&self, field: &str) -> Mutability {
        grant_field_mutability(field)
    }

    fn fetch(&self, source: &dyn RemoteSource, scope: &FetchScope) -> Result<Vec<RemoteRecord>> {
        grants::fetch_object_grants(source, scope)
    }

    fn normalize(&self, properties: &mut Properties) {
        normalize_grant(properties);
    }

    fn default_role(&self) -> &'static str {
        SECURITYADMIN
    }

    fn has_owner(&self) -> bool {
        false
    }
}

/// A privilege on every future or every existing object of a kind in a container
pub struct ScopedGrantLifecycle {
    resource_type: ResourceType,
    keyword: &'static str,
}

impl ScopedGrantLifecycle {
    /// `GRANT ... ON FUTURE <kinds> IN ...`
    pub fn future() -> Self {
        Self {
            resource_type: ResourceType::FutureGrant,
            keyword: "FUTURE",
        }
    }

    /// `GRANT ... ON ALL <kinds> IN ...`
    pub fn all() -> Self {
        Self {
            resource_type: ResourceType::GrantOnAll,
            keyword: "ALL",
        }
    }
}

impl Lifecycle for ScopedGrantLifecycle {
    fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    fn render(
        &self,
        urn: &Urn,
        action: Action,
        before: Option<&Properties>,
        after: Option<&Properties>,
    ) -> Result<Vec<String>> {
        let on_type: ResourceType = param(urn, "on_type")?.parse()?;
        let container = object_ref(&referenced(urn, "in")?);
        let target = format!("{} {}S IN {container}", self.keyword, on_type.sql_keyword());
        render_privilege(urn, action, &target, before, after)
    }

    fn field_mutability(&self, field: &str) -> Mutability {
        grant_field_mutability(field)
    }

    fn fetch(&self, source: &dyn RemoteSource, scope: &FetchScope) -> Result<Vec<RemoteRecord>> {
        grants::fetch_scoped_grants(self.resource_type, source, scope)
    }

    fn normalize(&self, properties: &mut Properties) {
        normalize_grant(properties);
    }

    fn default_role(&self) -> &'static str {
        SECURITYADMIN
    }

    fn has_owner(&self) -> bool {
        false
    }
}

/// A role granted to a role or a user
pub struct RoleGrantLifecycle;

impl Lifecycle for RoleGrantLifecycle {
    fn resource_type(&self) -> ResourceType {
        ResourceType::RoleGrant
    }

    fn render(
        &self,
        urn: &Urn,
        action: Action,
        _before: Option<&Properties>,
        _after: Option<&Properties>,
    ) -> Result<Vec<String>> {
        let grantee = grants::grantee_of(urn)
            .ok_or_else(|| Error::InvalidUrn(format!("{urn} names no grantee")))?;
        let role = urn.name();
        let grantee = object_ref(&grantee);
        match action {
            Action::Add => Ok(vec![format!("GRANT ROLE {role} TO {grantee}")]),
            Action::Remove => Ok(vec![format!("REVOKE ROLE {role} FROM {grantee}")]),
            other => Err(Error::Execution {
                urn: urn.clone(),
                message: format!("role grants do not support {other}"),
            }),
        }
    }

    fn field_mutability(&self, _field: &str) -> Mutability {
        Mutability::Immutable
    }

    fn default_role(&self) -> &'static str {
        USERADMIN
    }

    fn has_owner(&self) -> bool {
        false
    }
}
