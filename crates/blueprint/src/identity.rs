//! Canonical resource addressing
//!
//! Every resource the engine reasons about is identified by a [`Urn`]:
//! account + resource type + fully-qualified name + optional discriminators.
//! Grants carry their privilege, target and grantee as discriminators so that
//! each `(priv, on, to)` tuple is its own resource.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Roles that exist in every account and can never be created or dropped
pub const SYSTEM_ROLES: &[&str] = &[
    "ACCOUNTADMIN",
    "SECURITYADMIN",
    "USERADMIN",
    "SYSADMIN",
    "ORGADMIN",
    "PUBLIC",
];

/// Schemas created implicitly with every database
pub const SYSTEM_SCHEMAS: &[&str] = &["PUBLIC", "INFORMATION_SCHEMA"];

/// Check whether a (normalized) role name is a system role
pub fn is_system_role(name: &str) -> bool {
    SYSTEM_ROLES.contains(&name)
}

/// How deep in the container hierarchy a resource type lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContainerDepth {
    /// Lives directly in the account (roles, warehouses, databases, grants)
    Account,
    /// Lives in a database (schemas, database roles)
    Database,
    /// Lives in a schema (tables, views)
    Schema,
}

impl ContainerDepth {
    /// Number of container path elements a resource of this depth needs
    pub fn path_len(self) -> usize {
        match self {
            Self::Account => 0,
            Self::Database => 1,
            Self::Schema => 2,
        }
    }
}

/// Closed set of resource kinds the engine knows how to reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Account,
    Database,
    Schema,
    Role,
    DatabaseRole,
    Warehouse,
    User,
    Table,
    View,
    Grant,
    FutureGrant,
    GrantOnAll,
    RoleGrant,
}

impl ResourceType {
    /// Every known resource type
    pub const ALL: &'static [ResourceType] = &[
        Self::Account,
        Self::Database,
        Self::Schema,
        Self::Role,
        Self::DatabaseRole,
        Self::Warehouse,
        Self::User,
        Self::Table,
        Self::View,
        Self::Grant,
        Self::FutureGrant,
        Self::GrantOnAll,
        Self::RoleGrant,
    ];

    /// The tag used in URNs and manifests
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Database => "database",
            Self::Schema => "schema",
            Self::Role => "role",
            Self::DatabaseRole => "database_role",
            Self::Warehouse => "warehouse",
            Self::User => "user",
            Self::Table => "table",
            Self::View => "view",
            Self::Grant => "grant",
            Self::FutureGrant => "future_grant",
            Self::GrantOnAll => "grant_on_all",
            Self::RoleGrant => "role_grant",
        }
    }

    /// The keyword used in SQL (`CREATE <keyword> ...`)
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            Self::Account => "ACCOUNT",
            Self::Database => "DATABASE",
            Self::Schema => "SCHEMA",
            Self::Role => "ROLE",
            Self::DatabaseRole => "DATABASE ROLE",
            Self::Warehouse => "WAREHOUSE",
            Self::User => "USER",
            Self::Table => "TABLE",
            Self::View => "VIEW",
            Self::Grant | Self::FutureGrant | Self::GrantOnAll => "GRANT",
            Self::RoleGrant => "ROLE GRANT",
        }
    }

    /// Container depth of this type
    pub fn depth(&self) -> ContainerDepth {
        match self {
            Self::Schema | Self::DatabaseRole => ContainerDepth::Database,
            Self::Table | Self::View => ContainerDepth::Schema,
            _ => ContainerDepth::Account,
        }
    }

    /// Whether this type is one of the grant shapes
    pub fn is_grant(&self) -> bool {
        matches!(
            self,
            Self::Grant | Self::FutureGrant | Self::GrantOnAll | Self::RoleGrant
        )
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let tag = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .iter()
            .find(|t| t.as_str() == tag)
            .copied()
            .ok_or_else(|| Error::InvalidUrn(format!("unknown resource type: {s}")))
    }
}

/// Normalize an identifier the way the warehouse resolves it
///
/// Plain identifiers are case-insensitive and stored upper-cased. Anything
/// else must be double-quoted and keeps its case.
pub fn normalize_identifier(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return raw.to_string();
    }
    let mut chars = raw.chars();
    let plain = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    };
    if plain {
        raw.to_ascii_uppercase()
    } else {
        format!("\"{}\"", raw.replace('"', "\"\""))
    }
}

/// Split a dotted path, respecting double-quoted segments
fn split_dotted(path: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in path.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            '.' if !quoted => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Characters that would end a query value early
const QUERY_RESERVED: [char; 4] = ['%', '&', '=', '?'];

/// Values with reserved characters are percent-encoded; all others are kept as-is
fn encode_param(value: &str) -> Cow<'_, str> {
    if value.contains(QUERY_RESERVED) {
        urlencoding::encode(value)
    } else {
        Cow::Borrowed(value)
    }
}

/// Split off the `?query` part at the first `?` outside a quoted identifier
fn split_query(text: &str) -> (&str, Option<&str>) {
    let mut quoted = false;
    for (i, c) in text.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '?' if !quoted => return (&text[..i], Some(&text[i + 1..])),
            _ => {}
        }
    }
    (text, None)
}

/// Fully-qualified name with optional discriminator parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fqn {
    pub database: Option<String>,
    pub schema: Option<String>,
    pub name: String,
    pub params: BTreeMap<String, String>,
}

impl Fqn {
    /// An account-level name
    pub fn new(name: &str) -> Self {
        Self {
            database: None,
            schema: None,
            name: normalize_identifier(name),
            params: BTreeMap::new(),
        }
    }

    /// Build a name from a container path (`[database, schema]`) and a leaf name
    pub fn in_container(container: &[String], name: &str) -> Self {
        let mut fqn = Self::new(name);
        fqn.database = container.first().map(|d| normalize_identifier(d));
        fqn.schema = container.get(1).map(|s| normalize_identifier(s));
        fqn
    }

    /// Add a discriminator parameter
    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// The dotted name without parameters
    pub fn qualified_name(&self) -> String {
        let mut out = String::new();
        if let Some(db) = &self.database {
            out.push_str(db);
            out.push('.');
        }
        if let Some(schema) = &self.schema {
            out.push_str(schema);
            out.push('.');
        }
        out.push_str(&self.name);
        out
    }

    /// Container path elements, outermost first
    pub fn container(&self) -> Vec<String> {
        self.database
            .iter()
            .chain(self.schema.iter())
            .cloned()
            .collect()
    }
}

impl fmt::Display for Fqn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())?;
        if !self.params.is_empty() {
            let query: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{k}={}", encode_param(v)))
                .collect();
            write!(f, "?{}", query.join("&"))?;
        }
        Ok(())
    }
}

impl Fqn {
    fn parse(resource_type: ResourceType, text: &str) -> Result<Self> {
        let (path, query) = split_query(text);
        let mut parts = split_dotted(path);
        let expected = resource_type.depth().path_len() + 1;
        if parts.len() != expected || parts.iter().any(String::is_empty) {
            return Err(Error::InvalidUrn(format!(
                "{resource_type} name '{path}' needs {expected} dotted part(s)"
            )));
        }
        let name = parts.pop().unwrap_or_default();
        let mut fqn = Self::in_container(&parts, &name);
        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (k, v) = pair
                    .split_once('=')
                    .ok_or_else(|| Error::InvalidUrn(format!("bad parameter '{pair}'")))?;
                let value = urlencoding::decode(v)
                    .map_err(|_| Error::InvalidUrn(format!("bad parameter '{pair}'")))?;
                fqn.params.insert(k.to_string(), value.into_owned());
            }
        }
        Ok(fqn)
    }
}

/// Unique address of a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Urn {
    pub account: String,
    pub resource_type: ResourceType,
    pub fqn: Fqn,
}

impl Urn {
    pub fn new(account: &str, resource_type: ResourceType, fqn: Fqn) -> Self {
        Self {
            account: account.to_string(),
            resource_type,
            fqn,
        }
    }

    /// The URN of the account itself
    pub fn account(account: &str) -> Self {
        Self::new(account, ResourceType::Account, Fqn::new("ACCOUNT"))
    }

    /// Shorthand for an account-level role URN
    pub fn role(account: &str, name: &str) -> Self {
        Self::new(account, ResourceType::Role, Fqn::new(name))
    }

    /// `<type>/<fqn>` form used inside grant discriminators
    pub fn to_ref(&self) -> String {
        format!("{}/{}", self.resource_type, self.fqn.qualified_name())
    }

    /// Parse a `<type>/<name>` discriminator back into a URN in `account`
    pub fn from_ref(account: &str, reference: &str) -> Result<Self> {
        let (kind, name) = reference
            .split_once('/')
            .ok_or_else(|| Error::InvalidUrn(format!("bad reference '{reference}'")))?;
        let resource_type: ResourceType = kind.parse()?;
        Ok(Self::new(
            account,
            resource_type,
            Fqn::parse(resource_type, name)?,
        ))
    }

    /// The leaf name
    pub fn name(&self) -> &str {
        &self.fqn.name
    }

    /// A discriminator parameter
    pub fn param(&self, key: &str) -> Option<&str> {
        self.fqn.params.get(key).map(String::as_str)
    }

    /// URN of the immediate container (database or schema), if any
    pub fn parent(&self) -> Option<Urn> {
        match (&self.fqn.database, &self.fqn.schema) {
            (Some(db), Some(schema)) => Some(Self::new(
                &self.account,
                ResourceType::Schema,
                Fqn::in_container(std::slice::from_ref(db), schema),
            )),
            (Some(db), None) => Some(Self::new(
                &self.account,
                ResourceType::Database,
                Fqn::new(db),
            )),
            _ => None,
        }
    }

    /// Dependencies that can be read off the URN alone
    ///
    /// Container parents plus the targets and grantees named in grant
    /// discriminators. Used to order removals of remote-only records, which
    /// have no declaration to take explicit references from.
    pub fn implied_dependencies(&self) -> Vec<Urn> {
        let mut deps: Vec<Urn> = self.parent().into_iter().collect();
        for key in ["on", "to", "in", "role", "user"] {
            let Some(value) = self.param(key) else {
                continue;
            };
            let reference = match key {
                "role" if !value.contains('/') => format!("role/{value}"),
                "user" if !value.contains('/') => format!("user/{value}"),
                _ => value.to_string(),
            };
            if let Ok(urn) = Self::from_ref(&self.account, &reference) {
                deps.push(urn);
            }
        }
        if self.resource_type == ResourceType::RoleGrant {
            deps.push(Self::role(&self.account, &self.fqn.name));
        }
        deps
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "urn::{}:{}/{}", self.account, self.resource_type, self.fqn)
    }
}

impl FromStr for Urn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidUrn(s.to_string());
        let mut parts = s.splitn(4, ':');
        if parts.next() != Some("urn") {
            return Err(invalid());
        }
        let _organization = parts.next().ok_or_else(invalid)?;
        let account = parts.next().ok_or_else(invalid)?;
        let rest = parts.next().ok_or_else(invalid)?;
        let (kind, fqn) = rest.split_once('/').ok_or_else(invalid)?;
        let resource_type: ResourceType = kind.parse()?;
        Ok(Self::new(account, resource_type, Fqn::parse(resource_type, fqn)?))
    }
}

impl Serialize for Urn {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Urn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier("test_role"), "TEST_ROLE");
        assert_eq!(normalize_identifier("  wh$1 "), "WH$1");
        assert_eq!(normalize_identifier("my role"), "\"my role\"");
        assert_eq!(normalize_identifier("\"MixedCase\""), "\"MixedCase\"");
        assert_eq!(normalize_identifier("1abc"), "\"1abc\"");
        assert_eq!(normalize_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_urn_display() {
        let urn = Urn::role("ABCD123", "role1");
        assert_eq!(urn.to_string(), "urn::ABCD123:role/ROLE1");

        let table = Urn::new(
            "ABCD123",
            ResourceType::Table,
            Fqn::in_container(&["db".into(), "sch".into()], "t"),
        );
        assert_eq!(table.to_string(), "urn::ABCD123:table/DB.SCH.T");
    }

    #[test]
    fn test_urn_parse_roundtrip_with_params() {
        let text = "urn::ABCD123:grant/GRANT?on=warehouse/WH&priv=USAGE&to=role/R";
        let urn: Urn = text.parse().unwrap();
        assert_eq!(urn.resource_type, ResourceType::Grant);
        assert_eq!(urn.param("priv"), Some("USAGE"));
        assert_eq!(urn.to_string(), text);
    }

    #[test]
    fn test_urn_parse_rejects_wrong_depth() {
        assert!("urn::A:schema/ONLYNAME".parse::<Urn>().is_err());
        assert!("urn::A:table/DB.T".parse::<Urn>().is_err());
        assert!("nope::A:role/R".parse::<Urn>().is_err());
        assert!("urn::A:gizmo/R".parse::<Urn>().is_err());
    }

    #[test]
    fn test_quoted_name_with_dot() {
        let urn: Urn = "urn::A:schema/DB.\"a.b\"".parse().unwrap();
        assert_eq!(urn.fqn.database.as_deref(), Some("DB"));
        assert_eq!(urn.name(), "\"a.b\"");
    }

    #[test]
    fn test_reserved_characters_survive_roundtrip() {
        let on = Urn::new(
            "A",
            ResourceType::Schema,
            Fqn::in_container(&["db".into()], "a?b&c=d%"),
        );
        let fqn = Fqn::new("GRANT")
            .with_param("on", on.to_ref())
            .with_param("priv", "USAGE");
        let grant = Urn::new("A", ResourceType::Grant, fqn);
        let text = grant.to_string();
        assert!(!text["urn::A:grant/GRANT?".len()..].contains('?'));
        let parsed: Urn = text.parse().unwrap();
        assert_eq!(parsed, grant);
        assert_eq!(parsed.param("on"), Some("schema/DB.\"a?b&c=d%\""));

        let quoted: Urn = "urn::A:schema/DB.\"what?\"".parse().unwrap();
        assert_eq!(quoted.name(), "\"what?\"");
        assert!(quoted.fqn.params.is_empty());
    }

    #[test]
    fn test_parent_chain() {
        let table: Urn = "urn::A:table/DB.SCH.T".parse().unwrap();
        let schema = table.parent().unwrap();
        assert_eq!(schema.to_string(), "urn::A:schema/DB.SCH");
        let db = schema.parent().unwrap();
        assert_eq!(db.to_string(), "urn::A:database/DB");
        assert!(db.parent().is_none());
    }

    #[test]
    fn test_implied_dependencies_of_grant() {
        let urn: Urn = "urn::A:grant/GRANT?on=warehouse/WH&priv=USAGE&to=role/R"
            .parse()
            .unwrap();
        let deps = urn.implied_dependencies();
        assert!(deps.contains(&"urn::A:warehouse/WH".parse().unwrap()));
        assert!(deps.contains(&Urn::role("A", "R")));
    }

    #[test]
    fn test_implied_dependencies_of_role_grant() {
        let urn: Urn = "urn::A:role_grant/CHILD?role=PARENT".parse().unwrap();
        let deps = urn.implied_dependencies();
        assert!(deps.contains(&Urn::role("A", "CHILD")));
        assert!(deps.contains(&Urn::role("A", "PARENT")));
    }

    #[test]
    fn test_resource_type_parse() {
        assert_eq!("database role".parse::<ResourceType>().unwrap(), ResourceType::DatabaseRole);
        assert_eq!("WAREHOUSE".parse::<ResourceType>().unwrap(), ResourceType::Warehouse);
        assert!("gizmo".parse::<ResourceType>().is_err());
    }
}
