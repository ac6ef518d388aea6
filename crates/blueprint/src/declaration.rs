//! Resource declarations as handed over by the config loader
//!
//! A declaration is immutable input. Ingestion canonicalizes it into one or
//! more [`NodeSpec`]s: a URN, a normalized property bag and the set of URNs
//! it depends on. Grant declarations may expand into several specs, one per
//! privilege.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::BlueprintConfig;
use crate::error::{Error, Result};
use crate::grants;
use crate::identity::{Fqn, ResourceType, Urn, is_system_role, normalize_identifier};
use crate::types::Properties;

/// A reference to another resource, before canonicalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference {
    /// Already a canonical URN
    Urn(Urn),
    /// A typed name, resolved against the blueprint's account
    Named {
        #[serde(rename = "type")]
        resource_type: ResourceType,
        name: String,
        #[serde(default)]
        container: Vec<String>,
    },
}

impl Reference {
    /// Shorthand for a named reference with no container
    pub fn named(resource_type: ResourceType, name: &str) -> Self {
        Self::Named {
            resource_type,
            name: name.to_string(),
            container: Vec::new(),
        }
    }

    /// Canonicalize to a URN in `account`
    pub fn resolve(&self, account: &str) -> Result<Urn> {
        match self {
            Self::Urn(urn) => Ok(urn.clone()),
            Self::Named {
                resource_type,
                name,
                container,
            } => {
                if *resource_type == ResourceType::Account {
                    return Ok(Urn::account(account));
                }
                if container.len() != resource_type.depth().path_len() {
                    return Err(Error::invalid(
                        format!("{resource_type} {name}"),
                        format!(
                            "reference needs a container path of length {}",
                            resource_type.depth().path_len()
                        ),
                    ));
                }
                Ok(Urn::new(
                    account,
                    *resource_type,
                    Fqn::in_container(container, name),
                ))
            }
        }
    }
}

/// One desired resource as declared in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDeclaration {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,

    #[serde(default)]
    pub name: String,

    /// Container path, outermost first (`[database]` or `[database, schema]`)
    #[serde(default)]
    pub container: Vec<String>,

    #[serde(default)]
    pub properties: Properties,

    /// Explicit references (`to`, `on`, `in`, `role`, ...)
    #[serde(default)]
    pub references: BTreeMap<String, Reference>,
}

/// A canonicalized declaration ready to become a graph node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub urn: Urn,
    pub properties: Properties,
    pub dependencies: BTreeSet<Urn>,
}

impl ResourceDeclaration {
    pub fn new(resource_type: ResourceType, name: &str) -> Self {
        Self {
            resource_type,
            name: name.to_string(),
            container: Vec::new(),
            properties: Properties::new(),
            references: BTreeMap::new(),
        }
    }

    /// Set the container path
    pub fn in_container(mut self, path: &[&str]) -> Self {
        self.container = path.iter().map(|p| (*p).to_string()).collect();
        self
    }

    /// Set a property
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Set a reference
    pub fn with_ref(mut self, key: &str, reference: Reference) -> Self {
        self.references.insert(key.to_string(), reference);
        self
    }

    /// Human-readable label used in errors
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            self.resource_type.to_string()
        } else {
            format!("{} {}", self.resource_type, self.name)
        }
    }

    /// Resolve a named reference, if present
    pub fn reference(&self, key: &str, account: &str) -> Result<Option<Urn>> {
        self.references
            .get(key)
            .map(|r| r.resolve(account))
            .transpose()
    }

    /// Resolve a reference that must be present
    pub fn required_reference(&self, key: &str, account: &str) -> Result<Urn> {
        self.reference(key, account)?
            .ok_or_else(|| Error::invalid(self.label(), format!("missing '{key}' reference")))
    }

    /// Container path with gaps filled from the blueprint config
    fn resolved_container(&self, config: &BlueprintConfig) -> Result<Vec<String>> {
        let needed = self.resource_type.depth().path_len();
        let given = self.container.len();
        if given > needed {
            return Err(Error::invalid(
                self.label(),
                format!("container path has {given} elements, expected {needed}"),
            ));
        }
        let defaults = config.default_container();
        let filled: Option<Vec<String>> = defaults[..needed - given]
            .iter()
            .map(|d| d.map(str::to_string))
            .collect();
        let Some(filled) = filled else {
            return Err(Error::invalid(
                self.label(),
                "container path is incomplete and no default database/schema is configured",
            ));
        };
        Ok(filled.into_iter().chain(self.container.iter().cloned()).collect())
    }

    /// Canonicalize into graph-ready node specs
    pub fn ingest(&self, config: &BlueprintConfig) -> Result<Vec<NodeSpec>> {
        if self.resource_type.is_grant() {
            return grants::expand_declaration(self, &config.account);
        }
        if self.name.trim().is_empty() {
            return Err(Error::invalid(self.label(), "name must not be empty"));
        }

        let container = self.resolved_container(config)?;
        let urn = Urn::new(
            &config.account,
            self.resource_type,
            Fqn::in_container(&container, &self.name),
        );

        let mut dependencies = BTreeSet::new();
        if let Some(parent) = urn.parent() {
            dependencies.insert(parent);
        }
        for reference in self.references.values() {
            dependencies.insert(reference.resolve(&config.account)?);
        }

        let mut properties = self.properties.clone();
        if let Some(Value::String(owner)) = properties.get("owner") {
            let owner = normalize_identifier(owner);
            if !is_system_role(&owner) {
                dependencies.insert(Urn::role(&config.account, &owner));
            }
            properties.insert("owner".into(), Value::String(owner));
        }
        dependencies.remove(&Urn::account(&config.account));

        Ok(vec![NodeSpec {
            urn,
            properties,
            dependencies,
        }])
    }
}
