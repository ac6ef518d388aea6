//! Command implementations

pub mod graph;
pub mod plan;
pub mod sql;

use anyhow::Result;

use blueprint::{Blueprint, Plan, ResourceDeclaration, StaticSource};

use crate::cli::InputArgs;
use crate::config;

/// Everything a command needs after the inputs are loaded
pub struct Loaded {
    pub blueprint: Blueprint,
    pub declarations: Vec<ResourceDeclaration>,
    pub source: StaticSource,
}

impl Loaded {
    pub fn from_args(args: &InputArgs) -> Result<Self> {
        let blueprint = Blueprint::new(config::resolve(args)?)?;
        let declarations = config::load_manifest(&args.manifest)?;
        let source = StaticSource::new(config::load_state(args.state.as_deref())?);
        log::info!(
            "Loaded {} declarations for account {}",
            declarations.len(),
            blueprint.config().account
        );
        Ok(Self {
            blueprint,
            declarations,
            source,
        })
    }

    pub fn plan(&self) -> Result<Plan> {
        Ok(self.blueprint.plan(&self.declarations, &self.source)?)
    }
}
