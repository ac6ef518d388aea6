//! # Blueprint
//!
//! Stateless plan/apply reconciliation of warehouse resources.
//!
//! Every run re-derives the truth from the live account: declarations are
//! turned into a dependency graph, the account is read once into a snapshot,
//! the two are diffed into a plan, and the plan is applied level by level by
//! a pool of workers that each keep their own session state.
//!
//! ## Core Concepts
//!
//! - **Urn**: canonical address of a resource (type, qualified name, grant discriminators)
//! - **ResourceGraph**: declarations with dependency edges and execution levels
//! - **RemoteSnapshot**: the remote state a plan is computed against
//! - **Plan**: one `ResourceChange` per resource, ordered by level
//! - **Scheduler**: applies a plan with failure isolation and cached role switches
//!
//! ## Example
//!
//! ```ignore
//! use blueprint::{
//!     Blueprint, BlueprintConfig, ResourceDeclaration, ResourceType, StaticSource,
//! };
//!
//! let bp = Blueprint::new(BlueprintConfig::for_account("ABC123"))?;
//! let plan = bp.plan(
//!     &[ResourceDeclaration::new(ResourceType::Role, "analyst")],
//!     &StaticSource::default(),
//! )?;
//! println!("{}", plan.render_text());
//!
//! let report = bp.dry_run(&plan)?;
//! for statement in &report.statements {
//!     println!("{}", statement.sql);
//! }
//! ```
//!
//! ## Provider Traits
//!
//! The engine never connects to anything itself:
//!
//! - [`RemoteSource`]: reads remote state
//! - [`Transport`] / [`Session`]: execute statements
//! - [`Lifecycle`]: type-specific rendering, mutability and listing
//! - [`ProgressCallback`] / [`ConfirmCallback`]: UI hooks

pub mod blueprint;
pub mod config;
pub mod context;
pub mod declaration;
pub mod differ;
pub mod error;
pub mod fetch;
pub mod grants;
pub mod graph;
pub mod identity;
pub mod lifecycle;
pub mod plan;
pub mod scheduler;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export main types at crate root
pub use blueprint::Blueprint;
pub use config::{AccountEdition, BlueprintConfig, BlueprintScope, GrantFetchStrategy, ManagementScope, SyncAllowlist};
pub use context::{
    AutoConfirm, AutoDecline, ConfirmCallback, ExecutionContext, NoProgress, NoTransport,
    ProgressCallback, Session, Transport,
};
pub use declaration::{Reference, ResourceDeclaration};
pub use error::{Error, ErrorCategory, FetchError, FetchErrorKind, Result, SessionError};
pub use fetch::{FetchScope, RemoteRecord, RemoteSnapshot, RemoteSource, StaticSource};
pub use graph::{ResourceGraph, ResourceNode};
pub use identity::{Fqn, ResourceType, Urn};
pub use lifecycle::{Lifecycle, LifecycleRegistry, Mutability};
pub use plan::{FieldDiff, Plan, PlanSummary, ResourceChange, Statement};
pub use scheduler::{ApplyReport, ChangeOutcome, ExecutedStatement, execute, execute_simple};
pub use types::{Action, ChangeStatus, ExecuteOptions, ExecuteSummary, Properties};
