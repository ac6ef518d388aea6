//! Error types for blueprint operations.
//!
//! Plan-time errors are fatal for the whole run: nothing is safe to execute
//! against an invalid graph or a failed fetch. Apply-time errors are isolated
//! to a single change and its dependents and surface as change outcomes, not
//! as `Err` values.

use std::fmt;

use crate::identity::{ResourceType, Urn};

/// Result type alias for blueprint operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Where in the pipeline an error belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuration could not be validated.
    Config,
    /// The manifest could not be turned into a valid plan.
    Plan,
    /// Remote state could not be read.
    Fetch,
    /// A single change cannot be carried out.
    Change,
    /// The remote rejected a statement.
    Execution,
}

impl ErrorCategory {
    /// Whether an error of this category aborts the whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config | Self::Plan | Self::Fetch)
    }

    /// Short description of this category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Config => "Invalid configuration",
            Self::Plan => "Invalid manifest",
            Self::Fetch => "Remote state unavailable",
            Self::Change => "Change cannot be applied",
            Self::Execution => "Statement rejected",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

fn join_urns(urns: &[Urn]) -> String {
    urns.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_cycles(cycles: &[Vec<Urn>]) -> String {
    cycles
        .iter()
        .map(|c| format!("[{}]", join_urns(c)))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur while planning or applying a blueprint.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The dependency graph has no valid level assignment.
    #[error("dependency cycle detected: {}", join_cycles(.cycles))]
    CycleDetected {
        /// Each group of resources that depend on one another in a loop.
        cycles: Vec<Vec<Urn>>,
    },

    /// A declaration references something that exists neither in the
    /// manifest nor in the account.
    #[error("{from} references {reference}, which is not declared and does not exist")]
    UnresolvedReference {
        /// The referencing resource.
        from: Urn,
        /// The missing resource.
        reference: Urn,
    },

    /// Two declarations share a URN but disagree on properties.
    #[error("conflicting declarations for {urn}")]
    ConflictingDeclaration {
        /// The contested URN.
        urn: Urn,
    },

    /// Fetching remote state failed.
    #[error("failed to fetch remote {resource_type} state: {message}")]
    RemoteFetch {
        /// Resource type being fetched.
        resource_type: ResourceType,
        /// Underlying error message.
        message: String,
    },

    /// An immutable field changed on a type that cannot be replaced.
    #[error("{urn} cannot be replaced to change immutable field '{field}'")]
    ReplaceNotSupported {
        /// The resource.
        urn: Urn,
        /// The immutable field that differs.
        field: String,
    },

    /// A removal was requested for a type outside the sync allow-list.
    #[error("removing {resource_type} resources is not allowed{}", .urn.as_ref().map(|u| format!(" ({u})")).unwrap_or_default())]
    UnsupportedSyncResource {
        /// The offending type.
        resource_type: ResourceType,
        /// The resource, when a specific removal triggered the error.
        urn: Option<Urn>,
    },

    /// The remote rejected a statement.
    #[error("statement failed for {urn}: {message}")]
    Execution {
        /// The change being applied.
        urn: Urn,
        /// Remote error message.
        message: String,
    },

    /// A declaration is malformed.
    #[error("invalid declaration {name}: {reason}")]
    InvalidDeclaration {
        /// Declared type and name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A URN string could not be parsed.
    #[error("invalid URN: {0}")]
    InvalidUrn(String),

    /// Declared resources fall outside the configured management scope.
    #[error("resources outside the {scope} scope: {}", join_urns(.urns))]
    NonConformingPlan {
        /// Configured scope.
        scope: String,
        /// Offending resources.
        urns: Vec<Urn>,
    },

    /// A declared field needs a higher account edition.
    #[error("{urn}: {feature} requires Enterprise edition or higher")]
    WrongEdition {
        /// Offending resource.
        urn: Urn,
        /// Field that needs the higher edition.
        feature: String,
    },

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No lifecycle is registered for a resource type.
    #[error("no lifecycle registered for {0}")]
    MissingLifecycle(ResourceType),

    /// The worker pool could not be created.
    #[error("failed to create worker pool: {0}")]
    WorkerPool(String),
}

impl Error {
    /// Create an invalid-declaration error.
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDeclaration {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a remote fetch error.
    pub fn fetch(resource_type: ResourceType, message: impl Into<String>) -> Self {
        Self::RemoteFetch {
            resource_type,
            message: message.into(),
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::CycleDetected { .. }
            | Error::UnresolvedReference { .. }
            | Error::ConflictingDeclaration { .. }
            | Error::InvalidDeclaration { .. }
            | Error::InvalidUrn(_)
            | Error::NonConformingPlan { .. }
            | Error::WrongEdition { .. }
            | Error::UnsupportedSyncResource { .. } => ErrorCategory::Plan,
            Error::RemoteFetch { .. } => ErrorCategory::Fetch,
            Error::ReplaceNotSupported { .. } => ErrorCategory::Change,
            Error::Execution { .. } => ErrorCategory::Execution,
            Error::InvalidConfig(_) | Error::MissingLifecycle(_) | Error::WorkerPool(_) => {
                ErrorCategory::Config
            }
        }
    }
}

/// Why a remote read failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// The session lacks the privilege to read this source.
    AccessDenied,
    /// Connection, authentication or protocol failure.
    Transport,
    /// Anything else.
    Other,
}

/// Error returned by a [`RemoteSource`](crate::fetch::RemoteSource).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct FetchError {
    /// What went wrong, which decides whether a fallback is allowed.
    pub kind: FetchErrorKind,
    /// Message reported by the source.
    pub message: String,
}

impl FetchError {
    /// The session may not read this source; bulk grant reads fall back.
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::AccessDenied,
            message: message.into(),
        }
    }

    /// The source could not be reached at all.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Transport,
            message: message.into(),
        }
    }
}

/// Error returned by a [`Session`](crate::context::Session) for one statement.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}{}", .code.map(|c| format!(" (error {c})")).unwrap_or_default())]
pub struct SessionError {
    /// Remote error code, when the remote reports one.
    pub code: Option<i64>,
    /// Message reported by the remote.
    pub message: String,
}

impl SessionError {
    /// An error without a remote code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// An error carrying the remote's numeric code.
    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}
