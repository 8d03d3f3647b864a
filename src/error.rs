//! Error types for squad matching
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages.

use crate::compatibility::Violation;
use crate::storage::StorageError;
use crate::types::{GuildId, SquadId, SquadStatus, UserId};
use crate::vector::VectorError;
use thiserror::Error;

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Guild, squad, user or embedding absent. Not retried.
    NotFound,
    /// Size bounds, duplicate membership, full or closed squad. Not retried.
    Validation,
    /// One or more member pairs below the similarity threshold.
    Compatibility,
    /// Index or store failure that survived the retry budget.
    Transient,
    /// Lost an optimistic update or a formation lease.
    Conflict,
    /// Configuration or backend invariant failures.
    Internal,
}

/// Main error type for matching operations
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Guild {guild} not found")]
    GuildNotFound { guild: GuildId },

    #[error("Squad {squad} not found")]
    SquadNotFound { squad: SquadId },

    #[error("User {user} has no profile. Finish onboarding before matching.")]
    UserNotFound { user: UserId },

    #[error("No embedding stored for {user}. The profile may not be finalized yet.")]
    EmbeddingNotFound { user: UserId },

    #[error("Squad size {size} is outside the allowed range [{min}, {max}]")]
    InvalidSquadSize { size: usize, min: usize, max: usize },

    #[error("{user} appears more than once in the member list")]
    DuplicateMember { user: UserId },

    #[error("{user} is already a member of {squad}")]
    AlreadyMember { user: UserId, squad: SquadId },

    #[error("{user} already has a seat in {squad} of {guild}")]
    SeatTaken {
        user: UserId,
        guild: GuildId,
        squad: SquadId,
    },

    #[error("Squad {squad} is full ({max} members)")]
    SquadFull { squad: SquadId, max: usize },

    #[error("Squad {squad} is {status} and no longer accepts members")]
    SquadClosed { squad: SquadId, status: SquadStatus },

    #[error(
        "{} pair(s) below similarity threshold {threshold}: {}",
        .violations.len(),
        describe_violations(.violations)
    )]
    CompatibilityViolation {
        threshold: f32,
        violations: Vec<Violation>,
    },

    #[error("Compatibility check could not complete: {source}")]
    CompatibilityCheck { source: Box<MatchError> },

    #[error("Embedding index {operation} failed after {attempts} attempt(s): {cause}")]
    TransientIndexFailure {
        operation: &'static str,
        attempts: u32,
        cause: VectorError,
    },

    #[error("Embedding index error: {0}")]
    Index(VectorError),

    #[error("Concurrent update on {squad} lost the race")]
    ConcurrencyConflict { squad: SquadId },

    #[error("A formation pass is already running for {guild}")]
    FormationInProgress { guild: GuildId },

    #[error("Storage error: {0}")]
    Storage(#[source] StorageError),

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Background task failed: {reason}")]
    TaskFailed { reason: String },
}

fn describe_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("({}, {}) = {:.3}", v.user_a, v.user_b, v.score))
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<VectorError> for MatchError {
    fn from(error: VectorError) -> Self {
        MatchError::Index(error)
    }
}

/// Constraint failures reported by the store map onto the matching
/// taxonomy; anything else stays a storage error.
impl From<StorageError> for MatchError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::GuildNotFound(guild) => Self::GuildNotFound { guild },
            StorageError::SquadNotFound(squad) => Self::SquadNotFound { squad },
            StorageError::DuplicateMembership { user, squad } => Self::AlreadyMember { user, squad },
            StorageError::SeatTaken { user, guild, squad } => Self::SeatTaken { user, guild, squad },
            StorageError::CapacityExceeded { squad, capacity } => Self::SquadFull {
                squad,
                max: capacity,
            },
            StorageError::Closed { squad, status } => Self::SquadClosed { squad, status },
            StorageError::VersionConflict { squad, .. } => Self::ConcurrencyConflict { squad },
            other => Self::Storage(other),
        }
    }
}

impl MatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::GuildNotFound { .. }
            | Self::SquadNotFound { .. }
            | Self::UserNotFound { .. }
            | Self::EmbeddingNotFound { .. } => ErrorKind::NotFound,
            Self::InvalidSquadSize { .. }
            | Self::DuplicateMember { .. }
            | Self::AlreadyMember { .. }
            | Self::SeatTaken { .. }
            | Self::SquadFull { .. }
            | Self::SquadClosed { .. } => ErrorKind::Validation,
            Self::CompatibilityViolation { .. } => ErrorKind::Compatibility,
            Self::CompatibilityCheck { source } => match source.kind() {
                ErrorKind::Compatibility => ErrorKind::Internal,
                other => other,
            },
            Self::TransientIndexFailure { .. } => ErrorKind::Transient,
            Self::ConcurrencyConflict { .. } | Self::FormationInProgress { .. } => {
                ErrorKind::Conflict
            }
            Self::Storage(StorageError::Unavailable(_)) => ErrorKind::Transient,
            Self::Index(_) | Self::Storage(_) | Self::Config { .. } | Self::TaskFailed { .. } => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether the failure came from a similarity lookup rather than
    /// from the data being checked.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingNotFound { .. }
                | Self::TransientIndexFailure { .. }
                | Self::Index(_)
                | Self::CompatibilityCheck { .. }
        )
    }

    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::GuildNotFound { .. } => "GUILD_NOT_FOUND",
            Self::SquadNotFound { .. } => "SQUAD_NOT_FOUND",
            Self::UserNotFound { .. } => "USER_NOT_FOUND",
            Self::EmbeddingNotFound { .. } => "EMBEDDING_NOT_FOUND",
            Self::InvalidSquadSize { .. } => "INVALID_SQUAD_SIZE",
            Self::DuplicateMember { .. } => "DUPLICATE_MEMBER",
            Self::AlreadyMember { .. } => "ALREADY_MEMBER",
            Self::SeatTaken { .. } => "SEAT_TAKEN",
            Self::SquadFull { .. } => "SQUAD_FULL",
            Self::SquadClosed { .. } => "SQUAD_CLOSED",
            Self::CompatibilityViolation { .. } => "COMPATIBILITY_VIOLATION",
            Self::CompatibilityCheck { .. } => "COMPATIBILITY_CHECK_FAILED",
            Self::TransientIndexFailure { .. } => "INDEX_UNAVAILABLE",
            Self::Index(_) => "INDEX_ERROR",
            Self::ConcurrencyConflict { .. } => "CONCURRENCY_CONFLICT",
            Self::FormationInProgress { .. } => "FORMATION_IN_PROGRESS",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::TaskFailed { .. } => "TASK_FAILED",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::EmbeddingNotFound { .. } | Self::UserNotFound { .. } => vec![
                "Complete the profile so an embedding can be generated",
                "Retry once the profile pipeline has upserted the vector",
            ],
            Self::SquadFull { .. } => vec![
                "Try the next ranked squad match",
                "Join the waiting pool to be placed in a new squad",
            ],
            Self::CompatibilityViolation { .. } => vec![
                "Try another squad candidate",
                "Fall back to the waiting pool",
            ],
            Self::TransientIndexFailure { .. } => vec![
                "The vector store did not respond; retry later",
                "Raise index.retry_max_attempts or index.timeout_ms if this persists",
            ],
            Self::FormationInProgress { .. } => vec![
                "Another pass is placing this guild's waiting pool; results appear when it finishes",
            ],
            Self::Config { .. } => vec![
                "Check .squadmatch/settings.toml and SQ_ environment variables",
                "Run 'squadmatch init --force' to regenerate defaults",
            ],
            _ => vec![],
        }
    }
}

/// Result type alias for matching operations
pub type MatchResult<T> = Result<T, MatchError>;
