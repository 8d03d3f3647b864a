use crate::types::{GuildId, SquadId, SquadStatus, UserId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Guild not found: {0}")]
    GuildNotFound(GuildId),

    #[error("Squad not found: {0}")]
    SquadNotFound(SquadId),

    #[error("Unique constraint violated: {user} is already in {squad}")]
    DuplicateMembership { user: UserId, squad: SquadId },

    #[error("Unique constraint violated: {user} already holds a seat in {squad} of {guild}")]
    SeatTaken {
        user: UserId,
        guild: GuildId,
        squad: SquadId,
    },

    #[error("Version conflict on {squad}: expected {expected}, found {actual}")]
    VersionConflict {
        squad: SquadId,
        expected: u64,
        actual: u64,
    },

    #[error("{squad} is at capacity ({capacity})")]
    CapacityExceeded { squad: SquadId, capacity: usize },

    #[error("{squad} is {status}")]
    Closed { squad: SquadId, status: SquadStatus },

    #[error("Invalid squad draft: {0}")]
    InvalidDraft(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StorageResult<T> = Result<T, StorageError>;
