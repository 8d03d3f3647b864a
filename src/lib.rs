//! Squad formation and compatibility matching for learning guilds.
//!
//! Guild members are grouped into squads of 12 to 15 people whose profile
//! embeddings are pairwise similar. [`MatchingService`] is the entry point;
//! the storage, index, profile and notification backends are injected
//! behind traits.

pub mod compatibility;
pub mod config;
pub mod display;
pub mod error;
pub mod fixture;
pub mod formation;
pub mod io;
pub mod matching;
pub mod notify;
pub mod profile;
pub mod similarity;
pub mod squad;
pub mod storage;
pub mod types;
pub mod vector;

// Explicit exports for better API clarity
pub use compatibility::{CompatibilityVerifier, GroupVerdict, Violation};
pub use config::Settings;
pub use error::{ErrorKind, MatchError, MatchResult};
pub use formation::{CompatibilityGroup, GroupFormation};
pub use matching::{JoinOutcome, MatchingService, PoolMatchReport, PoolScanner, ScanSummary};
pub use notify::{NotificationDispatcher, SquadEvent};
pub use profile::ProfileProvider;
pub use similarity::{RetryPolicy, SimilarityEngine};
pub use squad::{Admission, SquadMatch, SquadRegistry, WaitingPoolEntry};
pub use storage::{MemoryStore, SquadStore, StorageError, StorageResult};
pub use types::{
    Guild, GuildId, MAX_SQUAD_SIZE, MIN_SIMILARITY_THRESHOLD, MIN_SQUAD_SIZE, Squad, SquadId,
    SquadStatus, UserId, UserProfile,
};
pub use vector::{EmbeddingIndex, MemoryEmbeddingIndex, VectorError};
