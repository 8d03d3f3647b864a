//! Profile lookup used to check a user is eligible for matching.

use crate::error::{MatchError, MatchResult};
use crate::similarity::SimilarityEngine;
use crate::types::{UserId, UserProfile};
use dashmap::DashMap;
use std::sync::Arc;

pub trait ProfileProvider: Send + Sync {
    /// `None` when the user has no finalized profile.
    fn profile(&self, user_id: UserId) -> MatchResult<Option<UserProfile>>;

    /// Like [`profile`](Self::profile) but fails with `UserNotFound`.
    fn require(&self, user_id: UserId) -> MatchResult<UserProfile> {
        self.profile(user_id)?
            .ok_or(MatchError::UserNotFound { user: user_id })
    }
}

/// Reads profiles out of the embedding metadata.
///
/// Embedding records carry the same attributes a profile does, so a user
/// with a stored vector has a profile and vice versa.
#[derive(Debug, Clone)]
pub struct IndexProfileProvider {
    engine: Arc<SimilarityEngine>,
}

impl IndexProfileProvider {
    pub fn new(engine: Arc<SimilarityEngine>) -> Self {
        Self { engine }
    }
}

impl ProfileProvider for IndexProfileProvider {
    fn profile(&self, user_id: UserId) -> MatchResult<Option<UserProfile>> {
        let record = match self.engine.record(user_id) {
            Ok(record) => record,
            Err(MatchError::EmbeddingNotFound { .. }) => return Ok(None),
            Err(other) => return Err(other),
        };
        let meta = record.metadata;
        Ok(Some(UserProfile {
            user_id,
            skill_level: meta.skill_level,
            learning_velocity: meta.learning_velocity,
            timezone_offset: meta.timezone_offset,
            language: meta.language,
            interest_area: meta.interest_area,
        }))
    }
}

/// Profiles held in memory, independent of any embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryProfileProvider {
    profiles: Arc<DashMap<UserId, UserProfile>>,
}

impl MemoryProfileProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: UserProfile) {
        self.profiles.insert(profile.user_id, profile);
    }

    pub fn remove(&self, user_id: UserId) -> Option<UserProfile> {
        self.profiles.remove(&user_id).map(|(_, profile)| profile)
    }
}

impl ProfileProvider for MemoryProfileProvider {
    fn profile(&self, user_id: UserId) -> MatchResult<Option<UserProfile>> {
        Ok(self.profiles.get(&user_id).map(|entry| entry.value().clone()))
    }
}
