//! Waiting pool: guild members without a squad seat in that guild.
//!
//! Nothing is stored here. Every read is the set difference of the guild's
//! memberships and its squad memberships at the time of the call.

use crate::error::{MatchError, MatchResult};
use crate::profile::ProfileProvider;
use crate::storage::SquadStore;
use crate::types::{GuildId, UserId, UserProfile};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaitingPoolEntry {
    pub user_id: UserId,
    /// `None` when the user joined but has no finalized profile yet
    pub profile: Option<UserProfile>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct WaitingPool {
    store: Arc<dyn SquadStore>,
    profiles: Arc<dyn ProfileProvider>,
}

impl std::fmt::Debug for WaitingPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitingPool").finish_non_exhaustive()
    }
}

impl WaitingPool {
    pub fn new(store: Arc<dyn SquadStore>, profiles: Arc<dyn ProfileProvider>) -> Self {
        Self { store, profiles }
    }

    /// Unassigned members ordered by join time, then user id.
    pub fn user_ids(&self, guild_id: GuildId) -> MatchResult<Vec<UserId>> {
        Ok(self
            .unassigned(guild_id)?
            .into_iter()
            .map(|(user_id, _)| user_id)
            .collect())
    }

    /// Unassigned members with their profiles, in [`user_ids`](Self::user_ids) order.
    pub fn entries(&self, guild_id: GuildId) -> MatchResult<Vec<WaitingPoolEntry>> {
        self.unassigned(guild_id)?
            .into_iter()
            .map(|(user_id, joined_at)| {
                Ok(WaitingPoolEntry {
                    user_id,
                    profile: self.profiles.profile(user_id)?,
                    joined_at,
                })
            })
            .collect()
    }

    /// Record that `user_id` joined the guild. Returns `false` if the
    /// membership already existed; nothing is duplicated either way.
    pub fn add(&self, user_id: UserId, guild_id: GuildId) -> MatchResult<bool> {
        let created = self.store.add_guild_member(user_id, guild_id)?;
        debug!(guild = %guild_id, user = %user_id, created, "waiting pool membership");
        Ok(created)
    }

    fn unassigned(&self, guild_id: GuildId) -> MatchResult<Vec<(UserId, DateTime<Utc>)>> {
        if self.store.guild(guild_id)?.is_none() {
            return Err(MatchError::GuildNotFound { guild: guild_id });
        }
        let seated: HashSet<UserId> = self
            .store
            .guild_squad_memberships(guild_id)?
            .into_iter()
            .map(|m| m.user_id)
            .collect();
        Ok(self
            .store
            .guild_members(guild_id)?
            .into_iter()
            .filter(|m| !seated.contains(&m.user_id))
            .map(|m| (m.user_id, m.joined_at))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::MemoryProfileProvider;
    use crate::storage::{MemoryStore, SquadDraft};
    use crate::types::SquadStatus;

    fn setup() -> (MemoryStore, WaitingPool, MemoryProfileProvider, GuildId) {
        let store = MemoryStore::new();
        let guild = store.create_guild("g", "rust").unwrap().id;
        let profiles = MemoryProfileProvider::new();
        let pool = WaitingPool::new(Arc::new(store.clone()), Arc::new(profiles.clone()));
        (store, pool, profiles, guild)
    }

    #[test]
    fn test_pool_is_members_minus_seated() {
        let (store, pool, _, guild) = setup();
        for user in [3, 1, 2, 4] {
            pool.add(UserId(user), guild).unwrap();
        }
        store
            .insert_squad(
                SquadDraft {
                    guild_id: guild,
                    name: None,
                    status: SquadStatus::Forming,
                    average_skill_level: 0.0,
                },
                &[UserId(2)],
            )
            .unwrap();

        let ids = pool.user_ids(guild).unwrap();
        assert_eq!(ids.len(), 3);
        assert!(!ids.contains(&UserId(2)));
        // Reads never change anything
        assert_eq!(pool.user_ids(guild).unwrap(), ids);
    }

    #[test]
    fn test_add_is_idempotent() {
        let (_, pool, _, guild) = setup();
        assert!(pool.add(UserId(1), guild).unwrap());
        assert!(!pool.add(UserId(1), guild).unwrap());
        assert_eq!(pool.user_ids(guild).unwrap(), vec![UserId(1)]);
        assert!(matches!(
            pool.add(UserId(1), GuildId(77)),
            Err(MatchError::GuildNotFound { .. })
        ));
    }

    #[test]
    fn test_entries_carry_profiles() {
        let (_, pool, profiles, guild) = setup();
        profiles.insert(UserProfile {
            user_id: UserId(1),
            skill_level: 7,
            learning_velocity: 1.0,
            timezone_offset: 1.0,
            language: "de".to_string(),
            interest_area: "rust".to_string(),
        });
        pool.add(UserId(1), guild).unwrap();
        pool.add(UserId(2), guild).unwrap();

        let entries = pool.entries(guild).unwrap();
        let with_profile = entries.iter().find(|e| e.user_id == UserId(1)).unwrap();
        assert_eq!(with_profile.profile.as_ref().unwrap().skill_level, 7);
        let without = entries.iter().find(|e| e.user_id == UserId(2)).unwrap();
        assert!(without.profile.is_none());

        assert!(matches!(
            pool.entries(GuildId(5)),
            Err(MatchError::GuildNotFound { .. })
        ));
    }
}
