//! Per-guild formation lease held for the length of one pass.

use crate::error::{MatchError, MatchResult};
use crate::storage::{LeaseToken, SquadStore};
use crate::types::GuildId;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Holds a guild's formation lease until released or dropped.
///
/// The lease lives in the store, so passes in other processes sharing the
/// store are excluded too. The TTL bounds how long a crashed holder blocks
/// the guild.
pub struct FormationLease {
    store: Arc<dyn SquadStore>,
    guild_id: GuildId,
    token: LeaseToken,
    released: bool,
}

impl std::fmt::Debug for FormationLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormationLease")
            .field("guild_id", &self.guild_id)
            .field("token", &self.token)
            .field("released", &self.released)
            .finish()
    }
}

impl FormationLease {
    /// Take the lease or fail with `FormationInProgress`.
    pub fn acquire(
        store: Arc<dyn SquadStore>,
        guild_id: GuildId,
        ttl: Duration,
    ) -> MatchResult<Self> {
        let token = store
            .acquire_formation_lease(guild_id, ttl)?
            .ok_or(MatchError::FormationInProgress { guild: guild_id })?;
        debug!(guild = %guild_id, token = token.0, "formation lease acquired");
        Ok(Self {
            store,
            guild_id,
            token,
            released: false,
        })
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn token(&self) -> LeaseToken {
        self.token
    }

    /// Release explicitly. Returns `false` if the lease had already expired
    /// and been taken over.
    pub fn release(mut self) -> MatchResult<bool> {
        self.released = true;
        let held = self
            .store
            .release_formation_lease(self.guild_id, self.token)?;
        if !held {
            warn!(guild = %self.guild_id, "formation lease expired before release");
        }
        Ok(held)
    }
}

impl Drop for FormationLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self
            .store
            .release_formation_lease(self.guild_id, self.token)
        {
            Ok(_) => debug!(guild = %self.guild_id, "formation lease released on drop"),
            Err(e) => warn!(guild = %self.guild_id, "failed to release formation lease: {e}"),
        }
    }
}
