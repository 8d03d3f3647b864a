//! Guild, squad and membership storage.
//!
//! The store is the only place where membership invariants are enforced
//! atomically: one seat per (user, squad) and per (user, guild), capacity
//! checked against an optimistic version, and a per-guild formation lease.
//! Callers never hold a lock across a store call.

mod error;
mod memory;
mod snapshot;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use snapshot::StoreSnapshot;

use crate::types::{
    Guild, GuildId, GuildMembership, Squad, SquadId, SquadMembership, SquadStatus, UserId,
};
use std::time::Duration;

/// A squad about to be inserted together with its initial roster.
#[derive(Debug, Clone, PartialEq)]
pub struct SquadDraft {
    pub guild_id: GuildId,
    /// `None` lets the store assign `"<guild name> Squad <n>"`
    pub name: Option<String>,
    pub status: SquadStatus,
    pub average_skill_level: f32,
}

/// Conditional single-member append.
///
/// Applied only if the squad is still at `expected_version`, has fewer than
/// `capacity` members and is open.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberAppend {
    pub user_id: UserId,
    pub expected_version: u64,
    pub capacity: usize,
    /// Cached average after the append
    pub average_skill_level: f32,
    /// Status after the append
    pub status: SquadStatus,
}

/// Proof of holding a guild's formation lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseToken(pub u64);

pub trait SquadStore: Send + Sync {
    fn create_guild(&self, name: &str, interest_area: &str) -> StorageResult<Guild>;

    fn guild(&self, guild_id: GuildId) -> StorageResult<Option<Guild>>;

    fn guilds(&self) -> StorageResult<Vec<Guild>>;

    /// Record a guild membership. Returns `false` if it already existed.
    fn add_guild_member(&self, user_id: UserId, guild_id: GuildId) -> StorageResult<bool>;

    /// Members ordered by join time, then user id.
    fn guild_members(&self, guild_id: GuildId) -> StorageResult<Vec<GuildMembership>>;

    fn squad(&self, squad_id: SquadId) -> StorageResult<Option<Squad>>;

    fn squads_in_guild(&self, guild_id: GuildId) -> StorageResult<Vec<Squad>>;

    fn squad_members(&self, squad_id: SquadId) -> StorageResult<Vec<SquadMembership>>;

    /// Every squad membership held in the guild.
    fn guild_squad_memberships(&self, guild_id: GuildId) -> StorageResult<Vec<SquadMembership>>;

    fn seat_in_guild(&self, user_id: UserId, guild_id: GuildId) -> StorageResult<Option<SquadId>>;

    /// Insert a squad and its whole roster in one unit. Nothing is written
    /// if any member already holds a seat in the guild.
    fn insert_squad(&self, draft: SquadDraft, members: &[UserId]) -> StorageResult<Squad>;

    fn append_member(&self, squad_id: SquadId, append: MemberAppend) -> StorageResult<Squad>;

    fn update_status(&self, squad_id: SquadId, status: SquadStatus) -> StorageResult<Squad>;

    /// Try to take the guild's formation lease. `None` when another holder's
    /// lease has not expired.
    fn acquire_formation_lease(
        &self,
        guild_id: GuildId,
        ttl: Duration,
    ) -> StorageResult<Option<LeaseToken>>;

    /// Release a lease. Returns `false` if `token` no longer holds it.
    fn release_formation_lease(&self, guild_id: GuildId, token: LeaseToken) -> StorageResult<bool>;
}
