use super::{LeaseToken, MemberAppend, SquadDraft, SquadStore, StorageError, StorageResult};
use crate::types::{
    Guild, GuildId, GuildMembership, Squad, SquadId, SquadMembership, SquadStatus, UserId,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Every table behind one lock so multi-row writes are atomic.
#[derive(Debug)]
struct Tables {
    guilds: BTreeMap<GuildId, Guild>,
    guild_members: BTreeMap<(GuildId, UserId), GuildMembership>,
    squads: BTreeMap<SquadId, Squad>,
    squad_members: BTreeMap<SquadId, Vec<SquadMembership>>,
    /// Unique index on (user, guild) over squad memberships
    seats: HashMap<(UserId, GuildId), SquadId>,
    next_guild_id: u32,
    next_squad_id: u32,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            guilds: BTreeMap::new(),
            guild_members: BTreeMap::new(),
            squads: BTreeMap::new(),
            squad_members: BTreeMap::new(),
            seats: HashMap::new(),
            next_guild_id: 1,
            next_squad_id: 1,
        }
    }
}

impl Tables {
    fn ensure_guild_member(
        &mut self,
        user_id: UserId,
        guild_id: GuildId,
        now: DateTime<Utc>,
    ) -> bool {
        match self.guild_members.entry((guild_id, user_id)) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(GuildMembership {
                    user_id,
                    guild_id,
                    joined_at: now,
                });
                true
            }
        }
    }

    fn squad_mut(&mut self, squad_id: SquadId) -> StorageResult<&mut Squad> {
        self.squads
            .get_mut(&squad_id)
            .ok_or(StorageError::SquadNotFound(squad_id))
    }
}

#[derive(Debug, Clone, Copy)]
struct Lease {
    token: LeaseToken,
    expires_at: Instant,
}

/// In-process [`SquadStore`].
///
/// Cloning shares the underlying tables.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    leases: Arc<DashMap<GuildId, Lease>>,
    next_lease: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guild_count(&self) -> usize {
        self.tables.read().guilds.len()
    }

    pub fn squad_count(&self) -> usize {
        self.tables.read().squads.len()
    }

    /// Copy of every row, ordered by key.
    pub(super) fn export(
        &self,
    ) -> (
        Vec<Guild>,
        Vec<GuildMembership>,
        Vec<Squad>,
        Vec<SquadMembership>,
    ) {
        let tables = self.tables.read();
        (
            tables.guilds.values().cloned().collect(),
            tables.guild_members.values().cloned().collect(),
            tables.squads.values().cloned().collect(),
            tables.squad_members.values().flatten().cloned().collect(),
        )
    }

    /// Rebuild a store from exported rows, re-checking the unique indexes and
    /// the squad size bounds `min..=max`.
    pub(super) fn import(
        guilds: Vec<Guild>,
        guild_members: Vec<GuildMembership>,
        squads: Vec<Squad>,
        squad_members: Vec<SquadMembership>,
        (min, max): (usize, usize),
    ) -> StorageResult<Self> {
        let mut tables = Tables::default();

        for guild in guilds {
            tables.next_guild_id = tables.next_guild_id.max(guild.id.0 + 1);
            tables.guilds.insert(guild.id, guild);
        }
        for membership in guild_members {
            if !tables.guilds.contains_key(&membership.guild_id) {
                return Err(StorageError::GuildNotFound(membership.guild_id));
            }
            tables
                .guild_members
                .insert((membership.guild_id, membership.user_id), membership);
        }
        for squad in squads {
            if !tables.guilds.contains_key(&squad.guild_id) {
                return Err(StorageError::GuildNotFound(squad.guild_id));
            }
            tables.next_squad_id = tables.next_squad_id.max(squad.id.0 + 1);
            tables.squad_members.insert(squad.id, Vec::new());
            tables.squads.insert(squad.id, squad);
        }
        for membership in squad_members {
            let squad_guild = tables
                .squads
                .get(&membership.squad_id)
                .ok_or(StorageError::SquadNotFound(membership.squad_id))?
                .guild_id;
            if squad_guild != membership.guild_id {
                return Err(StorageError::InvalidDraft(format!(
                    "{} in {} is recorded under {} but the squad belongs to {}",
                    membership.user_id, membership.squad_id, membership.guild_id, squad_guild
                )));
            }
            let key = (membership.user_id, membership.guild_id);
            if let Some(&existing) = tables.seats.get(&key) {
                return Err(StorageError::SeatTaken {
                    user: membership.user_id,
                    guild: membership.guild_id,
                    squad: existing,
                });
            }
            let rows = tables
                .squad_members
                .get_mut(&membership.squad_id)
                .ok_or(StorageError::SquadNotFound(membership.squad_id))?;
            tables.seats.insert(key, membership.squad_id);
            rows.push(membership);
        }

        for (squad_id, squad) in tables.squads.iter_mut() {
            let count = tables.squad_members.get(squad_id).map_or(0, Vec::len);
            squad.member_count = count;
            if count > max {
                return Err(StorageError::InvalidDraft(format!(
                    "{squad_id} has {count} members, above the maximum of {max}"
                )));
            }
            if squad.status == SquadStatus::Active && count < min {
                return Err(StorageError::InvalidDraft(format!(
                    "{squad_id} is active with {count} members, below the minimum of {min}"
                )));
            }
        }

        Ok(Self {
            tables: Arc::new(RwLock::new(tables)),
            ..Self::default()
        })
    }
}

impl SquadStore for MemoryStore {
    fn create_guild(&self, name: &str, interest_area: &str) -> StorageResult<Guild> {
        let mut tables = self.tables.write();
        let guild = Guild {
            id: GuildId(tables.next_guild_id),
            name: name.to_string(),
            interest_area: interest_area.to_string(),
            created_at: Utc::now(),
        };
        tables.next_guild_id += 1;
        tables.guilds.insert(guild.id, guild.clone());
        Ok(guild)
    }

    fn guild(&self, guild_id: GuildId) -> StorageResult<Option<Guild>> {
        Ok(self.tables.read().guilds.get(&guild_id).cloned())
    }

    fn guilds(&self) -> StorageResult<Vec<Guild>> {
        Ok(self.tables.read().guilds.values().cloned().collect())
    }

    fn add_guild_member(&self, user_id: UserId, guild_id: GuildId) -> StorageResult<bool> {
        let mut tables = self.tables.write();
        if !tables.guilds.contains_key(&guild_id) {
            return Err(StorageError::GuildNotFound(guild_id));
        }
        Ok(tables.ensure_guild_member(user_id, guild_id, Utc::now()))
    }

    fn guild_members(&self, guild_id: GuildId) -> StorageResult<Vec<GuildMembership>> {
        let tables = self.tables.read();
        let mut members: Vec<GuildMembership> = tables
            .guild_members
            .range((guild_id, UserId(0))..=(guild_id, UserId(u32::MAX)))
            .map(|(_, membership)| membership.clone())
            .collect();
        members.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(members)
    }

    fn squad(&self, squad_id: SquadId) -> StorageResult<Option<Squad>> {
        Ok(self.tables.read().squads.get(&squad_id).cloned())
    }

    fn squads_in_guild(&self, guild_id: GuildId) -> StorageResult<Vec<Squad>> {
        Ok(self
            .tables
            .read()
            .squads
            .values()
            .filter(|squad| squad.guild_id == guild_id)
            .cloned()
            .collect())
    }

    fn squad_members(&self, squad_id: SquadId) -> StorageResult<Vec<SquadMembership>> {
        let tables = self.tables.read();
        tables
            .squad_members
            .get(&squad_id)
            .cloned()
            .ok_or(StorageError::SquadNotFound(squad_id))
    }

    fn guild_squad_memberships(&self, guild_id: GuildId) -> StorageResult<Vec<SquadMembership>> {
        let tables = self.tables.read();
        Ok(tables
            .squads
            .values()
            .filter(|squad| squad.guild_id == guild_id)
            .filter_map(|squad| tables.squad_members.get(&squad.id))
            .flatten()
            .cloned()
            .collect())
    }

    fn seat_in_guild(&self, user_id: UserId, guild_id: GuildId) -> StorageResult<Option<SquadId>> {
        Ok(self.tables.read().seats.get(&(user_id, guild_id)).copied())
    }

    fn insert_squad(&self, draft: SquadDraft, members: &[UserId]) -> StorageResult<Squad> {
        let mut seen = HashSet::with_capacity(members.len());
        if let Some(duplicate) = members.iter().find(|user| !seen.insert(**user)) {
            return Err(StorageError::InvalidDraft(format!(
                "{duplicate} listed more than once"
            )));
        }

        let mut tables = self.tables.write();
        let guild = tables
            .guilds
            .get(&draft.guild_id)
            .cloned()
            .ok_or(StorageError::GuildNotFound(draft.guild_id))?;

        // Check every seat before writing anything
        for &user in members {
            if let Some(&squad) = tables.seats.get(&(user, guild.id)) {
                return Err(StorageError::SeatTaken {
                    user,
                    guild: guild.id,
                    squad,
                });
            }
        }

        let now = Utc::now();
        let squad_id = SquadId(tables.next_squad_id);
        tables.next_squad_id += 1;

        let name = match draft.name {
            Some(name) => name,
            None => {
                let existing = tables
                    .squads
                    .values()
                    .filter(|squad| squad.guild_id == guild.id)
                    .count();
                format!("{} Squad {}", guild.name, existing + 1)
            }
        };

        let squad = Squad {
            id: squad_id,
            guild_id: guild.id,
            name,
            status: draft.status,
            member_count: members.len(),
            average_skill_level: draft.average_skill_level,
            created_at: now,
            version: 0,
        };

        let rows = members
            .iter()
            .map(|&user_id| SquadMembership {
                user_id,
                squad_id,
                guild_id: guild.id,
                joined_at: now,
            })
            .collect();
        for &user in members {
            tables.seats.insert((user, guild.id), squad_id);
            tables.ensure_guild_member(user, guild.id, now);
        }
        tables.squad_members.insert(squad_id, rows);
        tables.squads.insert(squad_id, squad.clone());

        Ok(squad)
    }

    fn append_member(&self, squad_id: SquadId, append: MemberAppend) -> StorageResult<Squad> {
        let mut tables = self.tables.write();
        let squad = tables
            .squads
            .get(&squad_id)
            .cloned()
            .ok_or(StorageError::SquadNotFound(squad_id))?;

        if !squad.status.is_open() {
            return Err(StorageError::Closed {
                squad: squad_id,
                status: squad.status,
            });
        }
        let already_in = tables
            .squad_members
            .get(&squad_id)
            .is_some_and(|rows| rows.iter().any(|m| m.user_id == append.user_id));
        if already_in {
            return Err(StorageError::DuplicateMembership {
                user: append.user_id,
                squad: squad_id,
            });
        }
        if let Some(&held) = tables.seats.get(&(append.user_id, squad.guild_id)) {
            return Err(StorageError::SeatTaken {
                user: append.user_id,
                guild: squad.guild_id,
                squad: held,
            });
        }
        if squad.version != append.expected_version {
            return Err(StorageError::VersionConflict {
                squad: squad_id,
                expected: append.expected_version,
                actual: squad.version,
            });
        }
        if squad.member_count >= append.capacity {
            return Err(StorageError::CapacityExceeded {
                squad: squad_id,
                capacity: append.capacity,
            });
        }

        let now = Utc::now();
        tables
            .squad_members
            .entry(squad_id)
            .or_default()
            .push(SquadMembership {
                user_id: append.user_id,
                squad_id,
                guild_id: squad.guild_id,
                joined_at: now,
            });
        tables
            .seats
            .insert((append.user_id, squad.guild_id), squad_id);
        tables.ensure_guild_member(append.user_id, squad.guild_id, now);

        let stored = tables.squad_mut(squad_id)?;
        stored.member_count += 1;
        stored.average_skill_level = append.average_skill_level;
        stored.status = append.status;
        stored.version += 1;
        Ok(stored.clone())
    }

    fn update_status(&self, squad_id: SquadId, status: SquadStatus) -> StorageResult<Squad> {
        let mut tables = self.tables.write();
        let stored = tables.squad_mut(squad_id)?;
        if stored.status != status {
            stored.status = status;
            stored.version += 1;
        }
        Ok(stored.clone())
    }

    fn acquire_formation_lease(
        &self,
        guild_id: GuildId,
        ttl: Duration,
    ) -> StorageResult<Option<LeaseToken>> {
        if !self.tables.read().guilds.contains_key(&guild_id) {
            return Err(StorageError::GuildNotFound(guild_id));
        }

        let now = Instant::now();
        let lease = Lease {
            token: LeaseToken(self.next_lease.fetch_add(1, Ordering::Relaxed) + 1),
            expires_at: now + ttl,
        };
        match self.leases.entry(guild_id) {
            Entry::Occupied(mut entry) => {
                if entry.get().expires_at > now {
                    return Ok(None);
                }
                entry.insert(lease);
            }
            Entry::Vacant(entry) => {
                entry.insert(lease);
            }
        }
        Ok(Some(lease.token))
    }

    fn release_formation_lease(&self, guild_id: GuildId, token: LeaseToken) -> StorageResult<bool> {
        Ok(self
            .leases
            .remove_if(&guild_id, |_, lease| lease.token == token)
            .is_some())
    }
}
