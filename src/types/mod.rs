use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest squad that may be ACTIVE.
pub const MIN_SQUAD_SIZE: usize = 12;

/// Hard capacity of a squad.
pub const MAX_SQUAD_SIZE: usize = 15;

/// Minimum pairwise similarity between any two squad members (inclusive).
pub const MIN_SIMILARITY_THRESHOLD: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GuildId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SquadId(pub u32);

impl UserId {
    pub fn new(value: u32) -> Option<Self> {
        if value == 0 { None } else { Some(Self(value)) }
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl GuildId {
    pub fn new(value: u32) -> Option<Self> {
        if value == 0 { None } else { Some(Self(value)) }
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl SquadId {
    pub fn new(value: u32) -> Option<Self> {
        if value == 0 { None } else { Some(Self(value)) }
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "guild:{}", self.0)
    }
}

impl fmt::Display for SquadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "squad:{}", self.0)
    }
}

/// A community scoped to one interest area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guild {
    pub id: GuildId,
    pub name: String,
    pub interest_area: String,
    pub created_at: DateTime<Utc>,
}

/// Squad lifecycle.
///
/// `Forming -> Active` happens exactly once, when the member count first
/// reaches the minimum squad size. `Completed` is set by an external signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SquadStatus {
    Forming,
    Active,
    Completed,
}

impl SquadStatus {
    /// Whether the squad still takes members.
    pub fn is_open(&self) -> bool {
        matches!(self, SquadStatus::Forming | SquadStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SquadStatus::Forming => "FORMING",
            SquadStatus::Active => "ACTIVE",
            SquadStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for SquadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cohort of guild members.
///
/// `member_count` and `average_skill_level` are cached; the membership
/// table is the source of truth. `version` backs optimistic updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Squad {
    pub id: SquadId,
    pub guild_id: GuildId,
    pub name: String,
    pub status: SquadStatus,
    pub member_count: usize,
    pub average_skill_level: f32,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

impl Squad {
    /// Free seats left under `max_size`.
    pub fn available_slots(&self, max_size: usize) -> usize {
        max_size.saturating_sub(self.member_count)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquadMembership {
    pub user_id: UserId,
    pub squad_id: SquadId,
    pub guild_id: GuildId,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildMembership {
    pub user_id: UserId,
    pub guild_id: GuildId,
    pub joined_at: DateTime<Utc>,
}

/// Matching-relevant attributes of a user, as reported by the profile provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    /// 1 to 10
    pub skill_level: u8,
    pub learning_velocity: f32,
    /// Hours from UTC, fractional offsets allowed
    pub timezone_offset: f32,
    pub language: String,
    pub interest_area: String,
}
