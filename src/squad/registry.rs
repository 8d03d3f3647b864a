//! The only writer of squad state.
//!
//! Every mutation goes through the store's conditional operations. The
//! registry reads, checks compatibility without holding any lock, and then
//! asks the store to apply the change only if nothing moved underneath it.

use crate::compatibility::{CompatibilityVerifier, Violation, meets_threshold};
use crate::config::MatchingConfig;
use crate::error::{MatchError, MatchResult};
use crate::profile::ProfileProvider;
use crate::storage::{MemberAppend, SquadDraft, SquadStore, StorageError};
use crate::types::{Guild, GuildId, Squad, SquadId, SquadStatus, UserId};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of trying to seat a user in an existing squad.
///
/// Expected refusals are values, not errors, so callers can move on to the
/// next candidate squad without inspecting error types.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Joined(Squad),
    Full,
    AlreadyMember,
    /// The user already sits in this other squad of the same guild
    SeatTaken(SquadId),
    Incompatible(Vec<Violation>),
    Closed,
}

impl Admission {
    pub fn is_joined(&self) -> bool {
        matches!(self, Admission::Joined(_))
    }
}

/// An existing squad ranked for a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SquadMatch {
    pub squad_id: SquadId,
    pub squad_name: String,
    pub member_count: usize,
    pub average_similarity: f32,
    pub status: SquadStatus,
    pub available_slots: usize,
}

pub struct SquadRegistry {
    store: Arc<dyn SquadStore>,
    verifier: CompatibilityVerifier,
    profiles: Arc<dyn ProfileProvider>,
    config: MatchingConfig,
}

impl std::fmt::Debug for SquadRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SquadRegistry")
            .field("verifier", &self.verifier)
            .field("config", &self.config)
            .finish()
    }
}

impl SquadRegistry {
    pub fn new(
        store: Arc<dyn SquadStore>,
        verifier: CompatibilityVerifier,
        profiles: Arc<dyn ProfileProvider>,
        config: MatchingConfig,
    ) -> Self {
        Self {
            store,
            verifier,
            profiles,
            config,
        }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    pub fn verifier(&self) -> &CompatibilityVerifier {
        &self.verifier
    }

    pub fn guild(&self, guild_id: GuildId) -> MatchResult<Guild> {
        self.store
            .guild(guild_id)?
            .ok_or(MatchError::GuildNotFound { guild: guild_id })
    }

    pub fn squad(&self, squad_id: SquadId) -> MatchResult<Squad> {
        self.store
            .squad(squad_id)?
            .ok_or(MatchError::SquadNotFound { squad: squad_id })
    }

    pub fn squads(&self, guild_id: GuildId) -> MatchResult<Vec<Squad>> {
        self.guild(guild_id)?;
        Ok(self.store.squads_in_guild(guild_id)?)
    }

    pub fn member_ids(&self, squad_id: SquadId) -> MatchResult<Vec<UserId>> {
        Ok(self
            .store
            .squad_members(squad_id)?
            .into_iter()
            .map(|m| m.user_id)
            .collect())
    }

    /// Create an ACTIVE squad from a full initial roster.
    ///
    /// The roster must be within the size bounds, every member needs a
    /// profile and an embedding, and every pair must be compatible. All
    /// violating pairs are reported at once.
    pub fn create_squad(
        &self,
        guild_id: GuildId,
        member_ids: &[UserId],
        name: Option<&str>,
    ) -> MatchResult<Squad> {
        self.guild(guild_id)?;

        let (min, max) = (self.config.min_squad_size, self.config.max_squad_size);
        if member_ids.len() < min || member_ids.len() > max {
            return Err(MatchError::InvalidSquadSize {
                size: member_ids.len(),
                min,
                max,
            });
        }

        let mut seen = HashSet::with_capacity(member_ids.len());
        if let Some(&user) = member_ids.iter().find(|user| !seen.insert(**user)) {
            return Err(MatchError::DuplicateMember { user });
        }

        let mut skill_total = 0u32;
        for &user in member_ids {
            let profile = self.profiles.require(user)?;
            if !self.verifier.engine().has_embedding(user)? {
                return Err(MatchError::EmbeddingNotFound { user });
            }
            skill_total += u32::from(profile.skill_level);
        }

        self.verifier
            .verify_group(member_ids)?
            .into_result(self.verifier.threshold())?;

        let squad = self.store.insert_squad(
            SquadDraft {
                guild_id,
                name: name.map(str::to_string),
                status: SquadStatus::Active,
                average_skill_level: skill_total as f32 / member_ids.len() as f32,
            },
            member_ids,
        )?;

        info!(
            guild = %guild_id,
            squad = %squad.id,
            members = squad.member_count,
            "created squad {:?}",
            squad.name
        );
        Ok(squad)
    }

    /// Create an empty FORMING squad that members join one at a time.
    pub fn open_squad(&self, guild_id: GuildId, name: Option<&str>) -> MatchResult<Squad> {
        self.guild(guild_id)?;
        let squad = self.store.insert_squad(
            SquadDraft {
                guild_id,
                name: name.map(str::to_string),
                status: SquadStatus::Forming,
                average_skill_level: 0.0,
            },
            &[],
        )?;
        info!(guild = %guild_id, squad = %squad.id, "opened squad {:?}", squad.name);
        Ok(squad)
    }

    /// Mark a squad COMPLETED. Completed squads take no further members.
    pub fn complete_squad(&self, squad_id: SquadId) -> MatchResult<Squad> {
        let squad = self.squad(squad_id)?;
        if squad.status == SquadStatus::Completed {
            return Ok(squad);
        }
        let squad = self.store.update_status(squad_id, SquadStatus::Completed)?;
        info!(squad = %squad_id, "squad completed");
        Ok(squad)
    }

    /// Try to seat `user_id` in `squad_id`.
    ///
    /// Capacity and membership are re-checked by the store against the
    /// version read here. A lost race is retried once with a fresh read; a
    /// second loss is reported as [`Admission::Full`].
    pub fn try_add_member(&self, squad_id: SquadId, user_id: UserId) -> MatchResult<Admission> {
        let max = self.config.max_squad_size;
        let mut lost_races = 0;

        loop {
            let squad = self.squad(squad_id)?;
            if !squad.status.is_open() {
                return Ok(Admission::Closed);
            }
            let members = self.member_ids(squad_id)?;
            if members.contains(&user_id) {
                return Ok(Admission::AlreadyMember);
            }
            if squad.member_count >= max {
                return Ok(Admission::Full);
            }
            if let Some(seat) = self.store.seat_in_guild(user_id, squad.guild_id)? {
                return Ok(Admission::SeatTaken(seat));
            }

            let profile = self.profiles.require(user_id)?;
            let verdict = self.verifier.verify_member(user_id, &members)?;
            if !verdict.ok {
                debug!(
                    squad = %squad_id,
                    user = %user_id,
                    violations = verdict.violations.len(),
                    "candidate incompatible with current members"
                );
                return Ok(Admission::Incompatible(verdict.violations));
            }

            let count = squad.member_count + 1;
            let average_skill_level = (squad.average_skill_level * squad.member_count as f32
                + f32::from(profile.skill_level))
                / count as f32;
            let activates =
                squad.status == SquadStatus::Forming && count >= self.config.min_squad_size;
            let status = if activates {
                SquadStatus::Active
            } else {
                squad.status
            };

            let append = MemberAppend {
                user_id,
                expected_version: squad.version,
                capacity: max,
                average_skill_level,
                status,
            };
            match self.store.append_member(squad_id, append) {
                Ok(updated) => {
                    if activates {
                        info!(
                            squad = %squad_id,
                            members = updated.member_count,
                            "squad is now ACTIVE"
                        );
                    }
                    debug!(squad = %squad_id, user = %user_id, "member added");
                    return Ok(Admission::Joined(updated));
                }
                Err(StorageError::VersionConflict { .. }) => {
                    lost_races += 1;
                    if lost_races > 1 {
                        debug!(squad = %squad_id, user = %user_id, "lost the race twice");
                        return Ok(Admission::Full);
                    }
                    debug!(squad = %squad_id, user = %user_id, "lost the race, re-reading");
                }
                Err(StorageError::CapacityExceeded { .. }) => return Ok(Admission::Full),
                Err(StorageError::DuplicateMembership { .. }) => {
                    return Ok(Admission::AlreadyMember);
                }
                Err(StorageError::SeatTaken { squad, .. }) => {
                    return Ok(Admission::SeatTaken(squad));
                }
                Err(StorageError::Closed { .. }) => return Ok(Admission::Closed),
                Err(other) => return Err(other.into()),
            }
        }
    }

    /// Like [`try_add_member`](Self::try_add_member) but every refusal is
    /// an error.
    pub fn add_member(&self, squad_id: SquadId, user_id: UserId) -> MatchResult<Squad> {
        match self.try_add_member(squad_id, user_id)? {
            Admission::Joined(squad) => Ok(squad),
            Admission::Full => Err(MatchError::SquadFull {
                squad: squad_id,
                max: self.config.max_squad_size,
            }),
            Admission::AlreadyMember => Err(MatchError::AlreadyMember {
                user: user_id,
                squad: squad_id,
            }),
            Admission::SeatTaken(held) => Err(MatchError::SeatTaken {
                user: user_id,
                guild: self.squad(held)?.guild_id,
                squad: held,
            }),
            Admission::Incompatible(violations) => Err(MatchError::CompatibilityViolation {
                threshold: self.verifier.threshold(),
                violations,
            }),
            Admission::Closed => Err(MatchError::SquadClosed {
                squad: squad_id,
                status: self.squad(squad_id)?.status,
            }),
        }
    }

    /// Rank the guild's open squads for `user_id`. Read-only.
    ///
    /// A squad is scored by the mean similarity between the user and those
    /// of its members that appear among the user's `top_k` most similar
    /// users. Squads with no such member are left out entirely, as are
    /// squads scoring below the threshold and squads the user already
    /// belongs to.
    pub fn find_matches_for_user(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        top_k: usize,
    ) -> MatchResult<Vec<SquadMatch>> {
        let guild = self.guild(guild_id)?;
        let profile = self.profiles.require(user_id)?;
        let filter = self
            .config
            .similarity_filter(&guild.interest_area, &profile.language);

        let similar: HashMap<UserId, f32> = self
            .verifier
            .engine()
            .query_similar(user_id, &filter, top_k, -1.0)?
            .into_iter()
            .map(|s| (s.user_id, s.score))
            .collect();
        if similar.is_empty() {
            return Ok(Vec::new());
        }

        let max = self.config.max_squad_size;
        let threshold = self.verifier.threshold();
        let mut matches = Vec::new();

        for squad in self.store.squads_in_guild(guild_id)? {
            if !squad.status.is_open() || squad.member_count >= max {
                continue;
            }
            let members = self.member_ids(squad.id)?;
            if members.contains(&user_id) {
                continue;
            }

            let overlap: Vec<f32> = members
                .iter()
                .filter_map(|member| similar.get(member).copied())
                .collect();
            if overlap.is_empty() {
                continue;
            }
            let average_similarity = overlap.iter().sum::<f32>() / overlap.len() as f32;
            if !meets_threshold(average_similarity, threshold) {
                continue;
            }

            matches.push(SquadMatch {
                squad_id: squad.id,
                available_slots: squad.available_slots(max),
                squad_name: squad.name,
                member_count: squad.member_count,
                average_similarity,
                status: squad.status,
            });
        }

        matches.sort_by(|a, b| {
            b.average_similarity
                .total_cmp(&a.average_similarity)
                .then(a.squad_id.cmp(&b.squad_id))
        });
        Ok(matches)
    }
}
