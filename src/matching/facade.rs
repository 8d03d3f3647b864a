//! Entry point for join and pool-scan flows.
//!
//! The service wires the similarity engine, the registry, the waiting pool
//! and group formation together. It never writes squad state itself; all
//! mutation goes through [`SquadRegistry`].

use crate::compatibility::CompatibilityVerifier;
use crate::config::{FormationConfig, Settings};
use crate::error::{MatchError, MatchResult};
use crate::formation::{CompatibilityGroup, FormationLease, GroupFormation};
use crate::notify::{NotificationDispatcher, SquadEvent};
use crate::profile::{IndexProfileProvider, ProfileProvider};
use crate::similarity::SimilarityEngine;
use crate::squad::{Admission, SquadMatch, SquadRegistry, WaitingPool, WaitingPoolEntry};
use crate::storage::SquadStore;
use crate::types::{GuildId, Squad, SquadId, UserId};
use crate::vector::EmbeddingIndex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a join request ended up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinOutcome {
    pub assigned_squad: Option<Squad>,
    pub in_waiting_pool: bool,
}

impl JoinOutcome {
    fn assigned(squad: Squad) -> Self {
        Self {
            assigned_squad: Some(squad),
            in_waiting_pool: false,
        }
    }

    fn waiting() -> Self {
        Self {
            assigned_squad: None,
            in_waiting_pool: true,
        }
    }
}

/// Result of one formation pass over a guild's waiting pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolMatchReport {
    /// Groups that were turned into squads
    pub compatible_groups: Vec<CompatibilityGroup>,
    pub formed_squads: Vec<Squad>,
    /// Members of the formed squads, in group order
    pub notified_user_ids: Vec<UserId>,
}

impl PoolMatchReport {
    pub fn is_empty(&self) -> bool {
        self.compatible_groups.is_empty()
    }
}

pub struct MatchingService {
    store: Arc<dyn SquadStore>,
    engine: Arc<SimilarityEngine>,
    profiles: Arc<dyn ProfileProvider>,
    registry: SquadRegistry,
    pool: WaitingPool,
    formation: GroupFormation,
    notifier: Arc<dyn NotificationDispatcher>,
    formation_config: FormationConfig,
    match_top_k: usize,
}

impl std::fmt::Debug for MatchingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchingService")
            .field("registry", &self.registry)
            .field("formation", &self.formation)
            .field("formation_config", &self.formation_config)
            .field("match_top_k", &self.match_top_k)
            .finish_non_exhaustive()
    }
}

impl MatchingService {
    /// Build a service whose profiles come from the embedding metadata.
    pub fn new(
        settings: &Settings,
        store: Arc<dyn SquadStore>,
        index: Arc<dyn EmbeddingIndex>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> MatchResult<Self> {
        let engine = Arc::new(SimilarityEngine::new(index, settings.index.retry_policy()));
        let profiles = Arc::new(IndexProfileProvider::new(engine.clone()));
        Self::with_profiles(settings, store, engine, profiles, notifier)
    }

    pub fn with_profiles(
        settings: &Settings,
        store: Arc<dyn SquadStore>,
        engine: Arc<SimilarityEngine>,
        profiles: Arc<dyn ProfileProvider>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> MatchResult<Self> {
        settings.validate()?;
        let expected = settings.index.vector_dimension()?;
        let actual = engine.index().dimension();
        if expected != actual {
            return Err(MatchError::Config {
                reason: format!(
                    "index dimension {} does not match configured dimension {}",
                    actual.get(),
                    expected.get()
                ),
            });
        }

        let matching = settings.matching.clone();
        let verifier = CompatibilityVerifier::new(engine.clone(), matching.similarity_threshold);
        let registry = SquadRegistry::new(
            store.clone(),
            verifier.clone(),
            profiles.clone(),
            matching.clone(),
        );
        let pool = WaitingPool::new(store.clone(), profiles.clone());
        let formation = GroupFormation::new(
            verifier,
            matching.clone(),
            settings.formation.candidate_top_k,
        );

        Ok(Self {
            store,
            engine,
            profiles,
            registry,
            pool,
            formation,
            notifier,
            formation_config: settings.formation.clone(),
            match_top_k: matching.match_top_k,
        })
    }

    pub fn registry(&self) -> &SquadRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<SimilarityEngine> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn SquadStore> {
        &self.store
    }

    /// Existing squads in the guild the user could join, best first.
    pub fn find_squad_matches(
        &self,
        user_id: UserId,
        guild_id: GuildId,
    ) -> MatchResult<Vec<SquadMatch>> {
        self.registry
            .find_matches_for_user(user_id, guild_id, self.match_top_k)
    }

    /// Join a guild and get placed.
    ///
    /// Ranked existing squads are tried in order. If none admits the user
    /// they stay in the waiting pool, and a formation pass may place them
    /// in a new squad right away.
    pub fn join_guild_and_match(
        &self,
        user_id: UserId,
        guild_id: GuildId,
    ) -> MatchResult<JoinOutcome> {
        self.registry.guild(guild_id)?;
        self.profiles.require(user_id)?;

        if let Some(seat) = self.store.seat_in_guild(user_id, guild_id)? {
            debug!(guild = %guild_id, user = %user_id, "already seated");
            return Ok(JoinOutcome::assigned(self.registry.squad(seat)?));
        }

        self.pool.add(user_id, guild_id)?;

        for candidate in self.find_squad_matches(user_id, guild_id)? {
            match self.registry.try_add_member(candidate.squad_id, user_id)? {
                Admission::Joined(squad) => {
                    info!(guild = %guild_id, user = %user_id, squad = %squad.id, "joined squad");
                    return Ok(JoinOutcome::assigned(squad));
                }
                Admission::SeatTaken(seat) => {
                    // Seated concurrently, most likely by a formation pass
                    return Ok(JoinOutcome::assigned(self.registry.squad(seat)?));
                }
                other => {
                    debug!(
                        squad = %candidate.squad_id,
                        user = %user_id,
                        "candidate squad refused: {other:?}"
                    );
                }
            }
        }

        if self.formation_config.trigger_on_join {
            match self.notify_waiting_pool_matches(guild_id) {
                Ok(_) => {}
                Err(MatchError::FormationInProgress { .. }) => {
                    debug!(guild = %guild_id, "formation already running, staying in pool");
                }
                Err(e) => {
                    warn!(guild = %guild_id, "formation pass after join failed: {e}");
                }
            }
            if let Some(seat) = self.store.seat_in_guild(user_id, guild_id)? {
                return Ok(JoinOutcome::assigned(self.registry.squad(seat)?));
            }
        }

        info!(guild = %guild_id, user = %user_id, "added to waiting pool");
        Ok(JoinOutcome::waiting())
    }

    pub fn get_waiting_pool(&self, guild_id: GuildId) -> MatchResult<Vec<WaitingPoolEntry>> {
        self.pool.entries(guild_id)
    }

    /// Run one formation pass over the guild's waiting pool and turn every
    /// group found into a squad.
    ///
    /// Passes are serialized per guild by a store-held lease; a contended
    /// lease fails with `FormationInProgress`. Pools below the minimum squad
    /// size return an empty report without touching the embedding index.
    pub fn notify_waiting_pool_matches(&self, guild_id: GuildId) -> MatchResult<PoolMatchReport> {
        let guild = self.registry.guild(guild_id)?;
        let min = self.registry.config().min_squad_size;
        if self.pool.user_ids(guild_id)?.len() < min {
            return Ok(PoolMatchReport::default());
        }

        let lease = FormationLease::acquire(
            self.store.clone(),
            guild_id,
            self.formation_config.lease_ttl(),
        )?;

        // Re-read under the lease so no other pass is claiming these users
        let pool = self.pool.user_ids(guild_id)?;
        let mut report = PoolMatchReport::default();
        let mut abandoned = Vec::new();
        if pool.len() >= min {
            for group in self.formation.form_groups(&guild, &pool) {
                match self.registry.create_squad(guild_id, &group.members, None) {
                    Ok(squad) => {
                        report.notified_user_ids.extend(group.members.iter().copied());
                        report.formed_squads.push(squad);
                        report.compatible_groups.push(group);
                    }
                    Err(e) => {
                        warn!(
                            guild = %guild_id,
                            size = group.len(),
                            "abandoning group, members stay in the pool: {e}"
                        );
                        abandoned.push(group);
                    }
                }
            }
        }
        lease.release()?;

        // Notify only once the pass is over
        for (squad, group) in report.formed_squads.iter().zip(&report.compatible_groups) {
            self.notifier.dispatch(SquadEvent::SquadFormed {
                guild_id,
                squad_id: squad.id,
                user_ids: group.members.clone(),
            });
        }
        for group in abandoned {
            self.notifier.dispatch(SquadEvent::GroupIdentified {
                guild_id,
                user_ids: group.members,
                average_similarity: group.average_similarity,
            });
        }

        if !report.is_empty() {
            info!(
                guild = %guild_id,
                squads = report.formed_squads.len(),
                users = report.notified_user_ids.len(),
                "waiting pool matched"
            );
        }
        Ok(report)
    }

    pub fn create_squad(&self, guild_id: GuildId, member_ids: &[UserId]) -> MatchResult<Squad> {
        self.registry.create_squad(guild_id, member_ids, None)
    }

    pub fn add_member(&self, squad_id: SquadId, user_id: UserId) -> MatchResult<Squad> {
        self.registry.add_member(squad_id, user_id)
    }
}
