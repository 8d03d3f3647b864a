//! Greedy extraction of compatible groups from a waiting pool.
//!
//! # Algorithm
//! - Seed: the first remaining user in pool order (earliest join, then
//!   lowest id).
//! - Candidates: the seed's top-K neighbours at or above the threshold,
//!   restricted to users still remaining, best first.
//! - Growth: a candidate joins only if it is compatible with every member
//!   already in the group, so groups are cliques rather than stars.
//! - A group of at least the minimum size is emitted and its members leave
//!   the pool; otherwise only the seed leaves.
//!
//! Every iteration removes at least the seed, so the loop terminates.
//! Cost is O(|pool| / min) top-K queries plus O(|pool| * max²) pairwise
//! lookups in the worst case.
//!
//! Failures are soft: a seed whose lookups fail is dropped, and a
//! candidate whose verification fails is skipped.

use crate::compatibility::{CompatibilityVerifier, SIMILARITY_EPSILON};
use crate::config::MatchingConfig;
use crate::error::MatchResult;
use crate::types::{Guild, UserId};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// A mutually compatible set of pool members found by one pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompatibilityGroup {
    /// Seed first, then candidates in the order they were accepted
    pub members: Vec<UserId>,
    /// Mean similarity over all unordered member pairs
    pub average_similarity: f32,
}

impl CompatibilityGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct GroupFormation {
    verifier: CompatibilityVerifier,
    config: MatchingConfig,
    candidate_top_k: usize,
}

impl GroupFormation {
    pub fn new(
        verifier: CompatibilityVerifier,
        config: MatchingConfig,
        candidate_top_k: usize,
    ) -> Self {
        Self {
            verifier,
            config,
            candidate_top_k,
        }
    }

    /// Partition `pool` into compatible groups.
    ///
    /// `pool` order decides seed order. Users not placed in a group are
    /// simply absent from the output.
    pub fn form_groups(&self, guild: &Guild, pool: &[UserId]) -> Vec<CompatibilityGroup> {
        let min = self.config.min_squad_size;
        let mut remaining: Vec<UserId> = pool.to_vec();
        let mut groups = Vec::new();
        let mut dropped_seeds = 0usize;

        while remaining.len() >= min {
            let seed = remaining[0];
            let outcome = self.grow_from(guild, seed, &remaining);

            match outcome {
                Ok(Some(group)) => {
                    debug!(
                        guild = %guild.id,
                        seed = %seed,
                        size = group.len(),
                        average_similarity = group.average_similarity,
                        "group extracted"
                    );
                    let taken: HashSet<UserId> = group.members.iter().copied().collect();
                    remaining.retain(|user| !taken.contains(user));
                    groups.push(group);
                }
                Ok(None) => {
                    debug!(guild = %guild.id, seed = %seed, "seed could not anchor a group");
                    remaining.retain(|user| *user != seed);
                    dropped_seeds += 1;
                }
                Err(e) => {
                    warn!(guild = %guild.id, seed = %seed, "dropping seed: {e}");
                    remaining.retain(|user| *user != seed);
                    dropped_seeds += 1;
                }
            }
        }

        info!(
            guild = %guild.id,
            pool = pool.len(),
            groups = groups.len(),
            dropped_seeds,
            left_over = remaining.len(),
            "formation pass finished"
        );
        groups
    }

    /// Grow a group around `seed`. `Ok(None)` when it stays below the
    /// minimum size.
    fn grow_from(
        &self,
        guild: &Guild,
        seed: UserId,
        remaining: &[UserId],
    ) -> MatchResult<Option<CompatibilityGroup>> {
        let engine = self.verifier.engine();
        let origin = engine.record(seed)?;
        let filter = self
            .config
            .similarity_filter(&guild.interest_area, &origin.metadata.language);

        let threshold = self.verifier.threshold();
        let neighbours = engine.query_similar(
            seed,
            &filter,
            self.candidate_top_k,
            threshold - SIMILARITY_EPSILON,
        )?;

        let remaining: HashSet<UserId> = remaining.iter().copied().collect();
        let max = self.config.max_squad_size;
        let mut members = vec![seed];
        let mut pair_total = 0.0f32;
        let mut pair_count = 0usize;

        for candidate in neighbours
            .iter()
            .map(|n| n.user_id)
            .filter(|user| remaining.contains(user))
        {
            if members.len() >= max {
                break;
            }
            // `members` is already a clique, so checking the candidate
            // against each member covers every new pair
            match self.verifier.verify_member(candidate, &members) {
                Ok(verdict) if verdict.ok => {
                    pair_total += verdict.pair_scores.iter().map(|(_, _, s)| s).sum::<f32>();
                    pair_count += verdict.pair_scores.len();
                    members.push(candidate);
                }
                Ok(verdict) => {
                    debug!(
                        seed = %seed,
                        candidate = %candidate,
                        violations = verdict.violations.len(),
                        "candidate rejected"
                    );
                }
                Err(e) => {
                    debug!(seed = %seed, candidate = %candidate, "skipping candidate: {e}");
                }
            }
        }

        if members.len() < self.config.min_squad_size {
            return Ok(None);
        }
        let average_similarity = if pair_count == 0 {
            0.0
        } else {
            pair_total / pair_count as f32
        };
        Ok(Some(CompatibilityGroup {
            members,
            average_similarity,
        }))
    }
}
