//! Pairwise compatibility checks under the minimum similarity threshold.
//!
//! A set of users is compatible when every unordered pair reaches the
//! threshold. Lookup failures abort the check with
//! [`MatchError::CompatibilityCheck`]; they are never read as "incompatible".

use crate::error::{MatchError, MatchResult};
use crate::similarity::SimilarityEngine;
use crate::types::UserId;
use serde::Serialize;
use std::sync::Arc;

/// Tolerance applied to the inclusive threshold comparison so a similarity
/// of exactly the threshold still passes after f32 rounding.
pub const SIMILARITY_EPSILON: f32 = 1e-6;

/// Inclusive threshold test.
pub fn meets_threshold(score: f32, threshold: f32) -> bool {
    score >= threshold - SIMILARITY_EPSILON
}

/// A pair of users below the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub user_a: UserId,
    pub user_b: UserId,
    pub score: f32,
}

/// Outcome of a compatibility check.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupVerdict {
    pub ok: bool,
    pub violations: Vec<Violation>,
    /// Every pair score computed, in check order
    pub pair_scores: Vec<(UserId, UserId, f32)>,
}

impl GroupVerdict {
    fn from_scores(pair_scores: Vec<(UserId, UserId, f32)>, threshold: f32) -> Self {
        let violations: Vec<Violation> = pair_scores
            .iter()
            .filter(|(_, _, score)| !meets_threshold(*score, threshold))
            .map(|&(user_a, user_b, score)| Violation {
                user_a,
                user_b,
                score,
            })
            .collect();
        Self {
            ok: violations.is_empty(),
            violations,
            pair_scores,
        }
    }

    /// Mean of all pair scores; `None` when no pair was checked.
    pub fn average_similarity(&self) -> Option<f32> {
        if self.pair_scores.is_empty() {
            return None;
        }
        let total: f32 = self.pair_scores.iter().map(|(_, _, s)| s).sum();
        Some(total / self.pair_scores.len() as f32)
    }

    /// `Ok(())` when compatible, otherwise a `CompatibilityViolation`
    /// listing every offending pair.
    pub fn into_result(self, threshold: f32) -> MatchResult<()> {
        if self.ok {
            Ok(())
        } else {
            Err(MatchError::CompatibilityViolation {
                threshold,
                violations: self.violations,
            })
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompatibilityVerifier {
    engine: Arc<SimilarityEngine>,
    threshold: f32,
}

impl CompatibilityVerifier {
    pub fn new(engine: Arc<SimilarityEngine>, threshold: f32) -> Self {
        Self { engine, threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn engine(&self) -> &Arc<SimilarityEngine> {
        &self.engine
    }

    /// Check every unordered pair in `user_ids`. O(n²) similarity lookups.
    ///
    /// Groups with fewer than two members are trivially compatible.
    pub fn verify_group(&self, user_ids: &[UserId]) -> MatchResult<GroupVerdict> {
        let mut pair_scores = Vec::with_capacity(user_ids.len() * user_ids.len() / 2);
        for (i, &user) in user_ids.iter().enumerate() {
            let rest = &user_ids[i + 1..];
            if rest.is_empty() {
                break;
            }
            let scores = self.lookup(user, rest)?;
            pair_scores.extend(scores.into_iter().map(|(other, score)| (user, other, score)));
        }
        Ok(GroupVerdict::from_scores(pair_scores, self.threshold))
    }

    /// Check `candidate` against each of `members`.
    ///
    /// When `members` is already mutually compatible this is equivalent to
    /// verifying `members ∪ {candidate}`.
    pub fn verify_member(&self, candidate: UserId, members: &[UserId]) -> MatchResult<GroupVerdict> {
        if members.is_empty() {
            return Ok(GroupVerdict::from_scores(Vec::new(), self.threshold));
        }
        let scores = self.lookup(candidate, members)?;
        let pair_scores = scores
            .into_iter()
            .map(|(member, score)| (candidate, member, score))
            .collect();
        Ok(GroupVerdict::from_scores(pair_scores, self.threshold))
    }

    fn lookup(&self, user: UserId, others: &[UserId]) -> MatchResult<Vec<(UserId, f32)>> {
        self.engine
            .similarities_to(user, others)
            .map_err(|source| MatchError::CompatibilityCheck {
                source: Box::new(source),
            })
    }
}
