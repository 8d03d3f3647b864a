//! Similarity engine that wraps the embedding index.
//!
//! Every index call goes through the engine's [`RetryPolicy`], so callers
//! only see either a result, a permanent error, or a
//! `TransientIndexFailure` after the retry budget is spent.

use crate::error::{MatchError, MatchResult};
use crate::similarity::RetryPolicy;
use crate::types::UserId;
use crate::vector::{
    EmbeddingIndex, EmbeddingMetadata, EmbeddingRecord, IndexFilter, Similarity,
    cosine_similarity,
};
use std::sync::Arc;

/// Restrictions for a top-K similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityFilter {
    /// Exact interest area match
    pub interest_area: String,
    /// Exact (case-insensitive) language match when set
    pub language: Option<String>,
    /// Maximum distance from the querying user's timezone when set
    pub timezone_tolerance_hours: Option<f32>,
}

impl SimilarityFilter {
    pub fn interest_area(interest_area: impl Into<String>) -> Self {
        Self {
            interest_area: interest_area.into(),
            language: None,
            timezone_tolerance_hours: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_timezone_tolerance(mut self, hours: f32) -> Self {
        self.timezone_tolerance_hours = Some(hours);
        self
    }

    fn to_index_filter(&self, origin_offset: f32) -> IndexFilter {
        let mut filter = IndexFilter::new().with_interest_area(self.interest_area.clone());
        if let Some(language) = &self.language {
            filter = filter.with_language(language.clone());
        }
        if let Some(hours) = self.timezone_tolerance_hours {
            filter = filter.with_timezone_range(origin_offset - hours, origin_offset + hours);
        }
        filter
    }
}

/// A user returned by [`SimilarityEngine::query_similar`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarUser {
    pub user_id: UserId,
    pub score: f32,
    pub metadata: EmbeddingMetadata,
}

pub struct SimilarityEngine {
    index: Arc<dyn EmbeddingIndex>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for SimilarityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityEngine")
            .field("dimension", &self.index.dimension())
            .field("retry", &self.retry)
            .finish()
    }
}

impl SimilarityEngine {
    pub fn new(index: Arc<dyn EmbeddingIndex>, retry: RetryPolicy) -> Self {
        Self { index, retry }
    }

    pub fn index(&self) -> &Arc<dyn EmbeddingIndex> {
        &self.index
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Fetch a user's record, failing with `EmbeddingNotFound` if absent.
    pub fn record(&self, user_id: UserId) -> MatchResult<EmbeddingRecord> {
        self.retry
            .run("fetch", || self.index.fetch(user_id))?
            .ok_or(MatchError::EmbeddingNotFound { user: user_id })
    }

    pub fn has_embedding(&self, user_id: UserId) -> MatchResult<bool> {
        Ok(self.retry.run("fetch", || self.index.fetch(user_id))?.is_some())
    }

    /// Cosine similarity of two users' stored vectors.
    ///
    /// Clamped to [-1, 1] like index query scores. Zero-norm vectors yield 0.0.
    pub fn similarity(&self, user_a: UserId, user_b: UserId) -> MatchResult<f32> {
        let a = self.record(user_a)?;
        let b = self.record(user_b)?;
        Ok(pair_score(&a.vector, &b.vector))
    }

    /// Similarity of `user_id` to each of `others`, fetching `user_id` once.
    ///
    /// Output order follows `others`.
    pub fn similarities_to(
        &self,
        user_id: UserId,
        others: &[UserId],
    ) -> MatchResult<Vec<(UserId, f32)>> {
        let origin = self.record(user_id)?;
        others
            .iter()
            .map(|&other| {
                let record = self.record(other)?;
                Ok((other, pair_score(&origin.vector, &record.vector)))
            })
            .collect()
    }

    /// Up to `top_k` other users scoring at least `min_similarity`, best first.
    ///
    /// The querying user is never part of the result.
    pub fn query_similar(
        &self,
        user_id: UserId,
        filter: &SimilarityFilter,
        top_k: usize,
        min_similarity: f32,
    ) -> MatchResult<Vec<SimilarUser>> {
        let origin = self.record(user_id)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let index_filter = filter.to_index_filter(origin.metadata.timezone_offset);
        // One extra slot since the user's own vector is its best match
        let matches = self.retry.run("query", || {
            self.index
                .query(&origin.vector, &index_filter, top_k.saturating_add(1))
        })?;

        Ok(matches
            .into_iter()
            .filter(|m| m.user_id != user_id && m.score.get() >= min_similarity)
            .take(top_k)
            .map(|m| SimilarUser {
                user_id: m.user_id,
                score: m.score.get(),
                metadata: m.metadata,
            })
            .collect())
    }
}

fn pair_score(a: &[f32], b: &[f32]) -> f32 {
    Similarity::saturating(cosine_similarity(a, b)).get()
}
