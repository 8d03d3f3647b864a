//! Embedding index interface and an in-memory implementation.
//!
//! The production index is an external vector store; everything above this
//! module talks to it only through [`EmbeddingIndex`]. [`MemoryEmbeddingIndex`]
//! is a brute-force scan used by tests, the CLI, and single-process deployments.

use crate::types::UserId;
use crate::vector::{Similarity, VectorDimension, VectorError, cosine_similarity};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Attributes stored next to each user's vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMetadata {
    pub skill_level: u8,
    pub learning_velocity: f32,
    pub timezone_offset: f32,
    pub language: String,
    pub interest_area: String,
}

impl EmbeddingMetadata {
    pub fn validate(&self) -> Result<(), VectorError> {
        if !(1..=10).contains(&self.skill_level) {
            return Err(VectorError::InvalidMetadata(format!(
                "skill level {} outside 1-10",
                self.skill_level
            )));
        }
        if !self.learning_velocity.is_finite() || self.learning_velocity < 0.0 {
            return Err(VectorError::InvalidMetadata(format!(
                "learning velocity {} must be a non-negative number",
                self.learning_velocity
            )));
        }
        if !self.timezone_offset.is_finite() {
            return Err(VectorError::InvalidMetadata(
                "timezone offset must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// One user's vector plus metadata. Upserts replace the whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub user_id: UserId,
    pub vector: Vec<f32>,
    pub metadata: EmbeddingMetadata,
}

/// Metadata filter applied before ranking.
///
/// Unset fields do not constrain the query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexFilter {
    pub interest_area: Option<String>,
    pub language: Option<String>,
    /// Inclusive `(low, high)` bounds on the timezone offset
    pub timezone_range: Option<(f32, f32)>,
}

impl IndexFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interest_area(mut self, interest_area: impl Into<String>) -> Self {
        self.interest_area = Some(interest_area.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_timezone_range(mut self, low: f32, high: f32) -> Self {
        self.timezone_range = Some((low, high));
        self
    }

    pub fn matches(&self, metadata: &EmbeddingMetadata) -> bool {
        if let Some(area) = &self.interest_area
            && metadata.interest_area != *area
        {
            return false;
        }
        if let Some(language) = &self.language
            && !metadata.language.eq_ignore_ascii_case(language)
        {
            return false;
        }
        if let Some((low, high)) = self.timezone_range
            && !(low..=high).contains(&metadata.timezone_offset)
        {
            return false;
        }
        true
    }
}

/// A ranked query hit.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch {
    pub user_id: UserId,
    pub score: Similarity,
    pub metadata: EmbeddingMetadata,
}

/// Vector store holding one embedding per user.
///
/// Implementations talk to external storage and may fail transiently
/// ([`VectorError::Unavailable`], [`VectorError::Timeout`]); callers wrap
/// them in a retry policy rather than retrying per call site.
pub trait EmbeddingIndex: Send + Sync {
    /// Insert or atomically replace a user's record.
    fn upsert(&self, record: EmbeddingRecord) -> Result<(), VectorError>;

    /// Fetch a user's record, `None` if absent.
    fn fetch(&self, user_id: UserId) -> Result<Option<EmbeddingRecord>, VectorError>;

    /// Nearest neighbours of `vector` among records matching `filter`,
    /// best first, at most `top_k`.
    fn query(
        &self,
        vector: &[f32],
        filter: &IndexFilter,
        top_k: usize,
    ) -> Result<Vec<IndexMatch>, VectorError>;

    /// Remove a user's record. Returns whether one existed.
    fn delete(&self, user_id: UserId) -> Result<bool, VectorError>;

    /// Dimension every stored vector has.
    fn dimension(&self) -> VectorDimension;
}

/// Brute-force in-memory index.
#[derive(Clone, Debug)]
pub struct MemoryEmbeddingIndex {
    records: Arc<DashMap<UserId, EmbeddingRecord>>,
    dimension: VectorDimension,
}

impl MemoryEmbeddingIndex {
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records ordered by user id.
    pub fn records(&self) -> Vec<EmbeddingRecord> {
        let mut records: Vec<EmbeddingRecord> =
            self.records.iter().map(|entry| entry.value().clone()).collect();
        records.sort_by_key(|record| record.user_id);
        records
    }
}

impl Default for MemoryEmbeddingIndex {
    fn default() -> Self {
        Self::new(VectorDimension::dimension_384())
    }
}

impl EmbeddingIndex for MemoryEmbeddingIndex {
    fn upsert(&self, record: EmbeddingRecord) -> Result<(), VectorError> {
        self.dimension.validate_vector(&record.vector)?;
        if record.vector.iter().any(|value| !value.is_finite()) {
            return Err(VectorError::NonFiniteComponent {
                reason: "embedding contains NaN or infinity",
            });
        }
        record.metadata.validate()?;

        self.records.insert(record.user_id, record);
        Ok(())
    }

    fn fetch(&self, user_id: UserId) -> Result<Option<EmbeddingRecord>, VectorError> {
        Ok(self.records.get(&user_id).map(|entry| entry.value().clone()))
    }

    fn query(
        &self,
        vector: &[f32],
        filter: &IndexFilter,
        top_k: usize,
    ) -> Result<Vec<IndexMatch>, VectorError> {
        self.dimension.validate_vector(vector)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut matches: Vec<IndexMatch> = self
            .records
            .iter()
            .filter(|entry| filter.matches(&entry.metadata))
            .map(|entry| IndexMatch {
                user_id: entry.user_id,
                score: Similarity::saturating(cosine_similarity(vector, &entry.vector)),
                metadata: entry.metadata.clone(),
            })
            .collect();

        // Highest score first, equal scores by ascending user id
        matches.sort_by(|a, b| b.score.cmp(&a.score).then(a.user_id.cmp(&b.user_id)));
        matches.truncate(top_k);

        Ok(matches)
    }

    fn delete(&self, user_id: UserId) -> Result<bool, VectorError> {
        Ok(self.records.remove(&user_id).is_some())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}
