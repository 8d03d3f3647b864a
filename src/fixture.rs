//! Synthetic guilds and users for demos and benchmarks.
//!
//! Users are drawn around a handful of random centroids per guild. Two users
//! sharing a centroid land at a cosine similarity of roughly
//! `1 / (1 + spread²)`; users from different centroids are close to
//! orthogonal in high dimensions.

use crate::error::MatchResult;
use crate::storage::{MemoryStore, SquadStore, StoreSnapshot};
use crate::types::UserId;
use crate::vector::{
    EmbeddingIndex, EmbeddingMetadata, EmbeddingRecord, MemoryEmbeddingIndex, VectorDimension,
    normalize_vector_copy,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

const INTEREST_AREAS: &[&str] = &[
    "rust",
    "machine-learning",
    "web-development",
    "data-engineering",
    "security",
    "game-design",
];

const LANGUAGES: &[&str] = &["en", "es", "de", "pt"];

const TIMEZONES: &[f32] = &[-8.0, -5.0, 0.0, 1.0, 5.5, 9.0];

#[derive(Debug, Clone)]
pub struct FixtureConfig {
    pub guilds: usize,
    pub users_per_guild: usize,
    /// Centroids per guild
    pub clusters: usize,
    /// Noise norm relative to the unit centroid
    pub spread: f32,
    pub seed: u64,
    pub dimension: VectorDimension,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            guilds: 2,
            users_per_guild: 40,
            clusters: 2,
            spread: 0.4,
            seed: 42,
            dimension: VectorDimension::dimension_384(),
        }
    }
}

/// Fill a fresh store and index; every user joins exactly one guild.
pub fn populate(config: &FixtureConfig) -> MatchResult<(MemoryStore, MemoryEmbeddingIndex)> {
    let store = MemoryStore::new();
    let index = MemoryEmbeddingIndex::new(config.dimension);
    let mut rng = StdRng::seed_from_u64(config.seed);
    let clusters = config.clusters.max(1);
    let mut next_user = 1u32;

    for g in 0..config.guilds {
        let area = INTEREST_AREAS[g % INTEREST_AREAS.len()];
        let guild = store.create_guild(&format!("Guild {}", g + 1), area)?;

        let centroids: Vec<Vec<f32>> = (0..clusters)
            .map(|_| random_unit(&mut rng, config.dimension.get()))
            .collect();

        for u in 0..config.users_per_guild {
            let cluster = u % clusters;
            let noise = random_unit(&mut rng, config.dimension.get());
            let raw: Vec<f32> = centroids[cluster]
                .iter()
                .zip(&noise)
                .map(|(c, n)| c + config.spread * n)
                .collect();

            let user_id = UserId(next_user);
            next_user += 1;

            index.upsert(EmbeddingRecord {
                user_id,
                vector: normalize_vector_copy(&raw),
                metadata: EmbeddingMetadata {
                    skill_level: rng.random_range(1..=10),
                    learning_velocity: rng.random_range(0.5..2.0),
                    timezone_offset: TIMEZONES[cluster % TIMEZONES.len()],
                    language: LANGUAGES[cluster % LANGUAGES.len()].to_string(),
                    interest_area: area.to_string(),
                },
            })?;
            store.add_guild_member(user_id, guild.id)?;
        }
    }

    info!(
        guilds = config.guilds,
        users = index.len(),
        clusters,
        "Generated fixture"
    );
    Ok((store, index))
}

/// Generate a fixture and capture it as a snapshot.
pub fn generate(config: &FixtureConfig) -> MatchResult<StoreSnapshot> {
    let (store, index) = populate(config)?;
    Ok(StoreSnapshot::capture(&store, &index))
}

fn random_unit(rng: &mut StdRng, dimension: usize) -> Vec<f32> {
    let raw: Vec<f32> = (0..dimension)
        .map(|_| rng.random_range(-1.0f32..1.0))
        .collect();
    normalize_vector_copy(&raw)
}
