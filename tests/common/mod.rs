//! Shared helpers for integration tests.
//!
//! Vectors are built from orthogonal axes so pairwise cosine similarity is
//! exact: axis 0 is shared by every user, axes 1..64 are cluster axes and
//! every user owns axis `64 + id`.

#![allow(dead_code)]

use crossbeam_channel::Receiver;
use squadmatch::config::Settings;
use squadmatch::matching::MatchingService;
use squadmatch::notify::{ChannelDispatcher, SquadEvent};
use squadmatch::storage::{MemoryStore, SquadStore};
use squadmatch::types::{GuildId, UserId};
use squadmatch::vector::{
    EmbeddingIndex, EmbeddingMetadata, EmbeddingRecord, IndexFilter, IndexMatch,
    MemoryEmbeddingIndex, VectorDimension, VectorError,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const DIM: usize = 384;
const OWN_AXIS_BASE: usize = 64;

/// Vector whose similarity to any other vector from this function is
/// `shared`, or `shared + weight` when both carry the same cluster axis.
pub fn profile_vector(user: u32, shared: f32, cluster: Option<(usize, f32)>) -> Vec<f32> {
    assert!((user as usize) < DIM - OWN_AXIS_BASE, "user id too large");
    let mut vector = vec![0.0f32; DIM];
    vector[0] = shared.sqrt();
    let mut rest = 1.0 - shared;
    if let Some((axis, weight)) = cluster {
        assert!((1..OWN_AXIS_BASE).contains(&axis), "cluster axis out of range");
        vector[axis] = weight.sqrt();
        rest -= weight;
    }
    vector[OWN_AXIS_BASE + user as usize] = rest.max(0.0).sqrt();
    vector
}

/// Users in one cluster with the given pairwise similarity.
pub fn uniform_vector(user: u32, similarity: f32) -> Vec<f32> {
    profile_vector(user, similarity, None)
}

/// A vector orthogonal to everything else.
pub fn loner_vector(user: u32) -> Vec<f32> {
    profile_vector(user, 0.0, None)
}

/// Embedding index wrapper counting calls and failing queries on demand.
pub struct CountingIndex {
    inner: MemoryEmbeddingIndex,
    queries: AtomicUsize,
    fetches: AtomicUsize,
    failing_queries: AtomicUsize,
}

impl CountingIndex {
    pub fn new() -> Self {
        Self {
            inner: MemoryEmbeddingIndex::new(VectorDimension::dimension_384()),
            queries: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            failing_queries: AtomicUsize::new(0),
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn reset_counts(&self) {
        self.queries.store(0, Ordering::SeqCst);
        self.fetches.store(0, Ordering::SeqCst);
    }

    /// The next `n` queries fail with `Unavailable`.
    pub fn fail_next_queries(&self, n: usize) {
        self.failing_queries.store(n, Ordering::SeqCst);
    }
}

impl EmbeddingIndex for CountingIndex {
    fn upsert(&self, record: EmbeddingRecord) -> Result<(), VectorError> {
        self.inner.upsert(record)
    }

    fn fetch(&self, user_id: UserId) -> Result<Option<EmbeddingRecord>, VectorError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(user_id)
    }

    fn query(
        &self,
        vector: &[f32],
        filter: &IndexFilter,
        top_k: usize,
    ) -> Result<Vec<IndexMatch>, VectorError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_queries
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(VectorError::Unavailable("injected failure".to_string()));
        }
        self.inner.query(vector, filter, top_k)
    }

    fn delete(&self, user_id: UserId) -> Result<bool, VectorError> {
        self.inner.delete(user_id)
    }

    fn dimension(&self) -> VectorDimension {
        self.inner.dimension()
    }
}

/// Default settings with fast retries.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.index.retry_base_delay_ms = 1;
    settings.index.retry_max_delay_ms = 4;
    settings.index.timeout_ms = 1_000;
    settings
}

/// One guild with in-memory collaborators.
pub struct World {
    pub store: MemoryStore,
    pub index: Arc<CountingIndex>,
    pub service: Arc<MatchingService>,
    pub guild: GuildId,
    pub events: Receiver<SquadEvent>,
}

impl World {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let store = MemoryStore::new();
        let guild = store
            .create_guild("Rustaceans", "rust")
            .expect("create guild")
            .id;
        let index = Arc::new(CountingIndex::new());
        let (dispatcher, events) = ChannelDispatcher::unbounded();
        let service = MatchingService::new(
            &settings,
            Arc::new(store.clone()),
            index.clone(),
            Arc::new(dispatcher),
        )
        .expect("build service");

        Self {
            store,
            index,
            service: Arc::new(service),
            guild,
            events,
        }
    }

    /// Store an embedding for `user` in this guild's interest area.
    pub fn add_user(&self, user: u32, vector: Vec<f32>) -> UserId {
        let user_id = UserId(user);
        self.index
            .upsert(EmbeddingRecord {
                user_id,
                vector,
                metadata: EmbeddingMetadata {
                    skill_level: (user % 10 + 1) as u8,
                    learning_velocity: 1.0,
                    timezone_offset: 0.0,
                    language: "en".to_string(),
                    interest_area: "rust".to_string(),
                },
            })
            .expect("upsert embedding");
        user_id
    }

    /// Add a user with an embedding to the guild's waiting pool.
    pub fn enroll(&self, user: u32, vector: Vec<f32>) -> UserId {
        let user_id = self.add_user(user, vector);
        self.store
            .add_guild_member(user_id, self.guild)
            .expect("add guild member");
        user_id
    }

    /// Enroll `users` with pairwise `similarity` to each other.
    pub fn enroll_cluster(
        &self,
        users: std::ops::RangeInclusive<u32>,
        similarity: f32,
    ) -> Vec<UserId> {
        users
            .map(|user| self.enroll(user, uniform_vector(user, similarity)))
            .collect()
    }

    pub fn pool_ids(&self) -> Vec<UserId> {
        self.service
            .get_waiting_pool(self.guild)
            .expect("waiting pool")
            .into_iter()
            .map(|entry| entry.user_id)
            .collect()
    }

    pub fn drain_events(&self) -> Vec<SquadEvent> {
        self.events.try_iter().collect()
    }
}
