//! JSON snapshot of a [`MemoryStore`] and its embedding index.
//!
//! Used by the CLI to carry state between invocations.

use super::{MemoryStore, StorageError, StorageResult};
use crate::types::{
    Guild, GuildMembership, MAX_SQUAD_SIZE, MIN_SQUAD_SIZE, Squad, SquadMembership,
};
use crate::vector::{EmbeddingIndex, EmbeddingRecord, MemoryEmbeddingIndex, VectorDimension};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub dimension: usize,
    pub guilds: Vec<Guild>,
    pub guild_members: Vec<GuildMembership>,
    pub squads: Vec<Squad>,
    pub squad_members: Vec<SquadMembership>,
    pub embeddings: Vec<EmbeddingRecord>,
}

impl StoreSnapshot {
    pub fn capture(store: &MemoryStore, index: &MemoryEmbeddingIndex) -> Self {
        let (guilds, guild_members, squads, squad_members) = store.export();
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            dimension: index.dimension().get(),
            guilds,
            guild_members,
            squads,
            squad_members,
            embeddings: index.records(),
        }
    }

    /// Rebuild the store and index with the default squad size bounds.
    pub fn restore(self) -> StorageResult<(MemoryStore, MemoryEmbeddingIndex)> {
        self.restore_with_sizes(MIN_SQUAD_SIZE, MAX_SQUAD_SIZE)
    }

    /// Rebuild the store and index. Unique indexes, squad sizes and vector
    /// dimensions are re-validated on the way in.
    pub fn restore_with_sizes(
        self,
        min_squad_size: usize,
        max_squad_size: usize,
    ) -> StorageResult<(MemoryStore, MemoryEmbeddingIndex)> {
        if self.version != SNAPSHOT_VERSION {
            return Err(StorageError::Serialization(format!(
                "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                self.version
            )));
        }
        let dimension = VectorDimension::new(self.dimension)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let store = MemoryStore::import(
            self.guilds,
            self.guild_members,
            self.squads,
            self.squad_members,
            (min_squad_size, max_squad_size),
        )?;

        let index = MemoryEmbeddingIndex::new(dimension);
        for record in self.embeddings {
            let user = record.user_id;
            index
                .upsert(record)
                .map_err(|e| StorageError::Serialization(format!("embedding for {user}: {e}")))?;
        }

        Ok((store, index))
    }

    pub fn save(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| StorageError::Serialization(format!("Failed to serialize snapshot: {e}")))?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> StorageResult<Self> {
        let json = fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| StorageError::Serialization(format!("Failed to parse snapshot: {e}")))
    }
}
