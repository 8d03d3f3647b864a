//! Configuration module for squad matching.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `SQ_` and use double underscores
//! to separate nested levels:
//! - `SQ_MATCHING__SIMILARITY_THRESHOLD=0.75` sets `matching.similarity_threshold`
//! - `SQ_INDEX__RETRY_MAX_ATTEMPTS=5` sets `index.retry_max_attempts`
//! - `SQ_DEBUG=true` sets `debug`

use crate::error::{MatchError, MatchResult};
use crate::similarity::{RetryPolicy, SimilarityFilter};
use crate::types::{MAX_SQUAD_SIZE, MIN_SIMILARITY_THRESHOLD, MIN_SQUAD_SIZE};
use crate::vector::{VECTOR_DIMENSION_384, VectorDimension};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const CONFIG_DIR: &str = ".squadmatch";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Squad size and compatibility rules
    #[serde(default)]
    pub matching: MatchingConfig,

    /// Greedy group formation settings
    #[serde(default)]
    pub formation: FormationConfig,

    /// Embedding index access settings
    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MatchingConfig {
    /// Smallest squad that can be ACTIVE
    #[serde(default = "default_min_squad_size")]
    pub min_squad_size: usize,

    /// Squad capacity
    #[serde(default = "default_max_squad_size")]
    pub max_squad_size: usize,

    /// Minimum pairwise cosine similarity (inclusive)
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Similar users consulted when ranking existing squads
    #[serde(default = "default_match_top_k")]
    pub match_top_k: usize,

    /// Maximum timezone distance in hours; unset means unrestricted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone_tolerance_hours: Option<f32>,

    /// Only match users speaking the same language
    #[serde(default = "default_false")]
    pub require_same_language: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FormationConfig {
    /// Neighbours fetched per seed
    #[serde(default = "default_candidate_top_k")]
    pub candidate_top_k: usize,

    /// How long a formation lease stays valid if never released
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,

    /// Interval of the periodic pool scanner
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,

    /// Run a formation pass when a join lands in the waiting pool
    #[serde(default = "default_true")]
    pub trigger_on_join: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexConfig {
    /// Embedding dimension
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Attempts per index call, including the first
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Backoff before the second attempt; doubles each retry
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Upper bound on a single backoff delay
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Total time budget for one call including retries
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_min_squad_size() -> usize {
    MIN_SQUAD_SIZE
}
fn default_max_squad_size() -> usize {
    MAX_SQUAD_SIZE
}
fn default_similarity_threshold() -> f32 {
    MIN_SIMILARITY_THRESHOLD
}
fn default_match_top_k() -> usize {
    50
}
fn default_candidate_top_k() -> usize {
    MAX_SQUAD_SIZE
}
fn default_lease_ttl_secs() -> u64 {
    300
}
fn default_scan_interval_secs() -> u64 {
    60
}
fn default_dimension() -> usize {
    VECTOR_DIMENSION_384
}
fn default_retry_max_attempts() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    100
}
fn default_retry_max_delay_ms() -> u64 {
    2_000
}
fn default_timeout_ms() -> u64 {
    5_000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            debug: false,
            matching: MatchingConfig::default(),
            formation: FormationConfig::default(),
            index: IndexConfig::default(),
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_squad_size: default_min_squad_size(),
            max_squad_size: default_max_squad_size(),
            similarity_threshold: default_similarity_threshold(),
            match_top_k: default_match_top_k(),
            timezone_tolerance_hours: None,
            require_same_language: false,
        }
    }
}

impl Default for FormationConfig {
    fn default() -> Self {
        Self {
            candidate_top_k: default_candidate_top_k(),
            lease_ttl_secs: default_lease_ttl_secs(),
            scan_interval_secs: default_scan_interval_secs(),
            trigger_on_join: true,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl IndexConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
        .with_budget(Duration::from_millis(self.timeout_ms))
    }

    pub fn vector_dimension(&self) -> MatchResult<VectorDimension> {
        VectorDimension::new(self.dimension).map_err(|e| MatchError::Config {
            reason: e.to_string(),
        })
    }
}

impl MatchingConfig {
    /// Similarity query filter for a guild, given the querying user's language.
    pub fn similarity_filter(&self, interest_area: &str, language: &str) -> SimilarityFilter {
        let mut filter = SimilarityFilter::interest_area(interest_area);
        if self.require_same_language {
            filter = filter.with_language(language);
        }
        if let Some(hours) = self.timezone_tolerance_hours {
            filter = filter.with_timezone_tolerance(hours);
        }
        filter
    }
}

impl FormationConfig {
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs.max(1))
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, then environment overrides
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nesting levels, single underscores stay
            .merge(Env::prefixed("SQ_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by walking up from the current directory
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }

        None
    }

    /// Reject settings the matching rules cannot work with
    pub fn validate(&self) -> MatchResult<()> {
        let m = &self.matching;
        if m.min_squad_size < 2 {
            return Err(MatchError::Config {
                reason: format!("min_squad_size must be at least 2, got {}", m.min_squad_size),
            });
        }
        if m.min_squad_size > m.max_squad_size {
            return Err(MatchError::Config {
                reason: format!(
                    "min_squad_size {} exceeds max_squad_size {}",
                    m.min_squad_size, m.max_squad_size
                ),
            });
        }
        if !(-1.0..=1.0).contains(&m.similarity_threshold) {
            return Err(MatchError::Config {
                reason: format!(
                    "similarity_threshold {} must be within [-1, 1]",
                    m.similarity_threshold
                ),
            });
        }
        if let Some(tolerance) = m.timezone_tolerance_hours
            && (tolerance.is_nan() || tolerance < 0.0)
        {
            return Err(MatchError::Config {
                reason: format!("timezone_tolerance_hours {tolerance} must be non-negative"),
            });
        }
        if self.formation.candidate_top_k == 0 {
            return Err(MatchError::Config {
                reason: "formation.candidate_top_k must be positive".to_string(),
            });
        }
        if self.index.retry_max_attempts == 0 {
            return Err(MatchError::Config {
                reason: "index.retry_max_attempts must be at least 1".to_string(),
            });
        }
        self.index.vector_dimension()?;
        Ok(())
    }

    /// Save current configuration to file
    pub fn save(
        &self,
        path: impl AsRef<std::path::Path>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# Squadmatch Configuration File

# Version of the configuration schema
version = 1

# Global debug mode (DEBUG level logging)
debug = false

[matching]
# ACTIVE squads have at least this many members
min_squad_size = {MIN_SQUAD_SIZE}

# Squad capacity
max_squad_size = {MAX_SQUAD_SIZE}

# Every pair of squad members must reach this cosine similarity (inclusive)
similarity_threshold = {MIN_SIMILARITY_THRESHOLD}

# Similar users consulted when ranking existing squads for a user
match_top_k = 50

# Only consider users within this many hours of the user's timezone
# timezone_tolerance_hours = 3.0

# Only consider users speaking the same language
require_same_language = false

[formation]
# Neighbours fetched per seed during group formation
candidate_top_k = {MAX_SQUAD_SIZE}

# Seconds before an unreleased formation lease expires
lease_ttl_secs = 300

# Seconds between periodic waiting pool scans
scan_interval_secs = 60

# Run a formation pass when a join lands in the waiting pool
trigger_on_join = true

[index]
# Embedding dimension
dimension = {VECTOR_DIMENSION_384}

# Attempts per index call (first call included)
retry_max_attempts = 3

# Exponential backoff bounds in milliseconds
retry_base_delay_ms = 100
retry_max_delay_ms = 2000

# Total time budget per index call including retries
timeout_ms = 5000
"#
        );

        std::fs::write(&config_path, template)?;

        if force {
            println!("Overwrote configuration at: {}", config_path.display());
        } else {
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
        }

        Ok(config_path)
    }
}
