//! # Configuration
//!
//! TOML configuration for the capability health binary.
//!
//! ```toml
//! [engine]
//! engine_code = "capability_health_v1"
//! stale_run_secs = 900
//!
//! [[catalog]]
//! node_code = "head_coach"
//! name = "Head Coach"
//! min_coverage = 1
//!
//! [recruiting]
//! default_sector = "general"
//!
//! [recruiting.profiles.head_coach]
//! sector_key = "coaching"
//! notes = "Prefer candidates with a current license"
//! ```
//!
//! Every section is optional. An empty `[[catalog]]` keeps the built-in
//! default catalog.

use caphealth_core::primitives::{DEFAULT_STALE_RUN_SECS, ENGINE_CODE};
use caphealth_core::{
    Clock, HealthComputeEngine, HealthError, HealthStore, NodeDef, ProfileClassifier,
};
use chrono::TimeDelta;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Config files larger than this are rejected before parsing (1 MiB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Sector used for absences whose node has no explicit profile.
const DEFAULT_SECTOR: &str = "general";

// =============================================================================
// CONFIG SECTIONS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub catalog: Vec<NodeDef>,
    pub recruiting: RecruitingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Stamped on every provenance record.
    pub engine_code: String,
    /// Runs left `RUNNING` longer than this are failed by the sweep.
    pub stale_run_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_code: ENGINE_CODE.to_string(),
            stale_run_secs: DEFAULT_STALE_RUN_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecruitingConfig {
    /// Fallback sector for unlisted nodes. Empty means unlisted nodes are
    /// not recruitable.
    pub default_sector: String,
    pub profiles: BTreeMap<String, ProfileConfig>,
}

impl Default for RecruitingConfig {
    fn default() -> Self {
        Self {
            default_sector: DEFAULT_SECTOR.to_string(),
            profiles: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub sector_key: String,
    #[serde(default)]
    pub notes: String,
}

// =============================================================================
// LOADING
// =============================================================================

impl AppConfig {
    /// Load from `path`, or the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self, HealthError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let metadata = std::fs::metadata(path).map_err(|e| {
            HealthError::Validation(format!("config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(HealthError::Validation(format!(
                "config '{}' is {} bytes, maximum is {}",
                path.display(),
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let raw = std::fs::read_to_string(path).map_err(|e| {
            HealthError::Validation(format!("config '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            catalog_nodes = config.catalog.len(),
            profiles = config.recruiting.profiles.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, HealthError> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| HealthError::Validation(format!("invalid config: {}", e)))?;
        config.stale_run_max_age()?;
        Ok(config)
    }

    pub fn stale_run_max_age(&self) -> Result<TimeDelta, HealthError> {
        let secs = self.engine.stale_run_secs;
        if secs < 0 {
            return Err(HealthError::Validation(format!(
                "stale_run_secs must not be negative, got {}",
                secs
            )));
        }
        TimeDelta::try_seconds(secs).ok_or_else(|| {
            HealthError::Validation(format!("stale_run_secs {} is out of range", secs))
        })
    }

    /// Classifier built from `[recruiting]`.
    pub fn classifier(&self) -> ProfileClassifier {
        let recruiting = &self.recruiting;
        let mut classifier = ProfileClassifier::new();
        if !recruiting.default_sector.trim().is_empty() {
            classifier = classifier.with_fallback(recruiting.default_sector.trim(), "");
        }
        for (node_code, profile) in &recruiting.profiles {
            classifier = classifier.with_profile(
                node_code.as_str(),
                profile.sector_key.as_str(),
                profile.notes.as_str(),
            );
        }
        classifier
    }

    /// Node definitions seeded by every run.
    pub fn effective_catalog(&self) -> Option<&[NodeDef]> {
        if self.catalog.is_empty() {
            None
        } else {
            Some(&self.catalog)
        }
    }

    /// Build an engine over `store` with this configuration applied.
    pub fn build_engine<S: HealthStore, C: Clock>(
        &self,
        store: S,
        clock: C,
    ) -> Result<HealthComputeEngine<S, C>, HealthError> {
        let engine = HealthComputeEngine::with_clock(store, clock)
            .with_engine_code(self.engine.engine_code.as_str())?;
        match self.effective_catalog() {
            Some(catalog) => engine.with_catalog(catalog.to_vec()),
            None => Ok(engine),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
