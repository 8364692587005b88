use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Weights and caps for the relevance scorer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub recency: f64,
    pub frequency: f64,
    /// Access count at which the frequency signal saturates.
    pub frequency_saturation: u32,
    /// Share of the heuristic score once a similarity signal is available.
    pub blend_heuristic: f64,
    pub blend_similarity: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            recency: 0.6,
            frequency: 0.4,
            frequency_saturation: 20,
            blend_heuristic: 0.4,
            blend_similarity: 0.6,
        }
    }
}

/// What the cursor points at right after the palette opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialSelection {
    #[default]
    First,
    Nothing,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub weights: ScoringWeights,
    /// How many "for you" suggestions to show.
    pub top_count: usize,
    /// Visible-list length above which rendering switches to windowed mode.
    pub virtualization_threshold: usize,
    pub debounce_ms: u64,
    pub similarity_timeout_ms: u64,
    pub watcher_poll_secs: u64,
    pub watcher_quiet_secs: u64,
    pub initial_selection: InitialSelection,
    /// Joplin database. Auto-detected when unset.
    pub db_path: Option<PathBuf>,
    /// Writable database holding access counts.
    pub access_log_path: Option<PathBuf>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            top_count: crate::scoring::DEFAULT_TOP_COUNT,
            virtualization_threshold: 50,
            debounce_ms: 300,
            similarity_timeout_ms: 2_000,
            watcher_poll_secs: 10,
            watcher_quiet_secs: 5,
            initial_selection: InitialSelection::default(),
            db_path: None,
            access_log_path: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse discovery config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn similarity_timeout(&self) -> Duration {
        Duration::from_millis(self.similarity_timeout_ms)
    }

    pub fn watcher_poll(&self) -> Duration {
        Duration::from_secs(self.watcher_poll_secs)
    }

    pub fn watcher_quiet(&self) -> Duration {
        Duration::from_secs(self.watcher_quiet_secs)
    }

    /// Configured Joplin database, falling back to platform auto-detection.
    pub fn resolve_db_path(&self) -> Option<PathBuf> {
        self.db_path.clone().or_else(crate::db::detect_joplin_db_path)
    }

    /// Access log location. Defaults to a file next to the Joplin database.
    pub fn resolve_access_log_path(&self, db_path: &Path) -> PathBuf {
        self.access_log_path.clone().unwrap_or_else(|| {
            db_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("note-discovery")
                .join("access.sqlite")
        })
    }
}
