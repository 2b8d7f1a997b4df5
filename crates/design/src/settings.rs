//! Engine settings persisted in the user's config directory.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::csg::ProcessingResolution;

const SETTINGS_FILE: &str = "settings.json";

/// Tunables for scheduling, assets, history and the CSG kernel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Debounce interval for deferred invalidation replay
    pub idle_interval_ms: u64,
    /// Maximum time an asset lookup waits for a background read
    pub asset_timeout_ms: u64,
    /// Disk store for mesh assets; `None` uses the platform data directory
    pub assets_dir: Option<PathBuf>,
    /// Undo entries kept before the oldest are dropped
    pub undo_limit: usize,
    /// Maximum nesting accepted when loading a document
    pub max_document_depth: usize,
    pub input_resolution: ProcessingResolution,
    pub output_resolution: ProcessingResolution,
    /// Triangles per BVH leaf
    pub bvh_leaf_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            idle_interval_ms: 50,
            asset_timeout_ms: 5000,
            assets_dir: None,
            undo_limit: 100,
            max_document_depth: shared::MAX_DOCUMENT_DEPTH,
            input_resolution: ProcessingResolution::R64,
            output_resolution: ProcessingResolution::R64,
            bvh_leaf_size: 4,
        }
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "design-scene", "design-scene")
}

impl EngineSettings {
    /// Load settings from file, or return default if not found
    pub fn load() -> Self {
        if let Some(dirs) = project_dirs() {
            let config_path = dirs.config_dir().join(SETTINGS_FILE);
            if let Ok(json) = std::fs::read_to_string(&config_path) {
                match serde_json::from_str(&json) {
                    Ok(settings) => return settings,
                    Err(e) => tracing::warn!("Ignoring malformed {}: {e}", config_path.display()),
                }
            }
        }
        Self::default()
    }

    /// Save settings to file
    pub fn save(&self) {
        if let Some(dirs) = project_dirs() {
            let config_dir = dirs.config_dir();
            if std::fs::create_dir_all(config_dir).is_ok() {
                let config_path = config_dir.join(SETTINGS_FILE);
                if let Ok(json) = serde_json::to_string_pretty(self) {
                    if let Err(e) = std::fs::write(&config_path, json) {
                        tracing::warn!("Failed to write {}: {e}", config_path.display());
                    }
                }
            }
        }
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn asset_timeout(&self) -> Duration {
        Duration::from_millis(self.asset_timeout_ms)
    }

    /// Directory holding `<hash>.stl` assets.
    pub fn resolved_assets_dir(&self) -> PathBuf {
        if let Some(dir) = &self.assets_dir {
            return dir.clone();
        }
        match project_dirs() {
            Some(dirs) => dirs.data_dir().join("assets"),
            None => std::env::temp_dir().join("design-scene").join("assets"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = EngineSettings::default();
        assert_eq!(s.idle_interval(), Duration::from_millis(50));
        assert_eq!(s.undo_limit, 100);
        assert_eq!(s.max_document_depth, 256);
        assert_eq!(s.input_resolution, ProcessingResolution::R64);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let s: EngineSettings = serde_json::from_str(r#"{"undo_limit": 5}"#).unwrap();
        assert_eq!(s.undo_limit, 5);
        assert_eq!(s.asset_timeout_ms, 5000);
        assert_eq!(s.bvh_leaf_size, 4);
    }

    #[test]
    fn test_explicit_assets_dir() {
        let s = EngineSettings {
            assets_dir: Some(PathBuf::from("/tmp/x")),
            ..Default::default()
        };
        assert_eq!(s.resolved_assets_dir(), PathBuf::from("/tmp/x"));
    }
}
