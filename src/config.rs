// Engine configuration: headless flag, debug level, wall-clock timeout,
// timing mode, asset root.  Stored as JSON next to the script assets.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::vm::timing::TimingMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Run without a presenting renderer; `render()` becomes a no-op.
    pub headless: bool,
    /// Diagnostic verbosity: 0 = errors only, 1 = important ops, 2 = all.
    pub debug_level: u8,
    /// Wall-clock timeout in seconds.  0 = no timeout.
    pub timeout_secs: u64,
    /// Which clock drives the scheduler (TIME or MIDI_TIME).
    pub timing: TimingMode,
    /// Root directory for the stock asset loader.
    pub asset_root: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            headless: false,
            debug_level: 0,
            timeout_secs: 0,
            timing: TimingMode::Time,
            asset_root: None,
        }
    }
}

impl EngineConfig {
    /// Load a config from disk, or return defaults if missing / invalid.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&content) {
            Ok(cfg) => cfg,
            Err(e) => {
                log::warn!("invalid config {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Save the config to disk.
    pub fn save(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::warn!("cannot save config {}: {e}", path.display());
                }
            }
            Err(e) => log::warn!("cannot serialize config: {e}"),
        }
    }

    pub fn headless() -> Self {
        Self {
            headless: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = EngineConfig::load(Path::new("/nonexistent/filly.json"));
        assert!(!cfg.headless);
        assert_eq!(cfg.debug_level, 0);
        assert_eq!(cfg.timing, TimingMode::Time);
    }

    #[test]
    fn round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut cfg = EngineConfig::headless();
        cfg.debug_level = 2;
        cfg.timeout_secs = 30;
        cfg.timing = TimingMode::MidiTime;
        cfg.save(&path);

        let loaded = EngineConfig::load(&path);
        assert!(loaded.headless);
        assert_eq!(loaded.debug_level, 2);
        assert_eq!(loaded.timeout_secs, 30);
        assert_eq!(loaded.timing, TimingMode::MidiTime);
    }
}
