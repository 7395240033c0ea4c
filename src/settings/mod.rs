// Gate settings - timing windows and the two bound shortcuts, persisted as JSON
// Follows the dictionary store pattern for file-based persistence

use crate::gate::{
    GateConfig, DEFAULT_COOLDOWN_MS, DEFAULT_HANDS_FREE_DEBOUNCE_MS, DEFAULT_MINIMUM_VISIBLE_MS,
    DEFAULT_PROMOTION_WINDOW_MS,
};
use crate::gate::failsafe::DEFAULT_FAILSAFE_GRACE_MS;
use crate::hotkey::binding::ShortcutBinding;
use crate::hotkey::double_tap::DEFAULT_DOUBLE_TAP_WINDOW_MS;
use crate::hotkey::readiness::{
    ReadinessConfig, DEFAULT_READINESS_INTERVAL_MS, DEFAULT_READINESS_MAX_ATTEMPTS,
};
use crate::override_arming::{
    platform_reserved_keys, ArmingConfig, BindingSource, DEFAULT_REARM_DELAY_MS,
    DEFAULT_TEARDOWN_DEBOUNCE_MS,
};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR_NAME: &str = "dictation-gate";
const SETTINGS_FILE_NAME: &str = "settings.json";

/// Error types for settings operations
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Could not determine config directory")]
    ConfigDirNotFound,
    #[error("Failed to read settings from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid settings in {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to persist settings: {0}")]
    Persist(String),
}

/// Persisted gate settings. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GateSettings {
    pub promotion_window_ms: u64,
    pub minimum_visible_ms: u64,
    pub double_tap_window_ms: u64,
    pub cooldown_ms: u64,
    pub hands_free_debounce_ms: u64,
    pub failsafe_grace_ms: u64,
    /// Start push-to-talk on press, skipping the promotion window
    pub ptt_immediate_hold: bool,
    pub rearm_delay_ms: u64,
    pub teardown_debounce_ms: u64,
    pub readiness_interval_ms: u64,
    pub readiness_max_attempts: u32,
    pub dictation_shortcut: Option<ShortcutBinding>,
    pub hands_free_shortcut: Option<ShortcutBinding>,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            promotion_window_ms: DEFAULT_PROMOTION_WINDOW_MS,
            minimum_visible_ms: DEFAULT_MINIMUM_VISIBLE_MS,
            double_tap_window_ms: DEFAULT_DOUBLE_TAP_WINDOW_MS,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            hands_free_debounce_ms: DEFAULT_HANDS_FREE_DEBOUNCE_MS,
            failsafe_grace_ms: DEFAULT_FAILSAFE_GRACE_MS,
            ptt_immediate_hold: false,
            rearm_delay_ms: DEFAULT_REARM_DELAY_MS,
            teardown_debounce_ms: DEFAULT_TEARDOWN_DEBOUNCE_MS,
            readiness_interval_ms: DEFAULT_READINESS_INTERVAL_MS,
            readiness_max_attempts: DEFAULT_READINESS_MAX_ATTEMPTS,
            dictation_shortcut: None,
            hands_free_shortcut: None,
        }
    }
}

impl GateSettings {
    /// `<config dir>/dictation-gate/settings.json`
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        let config_dir = dirs::config_dir().ok_or(SettingsError::ConfigDirNotFound)?;
        Ok(config_dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
    }

    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        crate::debug!("Loading settings from {:?}", path);

        if !path.exists() {
            crate::debug!("No settings file found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like [`GateSettings::load`], falling back to defaults on any error
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            crate::warn!("{}; using default settings", e);
            Self::default()
        })
    }

    /// Persist using atomic write (temp file + rename)
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SettingsError::Persist(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| SettingsError::Persist(e.to_string()))?;

        let temp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&temp_path).map_err(|e| {
                SettingsError::Persist(format!("Failed to create temp file: {}", e))
            })?;
            file.write_all(content.as_bytes())
                .map_err(|e| SettingsError::Persist(format!("Failed to write: {}", e)))?;
            file.sync_all()
                .map_err(|e| SettingsError::Persist(format!("Failed to sync: {}", e)))?;
        }

        fs::rename(&temp_path, path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            SettingsError::Persist(format!("Failed to rename: {}", e))
        })?;

        crate::debug!("Settings persisted to {:?}", path);
        Ok(())
    }

    pub fn gate_config(&self) -> GateConfig {
        let config = GateConfig {
            promotion_window: Duration::from_millis(self.promotion_window_ms),
            minimum_visible: Duration::from_millis(self.minimum_visible_ms),
            double_tap_window: Duration::from_millis(self.double_tap_window_ms),
            cooldown: Duration::from_millis(self.cooldown_ms),
            hands_free_debounce: Duration::from_millis(self.hands_free_debounce_ms),
            failsafe_grace: Duration::from_millis(self.failsafe_grace_ms),
        };
        if self.ptt_immediate_hold {
            config.immediate_hold()
        } else {
            config
        }
    }

    pub fn arming_config(&self) -> ArmingConfig {
        ArmingConfig {
            reserved_keys: platform_reserved_keys(),
            rearm_delay: Duration::from_millis(self.rearm_delay_ms),
            teardown_debounce: Duration::from_millis(self.teardown_debounce_ms),
        }
    }

    pub fn readiness_config(&self) -> ReadinessConfig {
        ReadinessConfig {
            interval: Duration::from_millis(self.readiness_interval_ms),
            max_attempts: self.readiness_max_attempts,
        }
    }
}

/// Reads the bindings straight from the settings file on every query.
///
/// A missing, unreadable or half-written file reads as "no binding".
#[derive(Debug, Clone)]
pub struct FileBindingSource {
    path: PathBuf,
}

impl FileBindingSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Option<GateSettings> {
        match GateSettings::load(&self.path) {
            Ok(settings) => Some(settings),
            Err(e) => {
                crate::debug!("Binding read failed: {}", e);
                None
            }
        }
    }
}

impl BindingSource for FileBindingSource {
    fn dictation(&self) -> Option<ShortcutBinding> {
        self.read().and_then(|s| s.dictation_shortcut)
    }

    fn hands_free(&self) -> Option<ShortcutBinding> {
        self.read().and_then(|s| s.hands_free_shortcut)
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
