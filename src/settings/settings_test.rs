// Tests for GateSettings and FileBindingSource
// Test cases:
// - Missing file loads defaults; save/load cycle keeps shortcuts
// - Partial JSON fills in defaults (backward compat)
// - Corrupt file is an error for load, defaults for load_or_default, no binding for the source
// - Immediate hold zeroes promotion and minimum-visible windows

use super::*;
use crate::keyboard_capture::keycodes::{F5_KEY_CODE, LEFT_OPTION_KEY_CODE};
use crate::keyboard_capture::modifiers::ModifierSet;
use tempfile::TempDir;

fn settings_path() -> (PathBuf, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("settings.json");
    (path, temp_dir)
}

#[test]
fn test_missing_file_loads_defaults() {
    let (path, _temp_dir) = settings_path();
    assert_eq!(GateSettings::load(&path).unwrap(), GateSettings::default());
}

#[test]
fn test_save_load_cycle() {
    let (path, _temp_dir) = settings_path();
    let settings = GateSettings {
        cooldown_ms: 300,
        ptt_immediate_hold: true,
        dictation_shortcut: Some(ShortcutBinding::modifier_keys([LEFT_OPTION_KEY_CODE])),
        hands_free_shortcut: Some(ShortcutBinding::single_key(
            F5_KEY_CODE,
            ModifierSet::EMPTY,
        )),
        ..Default::default()
    };

    settings.save(&path).unwrap();
    assert!(!path.with_extension("tmp").exists());
    assert_eq!(GateSettings::load(&path).unwrap(), settings);
}

#[test]
fn test_partial_json_uses_defaults() {
    let (path, _temp_dir) = settings_path();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(
        &path,
        r#"{ "promotionWindowMs": 250, "dictationShortcut": { "type": "singleKey", "key": 96 } }"#,
    )
    .unwrap();

    let settings = GateSettings::load(&path).unwrap();
    assert_eq!(settings.promotion_window_ms, 250);
    assert_eq!(settings.cooldown_ms, DEFAULT_COOLDOWN_MS);
    assert_eq!(
        settings.dictation_shortcut,
        Some(ShortcutBinding::single_key(F5_KEY_CODE, ModifierSet::EMPTY))
    );
    assert_eq!(settings.hands_free_shortcut, None);
}

#[test]
fn test_corrupt_file() {
    let (path, _temp_dir) = settings_path();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "{ \"cooldownMs\": ").unwrap();

    assert!(matches!(
        GateSettings::load(&path),
        Err(SettingsError::Parse { .. })
    ));
    assert_eq!(GateSettings::load_or_default(&path), GateSettings::default());

    let source = FileBindingSource::new(path);
    assert_eq!(source.dictation(), None);
}

#[test]
fn test_file_source_reads_current_contents() {
    let (path, _temp_dir) = settings_path();
    let source = FileBindingSource::new(path.clone());
    assert_eq!(source.dictation(), None);

    let binding = ShortcutBinding::single_key(F5_KEY_CODE, ModifierSet::EMPTY);
    GateSettings {
        dictation_shortcut: Some(binding.clone()),
        ..Default::default()
    }
    .save(&path)
    .unwrap();

    assert_eq!(source.dictation(), Some(binding));
    assert_eq!(source.hands_free(), None);
}

#[test]
fn test_gate_config_from_settings() {
    let settings = GateSettings::default();
    assert_eq!(settings.gate_config(), GateConfig::default());

    let immediate = GateSettings {
        ptt_immediate_hold: true,
        ..Default::default()
    }
    .gate_config();
    assert!(immediate.promotion_window.is_zero());
    assert!(immediate.minimum_visible.is_zero());
    assert_eq!(immediate.cooldown, Duration::from_millis(DEFAULT_COOLDOWN_MS));
}

#[test]
fn test_arming_and_readiness_config_from_settings() {
    let settings = GateSettings {
        teardown_debounce_ms: 750,
        readiness_max_attempts: 3,
        ..Default::default()
    };

    let arming = settings.arming_config();
    assert_eq!(arming.teardown_debounce, Duration::from_millis(750));
    assert_eq!(arming.rearm_delay, Duration::from_millis(DEFAULT_REARM_DELAY_MS));

    let readiness = settings.readiness_config();
    assert_eq!(readiness.max_attempts, 3);
    assert_eq!(readiness.interval, Duration::from_millis(1000));
}

#[test]
fn test_default_path_ends_with_app_file() {
    if let Ok(path) = GateSettings::default_path() {
        assert!(path.ends_with("dictation-gate/settings.json"));
    }
}
