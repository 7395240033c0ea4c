use super::*;

#[test]
fn test_fn_aliases_fold_to_canonical_fn() {
    assert_eq!(normalize(179), FN_KEY_CODE);
    assert_eq!(normalize(244), FN_KEY_CODE);
    assert_eq!(normalize(FN_KEY_CODE), FN_KEY_CODE);
}

#[test]
fn test_shifted_function_range_folds_onto_function_keys() {
    assert_eq!(normalize(176), F5_KEY_CODE);
    assert_eq!(normalize(187), 107);
    assert_eq!(normalize(178), 98);
}

#[test]
fn test_fn_alias_wins_over_shifted_range() {
    // 179 sits inside 176..=187 but is a Fn alias first
    assert_eq!(normalize(179), FN_KEY_CODE);
}

#[test]
fn test_unknown_codes_pass_through() {
    assert_eq!(normalize(0), 0);
    assert_eq!(normalize(175), 175);
    assert_eq!(normalize(188), 188);
    assert_eq!(normalize(u16::MAX), u16::MAX);
}

#[test]
fn test_normalize_is_idempotent_for_every_code() {
    for raw in 0..=u16::MAX {
        let once = normalize(raw);
        assert_eq!(normalize(once), once, "raw code {} not idempotent", raw);
    }
}

#[test]
fn test_is_fn_key_code() {
    assert!(is_fn_key_code(63));
    assert!(is_fn_key_code(179));
    assert!(is_fn_key_code(244));
    assert!(!is_fn_key_code(96));
}

#[test]
fn test_is_modifier_key_code() {
    assert!(is_modifier_key_code(LEFT_OPTION_KEY_CODE));
    assert!(is_modifier_key_code(RIGHT_COMMAND_KEY_CODE));
    assert!(is_modifier_key_code(244));
    assert!(!is_modifier_key_code(CAPS_LOCK_KEY_CODE));
    assert!(!is_modifier_key_code(F5_KEY_CODE));
}

#[test]
fn test_keycode_to_name() {
    assert_eq!(keycode_to_name(F5_KEY_CODE), "F5");
    assert_eq!(keycode_to_name(176), "F5");
    assert_eq!(keycode_to_name(244), "Fn");
    assert_eq!(keycode_to_name(LEFT_OPTION_KEY_CODE), "Left ⌥");
    assert_eq!(keycode_to_name(SPACE_KEY_CODE), "Space");
    assert_eq!(keycode_to_name(999), "Key(999)");
}
