//! Logical key codes and hardware alias folding.
//!
//! Logical codes live in the macOS virtual key-code space. Other platforms
//! translate their native keys into this space at the capture boundary, so
//! everything above the capture layer compares plain `u16` values.

use std::ops::RangeInclusive;

/// Canonical code for the Fn/Globe modifier
pub const FN_KEY_CODE: u16 = 63;

/// Alternate raw codes some keyboards report for Fn/Globe
pub const FN_ALIAS_CODES: [u16; 2] = [179, 244];

/// Range emitted by systemwide remapping layers for F1..F12 ("shifted" function keys)
const SHIFTED_FUNCTION_KEY_RANGE: RangeInclusive<u16> = 176..=187;
const SHIFTED_FUNCTION_KEY_OFFSET: u16 = 80;

pub const F5_KEY_CODE: u16 = 96;
pub const ESCAPE_KEY_CODE: u16 = 53;
pub const SPACE_KEY_CODE: u16 = 49;

// Physical modifier keys
pub const LEFT_COMMAND_KEY_CODE: u16 = 55;
pub const RIGHT_COMMAND_KEY_CODE: u16 = 54;
pub const LEFT_SHIFT_KEY_CODE: u16 = 56;
pub const RIGHT_SHIFT_KEY_CODE: u16 = 60;
pub const LEFT_OPTION_KEY_CODE: u16 = 58;
pub const RIGHT_OPTION_KEY_CODE: u16 = 61;
pub const LEFT_CONTROL_KEY_CODE: u16 = 59;
pub const RIGHT_CONTROL_KEY_CODE: u16 = 62;
pub const CAPS_LOCK_KEY_CODE: u16 = 57;

/// System-defined media key that triggers OS dictation (IOKit NX_KEYTYPE_DICTATION)
pub const NX_KEYTYPE_DICTATION: u32 = 0x82;

/// Fold a raw hardware code onto its logical key code.
///
/// Total and idempotent: unknown codes are returned unchanged and no folded
/// code lands back inside an alias range.
pub fn normalize(raw: u16) -> u16 {
    if FN_ALIAS_CODES.contains(&raw) {
        FN_KEY_CODE
    } else if SHIFTED_FUNCTION_KEY_RANGE.contains(&raw) {
        raw - SHIFTED_FUNCTION_KEY_OFFSET
    } else {
        raw
    }
}

/// Whether a raw or logical code refers to the Fn/Globe key
pub fn is_fn_key_code(key_code: u16) -> bool {
    key_code == FN_KEY_CODE || FN_ALIAS_CODES.contains(&key_code)
}

/// Whether a logical code is one of the physical modifier keys (caps lock excluded)
pub fn is_modifier_key_code(key_code: u16) -> bool {
    matches!(
        normalize(key_code),
        LEFT_COMMAND_KEY_CODE
            | RIGHT_COMMAND_KEY_CODE
            | LEFT_SHIFT_KEY_CODE
            | RIGHT_SHIFT_KEY_CODE
            | LEFT_OPTION_KEY_CODE
            | RIGHT_OPTION_KEY_CODE
            | LEFT_CONTROL_KEY_CODE
            | RIGHT_CONTROL_KEY_CODE
            | FN_KEY_CODE
    )
}

/// Convert a logical key code to a human-readable key name
pub fn keycode_to_name(key_code: u16) -> String {
    let name = match normalize(key_code) {
        // Letters
        0 => "A",
        1 => "S",
        2 => "D",
        3 => "F",
        4 => "H",
        5 => "G",
        6 => "Z",
        7 => "X",
        8 => "C",
        9 => "V",
        11 => "B",
        12 => "Q",
        13 => "W",
        14 => "E",
        15 => "R",
        16 => "Y",
        17 => "T",
        31 => "O",
        32 => "U",
        34 => "I",
        35 => "P",
        37 => "L",
        38 => "J",
        40 => "K",
        45 => "N",
        46 => "M",

        // Numbers (top row)
        18 => "1",
        19 => "2",
        20 => "3",
        21 => "4",
        22 => "6",
        23 => "5",
        25 => "9",
        26 => "7",
        28 => "8",
        29 => "0",

        // Special keys
        36 => "Return",
        48 => "Tab",
        49 => "Space",
        51 => "Backspace",
        53 => "Escape",
        117 => "Delete",
        115 => "Home",
        119 => "End",
        116 => "PageUp",
        121 => "PageDown",
        123 => "Left",
        124 => "Right",
        125 => "Down",
        126 => "Up",

        // Function keys
        122 => "F1",
        120 => "F2",
        99 => "F3",
        118 => "F4",
        96 => "F5",
        97 => "F6",
        98 => "F7",
        100 => "F8",
        101 => "F9",
        109 => "F10",
        103 => "F11",
        111 => "F12",
        105 => "F13",
        107 => "F14",
        113 => "F15",
        106 => "F16",
        64 => "F17",
        79 => "F18",
        80 => "F19",

        // Modifiers
        LEFT_COMMAND_KEY_CODE => "Left ⌘",
        RIGHT_COMMAND_KEY_CODE => "Right ⌘",
        LEFT_SHIFT_KEY_CODE => "Left ⇧",
        RIGHT_SHIFT_KEY_CODE => "Right ⇧",
        LEFT_OPTION_KEY_CODE => "Left ⌥",
        RIGHT_OPTION_KEY_CODE => "Right ⌥",
        LEFT_CONTROL_KEY_CODE => "Left ⌃",
        RIGHT_CONTROL_KEY_CODE => "Right ⌃",
        CAPS_LOCK_KEY_CODE => "CapsLock",
        FN_KEY_CODE => "Fn",

        other => return format!("Key({})", other),
    };
    name.to_string()
}

#[cfg(test)]
#[path = "keycodes_test.rs"]
mod tests;
