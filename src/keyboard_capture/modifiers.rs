//! Modifier flag masks, logical modifier families and side codes.
//!
//! The flag layout follows CGEventFlags: the family bits say "some key of this
//! family is down", the NX_DEVICE* bits say which physical side it is.

use super::keycodes::{
    normalize, FN_KEY_CODE, LEFT_COMMAND_KEY_CODE, LEFT_CONTROL_KEY_CODE, LEFT_OPTION_KEY_CODE,
    LEFT_SHIFT_KEY_CODE, RIGHT_COMMAND_KEY_CODE, RIGHT_CONTROL_KEY_CODE, RIGHT_OPTION_KEY_CODE,
    RIGHT_SHIFT_KEY_CODE,
};
use serde::{Deserialize, Serialize};
use std::fmt;

// Standard modifier flags from CGEvent
pub const CG_EVENT_FLAG_MASK_SHIFT: u64 = 0x00020000;
pub const CG_EVENT_FLAG_MASK_CONTROL: u64 = 0x00040000;
pub const CG_EVENT_FLAG_MASK_ALTERNATE: u64 = 0x00080000;
pub const CG_EVENT_FLAG_MASK_COMMAND: u64 = 0x00100000;
pub const CG_EVENT_FLAG_MASK_SECONDARY_FN: u64 = 0x00800000;

// Left/Right device flags (from IOKit NX_DEVICE*KEYMASK constants)
pub const NX_DEVICELSHIFTKEYMASK: u64 = 0x00000002;
pub const NX_DEVICERSHIFTKEYMASK: u64 = 0x00000004;
pub const NX_DEVICELCTLKEYMASK: u64 = 0x00000001;
pub const NX_DEVICERCTLKEYMASK: u64 = 0x00002000;
pub const NX_DEVICELALTKEYMASK: u64 = 0x00000020;
pub const NX_DEVICERALTKEYMASK: u64 = 0x00000040;
pub const NX_DEVICELCMDKEYMASK: u64 = 0x00000008;
pub const NX_DEVICERCMDKEYMASK: u64 = 0x00000010;

/// A logical modifier, independent of which physical side produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifierFamily {
    Function,
    Control,
    Option,
    Shift,
    Command,
}

impl ModifierFamily {
    /// Display order used by macOS menus
    pub const ALL: [ModifierFamily; 5] = [
        ModifierFamily::Function,
        ModifierFamily::Control,
        ModifierFamily::Option,
        ModifierFamily::Shift,
        ModifierFamily::Command,
    ];

    /// The family bit in a CGEventFlags value
    pub fn flag_mask(self) -> u64 {
        match self {
            ModifierFamily::Function => CG_EVENT_FLAG_MASK_SECONDARY_FN,
            ModifierFamily::Control => CG_EVENT_FLAG_MASK_CONTROL,
            ModifierFamily::Option => CG_EVENT_FLAG_MASK_ALTERNATE,
            ModifierFamily::Shift => CG_EVENT_FLAG_MASK_SHIFT,
            ModifierFamily::Command => CG_EVENT_FLAG_MASK_COMMAND,
        }
    }

    /// Physical key codes that produce this family
    pub fn side_codes(self) -> &'static [u16] {
        match self {
            ModifierFamily::Function => &[FN_KEY_CODE],
            ModifierFamily::Control => &[LEFT_CONTROL_KEY_CODE, RIGHT_CONTROL_KEY_CODE],
            ModifierFamily::Option => &[LEFT_OPTION_KEY_CODE, RIGHT_OPTION_KEY_CODE],
            ModifierFamily::Shift => &[LEFT_SHIFT_KEY_CODE, RIGHT_SHIFT_KEY_CODE],
            ModifierFamily::Command => &[LEFT_COMMAND_KEY_CODE, RIGHT_COMMAND_KEY_CODE],
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ModifierFamily::Function => "Fn",
            ModifierFamily::Control => "⌃",
            ModifierFamily::Option => "⌥",
            ModifierFamily::Shift => "⇧",
            ModifierFamily::Command => "⌘",
        }
    }
}

/// Logical modifier family produced by a physical modifier key
pub fn family_for_code(key_code: u16) -> Option<ModifierFamily> {
    match normalize(key_code) {
        LEFT_COMMAND_KEY_CODE | RIGHT_COMMAND_KEY_CODE => Some(ModifierFamily::Command),
        LEFT_SHIFT_KEY_CODE | RIGHT_SHIFT_KEY_CODE => Some(ModifierFamily::Shift),
        LEFT_OPTION_KEY_CODE | RIGHT_OPTION_KEY_CODE => Some(ModifierFamily::Option),
        LEFT_CONTROL_KEY_CODE | RIGHT_CONTROL_KEY_CODE => Some(ModifierFamily::Control),
        FN_KEY_CODE => Some(ModifierFamily::Function),
        _ => None,
    }
}

/// Device-side bit for a physical modifier key. Fn has no side bit.
pub fn device_mask_for_code(key_code: u16) -> Option<u64> {
    match normalize(key_code) {
        LEFT_SHIFT_KEY_CODE => Some(NX_DEVICELSHIFTKEYMASK),
        RIGHT_SHIFT_KEY_CODE => Some(NX_DEVICERSHIFTKEYMASK),
        LEFT_CONTROL_KEY_CODE => Some(NX_DEVICELCTLKEYMASK),
        RIGHT_CONTROL_KEY_CODE => Some(NX_DEVICERCTLKEYMASK),
        LEFT_OPTION_KEY_CODE => Some(NX_DEVICELALTKEYMASK),
        RIGHT_OPTION_KEY_CODE => Some(NX_DEVICERALTKEYMASK),
        LEFT_COMMAND_KEY_CODE => Some(NX_DEVICELCMDKEYMASK),
        RIGHT_COMMAND_KEY_CODE => Some(NX_DEVICERCMDKEYMASK),
        _ => None,
    }
}

/// The same-family key on the other side of the keyboard
pub fn opposite_side_code(key_code: u16) -> Option<u16> {
    match normalize(key_code) {
        LEFT_SHIFT_KEY_CODE => Some(RIGHT_SHIFT_KEY_CODE),
        RIGHT_SHIFT_KEY_CODE => Some(LEFT_SHIFT_KEY_CODE),
        LEFT_CONTROL_KEY_CODE => Some(RIGHT_CONTROL_KEY_CODE),
        RIGHT_CONTROL_KEY_CODE => Some(LEFT_CONTROL_KEY_CODE),
        LEFT_OPTION_KEY_CODE => Some(RIGHT_OPTION_KEY_CODE),
        RIGHT_OPTION_KEY_CODE => Some(LEFT_OPTION_KEY_CODE),
        LEFT_COMMAND_KEY_CODE => Some(RIGHT_COMMAND_KEY_CODE),
        RIGHT_COMMAND_KEY_CODE => Some(LEFT_COMMAND_KEY_CODE),
        _ => None,
    }
}

/// Set of logical modifiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ModifierSet {
    /// Fn/Globe
    pub function: bool,
    pub control: bool,
    /// Option/Alt
    pub option: bool,
    pub shift: bool,
    /// Command/Meta
    pub command: bool,
}

impl ModifierSet {
    pub const EMPTY: ModifierSet = ModifierSet {
        function: false,
        control: false,
        option: false,
        shift: false,
        command: false,
    };

    /// Extract the logical modifiers from raw CGEventFlags bits
    pub fn from_flags(flags: u64) -> Self {
        let mut set = Self::EMPTY;
        for family in ModifierFamily::ALL {
            if flags & family.flag_mask() != 0 {
                set.insert(family);
            }
        }
        set
    }

    pub fn to_flags(self) -> u64 {
        self.families().fold(0, |acc, family| acc | family.flag_mask())
    }

    pub fn contains_family(self, family: ModifierFamily) -> bool {
        match family {
            ModifierFamily::Function => self.function,
            ModifierFamily::Control => self.control,
            ModifierFamily::Option => self.option,
            ModifierFamily::Shift => self.shift,
            ModifierFamily::Command => self.command,
        }
    }

    pub fn insert(&mut self, family: ModifierFamily) {
        self.set_family(family, true);
    }

    pub fn remove(&mut self, family: ModifierFamily) {
        self.set_family(family, false);
    }

    pub fn with(mut self, family: ModifierFamily) -> Self {
        self.insert(family);
        self
    }

    fn set_family(&mut self, family: ModifierFamily, value: bool) {
        match family {
            ModifierFamily::Function => self.function = value,
            ModifierFamily::Control => self.control = value,
            ModifierFamily::Option => self.option = value,
            ModifierFamily::Shift => self.shift = value,
            ModifierFamily::Command => self.command = value,
        }
    }

    /// Every family in `other` is also in `self`
    pub fn contains(self, other: ModifierSet) -> bool {
        other.families().all(|family| self.contains_family(family))
    }

    pub fn is_empty(self) -> bool {
        self == Self::EMPTY
    }

    pub fn len(self) -> usize {
        self.families().count()
    }

    pub fn families(self) -> impl Iterator<Item = ModifierFamily> {
        ModifierFamily::ALL
            .into_iter()
            .filter(move |family| self.contains_family(*family))
    }
}

impl fmt::Display for ModifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for family in self.families() {
            write!(f, "{}", family.symbol())?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "modifiers_test.rs"]
mod tests;
