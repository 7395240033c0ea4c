//! The shortcut a user bound to a role.
//!
//! Three shapes: a single key with modifiers, a chord of several keys with
//! modifiers, or a combination of modifiers alone. Side codes pin a modifier
//! to a physical key (Left ⌥ vs Right ⌥); an empty set accepts either side.

use crate::keyboard_capture::keycodes::{is_modifier_key_code, keycode_to_name, normalize};
use crate::keyboard_capture::modifiers::{family_for_code, ModifierSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Reasons a binding cannot be used
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    #[error("Shortcut has no keys")]
    NoKeys,
    #[error("Modifier-only shortcut has no modifiers")]
    NoModifiers,
    #[error("{0} is a modifier key; bind it as a modifier-only shortcut")]
    ModifierAsKey(String),
    #[error("{0} is not a modifier key")]
    NotAModifier(String),
    #[error("{key} does not belong to the shortcut's modifiers ({modifiers})")]
    SideCodeOutsideModifiers { key: String, modifiers: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ShortcutBinding {
    #[serde(rename_all = "camelCase")]
    SingleKey {
        key: u16,
        #[serde(default)]
        modifiers: ModifierSet,
    },
    #[serde(rename_all = "camelCase")]
    Chord {
        keys: BTreeSet<u16>,
        #[serde(default)]
        modifiers: ModifierSet,
        #[serde(default)]
        modifier_side_codes: BTreeSet<u16>,
    },
    #[serde(rename_all = "camelCase")]
    ModifiersOnly {
        #[serde(default)]
        side_codes: BTreeSet<u16>,
        #[serde(default)]
        modifiers: ModifierSet,
    },
}

impl ShortcutBinding {
    pub fn single_key(key: u16, modifiers: ModifierSet) -> Self {
        ShortcutBinding::SingleKey { key, modifiers }
    }

    /// A modifier-only binding pinned to the given physical keys
    pub fn modifier_keys(side_codes: impl IntoIterator<Item = u16>) -> Self {
        ShortcutBinding::ModifiersOnly {
            side_codes: side_codes.into_iter().collect(),
            modifiers: ModifierSet::EMPTY,
        }
        .normalized()
    }

    /// Logical modifiers the binding requires
    pub fn modifiers(&self) -> ModifierSet {
        match self {
            ShortcutBinding::SingleKey { modifiers, .. }
            | ShortcutBinding::Chord { modifiers, .. }
            | ShortcutBinding::ModifiersOnly { modifiers, .. } => *modifiers,
        }
    }

    /// Non-modifier keys, empty for modifier-only bindings
    pub fn keys(&self) -> BTreeSet<u16> {
        match self {
            ShortcutBinding::SingleKey { key, .. } => BTreeSet::from([*key]),
            ShortcutBinding::Chord { keys, .. } => keys.clone(),
            ShortcutBinding::ModifiersOnly { .. } => BTreeSet::new(),
        }
    }

    /// Physical modifier keys that must be held
    pub fn side_codes(&self) -> BTreeSet<u16> {
        match self {
            ShortcutBinding::SingleKey { .. } => BTreeSet::new(),
            ShortcutBinding::Chord {
                modifier_side_codes,
                ..
            } => modifier_side_codes.clone(),
            ShortcutBinding::ModifiersOnly { side_codes, .. } => side_codes.clone(),
        }
    }

    pub fn is_modifiers_only(&self) -> bool {
        matches!(self, ShortcutBinding::ModifiersOnly { .. })
    }

    /// The bare key with no modifiers, if this binding is exactly that
    pub fn bare_key(&self) -> Option<u16> {
        match self {
            ShortcutBinding::SingleKey { key, modifiers } if modifiers.is_empty() => {
                Some(normalize(*key))
            }
            ShortcutBinding::Chord {
                keys,
                modifiers,
                modifier_side_codes,
            } if keys.len() == 1 && modifiers.is_empty() && modifier_side_codes.is_empty() => {
                keys.iter().next().map(|key| normalize(*key))
            }
            _ => None,
        }
    }

    /// Fold hardware aliases and add the families implied by side codes
    pub fn normalized(&self) -> Self {
        match self {
            ShortcutBinding::SingleKey { key, modifiers } => ShortcutBinding::SingleKey {
                key: normalize(*key),
                modifiers: *modifiers,
            },
            ShortcutBinding::Chord {
                keys,
                modifiers,
                modifier_side_codes,
            } => {
                let side_codes = normalize_codes(modifier_side_codes);
                ShortcutBinding::Chord {
                    keys: normalize_codes(keys),
                    modifiers: with_side_families(*modifiers, &side_codes),
                    modifier_side_codes: side_codes,
                }
            }
            ShortcutBinding::ModifiersOnly {
                side_codes,
                modifiers,
            } => {
                let side_codes = normalize_codes(side_codes);
                ShortcutBinding::ModifiersOnly {
                    modifiers: with_side_families(*modifiers, &side_codes),
                    side_codes,
                }
            }
        }
    }

    /// Check the binding is usable as-is (call on a normalized binding)
    pub fn validate(&self) -> Result<(), BindingError> {
        match self {
            ShortcutBinding::SingleKey { key, .. } => validate_key(*key),
            ShortcutBinding::Chord {
                keys,
                modifiers,
                modifier_side_codes,
            } => {
                if keys.is_empty() {
                    return Err(BindingError::NoKeys);
                }
                keys.iter().try_for_each(|key| validate_key(*key))?;
                validate_side_codes(modifier_side_codes, *modifiers)
            }
            ShortcutBinding::ModifiersOnly {
                side_codes,
                modifiers,
            } => {
                if modifiers.is_empty() {
                    return Err(BindingError::NoModifiers);
                }
                validate_side_codes(side_codes, *modifiers)
            }
        }
    }
}

fn normalize_codes(codes: &BTreeSet<u16>) -> BTreeSet<u16> {
    codes.iter().map(|code| normalize(*code)).collect()
}

fn with_side_families(mut modifiers: ModifierSet, side_codes: &BTreeSet<u16>) -> ModifierSet {
    for family in side_codes.iter().filter_map(|code| family_for_code(*code)) {
        modifiers.insert(family);
    }
    modifiers
}

fn validate_key(key: u16) -> Result<(), BindingError> {
    if is_modifier_key_code(key) {
        return Err(BindingError::ModifierAsKey(keycode_to_name(key)));
    }
    Ok(())
}

fn validate_side_codes(side_codes: &BTreeSet<u16>, modifiers: ModifierSet) -> Result<(), BindingError> {
    for code in side_codes {
        let family =
            family_for_code(*code).ok_or_else(|| BindingError::NotAModifier(keycode_to_name(*code)))?;
        if !modifiers.contains_family(family) {
            return Err(BindingError::SideCodeOutsideModifiers {
                key: keycode_to_name(*code),
                modifiers: modifiers.to_string(),
            });
        }
    }
    Ok(())
}

impl fmt::Display for ShortcutBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        match self {
            ShortcutBinding::SingleKey { key, modifiers } => {
                if !modifiers.is_empty() {
                    parts.push(modifiers.to_string());
                }
                parts.push(keycode_to_name(*key));
            }
            ShortcutBinding::Chord {
                keys,
                modifiers,
                modifier_side_codes,
            } => {
                parts.extend(describe_modifiers(modifier_side_codes, *modifiers));
                parts.extend(keys.iter().map(|key| keycode_to_name(*key)));
            }
            ShortcutBinding::ModifiersOnly {
                side_codes,
                modifiers,
            } => parts.extend(describe_modifiers(side_codes, *modifiers)),
        }
        write!(f, "{}", parts.join(" + "))
    }
}

/// Sided keys by name, then any families left unpinned as symbols
fn describe_modifiers(side_codes: &BTreeSet<u16>, modifiers: ModifierSet) -> Vec<String> {
    let mut parts: Vec<String> = side_codes.iter().map(|code| keycode_to_name(*code)).collect();
    let mut unpinned = ModifierSet::EMPTY;
    for family in modifiers.families() {
        let pinned = side_codes
            .iter()
            .any(|code| family_for_code(*code) == Some(family));
        if !pinned {
            unpinned.insert(family);
        }
    }
    if !unpinned.is_empty() {
        parts.push(unpinned.to_string());
    }
    parts
}

#[cfg(test)]
#[path = "binding_test.rs"]
mod tests;
