//! Physical modifier tracking.
//!
//! The OS reports one logical bit per modifier family; this tracker keeps the
//! set of physical modifier keys that are actually held so bindings can tell
//! Left ⌥ from Right ⌥.

use super::keycodes::{normalize, FN_KEY_CODE};
use super::modifiers::{
    device_mask_for_code, family_for_code, opposite_side_code, ModifierFamily, ModifierSet,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Direct hardware query for the Fn/Globe key, used when the flag bit is unreliable
pub trait FnKeyProbe: Send + Sync {
    fn is_fn_down(&self) -> bool;
}

/// Probe for platforms without a hardware Fn query
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFnProbe;

impl FnKeyProbe for NoFnProbe {
    fn is_fn_down(&self) -> bool {
        false
    }
}

#[cfg(target_os = "macos")]
#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventSourceKeyState(state_id: i32, key: u16) -> bool;
}

/// kCGEventSourceStateCombinedSessionState
#[cfg(target_os = "macos")]
const COMBINED_SESSION_STATE: i32 = 0;

/// Queries the combined session key state for Fn and its aliases
#[cfg(target_os = "macos")]
#[derive(Debug, Default, Clone, Copy)]
pub struct HardwareFnProbe;

#[cfg(target_os = "macos")]
impl FnKeyProbe for HardwareFnProbe {
    #[cfg_attr(coverage_nightly, coverage(off))]
    fn is_fn_down(&self) -> bool {
        std::iter::once(FN_KEY_CODE)
            .chain(super::keycodes::FN_ALIAS_CODES)
            // SAFETY: CGEventSourceKeyState only reads global key state
            .any(|code| unsafe { CGEventSourceKeyState(COMBINED_SESSION_STATE, code) })
    }
}

/// The Fn probe for the current platform
pub fn platform_fn_probe() -> Arc<dyn FnKeyProbe> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(HardwareFnProbe)
    }
    #[cfg(not(target_os = "macos"))]
    {
        Arc::new(NoFnProbe)
    }
}

/// Live set of physically held modifier keys
pub struct PhysicalModifierTracker {
    pressed: BTreeSet<u16>,
    fn_probe: Arc<dyn FnKeyProbe>,
}

impl PhysicalModifierTracker {
    pub fn new(fn_probe: Arc<dyn FnKeyProbe>) -> Self {
        Self {
            pressed: BTreeSet::new(),
            fn_probe,
        }
    }

    /// Apply a modifier transition. Returns whether the key is now held.
    ///
    /// Codes that are not modifier keys are ignored and report `false`.
    pub fn observe(&mut self, key_code: u16, flags: u64) -> bool {
        let code = normalize(key_code);
        let Some(family) = family_for_code(code) else {
            return false;
        };

        let is_down = self.decide_pressed(code, family, flags);
        if is_down {
            self.pressed.insert(code);
        } else {
            self.pressed.remove(&code);
        }
        self.reconcile(flags);
        is_down
    }

    fn decide_pressed(&self, code: u16, family: ModifierFamily, flags: u64) -> bool {
        let family_down = flags & family.flag_mask() != 0;

        if family == ModifierFamily::Function {
            return family_down || self.fn_probe.is_fn_down();
        }
        if !family_down {
            return false;
        }

        let Some(own_mask) = device_mask_for_code(code) else {
            return family_down;
        };
        if flags & own_mask != 0 {
            return true;
        }
        // Family still set by the other side: this key was released
        let other_side_down = opposite_side_code(code)
            .and_then(device_mask_for_code)
            .is_some_and(|mask| flags & mask != 0);
        if other_side_down {
            return false;
        }
        // No device bits at all (synthetic events): flagsChanged for a key toggles it
        !self.pressed.contains(&code)
    }

    /// Drop every held key whose family bit is no longer reported.
    ///
    /// Heals entries left behind by a release that was never delivered.
    pub fn reconcile(&mut self, flags: u64) {
        let fn_down = flags & ModifierFamily::Function.flag_mask() != 0;
        let mut probed_fn: Option<bool> = None;
        let probe = &self.fn_probe;
        self.pressed.retain(|code| match family_for_code(*code) {
            Some(ModifierFamily::Function) => {
                fn_down || *probed_fn.get_or_insert_with(|| probe.is_fn_down())
            }
            Some(family) => flags & family.flag_mask() != 0,
            None => false,
        });
    }

    /// Logical modifiers for matching key bindings.
    ///
    /// Fn comes from the physical key rather than the flag bit, since function
    /// row and arrow keys carry the Fn flag without Fn being held.
    pub fn effective_modifiers(&self, flags: u64) -> ModifierSet {
        let mut set = ModifierSet::from_flags(flags);
        if self.is_pressed(FN_KEY_CODE) || self.fn_probe.is_fn_down() {
            set.insert(ModifierFamily::Function);
        } else {
            set.remove(ModifierFamily::Function);
        }
        set
    }

    pub fn is_pressed(&self, key_code: u16) -> bool {
        self.pressed.contains(&normalize(key_code))
    }

    pub fn contains_all(&self, codes: &BTreeSet<u16>) -> bool {
        codes.iter().all(|code| self.is_pressed(*code))
    }

    pub fn pressed_codes(&self) -> &BTreeSet<u16> {
        &self.pressed
    }

    /// Forget every held key (monitor teardown)
    pub fn clear(&mut self) {
        self.pressed.clear();
    }
}

impl Default for PhysicalModifierTracker {
    fn default() -> Self {
        Self::new(platform_fn_probe())
    }
}

#[cfg(test)]
#[path = "tracker_test.rs"]
mod tests;
