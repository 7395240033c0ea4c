//! Per-binding matcher turning raw key events into press/release triggers.
//!
//! Key bindings need exact logical-modifier equality plus the physical side
//! codes. Modifier-only bindings are edge-triggered: one press when the full
//! set engages, one release when it stops being satisfied.

use super::binding::ShortcutBinding;
use crate::keyboard_capture::tracker::PhysicalModifierTracker;
use crate::keyboard_capture::{KeyEventKind, RawKeyEvent};
use crate::keyboard_capture::modifiers::ModifierSet;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Pressed,
    Released,
}

/// Live keyboard state a monitor matches against
pub struct MatchContext<'a> {
    pub tracker: &'a PhysicalModifierTracker,
    /// Non-modifier keys currently held (excluding the event's own key)
    pub held_keys: &'a BTreeSet<u16>,
}

pub struct BindingMonitor {
    binding: ShortcutBinding,
    keys: BTreeSet<u16>,
    modifiers: ModifierSet,
    side_codes: BTreeSet<u16>,
    engaged: bool,
}

impl BindingMonitor {
    pub fn new(binding: &ShortcutBinding) -> Self {
        let binding = binding.normalized();
        Self {
            keys: binding.keys(),
            modifiers: binding.modifiers(),
            side_codes: binding.side_codes(),
            binding,
            engaged: false,
        }
    }

    pub fn binding(&self) -> &ShortcutBinding {
        &self.binding
    }

    /// Whether a press has been reported without its release
    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    pub fn reset(&mut self) {
        self.engaged = false;
    }

    pub fn evaluate(&mut self, event: &RawKeyEvent, ctx: &MatchContext<'_>) -> Option<Trigger> {
        if self.binding.is_modifiers_only() {
            self.evaluate_modifiers_only(event, ctx)
        } else {
            self.evaluate_keys(event, ctx)
        }
    }

    fn evaluate_keys(&mut self, event: &RawKeyEvent, ctx: &MatchContext<'_>) -> Option<Trigger> {
        if !self.keys.contains(&event.key_code) {
            return None;
        }

        match event.kind {
            KeyEventKind::KeyDown => {
                if event.is_repeat || self.engaged {
                    return None;
                }
                if ctx.tracker.effective_modifiers(event.flags) != self.modifiers {
                    return None;
                }
                if !ctx.tracker.contains_all(&self.side_codes) {
                    return None;
                }
                let chord_complete = self
                    .keys
                    .iter()
                    .all(|key| *key == event.key_code || ctx.held_keys.contains(key));
                if !chord_complete {
                    return None;
                }
                self.engaged = true;
                Some(Trigger::Pressed)
            }
            // Modifiers may already be up when the key is released
            KeyEventKind::KeyUp if self.engaged => {
                self.engaged = false;
                Some(Trigger::Released)
            }
            _ => None,
        }
    }

    fn evaluate_modifiers_only(
        &mut self,
        event: &RawKeyEvent,
        ctx: &MatchContext<'_>,
    ) -> Option<Trigger> {
        if event.kind != KeyEventKind::FlagsChanged {
            return None;
        }

        // A single pinned modifier only reacts to its own key
        let single_modifier = self.modifiers.len() < 2;
        if single_modifier && !self.side_codes.is_empty() && !self.side_codes.contains(&event.key_code)
        {
            return None;
        }

        let fully_pressed = ctx
            .tracker
            .effective_modifiers(event.flags)
            .contains(self.modifiers)
            && ctx.tracker.contains_all(&self.side_codes);

        if fully_pressed && !self.engaged {
            self.engaged = true;
            Some(Trigger::Pressed)
        } else if !fully_pressed && self.engaged {
            self.engaged = false;
            Some(Trigger::Released)
        } else {
            None
        }
    }
}

#[cfg(test)]
#[path = "monitor_test.rs"]
mod tests;
