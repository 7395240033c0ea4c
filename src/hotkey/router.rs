// Hotkey router: raw key events in, gate events out
//
// Owns the one PhysicalModifierTracker and a monitor per bound role. The
// dictation binding drives KeyDown/KeyUp; a dedicated hands-free binding
// toggles the lock on press. Events for a key owned by an armed override
// are left to the interceptor.

use super::binding::ShortcutBinding;
use super::monitor::{BindingMonitor, MatchContext, Trigger};
use super::readiness::ReadinessWatchdog;
use crate::gate::{GateEvent, GateSender};
use crate::keyboard_capture::keycodes::is_modifier_key_code;
use crate::keyboard_capture::tracker::{FnKeyProbe, PhysicalModifierTracker};
use crate::keyboard_capture::{KeyEventKind, RawKeyEvent};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// The roles a shortcut can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HotkeyRole {
    Dictation,
    HandsFree,
}

impl fmt::Display for HotkeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HotkeyRole::Dictation => write!(f, "dictation"),
            HotkeyRole::HandsFree => write!(f, "hands-free"),
        }
    }
}

pub struct HotkeyRouter {
    tracker: PhysicalModifierTracker,
    held_keys: BTreeSet<u16>,
    dictation: Option<BindingMonitor>,
    hands_free: Option<BindingMonitor>,
    intercepted_key: Option<u16>,
    sender: GateSender,
    readiness: Option<Arc<ReadinessWatchdog>>,
}

impl HotkeyRouter {
    pub fn new(sender: GateSender, fn_probe: Arc<dyn FnKeyProbe>) -> Self {
        Self {
            tracker: PhysicalModifierTracker::new(fn_probe),
            held_keys: BTreeSet::new(),
            dictation: None,
            hands_free: None,
            intercepted_key: None,
            sender,
            readiness: None,
        }
    }

    /// Report dictation triggers to a readiness watchdog
    pub fn with_readiness(mut self, watchdog: Arc<ReadinessWatchdog>) -> Self {
        self.readiness = Some(watchdog);
        self
    }

    /// Replace the binding for `role`. An engaged dictation press is released first.
    pub fn set_binding(&mut self, role: HotkeyRole, binding: Option<&ShortcutBinding>) {
        let normalized = binding.map(ShortcutBinding::normalized);
        if self.monitor(role).map(BindingMonitor::binding) == normalized.as_ref() {
            return;
        }

        if role == HotkeyRole::Dictation
            && self.dictation.as_ref().is_some_and(BindingMonitor::is_engaged)
        {
            crate::debug!("Dictation binding replaced while pressed, releasing");
            self.sender.send(GateEvent::KeyUp);
        }

        let monitor = binding.map(BindingMonitor::new);
        match &monitor {
            Some(m) => crate::info!("{} shortcut set to {}", role, m.binding()),
            None => crate::info!("{} shortcut cleared", role),
        }
        match role {
            HotkeyRole::Dictation => self.dictation = monitor,
            HotkeyRole::HandsFree => self.hands_free = monitor,
        }
    }

    pub fn binding(&self, role: HotkeyRole) -> Option<&ShortcutBinding> {
        self.monitor(role).map(BindingMonitor::binding)
    }

    /// Key currently owned by an armed override
    pub fn set_intercepted_key(&mut self, key: Option<u16>) {
        if self.intercepted_key != key {
            crate::debug!("Router ignoring intercepted key {:?}", key);
            self.intercepted_key = key;
        }
    }

    pub fn tracker(&self) -> &PhysicalModifierTracker {
        &self.tracker
    }

    pub fn handle_event(&mut self, event: &RawKeyEvent) {
        if event.kind == KeyEventKind::FlagsChanged {
            self.tracker.observe(event.key_code, event.flags);
        } else {
            self.tracker.reconcile(event.flags);
        }

        if event.kind != KeyEventKind::FlagsChanged && self.intercepted_key == Some(event.key_code)
        {
            return;
        }
        if event.is_repeat {
            return;
        }

        let ctx = MatchContext {
            tracker: &self.tracker,
            held_keys: &self.held_keys,
        };
        let dictation = self
            .dictation
            .as_mut()
            .and_then(|monitor| monitor.evaluate(event, &ctx));
        let hands_free = self
            .hands_free
            .as_mut()
            .and_then(|monitor| monitor.evaluate(event, &ctx));

        if !is_modifier_key_code(event.key_code) {
            match event.kind {
                KeyEventKind::KeyDown => {
                    self.held_keys.insert(event.key_code);
                }
                KeyEventKind::KeyUp => {
                    self.held_keys.remove(&event.key_code);
                }
                KeyEventKind::FlagsChanged => {}
            }
        }

        match dictation {
            Some(Trigger::Pressed) => {
                if let Some(ref readiness) = self.readiness {
                    readiness.note_event();
                }
                self.sender.send(GateEvent::KeyDown);
            }
            Some(Trigger::Released) => {
                self.sender.send(GateEvent::KeyUp);
            }
            None => {
                // Same combination bound twice: dictation owns it
                if hands_free == Some(Trigger::Pressed) {
                    self.sender.send(GateEvent::ToggleHandsFree);
                }
            }
        }
    }

    /// Forget all live key state, releasing an engaged dictation press
    pub fn teardown(&mut self) {
        if self.dictation.as_ref().is_some_and(|m| m.is_engaged()) {
            self.sender.send(GateEvent::KeyUp);
        }
        for monitor in [self.dictation.as_mut(), self.hands_free.as_mut()]
            .into_iter()
            .flatten()
        {
            monitor.reset();
        }
        self.tracker.clear();
        self.held_keys.clear();
    }

    fn monitor(&self, role: HotkeyRole) -> Option<&BindingMonitor> {
        match role {
            HotkeyRole::Dictation => self.dictation.as_ref(),
            HotkeyRole::HandsFree => self.hands_free.as_ref(),
        }
    }
}

#[cfg(test)]
#[path = "router_test.rs"]
mod tests;
