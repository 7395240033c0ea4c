// Pure arming decisions: which reserved key to claim, for which role, and
// whether an observed binding read should replace the previous one.

use crate::hotkey::binding::ShortcutBinding;
use serde::Serialize;
use std::time::Duration;

/// Which gate action an intercepted key drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OverrideRoute {
    /// KeyDown/KeyUp into the gate
    Dictation,
    /// Press toggles the hands-free lock; release is dropped
    HandsFree,
}

/// When both roles claim the same reserved key, this one wins
pub const CONTESTED_KEY_WINNER: OverrideRoute = OverrideRoute::Dictation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrideTarget {
    pub key: u16,
    pub route: OverrideRoute,
}

/// Where a binding re-read came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// The user changed the binding; reads are definitive
    UserEdit,
    /// Settings reload or startup; a missing binding may be a transient read
    Reload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingResolution {
    Apply(Option<ShortcutBinding>),
    KeepPrevious,
}

/// A bare reserved key with no modifiers
pub fn is_reserved_binding(binding: &ShortcutBinding, reserved_keys: &[u16]) -> bool {
    binding
        .bare_key()
        .is_some_and(|key| reserved_keys.contains(&key))
}

/// The key to intercept, if either binding collides with a reserved key
pub fn resolve_override_target(
    dictation: Option<&ShortcutBinding>,
    hands_free: Option<&ShortcutBinding>,
    reserved_keys: &[u16],
) -> Option<OverrideTarget> {
    let claim = |binding: Option<&ShortcutBinding>, route| {
        binding
            .filter(|b| is_reserved_binding(b, reserved_keys))
            .and_then(ShortcutBinding::bare_key)
            .map(|key| OverrideTarget { key, route })
    };

    let dictation = claim(dictation, OverrideRoute::Dictation);
    let hands_free = claim(hands_free, OverrideRoute::HandsFree);

    match (dictation, hands_free) {
        (Some(d), Some(h)) if d.key == h.key => match CONTESTED_KEY_WINNER {
            OverrideRoute::Dictation => Some(d),
            OverrideRoute::HandsFree => Some(h),
        },
        (Some(d), _) => Some(d),
        (None, h) => h,
    }
}

/// Decide whether `observed` replaces `previous`.
///
/// `missing_for` is how long reads have been reporting no binding while a
/// previous one existed. A reload must keep reporting it for `debounce`
/// before the previous binding is dropped.
pub fn resolve_binding(
    previous: Option<&ShortcutBinding>,
    observed: Option<ShortcutBinding>,
    origin: ChangeOrigin,
    missing_for: Duration,
    debounce: Duration,
) -> BindingResolution {
    match (previous, observed) {
        (_, Some(binding)) => BindingResolution::Apply(Some(binding)),
        (None, None) => BindingResolution::Apply(None),
        (Some(_), None) => match origin {
            ChangeOrigin::UserEdit => BindingResolution::Apply(None),
            ChangeOrigin::Reload if missing_for >= debounce => BindingResolution::Apply(None),
            ChangeOrigin::Reload => BindingResolution::KeepPrevious,
        },
    }
}

#[cfg(test)]
#[path = "policy_test.rs"]
mod tests;
