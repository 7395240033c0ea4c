use super::*;
use crate::keyboard_capture::keycodes::{
    F5_KEY_CODE, FN_KEY_CODE, LEFT_COMMAND_KEY_CODE, LEFT_OPTION_KEY_CODE, LEFT_SHIFT_KEY_CODE,
    RIGHT_COMMAND_KEY_CODE, RIGHT_OPTION_KEY_CODE, SPACE_KEY_CODE,
};
use crate::keyboard_capture::modifiers::{
    ModifierFamily, CG_EVENT_FLAG_MASK_ALTERNATE, CG_EVENT_FLAG_MASK_COMMAND,
    CG_EVENT_FLAG_MASK_SECONDARY_FN, CG_EVENT_FLAG_MASK_SHIFT, NX_DEVICELALTKEYMASK,
    NX_DEVICELCMDKEYMASK, NX_DEVICELSHIFTKEYMASK, NX_DEVICERALTKEYMASK, NX_DEVICERCMDKEYMASK,
};
use crate::keyboard_capture::tracker::NoFnProbe;
use std::sync::Arc;

const LEFT_OPTION: u64 = CG_EVENT_FLAG_MASK_ALTERNATE | NX_DEVICELALTKEYMASK;
const RIGHT_OPTION: u64 = CG_EVENT_FLAG_MASK_ALTERNATE | NX_DEVICERALTKEYMASK;
const LEFT_COMMAND: u64 = CG_EVENT_FLAG_MASK_COMMAND | NX_DEVICELCMDKEYMASK;
const RIGHT_COMMAND: u64 = CG_EVENT_FLAG_MASK_COMMAND | NX_DEVICERCMDKEYMASK;
const LEFT_SHIFT: u64 = CG_EVENT_FLAG_MASK_SHIFT | NX_DEVICELSHIFTKEYMASK;

/// Feeds events the way the router does: tracker first, then the monitor
struct Harness {
    tracker: PhysicalModifierTracker,
    held: BTreeSet<u16>,
    monitor: BindingMonitor,
}

impl Harness {
    fn new(binding: ShortcutBinding) -> Self {
        Self {
            tracker: PhysicalModifierTracker::new(Arc::new(NoFnProbe)),
            held: BTreeSet::new(),
            monitor: BindingMonitor::new(&binding),
        }
    }

    fn feed(&mut self, event: RawKeyEvent) -> Option<Trigger> {
        if event.kind == KeyEventKind::FlagsChanged {
            self.tracker.observe(event.key_code, event.flags);
        }
        let ctx = MatchContext {
            tracker: &self.tracker,
            held_keys: &self.held,
        };
        let trigger = self.monitor.evaluate(&event, &ctx);
        match event.kind {
            KeyEventKind::KeyDown => {
                self.held.insert(event.key_code);
            }
            KeyEventKind::KeyUp => {
                self.held.remove(&event.key_code);
            }
            KeyEventKind::FlagsChanged => {}
        }
        trigger
    }
}

#[test]
fn test_left_option_binding_ignores_right_option() {
    let mut h = Harness::new(ShortcutBinding::modifier_keys([LEFT_OPTION_KEY_CODE]));

    assert_eq!(
        h.feed(RawKeyEvent::flags_changed(RIGHT_OPTION_KEY_CODE, RIGHT_OPTION)),
        None
    );
    assert_eq!(h.feed(RawKeyEvent::flags_changed(RIGHT_OPTION_KEY_CODE, 0)), None);
    assert!(!h.monitor.is_engaged());
}

#[test]
fn test_left_option_binding_press_and_release() {
    let mut h = Harness::new(ShortcutBinding::modifier_keys([LEFT_OPTION_KEY_CODE]));

    assert_eq!(
        h.feed(RawKeyEvent::flags_changed(LEFT_OPTION_KEY_CODE, LEFT_OPTION)),
        Some(Trigger::Pressed)
    );
    assert_eq!(
        h.feed(RawKeyEvent::flags_changed(LEFT_OPTION_KEY_CODE, 0)),
        Some(Trigger::Released)
    );
}

#[test]
fn test_right_option_held_does_not_satisfy_left_when_left_never_pressed() {
    let mut h = Harness::new(ShortcutBinding::modifier_keys([LEFT_OPTION_KEY_CODE]));
    h.feed(RawKeyEvent::flags_changed(RIGHT_OPTION_KEY_CODE, RIGHT_OPTION));
    // The logical option bit is set but only the right key is physically down
    assert!(ModifierSet::from_flags(RIGHT_OPTION).option);
    assert!(!h.monitor.is_engaged());
}

#[test]
fn test_multi_modifier_fires_once_when_full_set_engages() {
    let binding = ShortcutBinding::ModifiersOnly {
        side_codes: BTreeSet::new(),
        modifiers: ModifierSet::EMPTY
            .with(ModifierFamily::Command)
            .with(ModifierFamily::Option),
    };
    let mut h = Harness::new(binding);

    assert_eq!(
        h.feed(RawKeyEvent::flags_changed(LEFT_COMMAND_KEY_CODE, LEFT_COMMAND)),
        None
    );
    assert_eq!(
        h.feed(RawKeyEvent::flags_changed(
            LEFT_OPTION_KEY_CODE,
            LEFT_COMMAND | LEFT_OPTION
        )),
        Some(Trigger::Pressed)
    );
    // Extra modifiers keep it engaged without a second press
    assert_eq!(
        h.feed(RawKeyEvent::flags_changed(
            LEFT_SHIFT_KEY_CODE,
            LEFT_COMMAND | LEFT_OPTION | LEFT_SHIFT
        )),
        None
    );
    assert_eq!(
        h.feed(RawKeyEvent::flags_changed(
            LEFT_COMMAND_KEY_CODE,
            LEFT_OPTION | LEFT_SHIFT
        )),
        Some(Trigger::Released)
    );
}

#[test]
fn test_single_key_requires_exact_modifiers() {
    let mut h = Harness::new(ShortcutBinding::single_key(
        F5_KEY_CODE,
        ModifierSet::EMPTY,
    ));

    assert_eq!(h.feed(RawKeyEvent::key_down(F5_KEY_CODE, LEFT_SHIFT)), None);
    h.feed(RawKeyEvent::key_up(F5_KEY_CODE, LEFT_SHIFT));

    assert_eq!(
        h.feed(RawKeyEvent::key_down(F5_KEY_CODE, 0)),
        Some(Trigger::Pressed)
    );
    assert_eq!(h.feed(RawKeyEvent::key_down(F5_KEY_CODE, 0).repeated()), None);
    assert_eq!(
        h.feed(RawKeyEvent::key_up(F5_KEY_CODE, 0)),
        Some(Trigger::Released)
    );
}

#[test]
fn test_function_row_phantom_fn_flag_does_not_break_match() {
    let mut h = Harness::new(ShortcutBinding::single_key(
        F5_KEY_CODE,
        ModifierSet::EMPTY,
    ));
    assert_eq!(
        h.feed(RawKeyEvent::key_down(
            F5_KEY_CODE,
            CG_EVENT_FLAG_MASK_SECONDARY_FN
        )),
        Some(Trigger::Pressed)
    );
}

#[test]
fn test_key_release_after_modifiers_released_still_releases() {
    let option = ModifierSet::EMPTY.with(ModifierFamily::Option);
    let mut h = Harness::new(ShortcutBinding::single_key(SPACE_KEY_CODE, option));

    h.feed(RawKeyEvent::flags_changed(LEFT_OPTION_KEY_CODE, LEFT_OPTION));
    assert_eq!(
        h.feed(RawKeyEvent::key_down(SPACE_KEY_CODE, LEFT_OPTION)),
        Some(Trigger::Pressed)
    );
    h.feed(RawKeyEvent::flags_changed(LEFT_OPTION_KEY_CODE, 0));
    assert_eq!(
        h.feed(RawKeyEvent::key_up(SPACE_KEY_CODE, 0)),
        Some(Trigger::Released)
    );
}

#[test]
fn test_chord_side_codes_disambiguate_command_sides() {
    let binding = ShortcutBinding::Chord {
        keys: BTreeSet::from([SPACE_KEY_CODE]),
        modifiers: ModifierSet::EMPTY.with(ModifierFamily::Command),
        modifier_side_codes: BTreeSet::from([RIGHT_COMMAND_KEY_CODE]),
    };
    let mut h = Harness::new(binding);

    h.feed(RawKeyEvent::flags_changed(LEFT_COMMAND_KEY_CODE, LEFT_COMMAND));
    assert_eq!(h.feed(RawKeyEvent::key_down(SPACE_KEY_CODE, LEFT_COMMAND)), None);
    h.feed(RawKeyEvent::key_up(SPACE_KEY_CODE, LEFT_COMMAND));
    h.feed(RawKeyEvent::flags_changed(LEFT_COMMAND_KEY_CODE, 0));

    h.feed(RawKeyEvent::flags_changed(RIGHT_COMMAND_KEY_CODE, RIGHT_COMMAND));
    assert_eq!(
        h.feed(RawKeyEvent::key_down(SPACE_KEY_CODE, RIGHT_COMMAND)),
        Some(Trigger::Pressed)
    );
}

#[test]
fn test_multi_key_chord_waits_for_all_keys() {
    let binding = ShortcutBinding::Chord {
        keys: BTreeSet::from([0, 1]),
        modifiers: ModifierSet::EMPTY,
        modifier_side_codes: BTreeSet::new(),
    };
    let mut h = Harness::new(binding);

    assert_eq!(h.feed(RawKeyEvent::key_down(0, 0)), None);
    assert_eq!(h.feed(RawKeyEvent::key_down(1, 0)), Some(Trigger::Pressed));
    assert_eq!(h.feed(RawKeyEvent::key_up(0, 0)), Some(Trigger::Released));
    assert_eq!(h.feed(RawKeyEvent::key_up(1, 0)), None);
}

#[test]
fn test_fn_modifier_only_binding() {
    let mut h = Harness::new(ShortcutBinding::modifier_keys([FN_KEY_CODE]));
    assert_eq!(
        h.feed(RawKeyEvent::flags_changed(179, CG_EVENT_FLAG_MASK_SECONDARY_FN)),
        Some(Trigger::Pressed)
    );
    assert_eq!(
        h.feed(RawKeyEvent::flags_changed(FN_KEY_CODE, 0)),
        Some(Trigger::Released)
    );
}

#[test]
fn test_reset_clears_engagement() {
    let mut h = Harness::new(ShortcutBinding::modifier_keys([LEFT_OPTION_KEY_CODE]));
    h.feed(RawKeyEvent::flags_changed(LEFT_OPTION_KEY_CODE, LEFT_OPTION));
    assert!(h.monitor.is_engaged());
    h.monitor.reset();
    assert!(!h.monitor.is_engaged());
}
