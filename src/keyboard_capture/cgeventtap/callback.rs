//! CGEventTap callback handling.
//!
//! Converts raw CGEvents into [`TapEvent`]s for the tap handler.

#[allow(deprecated)]
use cocoa::appkit::NSEvent;
#[allow(deprecated)]
use cocoa::base::nil;
use core_graphics::event::{CGEvent, EventField};
use foreign_types::ForeignType;
use std::ffi::c_void;

use crate::keyboard_capture::keycodes::normalize;
use crate::keyboard_capture::RawKeyEvent;

// Raw CGEventType values
pub const KEY_DOWN: u32 = 10;
pub const KEY_UP: u32 = 11;
pub const FLAGS_CHANGED: u32 = 12;
pub const NX_SYSDEFINED: u32 = 14;
pub const TAP_DISABLED_BY_TIMEOUT: u32 = 0xFFFF_FFFE;
pub const TAP_DISABLED_BY_USER_INPUT: u32 = 0xFFFF_FFFF;

pub const NX_SUBTYPE_AUX_CONTROL_BUTTONS: i16 = 8; // Media key subtype

/// An event seen by a tap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapEvent {
    /// Keyboard key or modifier transition
    Key(RawKeyEvent),
    /// NSSystemDefined aux-control key (media keys, dictation)
    SystemKey { key_code: u32, pressed: bool },
    /// The OS disabled the tap (callback timeout or secure input). `restored`
    /// tells whether re-enabling it in place worked.
    Disabled { restored: bool },
}

/// Convert a raw CGEvent into a TapEvent. Returns None for events we don't track.
pub fn convert_event(event_type: u32, event: &CGEvent) -> Option<TapEvent> {
    match event_type {
        KEY_DOWN | KEY_UP | FLAGS_CHANGED => {
            let raw_code = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;
            let is_repeat =
                event.get_integer_value_field(EventField::KEYBOARD_EVENT_AUTOREPEAT) != 0;
            let flags = event.get_flags().bits();
            let key_code = normalize(raw_code);

            let key_event = match event_type {
                KEY_DOWN => RawKeyEvent::key_down(key_code, flags),
                KEY_UP => RawKeyEvent::key_up(key_code, flags),
                _ => RawKeyEvent::flags_changed(key_code, flags),
            };
            Some(TapEvent::Key(if is_repeat {
                key_event.repeated()
            } else {
                key_event
            }))
        }
        NX_SYSDEFINED => convert_system_defined(event),
        _ => None,
    }
}

/// NSSystemDefined events carry the key in NSEvent.data1, so go through AppKit
fn convert_system_defined(event: &CGEvent) -> Option<TapEvent> {
    #[allow(deprecated)]
    let cg_event_ptr = event.as_ptr() as *mut c_void;

    #[allow(deprecated)]
    unsafe {
        let ns_event: cocoa::base::id = NSEvent::eventWithCGEvent_(nil, cg_event_ptr);
        if ns_event == nil {
            return None;
        }

        let subtype = NSEvent::subtype(ns_event) as i16;
        if subtype != NX_SUBTYPE_AUX_CONTROL_BUTTONS {
            return None;
        }

        // data1: upper 16 bits = key code, lower 16 bits = flags
        let data1 = NSEvent::data1(ns_event);
        let key_code = ((data1 as u64 & 0xFFFF0000) >> 16) as u32;
        let key_flags = (data1 as u64 & 0x0000FFFF) as u32;

        // ((flags & 0xFF00) >> 8) == 0xA means pressed, 0xB means released
        let pressed = (key_flags & 0xFF00) >> 8 == 0x0A;

        Some(TapEvent::SystemKey { key_code, pressed })
    }
}
