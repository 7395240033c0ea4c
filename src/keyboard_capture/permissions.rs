// Accessibility permission checks for macOS
// Both the listen-only capture tap and the intercepting override tap need
// Accessibility permission; without it CGEventTapCreate returns null.

use std::ffi::c_void;

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    fn AXIsProcessTrusted() -> bool;
    fn AXIsProcessTrustedWithOptions(options: *const c_void) -> bool;
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFDictionaryCreate(
        allocator: *const c_void,
        keys: *const *const c_void,
        values: *const *const c_void,
        num_values: isize,
        key_callbacks: *const c_void,
        value_callbacks: *const c_void,
    ) -> *const c_void;

    fn CFRelease(cf: *const c_void);

    static kCFTypeDictionaryKeyCallBacks: c_void;
    static kCFTypeDictionaryValueCallBacks: c_void;
    static kCFBooleanTrue: *const c_void;
    static kAXTrustedCheckOptionPrompt: *const c_void;
}

/// Whether this process is trusted for Accessibility.
///
/// With `prompt`, an untrusted process also shows the system dialog that adds
/// the app to the Accessibility list (disabled until the user enables it).
#[cfg_attr(coverage_nightly, coverage(off))]
pub fn has_accessibility_permission(prompt: bool) -> bool {
    if !prompt {
        // SAFETY: AXIsProcessTrusted only reads the trust state
        return unsafe { AXIsProcessTrusted() };
    }

    unsafe {
        let keys = [kAXTrustedCheckOptionPrompt];
        let values = [kCFBooleanTrue];

        let options = CFDictionaryCreate(
            std::ptr::null(),
            keys.as_ptr(),
            values.as_ptr(),
            1,
            &kCFTypeDictionaryKeyCallBacks,
            &kCFTypeDictionaryValueCallBacks,
        );

        let trusted = AXIsProcessTrustedWithOptions(options);

        if !options.is_null() {
            CFRelease(options);
        }

        trusted
    }
}

/// Prompt only in release builds so dev/test runs don't pop dialogs.
/// DICTATION_GATE_ACCESSIBILITY_PROMPT=1 forces the prompt in debug builds.
pub fn should_prompt_for_permission() -> bool {
    !cfg!(debug_assertions) || std::env::var("DICTATION_GATE_ACCESSIBILITY_PROMPT").is_ok()
}
