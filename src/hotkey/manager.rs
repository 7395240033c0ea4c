// Hotkey manager: wires capture, routing, the gate and override arming
//
// Capture thread -> HotkeyRouter -> GateSender -> gate task -> InputGate.
// OverrideArming feeds the same sender from its interceptor and tells the
// router which bindings are in effect and which key it owns.

use super::binding::ShortcutBinding;
use super::readiness::ReadinessWatchdog;
use super::router::{HotkeyRole, HotkeyRouter};
use super::HotkeyError;
use crate::gate::{GateHandle, GateSender, InputGate, RecordingPipeline};
use crate::keyboard_capture::tracker::platform_fn_probe;
use crate::keyboard_capture::{KeyEventSource, KeyboardCapture};
use crate::override_arming::policy::is_reserved_binding;
use crate::override_arming::{
    platform_interceptor, ArmingConfig, ArmingError, ArmingUpdate, BindingSource, ChangeOrigin,
    OverrideArming, PlatformInputInterceptor,
};
use crate::settings::{FileBindingSource, GateSettings};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct HotkeyManager {
    gate: InputGate,
    gate_handle: Mutex<GateHandle>,
    router: Arc<Mutex<HotkeyRouter>>,
    capture: Mutex<Box<dyn KeyEventSource>>,
    arming: OverrideArming,
    readiness: Arc<ReadinessWatchdog>,
    readiness_task: Mutex<Option<JoinHandle<()>>>,
}

impl HotkeyManager {
    /// Must be called from within a Tokio runtime
    pub fn new(
        settings: &GateSettings,
        pipeline: Arc<dyn RecordingPipeline>,
        source: Arc<dyn BindingSource>,
        capture: Box<dyn KeyEventSource>,
        interceptor: Arc<dyn PlatformInputInterceptor>,
    ) -> Result<Self, HotkeyError> {
        Self::build(
            settings,
            settings.arming_config(),
            pipeline,
            source,
            capture,
            interceptor,
        )
    }

    fn build(
        settings: &GateSettings,
        arming_config: ArmingConfig,
        pipeline: Arc<dyn RecordingPipeline>,
        source: Arc<dyn BindingSource>,
        capture: Box<dyn KeyEventSource>,
        interceptor: Arc<dyn PlatformInputInterceptor>,
    ) -> Result<Self, HotkeyError> {
        tokio::runtime::Handle::try_current().map_err(|_| ArmingError::NoRuntime)?;

        let gate = InputGate::new(settings.gate_config(), pipeline.clone());
        let gate_handle = GateHandle::spawn(gate.clone());
        let sender = gate_handle.sender();

        let readiness = ReadinessWatchdog::new(settings.readiness_config());
        let router = Arc::new(Mutex::new(
            HotkeyRouter::new(sender.clone(), platform_fn_probe())
                .with_readiness(readiness.clone()),
        ));

        let arming = OverrideArming::new(interceptor, source, sender, arming_config)?;

        let probe_gate = gate.clone();
        arming.set_hands_free_probe(Arc::new(move || {
            probe_gate.is_hands_free_locked() || pipeline.status().is_hands_free_locked
        }));

        let listener_router = router.clone();
        arming.set_listener(Arc::new(move |update: &ArmingUpdate| {
            let mut router = listener_router.lock();
            router.set_intercepted_key(update.intercepted_key);
            router.set_binding(
                HotkeyRole::Dictation,
                usable(HotkeyRole::Dictation, update.dictation.as_ref()),
            );
            router.set_binding(
                HotkeyRole::HandsFree,
                usable(HotkeyRole::HandsFree, update.hands_free.as_ref()),
            );
        }));

        Ok(Self {
            gate,
            gate_handle: Mutex::new(gate_handle),
            router,
            capture: Mutex::new(capture),
            arming,
            readiness,
            readiness_task: Mutex::new(None),
        })
    }

    /// Platform capture and interceptor, bindings read from the settings file
    pub fn with_platform_defaults(
        settings: &GateSettings,
        pipeline: Arc<dyn RecordingPipeline>,
        source: Arc<dyn BindingSource>,
    ) -> Result<Self, HotkeyError> {
        Self::new(
            settings,
            pipeline,
            source,
            Box::new(KeyboardCapture::new()),
            platform_interceptor(),
        )
    }

    /// Load settings from `path` and keep re-reading bindings from it
    pub fn from_settings_file(
        path: &Path,
        pipeline: Arc<dyn RecordingPipeline>,
    ) -> Result<Self, HotkeyError> {
        let settings = GateSettings::load(path)?;
        let source = Arc::new(FileBindingSource::new(path.to_path_buf()));
        Self::with_platform_defaults(&settings, pipeline, source)
    }

    /// Apply the current bindings and start listening.
    ///
    /// Capture starts even if the override could not be armed; that error is
    /// returned afterwards and other bindings keep working.
    pub fn start(&self) -> Result<(), HotkeyError> {
        let configured = self.reconfigure(ChangeOrigin::Reload);

        {
            let mut capture = self.capture.lock();
            if !capture.is_running() {
                let router = self.router.clone();
                capture.start(Box::new(move |event| router.lock().handle_event(&event)))?;
            }
        }

        self.start_readiness_watchdog();
        crate::info!("Hotkey manager started");
        configured
    }

    /// Re-read bindings from the source
    pub fn reconfigure(&self, origin: ChangeOrigin) -> Result<(), HotkeyError> {
        let armed = self.arming.reconfigure(origin);

        let (dictation, hands_free) = self.arming.effective_bindings();
        armed?;
        for (role, binding) in [
            (HotkeyRole::Dictation, dictation),
            (HotkeyRole::HandsFree, hands_free),
        ] {
            if let Some(binding) = binding {
                binding
                    .validate()
                    .map_err(|source| HotkeyError::InvalidBinding { role, source })?;
            }
        }
        Ok(())
    }

    pub fn on_app_activated(&self) -> Result<(), HotkeyError> {
        self.arming.on_app_activated()?;
        Ok(())
    }

    pub fn on_app_deactivated(&self) {
        self.arming.on_app_deactivated();
    }

    /// Stop capture, remove the override and abandon any session
    pub fn shutdown(&self) {
        self.readiness.disable();
        if let Some(task) = self.readiness_task.lock().take() {
            task.abort();
        }

        if let Err(e) = self.capture.lock().stop() {
            crate::warn!("Failed to stop key capture: {}", e);
        }
        self.arming.disarm();
        self.router.lock().teardown();
        self.gate_handle.lock().shutdown();
        self.gate.reset();
        crate::info!("Hotkey manager shut down");
    }

    pub fn gate(&self) -> &InputGate {
        &self.gate
    }

    pub fn arming(&self) -> &OverrideArming {
        &self.arming
    }

    pub fn sender(&self) -> GateSender {
        self.gate_handle.lock().sender()
    }

    pub fn binding(&self, role: HotkeyRole) -> Option<ShortcutBinding> {
        self.router.lock().binding(role).cloned()
    }

    /// Watch for a dead hotkey path when dictation depends on an override
    fn start_readiness_watchdog(&self) {
        let reserved = &self.arming.config().reserved_keys;
        let needs_override = self
            .arming
            .effective_bindings()
            .0
            .is_some_and(|binding| is_reserved_binding(&binding, reserved));
        if !needs_override || self.arming.status().is_active {
            return;
        }

        let ready_arming = self.arming.clone();
        let refresh_arming = self.arming.clone();
        let task = self.readiness.start(
            Arc::new(move || ready_arming.status().is_active),
            Arc::new(move || {
                if let Err(e) = refresh_arming.reconfigure(ChangeOrigin::Reload) {
                    crate::warn!("Hotkey refresh failed: {}", e);
                }
            }),
        );
        if let Some(previous) = std::mem::replace(&mut *self.readiness_task.lock(), task) {
            previous.abort();
        }
    }
}

impl Drop for HotkeyManager {
    fn drop(&mut self) {
        if let Some(task) = self.readiness_task.lock().take() {
            task.abort();
        }
    }
}

/// Drop bindings that fail validation
fn usable(role: HotkeyRole, binding: Option<&ShortcutBinding>) -> Option<&ShortcutBinding> {
    binding.filter(|b| match b.validate() {
        Ok(()) => true,
        Err(e) => {
            crate::warn!("Ignoring invalid {} shortcut {}: {}", role, b, e);
            false
        }
    })
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;
