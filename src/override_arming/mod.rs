// Override arming: exclusive ownership of OS-reserved keys
//
// When a binding targets a key the OS also claims (F5 and system dictation
// on macOS), normal event delivery cannot be trusted. An intercepting tap is
// installed that turns the key into gate events and swallows it.
//
// Bindings are re-read from a BindingSource. A reload that reports "no
// binding" keeps the armed override until a second read after the teardown
// debounce agrees. If the platform stops the interceptor, it is re-armed
// after a short delay, or on the next app activation when backgrounded.

#[cfg(target_os = "macos")]
mod event_tap;
pub mod interceptor;
pub mod policy;

#[cfg(target_os = "macos")]
pub use event_tap::EventTapInterceptor;
pub use interceptor::{
    platform_interceptor, InterceptError, InterceptHandlers, InterceptorHandle,
    PlatformInputInterceptor, UnsupportedInterceptor,
};
pub use policy::{ChangeOrigin, OverrideRoute, OverrideTarget};

use crate::gate::{GateEvent, GateSender};
use crate::hotkey::binding::ShortcutBinding;
use parking_lot::Mutex;
use policy::{resolve_binding, resolve_override_target, BindingResolution};
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::time::Instant;

pub const DEFAULT_REARM_DELAY_MS: u64 = 200;
pub const DEFAULT_TEARDOWN_DEBOUNCE_MS: u64 = 500;

/// Where the current bindings are read from
pub trait BindingSource: Send + Sync {
    fn dictation(&self) -> Option<ShortcutBinding>;
    fn hands_free(&self) -> Option<ShortcutBinding>;
}

/// Keys claimed by built-in OS features on this platform
pub fn platform_reserved_keys() -> Vec<u16> {
    #[cfg(target_os = "macos")]
    {
        vec![crate::keyboard_capture::keycodes::F5_KEY_CODE]
    }
    #[cfg(not(target_os = "macos"))]
    {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmingConfig {
    pub reserved_keys: Vec<u16>,
    /// Delay before re-installing an interceptor the platform stopped
    pub rearm_delay: Duration,
    /// How long a missing binding must persist before a reload tears down
    pub teardown_debounce: Duration,
}

impl Default for ArmingConfig {
    fn default() -> Self {
        Self {
            reserved_keys: platform_reserved_keys(),
            rearm_delay: Duration::from_millis(DEFAULT_REARM_DELAY_MS),
            teardown_debounce: Duration::from_millis(DEFAULT_TEARDOWN_DEBOUNCE_MS),
        }
    }
}

#[derive(Debug, Error)]
pub enum ArmingError {
    #[error("override arming needs a running Tokio runtime")]
    NoRuntime,
    #[error("cannot intercept key {key}: permission denied")]
    PermissionDenied { key: u16 },
    #[error("cannot intercept key {key}: {source}")]
    Install {
        key: u16,
        #[source]
        source: InterceptError,
    },
}

/// A live claim on a reserved key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedOverride {
    pub target_key: u16,
    pub route: OverrideRoute,
    pub handle: InterceptorHandle,
    /// False once the platform stopped the interceptor and until it is re-armed
    pub is_active: bool,
}

/// Observable arming state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmingStatus {
    pub target_key: Option<u16>,
    pub route: Option<OverrideRoute>,
    pub is_active: bool,
    pub app_active: bool,
    /// Waiting for the app to come to the foreground before re-arming
    pub rearm_on_activation: bool,
    pub last_error: Option<String>,
}

/// Returns true while a hands-free session is locked
pub type HandsFreeProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// What listeners learn after every arming change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmingUpdate {
    /// Key the override currently owns
    pub intercepted_key: Option<u16>,
    /// Effective bindings, after stickiness
    pub dictation: Option<ShortcutBinding>,
    pub hands_free: Option<ShortcutBinding>,
}

pub type ArmingListener = Arc<dyn Fn(&ArmingUpdate) + Send + Sync>;

struct ArmingState {
    confirm_epoch: u64,
    /// Bumped on every install; stop callbacks carry the value they were built with
    installation: u64,
    dictation: Option<ShortcutBinding>,
    hands_free: Option<ShortcutBinding>,
    dictation_missing_since: Option<Instant>,
    hands_free_missing_since: Option<Instant>,
    armed: Option<ArmedOverride>,
    app_active: bool,
    rearm_on_activation: bool,
    teardown_deferred: bool,
    last_error: Option<String>,
}

impl ArmingState {
    fn update(&self) -> ArmingUpdate {
        ArmingUpdate {
            intercepted_key: self.armed.map(|a| a.target_key),
            dictation: self.dictation.clone(),
            hands_free: self.hands_free.clone(),
        }
    }
}

impl Default for ArmingState {
    fn default() -> Self {
        Self {
            confirm_epoch: 0,
            installation: 0,
            dictation: None,
            hands_free: None,
            dictation_missing_since: None,
            hands_free_missing_since: None,
            armed: None,
            // Assume foreground until told otherwise
            app_active: true,
            rearm_on_activation: false,
            teardown_deferred: false,
            last_error: None,
        }
    }
}

/// Arms and disarms the reserved-key interceptor. Cheap to clone.
#[derive(Clone)]
pub struct OverrideArming {
    inner: Arc<ArmingInner>,
}

struct ArmingInner {
    interceptor: Arc<dyn PlatformInputInterceptor>,
    source: Arc<dyn BindingSource>,
    sender: GateSender,
    config: ArmingConfig,
    runtime: Handle,
    hands_free_probe: Mutex<Option<HandsFreeProbe>>,
    listener: Mutex<Option<ArmingListener>>,
    state: Mutex<ArmingState>,
}

impl OverrideArming {
    /// Must be called from within a Tokio runtime; delayed work is spawned on it.
    pub fn new(
        interceptor: Arc<dyn PlatformInputInterceptor>,
        source: Arc<dyn BindingSource>,
        sender: GateSender,
        config: ArmingConfig,
    ) -> Result<Self, ArmingError> {
        let runtime = Handle::try_current().map_err(|_| ArmingError::NoRuntime)?;
        Ok(Self {
            inner: Arc::new(ArmingInner {
                interceptor,
                source,
                sender,
                config,
                runtime,
                hands_free_probe: Mutex::new(None),
                listener: Mutex::new(None),
                state: Mutex::new(ArmingState::default()),
            }),
        })
    }

    pub fn config(&self) -> &ArmingConfig {
        &self.inner.config
    }

    /// Teardown is held off while `probe` reports a locked hands-free session
    pub fn set_hands_free_probe(&self, probe: HandsFreeProbe) {
        *self.inner.hands_free_probe.lock() = Some(probe);
    }

    /// Called outside the arming lock after every reconfigure, re-arm and disarm
    pub fn set_listener(&self, listener: ArmingListener) {
        *self.inner.listener.lock() = Some(listener);
    }

    /// Re-read bindings and arm, retarget or disarm accordingly
    pub fn reconfigure(&self, origin: ChangeOrigin) -> Result<(), ArmingError> {
        self.inner.reconfigure(origin, Instant::now())
    }

    /// The platform stopped the interceptor (not an explicit rebind)
    pub fn on_interceptor_stopped(&self) {
        self.inner.interceptor_stopped(None);
    }

    pub fn on_app_activated(&self) -> Result<(), ArmingError> {
        self.inner.app_activated()
    }

    pub fn on_app_deactivated(&self) {
        self.inner.state.lock().app_active = false;
        crate::debug!("Override arming: app deactivated");
    }

    /// Remove any interceptor unconditionally (shutdown)
    pub fn disarm(&self) {
        let update = {
            let mut state = self.inner.state.lock();
            self.inner.disarm_locked(&mut state);
            state.update()
        };
        self.inner.notify(&update);
    }

    pub fn status(&self) -> ArmingStatus {
        let state = self.inner.state.lock();
        ArmingStatus {
            target_key: state.armed.map(|a| a.target_key),
            route: state.armed.map(|a| a.route),
            is_active: state.armed.is_some_and(|a| a.is_active),
            app_active: state.app_active,
            rearm_on_activation: state.rearm_on_activation,
            last_error: state.last_error.clone(),
        }
    }

    pub fn armed(&self) -> Option<ArmedOverride> {
        self.inner.state.lock().armed
    }

    /// Bindings currently in effect, after stickiness
    pub fn effective_bindings(&self) -> (Option<ShortcutBinding>, Option<ShortcutBinding>) {
        let state = self.inner.state.lock();
        (state.dictation.clone(), state.hands_free.clone())
    }
}

impl ArmingInner {
    fn reconfigure(
        self: &Arc<Self>,
        origin: ChangeOrigin,
        now: Instant,
    ) -> Result<(), ArmingError> {
        let observed_dictation = self.source.dictation().map(|b| b.normalized());
        let observed_hands_free = self.source.hands_free().map(|b| b.normalized());
        let debounce = self.config.teardown_debounce;

        let (result, update) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.confirm_epoch = state.confirm_epoch.wrapping_add(1);

            let dictation_pending = settle(
                "dictation",
                &mut state.dictation,
                &mut state.dictation_missing_since,
                observed_dictation,
                origin,
                now,
                debounce,
            );
            let hands_free_pending = settle(
                "hands-free",
                &mut state.hands_free,
                &mut state.hands_free_missing_since,
                observed_hands_free,
                origin,
                now,
                debounce,
            );
            if dictation_pending || hands_free_pending {
                self.schedule_confirm(state.confirm_epoch);
            }

            (self.apply(state), state.update())
        };

        self.notify(&update);
        result
    }

    /// Bring the interceptor in line with the effective bindings
    fn apply(self: &Arc<Self>, state: &mut ArmingState) -> Result<(), ArmingError> {
        let target = resolve_override_target(
            state.dictation.as_ref(),
            state.hands_free.as_ref(),
            &self.config.reserved_keys,
        );

        match (target, state.armed) {
            (Some(target), Some(armed))
                if armed.is_active
                    && armed.target_key == target.key
                    && armed.route == target.route =>
            {
                state.teardown_deferred = false;
                Ok(())
            }
            (Some(target), _) => self.arm_locked(state, target),
            (None, Some(armed)) => {
                if self.is_protected() {
                    if !state.teardown_deferred {
                        crate::info!(
                            "Keeping override for key {}: hands-free session is locked",
                            armed.target_key
                        );
                        state.teardown_deferred = true;
                        self.schedule_deferred_teardown();
                    }
                } else {
                    self.disarm_locked(state);
                }
                Ok(())
            }
            (None, None) => {
                state.teardown_deferred = false;
                Ok(())
            }
        }
    }

    fn arm_locked(
        self: &Arc<Self>,
        state: &mut ArmingState,
        target: OverrideTarget,
    ) -> Result<(), ArmingError> {
        if let Some(previous) = state.armed.take() {
            self.interceptor.remove(previous.handle);
        }

        state.installation = state.installation.wrapping_add(1);
        let handlers = self.handlers_for(target.route, state.installation);
        match self.interceptor.install(target.key, handlers) {
            Ok(handle) => {
                state.armed = Some(ArmedOverride {
                    target_key: target.key,
                    route: target.route,
                    handle,
                    is_active: true,
                });
                state.last_error = None;
                state.rearm_on_activation = false;
                state.teardown_deferred = false;
                crate::info!("Override armed: key {} -> {:?}", target.key, target.route);
                Ok(())
            }
            Err(e) => {
                crate::error!("Failed to arm override for key {}: {}", target.key, e);
                state.last_error = Some(e.to_string());
                // Permission may be granted while backgrounded
                state.rearm_on_activation = true;
                Err(match e {
                    InterceptError::PermissionDenied => {
                        ArmingError::PermissionDenied { key: target.key }
                    }
                    source => ArmingError::Install {
                        key: target.key,
                        source,
                    },
                })
            }
        }
    }

    fn disarm_locked(&self, state: &mut ArmingState) {
        if let Some(armed) = state.armed.take() {
            self.interceptor.remove(armed.handle);
            crate::info!("Override disarmed (key {})", armed.target_key);
        }
        state.teardown_deferred = false;
        state.rearm_on_activation = false;
    }

    /// Handlers run on the interceptor's thread and must not take the state lock
    fn handlers_for(
        self: &Arc<Self>,
        route: OverrideRoute,
        installation: u64,
    ) -> InterceptHandlers {
        let weak: Weak<Self> = Arc::downgrade(self);
        let runtime = self.runtime.clone();
        let on_stopped: Box<dyn Fn() + Send + Sync> = Box::new(move || {
            let weak = weak.clone();
            runtime.spawn(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.interceptor_stopped(Some(installation));
                }
            });
        });

        let down = self.sender.clone();
        match route {
            OverrideRoute::Dictation => {
                let up = self.sender.clone();
                InterceptHandlers {
                    on_down: Box::new(move || {
                        down.send(GateEvent::KeyDown);
                    }),
                    on_up: Some(Box::new(move || {
                        up.send(GateEvent::KeyUp);
                    })),
                    on_stopped: Some(on_stopped),
                }
            }
            OverrideRoute::HandsFree => InterceptHandlers {
                on_down: Box::new(move || {
                    down.send(GateEvent::ToggleHandsFree);
                }),
                on_up: None,
                on_stopped: Some(on_stopped),
            },
        }
    }

    /// `installation` is None for a stop reported from outside the interceptor
    fn interceptor_stopped(self: &Arc<Self>, installation: Option<u64>) {
        let mut state = self.state.lock();
        if let Some(installation) = installation {
            if installation != state.installation {
                crate::debug!(
                    "Ignoring stop from replaced interceptor installation {}",
                    installation
                );
                return;
            }
        }
        let app_active = state.app_active;
        let Some(armed) = state.armed.as_mut() else {
            return;
        };
        armed.is_active = false;
        let handle = armed.handle;

        if app_active {
            crate::warn!(
                "Override for key {} stopped unexpectedly, re-arming in {:?}",
                armed.target_key,
                self.config.rearm_delay
            );
            self.schedule_rearm(handle);
        } else {
            crate::info!(
                "Override for key {} stopped while backgrounded, re-arming on activation",
                armed.target_key
            );
            state.rearm_on_activation = true;
        }
    }

    fn schedule_rearm(self: &Arc<Self>, handle: InterceptorHandle) {
        let weak = Arc::downgrade(self);
        let delay = self.config.rearm_delay;
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.rearm(handle);
            }
        });
    }

    fn rearm(self: &Arc<Self>, handle: InterceptorHandle) {
        let mut state = self.state.lock();
        // Rebound, disarmed or already re-armed in the meantime
        if !state
            .armed
            .is_some_and(|a| a.handle == handle && !a.is_active)
        {
            crate::debug!("Skipping stale re-arm for {:?}", handle);
            return;
        }
        if !state.app_active {
            state.rearm_on_activation = true;
            return;
        }
        if let Err(e) = self.apply(&mut state) {
            crate::warn!("Re-arm failed: {}", e);
        }
        let update = state.update();
        drop(state);
        self.notify(&update);
    }

    fn app_activated(self: &Arc<Self>) -> Result<(), ArmingError> {
        let mut state = self.state.lock();
        state.app_active = true;
        state.rearm_on_activation = false;

        // The OS may have dropped the interceptor without telling us
        let interceptor_active = self.interceptor.is_active();
        if let Some(armed) = state.armed.as_mut() {
            if armed.is_active && !interceptor_active {
                crate::info!(
                    "Override for key {} lost while backgrounded",
                    armed.target_key
                );
                armed.is_active = false;
            }
        }

        let result = self.apply(&mut state);
        let update = state.update();
        drop(state);
        self.notify(&update);
        result
    }

    /// Re-read once the teardown debounce has passed
    fn schedule_confirm(self: &Arc<Self>, epoch: u64) {
        let weak = Arc::downgrade(self);
        let debounce = self.config.teardown_debounce;
        self.runtime.spawn(async move {
            tokio::time::sleep(debounce).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.state.lock().confirm_epoch != epoch {
                crate::debug!("Binding confirm read superseded");
                return;
            }
            if let Err(e) = inner.reconfigure(ChangeOrigin::Reload, Instant::now()) {
                crate::warn!("Binding confirm read failed to apply: {}", e);
            }
        });
    }

    /// Poll until the hands-free lock is released, then finish the teardown
    fn schedule_deferred_teardown(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let interval = self.config.teardown_debounce;
        self.runtime.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if !inner.retry_deferred_teardown() {
                    return;
                }
            }
        });
    }

    /// Returns true while the teardown is still waiting
    fn retry_deferred_teardown(self: &Arc<Self>) -> bool {
        let mut state = self.state.lock();
        if !state.teardown_deferred {
            return false;
        }
        if self.is_protected() {
            return true;
        }
        state.teardown_deferred = false;
        if let Err(e) = self.apply(&mut state) {
            crate::warn!("Deferred override update failed: {}", e);
        }
        let update = state.update();
        drop(state);
        self.notify(&update);
        false
    }

    fn is_protected(&self) -> bool {
        let probe = self.hands_free_probe.lock().clone();
        probe.is_some_and(|probe| probe())
    }

    fn notify(&self, update: &ArmingUpdate) {
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener(update);
        }
    }
}

/// Apply one role's observed binding. Returns true if a missing read is pending confirmation.
fn settle(
    role: &str,
    slot: &mut Option<ShortcutBinding>,
    missing_since: &mut Option<Instant>,
    observed: Option<ShortcutBinding>,
    origin: ChangeOrigin,
    now: Instant,
    debounce: Duration,
) -> bool {
    let missing_for = missing_since
        .map(|since| now.saturating_duration_since(since))
        .unwrap_or_default();

    match resolve_binding(slot.as_ref(), observed, origin, missing_for, debounce) {
        BindingResolution::Apply(binding) => {
            if binding.is_none() && slot.is_some() {
                crate::info!("{} binding cleared", role);
            }
            *slot = binding;
            *missing_since = None;
            false
        }
        BindingResolution::KeepPrevious => {
            if missing_since.is_none() {
                crate::warn!(
                    "{} binding read back empty, keeping previous until confirmed",
                    role
                );
                *missing_since = Some(now);
            }
            true
        }
    }
}

#[cfg(test)]
#[path = "override_arming_test.rs"]
mod tests;
