use super::*;
use crate::gate::{GateCommand, GateEvent, PipelineStatus};
use crate::keyboard_capture::keycodes::{F5_KEY_CODE, LEFT_OPTION_KEY_CODE, SPACE_KEY_CODE};
use crate::keyboard_capture::modifiers::{
    ModifierFamily, ModifierSet, CG_EVENT_FLAG_MASK_ALTERNATE, NX_DEVICELALTKEYMASK,
};
use crate::keyboard_capture::{CaptureError, KeyEventCallback, RawKeyEvent};
use crate::override_arming::{InterceptError, InterceptHandlers, InterceptorHandle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

const LEFT_OPTION: u64 = CG_EVENT_FLAG_MASK_ALTERNATE | NX_DEVICELALTKEYMASK;
const START_PTT: GateCommand = GateCommand::StartRecording { locked: false };

struct MockPipeline {
    start: Instant,
    commands: Mutex<Vec<(u64, GateCommand)>>,
}

impl MockPipeline {
    fn commands(&self) -> Vec<(u64, GateCommand)> {
        self.commands.lock().clone()
    }
}

impl RecordingPipeline for MockPipeline {
    fn dispatch(&self, command: GateCommand) {
        let elapsed = Instant::now().duration_since(self.start).as_millis() as u64;
        self.commands.lock().push((elapsed, command));
    }

    fn status(&self) -> PipelineStatus {
        PipelineStatus::default()
    }
}

/// Capture source whose callback the test drives by hand
#[derive(Clone, Default)]
struct MockCapture {
    callback: Arc<Mutex<Option<KeyEventCallback>>>,
}

impl MockCapture {
    fn emit(&self, event: RawKeyEvent) {
        if let Some(ref callback) = *self.callback.lock() {
            callback(event);
        }
    }
}

impl KeyEventSource for MockCapture {
    fn start(&mut self, callback: KeyEventCallback) -> Result<(), CaptureError> {
        *self.callback.lock() = Some(callback);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        *self.callback.lock() = None;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.callback.lock().is_some()
    }
}

#[derive(Default)]
struct MockInterceptor {
    handlers: Mutex<Option<InterceptHandlers>>,
    current: Mutex<Option<InterceptorHandle>>,
    attempts: AtomicU64,
    deny: AtomicBool,
}

impl MockInterceptor {
    fn press(&self) {
        if let Some(ref handlers) = *self.handlers.lock() {
            (handlers.on_down)();
        }
    }

    fn release(&self) {
        if let Some(ref handlers) = *self.handlers.lock() {
            if let Some(ref on_up) = handlers.on_up {
                on_up();
            }
        }
    }
}

impl PlatformInputInterceptor for MockInterceptor {
    fn install(
        &self,
        _target_key: u16,
        handlers: InterceptHandlers,
    ) -> Result<InterceptorHandle, InterceptError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.deny.load(Ordering::SeqCst) {
            return Err(InterceptError::PermissionDenied);
        }
        let handle = InterceptorHandle(attempt);
        *self.handlers.lock() = Some(handlers);
        *self.current.lock() = Some(handle);
        Ok(handle)
    }

    fn remove(&self, handle: InterceptorHandle) {
        let mut current = self.current.lock();
        if *current == Some(handle) {
            *current = None;
            *self.handlers.lock() = None;
        }
    }

    fn is_active(&self) -> bool {
        self.current.lock().is_some()
    }
}

#[derive(Default)]
struct MockSource {
    dictation: Mutex<Option<ShortcutBinding>>,
    hands_free: Mutex<Option<ShortcutBinding>>,
}

impl BindingSource for MockSource {
    fn dictation(&self) -> Option<ShortcutBinding> {
        self.dictation.lock().clone()
    }

    fn hands_free(&self) -> Option<ShortcutBinding> {
        self.hands_free.lock().clone()
    }
}

struct Fixture {
    manager: HotkeyManager,
    pipeline: Arc<MockPipeline>,
    capture: MockCapture,
    interceptor: Arc<MockInterceptor>,
    source: Arc<MockSource>,
}

impl Fixture {
    async fn at(&self, ms: u64) {
        tokio::time::sleep_until(self.pipeline.start + Duration::from_millis(ms)).await;
    }
}

fn setup(dictation: Option<ShortcutBinding>) -> Fixture {
    let pipeline = Arc::new(MockPipeline {
        start: Instant::now(),
        commands: Mutex::new(Vec::new()),
    });
    let capture = MockCapture::default();
    let interceptor = Arc::new(MockInterceptor::default());
    let source = Arc::new(MockSource::default());
    *source.dictation.lock() = dictation;

    let arming_config = ArmingConfig {
        reserved_keys: vec![F5_KEY_CODE],
        ..Default::default()
    };
    let manager = HotkeyManager::build(
        &GateSettings::default(),
        arming_config,
        pipeline.clone(),
        source.clone(),
        Box::new(capture.clone()),
        interceptor.clone(),
    )
    .expect("runtime available");

    Fixture {
        manager,
        pipeline,
        capture,
        interceptor,
        source,
    }
}

fn bare_f5() -> ShortcutBinding {
    ShortcutBinding::single_key(F5_KEY_CODE, ModifierSet::EMPTY)
}

fn option_space() -> ShortcutBinding {
    ShortcutBinding::single_key(SPACE_KEY_CODE, ModifierSet::EMPTY.with(ModifierFamily::Option))
}

#[test]
fn test_new_requires_runtime() {
    let result = HotkeyManager::new(
        &GateSettings::default(),
        Arc::new(MockPipeline {
            start: Instant::now(),
            commands: Mutex::new(Vec::new()),
        }),
        Arc::new(MockSource::default()),
        Box::new(MockCapture::default()),
        Arc::new(MockInterceptor::default()),
    );
    assert!(matches!(
        result,
        Err(HotkeyError::Arming(ArmingError::NoRuntime))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_modifier_binding_drives_gate() {
    let fx = setup(Some(ShortcutBinding::modifier_keys([LEFT_OPTION_KEY_CODE])));
    fx.manager.start().expect("start");
    assert!(fx.capture.is_running());
    assert!(fx.manager.arming().armed().is_none());

    fx.capture
        .emit(RawKeyEvent::flags_changed(LEFT_OPTION_KEY_CODE, LEFT_OPTION));
    fx.at(450).await;
    fx.capture.emit(RawKeyEvent::flags_changed(LEFT_OPTION_KEY_CODE, 0));
    fx.at(500).await;

    assert_eq!(
        fx.pipeline.commands(),
        vec![
            (0, GateCommand::ShowLightweightUi),
            (400, START_PTT),
            (450, GateCommand::StopRecording),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reserved_key_goes_through_override_only() {
    let fx = setup(Some(bare_f5()));
    fx.manager.start().expect("start");
    assert_eq!(
        fx.manager.arming().armed().map(|a| a.target_key),
        Some(F5_KEY_CODE)
    );

    // The capture tap may still see the key; only the interceptor counts
    fx.capture.emit(RawKeyEvent::key_down(F5_KEY_CODE, 0));
    fx.interceptor.press();
    fx.at(450).await;
    fx.capture.emit(RawKeyEvent::key_up(F5_KEY_CODE, 0));
    fx.interceptor.release();
    fx.at(500).await;

    assert_eq!(
        fx.pipeline.commands(),
        vec![
            (0, GateCommand::ShowLightweightUi),
            (400, START_PTT),
            (450, GateCommand::StopRecording),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_rebind_moves_dictation_off_the_override() {
    let fx = setup(Some(bare_f5()));
    fx.manager.start().expect("start");
    assert_eq!(fx.manager.binding(HotkeyRole::Dictation), Some(bare_f5()));

    *fx.source.dictation.lock() = Some(option_space());
    fx.manager
        .reconfigure(ChangeOrigin::UserEdit)
        .expect("reconfigure");

    assert!(fx.manager.arming().armed().is_none());
    assert_eq!(
        fx.manager.binding(HotkeyRole::Dictation),
        Some(option_space().normalized())
    );
}

#[tokio::test(start_paused = true)]
async fn test_invalid_binding_is_reported_and_ignored() {
    let fx = setup(Some(ShortcutBinding::single_key(
        LEFT_OPTION_KEY_CODE,
        ModifierSet::EMPTY,
    )));

    let result = fx.manager.start();
    assert!(matches!(
        result,
        Err(HotkeyError::InvalidBinding {
            role: HotkeyRole::Dictation,
            ..
        })
    ));
    assert!(fx.capture.is_running());
    assert_eq!(fx.manager.binding(HotkeyRole::Dictation), None);
}

#[tokio::test(start_paused = true)]
async fn test_denied_override_is_refreshed_by_readiness_watchdog() {
    let fx = setup(Some(bare_f5()));
    fx.interceptor.deny.store(true, Ordering::SeqCst);

    let result = fx.manager.start();
    assert!(matches!(
        result,
        Err(HotkeyError::Arming(ArmingError::PermissionDenied { key: F5_KEY_CODE }))
    ));
    assert!(fx.capture.is_running());

    fx.interceptor.deny.store(false, Ordering::SeqCst);
    fx.at(1100).await;

    assert!(fx.manager.arming().status().is_active);
    assert_eq!(fx.interceptor.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_releases_everything() {
    let fx = setup(Some(bare_f5()));
    fx.manager.start().expect("start");
    let sender = fx.manager.sender();

    fx.manager.shutdown();
    fx.at(10).await;

    assert!(!fx.capture.is_running());
    assert!(fx.manager.arming().armed().is_none());
    assert!(!fx.interceptor.is_active());
    assert!(!sender.send(GateEvent::KeyDown));
}

#[tokio::test]
async fn test_corrupt_settings_file_is_an_error() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");
    std::fs::write(&path, "{ not json").unwrap();

    let result = HotkeyManager::from_settings_file(
        &path,
        Arc::new(MockPipeline {
            start: Instant::now(),
            commands: Mutex::new(Vec::new()),
        }),
    );
    assert!(matches!(result, Err(HotkeyError::Settings(_))));
}
