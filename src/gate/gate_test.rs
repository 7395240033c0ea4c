use super::*;
use parking_lot::Mutex;

/// Records every dispatched command with its offset from `start`
struct MockPipeline {
    start: Instant,
    commands: Mutex<Vec<(u64, GateCommand)>>,
    status: Mutex<PipelineStatus>,
}

impl MockPipeline {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            commands: Mutex::new(Vec::new()),
            status: Mutex::new(PipelineStatus::default()),
        })
    }

    fn commands(&self) -> Vec<(u64, GateCommand)> {
        self.commands.lock().clone()
    }

    fn count(&self, command: GateCommand) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|(_, c)| *c == command)
            .count()
    }

    fn set_status(&self, status: PipelineStatus) {
        *self.status.lock() = status;
    }
}

impl RecordingPipeline for MockPipeline {
    fn dispatch(&self, command: GateCommand) {
        let elapsed = Instant::now().duration_since(self.start).as_millis() as u64;
        self.commands.lock().push((elapsed, command));
    }

    fn status(&self) -> PipelineStatus {
        *self.status.lock()
    }
}

fn setup(config: GateConfig) -> (InputGate, Arc<MockPipeline>) {
    let pipeline = MockPipeline::new();
    let gate = InputGate::new(config, pipeline.clone());
    (gate, pipeline)
}

/// Sleep until `ms` after the pipeline's start instant
async fn at(pipeline: &MockPipeline, ms: u64) {
    tokio::time::sleep_until(pipeline.start + Duration::from_millis(ms)).await;
}

const START_PTT: GateCommand = GateCommand::StartRecording { locked: false };
const START_LOCKED: GateCommand = GateCommand::StartRecording { locked: true };

#[test]
fn test_default_config_timings() {
    let config = GateConfig::default();
    assert_eq!(config.promotion_window, Duration::from_millis(400));
    assert_eq!(config.minimum_visible, Duration::from_millis(400));
    assert_eq!(config.double_tap_window, Duration::from_millis(400));
    assert_eq!(config.cooldown, Duration::from_millis(280));
    assert_eq!(config.hands_free_debounce, Duration::from_millis(600));
    assert_eq!(config.failsafe_grace, Duration::from_millis(300));

    let immediate = config.immediate_hold();
    assert!(immediate.promotion_window.is_zero());
    assert!(immediate.minimum_visible.is_zero());
    assert_eq!(immediate.cooldown, config.cooldown);
}

#[tokio::test(start_paused = true)]
async fn test_hold_release_end_to_end() {
    let (gate, pipeline) = setup(GateConfig::default());

    gate.key_down();
    assert_eq!(gate.snapshot().state, GateState::AwaitingPromotion);

    at(&pipeline, 450).await;
    assert_eq!(gate.snapshot().state, GateState::ActivePtt);
    gate.key_up();

    assert_eq!(
        pipeline.commands(),
        vec![
            (0, GateCommand::ShowLightweightUi),
            (400, START_PTT),
            (450, GateCommand::StopRecording),
        ]
    );

    let snapshot = gate.snapshot();
    assert_eq!(snapshot.state, GateState::Cooldown);
    assert_eq!(
        snapshot.cooldown_until,
        Some(pipeline.start + Duration::from_millis(730))
    );

    at(&pipeline, 731).await;
    assert_eq!(gate.snapshot().state, GateState::Idle);

    // Pipeline reports stopped, so the failsafe stays quiet
    at(&pipeline, 2000).await;
    assert_eq!(pipeline.commands().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_short_press_is_mis_touch() {
    let (gate, pipeline) = setup(GateConfig::default());

    gate.key_down();
    at(&pipeline, 100).await;
    gate.key_up();

    // UI stays up for the minimum visible duration before hiding
    at(&pipeline, 399).await;
    assert_eq!(pipeline.commands().len(), 1);

    at(&pipeline, 1000).await;
    assert_eq!(
        pipeline.commands(),
        vec![
            (0, GateCommand::ShowLightweightUi),
            (400, GateCommand::QuickHideMisTouch),
        ]
    );
    assert_eq!(pipeline.count(START_PTT), 0);
    assert_eq!(gate.snapshot().state, GateState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_long_hold_starts_exactly_once() {
    let (gate, pipeline) = setup(GateConfig::default());

    gate.key_down();
    at(&pipeline, 5000).await;

    assert_eq!(pipeline.count(START_PTT), 1);
    assert_eq!(gate.snapshot().started_at, Some(pipeline.start + Duration::from_millis(400)));
}

#[tokio::test(start_paused = true)]
async fn test_stale_promotion_is_ignored() {
    let (gate, pipeline) = setup(GateConfig::default());

    gate.key_down();
    let stale_generation = gate.snapshot().generation;

    at(&pipeline, 100).await;
    gate.reset();

    at(&pipeline, 500).await;
    gate.key_down();
    assert_ne!(gate.snapshot().generation, stale_generation);

    // The old timer firing late must not promote the new press
    gate.inner.promotion_elapsed(stale_generation);
    assert_eq!(pipeline.count(START_PTT), 0);

    at(&pipeline, 1000).await;
    assert_eq!(
        pipeline.commands(),
        vec![
            (0, GateCommand::ShowLightweightUi),
            (500, GateCommand::ShowLightweightUi),
            (900, START_PTT),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reset_emits_nothing() {
    let (gate, pipeline) = setup(GateConfig::default());

    gate.key_down();
    gate.reset();
    at(&pipeline, 2000).await;

    assert_eq!(pipeline.commands(), vec![(0, GateCommand::ShowLightweightUi)]);
    let snapshot = gate.snapshot();
    assert_eq!(snapshot.state, GateState::Idle);
    assert!(!snapshot.key_is_down);
}

#[tokio::test(start_paused = true)]
async fn test_reset_keeps_double_tap_history() {
    let (gate, pipeline) = setup(GateConfig::default());

    gate.key_down();
    gate.reset();
    at(&pipeline, 150).await;
    gate.key_down();

    assert!(gate.snapshot().hands_free_locked);
    at(&pipeline, 2000).await;
    assert_eq!(
        pipeline.commands(),
        vec![(0, GateCommand::ShowLightweightUi), (150, START_LOCKED)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_double_tap_locks_hands_free() {
    let (gate, pipeline) = setup(GateConfig::default());

    gate.key_down();
    at(&pipeline, 150).await;
    gate.key_down();

    let snapshot = gate.snapshot();
    assert!(snapshot.hands_free_locked);
    assert_eq!(snapshot.state, GateState::ActiveHandsFree);

    at(&pipeline, 2000).await;
    assert_eq!(
        pipeline.commands(),
        vec![(0, GateCommand::ShowLightweightUi), (150, START_LOCKED)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_tap_release_tap_locks_without_mis_touch_hide() {
    let (gate, pipeline) = setup(GateConfig::default());

    gate.key_down();
    at(&pipeline, 100).await;
    gate.key_up();
    at(&pipeline, 150).await;
    gate.key_down();
    at(&pipeline, 200).await;
    gate.key_up();

    at(&pipeline, 2000).await;
    assert_eq!(
        pipeline.commands(),
        vec![(0, GateCommand::ShowLightweightUi), (150, START_LOCKED)]
    );
    assert!(gate.is_hands_free_locked());
}

#[tokio::test(start_paused = true)]
async fn test_taps_outside_window_do_not_lock() {
    let (gate, pipeline) = setup(GateConfig::default());

    gate.key_down();
    at(&pipeline, 100).await;
    gate.key_up();
    at(&pipeline, 600).await;
    gate.key_down();

    assert!(!gate.is_hands_free_locked());
    assert_eq!(pipeline.count(START_LOCKED), 0);
    assert_eq!(pipeline.count(GateCommand::ShowLightweightUi), 2);
}

#[tokio::test(start_paused = true)]
async fn test_key_down_during_cooldown_is_ignored() {
    let (gate, pipeline) = setup(GateConfig::default());

    gate.key_down();
    at(&pipeline, 450).await;
    gate.key_up();

    at(&pipeline, 500).await;
    gate.key_down();
    at(&pipeline, 550).await;
    gate.key_up();
    assert_eq!(pipeline.count(GateCommand::ShowLightweightUi), 1);

    at(&pipeline, 800).await;
    gate.key_down();
    assert_eq!(
        pipeline.commands().last(),
        Some(&(800, GateCommand::ShowLightweightUi))
    );
}

#[tokio::test(start_paused = true)]
async fn test_hands_free_stop_respects_debounce() {
    let (gate, pipeline) = setup(GateConfig::default());

    gate.toggle_hands_free();
    at(&pipeline, 300).await;
    gate.key_down();
    at(&pipeline, 350).await;
    gate.key_up();
    assert!(gate.is_hands_free_locked());

    at(&pipeline, 700).await;
    gate.key_down();
    at(&pipeline, 750).await;
    gate.key_up();

    at(&pipeline, 2000).await;
    assert_eq!(
        pipeline.commands(),
        vec![(0, START_LOCKED), (700, GateCommand::StopRecording)]
    );
    assert!(!gate.is_hands_free_locked());
}

#[tokio::test(start_paused = true)]
async fn test_toggle_hands_free_twice() {
    let (gate, pipeline) = setup(GateConfig::default());

    gate.toggle_hands_free();
    at(&pipeline, 100).await;
    gate.toggle_hands_free();
    assert!(gate.is_hands_free_locked(), "Second toggle inside debounce is ignored");

    at(&pipeline, 700).await;
    gate.toggle_hands_free();

    assert_eq!(
        pipeline.commands(),
        vec![(0, START_LOCKED), (700, GateCommand::StopRecording)]
    );
    assert_eq!(gate.snapshot().state, GateState::Cooldown);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_during_push_to_talk_stops() {
    let (gate, pipeline) = setup(GateConfig::default());

    gate.key_down();
    at(&pipeline, 500).await;
    gate.toggle_hands_free();

    assert_eq!(pipeline.commands().last(), Some(&(500, GateCommand::StopRecording)));
    assert_eq!(pipeline.count(START_LOCKED), 0);
}

#[tokio::test(start_paused = true)]
async fn test_key_down_stops_externally_locked_session() {
    let (gate, pipeline) = setup(GateConfig::default());
    pipeline.set_status(PipelineStatus {
        is_recording: true,
        is_hands_free_locked: true,
        is_stream_open: true,
        ..Default::default()
    });

    gate.key_down();

    assert_eq!(pipeline.commands(), vec![(0, GateCommand::StopRecording)]);
}

#[tokio::test(start_paused = true)]
async fn test_key_up_without_key_down_is_noop() {
    let (gate, pipeline) = setup(GateConfig::default());

    gate.key_up();
    at(&pipeline, 2000).await;

    assert!(pipeline.commands().is_empty());
    assert_eq!(gate.snapshot().generation, 0);
}

#[tokio::test(start_paused = true)]
async fn test_failsafe_cancels_once_when_stream_stays_open() {
    let (gate, pipeline) = setup(GateConfig::default());

    gate.key_down();
    at(&pipeline, 450).await;
    pipeline.set_status(PipelineStatus {
        is_recording: true,
        is_stream_open: true,
        ..Default::default()
    });
    gate.key_up();
    // A duplicate release must not schedule a second cancel
    gate.key_up();

    at(&pipeline, 749).await;
    assert_eq!(pipeline.count(GateCommand::CancelImmediate), 0);

    at(&pipeline, 5000).await;
    assert_eq!(pipeline.count(GateCommand::CancelImmediate), 1);
    assert_eq!(
        pipeline.commands().last(),
        Some(&(750, GateCommand::CancelImmediate))
    );
}

#[tokio::test(start_paused = true)]
async fn test_failsafe_skips_while_processing() {
    let (gate, pipeline) = setup(GateConfig::default());

    gate.key_down();
    at(&pipeline, 450).await;
    pipeline.set_status(PipelineStatus {
        is_recording: true,
        is_processing: true,
        is_stream_open: true,
        ..Default::default()
    });
    gate.key_up();

    at(&pipeline, 5000).await;
    assert_eq!(pipeline.count(GateCommand::CancelImmediate), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failsafe_skips_after_new_press() {
    let (gate, pipeline) = setup(GateConfig::default());

    gate.key_down();
    at(&pipeline, 450).await;
    pipeline.set_status(PipelineStatus {
        is_stream_open: true,
        ..Default::default()
    });
    gate.key_up();

    // Past cooldown, before the grace period ends
    at(&pipeline, 740).await;
    gate.key_down();

    at(&pipeline, 5000).await;
    assert_eq!(pipeline.count(GateCommand::CancelImmediate), 0);
}

#[tokio::test(start_paused = true)]
async fn test_immediate_hold_starts_on_press() {
    let (gate, pipeline) = setup(GateConfig::default().immediate_hold());

    gate.key_down();
    assert_eq!(gate.snapshot().state, GateState::ActivePtt);
    at(&pipeline, 50).await;
    gate.key_up();

    assert_eq!(
        pipeline.commands(),
        vec![
            (0, GateCommand::ShowLightweightUi),
            (0, START_PTT),
            (50, GateCommand::StopRecording),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_event_channel_applies_events_in_order() {
    let (gate, pipeline) = setup(GateConfig::default());
    let mut handle = GateHandle::spawn(gate.clone());
    let sender = handle.sender();

    assert!(sender.send(GateEvent::KeyDown));
    at(&pipeline, 450).await;
    assert!(sender.send(GateEvent::KeyUp));
    at(&pipeline, 460).await;

    assert_eq!(
        pipeline.commands(),
        vec![
            (0, GateCommand::ShowLightweightUi),
            (400, START_PTT),
            (450, GateCommand::StopRecording),
        ]
    );

    handle.shutdown();
    at(&pipeline, 500).await;
    assert!(!handle.is_running());
    assert!(!sender.send(GateEvent::KeyDown));
}
