// Event channel into the gate
//
// Platform input threads never touch the gate directly. They push events
// through a GateSender; one consumer task applies them in arrival order.

use super::InputGate;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Events accepted by the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    KeyDown,
    KeyUp,
    ToggleHandsFree,
    Reset,
}

/// Cloneable, thread-safe sender for gate events
#[derive(Debug, Clone)]
pub struct GateSender {
    tx: UnboundedSender<GateEvent>,
}

impl GateSender {
    /// Queue an event. Returns false if the consumer task has exited.
    pub fn send(&self, event: GateEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(_) => {
                crate::warn!("Gate event {:?} dropped: gate task has stopped", event);
                false
            }
        }
    }

    /// A sender paired with a bare receiver, for tests that inspect events
    #[cfg(test)]
    pub fn test_pair() -> (Self, UnboundedReceiver<GateEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// Handle to the gate's consumer task
///
/// Dropping the handle aborts the task.
pub struct GateHandle {
    sender: GateSender,
    task: Option<JoinHandle<()>>,
}

impl GateHandle {
    /// Spawn the consumer task on the current Tokio runtime
    pub fn spawn(gate: InputGate) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(gate_task_main(gate, rx));
        Self {
            sender: GateSender { tx },
            task: Some(task),
        }
    }

    pub fn sender(&self) -> GateSender {
        self.sender.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the consumer task. Events still queued are discarded.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            crate::debug!("Gate task stopped");
        }
    }
}

impl Drop for GateHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn gate_task_main(gate: InputGate, mut rx: UnboundedReceiver<GateEvent>) {
    crate::debug!("Gate task started");
    while let Some(event) = rx.recv().await {
        match event {
            GateEvent::KeyDown => gate.key_down(),
            GateEvent::KeyUp => gate.key_up(),
            GateEvent::ToggleHandsFree => gate.toggle_hands_free(),
            GateEvent::Reset => gate.reset(),
        }
    }
    crate::debug!("Gate task exiting: all senders dropped");
}
