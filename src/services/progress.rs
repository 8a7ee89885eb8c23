//! Run progress bus
//!
//! One process-wide generation status consumed by SSE handlers and the
//! polling status endpoint. Percent is monotonically non-decreasing within a
//! run: a late-arriving lower percent is silently dropped, which hides the
//! reordering races parallel workers would otherwise paint onto the UI.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Complete,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressFrame {
    pub state: RunState,
    pub phase: String,
    pub message: String,
    pub percent: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ProgressFrame {
    fn idle() -> Self {
        Self {
            state: RunState::Idle,
            phase: String::new(),
            message: String::new(),
            percent: 0,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }
}

#[derive(Clone)]
pub struct ProgressBus {
    current: Arc<Mutex<ProgressFrame>>,
    sender: broadcast::Sender<ProgressFrame>,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self {
            current: Arc::new(Mutex::new(ProgressFrame::idle())),
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressFrame> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> ProgressFrame {
        self.current.lock().expect("progress lock poisoned").clone()
    }

    pub fn is_running(&self) -> bool {
        self.snapshot().state == RunState::Running
    }

    pub fn start(&self, phase: &str) {
        let frame = ProgressFrame {
            state: RunState::Running,
            phase: phase.to_string(),
            message: format!("{phase} started"),
            percent: 0,
            started_at: Some(Utc::now()),
            completed_at: None,
            error: None,
        };
        self.publish(frame);
    }

    /// Update progress. Percent never goes backwards within a run.
    pub fn update(&self, phase: &str, message: &str, percent: i64) {
        let mut guard = self.current.lock().expect("progress lock poisoned");
        if guard.state == RunState::Running && percent < guard.percent {
            return;
        }
        guard.state = RunState::Running;
        guard.phase = phase.to_string();
        guard.message = message.to_string();
        guard.percent = percent.clamp(0, 100);
        let frame = guard.clone();
        drop(guard);
        let _ = self.sender.send(frame);
    }

    pub fn complete(&self, message: &str) {
        let mut guard = self.current.lock().expect("progress lock poisoned");
        guard.state = RunState::Complete;
        guard.message = message.to_string();
        guard.percent = 100;
        guard.completed_at = Some(Utc::now());
        let frame = guard.clone();
        drop(guard);
        let _ = self.sender.send(frame);
    }

    pub fn fail(&self, error: &str) {
        let mut guard = self.current.lock().expect("progress lock poisoned");
        guard.state = RunState::Error;
        guard.error = Some(error.to_string());
        guard.completed_at = Some(Utc::now());
        let frame = guard.clone();
        drop(guard);
        let _ = self.sender.send(frame);
    }

    fn publish(&self, frame: ProgressFrame) {
        *self.current.lock().expect("progress lock poisoned") = frame.clone();
        let _ = self.sender.send(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_monotonic_within_run() {
        let bus = ProgressBus::new();
        bus.start("generation");
        bus.update("generation", "halfway", 50);
        // A racing worker reports an older, lower percent: dropped
        bus.update("generation", "stale", 30);
        assert_eq!(bus.snapshot().percent, 50);
        assert_eq!(bus.snapshot().message, "halfway");

        bus.update("generation", "nearly", 90);
        assert_eq!(bus.snapshot().percent, 90);
    }

    #[test]
    fn test_start_resets_percent() {
        let bus = ProgressBus::new();
        bus.start("generation");
        bus.update("generation", "done", 100);
        bus.complete("done");

        bus.start("generation");
        assert_eq!(bus.snapshot().percent, 0);
        assert_eq!(bus.snapshot().state, RunState::Running);
    }

    #[test]
    fn test_subscribers_receive_frames() {
        let bus = ProgressBus::new();
        let mut rx = bus.subscribe();
        bus.start("cache");
        bus.update("cache", "fetching", 40);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.state, RunState::Running);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.percent, 40);
    }
}
