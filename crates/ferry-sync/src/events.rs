//! Progress and error events for whoever is presenting the run.

use ferry_api::EntityGroup;
use tokio::sync::mpsc;

use crate::GroupPhase;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

/// A human readable message. Every error that escapes a batch becomes
/// exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

/// Something observable happened.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    PhaseChanged {
        workspace_id: String,
        group: EntityGroup,
        phase: GroupPhase,
    },
    ItemCompleted {
        workspace_id: String,
        group: EntityGroup,
        completed: usize,
        total: usize,
    },
    ItemSkipped {
        workspace_id: String,
        group: EntityGroup,
        id: String,
        reason: String,
    },
    Notification(Notification),
}

/// Fan-out of events to every subscriber.
///
/// Channels are unbounded so a slow reader never loses a notification.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<mpsc::UnboundedSender<SyncEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SyncEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn emit(&self, event: SyncEvent) {
        for subscriber in &self.subscribers {
            // A dropped receiver just stops listening.
            let _ = subscriber.send(event.clone());
        }
    }

    pub fn notify(&self, notification: Notification) {
        self.emit(SyncEvent::Notification(notification));
    }

    /// Drop subscribers whose receivers are gone.
    pub fn prune(&mut self) {
        self.subscribers.retain(|s| !s.is_closed());
    }
}
