//! Explicit session context shared by the stateful components.
//!
//! # Responsibility
//! - Carry the validated `CoreConfig` into each component at construction.
//! - Fan out change notifications to subscribers over channels.
//!
//! # Invariants
//! - Publishing never blocks; disconnected subscribers are dropped.

use crate::config::CoreConfig;
use crate::model::color::PaletteColor;
use crate::model::selection::SelectionId;
use crate::model::well::WellId;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

/// Cross-component change notification.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    CalibrationUpdated {
        point_count: usize,
        confidence_score: f64,
    },
    CalibrationInvalidated,
    SelectionCreated {
        id: SelectionId,
        well: WellId,
    },
    SelectionUpdated {
        id: SelectionId,
    },
    SelectionDeleted {
        id: SelectionId,
        well: WellId,
    },
    /// Several active selections share one colour. Allowed, but flagged.
    DuplicateColor {
        color: PaletteColor,
        selections: Vec<SelectionId>,
    },
}

/// Observer list backed by unbounded channels.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<SessionEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (sender, receiver) = unbounded();
        self.lock().push(sender);
        receiver
    }

    pub fn publish(&self, event: SessionEvent) {
        self.lock()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Sender<SessionEvent>>> {
        // A panicking subscriber cannot corrupt a list of senders.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Configuration plus notification channel for one interactive session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    config: Arc<CoreConfig>,
    events: EventBus,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}

impl SessionContext {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config: Arc::new(config),
            events: EventBus::new(),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn publish(&self, event: SessionEvent) {
        self.events.publish(event);
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::{EventBus, SessionEvent};

    #[test]
    fn every_subscriber_receives_events() {
        let bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();
        bus.publish(SessionEvent::CalibrationInvalidated);
        assert_eq!(first.try_recv().unwrap(), SessionEvent::CalibrationInvalidated);
        assert_eq!(second.try_recv().unwrap(), SessionEvent::CalibrationInvalidated);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        bus.publish(SessionEvent::CalibrationInvalidated);
        assert_eq!(bus.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }
}
