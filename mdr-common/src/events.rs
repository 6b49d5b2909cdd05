//! Event types for the MDR event system
//!
//! Provides shared event definitions and the EventBus used by the registry,
//! the preference store and the session layer.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::preferences::{PreferencesPatch, Theme};

/// MDR event types
///
/// Events are broadcast via EventBus and can be serialized for transport to
/// UI clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MdrEvent {
    /// Module added to (or overwritten in) the registry
    ///
    /// Triggers:
    /// - Navigation/route builders: re-query the registry
    ModuleRegistered {
        module_id: String,
        /// True when an existing entry with the same id was replaced
        overwritten: bool,
        enabled: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Module enabled state changed at runtime
    ModuleToggled {
        module_id: String,
        enabled: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// In-memory preferences changed (local merge already applied)
    PreferencesChanged {
        /// Fields that were written
        patch: PreferencesPatch,
        /// Effective theme after the merge
        theme: Theme,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Preference store finished (re)loading
    ///
    /// Triggers:
    /// - Theme sync: first resolve after hydration
    PreferencesLoaded {
        /// True when the remote record was consulted successfully
        remote: bool,
        theme: Theme,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Remote persistence of a queued preference update failed
    ///
    /// The in-memory value stays applied; callers may reissue the update.
    PreferenceWriteFailed {
        seq: u64,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Local preferences copied into a new remote record
    PreferencesMigrated {
        user_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Authentication state changed
    SessionChanged {
        /// Authenticated user id, None when signed out
        user_id: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl MdrEvent {
    /// Variant name, used for logging and transport
    pub fn event_type(&self) -> &'static str {
        match self {
            MdrEvent::ModuleRegistered { .. } => "ModuleRegistered",
            MdrEvent::ModuleToggled { .. } => "ModuleToggled",
            MdrEvent::PreferencesChanged { .. } => "PreferencesChanged",
            MdrEvent::PreferencesLoaded { .. } => "PreferencesLoaded",
            MdrEvent::PreferenceWriteFailed { .. } => "PreferenceWriteFailed",
            MdrEvent::PreferencesMigrated { .. } => "PreferencesMigrated",
            MdrEvent::SessionChanged { .. } => "SessionChanged",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution
///
/// The EventBus uses tokio::broadcast internally:
/// - Multiple subscribers, each receiving every event emitted after subscribing
/// - Bounded buffering; slow subscribers observe `RecvError::Lagged`
/// - Cheap to share behind `Arc`
///
/// # Examples
///
/// ```
/// use mdr_common::events::{EventBus, MdrEvent};
///
/// let bus = EventBus::new(16);
/// let mut rx = bus.subscribe();
/// bus.emit_lossy(MdrEvent::SessionChanged {
///     user_id: None,
///     timestamp: chrono::Utc::now(),
/// });
/// assert_eq!(rx.try_recv().unwrap().event_type(), "SessionChanged");
/// ```
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<MdrEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<MdrEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: MdrEvent) -> Result<usize, broadcast::error::SendError<MdrEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: MdrEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_emit_without_subscribers_is_err() {
        let bus = EventBus::new(4);
        let result = bus.emit(MdrEvent::SessionChanged {
            user_id: None,
            timestamp: chrono::Utc::now(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_eventbus_multiple_subscribers() {
        let bus = Arc::new(EventBus::new(10));
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(MdrEvent::ModuleToggled {
            module_id: "formulations".to_string(),
            enabled: false,
            timestamp: chrono::Utc::now(),
        })
        .expect("emit should succeed");

        assert_eq!(rx1.try_recv().unwrap().event_type(), "ModuleToggled");
        assert_eq!(rx2.try_recv().unwrap().event_type(), "ModuleToggled");
    }

    #[test]
    fn test_eventbus_emit_lossy_on_full_channel() {
        let bus = EventBus::new(2);
        let _rx = bus.subscribe();
        for i in 0..10 {
            bus.emit_lossy(MdrEvent::PreferenceWriteFailed {
                seq: i,
                message: "offline".to_string(),
                timestamp: chrono::Utc::now(),
            });
        }
        assert_eq!(bus.capacity(), 2);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = MdrEvent::PreferencesChanged {
            patch: PreferencesPatch {
                theme: Some(Theme::Dystopia),
                ..Default::default()
            },
            theme: Theme::Dystopia,
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_string(&event).expect("Event serialization should succeed");
        assert!(json.contains("\"type\":\"PreferencesChanged\""));
        assert!(json.contains("\"theme\":\"dystopia\""));

        let back: MdrEvent = serde_json::from_str(&json).expect("Event deserialization should succeed");
        assert_eq!(back.event_type(), "PreferencesChanged");
    }
}
