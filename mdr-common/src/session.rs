//! Authentication session collaborator
//!
//! The preference layer only needs the current user and a notification when
//! the user changes. Transitions are published through a `tokio::sync::watch`
//! channel, so late subscribers always see the current state.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::events::{EventBus, MdrEvent};

/// Authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    /// Profile metadata carried into migrated preference records
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl SessionUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            avatar: None,
            color: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Source of the current authentication state
pub trait SessionProvider: Send + Sync {
    fn current_user(&self) -> Option<SessionUser>;

    /// Receiver notified on every sign-in/sign-out
    fn subscribe(&self) -> watch::Receiver<Option<SessionUser>>;

    fn current_user_id(&self) -> Option<String> {
        self.current_user().map(|u| u.id)
    }
}

/// In-process session state
#[derive(Debug)]
pub struct Session {
    tx: watch::Sender<Option<SessionUser>>,
    events: Option<Arc<EventBus>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Anonymous session
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx, events: None }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn sign_in(&self, user: SessionUser) {
        info!(user_id = %user.id, "Session authenticated");
        let user_id = user.id.clone();
        self.tx.send_replace(Some(user));
        self.publish(Some(user_id));
    }

    pub fn sign_out(&self) {
        if self.tx.send_replace(None).is_some() {
            info!("Session signed out");
            self.publish(None);
        }
    }

    fn publish(&self, user_id: Option<String>) {
        if let Some(events) = &self.events {
            events.emit_lossy(MdrEvent::SessionChanged {
                user_id,
                timestamp: chrono::Utc::now(),
            });
        }
    }
}

impl SessionProvider for Session {
    fn current_user(&self) -> Option<SessionUser> {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<SessionUser>> {
        self.tx.subscribe()
    }
}
