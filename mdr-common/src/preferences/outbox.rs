//! Remote persistence outbox
//!
//! Every preference update made while a session exists becomes an intent.
//! Intents are drained in issue order by a single worker task that performs
//! the remote upsert and reports the outcome back to the store, if the store
//! still exists.

use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use super::store::Inner;
use super::{PreferencesPatch, UserPreferences, PREFERENCES_TABLE};
use crate::storage::{RemoteStore, USER_ID_FIELD};
use crate::{Error, Result};

/// Queued remote write
pub(crate) struct PersistenceIntent {
    pub seq: u64,
    pub user_id: String,
    /// Fields written by this update (used when the remote record exists)
    pub patch: PreferencesPatch,
    /// Full preferences at issue time (used to create a missing record)
    pub snapshot: UserPreferences,
    pub done: oneshot::Sender<std::result::Result<(), String>>,
}

pub(crate) enum OutboxMessage {
    Write(PersistenceIntent),
    /// Acknowledged once every earlier message is processed
    Flush(oneshot::Sender<()>),
}

/// Lifecycle of one intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentStatus {
    Pending,
    Resolved,
    Failed(String),
}

/// Outbox log entry, for observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub seq: u64,
    pub user_id: String,
    pub fields: Vec<&'static str>,
    pub status: IntentStatus,
}

/// Completion handle returned by preference updates
///
/// Dropping it does not cancel the write.
#[derive(Debug)]
pub struct PendingWrite {
    seq: Option<u64>,
    rx: Option<oneshot::Receiver<std::result::Result<(), String>>>,
}

impl PendingWrite {
    /// Update that has no remote component (anonymous session)
    pub(crate) fn local_only() -> Self {
        Self { seq: None, rx: None }
    }

    pub(crate) fn queued(seq: u64, rx: oneshot::Receiver<std::result::Result<(), String>>) -> Self {
        Self { seq: Some(seq), rx: Some(rx) }
    }

    /// Outbox sequence number, None for local-only updates
    pub fn seq(&self) -> Option<u64> {
        self.seq
    }

    pub fn is_remote(&self) -> bool {
        self.rx.is_some()
    }

    /// Wait for remote persistence
    ///
    /// Local-only updates complete immediately. A failed remote write returns
    /// [`Error::WriteFailed`]; the in-memory value stays applied either way.
    pub async fn wait(self) -> Result<()> {
        match self.rx {
            None => Ok(()),
            Some(rx) => match rx.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(message)) => Err(Error::WriteFailed(message)),
                Err(_) => Err(Error::Internal("preference outbox worker stopped".to_string())),
            },
        }
    }
}

/// Insert-if-absent, else update, keyed by user id
///
/// The record can be created by someone else (a migration) between the
/// select and the insert; the patch is then applied to that record instead.
async fn upsert(remote: &dyn RemoteStore, intent: &PersistenceIntent) -> Result<()> {
    if remote.select_one(PREFERENCES_TABLE, &intent.user_id).await?.is_some() {
        return update(remote, intent).await;
    }

    let mut record = intent.snapshot.to_record()?;
    record.insert(
        USER_ID_FIELD.to_string(),
        serde_json::Value::String(intent.user_id.clone()),
    );
    match remote.insert_one(PREFERENCES_TABLE, record).await {
        Ok(()) => Ok(()),
        Err(e) => match remote.select_one(PREFERENCES_TABLE, &intent.user_id).await {
            Ok(Some(_)) => {
                debug!(seq = intent.seq, "Record created concurrently, updating instead");
                update(remote, intent).await
            }
            _ => Err(e),
        },
    }
}

async fn update(remote: &dyn RemoteStore, intent: &PersistenceIntent) -> Result<()> {
    remote
        .update_one(PREFERENCES_TABLE, &intent.user_id, intent.patch.to_record()?)
        .await
}

/// Worker loop; exits when every sender is gone
pub(crate) async fn run_outbox(
    mut rx: mpsc::UnboundedReceiver<OutboxMessage>,
    remote: Arc<dyn RemoteStore>,
    store: Weak<Inner>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            OutboxMessage::Write(intent) => {
                debug!(seq = intent.seq, user_id = %intent.user_id, "Persisting preference update");
                let result = upsert(remote.as_ref(), &intent).await;
                if let Err(e) = &result {
                    error!(seq = intent.seq, "Error persisting preferences: {}", e);
                }
                match store.upgrade() {
                    Some(inner) => inner.resolve_intent(intent.seq, &result),
                    None => debug!(seq = intent.seq, "Preference store gone, dropping write result"),
                }
                let _ = intent.done.send(result.map_err(|e| e.to_string()));
            }
            OutboxMessage::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!("Preference outbox closed");
}
