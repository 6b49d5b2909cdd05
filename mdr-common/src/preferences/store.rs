//! Preference store
//!
//! Lifecycle: `Uninitialized → LoadingLocal → LoadingRemote (signed in) → Ready`.
//!
//! Updates are merged into memory and written to the local store before
//! `update_preferences` returns, so reads are consistent immediately. When a
//! session exists the update is also queued for remote persistence; a failed
//! remote write leaves the in-memory value applied and sets `error`.

use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::outbox::{run_outbox, OutboxMessage, PersistenceIntent};
use super::{IntentStatus, OutboxEntry, PendingWrite, PreferencesPatch, Theme, UserPreferences};
use crate::events::{EventBus, MdrEvent};
use crate::session::SessionProvider;
use crate::storage::{LocalStore, Record, RemoteStore};
use crate::{Error, Result};

/// Remote table holding one preferences record per user
pub const PREFERENCES_TABLE: &str = "user_preferences";

/// Local store key holding the full preferences record
pub const LOCAL_PREFERENCES_KEY: &str = "userPreferences";

/// Individual keys written for the legacy theme context
pub(crate) const LEGACY_THEME_KEY: &str = "theme";
pub(crate) const LEGACY_AUDIO_KEY: &str = "audioEnabled";
pub(crate) const LEGACY_VOLUME_KEY: &str = "volume";

const OUTBOX_LOG_LIMIT: usize = 128;

/// Which kind of write produced `PreferencesState::error`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorSource {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadPhase {
    Uninitialized,
    LoadingLocal,
    LoadingRemote,
    Ready,
}

/// Observable store state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferencesState {
    pub preferences: UserPreferences,
    pub phase: LoadPhase,
    /// True until local preferences are applied
    pub loading: bool,
    /// Last persistence failure, cleared by the next successful write of the
    /// same kind (local or remote)
    pub error: Option<String>,
    #[serde(skip)]
    pub(crate) error_source: Option<ErrorSource>,
    /// False once the remote store failed to answer or is not configured
    pub remote_available: bool,
    /// Queued remote writes not yet resolved
    pub pending_writes: usize,
    /// Incremented on every in-memory update
    #[serde(skip)]
    pub(crate) revision: u64,
}

impl Default for PreferencesState {
    fn default() -> Self {
        Self {
            preferences: UserPreferences::default(),
            phase: LoadPhase::Uninitialized,
            loading: true,
            error: None,
            error_source: None,
            remote_available: true,
            pending_writes: 0,
            revision: 0,
        }
    }
}

impl PreferencesState {
    fn set_error(&mut self, source: ErrorSource, message: String) {
        self.error = Some(message);
        self.error_source = Some(source);
    }

    fn clear_error(&mut self, source: ErrorSource) {
        if self.error_source == Some(source) {
            self.error = None;
            self.error_source = None;
        }
    }
}

pub(crate) struct Inner {
    state: Mutex<PreferencesState>,
    log: Mutex<VecDeque<OutboxEntry>>,
    pub(super) local: Arc<dyn LocalStore>,
    pub(super) remote: Option<Arc<dyn RemoteStore>>,
    pub(super) session: Arc<dyn SessionProvider>,
    events: Option<Arc<EventBus>>,
    outbox: Option<mpsc::UnboundedSender<OutboxMessage>>,
    next_seq: AtomicU64,
    pub(super) migrated: Mutex<HashSet<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    pub(super) fn state(&self) -> MutexGuard<'_, PreferencesState> {
        lock(&self.state)
    }

    pub(super) fn publish(&self, event: MdrEvent) {
        if let Some(events) = &self.events {
            events.emit_lossy(event);
        }
    }

    /// Record the outcome of a remote write
    pub(crate) fn resolve_intent(&self, seq: u64, result: &Result<()>) {
        {
            let mut state = self.state();
            state.pending_writes = state.pending_writes.saturating_sub(1);
            match result {
                Ok(()) => state.clear_error(ErrorSource::Remote),
                Err(e) => {
                    state.set_error(ErrorSource::Remote, e.to_string());
                    if matches!(e, Error::PersistenceUnavailable(_)) {
                        state.remote_available = false;
                    }
                }
            }
        }

        let status = match result {
            Ok(()) => IntentStatus::Resolved,
            Err(e) => IntentStatus::Failed(e.to_string()),
        };
        if let Some(entry) = lock(&self.log).iter_mut().find(|e| e.seq == seq) {
            entry.status = status;
        }

        if let Err(e) = result {
            self.publish(MdrEvent::PreferenceWriteFailed {
                seq,
                message: e.to_string(),
                timestamp: chrono::Utc::now(),
            });
        }
    }

    /// Stored local preferences, None when nothing was ever saved
    pub(super) fn read_local(&self) -> Option<PreferencesPatch> {
        match self.local.get_item(LOCAL_PREFERENCES_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Record>(&raw) {
                Ok(record) => return Some(PreferencesPatch::from_record(&record)),
                Err(e) => warn!("Stored preferences are not valid JSON ({}), trying legacy keys", e),
            },
            Ok(None) => {}
            Err(e) => {
                warn!("Error reading local preferences: {}", e);
                return None;
            }
        }

        let item = |key: &str| self.local.get_item(key).ok().flatten();
        let theme = item(LEGACY_THEME_KEY);
        let audio = item(LEGACY_AUDIO_KEY);
        let volume = item(LEGACY_VOLUME_KEY);
        if theme.is_none() && audio.is_none() && volume.is_none() {
            return None;
        }

        Some(PreferencesPatch {
            theme: theme.and_then(|t| t.parse().ok()),
            audio_enabled: audio.map(|a| a == "true"),
            volume: volume
                .and_then(|v| v.parse::<f32>().ok())
                .filter(|v| v.is_finite() && (0.0..=1.0).contains(v)),
            ..Default::default()
        })
    }

    fn write_local(&self, prefs: &UserPreferences) -> Result<()> {
        let json = serde_json::to_string(prefs)?;
        self.local.set_item(LOCAL_PREFERENCES_KEY, &json)?;
        self.local.set_item(LEGACY_THEME_KEY, prefs.theme.as_str())?;
        self.local.set_item(LEGACY_AUDIO_KEY, if prefs.audio_enabled { "true" } else { "false" })?;
        self.local.set_item(LEGACY_VOLUME_KEY, &prefs.volume.to_string())?;
        Ok(())
    }
}

/// Unified read/write surface over user preferences
///
/// Cheap to clone; clones share state. Must be created inside a tokio
/// runtime when a remote store is configured (the outbox worker is spawned
/// on construction).
#[derive(Clone)]
pub struct PreferenceStore {
    pub(super) inner: Arc<Inner>,
}

impl std::fmt::Debug for PreferenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceStore")
            .field("state", &*self.inner.state())
            .field("remote", &self.inner.remote.is_some())
            .finish()
    }
}

impl PreferenceStore {
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Option<Arc<dyn RemoteStore>>,
        session: Arc<dyn SessionProvider>,
    ) -> Self {
        Self::with_events(local, remote, session, None)
    }

    pub fn with_events(
        local: Arc<dyn LocalStore>,
        remote: Option<Arc<dyn RemoteStore>>,
        session: Arc<dyn SessionProvider>,
        events: Option<Arc<EventBus>>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak| {
            let outbox = remote.as_ref().map(|remote| {
                let (tx, rx) = mpsc::unbounded_channel();
                tokio::spawn(run_outbox(rx, remote.clone(), weak.clone()));
                tx
            });
            let state = PreferencesState {
                remote_available: remote.is_some(),
                ..Default::default()
            };
            Inner {
                state: Mutex::new(state),
                log: Mutex::new(VecDeque::new()),
                local,
                remote,
                session,
                events,
                outbox,
                next_seq: AtomicU64::new(1),
                migrated: Mutex::new(HashSet::new()),
            }
        });
        Self { inner }
    }

    // ========================================
    // Reads
    // ========================================

    pub fn state(&self) -> PreferencesState {
        self.inner.state().clone()
    }

    pub fn preferences(&self) -> UserPreferences {
        self.inner.state().preferences.clone()
    }

    pub fn theme(&self) -> Theme {
        self.inner.state().preferences.theme
    }

    pub fn audio_enabled(&self) -> bool {
        self.inner.state().preferences.audio_enabled
    }

    pub fn volume(&self) -> f32 {
        self.inner.state().preferences.volume
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state().loading
    }

    pub fn phase(&self) -> LoadPhase {
        self.inner.state().phase
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state().error.clone()
    }

    pub fn remote_available(&self) -> bool {
        self.inner.state().remote_available
    }

    /// Recent outbox entries, oldest first
    pub fn outbox_entries(&self) -> Vec<OutboxEntry> {
        lock(&self.inner.log).iter().cloned().collect()
    }

    // ========================================
    // Loading
    // ========================================

    /// Hydrate from the local store, then from the remote store if signed in
    ///
    /// Never fails: an unreachable remote leaves local values in place and
    /// clears `remote_available`.
    pub async fn load(&self) {
        {
            let mut state = self.inner.state();
            state.phase = LoadPhase::LoadingLocal;
        }

        let local = self.inner.read_local();
        {
            let mut state = self.inner.state();
            let mut prefs = UserPreferences::default();
            if let Some(patch) = &local {
                patch.apply_to(&mut prefs);
            }
            state.preferences = prefs;
            state.loading = false;
        }
        debug!(found = local.is_some(), "Loaded local preferences");

        let mut remote = false;
        if let Some(user) = self.inner.session.current_user() {
            self.inner.state().phase = LoadPhase::LoadingRemote;
            match self.refresh().await {
                Ok(()) => remote = true,
                Err(e) => warn!(user_id = %user.id, "Using local preferences: {}", e),
            }
        }

        let theme = {
            let mut state = self.inner.state();
            state.phase = LoadPhase::Ready;
            state.preferences.theme
        };
        self.inner.publish(MdrEvent::PreferencesLoaded {
            remote,
            theme,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Re-fetch the signed-in user's remote record and overlay present fields
    ///
    /// Waits for queued writes first. If an update is applied while the fetch
    /// is in flight, the fetched record is discarded; the newer local value is
    /// already queued for the remote store.
    pub async fn refresh(&self) -> Result<()> {
        let user_id = self
            .inner
            .session
            .current_user_id()
            .ok_or_else(|| Error::InvalidInput("no authenticated session".to_string()))?;

        let Some(remote) = self.inner.remote.clone() else {
            self.inner.state().remote_available = false;
            return Err(Error::PersistenceUnavailable("no remote store configured".to_string()));
        };

        // Queued writes are newer than anything the remote store holds
        self.flush().await;

        let revision = self.inner.state().revision;
        match remote.select_one(PREFERENCES_TABLE, &user_id).await {
            Ok(record) => {
                let mut state = self.inner.state();
                state.remote_available = true;
                if state.revision != revision {
                    debug!("Preferences changed during fetch, keeping local values");
                    return Ok(());
                }
                if let Some(record) = record {
                    PreferencesPatch::from_record(&record).apply_to(&mut state.preferences);
                    debug!(user_id = %user_id, "Applied remote preferences");
                }
                Ok(())
            }
            Err(e) => {
                warn!("Error fetching preferences: {}", e);
                self.inner.state().remote_available = false;
                Err(match e {
                    Error::PersistenceUnavailable(_) => e,
                    other => Error::PersistenceUnavailable(other.to_string()),
                })
            }
        }
    }

    // ========================================
    // Updates
    // ========================================

    /// Merge `patch` into memory, persist locally, queue the remote write
    ///
    /// Fails only for invalid values, before anything is applied.
    pub fn update_preferences(&self, patch: PreferencesPatch) -> Result<PendingWrite> {
        patch.validate()?;
        self.commit(|_| patch)
    }

    pub fn set_theme(&self, theme: Theme) -> Result<PendingWrite> {
        self.update_preferences(PreferencesPatch::theme(theme))
    }

    pub fn set_audio_enabled(&self, enabled: bool) -> Result<PendingWrite> {
        self.update_preferences(PreferencesPatch::audio_enabled(enabled))
    }

    pub fn set_volume(&self, volume: f32) -> Result<PendingWrite> {
        self.update_preferences(PreferencesPatch::volume(volume))
    }

    /// Advance to the next theme in the fixed cycle
    pub fn toggle_theme(&self) -> Result<PendingWrite> {
        self.commit(|prefs| PreferencesPatch::theme(prefs.theme.next()))
    }

    /// Apply a patch derived from the current preferences
    ///
    /// The merge, the local write and the outbox enqueue happen under one
    /// lock, so the outbox order matches the order updates were applied.
    fn commit(&self, make_patch: impl FnOnce(&UserPreferences) -> PreferencesPatch) -> Result<PendingWrite> {
        let user_id = self.inner.session.current_user_id();

        let (pending, patch, theme) = {
            let mut state = self.inner.state();
            let patch = make_patch(&state.preferences);
            patch.apply_to(&mut state.preferences);
            state.revision += 1;

            match self.inner.write_local(&state.preferences) {
                Ok(()) => state.clear_error(ErrorSource::Local),
                Err(e) => {
                    warn!("Could not save preferences locally: {}", e);
                    state.set_error(ErrorSource::Local, e.to_string());
                }
            }

            let pending = match (&user_id, &self.inner.outbox) {
                (Some(user_id), Some(outbox)) => {
                    let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
                    let (done, rx) = oneshot::channel();
                    let intent = PersistenceIntent {
                        seq,
                        user_id: user_id.clone(),
                        patch: patch.clone(),
                        snapshot: state.preferences.clone(),
                        done,
                    };
                    if outbox.send(OutboxMessage::Write(intent)).is_ok() {
                        state.pending_writes += 1;
                        let mut log = lock(&self.inner.log);
                        log.push_back(OutboxEntry {
                            seq,
                            user_id: user_id.clone(),
                            fields: patch.fields(),
                            status: IntentStatus::Pending,
                        });
                        while log.len() > OUTBOX_LOG_LIMIT {
                            log.pop_front();
                        }
                        PendingWrite::queued(seq, rx)
                    } else {
                        warn!("Preference outbox closed, update kept locally");
                        PendingWrite::local_only()
                    }
                }
                _ => PendingWrite::local_only(),
            };
            (pending, patch, state.preferences.theme)
        };

        debug!(fields = ?patch.fields(), remote = pending.is_remote(), "Preferences updated");
        self.inner.publish(MdrEvent::PreferencesChanged {
            patch,
            theme,
            timestamp: chrono::Utc::now(),
        });
        Ok(pending)
    }

    /// Wait until every remote write issued so far has been processed
    pub async fn flush(&self) {
        let Some(outbox) = &self.inner.outbox else {
            return;
        };
        let (ack, rx) = oneshot::channel();
        if outbox.send(OutboxMessage::Flush(ack)).is_ok() {
            let _ = rx.await;
        }
    }

    // ========================================
    // Session handling
    // ========================================

    /// Follow session transitions for the lifetime of this store
    ///
    /// On sign-in: migrate local preferences, then reload (remote overlay).
    /// On sign-out: reload from the local store only. The task ends when the
    /// session is dropped or every clone of this store is dropped.
    pub fn spawn_session_listener(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let mut rx = self.inner.session.subscribe();
        // Captured here so a transition made before the task first runs is still seen
        let mut previous = rx.borrow_and_update().clone();

        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let current = rx.borrow_and_update().clone();
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let store = PreferenceStore { inner };

                match (&previous, &current) {
                    (None, Some(user)) => store.on_sign_in(user).await,
                    (Some(old), Some(user)) if old.id != user.id => store.on_sign_in(user).await,
                    (Some(_), None) => {
                        info!("Signed out, using local preferences");
                        store.load().await;
                    }
                    _ => {}
                }
                previous = current;
            }
        })
    }

    async fn on_sign_in(&self, user: &crate::session::SessionUser) {
        match self.migrate_from_local(user).await {
            Ok(outcome) => debug!(user_id = %user.id, ?outcome, "Preference migration checked"),
            Err(e) => warn!(user_id = %user.id, "Preference migration failed: {}", e),
        }
        self.load().await;
    }
}
