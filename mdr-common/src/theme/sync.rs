//! Legacy context ↔ preference store synchronization
//!
//! [`resolve`] is a pure function from the current inputs and the last
//! observation to a [`SyncPlan`]. Every write in a plan is guarded by an
//! inequality check, so applying a plan and resolving again on the result
//! yields an empty plan.
//!
//! Conflict policy per field: a side that changed since the last observation
//! wins; when both changed, or on the first observation, the preference
//! store wins.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{DocumentElement, LegacyThemeContext, ThemeSnapshot};
use crate::events::{EventBus, MdrEvent};
use crate::preferences::{PreferenceStore, PreferencesPatch, Theme};

/// Audio output settings pushed to a [`VolumeSink`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AudioOutput {
    pub enabled: bool,
    pub volume: f32,
}

/// Receives effective audio settings (sound effects player)
pub trait VolumeSink: Send + Sync {
    fn apply(&self, output: AudioOutput);
}

/// Current values of both sides
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncInput {
    pub legacy: ThemeSnapshot,
    pub prefs: ThemeSnapshot,
    pub volume: f32,
    /// Preference store still hydrating
    pub loading: bool,
    /// Legacy context accepts writes
    pub legacy_wired: bool,
}

/// Values both sides held after the last applied plan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub legacy: ThemeSnapshot,
    pub prefs: ThemeSnapshot,
    pub output: AudioOutput,
}

/// Writes needed to bring every side into agreement
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncPlan {
    pub to_prefs: PreferencesPatch,
    pub legacy_theme: Option<Theme>,
    pub legacy_audio: Option<bool>,
    pub document_theme: Option<Theme>,
    pub output: Option<AudioOutput>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_prefs.is_empty()
            && self.legacy_theme.is_none()
            && self.legacy_audio.is_none()
            && self.document_theme.is_none()
            && self.output.is_none()
    }
}

/// Pick the winning value of one field
fn target<T: PartialEq + Copy>(legacy: T, prefs: T, last: Option<(T, T)>) -> T {
    match last {
        Some((last_legacy, last_prefs)) if legacy != last_legacy && prefs == last_prefs => legacy,
        _ => prefs,
    }
}

/// Compute the plan for `input`
///
/// Returns the target observation alongside the plan; the caller records it
/// once the plan is applied. While the store is loading the plan is empty and
/// no observation is produced.
pub fn resolve(
    input: &SyncInput,
    last: Option<&Observation>,
    document: &DocumentElement,
) -> (SyncPlan, Option<Observation>) {
    if input.loading {
        return (SyncPlan::default(), None);
    }

    let theme = target(
        input.legacy.theme,
        input.prefs.theme,
        last.map(|o| (o.legacy.theme, o.prefs.theme)),
    );
    let audio_enabled = target(
        input.legacy.audio_enabled,
        input.prefs.audio_enabled,
        last.map(|o| (o.legacy.audio_enabled, o.prefs.audio_enabled)),
    );

    let mut plan = SyncPlan::default();
    if theme != input.prefs.theme {
        plan.to_prefs.theme = Some(theme);
    }
    if audio_enabled != input.prefs.audio_enabled {
        plan.to_prefs.audio_enabled = Some(audio_enabled);
    }

    let mut legacy = input.legacy;
    if input.legacy_wired {
        if theme != input.legacy.theme {
            plan.legacy_theme = Some(theme);
            legacy.theme = theme;
        }
        if audio_enabled != input.legacy.audio_enabled {
            plan.legacy_audio = Some(audio_enabled);
            legacy.audio_enabled = audio_enabled;
        }
    }

    if document.theme() != Some(theme) {
        plan.document_theme = Some(theme);
    }

    let output = AudioOutput {
        enabled: audio_enabled,
        volume: input.volume,
    };
    if last.map(|o| o.output) != Some(output) {
        plan.output = Some(output);
    }

    let observed = Observation {
        legacy,
        prefs: ThemeSnapshot::new(theme, audio_enabled),
        output,
    };
    (plan, Some(observed))
}

/// Adapter keeping the legacy context, the preference store, the document and
/// the audio output in agreement
pub struct ThemeSync {
    store: PreferenceStore,
    legacy: Arc<dyn LegacyThemeContext>,
    document: DocumentElement,
    sink: Option<Arc<dyn VolumeSink>>,
    last: Option<Observation>,
}

impl std::fmt::Debug for ThemeSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThemeSync")
            .field("document", &self.document)
            .field("last", &self.last)
            .finish()
    }
}

impl ThemeSync {
    pub fn new(store: PreferenceStore, legacy: Arc<dyn LegacyThemeContext>) -> Self {
        Self {
            store,
            legacy,
            document: DocumentElement::new(),
            sink: None,
            last: None,
        }
    }

    pub fn with_volume_sink(mut self, sink: Arc<dyn VolumeSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_document(mut self, document: DocumentElement) -> Self {
        self.document = document;
        self
    }

    pub fn document(&self) -> &DocumentElement {
        &self.document
    }

    fn input(&self) -> SyncInput {
        let state = self.store.state();
        SyncInput {
            legacy: self.legacy.snapshot(),
            prefs: ThemeSnapshot::from(&state.preferences),
            volume: state.preferences.volume,
            loading: state.loading,
            legacy_wired: self.legacy.is_wired(),
        }
    }

    /// Resolve the current inputs and apply the resulting plan
    ///
    /// Returns the applied plan. Never fails; a rejected preference write is
    /// logged and retried on the next call.
    pub fn sync(&mut self) -> SyncPlan {
        let input = self.input();
        let (plan, observed) = resolve(&input, self.last.as_ref(), &self.document);
        if plan.is_empty() {
            if observed.is_some() {
                self.last = observed;
            }
            return plan;
        }
        debug!(?plan, "Applying theme sync plan");

        let mut applied = true;
        if !plan.to_prefs.is_empty() {
            if let Err(e) = self.store.update_preferences(plan.to_prefs.clone()) {
                warn!("Could not push legacy theme state to preferences: {}", e);
                applied = false;
            }
        }
        if let Some(theme) = plan.legacy_theme {
            self.legacy.set_theme(theme);
        }
        if let Some(enabled) = plan.legacy_audio {
            self.legacy.set_audio_enabled(enabled);
        }
        if let Some(theme) = plan.document_theme {
            self.document.apply_theme(theme);
            info!(%theme, "Theme applied to document");
        }
        if let (Some(output), Some(sink)) = (plan.output, &self.sink) {
            sink.apply(output);
        }

        if applied {
            self.last = observed;
        }
        plan
    }

    /// Resync on every preference event and legacy context change
    ///
    /// The task ends when the event bus or the legacy context goes away.
    pub fn spawn(mut self, events: &EventBus) -> JoinHandle<Self> {
        let mut event_rx = events.subscribe();
        let mut legacy_rx = self.legacy.subscribe();

        tokio::spawn(async move {
            self.sync();
            loop {
                tokio::select! {
                    event = event_rx.recv() => match event {
                        Ok(MdrEvent::PreferencesChanged { .. }) | Ok(MdrEvent::PreferencesLoaded { .. }) => {
                            self.sync();
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(n)) => {
                            warn!("Theme sync lagged {} events, resyncing", n);
                            self.sync();
                        }
                        Err(RecvError::Closed) => break,
                    },
                    changed = legacy_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        legacy_rx.borrow_and_update();
                        self.sync();
                    }
                }
            }
            debug!("Theme sync stopped");
            self
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::storage::MemoryLocalStore;
    use crate::theme::LegacyThemeProvider;
    use std::sync::Mutex;

    fn input(legacy: ThemeSnapshot, prefs: ThemeSnapshot) -> SyncInput {
        SyncInput {
            legacy,
            prefs,
            volume: 0.7,
            loading: false,
            legacy_wired: true,
        }
    }

    fn snap(theme: Theme) -> ThemeSnapshot {
        ThemeSnapshot::new(theme, false)
    }

    #[test]
    fn test_loading_produces_empty_plan() {
        let mut i = input(snap(Theme::Dystopia), snap(Theme::Hackers));
        i.loading = true;
        let (plan, observed) = resolve(&i, None, &DocumentElement::new());
        assert!(plan.is_empty());
        assert!(observed.is_none());
    }

    #[test]
    fn test_first_observation_prefers_store() {
        let i = input(snap(Theme::Dystopia), snap(Theme::Neotopia));
        let (plan, _) = resolve(&i, None, &DocumentElement::new());
        assert!(plan.to_prefs.is_empty());
        assert_eq!(plan.legacy_theme, Some(Theme::Neotopia));
        assert_eq!(plan.document_theme, Some(Theme::Neotopia));
    }

    #[test]
    fn test_changed_legacy_side_wins() {
        let mut doc = DocumentElement::new();
        doc.apply_theme(Theme::Hackers);
        let last = Observation {
            legacy: snap(Theme::Hackers),
            prefs: snap(Theme::Hackers),
            output: AudioOutput { enabled: false, volume: 0.7 },
        };

        let i = input(snap(Theme::Dystopia), snap(Theme::Hackers));
        let (plan, observed) = resolve(&i, Some(&last), &doc);
        assert_eq!(plan.to_prefs, PreferencesPatch::theme(Theme::Dystopia));
        assert_eq!(plan.legacy_theme, None);
        assert_eq!(plan.document_theme, Some(Theme::Dystopia));
        assert_eq!(plan.output, None);
        assert_eq!(observed.unwrap().prefs.theme, Theme::Dystopia);
    }

    #[test]
    fn test_both_changed_store_wins() {
        let last = Observation {
            legacy: snap(Theme::Hackers),
            prefs: snap(Theme::Hackers),
            output: AudioOutput { enabled: false, volume: 0.7 },
        };
        let i = input(snap(Theme::Dystopia), snap(Theme::Neotopia));
        let (plan, _) = resolve(&i, Some(&last), &DocumentElement::new());
        assert!(plan.to_prefs.is_empty());
        assert_eq!(plan.legacy_theme, Some(Theme::Neotopia));
    }

    #[test]
    fn test_unwired_legacy_skipped_without_oscillation() {
        let mut i = input(snap(Theme::Dystopia), snap(Theme::Neotopia));
        i.legacy_wired = false;
        let mut doc = DocumentElement::new();

        let (plan, observed) = resolve(&i, None, &doc);
        assert_eq!(plan.legacy_theme, None);
        doc.apply_theme(plan.document_theme.unwrap());

        let (plan, _) = resolve(&i, observed.as_ref(), &doc);
        assert!(plan.is_empty());
    }

    struct RecordingSink(Mutex<Vec<AudioOutput>>);

    impl VolumeSink for RecordingSink {
        fn apply(&self, output: AudioOutput) {
            self.0.lock().unwrap().push(output);
        }
    }

    #[tokio::test]
    async fn test_adapter_converges_and_terminates() {
        let local = Arc::new(MemoryLocalStore::new());
        let store = PreferenceStore::new(local.clone(), None, Arc::new(Session::new()));
        store.load().await;
        let legacy = Arc::new(LegacyThemeProvider::new(local));
        let sink = Arc::new(RecordingSink(Mutex::new(Vec::new())));
        let mut sync = ThemeSync::new(store.clone(), legacy.clone()).with_volume_sink(sink.clone());

        sync.sync();
        assert_eq!(sync.document().theme(), Some(Theme::Hackers));

        legacy.set_theme(Theme::Dystopia);
        let plan = sync.sync();
        assert_eq!(plan.to_prefs.theme, Some(Theme::Dystopia));

        assert_eq!(store.theme(), Theme::Dystopia);
        assert_eq!(legacy.theme(), Theme::Dystopia);
        assert_eq!(sync.document().theme_classes(), vec![Theme::Dystopia]);

        // Stable input: no further writes on either side
        let legacy_writes = legacy.write_count();
        for _ in 0..5 {
            assert!(sync.sync().is_empty());
        }
        assert_eq!(legacy.write_count(), legacy_writes);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_store_change_reaches_legacy_and_sink() {
        let local = Arc::new(MemoryLocalStore::new());
        let store = PreferenceStore::new(local, None, Arc::new(Session::new()));
        store.load().await;
        let legacy = Arc::new(LegacyThemeProvider::detached());
        let sink = Arc::new(RecordingSink(Mutex::new(Vec::new())));
        let mut sync = ThemeSync::new(store.clone(), legacy.clone()).with_volume_sink(sink.clone());
        sync.sync();

        store.set_audio_enabled(true).unwrap();
        store.set_volume(0.25).unwrap();
        sync.sync();

        assert!(legacy.audio_enabled());
        assert_eq!(
            sink.0.lock().unwrap().last().copied(),
            Some(AudioOutput { enabled: true, volume: 0.25 })
        );
    }
}
