//! Legacy single-purpose theme context

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::ThemeSnapshot;
use crate::preferences::Theme;
use crate::storage::LocalStore;

const THEME_KEY: &str = "theme";
const AUDIO_KEY: &str = "audioEnabled";

/// Theme/audio context consumed by components that predate the preference store
pub trait LegacyThemeContext: Send + Sync {
    fn snapshot(&self) -> ThemeSnapshot;

    /// False until the context can accept writes; writes before then are ignored
    fn is_wired(&self) -> bool;

    fn set_theme(&self, theme: Theme);

    fn set_audio_enabled(&self, enabled: bool);

    /// Notified whenever the snapshot changes
    fn subscribe(&self) -> watch::Receiver<ThemeSnapshot>;
}

/// Parse a stored theme value, accepting names used by older builds
fn parse_stored_theme(raw: &str) -> Option<Theme> {
    match raw.trim() {
        "synthwave-noir" => Some(Theme::Hackers),
        "terminal-mono" => Some(Theme::Dystopia),
        "paper-ledger" => Some(Theme::Neotopia),
        other => other.parse().ok(),
    }
}

/// Local-storage backed legacy context
///
/// Reads `theme` and `audioEnabled` once on creation; an invalid stored
/// theme falls back to the default. Writes update the snapshot, persist the
/// changed key, and notify subscribers only when the value changed.
pub struct LegacyThemeProvider {
    tx: watch::Sender<ThemeSnapshot>,
    local: Option<Arc<dyn LocalStore>>,
    wired: AtomicBool,
    writes: AtomicUsize,
}

impl std::fmt::Debug for LegacyThemeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyThemeProvider")
            .field("snapshot", &*self.tx.borrow())
            .field("wired", &self.is_wired())
            .finish()
    }
}

impl LegacyThemeProvider {
    /// Context hydrated from `local`, accepting writes immediately
    pub fn new(local: Arc<dyn LocalStore>) -> Self {
        let provider = Self::unwired(local);
        provider.wire();
        provider
    }

    /// Context hydrated from `local` that ignores writes until [`wire`](Self::wire)
    pub fn unwired(local: Arc<dyn LocalStore>) -> Self {
        let theme = match local.get_item(THEME_KEY) {
            Ok(Some(raw)) => parse_stored_theme(&raw).unwrap_or_else(|| {
                warn!("Invalid theme name: {}, falling back to {}", raw, Theme::default());
                Theme::default()
            }),
            Ok(None) => Theme::default(),
            Err(e) => {
                warn!("Error reading stored theme: {}", e);
                Theme::default()
            }
        };
        let audio_enabled = matches!(local.get_item(AUDIO_KEY), Ok(Some(raw)) if raw == "true");

        let (tx, _) = watch::channel(ThemeSnapshot::new(theme, audio_enabled));
        Self {
            tx,
            local: Some(local),
            wired: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    /// In-memory context with default values
    pub fn detached() -> Self {
        let (tx, _) = watch::channel(ThemeSnapshot::default());
        Self {
            tx,
            local: None,
            wired: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn wire(&self) {
        self.wired.store(true, Ordering::SeqCst);
    }

    pub fn theme(&self) -> Theme {
        self.tx.borrow().theme
    }

    pub fn audio_enabled(&self) -> bool {
        self.tx.borrow().audio_enabled
    }

    pub fn toggle_theme(&self) {
        let next = self.theme().next();
        self.set_theme(next);
    }

    /// Number of writes that changed the snapshot
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn update(&self, apply: impl FnOnce(&mut ThemeSnapshot) -> bool) -> bool {
        if !self.is_wired() {
            debug!("Legacy theme context not wired, ignoring write");
            return false;
        }
        let changed = self.tx.send_if_modified(apply);
        if changed {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        changed
    }

    fn persist(&self, key: &str, value: &str) {
        if let Some(local) = &self.local {
            if let Err(e) = local.set_item(key, value) {
                warn!("Could not save {} to local store: {}", key, e);
            }
        }
    }
}

impl LegacyThemeContext for LegacyThemeProvider {
    fn snapshot(&self) -> ThemeSnapshot {
        *self.tx.borrow()
    }

    fn is_wired(&self) -> bool {
        self.wired.load(Ordering::SeqCst)
    }

    fn set_theme(&self, theme: Theme) {
        let changed = self.update(|s| {
            let changed = s.theme != theme;
            s.theme = theme;
            changed
        });
        if changed {
            debug!(%theme, "Legacy theme set");
            self.persist(THEME_KEY, theme.as_str());
        }
    }

    fn set_audio_enabled(&self, enabled: bool) {
        let changed = self.update(|s| {
            let changed = s.audio_enabled != enabled;
            s.audio_enabled = enabled;
            changed
        });
        if changed {
            self.persist(AUDIO_KEY, if enabled { "true" } else { "false" });
        }
    }

    fn subscribe(&self) -> watch::Receiver<ThemeSnapshot> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryLocalStore;

    #[test]
    fn test_hydrates_from_local_store() {
        let local = Arc::new(MemoryLocalStore::new());
        local.set_item(THEME_KEY, "neotopia").unwrap();
        local.set_item(AUDIO_KEY, "true").unwrap();

        let ctx = LegacyThemeProvider::new(local);
        assert_eq!(ctx.snapshot(), ThemeSnapshot::new(Theme::Neotopia, true));
    }

    #[test]
    fn test_invalid_and_old_theme_names() {
        let local = Arc::new(MemoryLocalStore::new());
        local.set_item(THEME_KEY, "vaporwave").unwrap();
        assert_eq!(LegacyThemeProvider::new(local.clone()).theme(), Theme::Hackers);

        local.set_item(THEME_KEY, "terminal-mono").unwrap();
        assert_eq!(LegacyThemeProvider::new(local).theme(), Theme::Dystopia);
    }

    #[test]
    fn test_writes_persist_and_count_changes_only() {
        let local = Arc::new(MemoryLocalStore::new());
        let ctx = LegacyThemeProvider::new(local.clone());

        ctx.toggle_theme();
        ctx.set_theme(Theme::Dystopia);
        ctx.set_audio_enabled(true);

        assert_eq!(ctx.write_count(), 2);
        assert_eq!(local.get_item(THEME_KEY).unwrap().as_deref(), Some("dystopia"));
        assert_eq!(local.get_item(AUDIO_KEY).unwrap().as_deref(), Some("true"));
    }

    #[test]
    fn test_unwired_ignores_writes() {
        let ctx = LegacyThemeProvider::unwired(Arc::new(MemoryLocalStore::new()));
        ctx.set_theme(Theme::Neotopia);
        assert_eq!(ctx.theme(), Theme::Hackers);
        assert_eq!(ctx.write_count(), 0);

        ctx.wire();
        ctx.set_theme(Theme::Neotopia);
        assert_eq!(ctx.theme(), Theme::Neotopia);
    }

    #[tokio::test]
    async fn test_subscribers_notified_on_change() {
        let ctx = LegacyThemeProvider::detached();
        let mut rx = ctx.subscribe();
        ctx.set_audio_enabled(true);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().audio_enabled);

        ctx.set_audio_enabled(true);
        assert!(!rx.has_changed().unwrap());
    }
}
