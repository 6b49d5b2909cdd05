//! Composition root
//!
//! Owns the registry, the preference store and the theme adapter for one
//! process and wires them to the persisted stores under the root folder.

use anyhow::{Context, Result};
use mdr_common::config::{AppPaths, TomlConfig};
use mdr_common::events::{EventBus, MdrEvent};
use mdr_common::storage::{FileLocalStore, LocalStore, RemoteStore};
use mdr_common::theme::{AudioOutput, LegacyThemeProvider, ThemeSync, VolumeSink};
use mdr_common::{ModuleRegistry, PreferenceStore, Session, SessionUser};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::modules::register_builtin_modules;

/// How long sign-in waits for the session listener to reload preferences
const SIGN_IN_TIMEOUT: Duration = Duration::from_secs(5);

/// Audio output that only reports what it would play at
struct TracingVolumeSink;

impl VolumeSink for TracingVolumeSink {
    fn apply(&self, output: AudioOutput) {
        info!(enabled = output.enabled, volume = output.volume, "Audio output updated");
    }
}

pub struct App {
    pub events: Arc<EventBus>,
    pub session: Arc<Session>,
    pub registry: ModuleRegistry,
    pub prefs: PreferenceStore,
    pub legacy: Arc<LegacyThemeProvider>,
    pub theme_sync: ThemeSync,
    listener: JoinHandle<()>,
}

impl App {
    /// Open the stores under `paths` and build every component
    ///
    /// An unusable database degrades to local-only preferences.
    pub async fn open(paths: &AppPaths, config: &TomlConfig) -> Result<Self> {
        paths.ensure_root_exists()?;

        let local: Arc<dyn LocalStore> = Arc::new(
            FileLocalStore::open(&paths.local_store_path)
                .with_context(|| format!("opening {}", paths.local_store_path.display()))?,
        );
        let remote = open_remote(paths).await;

        let events = Arc::new(EventBus::new(config.event_bus_capacity()));
        let session = Arc::new(Session::new().with_events(events.clone()));

        let mut registry = ModuleRegistry::with_local_store(local.clone()).with_events(events.clone());
        if let Err(e) = register_builtin_modules(&mut registry) {
            warn!("Some built-in modules were not registered: {}", e);
        }

        let prefs = PreferenceStore::with_events(local.clone(), remote, session.clone(), Some(events.clone()));
        prefs.load().await;
        let listener = prefs.spawn_session_listener();

        let legacy = Arc::new(LegacyThemeProvider::new(local));
        let mut theme_sync =
            ThemeSync::new(prefs.clone(), legacy.clone()).with_volume_sink(Arc::new(TracingVolumeSink));
        theme_sync.sync();

        Ok(Self {
            events,
            session,
            registry,
            prefs,
            legacy,
            theme_sync,
            listener,
        })
    }

    /// Sign in and wait until preferences are migrated and reloaded
    pub async fn sign_in(&mut self, user: SessionUser) -> Result<()> {
        let mut rx = self.events.subscribe();
        let user_id = user.id.clone();
        self.session.sign_in(user);

        let reloaded = tokio::time::timeout(SIGN_IN_TIMEOUT, async {
            loop {
                match rx.recv().await {
                    Ok(MdrEvent::PreferencesLoaded { remote, .. }) => return Ok(remote),
                    Ok(_) => {}
                    Err(e) => return Err(e),
                }
            }
        })
        .await
        .context("timed out waiting for preferences to load")?;

        match reloaded {
            Ok(true) => info!(user_id = %user_id, "Signed in"),
            Ok(false) => warn!(user_id = %user_id, "Signed in, remote preferences unavailable"),
            Err(e) => warn!("Missed preference reload notification: {}", e),
        }
        self.theme_sync.sync();
        Ok(())
    }

    /// Wait for queued remote writes, then stop background tasks
    pub async fn shutdown(self) {
        self.prefs.flush().await;
        self.listener.abort();
    }
}

#[cfg(feature = "sqlite")]
async fn open_remote(paths: &AppPaths) -> Option<Arc<dyn RemoteStore>> {
    use mdr_common::db::{init_database, SqliteRemoteStore};

    match init_database(&paths.database_path).await {
        Ok(pool) => Some(Arc::new(SqliteRemoteStore::new(pool))),
        Err(e) => {
            warn!("Remote store unavailable, using local preferences only: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "sqlite"))]
async fn open_remote(_paths: &AppPaths) -> Option<Arc<dyn RemoteStore>> {
    warn!("Built without SQLite support, using local preferences only");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdr_common::Theme;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_sign_in_and_persist() {
        let dir = TempDir::new().unwrap();
        let config = TomlConfig::default();
        let paths = AppPaths::resolve(dir.path().join("root"), &config);

        let mut app = App::open(&paths, &config).await.unwrap();
        assert_eq!(app.registry.enabled_modules().len(), 2);
        assert_eq!(app.theme_sync.document().theme(), Some(Theme::Hackers));

        app.prefs.set_theme(Theme::Neotopia).unwrap();
        app.sign_in(SessionUser::new("u1")).await.unwrap();
        assert_eq!(app.prefs.theme(), Theme::Neotopia);
        assert_eq!(app.legacy.theme(), Theme::Neotopia);
        app.registry.set_module_enabled("settings", false).unwrap();
        app.shutdown().await;

        // Second process: module toggle and theme come back from disk
        let app = App::open(&paths, &config).await.unwrap();
        assert!(!app.registry.is_module_enabled("settings"));
        assert_eq!(app.prefs.theme(), Theme::Neotopia);
        app.shutdown().await;
    }
}
