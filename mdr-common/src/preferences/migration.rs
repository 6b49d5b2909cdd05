//! One-time migration of locally stored preferences into the remote store

use serde::Serialize;
use tracing::{debug, info, warn};

use super::store::{PreferenceStore, PREFERENCES_TABLE};
use super::UserPreferences;
use crate::events::MdrEvent;
use crate::session::SessionUser;
use crate::storage::USER_ID_FIELD;
use crate::{Error, Result};

/// What `migrate_from_local` did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MigrationOutcome {
    /// Remote record created from local values
    Created,
    /// User already had a remote record; nothing written
    RemoteExists,
    /// No local preferences were ever saved
    NothingToMigrate,
    /// This store already migrated the user; no remote call made
    AlreadyMigrated,
}

impl PreferenceStore {
    /// Seed the user's remote record from local preferences if it does not exist
    ///
    /// Remote wins: an existing record is never overwritten. Calling this
    /// again for the same user after it created or found a record does not
    /// touch the remote store.
    pub async fn migrate_from_local(&self, user: &SessionUser) -> Result<MigrationOutcome> {
        if self.migrated(&user.id) {
            debug!(user_id = %user.id, "Preferences already migrated");
            return Ok(MigrationOutcome::AlreadyMigrated);
        }

        let remote = self
            .inner
            .remote
            .clone()
            .ok_or_else(|| Error::PersistenceUnavailable("no remote store configured".to_string()))?;

        let existing = remote.select_one(PREFERENCES_TABLE, &user.id).await.map_err(|e| {
            warn!(user_id = %user.id, "Could not check remote preferences: {}", e);
            self.inner.state().remote_available = false;
            e
        })?;
        if existing.is_some() {
            self.mark_migrated(&user.id);
            return Ok(MigrationOutcome::RemoteExists);
        }

        let Some(local) = self.inner.read_local() else {
            debug!(user_id = %user.id, "No local preferences to migrate");
            return Ok(MigrationOutcome::NothingToMigrate);
        };

        let mut prefs = UserPreferences::default();
        local.apply_to(&mut prefs);
        prefs.display_name = prefs.display_name.or_else(|| user.display_name.clone());
        prefs.avatar = prefs.avatar.or_else(|| user.avatar.clone());
        prefs.color = prefs.color.or_else(|| user.color.clone());

        let mut record = prefs.to_record()?;
        record.insert(USER_ID_FIELD.to_string(), serde_json::Value::String(user.id.clone()));

        if let Err(e) = remote.insert_one(PREFERENCES_TABLE, record).await {
            // A queued update may have created the record in the meantime
            if let Ok(Some(_)) = remote.select_one(PREFERENCES_TABLE, &user.id).await {
                self.mark_migrated(&user.id);
                return Ok(MigrationOutcome::RemoteExists);
            }
            warn!(user_id = %user.id, "Preference migration failed: {}", e);
            return Err(e);
        }

        self.mark_migrated(&user.id);
        info!(user_id = %user.id, theme = %prefs.theme, "Migrated local preferences to remote store");
        self.inner.publish(MdrEvent::PreferencesMigrated {
            user_id: user.id.clone(),
            timestamp: chrono::Utc::now(),
        });
        Ok(MigrationOutcome::Created)
    }

    fn migrated(&self, user_id: &str) -> bool {
        self.inner
            .migrated
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(user_id)
    }

    fn mark_migrated(&self, user_id: &str) {
        self.inner
            .migrated
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(user_id.to_string());
    }
}
