//! Theme projection and the legacy theme context bridge
//!
//! Older consumers read theme and audio state from a single-purpose
//! [`LegacyThemeContext`]; newer ones read the [`PreferenceStore`]. The
//! [`ThemeSync`] adapter keeps both in agreement and projects the effective
//! theme onto a [`DocumentElement`].
//!
//! [`PreferenceStore`]: crate::preferences::PreferenceStore

mod document;
mod legacy;
mod sync;

pub use document::{DocumentElement, THEME_ATTRIBUTE};
pub use legacy::{LegacyThemeContext, LegacyThemeProvider};
pub use sync::{resolve, AudioOutput, Observation, SyncInput, SyncPlan, ThemeSync, VolumeSink};

use serde::{Deserialize, Serialize};

use crate::preferences::{Theme, UserPreferences};

/// The fields shared by the legacy context and the preference store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThemeSnapshot {
    pub theme: Theme,
    pub audio_enabled: bool,
}

impl ThemeSnapshot {
    pub fn new(theme: Theme, audio_enabled: bool) -> Self {
        Self { theme, audio_enabled }
    }
}

impl From<&UserPreferences> for ThemeSnapshot {
    fn from(prefs: &UserPreferences) -> Self {
        Self {
            theme: prefs.theme,
            audio_enabled: prefs.audio_enabled,
        }
    }
}
