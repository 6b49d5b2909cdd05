//! User preferences
//!
//! [`UserPreferences`] is the unified settings record (theme, audio, view and
//! developer flags, profile fields). [`PreferenceStore`] owns the in-memory
//! copy and reconciles it with local and remote persistence.
//!
//! Field names double as remote column names and local JSON keys; the theme
//! wire values double as CSS class names. Renaming either requires migrating
//! persisted records.

mod migration;
mod outbox;
mod store;

pub use migration::MigrationOutcome;
pub use outbox::{IntentStatus, OutboxEntry, PendingWrite};
pub use store::{LoadPhase, PreferenceStore, PreferencesState, LOCAL_PREFERENCES_KEY, PREFERENCES_TABLE};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::storage::Record;
use crate::{Error, Result};

/// The three built-in themes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Hackers,
    Dystopia,
    Neotopia,
}

impl Theme {
    /// Toggle order
    pub const ALL: [Theme; 3] = [Theme::Hackers, Theme::Dystopia, Theme::Neotopia];

    /// Wire value, also the document class name
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Hackers => "hackers",
            Theme::Dystopia => "dystopia",
            Theme::Neotopia => "neotopia",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Theme::Hackers => "Hackers Terminal",
            Theme::Dystopia => "Dystopian Noir",
            Theme::Neotopia => "Neotopia Light",
        }
    }

    /// Next theme in the fixed cycle hackers → dystopia → neotopia → hackers
    pub fn next(&self) -> Theme {
        match self {
            Theme::Hackers => Theme::Dystopia,
            Theme::Dystopia => Theme::Neotopia,
            Theme::Neotopia => Theme::Hackers,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Theme::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| Error::InvalidInput(format!("unknown theme: {}", s)))
    }
}

/// Unified user settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub theme: Theme,
    pub audio_enabled: bool,
    /// Output volume in [0.0, 1.0]
    pub volume: f32,
    pub default_view: String,
    pub debug_mode: bool,
    pub show_experimental: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            theme: Theme::Hackers,
            audio_enabled: false,
            volume: 0.7,
            default_view: "formulations".to_string(),
            debug_mode: false,
            show_experimental: false,
            display_name: None,
            avatar: None,
            color: None,
        }
    }
}

impl UserPreferences {
    pub fn to_record(&self) -> Result<Record> {
        to_record(self)
    }
}

/// Partial update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferencesPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_view: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_experimental: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

fn valid_volume(volume: f32) -> bool {
    volume.is_finite() && (0.0..=1.0).contains(&volume)
}

impl PreferencesPatch {
    pub fn theme(theme: Theme) -> Self {
        Self {
            theme: Some(theme),
            ..Default::default()
        }
    }

    pub fn audio_enabled(enabled: bool) -> Self {
        Self {
            audio_enabled: Some(enabled),
            ..Default::default()
        }
    }

    pub fn volume(volume: f32) -> Self {
        Self {
            volume: Some(volume),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Reject values outside their domain
    pub fn validate(&self) -> Result<()> {
        if let Some(volume) = self.volume {
            if !valid_volume(volume) {
                return Err(Error::InvalidInput(format!(
                    "volume: value {} out of range [0.0, 1.0]",
                    volume
                )));
            }
        }
        Ok(())
    }

    pub fn apply_to(&self, prefs: &mut UserPreferences) {
        if let Some(theme) = self.theme {
            prefs.theme = theme;
        }
        if let Some(enabled) = self.audio_enabled {
            prefs.audio_enabled = enabled;
        }
        if let Some(volume) = self.volume {
            prefs.volume = volume;
        }
        if let Some(view) = &self.default_view {
            prefs.default_view = view.clone();
        }
        if let Some(debug) = self.debug_mode {
            prefs.debug_mode = debug;
        }
        if let Some(show) = self.show_experimental {
            prefs.show_experimental = show;
        }
        if let Some(name) = &self.display_name {
            prefs.display_name = Some(name.clone());
        }
        if let Some(avatar) = &self.avatar {
            prefs.avatar = Some(avatar.clone());
        }
        if let Some(color) = &self.color {
            prefs.color = Some(color.clone());
        }
    }

    /// Names of the fields this patch sets
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        macro_rules! collect {
            ($($field:ident),*) => {
                $(if self.$field.is_some() { fields.push(stringify!($field)); })*
            };
        }
        collect!(theme, audio_enabled, volume, default_view, debug_mode, show_experimental, display_name, avatar, color);
        fields
    }

    pub fn to_record(&self) -> Result<Record> {
        to_record(self)
    }

    /// Decode a stored record field by field
    ///
    /// Unknown columns are ignored; a known column with an unusable value
    /// (wrong type, unknown theme, volume out of range) is logged and dropped
    /// so the rest of the record still applies.
    pub fn from_record(record: &Record) -> Self {
        fn field<T: serde::de::DeserializeOwned>(record: &Record, key: &str) -> Option<T> {
            let value = record.get(key)?;
            if value.is_null() {
                return None;
            }
            match serde_json::from_value(value.clone()) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Ignoring stored preference {}={}: {}", key, value, e);
                    None
                }
            }
        }

        let volume = field::<f32>(record, "volume").filter(|v| {
            let ok = valid_volume(*v);
            if !ok {
                warn!("Ignoring stored preference volume={}: out of range", v);
            }
            ok
        });

        Self {
            theme: field(record, "theme"),
            audio_enabled: field(record, "audio_enabled"),
            volume,
            default_view: field(record, "default_view"),
            debug_mode: field(record, "debug_mode"),
            show_experimental: field(record, "show_experimental"),
            display_name: field(record, "display_name"),
            avatar: field(record, "avatar"),
            color: field(record, "color"),
        }
    }
}

fn to_record<T: Serialize>(value: &T) -> Result<Record> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(Error::Internal(format!("expected a JSON object, got {}", other))),
    }
}
