//! Persisted module feature flags
//!
//! Runtime enable/disable toggles survive restarts by being written to the
//! local store as a single JSON object: `{"module_<id>": bool, ...}`.
//! Unrelated keys in that object are preserved.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::storage::LocalStore;

/// Local store key holding the flag object
pub const FEATURE_FLAGS_KEY: &str = "featureFlags";

fn flag_key(module_id: &str) -> String {
    format!("module_{}", module_id)
}

/// Feature flag table, optionally backed by a local store
#[derive(Default)]
pub struct FeatureFlags {
    values: BTreeMap<String, bool>,
    store: Option<Arc<dyn LocalStore>>,
}

impl std::fmt::Debug for FeatureFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureFlags")
            .field("values", &self.values)
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl FeatureFlags {
    /// Load flags from `store`; unreadable or malformed data is logged and ignored
    pub fn load(store: Arc<dyn LocalStore>) -> Self {
        let values = match store.get_item(FEATURE_FLAGS_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<BTreeMap<String, serde_json::Value>>(&raw) {
                Ok(map) => map
                    .into_iter()
                    .map(|(k, v)| {
                        let enabled = match v {
                            serde_json::Value::Bool(b) => b,
                            serde_json::Value::Null => false,
                            serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                            serde_json::Value::String(s) => !s.is_empty(),
                            _ => true,
                        };
                        (k, enabled)
                    })
                    .collect(),
                Err(e) => {
                    warn!("Error loading feature flags from local store: {}", e);
                    BTreeMap::new()
                }
            },
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!("Error loading feature flags from local store: {}", e);
                BTreeMap::new()
            }
        };
        Self {
            values,
            store: Some(store),
        }
    }

    /// Persisted state for a module, if any
    pub fn module_enabled(&self, module_id: &str) -> Option<bool> {
        self.values.get(&flag_key(module_id)).copied()
    }

    /// Record a module's state; persists only when the value changes
    pub fn set_module_enabled(&mut self, module_id: &str, enabled: bool) {
        let previous = self.values.insert(flag_key(module_id), enabled);
        if previous != Some(enabled) {
            self.save();
        }
    }

    fn save(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let result = serde_json::to_string(&self.values)
            .map_err(crate::Error::from)
            .and_then(|json| store.set_item(FEATURE_FLAGS_KEY, &json));
        if let Err(e) = result {
            warn!("Error saving feature flags to local store: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryLocalStore;

    #[test]
    fn test_round_trip_through_store() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryLocalStore::new());
        let mut flags = FeatureFlags::load(store.clone());
        assert_eq!(flags.module_enabled("formulations"), None);

        flags.set_module_enabled("formulations", false);
        let raw = store.get_item(FEATURE_FLAGS_KEY).unwrap().unwrap();
        assert_eq!(raw, r#"{"module_formulations":false}"#);

        let reloaded = FeatureFlags::load(store);
        assert_eq!(reloaded.module_enabled("formulations"), Some(false));
        assert_eq!(reloaded.module_enabled("settings"), None);
    }

    #[test]
    fn test_truthy_values_coerced() {
        let store = Arc::new(MemoryLocalStore::new());
        store
            .set_item(FEATURE_FLAGS_KEY, r#"{"module_a": 1, "module_b": 0, "module_c": "yes"}"#)
            .unwrap();
        let flags = FeatureFlags::load(store);
        assert_eq!(flags.module_enabled("a"), Some(true));
        assert_eq!(flags.module_enabled("b"), Some(false));
        assert_eq!(flags.module_enabled("c"), Some(true));
    }

    #[test]
    fn test_malformed_flags_ignored() {
        let store = Arc::new(MemoryLocalStore::new());
        store.set_item(FEATURE_FLAGS_KEY, "not json").unwrap();
        let flags = FeatureFlags::load(store.clone());
        assert_eq!(flags.module_enabled("formulations"), None);

        // The malformed value is left alone until a flag is written
        assert_eq!(store.get_item(FEATURE_FLAGS_KEY).unwrap().as_deref(), Some("not json"));
    }
}
