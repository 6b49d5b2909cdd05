//! Module registry owned by the composition root

use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{create_module, FeatureFlags, ModuleDescriptor, ModuleRoute, ModuleSpec, NavigationItem};
use crate::events::{EventBus, MdrEvent};
use crate::storage::LocalStore;
use crate::{Error, Result};

/// Table of registered modules, in registration order
///
/// Writes take `&mut self` and swap in a fully built descriptor, so a reader
/// never observes a partially registered module. Every query is computed
/// from current state; callers re-query instead of caching lists.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: IndexMap<String, Arc<ModuleDescriptor>>,
    flags: FeatureFlags,
    events: Option<Arc<EventBus>>,
}

impl ModuleRegistry {
    /// Empty registry without persisted flags
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty registry whose runtime toggles are persisted in `store`
    pub fn with_local_store(store: Arc<dyn LocalStore>) -> Self {
        Self {
            flags: FeatureFlags::load(store),
            ..Default::default()
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Insert or overwrite the module keyed by its id
    ///
    /// An overwritten module keeps its display position. On the first
    /// registration of an id a persisted toggle from an earlier run takes
    /// precedence over the descriptor's default; re-registering an id that is
    /// already present makes the new descriptor authoritative.
    pub fn register_module(&mut self, descriptor: ModuleDescriptor) {
        let id = descriptor.id().to_string();
        let overwritten = self.modules.contains_key(&id);
        if overwritten {
            warn!("Module with ID {} is already registered. Overwriting.", id);
        }

        let enabled = if overwritten {
            descriptor.is_enabled()
        } else {
            self.flags.module_enabled(&id).unwrap_or(descriptor.is_enabled())
        };
        self.flags.set_module_enabled(&id, enabled);

        let descriptor = if enabled == descriptor.is_enabled() {
            descriptor
        } else {
            descriptor.with_enabled(enabled)
        };
        info!("Module \"{}\" ({}) registered successfully", descriptor.name(), id);
        self.modules.insert(id.clone(), Arc::new(descriptor));

        self.publish(MdrEvent::ModuleRegistered {
            module_id: id,
            overwritten,
            enabled,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Validate `spec` and register it
    ///
    /// A rejected spec is logged and leaves the registry untouched.
    pub fn register_spec(&mut self, spec: ModuleSpec) -> Result<()> {
        match create_module(spec) {
            Ok(descriptor) => {
                self.register_module(descriptor);
                Ok(())
            }
            Err(e) => {
                error!("Module registration rejected: {}", e);
                Err(e)
            }
        }
    }

    pub fn get_module(&self, id: &str) -> Option<Arc<ModuleDescriptor>> {
        self.modules.get(id).cloned()
    }

    /// All registered modules, enabled or not
    pub fn modules(&self) -> Vec<Arc<ModuleDescriptor>> {
        self.modules.values().cloned().collect()
    }

    /// Enabled modules in registration order
    pub fn enabled_modules(&self) -> Vec<Arc<ModuleDescriptor>> {
        self.modules.values().filter(|m| m.is_enabled()).cloned().collect()
    }

    /// False for unknown ids
    pub fn is_module_enabled(&self, id: &str) -> bool {
        self.modules.get(id).is_some_and(|m| m.is_enabled())
    }

    /// Toggle a registered module at runtime and persist the choice
    pub fn set_module_enabled(&mut self, id: &str, enabled: bool) -> Result<()> {
        let current = self
            .modules
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("module {}", id)))?;

        if current.is_enabled() != enabled {
            *current = Arc::new(current.with_enabled(enabled));
            info!(module = id, enabled, "Module toggled");
            self.publish(MdrEvent::ModuleToggled {
                module_id: id.to_string(),
                enabled,
                timestamp: chrono::Utc::now(),
            });
        }
        self.flags.set_module_enabled(id, enabled);
        Ok(())
    }

    /// Top-level navigation items of all enabled modules
    pub fn navigation_items(&self) -> Vec<NavigationItem> {
        self.modules
            .values()
            .filter(|m| m.is_enabled())
            .flat_map(|m| m.navigation_items().iter().cloned())
            .collect()
    }

    /// Routes of all enabled modules
    pub fn routes(&self) -> Vec<ModuleRoute> {
        self.modules
            .values()
            .filter(|m| m.is_enabled())
            .flat_map(|m| m.routes().iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    fn publish(&self, event: MdrEvent) {
        if let Some(events) = &self.events {
            events.emit_lossy(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{ComponentRef, ComponentRole, ModuleRoute, FEATURE_FLAGS_KEY};
    use crate::storage::MemoryLocalStore;

    fn spec(id: &str, name: &str, enabled: bool) -> ModuleSpec {
        ModuleSpec::new(id, name)
            .icon("🧪")
            .enabled(enabled)
            .route(ModuleRoute::new(format!("/{}", id), ComponentRef::placeholder("List")))
            .navigation_item(NavigationItem::new(format!("{}-nav", id), name, "📝"))
            .component(ComponentRole::List, ComponentRef::placeholder("List"))
    }

    fn module(id: &str, name: &str, enabled: bool) -> ModuleDescriptor {
        create_module(spec(id, name, enabled)).unwrap()
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = ModuleRegistry::new();
        registry.register_module(module("test-module-1", "Test Module 1", true));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_module("test-module-1").unwrap().name(), "Test Module 1");
        assert!(registry.get_module("non-existent").is_none());
    }

    #[test]
    fn test_overwrite_same_id_keeps_single_entry() {
        let mut registry = ModuleRegistry::new();
        registry.register_module(module("a", "First", true));
        registry.register_module(module("b", "Other", true));
        registry.register_module(module("a", "Updated Module", true));

        let enabled = registry.enabled_modules();
        assert_eq!(enabled.len(), 2);
        assert_eq!(enabled[0].id(), "a");
        assert_eq!(enabled[0].name(), "Updated Module");
        assert_eq!(enabled[1].id(), "b");
    }

    #[test]
    fn test_disabled_modules_excluded() {
        let mut registry = ModuleRegistry::new();
        registry.register_module(module("test-module-1", "One", true));
        registry.register_module(module("test-module-2", "Two", false));

        let enabled = registry.enabled_modules();
        assert_eq!(enabled.len(), 1);
        assert!(enabled.iter().all(|m| m.is_enabled()));
        assert_eq!(registry.modules().len(), 2);

        assert!(registry.is_module_enabled("test-module-1"));
        assert!(!registry.is_module_enabled("test-module-2"));
        assert!(!registry.is_module_enabled("non-existent"));
    }

    #[test]
    fn test_reregister_flips_membership() {
        let mut registry = ModuleRegistry::new();
        registry.register_module(module("m", "M", true));
        assert!(registry.is_module_enabled("m"));

        registry.register_module(module("m", "M", false));
        assert!(!registry.is_module_enabled("m"));
        assert!(registry.enabled_modules().is_empty());

        registry.register_module(module("m", "M", true));
        assert_eq!(registry.enabled_modules().len(), 1);
    }

    #[test]
    fn test_set_module_enabled() {
        let mut registry = ModuleRegistry::new();
        registry.register_module(module("one", "One", true));
        registry.register_module(module("two", "Two", false));

        registry.set_module_enabled("one", false).unwrap();
        registry.set_module_enabled("two", true).unwrap();
        assert!(!registry.is_module_enabled("one"));
        assert!(registry.is_module_enabled("two"));

        let err = registry.set_module_enabled("ghost", true).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_persisted_toggle_applies_on_first_registration() {
        let store = Arc::new(MemoryLocalStore::new());
        {
            let mut registry = ModuleRegistry::with_local_store(store.clone());
            registry.register_module(module("formulations", "Formulations", true));
            registry.set_module_enabled("formulations", false).unwrap();
        }
        assert!(store.get_item(FEATURE_FLAGS_KEY).unwrap().unwrap().contains("module_formulations"));

        let mut registry = ModuleRegistry::with_local_store(store);
        registry.register_module(module("formulations", "Formulations", true));
        assert!(!registry.is_module_enabled("formulations"));
    }

    #[test]
    fn test_navigation_and_routes_from_enabled_only() {
        let mut registry = ModuleRegistry::new();
        registry.register_module(module("test1", "Test 1", true));
        registry.register_module(module("test2", "Test 2", false));

        let nav = registry.navigation_items();
        assert_eq!(nav.len(), 1);
        assert_eq!(nav[0].id, "test1-nav");

        let routes = registry.routes();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].path, "/test1");
    }

    #[test]
    fn test_rejected_spec_leaves_registry_untouched() {
        let mut registry = ModuleRegistry::new();
        registry.register_module(module("good", "Good", true));

        let bad = ModuleSpec::new("bad", "Bad");
        assert!(matches!(registry.register_spec(bad), Err(Error::Validation(_))));
        assert_eq!(registry.len(), 1);
        assert!(registry.get_module("bad").is_none());
    }

    #[test]
    fn test_registry_events() {
        let bus = Arc::new(EventBus::new(8));
        let mut rx = bus.subscribe();
        let mut registry = ModuleRegistry::new().with_events(bus.clone());

        registry.register_module(module("a", "A", true));
        registry.set_module_enabled("a", false).unwrap();
        // No change, no event
        registry.set_module_enabled("a", false).unwrap();

        match rx.try_recv().unwrap() {
            MdrEvent::ModuleRegistered { module_id, overwritten, .. } => {
                assert_eq!(module_id, "a");
                assert!(!overwritten);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(rx.try_recv().unwrap().event_type(), "ModuleToggled");
        assert!(rx.try_recv().is_err());
    }
}
