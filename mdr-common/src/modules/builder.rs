//! Module construction and validation

use std::collections::BTreeMap;

use super::{ComponentRef, ComponentRole, ModuleDescriptor, ModuleRoute, NavigationItem};
use crate::{Error, Result};

/// Partially specified module, as written by a feature area
///
/// Optional fields are filled in by [`create_module`]:
/// - `is_enabled` defaults to true
/// - `navigation_items` and `settings` default to empty
/// - component roles other than `List` default to placeholders
#[derive(Debug, Clone, Default)]
pub struct ModuleSpec {
    pub id: Option<String>,
    pub name: Option<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub is_enabled: Option<bool>,
    pub routes: Vec<ModuleRoute>,
    pub navigation_items: Option<Vec<NavigationItem>>,
    pub components: BTreeMap<ComponentRole, ComponentRef>,
    pub settings: Option<BTreeMap<String, serde_json::Value>>,
}

impl ModuleSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.is_enabled = Some(enabled);
        self
    }

    pub fn route(mut self, route: ModuleRoute) -> Self {
        self.routes.push(route);
        self
    }

    pub fn navigation_item(mut self, item: NavigationItem) -> Self {
        self.navigation_items.get_or_insert_with(Vec::new).push(item);
        self
    }

    pub fn component(mut self, role: ComponentRole, component: ComponentRef) -> Self {
        self.components.insert(role, component);
        self
    }

    pub fn setting(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.settings
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Validate a spec and build an immutable descriptor
///
/// Fails with [`Error::Validation`] when `id` or `name` is missing or blank,
/// when no `List` component is given, or when a route path or navigation id
/// is malformed. Nothing is registered here; see
/// [`ModuleRegistry::register_module`](super::ModuleRegistry::register_module).
pub fn create_module(spec: ModuleSpec) -> Result<ModuleDescriptor> {
    let id = non_blank(spec.id).ok_or_else(|| Error::Validation("module id is required".to_string()))?;
    let name = non_blank(spec.name)
        .ok_or_else(|| Error::Validation(format!("module {} has no name", id)))?;

    let mut components = spec.components;
    if !components.contains_key(&ComponentRole::List) {
        return Err(Error::Validation(format!(
            "module {} must provide a list component",
            id
        )));
    }
    for role in ComponentRole::ALL {
        components
            .entry(role)
            .or_insert_with(|| ComponentRef::placeholder(format!("{}:{}", id, role)));
    }

    for route in &spec.routes {
        if !route.path.starts_with('/') {
            return Err(Error::Validation(format!(
                "module {} route {:?} must start with '/'",
                id, route.path
            )));
        }
    }

    let navigation_items = spec.navigation_items.unwrap_or_default();
    for item in &navigation_items {
        if let Some((_, bad)) = item.walk().into_iter().find(|(_, i)| i.id.trim().is_empty()) {
            return Err(Error::Validation(format!(
                "module {} has a navigation item without an id ({:?})",
                id, bad.name
            )));
        }
    }

    Ok(ModuleDescriptor {
        id,
        name,
        icon: spec.icon.unwrap_or_default(),
        description: spec.description,
        is_enabled: spec.is_enabled.unwrap_or(true),
        routes: spec.routes,
        navigation_items,
        components,
        settings: spec.settings.unwrap_or_default(),
    })
}
