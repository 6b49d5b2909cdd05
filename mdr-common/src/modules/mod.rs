//! Module registry
//!
//! A module is a self-contained feature area (formulations, settings, ...)
//! that declares its own routes, navigation entries and UI components.
//! Modules are built with [`create_module`] and handed to a
//! [`ModuleRegistry`] owned by the application's composition root;
//! navigation and route builders query the registry on every render pass.

mod builder;
mod flags;
mod registry;

pub use builder::{create_module, ModuleSpec};
pub use flags::{FeatureFlags, FEATURE_FLAGS_KEY};
pub use registry::ModuleRegistry;

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Fixed set of component roles a module exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComponentRole {
    List,
    Detail,
    Create,
    DocumentView,
}

impl ComponentRole {
    pub const ALL: [ComponentRole; 4] = [
        ComponentRole::List,
        ComponentRole::Detail,
        ComponentRole::Create,
        ComponentRole::DocumentView,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentRole::List => "list",
            ComponentRole::Detail => "detail",
            ComponentRole::Create => "create",
            ComponentRole::DocumentView => "documentView",
        }
    }
}

impl fmt::Display for ComponentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque handle to a UI component
///
/// The registry never inspects the handle; the rendering layer downcasts it
/// back to whatever type it registered.
#[derive(Clone)]
pub struct ComponentRef {
    name: Cow<'static, str>,
    handle: Option<Arc<dyn Any + Send + Sync>>,
}

impl ComponentRef {
    pub fn new<T>(name: impl Into<Cow<'static, str>>, handle: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            name: name.into(),
            handle: Some(Arc::new(handle)),
        }
    }

    /// No-op component (renders nothing)
    pub fn placeholder(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_placeholder(&self) -> bool {
        self.handle.is_none()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.handle.as_deref().and_then(|h| h.downcast_ref::<T>())
    }

}

impl fmt::Debug for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRef")
            .field("name", &self.name)
            .field("placeholder", &self.is_placeholder())
            .finish()
    }
}

/// Route contributed by a module
#[derive(Debug, Clone)]
pub struct ModuleRoute {
    pub path: String,
    pub component: ComponentRef,
    /// Match the path exactly instead of as a prefix
    pub exact: bool,
}

impl ModuleRoute {
    pub fn new(path: impl Into<String>, component: ComponentRef) -> Self {
        Self {
            path: path.into(),
            component,
            exact: false,
        }
    }

    pub fn exact(mut self) -> Self {
        self.exact = true;
        self
    }
}

/// Navigation tree node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationItem {
    pub id: String,
    pub name: String,
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NavigationItem>,
}

impl NavigationItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: icon.into(),
            path: None,
            children: Vec::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_child(mut self, child: NavigationItem) -> Self {
        self.children.push(child);
        self
    }

    /// Pre-order walk yielding `(depth, item)`
    pub fn walk(&self) -> Vec<(usize, &NavigationItem)> {
        fn visit<'a>(item: &'a NavigationItem, depth: usize, out: &mut Vec<(usize, &'a NavigationItem)>) {
            out.push((depth, item));
            for child in &item.children {
                visit(child, depth + 1, out);
            }
        }
        let mut out = Vec::new();
        visit(self, 0, &mut out);
        out
    }
}

/// Immutable module description held by the registry
///
/// Only obtainable through [`create_module`], so every descriptor in a
/// registry has passed validation and resolves every [`ComponentRole`].
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    id: String,
    name: String,
    icon: String,
    description: Option<String>,
    is_enabled: bool,
    routes: Vec<ModuleRoute>,
    navigation_items: Vec<NavigationItem>,
    components: BTreeMap<ComponentRole, ComponentRef>,
    settings: BTreeMap<String, serde_json::Value>,
}

impl ModuleDescriptor {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn icon(&self) -> &str {
        &self.icon
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    pub fn routes(&self) -> &[ModuleRoute] {
        &self.routes
    }

    pub fn navigation_items(&self) -> &[NavigationItem] {
        &self.navigation_items
    }

    pub fn component(&self, role: ComponentRole) -> Option<&ComponentRef> {
        self.components.get(&role)
    }

    pub fn components(&self) -> impl Iterator<Item = (ComponentRole, &ComponentRef)> {
        self.components.iter().map(|(role, c)| (*role, c))
    }

    pub fn settings(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.settings
    }

    pub fn setting(&self, key: &str) -> Option<&serde_json::Value> {
        self.settings.get(key)
    }

    pub(crate) fn with_enabled(&self, enabled: bool) -> Self {
        Self {
            is_enabled: enabled,
            ..self.clone()
        }
    }
}

/// Serializable view of a descriptor (component handles reduced to names)
#[derive(Debug, Clone, Serialize)]
pub struct ModuleSummary {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub description: Option<String>,
    pub is_enabled: bool,
    pub routes: Vec<String>,
    pub components: BTreeMap<ComponentRole, String>,
    pub settings: BTreeMap<String, serde_json::Value>,
}

impl From<&ModuleDescriptor> for ModuleSummary {
    fn from(d: &ModuleDescriptor) -> Self {
        Self {
            id: d.id.clone(),
            name: d.name.clone(),
            icon: d.icon.clone(),
            description: d.description.clone(),
            is_enabled: d.is_enabled,
            routes: d.routes.iter().map(|r| r.path.clone()).collect(),
            components: d
                .components
                .iter()
                .map(|(role, c)| (*role, c.name().to_string()))
                .collect(),
            settings: d.settings.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_ref_downcast() {
        struct ListView {
            page_size: usize,
        }
        let c = ComponentRef::new("FormulationList", ListView { page_size: 20 });
        assert!(!c.is_placeholder());
        assert_eq!(c.downcast_ref::<ListView>().map(|v| v.page_size), Some(20));
        assert!(c.downcast_ref::<String>().is_none());

        let p = ComponentRef::placeholder("DocumentView");
        assert!(p.is_placeholder());
        assert!(p.downcast_ref::<ListView>().is_none());
    }

    #[test]
    fn test_navigation_walk_is_preorder() {
        let tree = NavigationItem::new("all", "All Formulations", "📋")
            .with_path("/formulations")
            .with_child(NavigationItem::new("recent", "Recent", "🕒"))
            .with_child(NavigationItem::new("mine", "My Formulations", "👤"));

        let walked: Vec<(usize, &str)> = tree.walk().into_iter().map(|(d, i)| (d, i.id.as_str())).collect();
        assert_eq!(walked, vec![(0, "all"), (1, "recent"), (1, "mine")]);
    }

    #[test]
    fn test_component_role_wire_names() {
        assert_eq!(serde_json::to_string(&ComponentRole::DocumentView).unwrap(), "\"documentView\"");
        assert_eq!(ComponentRole::List.to_string(), "list");
    }
}
