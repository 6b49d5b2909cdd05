//! Built-in feature modules

use mdr_common::modules::{ComponentRef, ComponentRole, ModuleDescriptor, ModuleRoute, NavigationItem};
use mdr_common::{ModuleRegistry, ModuleSpec, Result};
use std::collections::BTreeMap;

/// Component handle stored in module descriptors: renders a text screen
pub type Screen = fn(&ModuleDescriptor, &BTreeMap<String, String>) -> String;

fn screen(name: &'static str, render: Screen) -> ComponentRef {
    ComponentRef::new(name, render)
}

fn formulation_list(module: &ModuleDescriptor, _params: &BTreeMap<String, String>) -> String {
    let per_page = module
        .setting("itemsPerPage")
        .and_then(|v| v.as_u64())
        .unwrap_or(20);
    let sorting = module
        .setting("defaultSorting")
        .and_then(|v| v.as_str())
        .unwrap_or("created_at:desc");
    format!("{} | list view ({} per page, sorted by {})", module.name(), per_page, sorting)
}

fn formulation_details(module: &ModuleDescriptor, params: &BTreeMap<String, String>) -> String {
    let id = params.get("id").map(String::as_str).unwrap_or("?");
    format!("{} | formulation {}", module.name(), id)
}

fn formulation_form(module: &ModuleDescriptor, _params: &BTreeMap<String, String>) -> String {
    format!("{} | new formulation", module.name())
}

fn formulation_document(module: &ModuleDescriptor, params: &BTreeMap<String, String>) -> String {
    let id = params.get("id").map(String::as_str).unwrap_or("?");
    if module.setting("enableDocumentView").and_then(|v| v.as_bool()) == Some(false) {
        return format!("{} | document view disabled", module.name());
    }
    format!("{} | formulation {} (document view)", module.name(), id)
}

fn formulation_analytics(module: &ModuleDescriptor, _params: &BTreeMap<String, String>) -> String {
    if module.setting("enableAnalytics").and_then(|v| v.as_bool()) == Some(false) {
        return format!("{} | analytics disabled", module.name());
    }
    format!("{} | formulation analytics", module.name())
}

fn ingredient_list(module: &ModuleDescriptor, _params: &BTreeMap<String, String>) -> String {
    format!("{} | ingredients", module.name())
}

fn settings_panel(module: &ModuleDescriptor, _params: &BTreeMap<String, String>) -> String {
    format!("{} | theme, audio and developer options", module.name())
}

/// DIY formulations: list, detail, create and document views
pub fn formulations_module() -> ModuleSpec {
    let list = screen("ModuleFormulationList", formulation_list);
    let details = screen("ModuleFormulationDetails", formulation_details);
    let form = screen("ModuleFormulationForm", formulation_form);
    let document = screen("DocumentCentricFormulation", formulation_document);
    let analytics = screen("FormulationAnalytics", formulation_analytics);
    let ingredients = screen("IngredientList", ingredient_list);

    ModuleSpec::new("formulations", "DIY Formulations")
        .icon("🧪")
        .description("Create and manage DIY product formulations with version control")
        .route(ModuleRoute::new("/formulations", list.clone()).exact())
        .route(ModuleRoute::new("/formulations/new", form.clone()).exact())
        .route(ModuleRoute::new("/formulations/:id", details.clone()))
        .route(ModuleRoute::new("/enhanced-formulations", list.clone()))
        .route(ModuleRoute::new("/module-formulations", list.clone()))
        .route(ModuleRoute::new("/formulations/:id/document", document.clone()))
        .route(ModuleRoute::new("/formulations/analytics", analytics).exact())
        .route(ModuleRoute::new("/ingredients", ingredients).exact())
        .component(ComponentRole::List, list)
        .component(ComponentRole::Detail, details)
        .component(ComponentRole::Create, form)
        .component(ComponentRole::DocumentView, document)
        .navigation_item(
            NavigationItem::new("all_formulations", "All Formulations", "📋")
                .with_path("/formulations")
                .with_child(
                    NavigationItem::new("recent_formulations", "Recent", "🕒")
                        .with_path("/formulations?filter=recent"),
                )
                .with_child(
                    NavigationItem::new("my_formulations", "My Formulations", "👤")
                        .with_path("/formulations?filter=mine"),
                ),
        )
        .navigation_item(NavigationItem::new("ingredients", "Ingredients", "🧪").with_path("/ingredients"))
        .navigation_item(
            NavigationItem::new("create_formulation", "Create New", "➕").with_path("/formulations/new"),
        )
        .navigation_item(
            NavigationItem::new("formulation_stats", "Analytics", "📊").with_path("/formulations/analytics"),
        )
        .setting("defaultView", "list")
        .setting("enableVersioning", true)
        .setting("enableDocumentView", true)
        .setting("enableAnalytics", true)
        .setting("useRepository", true)
        .setting("defaultSorting", "created_at:desc")
        .setting("itemsPerPage", 20)
}

/// User settings (theme, audio, developer flags)
pub fn settings_module() -> ModuleSpec {
    let panel = screen("SettingsPanel", settings_panel);
    ModuleSpec::new("settings", "Settings")
        .icon("⚙️")
        .description("Theme, audio and developer preferences")
        .route(ModuleRoute::new("/settings", panel.clone()).exact())
        .component(ComponentRole::List, panel)
        .navigation_item(NavigationItem::new("settings", "Settings", "⚙️").with_path("/settings"))
}

/// Register every built-in module; a rejected module does not stop the others
pub fn register_builtin_modules(registry: &mut ModuleRegistry) -> Result<()> {
    let mut first_error = None;
    for spec in [formulations_module(), settings_module()] {
        if let Err(e) = registry.register_spec(spec) {
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
