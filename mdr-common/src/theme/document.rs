//! Document root element model
//!
//! Stylesheets select on the `data-theme` attribute and on one class per
//! theme. Exactly one theme class is present once a theme has been applied;
//! unrelated classes are left alone.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::preferences::Theme;

pub const THEME_ATTRIBUTE: &str = "data-theme";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentElement {
    attributes: BTreeMap<String, String>,
    classes: BTreeSet<String>,
}

impl DocumentElement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains(class)
    }

    pub fn add_class(&mut self, class: impl Into<String>) {
        self.classes.insert(class.into());
    }

    pub fn remove_class(&mut self, class: &str) {
        self.classes.remove(class);
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(String::as_str)
    }

    /// Theme classes currently present, in toggle order
    pub fn theme_classes(&self) -> Vec<Theme> {
        Theme::ALL
            .into_iter()
            .filter(|t| self.has_class(t.as_str()))
            .collect()
    }

    /// Theme currently projected, if attribute and classes agree
    pub fn theme(&self) -> Option<Theme> {
        let attr: Theme = self.attribute(THEME_ATTRIBUTE)?.parse().ok()?;
        match self.theme_classes().as_slice() {
            [only] if *only == attr => Some(attr),
            _ => None,
        }
    }

    /// Set the attribute and make `theme`'s class the only theme class
    pub fn apply_theme(&mut self, theme: Theme) {
        self.set_attribute(THEME_ATTRIBUTE, theme.as_str());
        for other in Theme::ALL {
            self.remove_class(other.as_str());
        }
        self.add_class(theme.as_str());
    }
}
