//! # MDR Common Library
//!
//! Shared core for the DIY recipes application:
//! - Module registry (feature areas, routes, navigation)
//! - User preference store with local/remote persistence and migration
//! - Legacy theme context bridge and document theme projection
//! - Event bus, configuration loading, error types

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod modules;
pub mod preferences;
pub mod session;
pub mod storage;
pub mod theme;

pub use error::{Error, Result};
pub use modules::{create_module, ModuleDescriptor, ModuleRegistry, ModuleSpec};
pub use preferences::{PreferenceStore, PreferencesPatch, Theme, UserPreferences};
pub use session::{Session, SessionProvider, SessionUser};
