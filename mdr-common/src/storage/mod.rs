//! Persistence collaborators
//!
//! - [`LocalStore`]: key/value string storage for anonymous and offline use
//!   (the browser `localStorage` equivalent), also the migration source.
//! - [`RemoteStore`]: per-user records in a hosted store, addressed by table
//!   name and user id.
//!
//! The preference layer only depends on these traits; concrete stores live
//! here (file, memory) and in [`crate::db`] (SQLite).

mod local;
mod remote;

pub use local::{FileLocalStore, LocalStore, MemoryLocalStore};
pub use remote::{MemoryRemoteStore, Record, RemoteStore};
pub(crate) use remote::record_user_id;

/// Column every remote record is keyed by
pub const USER_ID_FIELD: &str = "user_id";
