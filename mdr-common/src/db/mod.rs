//! SQLite persistence

pub mod init;
pub mod remote;

pub use init::*;
pub use remote::SqliteRemoteStore;
