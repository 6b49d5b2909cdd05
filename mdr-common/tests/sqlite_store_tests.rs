//! SQLite remote store behind the preference store

#![cfg(feature = "sqlx")]

use mdr_common::db::{init_database, SqliteRemoteStore};
use mdr_common::preferences::{MigrationOutcome, PreferenceStore, Theme, PREFERENCES_TABLE};
use mdr_common::session::{Session, SessionUser};
use mdr_common::storage::{MemoryLocalStore, Record, RemoteStore};
use mdr_common::Error;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn record(value: serde_json::Value) -> Record {
    value.as_object().unwrap().clone()
}

async fn open_store(dir: &TempDir) -> SqliteRemoteStore {
    let pool = init_database(&dir.path().join("mdr.db")).await.unwrap();
    SqliteRemoteStore::new(pool)
}

#[tokio::test]
async fn insert_select_update() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    assert!(store.select_one(PREFERENCES_TABLE, "u1").await.unwrap().is_none());

    store
        .insert_one(PREFERENCES_TABLE, record(json!({"user_id": "u1", "theme": "hackers", "volume": 0.5})))
        .await
        .unwrap();
    store
        .update_one(PREFERENCES_TABLE, "u1", record(json!({"theme": "neotopia"})))
        .await
        .unwrap();

    let row = store.select_one(PREFERENCES_TABLE, "u1").await.unwrap().unwrap();
    assert_eq!(row["theme"], "neotopia");
    assert_eq!(row["volume"], json!(0.5));
    assert_eq!(row["user_id"], "u1");
}

#[tokio::test]
async fn duplicate_insert_and_missing_update_fail() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let row = record(json!({"user_id": "u1"}));

    store.insert_one(PREFERENCES_TABLE, row.clone()).await.unwrap();
    let err = store.insert_one(PREFERENCES_TABLE, row).await.unwrap_err();
    assert!(matches!(err, Error::WriteFailed(_)));

    let err = store
        .update_one(PREFERENCES_TABLE, "ghost", record(json!({"theme": "dystopia"})))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::WriteFailed(_)));
}

#[tokio::test]
async fn tables_are_isolated() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store
        .insert_one("other_table", record(json!({"user_id": "u1", "theme": "dystopia"})))
        .await
        .unwrap();
    assert!(store.select_one(PREFERENCES_TABLE, "u1").await.unwrap().is_none());
}

#[tokio::test]
async fn preference_store_persists_through_sqlite() {
    let dir = TempDir::new().unwrap();
    let remote = Arc::new(open_store(&dir).await);
    let local = Arc::new(MemoryLocalStore::new());
    let session = Arc::new(Session::new());

    let store = PreferenceStore::new(local.clone(), Some(remote.clone()), session.clone());
    store.load().await;
    store.set_theme(Theme::Dystopia).unwrap();

    let user = SessionUser::new("u1");
    session.sign_in(user.clone());
    assert_eq!(store.migrate_from_local(&user).await.unwrap(), MigrationOutcome::Created);

    store.set_audio_enabled(true).unwrap().wait().await.unwrap();
    store.set_volume(0.25).unwrap().wait().await.unwrap();

    // Fresh store, empty local storage: everything comes from SQLite
    let fresh = PreferenceStore::new(Arc::new(MemoryLocalStore::new()), Some(remote), session);
    fresh.load().await;
    assert!(fresh.remote_available());
    assert_eq!(fresh.theme(), Theme::Dystopia);
    assert!(fresh.audio_enabled());
    assert_eq!(fresh.volume(), 0.25);
}
