//! Values written to `RocksStore` survive closing and reopening the database.

use parley_store::{keys, DurableStore, RocksStore};
use tempfile::TempDir;

#[test]
fn pending_intent_survives_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let store = RocksStore::open(dir.path()).unwrap();
        store
            .write(keys::PENDING_OUTGOING, r#"{"content":"book a table"}"#)
            .unwrap();
    }

    let store = RocksStore::open(dir.path()).unwrap();
    assert_eq!(
        store.read(keys::PENDING_OUTGOING).unwrap().as_deref(),
        Some(r#"{"content":"book a table"}"#)
    );
}

#[test]
fn delete_is_durable() {
    let dir = TempDir::new().unwrap();

    {
        let store = RocksStore::open(dir.path()).unwrap();
        store.write(keys::PENDING_DISPLAY, "x").unwrap();
        store.delete(keys::PENDING_DISPLAY).unwrap();
    }

    let store = RocksStore::open(dir.path()).unwrap();
    assert!(store.read(keys::PENDING_DISPLAY).unwrap().is_none());
}

#[test]
fn usable_as_trait_object() {
    let dir = TempDir::new().unwrap();
    let store: Box<dyn DurableStore> = Box::new(RocksStore::open(dir.path()).unwrap());
    store.write(keys::SCROLL_SUPPRESSION, "1").unwrap();
    assert!(store.read(keys::SCROLL_SUPPRESSION).unwrap().is_some());
}
