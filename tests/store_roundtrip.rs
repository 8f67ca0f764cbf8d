//! Record stores persisted to disk and reopened.

use std::fs;

use idcard::config::Config;
use idcard::store::{FileKeyValue, LocalStore, STORAGE_KEY, SqliteStore};
use idcard::image::PhotoResolver;
use idcard::{Allergy, PhotoRef, RecordStore, StoreBackend, StudentRecord, open_backend, open_store};
use image::{Rgba, RgbaImage};
use pretty_assertions::assert_eq;

fn record(roll: &str, name: &str) -> StudentRecord {
    StudentRecord {
        name: name.into(),
        roll_number: roll.into(),
        class_div: "8A".into(),
        allergies: vec![Allergy::Peanuts],
        rack_number: "R12".into(),
        bus_route: "Route 2".into(),
        photo: Some(PhotoRef::local("/srv/photos/asha.png")),
        timestamp: None,
    }
}

#[test]
fn local_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = LocalStore::new(FileKeyValue::open(dir.path()).unwrap());
        store.upsert(record("2023007", "Asha Rao")).unwrap();
        store.upsert(record("2023008", "Ben Ito")).unwrap();
        store.upsert(record("2023007", "Asha R. Rao")).unwrap();
    }

    let store = LocalStore::new(FileKeyValue::open(dir.path()).unwrap());
    let listed = store.list().unwrap();
    let names: Vec<&str> = listed.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Ben Ito", "Asha R. Rao"]);
    assert!(listed.iter().all(|r| r.timestamp.is_some()));
    assert_eq!(
        store.get_by_key("2023007").unwrap().unwrap().photo,
        Some(PhotoRef::local("/srv/photos/asha.png"))
    );
}

#[test]
fn legacy_local_data_is_migrated_on_write() {
    let dir = tempfile::tempdir().unwrap();
    let kv = FileKeyValue::open(dir.path()).unwrap();
    let legacy = r#"[{"name":"John Smith","rollNumber":"2023001","classDiv":"5A",
        "allergies":["Nuts"],"photo":{},"photoUrl":"/uploads/john.png",
        "rackNumber":"R42","busRoute":"Route 1","timestamp":"2024-06-01T10:00:00.000Z"}]"#;
    fs::write(kv.path_for(STORAGE_KEY), legacy).unwrap();

    let store = LocalStore::new(kv);
    assert_eq!(store.list().unwrap()[0].name, "John Smith");
    store.upsert(record("2023007", "Asha Rao")).unwrap();

    let raw = fs::read_to_string(store.kv().path_for(STORAGE_KEY)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["version"], 1);
    assert_eq!(value["records"].as_array().unwrap().len(), 2);
    assert_eq!(value["records"][1]["photo"], "/uploads/john.png");
}

#[test]
fn sqlite_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cards.db");
    {
        let store = SqliteStore::open(&path).unwrap();
        let mut rec = record("2023007", "Asha Rao");
        rec.photo = Some(PhotoRef::url("/uploads/1-abc.png"));
        store.upsert(rec).unwrap();
    }
    let store = SqliteStore::open(&path).unwrap();
    let found = store.get_by_key("2023007").unwrap().unwrap();
    assert_eq!(found.allergies, vec![Allergy::Peanuts]);
    assert_eq!(found.photo, Some(PhotoRef::url("/uploads/1-abc.png")));
    assert!(store.delete_by_key("2023007").unwrap());
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn open_store_follows_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.store.path = dir.path().join("storage");
    let store = open_store(&config).unwrap();
    assert_eq!(store.backend(), "local");
    store.upsert(record("1", "Local Only")).unwrap();
    assert!(config.store.path.join(format!("{STORAGE_KEY}.json")).exists());

    config.store.backend = StoreBackend::Remote;
    config.store.remote_url = "http://127.0.0.1:9".into();
    assert_eq!(open_store(&config).unwrap().backend(), "remote");
}

#[test]
fn local_backend_resolves_uploaded_photos() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.store.path = dir.path().join("storage");
    config.server.uploads_dir = dir.path().join("uploads");
    fs::create_dir_all(&config.server.uploads_dir).unwrap();
    RgbaImage::from_pixel(3, 5, Rgba([1, 2, 3, 255]))
        .save(config.server.uploads_dir.join("1-abc.png"))
        .unwrap();

    let backend = open_backend(&config).unwrap();
    assert_eq!(backend.store.backend(), "local");
    let photo = backend
        .photos
        .resolve(&PhotoRef::url("/uploads/1-abc.png"))
        .unwrap();
    assert_eq!(photo.dimensions(), (3, 5));
}
