//! The remote store client against a live card server.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc;

use image::{Rgba, RgbaImage};
use idcard::image::PhotoResolver;
use idcard::server::{AppState, build_app};
use idcard::store::{RemoteStore, SqliteStore};
use idcard::{Allergy, PhotoRef, RecordStore, StoreError, StudentRecord};
use pretty_assertions::assert_eq;

/// Start a server on its own runtime thread and return where it listens.
fn spawn_server(uploads: &Path) -> SocketAddr {
    let state = AppState {
        store: Arc::new(SqliteStore::open_in_memory().unwrap()),
        uploads_dir: uploads.to_path_buf(),
        max_upload_bytes: 1024 * 1024,
    };
    let app = build_app(state, 30);
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });
    rx.recv().unwrap()
}

fn record(photo: PhotoRef) -> StudentRecord {
    StudentRecord {
        name: "Asha Rao".into(),
        roll_number: "2023007".into(),
        class_div: "8A".into(),
        allergies: vec![Allergy::Peanuts, Allergy::TreeNuts],
        rack_number: "R12".into(),
        bus_route: "Route 2".into(),
        photo: Some(photo),
        timestamp: None,
    }
}

#[test]
fn remote_store_round_trips_through_server() {
    let uploads = tempfile::tempdir().unwrap();
    let client_dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(uploads.path());
    let store = RemoteStore::new(&format!("http://{addr}")).unwrap();
    assert_eq!(store.backend(), "remote");
    assert!(store.list().unwrap().is_empty());

    let photo_path = client_dir.path().join("asha.png");
    RgbaImage::from_pixel(6, 8, Rgba([5, 6, 7, 255]))
        .save(&photo_path)
        .unwrap();

    let saved = store.upsert(record(PhotoRef::local(&photo_path))).unwrap();
    assert_eq!(saved.allergies, vec![Allergy::Peanuts, Allergy::TreeNuts]);
    assert!(saved.timestamp.is_some());
    let Some(PhotoRef::Url(url)) = &saved.photo else {
        panic!("server should return an upload URL, got {:?}", saved.photo);
    };
    assert!(url.starts_with("/uploads/"));

    let fetched = store.photo_resolver().resolve(saved.photo.as_ref().unwrap()).unwrap();
    assert_eq!(fetched.dimensions(), (6, 8));

    // Resubmitting with the server-side photo re-uploads it under the same key.
    let mut renamed = saved.clone();
    renamed.name = "Asha R. Rao".into();
    renamed.timestamp = None;
    store.upsert(renamed).unwrap();

    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "Asha R. Rao");
    assert_eq!(
        store.get_by_key("2023007").unwrap().unwrap().name,
        "Asha R. Rao"
    );
    assert_eq!(store.get_by_key("nobody").unwrap(), None);

    assert!(store.delete_by_key("2023007").unwrap());
    assert!(!store.delete_by_key("2023007").unwrap());
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn invalid_records_never_leave_the_client() {
    let uploads = tempfile::tempdir().unwrap();
    let addr = spawn_server(uploads.path());
    let store = RemoteStore::new(&format!("http://{addr}")).unwrap();

    let mut bad = record(PhotoRef::local("/does/not/matter.png"));
    bad.bus_route = "Route 99".into();
    assert!(matches!(store.upsert(bad), Err(StoreError::Invalid(_))));
    assert_eq!(std::fs::read_dir(uploads.path()).unwrap().count(), 0);
}

#[test]
fn unreachable_server_is_an_http_error() {
    let store = RemoteStore::new("http://127.0.0.1:9").unwrap();
    assert!(matches!(store.list(), Err(StoreError::Http(_))));
}
