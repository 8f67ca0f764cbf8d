//! Persistence for student records.
//!
//! Every backend implements [`RecordStore`]; callers pick one at composition
//! time (see [`open_store`]) and never branch on the backend afterwards.
//!
//! Naming follows the record lifecycle:
//!
//! - `list` - all records, most recently written first
//! - `get_by_key` - one record by roll number
//! - `upsert` - replace-by-key or insert, atomic per store
//! - `delete_by_key` - remove by roll number, `false` if absent

mod local;
mod remote;
mod sqlite;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;

use crate::config::{Config, StoreBackend};
use crate::image::{FsPhotoResolver, PhotoResolver};
use crate::record::{StudentRecord, ValidationError};
use crate::schema::SchemaError;

pub use local::{FileKeyValue, KeyValue, LocalStore, MemoryKeyValue, STORAGE_KEY};
pub use remote::{HttpPhotoResolver, RemoteStore};
pub use sqlite::SqliteStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Key-value collection of student records keyed by roll number.
pub trait RecordStore: Send + Sync {
    /// Short backend label used in logs and CLI output.
    fn backend(&self) -> &'static str;

    fn list(&self) -> StoreResult<Vec<StudentRecord>>;

    fn get_by_key(&self, roll_number: &str) -> StoreResult<Option<StudentRecord>>;

    /// Insert or replace the record with the same roll number.
    ///
    /// The timestamp defaults to "now" when the caller leaves it empty.
    fn upsert(&self, record: StudentRecord) -> StoreResult<StudentRecord>;

    /// Returns `true` when a record was removed.
    fn delete_by_key(&self, roll_number: &str) -> StoreResult<bool>;
}

impl<S: RecordStore + ?Sized> RecordStore for Box<S> {
    fn backend(&self) -> &'static str {
        (**self).backend()
    }

    fn list(&self) -> StoreResult<Vec<StudentRecord>> {
        (**self).list()
    }

    fn get_by_key(&self, roll_number: &str) -> StoreResult<Option<StudentRecord>> {
        (**self).get_by_key(roll_number)
    }

    fn upsert(&self, record: StudentRecord) -> StoreResult<StudentRecord> {
        (**self).upsert(record)
    }

    fn delete_by_key(&self, roll_number: &str) -> StoreResult<bool> {
        (**self).delete_by_key(roll_number)
    }
}

impl<S: RecordStore + ?Sized> RecordStore for std::sync::Arc<S> {
    fn backend(&self) -> &'static str {
        (**self).backend()
    }

    fn list(&self) -> StoreResult<Vec<StudentRecord>> {
        (**self).list()
    }

    fn get_by_key(&self, roll_number: &str) -> StoreResult<Option<StudentRecord>> {
        (**self).get_by_key(roll_number)
    }

    fn upsert(&self, record: StudentRecord) -> StoreResult<StudentRecord> {
        (**self).upsert(record)
    }

    fn delete_by_key(&self, roll_number: &str) -> StoreResult<bool> {
        (**self).delete_by_key(roll_number)
    }
}

/// Backing-medium and caller errors reported by stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("storage write rejected: {0}")]
    WriteRejected(String),
    #[error("failed to serialize records: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("stored data unusable: {0}")]
    Schema(#[from] SchemaError),
    #[error("stored record '{key}' is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("request to card server failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("card server responded {status}: {message}")]
    Api {
        status: u16,
        message: String,
        details: Option<serde_json::Value>,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Fill in the write timestamp when the caller left it empty.
pub(crate) fn stamp(mut record: StudentRecord) -> StudentRecord {
    if record.timestamp.is_none() {
        record.timestamp = Some(Utc::now());
    }
    record
}

/// A record store and the resolver that loads the photos it refers to.
pub struct Backend {
    pub store: Arc<dyn RecordStore>,
    pub photos: Box<dyn PhotoResolver>,
}

/// Build the store selected by configuration, paired with its photo resolver.
pub fn open_backend(config: &Config) -> StoreResult<Backend> {
    match config.store.backend {
        StoreBackend::Local => {
            let kv = FileKeyValue::open(&config.store.path)?;
            Ok(Backend {
                store: Arc::new(LocalStore::new(kv)),
                photos: Box::new(FsPhotoResolver::with_uploads(&config.server.uploads_dir)),
            })
        }
        StoreBackend::Remote => {
            let remote = RemoteStore::new(&config.store.remote_url)?;
            Ok(Backend {
                photos: Box::new(remote.photo_resolver()),
                store: Arc::new(remote),
            })
        }
    }
}

/// Build the store selected by configuration.
pub fn open_store(config: &Config) -> StoreResult<Arc<dyn RecordStore>> {
    open_backend(config).map(|backend| backend.store)
}
