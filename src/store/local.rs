use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::record::StudentRecord;
use crate::schema::{self, Envelope};
use crate::store::{RecordStore, StoreError, StoreResult, stamp};

/// Name of the single entry holding the record collection.
pub const STORAGE_KEY: &str = "student_id_cards";

/// Minimal key-value medium, the shape of browser-style local storage.
///
/// Values are raw bytes; decoding them is the store's concern, so a damaged
/// entry still reaches the store instead of failing inside the medium.
pub trait KeyValue: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()>;
}

/// One JSON file per key inside a directory. Writes replace the file atomically.
#[derive(Debug, Clone)]
pub struct FileKeyValue {
    dir: PathBuf,
}

impl FileKeyValue {
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| StoreError::io(&dir, err))?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValue for FileKeyValue {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::io(path, err)),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|err| StoreError::io(&tmp, err))?;
        fs::rename(&tmp, &path).map_err(|err| {
            let _ = fs::remove_file(&tmp);
            StoreError::io(&path, err)
        })
    }
}

/// In-process key-value medium. Writes can be made to fail to emulate a full quota.
#[derive(Debug, Default)]
pub struct MemoryKeyValue {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    reject_writes: AtomicBool,
}

impl MemoryKeyValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValue for MemoryKeyValue {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteRejected(format!(
                "quota exceeded while writing '{key}'"
            )));
        }
        self.entries().insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

impl<K: KeyValue + ?Sized> KeyValue for std::sync::Arc<K> {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        (**self).set(key, value)
    }
}

/// Client-resident record store backed by a single key-value entry.
#[derive(Debug)]
pub struct LocalStore<K: KeyValue> {
    kv: K,
    key: String,
    writer: Mutex<()>,
}

impl<K: KeyValue> LocalStore<K> {
    pub fn new(kv: K) -> Self {
        Self::with_key(kv, STORAGE_KEY)
    }

    pub fn with_key(kv: K, key: impl Into<String>) -> Self {
        Self {
            kv,
            key: key.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }

    fn corrupt_key(&self) -> String {
        format!("{}.corrupt", self.key)
    }

    /// Read for display. Unusable contents degrade to an empty collection.
    fn read_lenient(&self) -> StoreResult<Envelope> {
        let Some(raw) = self.kv.get(&self.key)? else {
            return Ok(Envelope::new());
        };
        match decode_entry(&raw) {
            Ok(decoded) => {
                if decoded.newly_quarantined > 0 {
                    warn!(
                        key = %self.key,
                        count = decoded.newly_quarantined,
                        "skipping stored records that fail validation"
                    );
                }
                Ok(decoded.envelope)
            }
            Err(err) => {
                warn!(key = %self.key, error = %err, "stored records unreadable; showing none");
                Ok(Envelope::new())
            }
        }
    }

    /// Read ahead of a write. An unreadable blob is preserved under a side key
    /// before the collection restarts empty.
    fn read_for_write(&self) -> StoreResult<Envelope> {
        let Some(raw) = self.kv.get(&self.key)? else {
            return Ok(Envelope::new());
        };
        match decode_entry(&raw) {
            Ok(decoded) => {
                if let Some(from) = decoded.migrated_from {
                    debug!(key = %self.key, from, "migrating stored records");
                }
                Ok(decoded.envelope)
            }
            Err(err) => {
                let side = self.corrupt_key();
                warn!(key = %self.key, preserved_as = %side, error = %err, "replacing unreadable records");
                self.kv.set(&side, &raw)?;
                Ok(Envelope::new())
            }
        }
    }

    fn write(&self, envelope: &Envelope) -> StoreResult<()> {
        let encoded = schema::encode(envelope)?;
        self.kv.set(&self.key, encoded.as_bytes())
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Decode a stored entry. Bytes that are not UTF-8 are as unusable as bad JSON.
fn decode_entry(raw: &[u8]) -> Result<schema::Decoded, String> {
    let text = std::str::from_utf8(raw).map_err(|err| format!("not valid UTF-8: {err}"))?;
    schema::decode(text).map_err(|err| err.to_string())
}

impl<K: KeyValue> RecordStore for LocalStore<K> {
    fn backend(&self) -> &'static str {
        "local"
    }

    fn list(&self) -> StoreResult<Vec<StudentRecord>> {
        Ok(self.read_lenient()?.records)
    }

    fn get_by_key(&self, roll_number: &str) -> StoreResult<Option<StudentRecord>> {
        Ok(self
            .read_lenient()?
            .records
            .into_iter()
            .find(|r| r.roll_number == roll_number))
    }

    fn upsert(&self, record: StudentRecord) -> StoreResult<StudentRecord> {
        record.validate()?;
        let record = stamp(record);
        let _guard = self.lock_writer();
        let mut envelope = self.read_for_write()?;
        match envelope
            .records
            .iter()
            .position(|r| r.roll_number == record.roll_number)
        {
            Some(idx) => envelope.records[idx] = record.clone(),
            None => envelope.records.insert(0, record.clone()),
        }
        self.write(&envelope)?;
        debug!(roll_number = %record.roll_number, "record saved locally");
        Ok(record)
    }

    fn delete_by_key(&self, roll_number: &str) -> StoreResult<bool> {
        let _guard = self.lock_writer();
        // A missing key is settled without touching storage.
        let present = self
            .read_lenient()?
            .records
            .iter()
            .any(|r| r.roll_number == roll_number);
        if !present {
            return Ok(false);
        }
        let mut envelope = self.read_for_write()?;
        let Some(idx) = envelope
            .records
            .iter()
            .position(|r| r.roll_number == roll_number)
        else {
            return Ok(false);
        };
        envelope.records.remove(idx);
        self.write(&envelope)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Allergy;
    use crate::record::PhotoRef;
    use pretty_assertions::assert_eq;

    fn record(roll: &str, name: &str) -> StudentRecord {
        StudentRecord {
            name: name.into(),
            roll_number: roll.into(),
            class_div: "8A".into(),
            allergies: vec![Allergy::Peanuts],
            rack_number: "R12".into(),
            bus_route: "Route 2".into(),
            photo: Some(PhotoRef::local("/tmp/photo.png")),
            timestamp: None,
        }
    }

    #[test]
    fn new_records_go_to_front_updates_stay_in_place() {
        let store = LocalStore::new(MemoryKeyValue::new());
        store.upsert(record("1", "First")).unwrap();
        store.upsert(record("2", "Second")).unwrap();
        store.upsert(record("1", "First Renamed")).unwrap();

        let names: Vec<String> = store.list().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Second", "First Renamed"]);
    }

    #[test]
    fn upsert_stamps_missing_timestamp_and_keeps_given_one() {
        let store = LocalStore::new(MemoryKeyValue::new());
        let saved = store.upsert(record("1", "A")).unwrap();
        assert!(saved.timestamp.is_some());

        let fixed = "2024-01-02T03:04:05Z".parse().unwrap();
        let mut explicit = record("1", "A");
        explicit.timestamp = Some(fixed);
        let saved = store.upsert(explicit).unwrap();
        assert_eq!(saved.timestamp, Some(fixed));
    }

    #[test]
    fn corrupt_blob_is_preserved_before_overwrite() {
        let kv = MemoryKeyValue::new();
        kv.set(STORAGE_KEY, b"{{{ not json").unwrap();
        let store = LocalStore::new(kv);

        assert_eq!(store.list().unwrap(), Vec::new());
        store.upsert(record("1", "A")).unwrap();

        let side = store.kv().get("student_id_cards.corrupt").unwrap();
        assert_eq!(side.as_deref(), Some(&b"{{{ not json"[..]));
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn non_utf8_file_degrades_to_empty_and_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKeyValue::open(dir.path()).unwrap();
        let garbage = [0xff, 0xfe, 0x00, 0x9f, b'['];
        fs::write(kv.path_for(STORAGE_KEY), garbage).unwrap();
        let store = LocalStore::new(kv);

        assert_eq!(store.list().unwrap(), Vec::new());
        assert_eq!(store.get_by_key("1").unwrap(), None);
        assert!(!store.delete_by_key("missing").unwrap());

        store.upsert(record("1", "A")).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
        let side = store.kv().get("student_id_cards.corrupt").unwrap();
        assert_eq!(side.as_deref(), Some(&garbage[..]));
    }

    #[test]
    fn deleting_missing_key_from_corrupt_blob_writes_nothing() {
        let store = LocalStore::new(MemoryKeyValue::new());
        store.kv().set(STORAGE_KEY, b"{{{ not json").unwrap();
        store.kv().reject_writes(true);

        assert!(!store.delete_by_key("missing").unwrap());
        assert_eq!(store.kv().get("student_id_cards.corrupt").unwrap(), None);
    }

    #[test]
    fn deleting_missing_key_leaves_list_unchanged() {
        let store = LocalStore::new(MemoryKeyValue::new());
        store.upsert(record("1", "First")).unwrap();
        store.upsert(record("2", "Second")).unwrap();
        let before = store.list().unwrap();

        assert!(!store.delete_by_key("3").unwrap());
        assert_eq!(store.list().unwrap(), before);
    }

    #[test]
    fn rejected_write_leaves_previous_contents() {
        let store = LocalStore::new(MemoryKeyValue::new());
        store.upsert(record("1", "A")).unwrap();
        store.kv().reject_writes(true);

        let err = store.upsert(record("2", "B")).unwrap_err();
        assert!(matches!(err, StoreError::WriteRejected(_)));
        assert!(store.delete_by_key("1").is_err());

        store.kv().reject_writes(false);
        let rolls: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|r| r.roll_number)
            .collect();
        assert_eq!(rolls, vec!["1"]);
    }

    #[test]
    fn invalid_record_never_written() {
        let store = LocalStore::new(MemoryKeyValue::new());
        let mut bad = record("1", "A");
        bad.photo = None;
        assert!(matches!(store.upsert(bad), Err(StoreError::Invalid(_))));
        assert_eq!(store.kv().get(STORAGE_KEY).unwrap(), None);
    }
}
