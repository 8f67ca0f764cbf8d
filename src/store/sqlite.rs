use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, warn};

use crate::catalog::Allergy;
use crate::record::{PhotoRef, StudentRecord};
use crate::store::{RecordStore, StoreError, StoreResult, stamp};

const SCHEMA_VERSION: i64 = 1;

const SELECT_COLUMNS: &str = "name, roll_number, class_div, allergies, photo_url, rack_number, bus_route, timestamp";

/// Server-resident store backed by the `student_cards` table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish()
    }
}

impl SqliteStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| StoreError::io(parent, err))?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version < 1 {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS student_cards(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                roll_number TEXT NOT NULL UNIQUE,
                class_div TEXT NOT NULL,
                allergies TEXT NOT NULL DEFAULT '[]',
                photo_url TEXT NOT NULL,
                rack_number TEXT NOT NULL,
                bus_route TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_student_cards_timestamp ON student_cards(timestamp)",
            [],
        )?;
    }
    if version < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        debug!(from = version, to = SCHEMA_VERSION, "student_cards schema migrated");
    }
    Ok(())
}

/// Raw column values, decoded outside the rusqlite row callback.
struct RawRow {
    name: String,
    roll_number: String,
    class_div: String,
    allergies: String,
    photo_url: String,
    rack_number: String,
    bus_route: String,
    timestamp: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            roll_number: row.get(1)?,
            class_div: row.get(2)?,
            allergies: row.get(3)?,
            photo_url: row.get(4)?,
            rack_number: row.get(5)?,
            bus_route: row.get(6)?,
            timestamp: row.get(7)?,
        })
    }

    fn decode(self) -> Result<StudentRecord, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            key: self.roll_number.clone(),
            reason,
        };
        let allergies: Vec<Allergy> = serde_json::from_str(&self.allergies)
            .map_err(|err| corrupt(format!("allergies: {err}")))?;
        let photo = PhotoRef::parse(&self.photo_url).map_err(|err| corrupt(err.to_string()))?;
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|err| corrupt(format!("timestamp: {err}")))?
            .with_timezone(&Utc);
        Ok(StudentRecord {
            name: self.name,
            roll_number: self.roll_number,
            class_div: self.class_div,
            allergies,
            rack_number: self.rack_number,
            bus_route: self.bus_route,
            photo: Some(photo),
            timestamp: Some(timestamp),
        })
    }
}

fn select_one(conn: &Connection, roll_number: &str) -> StoreResult<Option<StudentRecord>> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM student_cards WHERE roll_number = ?1");
    let raw = conn
        .query_row(&sql, params![roll_number], RawRow::from_row)
        .optional()?;
    raw.map(RawRow::decode).transpose()
}

impl RecordStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn list(&self) -> StoreResult<Vec<StudentRecord>> {
        let conn = self.conn();
        let sql =
            format!("SELECT {SELECT_COLUMNS} FROM student_cards ORDER BY timestamp DESC, id DESC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], RawRow::from_row)?;
        let mut records = Vec::new();
        for row in rows {
            match row.map_err(StoreError::from).and_then(RawRow::decode) {
                Ok(record) => records.push(record),
                Err(err) => warn!(error = %err, "skipping unreadable student card row"),
            }
        }
        Ok(records)
    }

    fn get_by_key(&self, roll_number: &str) -> StoreResult<Option<StudentRecord>> {
        select_one(&self.conn(), roll_number)
    }

    fn upsert(&self, record: StudentRecord) -> StoreResult<StudentRecord> {
        record.validate()?;
        let record = stamp(record);
        let photo_url = record
            .photo
            .as_ref()
            .map(PhotoRef::to_uri)
            .unwrap_or_default();
        let allergies = serde_json::to_string(&record.allergies)?;
        let timestamp = record
            .timestamp
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Nanos, true);

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO student_cards
                (name, roll_number, class_div, allergies, photo_url, rack_number, bus_route, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(roll_number) DO UPDATE SET
                name = excluded.name,
                class_div = excluded.class_div,
                allergies = excluded.allergies,
                photo_url = excluded.photo_url,
                rack_number = excluded.rack_number,
                bus_route = excluded.bus_route,
                timestamp = excluded.timestamp",
            params![
                record.name,
                record.roll_number,
                record.class_div,
                allergies,
                photo_url,
                record.rack_number,
                record.bus_route,
                timestamp,
            ],
        )?;
        let stored = select_one(&tx, &record.roll_number)?;
        tx.commit()?;
        stored.ok_or_else(|| StoreError::Corrupt {
            key: record.roll_number.clone(),
            reason: "row missing right after write".to_string(),
        })
    }

    fn delete_by_key(&self, roll_number: &str) -> StoreResult<bool> {
        let removed = self.conn().execute(
            "DELETE FROM student_cards WHERE roll_number = ?1",
            params![roll_number],
        )?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(roll: &str, name: &str) -> StudentRecord {
        StudentRecord {
            name: name.into(),
            roll_number: roll.into(),
            class_div: "10A".into(),
            allergies: vec![Allergy::Gluten, Allergy::TreeNuts],
            rack_number: "R7".into(),
            bus_route: "None".into(),
            photo: Some(PhotoRef::url(format!("/uploads/{roll}.png"))),
            timestamp: None,
        }
    }

    #[test]
    fn roundtrip_and_upsert_by_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        let saved = store.upsert(record("42", "Mira")).unwrap();
        assert_eq!(store.get_by_key("42").unwrap(), Some(saved));

        store.upsert(record("42", "Mira K")).unwrap();
        let all = store.list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Mira K");
    }

    #[test]
    fn list_is_newest_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut older = record("1", "Older");
        older.timestamp = Some("2024-01-01T00:00:00Z".parse().unwrap());
        let mut newer = record("2", "Newer");
        newer.timestamp = Some("2024-05-01T00:00:00Z".parse().unwrap());
        store.upsert(older).unwrap();
        store.upsert(newer).unwrap();

        let names: Vec<String> = store.list().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Newer", "Older"]);
    }

    #[test]
    fn corrupt_rows_are_skipped_by_list() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert(record("1", "Fine")).unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO student_cards
                    (name, roll_number, class_div, allergies, photo_url, rack_number, bus_route, timestamp)
                 VALUES ('Broken', '2', '1A', 'nope', '/uploads/x.png', 'R1', 'None', 'yesterday')",
                [],
            )
            .unwrap();

        let all = store.list().unwrap();
        assert_eq!(all.len(), 1);
        assert!(matches!(
            store.get_by_key("2"),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn deleting_missing_key_leaves_list_unchanged() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert(record("1", "First")).unwrap();
        store.upsert(record("2", "Second")).unwrap();
        let before = store.list().unwrap();

        assert!(!store.delete_by_key("3").unwrap());
        assert_eq!(store.list().unwrap(), before);
    }

    #[test]
    fn delete_reports_presence() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert(record("9", "Nine")).unwrap();
        assert!(store.delete_by_key("9").unwrap());
        assert!(!store.delete_by_key("9").unwrap());
        assert!(store.list().unwrap().is_empty());
    }
}
