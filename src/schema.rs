//! Versioned on-disk shape of the local record collection.
//!
//! The collection is stored as a single JSON document:
//!
//! ```json
//! { "version": 1, "records": [ ... ], "quarantine": [ ... ] }
//! ```
//!
//! Older installs wrote a bare JSON array of form snapshots (with a
//! `photoUrl` string and a serialized `photo` file handle). Those are migrated
//! on read. Records that fail validation are moved to `quarantine` instead of
//! being returned or silently dropped.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::record::StudentRecord;

pub const SCHEMA_VERSION: u32 = 1;

/// The stored collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u32,
    pub records: Vec<StudentRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quarantine: Vec<Quarantined>,
}

impl Envelope {
    pub fn new() -> Self {
        Self {
            version: SCHEMA_VERSION,
            records: Vec::new(),
            quarantine: Vec::new(),
        }
    }
}

/// A stored entry that could not be read back as a valid record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quarantined {
    pub reason: String,
    pub raw: Value,
    pub quarantined_at: DateTime<Utc>,
}

impl Quarantined {
    fn new(reason: impl Into<String>, raw: Value) -> Self {
        Self {
            reason: reason.into(),
            raw,
            quarantined_at: Utc::now(),
        }
    }
}

/// Result of reading a stored document.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub envelope: Envelope,
    /// Set when the document was written by an older schema.
    pub migrated_from: Option<u32>,
    /// Number of entries moved to quarantine during this read.
    pub newly_quarantined: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("stored document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("stored document has unsupported schema version {0}")]
    UnsupportedVersion(u64),
    #[error("stored document has unexpected shape: {0}")]
    Malformed(&'static str),
}

/// Parse, migrate and validate a stored document.
pub fn decode(raw: &str) -> Result<Decoded, SchemaError> {
    let value: Value = serde_json::from_str(raw)?;
    match value {
        Value::Array(items) => {
            let items = items.into_iter().map(migrate_legacy_entry).collect();
            let (records, quarantine) = validate_entries(items);
            let newly_quarantined = quarantine.len();
            Ok(Decoded {
                envelope: Envelope {
                    version: SCHEMA_VERSION,
                    records,
                    quarantine,
                },
                migrated_from: Some(0),
                newly_quarantined,
            })
        }
        Value::Object(mut obj) => {
            let version = obj
                .get("version")
                .and_then(Value::as_u64)
                .ok_or(SchemaError::Malformed("missing numeric 'version'"))?;
            if version == 0 || version > u64::from(SCHEMA_VERSION) {
                return Err(SchemaError::UnsupportedVersion(version));
            }
            let records = match obj.remove("records") {
                Some(Value::Array(items)) => items,
                Some(Value::Null) | None => Vec::new(),
                Some(_) => return Err(SchemaError::Malformed("'records' is not an array")),
            };
            let mut quarantine = match obj.remove("quarantine") {
                Some(Value::Array(items)) => items
                    .into_iter()
                    .map(|item| {
                        serde_json::from_value::<Quarantined>(item.clone())
                            .unwrap_or_else(|_| Quarantined::new("unreadable quarantine entry", item))
                    })
                    .collect(),
                _ => Vec::new(),
            };
            let (records, fresh) = validate_entries(records);
            let newly_quarantined = fresh.len();
            quarantine.extend(fresh);
            Ok(Decoded {
                envelope: Envelope {
                    version: SCHEMA_VERSION,
                    records,
                    quarantine,
                },
                migrated_from: None,
                newly_quarantined,
            })
        }
        _ => Err(SchemaError::Malformed("expected an object or an array")),
    }
}

pub fn encode(envelope: &Envelope) -> Result<String, serde_json::Error> {
    serde_json::to_string(envelope)
}

fn validate_entries(items: Vec<Value>) -> (Vec<StudentRecord>, Vec<Quarantined>) {
    let mut records = Vec::with_capacity(items.len());
    let mut quarantine = Vec::new();
    let mut seen = HashSet::new();
    for item in items {
        let record = match serde_json::from_value::<StudentRecord>(item.clone()) {
            Ok(record) => record,
            Err(err) => {
                quarantine.push(Quarantined::new(err.to_string(), item));
                continue;
            }
        };
        if let Err(err) = record.validate() {
            quarantine.push(Quarantined::new(err.to_string(), item));
            continue;
        }
        if !seen.insert(record.roll_number.clone()) {
            quarantine.push(Quarantined::new(
                format!("duplicate roll number '{}'", record.roll_number),
                item,
            ));
            continue;
        }
        records.push(record);
    }
    (records, quarantine)
}

/// Rewrite a version-0 form snapshot into the version-1 record shape.
fn migrate_legacy_entry(item: Value) -> Value {
    let Value::Object(mut obj) = item else {
        return item;
    };
    let photo_url = obj.remove("photoUrl");
    obj.remove("photo");
    let photo = match photo_url {
        Some(Value::String(url)) if !url.trim().is_empty() => Value::String(url),
        _ => Value::Null,
    };
    let mut migrated = Map::with_capacity(obj.len() + 1);
    migrated.extend(obj);
    migrated.insert("photo".to_string(), photo);
    Value::Object(migrated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Allergy;
    use crate::record::PhotoRef;
    use pretty_assertions::assert_eq;

    #[test]
    fn legacy_array_is_migrated() {
        let raw = r#"[
            {"name":"John Smith","rollNumber":"2023001","classDiv":"5A","allergies":["Nuts","Dairy"],
             "photo":{},"photoUrl":"blob:http://localhost/abc","rackNumber":"R42","busRoute":"Route 1",
             "timestamp":"2024-06-01T10:00:00.000Z"}
        ]"#;
        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.migrated_from, Some(0));
        assert_eq!(decoded.envelope.records.len(), 1);
        let rec = &decoded.envelope.records[0];
        assert_eq!(rec.allergies, vec![Allergy::Nuts, Allergy::Dairy]);
        assert_eq!(rec.photo, Some(PhotoRef::url("blob:http://localhost/abc")));
        assert!(rec.timestamp.is_some());
    }

    #[test]
    fn invalid_entries_are_quarantined() {
        let raw = r#"{"version":1,"records":[
            {"name":"Ok","rollNumber":"1","classDiv":"1A","allergies":[],"rackNumber":"R1",
             "busRoute":"None","photo":"/uploads/1.png"},
            {"name":"Bad","rollNumber":"2","classDiv":"1A","allergies":["Pollen"],"rackNumber":"R1",
             "busRoute":"None","photo":"/uploads/2.png"},
            {"name":"Dup","rollNumber":"1","classDiv":"1A","allergies":[],"rackNumber":"R1",
             "busRoute":"None","photo":"/uploads/3.png"},
            42
        ]}"#;
        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.envelope.records.len(), 1);
        assert_eq!(decoded.envelope.records[0].name, "Ok");
        assert_eq!(decoded.newly_quarantined, 3);
        assert!(decoded.envelope.quarantine[1].reason.contains("duplicate"));
    }

    #[test]
    fn future_versions_and_garbage_rejected() {
        assert!(matches!(
            decode(r#"{"version":9,"records":[]}"#),
            Err(SchemaError::UnsupportedVersion(9))
        ));
        assert!(matches!(decode("{not json"), Err(SchemaError::Json(_))));
        assert!(matches!(decode("\"text\""), Err(SchemaError::Malformed(_))));
    }

    #[test]
    fn encoded_envelope_decodes_unchanged() {
        let mut env = Envelope::new();
        env.records.push(StudentRecord {
            name: "Asha Rao".into(),
            roll_number: "2023007".into(),
            class_div: "8A".into(),
            allergies: vec![Allergy::Peanuts],
            rack_number: "R12".into(),
            bus_route: "Route 2".into(),
            photo: Some(PhotoRef::local("/tmp/asha.png")),
            timestamp: None,
        });
        let decoded = decode(&encode(&env).unwrap()).unwrap();
        assert_eq!(decoded.envelope, env);
        assert_eq!(decoded.migrated_from, None);
    }
}
