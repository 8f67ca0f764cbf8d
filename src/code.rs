//! Scannable summary code embedded in every card.

use qrcode::{Color, EcLevel, QrCode};
use serde::Serialize;

use crate::record::StudentRecord;

/// Fields carried by the code, in display order. Nothing else is encoded.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodePayload<'a> {
    pub name: &'a str,
    pub roll_number: &'a str,
    pub class_div: &'a str,
    pub allergies: Vec<&'static str>,
    pub rack_number: &'a str,
    pub bus_route: &'a str,
}

impl<'a> From<&'a StudentRecord> for CodePayload<'a> {
    fn from(record: &'a StudentRecord) -> Self {
        Self {
            name: &record.name,
            roll_number: &record.roll_number,
            class_div: &record.class_div,
            allergies: record.allergies.iter().map(|a| a.label()).collect(),
            rack_number: &record.rack_number,
            bus_route: &record.bus_route,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodeError {
    #[error("failed to serialize code payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("payload does not fit in a QR code: {0}")]
    Encode(String),
}

/// A square grid of dark/light modules plus the text it encodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedCode {
    payload: String,
    width: usize,
    modules: Vec<bool>,
}

impl EmbeddedCode {
    pub fn for_record(record: &StudentRecord) -> Result<Self, CodeError> {
        let payload = serde_json::to_string(&CodePayload::from(record))?;
        Self::from_payload(payload)
    }

    pub fn from_payload(payload: impl Into<String>) -> Result<Self, CodeError> {
        let payload = payload.into();
        let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::M)
            .map_err(|err| CodeError::Encode(err.to_string()))?;
        let width = code.width();
        let modules = code
            .to_colors()
            .into_iter()
            .map(|c| c == Color::Dark)
            .collect();
        Ok(Self {
            payload,
            width,
            modules,
        })
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Modules per side, quiet zone excluded.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.width && self.modules[y * self.width + x]
    }

    /// Text rendition with two characters per module, used by `render code`.
    pub fn to_text(&self) -> String {
        let quiet = 2;
        let side = self.width + 2 * quiet;
        let mut out = String::with_capacity(side * (side * 2 + 1));
        for y in 0..side {
            for x in 0..side {
                let dark = x >= quiet
                    && y >= quiet
                    && self.is_dark(x - quiet, y - quiet);
                out.push_str(if dark { "██" } else { "  " });
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Allergy;
    use crate::record::PhotoRef;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn record() -> StudentRecord {
        StudentRecord {
            name: "Asha Rao".into(),
            roll_number: "2023007".into(),
            class_div: "8A".into(),
            allergies: vec![Allergy::Peanuts, Allergy::TreeNuts],
            rack_number: "R12".into(),
            bus_route: "Route 2".into(),
            photo: Some(PhotoRef::url("/uploads/asha.png")),
            timestamp: Some("2024-06-01T10:00:00Z".parse().unwrap()),
        }
    }

    #[test]
    fn payload_has_exactly_the_summary_fields() {
        let code = EmbeddedCode::for_record(&record()).unwrap();
        let value: Value = serde_json::from_str(code.payload()).unwrap();
        let mut keys: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["allergies", "busRoute", "classDiv", "name", "rackNumber", "rollNumber"]
        );
        assert_eq!(value["allergies"], serde_json::json!(["Peanuts", "Tree Nuts"]));
    }

    #[test]
    fn grid_is_square_and_has_finder_corner() {
        let code = EmbeddedCode::for_record(&record()).unwrap();
        assert!(code.width() >= 21);
        assert_eq!(code.width() % 4, 1);
        // Top-left finder pattern starts with a dark module.
        assert!(code.is_dark(0, 0));
        assert!(!code.is_dark(code.width(), 0));
    }
}
