//! Wire types shared by the REST server and the remote store client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{Allergy, UnknownAllergy};
use crate::record::{InvalidPhotoRef, PhotoRef, StudentRecord};

pub const CARDS_PATH: &str = "/api/student-cards";
pub const UPLOADS_PATH: &str = "/uploads";

/// Multipart field carrying the photo file.
pub const PHOTO_FIELD: &str = "photo";

/// A stored card as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardBody {
    pub name: String,
    pub roll_number: String,
    pub class_div: String,
    #[serde(default)]
    pub allergies: Vec<String>,
    pub photo_url: String,
    pub rack_number: String,
    pub bus_route: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<&StudentRecord> for CardBody {
    fn from(record: &StudentRecord) -> Self {
        Self {
            name: record.name.clone(),
            roll_number: record.roll_number.clone(),
            class_div: record.class_div.clone(),
            allergies: record.allergy_labels(),
            photo_url: record
                .photo
                .as_ref()
                .map(PhotoRef::to_uri)
                .unwrap_or_default(),
            rack_number: record.rack_number.clone(),
            bus_route: record.bus_route.clone(),
            timestamp: record.timestamp,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CardBodyError {
    #[error(transparent)]
    Allergy(#[from] UnknownAllergy),
    #[error(transparent)]
    Photo(#[from] InvalidPhotoRef),
}

impl TryFrom<CardBody> for StudentRecord {
    type Error = CardBodyError;

    fn try_from(body: CardBody) -> Result<Self, Self::Error> {
        let allergies = body
            .allergies
            .iter()
            .map(|label| label.parse::<Allergy>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StudentRecord {
            name: body.name,
            roll_number: body.roll_number,
            class_div: body.class_div,
            allergies,
            rack_number: body.rack_number,
            bus_route: body.bus_route,
            photo: Some(PhotoRef::parse(&body.photo_url)?),
            timestamp: body.timestamp,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}
