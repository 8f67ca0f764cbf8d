use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{self, Allergy, UnknownAllergy};

/// Largest photo accepted by the form and the upload endpoint.
pub const MAX_PHOTO_BYTES: u64 = 5 * 1024 * 1024;

const FILE_SCHEME: &str = "file://";

/// Where a student's photo can be found.
///
/// Local references point at image bytes on the client's disk and are never
/// persisted as bytes; URLs point at a previously uploaded file on the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum PhotoRef {
    Local(PathBuf),
    Url(String),
}

impl PhotoRef {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        PhotoRef::Local(path.into())
    }

    pub fn url(url: impl Into<String>) -> Self {
        PhotoRef::Url(url.into())
    }

    /// Single-string form used in storage and on the wire.
    pub fn to_uri(&self) -> String {
        match self {
            PhotoRef::Local(path) => format!("{FILE_SCHEME}{}", path.display()),
            PhotoRef::Url(url) => url.clone(),
        }
    }

    pub fn parse(uri: &str) -> Result<Self, InvalidPhotoRef> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(InvalidPhotoRef);
        }
        match uri.strip_prefix(FILE_SCHEME) {
            Some(path) if !path.is_empty() => Ok(PhotoRef::Local(PathBuf::from(path))),
            Some(_) => Err(InvalidPhotoRef),
            None => Ok(PhotoRef::Url(uri.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("photo reference must be a non-empty URL or file:// path")]
pub struct InvalidPhotoRef;

impl From<PhotoRef> for String {
    fn from(value: PhotoRef) -> Self {
        value.to_uri()
    }
}

impl TryFrom<String> for PhotoRef {
    type Error = InvalidPhotoRef;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PhotoRef::parse(&value)
    }
}

impl fmt::Display for PhotoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

/// A single student's ID-card data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub name: String,
    pub roll_number: String,
    pub class_div: String,
    #[serde(default)]
    pub allergies: Vec<Allergy>,
    pub rack_number: String,
    pub bus_route: String,
    #[serde(default)]
    pub photo: Option<PhotoRef>,
    /// Stamped by the store when the caller leaves it empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl StudentRecord {
    /// Check every invariant a record must satisfy before it is stored or rendered.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let required = [
            ("name", &self.name),
            ("rollNumber", &self.roll_number),
            ("classDiv", &self.class_div),
            ("rackNumber", &self.rack_number),
            ("busRoute", &self.bus_route),
        ];
        let missing: Vec<&'static str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| *field)
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingInfo(missing));
        }
        if self.photo.is_none() {
            return Err(ValidationError::MissingPhoto);
        }
        if !catalog::is_class_code(&self.class_div) {
            return Err(ValidationError::UnknownClass(self.class_div.clone()));
        }
        if !catalog::is_bus_route(&self.bus_route) {
            return Err(ValidationError::UnknownRoute(self.bus_route.clone()));
        }
        for (idx, allergy) in self.allergies.iter().enumerate() {
            if self.allergies[..idx].contains(allergy) {
                return Err(ValidationError::DuplicateAllergy(*allergy));
            }
        }
        Ok(())
    }

    pub fn allergy_labels(&self) -> Vec<String> {
        self.allergies.iter().map(|a| a.label().to_string()).collect()
    }
}

/// Caller errors detected before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingInfo(Vec<&'static str>),
    #[error("a student photo is required")]
    MissingPhoto,
    #[error("unknown class/division '{0}'")]
    UnknownClass(String),
    #[error("unknown bus route '{0}'")]
    UnknownRoute(String),
    #[error(transparent)]
    UnknownAllergy(#[from] UnknownAllergy),
    #[error("allergy '{0}' is listed more than once")]
    DuplicateAllergy(Allergy),
    #[error("photo is {size} bytes; the limit is {limit} bytes")]
    PhotoTooLarge { size: u64, limit: u64 },
    #[error("'{0}' is not an image type")]
    NotAnImage(String),
}

impl ValidationError {
    /// Field names (camelCase, as on the wire) the error refers to.
    pub fn fields(&self) -> Vec<&'static str> {
        match self {
            ValidationError::MissingInfo(fields) => fields.clone(),
            ValidationError::MissingPhoto
            | ValidationError::PhotoTooLarge { .. }
            | ValidationError::NotAnImage(_) => vec!["photo"],
            ValidationError::UnknownClass(_) => vec!["classDiv"],
            ValidationError::UnknownRoute(_) => vec!["busRoute"],
            ValidationError::UnknownAllergy(_) | ValidationError::DuplicateAllergy(_) => {
                vec!["allergies"]
            }
        }
    }
}

/// Enforce the size ceiling and `image/*` content type on an attached photo.
pub fn check_photo_upload(size: u64, content_type: &str) -> Result<(), ValidationError> {
    if size > MAX_PHOTO_BYTES {
        return Err(ValidationError::PhotoTooLarge {
            size,
            limit: MAX_PHOTO_BYTES,
        });
    }
    if !content_type.trim().to_ascii_lowercase().starts_with("image/") {
        return Err(ValidationError::NotAnImage(content_type.to_string()));
    }
    Ok(())
}
