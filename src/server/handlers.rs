use std::collections::HashMap;
use std::path::Path as FsPath;

use axum::Json;
use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use image::ImageFormat;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::api::{CardBody, PHOTO_FIELD, UPLOADS_PATH};
use crate::catalog::Allergy;
use crate::record::{PhotoRef, StudentRecord, ValidationError};
use crate::server::AppState;
use crate::server::response::{self, ApiError};
use crate::store::{RecordStore, StoreError};

pub async fn livez() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Run a blocking store call off the async workers.
async fn blocking<T, F>(state: &AppState, op: F) -> Result<Result<T, StoreError>, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&dyn RecordStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|err| {
            error!(error = %err, "store task panicked");
            ApiError::Internal("Internal server error")
        })
}

pub async fn list_cards(State(state): State<AppState>) -> Result<Json<Vec<CardBody>>, ApiError> {
    let records = blocking(&state, |store| store.list()).await?.map_err(|err| {
        error!(error = %err, "failed to list student cards");
        ApiError::Internal("Failed to fetch student cards")
    })?;
    Ok(Json(records.iter().map(CardBody::from).collect()))
}

pub async fn get_card(
    State(state): State<AppState>,
    Path(roll_number): Path<String>,
) -> Result<Json<CardBody>, ApiError> {
    let found = blocking(&state, move |store| store.get_by_key(&roll_number))
        .await?
        .map_err(|err| {
            error!(error = %err, "failed to fetch student card");
            ApiError::Internal("Failed to fetch student card")
        })?;
    found
        .map(|record| Json(CardBody::from(&record)))
        .ok_or(ApiError::NotFound)
}

pub async fn delete_card(
    State(state): State<AppState>,
    Path(roll_number): Path<String>,
) -> Result<Response, ApiError> {
    let key = roll_number.clone();
    // An unreadable row must not block its own deletion.
    let removed = blocking(&state, move |store| {
        let previous = store.get_by_key(&key).unwrap_or_default();
        Ok(store.delete_by_key(&key)?.then_some(previous))
    })
    .await?
    .map_err(|err| {
        error!(error = %err, "failed to delete student card");
        ApiError::Internal("Failed to delete student card")
    })?;
    let Some(previous) = removed else {
        return Err(ApiError::NotFound);
    };
    if let Some(photo) = previous.and_then(|card| card.photo) {
        remove_upload(&state, &photo).await;
    }
    info!(roll_number = %roll_number, "student card deleted");
    Ok(response::message(
        StatusCode::OK,
        "Student card deleted successfully",
    ))
}

struct Upload {
    bytes: Bytes,
    file_name: Option<String>,
    content_type: String,
}

/// Text fields and the photo of a card submission.
#[derive(Default)]
struct Submission {
    fields: HashMap<String, String>,
    photo: Option<Upload>,
}

impl Submission {
    async fn read(mut multipart: Multipart, limit: u64) -> Result<Self, ApiError> {
        let mut out = Submission::default();
        let fail = |err: MultipartError| multipart_error(err, limit);
        while let Some(field) = multipart.next_field().await.map_err(fail)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if name == PHOTO_FIELD {
                let content_type = field.content_type().unwrap_or_default().to_string();
                if !content_type.to_ascii_lowercase().starts_with("image/") {
                    return Err(ApiError::NotAnImage);
                }
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(fail)?;
                if bytes.len() as u64 > limit {
                    return Err(ApiError::TooLarge { limit });
                }
                out.photo = Some(Upload {
                    bytes,
                    file_name,
                    content_type,
                });
            } else {
                let value = field.text().await.map_err(fail)?;
                out.fields.insert(name, value);
            }
        }
        Ok(out)
    }

    fn text(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    fn allergies(&self) -> Result<Vec<Allergy>, ApiError> {
        let raw = self.text("allergies");
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        let labels: Vec<String> = serde_json::from_str(&raw).map_err(|_| {
            ApiError::InvalidData(serde_json::json!({
                "allergies": ["must be a JSON array of allergy labels"]
            }))
        })?;
        labels
            .iter()
            .map(|label| label.parse::<Allergy>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| ApiError::from(ValidationError::from(err)))
    }

    /// Optional client timestamp. A value that is not RFC 3339 is rejected.
    fn timestamp(&self) -> Result<Option<DateTime<Utc>>, ApiError> {
        let raw = self.text("timestamp");
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        DateTime::parse_from_rfc3339(raw)
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(|_| {
                ApiError::InvalidData(serde_json::json!({
                    "timestamp": ["must be an RFC 3339 date-time"]
                }))
            })
    }
}

fn multipart_error(err: MultipartError, limit: u64) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::TooLarge { limit };
    }
    ApiError::Malformed(err.body_text())
}

/// Delete the uploaded file behind `photo`. References outside the uploads
/// directory are left alone.
async fn remove_upload(state: &AppState, photo: &PhotoRef) {
    let PhotoRef::Url(url) = photo else {
        return;
    };
    let Some(name) = upload_name(url) else {
        return;
    };
    let path = state.uploads_dir.join(name);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => debug!(path = %path.display(), "removed replaced photo"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "failed to remove old photo"),
    }
}

/// File name of a `/uploads/<file>` URL, if it names a single plain file.
fn upload_name(url: &str) -> Option<&str> {
    let name = url.strip_prefix(UPLOADS_PATH)?.strip_prefix('/')?;
    let plain = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\']);
    plain.then_some(name)
}

/// `<millis>-<sha256 prefix><ext>`.
pub fn upload_file_name(bytes: &[u8], original: Option<&str>, content_type: &str) -> String {
    let digest = Sha256::digest(bytes);
    let hash: String = digest[..6].iter().map(|b| format!("{b:02x}")).collect();
    let ext = original
        .and_then(|name| FsPath::new(name).extension())
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .or_else(|| {
            ImageFormat::from_mime_type(content_type)
                .and_then(|format| format.extensions_str().first().map(|e| e.to_string()))
        })
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    format!("{}-{hash}{ext}", Utc::now().timestamp_millis())
}

pub async fn create_card(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let submission = Submission::read(multipart, state.max_upload_bytes).await?;
    let Some(photo) = submission.photo.as_ref() else {
        return Err(ApiError::PhotoRequired);
    };

    let file_name =
        upload_file_name(&photo.bytes, photo.file_name.as_deref(), &photo.content_type);
    let record = StudentRecord {
        name: submission.text("name").trim().to_string(),
        roll_number: submission.text("rollNumber").trim().to_string(),
        class_div: submission.text("classDiv").trim().to_string(),
        allergies: submission.allergies()?,
        rack_number: submission.text("rackNumber").trim().to_string(),
        bus_route: submission.text("busRoute").trim().to_string(),
        photo: Some(PhotoRef::url(format!("{UPLOADS_PATH}/{file_name}"))),
        timestamp: submission.timestamp()?,
    };
    record.validate()?;

    let path = state.uploads_dir.join(&file_name);
    tokio::fs::write(&path, &photo.bytes).await.map_err(|err| {
        error!(path = %path.display(), error = %err, "failed to store uploaded photo");
        ApiError::Internal("Failed to create student card")
    })?;

    let saved = blocking(&state, move |store| {
        let previous = store.get_by_key(&record.roll_number).unwrap_or_default();
        let saved = store.upsert(record)?;
        Ok((previous, saved))
    })
    .await?;
    match saved {
        Ok((previous, saved)) => {
            let replaced = previous
                .and_then(|prev| prev.photo)
                .filter(|old| Some(old) != saved.photo.as_ref());
            if let Some(old) = replaced {
                remove_upload(&state, &old).await;
            }
            info!(roll_number = %saved.roll_number, photo = %file_name, "student card saved");
            Ok((StatusCode::CREATED, Json(CardBody::from(&saved))).into_response())
        }
        Err(StoreError::Invalid(err)) => {
            let _ = tokio::fs::remove_file(&path).await;
            Err(err.into())
        }
        Err(err) => {
            warn!(error = %err, "failed to save student card");
            let _ = tokio::fs::remove_file(&path).await;
            Err(ApiError::Internal("Failed to create student card"))
        }
    }
}
