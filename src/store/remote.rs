use std::fs;
use std::time::Duration;

use image::{ImageFormat, RgbaImage};
use reqwest::StatusCode;
use reqwest::Url;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use tracing::{debug, warn};

use crate::api::{CARDS_PATH, CardBody, ErrorBody, PHOTO_FIELD};
use crate::image::PhotoResolver;
use crate::record::{PhotoRef, StudentRecord, ValidationError};
use crate::store::{RecordStore, StoreError, StoreResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Record store reached over the card server's CRUD API.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    base: Url,
    client: Client,
}

impl RemoteStore {
    pub fn new(base_url: &str) -> StoreResult<Self> {
        let base = parse_base(base_url)?;
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { base, client })
    }

    /// Resolver that fetches server-side photos from the same host.
    pub fn photo_resolver(&self) -> HttpPhotoResolver {
        HttpPhotoResolver {
            base: self.base.clone(),
            client: self.client.clone(),
        }
    }

    fn cards_url(&self, roll_number: Option<&str>) -> StoreResult<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| StoreError::Api {
                status: 0,
                message: format!("'{}' cannot be used as a base URL", self.base),
                details: None,
            })?;
            segments.pop_if_empty();
            segments.extend(CARDS_PATH.trim_start_matches('/').split('/'));
            if let Some(roll) = roll_number {
                segments.push(roll);
            }
        }
        Ok(url)
    }

    fn photo_part(&self, photo: &PhotoRef) -> StoreResult<Part> {
        let (bytes, file_name, mime) = match photo {
            PhotoRef::Local(path) => {
                let bytes = fs::read(path).map_err(|err| StoreError::io(path, err))?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "photo".to_string());
                let mime = ImageFormat::from_path(path)
                    .map(|f| f.to_mime_type().to_string())
                    .unwrap_or_else(|_| "application/octet-stream".to_string());
                (bytes, file_name, mime)
            }
            PhotoRef::Url(url) => {
                let target = self.base.join(url).map_err(|err| StoreError::Api {
                    status: 0,
                    message: format!("invalid photo URL '{url}': {err}"),
                    details: None,
                })?;
                let response = self.client.get(target).send()?;
                if !response.status().is_success() {
                    return Err(api_error(response));
                }
                let mime = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let file_name = url.rsplit('/').next().unwrap_or("photo").to_string();
                (response.bytes()?.to_vec(), file_name, mime)
            }
        };
        Ok(Part::bytes(bytes).file_name(file_name).mime_str(&mime)?)
    }
}

fn parse_base(base_url: &str) -> StoreResult<Url> {
    Url::parse(base_url).map_err(|err| StoreError::Api {
        status: 0,
        message: format!("invalid card server URL '{base_url}': {err}"),
        details: None,
    })
}

/// Convert a non-success response into an error carrying the server's detail.
fn api_error(response: Response) -> StoreError {
    let status = response.status();
    let fallback = status
        .canonical_reason()
        .unwrap_or("unexpected status")
        .to_string();
    let (message, details) = match response.json::<ErrorBody>() {
        Ok(body) => (body.error, body.details),
        Err(_) => (fallback, None),
    };
    StoreError::Api {
        status: status.as_u16(),
        message,
        details,
    }
}

fn into_record(body: CardBody) -> StoreResult<StudentRecord> {
    let key = body.roll_number.clone();
    StudentRecord::try_from(body).map_err(|err| StoreError::Corrupt {
        key,
        reason: err.to_string(),
    })
}

impl RecordStore for RemoteStore {
    fn backend(&self) -> &'static str {
        "remote"
    }

    fn list(&self) -> StoreResult<Vec<StudentRecord>> {
        let response = self.client.get(self.cards_url(None)?).send()?;
        if !response.status().is_success() {
            return Err(api_error(response));
        }
        let bodies: Vec<CardBody> = response.json()?;
        let mut records = Vec::with_capacity(bodies.len());
        for body in bodies {
            match into_record(body) {
                Ok(record) => records.push(record),
                Err(err) => warn!(error = %err, "skipping unreadable card from server"),
            }
        }
        Ok(records)
    }

    fn get_by_key(&self, roll_number: &str) -> StoreResult<Option<StudentRecord>> {
        let response = self.client.get(self.cards_url(Some(roll_number))?).send()?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => into_record(response.json()?).map(Some),
            _ => Err(api_error(response)),
        }
    }

    fn upsert(&self, record: StudentRecord) -> StoreResult<StudentRecord> {
        record.validate()?;
        let photo = record.photo.as_ref().ok_or(ValidationError::MissingPhoto)?;
        let mut form = Form::new()
            .text("name", record.name.clone())
            .text("rollNumber", record.roll_number.clone())
            .text("classDiv", record.class_div.clone())
            .text("allergies", serde_json::to_string(&record.allergy_labels())?)
            .text("rackNumber", record.rack_number.clone())
            .text("busRoute", record.bus_route.clone());
        if let Some(ts) = record.timestamp {
            form = form.text("timestamp", ts.to_rfc3339());
        }
        form = form.part(PHOTO_FIELD, self.photo_part(photo)?);

        let response = self
            .client
            .post(self.cards_url(None)?)
            .multipart(form)
            .send()?;
        if response.status() != StatusCode::CREATED {
            return Err(api_error(response));
        }
        let saved = into_record(response.json()?)?;
        debug!(roll_number = %saved.roll_number, "record saved on card server");
        Ok(saved)
    }

    fn delete_by_key(&self, roll_number: &str) -> StoreResult<bool> {
        let response = self
            .client
            .delete(self.cards_url(Some(roll_number))?)
            .send()?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(api_error(response)),
        }
    }
}

/// Loads photos referenced by server URLs, and local files directly.
#[derive(Debug, Clone)]
pub struct HttpPhotoResolver {
    base: Url,
    client: Client,
}

impl PhotoResolver for HttpPhotoResolver {
    fn resolve(&self, photo: &PhotoRef) -> Option<RgbaImage> {
        match photo {
            PhotoRef::Local(path) => image::open(path).ok().map(|img| img.to_rgba8()),
            PhotoRef::Url(url) => {
                let target = self.base.join(url).ok()?;
                let response = self.client.get(target).send().ok()?;
                if !response.status().is_success() {
                    debug!(%url, status = %response.status(), "photo fetch failed");
                    return None;
                }
                let bytes = response.bytes().ok()?;
                image::load_from_memory(&bytes).ok().map(|img| img.to_rgba8())
            }
        }
    }
}
