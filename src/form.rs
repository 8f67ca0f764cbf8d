//! Form controller: draft editing, submission and the saved-card panel.
//!
//! Every user action returns either a success [`Notice`] or a [`FormError`]
//! whose [`FormError::notice`] gives the message to show. Nothing here panics
//! on bad input or a failing store.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::ImageFormat;
use tracing::{debug, info};

use crate::artifact::CardArtifact;
use crate::catalog::Allergy;
use crate::code::{CodeError, EmbeddedCode};
use crate::export::{ExportError, ExportedImage, Exporter, Surface};
use crate::record::{PhotoRef, StudentRecord, ValidationError, check_photo_upload};
use crate::store::{RecordStore, StoreError};
use crate::templates::{RenderContext, Template, TemplateRegistry, UnknownTemplate, Variant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Success,
    Destructive,
}

/// User-visible outcome of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub tone: Tone,
    pub title: String,
    pub description: String,
}

impl Notice {
    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            tone: Tone::Success,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            tone: Tone::Destructive,
            title: title.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.description)
    }
}

/// Editable scalar fields of the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    RollNumber,
    ClassDiv,
    RackNumber,
    BusRoute,
}

/// The in-progress form contents. Has no identity until submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub name: String,
    pub roll_number: String,
    pub class_div: String,
    pub allergies: Vec<Allergy>,
    pub rack_number: String,
    pub bus_route: String,
    pub photo: Option<PhotoRef>,
}

impl Draft {
    /// Trimmed record built from the draft. Not validated.
    pub fn to_record(&self) -> StudentRecord {
        StudentRecord {
            name: self.name.trim().to_string(),
            roll_number: self.roll_number.trim().to_string(),
            class_div: self.class_div.trim().to_string(),
            allergies: self.allergies.clone(),
            rack_number: self.rack_number.trim().to_string(),
            bus_route: self.bus_route.trim().to_string(),
            photo: self.photo.clone(),
            timestamp: None,
        }
    }
}

impl From<StudentRecord> for Draft {
    fn from(record: StudentRecord) -> Self {
        Self {
            name: record.name,
            roll_number: record.roll_number,
            class_div: record.class_div,
            allergies: record.allergies,
            rack_number: record.rack_number,
            bus_route: record.bus_route,
            photo: record.photo,
        }
    }
}

/// A photo the user picked, before it is accepted into the draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    pub path: PathBuf,
    pub size: u64,
    pub content_type: String,
}

impl PhotoUpload {
    /// Describe a file on disk, guessing its content type from the extension.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, FormError> {
        let path = path.into();
        let meta = fs::metadata(&path).map_err(|source| FormError::PhotoUnreadable {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            content_type: guess_content_type(&path),
            size: meta.len(),
            path,
        })
    }
}

pub fn guess_content_type(path: &Path) -> String {
    ImageFormat::from_path(path)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| "application/octet-stream".to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("cannot read photo {}: {source}", path.display())]
    PhotoUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Template(#[from] UnknownTemplate),
    #[error("failed to save card: {0}")]
    Save(#[source] StoreError),
    #[error("failed to load saved cards: {0}")]
    Load(#[source] StoreError),
    #[error("failed to delete card: {0}")]
    Delete(#[source] StoreError),
    #[error("no saved card with roll number '{0}'")]
    NotFound(String),
    #[error(transparent)]
    Code(#[from] CodeError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

impl FormError {
    /// The notice shown to the user for this failure.
    pub fn notice(&self) -> Notice {
        match self {
            FormError::Invalid(err) => validation_notice(err),
            FormError::PhotoUnreadable { .. } => {
                Notice::destructive("Invalid file type", "Please upload an image file")
            }
            FormError::Template(err) => Notice::destructive("Unknown template", err.to_string()),
            FormError::Save(StoreError::Invalid(err)) => validation_notice(err),
            FormError::Save(err) => Notice::destructive("Save failed", err.to_string()),
            FormError::Load(err) => Notice::destructive("Could not load cards", err.to_string()),
            FormError::Delete(err) => Notice::destructive("Delete failed", err.to_string()),
            FormError::NotFound(roll) => Notice::destructive(
                "Card not found",
                format!("No saved card has roll number {roll}"),
            ),
            FormError::Code(err) => Notice::destructive("Preview failed", err.to_string()),
            FormError::Export(ExportError::NoCard) => Notice::destructive(
                "No card generated",
                "Please submit the form to generate an ID card first",
            ),
            FormError::Export(_) => Notice::destructive(
                "Download failed",
                "Failed to download the ID card. Please try again.",
            ),
        }
    }
}

fn validation_notice(err: &ValidationError) -> Notice {
    match err {
        ValidationError::MissingInfo(_) => {
            Notice::destructive("Missing information", "Please fill in all required fields")
        }
        ValidationError::MissingPhoto => {
            Notice::destructive("Missing photo", "Please upload a student photo")
        }
        ValidationError::PhotoTooLarge { .. } => {
            Notice::destructive("File too large", "Please upload an image smaller than 5MB")
        }
        ValidationError::NotAnImage(_) => {
            Notice::destructive("Invalid file type", "Please upload an image file")
        }
        other => Notice::destructive("Invalid value", other.to_string()),
    }
}

/// Result of a successful export.
#[derive(Debug, Clone)]
pub struct Exported {
    pub image: ExportedImage,
    pub notice: Notice,
}

/// Orchestrates the draft, the record store, the renderer and the exporter.
pub struct FormController {
    store: Arc<dyn RecordStore>,
    exporter: Exporter,
    surface: Arc<Surface>,
    ctx: RenderContext,
    template: &'static Template,
    draft: Draft,
    submitted: Option<StudentRecord>,
}

impl FormController {
    pub fn new(
        store: Arc<dyn RecordStore>,
        exporter: Exporter,
        surface: Arc<Surface>,
        ctx: RenderContext,
    ) -> Self {
        Self {
            store,
            exporter,
            surface,
            ctx,
            template: TemplateRegistry::describe(Variant::Blue),
            draft: Draft::default(),
            submitted: None,
        }
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    pub fn template(&self) -> &'static Template {
        self.template
    }

    /// Whether a submitted card exists to preview and export.
    pub fn has_submitted(&self) -> bool {
        self.submitted.is_some()
    }

    pub fn submitted(&self) -> Option<&StudentRecord> {
        self.submitted.as_ref()
    }

    pub fn set_field(&mut self, field: Field, value: impl Into<String>) {
        let value = value.into();
        let slot = match field {
            Field::Name => &mut self.draft.name,
            Field::RollNumber => &mut self.draft.roll_number,
            Field::ClassDiv => &mut self.draft.class_div,
            Field::RackNumber => &mut self.draft.rack_number,
            Field::BusRoute => &mut self.draft.bus_route,
        };
        *slot = value;
    }

    /// Flip an allergy on or off. Returns whether it is now selected.
    pub fn toggle_allergy(&mut self, allergy: Allergy) -> bool {
        let allergies = &mut self.draft.allergies;
        match allergies.iter().position(|a| *a == allergy) {
            Some(idx) => {
                allergies.remove(idx);
                false
            }
            None => {
                allergies.push(allergy);
                true
            }
        }
    }

    pub fn select_template(&mut self, name: &str) -> Result<&'static Template, FormError> {
        self.template = TemplateRegistry::get(name)?;
        Ok(self.template)
    }

    /// Accept a photo into the draft after the size and type checks.
    pub fn attach_photo(&mut self, upload: PhotoUpload) -> Result<(), FormError> {
        check_photo_upload(upload.size, &upload.content_type)?;
        debug!(path = %upload.path.display(), size = upload.size, "photo attached");
        self.draft.photo = Some(PhotoRef::Local(upload.path));
        Ok(())
    }

    pub fn submit(&mut self) -> Result<Notice, FormError> {
        let record = self.draft.to_record();
        record.validate()?;
        let saved = self.store.upsert(record).map_err(FormError::Save)?;
        info!(roll_number = %saved.roll_number, backend = self.store.backend(), "card submitted");
        self.submitted = Some(saved);
        Ok(Notice::success(
            "ID Card Generated",
            "Student ID card has been successfully generated",
        ))
    }

    pub fn saved_cards(&self) -> Result<Vec<StudentRecord>, FormError> {
        self.store.list().map_err(FormError::Load)
    }

    /// Replace the draft with a saved card, discarding unsaved edits.
    pub fn load_saved(&mut self, roll_number: &str) -> Result<Notice, FormError> {
        let record = self
            .store
            .get_by_key(roll_number)
            .map_err(FormError::Load)?
            .ok_or_else(|| FormError::NotFound(roll_number.to_string()))?;
        self.draft = Draft::from(record.clone());
        self.submitted = Some(record);
        Ok(Notice::success(
            "Card loaded",
            "The saved card has been loaded and ready to view or edit",
        ))
    }

    pub fn delete_saved(&mut self, roll_number: &str) -> Result<Notice, FormError> {
        let removed = self
            .store
            .delete_by_key(roll_number)
            .map_err(FormError::Delete)?;
        if !removed {
            return Err(FormError::NotFound(roll_number.to_string()));
        }
        if self
            .submitted
            .as_ref()
            .is_some_and(|r| r.roll_number == roll_number)
        {
            self.submitted = None;
        }
        Ok(Notice::success("Card deleted", "The saved card has been deleted"))
    }

    /// Render the submitted card with the selected template.
    pub fn preview(&self) -> Result<Option<CardArtifact>, FormError> {
        let Some(record) = &self.submitted else {
            return Ok(None);
        };
        let code = EmbeddedCode::for_record(record)?;
        Ok(Some(self.template.render(record, &code, &self.ctx)))
    }

    pub fn export(&self) -> Result<Exported, FormError> {
        let card = self.preview()?;
        let name = self.submitted.as_ref().map(|r| r.name.as_str()).unwrap_or("");
        let image = self.exporter.export(&self.surface, card.as_ref(), name)?;
        Ok(Exported {
            image,
            notice: Notice::success("Download successful", "ID card has been downloaded as PNG"),
        })
    }
}
