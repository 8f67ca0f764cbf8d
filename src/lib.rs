//! Core library for student ID card generation.
//!
//! Records are kept in a [`RecordStore`], laid out by a [`Template`] into a
//! [`CardArtifact`] and exported to PNG through an [`Exporter`].

pub mod api;
pub mod artifact;
pub mod catalog;
pub mod code;
pub mod config;
pub mod export;
pub mod form;
pub mod image;
pub mod record;
pub mod schema;
pub mod server;
pub mod store;
pub mod templates;

pub use artifact::{CardArtifact, Color, Node, Paint, PhotoSlot, Rect, RegionKind};
pub use catalog::Allergy;
pub use code::{CodeError, CodePayload, EmbeddedCode};
pub use config::{Config, ConfigError, StoreBackend};
pub use export::{ExportError, ExportScope, ExportedImage, Exporter, Surface, export_file_name};
pub use form::{Draft, Field, FormController, FormError, Notice, PhotoUpload, Tone};
pub use record::{MAX_PHOTO_BYTES, PhotoRef, StudentRecord, ValidationError};
pub use store::{LocalStore, RecordStore, RemoteStore, SqliteStore, StoreError, open_backend, open_store};
pub use templates::{RenderContext, Template, TemplateRegistry, Variant};

/// Render `record` with `template`, building its embedded code first.
pub fn render_card(
    template: &Template,
    record: &StudentRecord,
    ctx: &RenderContext,
) -> Result<CardArtifact, CodeError> {
    let code = EmbeddedCode::for_record(record)?;
    Ok(template.render(record, &code, ctx))
}
