//! Form submission through PNG export with the software rasterizer.

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use image::{Rgb, Rgba, RgbaImage};
use idcard::export::{Exporter, Surface};
use idcard::form::{Field, FormController, PhotoUpload, Tone};
use idcard::image::{Appearance, FsPhotoResolver, PixelRasterizer};
use idcard::store::{FileKeyValue, LocalStore};
use idcard::templates::{RenderContext, TemplateRegistry};
use idcard::{Allergy, RecordStore};
use pretty_assertions::assert_eq;

const RATIO: u32 = 2;
const PHOTO_RED: [u8; 3] = [200, 30, 30];

fn form(dir: &Path, surface: Arc<Surface>) -> FormController {
    let store: Arc<dyn RecordStore> =
        Arc::new(LocalStore::new(FileKeyValue::open(dir.join("storage")).unwrap()));
    let rasterizer = PixelRasterizer::new(Box::new(FsPhotoResolver::new()), RATIO);
    FormController::new(
        store,
        Exporter::new(Box::new(rasterizer)),
        surface,
        RenderContext::new("Unity School", NaiveDate::from_ymd_opt(2024, 9, 1).unwrap()),
    )
}

fn write_photo(dir: &Path) -> PhotoUpload {
    let path = dir.join("asha.png");
    let [r, g, b] = PHOTO_RED;
    RgbaImage::from_pixel(60, 80, Rgba([r, g, b, 255]))
        .save(&path)
        .unwrap();
    PhotoUpload::from_file(&path).unwrap()
}

fn fill_asha(form: &mut FormController, dir: &Path) {
    form.set_field(Field::Name, "Asha Rao");
    form.set_field(Field::RollNumber, "2023007");
    form.set_field(Field::ClassDiv, "8A");
    form.set_field(Field::RackNumber, "R12");
    form.set_field(Field::BusRoute, "Route 2");
    form.toggle_allergy(Allergy::Peanuts);
    let upload = write_photo(dir);
    assert_eq!(upload.content_type, "image/png");
    form.attach_photo(upload).unwrap();
}

#[test]
fn asha_card_exports_as_opaque_png() {
    let dir = tempfile::tempdir().unwrap();
    let surface = Arc::new(Surface::new());
    let mut form = form(dir.path(), Arc::clone(&surface));
    fill_asha(&mut form, dir.path());

    let notice = form.submit().unwrap();
    assert_eq!(notice.tone, Tone::Success);
    assert_eq!(notice.title, "ID Card Generated");

    let card = form.preview().unwrap().unwrap();
    assert!(card.texts().contains(&"ID: UNITY-2023007"));

    let exported = form.export().unwrap();
    assert_eq!(exported.image.file_name, "ID_Card_Asha_Rao.png");
    assert_eq!(exported.notice.title, "Download successful");
    assert_eq!(surface.current(), Appearance::Screen);

    let path = exported.image.save_in(dir.path()).unwrap();
    let decoded = image::open(&path).unwrap();
    assert_eq!(decoded.color(), image::ColorType::Rgb8);
    let rgb = decoded.to_rgb8();
    assert_eq!(rgb.dimensions(), (card.width * RATIO, card.height * RATIO));

    let at = |x: u32, y: u32| *rgb.get_pixel(x * RATIO, y * RATIO);
    // Header colors are flattened to the export background.
    assert_eq!(at(200, 10), Rgb([255, 255, 255]));
    // The allergy alert keeps its red tint.
    assert_eq!(at(200, 192), Rgb([0xfe, 0xe2, 0xe2]));
    // The student photo is painted as-is.
    assert_eq!(at(58, 124), Rgb(PHOTO_RED));
}

#[test]
fn every_template_exports_the_saved_card() {
    let dir = tempfile::tempdir().unwrap();
    let mut form = form(dir.path(), Arc::new(Surface::new()));
    fill_asha(&mut form, dir.path());
    form.submit().unwrap();

    for tpl in TemplateRegistry::list() {
        form.select_template(tpl.name).unwrap();
        let card = form.preview().unwrap().unwrap();
        let exported = form.export().unwrap();
        assert_eq!(exported.image.width, card.width * RATIO, "{}", tpl.name);
        assert_eq!(exported.image.height, card.height * RATIO, "{}", tpl.name);
        let alert = card.alert_texts().unwrap();
        assert!(alert.contains(&"Peanuts"), "{}: {alert:?}", tpl.name);
    }
}

#[test]
fn saved_card_reloads_in_a_new_session() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut form = form(dir.path(), Arc::new(Surface::new()));
        fill_asha(&mut form, dir.path());
        form.submit().unwrap();
    }

    let mut form = form(dir.path(), Arc::new(Surface::new()));
    assert!(!form.has_submitted());
    assert_eq!(form.export().unwrap_err().notice().title, "No card generated");

    let saved = form.saved_cards().unwrap();
    assert_eq!(saved.len(), 1);
    let notice = form.load_saved(&saved[0].roll_number).unwrap();
    assert_eq!(notice.title, "Card loaded");
    assert_eq!(form.draft().name, "Asha Rao");
    assert_eq!(form.export().unwrap().image.file_name, "ID_Card_Asha_Rao.png");

    form.delete_saved("2023007").unwrap();
    assert!(form.saved_cards().unwrap().is_empty());
    assert!(!form.has_submitted());
}
