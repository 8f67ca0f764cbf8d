//! Snapshot export: rasterize a card under the export appearance and encode it as PNG.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage, RgbaImage};
use tracing::{info, warn};

use crate::artifact::CardArtifact;
use crate::image::{Appearance, ExportPalette, RasterError, Rasterize};

/// The process-wide visual surface cards are painted on.
///
/// Its appearance is normally [`Appearance::Screen`]. An export installs the
/// export appearance through [`Surface::begin_export`] and the returned scope
/// puts the previous appearance back when dropped.
#[derive(Debug, Default)]
pub struct Surface {
    appearance: RwLock<Appearance>,
    exclusive: Mutex<()>,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Appearance {
        *self
            .appearance
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Install the export appearance until the scope is dropped.
    ///
    /// Blocks while another export scope is alive.
    pub fn begin_export(&self, palette: ExportPalette) -> ExportScope<'_> {
        let exclusive = self.exclusive.lock().unwrap_or_else(PoisonError::into_inner);
        let installed = Appearance::Export(palette);
        let previous = std::mem::replace(&mut *self.write(), installed);
        ExportScope {
            surface: self,
            previous,
            installed,
            _exclusive: exclusive,
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Appearance> {
        self.appearance
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Guard over an installed export appearance.
#[must_use = "the export appearance is removed as soon as the scope is dropped"]
pub struct ExportScope<'a> {
    surface: &'a Surface,
    previous: Appearance,
    installed: Appearance,
    _exclusive: MutexGuard<'a, ()>,
}

impl ExportScope<'_> {
    pub fn appearance(&self) -> &Appearance {
        &self.installed
    }
}

impl Drop for ExportScope<'_> {
    fn drop(&mut self) {
        *self.surface.write() = self.previous;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("no card has been generated yet")]
    NoCard,
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error("failed to encode PNG: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An encoded card ready to be offered for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedImage {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl ExportedImage {
    /// Write into `dir` via a temporary file, so a partial PNG is never visible.
    pub fn save_in(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let io = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| ExportError::Io { path, source }
        };
        fs::create_dir_all(dir).map_err(io(dir))?;
        let target = dir.join(&self.file_name);
        let tmp = dir.join(format!(".{}.tmp", self.file_name));
        fs::write(&tmp, &self.bytes).map_err(io(&tmp))?;
        if let Err(err) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(io(&target)(err));
        }
        Ok(target)
    }
}

/// `ID_Card_<name>.png`, with every whitespace run in the name replaced by `_`.
pub fn export_file_name(student_name: &str) -> String {
    let mut out = String::from("ID_Card_");
    let mut in_space = false;
    for ch in student_name.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        out.push(if matches!(ch, '/' | '\\') { '_' } else { ch });
    }
    out.push_str(".png");
    out
}

/// Composite onto opaque white so no transparency reaches the file.
pub fn flatten_on_white(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let a = u16::from(a);
        let over = |c: u8| ((u16::from(c) * a + 255 * (255 - a) + 127) / 255) as u8;
        Rgb([over(r), over(g), over(b)])
    })
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, ExportError> {
    let mut bytes = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut bytes, CompressionType::Best, FilterType::Adaptive);
    encoder.write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(bytes)
}

/// Produces PNG snapshots of rendered cards.
pub struct Exporter {
    rasterizer: Box<dyn Rasterize + Send + Sync>,
    palette: ExportPalette,
}

impl Exporter {
    pub fn new(rasterizer: Box<dyn Rasterize + Send + Sync>) -> Self {
        Self {
            rasterizer,
            palette: ExportPalette::default(),
        }
    }

    /// Rasterize `card` under the export appearance and encode it.
    ///
    /// Without a card nothing is rasterized. The surface appearance is
    /// restored before this returns, whatever the outcome.
    pub fn export(
        &self,
        surface: &Surface,
        card: Option<&CardArtifact>,
        student_name: &str,
    ) -> Result<ExportedImage, ExportError> {
        let card = card.ok_or(ExportError::NoCard)?;
        let pixels = {
            let scope = surface.begin_export(self.palette);
            self.rasterizer.rasterize(card, scope.appearance())
        };
        let pixels = pixels.inspect_err(|err| warn!(error = %err, "card rasterization failed"))?;
        let flat = flatten_on_white(&pixels);
        let bytes = encode_png(&flat)?;
        let file_name = export_file_name(student_name);
        info!(file = %file_name, bytes = bytes.len(), "card exported");
        Ok(ExportedImage {
            file_name,
            width: flat.width(),
            height: flat.height(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{Color, Paint};
    use crate::templates::Variant;
    use image::Rgba;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recording {
        seen: Arc<Mutex<Vec<Appearance>>>,
        fail: bool,
    }

    impl Rasterize for Recording {
        fn rasterize(
            &self,
            card: &CardArtifact,
            appearance: &Appearance,
        ) -> Result<RgbaImage, RasterError> {
            self.seen.lock().unwrap().push(*appearance);
            if self.fail {
                return Err(RasterError::Failed("target unreachable".into()));
            }
            Ok(RgbaImage::from_pixel(card.width, card.height, Rgba([0, 0, 0, 0])))
        }
    }

    fn card() -> CardArtifact {
        CardArtifact {
            variant: Variant::Blue,
            width: 4,
            height: 3,
            background: Paint::Solid(Color::WHITE),
            nodes: Vec::new(),
        }
    }

    fn exporter(fail: bool) -> (Exporter, Arc<Mutex<Vec<Appearance>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let raster = Recording {
            seen: Arc::clone(&seen),
            fail,
        };
        (Exporter::new(Box::new(raster)), seen)
    }

    #[test]
    fn file_name_collapses_whitespace_runs() {
        assert_eq!(export_file_name("John Smith"), "ID_Card_John_Smith.png");
        assert_eq!(export_file_name("Asha  \tRao"), "ID_Card_Asha_Rao.png");
        assert_eq!(export_file_name(" Lead"), "ID_Card__Lead.png");
        assert_eq!(export_file_name("A/B"), "ID_Card_A_B.png");
    }

    #[test]
    fn refuses_without_card_and_never_rasterizes() {
        let surface = Surface::new();
        let (exporter, seen) = exporter(false);
        let err = exporter.export(&surface, None, "John Smith").unwrap_err();
        assert!(matches!(err, ExportError::NoCard));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn rasterizes_under_export_appearance_then_restores() {
        let surface = Surface::new();
        let (exporter, seen) = exporter(false);
        let out = exporter.export(&surface, Some(&card()), "John Smith").unwrap();

        assert_eq!(out.file_name, "ID_Card_John_Smith.png");
        assert!(seen.lock().unwrap()[0].is_export());
        assert_eq!(surface.current(), Appearance::Screen);

        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!(decoded.color(), image::ColorType::Rgb8);
        assert_eq!(decoded.to_rgb8().get_pixel(0, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn failed_rasterization_still_restores_appearance() {
        let surface = Surface::new();
        let (exporter, _) = exporter(true);
        let err = exporter.export(&surface, Some(&card()), "X").unwrap_err();
        assert!(matches!(err, ExportError::Raster(_)));
        assert_eq!(surface.current(), Appearance::Screen);
    }

    #[test]
    fn scope_restores_after_panic() {
        let surface = Surface::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = surface.begin_export(ExportPalette::default());
            assert!(surface.current().is_export());
            panic!("rasterizer blew up");
        }));
        assert!(result.is_err());
        assert_eq!(surface.current(), Appearance::Screen);
    }

    #[test]
    fn export_scopes_are_serialized() {
        let surface = Arc::new(Surface::new());
        let active = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let surface = Arc::clone(&surface);
                let active = Arc::clone(&active);
                std::thread::spawn(move || {
                    let _scope = surface.begin_export(ExportPalette::default());
                    assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0);
                    std::thread::sleep(std::time::Duration::from_millis(5));
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(surface.current(), Appearance::Screen);
    }

    #[test]
    fn save_writes_atomically_into_dir() {
        let dir = tempfile::tempdir().unwrap();
        let image = ExportedImage {
            file_name: "ID_Card_A.png".into(),
            width: 1,
            height: 1,
            bytes: vec![1, 2, 3],
        };
        let path = image.save_in(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("ID_Card_A.png"));
        assert_eq!(fs::read(&path).unwrap(), vec![1, 2, 3]);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
