use std::path::{Component, Path, PathBuf};

use image::imageops::{self, FilterType};
use image::RgbaImage;
use tracing::debug;

use crate::api::UPLOADS_PATH;
use crate::record::PhotoRef;

/// Turns a photo reference into pixels. `None` means "draw the placeholder".
pub trait PhotoResolver: Send + Sync {
    fn resolve(&self, photo: &PhotoRef) -> Option<RgbaImage>;
}

impl<R: PhotoResolver + ?Sized> PhotoResolver for Box<R> {
    fn resolve(&self, photo: &PhotoRef) -> Option<RgbaImage> {
        (**self).resolve(photo)
    }
}

/// Reads local files, and server upload URLs from a local uploads directory.
#[derive(Debug, Clone, Default)]
pub struct FsPhotoResolver {
    uploads_dir: Option<PathBuf>,
}

impl FsPhotoResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_uploads(dir: impl Into<PathBuf>) -> Self {
        Self {
            uploads_dir: Some(dir.into()),
        }
    }

    fn upload_path(&self, url: &str) -> Option<PathBuf> {
        let dir = self.uploads_dir.as_ref()?;
        let name = url
            .strip_prefix(UPLOADS_PATH)?
            .trim_start_matches('/');
        let rel = Path::new(name);
        let plain = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        (plain && !name.is_empty()).then(|| dir.join(rel))
    }
}

impl PhotoResolver for FsPhotoResolver {
    fn resolve(&self, photo: &PhotoRef) -> Option<RgbaImage> {
        let path = match photo {
            PhotoRef::Local(path) => path.clone(),
            PhotoRef::Url(url) => self.upload_path(url)?,
        };
        match image::open(&path) {
            Ok(img) => Some(img.to_rgba8()),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "photo unavailable");
                None
            }
        }
    }
}

/// Scale to cover `width` x `height`, cropping the overflow around the center.
pub fn cover(photo: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let (src_w, src_h) = photo.dimensions();
    if src_w == 0 || src_h == 0 || width == 0 || height == 0 {
        return RgbaImage::new(width, height);
    }
    let scale = f64::max(
        f64::from(width) / f64::from(src_w),
        f64::from(height) / f64::from(src_h),
    );
    let scaled_w = ((f64::from(src_w) * scale).ceil() as u32).max(width);
    let scaled_h = ((f64::from(src_h) * scale).ceil() as u32).max(height);
    let scaled = imageops::resize(photo, scaled_w, scaled_h, FilterType::Triangle);
    let x = (scaled_w - width) / 2;
    let y = (scaled_h - height) / 2;
    imageops::crop_imm(&scaled, x, y, width, height).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use pretty_assertions::assert_eq;

    #[test]
    fn cover_fills_target_exactly() {
        let src = RgbaImage::from_pixel(40, 10, Rgba([10, 20, 30, 255]));
        let out = cover(&src, 12, 16);
        assert_eq!(out.dimensions(), (12, 16));
        assert_eq!(out.get_pixel(6, 8), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn upload_urls_resolve_inside_uploads_dir() {
        let dir = tempfile::tempdir().unwrap();
        let img = RgbaImage::from_pixel(3, 4, Rgba([1, 2, 3, 255]));
        img.save(dir.path().join("a.png")).unwrap();

        let resolver = FsPhotoResolver::with_uploads(dir.path());
        let found = resolver.resolve(&PhotoRef::url("/uploads/a.png")).unwrap();
        assert_eq!(found.dimensions(), (3, 4));
        assert!(resolver.resolve(&PhotoRef::url("/uploads/../a.png")).is_none());
        assert!(resolver.resolve(&PhotoRef::url("/uploads/missing.png")).is_none());
        assert!(FsPhotoResolver::new()
            .resolve(&PhotoRef::url("/uploads/a.png"))
            .is_none());
    }
}
