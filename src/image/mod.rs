//! Rasterization of laid-out cards into pixels.

mod appearance;
mod font;
mod paint;
mod photo;

pub use appearance::{Appearance, ExportPalette};
pub use paint::{MAX_EDGE_PX, PixelRasterizer, RasterError, Rasterize};
pub use photo::{FsPhotoResolver, PhotoResolver, cover};
