use image::imageops::overlay;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_ellipse_mut, draw_filled_rect_mut};
use imageproc::rect::Rect as PxRect;

use crate::artifact::{Align, CardArtifact, Color, GradientDirection, Node, Paint, PhotoSlot, Rect};
use crate::code::EmbeddedCode;
use crate::image::appearance::Appearance;
use crate::image::font::{draw_text, text_width};
use crate::image::photo::{PhotoResolver, cover};

/// Largest edge, in pixels, a rasterized card may have.
pub const MAX_EDGE_PX: u32 = 8192;

const PLACEHOLDER_BG: Color = Color::hex(0xf3f4f6);
const PLACEHOLDER_INK: Color = Color::hex(0x9ca3af);

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("card has no area to paint")]
    Empty,
    #[error("card would be {width}x{height} px; the limit is {MAX_EDGE_PX} px per edge")]
    TooLarge { width: u32, height: u32 },
    #[error("rasterizer failed: {0}")]
    Failed(String),
}

/// Paints a laid-out card under an explicit appearance.
pub trait Rasterize {
    fn rasterize(&self, card: &CardArtifact, appearance: &Appearance)
    -> Result<RgbaImage, RasterError>;
}

/// Software rasterizer over `image`/`imageproc`.
pub struct PixelRasterizer {
    photos: Box<dyn PhotoResolver>,
    pixel_ratio: u32,
}

impl PixelRasterizer {
    pub fn new(photos: Box<dyn PhotoResolver>, pixel_ratio: u32) -> Self {
        Self {
            photos,
            pixel_ratio: pixel_ratio.max(1),
        }
    }
}

impl Rasterize for PixelRasterizer {
    fn rasterize(
        &self,
        card: &CardArtifact,
        appearance: &Appearance,
    ) -> Result<RgbaImage, RasterError> {
        if card.width == 0 || card.height == 0 {
            return Err(RasterError::Empty);
        }
        let width = card.width.saturating_mul(self.pixel_ratio);
        let height = card.height.saturating_mul(self.pixel_ratio);
        if width > MAX_EDGE_PX || height > MAX_EDGE_PX {
            return Err(RasterError::TooLarge { width, height });
        }

        let mut painter = Painter {
            image: RgbaImage::new(width, height),
            ratio: self.pixel_ratio,
            appearance,
            photos: self.photos.as_ref(),
        };
        painter.fill(
            Rect::new(0, 0, card.width, card.height),
            appearance.resolve_fill(card.background),
        );
        for node in &card.nodes {
            painter.node(node);
        }
        Ok(painter.image)
    }
}

struct Painter<'a> {
    image: RgbaImage,
    ratio: u32,
    appearance: &'a Appearance,
    photos: &'a dyn PhotoResolver,
}

impl Painter<'_> {
    fn px(&self, rect: Rect) -> Option<PxRect> {
        let w = rect.width * self.ratio;
        let h = rect.height * self.ratio;
        (w > 0 && h > 0).then(|| {
            PxRect::at(rect.x * self.ratio as i32, rect.y * self.ratio as i32).of_size(w, h)
        })
    }

    fn node(&mut self, node: &Node) {
        match node {
            Node::Fill { rect, paint } => {
                let paint = self.appearance.resolve_fill(*paint);
                self.fill(*rect, paint);
            }
            Node::Border {
                rect,
                color,
                thickness,
            } => self.border(*rect, self.appearance.resolve_ink(*color), *thickness),
            Node::Text {
                x,
                y,
                text,
                color,
                scale,
                align,
            } => {
                let scale = scale * self.ratio;
                let mut px = x * self.ratio as i32;
                if *align == Align::Center {
                    px -= text_width(text, scale) as i32 / 2;
                }
                let ink = rgba(self.appearance.resolve_ink(*color));
                draw_text(&mut self.image, px, y * self.ratio as i32, text, ink, scale);
            }
            Node::Photo { rect, slot } => {
                let pixels = match slot {
                    PhotoSlot::Reference(photo) => self.photos.resolve(photo),
                    PhotoSlot::Placeholder => None,
                };
                match pixels {
                    Some(pixels) => self.photo(*rect, &pixels),
                    None => self.placeholder(*rect),
                }
            }
            Node::Code { rect, code } => self.code(*rect, code),
            Node::Region { children, .. } => {
                for child in children {
                    self.node(child);
                }
            }
        }
    }

    fn fill(&mut self, rect: Rect, paint: Paint) {
        let Some(area) = self.px(rect) else {
            return;
        };
        match paint {
            Paint::Solid(color) => draw_filled_rect_mut(&mut self.image, area, rgba(color)),
            Paint::Gradient {
                from,
                to,
                direction,
            } => {
                let steps = match direction {
                    GradientDirection::Horizontal => area.width(),
                    GradientDirection::Vertical => area.height(),
                };
                for step in 0..steps {
                    let t = if steps > 1 {
                        step as f32 / (steps - 1) as f32
                    } else {
                        0.0
                    };
                    let band = match direction {
                        GradientDirection::Horizontal => {
                            PxRect::at(area.left() + step as i32, area.top()).of_size(1, area.height())
                        }
                        GradientDirection::Vertical => {
                            PxRect::at(area.left(), area.top() + step as i32).of_size(area.width(), 1)
                        }
                    };
                    draw_filled_rect_mut(&mut self.image, band, rgba(lerp(from, to, t)));
                }
            }
        }
    }

    fn border(&mut self, rect: Rect, color: Color, thickness: u32) {
        let Some(area) = self.px(rect) else {
            return;
        };
        let t = (thickness * self.ratio).min(area.width() / 2).min(area.height() / 2).max(1);
        let ink = rgba(color);
        let (l, tp, w, h) = (area.left(), area.top(), area.width(), area.height());
        let edges = [
            PxRect::at(l, tp).of_size(w, t),
            PxRect::at(l, tp + (h - t) as i32).of_size(w, t),
            PxRect::at(l, tp).of_size(t, h),
            PxRect::at(l + (w - t) as i32, tp).of_size(t, h),
        ];
        for edge in edges {
            draw_filled_rect_mut(&mut self.image, edge, ink);
        }
    }

    fn photo(&mut self, rect: Rect, pixels: &RgbaImage) {
        let Some(area) = self.px(rect) else {
            return;
        };
        let fitted = cover(pixels, area.width(), area.height());
        overlay(
            &mut self.image,
            &fitted,
            i64::from(area.left()),
            i64::from(area.top()),
        );
    }

    /// Head-and-shoulders silhouette on a neutral tile.
    fn placeholder(&mut self, rect: Rect) {
        self.fill(rect, self.appearance.resolve_fill(Paint::Solid(PLACEHOLDER_BG)));
        let Some(area) = self.px(rect) else {
            return;
        };
        let ink = rgba(self.appearance.resolve_ink(PLACEHOLDER_INK));
        let cx = area.left() + area.width() as i32 / 2;
        let unit = area.width().min(area.height()) as i32;
        let head_y = area.top() + area.height() as i32 * 2 / 5;
        draw_filled_circle_mut(&mut self.image, (cx, head_y), (unit / 6).max(1), ink);
        let body_y = head_y + unit / 6 + unit / 5;
        draw_filled_ellipse_mut(
            &mut self.image,
            (cx, body_y),
            (unit / 3).max(1),
            (unit / 6).max(1),
            ink,
        );
    }

    fn code(&mut self, rect: Rect, code: &EmbeddedCode) {
        let Some(area) = self.px(rect) else {
            return;
        };
        let modules = code.width() as u32;
        if modules == 0 {
            return;
        }
        let module = (area.width().min(area.height()) / modules).max(1);
        let drawn = module * modules;
        let ox = area.left() + (area.width().saturating_sub(drawn) / 2) as i32;
        let oy = area.top() + (area.height().saturating_sub(drawn) / 2) as i32;
        let ink = rgba(self.appearance.resolve_ink(Color::BLACK));
        for y in 0..code.width() {
            for x in 0..code.width() {
                if code.is_dark(x, y) {
                    let cell = PxRect::at(ox + (x as u32 * module) as i32, oy + (y as u32 * module) as i32)
                        .of_size(module, module);
                    draw_filled_rect_mut(&mut self.image, cell, ink);
                }
            }
        }
    }
}

fn rgba(color: Color) -> Rgba<u8> {
    Rgba([color.r, color.g, color.b, 0xff])
}

fn lerp(from: Color, to: Color, t: f32) -> Color {
    let mix = |a: u8, b: u8| (f32::from(a) + (f32::from(b) - f32::from(a)) * t).round() as u8;
    Color::rgb(mix(from.r, to.r), mix(from.g, to.g), mix(from.b, to.b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ALERT_PALETTE, RegionKind};
    use crate::image::ExportPalette;
    use crate::record::PhotoRef;
    use crate::templates::Variant;
    use pretty_assertions::assert_eq;

    struct Solid(Rgba<u8>);

    impl PhotoResolver for Solid {
        fn resolve(&self, _: &PhotoRef) -> Option<RgbaImage> {
            Some(RgbaImage::from_pixel(4, 4, self.0))
        }
    }

    struct Nothing;

    impl PhotoResolver for Nothing {
        fn resolve(&self, _: &PhotoRef) -> Option<RgbaImage> {
            None
        }
    }

    fn card(nodes: Vec<Node>) -> CardArtifact {
        CardArtifact {
            variant: Variant::Blue,
            width: 40,
            height: 20,
            background: Paint::Gradient {
                from: Color::hex(0x2563eb),
                to: Color::hex(0x1d4ed8),
                direction: GradientDirection::Horizontal,
            },
            nodes,
        }
    }

    #[test]
    fn output_scales_with_pixel_ratio() {
        let raster = PixelRasterizer::new(Box::new(Nothing), 3);
        let img = raster.rasterize(&card(Vec::new()), &Appearance::Screen).unwrap();
        assert_eq!(img.dimensions(), (120, 60));
    }

    #[test]
    fn export_appearance_flattens_background_but_keeps_alert() {
        let alert = ALERT_PALETTE[0];
        let nodes = vec![Node::Region {
            kind: RegionKind::Alert,
            rect: Rect::new(0, 10, 40, 10),
            children: vec![Node::fill(Rect::new(0, 10, 40, 10), alert)],
        }];
        let raster = PixelRasterizer::new(Box::new(Nothing), 1);
        let img = raster
            .rasterize(&card(nodes), &Appearance::Export(ExportPalette::default()))
            .unwrap();
        assert_eq!(img.get_pixel(5, 2), &Rgba([255, 255, 255, 255]));
        assert_eq!(img.get_pixel(5, 15), &rgba(alert));
    }

    #[test]
    fn photo_slot_uses_resolver_or_placeholder() {
        let red = Rgba([200, 0, 0, 255]);
        let nodes = vec![Node::Photo {
            rect: Rect::new(0, 0, 10, 10),
            slot: PhotoSlot::Reference(PhotoRef::url("/uploads/x.png")),
        }];
        let img = PixelRasterizer::new(Box::new(Solid(red)), 1)
            .rasterize(&card(nodes.clone()), &Appearance::Screen)
            .unwrap();
        assert_eq!(img.get_pixel(5, 5), &red);

        let img = PixelRasterizer::new(Box::new(Nothing), 1)
            .rasterize(&card(nodes), &Appearance::Screen)
            .unwrap();
        assert_eq!(img.get_pixel(0, 0), &rgba(PLACEHOLDER_BG));
    }

    #[test]
    fn oversized_and_empty_cards_rejected() {
        let raster = PixelRasterizer::new(Box::new(Nothing), 4);
        let mut big = card(Vec::new());
        big.width = MAX_EDGE_PX;
        assert!(matches!(
            raster.rasterize(&big, &Appearance::Screen),
            Err(RasterError::TooLarge { .. })
        ));
        big.width = 0;
        assert!(matches!(
            raster.rasterize(&big, &Appearance::Screen),
            Err(RasterError::Empty)
        ));
    }
}
