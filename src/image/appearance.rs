use crate::artifact::{ALERT_PALETTE, Color, Paint};

/// How colors on the card surface are resolved when painting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Appearance {
    /// Colors exactly as the template chose them.
    #[default]
    Screen,
    /// High-contrast export rendition.
    Export(ExportPalette),
}

/// Flattening rules applied while an export is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportPalette {
    pub text: Color,
    pub background: Color,
    /// Colors left untouched, e.g. the allergy warning reds.
    pub preserve: &'static [Color],
}

impl Default for ExportPalette {
    fn default() -> Self {
        Self {
            text: Color::BLACK,
            background: Color::WHITE,
            preserve: ALERT_PALETTE,
        }
    }
}

impl ExportPalette {
    fn keeps(&self, color: Color) -> bool {
        self.preserve.contains(&color)
    }
}

impl Appearance {
    pub fn is_export(&self) -> bool {
        matches!(self, Appearance::Export(_))
    }

    /// Backgrounds become flat; gradients are always removed on export.
    pub fn resolve_fill(&self, paint: Paint) -> Paint {
        match (self, paint) {
            (Appearance::Screen, paint) => paint,
            (Appearance::Export(p), Paint::Solid(color)) if p.keeps(color) => paint,
            (Appearance::Export(p), _) => Paint::Solid(p.background),
        }
    }

    /// Text and strokes.
    pub fn resolve_ink(&self, color: Color) -> Color {
        match self {
            Appearance::Screen => color,
            Appearance::Export(p) if p.keeps(color) => color,
            Appearance::Export(p) => p.text,
        }
    }
}
