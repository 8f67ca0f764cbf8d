//! Laid-out card produced by a template, ready for rasterization.
//!
//! Coordinates are in card units (CSS-pixel scale). The rasterizer multiplies
//! them by its pixel ratio.

use crate::code::EmbeddedCode;
use crate::record::PhotoRef;
use crate::templates::Variant;

/// Opaque sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn hex(value: u32) -> Self {
        Self::rgb((value >> 16) as u8, (value >> 8) as u8, value as u8)
    }

    pub const WHITE: Color = Color::hex(0xffffff);
    pub const BLACK: Color = Color::hex(0x000000);
}

/// Allergy warning colors. Export keeps these instead of flattening them.
pub const ALERT_PALETTE: &[Color] = &[
    Color::hex(0xfee2e2),
    Color::hex(0xfecaca),
    Color::hex(0xdc2626),
    Color::hex(0x991b1b),
    Color::hex(0x4f46e5),
    Color::hex(0x4338ca),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientDirection {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paint {
    Solid(Color),
    Gradient {
        from: Color,
        to: Color,
        direction: GradientDirection,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoSlot {
    Reference(PhotoRef),
    Placeholder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Allergy warning block.
    Alert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Fill {
        rect: Rect,
        paint: Paint,
    },
    Border {
        rect: Rect,
        color: Color,
        thickness: u32,
    },
    Text {
        x: i32,
        y: i32,
        text: String,
        color: Color,
        scale: u32,
        align: Align,
    },
    Photo {
        rect: Rect,
        slot: PhotoSlot,
    },
    Code {
        rect: Rect,
        code: EmbeddedCode,
    },
    Region {
        kind: RegionKind,
        rect: Rect,
        children: Vec<Node>,
    },
}

impl Node {
    pub fn text(x: i32, y: i32, text: impl Into<String>, color: Color, scale: u32) -> Self {
        Node::Text {
            x,
            y,
            text: text.into(),
            color,
            scale,
            align: Align::Left,
        }
    }

    pub fn centered(x: i32, y: i32, text: impl Into<String>, color: Color, scale: u32) -> Self {
        Node::Text {
            x,
            y,
            text: text.into(),
            color,
            scale,
            align: Align::Center,
        }
    }

    pub fn fill(rect: Rect, color: Color) -> Self {
        Node::Fill {
            rect,
            paint: Paint::Solid(color),
        }
    }
}

fn flatten<'a>(nodes: &'a [Node], out: &mut Vec<&'a Node>) {
    for node in nodes {
        out.push(node);
        if let Node::Region { children, .. } = node {
            flatten(children, out);
        }
    }
}

fn text_of(node: &Node) -> Option<&str> {
    match node {
        Node::Text { text, .. } => Some(text),
        _ => None,
    }
}

/// A fully laid-out card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardArtifact {
    pub variant: Variant,
    pub width: u32,
    pub height: u32,
    pub background: Paint,
    pub nodes: Vec<Node>,
}

impl CardArtifact {
    /// All nodes, region children following their region.
    pub fn flat(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        flatten(&self.nodes, &mut out);
        out
    }

    /// Every text run in paint order.
    pub fn texts(&self) -> Vec<&str> {
        self.flat().into_iter().filter_map(text_of).collect()
    }

    pub fn alert_region(&self) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| matches!(n, Node::Region { kind: RegionKind::Alert, .. }))
    }

    /// Text runs inside the alert region, if there is one.
    pub fn alert_texts(&self) -> Option<Vec<&str>> {
        let Node::Region { children, .. } = self.alert_region()? else {
            return None;
        };
        let mut nodes = Vec::new();
        flatten(children, &mut nodes);
        Some(nodes.into_iter().filter_map(text_of).collect())
    }

    pub fn photo_slot(&self) -> Option<&PhotoSlot> {
        self.flat().into_iter().find_map(|node| match node {
            Node::Photo { slot, .. } => Some(slot),
            _ => None,
        })
    }

    pub fn code(&self) -> Option<&EmbeddedCode> {
        self.flat().into_iter().find_map(|node| match node {
            Node::Code { code, .. } => Some(code),
            _ => None,
        })
    }
}
