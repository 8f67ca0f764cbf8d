use std::fmt;

use chrono::{Datelike, Local, NaiveDate};

use crate::artifact::{
    CardArtifact, Color, GradientDirection, Node, Paint, PhotoSlot, Rect, RegionKind,
};
use crate::catalog::join_allergies;
use crate::code::EmbeddedCode;
use crate::record::StudentRecord;

/// Horizontal advance of one glyph at scale 1, spacing included.
pub const GLYPH_ADVANCE: u32 = 6;
/// Height of one glyph at scale 1.
pub const GLYPH_HEIGHT: u32 = 7;

const CODE_BOX: u32 = 72;
const CODE_PAD: u32 = 4;
const FOOTER_HEIGHT: u32 = 80;

/// The visual layouts a card can be rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Blue,
    White,
    Green,
    Purple,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(TemplateRegistry::describe(*self).name)
    }
}

/// Inputs a template needs besides the record itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderContext {
    pub school: String,
    /// Drives the academic-year text; the only non-record input.
    pub today: NaiveDate,
}

impl RenderContext {
    pub fn new(school: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            school: school.into(),
            today,
        }
    }

    /// Context dated with the local calendar day.
    pub fn now(school: impl Into<String>) -> Self {
        Self::new(school, Local::now().date_naive())
    }

    pub fn academic_year(&self) -> String {
        let year = self.today.year();
        format!("{}-{}", year, year + 1)
    }

    /// First word of the school name, upper-cased (`Unity School` -> `UNITY`).
    pub fn id_prefix(&self) -> String {
        self.school
            .split_whitespace()
            .next()
            .unwrap_or("SCHOOL")
            .to_uppercase()
    }

    pub fn card_id(&self, roll_number: &str) -> String {
        format!("ID: {}-{}", self.id_prefix(), roll_number)
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::now("Unity School")
    }
}

/// A named card layout.
#[derive(Debug, Clone)]
pub struct Template {
    pub variant: Variant,
    pub name: &'static str,
    /// Older numbered name kept for saved settings and scripts.
    pub alias: &'static str,
    pub description: &'static str,
    layout: fn(&StudentRecord, &EmbeddedCode, &RenderContext) -> CardArtifact,
}

impl Template {
    /// Lay out the card. Pure: the same inputs give the same artifact.
    pub fn render(
        &self,
        record: &StudentRecord,
        code: &EmbeddedCode,
        ctx: &RenderContext,
    ) -> CardArtifact {
        (self.layout)(record, code, ctx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown template '{0}'")]
pub struct UnknownTemplate(pub String);

/// Registry of built-in card templates.
pub struct TemplateRegistry;

impl TemplateRegistry {
    pub fn list() -> Vec<&'static Template> {
        vec![&BLUE, &WHITE, &GREEN, &PURPLE]
    }

    /// Resolve a template by name or alias (case-insensitive).
    pub fn get(name: &str) -> Result<&'static Template, UnknownTemplate> {
        let name = name.trim();
        Self::list()
            .into_iter()
            .find(|tpl| tpl.name.eq_ignore_ascii_case(name) || tpl.alias.eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownTemplate(name.to_string()))
    }

    pub fn describe(variant: Variant) -> &'static Template {
        match variant {
            Variant::Blue => &BLUE,
            Variant::White => &WHITE,
            Variant::Green => &GREEN,
            Variant::Purple => &PURPLE,
        }
    }
}

static BLUE: Template = Template {
    variant: Variant::Blue,
    name: "blue",
    alias: "template1",
    description: "Blue gradient card with photo beside the details.",
    layout: blue,
};

static WHITE: Template = Template {
    variant: Variant::White,
    name: "white",
    alias: "template2",
    description: "White card with centered photo and a two-column detail grid.",
    layout: white,
};

static GREEN: Template = Template {
    variant: Variant::Green,
    name: "green",
    alias: "template3",
    description: "Green-bordered card with labelled detail rows.",
    layout: green,
};

static PURPLE: Template = Template {
    variant: Variant::Purple,
    name: "purple",
    alias: "template4",
    description: "Narrow portrait card on a purple gradient.",
    layout: purple,
};

mod palette {
    use crate::artifact::Color;

    pub const GRAY_100: Color = Color::hex(0xf3f4f6);
    pub const GRAY_500: Color = Color::hex(0x6b7280);
    pub const GRAY_600: Color = Color::hex(0x4b5563);
    pub const GRAY_800: Color = Color::hex(0x1f2937);
    pub const GRAY_900: Color = Color::hex(0x111827);
    pub const BLUE_50: Color = Color::hex(0xeff6ff);
    pub const BLUE_100: Color = Color::hex(0xdbeafe);
    pub const BLUE_200: Color = Color::hex(0xbfdbfe);
    pub const BLUE_300: Color = Color::hex(0x93c5fd);
    pub const BLUE_500: Color = Color::hex(0x3b82f6);
    pub const BLUE_600: Color = Color::hex(0x2563eb);
    pub const BLUE_700: Color = Color::hex(0x1d4ed8);
    pub const BLUE_800: Color = Color::hex(0x1e40af);
    pub const GREEN_50: Color = Color::hex(0xf0fdf4);
    pub const GREEN_300: Color = Color::hex(0x86efac);
    pub const GREEN_600: Color = Color::hex(0x16a34a);
    pub const PURPLE_400: Color = Color::hex(0xc084fc);
    pub const PURPLE_600: Color = Color::hex(0x9333ea);
    pub const PURPLE_700: Color = Color::hex(0x7e22ce);
    pub const PURPLE_800: Color = Color::hex(0x6b21a8);
    pub const RED_100: Color = Color::hex(0xfee2e2);
    pub const RED_200: Color = Color::hex(0xfecaca);
    pub const RED_600: Color = Color::hex(0xdc2626);
    pub const RED_800: Color = Color::hex(0x991b1b);
    pub const INDIGO_600: Color = Color::hex(0x4f46e5);
    pub const INDIGO_700: Color = Color::hex(0x4338ca);
}

use palette::*;

/// Truncate `text` so it fits `max_width` card units at `scale`.
pub fn fit(text: &str, max_width: u32, scale: u32) -> String {
    let max_chars = (max_width / (GLYPH_ADVANCE * scale.max(1))) as usize;
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    if max_chars <= 3 {
        return text.chars().take(max_chars).collect();
    }
    let mut out: String = text.chars().take(max_chars - 3).collect();
    out.push_str("...");
    out
}

/// Greedy word wrap at `max_width` card units.
pub fn wrap(text: &str, max_width: u32, scale: u32) -> Vec<String> {
    let max_chars = ((max_width / (GLYPH_ADVANCE * scale.max(1))) as usize).max(1);
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split(' ').filter(|w| !w.is_empty()) {
        let needed = if line.is_empty() {
            word.chars().count()
        } else {
            line.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !line.is_empty() {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
        .into_iter()
        .map(|l| fit(&l, max_width, scale))
        .collect()
}

fn photo(record: &StudentRecord, rect: Rect, border: Color) -> Vec<Node> {
    let slot = match &record.photo {
        Some(photo) => PhotoSlot::Reference(photo.clone()),
        None => PhotoSlot::Placeholder,
    };
    vec![
        Node::fill(rect, GRAY_100),
        Node::Photo { rect, slot },
        Node::Border {
            rect,
            color: border,
            thickness: 2,
        },
    ]
}

/// White box holding the code, anchored at its top-left corner.
fn code_block(code: &EmbeddedCode, x: i32, y: i32, frame: Option<Color>) -> Vec<Node> {
    let outer = Rect::new(x, y, CODE_BOX, CODE_BOX);
    let inner = Rect::new(
        x + CODE_PAD as i32,
        y + CODE_PAD as i32,
        CODE_BOX - 2 * CODE_PAD,
        CODE_BOX - 2 * CODE_PAD,
    );
    let mut nodes = vec![Node::fill(outer, Color::WHITE)];
    if let Some(color) = frame {
        nodes.push(Node::Border {
            rect: outer,
            color,
            thickness: 1,
        });
    }
    nodes.push(Node::Code {
        rect: inner,
        code: code.clone(),
    });
    nodes
}

struct AlertStyle {
    fill: Option<Color>,
    border: Option<Color>,
    label: &'static str,
    label_color: Color,
    text_color: Color,
}

/// Allergy block spanning `width` at `y`. Returns nothing when there are no allergies.
fn alert(record: &StudentRecord, y: i32, width: u32, style: &AlertStyle) -> Option<(Node, u32)> {
    if record.allergies.is_empty() {
        return None;
    }
    let pad = 12;
    let label_width = (style.label.chars().count() as u32 + 1) * GLYPH_ADVANCE;
    let lines = wrap(
        &join_allergies(&record.allergies),
        width - 2 * pad - label_width,
        1,
    );
    let line_height = GLYPH_HEIGHT + 5;
    let height = 2 * 8 + lines.len() as u32 * line_height - 5;
    let rect = Rect::new(0, y, width, height);

    let mut children = Vec::new();
    if let Some(fill) = style.fill {
        children.push(Node::fill(rect, fill));
    }
    if let Some(border) = style.border {
        children.push(Node::Border {
            rect,
            color: border,
            thickness: 1,
        });
    }
    children.push(Node::text(
        pad as i32,
        y + 8,
        style.label,
        style.label_color,
        1,
    ));
    for (idx, line) in lines.into_iter().enumerate() {
        children.push(Node::text(
            (pad + label_width) as i32,
            y + 8 + (idx as u32 * line_height) as i32,
            line,
            style.text_color,
            1,
        ));
    }
    Some((
        Node::Region {
            kind: RegionKind::Alert,
            rect,
            children,
        },
        height,
    ))
}

fn rows(
    x: i32,
    y: i32,
    value_offset: i32,
    max_width: u32,
    entries: &[(&str, &str)],
    label_color: Color,
    value_color: Color,
) -> Vec<Node> {
    let mut nodes = Vec::with_capacity(entries.len() * 2);
    for (idx, (label, value)) in entries.iter().enumerate() {
        let row_y = y + idx as i32 * 16;
        nodes.push(Node::text(x, row_y, *label, label_color, 1));
        nodes.push(Node::text(
            x + value_offset,
            row_y,
            fit(value, max_width.saturating_sub(value_offset as u32), 1),
            value_color,
            1,
        ));
    }
    nodes
}

fn blue(record: &StudentRecord, code: &EmbeddedCode, ctx: &RenderContext) -> CardArtifact {
    const WIDTH: u32 = 340;
    let mut nodes = vec![
        Node::fill(Rect::new(0, 0, WIDTH, 56), BLUE_700),
        Node::text(
            12,
            14,
            fit(&ctx.school.to_uppercase(), WIDTH - 72, 2),
            Color::WHITE,
            2,
        ),
        Node::text(12, 36, "Student Identification Card", BLUE_200, 1),
        Node::fill(Rect::new(WIDTH as i32 - 44, 12, 32, 32), Color::WHITE),
        Node::fill(Rect::new(WIDTH as i32 - 40, 16, 24, 24), BLUE_500),
        Node::fill(Rect::new(0, 56, WIDTH, 132), Color::WHITE),
    ];
    nodes.extend(photo(record, Rect::new(16, 68, 84, 112), BLUE_500));
    nodes.push(Node::text(
        116,
        72,
        fit(&record.name, WIDTH - 128, 2),
        GRAY_800,
        2,
    ));
    nodes.extend(rows(
        116,
        100,
        78,
        WIDTH - 128,
        &[
            ("Roll Number:", record.roll_number.as_str()),
            ("Class:", record.class_div.as_str()),
            ("Rack Number:", record.rack_number.as_str()),
            ("Bus Route:", record.bus_route.as_str()),
        ],
        GRAY_600,
        GRAY_800,
    ));

    let mut y = 188;
    let style = AlertStyle {
        fill: Some(RED_100),
        border: Some(RED_200),
        label: "Allergies:",
        label_color: RED_600,
        text_color: RED_800,
    };
    if let Some((region, height)) = alert(record, y, WIDTH, &style) {
        nodes.push(region);
        y += height as i32;
    }

    nodes.push(Node::fill(Rect::new(0, y, WIDTH, FOOTER_HEIGHT), BLUE_600));
    nodes.push(Node::text(
        12,
        y + 28,
        format!("Valid for Academic Year {}", ctx.academic_year()),
        Color::WHITE,
        1,
    ));
    nodes.push(Node::text(
        12,
        y + 44,
        fit(&ctx.card_id(&record.roll_number), WIDTH - CODE_BOX - 36, 1),
        Color::WHITE,
        1,
    ));
    nodes.extend(code_block(
        code,
        (WIDTH - CODE_BOX - 12) as i32,
        y + CODE_PAD as i32,
        None,
    ));

    CardArtifact {
        variant: Variant::Blue,
        width: WIDTH,
        height: y as u32 + FOOTER_HEIGHT,
        background: Paint::Gradient {
            from: BLUE_600,
            to: BLUE_700,
            direction: GradientDirection::Horizontal,
        },
        nodes,
    }
}

fn white(record: &StudentRecord, code: &EmbeddedCode, ctx: &RenderContext) -> CardArtifact {
    const WIDTH: u32 = 340;
    let header = Paint::Gradient {
        from: BLUE_50,
        to: BLUE_100,
        direction: GradientDirection::Horizontal,
    };
    let mut nodes = vec![
        Node::Fill {
            rect: Rect::new(0, 0, WIDTH, 56),
            paint: header,
        },
        Node::fill(Rect::new(0, 54, WIDTH, 2), BLUE_500),
        Node::text(
            16,
            14,
            fit(&ctx.school.to_uppercase(), WIDTH - 32, 2),
            BLUE_800,
            2,
        ),
        Node::text(
            16,
            36,
            format!("Student ID Card - {}", ctx.academic_year()),
            BLUE_600,
            1,
        ),
    ];
    let photo_x = (WIDTH as i32 - 112) / 2;
    nodes.extend(photo(record, Rect::new(photo_x, 72, 112, 144), BLUE_300));
    let center = WIDTH as i32 / 2;
    nodes.push(Node::centered(
        center,
        226,
        fit(&record.name, WIDTH - 32, 2),
        GRAY_900,
        2,
    ));
    nodes.push(Node::centered(
        center,
        246,
        format!("Class {}", record.class_div),
        BLUE_600,
        1,
    ));

    let column = (WIDTH as i32 - 32) / 2;
    let cells: [(&str, &str, i32, i32); 3] = [
        ("Roll Number", record.roll_number.as_str(), 24, 266),
        ("Rack Number", record.rack_number.as_str(), 24 + column, 266),
        ("Bus Route", record.bus_route.as_str(), 24, 296),
    ];
    for (label, value, x, y) in cells {
        nodes.push(Node::text(x, y, label, GRAY_500, 1));
        nodes.push(Node::text(
            x,
            y + 12,
            fit(value, column as u32 - 8, 1),
            GRAY_900,
            1,
        ));
    }

    let mut y = 324;
    let style = AlertStyle {
        fill: None,
        border: None,
        label: "Medical Alert:",
        label_color: INDIGO_600,
        text_color: INDIGO_700,
    };
    if let Some((region, height)) = alert(record, y, WIDTH, &style) {
        nodes.push(region);
        y += height as i32;
    }
    y += 8;

    nodes.push(Node::Fill {
        rect: Rect::new(0, y, WIDTH, FOOTER_HEIGHT),
        paint: header,
    });
    nodes.push(Node::fill(Rect::new(0, y, WIDTH, 2), BLUE_500));
    let text_width = WIDTH - CODE_BOX - 36;
    nodes.push(Node::text(
        16,
        y + 20,
        fit(&ctx.card_id(&record.roll_number), text_width, 1),
        BLUE_800,
        1,
    ));
    nodes.push(Node::text(
        16,
        y + 34,
        fit(&format!("Academic Year {}", ctx.academic_year()), text_width, 1),
        BLUE_800,
        1,
    ));
    for (idx, line) in wrap(
        &format!("If found, please return to {}", ctx.school),
        text_width,
        1,
    )
    .into_iter()
    .take(2)
    .enumerate()
    {
        nodes.push(Node::text(16, y + 50 + idx as i32 * 11, line, BLUE_600, 1));
    }
    nodes.extend(code_block(
        code,
        (WIDTH - CODE_BOX - 12) as i32,
        y + CODE_PAD as i32,
        Some(BLUE_200),
    ));
    let height = y as u32 + FOOTER_HEIGHT;
    nodes.push(Node::Border {
        rect: Rect::new(0, 0, WIDTH, height),
        color: BLUE_500,
        thickness: 2,
    });

    CardArtifact {
        variant: Variant::White,
        width: WIDTH,
        height,
        background: Paint::Solid(Color::WHITE),
        nodes,
    }
}

fn green(record: &StudentRecord, code: &EmbeddedCode, ctx: &RenderContext) -> CardArtifact {
    const WIDTH: u32 = 340;
    let mut nodes = vec![
        Node::fill(Rect::new(0, 0, WIDTH, 56), GREEN_600),
        Node::text(
            16,
            14,
            fit(&ctx.school.to_uppercase(), WIDTH - 32, 2),
            Color::WHITE,
            2,
        ),
        Node::text(
            16,
            36,
            format!("Student ID Card - {}", ctx.today.year()),
            Color::WHITE,
            1,
        ),
    ];
    nodes.extend(photo(record, Rect::new(16, 72, 96, 128), GREEN_300));
    nodes.extend(rows(
        128,
        80,
        60,
        WIDTH - 140,
        &[
            ("Name:", record.name.as_str()),
            ("Roll No:", record.roll_number.as_str()),
            ("Class:", record.class_div.as_str()),
            ("Rack No:", record.rack_number.as_str()),
            ("Bus:", record.bus_route.as_str()),
        ],
        GRAY_900,
        GRAY_800,
    ));

    let mut y = 212;
    let style = AlertStyle {
        fill: None,
        border: None,
        label: "Allergies:",
        label_color: RED_600,
        text_color: RED_600,
    };
    if let Some((region, height)) = alert(record, y, WIDTH, &style) {
        nodes.push(region);
        y += height as i32;
    }

    nodes.push(Node::fill(Rect::new(0, y, WIDTH, FOOTER_HEIGHT), GREEN_50));
    let text_width = WIDTH - CODE_BOX - 40;
    nodes.push(Node::text(
        16,
        y + 28,
        fit(&ctx.card_id(&record.roll_number), text_width, 1),
        GRAY_900,
        1,
    ));
    nodes.push(Node::text(
        16,
        y + 44,
        fit(&format!("Academic Year {}", ctx.academic_year()), text_width, 1),
        GRAY_600,
        1,
    ));
    nodes.extend(code_block(
        code,
        (WIDTH - CODE_BOX - 12) as i32,
        y + CODE_PAD as i32,
        None,
    ));
    let height = y as u32 + FOOTER_HEIGHT;
    nodes.push(Node::Border {
        rect: Rect::new(0, 0, WIDTH, height),
        color: GREEN_600,
        thickness: 1,
    });

    CardArtifact {
        variant: Variant::Green,
        width: WIDTH,
        height,
        background: Paint::Solid(Color::WHITE),
        nodes,
    }
}

fn purple(record: &StudentRecord, code: &EmbeddedCode, ctx: &RenderContext) -> CardArtifact {
    const WIDTH: u32 = 240;
    let center = WIDTH as i32 / 2;
    let mut nodes = vec![
        Node::centered(
            center,
            12,
            fit(&ctx.school, WIDTH - 16, 2),
            Color::WHITE,
            2,
        ),
        Node::centered(center, 32, "Student ID", Color::WHITE, 1),
        Node::fill(Rect::new(0, 48, WIDTH, 228), Color::WHITE),
    ];
    nodes.extend(photo(
        record,
        Rect::new((WIDTH as i32 - 96) / 2, 60, 96, 128),
        PURPLE_400,
    ));
    nodes.push(Node::centered(
        center,
        198,
        fit(&record.name, WIDTH - 16, 1),
        Color::BLACK,
        1,
    ));
    nodes.push(Node::centered(center, 212, record.class_div.as_str(), GRAY_600, 1));
    nodes.extend(rows(
        12,
        228,
        36,
        WIDTH - 24,
        &[
            ("Roll:", record.roll_number.as_str()),
            ("Rack:", record.rack_number.as_str()),
            ("Bus:", record.bus_route.as_str()),
        ],
        Color::BLACK,
        Color::BLACK,
    ));

    let mut y = 276;
    let style = AlertStyle {
        fill: Some(RED_100),
        border: None,
        label: "Allergies:",
        label_color: RED_800,
        text_color: RED_800,
    };
    if let Some((region, height)) = alert(record, y, WIDTH, &style) {
        nodes.push(region);
        y += height as i32;
    }

    nodes.push(Node::fill(Rect::new(0, y, WIDTH, FOOTER_HEIGHT), PURPLE_700));
    let text_width = WIDTH - CODE_BOX - 32;
    nodes.push(Node::text(
        12,
        y + 20,
        fit(&ctx.card_id(&record.roll_number), text_width, 1),
        Color::WHITE,
        1,
    ));
    nodes.push(Node::text(12, y + 36, "Academic Year", Color::WHITE, 1));
    nodes.push(Node::text(12, y + 48, ctx.academic_year(), Color::WHITE, 1));
    nodes.extend(code_block(
        code,
        (WIDTH - CODE_BOX - 12) as i32,
        y + CODE_PAD as i32,
        None,
    ));

    CardArtifact {
        variant: Variant::Purple,
        width: WIDTH,
        height: y as u32 + FOOTER_HEIGHT,
        background: Paint::Gradient {
            from: PURPLE_600,
            to: PURPLE_800,
            direction: GradientDirection::Vertical,
        },
        nodes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Allergy;
    use crate::record::PhotoRef;
    use pretty_assertions::assert_eq;

    fn record(allergies: Vec<Allergy>) -> StudentRecord {
        StudentRecord {
            name: "Asha Rao".into(),
            roll_number: "2023007".into(),
            class_div: "8A".into(),
            allergies,
            rack_number: "R12".into(),
            bus_route: "Route 2".into(),
            photo: Some(PhotoRef::url("/uploads/asha.png")),
            timestamp: None,
        }
    }

    fn ctx() -> RenderContext {
        RenderContext::new("Unity School", NaiveDate::from_ymd_opt(2024, 9, 1).unwrap())
    }

    fn render_all(rec: &StudentRecord) -> Vec<CardArtifact> {
        let code = EmbeddedCode::for_record(rec).unwrap();
        TemplateRegistry::list()
            .into_iter()
            .map(|tpl| tpl.render(rec, &code, &ctx()))
            .collect()
    }

    #[test]
    fn registry_resolves_names_and_aliases() {
        assert_eq!(TemplateRegistry::get("Blue").unwrap().variant, Variant::Blue);
        assert_eq!(TemplateRegistry::get("template2").unwrap().variant, Variant::White);
        assert_eq!(TemplateRegistry::get("template4").unwrap().variant, Variant::Purple);
        assert_eq!(
            TemplateRegistry::get("gold").unwrap_err(),
            UnknownTemplate("gold".into())
        );
    }

    #[test]
    fn every_variant_renders_required_fields_and_code() {
        let rec = record(vec![Allergy::Peanuts]);
        for card in render_all(&rec) {
            let texts = card.texts().join("\n");
            for needle in ["Asha Rao", "8A", "R12", "Route 2", "2023007", "ID: UNITY-2023007"] {
                assert!(
                    texts.contains(needle),
                    "{:?} is missing {needle}",
                    card.variant
                );
            }
            assert!(card.code().is_some());
        }
    }

    #[test]
    fn no_allergies_means_no_alert_region() {
        for card in render_all(&record(Vec::new())) {
            assert!(card.alert_region().is_none(), "{:?}", card.variant);
        }
    }

    #[test]
    fn allergies_joined_in_alert_region() {
        for card in render_all(&record(vec![Allergy::Nuts, Allergy::Dairy])) {
            let alert = card.alert_texts().unwrap();
            assert!(alert.contains(&"Nuts, Dairy"), "{:?}: {alert:?}", card.variant);
        }
    }

    #[test]
    fn missing_photo_renders_placeholder() {
        let mut rec = record(Vec::new());
        rec.photo = None;
        for card in render_all(&rec) {
            assert_eq!(card.photo_slot(), Some(&PhotoSlot::Placeholder));
        }
    }

    #[test]
    fn rendering_is_repeatable() {
        let rec = record(vec![Allergy::Soy]);
        assert_eq!(render_all(&rec), render_all(&rec));
    }

    #[test]
    fn academic_year_follows_context_date() {
        let card = &render_all(&record(Vec::new()))[0];
        assert!(card.texts().contains(&"Valid for Academic Year 2024-2025"));
    }

    #[test]
    fn long_text_is_truncated_to_fit() {
        assert_eq!(fit("Short", 60, 1), "Short");
        assert_eq!(fit("A very long student name", 60, 1), "A very ...");
        assert_eq!(
            wrap("Nuts, Dairy, Eggs, Gluten", 72, 1),
            vec!["Nuts, Dairy,", "Eggs, Gluten"]
        );
    }
}
