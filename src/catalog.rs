//! Fixed option catalogs offered by the student form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A selectable value together with the label shown next to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionEntry {
    pub value: &'static str,
    pub label: &'static str,
}

macro_rules! opt {
    ($value:expr, $label:expr) => {
        OptionEntry {
            value: $value,
            label: $label,
        }
    };
}

/// Class and section codes.
pub static CLASS_OPTIONS: &[OptionEntry] = &[
    opt!("1A", "Class 1 - Section A"),
    opt!("1B", "Class 1 - Section B"),
    opt!("2A", "Class 2 - Section A"),
    opt!("2B", "Class 2 - Section B"),
    opt!("3A", "Class 3 - Section A"),
    opt!("3B", "Class 3 - Section B"),
    opt!("4A", "Class 4 - Section A"),
    opt!("4B", "Class 4 - Section B"),
    opt!("5A", "Class 5 - Section A"),
    opt!("5B", "Class 5 - Section B"),
    opt!("6A", "Class 6 - Section A"),
    opt!("6B", "Class 6 - Section B"),
    opt!("7A", "Class 7 - Section A"),
    opt!("7B", "Class 7 - Section B"),
    opt!("8A", "Class 8 - Section A"),
    opt!("8B", "Class 8 - Section B"),
    opt!("9A", "Class 9 - Section A"),
    opt!("9B", "Class 9 - Section B"),
    opt!("10A", "Class 10 - Section A"),
    opt!("10B", "Class 10 - Section B"),
    opt!("11SC", "Class 11 - Science"),
    opt!("11COM", "Class 11 - Commerce"),
    opt!("11ARTS", "Class 11 - Arts"),
    opt!("12SC", "Class 12 - Science"),
    opt!("12COM", "Class 12 - Commerce"),
    opt!("12ARTS", "Class 12 - Arts"),
    opt!("BTECH1", "B.Tech - 1st Year"),
    opt!("BTECH2", "B.Tech - 2nd Year"),
    opt!("BTECH3", "B.Tech - 3rd Year"),
    opt!("BTECH4", "B.Tech - 4th Year"),
];

/// Value used when a student does not ride a school bus.
pub const NO_BUS_ROUTE: &str = "None";

/// Bus route codes, including the [`NO_BUS_ROUTE`] sentinel.
pub static BUS_ROUTES: &[OptionEntry] = &[
    opt!("Route 1", "Route 1 - North City"),
    opt!("Route 2", "Route 2 - Downtown"),
    opt!("Route 3", "Route 3 - East District"),
    opt!("Route 4", "Route 4 - South Hills"),
    opt!("Route 5", "Route 5 - West Side"),
    opt!(NO_BUS_ROUTE, "No Bus Required"),
];

pub fn is_class_code(value: &str) -> bool {
    CLASS_OPTIONS.iter().any(|opt| opt.value == value)
}

pub fn is_bus_route(value: &str) -> bool {
    BUS_ROUTES.iter().any(|opt| opt.value == value)
}

/// Label shown for `value` in `options`, if it is a catalog value.
pub fn label_for(options: &[OptionEntry], value: &str) -> Option<&'static str> {
    options.iter().find(|opt| opt.value == value).map(|opt| opt.label)
}

/// Known allergy labels. Serialized by their display label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Allergy {
    Nuts,
    Dairy,
    Eggs,
    Gluten,
    Seafood,
    Soy,
    Wheat,
    Shellfish,
    Peanuts,
    #[serde(rename = "Tree Nuts")]
    TreeNuts,
    Latex,
    Medications,
}

impl Allergy {
    pub const ALL: [Allergy; 12] = [
        Allergy::Nuts,
        Allergy::Dairy,
        Allergy::Eggs,
        Allergy::Gluten,
        Allergy::Seafood,
        Allergy::Soy,
        Allergy::Wheat,
        Allergy::Shellfish,
        Allergy::Peanuts,
        Allergy::TreeNuts,
        Allergy::Latex,
        Allergy::Medications,
    ];

    /// Short identifier used by form controls (`treenuts`, `dairy`, ...).
    pub fn id(self) -> &'static str {
        match self {
            Allergy::Nuts => "nuts",
            Allergy::Dairy => "dairy",
            Allergy::Eggs => "eggs",
            Allergy::Gluten => "gluten",
            Allergy::Seafood => "seafood",
            Allergy::Soy => "soy",
            Allergy::Wheat => "wheat",
            Allergy::Shellfish => "shellfish",
            Allergy::Peanuts => "peanuts",
            Allergy::TreeNuts => "treenuts",
            Allergy::Latex => "latex",
            Allergy::Medications => "medications",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Allergy::Nuts => "Nuts",
            Allergy::Dairy => "Dairy",
            Allergy::Eggs => "Eggs",
            Allergy::Gluten => "Gluten",
            Allergy::Seafood => "Seafood",
            Allergy::Soy => "Soy",
            Allergy::Wheat => "Wheat",
            Allergy::Shellfish => "Shellfish",
            Allergy::Peanuts => "Peanuts",
            Allergy::TreeNuts => "Tree Nuts",
            Allergy::Latex => "Latex",
            Allergy::Medications => "Medications",
        }
    }
}

impl fmt::Display for Allergy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Raised when a label is not part of the allergy catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown allergy '{0}'")]
pub struct UnknownAllergy(pub String);

impl FromStr for Allergy {
    type Err = UnknownAllergy;

    /// Accepts either the label or the id, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Allergy::ALL
            .into_iter()
            .find(|a| a.label().eq_ignore_ascii_case(needle) || a.id().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownAllergy(s.to_string()))
    }
}

/// Join allergy labels the way cards display them.
pub fn join_allergies(allergies: &[Allergy]) -> String {
    allergies
        .iter()
        .map(|a| a.label())
        .collect::<Vec<_>>()
        .join(", ")
}
