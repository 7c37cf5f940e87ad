//! Free-text month label resolution.
//!
//! Ledger exports mix Spanish full names, English full names and the
//! 3-letter abbreviations Excel produces (both languages), in whatever
//! casing the spreadsheet author used. The resolver maps all of them onto a canonical
//! month number 1..=12; display always goes through [`MONTH_NAMES`], which
//! prefers "Septiembre" over the accepted "Setiembre" variant.

use once_cell::sync::Lazy;
use std::collections::HashMap;

static MONTH_MAP: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    HashMap::from([
        // Spanish full names
        ("Enero", 1),
        ("Febrero", 2),
        ("Marzo", 3),
        ("Abril", 4),
        ("Mayo", 5),
        ("Junio", 6),
        ("Julio", 7),
        ("Agosto", 8),
        ("Septiembre", 9),
        ("Setiembre", 9), // accepted variant, displayed as "Septiembre"
        ("Octubre", 10),
        ("Noviembre", 11),
        ("Diciembre", 12),
        // Spanish 3-letter abbreviations that differ from the English ones
        ("Ene", 1),
        ("Abr", 4),
        ("Ago", 8),
        ("Dic", 12),
        // English 3-letter abbreviations (common in Excel)
        ("Jan", 1),
        ("Feb", 2),
        ("Mar", 3),
        ("Apr", 4),
        ("May", 5),
        ("Jun", 6),
        ("Jul", 7),
        ("Aug", 8),
        ("Sep", 9),
        ("Oct", 10),
        ("Nov", 11),
        ("Dec", 12),
        // English full names
        ("January", 1),
        ("February", 2),
        ("March", 3),
        ("April", 4),
        ("June", 6),
        ("July", 7),
        ("August", 8),
        ("September", 9),
        ("October", 10),
        ("November", 11),
        ("December", 12),
    ])
});

/// Preferred display spelling per month number (1-indexed).
pub const MONTH_NAMES: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

/// Display name for a month number, falling back to the numeral for
/// anything outside 1..=12.
pub fn month_label(month: u32) -> String {
    match month_name(month) {
        Some(name) => name.to_string(),
        None => month.to_string(),
    }
}

pub fn month_name(month: u32) -> Option<&'static str> {
    if (1..=12).contains(&month) {
        Some(MONTH_NAMES[(month - 1) as usize])
    } else {
        None
    }
}

/// Resolve a free-text month label to its canonical number.
///
/// Tries the trimmed literal plus its lowercase, uppercase, capitalized and
/// title-cased forms against the bundled table, then falls back to a
/// case-insensitive scan over all table keys (this catches mixed internal
/// casing like "sePtieMbre"). Returns `None` for anything unrecognized;
/// an unmapped label is a normal, reportable outcome.
pub fn resolve_month(label: &str) -> Option<u32> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return None;
    }

    let variants = [
        trimmed.to_string(),
        trimmed.to_lowercase(),
        trimmed.to_uppercase(),
        capitalize(trimmed),
        title_case(trimmed),
    ];
    for variant in &variants {
        if let Some(&num) = MONTH_MAP.get(variant.as_str()) {
            return Some(num);
        }
    }

    MONTH_MAP
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(trimmed))
        .map(|(_, &num)| num)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}
