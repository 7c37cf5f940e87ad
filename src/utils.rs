use chrono::NaiveDate;
use num_format::{Locale, ToFormattedString};
use std::collections::BTreeMap;

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%Y/%m/%d",
    "%d.%m.%Y",
];

/// Parse a date cell while being forgiving about the formats spreadsheet
/// exports produce. A trailing time component ("2025-03-01 00:00:00") is
/// ignored. Ambiguous slashed dates resolve month-first ("01/03/2025" is
/// January 3rd). Returns `None` for anything unparseable; a bad date is a
/// row-level degradation, never an error.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let date_part = s.split_whitespace().next().unwrap_or(s);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// Parse an amount cell. Trims whitespace and rejects anything that does
/// not parse as a plain decimal; formatted values ("$1,000") degrade to
/// `None` and are accounted as missing amounts upstream.
pub fn parse_amount(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Most frequent year among the given dates; ties break toward the
/// smallest year so the result is deterministic.
pub fn mode_year(dates: impl Iterator<Item = NaiveDate>) -> Option<i32> {
    use chrono::Datelike;
    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    for d in dates {
        *counts.entry(d.year()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(year, _)| year)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Population standard deviation (divisor N). Used for the monthly anomaly
/// bounds.
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Sample standard deviation (divisor N-1). Used for the coefficient of
/// variation in the narrative; needs at least two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// "$12.34 M": millions with thousands separators, for KPI display and
/// the narrative.
pub fn format_millions(value: f64) -> String {
    if value == 0.0 {
        return "$0.00 M".to_string();
    }
    format!("${} M", format_number(value / 1_000_000.0, 2))
}

/// "$1,234.56": full currency display.
pub fn format_currency(value: f64) -> String {
    format!("${}", format_number(value, 2))
}

/// Fixed-decimal formatting with locale thousands separators on the
/// integer portion.
pub fn format_number(n: f64, decimals: usize) -> String {
    let neg = n < 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}
