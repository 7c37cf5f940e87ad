use crate::error::Result;
use crate::utils::parse_amount;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Raw column set every ledger upload must provide. Column order is
/// irrelevant; extra columns are carried through untouched.
pub const REQUIRED_COLUMNS: [&str; 9] = [
    "Mes",
    "Número",
    "Fecha",
    "Póliza",
    "Concepto",
    "Proveedor",
    "Monto",
    "Categoría",
    "Concepto Russildi",
];

/// An untyped spreadsheet cell as handed over by the upload layer, before
/// any coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Empty,
}

impl RawValue {
    pub fn text(s: impl Into<String>) -> Self {
        RawValue::Text(s.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RawValue::Empty => true,
            RawValue::Text(s) => s.trim().is_empty(),
            RawValue::Number(_) => false,
        }
    }

    /// Trimmed textual form, `None` when the cell is blank.
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawValue::Empty => None,
            RawValue::Number(n) => Some(n.to_string()),
            RawValue::Text(s) => {
                let t = s.trim();
                if t.is_empty() {
                    None
                } else {
                    Some(t.to_string())
                }
            }
        }
    }

    /// Numeric form; text cells go through the tolerant amount parser.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Empty => None,
            RawValue::Number(n) => Some(*n).filter(|v| v.is_finite()),
            RawValue::Text(s) => parse_amount(s),
        }
    }
}

impl Default for RawValue {
    fn default() -> Self {
        RawValue::Empty
    }
}

/// Column-ordered tabular input: string headers plus rows of untyped
/// cells. This is the shape the upload/fetch collaborators hand to
/// ingestion, either built in memory or parsed from a delimited byte
/// stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RawValue>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, mut row: Vec<RawValue>) {
        row.resize(self.columns.len(), RawValue::Empty);
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, column: &str) -> &RawValue {
        self.column_index(column)
            .and_then(|idx| self.rows.get(row).and_then(|r| r.get(idx)))
            .unwrap_or(&RawValue::Empty)
    }

    /// Required columns absent from this table, sorted for deterministic
    /// error messages.
    pub fn missing_required_columns(&self) -> Vec<String> {
        let present: BTreeSet<&str> = self.columns.iter().map(|c| c.as_str()).collect();
        REQUIRED_COLUMNS
            .iter()
            .filter(|c| !present.contains(**c))
            .map(|c| c.to_string())
            .collect()
    }

    /// Parse a pre-fetched delimited byte stream (a spreadsheet export)
    /// into a raw table. Short rows are padded; every cell stays text
    /// until ingestion coerces it.
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<RawTable> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(bytes);
        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let mut table = RawTable::new(columns);
        for record in reader.records() {
            let record = record?;
            let row = record
                .iter()
                .map(|field| {
                    if field.trim().is_empty() {
                        RawValue::Empty
                    } else {
                        RawValue::Text(field.to_string())
                    }
                })
                .collect();
            table.push_row(row);
        }
        Ok(table)
    }
}

/// A fully reconciled expense movement.
///
/// Invariants enforced by construction: `monto`, `mes_num`, `fecha` and
/// `anio` are always present; `mes_num` is 1..=12; `anio` agrees with
/// `fecha` (estimated dates included). Business fields other than the
/// amount stay nullable pass-throughs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanRecord {
    /// Raw month label as received (trimmed), kept for audit display.
    pub mes: String,
    pub mes_num: u32,
    pub fecha: NaiveDate,
    /// True when `fecha` was synthesized (day 15 of the estimated year)
    /// because the source row had no usable date.
    pub fecha_estimada: bool,
    pub anio: i32,
    pub monto: f64,
    pub numero: Option<String>,
    pub poliza: Option<String>,
    pub concepto: Option<String>,
    pub proveedor: Option<String>,
    pub categoria: Option<String>,
    pub concepto_russildi: Option<String>,
    /// Columns outside the required set, passed through unchanged.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, RawValue>,
}

/// Nominal dimensions usable for grouping, filtering and drill-down, in
/// the fixed cascade order the filter applies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dimension {
    ConceptoRussildi,
    Categoria,
    Proveedor,
}

impl Dimension {
    pub fn header(&self) -> &'static str {
        match self {
            Dimension::ConceptoRussildi => "Concepto Russildi",
            Dimension::Categoria => "Categoría",
            Dimension::Proveedor => "Proveedor",
        }
    }

    pub fn value<'a>(&self, record: &'a CleanRecord) -> Option<&'a str> {
        let field = match self {
            Dimension::ConceptoRussildi => &record.concepto_russildi,
            Dimension::Categoria => &record.categoria,
            Dimension::Proveedor => &record.proveedor,
        };
        field.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// The session's cleaned table. Owned by the caller, replaced wholesale on
/// re-ingestion; downstream analytics treat it as read-only and return new
/// derived tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanTable {
    pub records: Vec<CleanRecord>,
}

impl CleanTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.records.iter().map(|r| r.monto).sum()
    }

    /// Distinct years, ascending.
    pub fn years(&self) -> Vec<i32> {
        let set: BTreeSet<i32> = self.records.iter().map(|r| r.anio).collect();
        set.into_iter().collect()
    }

    /// Distinct month numbers, ascending.
    pub fn months(&self) -> Vec<u32> {
        let set: BTreeSet<u32> = self.records.iter().map(|r| r.mes_num).collect();
        set.into_iter().collect()
    }

    /// Movement count per month number.
    pub fn records_per_month(&self) -> BTreeMap<u32, usize> {
        let mut counts = BTreeMap::new();
        for r in &self.records {
            *counts.entry(r.mes_num).or_default() += 1;
        }
        counts
    }

    /// Months of the calendar year with no movements at all.
    pub fn missing_months(&self) -> Vec<u32> {
        let present: BTreeSet<u32> = self.records.iter().map(|r| r.mes_num).collect();
        (1..=12).filter(|m| !present.contains(m)).collect()
    }
}
