//! # Expense Ledger Analytics
//!
//! A library for turning a curated spreadsheet of housing-development
//! expense records into cleaned, analyzable data plus derived reporting
//! artifacts: survival diagnostics, cascading filters, aggregates,
//! outlier detection and a templated narrative summary.
//!
//! ## Core Concepts
//!
//! - **Raw table**: untyped rows as uploaded, with free-text month labels
//!   in several languages and casings, missing dates and missing amounts
//! - **Clean table**: typed records where amount, month number, date and
//!   year are guaranteed present; missing dates are estimated (day 15 of
//!   the most common year), never a rejection cause
//! - **Diagnostic report**: an auditable account of every record's fate
//!   per raw month label (kept, estimated, or excluded, and why)
//! - **Cascading filter**: each control's options are computed against
//!   the table as narrowed by the controls before it
//! - **Narrative**: deterministic Spanish prose selected by fixed
//!   thresholds over the aggregates
//!
//! ## Example
//!
//! ```rust,ignore
//! use expense_ledger_analytics::*;
//!
//! let bytes = std::fs::read("egresos.csv")?;
//! let (clean, report) = LedgerProcessor::ingest_bytes(&bytes)?;
//! for line in report.summary_lines() {
//!     println!("{line}");
//! }
//!
//! let outcome = apply_global_filters(&clean, &FilterState::default());
//! let anomalies = monthly_anomalies(&outcome.table);
//! if let Some(text) = generate_narrative(&outcome.table) {
//!     println!("{text}");
//! }
//! let csv = export_delimited(&outcome.table)?;
//! ```

pub mod aggregate;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod filter;
pub mod ingestion;
pub mod months;
pub mod narrative;
pub mod schema;
pub mod utils;

pub use aggregate::{
    concentration, cumulative_series, group_outliers, group_summaries, mean_monthly,
    monthly_anomalies, monthly_series, monthly_totals, movements_for, movements_missing,
    recency_comparison, run_rate, search_movements, ConcentrationSummary, GroupSummary,
    MonthlyAnomalies, OutlierRecord, RecencyComparison,
};
pub use diagnostics::{DiagnosticReport, LabelDiagnostic, LossReason};
pub use error::{LedgerError, Result};
pub use export::{export_delimited, write_delimited, EXPORT_COLUMNS};
pub use filter::{
    apply_global_filters, EffectiveFilters, FilterOptions, FilterOutcome, FilterState,
    FilterStatus,
};
pub use ingestion::{ingest, ingest_bytes, ESTIMATED_DAY, FALLBACK_ESTIMATED_YEAR};
pub use months::{month_label, month_name, resolve_month, MONTH_NAMES};
pub use narrative::{
    generate_narrative, render_narrative, NarrativeInsights, VariabilityBucket,
};
pub use schema::{
    CleanRecord, CleanTable, Dimension, RawTable, RawValue, REQUIRED_COLUMNS,
};
pub use utils::{format_currency, format_millions, format_number};

use log::info;

/// Session-level entry point: one ingestion call produces the clean table
/// the rest of the session analyzes. The table is replaced wholesale on
/// re-ingestion; downstream functions treat it as read-only.
pub struct LedgerProcessor;

impl LedgerProcessor {
    pub fn ingest(raw: &RawTable) -> Result<(CleanTable, DiagnosticReport)> {
        info!(
            "Processing expense ledger: {} raw rows, {} columns",
            raw.rows.len(),
            raw.columns.len()
        );
        ingestion::ingest(raw)
    }

    pub fn ingest_bytes(bytes: &[u8]) -> Result<(CleanTable, DiagnosticReport)> {
        info!("Processing expense ledger from byte stream ({} bytes)", bytes.len());
        ingestion::ingest_bytes(bytes)
    }
}
