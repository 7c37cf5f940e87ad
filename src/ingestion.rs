//! The ingestion pipeline: raw spreadsheet rows in, a typed clean table
//! plus a survival report out.
//!
//! Only a schema violation (missing required columns) is a failure. Every
//! row-level anomaly (unparseable date, unparseable amount, unmapped
//! month label) degrades into a recorded exclusion or an estimated
//! value, never an error. The function returns a complete
//! `(CleanTable, DiagnosticReport)` pair or fails before producing either.

use crate::diagnostics::{DiagnosticReport, LabelDiagnostic, LossReason};
use crate::error::{LedgerError, Result};
use crate::months::resolve_month;
use crate::schema::{CleanRecord, CleanTable, RawTable, RawValue, REQUIRED_COLUMNS};
use crate::utils::{mode_year, parse_date};
use chrono::{Datelike, NaiveDate};
use log::{debug, info, warn};
use std::collections::BTreeMap;

/// Year assumed for synthesized dates when no row carries a real date.
pub const FALLBACK_ESTIMATED_YEAR: i32 = 2025;

/// Day of month used for synthesized dates.
pub const ESTIMATED_DAY: u32 = 15;

struct StagedRow {
    label: String,
    mes_num: Option<u32>,
    fecha: Option<NaiveDate>,
    fecha_estimada: bool,
    monto: Option<f64>,
    numero: Option<String>,
    poliza: Option<String>,
    concepto: Option<String>,
    proveedor: Option<String>,
    categoria: Option<String>,
    concepto_russildi: Option<String>,
    extra: BTreeMap<String, RawValue>,
}

#[derive(Default)]
struct LabelTally {
    resolved: Option<u32>,
    total: usize,
    with_date: usize,
    with_amount: usize,
    with_month: usize,
}

/// Clean a raw table into typed records plus the per-label survival
/// report.
pub fn ingest(raw: &RawTable) -> Result<(CleanTable, DiagnosticReport)> {
    let missing = raw.missing_required_columns();
    if !missing.is_empty() {
        return Err(LedgerError::MissingColumns(missing));
    }

    let required: Vec<&str> = REQUIRED_COLUMNS.to_vec();
    let mut staged: Vec<StagedRow> = Vec::with_capacity(raw.rows.len());
    let mut tallies: BTreeMap<String, LabelTally> = BTreeMap::new();

    for idx in 0..raw.rows.len() {
        let label = raw.cell(idx, "Mes").as_text().unwrap_or_default();
        let fecha = raw
            .cell(idx, "Fecha")
            .as_text()
            .and_then(|s| parse_date(&s));
        let monto = raw.cell(idx, "Monto").as_number();
        let mes_num = resolve_month(&label);

        let mut extra = BTreeMap::new();
        for column in &raw.columns {
            if !required.contains(&column.as_str()) {
                extra.insert(column.clone(), raw.cell(idx, column).clone());
            }
        }

        let tally = tallies.entry(label.clone()).or_default();
        tally.resolved = tally.resolved.or(mes_num);
        tally.total += 1;
        if fecha.is_some() {
            tally.with_date += 1;
        }
        if monto.is_some() {
            tally.with_amount += 1;
        }
        if mes_num.is_some() {
            tally.with_month += 1;
        }

        staged.push(StagedRow {
            label,
            mes_num,
            fecha,
            fecha_estimada: false,
            monto,
            numero: raw.cell(idx, "Número").as_text(),
            poliza: raw.cell(idx, "Póliza").as_text(),
            concepto: raw.cell(idx, "Concepto").as_text(),
            proveedor: raw.cell(idx, "Proveedor").as_text(),
            categoria: raw.cell(idx, "Categoría").as_text(),
            concepto_russildi: raw.cell(idx, "Concepto Russildi").as_text(),
            extra,
        });
    }

    // Estimated year for date backfill: mode of the years that do carry a
    // real date, fixed fallback otherwise.
    let estimated_year =
        mode_year(staged.iter().filter_map(|r| r.fecha)).unwrap_or(FALLBACK_ESTIMATED_YEAR);

    let mut estimated_dates = 0usize;
    for row in &mut staged {
        if row.fecha.is_none() {
            if let Some(mes_num) = row.mes_num {
                if let Some(d) = NaiveDate::from_ymd_opt(estimated_year, mes_num, ESTIMATED_DAY) {
                    row.fecha = Some(d);
                    row.fecha_estimada = true;
                    estimated_dates += 1;
                }
            }
        }
    }

    // Survival: drop rows without an amount, then rows without a resolved
    // month. A missing date alone never rejects a row; after backfill the
    // only way to reach a null date is an unresolvable month.
    let mut records: Vec<CleanRecord> = Vec::with_capacity(staged.len());
    for row in staged {
        let Some(monto) = row.monto else { continue };
        let Some(mes_num) = row.mes_num else { continue };
        let Some(fecha) = row.fecha else { continue };
        records.push(CleanRecord {
            mes: row.label,
            mes_num,
            fecha,
            fecha_estimada: row.fecha_estimada,
            anio: fecha.year(),
            monto,
            numero: row.numero,
            poliza: row.poliza,
            concepto: row.concepto,
            proveedor: row.proveedor,
            categoria: row.categoria,
            concepto_russildi: row.concepto_russildi,
            extra: row.extra,
        });
    }

    let mut surviving_per_month: BTreeMap<u32, usize> = BTreeMap::new();
    for record in &records {
        *surviving_per_month.entry(record.mes_num).or_default() += 1;
    }

    let total_rows = raw.rows.len();
    let labels = tallies
        .into_iter()
        .map(|(label, tally)| {
            let surviving = tally
                .resolved
                .map(|m| surviving_per_month.get(&m).copied().unwrap_or(0))
                .unwrap_or(0);
            let lost = tally.total.saturating_sub(surviving);
            let mut reasons = Vec::new();
            if tally.resolved.is_none() {
                reasons.push(LossReason::UnmappedMonth);
            } else if tally.with_amount < tally.total {
                reasons.push(LossReason::MissingAmount);
            }
            LabelDiagnostic {
                label,
                resolved_month: tally.resolved,
                total: tally.total,
                with_date: tally.with_date,
                with_amount: tally.with_amount,
                with_month: tally.with_month,
                surviving,
                lost,
                reasons,
            }
        })
        .collect();

    let mut report = DiagnosticReport {
        total_rows,
        surviving_rows: records.len(),
        estimated_year,
        estimated_dates,
        labels,
    };
    report.sort_labels();

    info!(
        "Ingested expense ledger: {} of {} rows kept",
        report.surviving_rows, report.total_rows
    );
    debug!(
        "Ingestion detail: {} estimated dates (year {}), {} lost to unmapped month, {} lost to missing amount",
        report.estimated_dates,
        report.estimated_year,
        report.lost_to_unmapped_month(),
        report.lost_to_missing_amount()
    );
    let unmapped = report.unmapped_labels();
    if !unmapped.is_empty() {
        warn!("Unrecognized month labels excluded: {:?}", unmapped);
    }

    Ok((CleanTable { records }, report))
}

/// Ingest a pre-fetched byte stream holding a delimited spreadsheet
/// export. Remote retrieval and format conversion are the caller's job;
/// the core only accepts already-fetched bytes.
pub fn ingest_bytes(bytes: &[u8]) -> Result<(CleanTable, DiagnosticReport)> {
    let table = RawTable::from_csv_bytes(bytes)?;
    ingest(&table)
}
