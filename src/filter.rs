//! Cascading global filter.
//!
//! The filter is an ordered pipeline of narrowing steps over an immutable
//! table: year, month range, then one multi-select per categorical
//! dimension (`Concepto Russildi`, `Categoría`, `Proveedor`), then the
//! amount range. Each step's option list is computed against the previous
//! step's survivors, never against the unfiltered table, so the options a
//! UI can offer always reflect what is actually selectable. The price of
//! that choice is that filter order matters; the order here is the
//! contract.

use crate::schema::{CleanRecord, CleanTable, Dimension};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// User-selected constraints.
///
/// An empty categorical selection means "no restriction", not "select
/// nothing": a UI's deselect-all must not zero the table on load. A
/// non-empty selection restricts rows to the selected values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    /// `None` selects the latest year present in the data.
    pub year: Option<i32>,
    /// Inclusive month-number range; `None` spans the selected year's
    /// months.
    pub month_range: Option<(u32, u32)>,
    pub conceptos_russildi: Vec<String>,
    pub categorias: Vec<String>,
    pub proveedores: Vec<String>,
    /// Inclusive amount range; `None` spans the surviving rows' amounts.
    pub amount_range: Option<(f64, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterStatus {
    Applied,
    /// The table had no distinct years; the filter was a no-op and the
    /// input was returned unchanged.
    NoYearsAvailable,
}

/// What each control could offer, computed cascade-style: every list
/// reflects the table as narrowed by the steps before it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub years: Vec<i32>,
    pub months: Vec<u32>,
    pub conceptos_russildi: Vec<String>,
    pub categorias: Vec<String>,
    pub proveedores: Vec<String>,
    /// floor(min)/ceil(max) of the surviving amounts; equal bounds mean
    /// the range collapsed to a single value.
    pub amount_bounds: Option<(f64, f64)>,
}

/// The constraints actually used after defaulting and fallback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectiveFilters {
    pub year: Option<i32>,
    pub month_range: Option<(u32, u32)>,
    pub amount_range: Option<(f64, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterOutcome {
    pub table: CleanTable,
    pub status: FilterStatus,
    pub options: FilterOptions,
    pub effective: EffectiveFilters,
}

fn distinct_values(rows: &[CleanRecord], dimension: Dimension) -> Vec<String> {
    let set: BTreeSet<&str> = rows.iter().filter_map(|r| dimension.value(r)).collect();
    set.into_iter().map(str::to_string).collect()
}

fn apply_selection(rows: &mut Vec<CleanRecord>, dimension: Dimension, selection: &[String]) {
    if selection.is_empty() {
        return;
    }
    rows.retain(|r| {
        dimension
            .value(r)
            .map(|v| selection.iter().any(|s| s == v))
            .unwrap_or(false)
    });
}

/// Apply the cascading filter and report the option lists each step could
/// offer. Pure over the input table; returns a new derived table.
pub fn apply_global_filters(table: &CleanTable, state: &FilterState) -> FilterOutcome {
    let years = table.years();
    if years.is_empty() {
        warn!("No years present in the cleaned table; global filter is a no-op");
        return FilterOutcome {
            table: table.clone(),
            status: FilterStatus::NoYearsAvailable,
            options: FilterOptions::default(),
            effective: EffectiveFilters::default(),
        };
    }

    // Year: default latest; a requested year outside the domain falls
    // back to the default (a real selector can only offer existing
    // years).
    let latest = *years.last().expect("years is non-empty");
    let year = state.year.filter(|y| years.contains(y)).unwrap_or(latest);
    let mut rows: Vec<CleanRecord> = table
        .records
        .iter()
        .filter(|r| r.anio == year)
        .cloned()
        .collect();

    // Month range over the selected year's months.
    let months: Vec<u32> = {
        let set: BTreeSet<u32> = rows.iter().map(|r| r.mes_num).collect();
        set.into_iter().collect()
    };
    let default_range = (
        months.first().copied().unwrap_or(1),
        months.last().copied().unwrap_or(12),
    );
    let (month_lo, month_hi) = state.month_range.unwrap_or(default_range);
    rows.retain(|r| r.mes_num >= month_lo && r.mes_num <= month_hi);

    // Categorical dimensions, fixed order; options before own selection.
    let conceptos_russildi = distinct_values(&rows, Dimension::ConceptoRussildi);
    apply_selection(&mut rows, Dimension::ConceptoRussildi, &state.conceptos_russildi);

    let categorias = distinct_values(&rows, Dimension::Categoria);
    apply_selection(&mut rows, Dimension::Categoria, &state.categorias);

    let proveedores = distinct_values(&rows, Dimension::Proveedor);
    apply_selection(&mut rows, Dimension::Proveedor, &state.proveedores);

    // Amount range over whatever survived the categorical steps.
    let amount_bounds = if rows.is_empty() {
        None
    } else {
        let min = rows.iter().map(|r| r.monto).fold(f64::INFINITY, f64::min);
        let max = rows
            .iter()
            .map(|r| r.monto)
            .fold(f64::NEG_INFINITY, f64::max);
        if min == max {
            Some((min, max))
        } else {
            Some((min.floor(), max.ceil()))
        }
    };
    let amount_range = state.amount_range.or(amount_bounds);
    if let Some((amount_lo, amount_hi)) = amount_range {
        rows.retain(|r| r.monto >= amount_lo && r.monto <= amount_hi);
    }

    if rows.is_empty() {
        debug!("Global filter produced an empty table (year {year})");
    }

    FilterOutcome {
        table: CleanTable { records: rows },
        status: FilterStatus::Applied,
        options: FilterOptions {
            years,
            months,
            conceptos_russildi,
            categorias,
            proveedores,
            amount_bounds,
        },
        effective: EffectiveFilters {
            year: Some(year),
            month_range: Some((month_lo, month_hi)),
            amount_range,
        },
    }
}
