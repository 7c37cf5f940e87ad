//! Aggregation and outlier detection over a filtered clean table.
//!
//! Every function here is pure, treats the table as read-only and
//! recomputes from scratch on each call; there is no cached state.
//! Monthly keying uses `BTreeMap` so chronological order (ascending month
//! number, never by value) falls out of iteration.

use crate::schema::{CleanRecord, CleanTable, Dimension};
use crate::utils::{mean, median, population_std};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Multiplier on the population standard deviation for the monthly
/// anomaly bounds.
pub const ANOMALY_SIGMA_MULTIPLE: f64 = 1.5;

/// A row is an outlier when its amount exceeds this multiple of its
/// group's median.
pub const OUTLIER_MEDIAN_MULTIPLE: f64 = 3.0;

/// Distinct trailing months compared against the rest of the period.
pub const RECENT_MONTHS: usize = 3;

/// Sum of `monto` per month number, chronological.
pub fn monthly_totals(table: &CleanTable) -> BTreeMap<u32, f64> {
    let mut totals: BTreeMap<u32, f64> = BTreeMap::new();
    for r in &table.records {
        *totals.entry(r.mes_num).or_default() += r.monto;
    }
    totals
}

/// Monthly totals as an ordered series, optionally zero-filling every
/// calendar month so charts can show the full year.
pub fn monthly_series(table: &CleanTable, fill_all_months: bool) -> Vec<(u32, f64)> {
    let totals = monthly_totals(table);
    if fill_all_months {
        (1..=12)
            .map(|m| (m, totals.get(&m).copied().unwrap_or(0.0)))
            .collect()
    } else {
        totals.into_iter().collect()
    }
}

/// Running accumulated spend per month, chronological.
pub fn cumulative_series(table: &CleanTable) -> Vec<(u32, f64)> {
    let mut acc = 0.0;
    monthly_totals(table)
        .into_iter()
        .map(|(m, v)| {
            acc += v;
            (m, acc)
        })
        .collect()
}

/// Mean monthly spend, `None` when no months are present.
pub fn mean_monthly(table: &CleanTable) -> Option<f64> {
    let sums: Vec<f64> = monthly_totals(table).into_values().collect();
    mean(&sums)
}

/// Annualized forward projection: mean monthly spend times twelve.
pub fn run_rate(table: &CleanTable) -> Option<f64> {
    mean_monthly(table).map(|m| m * 12.0)
}

/// Monthly sums falling strictly outside mean ± 1.5 population sigma.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyAnomalies {
    pub mean: f64,
    pub std_dev: f64,
    pub upper: f64,
    pub lower: f64,
    pub high: Vec<(u32, f64)>,
    pub low: Vec<(u32, f64)>,
}

pub fn monthly_anomalies(table: &CleanTable) -> Option<MonthlyAnomalies> {
    let totals = monthly_totals(table);
    let sums: Vec<f64> = totals.values().copied().collect();
    let mean = mean(&sums)?;
    let std_dev = population_std(&sums)?;
    let upper = mean + ANOMALY_SIGMA_MULTIPLE * std_dev;
    let lower = mean - ANOMALY_SIGMA_MULTIPLE * std_dev;
    let high = totals
        .iter()
        .filter(|(_, &v)| v > upper)
        .map(|(&m, &v)| (m, v))
        .collect();
    let low = totals
        .iter()
        .filter(|(_, &v)| v < lower)
        .map(|(&m, &v)| (m, v))
        .collect();
    Some(MonthlyAnomalies {
        mean,
        std_dev,
        upper,
        lower,
        high,
        low,
    })
}

/// Sum, count and mean of `monto` for one label of a nominal dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSummary {
    pub label: String,
    pub total: f64,
    pub count: usize,
    pub mean: f64,
    /// Share of the dimension's grand total, `None` when that total is
    /// zero (undefined, not 0%).
    pub share_pct: Option<f64>,
}

/// Grouped summaries for a dimension, largest total first. Rows without a
/// value for the dimension are excluded.
pub fn group_summaries(table: &CleanTable, dimension: Dimension) -> Vec<GroupSummary> {
    let mut groups: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for r in &table.records {
        if let Some(value) = dimension.value(r) {
            let entry = groups.entry(value.to_string()).or_default();
            entry.0 += r.monto;
            entry.1 += 1;
        }
    }
    let grand_total: f64 = groups.values().map(|(t, _)| t).sum();
    let mut summaries: Vec<GroupSummary> = groups
        .into_iter()
        .map(|(label, (total, count))| GroupSummary {
            label,
            total,
            count,
            mean: total / count as f64,
            share_pct: if grand_total != 0.0 {
                Some(total / grand_total * 100.0)
            } else {
                None
            },
        })
        .collect();
    summaries.sort_by(|a, b| {
        b.total
            .partial_cmp(&a.total)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.label.cmp(&b.label))
    });
    summaries
}

/// How concentrated a dimension's spend is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcentrationSummary {
    /// Labels with at least one movement.
    pub active: usize,
    pub top: Option<GroupSummary>,
    /// Share of the top three labels (the whole set when fewer exist);
    /// `None` when the grand total is zero.
    pub top3_share_pct: Option<f64>,
}

pub fn concentration(table: &CleanTable, dimension: Dimension) -> ConcentrationSummary {
    let summaries = group_summaries(table, dimension);
    let grand_total: f64 = summaries.iter().map(|s| s.total).sum();
    let top3: f64 = summaries.iter().take(3).map(|s| s.total).sum();
    ConcentrationSummary {
        active: summaries.len(),
        top: summaries.first().cloned(),
        top3_share_pct: if grand_total != 0.0 {
            Some(top3 / grand_total * 100.0)
        } else {
            None
        },
    }
}

/// A movement flagged as a multiplicative outlier within its group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierRecord {
    pub record: CleanRecord,
    pub group_label: String,
    pub group_median: f64,
    /// Amount divided by the group median.
    pub ratio: f64,
}

/// Per-group outlier detection: rows whose amount exceeds three times
/// their group's median. Groups with a non-positive median are skipped
/// entirely (a degenerate median flags nothing). Sorted by ratio,
/// largest first.
pub fn group_outliers(table: &CleanTable, dimension: Dimension) -> Vec<OutlierRecord> {
    let mut groups: BTreeMap<String, Vec<&CleanRecord>> = BTreeMap::new();
    for r in &table.records {
        if let Some(value) = dimension.value(r) {
            groups.entry(value.to_string()).or_default().push(r);
        }
    }

    let mut outliers = Vec::new();
    for (label, rows) in groups {
        let amounts: Vec<f64> = rows.iter().map(|r| r.monto).collect();
        let Some(med) = median(amounts) else { continue };
        if med <= 0.0 {
            continue;
        }
        for r in rows {
            if r.monto > OUTLIER_MEDIAN_MULTIPLE * med {
                outliers.push(OutlierRecord {
                    record: (*r).clone(),
                    group_label: label.clone(),
                    group_median: med,
                    ratio: r.monto / med,
                });
            }
        }
    }
    outliers.sort_by(|a, b| {
        b.ratio
            .partial_cmp(&a.ratio)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    outliers
}

/// Mean spend of the trailing three months against the rest of the
/// period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecencyComparison {
    pub recent_months: Vec<u32>,
    pub recent_mean: f64,
    pub prior_mean: f64,
    /// Percentage delta of recent vs. prior; `None` when the prior mean
    /// is exactly zero (undefined, distinguishable from a 0% change).
    pub delta_pct: Option<f64>,
}

/// Requires at least four distinct months; returns `None` otherwise.
pub fn recency_comparison(table: &CleanTable) -> Option<RecencyComparison> {
    let totals = monthly_totals(table);
    if totals.len() < RECENT_MONTHS + 1 {
        return None;
    }
    let months: Vec<u32> = totals.keys().copied().collect();
    let split = months.len() - RECENT_MONTHS;
    let recent_months: Vec<u32> = months[split..].to_vec();
    let recent: Vec<f64> = months[split..].iter().map(|m| totals[m]).collect();
    let prior: Vec<f64> = months[..split].iter().map(|m| totals[m]).collect();
    let recent_mean = mean(&recent)?;
    let prior_mean = mean(&prior)?;
    let delta_pct = if prior_mean != 0.0 {
        Some((recent_mean / prior_mean - 1.0) * 100.0)
    } else {
        None
    };
    Some(RecencyComparison {
        recent_months,
        recent_mean,
        prior_mean,
        delta_pct,
    })
}

/// Case-insensitive substring search over `Concepto` and `Proveedor`.
/// Blank search text returns the table unchanged.
pub fn search_movements(table: &CleanTable, text: &str) -> CleanTable {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return table.clone();
    }
    let records = table
        .records
        .iter()
        .filter(|r| {
            let in_concepto = r
                .concepto
                .as_deref()
                .map(|c| c.to_lowercase().contains(&needle))
                .unwrap_or(false);
            let in_proveedor = r
                .proveedor
                .as_deref()
                .map(|p| p.to_lowercase().contains(&needle))
                .unwrap_or(false);
            in_concepto || in_proveedor
        })
        .cloned()
        .collect();
    CleanTable { records }
}

/// Drill-down: every movement carrying the given dimension label, largest
/// amount first.
pub fn movements_for(table: &CleanTable, dimension: Dimension, label: &str) -> CleanTable {
    let mut records: Vec<CleanRecord> = table
        .records
        .iter()
        .filter(|r| dimension.value(r) == Some(label))
        .cloned()
        .collect();
    records.sort_by(|a, b| {
        b.monto
            .partial_cmp(&a.monto)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    CleanTable { records }
}

/// Data-quality view: movements with no value for the given dimension.
pub fn movements_missing(table: &CleanTable, dimension: Dimension) -> CleanTable {
    let records = table
        .records
        .iter()
        .filter(|r| dimension.value(r).is_none())
        .cloned()
        .collect();
    CleanTable { records }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn record(mes_num: u32, monto: f64, concepto_russildi: Option<&str>) -> CleanRecord {
        CleanRecord {
            mes: crate::months::month_label(mes_num),
            mes_num,
            fecha: NaiveDate::from_ymd_opt(2025, mes_num, 15).unwrap(),
            fecha_estimada: false,
            anio: 2025,
            monto,
            numero: None,
            poliza: None,
            concepto: Some(format!("Concepto {mes_num}")),
            proveedor: Some("Acme".to_string()),
            categoria: None,
            concepto_russildi: concepto_russildi.map(str::to_string),
            extra: BTreeMap::new(),
        }
    }

    fn table_with_monthly_sums(sums: &[(u32, f64)]) -> CleanTable {
        CleanTable {
            records: sums
                .iter()
                .map(|&(m, v)| record(m, v, Some("General")))
                .collect(),
        }
    }

    #[test]
    fn test_monthly_totals_chronological() {
        let table = CleanTable {
            records: vec![
                record(5, 10.0, None),
                record(1, 5.0, None),
                record(5, 2.5, None),
            ],
        };
        let series = monthly_series(&table, false);
        assert_eq!(series, vec![(1, 5.0), (5, 12.5)]);

        let filled = monthly_series(&table, true);
        assert_eq!(filled.len(), 12);
        assert_eq!(filled[0], (1, 5.0));
        assert_eq!(filled[1], (2, 0.0));
    }

    #[test]
    fn test_cumulative_series() {
        let table = table_with_monthly_sums(&[(1, 100.0), (2, 50.0), (3, 25.0)]);
        assert_eq!(
            cumulative_series(&table),
            vec![(1, 100.0), (2, 150.0), (3, 175.0)]
        );
    }

    #[test]
    fn test_anomaly_bounds_flag_high_month() {
        // sums [100, 100, 100, 500]: mean 200, population sigma 173.2,
        // upper bound ~459.8 -> only the 500 month is flagged high.
        let table = table_with_monthly_sums(&[(1, 100.0), (2, 100.0), (3, 100.0), (4, 500.0)]);
        let anomalies = monthly_anomalies(&table).unwrap();
        assert!((anomalies.mean - 200.0).abs() < 1e-9);
        assert!((anomalies.upper - 459.8).abs() < 0.1);
        assert_eq!(anomalies.high, vec![(4, 500.0)]);
        assert!(anomalies.low.is_empty());
    }

    #[test]
    fn test_anomaly_bounds_empty_table() {
        assert!(monthly_anomalies(&CleanTable::default()).is_none());
    }

    #[test]
    fn test_group_outliers_three_times_median() {
        // group [10, 10, 10, 40]: median 10, threshold 30 -> only the 40
        // is flagged, with ratio 4.0.
        let table = CleanTable {
            records: vec![
                record(1, 10.0, Some("Drenaje")),
                record(2, 10.0, Some("Drenaje")),
                record(3, 10.0, Some("Drenaje")),
                record(4, 40.0, Some("Drenaje")),
            ],
        };
        let outliers = group_outliers(&table, Dimension::ConceptoRussildi);
        assert_eq!(outliers.len(), 1);
        assert_eq!(outliers[0].record.monto, 40.0);
        assert_eq!(outliers[0].group_median, 10.0);
        assert!((outliers[0].ratio - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_group_outliers_skip_nonpositive_median() {
        let table = CleanTable {
            records: vec![
                record(1, 0.0, Some("Gratis")),
                record(2, 0.0, Some("Gratis")),
                record(3, 100.0, Some("Gratis")),
            ],
        };
        assert!(group_outliers(&table, Dimension::ConceptoRussildi).is_empty());
    }

    #[test]
    fn test_recency_comparison() {
        // months [100, 200, 300, 900]: last 3 mean 466.7, rest 100,
        // delta +366.7%.
        let table = table_with_monthly_sums(&[(1, 100.0), (2, 200.0), (3, 300.0), (4, 900.0)]);
        let cmp = recency_comparison(&table).unwrap();
        assert_eq!(cmp.recent_months, vec![2, 3, 4]);
        assert!((cmp.recent_mean - 466.666).abs() < 0.001);
        assert_eq!(cmp.prior_mean, 100.0);
        assert!((cmp.delta_pct.unwrap() - 366.666).abs() < 0.001);
    }

    #[test]
    fn test_recency_needs_four_months() {
        let table = table_with_monthly_sums(&[(1, 100.0), (2, 200.0), (3, 300.0)]);
        assert!(recency_comparison(&table).is_none());
    }

    #[test]
    fn test_recency_undefined_when_prior_zero() {
        let table = table_with_monthly_sums(&[(1, 0.0), (2, 200.0), (3, 300.0), (4, 900.0)]);
        let cmp = recency_comparison(&table).unwrap();
        assert_eq!(cmp.delta_pct, None);
    }

    #[test]
    fn test_group_summaries_sorted_with_share() {
        let table = CleanTable {
            records: vec![
                record(1, 100.0, Some("Drenaje")),
                record(2, 300.0, Some("Vialidades")),
                record(3, 100.0, Some("Vialidades")),
                record(4, 50.0, None),
            ],
        };
        let summaries = group_summaries(&table, Dimension::ConceptoRussildi);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].label, "Vialidades");
        assert_eq!(summaries[0].total, 400.0);
        assert_eq!(summaries[0].count, 2);
        assert_eq!(summaries[0].mean, 200.0);
        assert!((summaries[0].share_pct.unwrap() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_concentration() {
        let table = CleanTable {
            records: vec![
                record(1, 600.0, Some("A")),
                record(2, 200.0, Some("B")),
                record(3, 100.0, Some("C")),
                record(4, 100.0, Some("D")),
            ],
        };
        let c = concentration(&table, Dimension::ConceptoRussildi);
        assert_eq!(c.active, 4);
        assert_eq!(c.top.as_ref().unwrap().label, "A");
        assert!((c.top3_share_pct.unwrap() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_run_rate() {
        let table = table_with_monthly_sums(&[(1, 100.0), (2, 200.0)]);
        assert_eq!(run_rate(&table), Some(1800.0));
        assert_eq!(run_rate(&CleanTable::default()), None);
    }

    #[test]
    fn test_search_movements() {
        let mut a = record(1, 10.0, None);
        a.concepto = Some("Pavimento norte".to_string());
        a.proveedor = Some("Acme".to_string());
        let mut b = record(2, 20.0, None);
        b.concepto = Some("Drenaje".to_string());
        b.proveedor = Some("Beta Sur".to_string());
        let table = CleanTable {
            records: vec![a, b],
        };
        assert_eq!(search_movements(&table, "PAVIMENTO").len(), 1);
        assert_eq!(search_movements(&table, "sur").len(), 1);
        assert_eq!(search_movements(&table, "  ").len(), 2);
        assert_eq!(search_movements(&table, "nada").len(), 0);
    }

    #[test]
    fn test_drill_down_and_missing() {
        let table = CleanTable {
            records: vec![
                record(1, 10.0, Some("A")),
                record(2, 30.0, Some("A")),
                record(3, 20.0, None),
            ],
        };
        let detail = movements_for(&table, Dimension::ConceptoRussildi, "A");
        assert_eq!(detail.len(), 2);
        assert_eq!(detail.records[0].monto, 30.0);

        let missing = movements_missing(&table, Dimension::ConceptoRussildi);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing.records[0].mes_num, 3);
    }
}
