//! Templated narrative summary.
//!
//! The generator is split the way the data flows: a structured
//! [`NarrativeInsights`] record is computed from the filtered table, and a
//! pure renderer turns it into fixed Spanish prose fragments in a fixed
//! section order. No free-form generation; every qualitative phrase is
//! selected by a named threshold so the buckets stay testable on their
//! own.

use crate::aggregate::{
    concentration, group_summaries, monthly_totals, recency_comparison, GroupSummary,
    RecencyComparison,
};
use crate::months::month_label;
use crate::schema::{CleanTable, Dimension};
use crate::utils::{format_millions, mean, sample_std};
use serde::{Deserialize, Serialize};

/// Coefficient of variation above this is "high variability".
pub const HIGH_VARIABILITY_CV_PCT: f64 = 30.0;
/// Coefficient of variation below this is "low variability".
pub const LOW_VARIABILITY_CV_PCT: f64 = 15.0;
/// First-vs-last-month trend magnitude required to mention a trend.
pub const TREND_THRESHOLD_PCT: f64 = 10.0;
/// First-3-vs-last-3 magnitude required to mention acceleration.
pub const ACCELERATION_THRESHOLD_PCT: f64 = 5.0;
/// Recency delta magnitude required to mention the recent comparison.
pub const RECENCY_THRESHOLD_PCT: f64 = 10.0;
/// Recency delta beyond which the comparison gets an alert remark.
pub const RECENCY_ALERT_PCT: f64 = 20.0;
/// A month exceeding this multiple of the monthly mean earns a peak
/// observation.
pub const PEAK_OBSERVATION_RATIO: f64 = 1.5;
/// Fewer distinct months than this earns a short-period remark.
pub const SHORT_PERIOD_MONTHS: usize = 6;
/// Top-3 provider share above this earns the concentration section.
pub const PROVIDER_CONCENTRATION_PCT: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariabilityBucket {
    High,
    Moderate,
    Low,
}

impl VariabilityBucket {
    pub fn from_cv(cv_pct: f64) -> Self {
        if cv_pct > HIGH_VARIABILITY_CV_PCT {
            VariabilityBucket::High
        } else if cv_pct < LOW_VARIABILITY_CV_PCT {
            VariabilityBucket::Low
        } else {
            VariabilityBucket::Moderate
        }
    }
}

/// Everything the renderer needs, precomputed from the filtered table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeInsights {
    pub year: i32,
    pub first_month: u32,
    pub last_month: u32,
    pub first_value: f64,
    pub last_value: f64,
    pub months_count: usize,
    pub total: f64,
    pub monthly_mean: f64,
    pub run_rate: f64,
    pub max_month: u32,
    pub max_value: f64,
    pub min_month: u32,
    pub min_value: f64,
    /// How much higher the most expensive month is than the cheapest,
    /// `None` when the cheapest is non-positive (undefined ratio).
    pub spread_pct: Option<f64>,
    /// Coefficient of variation of the monthly sums (sample std dev),
    /// zero when fewer than two months exist.
    pub cv_pct: f64,
    pub variability: VariabilityBucket,
    /// Last month vs. first month; `None` when undefined (single month
    /// or non-positive first month).
    pub trend_pct: Option<f64>,
    /// Mean of the last three months vs. the first three; falls back to
    /// the plain trend when fewer than three months exist.
    pub acceleration_pct: Option<f64>,
    pub recency: Option<RecencyComparison>,
    pub top_concepto: Option<GroupSummary>,
    pub provider_count: usize,
    pub provider_top3_share_pct: Option<f64>,
}

impl NarrativeInsights {
    /// `None` when the table has no surviving rows.
    pub fn from_table(table: &CleanTable) -> Option<Self> {
        let totals = monthly_totals(table);
        if totals.is_empty() {
            return None;
        }
        let months: Vec<u32> = totals.keys().copied().collect();
        let sums: Vec<f64> = months.iter().map(|m| totals[m]).collect();

        let total: f64 = sums.iter().sum();
        let monthly_mean = mean(&sums).expect("at least one month");

        let (max_month, max_value) = totals
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(&m, &v)| (m, v))
            .expect("at least one month");
        let (min_month, min_value) = totals
            .iter()
            .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(&m, &v)| (m, v))
            .expect("at least one month");

        let spread_pct = if min_value > 0.0 {
            Some((max_value / min_value - 1.0) * 100.0)
        } else {
            None
        };

        let cv_pct = match sample_std(&sums) {
            Some(std) if monthly_mean > 0.0 => std / monthly_mean * 100.0,
            _ => 0.0,
        };

        let first_value = sums[0];
        let last_value = sums[sums.len() - 1];
        let trend_pct = if sums.len() >= 2 && first_value > 0.0 {
            Some((last_value / first_value - 1.0) * 100.0)
        } else {
            None
        };

        let acceleration_pct = if sums.len() >= 3 {
            let first3 = mean(&sums[..3]).expect("three months");
            let last3 = mean(&sums[sums.len() - 3..]).expect("three months");
            if first3 > 0.0 {
                Some((last3 / first3 - 1.0) * 100.0)
            } else {
                None
            }
        } else {
            trend_pct
        };

        let provider = concentration(table, Dimension::Proveedor);

        // The concept share is quoted against the whole filtered total,
        // unlabeled movements included, not just the labeled rows the
        // group summaries divide by.
        let top_concepto = group_summaries(table, Dimension::ConceptoRussildi)
            .into_iter()
            .next()
            .map(|top| GroupSummary {
                share_pct: if total > 0.0 {
                    Some(top.total / total * 100.0)
                } else {
                    None
                },
                ..top
            });

        Some(NarrativeInsights {
            year: table.records[0].anio,
            first_month: months[0],
            last_month: months[months.len() - 1],
            first_value,
            last_value,
            months_count: months.len(),
            total,
            monthly_mean,
            run_rate: monthly_mean * 12.0,
            max_month,
            max_value,
            min_month,
            min_value,
            spread_pct,
            cv_pct,
            variability: VariabilityBucket::from_cv(cv_pct),
            trend_pct,
            acceleration_pct,
            recency: recency_comparison(table),
            top_concepto,
            provider_count: provider.active,
            provider_top3_share_pct: provider.top3_share_pct,
        })
    }
}

/// Render the fixed-section narrative. Pure over the insights record.
pub fn render_narrative(ins: &NarrativeInsights) -> String {
    let mut out = String::new();

    // Resumen ejecutivo
    out.push_str("### Resumen Ejecutivo\n\n");
    out.push_str(&format!(
        "Entre **{}** y **{}** de **{}** se han ejercido **{}** en urbanización, \
         distribuidos a lo largo de **{} meses** con un promedio mensual de **{}**.\n",
        month_label(ins.first_month),
        month_label(ins.last_month),
        ins.year,
        format_millions(ins.total),
        ins.months_count,
        format_millions(ins.monthly_mean),
    ));

    // Variabilidad
    out.push_str("\n### Análisis de Variabilidad\n\n");
    out.push_str(&format!(
        "El mes de mayor gasto fue **{}** con **{}**, mientras que el mes de menor gasto \
         fue **{}** con **{}**. La diferencia entre el mes más caro y el más económico \
         es de **{}**",
        month_label(ins.max_month),
        format_millions(ins.max_value),
        month_label(ins.min_month),
        format_millions(ins.min_value),
        format_millions(ins.max_value - ins.min_value),
    ));
    if let Some(spread) = ins.spread_pct {
        out.push_str(&format!(" ({:.1}% más alto)", spread));
    }
    out.push_str(".\n");

    out.push('\n');
    match ins.variability {
        VariabilityBucket::High => out.push_str(&format!(
            "⚠️ **Alta variabilidad detectada**: El coeficiente de variación es del {:.1}%, \
             indicando una dispersión significativa en los gastos mensuales.\n",
            ins.cv_pct
        )),
        VariabilityBucket::Low => out.push_str(&format!(
            "✅ **Baja variabilidad**: El coeficiente de variación es del {:.1}%, \
             mostrando gastos relativamente consistentes mes a mes.\n",
            ins.cv_pct
        )),
        VariabilityBucket::Moderate => out.push_str(&format!(
            "📊 **Variabilidad moderada**: El coeficiente de variación es del {:.1}%, \
             con fluctuaciones normales en los gastos mensuales.\n",
            ins.cv_pct
        )),
    }

    // Tendencias
    if ins.months_count >= 2 {
        let mut lines = Vec::new();
        if let Some(trend) = ins.trend_pct {
            if trend.abs() > TREND_THRESHOLD_PCT {
                let direccion = if trend > 0.0 { "creciente" } else { "decreciente" };
                let sentido = if trend > 0.0 { "mayor" } else { "menor" };
                lines.push(format!(
                    "El gasto muestra una tendencia **{}**: el último mes ({}) es {:.1}% {} \
                     que el primer mes ({}).",
                    direccion,
                    format_millions(ins.last_value),
                    trend.abs(),
                    sentido,
                    format_millions(ins.first_value),
                ));
            }
        }
        if ins.months_count >= 3 {
            if let Some(accel) = ins.acceleration_pct {
                if accel.abs() > ACCELERATION_THRESHOLD_PCT {
                    let direccion = if accel > 0.0 { "aceleración" } else { "desaceleración" };
                    let sentido = if accel > 0.0 { "mayor" } else { "menor" };
                    lines.push(format!(
                        "En los últimos meses se observa una **{}**: el promedio de los últimos 3 meses \
                         es {:.1}% {} que el promedio de los primeros 3 meses.",
                        direccion,
                        accel.abs(),
                        sentido,
                    ));
                }
            }
        }
        if !lines.is_empty() {
            out.push_str("\n### Tendencias\n");
            for line in lines {
                out.push('\n');
                out.push_str(&line);
                out.push('\n');
            }
        }
    }

    // Comparación reciente
    if let Some(recency) = &ins.recency {
        if let Some(delta) = recency.delta_pct {
            if delta.abs() > RECENCY_THRESHOLD_PCT {
                out.push_str("\n### Comparación Reciente\n\n");
                let sentido = if delta > 0.0 { "incremento" } else { "decremento" };
                out.push_str(&format!(
                    "Los últimos 3 meses muestran un gasto promedio de **{}**, lo que representa \
                     un {} del **{:.1}%** respecto al promedio del resto del periodo ({}).",
                    format_millions(recency.recent_mean),
                    sentido,
                    delta.abs(),
                    format_millions(recency.prior_mean),
                ));
                if delta > RECENCY_ALERT_PCT {
                    out.push_str(" ⚠️ Este incremento significativo merece atención.");
                } else if delta < -RECENCY_ALERT_PCT {
                    out.push_str(" ✅ Esta reducción es notable y positiva.");
                }
                out.push('\n');
            }
        }
    }

    // Proyección
    out.push_str("\n### Proyección\n\n");
    out.push_str(&format!(
        "Con el ritmo actual de gasto, se estima un **run-rate anual de {}**.\n",
        format_millions(ins.run_rate)
    ));

    // Distribución por conceptos
    if let Some(top) = &ins.top_concepto {
        out.push_str("\n### Distribución por Conceptos\n\n");
        out.push_str(&format!(
            "El concepto que más consume recursos es **{}** con {}",
            top.label,
            format_millions(top.total),
        ));
        if let Some(share) = top.share_pct {
            out.push_str(&format!(" ({:.1}% del total)", share));
        }
        out.push_str(".\n");
    }

    // Concentración de proveedores
    if let Some(share) = ins.provider_top3_share_pct {
        if share > PROVIDER_CONCENTRATION_PCT {
            out.push_str("\n### Concentración de Proveedores\n\n");
            out.push_str(&format!(
                "Se observa una alta concentración de proveedores: los 3 principales \
                 concentran el {:.1}% del gasto total.\n",
                share
            ));
        }
    }

    // Observaciones clave
    out.push_str("\n### Observaciones Clave\n");
    if ins.monthly_mean > 0.0 && ins.max_value > ins.monthly_mean * PEAK_OBSERVATION_RATIO {
        out.push_str(&format!(
            "\n- El mes de **{}** tuvo un gasto excepcionalmente alto ({}), superando el \
             promedio mensual en {:.1}%. Se recomienda revisar las causas de este pico.\n",
            month_label(ins.max_month),
            format_millions(ins.max_value),
            (ins.max_value / ins.monthly_mean - 1.0) * 100.0,
        ));
    }
    if ins.months_count < SHORT_PERIOD_MONTHS {
        out.push_str(&format!(
            "\n- El periodo analizado abarca solo {} meses. Para un análisis más robusto, \
             se recomienda incluir más datos históricos.\n",
            ins.months_count
        ));
    }
    if ins.monthly_mean > 0.0 && ins.months_count < 12 {
        let restantes = 12 - ins.months_count;
        out.push_str(&format!(
            "\n- Si se mantiene el ritmo actual, se proyecta un gasto adicional de **{}** \
             para los {} meses restantes del año.\n",
            format_millions(ins.monthly_mean * restantes as f64),
            restantes
        ));
    }

    out
}

/// Convenience wrapper: insights plus rendering in one call. `None` when
/// the table is empty.
pub fn generate_narrative(table: &CleanTable) -> Option<String> {
    NarrativeInsights::from_table(table).map(|ins| render_narrative(&ins))
}
