//! Record-survival accounting for an ingestion run.
//!
//! Everything here is formatting and grouping over counts gathered while
//! the pipeline ran; no business logic is recomputed. The report is an
//! immutable snapshot handed to the presentation layer together with the
//! cleaned table.

use crate::error::Result;
use crate::months::month_label;
use serde::{Deserialize, Serialize};

/// Why rows under a raw month label did not survive, in attribution
/// priority order: an unmapped month explains the whole label before a
/// missing amount is considered. A missing date is never a loss reason;
/// those rows get an estimated date instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossReason {
    UnmappedMonth,
    MissingAmount,
}

/// Survival breakdown for one distinct raw month label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelDiagnostic {
    /// The label exactly as it appeared in the `Mes` column (trimmed).
    pub label: String,
    pub resolved_month: Option<u32>,
    pub total: usize,
    pub with_date: usize,
    pub with_amount: usize,
    pub with_month: usize,
    /// Rows present in the clean table for this label's resolved month
    /// (0 when the label never resolved).
    pub surviving: usize,
    pub lost: usize,
    pub reasons: Vec<LossReason>,
}

/// Immutable ingestion snapshot: one entry per distinct raw month label,
/// sorted chronologically by resolved month with unresolved labels last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub total_rows: usize,
    pub surviving_rows: usize,
    /// Year used for synthesized dates (mode of the real-date years, or
    /// the fixed fallback).
    pub estimated_year: i32,
    /// Rows that had no usable date and received a synthesized one.
    pub estimated_dates: usize,
    pub labels: Vec<LabelDiagnostic>,
}

impl DiagnosticReport {
    pub fn excluded_rows(&self) -> usize {
        self.total_rows - self.surviving_rows
    }

    /// Labels that lost at least one row.
    pub fn losses(&self) -> Vec<&LabelDiagnostic> {
        self.labels.iter().filter(|l| l.lost > 0).collect()
    }

    /// Raw labels the resolver could not map.
    pub fn unmapped_labels(&self) -> Vec<&str> {
        self.labels
            .iter()
            .filter(|l| l.resolved_month.is_none())
            .map(|l| l.label.as_str())
            .collect()
    }

    /// Rows excluded because their month label never resolved.
    pub fn lost_to_unmapped_month(&self) -> usize {
        self.labels
            .iter()
            .filter(|l| l.resolved_month.is_none())
            .map(|l| l.total)
            .sum()
    }

    /// Rows excluded because the amount was missing or unparseable.
    pub fn lost_to_missing_amount(&self) -> usize {
        self.labels
            .iter()
            .filter(|l| l.resolved_month.is_some())
            .map(|l| l.total - l.with_amount)
            .sum()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable summary in the wording administrators see in the
    /// dashboard.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        if self.excluded_rows() > 0 {
            let mut razones = Vec::new();
            let sin_monto = self.lost_to_missing_amount();
            if sin_monto > 0 {
                razones.push(format!("{} por monto faltante", sin_monto));
            }
            let no_mapeados = self.lost_to_unmapped_month();
            if no_mapeados > 0 {
                razones.push(format!("{} por mes no reconocido", no_mapeados));
            }
            lines.push(format!(
                "Se cargaron {} de {} registros. {} registros fueron excluidos: {}",
                self.surviving_rows,
                self.total_rows,
                self.excluded_rows(),
                razones.join("; ")
            ));
        } else {
            lines.push(format!(
                "Se cargaron {} de {} registros.",
                self.surviving_rows, self.total_rows
            ));
        }

        if self.estimated_dates > 0 {
            lines.push(format!(
                "Se crearon fechas estimadas (día 15) para {} registros sin fecha pero con mes válido, usando año {}.",
                self.estimated_dates, self.estimated_year
            ));
        }

        for entry in self.losses() {
            let mut razones = Vec::new();
            if entry.resolved_month.is_none() {
                razones.push("mes no mapeado".to_string());
            }
            if entry.with_amount < entry.total {
                razones.push(format!("{} sin monto", entry.total - entry.with_amount));
            }
            if entry.with_date < entry.total {
                razones.push(format!("{} sin fecha", entry.total - entry.with_date));
            }
            let mes = entry
                .resolved_month
                .map(month_label)
                .unwrap_or_else(|| "sin mes".to_string());
            lines.push(format!(
                "{} ({}): {} originales → {} finales (perdidos: {}) - Razones: {}",
                entry.label,
                mes,
                entry.total,
                entry.surviving,
                entry.lost,
                if razones.is_empty() {
                    "desconocidas".to_string()
                } else {
                    razones.join(", ")
                }
            ));
        }

        lines
    }

    pub(crate) fn sort_labels(&mut self) {
        self.labels.sort_by(|a, b| {
            let ka = (a.resolved_month.is_none(), a.resolved_month.unwrap_or(0));
            let kb = (b.resolved_month.is_none(), b.resolved_month.unwrap_or(0));
            ka.cmp(&kb).then_with(|| a.label.cmp(&b.label))
        });
    }
}
