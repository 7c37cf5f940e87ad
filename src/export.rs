//! Delimited export of a (filtered) clean table.
//!
//! Consumed by the download affordance outside the core. `Monto` is
//! written as a plain decimal (no currency symbol, no thousands
//! separators) so the exported file re-parses to the exact same numbers.

use crate::error::Result;
use crate::schema::CleanTable;
use std::io::Write;

/// Column order of the export: the business columns plus the derived
/// month number and year.
pub const EXPORT_COLUMNS: [&str; 11] = [
    "Mes",
    "Número",
    "Fecha",
    "Póliza",
    "Concepto",
    "Proveedor",
    "Monto",
    "Categoría",
    "Concepto Russildi",
    "MesNum",
    "Año",
];

/// Write the table as delimited text to any writer.
pub fn write_delimited<W: Write>(table: &CleanTable, writer: W) -> Result<()> {
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(EXPORT_COLUMNS)?;
    for r in &table.records {
        let record = [
            r.mes.clone(),
            r.numero.clone().unwrap_or_default(),
            r.fecha.format("%Y-%m-%d").to_string(),
            r.poliza.clone().unwrap_or_default(),
            r.concepto.clone().unwrap_or_default(),
            r.proveedor.clone().unwrap_or_default(),
            r.monto.to_string(),
            r.categoria.clone().unwrap_or_default(),
            r.concepto_russildi.clone().unwrap_or_default(),
            r.mes_num.to_string(),
            r.anio.to_string(),
        ];
        w.write_record(&record)?;
    }
    w.flush()?;
    Ok(())
}

/// Render the table as a delimited string.
pub fn export_delimited(table: &CleanTable) -> Result<String> {
    let mut buf = Vec::new();
    write_delimited(table, &mut buf)?;
    let text = String::from_utf8(buf)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(text)
}
