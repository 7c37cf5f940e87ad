use anyhow::Result;
use expense_ledger_analytics::*;

const LEDGER_CSV: &str = "\
Mes,Número,Fecha,Póliza,Concepto,Proveedor,Monto,Categoría,Concepto Russildi,Obs
Enero,1,2025-01-08,P-001,Terracería calle 4,Constructora Norte,120000,Obra,Vialidades,
ENERO,2,2025-01-15,P-002,Material pétreo,Agregados del Bajío,80000,Material,Vialidades,
Febrero,3,2025-02-03,P-003,Tubería PVC 8 pulgadas,Hidráulica MX,95000,Material,Drenaje,revisar
febrero,4,,P-004,Mano de obra drenaje,Hidráulica MX,105000,Obra,Drenaje,
Marzo,5,2025-03-12,P-005,Supervisión,Ing. Salas,60000,Servicios,Supervisión,
Mar,6,2025-03-20,P-006,Topografía,Ing. Salas,140000,Servicios,Supervisión,
Abril,7,2025-04-02,P-007,Pavimentación,Constructora Norte,480000,Obra,Vialidades,
Abril,8,2025-04-18,P-008,Señalización,Semex,20000,Material,Vialidades,
Setiembre,9,2025-09-05,P-009,Alumbrado,Luz y Fuerza,90000,Obra,Electrificación,
Mes 13,10,2025-05-05,P-010,Concepto raro,Desconocido,50000,Obra,Otros,
Junio,11,2025-06-10,P-011,Sin costo registrado,Acme,,Obra,Otros,
";

#[test]
fn test_ingest_csv_ledger_end_to_end() -> Result<()> {
    let (clean, report) = ingest_bytes(LEDGER_CSV.as_bytes())?;

    // 11 raw rows: one lost to an unmapped month ("Mes 13"), one lost to
    // a missing amount ("Junio"), the rest survive.
    assert_eq!(report.total_rows, 11);
    assert_eq!(report.surviving_rows, 9);
    assert_eq!(clean.len(), 9);
    assert_eq!(report.lost_to_unmapped_month(), 1);
    assert_eq!(report.lost_to_missing_amount(), 1);
    assert_eq!(report.unmapped_labels(), vec!["Mes 13"]);

    // the dateless "febrero" row got an estimated date in the mode year
    assert_eq!(report.estimated_year, 2025);
    assert_eq!(report.estimated_dates, 1);
    let estimated: Vec<_> = clean.records.iter().filter(|r| r.fecha_estimada).collect();
    assert_eq!(estimated.len(), 1);
    assert_eq!(estimated[0].mes_num, 2);
    assert_eq!(estimated[0].fecha.to_string(), "2025-02-15");

    // "Setiembre" resolves to month 9 but displays as "Septiembre"
    let sep = clean.records.iter().find(|r| r.mes_num == 9).unwrap();
    assert_eq!(sep.mes, "Setiembre");
    assert_eq!(month_label(sep.mes_num), "Septiembre");

    // extra column rides along untouched
    let obs = clean
        .records
        .iter()
        .find(|r| r.poliza.as_deref() == Some("P-003"))
        .unwrap();
    assert_eq!(obs.extra.get("Obs"), Some(&RawValue::text("revisar")));

    // every clean record satisfies the non-null invariants by type; spot
    // check the derived year
    assert!(clean.records.iter().all(|r| r.anio == 2025));
    Ok(())
}

#[test]
fn test_diagnostic_labels_sorted_chronologically() {
    let (_, report) = ingest_bytes(LEDGER_CSV.as_bytes()).unwrap();
    let resolved: Vec<Option<u32>> = report.labels.iter().map(|l| l.resolved_month).collect();
    let mapped: Vec<u32> = resolved.iter().flatten().copied().collect();
    let mut sorted = mapped.clone();
    sorted.sort_unstable();
    assert_eq!(mapped, sorted);
    // unresolved labels sort last
    assert_eq!(report.labels.last().unwrap().resolved_month, None);
    assert_eq!(report.labels.last().unwrap().label, "Mes 13");

    // per-label count consistency
    for label in &report.labels {
        assert!(label.with_month <= label.total);
        assert!(label.with_amount <= label.total);
        assert!(label.with_date <= label.total);
        assert!(label.lost <= label.total);
    }
}

#[test]
fn test_missing_columns_is_the_only_hard_failure() {
    let err = ingest_bytes("Mes,Monto\nEnero,1\n".as_bytes()).unwrap_err();
    match err {
        LedgerError::MissingColumns(missing) => {
            assert!(missing.contains(&"Fecha".to_string()));
            assert!(missing.contains(&"Concepto Russildi".to_string()));
        }
        other => panic!("unexpected error: {other}"),
    }

    // garbage cells never fail ingestion
    let csv = "Mes,Número,Fecha,Póliza,Concepto,Proveedor,Monto,Categoría,Concepto Russildi\n\
               Enero,x,fecha mala,,,,monto malo,,\n";
    let (clean, report) = ingest_bytes(csv.as_bytes()).unwrap();
    assert!(clean.is_empty());
    assert_eq!(report.total_rows, 1);
}

#[test]
fn test_cascading_filter_over_ingested_ledger() {
    let (clean, _) = ingest_bytes(LEDGER_CSV.as_bytes()).unwrap();

    let state = FilterState {
        year: Some(2025),
        month_range: Some((1, 4)),
        conceptos_russildi: vec!["Vialidades".to_string()],
        ..Default::default()
    };
    let outcome = apply_global_filters(&clean, &state);
    assert_eq!(outcome.table.len(), 4);
    // provider options come from the already-narrowed table
    assert_eq!(
        outcome.options.proveedores,
        vec!["Agregados del Bajío", "Constructora Norte", "Semex"]
    );
    // narrowing is monotone and repeatable
    let narrower = FilterState {
        proveedores: vec!["Semex".to_string()],
        ..state.clone()
    };
    let narrowed = apply_global_filters(&clean, &narrower);
    assert!(narrowed.table.len() <= outcome.table.len());
    assert_eq!(narrowed.table.len(), 1);
    let twice = apply_global_filters(&narrowed.table, &narrower);
    assert_eq!(twice.table.len(), 1);
}

#[test]
fn test_monthly_anomaly_bounds_reference_values() {
    // monthly sums [100, 100, 100, 500]: mean 200, population sigma
    // 173.2, upper ~459.8, lower ~-59.8
    let csv = "Mes,Número,Fecha,Póliza,Concepto,Proveedor,Monto,Categoría,Concepto Russildi\n\
               Enero,1,2025-01-10,,,,100,,\n\
               Febrero,2,2025-02-10,,,,100,,\n\
               Marzo,3,2025-03-10,,,,100,,\n\
               Abril,4,2025-04-10,,,,500,,\n";
    let (clean, _) = ingest_bytes(csv.as_bytes()).unwrap();
    let anomalies = monthly_anomalies(&clean).unwrap();
    assert!((anomalies.mean - 200.0).abs() < 1e-9);
    assert!((anomalies.std_dev - 173.205).abs() < 0.001);
    assert!((anomalies.upper - 459.8).abs() < 0.1);
    assert!((anomalies.lower - -59.8).abs() < 0.1);
    assert_eq!(anomalies.high, vec![(4, 500.0)]);
    assert!(anomalies.low.is_empty());
}

#[test]
fn test_group_outliers_on_ingested_ledger() {
    let (clean, _) = ingest_bytes(LEDGER_CSV.as_bytes()).unwrap();
    let outliers = group_outliers(&clean, Dimension::ConceptoRussildi);
    // Vialidades: [120000, 80000, 480000, 20000] -> median 100000,
    // threshold 300000 -> only the 480000 movement is flagged
    assert_eq!(outliers.len(), 1);
    assert_eq!(outliers[0].group_label, "Vialidades");
    assert_eq!(outliers[0].record.monto, 480000.0);
    assert_eq!(outliers[0].group_median, 100000.0);
    assert!((outliers[0].ratio - 4.8).abs() < 1e-9);
}

#[test]
fn test_narrative_reflects_filtered_aggregates() {
    let (clean, _) = ingest_bytes(LEDGER_CSV.as_bytes()).unwrap();
    let outcome = apply_global_filters(&clean, &FilterState::default());
    let text = generate_narrative(&outcome.table).unwrap();

    assert!(text.contains("### Resumen Ejecutivo"));
    assert!(text.contains("### Análisis de Variabilidad"));
    assert!(text.contains("### Proyección"));
    assert!(text.contains("### Observaciones Clave"));
    // April (500k) dominates: peak observation and high variability
    assert!(text.contains("Abril"));
    assert!(text.contains("excepcionalmente alto"));
    // deterministic output
    assert_eq!(text, generate_narrative(&outcome.table).unwrap());
}

#[test]
fn test_export_round_trip_preserves_amounts() -> Result<()> {
    let (clean, _) = ingest_bytes(LEDGER_CSV.as_bytes())?;
    let outcome = apply_global_filters(&clean, &FilterState::default());
    let exported = export_delimited(&outcome.table)?;

    // no display formatting leaks into the amount column
    let parsed = RawTable::from_csv_bytes(exported.as_bytes())?;
    let idx = parsed.column_index("Monto").unwrap();
    let mut exported_amounts: Vec<f64> = parsed
        .rows
        .iter()
        .map(|row| row[idx].as_number().unwrap())
        .collect();
    let mut original_amounts: Vec<f64> =
        outcome.table.records.iter().map(|r| r.monto).collect();
    exported_amounts.sort_by(|a, b| a.partial_cmp(b).unwrap());
    original_amounts.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(exported_amounts, original_amounts);

    // and the export re-ingests without losing rows
    let (reclean, rereport) = ingest_bytes(exported.as_bytes())?;
    assert_eq!(reclean.len(), outcome.table.len());
    assert_eq!(rereport.surviving_rows, rereport.total_rows);
    Ok(())
}
