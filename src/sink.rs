//! Tabular output: columns + rows → one opaque artifact.

use crate::error::BatchError;
use crate::format::DocumentFormat;
use crate::output::{BatchReport, TableArtifact};
use crate::text::sanitize_name;

/// Serialises a table. The pipeline calls it for the data table and then the
/// statistics table, after the report is final.
pub trait TableSink: Send + Sync {
    /// `name` is an already-sanitised file stem; the sink adds its extension.
    fn write_table(
        &self,
        name: &str,
        columns: &[&str],
        rows: &[Vec<String>],
    ) -> Result<TableArtifact, BatchError>;
}

/// CSV via the `csv` crate. Header row first, one row per success.
#[derive(Debug, Clone)]
pub struct CsvTableSink {
    delimiter: u8,
}

impl Default for CsvTableSink {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl CsvTableSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `;` (or any other byte) instead of `,`; spreadsheet locales that
    /// use a decimal comma expect `;`.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

impl TableSink for CsvTableSink {
    fn write_table(
        &self,
        name: &str,
        columns: &[&str],
        rows: &[Vec<String>],
    ) -> Result<TableArtifact, BatchError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(Vec::new());

        writer
            .write_record(columns)
            .map_err(|e| BatchError::TableOutput(e.to_string()))?;
        for row in rows {
            writer
                .write_record(row)
                .map_err(|e| BatchError::TableOutput(e.to_string()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| BatchError::TableOutput(e.to_string()))?;

        Ok(TableArtifact {
            file_name: format!("{name}.csv"),
            content_type: "text/csv",
            bytes,
        })
    }
}

/// Column set and file stem for a report.
///
/// An explicit format uses its own descriptor. In auto mode the columns are
/// the union of the descriptors of the formats that produced a success, in
/// detection priority order; with no successes at all the CRT layout is used.
pub fn table_layout(report: &BatchReport) -> (Vec<&'static str>, String) {
    let formats = match report.format {
        Some(f) => vec![f],
        None => {
            let present = report.formats_present();
            if present.is_empty() {
                vec![DocumentFormat::Crt]
            } else {
                present
            }
        }
    };

    let mut columns: Vec<&'static str> = Vec::new();
    for f in &formats {
        for c in &f.descriptor().columns {
            if !columns.contains(c) {
                columns.push(c);
            }
        }
    }

    let name = match formats.as_slice() {
        [single] => sanitize_name(single.display_name()),
        _ => "Documentos".to_string(),
    };
    (columns, name)
}

/// Lay the report's successes out under `columns` and hand them to `sink`.
pub fn write_report(sink: &dyn TableSink, report: &BatchReport) -> Result<TableArtifact, BatchError> {
    let (columns, name) = table_layout(report);
    let rows: Vec<Vec<String>> = report
        .successes
        .iter()
        .map(|s| s.fields.row_for(&columns))
        .collect();
    sink.write_table(&name, &columns, &rows)
}

/// Columns of the statistics table.
pub const STATISTICS_COLUMNS: [&str; 3] = ["Concepto", "Valor", "Tipo"];

/// Batch totals followed by one row per failed document
/// (file name, message, error kind), in submission order.
pub fn statistics_rows(report: &BatchReport) -> Vec<Vec<String>> {
    let mut rows = vec![
        vec!["Total Procesados".to_string(), report.total_processed.to_string(), String::new()],
        vec!["Total Exitosos".to_string(), report.total_success.to_string(), String::new()],
        vec!["Total Fallidos".to_string(), report.total_failure.to_string(), String::new()],
    ];
    rows.extend(
        report
            .failures
            .iter()
            .map(|f| vec![f.file_name.clone(), f.error.clone(), f.kind.to_string()]),
    );
    rows
}

/// Companion table to [`write_report`]: totals and the failed files, named
/// after the main table with an ` - Estadisticas` suffix.
pub fn write_statistics(
    sink: &dyn TableSink,
    report: &BatchReport,
) -> Result<TableArtifact, BatchError> {
    let (_, name) = table_layout(report);
    sink.write_table(
        &format!("{name} - Estadisticas"),
        &STATISTICS_COLUMNS,
        &statistics_rows(report),
    )
}
