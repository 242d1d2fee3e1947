//! CSV serialization of normalized permit rows.
//!
//! Emits the fixed nine-column schema with RFC 4180 quoting (handled by
//! the `csv` writer). Absent fields serialize as empty cells; the JSON row
//! payload keeps them `null`, so only the CSV flattens the distinction.

use anyhow::Result;
use std::path::Path;

use crate::models::PermitRecord;

pub const CSV_HEADER: [&str; 9] = [
    "issue_date",
    "permit_id",
    "address",
    "city",
    "zip",
    "contractor",
    "valuation",
    "project_name",
    "details_url",
];

/// Serialize rows to a CSV string, header included.
pub fn rows_to_csv(rows: &[PermitRecord]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for row in rows {
        writer.write_record([
            row.issue_date.format("%Y-%m-%d").to_string(),
            row.permit_id.clone(),
            row.address.clone().unwrap_or_default(),
            row.city.clone().unwrap_or_default(),
            row.zip.clone().unwrap_or_default(),
            row.contractor.clone().unwrap_or_default(),
            row.valuation.map(format_valuation).unwrap_or_default(),
            row.project_name.clone().unwrap_or_default(),
            row.details_url.clone().unwrap_or_default(),
        ])?;
    }
    let bytes = writer.into_inner()?;
    Ok(String::from_utf8(bytes)?)
}

/// Write the CSV to a file, creating parent directories as needed.
pub fn write_csv(rows: &[PermitRecord], path: &Path) -> Result<()> {
    let csv = rows_to_csv(rows)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, csv)?;
    Ok(())
}

/// Integral amounts print without a decimal point; fractional amounts keep
/// exactly what `f64` display produces. Nothing is padded or rounded.
fn format_valuation(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
