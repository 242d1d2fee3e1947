//! Report source adapter.
//!
//! Raw report content arrives from one of three origins — live fetch over
//! the configured endpoints, uploaded file bytes, or pasted text — and is
//! normalized into [`ReportDocument`]s tagged with their report period.
//! The parser and normalizer never see where a document came from.

use std::time::Duration;

use crate::config::PermitsConfig;
use crate::models::{PeriodKind, ReportDocument};
use crate::permits::PermitError;

/// Browser User-Agent for the report endpoints, which reject bare clients.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36";

/// An uploaded file before transport decoding.
#[derive(Debug, Clone)]
pub struct FileBlob {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Where report content comes from. One constructor per origin; everything
/// downstream consumes only the resulting document list.
#[derive(Debug)]
pub enum ReportSource {
    /// Live fetch covering a day window. Outbound network I/O.
    Fetch { days: u32 },
    /// Uploaded files. Pure transformation of supplied bytes.
    Files(Vec<FileBlob>),
    /// Pasted text, treated as a single document of unknown period.
    Stdin(String),
}

/// Adapter output: decoded documents plus the names of files that could
/// not be decoded (skipped, never fatal for the batch).
#[derive(Debug)]
pub struct SourceBatch {
    pub documents: Vec<ReportDocument>,
    pub skipped_files: Vec<String>,
}

/// Resolve a source into raw report documents.
pub async fn load_documents(
    source: ReportSource,
    config: &PermitsConfig,
) -> Result<SourceBatch, PermitError> {
    match source {
        ReportSource::Fetch { days } => fetch_reports(days, config).await,
        ReportSource::Files(blobs) => Ok(decode_files(blobs)),
        ReportSource::Stdin(text) => {
            let mut documents = Vec::new();
            if !text.trim().is_empty() {
                documents.push(ReportDocument {
                    period: PeriodKind::Unknown,
                    text,
                    origin: "stdin".to_string(),
                });
            }
            Ok(SourceBatch {
                documents,
                skipped_files: Vec::new(),
            })
        }
    }
}

/// Download the reports covering the requested window. The weekly and
/// weekday editions cover seven days; the monthly edition is only fetched
/// for wider windows. Any network failure maps to `FetchUnavailable` so
/// the caller can offer the upload/paste fallback.
async fn fetch_reports(days: u32, config: &PermitsConfig) -> Result<SourceBatch, PermitError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| PermitError::FetchUnavailable(e.to_string()))?;

    let mut targets: Vec<(u32, PeriodKind)> = Vec::new();
    if days > 7 {
        targets.push((config.monthly_report_id, PeriodKind::Monthly));
    }
    targets.push((config.weekly_report_id, PeriodKind::Weekly));
    for id in &config.weekday_report_ids {
        targets.push((*id, PeriodKind::Weekday));
    }

    let mut documents = Vec::new();
    for (report_id, period) in targets {
        let url = config
            .report_base_url
            .replace("{report_id}", &report_id.to_string());
        let response = client
            .get(&url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PermitError::FetchUnavailable(format!("{}: {}", url, e)))?;
        let text = response
            .text()
            .await
            .map_err(|e| PermitError::FetchUnavailable(format!("{}: {}", url, e)))?;
        documents.push(ReportDocument {
            period,
            text,
            origin: url,
        });
    }

    Ok(SourceBatch {
        documents,
        skipped_files: Vec::new(),
    })
}

/// Decode each uploaded file; files that cannot be decoded as text are
/// recorded and skipped without aborting the batch.
fn decode_files(blobs: Vec<FileBlob>) -> SourceBatch {
    let mut documents = Vec::new();
    let mut skipped_files = Vec::new();

    for blob in blobs {
        match decode_report_bytes(&blob.bytes) {
            Some(text) => documents.push(ReportDocument {
                period: period_from_name(&blob.name),
                text,
                origin: blob.name,
            }),
            None => {
                tracing::warn!(file = %blob.name, "could not decode uploaded file as text");
                skipped_files.push(blob.name);
            }
        }
    }

    SourceBatch {
        documents,
        skipped_files,
    }
}

/// Guess a file's report period from its name. Unrecognized names fall to
/// the lowest merge priority, same as pasted text.
fn period_from_name(name: &str) -> PeriodKind {
    let name = name.to_lowercase();
    if name.contains("month") {
        PeriodKind::Monthly
    } else if name.contains("week") {
        PeriodKind::Weekly
    } else if ["daily", "monday", "tuesday", "wednesday", "thursday", "friday"]
        .iter()
        .any(|d| name.contains(d))
    {
        PeriodKind::Weekday
    } else {
        PeriodKind::Unknown
    }
}

/// Decode report bytes from their transport encoding.
///
/// The upstream site serves UTF-16LE with BOM for some editions and plain
/// UTF-8 or Windows-1252 for others. Bytes that still look binary after
/// the UTF passes (NULs surviving) are rejected as undecodable.
fn decode_report_bytes(bytes: &[u8]) -> Option<String> {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return std::str::from_utf8(rest).ok().map(str::to_string);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return decode_utf16(rest, u16::from_be_bytes);
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Some(text.to_string());
    }
    if bytes.contains(&0) {
        // BOM-less UTF-16LE shows up in saved copies of the reports.
        return decode_utf16(bytes, u16::from_le_bytes).filter(|t| !t.contains('\0'));
    }
    // Windows-1252-ish single-byte fallback.
    Some(bytes.iter().map(|&b| b as char).collect())
}

fn decode_utf16(bytes: &[u8], from_bytes: fn([u8; 2]) -> u16) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| from_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}
