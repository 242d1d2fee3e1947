//! Permit pipeline orchestration shared by the CLI and the HTTP server.
//!
//! Coordinates the full flow: source adapter → parser → normalizer →
//! rows/CSV. Per-file and per-line failures are absorbed and aggregated;
//! request-level failures surface as a typed [`PermitError`].

use std::fmt;
use std::path::Path;

use crate::config::Config;
use crate::export;
use crate::models::PermitRecord;
use crate::normalize::normalize;
use crate::parser::{parse_report, ParseOptions};
use crate::source::{self, ReportSource};

/// User-facing guidance when live retrieval fails. The CLI and the HTTP
/// API must present exactly this text so callers can rely on it.
pub const FETCH_FALLBACK_GUIDANCE: &str =
    "Live report fetch is unavailable. Upload a report file or paste its text instead.";

/// Request-level pipeline failures. Per-file decode errors and per-line
/// parse skips never reach this type; they are absorbed into the batch.
#[derive(Debug)]
pub enum PermitError {
    /// Live network retrieval failed or timed out. Recoverable by the
    /// caller switching to file upload or pasted text; the detail string
    /// is for logs, the display text is the documented guidance.
    FetchUnavailable(String),
    /// Malformed request, rejected before any I/O.
    Validation(String),
    /// No report content was provided at all.
    NoContent,
}

impl fmt::Display for PermitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermitError::FetchUnavailable(_) => write!(f, "{}", FETCH_FALLBACK_GUIDANCE),
            PermitError::Validation(message) => write!(f, "{}", message),
            PermitError::NoContent => write!(f, "No report content provided."),
        }
    }
}

impl std::error::Error for PermitError {}

/// One ingestion request.
#[derive(Debug)]
pub struct PermitQuery {
    pub source: ReportSource,
    /// Window in days, counted back from today, both ends inclusive.
    pub days: u32,
    pub homeowner_only: bool,
    /// Overrides the configured target project code when set.
    pub project_code: Option<String>,
}

/// The complete result of one ingestion request. Either this is produced
/// whole or a [`PermitError`] is returned; there is no partial output.
#[derive(Debug)]
pub struct PermitBatch {
    pub rows: Vec<PermitRecord>,
    /// Names of uploaded files that could not be decoded as text.
    pub skipped_files: Vec<String>,
    /// Number of documents that reached the parser.
    pub documents: usize,
}

impl PermitBatch {
    /// Summary line for API responses and CLI output.
    pub fn message(&self) -> String {
        let mut message = if self.rows.is_empty() {
            "No permits found for the requested window.".to_string()
        } else {
            format!("Retrieved {} permits.", self.rows.len())
        };
        if !self.skipped_files.is_empty() {
            message.push_str(&format!(
                " Skipped undecodable file(s): {}.",
                self.skipped_files.join(", ")
            ));
        }
        message
    }
}

/// Run the pipeline for one request. Records are created fresh each call;
/// nothing is cached across requests.
pub async fn collect_rows(config: &Config, query: PermitQuery) -> Result<PermitBatch, PermitError> {
    let days = query.days.max(1);
    let batch = source::load_documents(query.source, &config.permits).await?;

    if batch.documents.is_empty() {
        // When files were supplied but none decoded, the error names them.
        if batch.skipped_files.is_empty() {
            return Err(PermitError::NoContent);
        }
        return Err(PermitError::Validation(format!(
            "No report content provided. Could not decode file(s): {}.",
            batch.skipped_files.join(", ")
        )));
    }

    let options = ParseOptions::from_config(&config.permits, query.project_code.as_deref());
    let mut records = Vec::new();
    for document in &batch.documents {
        let parsed = parse_report(&document.text, document.period, &options);
        tracing::debug!(
            origin = %document.origin,
            records = parsed.len(),
            "parsed report document"
        );
        records.extend(parsed);
    }

    let today = chrono::Local::now().date_naive();
    let rows = normalize(&records, days, query.homeowner_only, today);

    Ok(PermitBatch {
        rows,
        skipped_files: batch.skipped_files,
        documents: batch.documents.len(),
    })
}

/// CLI entry point for `pdesk permits`. Prints a summary (or the CSV with
/// `--print`) and optionally writes the CSV to a file.
pub async fn run_permits(
    config: &Config,
    query: PermitQuery,
    export_path: Option<&Path>,
    print_csv: bool,
) -> anyhow::Result<()> {
    let batch = collect_rows(config, query).await?;

    if print_csv {
        // CSV goes to stdout alone so it can be piped; the summary moves
        // to stderr.
        print!("{}", export::rows_to_csv(&batch.rows)?);
        eprintln!("{}", batch.message());
    } else {
        println!("permits");
        println!("  documents parsed: {}", batch.documents);
        if !batch.skipped_files.is_empty() {
            println!("  skipped files: {}", batch.skipped_files.join(", "));
        }
        println!("  rows: {}", batch.rows.len());
        println!("ok");
    }

    if let Some(path) = export_path {
        export::write_csv(&batch.rows, path)?;
        eprintln!("Exported {} rows to {}", batch.rows.len(), path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FileBlob;

    // PNG magic followed by NUL-laden data of odd length.
    const BINARY: &[u8] = &[0x89, b'P', b'N', b'G', 0x00, 0x01, 0x00];

    fn report_today() -> String {
        format!(
            "Project Code: 101\n\
             N50001 RES {} ADDRESS: 1 A ST        CITY 80900\n\
             \x20   COST: $100\n",
            chrono::Local::now().date_naive().format("%d-%b-%Y")
        )
    }

    fn query(source: ReportSource) -> PermitQuery {
        PermitQuery {
            source,
            days: 30,
            homeowner_only: false,
            project_code: None,
        }
    }

    #[tokio::test]
    async fn all_undecodable_files_error_names_them() {
        let config = Config::default();
        let source = ReportSource::Files(vec![FileBlob {
            name: "image.png".to_string(),
            bytes: BINARY.to_vec(),
        }]);
        let error = collect_rows(&config, query(source)).await.unwrap_err();
        assert!(matches!(error, PermitError::Validation(_)));
        assert!(error.to_string().contains("image.png"));
    }

    #[tokio::test]
    async fn undecodable_file_alongside_good_one_is_reported_not_fatal() {
        let config = Config::default();
        let source = ReportSource::Files(vec![
            FileBlob {
                name: "weekly.txt".to_string(),
                bytes: report_today().into_bytes(),
            },
            FileBlob {
                name: "image.png".to_string(),
                bytes: BINARY.to_vec(),
            },
        ]);
        let batch = collect_rows(&config, query(source)).await.unwrap();
        assert_eq!(batch.rows.len(), 1);
        assert!(batch.message().contains("image.png"));
    }

    #[tokio::test]
    async fn blank_input_is_no_content() {
        let config = Config::default();
        let error = collect_rows(&config, query(ReportSource::Stdin(String::new())))
            .await
            .unwrap_err();
        assert!(matches!(error, PermitError::NoContent));
        assert_eq!(error.to_string(), "No report content provided.");
    }
}
