//! Semi-structured permit report parser.
//!
//! Source reports are fixed-width-ish text grouped into `Project Code:`
//! sections. Each permit entry opens with a line of the form
//!
//! ```text
//! N12345  RES  15-Aug-2026  ADDRESS: 123 MAIN ST        COLORADO SPRINGS 80903
//! ```
//!
//! followed by continuation lines carrying `Project: … Contr: …` and
//! `COST: $n`. Column order and trailing columns vary slightly between the
//! monthly, weekly, and weekday editions, so parsing is tolerant: a line
//! that cannot be confidently mapped to a record is skipped, never fatal.
//! Missing fields stay absent — in particular a valuation that fails
//! numeric parsing is `None`, not zero, since zero is a valid reported
//! value.

use regex::Regex;
use std::sync::LazyLock;

use crate::config::PermitsConfig;
use crate::models::{PeriodKind, PermitRecord};

static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Project Code:\s*(\d+)").expect("valid regex"));

static PERMIT_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<permit>\S+)\s+\S+\s+(?P<date>\d{2}-[A-Za-z]{3}-\d{4})\s+ADDRESS:\s+(?P<rest>.+)$")
        .expect("valid regex")
});

/// Address column splits from city/zip on a run of 2+ spaces.
static ADDRESS_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<address>.+?)\s{2,}(?P<cityzip>.+)$").expect("valid regex"));

static PROJECT_CONTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Project:\s*(?P<proj>.*?)\s{2,}Contr:\s*(?P<contr>.+)$").expect("valid regex"));

static COST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"COST:\s*\$?\s*([\d,]+(?:\.\d{2})?)").expect("valid regex"));

/// Parsing knobs derived from configuration.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Only sections with this project code are scanned.
    pub project_code: String,
    /// Template for per-permit detail links; `{permit_id}` is substituted.
    pub details_base_url: String,
}

impl ParseOptions {
    pub fn from_config(config: &PermitsConfig, project_code_override: Option<&str>) -> Self {
        Self {
            project_code: project_code_override
                .unwrap_or(&config.project_code)
                .to_string(),
            details_base_url: config.details_base_url.clone(),
        }
    }
}

/// Parse one raw report document into permit records.
///
/// Degrades row by row: header/footer boilerplate, blank lines, and
/// malformed entries are skipped without aborting the document. An input
/// with no recognizable permit data yields an empty vector.
pub fn parse_report(text: &str, period: PeriodKind, options: &ParseOptions) -> Vec<PermitRecord> {
    let mut records = Vec::new();
    let mut current_code: Option<String> = None;
    let mut current_entry: Vec<&str> = Vec::new();

    for raw_line in text.lines() {
        let line = raw_line.trim_end();

        if let Some(captures) = SECTION_RE.captures(line) {
            if line.trim_start().starts_with("Project Code:") {
                flush_entry(&mut current_entry, period, options, &mut records);
                current_code = Some(captures[1].to_string());
                continue;
            }
        }

        if current_code.as_deref() != Some(options.project_code.as_str()) {
            continue;
        }

        if line.trim().is_empty() {
            continue;
        }

        if PERMIT_LINE_RE.is_match(line) {
            flush_entry(&mut current_entry, period, options, &mut records);
            current_entry.push(line);
        } else if !current_entry.is_empty() {
            current_entry.push(line);
        }
        // Lines before the first permit line in a section are boilerplate.
    }

    flush_entry(&mut current_entry, period, options, &mut records);
    records
}

fn flush_entry(
    entry: &mut Vec<&str>,
    period: PeriodKind,
    options: &ParseOptions,
    records: &mut Vec<PermitRecord>,
) {
    if entry.is_empty() {
        return;
    }
    if let Some(record) = entry_to_record(entry, period, options) {
        records.push(record);
    }
    entry.clear();
}

/// Map one accumulated entry (permit line + continuations) to a record.
/// Returns `None` when the opening line or its date cannot be parsed.
fn entry_to_record(
    entry: &[&str],
    period: PeriodKind,
    options: &ParseOptions,
) -> Option<PermitRecord> {
    let captures = PERMIT_LINE_RE.captures(entry[0])?;
    let permit_id = captures["permit"].to_string();
    let issue_date =
        chrono::NaiveDate::parse_from_str(&captures["date"], "%d-%b-%Y").ok()?;
    let rest = captures["rest"].trim_end();

    let (address, city, zip) = split_address(rest);

    let mut project_name: Option<String> = None;
    let mut contractor: Option<String> = None;
    let mut valuation: Option<f64> = None;

    for line in &entry[1..] {
        if let Some(captures) = PROJECT_CONTR_RE.captures(line) {
            let proj = captures["proj"].trim();
            if !proj.is_empty() && project_name.is_none() {
                project_name = Some(proj.to_string());
            }
            let contr = captures["contr"].trim().trim_end_matches('.');
            if !contr.is_empty() && contractor.is_none() {
                contractor = Some(contr.to_string());
            }
            continue;
        }
        if contractor.is_none() {
            if let Some(rest) = line.trim_start().strip_prefix("Contr:") {
                let contr = rest.trim();
                if !contr.is_empty() {
                    contractor = Some(contr.to_string());
                }
            }
        }
        if valuation.is_none() {
            if let Some(captures) = COST_RE.captures(line) {
                // Unparseable amounts stay None; zero is a legitimate value.
                valuation = captures[1].replace(',', "").parse::<f64>().ok();
            }
        }
    }

    let details_url = Some(
        options
            .details_base_url
            .replace("{permit_id}", &permit_id),
    );

    Some(PermitRecord {
        issue_date,
        permit_id,
        address,
        city,
        zip,
        contractor,
        valuation,
        project_name,
        details_url,
        period,
    })
}

/// Split the tail of a permit line into address / city / zip.
///
/// The address column is separated from city+zip by a run of 2+ spaces;
/// the zip is the final all-digit token of the city column. Anything that
/// does not match stays with the address and the finer fields are absent.
fn split_address(rest: &str) -> (Option<String>, Option<String>, Option<String>) {
    let Some(captures) = ADDRESS_SPLIT_RE.captures(rest) else {
        let address = rest.trim();
        return (
            (!address.is_empty()).then(|| address.to_string()),
            None,
            None,
        );
    };

    let address = captures["address"].trim().to_string();
    let cityzip = captures["cityzip"].trim();

    match cityzip.rsplit_once(' ') {
        Some((city, zip)) if !zip.is_empty() && zip.chars().all(|c| c.is_ascii_digit()) => (
            Some(address),
            Some(city.trim().to_string()),
            Some(zip.to_string()),
        ),
        _ => (Some(address), Some(cityzip.to_string()), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ParseOptions {
        ParseOptions {
            project_code: "101".to_string(),
            details_base_url: "https://example.org/Permit/Details?permitNo={permit_id}"
                .to_string(),
        }
    }

    const SAMPLE: &str = "\
El Paso County Regional Building Department\n\
Permits Issued Report\n\
\n\
Project Code: 101 SINGLE FAMILY DWELLING\n\
\n\
N12345 RES 15-Aug-2026 ADDRESS: 123 MAIN ST        COLORADO SPRINGS 80903\n\
    Project: NEW SINGLE FAMILY    Contr: ACME HOMES LLC.\n\
    COST: $350,000  SQ FT: 2200\n\
N12346 RES 16-Aug-2026 ADDRESS: 456 OAK AVE        MONUMENT 80132\n\
    Project: DETACHED GARAGE    Contr: HOMEOWNER / SELF\n\
    COST: $0\n\
\n\
Project Code: 434 COMMERCIAL ALTERATION\n\
\n\
C99999 COM 15-Aug-2026 ADDRESS: 1 PLAZA DR        COLORADO SPRINGS 80901\n\
    Project: TENANT FINISH    Contr: BIGBOX BUILDERS\n\
    COST: $900,000\n\
";

    #[test]
    fn parses_records_from_target_section_only() {
        let records = parse_report(SAMPLE, PeriodKind::Weekly, &options());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].permit_id, "N12345");
        assert_eq!(records[1].permit_id, "N12346");
    }

    #[test]
    fn parses_all_fields() {
        let records = parse_report(SAMPLE, PeriodKind::Weekly, &options());
        let first = &records[0];
        assert_eq!(
            first.issue_date,
            chrono::NaiveDate::from_ymd_opt(2026, 8, 15).unwrap()
        );
        assert_eq!(first.address.as_deref(), Some("123 MAIN ST"));
        assert_eq!(first.city.as_deref(), Some("COLORADO SPRINGS"));
        assert_eq!(first.zip.as_deref(), Some("80903"));
        assert_eq!(first.contractor.as_deref(), Some("ACME HOMES LLC"));
        assert_eq!(first.valuation, Some(350_000.0));
        assert_eq!(first.project_name.as_deref(), Some("NEW SINGLE FAMILY"));
        assert_eq!(
            first.details_url.as_deref(),
            Some("https://example.org/Permit/Details?permitNo=N12345")
        );
        assert_eq!(first.period, PeriodKind::Weekly);
    }

    #[test]
    fn reported_zero_valuation_is_zero_not_absent() {
        let records = parse_report(SAMPLE, PeriodKind::Weekly, &options());
        assert_eq!(records[1].valuation, Some(0.0));
    }

    #[test]
    fn missing_cost_line_leaves_valuation_absent() {
        let text = "\
Project Code: 101\n\
N10000 RES 01-Aug-2026 ADDRESS: 9 ELM ST        FOUNTAIN 80817\n\
    Project: SHED    Contr: OWNER\n\
";
        let records = parse_report(text, PeriodKind::Weekday, &options());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].valuation, None);
    }

    #[test]
    fn malformed_line_is_skipped_without_aborting() {
        let text = "\
Project Code: 101\n\
N10001 RES 01-Aug-2026 ADDRESS: 1 A ST        CITY 80900\n\
THIS LINE IS GARBAGE BUT SITS BETWEEN ENTRIES #########\n\
N10002 RES 02-Aug-2026 ADDRESS: 2 B ST        CITY 80900\n\
N10003 RES 99-Xxx-2026 ADDRESS: 3 C ST        CITY 80900\n\
N10004 RES 03-Aug-2026 ADDRESS: 4 D ST        CITY 80900\n\
";
        let records = parse_report(text, PeriodKind::Weekly, &options());
        // The garbage line folds into N10001's entry harmlessly; the entry
        // with an unparseable date is dropped.
        let ids: Vec<&str> = records.iter().map(|r| r.permit_id.as_str()).collect();
        assert_eq!(ids, vec!["N10001", "N10002", "N10004"]);
    }

    #[test]
    fn address_without_city_zip_stays_partial() {
        let text = "\
Project Code: 101\n\
N10005 RES 01-Aug-2026 ADDRESS: RURAL ROUTE 4\n\
";
        let records = parse_report(text, PeriodKind::Monthly, &options());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].address.as_deref(), Some("RURAL ROUTE 4"));
        assert_eq!(records[0].city, None);
        assert_eq!(records[0].zip, None);
        assert_eq!(records[0].contractor, None);
    }

    #[test]
    fn empty_input_yields_no_records() {
        assert!(parse_report("", PeriodKind::Weekly, &options()).is_empty());
        assert!(parse_report("no permit data here", PeriodKind::Weekly, &options()).is_empty());
    }
}
