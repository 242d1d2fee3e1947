//! Core data models used throughout Permit Desk.
//!
//! These types represent the report documents, permit rows, and chat turns
//! that flow through the ingestion pipeline and the chat relay.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Granularity of a source permit report.
///
/// Overlapping reports can carry the same permit (a permit issued on a
/// Tuesday appears in that weekday report, the enclosing weekly report,
/// and the enclosing monthly report). Finer-grained reports are assumed
/// freshest, so granularity breaks dedup ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    Weekday,
    Weekly,
    Monthly,
    /// Pasted text with no declared period. Lowest merge priority.
    Unknown,
}

impl PeriodKind {
    /// Merge priority, lower wins. Weekday outranks weekly outranks monthly;
    /// unknown-period text loses every tie.
    pub fn merge_rank(self) -> u8 {
        match self {
            PeriodKind::Weekday => 0,
            PeriodKind::Weekly => 1,
            PeriodKind::Monthly => 2,
            PeriodKind::Unknown => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PeriodKind::Weekday => "weekday",
            PeriodKind::Weekly => "weekly",
            PeriodKind::Monthly => "monthly",
            PeriodKind::Unknown => "unknown",
        }
    }
}

/// Raw report text produced by the source adapter, tagged with its period
/// and an origin label (URL, file name, or "stdin") for diagnostics.
#[derive(Debug, Clone)]
pub struct ReportDocument {
    pub period: PeriodKind,
    pub text: String,
    pub origin: String,
}

/// One issued building permit.
///
/// Absent fields are `None`, never an empty string — downstream consumers
/// can distinguish "reported as blank" from "not present in source".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermitRecord {
    pub issue_date: NaiveDate,
    pub permit_id: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    pub contractor: Option<String>,
    /// Monetary amount as reported. `Some(0.0)` means the source reported
    /// zero; `None` means the source reported nothing parseable.
    pub valuation: Option<f64>,
    pub project_name: Option<String>,
    pub details_url: Option<String>,
    /// Originating report granularity; used for dedup tie-breaks only.
    #[serde(skip, default = "default_period")]
    pub period: PeriodKind,
}

fn default_period() -> PeriodKind {
    PeriodKind::Unknown
}

impl PermitRecord {
    /// Number of absent optional fields. The dedup comparator prefers the
    /// record with the fewest.
    pub fn missing_field_count(&self) -> usize {
        [
            self.address.is_none(),
            self.city.is_none(),
            self.zip.is_none(),
            self.contractor.is_none(),
            self.valuation.is_none(),
            self.project_name.is_none(),
            self.details_url.is_none(),
        ]
        .iter()
        .filter(|missing| **missing)
        .count()
    }

    /// Homeowner-only predicate: contractor contains "owner", case-insensitive.
    pub fn is_homeowner(&self) -> bool {
        self.contractor
            .as_deref()
            .map(|c| c.to_lowercase().contains("owner"))
            .unwrap_or(false)
    }
}

/// Role of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a session transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A web search citation attached to a chat reply when the provider's
/// web-search augmentation is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebResult {
    pub title: Option<String>,
    pub url: Option<String>,
    pub snippet: Option<String>,
    pub source: Option<String>,
    pub image: Option<String>,
}
