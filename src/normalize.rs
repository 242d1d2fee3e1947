//! Merge, dedup, filter, and order parsed permit records.
//!
//! Records arrive from multiple overlapping report documents (a permit
//! issued this week appears in the weekday, weekly, and monthly editions).
//! Normalization keeps one representative per permit id, chosen by a total
//! order so output is deterministic regardless of document order.

use chrono::{Duration, NaiveDate};
use std::collections::HashMap;

use crate::models::PermitRecord;

/// Normalize a merged record stream into the final row set.
///
/// 1. Keep records with `issue_date` in `[today - window_days, today]`
///    inclusive.
/// 2. Group by `permit_id`; the representative is the minimum by
///    `(missing-field count, period rank, first-seen index)` — most
///    complete wins, then the finer-grained report, then the earlier
///    arrival (stable).
/// 3. Optionally keep only homeowner permits.
/// 4. Sort by `issue_date` descending, `permit_id` ascending.
///
/// Idempotent: normalizing an already-normalized set changes nothing.
pub fn normalize(
    records: &[PermitRecord],
    window_days: u32,
    homeowner_only: bool,
    today: NaiveDate,
) -> Vec<PermitRecord> {
    // Windows wider than the calendar clamp to "keep everything" rather
    // than overflowing date arithmetic.
    let cutoff = today
        .checked_sub_signed(Duration::days(i64::from(window_days)))
        .unwrap_or(NaiveDate::MIN);

    // permit_id -> (first-seen index, representative)
    let mut by_id: HashMap<&str, (usize, &PermitRecord)> = HashMap::new();

    for (index, record) in records.iter().enumerate() {
        if record.issue_date < cutoff || record.issue_date > today {
            continue;
        }
        match by_id.get(record.permit_id.as_str()) {
            Some(&(existing_index, existing)) => {
                if sort_key(record, index) < sort_key(existing, existing_index) {
                    by_id.insert(&record.permit_id, (index, record));
                }
            }
            None => {
                by_id.insert(&record.permit_id, (index, record));
            }
        }
    }

    let mut rows: Vec<PermitRecord> = by_id
        .into_values()
        .map(|(_, record)| record.clone())
        .filter(|record| !homeowner_only || record.is_homeowner())
        .collect();

    rows.sort_by(|a, b| {
        b.issue_date
            .cmp(&a.issue_date)
            .then_with(|| a.permit_id.cmp(&b.permit_id))
    });
    rows
}

/// Representative-selection key. Lower wins; the trailing first-seen index
/// makes the order total, so equal records resolve deterministically.
fn sort_key(record: &PermitRecord, first_seen: usize) -> (usize, u8, usize) {
    (
        record.missing_field_count(),
        record.period.merge_rank(),
        first_seen,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PeriodKind;

    fn record(permit_id: &str, date: (i32, u32, u32), period: PeriodKind) -> PermitRecord {
        PermitRecord {
            issue_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            permit_id: permit_id.to_string(),
            address: Some("1 TEST ST".to_string()),
            city: Some("SPRINGFIELD".to_string()),
            zip: Some("80900".to_string()),
            contractor: Some("ACME HOMES".to_string()),
            valuation: Some(100_000.0),
            project_name: Some("NEW SFD".to_string()),
            details_url: Some("https://example.org/P".to_string()),
            period,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 20).unwrap()
    }

    #[test]
    fn window_is_inclusive_on_both_ends() {
        let records = vec![
            record("P-EDGE-OLD", (2026, 7, 21), PeriodKind::Monthly),
            record("P-TOO-OLD", (2026, 7, 20), PeriodKind::Monthly),
            record("P-TODAY", (2026, 8, 20), PeriodKind::Weekly),
            record("P-FUTURE", (2026, 8, 21), PeriodKind::Weekly),
        ];
        let rows = normalize(&records, 30, false, today());
        let ids: Vec<&str> = rows.iter().map(|r| r.permit_id.as_str()).collect();
        assert_eq!(ids, vec!["P-TODAY", "P-EDGE-OLD"]);
    }

    #[test]
    fn maximal_window_keeps_rows_without_overflow() {
        let records = vec![
            record("P-OLD", (1996, 1, 2), PeriodKind::Monthly),
            record("P-NEW", (2026, 8, 15), PeriodKind::Weekly),
        ];
        let rows = normalize(&records, u32::MAX, false, today());
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn no_two_rows_share_a_permit_id() {
        let records = vec![
            record("P-100", (2026, 8, 15), PeriodKind::Monthly),
            record("P-100", (2026, 8, 15), PeriodKind::Weekly),
            record("P-200", (2026, 8, 16), PeriodKind::Weekly),
        ];
        let rows = normalize(&records, 30, false, today());
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn most_complete_record_wins() {
        // Monthly copy is missing zip; weekly copy is complete.
        let mut monthly = record("P-100", (2026, 8, 15), PeriodKind::Monthly);
        monthly.zip = None;
        let weekly = record("P-100", (2026, 8, 15), PeriodKind::Weekly);

        let rows = normalize(&[monthly, weekly], 30, false, today());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].zip.as_deref(), Some("80900"));
        assert_eq!(rows[0].period, PeriodKind::Weekly);
    }

    #[test]
    fn completeness_beats_granularity() {
        // The weekday copy is fresher but less complete than the monthly.
        let mut weekday = record("P-100", (2026, 8, 15), PeriodKind::Weekday);
        weekday.zip = None;
        weekday.contractor = None;
        let monthly = record("P-100", (2026, 8, 15), PeriodKind::Monthly);

        let rows = normalize(&[weekday, monthly], 30, false, today());
        assert_eq!(rows[0].period, PeriodKind::Monthly);
    }

    #[test]
    fn equal_records_resolve_to_first_seen() {
        let first = record("P-100", (2026, 8, 15), PeriodKind::Weekly);
        let mut second = record("P-100", (2026, 8, 15), PeriodKind::Weekly);
        second.address = Some("2 OTHER ST".to_string());

        let rows = normalize(&[first.clone(), second], 30, false, today());
        assert_eq!(rows[0].address, first.address);
    }

    #[test]
    fn homeowner_filter_is_a_subset_of_unfiltered() {
        let mut owner = record("P-OWN", (2026, 8, 15), PeriodKind::Weekly);
        owner.contractor = Some("OWNER/BUILDER".to_string());
        let contractor = record("P-CON", (2026, 8, 16), PeriodKind::Weekly);

        let all = normalize(&[owner.clone(), contractor.clone()], 30, false, today());
        let owners = normalize(&[owner, contractor], 30, true, today());

        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].permit_id, "P-OWN");
        for row in &owners {
            assert!(all.iter().any(|r| r.permit_id == row.permit_id));
            assert!(row
                .contractor
                .as_deref()
                .unwrap()
                .to_lowercase()
                .contains("owner"));
        }
    }

    #[test]
    fn output_sorted_by_date_desc_then_id_asc() {
        let records = vec![
            record("P-B", (2026, 8, 10), PeriodKind::Weekly),
            record("P-A", (2026, 8, 15), PeriodKind::Weekly),
            record("P-C", (2026, 8, 15), PeriodKind::Weekly),
        ];
        let rows = normalize(&records, 30, false, today());
        let ids: Vec<&str> = rows.iter().map(|r| r.permit_id.as_str()).collect();
        assert_eq!(ids, vec!["P-A", "P-C", "P-B"]);
    }

    #[test]
    fn normalize_is_idempotent() {
        let records = vec![
            record("P-100", (2026, 8, 15), PeriodKind::Monthly),
            record("P-100", (2026, 8, 15), PeriodKind::Weekly),
            record("P-200", (2026, 8, 16), PeriodKind::Weekday),
            record("P-300", (2026, 6, 1), PeriodKind::Monthly),
        ];
        let once = normalize(&records, 30, false, today());
        let twice = normalize(&once, 30, false, today());
        assert_eq!(once, twice);
    }
}
