// =============================================================================
// REPORTS
// =============================================================================
// A report is a batch of counts by one employee: either the counts sharing a
// client-supplied report id, or all the counts the employee submitted on the
// same (UTC) day. Reports aren't stored; they're rebuilt from the
// verification list on every read.
// =============================================================================

use std::collections::HashMap;

use chrono::SecondsFormat;

use crate::models::{ReportSummary, VerificationDetail};

/// Shown instead of a blank employee code
pub const NO_CODE: &str = "No code";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Batch {
    Report(String),
    Day(chrono::NaiveDate),
}

/// Group verifications (newest first) into numbered reports
///
/// Reports are numbered `1..n` from oldest to newest and returned newest
/// first. A report's date is its most recent count.
pub fn group_verifications(verifications: Vec<VerificationDetail>) -> Vec<ReportSummary> {
    let mut index: HashMap<(String, Batch), usize> = HashMap::new();
    let mut reports: Vec<ReportSummary> = Vec::new();

    for detail in verifications {
        let v = &detail.verification;
        let employee_code = match v.employee_code.trim() {
            "" => NO_CODE.to_string(),
            code => code.to_string(),
        };
        let batch = match v.report_id.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            Some(report_id) => Batch::Report(report_id.to_string()),
            None => Batch::Day(v.checked_at.date_naive()),
        };

        let slot = *index
            .entry((employee_code.clone(), batch))
            .or_insert_with(|| {
                reports.push(ReportSummary {
                    id: String::new(),
                    employee_code,
                    date: v.checked_at,
                    total_products: 0,
                    total_discrepancies: 0,
                    verifications: Vec::new(),
                });
                reports.len() - 1
            });

        let report = &mut reports[slot];
        report.total_products += 1;
        if !detail.verification.matches {
            report.total_discrepancies += 1;
        }
        report.verifications.push(detail);
    }

    reports.sort_by_key(|r| r.date);
    for (n, report) in reports.iter_mut().enumerate() {
        report.id = (n + 1).to_string();
    }
    reports.reverse();
    reports
}

/// Keep reports whose employee code or ISO date contains `search`
pub fn filter_reports(reports: Vec<ReportSummary>, search: Option<&str>) -> Vec<ReportSummary> {
    let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) else {
        return reports;
    };

    reports
        .into_iter()
        .filter(|r| {
            r.employee_code.contains(term)
                || r.date.to_rfc3339_opts(SecondsFormat::Millis, true).contains(term)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Verification;
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn count(code: &str, checked_at: DateTime<Utc>, matches: bool, report_id: Option<&str>) -> VerificationDetail {
        VerificationDetail {
            verification: Verification {
                id: Uuid::new_v4(),
                product_id: Uuid::new_v4(),
                system_quantity: 10,
                physical_quantity: if matches { 10 } else { 7 },
                matches,
                observations: None,
                employee_code: code.to_string(),
                report_id: report_id.map(str::to_string),
                checked_at,
                created_at: checked_at,
            },
            product_name: Some("Gloves".to_string()),
            product_sku: Some("PROD-ABC123".to_string()),
        }
    }

    #[test]
    fn groups_by_employee_and_day_numbering_oldest_first() {
        // newest first, as the database returns them
        let reports = group_verifications(vec![
            count("11111", at(10, 15), false, None),
            count("22222", at(10, 12), true, None),
            count("11111", at(10, 9), true, None),
            count("11111", at(9, 18), false, None),
        ]);

        assert_eq!(reports.len(), 3);
        let ids: Vec<&str> = reports.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2", "1"]);

        let newest = &reports[0];
        assert_eq!(newest.employee_code, "11111");
        assert_eq!(newest.date, at(10, 15));
        assert_eq!(newest.total_products, 2);
        assert_eq!(newest.total_discrepancies, 1);

        assert_eq!(reports[1].employee_code, "22222");
        assert_eq!(reports[2].date, at(9, 18));
        assert_eq!(reports[2].total_discrepancies, 1);
    }

    #[test]
    fn report_id_overrides_day_grouping() {
        let reports = group_verifications(vec![
            count("11111", at(11, 1), true, Some("batch-7")),
            count("11111", at(10, 23), false, Some("batch-7")),
            count("11111", at(10, 22), true, None),
        ]);

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].total_products, 2);
        assert_eq!(reports[0].date, at(11, 1));
        assert_eq!(reports[1].total_products, 1);
    }

    #[test]
    fn discrepancies_count_mismatched_rows() {
        let reports = group_verifications(vec![
            count("11111", at(10, 3), false, None),
            count("11111", at(10, 2), false, None),
            count("11111", at(10, 1), true, None),
        ]);
        assert_eq!(reports[0].total_discrepancies, 2);
        assert_eq!(reports[0].total_products, 3);
    }

    #[test]
    fn blank_codes_are_labelled() {
        let reports = group_verifications(vec![count("  ", at(10, 1), true, None)]);
        assert_eq!(reports[0].employee_code, NO_CODE);
    }

    #[test]
    fn search_matches_code_or_date() {
        let reports = group_verifications(vec![
            count("11111", at(10, 15), true, None),
            count("22222", at(9, 12), true, None),
        ]);

        assert_eq!(filter_reports(reports.clone(), Some("222")).len(), 1);
        let by_date = filter_reports(reports.clone(), Some("2026-03-10"));
        assert_eq!(by_date.len(), 1);
        assert_eq!(by_date[0].employee_code, "11111");
        assert_eq!(filter_reports(reports.clone(), Some(" ")).len(), 2);
        assert!(filter_reports(reports, Some("99999")).is_empty());
    }
}
