//! Audit window for a transaction.
//!
//! Candidate searches only look at communications sent while the transaction
//! was live: from when work started until a grace period after closing.

use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, SecondsFormat, TimeDelta, TimeZone, Utc};
use serde::Serialize;

/// Days after `closed_at` that still count toward the transaction.
pub const DEFAULT_CLOSED_GRACE_DAYS: i64 = 30;

/// How far back to look when the transaction carries no usable start date.
pub const DEFAULT_LOOKBACK_MONTHS: u32 = 24;

/// Inclusive time window used to bound candidate queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn start_rfc3339(&self) -> String {
        self.start.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    pub fn end_rfc3339(&self) -> String {
        self.end.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Lifecycle timestamps as stored on the transaction row.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionDates<'a> {
    pub started_at: Option<&'a str>,
    pub created_at: Option<&'a str>,
    pub closed_at: Option<&'a str>,
}

/// Window bounds that are configurable per install.
#[derive(Debug, Clone, Copy)]
pub struct RangePolicy {
    pub closed_grace_days: i64,
    pub lookback_months: u32,
}

impl Default for RangePolicy {
    fn default() -> Self {
        Self {
            closed_grace_days: DEFAULT_CLOSED_GRACE_DAYS,
            lookback_months: DEFAULT_LOOKBACK_MONTHS,
        }
    }
}

/// Compute the audit window relative to the current time.
pub fn compute_transaction_date_range(dates: TransactionDates<'_>) -> DateRange {
    compute_transaction_date_range_at(dates, Utc::now(), RangePolicy::default())
}

/// Compute the audit window relative to `now`.
///
/// - start: `started_at`, else `created_at`, else `now - lookback`.
/// - end: `closed_at + grace`, else `now`.
pub fn compute_transaction_date_range_at(
    dates: TransactionDates<'_>,
    now: DateTime<Utc>,
    policy: RangePolicy,
) -> DateRange {
    let start = dates
        .started_at
        .and_then(parse_timestamp)
        .or_else(|| dates.created_at.and_then(parse_timestamp))
        .unwrap_or_else(|| {
            now.checked_sub_months(Months::new(policy.lookback_months))
                .unwrap_or(now)
        });

    let end = dates
        .closed_at
        .and_then(parse_timestamp)
        .map(|closed| closed_with_grace(closed, policy.closed_grace_days, now))
        .unwrap_or(now);

    DateRange { start, end }
}

/// `closed + grace_days`, or `now` when the grace period does not fit.
fn closed_with_grace(closed: DateTime<Utc>, grace_days: i64, now: DateTime<Utc>) -> DateTime<Utc> {
    match TimeDelta::try_days(grace_days).and_then(|grace| closed.checked_add_signed(grace)) {
        Some(end) => end,
        None => {
            log::warn!(
                "Closed grace period of {} days is out of range, ending audit window now",
                grace_days
            );
            now
        }
    }
}

/// Parse a stored timestamp: RFC 3339, SQLite `datetime()` text, or a bare date
/// (midnight UTC). Blank or unrecognised input yields None.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| Utc.from_utc_datetime(&ndt))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_started_at_wins() {
        let range = compute_transaction_date_range_at(
            TransactionDates {
                started_at: Some("2026-03-01T09:00:00Z"),
                created_at: Some("2026-02-01T09:00:00Z"),
                closed_at: None,
            },
            now(),
            RangePolicy::default(),
        );
        assert_eq!(range.start, Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        assert_eq!(range.end, now());
    }

    #[test]
    fn test_unparseable_started_at_falls_back_to_created_at() {
        let range = compute_transaction_date_range_at(
            TransactionDates {
                started_at: Some("not a date"),
                created_at: Some("2026-02-01 08:30:00"),
                closed_at: None,
            },
            now(),
            RangePolicy::default(),
        );
        assert_eq!(range.start, Utc.with_ymd_and_hms(2026, 2, 1, 8, 30, 0).unwrap());
    }

    #[test]
    fn test_no_dates_looks_back_two_years() {
        let range = compute_transaction_date_range_at(TransactionDates::default(), now(), RangePolicy::default());
        assert_eq!(range.start, Utc.with_ymd_and_hms(2024, 10, 19, 12, 0, 0).unwrap());
        assert_eq!(range.end, now());
    }

    #[test]
    fn test_closed_adds_grace_period() {
        let range = compute_transaction_date_range_at(
            TransactionDates {
                started_at: Some("2026-01-10"),
                created_at: None,
                closed_at: Some("2026-05-01T00:00:00+00:00"),
            },
            now(),
            RangePolicy::default(),
        );
        assert_eq!(range.start, Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2026, 5, 31, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_custom_policy() {
        let range = compute_transaction_date_range_at(
            TransactionDates {
                started_at: None,
                created_at: None,
                closed_at: Some("2026-05-01"),
            },
            now(),
            RangePolicy {
                closed_grace_days: 7,
                lookback_months: 6,
            },
        );
        assert_eq!(range.start, Utc.with_ymd_and_hms(2026, 4, 19, 12, 0, 0).unwrap());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2026, 5, 8, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_out_of_range_grace_ends_now() {
        for grace in [i64::MAX / 2, 9_999_999_999_999, i64::MIN] {
            let range = compute_transaction_date_range_at(
                TransactionDates {
                    started_at: Some("2026-01-10"),
                    created_at: None,
                    closed_at: Some("2026-05-01"),
                },
                now(),
                RangePolicy {
                    closed_grace_days: grace,
                    lookback_months: DEFAULT_LOOKBACK_MONTHS,
                },
            );
            assert_eq!(range.end, now(), "grace {grace}");
        }
    }

    #[test]
    fn test_rfc3339_rendering_uses_z() {
        let range = DateRange {
            start: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap(),
        };
        assert_eq!(range.start_rfc3339(), "2026-01-01T00:00:00Z");
        assert_eq!(range.end_rfc3339(), "2026-01-02T00:00:00Z");
    }
}
