use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate};
use log::debug;

use crate::models::EvaluationRecord;

pub const RV_FLOOR: i64 = 80;
pub const RV_NEUTRAL: i64 = 90;

/// A relative value, or the sentinel for a window too small to rank against.
///
/// The derived ordering puts `NotApplicable` below every score, so sorting
/// and the count-greater-than rank rule stay deterministic when the sentinel
/// is involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RvValue {
    NotApplicable,
    Score(i64),
}

impl RvValue {
    pub fn as_score(self) -> Option<i64> {
        match self {
            RvValue::Score(n) => Some(n),
            RvValue::NotApplicable => None,
        }
    }
}

impl fmt::Display for RvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RvValue::Score(n) => write!(f, "{n}"),
            RvValue::NotApplicable => f.write_str("N/A"),
        }
    }
}

/// Parse boundary for scores: unparseable or non-finite averages read as 0.
pub fn score_of(record: &EvaluationRecord) -> f64 {
    match record.fitrep_average.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => n,
        _ => 0.0,
    }
}

/// Parse boundary for dates: the period's end date, falling back to the
/// completion date, as epoch milliseconds. Unparseable input reads as 0, so
/// malformed records sort oldest rather than failing.
pub fn end_timestamp(record: &EvaluationRecord) -> i64 {
    let to = record.marine_info.evaluation_period.to.trim();
    let raw = if to.is_empty() {
        record.completed_date.trim()
    } else {
        to
    };
    parse_timestamp_millis(raw)
}

fn parse_timestamp_millis(raw: &str) -> i64 {
    if raw.is_empty() {
        return 0;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.timestamp_millis();
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc().timestamp_millis())
            .unwrap_or(0);
    }
    0
}

/// Windowed relative value for every record.
///
/// A record's window is every record whose end date is at or before its own,
/// itself included, so each report is ranked against the peer population that
/// existed as of its completion. Fewer than 3 records in the window yields
/// the sentinel rather than a number.
pub fn compute_rv_values(records: &[EvaluationRecord]) -> HashMap<String, RvValue> {
    let mut rv_map = HashMap::with_capacity(records.len());
    if records.is_empty() {
        return rv_map;
    }

    let entries = dated_entries(records);

    for &(end_ts, score, id) in &entries {
        let window = window_at(&entries, end_ts);
        if window.len() < 3 {
            rv_map.insert(id.to_string(), RvValue::NotApplicable);
            continue;
        }
        let scores: Vec<f64> = window.iter().map(|&(_, s, _)| s).collect();
        rv_map.insert(id.to_string(), scaled_rv(score, &scores));
    }

    debug!("windowed rv computed for {} records", rv_map.len());
    rv_map
}

/// Cumulative relative value for every record.
///
/// Same window rule, but the peer population keeps only positive scores, and
/// a zero-score record is pinned to the floor before any of that applies.
pub fn compute_cumulative_rv(records: &[EvaluationRecord]) -> HashMap<String, RvValue> {
    let mut cum_map = HashMap::with_capacity(records.len());
    if records.is_empty() {
        return cum_map;
    }

    let entries = dated_entries(records);

    for &(end_ts, score, id) in &entries {
        if score == 0.0 {
            cum_map.insert(id.to_string(), RvValue::Score(RV_FLOOR));
            continue;
        }
        let positives: Vec<f64> = window_at(&entries, end_ts)
            .iter()
            .map(|&(_, s, _)| s)
            .filter(|&s| s > 0.0)
            .collect();
        if positives.len() < 3 {
            cum_map.insert(id.to_string(), RvValue::NotApplicable);
            continue;
        }
        cum_map.insert(id.to_string(), scaled_rv(score, &positives));
    }

    debug!("cumulative rv computed for {} records", cum_map.len());
    cum_map
}

fn dated_entries(records: &[EvaluationRecord]) -> Vec<(i64, f64, &str)> {
    let mut entries: Vec<(i64, f64, &str)> = records
        .iter()
        .map(|e| (end_timestamp(e), score_of(e), e.evaluation_id.as_str()))
        .collect();
    entries.sort_by_key(|&(ts, _, _)| ts);
    entries
}

// Entries are sorted ascending, so the window is the prefix up to and
// including every equal-date peer.
fn window_at<'a>(entries: &'a [(i64, f64, &'a str)], end_ts: i64) -> &'a [(i64, f64, &'a str)] {
    let upper = entries.partition_point(|&(ts, _, _)| ts <= end_ts);
    &entries[..upper]
}

fn scaled_rv(own: f64, scores: &[f64]) -> RvValue {
    let avg = scores.iter().sum::<f64>() / scores.len() as f64;
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let denom = max - avg;

    let raw = if !avg.is_finite() || !max.is_finite() || denom == 0.0 {
        RV_NEUTRAL as f64
    } else {
        90.0 + 10.0 * (own - avg) / denom
    };

    RvValue::Score((raw.round() as i64).max(RV_FLOOR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EvaluationPeriod, MarineInfo, RsInfo, SyncStatus};
    use std::collections::BTreeMap;

    fn record(id: &str, to: &str, average: &str) -> EvaluationRecord {
        EvaluationRecord {
            evaluation_id: id.to_string(),
            rs_info: RsInfo::default(),
            marine_info: MarineInfo {
                name: format!("Marine {id}"),
                rank: "CAPT".to_string(),
                evaluation_period: EvaluationPeriod {
                    from: "2025-01-01".to_string(),
                    to: to.to_string(),
                },
            },
            occasion: "annual".to_string(),
            completed_date: String::new(),
            fitrep_average: average.to_string(),
            trait_evaluations: BTreeMap::new(),
            section_i_comments: String::new(),
            directed_comments: String::new(),
            sync_status: SyncStatus::Pending,
        }
    }

    #[test]
    fn windows_smaller_than_three_are_not_applicable() {
        let records = vec![
            record("jan", "2026-01-31", "5.00"),
            record("feb", "2026-02-28", "6.00"),
            record("mar", "2026-03-31", "7.00"),
        ];
        let rv = compute_rv_values(&records);

        // Window for Mar: avg 6.00, max 7.00 -> 90 + 10 * (7 - 6) / 1 = 100.
        assert_eq!(rv["mar"], RvValue::Score(100));
        assert_eq!(rv["feb"], RvValue::NotApplicable);
        assert_eq!(rv["jan"], RvValue::NotApplicable);
    }

    #[test]
    fn equal_scores_fall_back_to_neutral() {
        let records = vec![
            record("a", "2026-01-31", "6.00"),
            record("b", "2026-02-28", "6.00"),
            record("c", "2026-03-31", "6.00"),
            record("d", "2026-04-30", "6.00"),
        ];
        let rv = compute_rv_values(&records);
        assert_eq!(rv["d"], RvValue::Score(RV_NEUTRAL));
    }

    #[test]
    fn rv_is_floor_clamped_at_eighty() {
        let records = vec![
            record("a", "2026-01-01", "6.80"),
            record("b", "2026-01-02", "6.90"),
            record("c", "2026-01-03", "7.00"),
            record("low", "2026-01-04", "1.00"),
        ];
        let rv = compute_rv_values(&records);

        // Raw value for the trailing low record is far below 80; only the
        // floor applies, there is no ceiling clamp.
        assert_eq!(rv["low"], RvValue::Score(RV_FLOOR));
        assert_eq!(rv["c"], RvValue::Score(100));
        for value in rv.values() {
            if let Some(n) = value.as_score() {
                assert!(n >= RV_FLOOR);
            }
        }
    }

    #[test]
    fn equal_end_dates_share_the_full_window() {
        let records = vec![
            record("a", "2026-03-31", "5.00"),
            record("b", "2026-03-31", "6.00"),
            record("c", "2026-03-31", "7.00"),
        ];
        let rv = compute_rv_values(&records);

        // All three see the same 3-record window regardless of input order.
        assert_eq!(rv["c"], RvValue::Score(100));
        assert_eq!(rv["a"], RvValue::Score(80));
        assert_eq!(rv["b"], RvValue::Score(90));
    }

    #[test]
    fn higher_score_in_the_same_window_never_ranks_lower() {
        let records = vec![
            record("x", "2026-01-31", "4.10"),
            record("y", "2026-02-28", "5.30"),
            record("a", "2026-03-31", "5.90"),
            record("b", "2026-03-31", "6.40"),
        ];
        let rv = compute_rv_values(&records);
        assert!(rv["b"] >= rv["a"]);
    }

    #[test]
    fn unparseable_dates_sort_as_epoch_and_scores_as_zero() {
        let records = vec![
            record("mangled", "not-a-date", "garbage"),
            record("a", "2026-01-31", "5.00"),
            record("b", "2026-02-28", "6.00"),
        ];
        let rv = compute_rv_values(&records);

        // The mangled record is the oldest (window of 1) and both dated
        // records inherit it into their windows.
        assert_eq!(rv["mangled"], RvValue::NotApplicable);
        assert_eq!(rv["a"], RvValue::NotApplicable);
        // Window for b: scores 0, 5, 6. b owns the window max, so its RV is
        // exactly 100.
        assert_eq!(rv["b"], RvValue::Score(100));
    }

    #[test]
    fn completed_date_backfills_a_missing_end_date() {
        let mut late = record("late", "", "6.00");
        late.completed_date = "2026-03-31T10:00:00Z".to_string();
        let records = vec![
            record("a", "2026-01-31", "5.00"),
            record("b", "2026-02-28", "6.00"),
            late,
        ];
        let rv = compute_rv_values(&records);
        assert!(rv["late"].as_score().is_some());
    }

    #[test]
    fn zero_score_records_pin_cumulative_to_the_floor() {
        let records = vec![
            record("a", "2026-01-31", "5.00"),
            record("b", "2026-02-28", "6.00"),
            record("c", "2026-03-31", "7.00"),
            record("z", "2026-04-30", "0"),
        ];
        let cum = compute_cumulative_rv(&records);
        assert_eq!(cum["z"], RvValue::Score(RV_FLOOR));
        // The zero record is also excluded from later windows' populations.
        assert_eq!(cum["c"], RvValue::Score(100));
    }

    #[test]
    fn cumulative_requires_three_positive_peers() {
        let records = vec![
            record("z1", "2026-01-01", "0"),
            record("z2", "2026-01-15", "0"),
            record("a", "2026-01-31", "5.00"),
            record("b", "2026-02-28", "6.00"),
            record("c", "2026-03-31", "7.00"),
        ];
        let cum = compute_cumulative_rv(&records);

        // Windows for a and b hold fewer than 3 positive scores even though
        // the raw windows are larger.
        assert_eq!(cum["a"], RvValue::NotApplicable);
        assert_eq!(cum["b"], RvValue::NotApplicable);
        assert_eq!(cum["c"], RvValue::Score(100));
    }

    #[test]
    fn recomputation_is_idempotent() {
        let records = vec![
            record("a", "2026-01-31", "5.10"),
            record("b", "2026-02-28", "6.20"),
            record("c", "2026-03-31", "6.90"),
            record("d", "2026-04-30", "4.70"),
        ];
        assert_eq!(compute_rv_values(&records), compute_rv_values(&records));
        assert_eq!(
            compute_cumulative_rv(&records),
            compute_cumulative_rv(&records)
        );
    }

    #[test]
    fn sentinel_orders_below_every_score() {
        assert!(RvValue::NotApplicable < RvValue::Score(RV_FLOOR));
        assert!(RvValue::Score(80) < RvValue::Score(100));
        let mut values = vec![
            RvValue::Score(95),
            RvValue::NotApplicable,
            RvValue::Score(88),
        ];
        values.sort();
        assert_eq!(values[0], RvValue::NotApplicable);
    }
}
