use std::collections::HashMap;
use std::io::Write;

use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;

use crate::catalog::TraitSlot;
use crate::models::{normalize_rank_label, EvaluationRecord, Grade, ORDERED_RANKS};
use crate::rv::{self, RvValue};

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GridSort {
    AvgAsc,
    AvgDesc,
    RvAsc,
    RvDesc,
    DateAsc,
    #[default]
    DateDesc,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SummarySort {
    #[default]
    Reports,
    Avg,
}

/// Dashboard filters. All criteria are conjunctive; None means "any".
#[derive(Debug, Default)]
pub struct GridFilter {
    pub rank: Option<String>,
    pub name: Option<String>,
    pub occasion: Option<String>,
    pub year: Option<i32>,
    pub grade: Option<Grade>,
}

impl GridFilter {
    pub fn matches(&self, record: &EvaluationRecord) -> bool {
        if let Some(rank) = &self.rank {
            if normalize_rank_label(&record.marine_info.rank) != normalize_rank_label(rank) {
                return false;
            }
        }
        if let Some(name) = &self.name {
            let haystack = record.marine_info.name.to_lowercase();
            if !haystack.contains(&name.to_lowercase()) {
                return false;
            }
        }
        if let Some(occasion) = &self.occasion {
            if !record.occasion.trim().eq_ignore_ascii_case(occasion.trim()) {
                return false;
            }
        }
        if let Some(year) = self.year {
            let end: String = record
                .marine_info
                .evaluation_period
                .to
                .chars()
                .take(10)
                .collect();
            match NaiveDate::parse_from_str(end.trim(), "%Y-%m-%d") {
                Ok(date) if date.year() == year => {}
                _ => return false,
            }
        }
        if let Some(grade) = self.grade {
            if !record
                .trait_evaluations
                .values()
                .any(|t| t.grade == grade)
            {
                return false;
            }
        }
        true
    }
}

pub fn apply_filters<'a>(
    records: &'a [EvaluationRecord],
    filter: &GridFilter,
) -> Vec<&'a EvaluationRecord> {
    records.iter().filter(|e| filter.matches(e)).collect()
}

/// Sorts the displayed set. RV keys use the windowed RV with the sentinel as
/// the bottom tier, so "N/A" rows order deterministically instead of
/// poisoning the comparator.
pub fn sort_records(
    records: &mut [&EvaluationRecord],
    sort: GridSort,
    rv_map: &HashMap<String, RvValue>,
) {
    let rv_of = |e: &EvaluationRecord| -> RvValue {
        rv_map
            .get(&e.evaluation_id)
            .copied()
            .unwrap_or(RvValue::NotApplicable)
    };

    records.sort_by(|a, b| match sort {
        GridSort::AvgAsc => rv::score_of(a).total_cmp(&rv::score_of(b)),
        GridSort::AvgDesc => rv::score_of(b).total_cmp(&rv::score_of(a)),
        GridSort::RvAsc => rv_of(a).cmp(&rv_of(b)),
        GridSort::RvDesc => rv_of(b).cmp(&rv_of(a)),
        GridSort::DateAsc => rv::end_timestamp(a).cmp(&rv::end_timestamp(b)),
        GridSort::DateDesc => rv::end_timestamp(b).cmp(&rv::end_timestamp(a)),
    });
}

/// One rendered row of the ranked grid / CSV export.
#[derive(Debug, Clone)]
pub struct GridRow {
    pub rank: usize,
    pub evaluation_id: String,
    pub marine: String,
    pub occasion: String,
    pub ending_date: String,
    pub grades: [String; 13],
    pub average: String,
    pub rv: RvValue,
    pub cum_rv: RvValue,
}

/// Competitive rank: 1 plus the number of strictly greater values. Ties share
/// a rank; the sequence is not dense.
pub fn competitive_rank(all: &[RvValue], own: RvValue) -> usize {
    1 + all.iter().filter(|&&v| v > own).count()
}

pub fn build_grid_rows(
    records: &[&EvaluationRecord],
    rv_map: &HashMap<String, RvValue>,
    cum_map: &HashMap<String, RvValue>,
) -> Vec<GridRow> {
    let lookup = |map: &HashMap<String, RvValue>, e: &EvaluationRecord| -> RvValue {
        map.get(&e.evaluation_id)
            .copied()
            .unwrap_or(RvValue::NotApplicable)
    };

    // Ranks are computed over the displayed set, not the full collection.
    let cum_values: Vec<RvValue> = records.iter().map(|e| lookup(cum_map, e)).collect();

    records
        .iter()
        .zip(&cum_values)
        .map(|(e, &cum_rv)| {
            let ending: String = e
                .marine_info
                .evaluation_period
                .to
                .chars()
                .take(10)
                .collect();
            GridRow {
                rank: competitive_rank(&cum_values, cum_rv),
                evaluation_id: e.evaluation_id.clone(),
                marine: present_or_dash(&e.marine_info.name),
                occasion: capitalize(&present_or_dash(&e.occasion)),
                ending_date: present_or_dash(&ending),
                grades: TraitSlot::CORE.map(|slot| trait_letter(e, slot)),
                average: format!("{:.2}", rv::score_of(e)),
                rv: lookup(rv_map, e),
                cum_rv,
            }
        })
        .collect()
}

/// Grade letter for one grid column, "-" when no trait matches the slot.
pub fn trait_letter(record: &EvaluationRecord, slot: TraitSlot) -> String {
    record
        .trait_evaluations
        .values()
        .find(|t| slot.matches(&t.trait_name))
        .map(|t| t.grade.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn present_or_dash(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Headline numbers over a displayed set: zero-score placeholder reports are
/// excluded from the average, the low, and the report count, but a zero can
/// still be the high when nothing scored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankSummary {
    pub high: f64,
    pub avg: f64,
    pub low: f64,
    pub reports: usize,
}

pub fn rank_summary(records: &[&EvaluationRecord]) -> RankSummary {
    let scores: Vec<f64> = records.iter().map(|e| rv::score_of(e)).collect();
    let positive: Vec<f64> = scores.iter().copied().filter(|&s| s > 0.0).collect();

    let high = if scores.is_empty() {
        0.0
    } else {
        scores.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    };
    let avg = if positive.is_empty() {
        0.0
    } else {
        positive.iter().sum::<f64>() / positive.len() as f64
    };
    let low = if positive.is_empty() {
        0.0
    } else {
        positive.iter().copied().fold(f64::INFINITY, f64::min)
    };
    let zero_count = scores.iter().filter(|&&s| s == 0.0).count();

    RankSummary {
        high,
        avg,
        low,
        reports: scores.len().saturating_sub(zero_count),
    }
}

/// Per-rank dashboard aggregation. Ranks outside the fixed ladder and records
/// with a blank rank are dropped, matching the dashboard's summary cards.
#[derive(Debug, Clone, PartialEq)]
pub struct RankRollup {
    pub rank: String,
    pub avg: f64,
    pub count: usize,
    pub high: f64,
    pub low: f64,
}

pub fn rank_rollups(records: &[EvaluationRecord], sort: SummarySort) -> Vec<RankRollup> {
    struct Stats {
        sum: f64,
        count: usize,
        high: f64,
        low: f64,
    }

    let mut stats: HashMap<String, Stats> = HashMap::new();
    for record in records {
        let raw = record.marine_info.rank.trim();
        if raw.is_empty() {
            continue;
        }
        let rank = normalize_rank_label(raw);
        let score = rv::score_of(record);
        let entry = stats.entry(rank).or_insert(Stats {
            sum: 0.0,
            count: 0,
            high: 0.0,
            low: f64::INFINITY,
        });
        entry.sum += score;
        entry.count += 1;
        entry.high = entry.high.max(score);
        entry.low = entry.low.min(score);
    }

    let mut rollups: Vec<RankRollup> = ORDERED_RANKS
        .iter()
        .filter_map(|&rank| {
            stats.get(rank).map(|s| RankRollup {
                rank: rank.to_string(),
                avg: s.sum / s.count as f64,
                count: s.count,
                high: s.high,
                low: if s.low.is_finite() { s.low } else { 0.0 },
            })
        })
        .collect();

    match sort {
        SummarySort::Avg => {
            rollups.sort_by(|a, b| b.avg.total_cmp(&a.avg).then_with(|| a.rank.cmp(&b.rank)))
        }
        SummarySort::Reports => {
            rollups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.rank.cmp(&b.rank)))
        }
    }
    rollups
}

/// Writes the export CSV: fixed 20-column order, every field quoted, CRLF
/// line endings.
pub fn write_csv<W: Write>(rows: &[GridRow], writer: W) -> anyhow::Result<()> {
    let mut out = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::CRLF)
        .from_writer(writer);

    let mut headers = vec!["Rank", "Marine", "Occasion", "Ending Date"];
    headers.extend(TraitSlot::CORE.iter().map(|slot| slot.column_label()));
    headers.extend(["Avg", "RV", "Cum RV"]);
    out.write_record(&headers).context("writing csv header")?;

    for row in rows {
        let mut record = vec![
            row.rank.to_string(),
            row.marine.clone(),
            row.occasion.clone(),
            row.ending_date.clone(),
        ];
        record.extend(row.grades.iter().cloned());
        record.push(row.average.clone());
        record.push(row.rv.to_string());
        record.push(row.cum_rv.to_string());
        out.write_record(&record).context("writing csv row")?;
    }

    out.flush().context("flushing csv output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EvaluationPeriod, MarineInfo, SyncStatus, TraitResult};
    use std::collections::BTreeMap;

    fn record(id: &str, name: &str, rank: &str, to: &str, average: &str) -> EvaluationRecord {
        EvaluationRecord {
            evaluation_id: id.to_string(),
            rs_info: Default::default(),
            marine_info: MarineInfo {
                name: name.to_string(),
                rank: rank.to_string(),
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

    fn rv_fixture(pairs: &[(&str, RvValue)]) -> HashMap<String, RvValue> {
        pairs
            .iter()
            .map(|(id, value)| (id.to_string(), *value))
            .collect()
    }

    #[test]
    fn competitive_rank_shares_rank_on_ties() {
        let values = vec![
            RvValue::Score(90),
            RvValue::Score(90),
            RvValue::Score(85),
        ];
        assert_eq!(competitive_rank(&values, RvValue::Score(90)), 1);
        assert_eq!(competitive_rank(&values, RvValue::Score(85)), 3);
    }

    #[test]
    fn sentinel_ranks_after_every_numeric_value() {
        let values = vec![
            RvValue::Score(90),
            RvValue::NotApplicable,
            RvValue::Score(85),
        ];
        assert_eq!(competitive_rank(&values, RvValue::NotApplicable), 3);
    }

    #[test]
    fn sorting_by_rv_keeps_na_rows_in_the_bottom_tier() {
        let a = record("a", "Alpha", "CAPT", "2026-01-31", "5.00");
        let b = record("b", "Bravo", "CAPT", "2026-02-28", "6.00");
        let c = record("c", "Chase", "CAPT", "2026-03-31", "7.00");
        let rv_map = rv_fixture(&[
            ("a", RvValue::NotApplicable),
            ("b", RvValue::Score(92)),
            ("c", RvValue::Score(100)),
        ]);

        let mut view = vec![&a, &b, &c];
        sort_records(&mut view, GridSort::RvDesc, &rv_map);
        let order: Vec<&str> = view.iter().map(|e| e.evaluation_id.as_str()).collect();
        assert_eq!(order, vec!["c", "b", "a"]);

        sort_records(&mut view, GridSort::RvAsc, &rv_map);
        let order: Vec<&str> = view.iter().map(|e| e.evaluation_id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn default_sort_is_newest_ending_date_first() {
        let a = record("a", "Alpha", "CAPT", "2026-01-31", "5.00");
        let b = record("b", "Bravo", "CAPT", "2026-03-31", "6.00");
        let mut view = vec![&a, &b];
        sort_records(&mut view, GridSort::default(), &HashMap::new());
        assert_eq!(view[0].evaluation_id, "b");
    }

    #[test]
    fn filters_compose() {
        let mut graded = record("g", "Ortiz", "Capt", "2026-06-30", "6.10");
        graded.trait_evaluations.insert(
            "D_performance".to_string(),
            TraitResult::new("Mission Accomplishment", "Performance", Grade::F, "strong"),
        );
        let other = record("o", "Pham", "SSgt", "2025-06-30", "5.20");
        let records = vec![graded, other];

        let filter = GridFilter {
            rank: Some("CAPT".to_string()),
            name: Some("ort".to_string()),
            occasion: Some("Annual".to_string()),
            year: Some(2026),
            grade: Some(Grade::F),
        };
        let view = apply_filters(&records, &filter);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].evaluation_id, "g");

        let wrong_year = GridFilter {
            year: Some(2024),
            ..Default::default()
        };
        assert!(apply_filters(&records, &wrong_year).is_empty());
    }

    #[test]
    fn rank_summary_excludes_zero_scores_from_avg_low_and_count() {
        let records = vec![
            record("a", "Alpha", "CAPT", "2026-01-31", "5.00"),
            record("b", "Bravo", "CAPT", "2026-02-28", "6.00"),
            record("z", "Zero", "CAPT", "2026-03-31", "0"),
        ];
        let view: Vec<&EvaluationRecord> = records.iter().collect();
        let summary = rank_summary(&view);
        assert_eq!(summary.high, 6.0);
        assert_eq!(summary.avg, 5.5);
        assert_eq!(summary.low, 5.0);
        assert_eq!(summary.reports, 2);
    }

    #[test]
    fn rollups_group_by_normalized_rank_and_drop_unknown_ranks() {
        let records = vec![
            record("a", "Alpha", "Capt", "2026-01-31", "5.00"),
            record("b", "Bravo", "CAPT", "2026-02-28", "6.00"),
            record("c", "Chase", "GySgt", "2026-03-31", "4.50"),
            record("p", "Papa", "Pvt", "2026-03-31", "7.00"),
        ];
        let rollups = rank_rollups(&records, SummarySort::Reports);
        assert_eq!(rollups.len(), 2);
        assert_eq!(rollups[0].rank, "CAPT");
        assert_eq!(rollups[0].count, 2);
        assert_eq!(rollups[0].avg, 5.5);
        assert_eq!(rollups[1].rank, "GYSGT");

        let by_avg = rank_rollups(&records, SummarySort::Avg);
        assert_eq!(by_avg[0].rank, "CAPT");
    }

    #[test]
    fn csv_export_is_quoted_crlf_with_fixed_columns() {
        let mut graded = record("g", "Ortiz", "CAPT", "2026-06-30", "6.10");
        graded.trait_evaluations.insert(
            "G_judgement".to_string(),
            TraitResult::new("Intellect and Wisdom", "Judgment", Grade::E, "sound calls"),
        );
        let records = vec![&graded];
        let rv_map = rv_fixture(&[("g", RvValue::Score(95))]);
        let cum_map = rv_fixture(&[("g", RvValue::NotApplicable)]);
        let rows = build_grid_rows(&records, &rv_map, &cum_map);

        let mut buf: Vec<u8> = Vec::new();
        write_csv(&rows, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let mut lines = text.split("\r\n");
        let header = lines.next().unwrap();
        assert_eq!(
            header,
            "\"Rank\",\"Marine\",\"Occasion\",\"Ending Date\",\"Performance\",\
\"Proficiency\",\"Courage\",\"Stress Tolerance\",\"Initiative\",\"Leading\",\
\"Developing Others\",\"Setting the Example\",\"Well-Being/Health\",\
\"Communication Skills\",\"PME\",\"Decision Making\",\"Judgement\",\"Avg\",\
\"RV\",\"Cum RV\""
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("\"1\",\"Ortiz\",\"Annual\",\"2026-06-30\""));
        assert!(row.contains("\"E\""));
        assert!(row.ends_with("\"6.10\",\"95\",\"N/A\""));
    }

    #[test]
    fn grid_rows_carry_dashes_for_missing_data() {
        let bare = record("x", "", "CAPT", "", "0");
        let records = vec![&bare];
        let rows = build_grid_rows(&records, &HashMap::new(), &HashMap::new());
        let row = &rows[0];
        assert_eq!(row.marine, "-");
        assert_eq!(row.ending_date, "-");
        assert!(row.grades.iter().all(|g| g == "-"));
        assert_eq!(row.average, "0.00");
        assert_eq!(row.rank, 1);
    }
}
