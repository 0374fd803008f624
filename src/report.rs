use std::collections::HashMap;
use std::fmt::Write;

use crate::grid::{self, GridSort, SummarySort};
use crate::models::{EvaluationRecord, RsProfile, SyncStatus};
use crate::rv::{self, RvValue};

pub fn build_report(profile: &RsProfile, evaluations: &[EvaluationRecord]) -> String {
    let rv_map = rv::compute_rv_values(evaluations);
    let cum_map = rv::compute_cumulative_rv(evaluations);
    let rollups = grid::rank_rollups(evaluations, SummarySort::Reports);

    let view: Vec<&EvaluationRecord> = evaluations.iter().collect();
    let summary = grid::rank_summary(&view);
    let pending = evaluations
        .iter()
        .filter(|e| e.sync_status != SyncStatus::Synced)
        .count();

    let mut output = String::new();

    let _ = writeln!(output, "# FITREP Profile Report");
    let _ = writeln!(
        output,
        "Reporting senior: {} {} ({})",
        profile.rs_rank, profile.rs_name, profile.rs_email
    );
    let _ = writeln!(
        output,
        "{} evaluations on file, {} pending sync",
        evaluations.len(),
        pending
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Rank Summary");
    let _ = writeln!(output, "- High: {:.2}", summary.high);
    let _ = writeln!(output, "- Avg: {:.2}", summary.avg);
    let _ = writeln!(output, "- Low: {:.2}", summary.low);
    let _ = writeln!(output, "- Reports: {}", summary.reports);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Reports by Rank");

    if rollups.is_empty() {
        let _ = writeln!(output, "No evaluations recorded yet.");
    } else {
        for rollup in rollups.iter() {
            let _ = writeln!(
                output,
                "- {}: {} reports (avg {:.2}, high {:.2}, low {:.2})",
                rollup.rank, rollup.count, rollup.avg, rollup.high, rollup.low
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Reports by Relative Value");

    let mut ranked = view.clone();
    sort_by_cumulative(&mut ranked, &cum_map);

    if ranked.is_empty() {
        let _ = writeln!(output, "No evaluations recorded yet.");
    } else {
        for record in ranked.iter().take(10) {
            let rv = lookup(&rv_map, record);
            let cum = lookup(&cum_map, record);
            let _ = writeln!(
                output,
                "- {} {}: avg {}, RV {}, Cum RV {} (ending {})",
                record.marine_info.rank,
                record.marine_info.name,
                record.fitrep_average,
                rv,
                cum,
                ending_label(record)
            );
        }
    }

    let mut recent = view;
    grid::sort_records(&mut recent, GridSort::DateDesc, &rv_map);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Reports");

    if recent.is_empty() {
        let _ = writeln!(output, "No evaluations recorded yet.");
    } else {
        for record in recent.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} {} ({}) ending {}: avg {}",
                record.marine_info.rank,
                record.marine_info.name,
                record.occasion,
                ending_label(record),
                record.fitrep_average
            );
        }
    }

    output
}

fn lookup(map: &HashMap<String, RvValue>, record: &EvaluationRecord) -> RvValue {
    map.get(&record.evaluation_id)
        .copied()
        .unwrap_or(RvValue::NotApplicable)
}

fn sort_by_cumulative(records: &mut [&EvaluationRecord], cum_map: &HashMap<String, RvValue>) {
    records.sort_by(|a, b| lookup(cum_map, b).cmp(&lookup(cum_map, a)));
}

fn ending_label(record: &EvaluationRecord) -> String {
    let ending: String = record
        .marine_info
        .evaluation_period
        .to
        .chars()
        .take(10)
        .collect();
    if ending.trim().is_empty() {
        "-".to_string()
    } else {
        ending
    }
}
