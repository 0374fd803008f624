use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

mod catalog;
mod db;
mod grading;
mod grid;
mod models;
mod report;
mod rv;
mod score;

use grading::{GradeAction, GradingSession};
use grid::{GridFilter, GridSort, SummarySort};
use models::{EvaluationPeriod, EvaluationRecord, Grade, MarineInfo, RsInfo, SyncStatus};

#[derive(Parser)]
#[command(name = "fitrep-tracker")]
#[command(about = "FITREP builder and relative-value tracker for reporting seniors", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Walk a new evaluation interactively and save it
    Grade {
        #[arg(long)]
        marine: String,
        #[arg(long)]
        rank: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "annual")]
        occasion: String,
        /// Include the Section H evaluations trait
        #[arg(long)]
        reporting_senior: bool,
        #[arg(long)]
        email: Option<String>,
    },
    /// Replace one trait result on a stored evaluation
    Regrade {
        #[arg(long)]
        id: String,
        #[arg(long = "trait")]
        trait_label: String,
        #[arg(long)]
        grade: String,
        #[arg(long)]
        justification: String,
    },
    /// Per-rank summary of stored evaluations
    List {
        #[arg(long)]
        email: Option<String>,
        #[arg(long, value_enum, default_value = "reports")]
        sort: SummarySort,
    },
    /// Ranked grid with RV and cumulative RV columns
    Grid {
        #[arg(long)]
        email: Option<String>,
        #[arg(long, value_enum, default_value = "date-desc")]
        sort: GridSort,
        #[arg(long)]
        rank: Option<String>,
        #[arg(long)]
        marine: Option<String>,
        #[arg(long)]
        occasion: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        grade: Option<String>,
    },
    /// Export the ranked grid as CSV
    Export {
        #[arg(long)]
        email: Option<String>,
        #[arg(long, value_enum, default_value = "date-desc")]
        sort: GridSort,
        #[arg(long, default_value = "fitrep_grid.csv")]
        out: PathBuf,
    },
    /// Write a markdown report for one profile
    Report {
        #[arg(long)]
        email: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Write the profile backup JSON envelope
    Backup {
        #[arg(long)]
        email: Option<String>,
        #[arg(long, default_value = "profile_backup.json")]
        out: PathBuf,
    },
    /// Import a profile backup JSON envelope
    Import {
        #[arg(long)]
        json: PathBuf,
    },
    /// Delete one evaluation
    Delete {
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Grade {
            marine,
            rank,
            from,
            to,
            occasion,
            reporting_senior,
            email,
        } => {
            let profile = db::fetch_profile(&pool, email.as_deref()).await?;
            let mut session = GradingSession::new(reporting_senior);

            println!(
                "Grading {rank} {marine} for {}: {} traits to mark.",
                occasion,
                session.trait_count()
            );
            run_grading_walk(&mut session)?;

            let (traits, average) = session.finish()?;
            let record = EvaluationRecord {
                evaluation_id: models::new_evaluation_id(),
                rs_info: RsInfo {
                    name: profile.rs_name.clone(),
                    email: profile.rs_email.clone(),
                    rank: profile.rs_rank.clone(),
                },
                marine_info: MarineInfo {
                    name: marine.clone(),
                    rank: rank.clone(),
                    evaluation_period: EvaluationPeriod { from, to },
                },
                occasion,
                completed_date: chrono::Utc::now().to_rfc3339(),
                fitrep_average: average,
                trait_evaluations: traits,
                section_i_comments: String::new(),
                directed_comments: String::new(),
                sync_status: SyncStatus::Pending,
            };
            db::insert_evaluation(&pool, &record).await?;
            println!(
                "Saved {} for {rank} {marine} with FITREP average {}.",
                record.evaluation_id, record.fitrep_average
            );
        }
        Commands::Regrade {
            id,
            trait_label,
            grade,
            justification,
        } => {
            let grade = Grade::from_letter(&grade)
                .with_context(|| format!("invalid grade letter \"{grade}\""))?;
            let mut record = db::fetch_evaluation(&pool, &id).await?;
            grading::regrade_record(&mut record, &trait_label, grade, &justification)?;
            db::update_evaluation(&pool, &record).await?;
            println!(
                "Re-graded {trait_label} on {id}; new average {}.",
                record.fitrep_average
            );
        }
        Commands::List { email, sort } => {
            let profile = db::fetch_profile(&pool, email.as_deref()).await?;
            let evaluations = db::fetch_evaluations(&pool, &profile.rs_email).await?;
            let rollups = grid::rank_rollups(&evaluations, sort);

            if rollups.is_empty() {
                println!("No evaluations saved yet.");
            } else {
                println!(
                    "Rank summary for {} {} ({} evaluations):",
                    profile.rs_rank,
                    profile.rs_name,
                    evaluations.len()
                );
                for rollup in rollups {
                    println!(
                        "- {:<7} {:>2} reports  avg {:.2}  high {:.2}  low {:.2}",
                        rollup.rank, rollup.count, rollup.avg, rollup.high, rollup.low
                    );
                }
            }
        }
        Commands::Grid {
            email,
            sort,
            rank,
            marine,
            occasion,
            year,
            grade,
        } => {
            let grade = match grade {
                Some(letter) => Some(
                    Grade::from_letter(&letter)
                        .with_context(|| format!("invalid grade letter \"{letter}\""))?,
                ),
                None => None,
            };
            let profile = db::fetch_profile(&pool, email.as_deref()).await?;
            let evaluations = db::fetch_evaluations(&pool, &profile.rs_email).await?;

            let rv_map = rv::compute_rv_values(&evaluations);
            let cum_map = rv::compute_cumulative_rv(&evaluations);

            let filter = GridFilter {
                rank,
                name: marine,
                occasion,
                year,
                grade,
            };
            let mut view = grid::apply_filters(&evaluations, &filter);
            grid::sort_records(&mut view, sort, &rv_map);

            if view.is_empty() {
                println!("No evaluations match the current filters.");
            } else {
                let summary = grid::rank_summary(&view);
                println!(
                    "High {:.2} | Avg {:.2} | Low {:.2} | # Rpts {}",
                    summary.high, summary.avg, summary.low, summary.reports
                );
                print_grid(&grid::build_grid_rows(&view, &rv_map, &cum_map));
            }
        }
        Commands::Export { email, sort, out } => {
            let profile = db::fetch_profile(&pool, email.as_deref()).await?;
            let evaluations = db::fetch_evaluations(&pool, &profile.rs_email).await?;

            let rv_map = rv::compute_rv_values(&evaluations);
            let cum_map = rv::compute_cumulative_rv(&evaluations);

            let mut view: Vec<&EvaluationRecord> = evaluations.iter().collect();
            grid::sort_records(&mut view, sort, &rv_map);
            let rows = grid::build_grid_rows(&view, &rv_map, &cum_map);

            let file = std::fs::File::create(&out)
                .with_context(|| format!("creating {}", out.display()))?;
            grid::write_csv(&rows, file)?;
            println!("Exported {} rows to {}.", rows.len(), out.display());
        }
        Commands::Report { email, out } => {
            let profile = db::fetch_profile(&pool, email.as_deref()).await?;
            let evaluations = db::fetch_evaluations(&pool, &profile.rs_email).await?;
            let report = report::build_report(&profile, &evaluations);
            std::fs::write(&out, report)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Backup { email, out } => {
            let count = db::export_backup(&pool, email.as_deref(), &out).await?;
            println!("Backed up {count} evaluations to {}.", out.display());
        }
        Commands::Import { json } => {
            let inserted = db::import_backup(&pool, &json).await?;
            println!("Imported {inserted} evaluations from {}.", json.display());
        }
        Commands::Delete { id } => {
            if db::delete_evaluation(&pool, &id).await? {
                println!("Deleted {id}.");
            } else {
                println!("No evaluation with id {id}.");
            }
        }
    }

    Ok(())
}

/// Drives the grading session from stdin: one ladder prompt per trait, a
/// justification prompt on every finalized grade.
fn run_grading_walk(session: &mut GradingSession) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    while let Some((section, def)) = session.current() {
        let (position, total) = session.progress();
        println!();
        println!("[{position}/{total}] {}: {}", section.title, def.name);
        println!("  {}", def.description);

        loop {
            let level = session.level();
            println!("  Standard {level}: {}", catalog::grade_meaning(level));
            print!("  [1] does not meet  [2] meets  [3] surpasses > ");
            io::stdout().flush()?;

            let action = match next_line(&mut lines)?.trim() {
                "1" => GradeAction::DoesNotMeet,
                "2" => GradeAction::Meets,
                "3" => GradeAction::Surpasses,
                _ => {
                    println!("  Enter 1, 2, or 3.");
                    continue;
                }
            };

            match session.apply(action) {
                Some(grade) => {
                    println!("  Marked {grade}: {}", catalog::grade_meaning(grade));
                    loop {
                        print!("  Justification: ");
                        io::stdout().flush()?;
                        let text = next_line(&mut lines)?;
                        match session.record_justification(&text) {
                            Ok(()) => break,
                            Err(err) => println!("  {err}"),
                        }
                    }
                    break;
                }
                // Ladder moved up; re-ask at the higher standard.
                None => continue,
            }
        }
    }
    Ok(())
}

fn next_line(lines: &mut impl Iterator<Item = io::Result<String>>) -> anyhow::Result<String> {
    match lines.next() {
        Some(line) => Ok(line?),
        None => anyhow::bail!("input ended before the evaluation was complete"),
    }
}

fn print_grid(rows: &[grid::GridRow]) {
    print!("{:>4}  {:<20} {:<10} {:<10}", "Rank", "Marine", "Occasion", "Ending");
    for slot in catalog::TraitSlot::CORE {
        print!(" {:>3}", slot.short_code());
    }
    println!(" {:>6} {:>4} {:>6}  {}", "Avg", "RV", "CumRV", "Id");

    for row in rows {
        print!(
            "{:>4}  {:<20} {:<10} {:<10}",
            row.rank, row.marine, row.occasion, row.ending_date
        );
        for grade in &row.grades {
            print!(" {grade:>3}");
        }
        println!(
            " {:>6} {:>4} {:>6}  {}",
            row.average,
            row.rv.to_string(),
            row.cum_rv.to_string(),
            row.evaluation_id
        );
    }
}
