use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context};
use chrono::Utc;
use log::debug;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::catalog::SECTIONS;
use crate::models::{
    EvaluationPeriod, EvaluationRecord, Grade, MarineInfo, ProfileBackup, RsInfo, RsProfile,
    SyncStatus, TraitResult,
};
use crate::score;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn upsert_profile(pool: &PgPool, profile: &RsProfile) -> anyhow::Result<()> {
    let now = Utc::now().to_rfc3339();
    let created = if profile.created_date.is_empty() {
        now.clone()
    } else {
        profile.created_date.clone()
    };

    sqlx::query(
        r#"
        INSERT INTO fitrep.profiles (id, rs_name, rs_email, rs_rank, created_date, last_updated)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (rs_email) DO UPDATE
        SET rs_name = EXCLUDED.rs_name, rs_rank = EXCLUDED.rs_rank,
            last_updated = EXCLUDED.last_updated
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&profile.rs_name)
    .bind(&profile.rs_email)
    .bind(&profile.rs_rank)
    .bind(created)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Loads the profile for `email`, or the sole stored profile when no email is
/// given. Evaluation counts come from the evaluations table, not the stored
/// counter.
pub async fn fetch_profile(pool: &PgPool, email: Option<&str>) -> anyhow::Result<RsProfile> {
    let row = match email {
        Some(email) => sqlx::query(
            "SELECT rs_name, rs_email, rs_rank, created_date, last_updated \
             FROM fitrep.profiles WHERE rs_email = $1",
        )
        .bind(email)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("no profile stored for {email}"))?,
        None => {
            let mut rows = sqlx::query(
                "SELECT rs_name, rs_email, rs_rank, created_date, last_updated \
                 FROM fitrep.profiles ORDER BY created_date LIMIT 2",
            )
            .fetch_all(pool)
            .await?;
            match rows.len() {
                0 => bail!("no profiles stored; run seed or import first"),
                1 => rows.remove(0),
                _ => bail!("multiple profiles stored; pass --email to pick one"),
            }
        }
    };

    let mut profile = RsProfile {
        rs_name: row.get("rs_name"),
        rs_email: row.get("rs_email"),
        rs_rank: row.get("rs_rank"),
        created_date: row.get("created_date"),
        last_updated: row.get("last_updated"),
        total_evaluations: 0,
    };

    let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM fitrep.evaluations WHERE rs_email = $1")
        .bind(&profile.rs_email)
        .fetch_one(pool)
        .await?
        .get("n");
    profile.total_evaluations = count as usize;

    Ok(profile)
}

pub async fn fetch_evaluations(pool: &PgPool, rs_email: &str) -> anyhow::Result<Vec<EvaluationRecord>> {
    let rows = sqlx::query(
        "SELECT id, rs_name, rs_email, rs_rank, marine_name, marine_rank, period_from, \
         period_to, occasion, completed_date, fitrep_average, trait_evaluations, \
         section_i_comments, directed_comments, sync_status \
         FROM fitrep.evaluations WHERE rs_email = $1 ORDER BY completed_date",
    )
    .bind(rs_email)
    .fetch_all(pool)
    .await?;

    let mut evaluations = Vec::with_capacity(rows.len());
    for row in rows {
        let id: String = row.get("id");
        let traits_json: String = row.get("trait_evaluations");
        let trait_evaluations: BTreeMap<String, TraitResult> = serde_json::from_str(&traits_json)
            .with_context(|| format!("corrupt trait data on evaluation {id}"))?;
        let sync_status: String = row.get("sync_status");

        let mut record = EvaluationRecord {
            evaluation_id: id,
            rs_info: RsInfo {
                name: row.get("rs_name"),
                email: row.get("rs_email"),
                rank: row.get("rs_rank"),
            },
            marine_info: MarineInfo {
                name: row.get("marine_name"),
                rank: row.get("marine_rank"),
                evaluation_period: EvaluationPeriod {
                    from: row.get("period_from"),
                    to: row.get("period_to"),
                },
            },
            occasion: row.get("occasion"),
            completed_date: row.get("completed_date"),
            fitrep_average: row.get("fitrep_average"),
            trait_evaluations,
            section_i_comments: row.get("section_i_comments"),
            directed_comments: row.get("directed_comments"),
            sync_status: SyncStatus::from_label(&sync_status),
        };
        record.normalize();
        evaluations.push(record);
    }

    debug!("fetched {} evaluations for {rs_email}", evaluations.len());
    Ok(evaluations)
}

pub async fn fetch_evaluation(pool: &PgPool, id: &str) -> anyhow::Result<EvaluationRecord> {
    let email: String = sqlx::query("SELECT rs_email FROM fitrep.evaluations WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("no evaluation with id {id}"))?
        .get("rs_email");

    let evaluations = fetch_evaluations(pool, &email).await?;
    evaluations
        .into_iter()
        .find(|e| e.evaluation_id == id)
        .with_context(|| format!("no evaluation with id {id}"))
}

/// Inserts one evaluation; returns false when the id already exists.
pub async fn insert_evaluation(pool: &PgPool, record: &EvaluationRecord) -> anyhow::Result<bool> {
    let traits_json = serde_json::to_string(&record.trait_evaluations)?;

    let result = sqlx::query(
        r#"
        INSERT INTO fitrep.evaluations
        (id, rs_name, rs_email, rs_rank, marine_name, marine_rank, period_from, period_to,
         occasion, completed_date, fitrep_average, trait_evaluations,
         section_i_comments, directed_comments, sync_status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(&record.evaluation_id)
    .bind(&record.rs_info.name)
    .bind(&record.rs_info.email)
    .bind(&record.rs_info.rank)
    .bind(&record.marine_info.name)
    .bind(&record.marine_info.rank)
    .bind(&record.marine_info.evaluation_period.from)
    .bind(&record.marine_info.evaluation_period.to)
    .bind(&record.occasion)
    .bind(&record.completed_date)
    .bind(&record.fitrep_average)
    .bind(traits_json)
    .bind(&record.section_i_comments)
    .bind(&record.directed_comments)
    .bind(record.sync_status.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Rewrites the mutable parts of a stored evaluation (the re-grade path).
pub async fn update_evaluation(pool: &PgPool, record: &EvaluationRecord) -> anyhow::Result<()> {
    let traits_json = serde_json::to_string(&record.trait_evaluations)?;

    let result = sqlx::query(
        r#"
        UPDATE fitrep.evaluations
        SET trait_evaluations = $2, fitrep_average = $3, sync_status = $4
        WHERE id = $1
        "#,
    )
    .bind(&record.evaluation_id)
    .bind(traits_json)
    .bind(&record.fitrep_average)
    .bind(record.sync_status.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        bail!("no evaluation with id {}", record.evaluation_id);
    }
    Ok(())
}

pub async fn delete_evaluation(pool: &PgPool, id: &str) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM fitrep.evaluations WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Imports a profile backup envelope; returns the number of newly inserted
/// evaluations. Already-present ids are left untouched.
pub async fn import_backup(pool: &PgPool, path: &Path) -> anyhow::Result<usize> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let mut backup: ProfileBackup =
        serde_json::from_str(&raw).context("backup file is not a profile export")?;

    upsert_profile(pool, &backup.profile).await?;

    let mut inserted = 0usize;
    for record in backup.evaluations.iter_mut() {
        record.normalize();
        if record.rs_info.email.is_empty() {
            record.rs_info = RsInfo {
                name: backup.profile.rs_name.clone(),
                email: backup.profile.rs_email.clone(),
                rank: backup.profile.rs_rank.clone(),
            };
        }
        if insert_evaluation(pool, record).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn export_backup(
    pool: &PgPool,
    email: Option<&str>,
    path: &Path,
) -> anyhow::Result<usize> {
    let profile = fetch_profile(pool, email).await?;
    let evaluations = fetch_evaluations(pool, &profile.rs_email).await?;
    let count = evaluations.len();

    let backup = ProfileBackup {
        profile,
        evaluations,
    };
    let json = serde_json::to_string_pretty(&backup)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;

    Ok(count)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let profile = RsProfile {
        rs_name: "Riley Calhoun".to_string(),
        rs_email: "riley.calhoun@unit.mil".to_string(),
        rs_rank: "Maj".to_string(),
        created_date: String::new(),
        last_updated: String::new(),
        total_evaluations: 0,
    };
    upsert_profile(pool, &profile).await?;

    let seeds = [
        ("eval-seed-001", "Avery Niles", "Capt", "2024-07-01", "2025-06-30", "annual", Grade::D, 0),
        ("eval-seed-002", "Jordan Reyes", "Capt", "2024-09-01", "2025-08-31", "annual", Grade::E, 1),
        ("eval-seed-003", "Morgan Tate", "Capt", "2024-11-01", "2025-10-31", "annual", Grade::D, 2),
        ("eval-seed-004", "Casey Brandt", "1stLt", "2025-01-01", "2025-12-31", "annual", Grade::F, 1),
        ("eval-seed-005", "Quinn Harlow", "Capt", "2025-03-01", "2026-02-28", "transfer", Grade::E, 3),
        ("eval-seed-006", "Rowan Delgado", "1stLt", "2025-05-01", "2026-04-30", "annual", Grade::D, 1),
    ];

    for (id, marine, rank, from, to, occasion, base, bumps) in seeds {
        let traits = seed_traits(base, bumps);
        let record = EvaluationRecord {
            evaluation_id: id.to_string(),
            rs_info: RsInfo {
                name: profile.rs_name.clone(),
                email: profile.rs_email.clone(),
                rank: profile.rs_rank.clone(),
            },
            marine_info: MarineInfo {
                name: marine.to_string(),
                rank: rank.to_string(),
                evaluation_period: EvaluationPeriod {
                    from: from.to_string(),
                    to: to.to_string(),
                },
            },
            occasion: occasion.to_string(),
            completed_date: format!("{to}T12:00:00Z"),
            fitrep_average: score::fitrep_average(&traits),
            trait_evaluations: traits,
            section_i_comments: String::new(),
            directed_comments: String::new(),
            sync_status: SyncStatus::Pending,
        };
        insert_evaluation(pool, &record).await?;
    }

    Ok(())
}

// Full 13-trait map at `base`, with the first `bumps` traits one ladder step
// higher so seeded averages spread out.
fn seed_traits(base: Grade, bumps: usize) -> BTreeMap<String, TraitResult> {
    let bumped = match base {
        Grade::B => Grade::D,
        Grade::D => Grade::E,
        Grade::E => Grade::F,
        Grade::F => Grade::G,
        other => other,
    };

    let mut traits = BTreeMap::new();
    let mut index = 0usize;
    for section in SECTIONS.iter() {
        for def in section.traits {
            let grade = if index < bumps { bumped } else { base };
            traits.insert(
                format!("{}_{}", section.key, def.key),
                TraitResult::new(
                    section.title,
                    def.name,
                    grade,
                    "Sustained performance documented in the period narrative.",
                ),
            );
            index += 1;
        }
    }
    traits
}
