use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Trait grade letters. A..G are the ordinal marks (A lowest, G highest);
/// H is the reserved "not observed" sentinel and never counts toward averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
}

impl Grade {
    pub fn number(self) -> u32 {
        match self {
            Grade::A => 1,
            Grade::B => 2,
            Grade::C => 3,
            Grade::D => 4,
            Grade::E => 5,
            Grade::F => 6,
            Grade::G => 7,
            Grade::H => 0,
        }
    }

    pub fn from_letter(letter: &str) -> Option<Grade> {
        match letter.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Grade::A),
            "B" => Some(Grade::B),
            "C" => Some(Grade::C),
            "D" => Some(Grade::D),
            "E" => Some(Grade::E),
            "F" => Some(Grade::F),
            "G" => Some(Grade::G),
            "H" => Some(Grade::H),
            _ => None,
        }
    }

    pub fn letter(self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::E => "E",
            Grade::F => "F",
            Grade::G => "G",
            Grade::H => "H",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.letter())
    }
}

/// One graded trait observation.
///
/// Invariant: `grade_number` is always `grade.number()`. Construction goes
/// through [`TraitResult::new`]; records deserialized from storage or imports
/// are passed through [`TraitResult::normalize`] to restore the invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraitResult {
    pub section: String,
    #[serde(rename = "trait")]
    pub trait_name: String,
    pub grade: Grade,
    #[serde(default)]
    pub grade_number: u32,
    pub justification: String,
}

impl TraitResult {
    pub fn new(section: &str, trait_name: &str, grade: Grade, justification: &str) -> TraitResult {
        TraitResult {
            section: section.to_string(),
            trait_name: trait_name.to_string(),
            grade,
            grade_number: grade.number(),
            justification: justification.to_string(),
        }
    }

    pub fn normalize(&mut self) {
        self.grade_number = self.grade.number();
    }
}

/// Reporting period bounds, kept as the raw strings the client submitted.
/// Parsing happens at the RV engine's boundary, with its documented fallbacks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationPeriod {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RsInfo {
    pub name: String,
    pub email: String,
    pub rank: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarineInfo {
    pub name: String,
    pub rank: String,
    pub evaluation_period: EvaluationPeriod,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Pending => f.write_str("pending"),
            SyncStatus::Synced => f.write_str("synced"),
        }
    }
}

impl SyncStatus {
    pub fn from_label(label: &str) -> SyncStatus {
        if label.trim().eq_ignore_ascii_case("synced") {
            SyncStatus::Synced
        } else {
            SyncStatus::Pending
        }
    }
}

/// One completed evaluation, owned by the reporting senior's profile.
/// Field names follow the original JSON contract so profile exports from the
/// web client import losslessly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRecord {
    pub evaluation_id: String,
    #[serde(default)]
    pub rs_info: RsInfo,
    pub marine_info: MarineInfo,
    #[serde(default)]
    pub occasion: String,
    #[serde(default)]
    pub completed_date: String,
    // Legacy zero-trait records carried a numeric 0 here instead of a string.
    #[serde(default, deserialize_with = "string_or_number")]
    pub fitrep_average: String,
    #[serde(default)]
    pub trait_evaluations: BTreeMap<String, TraitResult>,
    #[serde(default)]
    pub section_i_comments: String,
    #[serde(default)]
    pub directed_comments: String,
    #[serde(default)]
    pub sync_status: SyncStatus,
}

impl EvaluationRecord {
    pub fn normalize(&mut self) {
        for result in self.trait_evaluations.values_mut() {
            result.normalize();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RsProfile {
    pub rs_name: String,
    pub rs_email: String,
    pub rs_rank: String,
    #[serde(default)]
    pub created_date: String,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub total_evaluations: usize,
}

/// The import/export envelope produced by the profile backup command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileBackup {
    pub profile: RsProfile,
    pub evaluations: Vec<EvaluationRecord>,
}

pub fn new_evaluation_id() -> String {
    format!("eval-{}", Uuid::new_v4())
}

/// Rank ladder used for dashboard grouping; ranks outside this list never
/// appear in per-rank rollups.
pub const ORDERED_RANKS: [&str; 16] = [
    "SGT", "SSGT", "GYSGT", "MSGT", "1STSGT", "WO", "CWO2", "CWO3", "CWO4", "CWO5", "2NDLT",
    "1STLT", "CAPT", "MAJ", "LTCOL", "COL",
];

pub fn normalize_rank_label(rank: &str) -> String {
    let key: String = rank
        .chars()
        .filter(|c| *c != '.' && !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    let mapped = match key.as_str() {
        "sgt" => "SGT",
        "ssgt" => "SSGT",
        "gysgt" => "GYSGT",
        "msgt" => "MSGT",
        "1stsgt" => "1STSGT",
        "wo" => "WO",
        "cwo2" => "CWO2",
        "cwo3" => "CWO3",
        "cwo4" => "CWO4",
        "cwo5" => "CWO5",
        "2ndlt" => "2NDLT",
        "1stlt" => "1STLT",
        "capt" => "CAPT",
        "maj" => "MAJ",
        "ltcol" => "LTCOL",
        "col" => "COL",
        _ => return rank.trim().to_ascii_uppercase(),
    };
    mapped.to_string()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}
