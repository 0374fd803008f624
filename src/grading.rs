use std::collections::BTreeMap;

use anyhow::{bail, Context};

use crate::catalog::{SectionDef, TraitDef, TraitSlot, SECTIONS, SECTION_H};
use crate::models::{EvaluationRecord, Grade, SyncStatus, TraitResult};
use crate::score;

/// Ladder answers for the trait currently on deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeAction {
    DoesNotMeet,
    Meets,
    Surpasses,
}

struct PlannedTrait {
    section: &'static SectionDef,
    def: &'static TraitDef,
    key: String,
}

/// One grading walk: the linear trait sequence, the B/D/F ladder position,
/// and the results gathered so far. Owns no IO; the CLI drives it.
pub struct GradingSession {
    traits: Vec<PlannedTrait>,
    index: usize,
    level: Grade,
    pending: Option<Grade>,
    revisit: Option<usize>,
    results: BTreeMap<String, TraitResult>,
}

impl GradingSession {
    pub fn new(reporting_senior: bool) -> GradingSession {
        let mut traits = Vec::new();
        for section in &SECTIONS {
            for def in section.traits {
                traits.push(PlannedTrait {
                    section,
                    def,
                    key: format!("{}_{}", section.key, def.key),
                });
            }
        }
        if reporting_senior {
            for def in SECTION_H.traits {
                traits.push(PlannedTrait {
                    section: &SECTION_H,
                    def,
                    key: format!("{}_{}", SECTION_H.key, def.key),
                });
            }
        }
        GradingSession {
            traits,
            index: 0,
            level: Grade::B,
            pending: None,
            revisit: None,
            results: BTreeMap::new(),
        }
    }

    pub fn trait_count(&self) -> usize {
        self.traits.len()
    }

    /// (1-based position, total) for progress display.
    pub fn progress(&self) -> (usize, usize) {
        let position = self.revisit.unwrap_or(self.index);
        (position.min(self.traits.len().saturating_sub(1)) + 1, self.traits.len())
    }

    pub fn level(&self) -> Grade {
        self.level
    }

    /// The trait currently on deck, or None once the walk is complete.
    pub fn current(&self) -> Option<(&'static SectionDef, &'static TraitDef)> {
        let index = self.revisit.unwrap_or(self.index);
        self.traits.get(index).map(|p| (p.section, p.def))
    }

    pub fn is_complete(&self) -> bool {
        self.revisit.is_none() && self.pending.is_none() && self.index >= self.traits.len()
    }

    /// Applies a ladder action. Returns the grade to finalize, or None when
    /// the ladder moved up and the same trait is re-asked at the higher
    /// standard.
    pub fn apply(&mut self, action: GradeAction) -> Option<Grade> {
        let outcome = match (action, self.level) {
            (GradeAction::DoesNotMeet, Grade::B) => Some(Grade::A),
            (GradeAction::DoesNotMeet, Grade::D) => Some(Grade::C),
            (GradeAction::DoesNotMeet, Grade::F) => Some(Grade::E),
            (GradeAction::Meets, level) => Some(level),
            (GradeAction::Surpasses, Grade::B) => {
                self.level = Grade::D;
                None
            }
            (GradeAction::Surpasses, Grade::D) => {
                self.level = Grade::F;
                None
            }
            (GradeAction::Surpasses, Grade::F) => Some(Grade::G),
            // The ladder only ever rests on B, D, or F.
            (_, level) => Some(level),
        };
        self.pending = outcome;
        outcome
    }

    /// Records the justification for a finalized grade and advances the walk.
    pub fn record_justification(&mut self, justification: &str) -> anyhow::Result<()> {
        let grade = match self.pending {
            Some(grade) => grade,
            None => bail!("no grade is awaiting justification"),
        };
        let justification = justification.trim();
        if justification.is_empty() {
            bail!("justification must not be empty");
        }

        let index = self.revisit.unwrap_or(self.index);
        let planned = self
            .traits
            .get(index)
            .context("grading walk already complete")?;
        self.results.insert(
            planned.key.clone(),
            TraitResult::new(planned.section.title, planned.def.name, grade, justification),
        );

        self.pending = None;
        if self.revisit.take().is_none() {
            self.index += 1;
        }
        self.level = Grade::B;
        Ok(())
    }

    /// Re-opens one already-graded trait; the next apply/record pair replaces
    /// its result without disturbing the walk position.
    pub fn revisit_trait(&mut self, key: &str) -> anyhow::Result<()> {
        let position = self
            .traits
            .iter()
            .position(|p| p.key == key)
            .with_context(|| format!("unknown trait key {key}"))?;
        if !self.results.contains_key(key) {
            bail!("trait {key} has not been graded yet");
        }
        self.revisit = Some(position);
        self.pending = None;
        self.level = Grade::B;
        Ok(())
    }

    /// Trait results plus the computed average, once every trait is graded.
    pub fn finish(&self) -> anyhow::Result<(BTreeMap<String, TraitResult>, String)> {
        if !self.is_complete() {
            bail!(
                "grading incomplete: {} of {} traits recorded",
                self.results.len(),
                self.traits.len()
            );
        }
        let average = score::fitrep_average(&self.results);
        Ok((self.results.clone(), average))
    }
}

/// Replaces one trait result on a stored evaluation and recomputes its
/// average. The record drops back to pending sync.
pub fn regrade_record(
    record: &mut EvaluationRecord,
    trait_label: &str,
    grade: Grade,
    justification: &str,
) -> anyhow::Result<()> {
    let justification = justification.trim();
    if justification.is_empty() {
        bail!("justification must not be empty");
    }

    let slot = TraitSlot::from_label(trait_label);
    let result = record
        .trait_evaluations
        .values_mut()
        .find(|t| match slot {
            Some(slot) => slot.matches(&t.trait_name),
            None => t.trait_name.trim().eq_ignore_ascii_case(trait_label.trim()),
        })
        .with_context(|| format!("no graded trait matches \"{trait_label}\""))?;

    result.grade = grade;
    result.grade_number = grade.number();
    result.justification = justification.to_string();

    record.fitrep_average = score::fitrep_average(&record.trait_evaluations);
    record.sync_status = SyncStatus::Pending;
    Ok(())
}
