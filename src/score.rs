use std::collections::BTreeMap;

use crate::catalog::{TraitSlot, SECTION_H_TITLE};
use crate::models::TraitResult;

/// Reduces a trait-result map to the report's single average, as a
/// two-decimal string.
///
/// Each of the 14 slots is resolved through the alias table and contributes
/// its grade number to the sum (0 when unmatched or not observed). The
/// denominator is 14 exactly when the evaluations category is present, else
/// 13; it does not depend on how many slots actually matched.
pub fn fitrep_average(traits: &BTreeMap<String, TraitResult>) -> String {
    let items: Vec<&TraitResult> = traits.values().collect();

    let grade_for = |slot: TraitSlot| -> u32 {
        items
            .iter()
            .find(|t| slot.matches(&t.trait_name))
            .map(|t| t.grade_number)
            .unwrap_or(0)
    };

    let total: u32 = TraitSlot::ALL.iter().map(|&slot| grade_for(slot)).sum();

    let has_section_h = items.iter().any(|t| {
        t.trait_name.trim().eq_ignore_ascii_case("Evaluations")
            || t.section.trim().eq_ignore_ascii_case(SECTION_H_TITLE)
    });
    let denom = if has_section_h { 14.0 } else { 13.0 };

    format!("{:.2}", f64::from(total) / denom)
}
