use crate::models::Grade;

/// Canonical trait slots. Historical evaluations carry several spellings per
/// slot; `aliases` is the single place those synonyms live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraitSlot {
    Performance,
    Proficiency,
    Courage,
    StressTolerance,
    Initiative,
    Leading,
    DevelopingOthers,
    SettingTheExample,
    WellBeing,
    CommunicationSkills,
    Pme,
    DecisionMaking,
    Judgement,
    Evaluations,
}

impl TraitSlot {
    /// The 13 slots every report carries, in grid column order.
    pub const CORE: [TraitSlot; 13] = [
        TraitSlot::Performance,
        TraitSlot::Proficiency,
        TraitSlot::Courage,
        TraitSlot::StressTolerance,
        TraitSlot::Initiative,
        TraitSlot::Leading,
        TraitSlot::DevelopingOthers,
        TraitSlot::SettingTheExample,
        TraitSlot::WellBeing,
        TraitSlot::CommunicationSkills,
        TraitSlot::Pme,
        TraitSlot::DecisionMaking,
        TraitSlot::Judgement,
    ];

    /// Core slots plus the reporting-senior-only Evaluations slot.
    pub const ALL: [TraitSlot; 14] = [
        TraitSlot::Performance,
        TraitSlot::Proficiency,
        TraitSlot::Courage,
        TraitSlot::StressTolerance,
        TraitSlot::Initiative,
        TraitSlot::Leading,
        TraitSlot::DevelopingOthers,
        TraitSlot::SettingTheExample,
        TraitSlot::WellBeing,
        TraitSlot::CommunicationSkills,
        TraitSlot::Pme,
        TraitSlot::DecisionMaking,
        TraitSlot::Judgement,
        TraitSlot::Evaluations,
    ];

    /// Column header used in the grid and the CSV export.
    pub fn column_label(self) -> &'static str {
        match self {
            TraitSlot::Performance => "Performance",
            TraitSlot::Proficiency => "Proficiency",
            TraitSlot::Courage => "Courage",
            TraitSlot::StressTolerance => "Stress Tolerance",
            TraitSlot::Initiative => "Initiative",
            TraitSlot::Leading => "Leading",
            TraitSlot::DevelopingOthers => "Developing Others",
            TraitSlot::SettingTheExample => "Setting the Example",
            TraitSlot::WellBeing => "Well-Being/Health",
            TraitSlot::CommunicationSkills => "Communication Skills",
            TraitSlot::Pme => "PME",
            TraitSlot::DecisionMaking => "Decision Making",
            TraitSlot::Judgement => "Judgement",
            TraitSlot::Evaluations => "Evaluations",
        }
    }

    /// Abbreviated header for terminal tables.
    pub fn short_code(self) -> &'static str {
        match self {
            TraitSlot::Performance => "PF",
            TraitSlot::Proficiency => "PR",
            TraitSlot::Courage => "CO",
            TraitSlot::StressTolerance => "ST",
            TraitSlot::Initiative => "IN",
            TraitSlot::Leading => "LD",
            TraitSlot::DevelopingOthers => "DV",
            TraitSlot::SettingTheExample => "SE",
            TraitSlot::WellBeing => "WB",
            TraitSlot::CommunicationSkills => "CS",
            TraitSlot::Pme => "PME",
            TraitSlot::DecisionMaking => "DM",
            TraitSlot::Judgement => "JD",
            TraitSlot::Evaluations => "EV",
        }
    }

    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            TraitSlot::Performance => &["Performance"],
            TraitSlot::Proficiency => &["Proficiency"],
            TraitSlot::Courage => &["Courage"],
            TraitSlot::StressTolerance => &["Effectiveness Under Stress", "Stress Tolerance"],
            TraitSlot::Initiative => &["Initiative"],
            TraitSlot::Leading => &["Leading Subordinates", "Leading"],
            TraitSlot::DevelopingOthers => &["Developing Subordinates", "Developing Others"],
            TraitSlot::SettingTheExample => &["Setting the Example"],
            TraitSlot::WellBeing => &[
                "Ensuring Well-being of Subordinates",
                "Ensuring Well-being",
                "Well-Being/Health",
                "Well Being",
                "Well-being",
            ],
            TraitSlot::CommunicationSkills => &["Communication Skills"],
            TraitSlot::Pme => &[
                "Professional Military Education (PME)",
                "Professional Military Education",
                "PME",
            ],
            TraitSlot::DecisionMaking => &["Decision Making Ability", "Decision Making"],
            TraitSlot::Judgement => &["Judgment", "Judgement"],
            TraitSlot::Evaluations => &["Evaluations"],
        }
    }

    /// Full-label alias match: trimmed, ASCII-case-insensitive.
    pub fn matches(self, label: &str) -> bool {
        let label = label.trim();
        self.aliases().iter().any(|a| a.eq_ignore_ascii_case(label))
    }

    pub fn from_label(label: &str) -> Option<TraitSlot> {
        TraitSlot::ALL.iter().copied().find(|slot| slot.matches(label))
    }
}

/// Section label that flips the average denominator from 13 to 14.
pub const SECTION_H_TITLE: &str = "Fulfillment of Evaluation Responsibilities";

pub struct TraitDef {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub struct SectionDef {
    pub key: char,
    pub title: &'static str,
    pub description: &'static str,
    pub traits: &'static [TraitDef],
}

pub static SECTIONS: [SectionDef; 4] = [
    SectionDef {
        key: 'D',
        title: "Mission Accomplishment",
        description: "How effectively the Marine performs primary duties and responsibilities.",
        traits: &[
            TraitDef {
                key: "performance",
                name: "Performance",
                description: "Results achieved during the reporting period against assigned duties.",
            },
            TraitDef {
                key: "proficiency",
                name: "Proficiency",
                description: "Technical and tactical skill in the Marine's MOS and billet.",
            },
        ],
    },
    SectionDef {
        key: 'E',
        title: "Individual Character",
        description: "Personal integrity, moral courage, and resilience under pressure.",
        traits: &[
            TraitDef {
                key: "courage",
                name: "Courage",
                description: "Moral and physical courage; doing the harder right.",
            },
            TraitDef {
                key: "stress",
                name: "Effectiveness Under Stress",
                description: "Composure and judgment under pressure, fatigue, and friction.",
            },
            TraitDef {
                key: "initiative",
                name: "Initiative",
                description: "Action in the absence of orders; seeking responsibility.",
            },
        ],
    },
    SectionDef {
        key: 'F',
        title: "Leadership",
        description: "Leading, developing, and caring for subordinates while setting the example.",
        traits: &[
            TraitDef {
                key: "leading",
                name: "Leading Subordinates",
                description: "Direction, motivation, and accountability of the unit.",
            },
            TraitDef {
                key: "developing",
                name: "Developing Subordinates",
                description: "Training, mentoring, and growing the next set of leaders.",
            },
            TraitDef {
                key: "example",
                name: "Setting the Example",
                description: "Personal conduct and bearing as the unit's standard.",
            },
            TraitDef {
                key: "wellbeing",
                name: "Ensuring Well-being of Subordinates",
                description: "Genuine concern for Marines and their families.",
            },
            TraitDef {
                key: "communication",
                name: "Communication Skills",
                description: "Clarity and effectiveness in written and spoken communication.",
            },
        ],
    },
    SectionDef {
        key: 'G',
        title: "Intellect and Wisdom",
        description: "Decision-making ability, judgment, and professional development.",
        traits: &[
            TraitDef {
                key: "pme",
                name: "Professional Military Education (PME)",
                description: "Commitment to resident and self-directed professional education.",
            },
            TraitDef {
                key: "decision",
                name: "Decision Making Ability",
                description: "Timely, sound decisions with the information available.",
            },
            TraitDef {
                key: "judgement",
                name: "Judgment",
                description: "Discernment in weighing competing demands and risks.",
            },
        ],
    },
];

pub static SECTION_H: SectionDef = SectionDef {
    key: 'H',
    title: SECTION_H_TITLE,
    description: "How well this Marine conducts performance evaluations of subordinates.",
    traits: &[TraitDef {
        key: "evaluations",
        name: "Evaluations",
        description: "Fairness, accuracy, and timeliness of evaluations rendered on others.",
    }],
};

pub fn grade_meaning(grade: Grade) -> &'static str {
    match grade {
        Grade::A => "Significantly below standards",
        Grade::B => "Meets requirements and expectations",
        Grade::C => "Below average but acceptable",
        Grade::D => "Consistently produces quality results",
        Grade::E => "Above average performance",
        Grade::F => "Results far surpass expectations",
        Grade::G => "Exceptional, setting new standards",
        Grade::H => "Not observed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_to_one_slot() {
        assert_eq!(TraitSlot::from_label("Leading Subordinates"), Some(TraitSlot::Leading));
        assert_eq!(TraitSlot::from_label("Leading"), Some(TraitSlot::Leading));
        assert_eq!(TraitSlot::from_label("judgment"), Some(TraitSlot::Judgement));
        assert_eq!(TraitSlot::from_label(" Well Being "), Some(TraitSlot::WellBeing));
        assert_eq!(TraitSlot::from_label("PME"), Some(TraitSlot::Pme));
        assert_eq!(TraitSlot::from_label("Close Air Support"), None);
    }

    #[test]
    fn matching_is_full_label_only() {
        // Substrings must not match; "Leading" and "Leading Subordinates" are
        // distinct aliases, not a prefix rule.
        assert!(!TraitSlot::Performance.matches("Performance Review"));
        assert!(TraitSlot::StressTolerance.matches("effectiveness under stress"));
    }

    #[test]
    fn catalog_carries_thirteen_core_traits() {
        let total: usize = SECTIONS.iter().map(|s| s.traits.len()).sum();
        assert_eq!(total, 13);
        assert_eq!(SECTION_H.traits.len(), 1);

        // Every catalog trait name resolves to a slot.
        for section in &SECTIONS {
            for def in section.traits {
                assert!(TraitSlot::from_label(def.name).is_some(), "{}", def.name);
            }
        }
    }
}
