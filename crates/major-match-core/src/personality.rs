use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::aptitude::{AptitudeType, AptitudeVector};

/// Profiles whose highest and lowest dimensions differ by less than this are
/// treated as having no dominant aptitude.
const FLAT_PROFILE_SPREAD: f64 = 0.5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum PersonalityLabel {
    Versatile,
    Verbal,
    Logical,
    Creative,
    Social,
    Leader,
    Active,
    Artistic,
    Systematic,
    Inquisitive,
    Executor,
    Analyst,
    Researcher,
    Creator,
    Innovator,
    Communicator,
    Coordinator,
    Planner,
    Architect,
    Maker,
}

/// Compound labels keyed by an unordered pair of top dimensions.
const PAIR_LABELS: [(AptitudeType, AptitudeType, PersonalityLabel); 9] = [
    (AptitudeType::Logical, AptitudeType::ProblemSolving, PersonalityLabel::Analyst),
    (AptitudeType::Logical, AptitudeType::Inquisitive, PersonalityLabel::Researcher),
    (AptitudeType::Logical, AptitudeType::Systematic, PersonalityLabel::Architect),
    (AptitudeType::Creative, AptitudeType::Artistic, PersonalityLabel::Creator),
    (AptitudeType::Creative, AptitudeType::Inquisitive, PersonalityLabel::Innovator),
    (AptitudeType::Verbal, AptitudeType::Social, PersonalityLabel::Communicator),
    (AptitudeType::Social, AptitudeType::Leadership, PersonalityLabel::Coordinator),
    (AptitudeType::Leadership, AptitudeType::Systematic, PersonalityLabel::Planner),
    (AptitudeType::Physical, AptitudeType::ProblemSolving, PersonalityLabel::Maker),
];

impl PersonalityLabel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Versatile => "Versatile",
            Self::Verbal => "Verbal",
            Self::Logical => "Logical",
            Self::Creative => "Creative",
            Self::Social => "Social",
            Self::Leader => "Leader",
            Self::Active => "Active",
            Self::Artistic => "Artistic",
            Self::Systematic => "Systematic",
            Self::Inquisitive => "Inquisitive",
            Self::Executor => "Executor",
            Self::Analyst => "Analyst",
            Self::Researcher => "Researcher",
            Self::Creator => "Creator",
            Self::Innovator => "Innovator",
            Self::Communicator => "Communicator",
            Self::Coordinator => "Coordinator",
            Self::Planner => "Planner",
            Self::Architect => "Architect",
            Self::Maker => "Maker",
        }
    }

    /// Label used when a single dimension dominates.
    #[must_use]
    pub fn for_dimension(aptitude: AptitudeType) -> Self {
        match aptitude {
            AptitudeType::Verbal => Self::Verbal,
            AptitudeType::Logical => Self::Logical,
            AptitudeType::Creative => Self::Creative,
            AptitudeType::Social => Self::Social,
            AptitudeType::Leadership => Self::Leader,
            AptitudeType::Physical => Self::Active,
            AptitudeType::Artistic => Self::Artistic,
            AptitudeType::Systematic => Self::Systematic,
            AptitudeType::Inquisitive => Self::Inquisitive,
            AptitudeType::ProblemSolving => Self::Executor,
        }
    }

    /// One-sentence description shown in result summaries.
    #[must_use]
    pub fn sentence(self) -> &'static str {
        match self {
            Self::Versatile => "You are a versatile student with many sides to explore.",
            Self::Verbal => "You are a student with a strong command of language and expression.",
            Self::Logical => "You are a student who thinks logically and analyses carefully.",
            Self::Creative => "You are a creative student who keeps coming up with new ideas.",
            Self::Social => "You are a student who communicates easily and empathises with others.",
            Self::Leader => "You are a proactive student who naturally takes the lead.",
            Self::Active => "You are an active student full of energy.",
            Self::Artistic => "You are a student with a keen artistic sense and expressiveness.",
            Self::Systematic => "You are a student who plans ahead and works systematically.",
            Self::Inquisitive => "You are a curious student who likes to dig deep.",
            Self::Executor => "You are a student who solves problems and gets things done.",
            Self::Analyst => "You are a student who breaks hard problems down and solves them.",
            Self::Researcher => "You are a student who asks why and follows the evidence.",
            Self::Creator => "You are a student who turns ideas into expressive work.",
            Self::Innovator => "You are a student who explores the unknown with fresh ideas.",
            Self::Communicator => "You are a student who connects with people through words.",
            Self::Coordinator => "You are a student who brings people together and guides them.",
            Self::Planner => "You are a student who organizes people and plans to reach a goal.",
            Self::Architect => "You are a student who designs orderly systems through careful reasoning.",
            Self::Maker => "You are a hands-on student who builds practical solutions.",
        }
    }
}

impl Display for PersonalityLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify an aptitude profile. Every vector maps to some label.
#[must_use]
pub fn classify_personality(vector: &AptitudeVector) -> PersonalityLabel {
    if vector.spread() < FLAT_PROFILE_SPREAD {
        return PersonalityLabel::Versatile;
    }

    let ranked = vector.ranked();
    let (first, second) = (ranked[0].0, ranked[1].0);
    PAIR_LABELS
        .iter()
        .find(|(lhs, rhs, _)| (*lhs, *rhs) == (first, second) || (*lhs, *rhs) == (second, first))
        .map_or_else(|| PersonalityLabel::for_dimension(first), |(_, _, label)| *label)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn with_peaks(peaks: &[(AptitudeType, f64)]) -> AptitudeVector {
        let mut values = [2.0; 10];
        for (aptitude, score) in peaks {
            values[aptitude.index()] = *score;
        }
        AptitudeVector::new(values)
    }

    #[test]
    fn flat_profile_is_versatile() {
        assert_eq!(classify_personality(&AptitudeVector::uniform(3.0)), PersonalityLabel::Versatile);
        let nearly_flat = with_peaks(&[(AptitudeType::Logical, 2.4)]);
        assert_eq!(classify_personality(&nearly_flat), PersonalityLabel::Versatile);
    }

    #[test]
    fn mapped_pairs_are_order_independent() {
        let logic_first =
            with_peaks(&[(AptitudeType::Logical, 5.0), (AptitudeType::ProblemSolving, 4.5)]);
        let solving_first =
            with_peaks(&[(AptitudeType::Logical, 4.5), (AptitudeType::ProblemSolving, 5.0)]);
        assert_eq!(classify_personality(&logic_first), PersonalityLabel::Analyst);
        assert_eq!(classify_personality(&solving_first), PersonalityLabel::Analyst);
    }

    #[test]
    fn every_pair_maps_to_its_own_label() {
        let labels = PAIR_LABELS.iter().map(|(_, _, label)| *label).collect::<std::collections::HashSet<_>>();
        assert_eq!(labels.len(), PAIR_LABELS.len());

        let reasoned = with_peaks(&[(AptitudeType::Logical, 5.0), (AptitudeType::Systematic, 4.5)]);
        let organized =
            with_peaks(&[(AptitudeType::Leadership, 5.0), (AptitudeType::Systematic, 4.5)]);
        assert_eq!(classify_personality(&reasoned), PersonalityLabel::Architect);
        assert_eq!(classify_personality(&organized), PersonalityLabel::Planner);
    }

    #[test]
    fn unmapped_pair_falls_back_to_top_dimension() {
        let vector = with_peaks(&[(AptitudeType::Physical, 5.0), (AptitudeType::Verbal, 4.5)]);
        assert_eq!(classify_personality(&vector), PersonalityLabel::Active);
    }

    #[test]
    fn ties_at_the_top_follow_canonical_order() {
        let vector = with_peaks(&[
            (AptitudeType::Social, 4.5),
            (AptitudeType::Verbal, 4.5),
            (AptitudeType::Leadership, 4.5),
        ]);
        // Verbal and Social rank first and second.
        assert_eq!(classify_personality(&vector), PersonalityLabel::Communicator);
    }

    #[test]
    fn label_serializes_as_plain_string() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_string(&PersonalityLabel::Coordinator)?, "\"Coordinator\"");
        let parsed: PersonalityLabel = serde_json::from_str("\"Maker\"")?;
        assert_eq!(parsed, PersonalityLabel::Maker);
        Ok(())
    }

    proptest! {
        #[test]
        fn property_every_profile_gets_a_described_label(
            values in prop::array::uniform10(1.0_f64..=5.0),
        ) {
            let label = classify_personality(&AptitudeVector::new(values));
            prop_assert!(!label.sentence().is_empty());
            prop_assert!(!label.as_str().is_empty());
        }
    }
}
