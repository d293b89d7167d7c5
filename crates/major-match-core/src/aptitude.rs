use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

pub const APTITUDE_COUNT: usize = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AptitudeType {
    Verbal,
    Logical,
    Creative,
    Social,
    Leadership,
    Physical,
    Artistic,
    Systematic,
    Inquisitive,
    ProblemSolving,
}

impl AptitudeType {
    /// Canonical vector ordering.
    pub const ALL: [Self; APTITUDE_COUNT] = [
        Self::Verbal,
        Self::Logical,
        Self::Creative,
        Self::Social,
        Self::Leadership,
        Self::Physical,
        Self::Artistic,
        Self::Systematic,
        Self::Inquisitive,
        Self::ProblemSolving,
    ];

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Verbal => 0,
            Self::Logical => 1,
            Self::Creative => 2,
            Self::Social => 3,
            Self::Leadership => 4,
            Self::Physical => 5,
            Self::Artistic => 6,
            Self::Systematic => 7,
            Self::Inquisitive => 8,
            Self::ProblemSolving => 9,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verbal => "verbal",
            Self::Logical => "logical",
            Self::Creative => "creative",
            Self::Social => "social",
            Self::Leadership => "leadership",
            Self::Physical => "physical",
            Self::Artistic => "artistic",
            Self::Systematic => "systematic",
            Self::Inquisitive => "inquisitive",
            Self::ProblemSolving => "problem_solving",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|aptitude| aptitude.as_str() == value)
    }

    /// Human-facing dimension name used in reasons and summaries.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Verbal => "verbal ability",
            Self::Logical => "logic and analysis",
            Self::Creative => "creativity",
            Self::Social => "sociability and empathy",
            Self::Leadership => "initiative and leadership",
            Self::Physical => "physical activity",
            Self::Artistic => "artistic and spatial sense",
            Self::Systematic => "organization and attention to detail",
            Self::Inquisitive => "curiosity",
            Self::ProblemSolving => "problem solving",
        }
    }
}

impl Display for AptitudeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mean adjusted answer per aptitude type, in canonical order, on the 1–5 scale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct AptitudeVector([f64; APTITUDE_COUNT]);

impl AptitudeVector {
    #[must_use]
    pub fn new(values: [f64; APTITUDE_COUNT]) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn uniform(value: f64) -> Self {
        Self([value; APTITUDE_COUNT])
    }

    #[must_use]
    pub fn get(&self, aptitude: AptitudeType) -> f64 {
        self.0[aptitude.index()]
    }

    #[must_use]
    pub fn values(&self) -> &[f64; APTITUDE_COUNT] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (AptitudeType, f64)> + '_ {
        AptitudeType::ALL.into_iter().zip(self.0.iter().copied())
    }

    /// Dimensions sorted by score descending; equal scores keep canonical order.
    #[must_use]
    pub fn ranked(&self) -> Vec<(AptitudeType, f64)> {
        let mut ranked = self.iter().collect::<Vec<_>>();
        ranked.sort_by(|lhs, rhs| {
            rhs.1.partial_cmp(&lhs.1).unwrap_or(Ordering::Equal).then_with(|| lhs.0.cmp(&rhs.0))
        });
        ranked
    }

    #[must_use]
    pub fn spread(&self) -> f64 {
        let max = self.0.iter().copied().fold(f64::MIN, f64::max);
        let min = self.0.iter().copied().fold(f64::MAX, f64::min);
        max - min
    }
}
