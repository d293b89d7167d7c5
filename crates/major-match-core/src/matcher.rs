use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::aptitude::{AptitudeType, AptitudeVector, APTITUDE_COUNT};
use crate::catalog::Department;

/// User scores live on the 1–5 Likert scale; department profiles on 1–10.
pub const USER_TO_DEPARTMENT_SCALE: f64 = 2.0;
pub const DEPARTMENT_SCALE_MIN: f64 = 1.0;
pub const DEPARTMENT_SCALE_MAX: f64 = 10.0;

const EXPLAINED_DIMENSIONS: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchResult {
    pub department: Department,
    pub distance: f64,
    pub match_percentage: u8,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mismatch_reason: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct DimensionGap {
    aptitude: AptitudeType,
    demand: f64,
    gap: f64,
}

impl DimensionGap {
    fn squared(self) -> f64 {
        self.gap * self.gap
    }
}

/// Largest possible distance between two vectors on the department scale.
#[must_use]
pub fn max_distance() -> f64 {
    let span = DEPARTMENT_SCALE_MAX - DEPARTMENT_SCALE_MIN;
    #[allow(clippy::cast_precision_loss)]
    let dimensions = APTITUDE_COUNT as f64;
    (dimensions * span * span).sqrt()
}

/// Map a distance onto `0..=100`, where `0.0` distance is `100`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn match_percentage(distance: f64) -> u8 {
    let percentage = ((1.0 - distance / max_distance()) * 100.0).round();
    percentage.clamp(0.0, 100.0) as u8
}

/// Rank every department by Euclidean distance to the projected user vector.
///
/// Ordering is ascending distance, then ascending department id.
#[must_use]
pub fn match_departments(user: &AptitudeVector, departments: &[Department]) -> Vec<MatchResult> {
    let mut results = departments
        .iter()
        .map(|department| {
            let gaps = dimension_gaps(user, department);
            let distance = gaps.iter().map(|gap| gap.squared()).sum::<f64>().sqrt();
            MatchResult {
                department: department.clone(),
                distance,
                match_percentage: match_percentage(distance),
                reason: match_reason(&department.name, &gaps),
                mismatch_reason: None,
            }
        })
        .collect::<Vec<_>>();

    results.sort_by(|lhs, rhs| {
        lhs.distance
            .total_cmp(&rhs.distance)
            .then_with(|| lhs.department.id.cmp(&rhs.department.id))
    });
    results
}

/// Describe the dimensions that pull a department furthest from the user.
#[must_use]
pub fn explain_mismatch(user: &AptitudeVector, department: &Department) -> String {
    let mut gaps = dimension_gaps(user, department);
    gaps.sort_by(|lhs, rhs| {
        rhs.squared()
            .partial_cmp(&lhs.squared())
            .unwrap_or(Ordering::Equal)
            .then_with(|| lhs.aptitude.cmp(&rhs.aptitude))
    });

    let phrases = gaps
        .iter()
        .take(EXPLAINED_DIMENSIONS)
        .map(|gap| {
            if gap.gap > 0.0 {
                format!("stronger {}", gap.aptitude.display_name())
            } else {
                format!("less {}", gap.aptitude.display_name())
            }
        })
        .collect::<Vec<_>>();

    format!("{} calls for {} than your answers suggest", department.name, phrases.join(" and "))
}

/// Split a ranked list into best matches and worst matches.
///
/// Worst matches never repeat a top entry and are returned worst-first.
#[must_use]
pub fn split_ranked(
    ranked: &[MatchResult],
    top_n: usize,
    worst_n: usize,
) -> (Vec<MatchResult>, Vec<MatchResult>) {
    let top_len = top_n.min(ranked.len());
    let worst_len = worst_n.min(ranked.len() - top_len);

    let top = ranked[..top_len].to_vec();
    let worst = ranked[ranked.len() - worst_len..].iter().rev().cloned().collect();
    (top, worst)
}

fn dimension_gaps(user: &AptitudeVector, department: &Department) -> Vec<DimensionGap> {
    user.iter()
        .map(|(aptitude, score)| {
            let demand = department.aptitude_scores[aptitude.index()];
            DimensionGap { aptitude, demand, gap: demand - score * USER_TO_DEPARTMENT_SCALE }
        })
        .collect()
}

fn match_reason(department_name: &str, gaps: &[DimensionGap]) -> String {
    let mut closest = gaps.to_vec();
    closest.sort_by(|lhs, rhs| {
        lhs.squared()
            .partial_cmp(&rhs.squared())
            .unwrap_or(Ordering::Equal)
            .then_with(|| rhs.demand.partial_cmp(&lhs.demand).unwrap_or(Ordering::Equal))
            .then_with(|| lhs.aptitude.cmp(&rhs.aptitude))
    });

    let names = closest
        .iter()
        .take(EXPLAINED_DIMENSIONS)
        .map(|gap| gap.aptitude.display_name())
        .collect::<Vec<_>>();

    format!("Your {} line up closely with what {department_name} looks for", names.join(" and "))
}
