use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::aptitude::{AptitudeType, AptitudeVector};
use crate::catalog::{Catalog, Department};
use crate::matcher::{explain_mismatch, match_departments, split_ranked, MatchResult};
use crate::personality::{classify_personality, PersonalityLabel};
use crate::result_id::ResultId;
use crate::scorer::{interest_tags, score, validate_answers};
use crate::store::ResultStore;
use crate::{QuizConfig, QuizError};

/// Dimensions at or above this mean score are reported as strengths.
const STRENGTH_THRESHOLD: f64 = 4.0;
const SUMMARY_ITEMS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarDepartment {
    pub department: Department,
    pub match_percentage: u8,
    pub common_tags: Vec<String>,
    pub tag_match_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ResultSummary {
    pub personality: String,
    pub strength: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestResult {
    pub id: ResultId,
    pub answers: Vec<u8>,
    pub scores: AptitudeVector,
    pub interest_tags: Vec<String>,
    pub personality: PersonalityLabel,
    pub summary: ResultSummary,
    pub top_departments: Vec<MatchResult>,
    pub worst_departments: Vec<MatchResult>,
    pub similar_departments: Vec<SimilarDepartment>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

impl TestResult {
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Turns a submitted answer set into a stored, shareable result.
#[derive(Debug, Clone, Copy, Default)]
pub struct Composer {
    config: QuizConfig,
}

impl Composer {
    /// # Errors
    /// Returns [`QuizError::Validation`] when `config` is unusable.
    pub fn new(config: QuizConfig) -> Result<Self, QuizError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> QuizConfig {
        self.config
    }

    /// Score, match, summarise and persist one submission under a fresh id.
    ///
    /// # Errors
    /// Returns [`QuizError::Validation`] for a malformed answer set (nothing is
    /// stored), [`QuizError::StorageExhausted`] when every id attempt
    /// collided, or the store's error for any other write failure.
    pub fn compose<S>(
        &self,
        raw_answers: &[Option<i64>],
        catalog: &Catalog,
        store: &mut S,
        now: OffsetDateTime,
    ) -> Result<TestResult, QuizError>
    where
        S: ResultStore + ?Sized,
    {
        self.compose_with_ids(raw_answers, catalog, store, now, ResultId::generate)
    }

    /// [`Composer::compose`] with a caller-supplied id source.
    ///
    /// # Errors
    /// See [`Composer::compose`].
    pub fn compose_with_ids<S, F>(
        &self,
        raw_answers: &[Option<i64>],
        catalog: &Catalog,
        store: &mut S,
        now: OffsetDateTime,
        mut next_id: F,
    ) -> Result<TestResult, QuizError>
    where
        S: ResultStore + ?Sized,
        F: FnMut() -> ResultId,
    {
        let answers = validate_answers(raw_answers)?;
        let mut result = self.evaluate(&answers, catalog, next_id(), now)?;

        for attempt in 1..=self.config.max_id_attempts {
            if attempt > 1 {
                result.id = next_id();
            }
            match store.put(&result) {
                Ok(()) => {
                    debug!(result_id = %result.id, attempt, "stored quiz result");
                    return Ok(result);
                }
                Err(QuizError::Conflict(_)) => {
                    warn!(result_id = %result.id, attempt, "result id collision, regenerating");
                }
                Err(err) => return Err(err),
            }
        }

        Err(QuizError::StorageExhausted { attempts: self.config.max_id_attempts })
    }

    /// Build a result for already validated answers without storing it.
    ///
    /// # Errors
    /// Returns [`QuizError::Validation`] when the answers or the catalog's
    /// question set cannot be scored.
    pub fn evaluate(
        &self,
        answers: &[u8],
        catalog: &Catalog,
        id: ResultId,
        now: OffsetDateTime,
    ) -> Result<TestResult, QuizError> {
        let scores = score(answers, &catalog.questions)?;
        let tags = interest_tags(answers, &catalog.questions);

        let ranked = match_departments(&scores, &catalog.departments);
        let (top_departments, mut worst_departments) =
            split_ranked(&ranked, self.config.top_n, self.config.worst_n);
        for entry in &mut worst_departments {
            entry.mismatch_reason = Some(explain_mismatch(&scores, &entry.department));
        }

        let excluded = top_departments
            .iter()
            .chain(&worst_departments)
            .map(|entry| entry.department.id)
            .collect::<BTreeSet<_>>();
        let similar = top_departments.first().map_or_else(Vec::new, |anchor| {
            similar_departments(&anchor.department, &ranked, &excluded, self.config.similar_n)
        });

        let personality = classify_personality(&scores);
        let summary = ResultSummary {
            personality: personality.sentence().to_string(),
            strength: strength_sentence(&scores),
            interest: interest_sentence(&tags),
        };

        Ok(TestResult {
            id,
            answers: answers.to_vec(),
            scores,
            interest_tags: tags,
            personality,
            summary,
            top_departments,
            worst_departments,
            similar_departments: similar,
            created_at: now,
            expires_at: self
                .config
                .result_ttl_days
                .map(|days| now + Duration::days(i64::from(days))),
        })
    }
}

/// Departments sharing tags with `anchor`, most shared tags first.
///
/// Candidates are drawn from `ranked`, skipping `anchor` itself and every id in
/// `excluded`. Ties fall back to match percentage, then department id.
#[must_use]
pub fn similar_departments(
    anchor: &Department,
    ranked: &[MatchResult],
    excluded: &BTreeSet<u32>,
    limit: usize,
) -> Vec<SimilarDepartment> {
    let anchor_tags = anchor.tags.iter().map(String::as_str).collect::<BTreeSet<_>>();

    let mut similar = ranked
        .iter()
        .filter(|entry| entry.department.id != anchor.id && !excluded.contains(&entry.department.id))
        .filter_map(|entry| {
            let mut seen = BTreeSet::new();
            let common_tags = entry
                .department
                .tags
                .iter()
                .filter(|tag| anchor_tags.contains(tag.as_str()) && seen.insert(tag.as_str()))
                .cloned()
                .collect::<Vec<_>>();
            (!common_tags.is_empty()).then(|| SimilarDepartment {
                department: entry.department.clone(),
                match_percentage: entry.match_percentage,
                tag_match_count: common_tags.len(),
                common_tags,
            })
        })
        .collect::<Vec<_>>();

    similar.sort_by(|lhs, rhs| {
        rhs.tag_match_count
            .cmp(&lhs.tag_match_count)
            .then_with(|| rhs.match_percentage.cmp(&lhs.match_percentage))
            .then_with(|| lhs.department.id.cmp(&rhs.department.id))
    });
    similar.truncate(limit);
    similar
}

/// Public link to a stored result.
#[must_use]
pub fn share_url(base_url: &str, id: &ResultId) -> String {
    format!("{}/result/{id}", base_url.trim_end_matches('/'))
}

#[must_use]
pub fn share_message(result: &TestResult, base_url: &str) -> String {
    let headline = result.top_departments.first().map_or_else(
        || "check out my result".to_string(),
        |top| format!("{} is a {}% match", top.department.name, top.match_percentage),
    );
    format!(
        "My major aptitude test result\nFor me, {headline}!\n{}",
        share_url(base_url, &result.id)
    )
}

fn strength_sentence(scores: &AptitudeVector) -> String {
    let strong = AptitudeType::ALL
        .into_iter()
        .filter(|aptitude| scores.get(*aptitude) >= STRENGTH_THRESHOLD)
        .take(SUMMARY_ITEMS)
        .map(AptitudeType::display_name)
        .collect::<Vec<_>>();

    match strong.len() {
        0 => "Your aptitudes are well balanced overall.".to_string(),
        1 => format!("Your {} stands out in particular.", strong[0]),
        _ => format!("Your {} stand out in particular.", join_natural(&strong)),
    }
}

fn interest_sentence(tags: &[String]) -> Option<String> {
    if tags.is_empty() {
        return None;
    }
    let tags = tags.iter().take(SUMMARY_ITEMS).map(String::as_str).collect::<Vec<_>>();
    Some(format!("You seem interested in {}!", join_natural(&tags)))
}

fn join_natural(items: &[&str]) -> String {
    match items {
        [] => String::new(),
        [only] => (*only).to_string(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}
