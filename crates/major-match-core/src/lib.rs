//! Scoring and matching pipeline for the major aptitude quiz.
//!
//! Raw Likert answers flow through [`score`] into an [`AptitudeVector`], which
//! [`match_departments`] ranks against the department catalog. [`Composer`]
//! assembles the ranked matches into a shareable [`TestResult`] and persists it
//! through a [`ResultStore`].

mod aptitude;
mod catalog;
mod composer;
mod matcher;
mod personality;
mod result_id;
mod scorer;
mod store;

use serde::{Deserialize, Serialize};

pub use aptitude::{AptitudeType, AptitudeVector, APTITUDE_COUNT};
pub use catalog::{Catalog, Department, Question, QUESTIONS_PER_APTITUDE, QUESTION_COUNT};
pub use composer::{
    share_message, share_url, similar_departments, Composer, ResultSummary, SimilarDepartment,
    TestResult,
};
pub use matcher::{
    explain_mismatch, match_departments, match_percentage, max_distance, split_ranked,
    MatchResult, DEPARTMENT_SCALE_MAX, DEPARTMENT_SCALE_MIN, USER_TO_DEPARTMENT_SCALE,
};
pub use personality::{classify_personality, PersonalityLabel};
pub use result_id::{ResultId, RESULT_ID_ALPHABET, RESULT_ID_LENGTH};
pub use scorer::{
    adjust_answer, aptitude_summary, interest_tags, score, validate_answers, AptitudeScore,
    AptitudeSummary, ANSWER_MAX, ANSWER_MIN,
};
pub use store::{MemoryResultStore, ResultStore};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum QuizError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage exhausted: no free result id after {attempts} attempts")]
    StorageExhausted { attempts: u32 },
    #[error("storage error: {0}")]
    Storage(String),
}

/// Tunables for result composition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct QuizConfig {
    pub top_n: usize,
    pub worst_n: usize,
    pub similar_n: usize,
    pub max_id_attempts: u32,
    /// `None` keeps results forever.
    pub result_ttl_days: Option<u32>,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self { top_n: 3, worst_n: 3, similar_n: 3, max_id_attempts: 5, result_ttl_days: Some(30) }
    }
}

impl QuizConfig {
    /// Reject configurations that cannot produce a meaningful result.
    ///
    /// # Errors
    /// Returns [`QuizError::Validation`] when `top_n` or `max_id_attempts` is zero.
    pub fn validate(&self) -> Result<(), QuizError> {
        if self.top_n == 0 {
            return Err(QuizError::Validation("top_n MUST be >= 1".to_string()));
        }
        if self.max_id_attempts == 0 {
            return Err(QuizError::Validation("max_id_attempts MUST be >= 1".to_string()));
        }
        Ok(())
    }
}
