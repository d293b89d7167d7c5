use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::aptitude::{AptitudeType, APTITUDE_COUNT};
use crate::matcher::{DEPARTMENT_SCALE_MAX, DEPARTMENT_SCALE_MIN};
use crate::QuizError;

pub const QUESTION_COUNT: usize = 20;
pub const QUESTIONS_PER_APTITUDE: usize = 2;

const BUNDLED_CATALOG_JSON: &str = include_str!("../../../data/catalog.json");

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Question {
    pub id: u32,
    pub text: String,
    pub aptitude_type: AptitudeType,
    pub is_reverse: bool,
    pub order: u8,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Department {
    pub id: u32,
    pub name: String,
    pub aptitude_scores: [f64; APTITUDE_COUNT],
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Read-only reference data: the question set and the department catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    pub questions: Vec<Question>,
    pub departments: Vec<Department>,
}

impl Catalog {
    /// The catalog shipped with the crate.
    ///
    /// # Errors
    /// Returns [`QuizError::Validation`] if the bundled data fails validation.
    pub fn bundled() -> Result<Self, QuizError> {
        Self::from_json_str(BUNDLED_CATALOG_JSON)
    }

    /// # Errors
    /// Returns [`QuizError::Validation`] when the JSON is malformed or violates
    /// catalog invariants.
    pub fn from_json_str(raw: &str) -> Result<Self, QuizError> {
        let catalog: Self = serde_json::from_str(raw)
            .map_err(|err| QuizError::Validation(format!("catalog JSON is invalid: {err}")))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// # Errors
    /// Returns [`QuizError::Storage`] when the file cannot be read, or
    /// [`QuizError::Validation`] when its content is invalid.
    pub fn load(path: &Path) -> Result<Self, QuizError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            QuizError::Storage(format!("failed to read catalog {}: {err}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// Check the dataset design invariants the scorer and matcher rely on.
    ///
    /// # Errors
    /// Returns [`QuizError::Validation`] describing the first violated invariant.
    pub fn validate(&self) -> Result<(), QuizError> {
        validate_questions(&self.questions)?;
        validate_departments(&self.departments)
    }

    /// Questions sorted by their `order`.
    #[must_use]
    pub fn questions_in_order(&self) -> Vec<&Question> {
        let mut questions = self.questions.iter().collect::<Vec<_>>();
        questions.sort_by_key(|question| question.order);
        questions
    }

    #[must_use]
    pub fn question(&self, id: u32) -> Option<&Question> {
        self.questions.iter().find(|question| question.id == id)
    }

    #[must_use]
    pub fn questions_for(&self, aptitude: AptitudeType) -> Vec<&Question> {
        self.questions_in_order()
            .into_iter()
            .filter(|question| question.aptitude_type == aptitude)
            .collect()
    }

    #[must_use]
    pub fn department(&self, id: u32) -> Option<&Department> {
        self.departments.iter().find(|department| department.id == id)
    }
}

fn validate_questions(questions: &[Question]) -> Result<(), QuizError> {
    if questions.len() != QUESTION_COUNT {
        return Err(QuizError::Validation(format!(
            "question set MUST contain {QUESTION_COUNT} questions (found {})",
            questions.len()
        )));
    }

    let mut ids = BTreeSet::new();
    let mut orders = BTreeSet::new();
    let mut per_type: BTreeMap<AptitudeType, usize> = BTreeMap::new();
    for question in questions {
        if !ids.insert(question.id) {
            return Err(QuizError::Validation(format!("duplicate question id {}", question.id)));
        }
        if !orders.insert(question.order) {
            return Err(QuizError::Validation(format!(
                "duplicate question order {}",
                question.order
            )));
        }
        if question.order == 0 || usize::from(question.order) > QUESTION_COUNT {
            return Err(QuizError::Validation(format!(
                "question order MUST be in 1..={QUESTION_COUNT} (found {})",
                question.order
            )));
        }
        if question.text.trim().is_empty() {
            return Err(QuizError::Validation(format!(
                "question {} MUST have non-empty text",
                question.id
            )));
        }
        *per_type.entry(question.aptitude_type).or_default() += 1;
    }

    for aptitude in AptitudeType::ALL {
        let count = per_type.get(&aptitude).copied().unwrap_or_default();
        if count != QUESTIONS_PER_APTITUDE {
            return Err(QuizError::Validation(format!(
                "aptitude {aptitude} MUST have {QUESTIONS_PER_APTITUDE} questions (found {count})"
            )));
        }
    }

    Ok(())
}

fn validate_departments(departments: &[Department]) -> Result<(), QuizError> {
    if departments.is_empty() {
        return Err(QuizError::Validation("department catalog MUST NOT be empty".to_string()));
    }

    let mut ids = BTreeSet::new();
    let mut names = BTreeSet::new();
    for department in departments {
        if !ids.insert(department.id) {
            return Err(QuizError::Validation(format!(
                "duplicate department id {}",
                department.id
            )));
        }
        let name = department.name.trim();
        if name.is_empty() {
            return Err(QuizError::Validation(format!(
                "department {} MUST have a name",
                department.id
            )));
        }
        if !names.insert(name.to_string()) {
            return Err(QuizError::Validation(format!("duplicate department name {name}")));
        }
        for score in department.aptitude_scores {
            if !(DEPARTMENT_SCALE_MIN..=DEPARTMENT_SCALE_MAX).contains(&score) {
                return Err(QuizError::Validation(format!(
                    "department {name} score {score} is outside \
                     [{DEPARTMENT_SCALE_MIN}, {DEPARTMENT_SCALE_MAX}]"
                )));
            }
        }
    }

    Ok(())
}
