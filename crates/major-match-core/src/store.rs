use std::collections::BTreeMap;

use time::OffsetDateTime;

use crate::composer::TestResult;
use crate::result_id::ResultId;
use crate::QuizError;

/// Keyed persistence of completed results.
pub trait ResultStore {
    /// # Errors
    /// Returns [`QuizError::Conflict`] when a result with the same id exists,
    /// or [`QuizError::Storage`] when the backend fails.
    fn put(&mut self, result: &TestResult) -> Result<(), QuizError>;

    /// Results whose `expires_at` is at or before `now` are reported absent.
    ///
    /// # Errors
    /// Returns [`QuizError::NotFound`] when the id is absent or expired, or
    /// [`QuizError::Storage`] when the backend fails.
    fn get(&self, id: &ResultId, now: OffsetDateTime) -> Result<TestResult, QuizError>;

    /// # Errors
    /// Returns [`QuizError::NotFound`] when the id is absent, or
    /// [`QuizError::Storage`] when the backend fails.
    fn delete(&mut self, id: &ResultId) -> Result<(), QuizError>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryResultStore {
    results: BTreeMap<ResultId, TestResult>,
}

impl MemoryResultStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl ResultStore for MemoryResultStore {
    fn put(&mut self, result: &TestResult) -> Result<(), QuizError> {
        if self.results.contains_key(&result.id) {
            return Err(QuizError::Conflict(format!("result {} already exists", result.id)));
        }
        self.results.insert(result.id.clone(), result.clone());
        Ok(())
    }

    fn get(&self, id: &ResultId, now: OffsetDateTime) -> Result<TestResult, QuizError> {
        self.results
            .get(id)
            .filter(|result| !result.is_expired(now))
            .cloned()
            .ok_or_else(|| QuizError::NotFound(format!("result {id} not found")))
    }

    fn delete(&mut self, id: &ResultId) -> Result<(), QuizError> {
        self.results
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| QuizError::NotFound(format!("result {id} not found")))
    }
}
