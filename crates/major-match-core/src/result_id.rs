use std::fmt::{Display, Formatter};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::QuizError;

pub const RESULT_ID_LENGTH: usize = 8;
pub const RESULT_ID_ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Short shareable identifier of a stored result, e.g. `k3m9x2a7`.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct ResultId(String);

impl ResultId {
    /// # Errors
    /// Returns [`QuizError::Validation`] unless `value` is exactly
    /// [`RESULT_ID_LENGTH`] characters from [`RESULT_ID_ALPHABET`].
    pub fn parse(value: &str) -> Result<Self, QuizError> {
        if Self::is_valid(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(QuizError::Validation(format!(
                "result id MUST be {RESULT_ID_LENGTH} characters of [a-z0-9] (found {value:?})"
            )))
        }
    }

    #[must_use]
    pub fn is_valid(value: &str) -> bool {
        value.len() == RESULT_ID_LENGTH && value.bytes().all(|byte| RESULT_ID_ALPHABET.contains(&byte))
    }

    /// Draw a fresh id from the thread-local CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    #[must_use]
    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let id = (0..RESULT_ID_LENGTH)
            .map(|_| char::from(RESULT_ID_ALPHABET[rng.gen_range(0..RESULT_ID_ALPHABET.len())]))
            .collect();
        Self(id)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ResultId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ResultId {
    type Error = QuizError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ResultId> for String {
    fn from(value: ResultId) -> Self {
        value.0
    }
}
