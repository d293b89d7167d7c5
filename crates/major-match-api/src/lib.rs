use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use major_match_core::{
    aptitude_summary, share_message, share_url, AptitudeSummary, AptitudeType, Catalog, Composer,
    Question, QuizConfig, QuizError, ResultId, ResultStore, TestResult, APTITUDE_COUNT,
};
use major_match_store_sqlite::{ResultStats, SchemaStatus, SqliteResultStore};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::info;

pub const API_CONTRACT_VERSION: &str = "api.v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrateResult {
    pub dry_run: bool,
    pub current_version: i64,
    pub target_version: i64,
    pub would_apply_versions: Vec<i64>,
    pub inferred_from_legacy: bool,
    pub after_version: Option<i64>,
    pub up_to_date: Option<bool>,
}

/// Public view of a question. Reverse-scoring is never exposed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionView {
    pub id: u32,
    pub text: String,
    pub order: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionList {
    pub questions: Vec<QuestionView>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionDetail {
    pub id: u32,
    pub text: String,
    pub order: u8,
    pub aptitude_type: AptitudeType,
    pub aptitude_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AptitudeQuestions {
    pub aptitude_type: AptitudeType,
    pub aptitude_name: String,
    pub questions: Vec<QuestionView>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionStats {
    pub total_questions: usize,
    pub aptitude_types: Vec<AptitudeType>,
    pub aptitude_count: usize,
    pub questions_per_aptitude: usize,
    pub reverse_questions: usize,
}

/// Submission body. The creation time is always taken from the server clock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmitRequest {
    pub answers: Vec<Option<i64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultResponse {
    #[serde(flatten)]
    pub result: TestResult,
    pub url: String,
    pub share_message: String,
    pub aptitude_summary: AptitudeSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted_id: ResultId,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurgeResult {
    pub purged: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub as_of: OffsetDateTime,
}

/// Request/response surface over the catalog, the composer, and the result database.
///
/// Every call opens its own store, so a value can be shared freely across threads.
#[derive(Debug, Clone)]
pub struct MajorMatchApi {
    db_path: PathBuf,
    catalog: Arc<Catalog>,
    composer: Composer,
    share_base_url: String,
}

impl MajorMatchApi {
    /// # Errors
    /// Returns an error when `config` is invalid.
    pub fn new(db_path: PathBuf, catalog: Arc<Catalog>, config: QuizConfig) -> Result<Self> {
        Ok(Self { db_path, catalog, composer: Composer::new(config)?, share_base_url: String::new() })
    }

    /// Prefix for share links; the default yields site-relative `/result/{id}` paths.
    #[must_use]
    pub fn with_share_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.share_base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn config(&self) -> QuizConfig {
        self.composer.config()
    }

    fn open_store(&self) -> Result<SqliteResultStore> {
        SqliteResultStore::open(&self.db_path)
    }

    fn open_migrated_store(&self) -> Result<SqliteResultStore> {
        let mut store = self.open_store()?;
        store.migrate()?;
        Ok(store)
    }

    /// Inspect schema status without mutating data.
    ///
    /// # Errors
    /// Returns an error when the `SQLite` database cannot be opened or queried.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.open_store()?.schema_status()
    }

    /// Apply pending migrations, or return planned versions for dry-run mode.
    ///
    /// # Errors
    /// Returns an error when migration planning or execution fails.
    pub fn migrate(&self, dry_run: bool) -> Result<MigrateResult> {
        let mut store = self.open_store()?;
        let before = store.schema_status()?;
        if dry_run {
            return Ok(MigrateResult {
                dry_run: true,
                current_version: before.current_version,
                target_version: before.target_version,
                would_apply_versions: before.pending_versions,
                inferred_from_legacy: before.inferred_from_legacy,
                after_version: None,
                up_to_date: None,
            });
        }

        let planned_versions = before.pending_versions;
        store.migrate()?;
        let after = store.schema_status()?;
        Ok(MigrateResult {
            dry_run: false,
            current_version: before.current_version,
            target_version: before.target_version,
            would_apply_versions: planned_versions,
            inferred_from_legacy: before.inferred_from_legacy,
            after_version: Some(after.current_version),
            up_to_date: Some(after.pending_versions.is_empty()),
        })
    }

    #[must_use]
    pub fn list_questions(&self) -> QuestionList {
        let questions = self.catalog.questions_in_order().into_iter().map(question_view).collect::<Vec<_>>();
        QuestionList { total: questions.len(), questions }
    }

    /// # Errors
    /// Returns [`QuizError::NotFound`] when no question has `id`.
    pub fn get_question(&self, id: u32) -> Result<QuestionDetail> {
        let question = self
            .catalog
            .question(id)
            .ok_or_else(|| QuizError::NotFound(format!("question {id} not found")))?;
        Ok(QuestionDetail {
            id: question.id,
            text: question.text.clone(),
            order: question.order,
            aptitude_type: question.aptitude_type,
            aptitude_name: question.aptitude_type.display_name().to_string(),
        })
    }

    /// # Errors
    /// Returns [`QuizError::Validation`] for an unknown aptitude type name.
    pub fn questions_by_aptitude(&self, aptitude_type: &str) -> Result<AptitudeQuestions> {
        let aptitude = AptitudeType::parse(aptitude_type).ok_or_else(|| {
            QuizError::Validation(format!("unknown aptitude type: {aptitude_type}"))
        })?;
        let questions =
            self.catalog.questions_for(aptitude).into_iter().map(question_view).collect::<Vec<_>>();
        Ok(AptitudeQuestions {
            aptitude_type: aptitude,
            aptitude_name: aptitude.display_name().to_string(),
            count: questions.len(),
            questions,
        })
    }

    #[must_use]
    pub fn question_stats(&self) -> QuestionStats {
        let total_questions = self.catalog.questions.len();
        QuestionStats {
            total_questions,
            aptitude_types: AptitudeType::ALL.to_vec(),
            aptitude_count: APTITUDE_COUNT,
            questions_per_aptitude: total_questions / APTITUDE_COUNT,
            reverse_questions: self.catalog.questions.iter().filter(|question| question.is_reverse).count(),
        }
    }

    /// Score a submission, persist the composed result, and return it with share data.
    ///
    /// # Errors
    /// Returns [`QuizError::Validation`] for malformed answers,
    /// [`QuizError::StorageExhausted`] when no free id is found, or a storage error.
    pub fn submit(&self, request: SubmitRequest) -> Result<ResultResponse> {
        self.submit_at(request, OffsetDateTime::now_utc())
    }

    /// [`MajorMatchApi::submit`] with an explicit creation time.
    ///
    /// # Errors
    /// See [`MajorMatchApi::submit`].
    pub fn submit_at(&self, request: SubmitRequest, now: OffsetDateTime) -> Result<ResultResponse> {
        let mut store = self.open_migrated_store()?;
        let result = self.composer.compose(&request.answers, &self.catalog, &mut store, now)?;
        info!(
            result_id = %result.id,
            personality = %result.personality,
            top_department = result.top_departments.first().map(|entry| entry.department.name.as_str()),
            "quiz result submitted"
        );
        Ok(self.respond(result))
    }

    /// # Errors
    /// Returns [`QuizError::Validation`] for a malformed id and
    /// [`QuizError::NotFound`] when the result is absent or expired.
    pub fn get_result(&self, id: &str, as_of: Option<OffsetDateTime>) -> Result<ResultResponse> {
        let id = ResultId::parse(id)?;
        let store = self.open_migrated_store()?;
        let result = store.get(&id, as_of.unwrap_or_else(OffsetDateTime::now_utc))?;
        Ok(self.respond(result))
    }

    /// # Errors
    /// Returns [`QuizError::Validation`] for a malformed id and
    /// [`QuizError::NotFound`] when nothing is stored under it.
    pub fn delete_result(&self, id: &str) -> Result<DeleteResult> {
        let id = ResultId::parse(id)?;
        let mut store = self.open_migrated_store()?;
        store.delete(&id)?;
        info!(result_id = %id, "quiz result deleted");
        Ok(DeleteResult { message: format!("result {id} deleted"), deleted_id: id })
    }

    /// # Errors
    /// Returns an error when the result database cannot be queried.
    pub fn result_stats(&self, as_of: Option<OffsetDateTime>) -> Result<ResultStats> {
        self.open_migrated_store()?.stats(as_of.unwrap_or_else(OffsetDateTime::now_utc))
    }

    /// # Errors
    /// Returns an error when the purge statement fails.
    pub fn purge_expired(&self, as_of: Option<OffsetDateTime>) -> Result<PurgeResult> {
        let as_of = as_of.unwrap_or_else(OffsetDateTime::now_utc);
        let mut store = self.open_migrated_store()?;
        let purged = store.purge_expired(as_of)?;
        Ok(PurgeResult { purged, as_of })
    }

    fn respond(&self, result: TestResult) -> ResultResponse {
        ResultResponse {
            url: share_url(&self.share_base_url, &result.id),
            share_message: share_message(&result, &self.share_base_url),
            aptitude_summary: aptitude_summary(&result.scores),
            result,
        }
    }
}

fn question_view(question: &Question) -> QuestionView {
    QuestionView { id: question.id, text: question.text.clone(), order: question.order }
}
