use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::{Args as ClapArgs, Parser};
use major_match_api::{
    AptitudeQuestions, DeleteResult, MajorMatchApi, MigrateResult, QuestionDetail, QuestionList,
    QuestionStats, ResultResponse, SubmitRequest, API_CONTRACT_VERSION,
};
use major_match_core::{Catalog, QuizConfig, QuizError};
use major_match_store_sqlite::{ResultStats, SchemaStatus};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

const SERVICE_CONTRACT_VERSION: &str = "service.v1";
const OPENAPI_YAML: &str = include_str!("../../../openapi/openapi.yaml");

#[derive(Debug, Clone)]
struct ServiceState {
    api: Arc<MajorMatchApi>,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    #[serde(skip)]
    status: StatusCode,
    service_contract_version: &'static str,
    code: &'static str,
    error: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MigrateRequest {
    dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    questions: usize,
    departments: usize,
}

#[derive(Debug, Clone, ClapArgs)]
struct QuizArgs {
    /// Number of best-matching departments to report.
    #[arg(long, default_value_t = 3)]
    top_n: usize,
    /// Number of worst-matching departments to report.
    #[arg(long, default_value_t = 3)]
    worst_n: usize,
    /// Number of tag-related departments to suggest.
    #[arg(long, default_value_t = 3)]
    similar_n: usize,
    /// Days until a stored result expires.
    #[arg(long, default_value_t = 30, conflicts_with = "no_expiry")]
    ttl_days: u32,
    /// Keep results forever.
    #[arg(long)]
    no_expiry: bool,
}

impl QuizArgs {
    fn config(&self) -> QuizConfig {
        QuizConfig {
            top_n: self.top_n,
            worst_n: self.worst_n,
            similar_n: self.similar_n,
            result_ttl_days: (!self.no_expiry).then_some(self.ttl_days),
            ..QuizConfig::default()
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "major-match-service")]
#[command(about = "Local HTTP service for the major aptitude quiz")]
struct Args {
    #[arg(long, default_value = "./major_match.sqlite3")]
    db: PathBuf,
    /// Catalog JSON to use instead of the bundled one.
    #[arg(long)]
    catalog: Option<PathBuf>,
    #[arg(long, default_value = "127.0.0.1:4010")]
    bind: SocketAddr,
    /// Prefix for share links in result responses.
    #[arg(long, default_value = "")]
    share_base_url: String,
    /// Log filter used when `MAJOR_MATCH_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
    #[command(flatten)]
    quiz: QuizArgs,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        let (status, code) = match err.downcast_ref::<QuizError>() {
            Some(QuizError::Validation(_)) => (StatusCode::BAD_REQUEST, "validation_error"),
            Some(QuizError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            Some(QuizError::Conflict(_)) => (StatusCode::CONFLICT, "conflict"),
            Some(QuizError::StorageExhausted { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_exhausted")
            }
            Some(QuizError::Storage(_)) | None => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };
        if status.is_server_error() {
            error!(error = %format!("{err:#}"), "request failed");
        }
        ServiceError {
            status,
            service_contract_version: SERVICE_CONTRACT_VERSION,
            code,
            error: format!("{err:#}"),
        }
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        ServiceError {
            status: StatusCode::BAD_REQUEST,
            service_contract_version: SERVICE_CONTRACT_VERSION,
            code: "validation_error",
            error: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for ServiceError {
    fn from(rejection: PathRejection) -> Self {
        ServiceError {
            status: StatusCode::BAD_REQUEST,
            service_contract_version: SERVICE_CONTRACT_VERSION,
            code: "validation_error",
            error: rejection.body_text(),
        }
    }
}

fn envelope<T>(data: T) -> Json<ServiceEnvelope<T>>
where
    T: Serialize,
{
    Json(ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    })
}

type ServiceResult<T> = Result<Json<ServiceEnvelope<T>>, ServiceError>;

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/openapi", get(openapi))
        .route("/v1/questions", get(questions_list))
        .route("/v1/questions/:id", get(question_show))
        .route("/v1/questions/aptitude/:aptitude_type", get(questions_by_aptitude))
        .route("/v1/questions/stats/summary", get(questions_stats))
        .route("/v1/results", post(results_submit))
        .route("/v1/results/:id", get(results_show).delete(results_delete))
        .route("/v1/results/stats/summary", get(results_stats))
        .route("/v1/db/schema-version", post(db_schema_version))
        .route("/v1/db/migrate", post(db_migrate))
        .with_state(state)
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_env("MAJOR_MATCH_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let catalog = match &args.catalog {
        Some(path) => Catalog::load(path)?,
        None => Catalog::bundled()?,
    };
    let api = MajorMatchApi::new(args.db, Arc::new(catalog), args.quiz.config())?
        .with_share_base_url(args.share_base_url);
    let state = ServiceState { api: Arc::new(api) };

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    info!(bind = %args.bind, "major-match service listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health(State(state): State<ServiceState>) -> Json<ServiceEnvelope<HealthResponse>> {
    let catalog = state.api.catalog();
    envelope(HealthResponse {
        status: "ok",
        questions: catalog.questions.len(),
        departments: catalog.departments.len(),
    })
}

async fn openapi() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/yaml; charset=utf-8")], OPENAPI_YAML)
}

async fn questions_list(State(state): State<ServiceState>) -> Json<ServiceEnvelope<QuestionList>> {
    envelope(state.api.list_questions())
}

async fn question_show(
    State(state): State<ServiceState>,
    id: Result<Path<u32>, PathRejection>,
) -> ServiceResult<QuestionDetail> {
    let Path(id) = id?;
    Ok(envelope(state.api.get_question(id)?))
}

async fn questions_by_aptitude(
    State(state): State<ServiceState>,
    Path(aptitude_type): Path<String>,
) -> ServiceResult<AptitudeQuestions> {
    Ok(envelope(state.api.questions_by_aptitude(&aptitude_type)?))
}

async fn questions_stats(State(state): State<ServiceState>) -> Json<ServiceEnvelope<QuestionStats>> {
    envelope(state.api.question_stats())
}

async fn results_submit(
    State(state): State<ServiceState>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> ServiceResult<ResultResponse> {
    let Json(request) = payload?;
    Ok(envelope(state.api.submit(request)?))
}

async fn results_show(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> ServiceResult<ResultResponse> {
    Ok(envelope(state.api.get_result(&id, None)?))
}

async fn results_delete(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> ServiceResult<DeleteResult> {
    Ok(envelope(state.api.delete_result(&id)?))
}

async fn results_stats(State(state): State<ServiceState>) -> ServiceResult<ResultStats> {
    Ok(envelope(state.api.result_stats(None)?))
}

async fn db_schema_version(State(state): State<ServiceState>) -> ServiceResult<SchemaStatus> {
    Ok(envelope(state.api.schema_status()?))
}

async fn db_migrate(
    State(state): State<ServiceState>,
    payload: Result<Json<MigrateRequest>, JsonRejection>,
) -> ServiceResult<MigrateResult> {
    let Json(request) = payload?;
    Ok(envelope(state.api.migrate(request.dry_run)?))
}
