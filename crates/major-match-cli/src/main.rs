use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use major_match_api::{MajorMatchApi, SubmitRequest};
use major_match_core::{Catalog, QuizConfig, APTITUDE_COUNT};
use major_match_store_sqlite::SqliteResultStore;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::debug;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "mm")]
#[command(about = "MajorMatch CLI")]
struct Cli {
    #[arg(long, default_value = "./major_match.sqlite3", global = true)]
    db: PathBuf,

    /// Catalog JSON to use instead of the bundled one.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Increase log detail on stderr (repeatable).
    #[arg(short, long, action = ArgAction::Count, global = true, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    Questions {
        #[command(subcommand)]
        command: QuestionsCommand,
    },
    Quiz {
        #[command(subcommand)]
        command: QuizCommand,
    },
    Results {
        #[command(subcommand)]
        command: ResultsCommand,
    },
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
    IntegrityCheck,
    PurgeExpired(AsOfArgs),
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct AsOfArgs {
    /// RFC3339 UTC instant used instead of the current time.
    #[arg(long)]
    as_of: Option<String>,
}

#[derive(Debug, Subcommand)]
enum QuestionsCommand {
    List,
    Show(QuestionShowArgs),
    Aptitude(QuestionAptitudeArgs),
    Stats,
}

#[derive(Debug, Args)]
struct QuestionShowArgs {
    #[arg(long)]
    id: u32,
}

#[derive(Debug, Args)]
struct QuestionAptitudeArgs {
    #[arg(long = "type")]
    aptitude_type: String,
}

#[derive(Debug, Subcommand)]
enum QuizCommand {
    Submit(QuizSubmitArgs),
}

#[derive(Debug, Args)]
struct QuizSubmitArgs {
    /// Comma-separated answers in question order; an empty slot is a missing answer.
    #[arg(long)]
    answers: String,
    #[arg(long)]
    submitted_at: Option<String>,
    #[arg(long, default_value = "")]
    share_base_url: String,
    #[command(flatten)]
    quiz: QuizArgs,
}

#[derive(Debug, Args)]
struct QuizArgs {
    #[arg(long, default_value_t = 3)]
    top_n: usize,
    #[arg(long, default_value_t = 3)]
    worst_n: usize,
    #[arg(long, default_value_t = 3)]
    similar_n: usize,
    #[arg(long, default_value_t = 30, conflicts_with = "no_expiry")]
    ttl_days: u32,
    #[arg(long)]
    no_expiry: bool,
}

#[derive(Debug, Subcommand)]
enum ResultsCommand {
    Show(ResultShowArgs),
    Delete(ResultIdArgs),
    Stats(AsOfArgs),
}

#[derive(Debug, Args)]
struct ResultShowArgs {
    #[arg(long)]
    id: String,
    #[command(flatten)]
    at: AsOfArgs,
}

#[derive(Debug, Args)]
struct ResultIdArgs {
    #[arg(long)]
    id: String,
}

#[derive(Debug, Subcommand)]
enum CatalogCommand {
    Validate,
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

impl Cli {
    fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    fn load_catalog(&self) -> Result<Catalog> {
        let catalog = match &self.catalog {
            Some(path) => Catalog::load(path)?,
            None => Catalog::bundled()?,
        };
        Ok(catalog)
    }

    fn api(&self, config: QuizConfig) -> Result<MajorMatchApi> {
        MajorMatchApi::new(self.db.clone(), Arc::new(self.load_catalog()?), config)
    }
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn emit<T: serde::Serialize>(value: &T, what: &str) -> Result<()> {
    emit_json(serde_json::to_value(value).with_context(|| format!("failed to serialize {what}"))?)
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_env("MAJOR_MATCH_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level())?;
    debug!(db = %cli.db.display(), catalog = ?cli.catalog, "mm starting");
    match &cli.command {
        Command::Db { command } => run_db(&cli, command),
        Command::Questions { command } => run_questions(&cli, command),
        Command::Quiz { command } => run_quiz(&cli, command),
        Command::Results { command } => run_results(&cli, command),
        Command::Catalog { command } => run_catalog(&cli, command),
    }
}

fn run_db(cli: &Cli, command: &DbCommand) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => {
            let status = SqliteResultStore::open(&cli.db)?.schema_status()?;
            emit_json(serde_json::json!({
                "current_version": status.current_version,
                "target_version": status.target_version,
                "pending_versions": status.pending_versions,
                "up_to_date": status.pending_versions.is_empty(),
                "inferred_from_legacy": status.inferred_from_legacy
            }))
        }
        DbCommand::Migrate(args) => {
            let result = cli.api(QuizConfig::default())?.migrate(args.dry_run)?;
            emit(&result, "migration result")
        }
        DbCommand::IntegrityCheck => {
            let report = SqliteResultStore::open(&cli.db)?.integrity_check()?;
            emit(&report, "integrity report")
        }
        DbCommand::PurgeExpired(args) => {
            let as_of = parse_optional_rfc3339(args.as_of.as_deref())?;
            let purged = cli.api(QuizConfig::default())?.purge_expired(as_of)?;
            emit(&purged, "purge result")
        }
    }
}

fn run_questions(cli: &Cli, command: &QuestionsCommand) -> Result<()> {
    let api = cli.api(QuizConfig::default())?;
    match command {
        QuestionsCommand::List => emit(&api.list_questions(), "question list"),
        QuestionsCommand::Show(args) => emit(&api.get_question(args.id)?, "question"),
        QuestionsCommand::Aptitude(args) => {
            emit(&api.questions_by_aptitude(&args.aptitude_type)?, "aptitude questions")
        }
        QuestionsCommand::Stats => emit(&api.question_stats(), "question stats"),
    }
}

fn run_quiz(cli: &Cli, command: &QuizCommand) -> Result<()> {
    match command {
        QuizCommand::Submit(args) => {
            let api = cli.api(args.quiz.config())?.with_share_base_url(args.share_base_url.clone());
            let request = SubmitRequest { answers: parse_answers(&args.answers)? };
            let response = match parse_optional_rfc3339(args.submitted_at.as_deref())? {
                Some(submitted_at) => api.submit_at(request, submitted_at)?,
                None => api.submit(request)?,
            };
            emit(&response, "quiz result")
        }
    }
}

fn run_results(cli: &Cli, command: &ResultsCommand) -> Result<()> {
    let api = cli.api(QuizConfig::default())?;
    match command {
        ResultsCommand::Show(args) => {
            let as_of = parse_optional_rfc3339(args.at.as_of.as_deref())?;
            emit(&api.get_result(&args.id, as_of)?, "quiz result")
        }
        ResultsCommand::Delete(args) => emit(&api.delete_result(&args.id)?, "delete result"),
        ResultsCommand::Stats(args) => {
            let as_of = parse_optional_rfc3339(args.as_of.as_deref())?;
            emit(&api.result_stats(as_of)?, "result stats")
        }
    }
}

fn run_catalog(cli: &Cli, command: &CatalogCommand) -> Result<()> {
    match command {
        CatalogCommand::Validate => {
            let catalog = cli.load_catalog()?;
            let source = cli
                .catalog
                .as_ref()
                .map_or_else(|| "bundled".to_string(), |path| path.display().to_string());
            emit_json(serde_json::json!({
                "source": source,
                "valid": true,
                "questions": catalog.questions.len(),
                "departments": catalog.departments.len(),
                "aptitude_count": APTITUDE_COUNT
            }))
        }
    }
}

fn parse_answers(raw: &str) -> Result<Vec<Option<i64>>> {
    raw.split(',')
        .map(str::trim)
        .enumerate()
        .map(|(index, value)| {
            if value.is_empty() {
                return Ok(None);
            }
            value
                .parse::<i64>()
                .map(Some)
                .with_context(|| format!("invalid answer at position {}: {value}", index + 1))
        })
        .collect()
}

fn parse_optional_rfc3339(value: Option<&str>) -> Result<Option<OffsetDateTime>> {
    value.map(parse_rfc3339).transpose()
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .with_context(|| format!("invalid RFC3339 UTC timestamp: {value}"))?;

    if parsed.offset() != time::UtcOffset::UTC {
        return Err(anyhow!("timestamp MUST use UTC offset Z (received: {value})"));
    }

    Ok(parsed)
}
