//! CLI command definitions for quiz-forge.
//!
//! Each subcommand builds its collaborators (agent client, repositories,
//! coordination store) from one `AppConfig` and hands them to the library.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::jobs::{QuizCreationJob, ResultJobOutcome, ResultProcessingJob};
use crate::llm::{LiteLlmClient, StructuredAgent};
use crate::metrics;
use crate::quiz::{Blueprint, QuizCreationPipeline, QuizInput};
use crate::results::ResultProcessingPipeline;
use crate::session::{RedisStore, SessionControl};
use crate::storage::{ExamRepository, PgStore};

/// Exam platform core: quiz generation, result processing, session control.
#[derive(Parser)]
#[command(name = "quiz-forge")]
#[command(about = "Generate quizzes from documents and process exam results")]
#[command(version)]
#[command(
    long_about = "quiz-forge runs the exam platform's background pipelines and session primitives.\n\nConfiguration comes from environment variables (DATABASE_URL, REDIS_URL, LLM_API_KEY, ...).\n\nExample usage:\n  quiz-forge quiz create --quiz-id <uuid> --text-file notes.txt --blueprint '{\"count\":5,\"types\":[\"mcq\"]}'"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Print Prometheus metrics to stderr when the command finishes.
    #[arg(long, global = true)]
    pub emit_metrics: bool,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Quiz creation from extracted document text.
    Quiz {
        #[command(subcommand)]
        command: QuizSubcommand,
    },

    /// Result processing for submitted attempts.
    Result {
        #[command(subcommand)]
        command: ResultSubcommand,
    },

    /// Live exam session primitives.
    Session {
        #[command(subcommand)]
        command: SessionSubcommand,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum QuizSubcommand {
    /// Generate draft questions for a quiz.
    Create(QuizCreateArgs),
}

/// Arguments for `quiz-forge quiz create`.
#[derive(Parser, Debug)]
pub struct QuizCreateArgs {
    /// Quiz to attach the generated questions to.
    #[arg(long)]
    pub quiz_id: Uuid,

    /// File holding the extracted document text.
    #[arg(long)]
    pub text_file: PathBuf,

    /// Blueprint as inline JSON, or `@path` to read it from a file.
    #[arg(long)]
    pub blueprint: String,

    /// Optional professor note passed to the enhance step.
    #[arg(long)]
    pub note: Option<String>,

    /// Print the generated questions without touching the database.
    #[arg(long)]
    pub dry_run: bool,

    /// Override LLM_MODEL for this run.
    #[arg(short = 'm', long)]
    pub model: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
pub enum ResultSubcommand {
    /// Score an attempt and persist its result.
    Process(ResultProcessArgs),
}

/// Arguments for `quiz-forge result process`.
#[derive(Parser, Debug)]
pub struct ResultProcessArgs {
    #[arg(long)]
    pub attempt_id: Uuid,

    /// Skip comparing live violation counters with the persisted log.
    #[arg(long)]
    pub no_live_check: bool,

    /// Override LLM_MODEL for this run.
    #[arg(short = 'm', long)]
    pub model: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
pub enum SessionSubcommand {
    /// Lock the session and start the exam timer.
    Start {
        #[arg(long)]
        attempt_id: Uuid,
        /// Exam length in seconds (default: EXAM_DURATION_SECS).
        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// Show remaining time, liveness and violation counters.
    Status {
        #[arg(long)]
        attempt_id: Uuid,
    },

    /// Refresh the liveness marker.
    Heartbeat {
        #[arg(long)]
        attempt_id: Uuid,
    },

    /// Record a proctoring violation.
    Violation {
        #[arg(long)]
        attempt_id: Uuid,
        /// Violation type, e.g. tab_switch.
        #[arg(long = "type", value_parser = parse_violation_type)]
        violation_type: String,
        /// Only bump the live counter; do not append to the persisted log.
        #[arg(long)]
        no_persist: bool,
    },
}

/// Trims a violation type, rejecting blank input before anything is written.
fn parse_violation_type(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("violation type must not be empty".to_string());
    }
    Ok(trimmed.to_string())
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    metrics::init_metrics().context("Failed to register metrics")?;
    let config = AppConfig::from_env().context("Invalid configuration")?;

    let outcome = match cli.command {
        Commands::Quiz {
            command: QuizSubcommand::Create(args),
        } => run_quiz_create(&config, args).await,
        Commands::Result {
            command: ResultSubcommand::Process(args),
        } => run_result_process(&config, args).await,
        Commands::Session { command } => run_session_command(&config, command).await,
    };

    if cli.emit_metrics {
        eprintln!("{}", metrics::export_metrics());
    }
    outcome
}

// ============================================================================
// Quiz
// ============================================================================

async fn run_quiz_create(config: &AppConfig, args: QuizCreateArgs) -> anyhow::Result<()> {
    let extracted_text = read_text_file(&args.text_file)?;
    let blueprint = parse_blueprint(&args.blueprint)?;
    let agent = build_agent(config, args.model)?;
    let pipeline = QuizCreationPipeline::with_step_limit(agent, config.workflow_step_limit)?;

    let input = QuizInput {
        extracted_text,
        blueprint,
        professor_note: args.note,
    };

    if args.dry_run {
        let output = pipeline.run(input).await?;
        let json = serde_json::json!({
            "quiz_id": args.quiz_id,
            "summary": output.summary,
            "answer_key_applied": output.answer_key_applied,
            "questions": output.questions,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    let store = Arc::new(connect_database(config).await?);
    let job = QuizCreationJob::new(pipeline, store);
    let outcome = job.run(args.quiz_id, input).await?;

    let json = serde_json::json!({
        "quiz_id": args.quiz_id,
        "job_id": outcome.job_id,
        "section_id": outcome.section_id,
        "question_ids": outcome.question_ids,
        "answer_key_applied": outcome.output.answer_key_applied,
    });
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

/// Reads the extracted document text, rejecting empty files.
fn read_text_file(path: &Path) -> anyhow::Result<String> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read text file {}", path.display()))?;
    if text.trim().is_empty() {
        anyhow::bail!("Text file {} is empty", path.display());
    }
    Ok(text)
}

/// Parses a blueprint given inline or as `@path`.
fn parse_blueprint(arg: &str) -> anyhow::Result<Blueprint> {
    let raw = match arg.strip_prefix('@') {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read blueprint file {}", path))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&raw).context("Blueprint is not valid JSON")
}

// ============================================================================
// Result
// ============================================================================

async fn run_result_process(config: &AppConfig, args: ResultProcessArgs) -> anyhow::Result<()> {
    let agent = build_agent(config, args.model)?;
    let store = Arc::new(connect_database(config).await?);
    let repository: Arc<dyn ExamRepository> = store;

    let pipeline = ResultProcessingPipeline::with_step_limit(
        agent,
        repository.clone(),
        config.workflow_step_limit,
    )?;
    let mut job = ResultProcessingJob::new(pipeline, repository);

    if !args.no_live_check {
        match connect_session(config).await {
            Ok(session) => job = job.with_session(session),
            Err(e) => warn!(error = %e, "Redis unavailable, skipping live violation check"),
        }
    }

    let outcome = job.run(args.attempt_id).await?;
    let label = match &outcome {
        ResultJobOutcome::Processed(_) => "processed",
        ResultJobOutcome::AlreadyProcessed(_) => "already_processed",
    };
    let json = serde_json::json!({
        "outcome": label,
        "result": outcome.result(),
    });
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

// ============================================================================
// Session
// ============================================================================

async fn run_session_command(config: &AppConfig, command: SessionSubcommand) -> anyhow::Result<()> {
    let session = connect_session(config).await?;

    match command {
        SessionSubcommand::Start {
            attempt_id,
            duration_secs,
        } => {
            let duration = duration_secs
                .map(Duration::from_secs)
                .unwrap_or(config.exam_duration);
            session.begin_attempt(attempt_id, duration).await?;
            println!(
                "{}",
                serde_json::json!({ "attempt_id": attempt_id, "duration_secs": duration.as_secs() })
            );
        }
        SessionSubcommand::Status { attempt_id } => {
            let remaining = session.remaining_time(attempt_id).await?;
            let alive = session.is_alive(attempt_id).await?;
            let violations = session.violation_counts(attempt_id).await?;
            let total: i64 = violations.values().sum();
            let json = serde_json::json!({
                "attempt_id": attempt_id,
                "remaining_secs": remaining.map(|d| d.as_secs()),
                "expired": remaining.is_none(),
                "alive": alive,
                "violations": violations,
                "violation_total": total,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        SessionSubcommand::Heartbeat { attempt_id } => {
            session.heartbeat(attempt_id).await?;
            info!(attempt_id = %attempt_id, "Heartbeat recorded");
        }
        SessionSubcommand::Violation {
            attempt_id,
            violation_type,
            no_persist,
        } => {
            // Persist first: the log is what the final result counts.
            if !no_persist {
                let store = connect_database(config).await?;
                store.record_violation(attempt_id, &violation_type).await?;
            }
            let count = session.record_violation(attempt_id, &violation_type).await?;
            println!(
                "{}",
                serde_json::json!({
                    "attempt_id": attempt_id,
                    "violation_type": violation_type,
                    "count": count,
                })
            );
        }
    }
    Ok(())
}

// ============================================================================
// Collaborators
// ============================================================================

fn build_agent(config: &AppConfig, model: Option<String>) -> anyhow::Result<StructuredAgent> {
    let mut agent_config = config.agent_config();
    if let Some(model) = model {
        agent_config.model = model;
    }

    if config.llm_api_key.is_none() {
        warn!("LLM_API_KEY not set; requests go out unauthenticated");
    }

    let client = LiteLlmClient::new(
        config.llm_api_base.clone(),
        config.llm_api_key.clone(),
        agent_config.model.clone(),
        config.agent_timeout,
    )
    .context("Failed to initialize LLM client")?;

    info!(model = %agent_config.model, "Using LLM endpoint {}", client.api_base());
    Ok(StructuredAgent::new(Arc::new(client), agent_config))
}

async fn connect_database(config: &AppConfig) -> anyhow::Result<PgStore> {
    let url = config.require_database_url()?;
    PgStore::connect(url)
        .await
        .context("Failed to connect to PostgreSQL")
}

async fn connect_session(config: &AppConfig) -> anyhow::Result<SessionControl> {
    let store = RedisStore::connect(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;
    Ok(SessionControl::new(Arc::new(store))
        .with_lock_ttl(config.session_lock_ttl)
        .with_heartbeat_ttl(config.heartbeat_ttl))
}
