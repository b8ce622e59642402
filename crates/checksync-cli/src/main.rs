mod plan;
mod registry;
mod settings;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use checksync_core::{Error as CoreError, SCHEMA_VERSION, redact_connection_string, validate_schema};
use checksync_introspect::{Adapter, IntrospectOptions, PostgresAdapter, annotate_schema};
use checksync_sql::PostgresGenerator;
use registry::{RunContext, RunOptions, RunPaths, init_run_logging, start_run, write_schema};
use settings::Settings;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error("settings error: {0}")]
    Settings(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unsupported engine: {0}")]
    UnsupportedEngine(String),
}

#[derive(Parser, Debug)]
#[command(name = "checksync", version, about = "Keep declared CHECK constraints in sync")]
struct Cli {
    /// Settings file (defaults to ./checksync.toml when present).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Snapshot the live schema, managed CHECK constraints included.
    Introspect(IntrospectArgs),
    /// Compute the CHECK diff and write the migration.
    Plan(plan::PlanArgs),
}

#[derive(Args, Debug)]
struct IntrospectArgs {
    /// Database connection string.
    #[arg(value_name = "CONNECTION_STRING")]
    conn: String,
    /// Output directory for runs.
    #[arg(long)]
    run_dir: Option<PathBuf>,
    /// Optional output path for schema.json.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Schema name(s) to include.
    #[arg(long, value_name = "SCHEMA")]
    schema: Vec<String>,
    /// Skip index introspection.
    #[arg(long, default_value_t = false)]
    no_indexes: bool,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Command::Introspect(args) => run_introspect(args, &settings).await,
        Command::Plan(args) => plan::run_plan(args, &settings).await,
    }
}

async fn run_introspect(args: IntrospectArgs, settings: &Settings) -> Result<(), CliError> {
    let engine = detect_engine(&args.conn)?;
    let mut options = IntrospectOptions::for_schemas(&settings.schemas(&args.schema));
    options.include_indexes = !args.no_indexes;

    let run_ctx = RunContext {
        command: "introspect",
        connection: Some(redact_connection_string(&args.conn)),
        options: RunOptions {
            schemas: options.schemas.clone(),
            out: args.out.clone(),
            ..RunOptions::default()
        },
        ..new_run_context(engine, settings.run_dir(args.run_dir))
    };
    let run_paths = begin_run(&run_ctx)?;
    let timer = Instant::now();

    let pool = connect(&args.conn).await?;
    let adapter = PostgresAdapter::new(pool);

    tracing::info!(event = "introspection_started");
    let mut schema = adapter.introspect(&options).await?;
    let checks = adapter.introspect_checks(&PostgresGenerator).await?;
    annotate_schema(&mut schema, &checks);
    validate_schema(&schema)?;
    tracing::info!(
        event = "introspection_finished",
        tables = schema.tables().count(),
        managed_checks = checks.values().map(|table| table.len()).sum::<usize>()
    );

    write_schema(&run_paths, &schema, args.out.as_deref())?;
    tracing::info!(event = "schema_written", path = %run_paths.schema_path.display());

    finish_run(timer);
    Ok(())
}

fn new_run_context(engine: &str, run_dir: PathBuf) -> RunContext {
    RunContext {
        run_id: Uuid::new_v4().to_string(),
        started_at: chrono::Utc::now(),
        command: "",
        engine: engine.to_string(),
        schema_version: SCHEMA_VERSION.to_string(),
        run_dir,
        options: RunOptions::default(),
        connection: None,
    }
}

/// Create the run directory and route logs into it.
fn begin_run(run_ctx: &RunContext) -> Result<RunPaths, CliError> {
    let run_paths = start_run(run_ctx)?;
    init_run_logging(&run_paths.logs_path)?;
    tracing::info!(
        event = "run_started",
        run_id = %run_ctx.run_id,
        command = run_ctx.command,
        engine = %run_ctx.engine,
        run_dir = %run_paths.root.display()
    );
    Ok(run_paths)
}

fn finish_run(timer: Instant) {
    let duration_ms = timer.elapsed().as_millis();
    tracing::info!(event = "run_finished", status = "success", duration_ms = duration_ms);
}

async fn connect(conn: &str) -> Result<PgPool, CliError> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect(conn)
        .await?;
    Ok(pool)
}

fn detect_engine(conn: &str) -> Result<&'static str, CliError> {
    if conn.starts_with("postgres://") || conn.starts_with("postgresql://") {
        Ok("postgres")
    } else {
        Err(CliError::UnsupportedEngine(
            redact_connection_string(conn).redacted,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_postgres_urls_only() {
        assert_eq!(detect_engine("postgresql://db/app").unwrap(), "postgres");
        let err = detect_engine("mysql://root:secret@db/app").unwrap_err();
        assert!(matches!(err, CliError::UnsupportedEngine(_)));
        assert!(!err.to_string().contains("secret"));
    }

    #[test]
    fn parses_plan_arguments() {
        let cli = Cli::try_parse_from([
            "checksync",
            "plan",
            "--from",
            "snapshot.json",
            "--manifest",
            "checks.toml",
            "--schema",
            "billing",
            "--schema",
            "public",
        ])
        .unwrap();

        let Command::Plan(args) = cli.command else {
            panic!("expected plan command");
        };
        assert_eq!(args.from, Some(PathBuf::from("snapshot.json")));
        assert_eq!(args.conn, None);
        assert_eq!(args.schema, vec!["billing", "public"]);
    }

    #[test]
    fn plan_needs_exactly_one_source() {
        assert!(Cli::try_parse_from(["checksync", "plan", "--manifest", "checks.toml"]).is_err());
        assert!(
            Cli::try_parse_from([
                "checksync",
                "plan",
                "postgres://db/app",
                "--from",
                "snapshot.json",
                "--manifest",
                "checks.toml",
            ])
            .is_err()
        );
    }
}
