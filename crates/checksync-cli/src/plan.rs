use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use checksync_core::{
    CheckManifest, DatabaseSchema, SchemaComparisonContext, redact_connection_string,
    validate_declared_checks, validate_manifest_tables, validate_schema,
};
use checksync_diff::{compare_schemas, render_schema_diff, to_migration_sql};
use checksync_introspect::{
    Adapter, IntrospectOptions, PostgresAdapter, annotate_schema, checks_from_schema,
};
use checksync_sql::PostgresGenerator;

use crate::registry::{RunContext, RunOptions, write_diff, write_migration};
use crate::settings::Settings;
use crate::{CliError, begin_run, connect, detect_engine, finish_run, new_run_context};

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Database connection string of the database to migrate.
    #[arg(
        value_name = "CONNECTION_STRING",
        required_unless_present = "from",
        conflicts_with = "from"
    )]
    pub conn: Option<String>,
    /// Offline mode: read the current schema and its checks from a snapshot.
    #[arg(long, value_name = "SNAPSHOT")]
    pub from: Option<PathBuf>,
    /// Declared CHECK constraints (TOML).
    #[arg(long, value_name = "PATH")]
    pub manifest: PathBuf,
    /// Target schema snapshot. Defaults to the current schema (checks only).
    #[arg(long, value_name = "PATH")]
    pub target: Option<PathBuf>,
    /// Schema name(s) to include.
    #[arg(long, value_name = "SCHEMA")]
    pub schema: Vec<String>,
    /// Optional output path for migration.sql.
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Output directory for runs.
    #[arg(long)]
    pub run_dir: Option<PathBuf>,
}

pub async fn run_plan(args: PlanArgs, settings: &Settings) -> Result<(), CliError> {
    let engine = match &args.conn {
        Some(conn) => detect_engine(conn)?,
        None => "postgres",
    };
    let schemas = settings.schemas(&args.schema);

    let run_ctx = RunContext {
        command: "plan",
        connection: args.conn.as_deref().map(redact_connection_string),
        options: RunOptions {
            schemas: (!schemas.is_empty()).then(|| schemas.clone()),
            manifest: Some(args.manifest.clone()),
            target: args.target.clone(),
            from: args.from.clone(),
            out: args.out.clone(),
        },
        ..new_run_context(engine, settings.run_dir(args.run_dir.clone()))
    };
    let run_paths = begin_run(&run_ctx)?;
    let timer = Instant::now();

    let manifest = CheckManifest::load(&args.manifest)?;
    tracing::info!(
        event = "manifest_loaded",
        tables = manifest.tables().count(),
        checks = manifest.spec_count()
    );

    let current = match (&args.conn, &args.from) {
        (Some(conn), _) => introspect_current(conn, &schemas).await?,
        (None, Some(path)) => read_snapshot(path, &schemas)?,
        (None, None) => {
            return Err(CliError::InvalidConfig(
                "a connection string or --from snapshot is required".to_string(),
            ));
        }
    };
    let target = match &args.target {
        Some(path) => read_snapshot(path, &schemas)?,
        None => current.clone(),
    };
    validate_schema(&target)?;
    validate_manifest_tables(&target, &manifest)?;

    let mut ctx = SchemaComparisonContext::new();
    ctx.collect_declared(&target, &manifest)?;
    validate_declared_checks(&target, &ctx)?;
    ctx.register_introspected_expressions(checks_from_schema(&current))?;

    let diff = compare_schemas(&ctx, &current, &target, &PostgresGenerator)?;
    write_diff(&run_paths, &diff)?;
    tracing::info!(
        event = "diff_computed",
        tables = diff.table_diffs.len(),
        changes = diff.change_count()
    );

    let statements = render_schema_diff(&ctx, &diff, &PostgresGenerator)?;
    if statements.is_empty() {
        tracing::info!(event = "diff_empty", "schema already matches; no migration written");
    } else {
        let sql = to_migration_sql(&statements);
        write_migration(&run_paths, &sql, args.out.as_deref())?;
        tracing::info!(
            event = "migration_written",
            statements = statements.len(),
            path = %run_paths.migration_path.display()
        );
    }

    finish_run(timer);
    Ok(())
}

async fn introspect_current(conn: &str, schemas: &[String]) -> Result<DatabaseSchema, CliError> {
    let adapter = PostgresAdapter::new(connect(conn).await?);
    let mut schema = adapter
        .introspect(&IntrospectOptions::for_schemas(schemas))
        .await?;
    let checks = adapter.introspect_checks(&PostgresGenerator).await?;
    annotate_schema(&mut schema, &checks);
    Ok(schema)
}

/// Load a schema snapshot, keeping only `schemas` when any are named.
fn read_snapshot(path: &Path, schemas: &[String]) -> Result<DatabaseSchema, CliError> {
    let content = std::fs::read_to_string(path).map_err(|err| {
        CliError::InvalidConfig(format!("reading snapshot {}: {err}", path.display()))
    })?;
    let mut snapshot: DatabaseSchema = serde_json::from_str(&content)?;
    if !schemas.is_empty() {
        snapshot
            .schemas
            .retain(|schema| schemas.contains(&schema.name));
    }
    tracing::debug!(
        event = "snapshot_loaded",
        path = %path.display(),
        schemas = snapshot.schemas.len()
    );
    Ok(snapshot)
}
