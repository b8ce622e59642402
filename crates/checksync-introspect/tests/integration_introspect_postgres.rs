use anyhow::{Context, Result, anyhow};
use checksync_core::{CheckSpec, ChecksByTable, SchemaComparisonContext, TableRef};
use checksync_diff::{compare_schemas, render_schema_diff, to_migration_sql};
use checksync_introspect::{
    Adapter, IntrospectOptions, PostgresAdapter, annotate_schema, checks_from_schema,
};
use checksync_sql::PostgresGenerator;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{env, fs, path::Path};

const SCHEMA: &str = "checksync_it";

fn database_url() -> Option<String> {
    env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .ok()
}

async fn connect() -> Result<Option<PgPool>> {
    let Some(db_url) = database_url() else {
        eprintln!("TEST_DATABASE_URL/DATABASE_URL not set; skipping Postgres integration test");
        return Ok(None);
    };
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(std::time::Duration::from_secs(10))
        .connect(&db_url)
        .await
        .context("connecting to Postgres")?;
    Ok(Some(pool))
}

async fn reset_fixture(pool: &PgPool) -> Result<()> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/checks.sql");
    let script = fs::read_to_string(&path)
        .with_context(|| format!("reading fixture {}", path.display()))?;

    for statement in script.split(';') {
        let sql = statement.trim();
        if sql.is_empty() {
            continue;
        }
        sqlx::query(sql)
            .execute(pool)
            .await
            .with_context(|| format!("executing fixture statement: {sql}"))?;
    }
    Ok(())
}

fn invoice() -> TableRef {
    TableRef::new(SCHEMA, "invoice")
}

fn declared() -> Result<Vec<CheckSpec>> {
    Ok(vec![
        CheckSpec::enumeration("CHK_INVOICE_STATUS", "status", ["DRAFT", "ISSUED", "PAID"])?,
        CheckSpec::soft_xor("CHK_INVOICE_PARTY", ["customer_id", "supplier_id"])?,
    ])
}

/// Introspected checks restricted to the fixture schema.
async fn fixture_checks(adapter: &PostgresAdapter) -> Result<ChecksByTable> {
    let checks = adapter.introspect_checks(&PostgresGenerator).await?;
    Ok(checks
        .into_iter()
        .filter(|(table, _)| table.schema == SCHEMA)
        .collect())
}

async fn plan(adapter: &PostgresAdapter) -> Result<String> {
    let mut current = adapter
        .introspect(&IntrospectOptions::for_schemas(&[SCHEMA.to_string()]))
        .await?;
    let checks = fixture_checks(adapter).await?;
    annotate_schema(&mut current, &checks);

    let mut ctx = SchemaComparisonContext::new();
    for spec in declared()? {
        ctx.append_declared_spec(&invoice(), spec)?;
    }
    ctx.register_introspected_expressions(checks_from_schema(&current))?;

    let diff = compare_schemas(&ctx, &current, &current, &PostgresGenerator)?;
    let statements = render_schema_diff(&ctx, &diff, &PostgresGenerator)?;
    Ok(to_migration_sql(&statements))
}

async fn assert_managed_checks(adapter: &PostgresAdapter) -> Result<()> {
    let checks = fixture_checks(adapter).await?;

    let invoice_checks = checks
        .get(&invoice())
        .ok_or_else(|| anyhow!("expected checks on {}", invoice()))?;
    let names: Vec<&str> = invoice_checks.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["CHK_INVOICE_LEGACY"]);
    assert_eq!(invoice_checks["CHK_INVOICE_LEGACY"], "qty > 0");
    assert!(!checks.contains_key(&TableRef::new(SCHEMA, "customer")));

    let snapshot = adapter
        .introspect(&IntrospectOptions::for_schemas(&[SCHEMA.to_string()]))
        .await?;
    let names: Vec<&str> = snapshot
        .schemas
        .iter()
        .map(|schema| schema.name.as_str())
        .collect();
    assert_eq!(names, vec![SCHEMA]);

    let table = snapshot
        .table(&invoice())
        .ok_or_else(|| anyhow!("expected invoice table"))?;
    let indexes: Vec<&str> = table
        .indexes
        .iter()
        .map(|index| index.name.as_str())
        .collect();
    assert_eq!(indexes, vec!["invoice_status_idx"]);
    assert_eq!(table.foreign_keys().count(), 1);

    Ok(())
}

// Both phases share the fixture schema, so they run in one test.
#[tokio::test]
async fn introspects_and_converges_fixture_schema() -> Result<()> {
    let Some(pool) = connect().await? else {
        return Ok(());
    };
    reset_fixture(&pool).await?;

    let adapter = PostgresAdapter::new(pool.clone());
    assert_managed_checks(&adapter).await?;

    let migration = plan(&adapter).await?;
    assert!(migration.contains(r#"ADD CONSTRAINT "CHK_INVOICE_STATUS""#));
    assert!(migration.contains(r#"ADD CONSTRAINT "CHK_INVOICE_PARTY""#));
    assert!(migration.contains(r#"DROP CONSTRAINT IF EXISTS "CHK_INVOICE_LEGACY""#));

    for _ in 0..2 {
        sqlx::raw_sql(&migration)
            .execute(&pool)
            .await
            .context("applying generated migration")?;
    }

    let checks = fixture_checks(&adapter).await?;
    let names: Vec<&str> = checks[&invoice()].keys().map(String::as_str).collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"CHK_INVOICE_STATUS"));
    assert!(names.contains(&"CHK_INVOICE_PARTY"));

    let unmanaged: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM pg_constraint con \
         JOIN pg_class rel ON rel.oid = con.conrelid \
         JOIN pg_namespace nsp ON nsp.oid = rel.relnamespace \
         WHERE nsp.nspname = $1 AND con.conname = 'invoice_qty_check'",
    )
    .bind(SCHEMA)
    .fetch_one(&pool)
    .await?;
    assert_eq!(unmanaged, 1, "unmanaged checks are left alone");

    assert_eq!(plan(&adapter).await?, "", "second plan should be empty");
    Ok(())
}
