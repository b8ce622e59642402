use sqlx::PgPool;

use checksync_core::{ChecksByTable, DatabaseSchema, Result, SCHEMA_VERSION, Schema};
use checksync_sql::CheckGenerator;

use crate::adapter::Adapter;
use crate::options::IntrospectOptions;

mod mapper;
mod queries;
mod utils;

/// Adapter for PostgreSQL databases.
#[derive(Debug, Clone)]
pub struct PostgresAdapter {
    pool: PgPool,
}

impl PostgresAdapter {
    /// Create a new adapter using a pre-configured pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Adapter for PostgresAdapter {
    fn engine(&self) -> &'static str {
        "postgres"
    }

    async fn introspect(&self, opts: &IntrospectOptions) -> Result<DatabaseSchema> {
        introspect(&self.pool, opts).await
    }

    async fn introspect_checks(
        &self,
        generator: &(dyn CheckGenerator + Sync),
    ) -> Result<ChecksByTable> {
        crate::checks::introspect_checks(&self.pool, generator).await
    }
}

/// Introspect Postgres with default options.
pub async fn introspect_postgres(pool: &PgPool) -> Result<DatabaseSchema> {
    introspect_postgres_with_options(pool, IntrospectOptions::default()).await
}

/// Introspect Postgres with caller-provided options.
pub async fn introspect_postgres_with_options(
    pool: &PgPool,
    opts: IntrospectOptions,
) -> Result<DatabaseSchema> {
    introspect(pool, &opts).await
}

/// Introspect the structure of a Postgres database according to `opts`.
pub async fn introspect(pool: &PgPool, opts: &IntrospectOptions) -> Result<DatabaseSchema> {
    let database = queries::fetch_database_name(pool).await?;
    let schemas = mapper::filter_schemas(queries::list_schemas(pool).await?, opts);

    let mut schema_items = Vec::new();

    for schema_name in schemas {
        let raw_tables = queries::list_tables_in_schema(pool, &schema_name).await?;
        let mut tables = mapper::map_tables(raw_tables, opts);

        for table in &mut tables {
            let raw_columns = queries::list_columns(pool, &schema_name, &table.name).await?;
            table.columns = mapper::map_columns(raw_columns);

            let raw_pk = queries::get_primary_key(pool, &schema_name, &table.name).await?;
            let raw_uniques =
                queries::list_unique_constraints(pool, &schema_name, &table.name).await?;
            let raw_fks = queries::list_foreign_keys(pool, &schema_name, &table.name).await?;

            let mut constraints = Vec::new();
            constraints.extend(mapper::map_primary_key(raw_pk));
            constraints.extend(mapper::map_unique_constraints(raw_uniques));
            constraints.extend(mapper::map_foreign_keys(raw_fks));
            mapper::sort_constraints(&mut constraints);
            table.constraints = constraints;

            if opts.include_indexes {
                let raw_indexes = queries::list_indexes(pool, &schema_name, &table.name).await?;
                table.indexes = mapper::map_indexes(raw_indexes);
            }
        }

        tables.sort_by(|left, right| left.name.cmp(&right.name));
        schema_items.push(Schema {
            name: schema_name,
            tables,
        });
    }

    schema_items.sort_by(|left, right| left.name.cmp(&right.name));

    let table_count: usize = schema_items.iter().map(|schema| schema.tables.len()).sum();
    tracing::debug!(
        event = "schema_introspected",
        schemas = schema_items.len(),
        tables = table_count
    );

    Ok(DatabaseSchema {
        schema_version: SCHEMA_VERSION.to_string(),
        engine: "postgres".to_string(),
        database: Some(database),
        schemas: schema_items,
    })
}
