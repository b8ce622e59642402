//! Catalog queries for structural introspection.
//!
//! Queries are checked at runtime (`query_as` + `FromRow`), so building the
//! crate never needs a live database.

use sqlx::PgPool;

use checksync_core::{Error, Result};

fn db_error(err: sqlx::Error) -> Error {
    Error::Introspection(err.to_string())
}

pub async fn fetch_database_name(pool: &PgPool) -> Result<String> {
    sqlx::query_scalar::<_, String>("select current_database()::text")
        .fetch_one(pool)
        .await
        .map_err(db_error)
}

pub async fn list_schemas(pool: &PgPool) -> Result<Vec<String>> {
    sqlx::query_scalar::<_, String>(
        r#"
        select nspname::text
        from pg_namespace
        order by nspname
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(db_error)
}

#[derive(Debug, sqlx::FromRow)]
pub struct RawTable {
    pub name: String,
    pub relkind: i8,
}

pub async fn list_tables_in_schema(pool: &PgPool, schema: &str) -> Result<Vec<RawTable>> {
    sqlx::query_as::<_, RawTable>(
        r#"
        select
          c.relname::text as name,
          c.relkind as relkind
        from pg_class c
        join pg_namespace n on n.oid = c.relnamespace
        where n.nspname = $1
          and c.relkind in ('r','p','v','m','f')
        order by c.relname
        "#,
    )
    .bind(schema)
    .fetch_all(pool)
    .await
    .map_err(db_error)
}

#[derive(Debug, sqlx::FromRow)]
pub struct RawColumn {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub default: Option<String>,
}

pub async fn list_columns(pool: &PgPool, schema: &str, table: &str) -> Result<Vec<RawColumn>> {
    sqlx::query_as::<_, RawColumn>(
        r#"
        select
          a.attname::text as name,
          pg_catalog.format_type(a.atttypid, a.atttypmod) as data_type,
          (not a.attnotnull) as is_nullable,
          pg_get_expr(ad.adbin, ad.adrelid) as "default"
        from pg_attribute a
        join pg_class c on c.oid = a.attrelid
        join pg_namespace n on n.oid = c.relnamespace
        left join pg_attrdef ad on ad.adrelid = a.attrelid and ad.adnum = a.attnum
        where n.nspname = $1
          and c.relname = $2
          and a.attnum > 0
          and not a.attisdropped
        order by a.attnum
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(db_error)
}

/// Name and ordered columns of a primary key or unique constraint.
#[derive(Debug, sqlx::FromRow)]
pub struct RawKey {
    pub name: String,
    pub columns: Vec<String>,
}

const KEY_CONSTRAINTS_SQL: &str = r#"
    select
      con.conname::text as name,
      array_agg(att.attname::text order by ord.ordinality) as columns
    from pg_constraint con
    join pg_class rel on rel.oid = con.conrelid
    join pg_namespace nsp on nsp.oid = rel.relnamespace
    join unnest(con.conkey) with ordinality as ord(attnum, ordinality) on true
    join pg_attribute att on att.attrelid = rel.oid and att.attnum = ord.attnum
    where nsp.nspname = $1
      and rel.relname = $2
      and con.contype::text = $3
    group by con.conname
    order by con.conname
"#;

async fn list_keys(
    pool: &PgPool,
    schema: &str,
    table: &str,
    contype: &str,
) -> Result<Vec<RawKey>> {
    sqlx::query_as::<_, RawKey>(KEY_CONSTRAINTS_SQL)
        .bind(schema)
        .bind(table)
        .bind(contype)
        .fetch_all(pool)
        .await
        .map_err(db_error)
}

pub async fn get_primary_key(pool: &PgPool, schema: &str, table: &str) -> Result<Option<RawKey>> {
    Ok(list_keys(pool, schema, table, "p").await?.into_iter().next())
}

pub async fn list_unique_constraints(
    pool: &PgPool,
    schema: &str,
    table: &str,
) -> Result<Vec<RawKey>> {
    list_keys(pool, schema, table, "u").await
}

#[derive(Debug, sqlx::FromRow)]
pub struct RawForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_update_code: i8,
    pub on_delete_code: i8,
}

pub async fn list_foreign_keys(
    pool: &PgPool,
    schema: &str,
    table: &str,
) -> Result<Vec<RawForeignKey>> {
    sqlx::query_as::<_, RawForeignKey>(
        r#"
        select
          con.conname::text as name,
          array_agg(src_att.attname::text order by s_ord.ordinality) as columns,
          ref_nsp.nspname::text as referenced_schema,
          ref_rel.relname::text as referenced_table,
          array_agg(ref_att.attname::text order by s_ord.ordinality) as referenced_columns,
          con.confupdtype as on_update_code,
          con.confdeltype as on_delete_code
        from pg_constraint con
        join pg_class src_rel on src_rel.oid = con.conrelid
        join pg_namespace src_nsp on src_nsp.oid = src_rel.relnamespace
        join pg_class ref_rel on ref_rel.oid = con.confrelid
        join pg_namespace ref_nsp on ref_nsp.oid = ref_rel.relnamespace
        join unnest(con.conkey, con.confkey) with ordinality as s_ord(src_attnum, ref_attnum, ordinality) on true
        join pg_attribute src_att on src_att.attrelid = src_rel.oid and src_att.attnum = s_ord.src_attnum
        join pg_attribute ref_att on ref_att.attrelid = ref_rel.oid and ref_att.attnum = s_ord.ref_attnum
        where src_nsp.nspname = $1
          and src_rel.relname = $2
          and con.contype = 'f'
        group by
          con.conname, ref_nsp.nspname, ref_rel.relname,
          con.confupdtype, con.confdeltype
        order by con.conname
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(db_error)
}

#[derive(Debug, sqlx::FromRow)]
pub struct RawIndex {
    pub name: String,
    pub is_unique: bool,
    pub is_primary: bool,
    pub definition: String,
}

/// Indexes that do not back a constraint; those travel with their constraint.
pub async fn list_indexes(pool: &PgPool, schema: &str, table: &str) -> Result<Vec<RawIndex>> {
    sqlx::query_as::<_, RawIndex>(
        r#"
        select
          idx.relname::text as name,
          i.indisunique as is_unique,
          i.indisprimary as is_primary,
          pg_get_indexdef(i.indexrelid) as definition
        from pg_index i
        join pg_class tbl on tbl.oid = i.indrelid
        join pg_namespace nsp on nsp.oid = tbl.relnamespace
        join pg_class idx on idx.oid = i.indexrelid
        where nsp.nspname = $1
          and tbl.relname = $2
          and not exists (
            select 1 from pg_constraint con where con.conindid = i.indexrelid
          )
        order by idx.relname
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(db_error)
}
