use std::collections::HashMap;

use checksync_core::{
    CheckSpec, ChecksByTable, Column, Constraint, DatabaseSchema, FkAction, ForeignKey, Index,
    Schema, SchemaComparisonContext, Table, TableRef,
};
use checksync_diff::{compare_schemas, render_schema_diff, to_migration_sql};
use checksync_sql::{
    CheckContext, CheckGenerator, CheckOutcome, PostgresGenerator, SqlValue, evaluate_check,
};

fn invoice() -> TableRef {
    TableRef::new("public", "invoice")
}

fn column(name: &str, data_type: &str) -> Column {
    Column {
        name: name.to_string(),
        data_type: data_type.to_string(),
        is_nullable: true,
        default: None,
    }
}

fn invoice_schema() -> DatabaseSchema {
    let table = Table {
        columns: vec![
            column("id", "bigint"),
            column("status", "text"),
            column("qty", "integer"),
            column("customer_id", "bigint"),
            column("supplier_id", "bigint"),
        ],
        ..Table::new("invoice")
    };
    let mut schema = DatabaseSchema::empty("postgres");
    schema.schemas.push(Schema {
        name: "public".to_string(),
        tables: vec![table],
    });
    schema
}

fn existing(entries: &[(&str, &str)]) -> ChecksByTable {
    let mut checks = ChecksByTable::new();
    let table = checks.entry(invoice()).or_default();
    for (name, expression) in entries {
        table.insert(name.to_string(), expression.to_string());
    }
    checks
}

fn context(declared: Vec<CheckSpec>, current: ChecksByTable) -> SchemaComparisonContext {
    let mut ctx = SchemaComparisonContext::new();
    for spec in declared {
        ctx.append_declared_spec(&invoice(), spec).expect("declare spec");
    }
    ctx.register_introspected_expressions(current)
        .expect("register introspected checks");
    ctx
}

fn migration(ctx: &SchemaComparisonContext) -> String {
    let schema = invoice_schema();
    let diff = compare_schemas(ctx, &schema, &schema, &PostgresGenerator).expect("compare");
    let statements = render_schema_diff(ctx, &diff, &PostgresGenerator).expect("render");
    to_migration_sql(&statements)
}

fn names(specs: &[CheckSpec]) -> Vec<&str> {
    specs.iter().map(CheckSpec::name).collect()
}

fn status_spec(values: &[&str]) -> CheckSpec {
    CheckSpec::enumeration("CHK_MODIFIED", "status", values.iter().copied()).expect("enum spec")
}

#[test]
fn diff_reports_added_modified_and_dropped() {
    let ctx = context(
        vec![
            status_spec(&["DRAFT", "ISSUED", "PAID"]),
            CheckSpec::soft_xor("CHK_ADDED", ["customer_id", "supplier_id"]).unwrap(),
        ],
        existing(&[
            ("CHK_DROPPED", "qty > 0"),
            (
                "CHK_MODIFIED",
                "status = ANY (ARRAY['DRAFT'::text, 'ISSUED'::text])",
            ),
        ]),
    );

    let schema = invoice_schema();
    let diff = compare_schemas(&ctx, &schema, &schema, &PostgresGenerator).unwrap();
    let checks = &diff.table(&invoice()).expect("invoice diff").checks;

    assert_eq!(names(&checks.added), vec!["CHK_ADDED"]);
    assert_eq!(names(&checks.modified), vec!["CHK_MODIFIED"]);
    assert_eq!(names(&checks.dropped), vec!["CHK_DROPPED"]);
    assert_eq!(checks.modified[0], status_spec(&["DRAFT", "ISSUED", "PAID"]));
    assert!(checks.dropped.iter().all(CheckSpec::is_tombstone));
}

#[test]
fn statements_follow_add_modify_drop_order() {
    let ctx = context(
        vec![
            status_spec(&["DRAFT", "PAID"]),
            CheckSpec::soft_xor("CHK_ADDED", ["customer_id", "supplier_id"]).unwrap(),
        ],
        existing(&[
            ("CHK_DROPPED", "qty > 0"),
            ("CHK_MODIFIED", "status = ANY (ARRAY['DRAFT'::text])"),
        ]),
    );

    let schema = invoice_schema();
    let diff = compare_schemas(&ctx, &schema, &schema, &PostgresGenerator).unwrap();
    let statements = render_schema_diff(&ctx, &diff, &PostgresGenerator).unwrap();

    let summary: Vec<String> = statements
        .iter()
        .map(|sql| {
            let action = if sql.contains("DROP CONSTRAINT") { "DROP" } else { "ADD" };
            let name = ["CHK_ADDED", "CHK_MODIFIED", "CHK_DROPPED"]
                .into_iter()
                .find(|name| sql.contains(name))
                .expect("statement names a constraint");
            format!("{action} {name}")
        })
        .collect();

    assert_eq!(
        summary,
        vec![
            "ADD CHK_ADDED",
            "DROP CHK_MODIFIED",
            "ADD CHK_MODIFIED",
            "DROP CHK_DROPPED",
        ]
    );
}

#[test]
fn no_declarations_drop_every_existing_check() {
    let ctx = context(
        Vec::new(),
        existing(&[("CHK_ONE", "qty > 0"), ("CHK_TWO", "qty < 100")]),
    );

    let schema = invoice_schema();
    let diff = compare_schemas(&ctx, &schema, &schema, &PostgresGenerator).unwrap();
    let checks = &diff.table(&invoice()).expect("invoice diff").checks;

    assert!(checks.added.is_empty());
    assert!(checks.modified.is_empty());
    assert_eq!(names(&checks.dropped), vec!["CHK_ONE", "CHK_TWO"]);
}

#[test]
fn converged_state_is_a_fixed_point_for_every_kind() {
    let declared = vec![
        CheckSpec::enumeration("CHK_STATUS", "status", ["DRAFT", "PAID"]).unwrap(),
        CheckSpec::enumeration("CHK_QTY", "qty", [1, 2, 3]).unwrap(),
        CheckSpec::soft_xor("CHK_PARTY", ["customer_id", "supplier_id"]).unwrap(),
    ];
    // What pg_get_constraintdef prints once the rendered statements ran.
    let deparsed = existing(&[
        (
            "CHK_STATUS",
            "status = ANY (ARRAY['DRAFT'::text, 'PAID'::text])",
        ),
        ("CHK_QTY", "qty = ANY (ARRAY[1, 2, 3])"),
        ("CHK_PARTY", "num_nonnulls(customer_id, supplier_id) <= 1"),
    ]);

    let ctx = context(declared, deparsed);
    let schema = invoice_schema();
    let diff = compare_schemas(&ctx, &schema, &schema, &PostgresGenerator).unwrap();

    assert!(diff.is_empty(), "unexpected diff: {diff}");
    assert_eq!(migration(&ctx), "");
}

#[test]
fn rendered_expressions_compare_equal_to_themselves() {
    let declared = vec![
        CheckSpec::enumeration("CHK_STATUS", "status", ["DRAFT", "O'NEIL"]).unwrap(),
        CheckSpec::soft_xor("CHK_PARTY", ["customer_id", "supplier_id"]).unwrap(),
    ];
    let rendered: Vec<(String, String)> = declared
        .iter()
        .map(|spec| {
            (
                spec.name().to_string(),
                PostgresGenerator.build_expression_sql(spec).unwrap(),
            )
        })
        .collect();
    let entries: Vec<(&str, &str)> = rendered
        .iter()
        .map(|(name, expression)| (name.as_str(), expression.as_str()))
        .collect();

    let ctx = context(declared, existing(&entries));
    assert_eq!(migration(&ctx), "");
}

#[test]
fn reordered_enum_values_are_reported_as_modified() {
    let ctx = context(
        vec![status_spec(&["PAID", "DRAFT"])],
        existing(&[(
            "CHK_MODIFIED",
            "status = ANY (ARRAY['DRAFT'::text, 'PAID'::text])",
        )]),
    );
    let schema = invoice_schema();
    let diff = compare_schemas(&ctx, &schema, &schema, &PostgresGenerator).unwrap();
    assert_eq!(diff.table(&invoice()).unwrap().checks.modified.len(), 1);
}

#[test]
fn migration_holds_one_add_per_required_constraint() {
    let ctx = context(
        vec![
            status_spec(&["DRAFT", "PAID"]),
            CheckSpec::soft_xor("CHK_ADDED", ["customer_id", "supplier_id"]).unwrap(),
        ],
        existing(&[("CHK_MODIFIED", "status = ANY (ARRAY['DRAFT'::text])")]),
    );

    let sql = migration(&ctx);
    assert_eq!(sql.matches(r#"ADD CONSTRAINT "CHK_ADDED""#).count(), 1);
    assert_eq!(sql.matches(r#"ADD CONSTRAINT "CHK_MODIFIED""#).count(), 1);
    assert_eq!(
        sql.matches(r#"DROP CONSTRAINT IF EXISTS "CHK_MODIFIED""#).count(),
        1
    );
}

#[test]
fn new_table_gets_create_then_checks() {
    let from = DatabaseSchema::empty("postgres");
    let to = invoice_schema();

    let mut ctx = SchemaComparisonContext::new();
    ctx.append_declared_spec(
        &invoice(),
        CheckSpec::enumeration("CHK_STATUS", "status", ["DRAFT"]).unwrap(),
    )
    .unwrap();

    let diff = compare_schemas(&ctx, &from, &to, &PostgresGenerator).unwrap();
    let statements = render_schema_diff(&ctx, &diff, &PostgresGenerator).unwrap();

    assert_eq!(statements.len(), 2);
    assert!(statements[0].starts_with(r#"CREATE TABLE IF NOT EXISTS "public"."invoice""#));
    assert!(statements[1].contains(r#"ADD CONSTRAINT "CHK_STATUS""#));
}

#[test]
fn check_on_new_column_follows_the_column() {
    let from = invoice_schema();
    let mut to = invoice_schema();
    to.table_mut(&invoice())
        .unwrap()
        .columns
        .push(column("kind", "text"));

    let ctx = context(
        vec![CheckSpec::enumeration("CHK_KIND", "kind", ["A", "B"]).unwrap()],
        ChecksByTable::new(),
    );

    let diff = compare_schemas(&ctx, &from, &to, &PostgresGenerator).unwrap();
    let statements = render_schema_diff(&ctx, &diff, &PostgresGenerator).unwrap();

    assert_eq!(statements.len(), 2);
    assert!(statements[0].contains(r#"ADD COLUMN IF NOT EXISTS "kind" text"#));
    assert!(statements[1].contains(r#"ADD CONSTRAINT "CHK_KIND""#));
}

#[test]
fn diff_serializes_for_run_artifacts() {
    let ctx = context(
        vec![status_spec(&["DRAFT", "PAID"])],
        existing(&[("CHK_DROPPED", "qty > 0")]),
    );
    let from = invoice_schema();
    let mut to = invoice_schema();
    to.table_mut(&invoice())
        .unwrap()
        .columns
        .push(column("note", "text"));

    let diff = compare_schemas(&ctx, &from, &to, &PostgresGenerator).unwrap();
    let json = serde_json::to_value(&diff).unwrap();

    let table = &json["table_diffs"][0];
    assert_eq!(table["table"]["table"], "invoice");
    assert_eq!(table["changes"][0]["op"], "add_column");
    assert_eq!(table["changes"][0]["name"], "note");
    assert_eq!(table["checks"]["added"][0]["kind"], "enum");
    assert_eq!(table["checks"]["added"][0]["values"]["items"][1], "PAID");
    assert_eq!(table["checks"]["dropped"][0]["kind"], "dropped");
    assert_eq!(table["checks"]["dropped"][0]["name"], "CHK_DROPPED");
}

fn status_index(method: &str) -> Index {
    Index {
        name: "invoice_status_idx".to_string(),
        is_unique: false,
        is_primary: false,
        definition: format!(
            "CREATE INDEX invoice_status_idx ON public.invoice USING {method} (status)"
        ),
    }
}

fn customer_fk(on_delete: FkAction) -> ForeignKey {
    ForeignKey {
        name: "invoice_customer_fkey".to_string(),
        columns: vec!["customer_id".to_string()],
        referenced_schema: "public".to_string(),
        referenced_table: "customer".to_string(),
        referenced_columns: vec!["id".to_string()],
        on_update: FkAction::NoAction,
        on_delete,
    }
}

fn position(statements: &[String], needle: &str) -> usize {
    statements
        .iter()
        .position(|sql| sql.contains(needle))
        .unwrap_or_else(|| panic!("no statement contains {needle}: {statements:#?}"))
}

#[test]
fn changed_index_is_dropped_right_before_it_is_recreated() {
    let mut from = invoice_schema();
    from.table_mut(&invoice())
        .unwrap()
        .indexes
        .push(status_index("btree"));
    let mut to = invoice_schema();
    to.table_mut(&invoice())
        .unwrap()
        .indexes
        .push(status_index("hash"));

    let ctx = context(
        vec![status_spec(&["DRAFT", "PAID"])],
        existing(&[("CHK_DROPPED", "qty > 0")]),
    );
    let diff = compare_schemas(&ctx, &from, &to, &PostgresGenerator).unwrap();
    let statements = render_schema_diff(&ctx, &diff, &PostgresGenerator).unwrap();

    let drop = position(&statements, r#"DROP INDEX IF EXISTS "public"."invoice_status_idx""#);
    let create = position(&statements, "CREATE INDEX IF NOT EXISTS invoice_status_idx");
    assert_eq!(create, drop + 1);
    assert!(statements[create].contains("USING hash"));
    assert_eq!(
        statements.iter().filter(|sql| sql.contains("DROP INDEX")).count(),
        1
    );
    assert!(create < position(&statements, r#"ADD CONSTRAINT "CHK_MODIFIED""#));
    assert_eq!(
        position(&statements, r#"DROP CONSTRAINT IF EXISTS "CHK_DROPPED""#),
        statements.len() - 1
    );
}

#[test]
fn changed_foreign_key_is_dropped_right_before_it_is_re_added() {
    let with_fk = |on_delete| {
        let mut schema = invoice_schema();
        schema.schemas[0].tables.push(Table {
            columns: vec![column("id", "bigint")],
            ..Table::new("customer")
        });
        schema
            .table_mut(&invoice())
            .unwrap()
            .constraints
            .push(Constraint::ForeignKey(customer_fk(on_delete)));
        schema
    };
    let from = with_fk(FkAction::NoAction);
    let to = with_fk(FkAction::Cascade);

    let ctx = context(Vec::new(), ChecksByTable::new());
    let diff = compare_schemas(&ctx, &from, &to, &PostgresGenerator).unwrap();
    let statements = render_schema_diff(&ctx, &diff, &PostgresGenerator).unwrap();

    assert_eq!(statements.len(), 2, "{statements:#?}");
    assert_eq!(
        statements[0],
        r#"ALTER TABLE "public"."invoice" DROP CONSTRAINT IF EXISTS "invoice_customer_fkey";"#
    );
    assert!(statements[1].starts_with("DO $checksync$"));
    assert!(statements[1].contains(r#"ADD CONSTRAINT "invoice_customer_fkey" FOREIGN KEY"#));
    assert!(statements[1].contains("ON DELETE CASCADE"));
}

fn row(values: &[(&str, SqlValue)]) -> HashMap<String, SqlValue> {
    values
        .iter()
        .map(|(column, value)| (column.to_string(), value.clone()))
        .collect()
}

fn outcome(expression: &str, values: &[(&str, SqlValue)]) -> CheckOutcome {
    let values = row(values);
    evaluate_check(expression, &CheckContext { values: &values })
}

#[test]
fn rendered_and_deparsed_predicates_accept_the_same_rows() {
    let status = status_spec(&["DRAFT", "PAID"]);
    let party = CheckSpec::soft_xor("CHK_PARTY", ["customer_id", "supplier_id"]).unwrap();

    let status_forms = [
        PostgresGenerator.build_expression_sql(&status).unwrap(),
        "status = ANY (ARRAY['DRAFT'::text, 'PAID'::text])".to_string(),
    ];
    for expression in &status_forms {
        assert_eq!(outcome(expression, &[("status", "PAID".into())]), CheckOutcome::Passed);
        assert_eq!(outcome(expression, &[("status", "VOID".into())]), CheckOutcome::Failed);
        assert_eq!(outcome(expression, &[("status", SqlValue::Null)]), CheckOutcome::Passed);
    }

    let party_forms = [
        PostgresGenerator.build_expression_sql(&party).unwrap(),
        "num_nonnulls(customer_id, supplier_id) <= 1".to_string(),
    ];
    for expression in &party_forms {
        let one = [("customer_id", SqlValue::Int(7)), ("supplier_id", SqlValue::Null)];
        let both = [("customer_id", SqlValue::Int(7)), ("supplier_id", SqlValue::Int(9))];
        assert_eq!(outcome(expression, &one), CheckOutcome::Passed);
        assert_eq!(outcome(expression, &both), CheckOutcome::Failed);
    }
}
