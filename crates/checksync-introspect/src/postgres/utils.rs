use checksync_core::{FkAction, TableKind};

/// Convert Postgres `relkind` code to a typed table kind.
pub fn relkind_to_table_kind(code: i8) -> TableKind {
    match code as u8 as char {
        'r' => TableKind::Table,
        'p' => TableKind::PartitionedTable,
        'v' => TableKind::View,
        'm' => TableKind::MaterializedView,
        'f' => TableKind::ForeignTable,
        other => TableKind::Other(other.to_string()),
    }
}

/// Convert an FK action code from `pg_constraint`. Unknown codes read as
/// `NO ACTION`, the catalog default.
pub fn fk_action_from_code(code: i8) -> FkAction {
    match code as u8 as char {
        'r' => FkAction::Restrict,
        'c' => FkAction::Cascade,
        'n' => FkAction::SetNull,
        'd' => FkAction::SetDefault,
        _ => FkAction::NoAction,
    }
}
