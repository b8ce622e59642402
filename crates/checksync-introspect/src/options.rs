/// Options that control how introspection behaves.
#[derive(Debug, Clone)]
pub struct IntrospectOptions {
    pub include_system_schemas: bool,
    pub include_views: bool,
    pub include_materialized_views: bool,
    pub include_foreign_tables: bool,
    pub include_indexes: bool,
    /// Restrict introspection to these schemas. `None` means every
    /// non-system schema.
    pub schemas: Option<Vec<String>>,
}

impl Default for IntrospectOptions {
    fn default() -> Self {
        Self {
            include_system_schemas: false,
            include_views: false,
            include_materialized_views: false,
            include_foreign_tables: false,
            include_indexes: true,
            schemas: None,
        }
    }
}

impl IntrospectOptions {
    /// Options limited to `schemas`, or the defaults when the list is empty.
    pub fn for_schemas(schemas: &[String]) -> Self {
        Self {
            schemas: (!schemas.is_empty()).then(|| schemas.to_vec()),
            ..Self::default()
        }
    }
}
