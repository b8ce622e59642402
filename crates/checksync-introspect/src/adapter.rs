use async_trait::async_trait;

use checksync_core::{ChecksByTable, DatabaseSchema, Result};
use checksync_sql::CheckGenerator;

use crate::options::IntrospectOptions;

/// Trait implemented by database adapters that can introspect schemas.
#[async_trait]
pub trait Adapter {
    /// Returns the engine identifier (e.g. `postgres`).
    fn engine(&self) -> &'static str;

    /// Introspect the database structure and return a schema snapshot.
    /// CHECK constraints are not included; see [`Adapter::introspect_checks`].
    async fn introspect(&self, opts: &IntrospectOptions) -> Result<DatabaseSchema>;

    /// Read every managed CHECK constraint with one catalog query.
    async fn introspect_checks(
        &self,
        generator: &(dyn CheckGenerator + Sync),
    ) -> Result<ChecksByTable>;
}
