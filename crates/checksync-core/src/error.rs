use thiserror::Error;

/// Core error type shared across checksync crates.
#[derive(Debug, Error)]
pub enum Error {
    /// A declared constraint, identifier, or manifest entry is malformed.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A caller handed the engine a value it must never see (for example a
    /// tombstone on the declared side).
    #[error("contract violation: {0}")]
    ContractViolation(String),
    /// Catalog query or connection failure while reading the live database.
    #[error("introspection error: {0}")]
    Introspection(String),
    /// The schema violates internal invariants.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    /// A requested feature is not yet supported.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Convenience alias for results returned by checksync crates.
pub type Result<T> = std::result::Result<T, Error>;
