use thiserror::Error;

/// Failure modes surfaced by the results core.
///
/// Every operation reports exactly one of these to its caller; nothing is
/// retried internally and nothing is swallowed.
#[derive(Debug, Error)]
pub enum Error {
    /// A required ingestion field was missing or empty. Detected before any
    /// storage access.
    #[error("missing required field: {0}")]
    Validation(&'static str),

    /// An underlying read failed. The whole lookup or reconciliation call is
    /// aborted; no partial output is returned.
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// A write inside the ingestion transaction failed. The whole scope is
    /// rolled back; nothing is partially committed.
    #[error("transaction failed: {0}")]
    Transaction(#[source] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
