//! Error taxonomy shared by the screening engine, the dispatcher and the gateway.

use thiserror::Error;

/// Rejected request shape. Surfaced synchronously, nothing is persisted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("at least one ticker is required")]
    EmptyTickers,

    #[error("invalid ticker '{0}'")]
    InvalidTicker(String),

    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),

    #[error("invalid recipient address '{0}'")]
    InvalidRecipient(String),
}

/// Durable store failures.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error("database operation timed out after {0}s")]
    Timeout(u64),

    /// A conditional update lost its race (row no longer in the expected state).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("query failed: {0}")]
    Query(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        use tokio_postgres::error::SqlState;

        if e.is_closed() {
            return StoreError::Unavailable(e.to_string());
        }
        match e.code() {
            Some(code) if *code == SqlState::UNIQUE_VIOLATION => StoreError::Conflict(e.to_string()),
            Some(code)
                if *code == SqlState::T_R_SERIALIZATION_FAILURE
                    || *code == SqlState::T_R_DEADLOCK_DETECTED
                    || *code == SqlState::ADMIN_SHUTDOWN
                    || *code == SqlState::CANNOT_CONNECT_NOW =>
            {
                StoreError::Unavailable(e.to_string())
            }
            Some(code) if *code == SqlState::FOREIGN_KEY_VIOLATION => {
                StoreError::Integrity(e.to_string())
            }
            Some(_) => StoreError::Query(e.to_string()),
            // No SQLSTATE means the failure happened below the protocol (socket, TLS).
            None => StoreError::Unavailable(e.to_string()),
        }
    }
}

/// Delivery provider failures. Only `Rejected` is permanent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("transient delivery failure: {0}")]
    Transient(String),

    #[error("delivery timed out after {0}s")]
    Timeout(u64),

    /// API key missing or refused. An infrastructure fault, not the message's.
    #[error("delivery provider refused credentials (status {0})")]
    Unauthorized(u16),

    #[error("message rejected by provider (status {status}): {reason}")]
    Rejected { status: u16, reason: String },
}

impl DeliveryError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, DeliveryError::Rejected { .. })
    }
}

/// Snapshot data that cannot be screened. Logged and skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataIntegrityError {
    #[error("no option chain snapshot available for {ticker}")]
    MissingSnapshot { ticker: String },

    #[error("malformed snapshot {id}: {reason}")]
    MalformedSnapshot { id: i64, reason: String },
}

/// Failure inside a strategy predicate. Aborts the ticker being evaluated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrategyError {
    #[error("strategy '{strategy}' failed on snapshot {snapshot_id}: {reason}")]
    Evaluation {
        strategy: &'static str,
        snapshot_id: i64,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

/// Errors returned by the screening engine's public operations.
#[derive(Error, Debug)]
pub enum ScreenerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ScreenerError {
    pub fn is_transient(&self) -> bool {
        match self {
            ScreenerError::Store(e) => e.is_transient(),
            ScreenerError::Validation(_) => false,
        }
    }
}
