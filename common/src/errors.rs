//! Application error types.
//!
//! A single error taxonomy shared by every crate in the workspace.

use thiserror::Error;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Unified application error.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is not set.
    #[error("environment variable {0} is not set")]
    MissingEnv(String),

    /// Configuration value present but unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// Input failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Could not establish a database connection.
    #[error("database connection failed: {0}")]
    DatabaseConnection(String),

    /// Query execution failed on the database side.
    #[error("database query failed: {0}")]
    DatabaseQuery(String),

    /// A remote HTTP service failed or answered with an error.
    #[error("external service error: {0}")]
    ExternalService(String),

    /// The remote call succeeded but returned something other than a table.
    #[error("unexpected result: {0}")]
    UnexpectedResult(String),

    /// The retry budget ran out; wraps the last underlying error.
    #[error("query failed after {retries} retries: {source}")]
    RetriesExhausted {
        retries: u32,
        #[source]
        source: Box<AppError>,
    },

    /// SQL statement rejected by the read-only guard.
    #[error("unsafe SQL: {0}")]
    UnsafeSql(String),

    /// Database type not handled by this source.
    #[error("unsupported database type: {0}")]
    UnsupportedDatabaseType(String),

    /// Could not reach Redis.
    #[error("redis connection failed: {0}")]
    RedisConnection(String),

    /// Redis command failed.
    #[error("redis operation failed: {0}")]
    RedisOperation(String),

    /// Requested item does not exist on the remote side.
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::MissingEnv(_) => "MISSING_ENV",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::DatabaseConnection(_) => "DATABASE_CONNECTION_ERROR",
            AppError::DatabaseQuery(_) => "DATABASE_QUERY_ERROR",
            AppError::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::UnexpectedResult(_) => "UNEXPECTED_RESULT",
            AppError::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            AppError::UnsafeSql(_) => "UNSAFE_SQL",
            AppError::UnsupportedDatabaseType(_) => "UNSUPPORTED_DATABASE_TYPE",
            AppError::RedisConnection(_) => "REDIS_CONNECTION_ERROR",
            AppError::RedisOperation(_) => "REDIS_OPERATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Io(_) => "IO_ERROR",
            AppError::Json(_) => "JSON_ERROR",
        }
    }

    /// Builds an `ExternalService` error from a non-success HTTP reply.
    pub fn http_status(status: u16, body: impl AsRef<str>) -> Self {
        AppError::ExternalService(format!(
            "Failed with status code: {}, Message: {}",
            status,
            body.as_ref()
        ))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}
