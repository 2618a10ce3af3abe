//! Query source abstraction.
//!
//! A [`QuerySource`] knows how to open a fresh [`QuerySession`]; the retrying
//! client opens one session per attempt and always closes it.

use async_trait::async_trait;
use common::errors::AppResult;
use common::models::query::{QueryParam, QueryResult};

/// Something that can open connections to a query engine.
#[async_trait]
pub trait QuerySource: Send + Sync {
    /// Short name for log lines (e.g. `postgres`, `duckdb-http`).
    fn name(&self) -> &str;

    /// Opens a new connection.
    async fn connect(&self) -> AppResult<Box<dyn QuerySession>>;
}

/// One open connection.
#[async_trait]
pub trait QuerySession: Send {
    /// Runs the query.
    ///
    /// `Ok(None)` means the driver answered without a table; the client
    /// treats that as a failed attempt.
    async fn execute(&mut self, query: &str, params: &[QueryParam])
        -> AppResult<Option<QueryResult>>;

    /// Releases the connection.
    async fn close(self: Box<Self>) -> AppResult<()>;
}
