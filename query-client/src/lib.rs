//! 远程查询客户端
//!
//! Runs queries against a SQL engine (via sqlx) or a DuckDB HTTP service,
//! retrying failed attempts with bounded exponential backoff:
//! - one fresh connection per attempt, always closed afterwards
//! - a driver answer without a table counts as a failure
//! - an empty result keeps its column names

pub mod client;
pub mod duckdb_http;
pub mod retry;
pub mod script;
pub mod source;
pub mod sql_source;
pub mod state;

pub use client::RetryingQueryClient;
pub use duckdb_http::{DuckDbConfig, DuckDbHttpSource};
pub use retry::{RecordingSleeper, RetryPolicy, Sleeper, TokioSleeper};
pub use script::run_script_file;
pub use source::{QuerySession, QuerySource};
pub use sql_source::SqlSource;
pub use state::AppState;
