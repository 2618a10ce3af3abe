//! SQL engine source backed by sqlx.
//!
//! Every attempt opens a dedicated connection (no pool), so a broken
//! connection never survives into the next retry.

use std::time::Duration;

use async_trait::async_trait;
use common::errors::{AppError, AppResult};
use common::models::connection::{ConnectionConfig, DbType};
use common::models::query::{ColumnInfo, QueryParam, QueryResult};
use serde_json::Value;
use sqlx::{
    Column, Connection, Executor, MySqlConnection, PgConnection, Row, SqliteConnection, Statement,
    TypeInfo,
};

use crate::source::{QuerySession, QuerySource};

/// Decodes one cell by trying the common scalar types in turn.
///
/// Types the decoder does not know (NUMERIC, JSON, arrays...) come back as `null`.
macro_rules! decode_cell {
    ($row:expr, $idx:expr) => {{
        let row = $row;
        let idx = $idx;
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            Value::from(v)
        } else if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            Value::from(v)
        } else if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
            Value::from(v)
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            Value::from(v)
        } else if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
            Value::from(v)
        } else if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
            Value::from(v)
        } else if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            Value::from(v)
        } else if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            Value::from(v.map(|d| d.to_string()))
        } else if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
            Value::from(v.map(|d| d.to_rfc3339()))
        } else if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
            Value::from(v.map(|d| d.to_string()))
        } else {
            Value::Null
        }
    }};
}

/// Prepares, binds and runs a statement on a concrete sqlx connection.
///
/// Column metadata comes from the prepared statement, so a query that
/// returns no rows still reports its columns.
macro_rules! fetch_table {
    ($conn:expr, $query:expr, $params:expr) => {{
        let conn = $conn;
        let statement = (&mut *conn)
            .prepare($query)
            .await
            .map_err(|e| AppError::DatabaseQuery(e.to_string()))?;
        let columns: Vec<ColumnInfo> = statement
            .columns()
            .iter()
            .map(|c| ColumnInfo::new(c.name(), c.type_info().name()))
            .collect();

        let mut query = statement.query();
        for param in $params {
            query = match param {
                QueryParam::Null => query.bind(None::<String>),
                QueryParam::Bool(b) => query.bind(*b),
                QueryParam::Int(i) => query.bind(*i),
                QueryParam::Float(f) => query.bind(*f),
                QueryParam::Text(s) => query.bind(s.clone()),
            };
        }

        if columns.is_empty() {
            let done = query
                .execute(&mut *conn)
                .await
                .map_err(|e| AppError::DatabaseQuery(e.to_string()))?;
            QueryResult::affected(done.rows_affected(), 0)
        } else {
            let rows = query
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| AppError::DatabaseQuery(e.to_string()))?;
            let values: Vec<Vec<Value>> = rows
                .iter()
                .map(|row| (0..columns.len()).map(|i| decode_cell!(row, i)).collect())
                .collect();
            QueryResult::from_rows(columns, values)
        }
    }};
}

/// A sqlx-backed query source for PostgreSQL, MySQL or SQLite.
pub struct SqlSource {
    config: ConnectionConfig,
    url: String,
    connect_timeout: Duration,
}

impl SqlSource {
    /// Creates a source; the connection URL is built eagerly so bad config fails fast.
    pub fn new(config: ConnectionConfig, connect_timeout: Duration) -> AppResult<Self> {
        let url = config.connection_url()?;
        Ok(Self {
            config,
            url,
            connect_timeout,
        })
    }

    /// The connection parameters.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

enum SqlConnection {
    Postgres(PgConnection),
    MySql(MySqlConnection),
    Sqlite(SqliteConnection),
}

struct SqlSession {
    conn: SqlConnection,
}

async fn connect_with_timeout<C, F>(timeout: Duration, fut: F) -> AppResult<C>
where
    F: std::future::Future<Output = Result<C, sqlx::Error>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(e)) => Err(AppError::DatabaseConnection(e.to_string())),
        Err(_) => Err(AppError::DatabaseConnection(format!(
            "timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

#[async_trait]
impl QuerySource for SqlSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn connect(&self) -> AppResult<Box<dyn QuerySession>> {
        let timeout = self.connect_timeout;
        let conn = match self.config.db_type {
            DbType::Postgres => SqlConnection::Postgres(
                connect_with_timeout(timeout, PgConnection::connect(&self.url)).await?,
            ),
            DbType::MySQL => SqlConnection::MySql(
                connect_with_timeout(timeout, MySqlConnection::connect(&self.url)).await?,
            ),
            DbType::SQLite => SqlConnection::Sqlite(
                connect_with_timeout(timeout, SqliteConnection::connect(&self.url)).await?,
            ),
        };
        tracing::debug!(db_type = %self.config.db_type, "Connection opened");
        Ok(Box::new(SqlSession { conn }))
    }
}

#[async_trait]
impl QuerySession for SqlSession {
    async fn execute(
        &mut self,
        query: &str,
        params: &[QueryParam],
    ) -> AppResult<Option<QueryResult>> {
        let result = match &mut self.conn {
            SqlConnection::Postgres(conn) => fetch_table!(conn, query, params),
            SqlConnection::MySql(conn) => fetch_table!(conn, query, params),
            SqlConnection::Sqlite(conn) => fetch_table!(conn, query, params),
        };
        Ok(Some(result))
    }

    async fn close(self: Box<Self>) -> AppResult<()> {
        let closed = match self.conn {
            SqlConnection::Postgres(conn) => conn.close().await,
            SqlConnection::MySql(conn) => conn.close().await,
            SqlConnection::Sqlite(conn) => conn.close().await,
        };
        closed.map_err(|e| AppError::DatabaseConnection(format!("close failed: {}", e)))
    }
}
