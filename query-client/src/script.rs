//! Runs SQL script files through the retrying client.

use std::path::Path;

use common::errors::{AppError, AppResult};
use common::models::query::QueryResult;
use common::utils::SqlValidator;

use crate::client::RetryingQueryClient;
use crate::source::QuerySource;

/// Reads `path` and runs its statements in order, each with its own retry budget.
///
/// Without `multi_part` the whole file is sent as a single statement. The
/// result of the last statement is returned.
///
/// # Errors
/// - `AppError::Io` if the file cannot be read
/// - `AppError::Validation` if the file holds no statements
/// - the first statement error, after its retries are spent
pub async fn run_script_file<S: QuerySource>(
    client: &RetryingQueryClient<S>,
    path: impl AsRef<Path>,
    multi_part: bool,
) -> AppResult<QueryResult> {
    let path = path.as_ref();
    let script = tokio::fs::read_to_string(path).await?;
    let statements = SqlValidator::split_statements(&script, multi_part);
    if statements.is_empty() {
        return Err(AppError::Validation(format!(
            "{} contains no SQL statements",
            path.display()
        )));
    }

    tracing::info!(path = %path.display(), statements = statements.len(), "Running script");

    let mut last = None;
    for (i, statement) in statements.iter().enumerate() {
        tracing::debug!(index = i + 1, "Running statement");
        last = Some(client.query(statement, &[]).await?);
    }
    last.ok_or_else(|| AppError::UnexpectedResult("script produced no result".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{RecordingSleeper, RetryPolicy};
    use crate::sql_source::SqlSource;
    use common::models::connection::ConnectionConfig;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;

    fn client_for(db: &Path) -> RetryingQueryClient<SqlSource> {
        let config = ConnectionConfig::sqlite(db.to_string_lossy());
        let source = SqlSource::new(config, Duration::from_secs(5)).unwrap();
        RetryingQueryClient::new(source, RetryPolicy::default().with_max_retries(0))
            .with_sleeper(Arc::new(RecordingSleeper::new()))
    }

    fn script_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_multi_part_script_returns_last_result() {
        let dir = tempfile::tempdir().unwrap();
        let client = client_for(&dir.path().join("ops.db"));
        let script = script_file(
            "CREATE TABLE jobs (name TEXT);\n\
             INSERT INTO jobs VALUES ('nightly'), ('weekly');\n\
             ;\n\
             SELECT name FROM jobs ORDER BY name;\n",
        );

        let result = run_script_file(&client, script.path(), true).await.unwrap();

        assert_eq!(result.rows, vec![vec![json!("nightly")], vec![json!("weekly")]]);
    }

    #[tokio::test]
    async fn test_single_part_script_is_one_statement() {
        let dir = tempfile::tempdir().unwrap();
        let client = client_for(&dir.path().join("ops.db"));
        let script = script_file("SELECT 42 AS answer;\n");

        let result = run_script_file(&client, script.path(), false).await.unwrap();

        assert_eq!(result.column_names(), vec!["answer"]);
        assert_eq!(result.rows, vec![vec![json!(42)]]);
    }

    #[tokio::test]
    async fn test_blank_script_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let client = client_for(&dir.path().join("ops.db"));
        let script = script_file(" ;\n; ");

        let err = run_script_file(&client, script.path(), true).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = client_for(&dir.path().join("ops.db"));

        let err = run_script_file(&client, dir.path().join("nope.sql"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
    }
}
