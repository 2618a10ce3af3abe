//! Retrying query client.
//!
//! `ATTEMPT(n) → success → RETURN | failure → n <= max_retries ? WAIT(delay(n)) → ATTEMPT(n+1) : FAIL`
//!
//! The loop is a [`backon::Retryable`] chain over [`RetryPolicy::backoff`];
//! waits go through the injected [`Sleeper`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use backon::Retryable;
use common::errors::{AppError, AppResult};
use common::models::query::{QueryParam, QueryRequest, QueryResult};
use common::utils::id_generator::run_id;
use tracing::Instrument;
use validator::Validate;

use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::source::QuerySource;

/// Runs queries against a [`QuerySource`] with bounded exponential backoff.
pub struct RetryingQueryClient<S: QuerySource> {
    source: S,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl<S: QuerySource> RetryingQueryClient<S> {
    /// Creates a client that sleeps on the tokio timer between attempts.
    pub fn new(source: S, policy: RetryPolicy) -> Self {
        Self {
            source,
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replaces the sleeper (tests use a recording sleeper).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// The retry policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The underlying source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Validates and runs a request.
    pub async fn execute(&self, req: QueryRequest) -> AppResult<QueryResult> {
        req.validate()?;
        self.query(&req.query, &req.params).await
    }

    /// Runs `query` until it succeeds or the retry budget is spent.
    ///
    /// # Errors
    /// Returns `AppError::RetriesExhausted` wrapping the last failure after
    /// `max_retries + 1` attempts.
    pub async fn query(&self, query: &str, params: &[QueryParam]) -> AppResult<QueryResult> {
        let span = tracing::info_span!("query", run_id = %run_id(), source = %self.source.name());
        self.query_with_retries(query, params).instrument(span).await
    }

    async fn query_with_retries(&self, query: &str, params: &[QueryParam]) -> AppResult<QueryResult> {
        tracing::info!(query = %query, "Running query");

        let attempts = &AtomicU32::new(0);
        let sleeper = self.sleeper.clone();

        let outcome = (move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            self.attempt_once(query, params).await
        })
        .retry(self.policy.backoff())
        .sleep(move |delay: Duration| {
            let sleeper = sleeper.clone();
            async move { sleeper.sleep(delay).await }
        })
        .notify(|e: &AppError, delay: Duration| {
            tracing::warn!(
                attempt = attempts.load(Ordering::SeqCst),
                error = %e,
                delay_secs = delay.as_secs_f64(),
                "Query attempt failed, retrying in {:.2} minutes",
                delay.as_secs_f64() / 60.0
            );
        })
        .await;

        let attempts = attempts.load(Ordering::SeqCst);
        match outcome {
            Ok(result) => {
                tracing::info!(
                    attempt = attempts,
                    rows = result.row_count,
                    elapsed_ms = result.execution_time_ms,
                    "Query succeeded"
                );
                Ok(result)
            }
            Err(e) => {
                tracing::error!(attempts, error = %e, "Query failed, giving up");
                Err(AppError::RetriesExhausted {
                    retries: self.policy.max_retries,
                    source: Box::new(e),
                })
            }
        }
    }

    /// One attempt: connect, execute, always close. Only this attempt is timed.
    async fn attempt_once(&self, query: &str, params: &[QueryParam]) -> AppResult<QueryResult> {
        let start = Instant::now();
        let mut session = self.source.connect().await?;
        let outcome = session.execute(query, params).await;

        if let Err(e) = session.close().await {
            tracing::warn!(error = %e, "Failed to close connection");
        }

        match outcome? {
            Some(result) => Ok(result.with_execution_time(start.elapsed().as_millis() as u64)),
            None => Err(AppError::UnexpectedResult(format!(
                "{} returned no table",
                self.source.name()
            ))),
        }
    }
}
