//! Concurrent search dispatch with per-query failure isolation.
//!
//! All queries of one research depth are dispatched concurrently; a query
//! that fails every retry is downgraded to an empty result rather than
//! aborting the batch. One bad query must never block or invalidate the
//! others.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::sleep;

use crate::search::{SearchError, SearchProvider, SourceDoc};

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Total attempts per query, including the first.
    pub max_attempts: u32,
    /// Base delay for exponential backoff, doubled per attempt.
    pub retry_base_delay: Duration,
    /// Maximum queries in flight at once.
    pub concurrency: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
            concurrency: 4,
        }
    }
}

/// What one query produced. `docs` is empty when the query failed every
/// attempt; the failure itself never escapes the dispatcher.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub query: String,
    pub docs: Vec<SourceDoc>,
}

pub struct SearchDispatcher {
    provider: Arc<dyn SearchProvider>,
    config: DispatchConfig,
}

impl SearchDispatcher {
    pub fn new(provider: Arc<dyn SearchProvider>, config: DispatchConfig) -> Self {
        Self { provider, config }
    }

    /// Execute a batch of queries concurrently, returning one entry per
    /// query in input order.
    pub async fn dispatch(&self, queries: &[String]) -> Vec<QueryResult> {
        let tasks = queries.iter().enumerate().map(|(index, query)| {
            let provider = self.provider.clone();
            let config = self.config.clone();
            let query = query.clone();
            async move {
                let outcome = search_with_retry(provider.as_ref(), &query, &config).await;
                (index, query, outcome)
            }
        });

        let mut outcomes: Vec<(usize, String, Result<Vec<SourceDoc>, SearchError>)> =
            stream::iter(tasks)
                .buffer_unordered(self.config.concurrency.max(1))
                .collect()
                .await;
        outcomes.sort_by_key(|(index, _, _)| *index);

        outcomes
            .into_iter()
            .map(|(_, query, outcome)| match outcome {
                Ok(docs) => QueryResult { query, docs },
                Err(err) => {
                    tracing::warn!(
                        query = %query,
                        error = %err,
                        code = err.code(),
                        "search query failed all attempts, continuing with empty results"
                    );
                    QueryResult {
                        query,
                        docs: Vec::new(),
                    }
                }
            })
            .collect()
    }
}

async fn search_with_retry(
    provider: &dyn SearchProvider,
    query: &str,
    config: &DispatchConfig,
) -> Result<Vec<SourceDoc>, SearchError> {
    let attempts = config.max_attempts.max(1);
    let mut last_error: Option<SearchError> = None;

    for attempt in 0..attempts {
        match provider.search(query).await {
            Ok(docs) => return Ok(docs),
            Err(err) => {
                if !err.is_retryable() || attempt + 1 == attempts {
                    return Err(err);
                }
                let delay = backoff_delay(config.retry_base_delay, attempt);
                tracing::debug!(
                    query = %query,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    code = err.code(),
                    "search attempt failed, backing off"
                );
                last_error = Some(err);
                sleep(delay).await;
            }
        }
    }

    Err(last_error.unwrap_or_else(|| SearchError::provider("search", "unknown error", false)))
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u64.pow(attempt.min(5));
    base * multiplier as u32
}
