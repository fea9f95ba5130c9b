//! Search collaborator interface.
//!
//! The core consumes web search through the [`SearchProvider`] trait,
//! injected at session construction alongside the model gateway. Concrete
//! backends (Exa, Tavily, a local index, scripted test doubles) live
//! outside the core.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Raw evidence unit returned by a search, before registration.
///
/// Once registered, a doc is owned by the source registry and carries a
/// stable reference number (see [`crate::registry::Source`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDoc {
    /// Document URL. Also the dedup key; may be empty for degenerate
    /// providers (treated as its own key, never fatal).
    pub url: String,
    /// Document title, when the provider reports one.
    #[serde(default)]
    pub title: Option<String>,
    /// Source domain, e.g. "arxiv.org".
    #[serde(default)]
    pub domain: Option<String>,
    /// Cleaned page content, when fetched.
    #[serde(default)]
    pub content: Option<String>,
    /// Short relevance excerpts.
    #[serde(default)]
    pub snippets: Vec<String>,
}

impl SourceDoc {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            domain: None,
            content: None,
            snippets: Vec::new(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippets.push(snippet.into());
        self
    }
}

/// Errors that can occur when calling a search provider.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Rate limited - retryable after the reported delay, if any.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Provider error - may be retryable.
    #[error("{provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
        retryable: bool,
    },

    /// Request timed out - retryable.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// HTTP/network error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned a response the adapter could not decode.
    /// Treated as transient: providers intermittently truncate payloads.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Query rejected by the provider - permanent error.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl SearchError {
    pub fn provider(provider: &'static str, message: impl Into<String>, retryable: bool) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            retryable,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Whether the dispatcher should retry this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Timeout(_) => true,
            Self::Malformed(_) => true,
            Self::Provider { retryable, .. } => *retryable,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::InvalidQuery(_) => false,
        }
    }

    /// Get a short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Provider { .. } => "provider_error",
            Self::Timeout(_) => "timeout",
            Self::Http(_) => "http_error",
            Self::Malformed(_) => "malformed_response",
            Self::InvalidQuery(_) => "invalid_query",
        }
    }
}

/// Capability to run one search query.
#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SourceDoc>, SearchError>;
}
