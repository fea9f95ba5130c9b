//! Error types for the model gateway.

use std::time::Duration;
use thiserror::Error;

/// Source of a rate limit: local (our limiter) or remote (provider 429).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitSource {
    /// A local rate limiter blocked the request.
    Local,
    /// The provider returned a 429 response.
    Remote,
}

/// Errors that can occur when calling a model provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Rate limited - caller should retry after the specified duration.
    #[error("rate limited ({limit_source:?}), retry after {retry_after:?}")]
    RateLimited {
        retry_after: Duration,
        limit_source: RateLimitSource,
    },

    /// Invalid request - permanent error, don't retry.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Provider refused the request (content policy, etc.) - permanent error.
    #[error("refused: {0}")]
    Refused(String),

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

    /// Configuration error (missing API key, etc.).
    #[error("configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    /// Create a rate limited error from a remote provider response.
    pub fn rate_limited_remote(retry_after: Duration) -> Self {
        Self::RateLimited {
            retry_after,
            limit_source: RateLimitSource::Remote,
        }
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a refused error.
    pub fn refused(message: impl Into<String>) -> Self {
        Self::Refused(message.into())
    }

    /// Create a provider error.
    pub fn provider(provider: &'static str, message: impl Into<String>, retryable: bool) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            retryable,
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error is transient from the provider's point of view.
    ///
    /// The research core never retries model calls internally; this
    /// classification exists for gateway implementations and callers that
    /// retry at the session level.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Timeout(_) => true,
            Self::Provider { retryable, .. } => *retryable,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::InvalidRequest(_) => false,
            Self::Refused(_) => false,
            Self::Config(_) => false,
        }
    }

    /// Get a short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited {
                limit_source: RateLimitSource::Local,
                ..
            } => "rate_limited_local",
            Self::RateLimited {
                limit_source: RateLimitSource::Remote,
                ..
            } => "rate_limited_remote",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Refused(_) => "refused",
            Self::Provider { .. } => "provider_error",
            Self::Timeout(_) => "timeout",
            Self::Http(_) => "http_error",
            Self::Config(_) => "config_error",
        }
    }
}
