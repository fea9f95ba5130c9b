//! Usage tracking via the UsageSink trait.
//!
//! The gateway logs all model calls through a UsageSink. This decouples the
//! core from any specific storage backend:
//! - Services can implement a database-backed sink
//! - CLI tools use NoopUsageSink or StderrUsageSink
//! - Tests use NoopUsageSink or a collecting mock

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::types::TokenUsage;

/// Status of a model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Success,
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Success => "success",
            CallStatus::Error => "error",
        }
    }
}

/// Record of a model API call for logging.
#[derive(Debug, Clone)]
pub struct ModelCallRecord {
    /// Provider name: "openrouter", etc.
    pub provider: &'static str,
    /// Model used.
    pub model: String,
    /// Token usage for the call.
    pub usage: TokenUsage,
    /// Research session this call belongs to (if known).
    pub session_id: Option<Uuid>,
    /// Latency in milliseconds.
    pub latency_ms: i32,
    /// Call status.
    pub status: CallStatus,
    /// Error code if status is Error.
    pub error_code: Option<String>,
    /// Which code path made this call.
    pub caller: &'static str,
    /// When the call was made.
    pub timestamp: DateTime<Utc>,
}

impl ModelCallRecord {
    /// Create a new record with required fields, defaulting others.
    pub fn new(provider: &'static str, model: impl Into<String>, caller: &'static str) -> Self {
        Self {
            provider,
            model: model.into(),
            usage: TokenUsage::default(),
            session_id: None,
            latency_ms: 0,
            status: CallStatus::Success,
            error_code: None,
            caller,
            timestamp: Utc::now(),
        }
    }

    pub fn usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn session(mut self, session_id: Option<Uuid>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn latency(mut self, ms: i32) -> Self {
        self.latency_ms = ms;
        self
    }

    pub fn error(mut self, code: impl Into<String>) -> Self {
        self.status = CallStatus::Error;
        self.error_code = Some(code.into());
        self
    }
}

/// Trait for recording model call usage.
///
/// Implement this trait to customize where usage data is stored.
#[async_trait]
pub trait UsageSink: Send + Sync {
    /// Record a model call. This should be fire-and-forget:
    /// failures should be logged but not propagated.
    async fn record(&self, record: ModelCallRecord);
}

/// No-op usage sink that discards all records.
/// Useful for CLI tools and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageSink;

#[async_trait]
impl UsageSink for NoopUsageSink {
    async fn record(&self, _record: ModelCallRecord) {
        // Discard
    }
}

/// Usage sink that writes to stderr as JSON lines.
/// Useful for CLI tools that want to capture usage.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrUsageSink;

#[async_trait]
impl UsageSink for StderrUsageSink {
    async fn record(&self, record: ModelCallRecord) {
        // Simple JSON output to stderr
        eprintln!(
            r#"{{"provider":"{}","model":"{}","input_tokens":{},"output_tokens":{},"status":"{}","caller":"{}"}}"#,
            record.provider,
            record.model,
            record.usage.input_tokens,
            record.usage.output_tokens,
            record.status.as_str(),
            record.caller,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builder() {
        let record = ModelCallRecord::new("openrouter", "openai/gpt-5-mini", "planner::plan")
            .usage(TokenUsage::new(120, 80))
            .latency(450)
            .error("timeout");

        assert_eq!(record.status, CallStatus::Error);
        assert_eq!(record.error_code.as_deref(), Some("timeout"));
        assert_eq!(record.usage.total(), 200);
        assert_eq!(record.latency_ms, 450);
    }
}
