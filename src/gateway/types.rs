//! Core types for the model gateway.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

// =============================================================================
// ATTRIBUTION
// =============================================================================

/// Attribution for usage tracking and debugging.
///
/// Every request through the gateway carries attribution so we know:
/// - Which research session it belongs to (session_id)
/// - Which code path triggered it (caller)
#[derive(Debug, Clone, Default)]
pub struct Attribution {
    /// Research session this request is part of (if known).
    pub session_id: Option<Uuid>,
    /// Which code path made this call, for debugging.
    /// Use a static string like "planner::plan" or "drafter::turn".
    pub caller: &'static str,
}

impl Attribution {
    pub fn new(caller: &'static str) -> Self {
        Self {
            caller,
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

// =============================================================================
// MODEL HANDLE
// =============================================================================

/// Model capability handle, bound once at configuration time.
///
/// The handle names where a model lives and which model it is; gateway
/// implementations interpret it. Binding the handle at configuration time
/// means no call site ever infers a provider from a model-name prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelHandle {
    /// OpenRouter model, e.g. "anthropic/claude-sonnet-4-6"
    OpenRouter(String),
}

impl ModelHandle {
    pub fn openrouter(model_id: impl Into<String>) -> Self {
        ModelHandle::OpenRouter(model_id.into())
    }

    pub fn model_id(&self) -> &str {
        match self {
            ModelHandle::OpenRouter(id) => id,
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            ModelHandle::OpenRouter(_) => "openrouter",
        }
    }
}

// =============================================================================
// TOKEN USAGE
// =============================================================================

/// Token counts for a single model call, or an accumulated total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens consumed.
    pub input_tokens: u32,
    /// Output tokens generated.
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    /// Accumulate another call's usage into this total.
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

// =============================================================================
// GENERATION TYPES
// =============================================================================

/// Chat message role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Request for text generation.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Model to use.
    pub model: ModelHandle,
    /// Messages in the conversation.
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 - 2.0).
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Whether to request JSON output.
    pub json_mode: bool,
    /// Attribution for usage tracking.
    pub attribution: Attribution,
}

impl GenerateRequest {
    pub fn new(model: ModelHandle, messages: Vec<Message>, attribution: Attribution) -> Self {
        Self {
            model,
            messages,
            temperature: 0.0,
            max_tokens: None,
            json_mode: false,
            attribution,
        }
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown(String),
}

impl From<Option<String>> for FinishReason {
    fn from(s: Option<String>) -> Self {
        match s.as_deref() {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some(other) => FinishReason::Unknown(other.to_string()),
            None => FinishReason::Unknown("none".to_string()),
        }
    }
}

/// Response from a generation call.
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    /// Generated content.
    pub content: String,
    /// Token usage for this call.
    pub usage: TokenUsage,
    /// Time taken for the request.
    pub latency: Duration,
    /// Why the model stopped.
    pub finish_reason: FinishReason,
}

impl GenerateResponse {
    /// Empty response used when recording failed calls.
    pub(crate) fn empty() -> Self {
        Self {
            content: String::new(),
            usage: TokenUsage::default(),
            latency: Duration::from_millis(0),
            finish_reason: FinishReason::Unknown("error".to_string()),
        }
    }
}
