//! Session configuration.
//!
//! Values only; loading them from files or the environment belongs to the
//! embedding application. Validation runs synchronously at session
//! construction, before any collaborator call is made.

use thiserror::Error;

use crate::dispatch::DispatchConfig;
use crate::gateway::ModelHandle;

/// Characters per token used to convert token budgets into draft-length
/// thresholds. Rough approximation: 1 token ≈ 4 chars.
pub const DEFAULT_CHARS_PER_TOKEN: u32 = 4;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Hard upper bound on plan/search/reason/decide iterations (≥1).
    pub max_depth: u32,
    /// Maximum queries planned within a single iteration (≥1).
    pub max_parallel_topics: usize,
    /// Desired report length in tokens.
    pub target_output_tokens: u32,
    /// Hard ceiling on report length in tokens (≥ target).
    pub max_output_tokens: u32,
    /// Evidence-sufficiency bar in [0,1], passed to the decision gate.
    pub confidence_threshold: f64,
    /// Token → character conversion for draft-length budgets.
    pub chars_per_token: u32,
    /// Model for query planning.
    pub planner_model: ModelHandle,
    /// Model for evidence evaluation.
    pub reasoning_model: ModelHandle,
    /// Model for the sufficiency decision.
    pub decision_model: ModelHandle,
    /// Model for report drafting.
    pub drafting_model: ModelHandle,
    /// Search retry/backoff/concurrency knobs.
    pub dispatch: DispatchConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_parallel_topics: 4,
            target_output_tokens: 4_000,
            max_output_tokens: 8_000,
            confidence_threshold: 0.7,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            planner_model: ModelHandle::openrouter("openai/gpt-5-mini"),
            reasoning_model: ModelHandle::openrouter("openai/gpt-5-mini"),
            decision_model: ModelHandle::openrouter("openai/gpt-5-mini"),
            drafting_model: ModelHandle::openrouter("anthropic/claude-sonnet-4-6"),
            dispatch: DispatchConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_depth must be at least 1")]
    MaxDepthZero,
    #[error("max_parallel_topics must be at least 1")]
    NoParallelTopics,
    #[error("max_output_tokens ({max}) must be >= target_output_tokens ({target})")]
    OutputBudgetInverted { target: u32, max: u32 },
    #[error("confidence_threshold {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
    #[error("chars_per_token must be at least 1")]
    CharsPerTokenZero,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth < 1 {
            return Err(ConfigError::MaxDepthZero);
        }
        if self.max_parallel_topics < 1 {
            return Err(ConfigError::NoParallelTopics);
        }
        if self.max_output_tokens < self.target_output_tokens {
            return Err(ConfigError::OutputBudgetInverted {
                target: self.target_output_tokens,
                max: self.max_output_tokens,
            });
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::ConfidenceOutOfRange(self.confidence_threshold));
        }
        if self.chars_per_token < 1 {
            return Err(ConfigError::CharsPerTokenZero);
        }
        Ok(())
    }

    /// Target draft length in characters.
    pub fn target_chars(&self) -> usize {
        self.target_output_tokens as usize * self.chars_per_token as usize
    }

    /// Hard draft-length ceiling in characters.
    pub fn max_chars(&self) -> usize {
        self.max_output_tokens as usize * self.chars_per_token as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_output_budget_rejected() {
        let config = SessionConfig {
            target_output_tokens: 8_000,
            max_output_tokens: 4_000,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutputBudgetInverted {
                target: 8_000,
                max: 4_000
            })
        ));
    }

    #[test]
    fn test_zero_depth_rejected() {
        let config = SessionConfig {
            max_depth: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MaxDepthZero)));
    }

    #[test]
    fn test_zero_breadth_rejected() {
        let config = SessionConfig {
            max_parallel_topics: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NoParallelTopics)
        ));
    }

    #[test]
    fn test_confidence_out_of_range_rejected() {
        let config = SessionConfig {
            confidence_threshold: 1.2,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ConfidenceOutOfRange(_))
        ));
    }

    #[test]
    fn test_char_budgets() {
        let config = SessionConfig {
            target_output_tokens: 100,
            max_output_tokens: 100,
            chars_per_token: 1,
            ..Default::default()
        };
        assert_eq!(config.target_chars(), 100);
        assert_eq!(config.max_chars(), 100);
    }
}
