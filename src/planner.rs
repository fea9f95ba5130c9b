//! Plan the next batch of search queries via LLM.

use serde::{Deserialize, Serialize};

use crate::extract::extract_json;
use crate::gateway::{
    Attribution, GenerateRequest, Message, ModelGateway, ModelHandle, TokenUsage,
};

// =============================================================================
// Types
// =============================================================================

/// Planning output for one research iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResponse {
    /// Narrative plan: what to investigate and why.
    #[serde(default)]
    pub plan: String,
    /// Concrete search queries to dispatch this iteration.
    #[serde(default)]
    pub queries: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("LLM call failed: {0}")]
    ModelFailed(#[from] crate::gateway::error::ProviderError),
    #[error("JSON parse failed: {0}")]
    JsonParse(String),
    #[error("Planning produced no usable queries")]
    NoQueries,
}

// =============================================================================
// System prompt
// =============================================================================

const PLANNER_SYSTEM_PROMPT: &str = "\
You are a research planner for an iterative web-research system. You receive \
a research topic, the queries already issued in earlier iterations, and (after \
the first iteration) an evaluation of what the gathered evidence still lacks. \
Your job is to plan the next batch of search queries.

Requirements:
- On the first iteration, plan queries that together cover the topic's main \
  aspects: definitions and background, current state, key actors, data and \
  evidence, open problems.
- On later iterations, target ONLY the gaps the evaluation flags. Do not \
  re-cover ground the evidence already supports.
- Never repeat a previously issued query, and avoid near-duplicates that \
  would return the same results.
- Each query must be a standalone web search string: specific, 3-10 words, \
  no meta-instructions.
- Fewer, sharper queries beat many vague ones.

Respond with JSON only:
{
  \"plan\": \"One short paragraph: what this batch investigates and why.\",
  \"queries\": [\"first search query\", \"second search query\"]
}";

// =============================================================================
// Planning
// =============================================================================

/// Plan the next batch of queries using an LLM.
///
/// New queries are deduplicated against `prior_queries` and clamped to
/// `breadth`. A model or parse failure propagates; planning output is never
/// guessed at, since a fabricated plan corrupts the loop's gap-targeting.
pub async fn plan_queries(
    gateway: &dyn ModelGateway,
    model: &ModelHandle,
    attribution: Attribution,
    topic: &str,
    reasoning: Option<&str>,
    prior_queries: &[String],
    breadth: usize,
) -> Result<(PlanResponse, TokenUsage), PlanError> {
    let mut user_prompt = format!("## Topic\n\n{topic}");

    if !prior_queries.is_empty() {
        user_prompt.push_str("\n\n## Queries already issued\n\n");
        for query in prior_queries {
            user_prompt.push_str(&format!("- {query}\n"));
        }
    }

    if let Some(reasoning) = reasoning {
        user_prompt.push_str(&format!(
            "\n\n## Evidence evaluation from the last iteration\n\n{reasoning}"
        ));
    }

    user_prompt.push_str(&format!(
        "\n\nPlan at most {breadth} queries for this iteration."
    ));

    let messages = vec![
        Message::system(PLANNER_SYSTEM_PROMPT),
        Message::user(user_prompt),
    ];

    let req = GenerateRequest::new(model.clone(), messages, attribution)
        .temperature(0.3)
        .max_tokens(2048)
        .json();

    let resp = gateway.generate(req).await?;
    let usage = resp.usage;

    let json_str = extract_json(&resp.content);
    let mut parsed: PlanResponse = serde_json::from_str(json_str).map_err(|e| {
        let preview: String = resp.content.chars().take(500).collect();
        PlanError::JsonParse(format!("failed to parse plan: {} — raw: {}", e, preview))
    })?;

    parsed.queries = filter_new_queries(parsed.queries, prior_queries, breadth);
    if parsed.queries.is_empty() {
        return Err(PlanError::NoQueries);
    }

    Ok((parsed, usage))
}

/// Drop empty, duplicate, and previously issued queries; clamp to `breadth`.
fn filter_new_queries(
    queries: Vec<String>,
    prior_queries: &[String],
    breadth: usize,
) -> Vec<String> {
    let mut kept: Vec<String> = Vec::new();
    for query in queries {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            continue;
        }
        let is_repeat = prior_queries
            .iter()
            .chain(kept.iter())
            .any(|q| q.trim().eq_ignore_ascii_case(trimmed));
        if is_repeat {
            continue;
        }
        kept.push(trimmed.to_string());
        if kept.len() >= breadth {
            break;
        }
    }
    kept
}
