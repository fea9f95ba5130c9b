//! Evidence evaluation and the sufficiency decision gate.
//!
//! Failures here are fatal to the iteration and propagate to the research
//! loop. A wrong sufficiency judgment would corrupt the loop's budget and
//! termination logic, so nothing in this module silently defaults.

use serde::{Deserialize, Serialize};

use crate::extract::extract_json;
use crate::gateway::{
    Attribution, GenerateRequest, Message, ModelGateway, ModelHandle, TokenUsage,
};
use crate::registry::QueryEvidence;

// =============================================================================
// Types
// =============================================================================

/// Continue/stop signal derived fresh from each iteration's reasoning trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ReasoningError {
    #[error("LLM call failed: {0}")]
    ModelFailed(#[from] crate::gateway::error::ProviderError),
    #[error("model returned an empty evaluation")]
    EmptyTrace,
    #[error("JSON parse failed: {0}")]
    JsonParse(String),
}

// =============================================================================
// System prompts
// =============================================================================

const REASONING_SYSTEM_PROMPT: &str = "\
You are an evidence analyst for an iterative web-research system. You receive \
a research topic, the current plan, the queries issued so far, and the \
accumulated evidence as numbered sources. Evaluate whether the evidence is \
sufficient to write a thorough report on the topic.

Structure your evaluation exactly as:
1. Decompose the topic into its essential sub-aspects.
2. For each sub-aspect, name the source numbers that support it, or flag it \
   as MISSING with a note on what kind of source would fill the gap.
3. End with a section titled VERDICT: one short paragraph stating whether \
   coverage is sufficient, and the single biggest gap if not.

Judge the evidence you were given, not what you know about the topic. A \
sub-aspect is supported only if a listed source actually addresses it.";

const DECISION_SYSTEM_PROMPT: &str = "\
You are the stopping gate of an iterative web-research system. You receive an \
analyst's evaluation of evidence coverage, the target length of the report to \
be written, and a confidence bar. Decide whether research should stop.

Stop (is_complete = true) only when the evaluation shows every essential \
sub-aspect supported well enough to write a report of the stated length at or \
above the stated confidence bar. Gaps that more searching plainly cannot fill \
(paywalled data, unreleased figures) do not count against stopping.

Respond with JSON only:
{
  \"is_complete\": false,
  \"reason\": \"One or two sentences justifying the verdict.\"
}";

// =============================================================================
// Evidence digest
// =============================================================================

/// Per-source character allowance in prompt digests before truncation.
const SOURCE_EXCERPT_CHARS: usize = 600;

/// Render accumulated evidence for a prompt, one block per query, each
/// source prefixed with its stable reference number so the model can cite
/// it as `[n]`. Truncates to roughly `max_chars`.
pub(crate) fn evidence_digest(evidence: &[QueryEvidence], max_chars: usize) -> String {
    let mut digest = String::new();

    for entry in evidence {
        let header = format!("### Query: {}\n", entry.query);
        if digest.len() + header.len() > max_chars {
            digest.push_str("\n*[remaining evidence truncated due to prompt budget]*");
            break;
        }
        digest.push_str(&header);

        if entry.sources.is_empty() {
            digest.push_str("(no results)\n");
        }
        for source in &entry.sources {
            let title = source.title.as_deref().unwrap_or("Untitled");
            let mut block = format!("[{}] {} — {}\n", source.reference, title, source.url);
            let excerpt = source
                .snippets
                .first()
                .map(String::as_str)
                .or(source.content.as_deref())
                .unwrap_or("");
            if !excerpt.is_empty() {
                let clipped: String = excerpt.chars().take(SOURCE_EXCERPT_CHARS).collect();
                block.push_str(&format!("    {clipped}\n"));
            }
            if digest.len() + block.len() > max_chars {
                digest.push_str("\n*[remaining evidence truncated due to prompt budget]*");
                return digest;
            }
            digest.push_str(&block);
        }
        digest.push('\n');
    }

    digest
}

/// Prompt budget for evidence digests, in characters.
const DIGEST_BUDGET_CHARS: usize = 48_000;

// =============================================================================
// Reasoner
// =============================================================================

/// Evaluate accumulated evidence against the topic, returning the
/// natural-language reasoning trace.
pub async fn evaluate_evidence(
    gateway: &dyn ModelGateway,
    model: &ModelHandle,
    attribution: Attribution,
    topic: &str,
    plan: &str,
    evidence: &[QueryEvidence],
    queries: &[String],
) -> Result<(String, TokenUsage), ReasoningError> {
    let query_list: String = queries.iter().map(|q| format!("- {q}\n")).collect();
    let user_prompt = format!(
        "## Topic\n\n{topic}\n\n## Current plan\n\n{plan}\n\n## Queries issued\n\n{query_list}\n## Evidence\n\n{}",
        evidence_digest(evidence, DIGEST_BUDGET_CHARS)
    );

    let messages = vec![
        Message::system(REASONING_SYSTEM_PROMPT),
        Message::user(user_prompt),
    ];

    let req = GenerateRequest::new(model.clone(), messages, attribution)
        .temperature(0.2)
        .max_tokens(4096);

    let resp = gateway.generate(req).await?;
    if resp.content.trim().is_empty() {
        return Err(ReasoningError::EmptyTrace);
    }
    Ok((resp.content, resp.usage))
}

// =============================================================================
// Decision gate
// =============================================================================

/// Convert the reasoning trace plus the output budget into a boolean
/// completion signal with a justification.
pub async fn decide_sufficiency(
    gateway: &dyn ModelGateway,
    model: &ModelHandle,
    attribution: Attribution,
    reasoning: &str,
    target_output_tokens: u32,
    confidence_threshold: f64,
) -> Result<(Decision, TokenUsage), ReasoningError> {
    let user_prompt = format!(
        "## Evidence evaluation\n\n{reasoning}\n\n## Report target\n\nApproximately \
         {target_output_tokens} tokens.\n\n## Confidence bar\n\n{confidence_threshold:.2}"
    );

    let messages = vec![
        Message::system(DECISION_SYSTEM_PROMPT),
        Message::user(user_prompt),
    ];

    let req = GenerateRequest::new(model.clone(), messages, attribution)
        .temperature(0.0)
        .max_tokens(512)
        .json();

    let resp = gateway.generate(req).await?;
    let usage = resp.usage;

    let json_str = extract_json(&resp.content);
    let decision: Decision = serde_json::from_str(json_str).map_err(|e| {
        let preview: String = resp.content.chars().take(500).collect();
        ReasoningError::JsonParse(format!("failed to parse decision: {} — raw: {}", e, preview))
    })?;

    Ok((decision, usage))
}
