//! Multi-turn, budget-aware report drafting.
//!
//! Each model call is capped to a bounded output size, so a long report is
//! produced by repeated turns that each append to a growing draft. The
//! model self-reports whether it considers the report finished; the drafter
//! trusts that signal for forward progress but overrides it once the hard
//! length ceiling is reached, so the loop cannot run unbounded even if the
//! model never reports completion.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Deserialize;

use crate::config::SessionConfig;
use crate::extract::{extract_json, repair_truncated_json};
use crate::gateway::{
    Attribution, GenerateRequest, Message, ModelGateway, TokenUsage,
};
use crate::reasoning::evidence_digest;
use crate::registry::QueryEvidence;
use crate::trace::{record_event, SessionEvent, TraceError, TraceSink};

// =============================================================================
// Types
// =============================================================================

/// Drafting phase. `Done` is terminal; the state is immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftPhase {
    Initial,
    Continuation,
    Done,
}

impl DraftPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftPhase::Initial => "initial",
            DraftPhase::Continuation => "continuation",
            DraftPhase::Done => "done",
        }
    }
}

/// Accumulated draft state, owned exclusively by the drafter.
#[derive(Debug, Clone)]
pub struct DraftState {
    pub text: String,
    pub phase: DraftPhase,
    pub turns: u32,
}

/// Read-only inputs for drafting, extracted from the finished session.
#[derive(Debug, Clone, Copy)]
pub struct DraftContext<'a> {
    pub topic: &'a str,
    pub plan: &'a str,
    pub reasoning: &'a str,
    pub queries: &'a [String],
    pub evidence: &'a [QueryEvidence],
}

/// Final draft plus the cumulative cost of producing it.
#[derive(Debug, Clone)]
pub struct DraftOutcome {
    pub text: String,
    pub turns: u32,
    pub usage: TokenUsage,
}

#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("LLM call failed: {0}")]
    ModelFailed(#[from] crate::gateway::error::ProviderError),
    /// A turn's structured response stayed unparseable after the single
    /// repair attempt. The partial draft is preserved for the caller.
    #[error("turn {turn} returned malformed JSON: {message}")]
    MalformedTurn {
        turn: u32,
        message: String,
        partial: String,
    },
    #[error("drafting cancelled after {turns} turns")]
    Cancelled { turns: u32, partial: String },
    #[error("trace error: {0}")]
    Trace(#[from] TraceError),
}

/// One turn's structured response.
#[derive(Debug, Deserialize)]
struct DraftTurnResponse {
    #[serde(default)]
    report_text: String,
    #[serde(default)]
    phase: String,
}

/// Per-turn output cap; the reason drafting is multi-turn at all.
const MAX_TURN_OUTPUT_TOKENS: u32 = 4096;

// =============================================================================
// System prompt
// =============================================================================

const DRAFTER_SYSTEM_PROMPT: &str = "\
You are writing a long-form research report from gathered evidence. You \
receive the topic, the research plan, an analyst's evaluation of the \
evidence, the queries issued, and the evidence itself as numbered sources.

Writing rules:
- Markdown, with a # title and ## section headings.
- Ground every substantive claim in the evidence, citing sources inline \
  with bracketed numbers: [3], or [2, 5] for multiple sources. Use the \
  numbers exactly as given in the evidence listing.
- Do not invent sources or cite numbers that do not appear in the listing.
- Do not append a bibliography; it is generated separately.
- Aim for the stated target length across the whole report.

You write the report across multiple turns. When a draft-so-far is \
provided, continue it: do not restart, do not summarize what is already \
written, and never repeat a heading that is already present.

Respond with JSON only:
{
  \"report_text\": \"The next portion of the report, in markdown.\",
  \"phase\": \"continuation\"
}
Set \"phase\" to \"done\" only when the report is complete.";

// =============================================================================
// Drafting
// =============================================================================

/// Produce a report of approximately `target_output_tokens` and at most
/// `max_output_tokens`, accumulating across turns.
pub async fn draft_report(
    gateway: &dyn ModelGateway,
    config: &SessionConfig,
    ctx: &DraftContext<'_>,
    attribution: Attribution,
    cancel_flag: Option<&AtomicBool>,
    trace: Option<&dyn TraceSink>,
) -> Result<DraftOutcome, DraftError> {
    let target_chars = config.target_chars();
    let max_chars = config.max_chars();

    let mut state = DraftState {
        text: String::new(),
        phase: DraftPhase::Initial,
        turns: 0,
    };
    let mut usage = TokenUsage::default();

    while state.phase != DraftPhase::Done {
        // Cancellation is honored between turns, never mid-call.
        if let Some(flag) = cancel_flag {
            if flag.load(Ordering::Relaxed) {
                return Err(DraftError::Cancelled {
                    turns: state.turns,
                    partial: state.text,
                });
            }
        }

        let messages = vec![
            Message::system(DRAFTER_SYSTEM_PROMPT),
            Message::user(build_turn_prompt(config, ctx, &state)),
        ];
        let req = GenerateRequest::new(
            config.drafting_model.clone(),
            messages,
            attribution.clone(),
        )
        .temperature(0.4)
        .max_tokens(MAX_TURN_OUTPUT_TOKENS)
        .json();

        let resp = gateway.generate(req).await?;
        usage.add(&resp.usage);
        let turn = state.turns + 1;

        let parsed = match parse_turn(&resp.content) {
            Ok(parsed) => parsed,
            Err(message) => {
                return Err(DraftError::MalformedTurn {
                    turn,
                    message,
                    partial: state.text,
                });
            }
        };

        let appended = parsed.report_text;
        if !appended.is_empty() {
            if !state.text.is_empty() {
                state.text.push_str("\n\n");
            }
            state.text.push_str(&appended);
        }

        let reported_done = parsed.phase.trim().eq_ignore_ascii_case("done");
        state.turns = turn;
        state.phase = if appended.is_empty() {
            // A turn that adds nothing cannot make progress; stop here
            // rather than re-asking with an identical prompt.
            DraftPhase::Done
        } else {
            next_phase(
                state.phase,
                reported_done,
                state.text.len(),
                target_chars,
                max_chars,
            )
        };

        tracing::debug!(
            turn,
            phase = state.phase.as_str(),
            draft_chars = state.text.len(),
            "draft turn completed"
        );
        record_event(
            trace,
            SessionEvent::DraftTurnCompleted {
                turn,
                phase: state.phase.as_str().to_string(),
                draft_chars: state.text.len(),
                output_tokens: resp.usage.output_tokens,
            },
        )?;
    }

    Ok(DraftOutcome {
        text: state.text,
        turns: state.turns,
        usage,
    })
}

/// Phase transition, evaluated after each turn.
///
/// Reaching either length budget forces `Done` regardless of what the model
/// reported. Below budget, the first turn always continues and later turns
/// follow the model's self-reported phase.
fn next_phase(
    current: DraftPhase,
    reported_done: bool,
    draft_len: usize,
    target_chars: usize,
    max_chars: usize,
) -> DraftPhase {
    if draft_len >= max_chars || draft_len >= target_chars {
        return DraftPhase::Done;
    }
    match current {
        DraftPhase::Initial => DraftPhase::Continuation,
        DraftPhase::Continuation => {
            if reported_done {
                DraftPhase::Done
            } else {
                DraftPhase::Continuation
            }
        }
        DraftPhase::Done => DraftPhase::Done,
    }
}

fn parse_turn(content: &str) -> Result<DraftTurnResponse, String> {
    let json_str = extract_json(content);
    match serde_json::from_str::<DraftTurnResponse>(json_str) {
        Ok(parsed) => Ok(parsed),
        Err(first_err) => {
            // One structural repair attempt, then give up.
            let repaired = repair_truncated_json(content)
                .ok_or_else(|| format!("unrepairable: {first_err}"))?;
            serde_json::from_str::<DraftTurnResponse>(&repaired)
                .map_err(|e| format!("repair parsed but did not match schema: {e}"))
        }
    }
}

fn build_turn_prompt(config: &SessionConfig, ctx: &DraftContext<'_>, state: &DraftState) -> String {
    let query_list: String = ctx.queries.iter().map(|q| format!("- {q}\n")).collect();
    let mut prompt = format!(
        "## Topic\n\n{}\n\n## Research plan\n\n{}\n\n## Evidence evaluation\n\n{}\n\n\
         ## Queries issued\n\n{}\n## Evidence\n\n{}\n\n## Target length\n\n\
         Approximately {} tokens for the whole report.",
        ctx.topic,
        ctx.plan,
        ctx.reasoning,
        query_list,
        evidence_digest(ctx.evidence, 32_000),
        config.target_output_tokens,
    );

    if state.phase == DraftPhase::Continuation {
        prompt.push_str(&format!(
            "\n\n## Draft so far\n\n{}\n\nContinue the report from where the draft ends. \
             Do not restart it and do not repeat any heading already present.",
            state.text
        ));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: usize = 400;
    const MAX: usize = 800;

    #[test]
    fn test_first_turn_below_budget_continues() {
        let phase = next_phase(DraftPhase::Initial, true, 100, TARGET, MAX);
        assert_eq!(phase, DraftPhase::Continuation);
    }

    #[test]
    fn test_first_turn_past_target_is_done() {
        // target == max, first turn already exceeds it
        let phase = next_phase(DraftPhase::Initial, false, 450, 400, 400);
        assert_eq!(phase, DraftPhase::Done);
    }

    #[test]
    fn test_continuation_trusts_reported_done() {
        let phase = next_phase(DraftPhase::Continuation, true, 100, TARGET, MAX);
        assert_eq!(phase, DraftPhase::Done);
        let phase = next_phase(DraftPhase::Continuation, false, 100, TARGET, MAX);
        assert_eq!(phase, DraftPhase::Continuation);
    }

    #[test]
    fn test_ceiling_overrides_reported_continuation() {
        let phase = next_phase(DraftPhase::Continuation, false, 900, TARGET, MAX);
        assert_eq!(phase, DraftPhase::Done);
    }

    #[test]
    fn test_parse_turn_valid() {
        let parsed =
            parse_turn(r##"{"report_text": "# Title\n\nBody [1].", "phase": "continuation"}"##)
                .unwrap();
        assert_eq!(parsed.phase, "continuation");
        assert!(parsed.report_text.starts_with("# Title"));
    }

    #[test]
    fn test_parse_turn_repairs_truncation() {
        let parsed = parse_turn(r#"{"report_text": "The market grew"#).unwrap();
        assert_eq!(parsed.report_text, "The market grew");
        assert!(parsed.phase.is_empty());
    }

    #[test]
    fn test_parse_turn_rejects_prose() {
        assert!(parse_turn("I could not produce the report.").is_err());
    }
}
