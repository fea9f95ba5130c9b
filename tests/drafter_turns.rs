//! Report drafter state machine: turn accumulation, budget convergence,
//! and the single JSON-repair attempt.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use meridian::drafter::{draft_report, DraftContext};
use meridian::gateway::FinishReason;
use meridian::{
    Attribution, DraftError, GenerateRequest, GenerateResponse, ModelGateway, ProviderError,
    SessionConfig, TokenUsage,
};

/// Pops one canned response per call.
struct TurnScript {
    responses: Mutex<VecDeque<String>>,
}

impl TurnScript {
    fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
        }
    }
}

#[async_trait::async_trait]
impl ModelGateway for TurnScript {
    async fn generate(&self, _req: GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let content = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::provider("scripted", "script exhausted", false))?;
        Ok(GenerateResponse {
            content,
            usage: TokenUsage::new(50, 100),
            latency: Duration::from_millis(1),
            finish_reason: FinishReason::Stop,
        })
    }
}

fn turn(text: &str, phase: &str) -> String {
    serde_json::to_string(&serde_json::json!({
        "report_text": text,
        "phase": phase,
    }))
    .unwrap()
}

fn config(target_tokens: u32, max_tokens: u32) -> SessionConfig {
    SessionConfig {
        target_output_tokens: target_tokens,
        max_output_tokens: max_tokens,
        chars_per_token: 1,
        ..Default::default()
    }
}

fn ctx<'a>() -> DraftContext<'a> {
    DraftContext {
        topic: "test topic",
        plan: "test plan",
        reasoning: "VERDICT: covered",
        queries: &[],
        evidence: &[],
    }
}

async fn run(
    gateway: &TurnScript,
    config: &SessionConfig,
) -> Result<meridian::DraftOutcome, DraftError> {
    draft_report(
        gateway,
        config,
        &ctx(),
        Attribution::new("drafter::turn"),
        None,
        None,
    )
    .await
}

#[tokio::test]
async fn accumulates_across_turns_until_reported_done() {
    let gateway = TurnScript::new(&[
        &turn("# Report\n\nFirst part.", "continuation"),
        &turn("Second part.", "continuation"),
        &turn("Final part.", "done"),
    ]);
    let config = config(10_000, 20_000);

    let outcome = run(&gateway, &config).await.unwrap();

    assert_eq!(outcome.turns, 3);
    let first = outcome.text.find("First part").unwrap();
    let second = outcome.text.find("Second part").unwrap();
    let third = outcome.text.find("Final part").unwrap();
    assert!(first < second && second < third, "draft grows in order");
    // Three turns at 150 tokens each.
    assert_eq!(outcome.usage.total(), 450);
}

#[tokio::test]
async fn first_turn_past_target_concludes_immediately() {
    // target == max == 100 chars; the first turn already exceeds it.
    let long_text = "x".repeat(150);
    let gateway = TurnScript::new(&[&turn(&long_text, "continuation")]);
    let config = config(100, 100);

    let outcome = run(&gateway, &config).await.unwrap();

    assert_eq!(outcome.turns, 1);
    assert_eq!(outcome.text.len(), 150);
}

#[tokio::test]
async fn ceiling_forces_done_when_model_never_reports_completion() {
    // Every turn claims "continuation"; the hard ceiling must end it.
    let chunk = "y".repeat(400);
    let gateway = TurnScript::new(&[
        &turn(&chunk, "continuation"),
        &turn(&chunk, "continuation"),
        &turn(&chunk, "continuation"),
        &turn(&chunk, "continuation"),
        &turn(&chunk, "continuation"),
    ]);
    let config = config(1_000, 1_000);

    let outcome = run(&gateway, &config).await.unwrap();

    // 400 + 2 + 400 + 2 + 400 = 1204 >= 1000 after three turns.
    assert_eq!(outcome.turns, 3);
    assert!(outcome.text.len() >= 1_000);
}

#[tokio::test]
async fn empty_turn_forces_done_instead_of_spinning() {
    let gateway = TurnScript::new(&[
        &turn("Some content.", "continuation"),
        &turn("", "continuation"),
    ]);
    let config = config(10_000, 20_000);

    let outcome = run(&gateway, &config).await.unwrap();

    assert_eq!(outcome.turns, 2);
    assert_eq!(outcome.text, "Some content.");
}

#[tokio::test]
async fn truncated_turn_is_repaired_once() {
    // Second turn truncates mid-string; the structural repair closes it.
    let gateway = TurnScript::new(&[
        &turn("Opening section.", "continuation"),
        r#"{"report_text": "Truncated tail"#,
        &turn("Closing section.", "done"),
    ]);
    let config = config(10_000, 20_000);

    let outcome = run(&gateway, &config).await.unwrap();

    assert!(outcome.text.contains("Truncated tail"));
    assert!(outcome.text.contains("Closing section."));
    assert_eq!(outcome.turns, 3);
}

#[tokio::test]
async fn unrepairable_turn_aborts_with_partial_draft() {
    let gateway = TurnScript::new(&[
        &turn("Kept prefix.", "continuation"),
        "no JSON anywhere in this reply",
    ]);
    let config = config(10_000, 20_000);

    let err = run(&gateway, &config).await.unwrap_err();

    match err {
        DraftError::MalformedTurn { turn, partial, .. } => {
            assert_eq!(turn, 2);
            assert_eq!(partial, "Kept prefix.");
        }
        other => panic!("expected MalformedTurn, got {other:?}"),
    }
}

#[tokio::test]
async fn draft_length_is_monotonic_across_turns() {
    let gateway = TurnScript::new(&[
        &turn("aaa", "continuation"),
        &turn("bbb", "continuation"),
        &turn("ccc", "done"),
    ]);
    let config = config(10_000, 20_000);

    let outcome = run(&gateway, &config).await.unwrap();

    // 3 + 2 + 3 + 2 + 3: separators only ever add, never replace.
    assert_eq!(outcome.text, "aaa\n\nbbb\n\nccc");
}
