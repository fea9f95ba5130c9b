//! The depth-bounded research loop.
//!
//! PLANNING → SEARCHING → REASONING → DECIDING, repeated until the depth
//! cap or a sufficient-evidence decision stops it. Depth is an
//! unconditional upper bound: no model output can extend the loop past
//! `max_depth` iterations. The loop owns all mutation of the session and
//! its source registry; concurrent search batches share nothing and merge
//! only at the join point between phases.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::citations::{self, BibliographyEntry};
use crate::config::{ConfigError, SessionConfig};
use crate::dispatch::SearchDispatcher;
use crate::drafter::{self, DraftContext, DraftError};
use crate::gateway::{Attribution, ModelGateway, TokenUsage};
use crate::planner::{self, PlanError};
use crate::reasoning::{self, Decision, ReasoningError};
use crate::registry::{EvidenceSet, QueryEvidence, SourceRegistry};
use crate::search::SearchProvider;
use crate::trace::{record_event, SessionEvent, TraceError, TraceSink};

// =============================================================================
// Session types
// =============================================================================

/// Why the research loop stopped, in check-priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxDepthReached,
    SufficientInfo,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::MaxDepthReached => "max_depth_reached",
            StopReason::SufficientInfo => "sufficient_info",
        }
    }
}

/// All state accumulated by one research session.
///
/// Owned by the caller and threaded through every phase, so partial
/// evidence stays retrievable for diagnostics even when a phase fails.
#[derive(Debug)]
pub struct ResearchSession {
    pub id: Uuid,
    pub topic: String,
    /// Completed plan/search/reason/decide cycles.
    pub depth: u32,
    /// Every query ever issued, append-only across iterations.
    pub queries: Vec<String>,
    /// One entry per issued query, deduplicated, append-only.
    pub evidence: EvidenceSet,
    /// Latest plan text; replaced each iteration.
    pub plan: String,
    /// Latest evidence evaluation; replaced each iteration.
    pub reasoning: Option<String>,
    /// Latest sufficiency decision; recomputed fresh each iteration.
    pub decision: Option<Decision>,
    /// Set once the loop stops.
    pub stop_reason: Option<StopReason>,
    /// URL → reference number map and all registered sources.
    pub registry: SourceRegistry,
    pub created_at: DateTime<Utc>,
}

impl ResearchSession {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            depth: 0,
            queries: Vec::new(),
            evidence: Vec::new(),
            plan: String::new(),
            reasoning: None,
            decision: None,
            stop_reason: None,
            registry: SourceRegistry::new(),
            created_at: Utc::now(),
        }
    }
}

/// The final artifact: resolved report text, bibliography, and what the
/// whole session cost in tokens.
#[derive(Debug)]
pub struct ResearchReport {
    pub text: String,
    pub bibliography: Vec<BibliographyEntry>,
    pub usage: TokenUsage,
    pub stop_reason: StopReason,
}

/// Optional per-run settings.
#[derive(Clone, Copy, Default)]
pub struct RunOptions<'a> {
    /// Checked at state-machine transition boundaries; never mid-call.
    pub cancel_flag: Option<&'a AtomicBool>,
    /// Session event log destination.
    pub trace: Option<&'a dyn TraceSink>,
}

// =============================================================================
// Errors
// =============================================================================

/// Terminal session error naming the phase that failed. Evidence gathered
/// before the failure remains in the caller's [`ResearchSession`].
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("planning failed: {0}")]
    Planning(#[from] PlanError),
    #[error("reasoning failed: {0}")]
    Reasoning(ReasoningError),
    #[error("decision failed: {0}")]
    Decision(ReasoningError),
    #[error("drafting failed: {0}")]
    Drafting(#[from] DraftError),
    #[error("session cancelled at depth {depth}")]
    Cancelled { depth: u32 },
    #[error("trace error: {0}")]
    Trace(#[from] TraceError),
}

// =============================================================================
// Researcher
// =============================================================================

/// Owns the collaborators and configuration for research sessions.
///
/// Collaborators are injected here, once, and passed down explicitly;
/// nothing in the crate reaches for process-wide state.
pub struct Researcher {
    gateway: Arc<dyn ModelGateway>,
    dispatcher: SearchDispatcher,
    config: SessionConfig,
}

impl Researcher {
    /// Build a researcher, validating configuration before any
    /// collaborator call can happen.
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        search: Arc<dyn SearchProvider>,
        config: SessionConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let dispatcher = SearchDispatcher::new(search, config.dispatch.clone());
        Ok(Self {
            gateway,
            dispatcher,
            config,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run a full session: research until stop, draft, resolve citations.
    pub async fn run(&self, topic: &str) -> Result<ResearchReport, ResearchError> {
        let mut session = ResearchSession::new(topic);
        self.run_session(&mut session, RunOptions::default()).await
    }

    /// Like [`Self::run`], but against a caller-owned session (preserved on
    /// failure) and with cancellation/tracing options.
    pub async fn run_session(
        &self,
        session: &mut ResearchSession,
        opts: RunOptions<'_>,
    ) -> Result<ResearchReport, ResearchError> {
        let mut usage = TokenUsage::default();
        let stop_reason = self.gather(session, opts, &mut usage).await?;
        session.stop_reason = Some(stop_reason);

        record_event(
            opts.trace,
            SessionEvent::ResearchStopped {
                depth: session.depth,
                stop_reason: stop_reason.as_str().to_string(),
                total_sources: session.registry.len(),
            },
        )?;

        let ctx = DraftContext {
            topic: &session.topic,
            plan: &session.plan,
            reasoning: session.reasoning.as_deref().unwrap_or(""),
            queries: &session.queries,
            evidence: &session.evidence,
        };
        let draft = drafter::draft_report(
            self.gateway.as_ref(),
            &self.config,
            &ctx,
            Attribution::new("drafter::turn").with_session(session.id),
            opts.cancel_flag,
            opts.trace,
        )
        .await?;
        usage.add(&draft.usage);

        let resolved = citations::resolve(&draft.text, &session.registry);
        Ok(ResearchReport {
            text: resolved.text,
            bibliography: resolved.bibliography,
            usage,
            stop_reason,
        })
    }

    /// Drive the plan/search/reason/decide loop until a stop condition.
    ///
    /// Stop conditions are checked in priority order at the top of each
    /// iteration: depth cap first, then the previous iteration's decision.
    async fn gather(
        &self,
        session: &mut ResearchSession,
        opts: RunOptions<'_>,
        usage: &mut TokenUsage,
    ) -> Result<StopReason, ResearchError> {
        let session_id = session.id;
        let mut seen_urls: HashSet<String> = session
            .evidence
            .iter()
            .flat_map(|entry| entry.sources.iter().map(|s| s.url.clone()))
            .collect();

        let stop = 'research: loop {
            if let Some(flag) = opts.cancel_flag {
                if flag.load(Ordering::Relaxed) {
                    return Err(ResearchError::Cancelled {
                        depth: session.depth,
                    });
                }
            }
            if session.depth >= self.config.max_depth {
                break 'research StopReason::MaxDepthReached;
            }
            if session.decision.as_ref().is_some_and(|d| d.is_complete) {
                break 'research StopReason::SufficientInfo;
            }

            let depth = session.depth;
            tracing::info!(session = %session_id, depth, "starting research iteration");

            // PLANNING: new queries are appended, never replace prior ones.
            let (plan, plan_usage) = planner::plan_queries(
                self.gateway.as_ref(),
                &self.config.planner_model,
                Attribution::new("planner::plan").with_session(session_id),
                &session.topic,
                session.reasoning.as_deref(),
                &session.queries,
                self.config.max_parallel_topics,
            )
            .await?;
            usage.add(&plan_usage);
            session.plan = plan.plan;
            let batch_queries = plan.queries;
            session.queries.extend(batch_queries.iter().cloned());
            record_event(
                opts.trace,
                SessionEvent::PlanningCompleted {
                    depth,
                    queries: batch_queries.clone(),
                    plan_chars: session.plan.len(),
                },
            )?;

            // SEARCHING: one concurrent batch. Per-query failures are
            // already absorbed inside the dispatcher.
            let results = self.dispatcher.dispatch(&batch_queries).await;

            // Register, then dedupe against everything seen so far. The
            // registry is only touched here, after the batch has joined.
            let fresh: EvidenceSet = results
                .into_iter()
                .map(|r| QueryEvidence {
                    sources: session.registry.register(&r.docs),
                    query: r.query,
                })
                .collect();
            let deduped = SourceRegistry::dedupe_against(&mut seen_urls, &fresh);
            let new_sources: usize = deduped.iter().map(|e| e.sources.len()).sum();
            session.evidence.extend(deduped);
            record_event(
                opts.trace,
                SessionEvent::SearchBatchCompleted {
                    depth,
                    queries: batch_queries.len(),
                    new_sources,
                    total_sources: session.registry.len(),
                },
            )?;

            // REASONING: fatal on failure, never defaulted.
            let (trace_text, reason_usage) = reasoning::evaluate_evidence(
                self.gateway.as_ref(),
                &self.config.reasoning_model,
                Attribution::new("reasoning::evaluate").with_session(session_id),
                &session.topic,
                &session.plan,
                &session.evidence,
                &session.queries,
            )
            .await
            .map_err(ResearchError::Reasoning)?;
            usage.add(&reason_usage);
            record_event(
                opts.trace,
                SessionEvent::ReasoningCompleted {
                    depth,
                    trace_chars: trace_text.len(),
                },
            )?;
            session.reasoning = Some(trace_text);

            // DECIDING: recomputed fresh from the current trace.
            let (decision, decide_usage) = reasoning::decide_sufficiency(
                self.gateway.as_ref(),
                &self.config.decision_model,
                Attribution::new("reasoning::decide").with_session(session_id),
                session.reasoning.as_deref().unwrap_or(""),
                self.config.target_output_tokens,
                self.config.confidence_threshold,
            )
            .await
            .map_err(ResearchError::Decision)?;
            usage.add(&decide_usage);
            record_event(
                opts.trace,
                SessionEvent::DecisionMade {
                    depth,
                    is_complete: decision.is_complete,
                    reason: decision.reason.clone(),
                },
            )?;
            session.decision = Some(decision);
            session.depth += 1;
        };

        tracing::info!(
            session = %session_id,
            depth = session.depth,
            stop_reason = stop.as_str(),
            sources = session.registry.len(),
            "research loop stopped"
        );
        Ok(stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reason_strings() {
        assert_eq!(StopReason::MaxDepthReached.as_str(), "max_depth_reached");
        assert_eq!(StopReason::SufficientInfo.as_str(), "sufficient_info");
    }

    #[test]
    fn test_new_session_is_empty() {
        let session = ResearchSession::new("solid state batteries");
        assert_eq!(session.depth, 0);
        assert!(session.queries.is_empty());
        assert!(session.evidence.is_empty());
        assert!(session.registry.is_empty());
        assert!(session.stop_reason.is_none());
    }
}
