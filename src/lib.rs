#![forbid(unsafe_code)]

//! # meridian
//!
//! Depth-bounded iterative research orchestration for LLMs.
//!
//! Given a topic, meridian alternates between planning searches, executing
//! them concurrently, reasoning over the accumulated evidence, and deciding
//! whether to continue. It then drafts a long-form cited report across
//! multiple budget-aware model turns and resolves its citations against a
//! stable per-session source registry.
//!
//! The model and search capabilities are collaborators behind narrow
//! traits ([`ModelGateway`], [`SearchProvider`]), injected at session
//! construction. The loop guarantees termination within `max_depth`
//! iterations regardless of model behavior, and the drafter guarantees a
//! bounded number of turns whenever the output token ceiling is finite.

pub mod citations;
pub mod config;
pub mod dispatch;
pub mod drafter;
pub mod extract;
pub mod gateway;
pub mod planner;
pub mod reasoning;
pub mod registry;
pub mod research;
pub mod search;
pub mod trace;

pub use citations::{bibliography, render_bibliography, resolve, BibliographyEntry};
pub use config::{ConfigError, SessionConfig};
pub use dispatch::{DispatchConfig, QueryResult, SearchDispatcher};
pub use drafter::{DraftError, DraftOutcome, DraftPhase, DraftState};
pub use gateway::{
    Attribution, GenerateRequest, GenerateResponse, InstrumentedGateway, Message, ModelGateway,
    ModelHandle, NoopUsageSink, ProviderError, Role, StderrUsageSink, TokenUsage, UsageSink,
};
pub use reasoning::Decision;
pub use registry::{EvidenceSet, QueryEvidence, Source, SourceRegistry};
pub use research::{
    Researcher, ResearchError, ResearchReport, ResearchSession, RunOptions, StopReason,
};
pub use search::{SearchError, SearchProvider, SourceDoc};
pub use trace::{JsonlTraceSink, SessionEvent, SessionTrace, TraceError, TraceSink, TraceWorker};
