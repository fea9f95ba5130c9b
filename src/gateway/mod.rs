//! Model collaborator gateway.
//!
//! The research core never talks to a provider directly. It calls through
//! the [`ModelGateway`] trait, injected at session construction. Concrete
//! adapters (OpenRouter, local inference, scripted test doubles) live
//! outside the core.

pub mod error;
pub mod types;
pub mod usage;

use std::sync::Arc;

use usage::{ModelCallRecord, UsageSink as UsageSinkTrait};

pub use error::{ProviderError, RateLimitSource};
pub use types::*;
pub use usage::{ModelCallRecord as UsageRecord, NoopUsageSink, StderrUsageSink, UsageSink};

/// Capability to generate text from a model.
///
/// One call, one response. The core does not retry model calls internally;
/// transient failures surface to the caller, which decides whether the whole
/// phase is retried at the session level.
#[async_trait::async_trait]
pub trait ModelGateway: Send + Sync {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, ProviderError>;
}

/// Gateway wrapper that records every call through a [`UsageSink`].
///
/// Delegates to an inner gateway unchanged; the only added behavior is one
/// usage record per call, success or error.
pub struct InstrumentedGateway<G, U: UsageSinkTrait> {
    inner: G,
    usage_sink: Arc<U>,
}

#[async_trait::async_trait]
impl<G: ModelGateway, U: UsageSinkTrait> ModelGateway for InstrumentedGateway<G, U> {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        InstrumentedGateway::generate(self, req).await
    }
}

impl<G: ModelGateway, U: UsageSinkTrait> InstrumentedGateway<G, U> {
    pub fn new(inner: G, usage_sink: Arc<U>) -> Self {
        Self { inner, usage_sink }
    }

    pub async fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let provider = req.model.provider();
        let model = req.model.model_id().to_string();
        let session_id = req.attribution.session_id;
        let caller = req.attribution.caller;

        match self.inner.generate(req).await {
            Ok(resp) => {
                let record = ModelCallRecord::new(provider, model, caller)
                    .usage(resp.usage)
                    .session(session_id)
                    .latency(resp.latency.as_millis() as i32);
                self.usage_sink.record(record).await;
                Ok(resp)
            }
            Err(err) => {
                let empty = GenerateResponse::empty();
                let record = ModelCallRecord::new(provider, model, caller)
                    .usage(empty.usage)
                    .session(session_id)
                    .error(err.code());
                self.usage_sink.record(record).await;
                Err(err)
            }
        }
    }
}
