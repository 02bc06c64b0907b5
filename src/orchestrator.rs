use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::augment::ContextRetriever;
use crate::config::CoordinatorConfig;
use crate::error::SessionError;
use crate::types::events::client::{GenerationParams, ResponseCreateEvent};
use crate::types::{AugmentationContext, ClientEvent};

/// Where generation requests go. Implemented by the connection manager;
/// mocked in tests. The epoch identifies the session the request belongs
/// to, so a send that outlives its session is refused rather than delivered
/// to a newer one.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OutboundSink: Send + Sync {
    async fn send(&self, epoch: u64, event: ClientEvent) -> Result<(), SessionError>;
}

/// Builds and emits one generation request per finalized user turn.
pub struct ResponseOrchestrator {
    retriever: Arc<dyn ContextRetriever>,
    config: Arc<CoordinatorConfig>,
}

impl ResponseOrchestrator {
    pub fn new(retriever: Arc<dyn ContextRetriever>, config: Arc<CoordinatorConfig>) -> Self {
        Self { retriever, config }
    }

    /// Fetches context for the utterance and sends a `response.create` over
    /// the session's outbound channel. Retrieval failure degrades to an
    /// empty context so the user still gets an answer; a closed channel
    /// drops the request with [`SessionError::ChannelNotReady`]; it is
    /// never queued or retried.
    pub async fn respond_to(
        &self,
        epoch: u64,
        utterance: &str,
        outbound: &dyn OutboundSink,
    ) -> Result<(), SessionError> {
        let context = match self.retriever.fetch(utterance).await {
            Ok(context) => context,
            Err(err) => {
                tracing::warn!(%err, "context retrieval failed, responding without grounding");
                AugmentationContext::empty()
            }
        };

        let request = self.build_request(utterance, &context);
        outbound
            .send(epoch, ClientEvent::ResponseCreate(request))
            .await
    }

    fn build_request(&self, utterance: &str, context: &AugmentationContext) -> ResponseCreateEvent {
        let instructions = self
            .config
            .render_instructions(context.as_str(), utterance);
        let mut params = GenerationParams::new(&instructions)
            .with_modalities(self.config.modalities().to_vec())
            .with_voice(self.config.voice())
            .with_output_audio_format(self.config.output_audio_format())
            .with_max_output_tokens(self.config.max_output_tokens());
        if let Some(temperature) = self.config.temperature() {
            params = params.with_temperature(temperature);
        }
        ResponseCreateEvent::new(params)
    }
}
