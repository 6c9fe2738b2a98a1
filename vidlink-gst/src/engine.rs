//! Receiver pipelines executed by GStreamer.

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};

use gst::prelude::*;

use vidlink_core::engine::{Engine, EngineError, Pipeline, PipelineState, TerminalEvent};
use vidlink_core::pipeline::PipelineDescription;

const TERMINAL_MESSAGES: &[gst::MessageType] = &[gst::MessageType::Error, gst::MessageType::Eos];

/// Builds pipelines with `gst::parse::launch`. GStreamer must have been
/// initialized with `gst::init` first.
#[derive(Debug, Clone, Copy, Default)]
pub struct GstEngine;

impl Engine for GstEngine {
    type Pipeline = GstPipeline;

    fn instantiate(
        &mut self,
        description: &PipelineDescription,
    ) -> Result<GstPipeline, EngineError> {
        let element = gst::parse::launch(description.as_str())
            .map_err(|err| EngineError::Instantiate(err.to_string()))?;
        let bus = element
            .bus()
            .ok_or_else(|| EngineError::Instantiate("pipeline has no bus".to_string()))?;
        // Subscribe before the pipeline starts so that no early error is
        // missed.
        let messages = bus.stream_filtered(TERMINAL_MESSAGES).boxed();
        Ok(GstPipeline { element, messages })
    }
}

pub struct GstPipeline {
    element: gst::Element,
    messages: BoxStream<'static, gst::Message>,
}

impl Pipeline for GstPipeline {
    fn set_state(&mut self, state: PipelineState) -> Result<(), EngineError> {
        let target = match state {
            PipelineState::Playing => gst::State::Playing,
            PipelineState::Stopped => gst::State::Null,
        };
        self.element
            .set_state(target)
            .map(|_| ())
            .map_err(|err| EngineError::StateChange(err.to_string()))
    }

    fn wait_for_terminal_event(&mut self) -> BoxFuture<'_, TerminalEvent> {
        async move {
            // CANCEL SAFETY: `StreamExt::next` is cancel safe.
            match self.messages.next().await {
                Some(message) => match message.view() {
                    gst::MessageView::Error(err) => {
                        tracing::debug!(debug = ?err.debug(), "pipeline error");
                        TerminalEvent::Error(err.error().to_string())
                    }
                    _ => TerminalEvent::Eos,
                },
                None => TerminalEvent::Error("pipeline bus closed".to_string()),
            }
        }
        .boxed()
    }

    fn release(mut self) {
        if let Err(err) = self.set_state(PipelineState::Stopped) {
            tracing::warn!(%err, "failed to stop pipeline");
        }
    }
}
