//! Boundary to the streaming engine.
//!
//! The engine executes pipeline descriptions and runs the RTSP service.
//! Everything in this crate talks to it through the traits below, so the
//! supervisor and the server startup can run against a fake engine.

use std::error;
use std::fmt;

use futures::future::BoxFuture;

use crate::config::MountPath;
use crate::pipeline::PipelineDescription;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Playing,
    Stopped,
}

/// Event that ends playback of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    Error(String),
    Eos,
}

impl fmt::Display for TerminalEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TerminalEvent::Error(message) => write!(f, "error: {}", message),
            TerminalEvent::Eos => write!(f, "end of stream"),
        }
    }
}

pub trait Engine {
    type Pipeline: Pipeline;

    fn instantiate(
        &mut self,
        description: &PipelineDescription,
    ) -> Result<Self::Pipeline, EngineError>;
}

pub trait Pipeline: Send {
    fn set_state(&mut self, state: PipelineState) -> Result<(), EngineError>;

    /// Resolves once the pipeline posts an error or reaches end of stream.
    /// There is no timeout.
    ///
    /// # Cancel safety
    ///
    /// The returned future must be cancel safe.
    fn wait_for_terminal_event(&mut self) -> BoxFuture<'_, TerminalEvent>;

    /// Stop the pipeline and free its resources.
    fn release(self);
}

/// Called whenever an RTSP client connects to the service.
pub type ClientCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// Everything the RTSP runtime needs to serve one mount.
#[derive(Debug, Clone, Copy)]
pub struct ServiceMount<'a> {
    pub port: u16,
    pub path: &'a MountPath,
    pub description: &'a PipelineDescription,
}

pub trait ServiceEngine {
    type Service: Service;

    /// Register the mount and start listening. Returns only after the
    /// listening socket is bound. The media pipeline is shared between all
    /// clients of the mount.
    fn bind_service(
        &mut self,
        mount: ServiceMount<'_>,
        on_client_connected: ClientCallback,
    ) -> Result<Self::Service, EngineError>;
}

pub trait Service {
    fn shutdown(self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The description could not be turned into a pipeline, or a resource
    /// it refers to is unavailable.
    Instantiate(String),
    /// The pipeline refused a state change.
    StateChange(String),
    /// The RTSP service could not bind its listening socket.
    Bind(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EngineError::Instantiate(message) => {
                write!(f, "failed to instantiate pipeline: {}", message)
            }
            EngineError::StateChange(message) => {
                write!(f, "failed to change pipeline state: {}", message)
            }
            EngineError::Bind(message) => write!(f, "failed to bind service: {}", message),
        }
    }
}

impl error::Error for EngineError {}
