pub mod announce;
pub mod cli;
pub mod codec;
pub mod config;
pub mod engine;
pub mod net;
pub mod pipeline;
pub mod runtime;
pub mod server;
pub mod status;
pub mod supervisor;

pub use codec::Codec;
pub use config::{ConfigError, MountPath, ReceiverConfig, ServerConfig, ServerProfile};
pub use engine::{Engine, EngineError, Pipeline, PipelineState, Service, ServiceEngine, TerminalEvent};
pub use pipeline::PipelineDescription;
pub use supervisor::{EosPolicy, RetrySupervisor, SupervisorExit};
