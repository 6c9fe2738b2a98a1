pub mod app;
pub mod engine;
pub mod service;

pub use engine::{GstEngine, GstPipeline};
pub use service::{GstRtspEngine, GstRtspService};

/// Log to stderr, filtered by the `LOG` environment variable
/// (`LOG=vidlink_core=debug`, for example).
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("LOG"))
        .with_writer(std::io::stderr)
        .init();
}
