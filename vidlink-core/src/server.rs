//! Startup of the relay and capture servers.

use std::error;
use std::fmt;
use std::io::{self, BufRead, Write};

use crate::announce::{announce, report_capture};
use crate::config::{ServerConfig, ServerProfile};
use crate::engine::{EngineError, Service, ServiceEngine, ServiceMount};
use crate::net::{self, InterfaceRecord, InterfaceSource, SelectError};
use crate::pipeline;

/// A bound RTSP service together with the interface it was announced on.
pub struct RunningServer<S> {
    pub service: S,
    pub interface: InterfaceRecord,
}

/// Bring up the RTSP server described by `config`.
///
/// The announced interface is chosen first, so nothing gets bound when the
/// host has no usable interface. The endpoint is printed on `output` only
/// after the engine has bound the service.
pub fn start<E, S, R, W>(
    engine: &mut E,
    config: &ServerConfig,
    interfaces: &S,
    input: R,
    mut output: W,
) -> Result<RunningServer<E::Service>, ServerError>
where
    E: ServiceEngine,
    S: InterfaceSource,
    R: BufRead,
    W: Write,
{
    let candidates = net::discover(interfaces).map_err(ServerError::Discover)?;
    let interface = net::select(&candidates, input, &mut output)?;

    let description = pipeline::build_server(config);
    tracing::debug!(%description, profile = %config.profile, "built server pipeline");

    let service = engine
        .bind_service(
            ServiceMount {
                port: config.port,
                path: &config.mount,
                description: &description,
            },
            Box::new(|| tracing::info!("client connected")),
        )
        .map_err(ServerError::Bind)?;
    tracing::info!(port = config.port, mount = %config.mount, "bound rtsp service");

    let announced = announce(&mut output, &interface, config.port, &config.mount, config.codec)
        .and_then(|()| match config.profile {
            ServerProfile::Capture => report_capture(&mut output, config, &description),
            ServerProfile::Relay => Ok(()),
        });
    if let Err(err) = announced {
        service.shutdown();
        return Err(ServerError::Io(err));
    }

    Ok(RunningServer { service, interface })
}

#[derive(Debug)]
pub enum ServerError {
    /// The network interfaces could not be enumerated.
    Discover(io::Error),
    Select(SelectError),
    Bind(EngineError),
    Io(io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ServerError::Discover(err) => write!(f, "failed to list network interfaces: {}", err),
            ServerError::Select(err) => write!(f, "{}", err),
            ServerError::Bind(err) => write!(f, "failed to start rtsp server: {}", err),
            ServerError::Io(err) => write!(f, "{}", err),
        }
    }
}

impl From<SelectError> for ServerError {
    fn from(error: SelectError) -> Self {
        ServerError::Select(error)
    }
}

impl From<io::Error> for ServerError {
    fn from(error: io::Error) -> Self {
        ServerError::Io(error)
    }
}

impl error::Error for ServerError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ServerError::Discover(err) | ServerError::Io(err) => Some(err),
            ServerError::Select(err) => Some(err),
            ServerError::Bind(err) => Some(err),
        }
    }
}
