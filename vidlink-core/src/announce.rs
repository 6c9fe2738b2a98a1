use std::io::{self, Write};
use std::net::Ipv4Addr;

use crate::codec::Codec;
use crate::config::{MountPath, ServerConfig};
use crate::net::InterfaceRecord;
use crate::pipeline::PipelineDescription;

/// URL clients use to reach the stream.
pub fn stream_url(address: Ipv4Addr, port: u16, mount: &MountPath) -> String {
    format!("rtsp://{}:{}{}", address, port, mount)
}

/// Report the reachable endpoint of a bound RTSP service.
pub fn announce<W: Write>(
    out: &mut W,
    interface: &InterfaceRecord,
    port: u16,
    mount: &MountPath,
    codec: Codec,
) -> io::Result<()> {
    let url = stream_url(interface.address, port, mount);
    tracing::info!(%url, %codec, interface = %interface.name, "announcing stream");
    writeln!(out, "RTSP server ready at {} (codec: {})", url, codec)?;
    out.flush()
}

/// Report where the served video comes from.
pub fn report_capture<W: Write>(
    out: &mut W,
    config: &ServerConfig,
    description: &PipelineDescription,
) -> io::Result<()> {
    writeln!(
        out,
        "Capturing from /dev/video{} {}x{} @ {} fps",
        config.device_index, config.width, config.height, config.framerate,
    )?;
    writeln!(out, "Pipeline:\n{}", description)?;
    out.flush()
}
