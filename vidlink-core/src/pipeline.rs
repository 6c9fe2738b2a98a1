//! Pipeline descriptions in the GStreamer launch syntax.
//!
//! Descriptions are pure functions of a validated configuration. Values are
//! interpolated as-is; range checks belong to [`crate::config`].

use std::fmt;

use crate::config::{ReceiverConfig, ServerConfig, ServerProfile};

/// Textual pipeline description handed to the streaming engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineDescription(String);

impl PipelineDescription {
    pub fn new(description: impl Into<String>) -> Self {
        PipelineDescription(description.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PipelineDescription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maximum number of frames buffered between capture and encoder. Older
/// frames are dropped first when the encoder falls behind.
const QUEUE_MAX_BUFFERS: u32 = 2;

/// Keyframe interval of the encoder, in frames.
fn key_int_max(profile: ServerProfile) -> u32 {
    match profile {
        ServerProfile::Relay => 10,
        ServerProfile::Capture => 60,
    }
}

/// Play an RTSP source on the local display.
///
/// The sink does not synchronize against the clock, so late frames are
/// rendered instead of dropped.
pub fn build_receiver(config: &ReceiverConfig) -> PipelineDescription {
    let elements = config.codec.elements();
    PipelineDescription(format!(
        "rtspsrc location={url} latency={latency} protocols=udp ! \
         {depay} ! decodebin ! autovideosink sync=false",
        url = config.source_url,
        latency = config.latency_ms,
        depay = elements.depay,
    ))
}

/// Capture, encode and packetize the local camera for the RTSP server.
///
/// The description is wrapped in parentheses as required by the RTSP media
/// factory, and the payloader is named `pay0`. Codec parameters are sent
/// inline with every keyframe so that clients joining late can start
/// decoding without a new handshake.
pub fn build_server(config: &ServerConfig) -> PipelineDescription {
    let elements = config.codec.elements();
    PipelineDescription(format!(
        "( v4l2src device=/dev/video{device} do-timestamp=true ! timeoverlay ! \
         queue leaky=downstream max-size-buffers={queue} ! videoconvert ! \
         video/x-raw,format=I420,width={width},height={height},framerate={framerate}/1 ! \
         {enc} tune=zerolatency speed-preset=ultrafast key-int-max={key_int_max} ! \
         {parse} ! {mime} ! {pay} name=pay0 pt=96 config-interval=1 )",
        device = config.device_index,
        queue = QUEUE_MAX_BUFFERS,
        width = config.width,
        height = config.height,
        framerate = config.framerate,
        enc = elements.enc,
        key_int_max = key_int_max(config.profile),
        parse = elements.parse,
        mime = elements.mime,
        pay = elements.pay,
    ))
}
