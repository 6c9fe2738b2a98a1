use std::fmt;

/// Video codec carried over RTP. Only the two variants below are supported
/// by the pipelines this crate builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    H264,
    H265,
}

/// GStreamer element names used for one codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecElements {
    pub depay: &'static str,
    pub parse: &'static str,
    pub enc: &'static str,
    pub pay: &'static str,
    pub mime: &'static str,
}

const H264_ELEMENTS: CodecElements = CodecElements {
    depay: "rtph264depay",
    parse: "h264parse",
    enc: "x264enc",
    pay: "rtph264pay",
    mime: "video/x-h264",
};

const H265_ELEMENTS: CodecElements = CodecElements {
    depay: "rtph265depay",
    parse: "h265parse",
    enc: "x265enc",
    pay: "rtph265pay",
    mime: "video/x-h265",
};

impl Codec {
    /// Resolve a codec from its configuration value.
    ///
    /// Matching is case-insensitive. `265`, `hevc` and `h265` select H.265;
    /// every other value falls back to H.264. Callers are expected to
    /// reject empty values before resolving.
    pub fn resolve(value: &str) -> Codec {
        let value = value.trim();
        if ["265", "hevc", "h265"]
            .iter()
            .any(|synonym| value.eq_ignore_ascii_case(synonym))
        {
            Codec::H265
        } else {
            if !["264", "h264", "avc"]
                .iter()
                .any(|synonym| value.eq_ignore_ascii_case(synonym))
            {
                tracing::warn!(value, "unrecognized codec (falling back to H.264)");
            }
            Codec::H264
        }
    }

    /// Canonical identifier as used in configuration files.
    pub fn id(&self) -> &'static str {
        match self {
            Codec::H264 => "264",
            Codec::H265 => "265",
        }
    }

    pub fn elements(&self) -> &'static CodecElements {
        match self {
            Codec::H264 => &H264_ELEMENTS,
            Codec::H265 => &H265_ELEMENTS,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Codec::H264 => write!(f, "H.264"),
            Codec::H265 => write!(f, "H.265"),
        }
    }
}
