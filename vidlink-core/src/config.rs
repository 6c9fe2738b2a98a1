//! Line-oriented `KEY=VALUE` configuration files.
//!
//! All roles share one parser. Lines are split at the first `=`, keys are
//! matched case-insensitively and whitespace around keys and values is
//! trimmed. Values are otherwise taken verbatim: there is no quoting and
//! there are no escapes. Blank lines and lines starting with `#` or `;` are
//! comments. Variables prefixed with `VIDLINK_` override values from the
//! file.
//!
//! Keys no role knows about are reported and otherwise ignored.

use std::collections::HashMap;
use std::error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileStoredFormat, Format, Map, Value};
use serde::Deserialize;

use crate::codec::Codec;
use crate::supervisor::EosPolicy;

/// Prefix of environment variables that override file values.
pub const ENV_PREFIX: &str = "vidlink";

/// The `KEY=VALUE` file format.
#[derive(Debug, Clone, Copy)]
pub struct KeyValue;

impl Format for KeyValue {
    fn parse(
        &self,
        uri: Option<&String>,
        text: &str,
    ) -> Result<Map<String, Value>, Box<dyn error::Error + Send + Sync>> {
        let mut entries = Map::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    entries.insert(
                        key.trim().to_ascii_lowercase(),
                        Value::new(uri, value.trim().to_string()),
                    );
                }
                _ => {
                    return Err(
                        format!("line {}: expected KEY=VALUE (got \"{}\")", index + 1, line).into(),
                    );
                }
            }
        }
        Ok(entries)
    }
}

impl FileStoredFormat for KeyValue {
    fn file_extensions(&self) -> &'static [&'static str] {
        &["conf", "txt"]
    }
}

/// Raw values of a configuration file, before validation.
///
/// All roles read the same superset of keys. Giving one key under two of
/// its aliases is a parse error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    #[serde(alias = "sourceurl")]
    src_url: Option<String>,
    #[serde(alias = "src_codec")]
    codec: Option<String>,
    #[serde(alias = "src_mount")]
    mount: Option<String>,
    #[serde(alias = "src_port")]
    port: Option<String>,
    width: Option<String>,
    height: Option<String>,
    fps: Option<String>,
    src_id: Option<String>,
    latency: Option<String>,
    on_eos: Option<String>,
    #[serde(flatten)]
    unknown: HashMap<String, Value>,
}

impl ConfigFile {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::NotFound {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::trace!(path = %path.display(), "read configuration file");
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Self::parse_with_env_prefix(contents, ENV_PREFIX)
    }

    pub fn parse_with_env_prefix(contents: &str, env_prefix: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(contents, KeyValue))
            .add_source(Environment::with_prefix(env_prefix))
            .build()
            .and_then(|config| config.try_deserialize::<ConfigFile>())
            .map_err(ConfigError::Parse)
    }

    fn warn_unknown(&self) {
        let mut unknown = self.unknown.keys().collect::<Vec<_>>();
        unknown.sort();
        for key in unknown {
            tracing::warn!(key = %key, "unrecognized configuration key (ignored)");
        }
    }
}

// Environment overrides do not pass through `KeyValue`.
fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string())
}

/// Path component of a served stream's URL. Always starts with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountPath(String);

impl MountPath {
    pub fn new(path: &str) -> Self {
        if path.starts_with('/') {
            MountPath(path.to_string())
        } else {
            MountPath(format!("/{path}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MountPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration of the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverConfig {
    pub source_url: String,
    pub codec: Codec,
    /// Jitter buffer latency of the RTSP source in milliseconds.
    pub latency_ms: u32,
    pub eos_policy: EosPolicy,
}

impl ReceiverConfig {
    pub const DEFAULT_LATENCY_MS: u32 = 100;

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_file(ConfigFile::read(path)?)
    }

    pub fn from_file(mut file: ConfigFile) -> Result<Self, ConfigError> {
        let source_url = required(trimmed(file.src_url.take()), "src_url")?;
        let codec = Codec::resolve(&required(trimmed(file.codec.take()), "codec")?);
        let latency_ms = trimmed(file.latency.take())
            .map(|value| positive(&value, "latency"))
            .transpose()?
            .unwrap_or(Self::DEFAULT_LATENCY_MS);
        let eos_policy = trimmed(file.on_eos.take())
            .map(|value| eos_policy(&value))
            .transpose()?
            .unwrap_or_default();
        file.warn_unknown();

        Ok(Self {
            source_url,
            codec,
            latency_ms,
            eos_policy,
        })
    }
}

/// The two server flavors differ in which keys are mandatory and in the
/// keyframe interval of the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerProfile {
    /// Fixed camera relay. Mount, port and codec must be configured.
    Relay,
    /// Configurable capture. Every key has a default.
    Capture,
}

impl fmt::Display for ServerProfile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ServerProfile::Relay => write!(f, "relay"),
            ServerProfile::Capture => write!(f, "capture"),
        }
    }
}

/// Configuration of the relay and capture servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub profile: ServerProfile,
    pub mount: MountPath,
    pub port: u16,
    pub codec: Codec,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// Index of the capture device (`/dev/video<index>`).
    pub device_index: u32,
}

impl ServerConfig {
    pub const DEFAULT_MOUNT: &'static str = "live0";
    pub const DEFAULT_PORT: u16 = 8554;
    pub const DEFAULT_CODEC: Codec = Codec::H265;
    pub const DEFAULT_WIDTH: u32 = 640;
    pub const DEFAULT_HEIGHT: u32 = 480;
    pub const DEFAULT_FRAMERATE: u32 = 30;
    pub const DEFAULT_DEVICE_INDEX: u32 = 0;

    pub fn load(path: &Path, profile: ServerProfile) -> Result<Self, ConfigError> {
        Self::from_file(ConfigFile::read(path)?, profile)
    }

    pub fn from_file(mut file: ConfigFile, profile: ServerProfile) -> Result<Self, ConfigError> {
        let mount = trimmed(file.mount.take());
        let port = trimmed(file.port.take());
        let codec = trimmed(file.codec.take());

        let (mount, port, codec) = match profile {
            ServerProfile::Relay => (
                required(mount, "mount")?,
                port_number(&required(port, "port")?)?,
                Codec::resolve(&required(codec, "codec")?),
            ),
            ServerProfile::Capture => (
                match mount {
                    Some(mount) => non_empty(mount, "mount")?,
                    None => Self::DEFAULT_MOUNT.to_string(),
                },
                match port {
                    Some(port) => port_number(&port)?,
                    None => Self::DEFAULT_PORT,
                },
                match codec {
                    Some(codec) => Codec::resolve(&non_empty(codec, "codec")?),
                    None => Self::DEFAULT_CODEC,
                },
            ),
        };

        let width = optional_positive(trimmed(file.width.take()), "width", Self::DEFAULT_WIDTH)?;
        let height =
            optional_positive(trimmed(file.height.take()), "height", Self::DEFAULT_HEIGHT)?;
        let framerate =
            optional_positive(trimmed(file.fps.take()), "fps", Self::DEFAULT_FRAMERATE)?;
        let device_index = trimmed(file.src_id.take())
            .map(|value| non_negative(&value, "src_id"))
            .transpose()?
            .unwrap_or(Self::DEFAULT_DEVICE_INDEX);
        file.warn_unknown();

        Ok(Self {
            profile,
            mount: MountPath::new(&mount),
            port,
            codec,
            width,
            height,
            framerate,
            device_index,
        })
    }
}

fn required(value: Option<String>, key: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(value) => non_empty(value, key),
        None => Err(ConfigError::invalid(key, "is required")),
    }
}

fn non_empty(value: String, key: &'static str) -> Result<String, ConfigError> {
    if value.is_empty() {
        Err(ConfigError::invalid(key, "must not be empty"))
    } else {
        Ok(value)
    }
}

fn positive(value: &str, key: &'static str) -> Result<u32, ConfigError> {
    match value.parse::<u32>() {
        Ok(number) if number > 0 => Ok(number),
        _ => Err(ConfigError::invalid(
            key,
            format!("must be a positive integer (got \"{value}\")"),
        )),
    }
}

fn optional_positive(
    value: Option<String>,
    key: &'static str,
    default: u32,
) -> Result<u32, ConfigError> {
    value
        .map(|value| positive(&value, key))
        .transpose()
        .map(|number| number.unwrap_or(default))
}

fn non_negative(value: &str, key: &'static str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| {
        ConfigError::invalid(
            key,
            format!("must be a non-negative integer (got \"{value}\")"),
        )
    })
}

fn port_number(value: &str) -> Result<u16, ConfigError> {
    match value.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ConfigError::invalid(
            "port",
            format!("must be a port number between 1 and 65535 (got \"{value}\")"),
        )),
    }
}

fn eos_policy(value: &str) -> Result<EosPolicy, ConfigError> {
    if value.eq_ignore_ascii_case("retry") {
        Ok(EosPolicy::Retry)
    } else if value.eq_ignore_ascii_case("stop") {
        Ok(EosPolicy::Stop)
    } else {
        Err(ConfigError::invalid(
            "on_eos",
            format!("must be \"retry\" or \"stop\" (got \"{value}\")"),
        ))
    }
}

#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file could not be opened or read.
    NotFound { path: PathBuf, source: io::Error },
    /// The file is not a well-formed list of `KEY=VALUE` lines.
    Parse(config::ConfigError),
    /// A key is missing or its value does not validate.
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::NotFound { path, source } => write!(
                f,
                "could not open configuration file {}: {}",
                path.display(),
                source
            ),
            ConfigError::Parse(err) => write!(f, "malformed configuration: {}", err),
            ConfigError::Invalid { key, reason } => {
                write!(f, "invalid configuration: {} {}", key, reason)
            }
        }
    }
}

impl error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ConfigError::NotFound { source, .. } => Some(source),
            ConfigError::Parse(err) => Some(err),
            ConfigError::Invalid { .. } => None,
        }
    }
}
