use std::error;
use std::fmt;
use std::path::PathBuf;

/// Extract the configuration file path from the process arguments. Exactly
/// one positional argument is accepted.
pub fn config_path(args: impl IntoIterator<Item = String>) -> Result<PathBuf, UsageError> {
    let mut args = args.into_iter();
    let program = args.next().unwrap_or_else(|| "vidlink".to_string());
    match (args.next(), args.next()) {
        (Some(path), None) => Ok(PathBuf::from(path)),
        _ => Err(UsageError { program }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageError {
    program: String,
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Usage: {} <config-file>", self.program)
    }
}

impl error::Error for UsageError {}
