use std::error;
use std::fmt;
use std::io::{self, BufRead, Write};

use super::interfaces::InterfaceRecord;

/// Pick the interface to announce the stream on.
///
/// A single candidate is selected without asking. With more than one, the
/// candidates are listed on `output` and an index is read from `input`
/// until a valid one is entered.
pub fn select<R, W>(
    candidates: &[InterfaceRecord],
    mut input: R,
    mut output: W,
) -> Result<InterfaceRecord, SelectError>
where
    R: BufRead,
    W: Write,
{
    match candidates {
        [] => Err(SelectError::NoInterfaceFound),
        [only] => {
            writeln!(
                output,
                "Only one interface connected, selecting: {}",
                only
            )?;
            Ok(only.clone())
        }
        _ => {
            writeln!(output, "Available interfaces:")?;
            for (index, candidate) in candidates.iter().enumerate() {
                writeln!(output, "  [{}] {}", index, candidate)?;
            }

            let mut line = Vec::new();
            loop {
                write!(output, "Select an interface by index: ")?;
                output.flush()?;

                line.clear();
                if input.read_until(b'\n', &mut line)? == 0 {
                    return Err(SelectError::InputClosed);
                }

                match String::from_utf8_lossy(&line).trim().parse::<usize>() {
                    Ok(index) if index < candidates.len() => {
                        tracing::debug!(index, interface = %candidates[index], "selected interface");
                        return Ok(candidates[index].clone());
                    }
                    _ => {
                        writeln!(output, "Invalid index. Try again.")?;
                    }
                }
            }
        }
    }
}

#[derive(Debug)]
pub enum SelectError {
    /// No interface is up with an IPv4 address assigned.
    NoInterfaceFound,
    /// Input ended before a valid index was entered.
    InputClosed,
    Io(io::Error),
}

impl fmt::Display for SelectError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SelectError::NoInterfaceFound => {
                write!(f, "no network interface with an IPv4 address found")
            }
            SelectError::InputClosed => write!(f, "input closed before an interface was selected"),
            SelectError::Io(err) => write!(f, "{}", err),
        }
    }
}

impl From<io::Error> for SelectError {
    fn from(error: io::Error) -> Self {
        SelectError::Io(error)
    }
}

impl error::Error for SelectError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            SelectError::Io(err) => Some(err),
            _ => None,
        }
    }
}
