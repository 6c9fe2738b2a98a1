//! Single-line status display for a human operator.

use std::io::{self, Write};

const FRAMES: [&str; 3] = [".", "..", "..."];

/// Animation frame for the given attempt.
pub fn frame(attempt: u64) -> &'static str {
    FRAMES[(attempt % FRAMES.len() as u64) as usize]
}

/// Writes a status line that is redrawn in place with a carriage return.
/// Regular lines written in between first terminate the status line.
pub struct StatusLine<W> {
    out: W,
    active: bool,
}

impl<W: Write> StatusLine<W> {
    pub fn new(out: W) -> Self {
        Self { out, active: false }
    }

    /// Redraw the status line as `<message> Retrying<dots>`. Frames are
    /// padded to the same width so a short frame fully covers a long one.
    pub fn retrying(&mut self, message: &str, attempt: u64) -> io::Result<()> {
        write!(self.out, "\r{} Retrying{:<3}", message, frame(attempt))?;
        self.out.flush()?;
        self.active = true;
        Ok(())
    }

    pub fn line(&mut self, line: &str) -> io::Result<()> {
        if self.active {
            writeln!(self.out)?;
            self.active = false;
        }
        writeln!(self.out, "{}", line)?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {

    use super::{frame, StatusLine};

    #[test]
    fn frames_cycle() {
        assert_eq!(frame(0), ".");
        assert_eq!(frame(1), "..");
        assert_eq!(frame(2), "...");
        assert_eq!(frame(3), ".");
        assert_eq!(frame(u64::MAX), frame(u64::MAX % 3));
    }

    #[test]
    fn retrying_overwrites_line() {
        let mut status = StatusLine::new(Vec::new());
        for attempt in 0..4 {
            status.retrying("Disconnected from server.", attempt).unwrap();
        }
        let output = String::from_utf8(status.into_inner()).unwrap();
        assert_eq!(
            output,
            "\rDisconnected from server. Retrying.  \
             \rDisconnected from server. Retrying.. \
             \rDisconnected from server. Retrying...\
             \rDisconnected from server. Retrying.  ",
        );
        assert!(!output.contains('\n'));
    }

    #[test]
    fn line_terminates_status() {
        let mut status = StatusLine::new(Vec::new());
        status.line("first").unwrap();
        status.retrying("Failed to create pipeline.", 0).unwrap();
        status.line("second").unwrap();
        let output = String::from_utf8(status.into_inner()).unwrap();
        assert_eq!(output, "first\n\rFailed to create pipeline. Retrying.  \nsecond\n");
    }
}
