//! Console output of decibel readings

use crate::level::DecibelReading;
use std::io::{self, Write};

#[cfg(test)]
use mockall::automock;

/// Receives every reading produced by the pipeline, in order
#[cfg_attr(test, automock)]
pub trait LevelSink {
    fn report(&mut self, reading: &DecibelReading) -> io::Result<()>;
}

/// Writes one `Current dB level: <value> dB` line per reading
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> LevelSink for ConsoleSink<W> {
    fn report(&mut self, reading: &DecibelReading) -> io::Result<()> {
        writeln!(self.out, "Current dB level: {:.2} dB", reading.db)?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::{compute_db, BLOCK_SIZE, SILENCE_FLOOR_DB};

    #[test]
    fn writes_one_line_per_reading() {
        let mut sink = ConsoleSink::new(Vec::new());

        sink.report(&compute_db(&[i16::MAX; BLOCK_SIZE])).unwrap();
        sink.report(&compute_db(&[0; BLOCK_SIZE])).unwrap();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            text,
            format!(
                "Current dB level: 90.31 dB\nCurrent dB level: {:.2} dB\n",
                SILENCE_FLOOR_DB
            )
        );
    }
}
