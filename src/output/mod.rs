//! Reading output module
//!
//! Where decibel readings go once computed.

mod console;

pub use console::{ConsoleSink, LevelSink};

#[cfg(test)]
pub use console::MockLevelSink;
