//! Real-time metering pipeline module
//!
//! Handles the audio → level → console flow and its shutdown.

mod realtime;
mod shutdown;

pub use realtime::{MeterPipeline, PipelineConfig, PipelineError, PipelineStatus};
pub use shutdown::spawn_interrupt_listener;
