//! Audio capture module
//!
//! Handles the microphone stream and block-sized reads from it.

mod microphone;
mod source;

pub use microphone::{AudioConfig, AudioStream, MicrophoneError};
pub use source::BlockSource;
