//! Abstraction over anything that yields sample blocks

use super::microphone::MicrophoneError;

/// A source of fixed-size sample blocks.
///
/// Implemented by [`super::AudioStream`] for the live microphone; the
/// pipeline only depends on this trait.
#[allow(async_fn_in_trait)]
pub trait BlockSource {
    /// Waits for the next block of samples
    async fn read_block(&mut self) -> Result<Vec<i16>, MicrophoneError>;

    /// Releases the underlying device.
    ///
    /// Returns `true` only for the call that actually released it.
    fn close(&mut self) -> bool;
}
