//! Audio capture from microphone
//!
//! Uses cpal for cross-platform capture and ringbuf to hand samples from the
//! device callback over to the block reader.

use super::source::BlockSource;
use crate::level::BLOCK_SIZE;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream, StreamConfig};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::sync::Notify;

/// Audio configuration for capture
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels (1 = mono)
    pub channels: u16,
    /// Samples returned by one read
    pub block_size: usize,
    /// Ring buffer capacity, in blocks
    pub buffered_blocks: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 1,
            block_size: BLOCK_SIZE,
            buffered_blocks: 8,
        }
    }
}

impl AudioConfig {
    /// Ring buffer capacity in samples
    pub fn ring_capacity(&self) -> usize {
        self.block_size * self.buffered_blocks.max(1)
    }

    /// Sample format to capture with, given the device's supported ranges
    /// as `(channels, format, min_rate, max_rate)`.
    ///
    /// i16 is taken as-is; f32 is converted in the callback.
    fn pick_format<I>(&self, ranges: I) -> Option<SampleFormat>
    where
        I: IntoIterator<Item = (u16, SampleFormat, u32, u32)>,
    {
        let mut picked = None;
        for (channels, format, min_rate, max_rate) in ranges {
            if channels != self.channels || !(min_rate..=max_rate).contains(&self.sample_rate) {
                continue;
            }
            match format {
                SampleFormat::I16 => return Some(SampleFormat::I16),
                SampleFormat::F32 => picked = Some(SampleFormat::F32),
                _ => {}
            }
        }
        picked
    }
}

/// Microphone capture errors
#[derive(Error, Debug)]
pub enum MicrophoneError {
    #[error("No audio input device found")]
    NoDevice,

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Stream not initialized")]
    NotInitialized,
}

/// State shared between the device callbacks and the block reader
#[derive(Default)]
struct Shared {
    ready: Notify,
    failure: OnceLock<String>,
    dropped: AtomicUsize,
}

/// Callback side of the capture ring buffer
struct BlockWriter {
    producer: HeapProd<i16>,
    shared: Arc<Shared>,
}

/// Reader side of the capture ring buffer, assembles fixed-size blocks
struct BlockReader {
    consumer: HeapCons<i16>,
    shared: Arc<Shared>,
}

/// Error callback handle
#[derive(Clone)]
struct ErrorSink {
    shared: Arc<Shared>,
}

fn block_channel(capacity: usize) -> (BlockWriter, BlockReader) {
    let (producer, consumer) = HeapRb::<i16>::new(capacity).split();
    let shared = Arc::new(Shared::default());
    (
        BlockWriter {
            producer,
            shared: Arc::clone(&shared),
        },
        BlockReader { consumer, shared },
    )
}

/// Full-scale f32 to i16, clamping out-of-range input
fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

impl BlockWriter {
    fn push_i16(&mut self, data: &[i16]) {
        let pushed = self.producer.push_slice(data);
        self.count_dropped(data.len() - pushed);
        self.shared.ready.notify_one();
    }

    fn push_f32(&mut self, data: &[f32]) {
        let rejected = data
            .iter()
            .filter(|&&s| self.producer.try_push(f32_to_i16(s)).is_err())
            .count();
        self.count_dropped(rejected);
        self.shared.ready.notify_one();
    }

    fn count_dropped(&self, dropped: usize) {
        if dropped > 0 {
            self.shared.dropped.fetch_add(dropped, Ordering::Relaxed);
        }
    }

    fn error_sink(&self) -> ErrorSink {
        ErrorSink {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl ErrorSink {
    /// Only a vanished device ends the capture; backend errors such as
    /// overruns are logged and streaming continues.
    fn report(&self, err: cpal::StreamError) {
        match err {
            cpal::StreamError::DeviceNotAvailable => {
                tracing::error!("Audio device lost: {}", err);
                let _ = self.shared.failure.set(err.to_string());
                self.shared.ready.notify_one();
            }
            other => tracing::warn!("Audio stream error: {}", other),
        }
    }
}

impl BlockReader {
    /// Waits until `block_size` samples are buffered and returns them.
    ///
    /// Fails once the device is gone; a partially filled block is discarded.
    async fn read(&mut self, block_size: usize) -> Result<Vec<i16>, MicrophoneError> {
        let mut block = vec![0i16; block_size];
        let mut filled = 0;

        loop {
            filled += self.consumer.pop_slice(&mut block[filled..]);

            if filled == block.len() {
                let dropped = self.shared.dropped.swap(0, Ordering::Relaxed);
                if dropped > 0 {
                    tracing::warn!("Ring buffer full, {} samples dropped", dropped);
                }
                return Ok(block);
            }

            if let Some(reason) = self.shared.failure.get() {
                if filled > 0 {
                    tracing::debug!("Discarding partial block of {} samples", filled);
                }
                return Err(MicrophoneError::StreamError(reason.clone()));
            }

            // a push between the pop above and this wait leaves a permit behind
            self.shared.ready.notified().await;
        }
    }

    #[cfg(test)]
    fn pending_dropped(&self) -> usize {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

/// Audio stream from the default microphone.
///
/// Owns the device for as long as it lives; `close` or drop releases it.
pub struct AudioStream {
    stream: Option<Stream>,
    reader: BlockReader,
    config: AudioConfig,
}

impl AudioStream {
    /// Opens the default input device with the default configuration
    pub fn open() -> Result<Self, MicrophoneError> {
        Self::with_config(AudioConfig::default())
    }

    /// Opens the default input device with a custom configuration
    pub fn with_config(config: AudioConfig) -> Result<Self, MicrophoneError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(MicrophoneError::NoDevice)?;

        tracing::info!("Audio device: {:?}", device.name());

        let ranges = device
            .supported_input_configs()
            .map_err(|e| MicrophoneError::ConfigError(e.to_string()))?
            .map(|range| {
                (
                    range.channels(),
                    range.sample_format(),
                    range.min_sample_rate().0,
                    range.max_sample_rate().0,
                )
            });

        let format = config.pick_format(ranges).ok_or_else(|| {
            MicrophoneError::UnsupportedFormat(format!(
                "{}Hz {}ch i16/f32",
                config.sample_rate, config.channels
            ))
        })?;

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (mut writer, reader) = block_channel(config.ring_capacity());
        let errors = writer.error_sink();

        let stream = match format {
            SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| writer.push_f32(data),
                move |err| errors.report(err),
                None,
            ),
            _ => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| writer.push_i16(data),
                move |err| errors.report(err),
                None,
            ),
        }
        .map_err(|e| MicrophoneError::StreamError(e.to_string()))?;

        tracing::info!(
            "Audio config: {}Hz {}ch {:?} -> i16, {} samples per block",
            config.sample_rate,
            config.channels,
            format,
            config.block_size
        );

        Ok(Self {
            stream: Some(stream),
            reader,
            config,
        })
    }

    /// Starts audio capture
    pub fn start(&self) -> Result<(), MicrophoneError> {
        if let Some(ref stream) = self.stream {
            stream
                .play()
                .map_err(|e| MicrophoneError::StreamError(e.to_string()))?;
            tracing::info!("Audio capture started");
            Ok(())
        } else {
            Err(MicrophoneError::NotInitialized)
        }
    }

    /// Waits until a full block has been captured and returns it.
    ///
    /// Fails once the device has been lost; a partially filled block is
    /// discarded in that case.
    pub async fn read_block(&mut self) -> Result<Vec<i16>, MicrophoneError> {
        if self.stream.is_none() {
            return Err(MicrophoneError::NotInitialized);
        }
        self.reader.read(self.config.block_size).await
    }

    /// Stops capture and releases the device. Safe to call more than once.
    pub fn close(&mut self) -> bool {
        match self.stream.take() {
            Some(stream) => {
                if let Err(e) = stream.pause() {
                    tracing::warn!("Failed to pause audio stream: {}", e);
                }
                drop(stream);
                tracing::info!("Audio capture stopped");
                true
            }
            None => false,
        }
    }

    /// Returns the audio configuration
    pub fn config(&self) -> &AudioConfig {
        &self.config
    }
}

impl BlockSource for AudioStream {
    async fn read_block(&mut self) -> Result<Vec<i16>, MicrophoneError> {
        AudioStream::read_block(self).await
    }

    fn close(&mut self) -> bool {
        AudioStream::close(self)
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{BackendSpecificError, StreamError};

    fn xrun() -> StreamError {
        StreamError::BackendSpecific {
            err: BackendSpecificError {
                description: "buffer overrun".into(),
            },
        }
    }

    #[test]
    fn default_config_is_mono_44k_1024() {
        let config = AudioConfig::default();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.channels, 1);
        assert_eq!(config.block_size, 1024);
        assert_eq!(config.ring_capacity(), 8 * 1024);
    }

    #[test]
    fn ring_holds_at_least_one_block() {
        let config = AudioConfig {
            buffered_blocks: 0,
            ..Default::default()
        };
        assert_eq!(config.ring_capacity(), config.block_size);
    }

    #[test]
    fn format_must_match_channels_and_rate() {
        let config = AudioConfig::default();

        assert_eq!(
            config.pick_format([(1, SampleFormat::I16, 8000, 96000)]),
            Some(SampleFormat::I16)
        );
        assert_eq!(
            config.pick_format([(1, SampleFormat::I16, 44100, 44100)]),
            Some(SampleFormat::I16)
        );
        assert_eq!(config.pick_format([(2, SampleFormat::I16, 8000, 96000)]), None);
        assert_eq!(config.pick_format([(1, SampleFormat::I16, 48000, 48000)]), None);
        assert_eq!(config.pick_format([(1, SampleFormat::U8, 8000, 96000)]), None);
    }

    #[test]
    fn f32_only_device_is_accepted() {
        let config = AudioConfig::default();
        assert_eq!(
            config.pick_format([
                (2, SampleFormat::I16, 44100, 44100),
                (1, SampleFormat::F32, 44100, 48000),
            ]),
            Some(SampleFormat::F32)
        );
    }

    #[test]
    fn i16_preferred_over_f32() {
        let config = AudioConfig::default();
        assert_eq!(
            config.pick_format([
                (1, SampleFormat::F32, 8000, 96000),
                (1, SampleFormat::I16, 8000, 96000),
            ]),
            Some(SampleFormat::I16)
        );
    }

    #[test]
    fn f32_samples_scale_and_clamp() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(0.5), 16383);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(1.5), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), -i16::MAX);
    }

    #[tokio::test]
    async fn block_assembled_from_three_pushes() {
        let (mut writer, mut reader) = block_channel(4 * 1024);

        let read = reader.read(1024);
        let feed = async {
            writer.push_i16(&[1; 400]);
            tokio::task::yield_now().await;
            writer.push_i16(&[2; 400]);
            tokio::task::yield_now().await;
            writer.push_i16(&[3; 224]);
        };
        let (block, ()) = tokio::join!(read, feed);

        let block = block.unwrap();
        assert_eq!(block.len(), 1024);
        assert!(block[..400].iter().all(|&s| s == 1));
        assert!(block[400..800].iter().all(|&s| s == 2));
        assert!(block[800..].iter().all(|&s| s == 3));
    }

    #[tokio::test]
    async fn parked_read_wakes_on_push() {
        let (mut writer, mut reader) = block_channel(2048);

        let read = reader.read(1024);
        tokio::pin!(read);

        // first poll finds an empty ring and parks on the notifier
        let early = tokio::select! {
            biased;
            block = &mut read => Some(block),
            _ = std::future::ready(()) => None,
        };
        assert!(early.is_none());

        writer.push_f32(&[0.5; 1024]);

        let block = read.await.unwrap();
        assert!(block.iter().all(|&s| s == 16383));
    }

    #[tokio::test]
    async fn device_loss_discards_partial_block() {
        let (mut writer, mut reader) = block_channel(2048);
        let errors = writer.error_sink();

        writer.push_i16(&[7; 500]);
        errors.report(StreamError::DeviceNotAvailable);

        let err = reader.read(1024).await.unwrap_err();
        assert!(matches!(err, MicrophoneError::StreamError(_)));

        // the failure sticks for later reads
        assert!(reader.read(1024).await.is_err());
    }

    #[tokio::test]
    async fn backend_error_does_not_end_read() {
        let (mut writer, mut reader) = block_channel(2048);
        let errors = writer.error_sink();

        let read = reader.read(1024);
        let feed = async {
            writer.push_i16(&[5; 500]);
            errors.report(xrun());
            tokio::task::yield_now().await;
            writer.push_i16(&[6; 524]);
        };
        let (block, ()) = tokio::join!(read, feed);

        let block = block.unwrap();
        assert_eq!(block.len(), 1024);
        assert_eq!(block[1023], 6);
    }

    #[tokio::test]
    async fn overflow_counted_then_reset_by_read() {
        let (mut writer, mut reader) = block_channel(1024);

        writer.push_i16(&[1; 1024]);
        writer.push_i16(&[2; 100]);
        writer.push_f32(&[0.1; 20]);
        assert_eq!(reader.pending_dropped(), 120);

        let block = reader.read(1024).await.unwrap();
        assert!(block.iter().all(|&s| s == 1));
        assert_eq!(reader.pending_dropped(), 0);
    }

    #[test]
    fn errors_display_reason() {
        assert_eq!(
            MicrophoneError::NoDevice.to_string(),
            "No audio input device found"
        );
        assert_eq!(
            MicrophoneError::StreamError("device unplugged".into()).to_string(),
            "Stream error: device unplugged"
        );
    }
}
