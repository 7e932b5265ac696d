//! Real-time metering pipeline
//!
//! Reads blocks from a source, computes their level and reports each reading
//! until a stop message arrives or the source fails.

use crate::audio::{BlockSource, MicrophoneError};
use crate::level::{BlockError, DecibelReading, SampleBlock};
use crate::output::LevelSink;
use std::io;
use thiserror::Error;
use tokio::sync::mpsc;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Readings between two debug summaries (0 disables them)
    pub summary_interval: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            summary_interval: 43, // ~1s of 1024-sample blocks @ 44.1kHz
        }
    }
}

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Audio error: {0}")]
    AudioError(#[from] MicrophoneError),

    #[error("Output error: {0}")]
    OutputError(#[from] io::Error),

    #[error("Wrong block length: got {got} samples, expected {expected}")]
    WrongBlockLength { expected: usize, got: usize },
}

impl From<BlockError> for PipelineError {
    fn from(err: BlockError) -> Self {
        match err {
            BlockError::WrongLength { expected, got } => {
                PipelineError::WrongBlockLength { expected, got }
            }
        }
    }
}

/// Pipeline state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStatus {
    /// Not running
    Stopped,
    /// Reading and reporting blocks
    Running,
    /// Releasing the source
    Stopping,
    /// Stopped on a fatal error
    Error(String),
}

/// Running min/max/mean over the readings since the last summary
#[derive(Debug, Default)]
struct LevelStats {
    count: u64,
    silent: u64,
    min_db: f64,
    max_db: f64,
    sum_db: f64,
}

impl LevelStats {
    fn record(&mut self, reading: &DecibelReading) {
        if reading.silent {
            self.silent += 1;
            return;
        }
        if self.count == 0 {
            self.min_db = reading.db;
            self.max_db = reading.db;
        } else {
            self.min_db = self.min_db.min(reading.db);
            self.max_db = self.max_db.max(reading.db);
        }
        self.sum_db += reading.db;
        self.count += 1;
    }

    fn mean_db(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum_db / self.count as f64)
    }
}

/// Metering pipeline over any block source and reading sink
pub struct MeterPipeline<S: BlockSource, K: LevelSink> {
    config: PipelineConfig,
    source: S,
    sink: K,
    status: PipelineStatus,
    readings: u64,
    stats: LevelStats,
}

impl<S: BlockSource, K: LevelSink> MeterPipeline<S, K> {
    pub fn new(source: S, sink: K, config: PipelineConfig) -> Self {
        Self {
            config,
            source,
            sink,
            status: PipelineStatus::Stopped,
            readings: 0,
            stats: LevelStats::default(),
        }
    }

    /// Runs until a message arrives on `stop_rx` or a fatal error occurs.
    ///
    /// The source is closed exactly once before returning, whatever the
    /// outcome. Returns the number of readings reported.
    pub async fn run(&mut self, stop_rx: &mut mpsc::Receiver<()>) -> Result<u64, PipelineError> {
        self.status = PipelineStatus::Running;
        tracing::info!("Pipeline started");

        let result = self.read_loop(stop_rx).await;

        self.status = PipelineStatus::Stopping;
        self.source.close();

        match result {
            Ok(readings) => {
                self.status = PipelineStatus::Stopped;
                tracing::info!("Pipeline stopped after {} readings", readings);
                Ok(readings)
            }
            Err(e) => {
                self.status = PipelineStatus::Error(e.to_string());
                tracing::error!("Pipeline failed after {} readings: {}", self.readings, e);
                Err(e)
            }
        }
    }

    async fn read_loop(&mut self, stop_rx: &mut mpsc::Receiver<()>) -> Result<u64, PipelineError> {
        loop {
            // Stop is checked first on every iteration, and also wins over a stalled read
            let next = tokio::select! {
                biased;
                _ = stop_rx.recv() => None,
                samples = self.source.read_block() => Some(samples),
            };

            let Some(samples) = next else {
                tracing::info!("Stop requested");
                return Ok(self.readings);
            };

            let block = SampleBlock::from_samples(samples?)?;
            let reading = block.reading();

            if reading.silent {
                tracing::trace!("Silent block, reporting floor");
            } else {
                tracing::trace!("Block rms {:.1}, {:.2} dB", reading.rms, reading.db);
            }

            self.sink.report(&reading)?;
            self.readings += 1;
            self.record(&reading);
        }
    }

    fn record(&mut self, reading: &DecibelReading) {
        self.stats.record(reading);

        let interval = self.config.summary_interval;
        if interval == 0 || self.readings % interval != 0 {
            return;
        }

        match self.stats.mean_db() {
            Some(mean) => tracing::debug!(
                "Last {} blocks: min {:.2} dB, max {:.2} dB, mean {:.2} dB, {} silent",
                interval,
                self.stats.min_db,
                self.stats.max_db,
                mean,
                self.stats.silent
            ),
            None => tracing::debug!("Last {} blocks: all silent", interval),
        }
        self.stats = LevelStats::default();
    }

    /// Returns the current pipeline status
    pub fn status(&self) -> &PipelineStatus {
        &self.status
    }

    /// Number of readings reported so far
    pub fn readings(&self) -> u64 {
        self.readings
    }
}
