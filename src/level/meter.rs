//! RMS and decibel computation over fixed-size sample blocks

use thiserror::Error;

/// Number of samples in one block (one stream read)
pub const BLOCK_SIZE: usize = 1024;

/// Reading reported for a block whose RMS is zero.
///
/// A non-silent block of [`BLOCK_SIZE`] samples has an RMS of at least
/// `1 / sqrt(1024)`, i.e. about -30.1 dB, so the floor cannot be confused
/// with a measured level.
pub const SILENCE_FLOOR_DB: f64 = -100.0;

/// Sample block errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("block has {got} samples, expected {expected}")]
    WrongLength { expected: usize, got: usize },
}

/// One block of mono signed 16-bit samples, always exactly [`BLOCK_SIZE`] long
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBlock {
    samples: Vec<i16>,
}

impl SampleBlock {
    /// Wraps captured samples, rejecting anything that is not a full block
    pub fn from_samples(samples: Vec<i16>) -> Result<Self, BlockError> {
        if samples.len() != BLOCK_SIZE {
            return Err(BlockError::WrongLength {
                expected: BLOCK_SIZE,
                got: samples.len(),
            });
        }
        Ok(Self { samples })
    }

    #[cfg(test)]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Computes the loudness of this block
    pub fn reading(&self) -> DecibelReading {
        compute_db(&self.samples)
    }
}

impl TryFrom<Vec<i16>> for SampleBlock {
    type Error = BlockError;

    fn try_from(samples: Vec<i16>) -> Result<Self, Self::Error> {
        Self::from_samples(samples)
    }
}

/// Loudness of one block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecibelReading {
    /// Root mean square amplitude, in LSB units
    pub rms: f64,
    /// `20 * log10(rms)`, or [`SILENCE_FLOOR_DB`] when `silent`
    pub db: f64,
    /// The block carried no energy at all
    pub silent: bool,
}

/// Root mean square of the samples. Empty input yields 0.
pub fn compute_rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let s = f64::from(s);
            s * s
        })
        .sum();

    (sum_squares / samples.len() as f64).sqrt()
}

/// Converts the RMS of the samples to decibels.
///
/// Never yields NaN or infinities: a zero RMS maps to [`SILENCE_FLOOR_DB`].
pub fn compute_db(samples: &[i16]) -> DecibelReading {
    let rms = compute_rms(samples);

    if rms > 0.0 {
        DecibelReading {
            rms,
            db: 20.0 * rms.log10(),
            silent: false,
        }
    } else {
        DecibelReading {
            rms: 0.0,
            db: SILENCE_FLOOR_DB,
            silent: true,
        }
    }
}
