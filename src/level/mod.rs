//! Level computation module
//!
//! Turns a block of PCM samples into a decibel reading.

mod meter;

pub use meter::{
    compute_db, compute_rms, BlockError, DecibelReading, SampleBlock, BLOCK_SIZE,
    SILENCE_FLOOR_DB,
};
