//! Export audio: per-track buffering and resampling, then mixing into the single encoded track.

pub mod buffer_pool;
pub mod encoder;
pub mod mixer;
pub mod resampler;
