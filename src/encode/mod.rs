//! Video encoding, codec drain and container muxing.

pub mod codec;
pub mod drain;
/// `ffmpeg` subprocess muxer backend.
pub mod ffmpeg;
pub mod media;
pub mod muxer;
pub mod video;
pub mod worker;
