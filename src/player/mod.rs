//! Decoder seam: what the compositor and the audio pipeline need from a per-track player.

/// Retry policy for players that drop back to idle.
pub mod supervisor;
/// Built-in test-pattern player.
pub mod synthetic;

use std::sync::Arc;

use crate::foundation::error::MontageResult;

/// One decoded video frame, RGBA8 with straight alpha.
#[derive(Clone, Debug)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
    /// Source position of the frame.
    pub pts_ms: i64,
}

impl DecodedFrame {
    /// Texel at `(x, y)`; both must be in range.
    #[inline]
    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }
}

/// Raw interleaved s16le PCM exactly as the decoder produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct PcmChunk {
    pub data: Vec<u8>,
    pub sample_rate_hz: u32,
    pub channel_count: u16,
}

/// Receives PCM on the decoder's own thread.
pub trait AudioObserver: Send + Sync {
    fn on_audio(&self, track: usize, chunk: PcmChunk);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayerEvent {
    Ready,
    /// Dropped back to idle without being asked to.
    Idle,
    Error(String),
    Ended,
}

impl PlayerEvent {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Idle | Self::Error(_))
    }
}

/// Per-track decoder driven by the compositor.
pub trait TrackPlayer: Send {
    fn track(&self) -> usize;

    fn set_play_when_ready(&mut self, play: bool);
    fn play_when_ready(&self) -> bool;

    /// Jump to `source_ms` in the clip.
    fn seek_to(&mut self, source_ms: i64);

    fn set_speed(&mut self, speed: f64);
    fn speed(&self) -> f64;

    /// Passthrough volume; the export mix ignores it.
    fn set_volume(&mut self, volume: f32);
    fn volume(&self) -> f32;

    /// Most recent frame, if a new one arrived since the last call.
    fn take_latest_frame(&mut self) -> Option<DecodedFrame>;

    /// Full-resolution size of the clip.
    fn frame_size(&self) -> (u32, u32);

    fn poll_event(&mut self) -> Option<PlayerEvent>;

    /// Re-prepare after an idle or error state.
    fn retry(&mut self) -> MontageResult<()>;

    fn set_audio_observer(&mut self, observer: Option<Arc<dyn AudioObserver>>);

    fn release(&mut self);
}
