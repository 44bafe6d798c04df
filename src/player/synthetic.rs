use std::collections::VecDeque;
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::cases::Clip;
use crate::foundation::clock::SharedClock;
use crate::foundation::core::Canvas;
use crate::foundation::error::{MontageError, MontageResult};
use crate::player::{AudioObserver, DecodedFrame, PcmChunk, PlayerEvent, TrackPlayer};

pub const SYNTHETIC_SAMPLE_RATE_HZ: u32 = 44_100;
pub const SYNTHETIC_CHANNELS: u16 = 2;
/// Stereo frames per emitted PCM chunk.
pub const CHUNK_FRAMES: usize = 1_024;
/// Real-time interval between audio thread wake-ups.
const AUDIO_POLL: Duration = Duration::from_millis(2);
/// Chunks emitted per wake-up at most; a larger backlog is skipped.
const MAX_CHUNKS_PER_POLL: i64 = 32;

#[derive(Default)]
struct Playback {
    play_when_ready: bool,
    speed: f64,
    volume: f32,
    /// Source position at `anchor_ns`.
    anchor_source_ms: f64,
    anchor_ns: i64,
    /// Stereo frames emitted since playback started.
    audio_frames: i64,
    audio_anchor_ns: i64,
    observer: Option<Arc<dyn AudioObserver>>,
}

impl Playback {
    fn source_ms(&self, now_ns: i64) -> f64 {
        if self.play_when_ready {
            self.anchor_source_ms + (now_ns - self.anchor_ns) as f64 / 1e6 * self.speed
        } else {
            self.anchor_source_ms
        }
    }

    fn reanchor(&mut self, now_ns: i64) {
        self.anchor_source_ms = self.source_ms(now_ns);
        self.anchor_ns = now_ns;
    }
}

struct Shared {
    playback: Mutex<Playback>,
    released: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Playback> {
        self.playback
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Test-pattern decoder for one clip.
///
/// Frames are generated on demand at proxy resolution whenever the source position crosses a
/// frame boundary of the clip. PCM is a 44.1kHz stereo sine produced on a background thread in
/// real time against the session clock.
pub struct SyntheticPlayer {
    track: usize,
    clip: Clip,
    proxy: Canvas,
    clock: SharedClock,
    shared: Arc<Shared>,
    last_frame_index: Option<i64>,
    events: VecDeque<PlayerEvent>,
    failures_left: u32,
    audio: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SyntheticPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntheticPlayer")
            .field("track", &self.track)
            .field("clip", &self.clip)
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}

impl SyntheticPlayer {
    pub fn new(
        track: usize,
        clip: Clip,
        proxy_divisor: u32,
        clock: SharedClock,
    ) -> MontageResult<Self> {
        let dims = clip.dimensions();
        let divisor = proxy_divisor.max(1);
        let proxy = Canvas::new((dims.width / divisor).max(1), (dims.height / divisor).max(1))?;
        let shared = Arc::new(Shared {
            playback: Mutex::new(Playback {
                speed: 1.0,
                volume: 1.0,
                ..Playback::default()
            }),
            released: AtomicBool::new(false),
        });

        let thread_shared = shared.clone();
        let thread_clock = clock.clone();
        let audio = std::thread::Builder::new()
            .name(format!("synthetic-audio-{track}"))
            .spawn(move || audio_loop(track, &thread_shared, &thread_clock))
            .map_err(|e| MontageError::setup(format!("failed to spawn audio thread: {e}")))?;

        Ok(Self {
            track,
            clip,
            proxy,
            clock,
            shared,
            last_frame_index: None,
            events: VecDeque::from([PlayerEvent::Ready]),
            failures_left: 0,
            audio: Some(audio),
        })
    }

    /// Report idle instead of ready for the first `count` preparations.
    pub fn with_startup_failures(mut self, count: u32) -> Self {
        self.failures_left = count;
        if count > 0 {
            self.events.clear();
            self.events.push_back(PlayerEvent::Idle);
            self.failures_left -= 1;
        }
        self
    }

    pub fn clip(&self) -> Clip {
        self.clip
    }

    pub fn proxy_size(&self) -> Canvas {
        self.proxy
    }

    fn frame_at(&self, index: i64, source_ms: f64) -> DecodedFrame {
        let Canvas { width, height } = self.proxy;
        let [r, g, b] = clip_tint(self.clip);
        let bar = (index.rem_euclid(i64::from(width))) as u32;
        let mut pixels = Vec::with_capacity(self.proxy.pixel_count() * 4);
        for y in 0..height {
            for x in 0..width {
                if x == bar {
                    pixels.extend_from_slice(&[255, 255, 255, 255]);
                } else {
                    let shade = (y * 255 / height.max(1)) as u8;
                    pixels.extend_from_slice(&[r, g.saturating_add(shade / 4), b, 255]);
                }
            }
        }
        DecodedFrame {
            width,
            height,
            pixels: Arc::from(pixels),
            pts_ms: source_ms as i64,
        }
    }
}

fn clip_tint(clip: Clip) -> [u8; 3] {
    match clip {
        Clip::Uhd30 => [200, 60, 60],
        Clip::Portrait1080p30 => [60, 160, 200],
        Clip::Uhd60 => [90, 200, 90],
        Clip::Fhd120 => [210, 170, 50],
    }
}

fn audio_loop(track: usize, shared: &Shared, clock: &SharedClock) {
    let tone_hz = 220.0 * (track as f64 + 1.0);
    while !shared.released.load(Ordering::Acquire) {
        std::thread::sleep(AUDIO_POLL);
        let now = clock.now_ns();
        let mut chunks = Vec::new();
        let observer = {
            let mut pb = shared.lock();
            let Some(observer) = pb.observer.clone().filter(|_| pb.play_when_ready) else {
                continue;
            };
            let due = (now - pb.audio_anchor_ns) as f64 / 1e9 * f64::from(SYNTHETIC_SAMPLE_RATE_HZ);
            let backlog = (due as i64 - pb.audio_frames) / CHUNK_FRAMES as i64;
            if backlog > MAX_CHUNKS_PER_POLL {
                pb.audio_frames += (backlog - MAX_CHUNKS_PER_POLL) * CHUNK_FRAMES as i64;
            }
            for _ in 0..backlog.clamp(0, MAX_CHUNKS_PER_POLL) {
                chunks.push(sine_chunk(pb.audio_frames, tone_hz));
                pb.audio_frames += CHUNK_FRAMES as i64;
            }
            observer
        };
        for data in chunks {
            observer.on_audio(
                track,
                PcmChunk {
                    data,
                    sample_rate_hz: SYNTHETIC_SAMPLE_RATE_HZ,
                    channel_count: SYNTHETIC_CHANNELS,
                },
            );
        }
    }
}

/// One chunk of interleaved s16le stereo starting at frame `first_frame`.
pub fn sine_chunk(first_frame: i64, tone_hz: f64) -> Vec<u8> {
    let mut out = Vec::with_capacity(CHUNK_FRAMES * 4);
    for i in 0..CHUNK_FRAMES as i64 {
        let t = (first_frame + i) as f64 / f64::from(SYNTHETIC_SAMPLE_RATE_HZ);
        let v = ((TAU * tone_hz * t).sin() * 8_000.0) as i16;
        out.extend_from_slice(&v.to_le_bytes());
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

impl TrackPlayer for SyntheticPlayer {
    fn track(&self) -> usize {
        self.track
    }

    fn set_play_when_ready(&mut self, play: bool) {
        let now = self.clock.now_ns();
        let mut pb = self.shared.lock();
        if pb.play_when_ready == play {
            return;
        }
        pb.reanchor(now);
        pb.play_when_ready = play;
        if play {
            pb.audio_anchor_ns = now;
            pb.audio_frames = 0;
        }
    }

    fn play_when_ready(&self) -> bool {
        self.shared.lock().play_when_ready
    }

    fn seek_to(&mut self, source_ms: i64) {
        let now = self.clock.now_ns();
        let mut pb = self.shared.lock();
        pb.anchor_source_ms = source_ms as f64;
        pb.anchor_ns = now;
    }

    fn set_speed(&mut self, speed: f64) {
        let now = self.clock.now_ns();
        let mut pb = self.shared.lock();
        pb.reanchor(now);
        pb.speed = speed;
    }

    fn speed(&self) -> f64 {
        self.shared.lock().speed
    }

    fn set_volume(&mut self, volume: f32) {
        self.shared.lock().volume = volume;
    }

    fn volume(&self) -> f32 {
        self.shared.lock().volume
    }

    fn take_latest_frame(&mut self) -> Option<DecodedFrame> {
        let source_ms = self.shared.lock().source_ms(self.clock.now_ns());
        let index = (source_ms * self.clip.fps().as_f64() / 1_000.0).floor() as i64;
        if self.last_frame_index == Some(index) {
            return None;
        }
        self.last_frame_index = Some(index);
        Some(self.frame_at(index, source_ms))
    }

    fn frame_size(&self) -> (u32, u32) {
        let dims = self.clip.dimensions();
        (dims.width, dims.height)
    }

    fn poll_event(&mut self) -> Option<PlayerEvent> {
        self.events.pop_front()
    }

    fn retry(&mut self) -> MontageResult<()> {
        if self.shared.released.load(Ordering::Acquire) {
            return Err(MontageError::validation("player was released"));
        }
        if self.failures_left > 0 {
            self.failures_left -= 1;
            self.events.push_back(PlayerEvent::Idle);
        } else {
            self.events.push_back(PlayerEvent::Ready);
        }
        Ok(())
    }

    fn set_audio_observer(&mut self, observer: Option<Arc<dyn AudioObserver>>) {
        self.shared.lock().observer = observer;
    }

    fn release(&mut self) {
        self.shared.released.store(true, Ordering::Release);
        self.shared.lock().observer = None;
        if let Some(handle) = self.audio.take()
            && handle.join().is_err()
        {
            tracing::warn!(track = self.track, "synthetic audio thread panicked");
        }
    }
}

impl Drop for SyntheticPlayer {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/player/synthetic.rs"]
mod tests;
