use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use crate::animation::keyframes::{SpriteGeometry, frame_effect};
use crate::config::EncoderSettings;
use crate::config::effects::TrackParams;
use crate::encode::codec::{CodecFactory, EncoderCodec, TrackFormat};
use crate::encode::drain::{DrainState, queue_input_with_retry};
use crate::encode::muxer::Muxer;
use crate::encode::worker::{WorkerGate, spawn_worker};
use crate::foundation::clock::SharedClock;
use crate::foundation::core::Canvas;
use crate::foundation::error::{MontageError, MontageResult};
use crate::player::DecodedFrame;
use crate::render::surface::Surface;
use crate::session::SessionEvent;

/// Fraction of the frame interval that must pass before another frame is considered.
pub const ADAPTIVE_INTERVAL_FACTOR: f64 = 0.8;

/// What the encoder needs to redraw one sprite.
#[derive(Clone, Debug)]
pub struct SpriteTrackData {
    pub play_when_ready: bool,
    pub geometry: SpriteGeometry,
    pub frame: Option<DecodedFrame>,
    /// Opacity override multiplied into the keyframe opacity.
    pub alpha: f32,
}

/// Snapshot of the composition handed from the render loop to the video encoder.
#[derive(Clone, Debug)]
pub struct EncoderFrameData {
    pub composition_time_ms: i64,
    pub timestamp_ns: i64,
    pub sprites: Vec<SpriteTrackData>,
}

/// Decides which render passes become encoded frames.
///
/// Presentation time is wall time since the first admitted pass scaled by the export speed.
/// A pass is admitted once more than `0.8` of a frame interval has passed since the previous
/// candidate and its interval bucket differs from the last admitted frame.
#[derive(Clone, Debug)]
pub struct EncodeCadence {
    interval_ns: i64,
    start_ns: Option<i64>,
    prev_pts_ns: Option<i64>,
    prev_adjusted_ns: Option<i64>,
    candidates: u64,
}

impl EncodeCadence {
    pub fn new(frame_interval_ns: i64) -> Self {
        Self {
            interval_ns: frame_interval_ns.max(1),
            start_ns: None,
            prev_pts_ns: None,
            prev_adjusted_ns: None,
            candidates: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.interval_ns);
    }

    /// Passes that cleared the interval check, admitted or not.
    pub fn candidates(&self) -> u64 {
        self.candidates
    }

    /// Presentation time of the frame to encode at `now_ns`, if any.
    pub fn admit(&mut self, now_ns: i64, speed: f64) -> Option<i64> {
        let start = *self.start_ns.get_or_insert(now_ns);
        let pts = ((now_ns - start) as f64 * speed) as i64;
        let adjusted = pts / self.interval_ns * self.interval_ns;

        let due = match self.prev_pts_ns {
            None => true,
            Some(prev) => (pts - prev) as f64 > self.interval_ns as f64 * ADAPTIVE_INTERVAL_FACTOR,
        };
        if !due {
            return None;
        }
        self.prev_pts_ns = Some(pts);
        self.candidates += 1;

        if self.prev_adjusted_ns == Some(adjusted) {
            return None;
        }
        self.prev_adjusted_ns = Some(adjusted);
        Some(adjusted)
    }
}

pub fn video_track_format(settings: &EncoderSettings) -> TrackFormat {
    TrackFormat::Video {
        codec: settings.codec,
        width: settings.resolution.width,
        height: settings.resolution.height,
        frame_rate: settings.frame_rate,
        bit_rate: settings.video_bitrate(),
        i_frame_interval_secs: settings.i_frame_interval_secs,
    }
}

#[derive(Debug)]
pub enum VideoMessage {
    Start,
    Stop,
    FrameAvailable(EncoderFrameData),
    /// The render target was recreated.
    UpdateCanvas(Canvas),
    Quit,
}

pub struct VideoEncoderSetup {
    pub settings: EncoderSettings,
    pub tracks: Vec<TrackParams>,
    pub codecs: Arc<dyn CodecFactory>,
    pub muxer: Muxer,
    pub clock: SharedClock,
    pub events: Sender<SessionEvent>,
}

/// Composites snapshots into frames and feeds them to a video codec on a worker thread.
pub struct VideoEncoder {
    tx: Sender<VideoMessage>,
    gate: Arc<WorkerGate>,
    handle: Option<JoinHandle<()>>,
}

impl VideoEncoder {
    pub fn start(setup: VideoEncoderSetup) -> MontageResult<Self> {
        setup.settings.validate()?;
        let (tx, rx) = mpsc::channel();
        let mut worker = VideoWorker::new(setup)?;
        let (gate, handle) = spawn_worker("video-encoder", move || worker.run(rx))?;
        tx.send(VideoMessage::Start)
            .map_err(|_| MontageError::setup("video encoder exited before start"))?;
        Ok(Self {
            tx,
            gate,
            handle: Some(handle),
        })
    }

    /// Queue a snapshot. Older snapshots still queued are skipped by the worker.
    pub fn frame_available(&self, data: EncoderFrameData) {
        self.post(VideoMessage::FrameAvailable(data));
    }

    pub fn update_canvas(&self, canvas: Canvas) {
        self.post(VideoMessage::UpdateCanvas(canvas));
    }

    pub fn stop(&self) {
        self.post(VideoMessage::Stop);
        self.post(VideoMessage::Quit);
    }

    pub fn is_recording(&self) -> bool {
        self.gate.is_running()
    }

    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!("video encoder thread panicked");
        }
    }

    fn post(&self, msg: VideoMessage) {
        if self.tx.send(msg).is_err() {
            tracing::debug!("video encoder already exited");
        }
    }
}

impl Drop for VideoEncoder {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

struct VideoWorker {
    settings: EncoderSettings,
    tracks: Vec<TrackParams>,
    codecs: Arc<dyn CodecFactory>,
    muxer: Muxer,
    clock: SharedClock,
    events: Sender<SessionEvent>,

    codec: Option<Box<dyn EncoderCodec>>,
    drain: DrainState,
    cadence: EncodeCadence,
    surface: Surface,
    frames: u64,
}

impl VideoWorker {
    fn new(setup: VideoEncoderSetup) -> MontageResult<Self> {
        let interval = setup.settings.fps()?.frame_interval_ns();
        let surface = Surface::new(setup.settings.resolution.canvas()?);
        Ok(Self {
            settings: setup.settings,
            tracks: setup.tracks,
            codecs: setup.codecs,
            muxer: setup.muxer,
            clock: setup.clock,
            events: setup.events,
            codec: None,
            drain: DrainState::new("video"),
            cadence: EncodeCadence::new(interval),
            surface,
            frames: 0,
        })
    }

    fn run(&mut self, rx: Receiver<VideoMessage>) {
        let mut pending: VecDeque<VideoMessage> = VecDeque::new();
        loop {
            let msg = match pending.pop_front() {
                Some(msg) => msg,
                None => match rx.recv() {
                    Ok(msg) => msg,
                    Err(_) => break,
                },
            };
            match msg {
                VideoMessage::Start => self.handle_start(),
                VideoMessage::Stop => self.handle_stop(),
                VideoMessage::FrameAvailable(mut data) => {
                    while let Ok(next) = rx.try_recv() {
                        match next {
                            VideoMessage::FrameAvailable(newer) => data = newer,
                            other => {
                                pending.push_back(other);
                                break;
                            }
                        }
                    }
                    self.handle_frame(&data);
                }
                VideoMessage::UpdateCanvas(canvas) => self.handle_update_canvas(canvas),
                VideoMessage::Quit => break,
            }
        }
        tracing::debug!(frames = self.frames, "video encoder loop exited");
    }

    fn report(&self, error: MontageError) {
        tracing::error!("video encoder: {error}");
        let _ = self.events.send(SessionEvent::Error {
            origin: "video encoder",
            error,
        });
    }

    fn open_codec(&self) -> MontageResult<Box<dyn EncoderCodec>> {
        let mut codec = self.codecs.create(&video_track_format(&self.settings))?;
        codec.start()?;
        Ok(codec)
    }

    fn handle_start(&mut self) {
        match self.open_codec() {
            Ok(codec) => {
                self.codec = Some(codec);
                self.cadence.reset();
                self.frames = 0;
                tracing::debug!(
                    width = self.surface.width(),
                    height = self.surface.height(),
                    codec = self.settings.codec.mime_type(),
                    "video encoder started"
                );
            }
            Err(e) => self.report(e),
        }
    }

    fn handle_stop(&mut self) {
        let Some(mut codec) = self.codec.take() else {
            return;
        };
        let result = self
            .drain
            .drain(codec.as_mut(), &self.muxer, true)
            .and_then(|()| codec.stop());
        if let Err(e) = result {
            self.report(e);
        }
        tracing::debug!(
            frames = self.frames,
            written = self.drain.samples_written(),
            dropped = self.drain.samples_dropped(),
            "video encoder stopped"
        );
    }

    fn handle_update_canvas(&mut self, canvas: Canvas) {
        let res = self.settings.resolution;
        if canvas.width != res.width || canvas.height != res.height {
            tracing::warn!(
                width = canvas.width,
                height = canvas.height,
                "ignoring canvas that does not match the encoder size"
            );
            return;
        }
        self.surface = Surface::new(canvas);
    }

    fn handle_frame(&mut self, data: &EncoderFrameData) {
        if self.codec.is_none() {
            return;
        }
        let Some(pts_ns) = self
            .cadence
            .admit(self.clock.now_ns(), self.settings.speed_factor)
        else {
            return;
        };
        if let Err(e) = self.encode_frame(data, pts_ns) {
            if let Some(mut codec) = self.codec.take()
                && let Err(stop_err) = codec.stop()
            {
                tracing::warn!("video codec stop failed: {stop_err}");
            }
            self.cadence.reset();
            self.report(e);
        }
    }

    fn encode_frame(&mut self, data: &EncoderFrameData, pts_ns: i64) -> MontageResult<()> {
        let codec = self
            .codec
            .as_mut()
            .ok_or_else(|| MontageError::codec("video codec missing"))?;
        self.drain.drain(codec.as_mut(), &self.muxer, false)?;

        self.surface.clear([0, 0, 0, 255]);
        let t_ms = data.composition_time_ms as f64;
        for (sprite, params) in data.sprites.iter().zip(&self.tracks) {
            let Some(frame) = sprite.frame.as_ref().filter(|_| sprite.play_when_ready) else {
                continue;
            };
            let mut effect = frame_effect(params, t_ms, sprite.geometry);
            effect.opacity *= sprite.alpha;
            self.surface.draw_sprite(frame, &effect);
        }

        queue_input_with_retry(codec.as_mut(), &self.surface.to_straight_rgba(), pts_ns / 1_000)?;
        self.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/video.rs"]
mod tests;
