use crate::animation::keyframes::{FrameEffect, SpriteGeometry, frame_effect};
use crate::config::effects::TrackParams;
use crate::foundation::core::COMPOSITION_DURATION_MS;
use crate::player::{DecodedFrame, TrackPlayer};

/// Time a track starts decoding ahead of its slot while playing or exporting.
pub const PREROLL_MS: i64 = 100;

/// Per-track playback state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlayerState {
    Play,
    #[default]
    Pause,
    Seek,
    Export,
}

/// Export-time change in a track's audio contribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackActivity {
    Started(usize),
    Finished(usize),
}

/// Whether composition time `t_ms` falls inside a slot widened by `preroll_ms` at its start.
pub fn is_within_window(t_ms: i64, position_ms: i64, duration_ms: i64, preroll_ms: i64) -> bool {
    !(t_ms < position_ms - preroll_ms || t_ms > position_ms + duration_ms)
}

/// Instantaneous frame-rate accumulator.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FpsStats {
    pub min: f64,
    pub max: f64,
    sum: f64,
    count: u64,
    last_frame_ms: Option<i64>,
}

impl FpsStats {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record a frame arriving at `now_ms`.
    pub fn record(&mut self, now_ms: i64) {
        if let Some(prev) = self.last_frame_ms {
            let dt = now_ms - prev;
            if dt > 0 {
                let fps = 1_000.0 / dt as f64;
                if self.count == 0 {
                    self.min = fps;
                    self.max = fps;
                } else {
                    self.min = self.min.min(fps);
                    self.max = self.max.max(fps);
                }
                self.sum += fps;
                self.count += 1;
            }
        }
        self.last_frame_ms = Some(now_ms);
    }

    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn samples(&self) -> u64 {
        self.count
    }
}

/// Result of one draw-pass update of a sprite.
#[derive(Clone, Debug)]
pub struct SpriteUpdate {
    /// Effect to draw with, `None` when the sprite is out of its slot.
    pub effect: Option<FrameEffect>,
    pub activity: Vec<TrackActivity>,
}

/// One track on the compositor: a player plus its position on the composition timeline.
pub struct Sprite {
    params: TrackParams,
    player: Box<dyn TrackPlayer>,
    state: PlayerState,
    play_when_ready: bool,
    finished: bool,
    stopped: bool,
    system_start_ms: i64,
    time_position_ms: i64,
    preroll_ms: i64,
    export_speed: f64,
    volume: f32,
    geometry: SpriteGeometry,
    frame: Option<DecodedFrame>,
    fps: FpsStats,
    fps_average: f64,
}

impl std::fmt::Debug for Sprite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sprite")
            .field("track", &self.player.track())
            .field("effect", &self.params.effect)
            .field("state", &self.state)
            .field("time_position_ms", &self.time_position_ms)
            .field("play_when_ready", &self.play_when_ready)
            .finish_non_exhaustive()
    }
}

impl Sprite {
    pub fn new(params: TrackParams, player: Box<dyn TrackPlayer>) -> Self {
        Self {
            params,
            player,
            state: PlayerState::Pause,
            play_when_ready: false,
            finished: false,
            stopped: true,
            system_start_ms: 0,
            time_position_ms: 0,
            preroll_ms: 0,
            export_speed: 1.0,
            volume: 0.0,
            geometry: SpriteGeometry::default(),
            frame: None,
            fps: FpsStats::default(),
            fps_average: 0.0,
        }
    }

    pub fn track(&self) -> usize {
        self.player.track()
    }

    pub fn params(&self) -> &TrackParams {
        &self.params
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn play_when_ready(&self) -> bool {
        self.play_when_ready
    }

    pub fn time_position_ms(&self) -> i64 {
        self.time_position_ms
    }

    pub fn system_start_ms(&self) -> i64 {
        self.system_start_ms
    }

    pub fn geometry(&self) -> SpriteGeometry {
        self.geometry
    }

    /// Latest frame pulled from the player.
    pub fn frame(&self) -> Option<&DecodedFrame> {
        self.frame.as_ref()
    }

    pub fn fps_average(&self) -> f64 {
        self.fps_average
    }

    pub fn player(&self) -> &dyn TrackPlayer {
        self.player.as_ref()
    }

    pub fn player_mut(&mut self) -> &mut dyn TrackPlayer {
        self.player.as_mut()
    }

    /// Start or stop the player. Leaving playback marks the track finished.
    pub fn set_play_when_ready(&mut self, play: bool) -> Option<TrackActivity> {
        self.player.set_play_when_ready(play);
        self.play_when_ready = play;
        let track = self.track();
        if play {
            (self.state == PlayerState::Export && !self.finished)
                .then_some(TrackActivity::Started(track))
        } else {
            self.finished = true;
            if self.state == PlayerState::Export {
                self.fps_average = self.fps.average();
                Some(TrackActivity::Finished(track))
            } else {
                None
            }
        }
    }

    pub fn play(&mut self, now_ms: i64) {
        self.finished = false;
        self.preroll_ms = PREROLL_MS;
        self.system_start_ms = now_ms - self.time_position_ms;
        self.state = PlayerState::Play;
        self.fps.reset();
        self.stopped = false;
    }

    pub fn pause(&mut self) {
        if matches!(self.state, PlayerState::Play | PlayerState::Export) && self.fps.samples() > 0
        {
            tracing::info!(
                track = self.track(),
                min = self.fps.min,
                max = self.fps.max,
                average = self.fps.average(),
                "track fps"
            );
        }
        self.preroll_ms = 0;
        if self.state == PlayerState::Export {
            self.player.set_speed(self.params.play_speed());
            self.player.set_volume(1.0);
            self.fps_average = self.fps.average();
        }
        self.state = PlayerState::Pause;
        self.stopped = true;
    }

    /// Prepare for an export run at `speed_factor` composition time per wall-clock unit.
    pub fn export(&mut self, now_ms: i64, speed_factor: f64) {
        self.finished = false;
        self.export_speed = speed_factor;
        let play_speed = self.params.play_speed();
        // Slow playback lags behind its nominal rate.
        let corrected = if play_speed < 0.5 {
            play_speed * 1.2
        } else {
            play_speed
        };
        self.player.set_speed(speed_factor * corrected);
        self.player.set_volume(0.0);
        self.time_position_ms = 0;
        self.system_start_ms = now_ms;
        self.state = PlayerState::Export;
        self.fps.reset();
        self.preroll_ms = PREROLL_MS;
        self.stopped = false;
    }

    /// Move to composition time `t_ms`.
    pub fn seek(&mut self, t_ms: i64) {
        self.state = PlayerState::Seek;
        let source = ((t_ms - self.params.position_ms) as f64 * self.params.play_speed()
            + self.params.start_video_from_ms as f64) as i64;
        self.player.seek_to(source.max(0));
        self.time_position_ms = t_ms;
    }

    /// Whether the track is inside its slot, starting or stopping the player on the edges.
    fn is_rendering(&mut self, activity: &mut Vec<TrackActivity>) -> bool {
        let running = matches!(self.state, PlayerState::Play | PlayerState::Export);
        if self.finished && running {
            return false;
        }
        let inside = is_within_window(
            self.time_position_ms,
            self.params.position_ms,
            self.params.duration_ms,
            self.preroll_ms,
        );
        if !inside {
            if self.play_when_ready && self.state != PlayerState::Seek {
                activity.extend(self.set_play_when_ready(false));
            }
            return false;
        }
        if self.state != PlayerState::Export {
            self.player.set_volume(self.volume);
        }
        if !self.play_when_ready && self.state != PlayerState::Seek {
            self.fps.reset();
            if !self.stopped {
                activity.extend(self.set_play_when_ready(true));
            }
        }
        true
    }

    /// Advance the timeline to `now_ms`, pull the newest frame and evaluate the effect.
    pub fn update(&mut self, now_ms: i64) -> SpriteUpdate {
        let mut activity = Vec::new();
        match self.state {
            PlayerState::Play => self.time_position_ms = now_ms - self.system_start_ms,
            PlayerState::Export => {
                self.time_position_ms =
                    (self.export_speed * (now_ms - self.system_start_ms) as f64) as i64;
            }
            PlayerState::Pause | PlayerState::Seek => {}
        }
        if matches!(self.state, PlayerState::Play | PlayerState::Export)
            && self.time_position_ms > COMPOSITION_DURATION_MS
        {
            self.time_position_ms = COMPOSITION_DURATION_MS;
            self.fps_average = self.fps.average();
        }

        let t = self.time_position_ms;
        let effect = frame_effect(&self.params, t as f64, self.geometry);
        self.volume = effect.volume;

        let rendering = self.is_rendering(&mut activity);
        if (!rendering && t != COMPOSITION_DURATION_MS) || t > self.params.end_ms() {
            return SpriteUpdate {
                effect: None,
                activity,
            };
        }

        if let Some(frame) = self.player.take_latest_frame() {
            if self.frame.is_none() {
                let (w, h) = self.player.frame_size();
                self.geometry = SpriteGeometry::from_frame_size(w, h);
            }
            if matches!(self.state, PlayerState::Play | PlayerState::Export)
                && t < COMPOSITION_DURATION_MS
            {
                self.fps.record(now_ms);
            }
            self.frame = Some(frame);
        }

        SpriteUpdate {
            effect: Some(frame_effect(&self.params, t as f64, self.geometry)),
            activity,
        }
    }

    pub fn release(&mut self) {
        self.player.set_audio_observer(None);
        self.player.release();
        self.frame = None;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/sprite.rs"]
mod tests;
